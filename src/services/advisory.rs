//! Best-effort wrapper around the generative-AI collaborator. Failures here
//! degrade to "no suggestion"; they never block the checkout wizard.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};
use utoipa::ToSchema;

use crate::config::AdvisoryConfig;
use crate::errors::ServiceError;

/// Descriptions at or below this length short-circuit without calling the
/// collaborator.
pub const MIN_ANALYZABLE_LEN: usize = 10;

/// Structured idea analysis attached to the checkout form after the Details
/// phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProjectAnalysis {
    pub feasibility: String,
    pub stack_recommendation: String,
    pub estimated_timeline: String,
    pub agentic_insight: String,
}

/// One cart line offered to the autofill call, with the field keys its
/// schema declares. The collaborator may only propose values for these keys.
#[derive(Debug, Clone, Serialize)]
pub struct AutofillItem {
    pub index: usize,
    pub name: String,
    pub category: String,
    pub field_keys: Vec<String>,
}

/// Per-line configuration values proposed by the collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSuggestion {
    pub item_index: usize,
    pub values: BTreeMap<String, String>,
}

/// Raw client boundary to the AI collaborator. Production uses HTTP; tests
/// inject scripted implementations.
#[async_trait]
pub trait AdvisoryClient: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<ProjectAnalysis, ServiceError>;

    async fn autofill(
        &self,
        items: &[AutofillItem],
        text: &str,
    ) -> Result<Vec<ConfigSuggestion>, ServiceError>;
}

/// Degrading adapter over an [`AdvisoryClient`]: bounded waits, failures
/// logged and swallowed, responses filtered to the requested field keys.
#[derive(Clone)]
pub struct AdvisoryService {
    client: Arc<dyn AdvisoryClient>,
    timeout: Duration,
}

impl AdvisoryService {
    pub fn new(client: Arc<dyn AdvisoryClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Analyzes a free-text project idea. Short inputs return `None` without
    /// touching the collaborator; timeouts and failures return `None` with a
    /// warning.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn analyze_idea(&self, text: &str) -> Option<ProjectAnalysis> {
        if text.len() <= MIN_ANALYZABLE_LEN {
            return None;
        }

        match tokio::time::timeout(self.timeout, self.client.analyze(text)).await {
            Ok(Ok(analysis)) => Some(analysis),
            Ok(Err(e)) => {
                warn!(error = %e, "idea analysis failed; proceeding without it");
                None
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "idea analysis timed out");
                None
            }
        }
    }

    /// Proposes configuration values for the given lines. Returns an empty
    /// list on any failure; values for keys a line did not declare are
    /// dropped.
    #[instrument(skip(self, items, text), fields(items = items.len()))]
    pub async fn autofill_config(
        &self,
        items: &[AutofillItem],
        text: &str,
    ) -> Vec<ConfigSuggestion> {
        if items.is_empty() {
            return Vec::new();
        }

        let suggestions = match tokio::time::timeout(self.timeout, self.client.autofill(items, text))
            .await
        {
            Ok(Ok(suggestions)) => suggestions,
            Ok(Err(e)) => {
                warn!(error = %e, "config autofill failed; returning no suggestions");
                return Vec::new();
            }
            Err(_) => {
                warn!("config autofill timed out");
                return Vec::new();
            }
        };

        suggestions
            .into_iter()
            .filter_map(|mut suggestion| {
                let declared = items
                    .iter()
                    .find(|i| i.index == suggestion.item_index)
                    .map(|i| i.field_keys.as_slice())?;
                suggestion.values.retain(|key, _| declared.contains(key));
                if suggestion.values.is_empty() {
                    None
                } else {
                    Some(suggestion)
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// HTTP client (Gemini-style generateContent endpoint)
// ---------------------------------------------------------------------------

const ANALYSIS_INSTRUCTION: &str = "You are the lead architect at an async, productized \
development studio. Analyze the user's project idea and answer as JSON with the fields \
feasibility (High/Medium/Low), stack_recommendation, estimated_timeline and agentic_insight \
(a brief, sharp comment on how an agent would execute part of this build autonomously).";

const AUTOFILL_INSTRUCTION: &str = "You are a configuration agent for a productized \
development studio. Infer the best technical and design choices for the listed cart items \
from the user's project description. Answer as a JSON array of objects with item_index and \
values (a map from the listed field keys to a chosen option). Only fill fields listed for \
that item.";

pub struct HttpAdvisoryClient {
    http: reqwest::Client,
    config: AdvisoryConfig,
}

impl HttpAdvisoryClient {
    pub fn new(config: AdvisoryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn generate(&self, instruction: &str, prompt: String) -> Result<String, ServiceError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.endpoint, self.config.model, self.config.api_key
        );

        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": instruction }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("advisory request: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "advisory returned {}",
                response.status()
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("advisory body: {e}")))?;

        // Any shape mismatch is treated identically to a network failure.
        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| {
                ServiceError::ExternalServiceError("advisory response missing text".to_string())
            })
    }
}

#[async_trait]
impl AdvisoryClient for HttpAdvisoryClient {
    async fn analyze(&self, text: &str) -> Result<ProjectAnalysis, ServiceError> {
        let raw = self.generate(ANALYSIS_INSTRUCTION, text.to_string()).await?;
        serde_json::from_str(&raw)
            .map_err(|e| ServiceError::ExternalServiceError(format!("advisory json: {e}")))
    }

    async fn autofill(
        &self,
        items: &[AutofillItem],
        text: &str,
    ) -> Result<Vec<ConfigSuggestion>, ServiceError> {
        let mut prompt = format!("Project description: {text}\n\nConfigure these items:\n");
        for item in items {
            prompt.push_str(&format!(
                "Item {} ({}, {}): fields {}\n",
                item.index,
                item.name,
                item.category,
                item.field_keys.join(", ")
            ));
        }

        let raw = self.generate(AUTOFILL_INSTRUCTION, prompt).await?;
        serde_json::from_str(&raw)
            .map_err(|e| ServiceError::ExternalServiceError(format!("advisory json: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClient {
        analyze_calls: AtomicUsize,
        fail: bool,
        extra_keys: bool,
    }

    impl ScriptedClient {
        fn new(fail: bool, extra_keys: bool) -> Self {
            Self {
                analyze_calls: AtomicUsize::new(0),
                fail,
                extra_keys,
            }
        }
    }

    #[async_trait]
    impl AdvisoryClient for ScriptedClient {
        async fn analyze(&self, _text: &str) -> Result<ProjectAnalysis, ServiceError> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ServiceError::ExternalServiceError("down".to_string()));
            }
            Ok(ProjectAnalysis {
                feasibility: "High".to_string(),
                stack_recommendation: "React + Supabase".to_string(),
                estimated_timeline: "1 Hour Prototype".to_string(),
                agentic_insight: "Scaffold auth first".to_string(),
            })
        }

        async fn autofill(
            &self,
            items: &[AutofillItem],
            _text: &str,
        ) -> Result<Vec<ConfigSuggestion>, ServiceError> {
            if self.fail {
                return Err(ServiceError::ExternalServiceError("down".to_string()));
            }
            let mut values = BTreeMap::new();
            values.insert("aesthetic".to_string(), "Minimal & Clean".to_string());
            if self.extra_keys {
                values.insert("undeclared_field".to_string(), "whatever".to_string());
            }
            Ok(vec![ConfigSuggestion {
                item_index: items[0].index,
                values,
            }])
        }
    }

    fn service(client: ScriptedClient) -> (Arc<ScriptedClient>, AdvisoryService) {
        let client = Arc::new(client);
        (
            client.clone(),
            AdvisoryService::new(client, Duration::from_millis(200)),
        )
    }

    #[tokio::test]
    async fn short_descriptions_never_reach_the_collaborator() {
        let (client, svc) = service(ScriptedClient::new(false, false));
        assert!(svc.analyze_idea("too short").await.is_none());
        assert_eq!(client.analyze_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn analysis_failures_degrade_to_none() {
        let (client, svc) = service(ScriptedClient::new(true, false));
        let result = svc
            .analyze_idea("A marketplace for renting cameras in Berlin")
            .await;
        assert!(result.is_none());
        assert_eq!(client.analyze_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn autofill_failures_degrade_to_empty() {
        let (_, svc) = service(ScriptedClient::new(true, false));
        let items = vec![AutofillItem {
            index: 0,
            name: "Landing Page".to_string(),
            category: "Full Builds".to_string(),
            field_keys: vec!["aesthetic".to_string()],
        }];
        assert!(svc.autofill_config(&items, "anything").await.is_empty());
    }

    #[tokio::test]
    async fn autofill_drops_undeclared_field_keys() {
        let (_, svc) = service(ScriptedClient::new(false, true));
        let items = vec![AutofillItem {
            index: 0,
            name: "Landing Page".to_string(),
            category: "Full Builds".to_string(),
            field_keys: vec!["aesthetic".to_string()],
        }];
        let suggestions = svc.autofill_config(&items, "dark and minimal").await;
        assert_eq!(suggestions.len(), 1);
        assert!(suggestions[0].values.contains_key("aesthetic"));
        assert!(!suggestions[0].values.contains_key("undeclared_field"));
    }
}
