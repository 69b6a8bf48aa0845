use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::user;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Client,
    Admin,
}

/// Ephemeral identity binding handed to the checkout orchestrator and the
/// handlers. A session returned by `register` is guaranteed to be immediately
/// usable for subsequent authenticated calls.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Session {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    name: String,
    email: String,
    role: Role,
    jti: String,
    iat: i64,
    exp: i64,
}

/// Identity boundary consumed by the orchestrator. Production is DB + JWT;
/// tests inject scripted implementations.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Session, ServiceError>;

    async fn login(&self, email: &str, password: &str) -> Result<Session, ServiceError>;

    async fn session_from_token(&self, token: &str) -> Option<Session>;
}

#[derive(Clone)]
pub struct IdentityService {
    db: Arc<DatabaseConnection>,
    jwt_secret: String,
    expiration_secs: usize,
    event_sender: Option<Arc<EventSender>>,
}

impl IdentityService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        jwt_secret: String,
        expiration_secs: usize,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            jwt_secret,
            expiration_secs,
            event_sender,
        }
    }

    fn issue_session(&self, user: &user::Model) -> Result<Session, ServiceError> {
        let role: Role = user
            .role
            .parse()
            .map_err(|_| ServiceError::InternalError(format!("unknown role {}", user.role)))?;

        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.expiration_secs as i64);
        let claims = Claims {
            sub: user.id.to_string(),
            name: user.display_name.clone(),
            email: user.email.clone(),
            role,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("token encoding: {e}")))?;

        Ok(Session {
            user_id: user.id,
            name: user.display_name.clone(),
            email: user.email.clone(),
            role,
            token,
            expires_at,
        })
    }

    fn hash_password(password: &str) -> Result<String, ServiceError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| ServiceError::InternalError(format!("password hashing: {e}")))
    }

    fn verify_password(password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(&*self.db)
            .await?)
    }
}

#[async_trait]
impl IdentityProvider for IdentityService {
    /// Registers a new client account and returns an immediately-usable
    /// session. No settling delay is needed before trusting it.
    #[instrument(skip(self, password), fields(email = %email))]
    async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Session, ServiceError> {
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(ServiceError::ValidationError(
                "a valid email address is required".to_string(),
            ));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ServiceError::WeakCredential(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::AlreadyExists);
        }

        let user_id = Uuid::new_v4();
        let model = user::ActiveModel {
            id: Set(user_id),
            email: Set(email.clone()),
            password_hash: Set(Self::hash_password(password)?),
            display_name: Set(display_name.to_string()),
            role: Set(Role::Client.to_string()),
            created_at: Set(Utc::now()),
        };
        let user = model.insert(&*self.db).await?;

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::UserRegistered(user_id)).await {
                warn!(error = %e, user_id = %user_id, "failed to send user registered event");
            }
        }

        self.issue_session(&user)
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn login(&self, email: &str, password: &str) -> Result<Session, ServiceError> {
        let email = email.trim().to_lowercase();
        let user = self
            .find_by_email(&email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !Self::verify_password(password, &user.password_hash) {
            return Err(ServiceError::InvalidCredentials);
        }

        self.issue_session(&user)
    }

    async fn session_from_token(&self, token: &str) -> Option<Session> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| debug!(error = %e, "rejected bearer token"))
        .ok()?;

        let claims = data.claims;
        Some(Session {
            user_id: claims.sub.parse().ok()?,
            name: claims.name,
            email: claims.email,
            role: claims.role,
            token: token.to_string(),
            expires_at: DateTime::from_timestamp(claims.exp, 0)?,
        })
    }
}
