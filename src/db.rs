use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Schema,
};
use std::time::Duration;
use tracing::info;

use crate::entities;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool to the database.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, DbErr> {
    let mut opts = ConnectOptions::new(database_url.to_string());
    opts.max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug);

    let db = Database::connect(opts).await?;
    info!("Database connection established");
    Ok(db)
}

/// Creates any missing tables for the crate's entities. Used on startup when
/// `auto_migrate` is set and by the test harness against in-memory SQLite.
pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let statements = [
        schema
            .create_table_from_entity(entities::user::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(entities::order::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(entities::order_item::Entity)
            .if_not_exists()
            .to_owned(),
    ];

    for stmt in statements {
        db.execute(backend.build(&stmt)).await?;
    }

    Ok(())
}
