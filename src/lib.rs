pub mod config;
pub mod logic;
pub mod migrate;
pub mod model;
pub mod store;

// Export logic types
pub use logic::{
    apply_field_update, difference, get, has_errors, is_equal, parse_path, set, stripped,
    FieldScope, PathError, Segment,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{
    DocumentFilter, DocumentStore, MemoryDocumentStore, MemoryMigrationLog, MigrationLogEntry,
    MigrationLogStore, PutReceipt, StoreError, Versioned,
};

// Export migration engine
pub use migrate::{registered_migrations, Migration, MigrationError, MigrationReport, MigrationRunner};

use log::info;
use std::sync::Arc;

/// Store handles for a booted application.
pub struct AppContext {
    pub documents: Arc<MemoryDocumentStore>,
    pub migration_log: Arc<MemoryMigrationLog>,
    pub migration_report: MigrationReport,
}

/// Boot the local document core: load configuration, open the document store
/// and the migration log, and run every pending migration — sequentially —
/// before handing the stores to the rest of the app.
pub async fn bootstrap() -> anyhow::Result<AppContext> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with INFO level only (suppress DEBUG logs)
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let config = crate::config::AppConfig::load()?;

    let documents = Arc::new(MemoryDocumentStore::named(&config.database.name));
    let migration_log = Arc::new(MemoryMigrationLog::named(&config.database.migration_log_name));

    let mut runner = MigrationRunner::new(migration_log.clone());
    for migration in registered_migrations() {
        runner = runner.with_migration(migration);
    }
    let migration_report = runner.run_pending(documents.as_ref()).await?;
    info!(
        "migrations: {} completed, {} already done",
        migration_report.completed.len(),
        migration_report.skipped.len()
    );

    Ok(AppContext {
        documents,
        migration_log,
        migration_report,
    })
}
