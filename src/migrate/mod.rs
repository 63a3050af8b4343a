pub mod combustion;

pub use combustion::CombustionTestsToInstallations;

use crate::store::{DocumentStore, MigrationLogEntry, MigrationLogStore, StoreError};
use chrono::Utc;
use log::info;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// The migration function failed. Its completion record was not written,
    /// so it stays pending and is retried on the next boot.
    #[error("migration '{name}' failed")]
    Failed {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("migration log unavailable")]
    Log(#[from] StoreError),
}

/// A named, one-time structural transform over the whole document collection.
/// The completion log normally prevents re-entry, but a crash between the
/// document writes and the log write re-runs the function on the next boot —
/// so implementations must be idempotent.
#[async_trait::async_trait]
pub trait Migration: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, docs: &dyn DocumentStore) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MigrationReport {
    pub completed: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
}

/// Runs registered migrations strictly sequentially, in registration order,
/// against an injected completion log: later migrations may assume earlier
/// ones already completed.
pub struct MigrationRunner {
    log: Arc<dyn MigrationLogStore>,
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRunner {
    pub fn new(log: Arc<dyn MigrationLogStore>) -> Self {
        Self {
            log,
            migrations: Vec::new(),
        }
    }

    pub fn with_migration(mut self, migration: Box<dyn Migration>) -> Self {
        self.migrations.push(migration);
        self
    }

    /// Run every registered migration that has no completion record yet. Each
    /// migration is awaited to completion before the next one starts; the
    /// completion record is appended only after the function returned
    /// successfully. The first failure stops the run.
    pub async fn run_pending(
        &self,
        docs: &dyn DocumentStore,
    ) -> Result<MigrationReport, MigrationError> {
        let mut report = MigrationReport::default();
        for migration in &self.migrations {
            let name = migration.name();
            if self.log.completion(name).await?.is_some() {
                report.skipped.push(name);
                continue;
            }

            info!("running migration '{}'", name);
            migration
                .run(docs)
                .await
                .map_err(|source| MigrationError::Failed { name, source })?;

            self.log
                .append_completion(MigrationLogEntry {
                    migration_name: name.to_string(),
                    completed_at: Utc::now(),
                })
                .await?;
            info!("migration '{}' completed", name);
            report.completed.push(name);
        }
        Ok(report)
    }
}

/// The application's migration set, in the order they shipped.
pub fn registered_migrations() -> Vec<Box<dyn Migration>> {
    vec![Box::new(CombustionTestsToInstallations)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryDocumentStore, MemoryMigrationLog};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingMigration {
        name: &'static str,
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Migration for CountingMigration {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _docs: &dyn DocumentStore) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn counting(name: &'static str, runs: &Arc<AtomicUsize>, fail: bool) -> Box<dyn Migration> {
        Box::new(CountingMigration {
            name,
            runs: runs.clone(),
            fail,
        })
    }

    #[tokio::test]
    async fn test_completed_migrations_are_skipped() {
        let docs = MemoryDocumentStore::new();
        let log = Arc::new(MemoryMigrationLog::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let runner = MigrationRunner::new(log.clone()).with_migration(counting("m1", &runs, false));

        let report = runner.run_pending(&docs).await.unwrap();
        assert_eq!(report.completed, vec!["m1"]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Second boot: the completion record gates re-entry.
        let report = runner.run_pending(&docs).await.unwrap();
        assert_eq!(report.skipped, vec!["m1"]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_leaves_migration_pending() {
        let docs = MemoryDocumentStore::new();
        let log = Arc::new(MemoryMigrationLog::new());
        let first_runs = Arc::new(AtomicUsize::new(0));
        let second_runs = Arc::new(AtomicUsize::new(0));

        let runner = MigrationRunner::new(log.clone())
            .with_migration(counting("m1", &first_runs, true))
            .with_migration(counting("m2", &second_runs, false));

        let err = runner.run_pending(&docs).await.unwrap_err();
        assert!(matches!(err, MigrationError::Failed { name: "m1", .. }));
        // No completion record for the failure, and m2 never started.
        assert!(log.completion("m1").await.unwrap().is_none());
        assert_eq!(second_runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_migrations_run_in_registration_order() {
        let docs = MemoryDocumentStore::new();
        let log = Arc::new(MemoryMigrationLog::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let runner = MigrationRunner::new(log.clone())
            .with_migration(counting("first", &runs, false))
            .with_migration(counting("second", &runs, false));

        let report = runner.run_pending(&docs).await.unwrap();
        assert_eq!(report.completed, vec!["first", "second"]);

        // "first" completed strictly before "second" was recorded.
        let first = log.completion("first").await.unwrap().unwrap();
        let second = log.completion("second").await.unwrap().unwrap();
        assert!(first.completed_at <= second.completed_at);
    }
}
