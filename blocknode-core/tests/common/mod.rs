//! Common test utilities shared across test files.
//!
//! Migrations here touch real files in a temp directory so tests can check
//! the on-disk result of execute and rollback.
//! Items here may not be used by all test files, hence the module-level allow.
#![allow(dead_code)]

use async_trait::async_trait;
use blocknode_core::{
    Migration, MigrationContext, MigrationError, MigrationEvent, MigrationHook, MigrationMetadata,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ===== Marker-file migration =====

/// Writes `<dir>/<id>.done` on execute and removes it on rollback.
pub struct MarkerMigration {
    metadata: MigrationMetadata,
    dir: PathBuf,
    fail_execute: bool,
    fail_rollback: bool,
}

impl MarkerMigration {
    pub fn new(id: &str, min_version: &str, dir: &Path) -> Self {
        Self {
            metadata: MigrationMetadata::new(id, format!("marker for {}", id), min_version),
            dir: dir.to_path_buf(),
            fail_execute: false,
            fail_rollback: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    pub fn failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    pub fn marker(&self) -> PathBuf {
        self.dir.join(format!("{}.done", self.metadata.id()))
    }
}

#[async_trait]
impl Migration for MarkerMigration {
    fn metadata(&self) -> &MigrationMetadata {
        &self.metadata
    }

    async fn execute(&self, _ctx: &mut MigrationContext) -> Result<(), MigrationError> {
        if self.fail_execute {
            return Err(MigrationError::execution(format!("{} cannot run", self.id())));
        }
        tokio::fs::write(self.marker(), self.id())
            .await
            .map_err(|e| MigrationError::execution(e.to_string()))
    }

    async fn rollback(&self, _ctx: &mut MigrationContext) -> Result<(), MigrationError> {
        if self.fail_rollback {
            return Err(MigrationError::execution(format!("{} cannot undo", self.id())));
        }
        tokio::fs::remove_file(self.marker())
            .await
            .map_err(|e| MigrationError::execution(e.to_string()))
    }
}

/// Markers present in `dir`, sorted
pub fn markers(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ===== Event Collector =====

/// Records event labels in order
#[derive(Clone, Default)]
pub struct EventCollector {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl MigrationHook for EventCollector {
    fn on_event(&self, event: &MigrationEvent) {
        let label = match event {
            MigrationEvent::PlanResolved { migration_ids, .. } => {
                format!("plan[{}]", migration_ids.join(","))
            }
            MigrationEvent::StepStarted { id, .. } => format!("start:{}", id),
            MigrationEvent::StepCompleted { id, .. } => format!("done:{}", id),
            MigrationEvent::StepFailed { id, .. } => format!("fail:{}", id),
            MigrationEvent::RollbackStarted { id } => format!("undo:{}", id),
            MigrationEvent::RollbackCompleted { id, .. } => format!("undone:{}", id),
            MigrationEvent::RollbackFailed { id, .. } => format!("undo-fail:{}", id),
        };
        self.events.lock().unwrap().push(label);
    }
}
