use super::{Migration, MigrationContext, Registry};
use crate::error::{MigrationError, RollbackFailure};
use crate::events::{emit, MigrationEvent, MigrationHook};
use crate::step::{ExecutionFailure, ExecutionReport, SequentialExecutor, Step};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Read-only summary of what an upgrade would run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub component: String,
    pub installed_version: String,
    pub target_version: String,
    /// `(id, description)` pairs in execution order
    pub migrations: Vec<(String, String)>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.migrations.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// One line per migration: `  - <id>: <description>`
    pub fn summary(&self) -> String {
        self.migrations
            .iter()
            .map(|(id, description)| format!("  - {}: {}", id, description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = if self.installed_version.is_empty() {
            "(not installed)"
        } else {
            &self.installed_version
        };

        if self.is_empty() {
            return write!(
                f,
                "{} {} -> {}: no migrations required",
                self.component, from, self.target_version
            );
        }

        writeln!(
            f,
            "{} {} -> {}: {} migration(s) required",
            self.component,
            from,
            self.target_version,
            self.migrations.len()
        )?;
        write!(f, "{}", self.summary())
    }
}

/// Adapts a [`Migration`] to the executor's [`Step`] interface
struct MigrationStep(Arc<dyn Migration>);

#[async_trait]
impl Step<MigrationContext, MigrationError> for MigrationStep {
    fn id(&self) -> &str {
        self.0.id()
    }

    async fn run(&self, ctx: &mut MigrationContext) -> Result<(), MigrationError> {
        self.0.execute(ctx).await
    }

    async fn undo(&self, ctx: &mut MigrationContext) -> Result<(), MigrationError> {
        self.0.rollback(ctx).await
    }
}

/// Selects and runs the migrations an upgrade crosses
///
/// A manager holds no state between calls. Cloning is cheap and clones share
/// the same registry and hooks.
#[derive(Clone)]
pub struct Manager {
    registry: Arc<Registry>,
    hooks: Arc<parking_lot::RwLock<Vec<Arc<dyn MigrationHook>>>>,
}

impl Manager {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            hooks: Arc::new(parking_lot::RwLock::new(Vec::new())),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Add a hook to observe migration events
    ///
    /// # Example
    /// ```
    /// use blocknode_core::events::MigrationEvent;
    /// use blocknode_core::migration::{Manager, Registry};
    /// use std::sync::Arc;
    ///
    /// let manager = Manager::new(Arc::new(Registry::new()));
    /// manager.add_hook(|event: &MigrationEvent| {
    ///     if let MigrationEvent::StepFailed { id, error, .. } = event {
    ///         eprintln!("{} failed: {}", id, error);
    ///     }
    /// });
    /// ```
    pub fn add_hook(&self, hook: impl MigrationHook + 'static) {
        self.hooks.write().push(Arc::new(hook));
    }

    fn emit_event(&self, event: MigrationEvent) {
        let hooks = self.hooks.read();
        emit(&hooks, event);
    }

    /// Applicable migrations for `ctx`, in registration order
    pub fn applicable(
        &self,
        ctx: &MigrationContext,
    ) -> Result<Vec<Arc<dyn Migration>>, MigrationError> {
        Ok(self.registry.applicable(ctx)?)
    }

    /// Builds the plan for `ctx` without running anything
    pub fn plan(&self, ctx: &MigrationContext) -> Result<MigrationPlan, MigrationError> {
        let migrations = self
            .applicable(ctx)?
            .iter()
            .map(|m| (m.id().to_string(), m.description().to_string()))
            .collect();

        Ok(MigrationPlan {
            component: ctx.component().to_string(),
            installed_version: ctx.installed_version().to_string(),
            target_version: ctx.target_version().to_string(),
            migrations,
        })
    }

    /// Whether any migration applies, plus a one-line-per-migration summary
    pub fn requires_migration(
        &self,
        ctx: &MigrationContext,
    ) -> Result<(bool, String), MigrationError> {
        let plan = self.plan(ctx)?;
        Ok((!plan.is_empty(), plan.summary()))
    }

    /// Runs every applicable migration in order.
    ///
    /// On failure, migrations that completed are rolled back in reverse order
    /// and the result is [`MigrationError::RolledBack`] or, if any rollback
    /// also failed, [`MigrationError::RollbackFailed`]. An empty plan is a
    /// successful no-op.
    pub async fn execute(
        &self,
        ctx: &mut MigrationContext,
    ) -> Result<ExecutionReport, MigrationError> {
        let applicable = self.applicable(ctx)?;

        self.emit_event(MigrationEvent::PlanResolved {
            component: ctx.component().to_string(),
            installed_version: ctx.installed_version().to_string(),
            target_version: ctx.target_version().to_string(),
            migration_ids: applicable.iter().map(|m| m.id().to_string()).collect(),
        });

        if applicable.is_empty() {
            log::info!(
                "no migrations apply for {} {} -> {}",
                ctx.component(),
                ctx.installed_version(),
                ctx.target_version()
            );
            return Ok(ExecutionReport::default());
        }

        log::info!(
            "running {} migration(s) for {} {} -> {} (run {})",
            applicable.len(),
            ctx.component(),
            ctx.installed_version(),
            ctx.target_version(),
            ctx.run_id()
        );

        let hooks = self.hooks.read().clone();
        let mut executor: SequentialExecutor<MigrationContext, MigrationError> =
            SequentialExecutor::new().with_hooks(hooks);
        for migration in applicable {
            executor.push(MigrationStep(migration));
        }

        executor.execute(ctx).await.map_err(compound_error)
    }
}

/// Folds a failed run into [`MigrationError::RolledBack`] or
/// [`MigrationError::RollbackFailed`].
///
/// A migration that could not undo its own partial work reports that as a
/// `RollbackFailed` of its own; those failures come first.
fn compound_error(failure: ExecutionFailure<MigrationError>) -> MigrationError {
    let ExecutionFailure {
        failed_id,
        error,
        rolled_back,
        rollback_errors,
    } = failure;

    let (error, mut rollback_failures) = match error {
        MigrationError::RollbackFailed {
            source,
            rollback_failures,
            ..
        } => (*source, rollback_failures),
        other => (other, Vec::new()),
    };
    rollback_failures.extend(
        rollback_errors
            .into_iter()
            .map(|(id, error)| RollbackFailure { id, error }),
    );

    if rollback_failures.is_empty() {
        MigrationError::RolledBack {
            id: failed_id,
            source: Box::new(error),
            rolled_back,
        }
    } else {
        MigrationError::RollbackFailed {
            id: failed_id,
            source: Box::new(error),
            rollback_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationMetadata;
    use crate::test_utils::{CallLog, RecordingMigration};

    fn manager_with(migrations: Vec<Arc<RecordingMigration>>) -> Manager {
        let mut registry = Registry::new();
        for migration in migrations {
            registry.register("block-node", migration).unwrap();
        }
        Manager::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_empty_plan_is_noop() {
        let log = CallLog::default();
        let manager = manager_with(vec![Arc::new(
            RecordingMigration::new("m1-v1.0.0", "1.0.0").with_log(&log),
        )]);

        let mut ctx = MigrationContext::new("block-node", "1.5.0", "1.6.0");
        let report = manager.execute(&mut ctx).await.unwrap();

        assert!(report.is_noop());
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_restores_earlier_migrations() {
        let log = CallLog::default();
        let manager = manager_with(vec![
            Arc::new(RecordingMigration::new("m1-v1.0.0", "1.0.0").with_log(&log)),
            Arc::new(
                RecordingMigration::new("m2-v2.0.0", "2.0.0")
                    .with_log(&log)
                    .failing_execute(),
            ),
        ]);

        let mut ctx = MigrationContext::new("block-node", "0.5.0", "2.5.0");
        let err = manager.execute(&mut ctx).await.unwrap_err();

        assert!(matches!(err, MigrationError::RolledBack { .. }));
        assert_eq!(err.failed_migration(), Some("m2-v2.0.0"));
        assert!(err.to_string().contains("investigate before retrying"));
        assert_eq!(
            log.calls(),
            vec![
                "execute:m1-v1.0.0",
                "execute:m2-v2.0.0",
                "rollback:m1-v1.0.0"
            ]
        );
    }

    #[tokio::test]
    async fn test_rollback_failure_is_compound() {
        let log = CallLog::default();
        let manager = manager_with(vec![
            Arc::new(
                RecordingMigration::new("m1-v1.0.0", "1.0.0")
                    .with_log(&log)
                    .failing_rollback(),
            ),
            Arc::new(
                RecordingMigration::new("m2-v2.0.0", "2.0.0")
                    .with_log(&log)
                    .failing_execute(),
            ),
        ]);

        let mut ctx = MigrationContext::new("block-node", "0.5.0", "2.5.0");
        let err = manager.execute(&mut ctx).await.unwrap_err();

        assert!(err.requires_manual_intervention());
        let message = err.to_string();
        assert!(message.contains("m2-v2.0.0"));
        assert!(message.contains("rollback ALSO failed"));
        assert!(message.contains("m1-v1.0.0"));
    }

    /// Fails and reports that undoing its own partial work failed too
    struct UnrecoverableMigration {
        metadata: MigrationMetadata,
    }

    #[async_trait]
    impl Migration for UnrecoverableMigration {
        fn metadata(&self) -> &MigrationMetadata {
            &self.metadata
        }

        async fn execute(&self, _ctx: &mut MigrationContext) -> Result<(), MigrationError> {
            Err(MigrationError::RollbackFailed {
                id: self.id().to_string(),
                source: Box::new(MigrationError::execution("install failed")),
                rollback_failures: vec![RollbackFailure {
                    id: self.id().to_string(),
                    error: MigrationError::execution("reinstall failed"),
                }],
            })
        }

        async fn rollback(&self, _ctx: &mut MigrationContext) -> Result<(), MigrationError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_own_recovery_failure_is_not_reported_as_restored() {
        let log = CallLog::default();
        let registry = Registry::new()
            .with(
                "block-node",
                Arc::new(RecordingMigration::new("m1-v1.0.0", "1.0.0").with_log(&log)),
            )
            .unwrap()
            .with(
                "block-node",
                Arc::new(UnrecoverableMigration {
                    metadata: MigrationMetadata::new(
                        "m2-v2.0.0",
                        "Recreate volumes",
                        "2.0.0",
                    ),
                }),
            )
            .unwrap();
        let manager = Manager::new(Arc::new(registry));

        let mut ctx = MigrationContext::new("block-node", "0.5.0", "2.0.0");
        let err = manager.execute(&mut ctx).await.unwrap_err();

        assert!(err.requires_manual_intervention());
        assert_eq!(err.failed_migration(), Some("m2-v2.0.0"));
        assert!(matches!(err.original(), MigrationError::Execution(m) if m == "install failed"));
        let message = err.to_string();
        assert!(message.contains("m2-v2.0.0: execution failed: reinstall failed"));
        assert!(!message.contains("restored by rollback"));
        assert_eq!(log.calls(), vec!["execute:m1-v1.0.0", "rollback:m1-v1.0.0"]);
    }

    #[tokio::test]
    async fn test_kth_failure_ordering() {
        for k in 0..4 {
            let log = CallLog::default();
            let migrations: Vec<_> = (0..4)
                .map(|i| {
                    let m = RecordingMigration::new(format!("m{}", i), "1.0.0").with_log(&log);
                    Arc::new(if i == k { m.failing_execute() } else { m })
                })
                .collect();
            let manager = manager_with(migrations);

            let mut ctx = MigrationContext::new("block-node", "0.5.0", "1.0.0");
            manager.execute(&mut ctx).await.unwrap_err();

            let mut expected: Vec<String> = (0..=k).map(|i| format!("execute:m{}", i)).collect();
            expected.extend((0..k).rev().map(|i| format!("rollback:m{}", i)));
            assert_eq!(log.calls(), expected, "Failed for k = {}", k);
        }
    }

    #[tokio::test]
    async fn test_requires_migration_summary() {
        let manager = manager_with(vec![
            Arc::new(RecordingMigration::new("m1-v1.0.0", "1.0.0").with_description("first")),
            Arc::new(RecordingMigration::new("m2-v2.0.0", "2.0.0").with_description("second")),
        ]);

        let ctx = MigrationContext::new("block-node", "0.5.0", "2.5.0");
        let (required, summary) = manager.requires_migration(&ctx).unwrap();
        assert!(required);
        assert_eq!(summary, "  - m1-v1.0.0: first\n  - m2-v2.0.0: second");

        let ctx = MigrationContext::new("block-node", "", "2.5.0");
        let (required, summary) = manager.requires_migration(&ctx).unwrap();
        assert!(!required);
        assert!(summary.is_empty());
    }

    #[tokio::test]
    async fn test_plan_resolved_event() {
        let manager = manager_with(vec![Arc::new(RecordingMigration::new("m1-v1.0.0", "1.0.0"))]);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.add_hook(move |event: &MigrationEvent| {
            if let MigrationEvent::PlanResolved { migration_ids, .. } = event {
                sink.lock().extend(migration_ids.clone());
            }
        });

        let mut ctx = MigrationContext::new("block-node", "0.5.0", "1.0.0");
        manager.execute(&mut ctx).await.unwrap();

        assert_eq!(*seen.lock(), vec!["m1-v1.0.0".to_string()]);
    }

    #[test]
    fn test_applicability_error_aborts_before_execution() {
        let manager = manager_with(vec![Arc::new(RecordingMigration::new("m1", "1.0.0"))]);
        let ctx = MigrationContext::new("block-node", "0.5.0", "not-a-version");

        let err = manager.plan(&ctx).unwrap_err();
        assert!(err.is_argument());
        assert!(err.to_string().contains("m1"));
    }
}
