use std::sync::Arc;
use std::time::Duration;

/// Events emitted while planning and executing migrations
///
/// These events allow observers to follow a run in real time: which migrations
/// were selected, how each execute/rollback went, and how the run ended.
#[derive(Debug, Clone)]
pub enum MigrationEvent {
    // ===== Planning =====
    /// Applicable migrations were resolved for a context
    PlanResolved {
        /// Component being migrated
        component: String,
        /// Installed version ("" for fresh installs)
        installed_version: String,
        /// Version being upgraded to
        target_version: String,
        /// IDs of the applicable migrations, in execution order
        migration_ids: Vec<String>,
    },

    // ===== Execution =====
    /// A step's `run` is starting
    StepStarted {
        /// Step (migration) ID
        id: String,
        /// Position in the plan (0-based)
        index: usize,
        /// Number of steps in the plan
        total: usize,
    },

    /// A step's `run` succeeded
    StepCompleted {
        id: String,
        duration: Duration,
    },

    /// A step's `run` failed; rollback of earlier steps follows
    StepFailed {
        id: String,
        error: String,
        duration: Duration,
    },

    // ===== Rollback =====
    /// A completed step is being undone
    RollbackStarted {
        id: String,
    },

    /// Undo succeeded
    RollbackCompleted {
        id: String,
        duration: Duration,
    },

    /// Undo failed; remaining rollbacks are still attempted
    RollbackFailed {
        id: String,
        error: String,
    },
}

impl MigrationEvent {
    /// The step/migration ID this event concerns, if any
    pub fn id(&self) -> Option<&str> {
        match self {
            MigrationEvent::PlanResolved { .. } => None,
            MigrationEvent::StepStarted { id, .. }
            | MigrationEvent::StepCompleted { id, .. }
            | MigrationEvent::StepFailed { id, .. }
            | MigrationEvent::RollbackStarted { id }
            | MigrationEvent::RollbackCompleted { id, .. }
            | MigrationEvent::RollbackFailed { id, .. } => Some(id),
        }
    }
}

/// Hook for observing migration events
///
/// # Example
/// ```
/// use blocknode_core::events::{MigrationEvent, MigrationHook};
///
/// struct Printer;
///
/// impl MigrationHook for Printer {
///     fn on_event(&self, event: &MigrationEvent) {
///         if let MigrationEvent::StepStarted { id, index, total } = event {
///             println!("[{}/{}] {}", index + 1, total, id);
///         }
///     }
/// }
/// ```
pub trait MigrationHook: Send + Sync {
    /// Called when an event occurs
    fn on_event(&self, event: &MigrationEvent);
}

/// Blanket implementation for closures
impl<F> MigrationHook for F
where
    F: Fn(&MigrationEvent) + Send + Sync,
{
    fn on_event(&self, event: &MigrationEvent) {
        self(event)
    }
}

/// Delivers an event to every hook in order.
pub(crate) fn emit(hooks: &[Arc<dyn MigrationHook>], event: MigrationEvent) {
    for hook in hooks {
        hook.on_event(&event);
    }
}
