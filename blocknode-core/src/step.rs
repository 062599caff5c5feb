//! Sequential execution with reverse-order rollback
//!
//! [`SequentialExecutor`] runs a list of [`Step`]s in order against a shared
//! context. When a step fails, every step that already completed is undone in
//! reverse order. The failing step itself is never undone, and steps after it
//! never run. Undo failures do not stop the rollback loop; they are collected
//! and reported together in [`ExecutionFailure`].

use crate::events::{emit, MigrationEvent, MigrationHook};
use async_trait::async_trait;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A reversible unit of work over a context `C`
#[async_trait]
pub trait Step<C, E>: Send + Sync
where
    C: Send,
    E: Send,
{
    /// Identifier used in events, logs, and reports
    fn id(&self) -> &str;

    async fn run(&self, ctx: &mut C) -> Result<(), E>;

    /// Called only after `run` succeeded in the same execution
    async fn undo(&self, ctx: &mut C) -> Result<(), E>;
}

/// Outcome of a fully successful execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// IDs of the steps that ran, in order
    pub executed: Vec<String>,
    pub duration: Duration,
}

impl ExecutionReport {
    /// True when there was nothing to run
    pub fn is_noop(&self) -> bool {
        self.executed.is_empty()
    }
}

/// Outcome of an execution in which some step failed
#[derive(Debug)]
pub struct ExecutionFailure<E> {
    /// The step whose `run` failed
    pub failed_id: String,
    pub error: E,
    /// Steps undone successfully, in the order they were undone
    pub rolled_back: Vec<String>,
    /// Steps whose undo failed, in the order they were attempted
    pub rollback_errors: Vec<(String, E)>,
}

impl<E> ExecutionFailure<E> {
    /// True when every completed step was undone
    pub fn rollback_succeeded(&self) -> bool {
        self.rollback_errors.is_empty()
    }
}

/// Runs steps in insertion order, rolling back on failure
pub struct SequentialExecutor<C, E> {
    steps: Vec<Box<dyn Step<C, E>>>,
    hooks: Vec<Arc<dyn MigrationHook>>,
}

impl<C, E> Default for SequentialExecutor<C, E> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            hooks: Vec::new(),
        }
    }
}

impl<C, E> SequentialExecutor<C, E>
where
    C: Send,
    E: Display + Send,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step
    pub fn push(&mut self, step: impl Step<C, E> + 'static) {
        self.steps.push(Box::new(step));
    }

    /// Hooks that receive step and rollback events
    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn MigrationHook>>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order.
    ///
    /// An empty executor succeeds without touching the context.
    pub async fn execute(&self, ctx: &mut C) -> Result<ExecutionReport, ExecutionFailure<E>> {
        let started = Instant::now();
        let total = self.steps.len();
        let mut executed: Vec<&dyn Step<C, E>> = Vec::with_capacity(total);

        for (index, step) in self.steps.iter().enumerate() {
            let id = step.id().to_string();
            emit(
                &self.hooks,
                MigrationEvent::StepStarted {
                    id: id.clone(),
                    index,
                    total,
                },
            );
            log::info!("[{}/{}] running {}", index + 1, total, id);

            let step_started = Instant::now();
            match step.run(ctx).await {
                Ok(()) => {
                    emit(
                        &self.hooks,
                        MigrationEvent::StepCompleted {
                            id,
                            duration: step_started.elapsed(),
                        },
                    );
                    executed.push(step.as_ref());
                }
                Err(error) => {
                    log::error!("{} failed: {}", id, error);
                    emit(
                        &self.hooks,
                        MigrationEvent::StepFailed {
                            id: id.clone(),
                            error: error.to_string(),
                            duration: step_started.elapsed(),
                        },
                    );

                    let (rolled_back, rollback_errors) = self.rollback(&executed, ctx).await;
                    return Err(ExecutionFailure {
                        failed_id: id,
                        error,
                        rolled_back,
                        rollback_errors,
                    });
                }
            }
        }

        Ok(ExecutionReport {
            executed: executed.iter().map(|s| s.id().to_string()).collect(),
            duration: started.elapsed(),
        })
    }

    async fn rollback(
        &self,
        executed: &[&dyn Step<C, E>],
        ctx: &mut C,
    ) -> (Vec<String>, Vec<(String, E)>) {
        let mut rolled_back = Vec::new();
        let mut errors = Vec::new();

        for step in executed.iter().rev() {
            let id = step.id().to_string();
            emit(&self.hooks, MigrationEvent::RollbackStarted { id: id.clone() });
            log::warn!("rolling back {}", id);

            let started = Instant::now();
            match step.undo(ctx).await {
                Ok(()) => {
                    emit(
                        &self.hooks,
                        MigrationEvent::RollbackCompleted {
                            id: id.clone(),
                            duration: started.elapsed(),
                        },
                    );
                    rolled_back.push(id);
                }
                Err(error) => {
                    log::error!("rollback of {} failed: {}", id, error);
                    emit(
                        &self.hooks,
                        MigrationEvent::RollbackFailed {
                            id: id.clone(),
                            error: error.to_string(),
                        },
                    );
                    errors.push((id, error));
                }
            }
        }

        (rolled_back, errors)
    }
}
