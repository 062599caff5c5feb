use super::{Migration, MigrationContext};
use crate::version::VersionError;
use std::collections::HashMap;
use std::sync::Arc;

/// Errors raised by registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// A migration with the same ID is already registered for the component
    #[error("migration '{id}' is already registered for component '{component}'")]
    DuplicateId { component: String, id: String },

    /// A migration's applicability check failed
    #[error("cannot evaluate migration '{id}': {source}")]
    Applicability {
        id: String,
        #[source]
        source: VersionError,
    },
}

/// Ordered migrations per component
///
/// Built once at startup and then shared read-only (usually behind an `Arc`).
/// Registration order is execution order.
#[derive(Default, Clone)]
pub struct Registry {
    components: HashMap<String, Vec<Arc<dyn Migration>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a migration to `component`'s list.
    ///
    /// Rejects a second migration with an ID already registered for the same
    /// component.
    pub fn register(
        &mut self,
        component: impl Into<String>,
        migration: Arc<dyn Migration>,
    ) -> Result<(), RegistryError> {
        let component = component.into();
        let migrations = self.components.entry(component.clone()).or_default();

        if migrations.iter().any(|m| m.id() == migration.id()) {
            return Err(RegistryError::DuplicateId {
                component,
                id: migration.id().to_string(),
            });
        }

        log::debug!(
            "registered migration {} (min {}) for {}",
            migration.id(),
            migration.min_version(),
            component
        );
        migrations.push(migration);
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(
        mut self,
        component: impl Into<String>,
        migration: Arc<dyn Migration>,
    ) -> Result<Self, RegistryError> {
        self.register(component, migration)?;
        Ok(self)
    }

    /// All migrations registered for `component`, in registration order
    pub fn migrations(&self, component: &str) -> &[Arc<dyn Migration>] {
        self.components
            .get(component)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Names of components with at least one migration
    pub fn components(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.components.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The migrations an upgrade described by `ctx` crosses, in registration order.
    ///
    /// The first applicability error aborts the query.
    pub fn applicable(
        &self,
        ctx: &MigrationContext,
    ) -> Result<Vec<Arc<dyn Migration>>, RegistryError> {
        let mut selected = Vec::new();

        for migration in self.migrations(ctx.component()) {
            let applies = migration
                .applies(ctx.installed_version(), ctx.target_version())
                .map_err(|source| RegistryError::Applicability {
                    id: migration.id().to_string(),
                    source,
                })?;

            if applies {
                selected.push(Arc::clone(migration));
            }
        }

        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingMigration;

    fn ids(migrations: &[Arc<dyn Migration>]) -> Vec<&str> {
        migrations.iter().map(|m| m.id()).collect()
    }

    #[test]
    fn test_applicable_preserves_registration_order() {
        let registry = Registry::new()
            .with("block-node", RecordingMigration::arc("m2-v2.0.0", "2.0.0"))
            .unwrap()
            .with("block-node", RecordingMigration::arc("m1-v1.0.0", "1.0.0"))
            .unwrap();

        let ctx = MigrationContext::new("block-node", "0.5.0", "2.5.0");
        let applicable = registry.applicable(&ctx).unwrap();

        assert_eq!(ids(&applicable), vec!["m2-v2.0.0", "m1-v1.0.0"]);
    }

    #[test]
    fn test_applicable_filters_by_boundary() {
        let registry = Registry::new()
            .with("block-node", RecordingMigration::arc("m1-v1.0.0", "1.0.0"))
            .unwrap()
            .with("block-node", RecordingMigration::arc("m2-v2.0.0", "2.0.0"))
            .unwrap();

        let ctx = MigrationContext::new("block-node", "1.5.0", "2.5.0");
        assert_eq!(ids(&registry.applicable(&ctx).unwrap()), vec!["m2-v2.0.0"]);

        let ctx = MigrationContext::new("block-node", "0.5.0", "1.5.0");
        assert_eq!(ids(&registry.applicable(&ctx).unwrap()), vec!["m1-v1.0.0"]);

        let ctx = MigrationContext::new("block-node", "", "2.5.0");
        assert!(registry.applicable(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_components_are_independent() {
        let registry = Registry::new()
            .with("block-node", RecordingMigration::arc("m1-v1.0.0", "1.0.0"))
            .unwrap()
            .with("mirror-node", RecordingMigration::arc("m1-v1.0.0", "1.0.0"))
            .unwrap();

        assert_eq!(registry.components(), vec!["block-node", "mirror-node"]);

        let ctx = MigrationContext::new("relay", "0.5.0", "2.5.0");
        assert!(registry.applicable(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut registry = Registry::new();
        registry
            .register("block-node", RecordingMigration::arc("m1-v1.0.0", "1.0.0"))
            .unwrap();

        let err = registry
            .register("block-node", RecordingMigration::arc("m1-v1.0.0", "1.0.0"))
            .unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateId { .. }));
        assert_eq!(registry.migrations("block-node").len(), 1);
    }

    #[test]
    fn test_applicability_error_names_migration() {
        let registry = Registry::new()
            .with("block-node", RecordingMigration::arc("ok-v1.0.0", "1.0.0"))
            .unwrap()
            .with("block-node", RecordingMigration::arc("broken", "not-a-version"))
            .unwrap();

        let ctx = MigrationContext::new("block-node", "0.5.0", "2.5.0");
        let err = registry.applicable(&ctx).err().unwrap();

        match err {
            RegistryError::Applicability { id, .. } => assert_eq!(id, "broken"),
            other => panic!("Expected Applicability, got {:?}", other),
        }
    }
}
