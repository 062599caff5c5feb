use crate::migrations::VerificationStorageMigration;
use blocknode_core::{Registry, RegistryError};
use std::sync::Arc;

/// Component name the Block Node migrations are registered under
pub const BLOCK_NODE_COMPONENT: &str = "block-node";

/// Registry holding every migration shipped with this crate, in the order
/// they must run.
pub fn default_registry() -> Result<Registry, RegistryError> {
    Registry::new().with(
        BLOCK_NODE_COMPONENT,
        Arc::new(VerificationStorageMigration::new()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = default_registry().unwrap();

        assert_eq!(registry.components(), vec![BLOCK_NODE_COMPONENT]);
        let ids: Vec<&str> = registry
            .migrations(BLOCK_NODE_COMPONENT)
            .iter()
            .map(|m| m.id())
            .collect();
        assert_eq!(ids, vec!["verification-storage-v0.26.2"]);
    }
}
