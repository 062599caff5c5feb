use super::CollaboratorError;
use serde_json::Value;

/// Renders packaged manifest templates
pub trait TemplateRenderer: Send + Sync {
    /// Renders `template` with `data` (a JSON object of substitution values).
    fn render(&self, template: &str, data: &Value) -> Result<String, CollaboratorError>;

    /// Returns the raw template bytes.
    fn read(&self, template: &str) -> Result<Vec<u8>, CollaboratorError>;
}
