//! Packaged manifest templates
//!
//! Templates use `{{ key }}` placeholders filled from a flat JSON object.
//! Every placeholder must have a value; unknown placeholders are an error
//! rather than silently rendering empty.

use blocknode_core::{CollaboratorError, TemplateRenderer};
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::HashMap;

lazy_static::lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("Invalid placeholder regex");
}

/// Template name of the persistent volume manifest
pub const PV_TEMPLATE: &str = "pv.yaml";
/// Template name of the persistent volume claim manifest
pub const PVC_TEMPLATE: &str = "pvc.yaml";

/// Renders the templates compiled into this crate, plus any registered at runtime
#[derive(Debug, Clone)]
pub struct ManifestTemplates {
    templates: HashMap<String, String>,
}

impl Default for ManifestTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestTemplates {
    pub fn new() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            PV_TEMPLATE.to_string(),
            include_str!("../templates/pv.yaml").to_string(),
        );
        templates.insert(
            PVC_TEMPLATE.to_string(),
            include_str!("../templates/pvc.yaml").to_string(),
        );
        Self { templates }
    }

    /// Adds or replaces a template
    pub fn with_template(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates.insert(name.into(), body.into());
        self
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn body(&self, template: &str) -> Result<&str, CollaboratorError> {
        self.templates
            .get(template)
            .map(String::as_str)
            .ok_or_else(|| CollaboratorError::Template(format!("unknown template '{}'", template)))
    }
}

impl TemplateRenderer for ManifestTemplates {
    fn render(&self, template: &str, data: &Value) -> Result<String, CollaboratorError> {
        let body = self.body(template)?;
        let data = data.as_object().ok_or_else(|| {
            CollaboratorError::Template(format!("data for '{}' must be an object", template))
        })?;

        let mut missing = Vec::new();
        let rendered = PLACEHOLDER.replace_all(body, |caps: &Captures| {
            let key = &caps[1];
            match data.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => {
                    missing.push(key.to_string());
                    String::new()
                }
                Some(other) => other.to_string(),
            }
        });

        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            return Err(CollaboratorError::Template(format!(
                "'{}' is missing values for: {}",
                template,
                missing.join(", ")
            )));
        }

        Ok(rendered.into_owned())
    }

    fn read(&self, template: &str) -> Result<Vec<u8>, CollaboratorError> {
        Ok(self.body(template)?.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pv_data() -> Value {
        json!({
            "name": "block-node-live-pv",
            "release": "block-node",
            "category": "live",
            "size": "10Gi",
            "storage_class": "manual",
            "path": "/mnt/base/live",
        })
    }

    #[test]
    fn test_render_packaged_pv() {
        let rendered = ManifestTemplates::new().render(PV_TEMPLATE, &pv_data()).unwrap();

        assert!(rendered.contains("kind: PersistentVolume"));
        assert!(rendered.contains("name: block-node-live-pv"));
        assert!(rendered.contains("path: /mnt/base/live"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn test_missing_values_are_listed() {
        let err = ManifestTemplates::new()
            .render(PVC_TEMPLATE, &json!({"name": "x"}))
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("claim"));
        assert!(message.contains("namespace"));
        assert!(!message.contains(" name,"));
    }

    #[test]
    fn test_custom_template_and_non_string_values() {
        let templates = ManifestTemplates::new().with_template("cm.yaml", "replicas: {{replicas}}");

        assert_eq!(
            templates
                .render("cm.yaml", &json!({"replicas": 3}))
                .unwrap(),
            "replicas: 3"
        );
        assert_eq!(templates.read("cm.yaml").unwrap(), b"replicas: {{replicas}}");
        assert_eq!(templates.names(), vec!["cm.yaml", "pv.yaml", "pvc.yaml"]);
    }

    #[test]
    fn test_unknown_template() {
        let err = ManifestTemplates::new().read("nope.yaml").unwrap_err();
        assert!(err.to_string().contains("unknown template 'nope.yaml'"));
    }
}
