use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::dom::{Document, NodeId};

use super::{ControlKind, WidgetRegistry};

/// Properties last applied from a server response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControlMeta {
    pub label: Option<String>,
    pub hint: Option<String>,
    pub help: Option<String>,
    pub alert: Option<String>,
    pub relevant: Option<bool>,
    pub readonly: Option<bool>,
    pub required: Option<bool>,
    pub valid: Option<bool>,
}

/// Per-form index of controls: resolved kinds, the last value known to be on
/// the server, and applied properties.
#[derive(Debug, Default)]
pub struct ControlRegistry {
    kinds: HashMap<String, ControlKind>,
    server_values: HashMap<String, String>,
    meta: HashMap<String, ControlMeta>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify every id-bearing control under `scope` and record its current
    /// value as the server value. Ids already indexed keep their kind.
    pub fn index(&mut self, document: &Document, scope: NodeId, widgets: &WidgetRegistry) -> usize {
        let mut added = 0;
        for node in document.descendants(scope) {
            let Some(id) = document.id_of(node) else {
                continue;
            };
            if self.kinds.contains_key(id) {
                continue;
            }
            let Some(kind) = ControlKind::classify(document, node, widgets) else {
                continue;
            };
            if kind.is_leaf() && !kind.is_upload() {
                let value = kind.value(document, node, widgets);
                self.server_values.insert(id.to_string(), value);
            }
            self.kinds.insert(id.to_string(), kind);
            added += 1;
        }
        debug!(target: "controls", added, total = self.kinds.len(), "indexed controls");
        added
    }

    /// Kind of `id`, classifying on first use.
    pub fn kind(&mut self, document: &Document, id: &str, widgets: &WidgetRegistry) -> Option<ControlKind> {
        if let Some(kind) = self.kinds.get(id) {
            return Some(kind.clone());
        }
        let node = document.get_element_by_id(id)?;
        let kind = ControlKind::classify(document, node, widgets)?;
        self.kinds.insert(id.to_string(), kind.clone());
        Some(kind)
    }

    pub fn known_kind(&self, id: &str) -> Option<&ControlKind> {
        self.kinds.get(id)
    }

    pub fn set_kind(&mut self, id: &str, kind: ControlKind) {
        self.kinds.insert(id.to_string(), kind);
    }

    pub fn record_server_value(&mut self, id: &str, value: &str) {
        self.server_values.insert(id.to_string(), value.to_string());
    }

    pub fn server_value(&self, id: &str) -> Option<&str> {
        self.server_values.get(id).map(String::as_str)
    }

    /// True when the server is already known to hold `value` for `id`.
    pub fn server_has_value(&self, id: &str, value: &str) -> bool {
        self.server_value(id) == Some(value)
    }

    /// True when the user edited `id` after the server last set it. A control
    /// without a recorded server value never counts as diverged.
    pub fn has_diverged_from_server(&self, id: &str, live: &str) -> bool {
        self.server_value(id).map_or(false, |server| server != live)
    }

    pub fn meta(&self, id: &str) -> Option<&ControlMeta> {
        self.meta.get(id)
    }

    pub fn meta_mut(&mut self, id: &str) -> &mut ControlMeta {
        self.meta.entry(id.to_string()).or_default()
    }

    /// Drop everything known about `id` once its element leaves the document.
    pub fn forget(&mut self, id: &str) {
        self.kinds.remove(id);
        self.server_values.remove(id);
        self.meta.remove(id);
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::InputType;
    use crate::dom::parse_html;

    #[test]
    fn index_records_initial_values() {
        let doc = parse_html(
            r#"<form id="f" class="xforms-form"><span id="a" class="xforms-control xforms-input"><input type="text" value="one"></span><span id="u" class="xforms-control xforms-upload"><input type="file"></span></form>"#,
        );
        let mut registry = ControlRegistry::new();
        let form = doc.get_element_by_id("f").unwrap();
        assert_eq!(registry.index(&doc, form, &WidgetRegistry::default()), 2);
        assert_eq!(registry.server_value("a"), Some("one"));
        assert_eq!(registry.server_value("u"), None);
        assert_eq!(
            registry.known_kind("a"),
            Some(&ControlKind::Input(InputType::String))
        );
    }

    #[test]
    fn divergence_needs_a_recorded_value() {
        let mut registry = ControlRegistry::new();
        assert!(!registry.has_diverged_from_server("a", "x"));
        registry.record_server_value("a", "x");
        assert!(!registry.has_diverged_from_server("a", "x"));
        assert!(registry.has_diverged_from_server("a", "y"));
        assert!(registry.server_has_value("a", "x"));
        registry.forget("a");
        assert!(registry.server_value("a").is_none());
    }
}
