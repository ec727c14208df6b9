use std::collections::HashMap;

use crate::dom::{parse_fragment, Document, DomError, NodeId};

/// Value access for controls rendered by an external widget instead of a
/// native field.
pub trait Widget: Send + Sync {
    fn current_value(&self, document: &Document, node: NodeId) -> String;

    /// Apply `value` to the widget. `attrs` carries the extra attributes of the
    /// server's control patch.
    fn set_current_value(
        &self,
        document: &mut Document,
        node: NodeId,
        value: &str,
        attrs: &[(String, String)],
    ) -> Result<(), DomError>;
}

/// Widgets keyed by the marker class that selects them.
#[derive(Default)]
pub struct WidgetRegistry {
    widgets: HashMap<String, Box<dyn Widget>>,
}

impl WidgetRegistry {
    /// Registry with the built-in widgets.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register(crate::markers::HTML_AREA, Box::new(HtmlAreaWidget));
        registry
    }

    pub fn register(&mut self, class: &str, widget: Box<dyn Widget>) {
        self.widgets.insert(class.to_string(), widget);
    }

    pub fn contains(&self, class: &str) -> bool {
        self.widgets.contains_key(class)
    }

    pub fn get(&self, class: &str) -> Option<&dyn Widget> {
        self.widgets.get(class).map(Box::as_ref)
    }
}

impl std::fmt::Debug for WidgetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.widgets.keys()).finish()
    }
}

/// Rich text area whose value is its markup.
pub struct HtmlAreaWidget;

impl Widget for HtmlAreaWidget {
    fn current_value(&self, document: &Document, node: NodeId) -> String {
        document.inner_html(node)
    }

    fn set_current_value(
        &self,
        document: &mut Document,
        node: NodeId,
        value: &str,
        _attrs: &[(String, String)],
    ) -> Result<(), DomError> {
        let nodes = parse_fragment(document, value);
        document.replace_children(node, nodes)
    }
}
