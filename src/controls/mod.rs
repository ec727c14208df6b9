//! Control kinds, their value handlers and the per-form control registry.
//!
//! A control's kind is decided once from its marker classes when it is first
//! indexed. Everything that reads or writes a control afterwards goes through
//! the matching [`ControlKind`] arm instead of re-inspecting classes.

mod registry;
mod value;
mod widget;

pub use registry::{ControlMeta, ControlRegistry};
pub(crate) use value::split_values;
pub use value::{interactive_nodes, migrate_to_interactive, migrate_to_static, rebuild_for_type};
pub use widget::{HtmlAreaWidget, Widget, WidgetRegistry};

use crate::dom::{Document, NodeId};
use crate::markers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputType {
    String,
    Date,
    Time,
    DateTime,
    Boolean,
}

impl InputType {
    /// Map a schema type name (`xs:date`, `{http://www.w3.org/2001/XMLSchema}date`, `date`)
    /// to the input representation that renders it.
    pub fn from_type_name(name: &str) -> Self {
        let local = name
            .rsplit(|c| c == '}' || c == ':')
            .next()
            .unwrap_or(name)
            .trim();
        match local {
            "date" => InputType::Date,
            "time" => InputType::Time,
            "dateTime" => InputType::DateTime,
            "boolean" => InputType::Boolean,
            _ => InputType::String,
        }
    }

    pub fn class(self) -> &'static str {
        match self {
            InputType::String => "xforms-type-string",
            InputType::Date => "xforms-type-date",
            InputType::Time => "xforms-type-time",
            InputType::DateTime => "xforms-type-dateTime",
            InputType::Boolean => "xforms-type-boolean",
        }
    }

    fn from_classes(document: &Document, node: NodeId) -> Self {
        [
            InputType::Date,
            InputType::Time,
            InputType::DateTime,
            InputType::Boolean,
        ]
        .into_iter()
        .find(|ty| document.has_class(node, ty.class()))
        .unwrap_or(InputType::String)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectAppearance {
    /// Drop-down `<select>`.
    Minimal,
    /// List box `<select size>`.
    Compact,
    /// Checkbox or radio list.
    Full,
    /// Nested `<ul>` tree.
    Tree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Group,
    Switch,
    Case,
    Dialog,
    Repeat,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Input(InputType),
    Secret,
    Textarea,
    Output,
    Range,
    Upload,
    Trigger,
    Select {
        multiple: bool,
        appearance: SelectAppearance,
    },
    /// Value handled by an external widget registered under this class.
    Widget(String),
    Container(ContainerKind),
}

impl ControlKind {
    /// Classify `node` from its marker classes. Returns `None` for elements that
    /// are not controls.
    pub fn classify(document: &Document, node: NodeId, widgets: &WidgetRegistry) -> Option<Self> {
        if !document.is_element(node) {
            return None;
        }
        if let Some(key) = document.classes(node).find(|class| widgets.contains(class)) {
            return Some(ControlKind::Widget(key.to_string()));
        }
        let has = |class: &str| document.has_class(node, class);

        let kind = if has(markers::DIALOG) {
            ControlKind::Container(ContainerKind::Dialog)
        } else if has("xforms-group") {
            ControlKind::Container(ContainerKind::Group)
        } else if has("xforms-switch") {
            ControlKind::Container(ContainerKind::Switch)
        } else if has("xforms-case") {
            ControlKind::Container(ContainerKind::Case)
        } else if has("xforms-repeat") {
            ControlKind::Container(ContainerKind::Repeat)
        } else if has("xforms-upload") {
            ControlKind::Upload
        } else if has("xforms-trigger") || has("xforms-submit") {
            ControlKind::Trigger
        } else if has("xforms-textarea") {
            ControlKind::Textarea
        } else if has("xforms-secret") {
            ControlKind::Secret
        } else if has("xforms-output") {
            ControlKind::Output
        } else if has("xforms-range") {
            ControlKind::Range
        } else if has("xforms-select1") || has("xforms-select") {
            let multiple = has("xforms-select");
            let prefix = if multiple {
                "xforms-select-appearance-"
            } else {
                "xforms-select1-appearance-"
            };
            let appearance = if has(format!("{prefix}full").as_str()) {
                SelectAppearance::Full
            } else if has(format!("{prefix}xxforms-tree").as_str()) {
                SelectAppearance::Tree
            } else if has(format!("{prefix}compact").as_str()) {
                SelectAppearance::Compact
            } else {
                SelectAppearance::Minimal
            };
            ControlKind::Select {
                multiple,
                appearance,
            }
        } else if has("xforms-input") {
            ControlKind::Input(InputType::from_classes(document, node))
        } else if has(markers::CONTROL) {
            ControlKind::Output
        } else {
            return None;
        };
        Some(kind)
    }

    /// Leaf controls carry a value; containers only carry properties.
    pub fn is_leaf(&self) -> bool {
        !matches!(self, ControlKind::Container(_))
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, ControlKind::Upload)
    }

    pub fn is_dialog(&self) -> bool {
        matches!(self, ControlKind::Container(ContainerKind::Dialog))
    }

    pub fn value(&self, document: &Document, node: NodeId, widgets: &WidgetRegistry) -> String {
        value::current_value(self, document, node, widgets)
    }

    pub fn set_value(
        &self,
        document: &mut Document,
        node: NodeId,
        new_value: &str,
        widgets: &WidgetRegistry,
    ) -> Result<(), crate::dom::DomError> {
        value::set_current_value(self, document, node, new_value, widgets)
    }

    pub fn set_readonly(
        &self,
        document: &mut Document,
        node: NodeId,
        readonly: bool,
    ) -> Result<(), crate::dom::DomError> {
        value::set_readonly(document, node, readonly)
    }
}

/// Find the label, hint, help or alert element that decorates `control_id`.
///
/// Decorations are siblings of the control pointing back at it with `for`;
/// children of the control carrying the class are accepted as well.
pub fn decoration(document: &Document, control_id: &str, class: &str) -> Option<NodeId> {
    let control = document.get_element_by_id(control_id)?;
    let matches = |node: NodeId| {
        document.has_class(node, class)
            && document
                .attr(node, "for")
                .map_or(true, |target| target == control_id)
    };
    if let Some(parent) = document.parent(control) {
        if let Some(found) = document
            .children(parent)
            .iter()
            .copied()
            .filter(|sibling| *sibling != control)
            .find(|sibling| matches(*sibling) && document.attr(*sibling, "for").is_some())
        {
            return Some(found);
        }
    }
    document
        .children(control)
        .iter()
        .copied()
        .find(|child| matches(*child))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    fn classify(html: &str, id: &str) -> Option<ControlKind> {
        let doc = parse_html(html);
        let node = doc.get_element_by_id(id).expect("node present");
        ControlKind::classify(&doc, node, &WidgetRegistry::default())
    }

    #[test]
    fn type_names_map_to_inputs() {
        assert_eq!(InputType::from_type_name("xs:date"), InputType::Date);
        assert_eq!(
            InputType::from_type_name("{http://www.w3.org/2001/XMLSchema}dateTime"),
            InputType::DateTime
        );
        assert_eq!(InputType::from_type_name("boolean"), InputType::Boolean);
        assert_eq!(InputType::from_type_name("xs:string"), InputType::String);
    }

    #[test]
    fn classifies_controls_once_from_classes() {
        assert_eq!(
            classify(
                r#"<span id="a" class="xforms-control xforms-input xforms-type-date"></span>"#,
                "a"
            ),
            Some(ControlKind::Input(InputType::Date))
        );
        assert_eq!(
            classify(
                r#"<span id="s" class="xforms-control xforms-select1 xforms-select1-appearance-full"></span>"#,
                "s"
            ),
            Some(ControlKind::Select {
                multiple: false,
                appearance: SelectAppearance::Full
            })
        );
        assert_eq!(
            classify(r#"<div id="d" class="xforms-dialog"></div>"#, "d"),
            Some(ControlKind::Container(ContainerKind::Dialog))
        );
        assert_eq!(classify(r#"<div id="x" class="plain"></div>"#, "x"), None);
    }

    #[test]
    fn registered_widget_wins() {
        let doc = parse_html(
            r#"<span id="rt" class="xforms-control xforms-textarea xforms-mediatype-text-html"></span>"#,
        );
        let mut widgets = WidgetRegistry::default();
        widgets.register(markers::HTML_AREA, Box::new(HtmlAreaWidget));
        let node = doc.get_element_by_id("rt").unwrap();
        assert_eq!(
            ControlKind::classify(&doc, node, &widgets),
            Some(ControlKind::Widget(markers::HTML_AREA.to_string()))
        );
    }

    #[test]
    fn finds_sibling_decorations() {
        let doc = parse_html(
            r#"<div><label class="xforms-label" for="c">Name</label><span id="c" class="xforms-control xforms-input"></span><span class="xforms-alert" for="c">!</span></div>"#,
        );
        let label = decoration(&doc, "c", markers::LABEL).expect("label");
        assert_eq!(doc.text_content(label), "Name");
        assert!(decoration(&doc, "c", markers::ALERT).is_some());
        assert!(decoration(&doc, "c", markers::HINT).is_none());
    }
}
