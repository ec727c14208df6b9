use crate::dom::{Document, DomError, NodeId};
use crate::markers;

use super::{ControlKind, InputType, SelectAppearance, WidgetRegistry};

fn self_or_descendant(document: &Document, node: NodeId, tag: &str) -> Option<NodeId> {
    if document.tag(node) == Some(tag) {
        return Some(node);
    }
    document.find_descendant(node, |doc, n| doc.tag(n) == Some(tag))
}

fn input_with_class(document: &Document, node: NodeId, class: &str) -> Option<NodeId> {
    document.find_descendant(node, |doc, n| doc.tag(n) == Some("input") && doc.has_class(n, class))
}

fn static_field(document: &Document, node: NodeId) -> Option<NodeId> {
    document
        .children(node)
        .iter()
        .copied()
        .find(|child| document.has_class(*child, markers::STATIC_FIELD))
}

pub(crate) fn split_values(value: &str, multiple: bool) -> Vec<&str> {
    if multiple {
        value.split_ascii_whitespace().collect()
    } else {
        vec![value]
    }
}

/// Children of a control that make up its interactive representation.
pub fn interactive_nodes(document: &Document, node: NodeId) -> Vec<NodeId> {
    document
        .children(node)
        .iter()
        .copied()
        .filter(|child| {
            !markers::DECORATIONS
                .iter()
                .any(|class| document.has_class(*child, class))
                && !document.has_class(*child, markers::STATIC_FIELD)
        })
        .collect()
}

pub(super) fn current_value(
    kind: &ControlKind,
    document: &Document,
    node: NodeId,
    widgets: &WidgetRegistry,
) -> String {
    if document.has_class(node, markers::STATIC) {
        if let Some(field) = static_field(document, node) {
            return document.text_content(field);
        }
    }
    match kind {
        ControlKind::Input(InputType::Boolean) => {
            let checked = self_or_descendant(document, node, "input")
                .map(|input| document.has_attr(input, "checked"))
                .unwrap_or(false);
            checked.to_string()
        }
        ControlKind::Input(InputType::DateTime) => {
            let part = |class: &str| {
                input_with_class(document, node, class)
                    .and_then(|input| document.attr(input, "value"))
                    .unwrap_or_default()
                    .to_string()
            };
            let date = part("xforms-input-date");
            let time = part("xforms-input-time");
            match (date.is_empty(), time.is_empty()) {
                (true, true) => String::new(),
                (false, true) => date,
                (true, false) => time,
                (false, false) => format!("{date}T{time}"),
            }
        }
        ControlKind::Input(_)
        | ControlKind::Secret
        | ControlKind::Range
        | ControlKind::Upload => self_or_descendant(document, node, "input")
            .and_then(|input| document.attr(input, "value"))
            .unwrap_or_default()
            .to_string(),
        ControlKind::Textarea => self_or_descendant(document, node, "textarea")
            .map(|area| document.text_content(area))
            .unwrap_or_default(),
        ControlKind::Output => document
            .find_descendant(node, |doc, n| doc.has_class(n, markers::OUTPUT_VALUE))
            .map(|inner| document.text_content(inner))
            .unwrap_or_else(|| document.text_content(node)),
        ControlKind::Select {
            appearance: SelectAppearance::Minimal | SelectAppearance::Compact,
            ..
        } => {
            let selected: Vec<&str> = document
                .find_descendants(node, |doc, n| {
                    doc.tag(n) == Some("option") && doc.has_attr(n, "selected")
                })
                .into_iter()
                .filter_map(|option| document.attr(option, "value"))
                .collect();
            selected.join(" ")
        }
        ControlKind::Select {
            appearance: SelectAppearance::Full,
            ..
        } => {
            let checked: Vec<&str> = document
                .find_descendants(node, |doc, n| {
                    doc.tag(n) == Some("input") && doc.has_attr(n, "checked")
                })
                .into_iter()
                .filter_map(|input| document.attr(input, "value"))
                .collect();
            checked.join(" ")
        }
        ControlKind::Select {
            appearance: SelectAppearance::Tree,
            ..
        } => {
            let selected: Vec<&str> = document
                .find_descendants(node, |doc, n| doc.has_class(n, markers::TREE_SELECTED))
                .into_iter()
                .filter_map(|item| document.attr(item, "data-value"))
                .collect();
            selected.join(" ")
        }
        ControlKind::Widget(key) => match widgets.get(key) {
            Some(widget) => widget.current_value(document, node),
            None => document.text_content(node),
        },
        ControlKind::Trigger | ControlKind::Container(_) => String::new(),
    }
}

pub(super) fn set_current_value(
    kind: &ControlKind,
    document: &mut Document,
    node: NodeId,
    new_value: &str,
    widgets: &WidgetRegistry,
) -> Result<(), DomError> {
    if document.has_class(node, markers::STATIC) {
        if let Some(field) = static_field(document, node) {
            document.set_text_content(field, new_value)?;
        }
    }
    match kind {
        ControlKind::Input(InputType::Boolean) => {
            if let Some(input) = self_or_descendant(document, node, "input") {
                if new_value == "true" {
                    document.set_attr(input, "checked", "checked")?;
                } else {
                    document.remove_attr(input, "checked")?;
                }
            }
        }
        ControlKind::Input(InputType::DateTime) => {
            let (date, time) = new_value.split_once('T').unwrap_or((new_value, ""));
            if let Some(input) = input_with_class(document, node, "xforms-input-date") {
                document.set_attr(input, "value", date)?;
            }
            if let Some(input) = input_with_class(document, node, "xforms-input-time") {
                document.set_attr(input, "value", time)?;
            }
        }
        ControlKind::Input(_)
        | ControlKind::Secret
        | ControlKind::Range
        | ControlKind::Upload => {
            if let Some(input) = self_or_descendant(document, node, "input") {
                document.set_attr(input, "value", new_value)?;
            }
        }
        ControlKind::Textarea => {
            if let Some(area) = self_or_descendant(document, node, "textarea") {
                document.set_text_content(area, new_value)?;
            }
        }
        ControlKind::Output => {
            let target = document
                .find_descendant(node, |doc, n| doc.has_class(n, markers::OUTPUT_VALUE))
                .unwrap_or(node);
            document.set_text_content(target, new_value)?;
        }
        ControlKind::Select {
            multiple,
            appearance,
        } => {
            let wanted = split_values(new_value, *multiple);
            let (candidates, flag) = match appearance {
                SelectAppearance::Minimal | SelectAppearance::Compact => (
                    document.find_descendants(node, |doc, n| doc.tag(n) == Some("option")),
                    "selected",
                ),
                SelectAppearance::Full => (
                    document.find_descendants(node, |doc, n| doc.tag(n) == Some("input")),
                    "checked",
                ),
                SelectAppearance::Tree => {
                    let items =
                        document.find_descendants(node, |doc, n| doc.has_class(n, markers::TREE_ITEM));
                    for item in items {
                        let on = document
                            .attr(item, "data-value")
                            .map_or(false, |value| wanted.contains(&value));
                        document.toggle_class(item, markers::TREE_SELECTED, on)?;
                    }
                    return Ok(());
                }
            };
            for candidate in candidates {
                let on = document
                    .attr(candidate, "value")
                    .map_or(false, |value| wanted.contains(&value));
                if on {
                    document.set_attr(candidate, flag, flag)?;
                } else {
                    document.remove_attr(candidate, flag)?;
                }
            }
        }
        ControlKind::Widget(key) => match widgets.get(key) {
            Some(widget) => widget.set_current_value(document, node, new_value, &[])?,
            None => document.set_text_content(node, new_value)?,
        },
        ControlKind::Trigger | ControlKind::Container(_) => {}
    }
    Ok(())
}

pub(super) fn set_readonly(document: &mut Document, node: NodeId, readonly: bool) -> Result<(), DomError> {
    document.toggle_class(node, markers::READONLY, readonly)?;
    let fields = document.find_descendants(node, |doc, n| {
        matches!(doc.tag(n), Some("input" | "textarea" | "select" | "button"))
    });
    let fields = if matches!(document.tag(node), Some("input" | "textarea" | "select" | "button")) {
        let mut all = vec![node];
        all.extend(fields);
        all
    } else {
        fields
    };
    for field in fields {
        if readonly {
            document.set_attr(field, "disabled", "disabled")?;
        } else {
            document.remove_attr(field, "disabled")?;
        }
    }
    Ok(())
}

/// Replace the interactive children of an input with the representation of `ty`,
/// keeping label, hint, help and alert children in place.
pub fn rebuild_for_type(document: &mut Document, node: NodeId, ty: InputType) -> Result<(), DomError> {
    for child in interactive_nodes(document, node) {
        document.detach(child);
    }
    let fresh = match ty {
        InputType::String => vec![document.create_element_with("input", &[("type", "text")])],
        InputType::Date => vec![document.create_element_with(
            "input",
            &[("type", "text"), ("class", "xforms-input-date")],
        )],
        InputType::Time => vec![document.create_element_with(
            "input",
            &[("type", "text"), ("class", "xforms-input-time")],
        )],
        InputType::DateTime => vec![
            document.create_element_with("input", &[("type", "text"), ("class", "xforms-input-date")]),
            document.create_element_with("input", &[("type", "text"), ("class", "xforms-input-time")]),
        ],
        InputType::Boolean => vec![document.create_element_with(
            "input",
            &[("type", "checkbox"), ("value", "true")],
        )],
    };
    for element in fresh {
        document.append_child(node, element)?;
    }
    for other in [
        InputType::String,
        InputType::Date,
        InputType::Time,
        InputType::DateTime,
        InputType::Boolean,
    ] {
        document.toggle_class(node, other.class(), other == ty)?;
    }
    Ok(())
}

/// Show `value` as plain text and hide the interactive representation.
pub fn migrate_to_static(document: &mut Document, node: NodeId, value: &str) -> Result<(), DomError> {
    if document.has_class(node, markers::STATIC) {
        return Ok(());
    }
    for child in interactive_nodes(document, node) {
        if document.is_element(child) {
            document.add_class(child, markers::STATIC_HIDDEN)?;
        }
    }
    let field = document.create_element_with("span", &[("class", markers::STATIC_FIELD)]);
    document.append_child(node, field)?;
    document.set_text_content(field, value)?;
    document.add_class(node, markers::STATIC)
}

/// Undo [`migrate_to_static`].
pub fn migrate_to_interactive(document: &mut Document, node: NodeId) -> Result<(), DomError> {
    if !document.has_class(node, markers::STATIC) {
        return Ok(());
    }
    if let Some(field) = static_field(document, node) {
        document.detach(field);
    }
    for child in interactive_nodes(document, node) {
        if document.is_element(child) {
            document.remove_class(child, markers::STATIC_HIDDEN)?;
        }
    }
    document.remove_class(node, markers::STATIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    fn value_of(doc: &Document, id: &str, kind: &ControlKind) -> String {
        let node = doc.get_element_by_id(id).unwrap();
        current_value(kind, doc, node, &WidgetRegistry::default())
    }

    #[test]
    fn reads_and_writes_text_input() {
        let mut doc = parse_html(
            r#"<span id="c" class="xforms-control xforms-input"><input type="text" value="old"></span>"#,
        );
        let kind = ControlKind::Input(InputType::String);
        assert_eq!(value_of(&doc, "c", &kind), "old");
        let node = doc.get_element_by_id("c").unwrap();
        set_current_value(&kind, &mut doc, node, "new", &WidgetRegistry::default()).unwrap();
        assert_eq!(value_of(&doc, "c", &kind), "new");
    }

    #[test]
    fn select_values_are_space_separated() {
        let mut doc = parse_html(
            r#"<span id="s" class="xforms-control xforms-select"><select multiple><option value="a" selected>A</option><option value="b">B</option><option value="c">C</option></select></span>"#,
        );
        let kind = ControlKind::Select {
            multiple: true,
            appearance: SelectAppearance::Compact,
        };
        assert_eq!(value_of(&doc, "s", &kind), "a");
        let node = doc.get_element_by_id("s").unwrap();
        set_current_value(&kind, &mut doc, node, "b c", &WidgetRegistry::default()).unwrap();
        assert_eq!(value_of(&doc, "s", &kind), "b c");
    }

    #[test]
    fn boolean_uses_checked_flag() {
        let mut doc = parse_html(
            r#"<span id="b" class="xforms-control xforms-input xforms-type-boolean"><input type="checkbox" value="true"></span>"#,
        );
        let kind = ControlKind::Input(InputType::Boolean);
        assert_eq!(value_of(&doc, "b", &kind), "false");
        let node = doc.get_element_by_id("b").unwrap();
        set_current_value(&kind, &mut doc, node, "true", &WidgetRegistry::default()).unwrap();
        assert_eq!(value_of(&doc, "b", &kind), "true");
    }

    #[test]
    fn type_rebuild_keeps_decorations() {
        let mut doc = parse_html(
            r#"<span id="c" class="xforms-control xforms-input"><label class="xforms-label">L</label><input type="text" value="x"></span>"#,
        );
        let node = doc.get_element_by_id("c").unwrap();
        rebuild_for_type(&mut doc, node, InputType::DateTime).unwrap();
        assert!(doc.has_class(node, "xforms-type-dateTime"));
        let kind = ControlKind::Input(InputType::DateTime);
        set_current_value(&kind, &mut doc, node, "2024-01-02T10:00:00", &WidgetRegistry::default())
            .unwrap();
        assert_eq!(value_of(&doc, "c", &kind), "2024-01-02T10:00:00");
        assert_eq!(doc.element_children(node).len(), 3);
    }

    #[test]
    fn static_migration_roundtrip() {
        let mut doc = parse_html(
            r#"<span id="c" class="xforms-control xforms-input"><input type="text" value="x"></span>"#,
        );
        let node = doc.get_element_by_id("c").unwrap();
        let kind = ControlKind::Input(InputType::String);
        migrate_to_static(&mut doc, node, "x").unwrap();
        assert!(doc.has_class(node, markers::STATIC));
        set_current_value(&kind, &mut doc, node, "y", &WidgetRegistry::default()).unwrap();
        assert_eq!(value_of(&doc, "c", &kind), "y");

        migrate_to_interactive(&mut doc, node).unwrap();
        assert!(!doc.has_class(node, markers::STATIC));
        assert_eq!(value_of(&doc, "c", &kind), "y");
    }

    #[test]
    fn readonly_disables_fields() {
        let mut doc = parse_html(
            r#"<span id="c" class="xforms-control xforms-input"><input type="text" value="x"></span>"#,
        );
        let node = doc.get_element_by_id("c").unwrap();
        set_readonly(&mut doc, node, true).unwrap();
        let input = doc.find_descendant(node, |d, n| d.tag(n) == Some("input")).unwrap();
        assert!(doc.has_attr(input, "disabled"));
        assert!(doc.has_class(node, markers::READONLY));
        set_readonly(&mut doc, node, false).unwrap();
        assert!(!doc.has_attr(input, "disabled"));
    }
}
