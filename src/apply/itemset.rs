use std::collections::HashSet;

use serde::Deserialize;

use crate::controls::{split_values, ControlKind, SelectAppearance};
use crate::dom::{Document, DomError, NodeId};
use crate::markers;
use crate::wire::response::{ItemsetUpdate, Location};

use super::{require, ApplyContext, ApplyError, DomContext};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Item {
    pub label: String,
    pub value: String,
    #[serde(default)]
    pub children: Vec<Item>,
}

pub(super) fn apply_itemset(
    ctx: &mut ApplyContext<'_>,
    update: &ItemsetUpdate,
    at: Location,
) -> Result<(), ApplyError> {
    const INSTRUCTION: &str = "itemset";
    let items: Vec<Item> = serde_json::from_str(update.json.trim()).map_err(|source| ApplyError::Itemset {
        id: update.id.clone(),
        at,
        source,
    })?;
    let node = require(ctx.document, &update.id, INSTRUCTION, at)?;
    let kind = ctx.registry.kind(ctx.document, &update.id, ctx.widgets);
    let Some(ControlKind::Select {
        multiple,
        appearance,
    }) = kind
    else {
        return Err(ApplyError::NotSelectable {
            id: update.id.clone(),
            at,
        });
    };
    let selected: HashSet<String> = kind_value(ctx, node, multiple, appearance);
    let rebuilt = match appearance {
        SelectAppearance::Minimal | SelectAppearance::Compact => {
            rebuild_options(ctx.document, node, &items, &selected)
        }
        SelectAppearance::Full => rebuild_choices(ctx.document, node, &update.id, multiple, &items, &selected),
        SelectAppearance::Tree => rebuild_tree(ctx.document, node, &items, &selected),
    };
    rebuilt.during(INSTRUCTION, at)
}

fn kind_value(
    ctx: &ApplyContext<'_>,
    node: NodeId,
    multiple: bool,
    appearance: SelectAppearance,
) -> HashSet<String> {
    let kind = ControlKind::Select {
        multiple,
        appearance,
    };
    let current = kind.value(ctx.document, node, ctx.widgets);
    split_values(&current, multiple)
        .into_iter()
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn rebuild_options(
    document: &mut Document,
    node: NodeId,
    items: &[Item],
    selected: &HashSet<String>,
) -> Result<(), DomError> {
    let select = if document.tag(node) == Some("select") {
        node
    } else {
        match document.find_descendant(node, |doc, n| doc.tag(n) == Some("select")) {
            Some(select) => select,
            None => {
                let select = document.create_element("select");
                document.append_child(node, select)?;
                select
            }
        }
    };
    document.clear_children(select);
    for item in items {
        if item.children.is_empty() {
            let option = option_element(document, item, selected)?;
            document.append_child(select, option)?;
        } else {
            let group = document.create_element_with("optgroup", &[("label", item.label.as_str())]);
            for child in &item.children {
                let option = option_element(document, child, selected)?;
                document.append_child(group, option)?;
            }
            document.append_child(select, group)?;
        }
    }
    Ok(())
}

fn option_element(document: &mut Document, item: &Item, selected: &HashSet<String>) -> Result<NodeId, DomError> {
    let option = document.create_element_with("option", &[("value", item.value.as_str())]);
    if selected.contains(&item.value) {
        document.set_attr(option, "selected", "selected")?;
    }
    document.set_text_content(option, &item.label)?;
    Ok(option)
}

fn rebuild_choices(
    document: &mut Document,
    node: NodeId,
    control_id: &str,
    multiple: bool,
    items: &[Item],
    selected: &HashSet<String>,
) -> Result<(), DomError> {
    let old = document.find_descendants(node, |doc, n| doc.has_class(n, markers::ITEM));
    for item in old {
        document.detach(item);
    }
    let reference = document
        .children(node)
        .iter()
        .copied()
        .find(|child| document.has_class(*child, markers::ALERT));
    let input_type = if multiple { "checkbox" } else { "radio" };
    for item in flatten(items) {
        let wrapper = document.create_element_with("span", &[("class", markers::ITEM)]);
        let input = document.create_element_with(
            "input",
            &[("type", input_type), ("name", control_id), ("value", item.value.as_str())],
        );
        if selected.contains(&item.value) {
            document.set_attr(input, "checked", "checked")?;
        }
        let label = document.create_element("label");
        document.set_text_content(label, &item.label)?;
        document.append_child(wrapper, input)?;
        document.append_child(wrapper, label)?;
        document.insert_before(node, wrapper, reference)?;
    }
    Ok(())
}

fn flatten(items: &[Item]) -> Vec<&Item> {
    let mut out = Vec::new();
    for item in items {
        out.push(item);
        out.extend(flatten(&item.children));
    }
    out
}

fn rebuild_tree(
    document: &mut Document,
    node: NodeId,
    items: &[Item],
    selected: &HashSet<String>,
) -> Result<(), DomError> {
    let expanded: HashSet<String> = document
        .find_descendants(node, |doc, n| doc.has_class(n, markers::TREE_EXPANDED))
        .into_iter()
        .filter_map(|item| document.attr(item, "data-value").map(str::to_string))
        .collect();
    let old_lists: Vec<NodeId> = document
        .children(node)
        .iter()
        .copied()
        .filter(|child| document.tag(*child) == Some("ul"))
        .collect();
    for list in old_lists {
        document.detach(list);
    }
    let list = tree_list(document, items, selected, &expanded)?;
    document.append_child(node, list)
}

fn tree_list(
    document: &mut Document,
    items: &[Item],
    selected: &HashSet<String>,
    expanded: &HashSet<String>,
) -> Result<NodeId, DomError> {
    let list = document.create_element("ul");
    for item in items {
        let li = document.create_element_with("li", &[("class", markers::TREE_ITEM), ("data-value", item.value.as_str())]);
        document.toggle_class(li, markers::TREE_SELECTED, selected.contains(&item.value))?;
        document.toggle_class(li, markers::TREE_EXPANDED, expanded.contains(&item.value))?;
        let label = document.create_element("span");
        document.set_text_content(label, &item.label)?;
        document.append_child(li, label)?;
        if !item.children.is_empty() {
            let children = tree_list(document, &item.children, selected, expanded)?;
            document.append_child(li, children)?;
        }
        document.append_child(list, li)?;
    }
    Ok(list)
}
