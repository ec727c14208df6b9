use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::markers;
use crate::repeat::{self, boundary, Boundary};
use crate::wire::response::{Location, StructuralEdit};

use super::{require, ApplyContext, ApplyError, DomContext};

pub(super) fn apply_edit(
    ctx: &mut ApplyContext<'_>,
    edit: &StructuralEdit,
    at: Location,
) -> Result<(), ApplyError> {
    match edit {
        StructuralEdit::CopyTemplate {
            repeat_id,
            parent_indexes,
            start,
            end,
        } => copy_template(ctx, repeat_id, parent_indexes, *start, *end, at),
        StructuralEdit::DeleteIterations {
            repeat_id,
            parent_indexes,
            count,
        } => delete_iterations(ctx, repeat_id, parent_indexes, *count, at),
    }
}

/// Template nodes sit between the last delimiter and the unsuffixed end marker.
fn template_nodes(document: &Document, template_end: NodeId) -> Option<(NodeId, Vec<NodeId>)> {
    let delimiter = repeat::last_delimiter_before(document, template_end)?;
    let mut nodes = Vec::new();
    let mut current = document.next_sibling(delimiter);
    while let Some(node) = current {
        if node == template_end {
            break;
        }
        nodes.push(node);
        current = document.next_sibling(node);
    }
    Some((delimiter, nodes))
}

fn copy_template(
    ctx: &mut ApplyContext<'_>,
    repeat_id: &str,
    parent_indexes: &[u32],
    start: u32,
    end: u32,
    at: Location,
) -> Result<(), ApplyError> {
    const INSTRUCTION: &str = "copy-repeat-template";
    let template_end = require(ctx.document, &repeat::end_marker(repeat_id, &[]), INSTRUCTION, at)?;
    let (template_delimiter, template) =
        template_nodes(ctx.document, template_end).ok_or_else(|| ApplyError::MissingTemplate {
            repeat_id: repeat_id.to_string(),
            at,
        })?;
    let insertion_point = if parent_indexes.is_empty() {
        template_delimiter
    } else {
        require(
            ctx.document,
            &repeat::end_marker(repeat_id, parent_indexes),
            INSTRUCTION,
            at,
        )?
    };
    let Some(parent) = ctx.document.parent(insertion_point) else {
        return Err(ApplyError::MissingElement {
            instruction: INSTRUCTION,
            id: repeat::end_marker(repeat_id, parent_indexes),
            at,
        });
    };

    for iteration in start..=end {
        let mut path = parent_indexes.to_vec();
        path.push(iteration);
        let delimiter = ctx
            .document
            .create_element_with("span", &[("class", markers::REPEAT_DELIMITER)]);
        ctx.document
            .insert_before(parent, delimiter, Some(insertion_point))
            .during(INSTRUCTION, at)?;
        for node in &template {
            let copy = ctx.document.clone_subtree(*node);
            prepare_copy(ctx.document, copy, &path).during(INSTRUCTION, at)?;
            ctx.document
                .insert_before(parent, copy, Some(insertion_point))
                .during(INSTRUCTION, at)?;
            ctx.registry.index(ctx.document, copy, ctx.widgets);
        }
    }
    debug!(target: "apply", repeat_id, start, end, "repeat template copied");
    Ok(())
}

/// Turn a detached template copy into an iteration: drop the template marker,
/// remove nested templates and suffix every `id` and `for`.
fn prepare_copy(document: &mut Document, copy: NodeId, path: &[u32]) -> Result<(), crate::dom::DomError> {
    if document.is_element(copy) {
        document.remove_class(copy, markers::REPEAT_TEMPLATE)?;
    }
    let nested_templates = document.find_descendants(copy, |doc, n| doc.has_class(n, markers::REPEAT_TEMPLATE));
    for nested in nested_templates {
        document.detach(nested);
    }
    let dangling = document.find_descendants(copy, |doc, n| {
        boundary(doc, n) == Boundary::Delimiter
            && doc
                .next_sibling(n)
                .map_or(true, |next| boundary(doc, next) == Boundary::End)
    });
    for delimiter in dangling {
        document.detach(delimiter);
    }
    let suffix = repeat::suffix(path);
    for node in document.descendants(copy) {
        for attribute in ["id", "for"] {
            if let Some(value) = document.attr(node, attribute).map(str::to_string) {
                document.set_attr(node, attribute, &format!("{value}{suffix}"))?;
            }
        }
    }
    Ok(())
}

fn delete_iterations(
    ctx: &mut ApplyContext<'_>,
    repeat_id: &str,
    parent_indexes: &[u32],
    count: u32,
    at: Location,
) -> Result<(), ApplyError> {
    const INSTRUCTION: &str = "delete-repeat-elements";
    let end_marker = require(
        ctx.document,
        &repeat::end_marker(repeat_id, parent_indexes),
        INSTRUCTION,
        at,
    )?;
    let last = if parent_indexes.is_empty() {
        let template_delimiter = repeat::last_delimiter_before(ctx.document, end_marker).ok_or_else(|| {
            ApplyError::MissingTemplate {
                repeat_id: repeat_id.to_string(),
                at,
            }
        })?;
        ctx.document.previous_sibling(template_delimiter)
    } else {
        ctx.document.previous_sibling(end_marker)
    };

    let mut current = last;
    let mut removed = Vec::new();
    for _ in 0..count {
        let mut depth = 0usize;
        while let Some(node) = current {
            let kind = boundary(ctx.document, node);
            match kind {
                Boundary::End => depth += 1,
                Boundary::Begin => depth = depth.saturating_sub(1),
                _ => {}
            }
            if kind == Boundary::Begin && depth == 0 && ctx.document.id_of(node).map_or(false, |id| {
                id == repeat::begin_marker(repeat_id, parent_indexes)
            }) {
                current = None;
                break;
            }
            current = ctx.document.previous_sibling(node);
            removed.push(node);
            if kind == Boundary::Delimiter && depth == 0 {
                break;
            }
        }
    }

    for node in removed {
        for descendant in ctx.document.descendants(node) {
            if let Some(id) = ctx.document.id_of(descendant) {
                let id = id.to_string();
                ctx.registry.forget(&id);
            }
        }
        ctx.document.detach(node);
    }
    debug!(target: "apply", repeat_id, count, "repeat iterations deleted");
    Ok(())
}
