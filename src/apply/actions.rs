use std::time::Duration;

use tracing::{info, warn};

use crate::dom::{Document, DomError, NodeId};
use crate::host::UiEffect;
use crate::markers;
use crate::repeat;
use crate::wire::response::{Effect, Located, Location, RepeatIndexChange};

use super::{require, ApplyContext, ApplyError, ApplyOutcome, DomContext, ServerEventsRequest};

pub(super) fn apply_effects(ctx: &mut ApplyContext<'_>, effects: &[Located<Effect>], outcome: &mut ApplyOutcome) {
    for effect in effects {
        if let Err(err) = apply_effect(ctx, &effect.item, effect.at, outcome) {
            warn!(target: "apply", form = ctx.form, error = %err, "action failed");
            outcome.errors.push(err);
        }
    }
}

fn apply_effect(
    ctx: &mut ApplyContext<'_>,
    effect: &Effect,
    at: Location,
    outcome: &mut ApplyOutcome,
) -> Result<(), ApplyError> {
    match effect {
        Effect::Div {
            id,
            visible,
            neighbor,
        } => toggle_div(ctx, id, *visible, neighbor.as_deref(), at),
        Effect::RepeatIndexes(changes) => {
            for change in changes {
                move_repeat_index(ctx, change).during("repeat-index", at)?;
            }
            Ok(())
        }
        Effect::ServerEvents {
            payload,
            delay_ms,
            discardable,
        } => {
            outcome.server_events.push(ServerEventsRequest {
                payload: payload.clone(),
                delay: delay_ms.filter(|ms| *ms > 0).map(Duration::from_millis),
                discardable: *discardable,
            });
            Ok(())
        }
        Effect::Submission {
            action,
            method,
            replace,
            target,
            show_progress,
        } => {
            let background = replace != "all";
            if !background && *show_progress {
                outcome.navigation_pending = true;
            }
            ctx.host.perform(UiEffect::Submit {
                form: ctx.form.to_string(),
                action: action.clone(),
                method: method.clone(),
                target: target.clone(),
                background,
            });
            Ok(())
        }
        Effect::Load {
            resource,
            show,
            target,
            show_progress,
        } => {
            let new_window = show == "new";
            if !new_window && target.is_none() && *show_progress {
                outcome.navigation_pending = true;
            }
            ctx.host.perform(UiEffect::Navigate {
                url: resource.clone(),
                target: target.clone(),
                new_window,
            });
            Ok(())
        }
        Effect::SetFocus { control_id } => {
            require(ctx.document, control_id, "setfocus", at)?;
            outcome.focused = Some(control_id.clone());
            ctx.host.perform(UiEffect::Focus {
                control_id: control_id.clone(),
            });
            Ok(())
        }
        Effect::Script {
            name,
            target_id,
            observer_id,
        } => {
            ctx.host.perform(UiEffect::RunScript {
                name: name.clone(),
                target_id: target_id.clone(),
                observer_id: observer_id.clone(),
            });
            Ok(())
        }
        Effect::Help { control_id } => {
            require(ctx.document, control_id, "help", at)?;
            let text = ctx
                .registry
                .meta(control_id)
                .and_then(|meta| meta.help.clone())
                .or_else(|| {
                    crate::controls::decoration(ctx.document, control_id, markers::HELP)
                        .map(|help| ctx.document.text_content(help))
                });
            ctx.host.perform(UiEffect::ShowHelp {
                control_id: control_id.clone(),
                text,
            });
            Ok(())
        }
        Effect::Message { level, text } => {
            ctx.host.perform(UiEffect::ShowMessage {
                level: level.clone(),
                text: text.clone(),
            });
            Ok(())
        }
        Effect::Offline => {
            info!(target: "apply", form = ctx.form, "offline instruction ignored");
            Ok(())
        }
    }
}

/// Show or hide a switch case, or a dialog when `id` names one.
fn toggle_div(
    ctx: &mut ApplyContext<'_>,
    id: &str,
    visible: bool,
    neighbor: Option<&str>,
    at: Location,
) -> Result<(), ApplyError> {
    if ctx.dialogs.contains(id) {
        ctx.host.perform(if visible {
            UiEffect::ShowDialog {
                dialog_id: id.to_string(),
                neighbor: neighbor.map(str::to_string),
            }
        } else {
            UiEffect::HideDialog {
                dialog_id: id.to_string(),
            }
        });
        return Ok(());
    }

    let begin_id = format!("{}{id}", markers::CASE_BEGIN_PREFIX);
    let Some(begin) = ctx.document.get_element_by_id(&begin_id) else {
        let case = require(ctx.document, id, "div", at)?;
        return set_case_classes(ctx.document, case, visible).during("div", at);
    };
    let end_id = format!("{}{id}", markers::CASE_END_PREFIX);
    let mut current = Some(begin);
    while let Some(node) = current {
        if ctx.document.is_element(node) {
            set_case_classes(ctx.document, node, visible).during("div", at)?;
        }
        if ctx.document.id_of(node) == Some(end_id.as_str()) {
            return Ok(());
        }
        current = ctx.document.next_sibling(node);
    }
    Err(ApplyError::MissingElement {
        instruction: "div",
        id: end_id,
        at,
    })
}

fn set_case_classes(document: &mut Document, node: NodeId, visible: bool) -> Result<(), DomError> {
    document.toggle_class(node, markers::CASE_SELECTED, visible)?;
    document.toggle_class(node, markers::CASE_DESELECTED, !visible)
}

/// Record the new index and move the selection highlight to the new iteration.
fn move_repeat_index(ctx: &mut ApplyContext<'_>, change: &RepeatIndexChange) -> Result<(), DomError> {
    let (repeat_id, explicit_parents) = repeat::split_suffix(&change.id);
    let parents = if explicit_parents.is_empty() {
        ctx.topology.current_parent_indexes(repeat_id)
    } else {
        explicit_parents
    };
    let class = format!(
        "{}{}",
        markers::REPEAT_SELECTED_PREFIX,
        ctx.topology.depth(repeat_id) % 4 + 1
    );
    if change.old_index > 0 {
        for node in repeat::iteration_nodes(ctx.document, repeat_id, &parents, change.old_index) {
            if ctx.document.is_element(node) {
                ctx.document.remove_class(node, &class)?;
            }
        }
    }
    if change.new_index > 0 {
        for node in repeat::iteration_nodes(ctx.document, repeat_id, &parents, change.new_index) {
            if ctx.document.is_element(node) {
                ctx.document.add_class(node, &class)?;
            }
        }
    }
    ctx.topology.set_index(repeat_id, change.new_index);
    Ok(())
}
