//! Application of a parsed response onto the live document.
//!
//! Order is fixed: state tokens, then per action block the repeat edits,
//! itemsets, control patches and content updates, then the block's top-level
//! effects. A failure before the effects stops the remaining structural work;
//! a failing effect is recorded and the next effect still runs.

mod actions;
mod control;
mod itemset;
mod repeat;

pub use itemset::Item;

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::controls::{ControlRegistry, WidgetRegistry};
use crate::dom::{Document, DomError};
use crate::host::Host;
use crate::repeat::RepeatTopology;
use crate::wire::response::{Action, EventResponse, Location};
use crate::wire::{ResponseError, StateTokens};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("malformed instruction: {0}")]
    Malformed(#[from] ResponseError),
    #[error("{instruction} at {at}: no element with id '{id}'")]
    MissingElement {
        instruction: &'static str,
        id: String,
        at: Location,
    },
    #[error("{instruction} at {at}: {source}")]
    Dom {
        instruction: &'static str,
        at: Location,
        #[source]
        source: DomError,
    },
    #[error("itemset for '{id}' at {at} is invalid: {source}")]
    Itemset {
        id: String,
        at: Location,
        #[source]
        source: serde_json::Error,
    },
    #[error("itemset at {at} targets '{id}', which is not a selection control")]
    NotSelectable { id: String, at: Location },
    #[error("repeat '{repeat_id}' at {at} has no template")]
    MissingTemplate { repeat_id: String, at: Location },
}

impl ApplyError {
    pub fn location(&self) -> Option<Location> {
        match self {
            ApplyError::Malformed(_) => None,
            ApplyError::MissingElement { at, .. }
            | ApplyError::Dom { at, .. }
            | ApplyError::Itemset { at, .. }
            | ApplyError::NotSelectable { at, .. }
            | ApplyError::MissingTemplate { at, .. } => Some(*at),
        }
    }
}

trait DomContext<T> {
    fn during(self, instruction: &'static str, at: Location) -> Result<T, ApplyError>;
}

impl<T> DomContext<T> for Result<T, DomError> {
    fn during(self, instruction: &'static str, at: Location) -> Result<T, ApplyError> {
        self.map_err(|source| ApplyError::Dom {
            instruction,
            at,
            source,
        })
    }
}

fn require(document: &Document, id: &str, instruction: &'static str, at: Location) -> Result<crate::dom::NodeId, ApplyError> {
    document
        .get_element_by_id(id)
        .ok_or_else(|| ApplyError::MissingElement {
            instruction,
            id: id.to_string(),
            at,
        })
}

/// Everything a response may touch for one form.
pub struct ApplyContext<'a> {
    pub form: &'a str,
    pub document: &'a mut Document,
    pub registry: &'a mut ControlRegistry,
    pub topology: &'a mut RepeatTopology,
    pub dialogs: &'a HashSet<String>,
    pub widgets: &'a WidgetRegistry,
    pub host: &'a mut dyn Host,
}

/// Follow-up request asked for by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEventsRequest {
    pub payload: String,
    pub delay: Option<Duration>,
    pub discardable: bool,
}

#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub server_events: Vec<ServerEventsRequest>,
    /// Control the server moved focus to.
    pub focused: Option<String>,
    /// A full-page navigation was started; keep the progress indicator up.
    pub navigation_pending: bool,
    pub errors: Vec<ApplyError>,
}

pub fn apply_response(
    ctx: &mut ApplyContext<'_>,
    response: EventResponse,
    tokens: &mut StateTokens,
) -> ApplyOutcome {
    if let Some(static_state) = response.static_state {
        tokens.static_state = static_state;
    }
    if let Some(dynamic_state) = response.dynamic_state {
        tokens.dynamic_state = dynamic_state;
    }

    let mut outcome = ApplyOutcome::default();
    let action_blocks = match response.actions {
        Ok(action_blocks) => action_blocks,
        Err(err) => {
            outcome.errors.push(err.into());
            return outcome;
        }
    };
    for action in &action_blocks {
        if let Err(err) = apply_structure(ctx, action) {
            warn!(target: "apply", form = ctx.form, error = %err, "response application stopped");
            outcome.errors.push(err);
            return outcome;
        }
        actions::apply_effects(ctx, &action.effects, &mut outcome);
    }
    debug!(
        target: "apply",
        form = ctx.form,
        blocks = action_blocks.len(),
        errors = outcome.errors.len(),
        "response applied"
    );
    outcome
}

fn apply_structure(ctx: &mut ApplyContext<'_>, action: &Action) -> Result<(), ApplyError> {
    for edit in &action.edits {
        repeat::apply_edit(ctx, &edit.item, edit.at)?;
    }
    let mut rebuilt = HashSet::new();
    for itemset in &action.itemsets {
        itemset::apply_itemset(ctx, &itemset.item, itemset.at)?;
        rebuilt.insert(itemset.item.id.as_str());
    }
    for patch in &action.controls {
        control::apply_patch(ctx, &patch.item, rebuilt.contains(patch.item.id.as_str()), patch.at)?;
    }
    for update in &action.content {
        control::apply_content(ctx, &update.item, update.at)?;
    }
    Ok(())
}
