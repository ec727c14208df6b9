//! Everything the engine keeps per form.

use std::collections::HashSet;

use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

use crate::controls::{ControlRegistry, WidgetRegistry};
use crate::dispatch::Dispatcher;
use crate::dom::{Document, NodeId};
use crate::indicator::ProgressIndicator;
use crate::markers;
use crate::repeat::RepeatTopology;
use crate::wire::StateTokens;

/// The request currently on the wire for a form, if any.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestState {
    pub in_progress: bool,
    /// Body resent on retries.
    pub last_body: Option<String>,
    /// Every event of the batch asked for silent failure.
    pub ignore_errors: bool,
    pub show_progress: bool,
}

/// A server-events request the server asked to send later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedServerEvents {
    pub due: Instant,
    pub payload: String,
    pub discardable: bool,
}

#[derive(Debug)]
pub struct SessionState {
    pub form_id: String,
    pub dispatcher: Dispatcher,
    pub request: RequestState,
    pub tokens: StateTokens,
    pub registry: ControlRegistry,
    pub topology: RepeatTopology,
    pub dialogs: HashSet<String>,
    pub indicator: ProgressIndicator,
    pub delayed: Vec<DelayedServerEvents>,
    pub next_heartbeat: Option<Instant>,
    /// Control focused by the server; its next focus-in is not relayed.
    pub focus_mask: Option<String>,
}

impl SessionState {
    /// Read tokens, repeat topology, dialogs and controls from a loaded form.
    pub fn discover(document: &Document, form_id: &str, form: NodeId, widgets: &WidgetRegistry) -> Self {
        let field = |name: &str| hidden_field(document, form, name).unwrap_or_default();
        let dynamic_state = field(markers::DYNAMIC_STATE_FIELD);
        let tokens = StateTokens {
            static_state: field(markers::STATIC_STATE_FIELD),
            initial_dynamic_state: Some(dynamic_state.clone()),
            dynamic_state,
        };
        let topology = RepeatTopology::parse(
            &field(markers::REPEAT_TREE_FIELD),
            &field(markers::REPEAT_INDEXES_FIELD),
        );
        let dialogs = document
            .find_descendants(form, |doc, n| doc.has_class(n, markers::DIALOG))
            .into_iter()
            .filter_map(|n| document.id_of(n).map(str::to_string))
            .collect::<HashSet<_>>();
        let mut registry = ControlRegistry::new();
        let controls = registry.index(document, form, widgets);
        info!(
            target: "engine",
            form = form_id,
            controls,
            dialogs = dialogs.len(),
            "form discovered"
        );
        Self {
            form_id: form_id.to_string(),
            dispatcher: Dispatcher::new(),
            request: RequestState::default(),
            tokens,
            registry,
            topology,
            dialogs,
            indicator: ProgressIndicator::default(),
            delayed: Vec::new(),
            next_heartbeat: None,
            focus_mask: None,
        }
    }

    /// Drop timers of server-events the server marked discardable.
    pub fn discard_delayed(&mut self) {
        self.delayed.retain(|delayed| !delayed.discardable);
    }

    pub fn take_due(&mut self, now: Instant) -> Vec<DelayedServerEvents> {
        let (due, later) = std::mem::take(&mut self.delayed)
            .into_iter()
            .partition(|delayed| delayed.due <= now);
        self.delayed = later;
        due
    }
}

fn hidden_field(document: &Document, form: NodeId, name: &str) -> Option<String> {
    let input = document.find_descendant(form, |doc, n| {
        doc.tag(n) == Some("input") && doc.attr(n, "name") == Some(name)
    })?;
    document.attr(input, "value").map(str::to_string)
}
