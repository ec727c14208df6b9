//! Semantic events relayed to the server.
//!
//! An [`Event`] is built from an [`EventInit`] against the live document. The
//! only thing construction looks up is the owning form, found by walking up
//! from the target to the nearest form container.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dom::{Document, NodeId};
use crate::markers;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event {kind} has no form: target {target:?} is not inside a form")]
    Unroutable { kind: String, target: Option<String> },
    #[error("form element for {0} has no id")]
    AnonymousForm(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    ValueChange,
    Activate,
    FocusIn,
    FocusOut,
    Heartbeat,
    DialogClose,
    /// Payload of a server-scheduled follow-up request.
    ServerEvents,
    /// Asks the server for a full resynchronization.
    AllEventsRequired,
    Offline,
    Online,
    Custom(String),
}

impl EventKind {
    /// Name carried in the `name` attribute of the wire event.
    pub fn wire_name(&self) -> &str {
        match self {
            EventKind::ValueChange => "xxforms-value-change-with-focus-change",
            EventKind::Activate => "DOMActivate",
            EventKind::FocusIn => "DOMFocusIn",
            EventKind::FocusOut => "DOMFocusOut",
            EventKind::Heartbeat => "xxforms-session-heartbeat",
            EventKind::DialogClose => "xxforms-dialog-close",
            EventKind::ServerEvents => "xxforms-server-events",
            EventKind::AllEventsRequired => "xxforms-all-events-required",
            EventKind::Offline => "xxforms-offline",
            EventKind::Online => "xxforms-online",
            EventKind::Custom(name) => name,
        }
    }

    /// Accepts both wire names and the short names used in scripts
    /// (`value-change`, `activate`, `focus-in`, ...). Anything else is custom.
    pub fn from_name(name: &str) -> Self {
        match name {
            "value-change" | "xxforms-value-change-with-focus-change" => EventKind::ValueChange,
            "activate" | "DOMActivate" => EventKind::Activate,
            "focus-in" | "DOMFocusIn" => EventKind::FocusIn,
            "focus-out" | "DOMFocusOut" => EventKind::FocusOut,
            "heartbeat" | "xxforms-session-heartbeat" => EventKind::Heartbeat,
            "dialog-close" | "xxforms-dialog-close" => EventKind::DialogClose,
            "server-events" | "xxforms-server-events" => EventKind::ServerEvents,
            "all-events-required" | "xxforms-all-events-required" => EventKind::AllEventsRequired,
            "offline" | "xxforms-offline" => EventKind::Offline,
            "online" | "xxforms-online" => EventKind::Online,
            other => EventKind::Custom(other.to_string()),
        }
    }

    /// Whether a batch holding this event must carry the initial dynamic state.
    pub fn needs_initial_state(&self) -> bool {
        matches!(self, EventKind::AllEventsRequired | EventKind::Offline)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        EventKind::from_name(&name)
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.wire_name().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub form: String,
    pub target_id: Option<String>,
    pub other_id: Option<String>,
    pub value: Option<String>,
    pub kind: EventKind,
    pub bubbles: Option<bool>,
    pub cancelable: Option<bool>,
    pub ignore_errors: bool,
    pub show_progress: bool,
    pub progress_message: Option<String>,
    pub additional_attributes: Vec<(String, String)>,
}

impl Event {
    pub fn is_value_change(&self) -> bool {
        self.kind == EventKind::ValueChange
    }
}

/// Event description before its form has been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInit {
    #[serde(rename = "name")]
    pub kind: EventKind,
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default, rename = "target")]
    pub target_id: Option<String>,
    #[serde(default, rename = "other")]
    pub other_id: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub bubbles: Option<bool>,
    #[serde(default)]
    pub cancelable: Option<bool>,
    #[serde(default)]
    pub ignore_errors: bool,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
    #[serde(default)]
    pub progress_message: Option<String>,
    #[serde(default, rename = "attributes")]
    pub additional_attributes: Vec<(String, String)>,
}

fn default_show_progress() -> bool {
    true
}

impl EventInit {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            form: None,
            target_id: None,
            other_id: None,
            value: None,
            bubbles: None,
            cancelable: None,
            ignore_errors: false,
            show_progress: true,
            progress_message: None,
            additional_attributes: Vec::new(),
        }
    }

    pub fn value_change(target: &str, value: &str) -> Self {
        Self::new(EventKind::ValueChange).target(target).value(value)
    }

    pub fn activate(target: &str) -> Self {
        Self::new(EventKind::Activate).target(target)
    }

    pub fn target(mut self, id: &str) -> Self {
        self.target_id = Some(id.to_string());
        self
    }

    pub fn form(mut self, id: &str) -> Self {
        self.form = Some(id.to_string());
        self
    }

    pub fn other(mut self, id: &str) -> Self {
        self.other_id = Some(id.to_string());
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn progress_message(mut self, message: &str) -> Self {
        self.progress_message = Some(message.to_string());
        self
    }

    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.additional_attributes
            .push((name.to_string(), value.to_string()));
        self
    }

    /// Resolve the owning form and freeze the event.
    pub fn build(self, document: &Document) -> Result<Event, EventError> {
        let form = match self.form {
            Some(form) => form,
            None => {
                let form_node = enclosing_form(document, self.target_id.as_deref()).ok_or_else(|| {
                    EventError::Unroutable {
                        kind: self.kind.to_string(),
                        target: self.target_id.clone(),
                    }
                })?;
                document
                    .id_of(form_node)
                    .map(str::to_string)
                    .ok_or_else(|| EventError::AnonymousForm(self.target_id.clone().unwrap_or_default()))?
            }
        };
        Ok(Event {
            form,
            target_id: self.target_id,
            other_id: self.other_id,
            value: self.value,
            kind: self.kind,
            bubbles: self.bubbles,
            cancelable: self.cancelable,
            ignore_errors: self.ignore_errors,
            show_progress: self.show_progress,
            progress_message: self.progress_message,
            additional_attributes: self.additional_attributes,
        })
    }
}

pub(crate) fn enclosing_form(document: &Document, target: Option<&str>) -> Option<NodeId> {
    let node = document.get_element_by_id(target?)?;
    std::iter::once(node)
        .chain(document.ancestors(node))
        .find(|ancestor| document.has_class(*ancestor, markers::FORM))
}
