//! UI side effects requested by the engine.
//!
//! The engine never draws anything itself. Progress indicators, dialogs,
//! navigation and the rest are handed to a [`Host`] as [`UiEffect`]s.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::info;

use crate::error::ErrorReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "kebab-case")]
pub enum UiEffect {
    ShowProgress {
        form: String,
        message: Option<String>,
    },
    HideProgress {
        form: String,
    },
    ShowError(ErrorReport),
    Navigate {
        url: String,
        target: Option<String>,
        new_window: bool,
    },
    Submit {
        form: String,
        action: Option<String>,
        method: String,
        target: Option<String>,
        /// Sent without leaving the page.
        background: bool,
    },
    Focus {
        control_id: String,
    },
    RunScript {
        name: String,
        target_id: Option<String>,
        observer_id: Option<String>,
    },
    ShowHelp {
        control_id: String,
        text: Option<String>,
    },
    ShowMessage {
        level: String,
        text: String,
    },
    ShowDialog {
        dialog_id: String,
        neighbor: Option<String>,
    },
    HideDialog {
        dialog_id: String,
    },
}

pub trait Host: Send {
    fn perform(&mut self, effect: UiEffect);
}

/// Writes every effect to the log.
#[derive(Debug, Default)]
pub struct LoggingHost;

impl Host for LoggingHost {
    fn perform(&mut self, effect: UiEffect) {
        match serde_json::to_string(&effect) {
            Ok(json) => info!(target: "host", "{json}"),
            Err(_) => info!(target: "host", ?effect, "ui effect"),
        }
    }
}

/// Keeps every effect for later inspection. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    effects: Arc<Mutex<Vec<UiEffect>>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effects(&self) -> Vec<UiEffect> {
        self.effects
            .lock()
            .map(|effects| effects.clone())
            .unwrap_or_default()
    }

    pub fn take(&self) -> Vec<UiEffect> {
        self.effects
            .lock()
            .map(|mut effects| std::mem::take(&mut *effects))
            .unwrap_or_default()
    }
}

impl Host for RecordingHost {
    fn perform(&mut self, effect: UiEffect) {
        if let Ok(mut effects) = self.effects.lock() {
            effects.push(effect);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_host_clones_share_effects() {
        let host = RecordingHost::new();
        let mut writer = host.clone();
        writer.perform(UiEffect::Focus {
            control_id: "c1".into(),
        });
        assert_eq!(host.effects().len(), 1);
        assert_eq!(host.take().len(), 1);
        assert!(host.effects().is_empty());
    }

    #[test]
    fn effects_serialize_with_tag() {
        let json = serde_json::to_value(UiEffect::HideDialog {
            dialog_id: "dlg".into(),
        })
        .unwrap();
        assert_eq!(json["effect"], "hide-dialog");
        assert_eq!(json["dialog_id"], "dlg");
    }
}
