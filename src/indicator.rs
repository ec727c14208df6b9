//! Progress indicator timing and the single error reporting path.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, warn};

use crate::error::{ClientError, ErrorReport};
use crate::host::{Host, UiEffect};

#[derive(Debug, Default)]
pub struct ProgressIndicator {
    pending: Option<(Instant, Option<String>)>,
    shown: bool,
}

impl ProgressIndicator {
    /// Arm the indicator for a request that was just sent. Nothing is armed
    /// unless some event of the batch asked for progress.
    pub fn request_started(&mut self, now: Instant, delay: Duration, wanted: bool, message: Option<String>) {
        if wanted && !self.shown {
            self.pending = Some((now + delay, message));
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(at, _)| *at)
    }

    pub fn fire_due(&mut self, now: Instant, form: &str, host: &mut dyn Host) {
        if self.deadline().is_some_and(|at| at <= now) {
            if let Some((_, message)) = self.pending.take() {
                self.shown = true;
                host.perform(UiEffect::ShowProgress {
                    form: form.to_string(),
                    message,
                });
            }
        }
    }

    /// Response applied cleanly. A pending navigation keeps the indicator up.
    pub fn settle(&mut self, form: &str, navigation_pending: bool, host: &mut dyn Host) {
        self.pending = None;
        if !navigation_pending {
            self.hide(form, host);
        }
    }

    /// Request failed: always take the indicator down.
    pub fn reset(&mut self, form: &str, host: &mut dyn Host) {
        self.pending = None;
        self.hide(form, host);
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    fn hide(&mut self, form: &str, host: &mut dyn Host) {
        if std::mem::take(&mut self.shown) {
            host.perform(UiEffect::HideProgress {
                form: form.to_string(),
            });
        }
    }
}

/// Log a failure and, unless the batch asked to ignore errors, show it.
pub fn report(form: &str, err: &ClientError, ignorable: bool, host: &mut dyn Host) -> ErrorReport {
    let report = ErrorReport::new(form, err);
    if ignorable {
        warn!(target: "engine", form, kind = ?report.kind, error = %err, "ignored failure");
    } else {
        error!(target: "engine", form, kind = ?report.kind, error = %err, detail = ?report.detail, "request failed");
        host.perform(UiEffect::ShowError(report.clone()));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;
    use crate::transport::TransportError;

    #[test]
    fn shown_only_after_delay() {
        let mut host = RecordingHost::new();
        let mut indicator = ProgressIndicator::default();
        let start = Instant::now();
        let delay = Duration::from_millis(500);
        indicator.request_started(start, delay, true, None);
        indicator.fire_due(start + Duration::from_millis(100), "f", &mut host);
        assert!(host.effects().is_empty());
        indicator.fire_due(start + delay, "f", &mut host);
        assert!(indicator.is_shown());
        indicator.settle("f", false, &mut host);
        assert_eq!(
            host.take(),
            vec![
                UiEffect::ShowProgress {
                    form: "f".into(),
                    message: None
                },
                UiEffect::HideProgress { form: "f".into() },
            ]
        );
    }

    #[test]
    fn fast_response_never_shows_indicator() {
        let mut host = RecordingHost::new();
        let mut indicator = ProgressIndicator::default();
        let start = Instant::now();
        indicator.request_started(start, Duration::from_millis(500), true, Some("Saving".into()));
        indicator.settle("f", false, &mut host);
        indicator.fire_due(start + Duration::from_secs(1), "f", &mut host);
        assert!(host.effects().is_empty());
    }

    #[test]
    fn navigation_keeps_indicator_but_errors_reset_it() {
        let mut host = RecordingHost::new();
        let mut indicator = ProgressIndicator::default();
        let start = Instant::now();
        indicator.request_started(start, Duration::ZERO, true, None);
        indicator.fire_due(start, "f", &mut host);
        indicator.settle("f", true, &mut host);
        assert!(indicator.is_shown());
        indicator.reset("f", &mut host);
        assert!(!indicator.is_shown());
        assert_eq!(host.effects().len(), 2);
    }

    #[test]
    fn ignorable_failures_are_not_displayed() {
        let mut host = RecordingHost::new();
        let err = ClientError::Transport(TransportError::Status(502));
        let quiet = report("f", &err, true, &mut host);
        assert!(host.effects().is_empty());
        let loud = report("f", &err, false, &mut host);
        assert_eq!(quiet, loud);
        assert_eq!(host.effects(), vec![UiEffect::ShowError(loud)]);
    }
}
