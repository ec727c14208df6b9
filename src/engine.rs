//! Synchronous core: owns the document and one [`SessionState`] per form.
//!
//! The engine never sleeps and never performs I/O. Callers feed it events and
//! the current time, ask for the next deadline, collect the requests that are
//! ready to go and hand back whatever the transport produced.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::apply::{apply_response, ApplyContext};
use crate::config::ClientConfig;
use crate::controls::{ControlKind, WidgetRegistry};
use crate::dispatch::DispatchTimings;
use crate::dom::{parse_html, Document};
use crate::error::{ClientError, ErrorReport};
use crate::event::{enclosing_form, Event, EventInit, EventKind};
use crate::host::{Host, UiEffect};
use crate::indicator::{self, ProgressIndicator};
use crate::markers;
use crate::session::{DelayedServerEvents, SessionState};
use crate::transport::{RetryPolicy, TransportError};
use crate::wire::{build_request, parse_response, Response};

/// A batch serialized and ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub form: String,
    pub body: String,
    pub policy: RetryPolicy,
}

pub struct Engine {
    document: Document,
    sessions: BTreeMap<String, SessionState>,
    widgets: WidgetRegistry,
    host: Box<dyn Host>,
    timings: DispatchTimings,
    policy: RetryPolicy,
    progress_delay: Duration,
    heartbeat: Option<Duration>,
    reports: Vec<ErrorReport>,
}

impl Engine {
    pub fn load(
        html: &str,
        config: &ClientConfig,
        widgets: WidgetRegistry,
        host: Box<dyn Host>,
        now: Instant,
    ) -> Self {
        let document = parse_html(html);
        let heartbeat = config.heartbeat_interval();
        let mut sessions = BTreeMap::new();
        let root = document.root();
        for form in document.find_descendants(root, |doc, n| doc.has_class(n, markers::FORM)) {
            let Some(form_id) = document.id_of(form).map(str::to_string) else {
                warn!(target: "engine", "skipping form without id");
                continue;
            };
            let mut session = SessionState::discover(&document, &form_id, form, &widgets);
            session.next_heartbeat = heartbeat.map(|interval| now + interval);
            sessions.insert(form_id, session);
        }
        info!(target: "engine", forms = sessions.len(), "page loaded");
        Self {
            document,
            sessions,
            widgets,
            host,
            timings: DispatchTimings::from(config),
            policy: RetryPolicy::from(config),
            progress_delay: config.progress_delay(),
            heartbeat,
            reports: Vec::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn forms(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    pub fn session(&self, form: &str) -> Option<&SessionState> {
        self.sessions.get(form)
    }

    /// Serialized live document.
    pub fn snapshot(&self) -> String {
        self.document.inner_html(self.document.root())
    }

    pub fn reports(&self) -> &[ErrorReport] {
        &self.reports
    }

    pub fn take_reports(&mut self) -> Vec<ErrorReport> {
        std::mem::take(&mut self.reports)
    }

    pub fn dispatch_event(&mut self, init: EventInit, now: Instant) -> Result<(), ClientError> {
        let event = init.build(&self.document)?;
        let session = self
            .sessions
            .get_mut(&event.form)
            .ok_or_else(|| ClientError::UnknownForm(event.form.clone()))?;

        if event.kind == EventKind::FocusIn {
            let masked = session.focus_mask.take();
            if masked.is_some() && masked == event.target_id {
                debug!(target: "engine", target = ?event.target_id, "focus caused by server not relayed");
                return Ok(());
            }
        }
        let incremental = event.is_value_change()
            && event
                .target_id
                .as_deref()
                .and_then(|id| self.document.get_element_by_id(id))
                .is_some_and(|node| self.document.has_class(node, markers::INCREMENTAL));
        session.dispatcher.enqueue(event, incremental, now, &self.timings);
        Ok(())
    }

    pub fn get_value(&mut self, control_id: &str) -> Result<String, ClientError> {
        let node = self.document.require(control_id)?;
        let form = self.form_of(control_id)?;
        let session = self
            .sessions
            .get_mut(&form)
            .ok_or(ClientError::UnknownForm(form))?;
        let kind = session
            .registry
            .kind(&self.document, control_id, &self.widgets)
            .ok_or_else(|| ClientError::NotAControl(control_id.to_string()))?;
        Ok(kind.value(&self.document, node, &self.widgets))
    }

    /// Write the live value and relay the change as if the user typed it.
    pub fn set_value(&mut self, control_id: &str, value: &str, now: Instant) -> Result<(), ClientError> {
        self.change_value(EventInit::value_change(control_id, value), now)
    }

    /// Like [`Engine::set_value`], keeping the event's own attributes and
    /// error and progress flags.
    pub fn change_value(&mut self, init: EventInit, now: Instant) -> Result<(), ClientError> {
        let control_id = init.target_id.clone().ok_or(ClientError::MissingTarget)?;
        let value = init.value.clone().unwrap_or_default();
        let node = self.document.require(&control_id)?;
        let form = self.form_of(&control_id)?;
        let session = self
            .sessions
            .get_mut(&form)
            .ok_or(ClientError::UnknownForm(form))?;
        let kind = session
            .registry
            .kind(&self.document, &control_id, &self.widgets)
            .filter(ControlKind::is_leaf)
            .ok_or_else(|| ClientError::NotAControl(control_id.clone()))?;
        kind.set_value(&mut self.document, node, &value, &self.widgets)?;
        self.dispatch_event(init.value(&value), now)
    }

    /// Move focus to a control and let the server know.
    pub fn navigate_to_control(&mut self, control_id: &str, now: Instant) -> Result<(), ClientError> {
        self.document.require(control_id)?;
        self.host.perform(UiEffect::Focus {
            control_id: control_id.to_string(),
        });
        self.dispatch_event(EventInit::new(EventKind::FocusIn).target(control_id), now)
    }

    fn form_of(&self, control_id: &str) -> Result<String, ClientError> {
        enclosing_form(&self.document, Some(control_id))
            .and_then(|form| self.document.id_of(form))
            .map(str::to_string)
            .ok_or_else(|| ClientError::NotAControl(control_id.to_string()))
    }

    /// Earliest instant at which [`Engine::poll`] has something to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sessions
            .values()
            .flat_map(|session| {
                [
                    session.dispatcher.deadline(&self.timings),
                    session.indicator.deadline(),
                    session.delayed.iter().map(|delayed| delayed.due).min(),
                    session.next_heartbeat,
                ]
            })
            .flatten()
            .min()
    }

    /// Fire due timers and serialize every batch that may go out now.
    ///
    /// A returned request is already marked in flight; the caller must pass
    /// its outcome to [`Engine::complete`].
    pub fn poll(&mut self, now: Instant) -> Vec<OutgoingRequest> {
        let mut outgoing = Vec::new();
        for session in self.sessions.values_mut() {
            session
                .indicator
                .fire_due(now, &session.form_id, self.host.as_mut());

            for delayed in session.take_due(now) {
                let event = internal_event(&session.form_id, EventKind::ServerEvents, Some(delayed.payload));
                session.dispatcher.enqueue(event, false, now, &self.timings);
            }
            if let (Some(due), Some(interval)) = (session.next_heartbeat, self.heartbeat) {
                if due <= now {
                    let mut event = internal_event(&session.form_id, EventKind::Heartbeat, None);
                    event.ignore_errors = true;
                    session.dispatcher.enqueue(event, false, now, &self.timings);
                    session.next_heartbeat = Some(now + interval);
                }
            }

            session.dispatcher.fire_due(now, &self.timings);
            let Some(batch) = session.dispatcher.take_batch(
                now,
                session.request.in_progress,
                &self.timings,
                &self.document,
                &session.registry,
            ) else {
                continue;
            };
            if batch.is_empty() {
                debug!(target: "dispatch", form = %session.form_id, "batch collapsed to nothing");
                continue;
            }

            if !batch.iter().all(|event| event.kind == EventKind::Heartbeat) {
                session.discard_delayed();
            }
            for event in batch.iter().filter(|event| event.is_value_change()) {
                if let (Some(target), Some(value)) = (event.target_id.as_deref(), event.value.as_deref()) {
                    session.registry.record_server_value(target, value);
                }
            }
            let body = build_request(&session.tokens, &batch);
            let show_progress = batch.iter().any(|event| event.show_progress);
            let message = batch.iter().find_map(|event| event.progress_message.clone());
            session.request.in_progress = true;
            session.request.last_body = Some(body.clone());
            session.request.ignore_errors = batch.iter().all(|event| event.ignore_errors);
            session.request.show_progress = show_progress;
            session
                .indicator
                .request_started(now, self.progress_delay, show_progress, message);
            debug!(
                target: "engine",
                form = %session.form_id,
                events = batch.len(),
                bytes = body.len(),
                "request ready"
            );
            outgoing.push(OutgoingRequest {
                form: session.form_id.clone(),
                body,
                policy: self.policy,
            });
        }
        outgoing
    }

    /// Apply the outcome of a request sent by [`Engine::poll`]. Returns the
    /// errors reported while handling it.
    pub fn complete(
        &mut self,
        form: &str,
        result: Result<String, TransportError>,
        now: Instant,
    ) -> Vec<ErrorReport> {
        let Some(session) = self.sessions.get_mut(form) else {
            warn!(target: "engine", form, "response for unknown form dropped");
            return Vec::new();
        };
        let ignorable = session.request.ignore_errors;
        session.request.in_progress = false;
        session.request.last_body = None;

        let host = self.host.as_mut();
        let mut failures: Vec<ClientError> = Vec::new();
        let mut navigation_pending = false;
        match result.map_err(ClientError::from).and_then(|body| {
            parse_response(&body).map_err(ClientError::from)
        }) {
            Err(err) => failures.push(err),
            Ok(Response::Error { title, body }) => failures.push(ClientError::Server { title, body }),
            Ok(Response::Success(response)) => {
                let mut ctx = ApplyContext {
                    form,
                    document: &mut self.document,
                    registry: &mut session.registry,
                    topology: &mut session.topology,
                    dialogs: &session.dialogs,
                    widgets: &self.widgets,
                    host: &mut *host,
                };
                let outcome = apply_response(&mut ctx, response, &mut session.tokens);
                navigation_pending = outcome.navigation_pending;
                if outcome.focused.is_some() {
                    session.focus_mask = outcome.focused;
                }
                for request in outcome.server_events {
                    match request.delay {
                        Some(delay) => session.delayed.push(DelayedServerEvents {
                            due: now + delay,
                            payload: request.payload,
                            discardable: request.discardable,
                        }),
                        None => {
                            let event = internal_event(form, EventKind::ServerEvents, Some(request.payload));
                            session.dispatcher.enqueue(event, false, now, &self.timings);
                        }
                    }
                }
                failures.extend(outcome.errors.into_iter().map(ClientError::from));
            }
        }

        let reports: Vec<ErrorReport> = failures
            .iter()
            .map(|err| indicator::report(form, err, ignorable, &mut *host))
            .collect();
        if reports.is_empty() {
            session.indicator.settle(form, navigation_pending, host);
        } else {
            session.indicator.reset(form, host);
        }
        self.reports.extend(reports.iter().cloned());
        reports
    }

    /// Nothing in flight, no timer armed and no delayed server events.
    /// Batches held by deferred filtering without a timeout count as idle.
    pub fn is_quiescent(&self) -> bool {
        self.sessions.values().all(|session| {
            !session.request.in_progress
                && session.dispatcher.is_settled()
                && session.dispatcher.deadline(&self.timings).is_none()
                && session.delayed.is_empty()
        })
    }

    pub fn indicator(&self, form: &str) -> Option<&ProgressIndicator> {
        self.sessions.get(form).map(|session| &session.indicator)
    }
}

fn internal_event(form: &str, kind: EventKind, value: Option<String>) -> Event {
    Event {
        form: form.to_string(),
        target_id: None,
        other_id: None,
        value,
        kind,
        bubbles: None,
        cancelable: None,
        ignore_errors: false,
        show_progress: false,
        progress_message: None,
        additional_attributes: Vec::new(),
    }
}
