//! Per-form event queue and the timers that decide when it is flushed.
//!
//! The dispatcher never touches the network. It is told the time, reports the
//! next deadline it cares about and hands out collapsed batches once a timer
//! has fired and no request is in flight.

mod collapse;
mod filter;

pub use collapse::collapse;
pub use filter::{batch_is_activating, is_activating};

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::{ClientConfig, DeferredMode};
use crate::controls::ControlRegistry;
use crate::dom::Document;
use crate::event::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTimings {
    pub incremental: Duration,
    pub force_incremental: Duration,
    pub short: Duration,
    pub hold_timeout: Option<Duration>,
    pub mode: DeferredMode,
}

impl From<&ClientConfig> for DispatchTimings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            incremental: config.incremental_delay(),
            force_incremental: config.force_incremental_delay(),
            short: config.short_delay(),
            hold_timeout: config.deferred_hold_timeout(),
            mode: config.deferred_mode,
        }
    }
}

impl Default for DispatchTimings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayClass {
    /// Long delay batching keystrokes of incremental controls.
    Coalescing,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timer {
    deadline: Instant,
    class: DelayClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchState {
    Idle,
    Accumulating,
    /// Timer fired; the batch goes out once the dispatcher is polled.
    Filtering,
    Dispatching,
    /// Batch kept back by deferred filtering.
    Held,
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    queue: Vec<Event>,
    timer: Option<Timer>,
    first_queued_at: Option<Instant>,
    flush_pending: bool,
    held_since: Option<Instant>,
    hold_expired: bool,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, event: Event, incremental: bool, now: Instant, timings: &DispatchTimings) {
        let first = *self.first_queued_at.get_or_insert(now);
        self.queue.push(event);

        let forced = now.saturating_duration_since(first) >= timings.force_incremental;
        let class = if incremental && !forced {
            DelayClass::Coalescing
        } else {
            DelayClass::Short
        };
        match (self.timer, class) {
            (Some(Timer { class: DelayClass::Short, .. }), _) => {}
            (_, DelayClass::Short) => {
                self.timer = Some(Timer {
                    deadline: now + timings.short,
                    class,
                });
            }
            (_, DelayClass::Coalescing) => {
                self.timer = Some(Timer {
                    deadline: now + timings.incremental,
                    class,
                });
            }
        }
        trace!(
            target: "dispatch",
            queued = self.queue.len(),
            ?class,
            "event queued"
        );
    }

    pub fn delay_class(&self) -> Option<DelayClass> {
        self.timer.map(|timer| timer.class)
    }

    pub fn deadline(&self, timings: &DispatchTimings) -> Option<Instant> {
        let hold = if self.hold_expired {
            None
        } else {
            self.held_since
                .zip(timings.hold_timeout)
                .map(|(since, timeout)| since + timeout)
        };
        match (self.timer.map(|timer| timer.deadline), hold) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Record expired timers. A fired batch waits here while a request is in flight.
    pub fn fire_due(&mut self, now: Instant, timings: &DispatchTimings) {
        if let Some(timer) = self.timer {
            if timer.deadline <= now {
                self.timer = None;
                self.flush_pending = true;
            }
        }
        if let (Some(since), Some(timeout)) = (self.held_since, timings.hold_timeout) {
            if !self.hold_expired && since + timeout <= now {
                debug!(target: "dispatch", held = self.queue.len(), "deferred hold timed out");
                self.hold_expired = true;
                self.flush_pending = true;
            }
        }
    }

    /// Take the collapsed batch if a timer fired and nothing is in flight.
    ///
    /// `Some(vec![])` means the batch collapsed away and nothing should be sent.
    pub fn take_batch(
        &mut self,
        now: Instant,
        in_flight: bool,
        timings: &DispatchTimings,
        document: &Document,
        registry: &ControlRegistry,
    ) -> Option<Vec<Event>> {
        if !self.flush_pending || in_flight {
            return None;
        }
        self.flush_pending = false;
        if !self.hold_expired && !batch_is_activating(timings.mode, &self.queue, document) {
            if self.held_since.is_none() {
                debug!(target: "dispatch", held = self.queue.len(), "batch held by deferred filtering");
                self.held_since = Some(now);
            }
            return None;
        }
        let events = std::mem::take(&mut self.queue);
        self.first_queued_at = None;
        self.held_since = None;
        self.hold_expired = false;
        let queued = events.len();
        let batch = collapse(events, registry);
        debug!(target: "dispatch", queued, sent = batch.len(), "batch collapsed");
        Some(batch)
    }

    pub fn state(&self, in_flight: bool) -> DispatchState {
        if self.flush_pending {
            DispatchState::Filtering
        } else if in_flight {
            DispatchState::Dispatching
        } else if self.timer.is_some() {
            DispatchState::Accumulating
        } else if self.held_since.is_some() {
            DispatchState::Held
        } else {
            DispatchState::Idle
        }
    }

    pub fn queued(&self) -> &[Event] {
        &self.queue
    }

    /// No timer armed and no fired batch waiting.
    pub fn is_settled(&self) -> bool {
        self.timer.is_none() && !self.flush_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::event::EventInit;

    fn event(doc: &Document, target: &str, value: &str) -> Event {
        EventInit::value_change(target, value).build(doc).unwrap()
    }

    fn page() -> Document {
        parse_html(
            r#"<form id="f" class="xforms-form"><span id="a" class="xforms-control xforms-incremental"></span><div class="xforms-events-deferred"><span id="d" class="xforms-control"></span></div><button id="go" class="xforms-control xforms-trigger"></button></form>"#,
        )
    }

    #[test]
    fn incremental_events_rearm_coalescing_timer() {
        let doc = page();
        let timings = DispatchTimings::default();
        let start = Instant::now();
        let mut dispatcher = Dispatcher::new();
        dispatcher.enqueue(event(&doc, "a", "1"), true, start, &timings);
        assert_eq!(dispatcher.deadline(&timings), Some(start + timings.incremental));
        let later = start + Duration::from_millis(100);
        dispatcher.enqueue(event(&doc, "a", "12"), true, later, &timings);
        assert_eq!(dispatcher.deadline(&timings), Some(later + timings.incremental));
        assert_eq!(dispatcher.state(false), DispatchState::Accumulating);
    }

    #[test]
    fn short_timer_is_never_pushed_back() {
        let doc = page();
        let timings = DispatchTimings::default();
        let start = Instant::now();
        let mut dispatcher = Dispatcher::new();
        dispatcher.enqueue(event(&doc, "a", "1"), true, start, &timings);
        dispatcher.enqueue(EventInit::activate("go").build(&doc).unwrap(), false, start, &timings);
        assert_eq!(dispatcher.delay_class(), Some(DelayClass::Short));
        let deadline = dispatcher.deadline(&timings);
        dispatcher.enqueue(
            event(&doc, "a", "12"),
            true,
            start + Duration::from_millis(5),
            &timings,
        );
        assert_eq!(dispatcher.deadline(&timings), deadline);
    }

    #[test]
    fn force_budget_switches_to_short_delay() {
        let doc = page();
        let timings = DispatchTimings::default();
        let start = Instant::now();
        let mut dispatcher = Dispatcher::new();
        dispatcher.enqueue(event(&doc, "a", "1"), true, start, &timings);
        let late = start + timings.force_incremental;
        dispatcher.enqueue(event(&doc, "a", "12"), true, late, &timings);
        assert_eq!(dispatcher.delay_class(), Some(DelayClass::Short));
        assert_eq!(dispatcher.deadline(&timings), Some(late + timings.short));
    }

    #[test]
    fn fired_batch_waits_for_in_flight_request() {
        let doc = page();
        let registry = ControlRegistry::new();
        let timings = DispatchTimings::default();
        let start = Instant::now();
        let mut dispatcher = Dispatcher::new();
        dispatcher.enqueue(event(&doc, "a", "1"), false, start, &timings);
        let fire = start + timings.short;
        dispatcher.fire_due(fire, &timings);
        assert!(dispatcher.take_batch(fire, true, &timings, &doc, &registry).is_none());
        assert_eq!(dispatcher.state(true), DispatchState::Filtering);
        let batch = dispatcher
            .take_batch(fire, false, &timings, &doc, &registry)
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(dispatcher.state(false), DispatchState::Idle);
    }

    #[test]
    fn deferred_batch_is_held_until_activation() {
        let doc = page();
        let registry = ControlRegistry::new();
        let timings = DispatchTimings {
            mode: DeferredMode::Deferred,
            ..DispatchTimings::default()
        };
        let start = Instant::now();
        let mut dispatcher = Dispatcher::new();
        dispatcher.enqueue(event(&doc, "d", "x"), false, start, &timings);
        let fire = start + timings.short;
        dispatcher.fire_due(fire, &timings);
        assert!(dispatcher.take_batch(fire, false, &timings, &doc, &registry).is_none());
        assert_eq!(dispatcher.state(false), DispatchState::Held);
        assert_eq!(dispatcher.queued().len(), 1);

        dispatcher.enqueue(EventInit::activate("go").build(&doc).unwrap(), false, fire, &timings);
        let fire = fire + timings.short;
        dispatcher.fire_due(fire, &timings);
        let batch = dispatcher
            .take_batch(fire, false, &timings, &doc, &registry)
            .unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn hold_timeout_releases_batch() {
        let doc = page();
        let registry = ControlRegistry::new();
        let timings = DispatchTimings {
            mode: DeferredMode::Deferred,
            hold_timeout: Some(Duration::from_secs(5)),
            ..DispatchTimings::default()
        };
        let start = Instant::now();
        let mut dispatcher = Dispatcher::new();
        dispatcher.enqueue(event(&doc, "d", "x"), false, start, &timings);
        let fire = start + timings.short;
        dispatcher.fire_due(fire, &timings);
        assert!(dispatcher.take_batch(fire, false, &timings, &doc, &registry).is_none());
        assert_eq!(dispatcher.deadline(&timings), Some(fire + Duration::from_secs(5)));

        let expiry = fire + Duration::from_secs(5);
        dispatcher.fire_due(expiry, &timings);
        let batch = dispatcher
            .take_batch(expiry, false, &timings, &doc, &registry)
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(dispatcher.deadline(&timings), None);
    }
}
