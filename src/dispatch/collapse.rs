use std::collections::HashMap;

use crate::controls::ControlRegistry;
use crate::event::Event;

/// Merge value changes per target within each run of consecutive value
/// changes, then drop the ones the server already holds and those aimed at
/// upload controls. Only the last value change per target survives, at its own
/// position.
pub fn collapse(events: Vec<Event>, registry: &ControlRegistry) -> Vec<Event> {
    let mut slots: Vec<Option<Event>> = Vec::with_capacity(events.len());
    let mut run: HashMap<String, usize> = HashMap::new();

    for event in events {
        if !event.is_value_change() {
            run.clear();
            slots.push(Some(event));
            continue;
        }
        if let Some(target) = event.target_id.clone() {
            if let Some(earlier) = run.insert(target, slots.len()) {
                slots[earlier] = None;
            }
        }
        slots.push(Some(event));
    }

    let mut merged: Vec<Event> = slots.into_iter().flatten().collect();
    merged.retain(|event| {
        if !event.is_value_change() {
            return true;
        }
        let Some(target) = event.target_id.as_deref() else {
            return true;
        };
        if registry.known_kind(target).map_or(false, |kind| kind.is_upload()) {
            return false;
        }
        let value = event.value.as_deref().unwrap_or_default();
        !registry.server_has_value(target, value)
    });
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::ControlKind;
    use crate::event::{EventInit, EventKind};

    fn change(target: &str, value: &str) -> Event {
        EventInit::value_change(target, value)
            .form("f")
            .build(&crate::dom::Document::new())
            .unwrap()
    }

    fn activate(target: &str) -> Event {
        EventInit::activate(target)
            .form("f")
            .build(&crate::dom::Document::new())
            .unwrap()
    }

    fn summary(events: &[Event]) -> Vec<(EventKind, String, String)> {
        events
            .iter()
            .map(|e| {
                (
                    e.kind.clone(),
                    e.target_id.clone().unwrap_or_default(),
                    e.value.clone().unwrap_or_default(),
                )
            })
            .collect()
    }

    #[test]
    fn keeps_last_occurrence_only() {
        let registry = ControlRegistry::new();
        let out = collapse(
            vec![change("a", "1"), change("b", "x"), change("a", "12"), change("a", "123")],
            &registry,
        );
        assert_eq!(
            summary(&out),
            vec![
                (EventKind::ValueChange, "b".into(), "x".into()),
                (EventKind::ValueChange, "a".into(), "123".into()),
            ]
        );
    }

    #[test]
    fn other_events_break_runs() {
        let registry = ControlRegistry::new();
        let out = collapse(
            vec![change("a", "1"), activate("t"), change("a", "2")],
            &registry,
        );
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].kind, EventKind::Activate);
        assert_eq!(out[2].value.as_deref(), Some("2"));
    }

    #[test]
    fn drops_values_server_already_has() {
        let mut registry = ControlRegistry::new();
        registry.record_server_value("a", "same");
        let out = collapse(vec![change("a", "other"), change("a", "same")], &registry);
        assert!(out.is_empty());
    }

    #[test]
    fn drops_upload_value_changes() {
        let mut registry = ControlRegistry::new();
        registry.set_kind("u", ControlKind::Upload);
        let out = collapse(vec![change("u", "file.txt"), activate("u")], &registry);
        assert_eq!(summary(&out), vec![(EventKind::Activate, "u".into(), String::new())]);
    }

    #[test]
    fn collapsing_twice_changes_nothing() {
        let registry = ControlRegistry::new();
        let once = collapse(
            vec![change("a", "1"), change("a", "2"), activate("t"), change("b", "3")],
            &registry,
        );
        let twice = collapse(once.clone(), &registry);
        assert_eq!(once, twice);
    }
}
