use std::fmt::Write;

use crate::event::{Event, EventKind};

use super::{StateTokens, XXF_NS};

/// Escape an event value for the request body. Only `&` and `<` are replaced;
/// the server parser relies on `>` and quotes passing through untouched.
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Serialize a batch into the request envelope.
///
/// Server-events payloads go into their own elements ahead of the action block
/// and never appear as `<xxf:event>`. The initial dynamic state is only sent
/// when a batch asks for a full resynchronization or goes offline.
pub fn build_request(tokens: &StateTokens, events: &[Event]) -> String {
    let mut out = String::new();
    let _ = write!(out, r#"<xxf:event-request xmlns:xxf="{XXF_NS}">"#);
    push_element(&mut out, "static-state", &tokens.static_state);
    push_element(&mut out, "dynamic-state", &tokens.dynamic_state);
    if events.iter().any(|event| event.kind.needs_initial_state()) {
        if let Some(initial) = tokens.initial_dynamic_state.as_deref() {
            push_element(&mut out, "initial-dynamic-state", initial);
        }
    }
    for event in events.iter().filter(|e| e.kind == EventKind::ServerEvents) {
        push_element(&mut out, "server-events", event.value.as_deref().unwrap_or_default());
    }
    out.push_str("<xxf:action>");
    for event in events.iter().filter(|e| e.kind != EventKind::ServerEvents) {
        push_event(&mut out, event);
    }
    out.push_str("</xxf:action></xxf:event-request>");
    out
}

fn push_element(out: &mut String, name: &str, verbatim: &str) {
    let _ = write!(out, "<xxf:{name}>{verbatim}</xxf:{name}>");
}

fn push_event(out: &mut String, event: &Event) {
    let _ = write!(out, r#"<xxf:event name="{}""#, attr(event.kind.wire_name()));
    if let Some(source) = event.target_id.as_deref() {
        let _ = write!(out, r#" source-control-id="{}""#, attr(source));
    }
    if let Some(other) = event.other_id.as_deref() {
        let _ = write!(out, r#" other-control-id="{}""#, attr(other));
    }
    for (name, value) in &event.additional_attributes {
        let _ = write!(out, r#" {name}="{}""#, attr(value));
    }
    out.push('>');
    if let Some(value) = event.value.as_deref() {
        out.push_str(&escape_value(value));
    }
    out.push_str("</xxf:event>");
}

fn attr(value: &str) -> std::borrow::Cow<'_, str> {
    html_escape::encode_double_quoted_attribute(value)
}
