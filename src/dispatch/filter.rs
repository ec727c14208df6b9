use crate::config::DeferredMode;
use crate::dom::Document;
use crate::event::{Event, EventKind};
use crate::markers;

/// An event forces its batch out when it is an activation, when its target
/// sits outside every deferred region, or when its target cannot be found.
pub fn is_activating(event: &Event, document: &Document) -> bool {
    if event.kind == EventKind::Activate {
        return true;
    }
    let Some(node) = event
        .target_id
        .as_deref()
        .and_then(|id| document.get_element_by_id(id))
    else {
        return true;
    };
    !std::iter::once(node)
        .chain(document.ancestors(node))
        .any(|ancestor| document.has_class(ancestor, markers::DEFERRED_BOUNDARY))
}

pub fn batch_is_activating(mode: DeferredMode, events: &[Event], document: &Document) -> bool {
    match mode {
        DeferredMode::AlwaysActivate => true,
        DeferredMode::Deferred => events.iter().any(|event| is_activating(event, document)),
    }
}
