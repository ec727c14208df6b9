use tracing::trace;

use crate::controls::{self, ControlKind, InputType};
use crate::dom::{parse_fragment, Document, DomError, NodeId};
use crate::markers;
use crate::repeat;
use crate::wire::response::{ContentUpdate, ControlPatch, Location};

use super::{require, ApplyContext, ApplyError, DomContext};

const INSTRUCTION: &str = "control";

pub(super) fn apply_patch(
    ctx: &mut ApplyContext<'_>,
    patch: &ControlPatch,
    itemset_rebuilt: bool,
    at: Location,
) -> Result<(), ApplyError> {
    let Some(node) = ctx.document.get_element_by_id(&patch.id) else {
        let begin = format!("{}{}", markers::GROUP_BEGIN_PREFIX, patch.id);
        if let Some(marker) = ctx.document.get_element_by_id(&begin) {
            return patch_group_range(ctx, patch, marker).during(INSTRUCTION, at);
        }
        return Err(ApplyError::MissingElement {
            instruction: INSTRUCTION,
            id: patch.id.clone(),
            at,
        });
    };
    let kind = ctx.registry.kind(ctx.document, &patch.id, ctx.widgets);
    patch_control(ctx, patch, node, kind, itemset_rebuilt).during(INSTRUCTION, at)
}

fn patch_control(
    ctx: &mut ApplyContext<'_>,
    patch: &ControlPatch,
    node: NodeId,
    mut kind: Option<ControlKind>,
    itemset_rebuilt: bool,
) -> Result<(), DomError> {
    let id = patch.id.as_str();

    match patch.static_readonly {
        Some(true) => {
            let value = kind
                .as_ref()
                .map(|kind| kind.value(ctx.document, node, ctx.widgets))
                .unwrap_or_default();
            controls::migrate_to_static(ctx.document, node, &value)?;
        }
        Some(false) => controls::migrate_to_interactive(ctx.document, node)?,
        None => {}
    }

    if let Some(relevant) = patch.relevant {
        set_relevant(ctx.document, id, node, relevant)?;
        ctx.registry.meta_mut(id).relevant = Some(relevant);
    }

    if let Some(required) = patch.required {
        ctx.document.toggle_class(node, markers::REQUIRED, required)?;
        ctx.registry.meta_mut(id).required = Some(required);
    }

    let mut type_rebuilt = false;
    if let (Some(type_name), Some(ControlKind::Input(current))) = (&patch.type_name, &kind) {
        let wanted = InputType::from_type_name(type_name);
        if wanted != *current {
            controls::rebuild_for_type(ctx.document, node, wanted)?;
            ctx.registry.set_kind(id, ControlKind::Input(wanted));
            kind = Some(ControlKind::Input(wanted));
            type_rebuilt = true;
        }
    }

    if let Some(readonly) = patch.readonly {
        match &kind {
            Some(kind) => kind.set_readonly(ctx.document, node, readonly)?,
            None => ctx.document.toggle_class(node, markers::READONLY, readonly)?,
        }
        ctx.registry.meta_mut(id).readonly = Some(readonly);
    }

    if let Some(delta) = patch.class_delta.as_deref() {
        apply_class_delta(ctx.document, node, delta)?;
    }

    if let (Some(kind), Some(incoming)) = (kind.as_ref().filter(|k| k.is_leaf()), patch.value.as_deref()) {
        let live = kind.value(ctx.document, node, ctx.widgets);
        let untouched = ctx
            .registry
            .server_value(id)
            .map_or(true, |server| server == live);
        if itemset_rebuilt || type_rebuilt || (untouched && live != incoming) {
            match kind {
                ControlKind::Widget(key) => match ctx.widgets.get(key) {
                    Some(widget) => widget.set_current_value(ctx.document, node, incoming, &patch.attrs)?,
                    None => kind.set_value(ctx.document, node, incoming, ctx.widgets)?,
                },
                _ => kind.set_value(ctx.document, node, incoming, ctx.widgets)?,
            }
        } else if !untouched {
            trace!(target: "apply", id, "keeping local edit over server value");
        }
        ctx.registry.record_server_value(id, incoming);
    }

    if ctx.document.has_class(node, markers::REQUIRED) {
        let empty = kind
            .as_ref()
            .map(|kind| kind.value(ctx.document, node, ctx.widgets).is_empty())
            .unwrap_or(true);
        ctx.document.toggle_class(node, markers::REQUIRED_EMPTY, empty)?;
        ctx.document.toggle_class(node, markers::REQUIRED_FILLED, !empty)?;
    } else {
        ctx.document.remove_class(node, markers::REQUIRED_EMPTY)?;
        ctx.document.remove_class(node, markers::REQUIRED_FILLED)?;
    }

    for (class, text) in [
        (markers::LABEL, &patch.label),
        (markers::HINT, &patch.hint),
        (markers::HELP, &patch.help),
        (markers::ALERT, &patch.alert),
    ] {
        let Some(text) = text else {
            continue;
        };
        if let Some(decoration) = controls::decoration(ctx.document, id, class) {
            ctx.document.set_text_content(decoration, text)?;
        }
        let meta = ctx.registry.meta_mut(id);
        let slot = match class {
            markers::LABEL => &mut meta.label,
            markers::HINT => &mut meta.hint,
            markers::HELP => &mut meta.help,
            _ => &mut meta.alert,
        };
        *slot = Some(text.clone());
    }

    if let Some(valid) = patch.valid {
        ctx.document.toggle_class(node, markers::INVALID, !valid)?;
        if let Some(alert) = controls::decoration(ctx.document, id, markers::ALERT) {
            ctx.document.toggle_class(alert, markers::ALERT_ACTIVE, !valid)?;
            ctx.document.toggle_class(alert, markers::ALERT_INACTIVE, valid)?;
        }
        ctx.registry.meta_mut(id).valid = Some(valid);
    }
    Ok(())
}

/// Relevance cascades to the decorations pointing at the control.
fn set_relevant(document: &mut Document, id: &str, node: NodeId, relevant: bool) -> Result<(), DomError> {
    document.toggle_class(node, markers::DISABLED, !relevant)?;
    for class in markers::DECORATIONS {
        if let Some(decoration) = controls::decoration(document, id, class) {
            document.toggle_class(decoration, markers::DISABLED, !relevant)?;
        }
    }
    Ok(())
}

/// Groups rendered without a container span the siblings between their
/// `group-begin-G` and `group-end-G` markers.
fn patch_group_range(ctx: &mut ApplyContext<'_>, patch: &ControlPatch, begin: NodeId) -> Result<(), DomError> {
    let Some(relevant) = patch.relevant else {
        return Ok(());
    };
    let end_id = format!("{}{}", markers::GROUP_END_PREFIX, patch.id);
    ctx.document.toggle_class(begin, markers::DISABLED, !relevant)?;
    let mut current = ctx.document.next_sibling(begin);
    while let Some(node) = current {
        if ctx.document.id_of(node) == Some(end_id.as_str()) {
            ctx.document.toggle_class(node, markers::DISABLED, !relevant)?;
            break;
        }
        if relevant && is_disabled_group_begin(ctx.document, node) {
            current = skip_group(ctx.document, node);
            continue;
        }
        if ctx.document.is_element(node) {
            ctx.document.toggle_class(node, markers::DISABLED, !relevant)?;
        }
        current = ctx.document.next_sibling(node);
    }
    ctx.registry.meta_mut(&patch.id).relevant = Some(relevant);
    Ok(())
}

fn is_disabled_group_begin(document: &Document, node: NodeId) -> bool {
    document.has_class(node, markers::GROUP_BEGIN_END)
        && document
            .id_of(node)
            .map_or(false, |id| id.starts_with(markers::GROUP_BEGIN_PREFIX))
        && document.has_class(node, markers::DISABLED)
}

/// Sibling after the end marker matching the group begun at `begin`.
fn skip_group(document: &Document, begin: NodeId) -> Option<NodeId> {
    let group = document.id_of(begin)?.strip_prefix(markers::GROUP_BEGIN_PREFIX)?;
    let end_id = format!("{}{group}", markers::GROUP_END_PREFIX);
    let mut current = document.next_sibling(begin);
    while let Some(node) = current {
        if document.id_of(node) == Some(end_id.as_str()) {
            return document.next_sibling(node);
        }
        current = document.next_sibling(node);
    }
    None
}

fn apply_class_delta(document: &mut Document, node: NodeId, delta: &str) -> Result<(), DomError> {
    for token in delta.split_ascii_whitespace() {
        if let Some(class) = token.strip_prefix('-') {
            document.remove_class(node, class)?;
        } else {
            document.add_class(node, token.strip_prefix('+').unwrap_or(token))?;
        }
    }
    Ok(())
}

pub(super) fn apply_content(
    ctx: &mut ApplyContext<'_>,
    update: &ContentUpdate,
    at: Location,
) -> Result<(), ApplyError> {
    match update {
        ContentUpdate::InnerHtml { id, html } => {
            let node = require(ctx.document, id, "inner-html", at)?;
            let nodes = parse_fragment(ctx.document, html);
            let replaced: Vec<String> = ctx
                .document
                .descendants(node)
                .into_iter()
                .filter(|descendant| *descendant != node)
                .filter_map(|descendant| ctx.document.id_of(descendant).map(str::to_string))
                .collect();
            ctx.document.replace_children(node, nodes).during("inner-html", at)?;
            for id in &replaced {
                ctx.registry.forget(id);
            }
            ctx.registry.index(ctx.document, node, ctx.widgets);
        }
        ContentUpdate::Attribute { for_id, name, value } => {
            let node = require(ctx.document, for_id, "attribute", at)?;
            ctx.document.set_attr(node, name, value).during("attribute", at)?;
        }
        ContentUpdate::Text { id, text } => {
            let node = require(ctx.document, id, "text", at)?;
            ctx.document.set_text_content(node, text).during("text", at)?;
        }
        ContentUpdate::RepeatIteration {
            id,
            iteration,
            relevant,
        } => {
            let (repeat_id, parents) = repeat::split_suffix(id);
            for node in repeat::iteration_nodes(ctx.document, repeat_id, &parents, *iteration) {
                if ctx.document.is_element(node) {
                    ctx.document
                        .toggle_class(node, markers::DISABLED, !relevant)
                        .during("repeat-iteration", at)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::apply::tests::Fixture;
    use crate::markers;

    fn body(inner: &str) -> String {
        format!(
            "<event-response><dynamic-state>D</dynamic-state><action><control-values>{inner}</control-values></action></event-response>"
        )
    }

    const INPUT: &str = r#"<form id="f" class="xforms-form"><label class="xforms-label" for="c">Old</label><span id="c" class="xforms-control xforms-input"><input type="text" value="y"></span><span class="xforms-alert" for="c"></span></form>"#;

    #[test]
    fn server_value_applies_when_untouched() {
        let mut fixture = Fixture::new(INPUT);
        fixture.apply(&body(r#"<control id="c">z</control>"#));
        assert_eq!(fixture.value("c"), "z");
        assert_eq!(fixture.registry.server_value("c"), Some("z"));
    }

    #[test]
    fn local_edit_is_not_clobbered() {
        let mut fixture = Fixture::new(INPUT);
        fixture.set_live_value("c", "x");
        fixture.apply(&body(r#"<control id="c">z</control>"#));
        assert_eq!(fixture.value("c"), "x");
        assert_eq!(fixture.registry.server_value("c"), Some("z"));
    }

    #[test]
    fn type_change_forces_value() {
        let mut fixture = Fixture::new(INPUT);
        fixture.set_live_value("c", "x");
        fixture.apply(&body(
            r#"<control id="c" type="xs:boolean">true</control>"#,
        ));
        assert!(fixture.has_class("c", "xforms-type-boolean"));
        assert_eq!(fixture.value("c"), "true");
        assert!(crate::controls::decoration(&fixture.document, "c", markers::LABEL).is_some());
    }

    #[test]
    fn properties_and_decorations() {
        let mut fixture = Fixture::new(INPUT);
        fixture.apply(&body(
            r#"<control id="c" relevant="false" required="true" readonly="true" valid="false" label="New" alert="Bad" class="+extra -xforms-input"></control>"#,
        ));
        assert!(fixture.has_class("c", markers::DISABLED));
        assert!(fixture.has_class("c", markers::REQUIRED));
        assert!(fixture.has_class("c", markers::REQUIRED_FILLED));
        assert!(fixture.has_class("c", markers::READONLY));
        assert!(fixture.has_class("c", markers::INVALID));
        assert!(fixture.has_class("c", "extra"));
        assert!(!fixture.has_class("c", "xforms-input"));
        let label = crate::controls::decoration(&fixture.document, "c", markers::LABEL).unwrap();
        assert_eq!(fixture.document.text_content(label), "New");
        assert!(fixture.document.has_class(label, markers::DISABLED));
        let alert = crate::controls::decoration(&fixture.document, "c", markers::ALERT).unwrap();
        assert!(fixture.document.has_class(alert, markers::ALERT_ACTIVE));
        let meta = fixture.registry.meta("c").unwrap();
        assert_eq!(meta.label.as_deref(), Some("New"));
        assert_eq!(meta.valid, Some(false));
    }

    #[test]
    fn group_relevance_skips_nested_disabled_groups() {
        let mut fixture = Fixture::new(concat!(
            r#"<form id="f" class="xforms-form"><div id="host">"#,
            r#"<span id="group-begin-g" class="xforms-group-begin-end"></span>"#,
            r#"<span id="a">a</span>"#,
            r#"<span id="group-begin-n" class="xforms-group-begin-end xforms-disabled"></span>"#,
            r#"<span id="b" class="xforms-disabled">b</span>"#,
            r#"<span id="group-end-n" class="xforms-group-begin-end xforms-disabled"></span>"#,
            r#"<span id="group-end-g" class="xforms-group-begin-end"></span>"#,
            r#"<span id="after">after</span>"#,
            r#"</div></form>"#
        ));
        fixture.apply(&body(r#"<control id="g" relevant="false"/>"#));
        assert!(fixture.has_class("a", markers::DISABLED));
        assert!(!fixture.has_class("after", markers::DISABLED));

        fixture.apply(&body(r#"<control id="g" relevant="true"/>"#));
        assert!(!fixture.has_class("a", markers::DISABLED));
        assert!(fixture.has_class("b", markers::DISABLED));
        assert!(!fixture.has_class("group-end-g", markers::DISABLED));
    }

    #[test]
    fn static_migration_then_back() {
        let mut fixture = Fixture::new(INPUT);
        fixture.apply(&body(r#"<control id="c" static="true"/>"#));
        assert!(fixture.has_class("c", markers::STATIC));
        assert_eq!(fixture.value("c"), "y");
        fixture.apply(&body(r#"<control id="c" static="false"/>"#));
        assert!(!fixture.has_class("c", markers::STATIC));
    }

    #[test]
    fn content_updates() {
        let mut fixture = Fixture::new(
            r#"<form id="f" class="xforms-form"><div id="out"></div><a id="link" href="/start">x</a><span id="t">old</span></form>"#,
        );
        let outcome = fixture.apply(&body(concat!(
            r#"<inner-html id="out">&lt;b id="bold"&gt;hi&lt;/b&gt;</inner-html>"#,
            r#"<attribute for="link" name="href">/next</attribute>"#,
            r#"<text id="t">new</text>"#
        )));
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert!(fixture.document.get_element_by_id("bold").is_some());
        let link = fixture.document.get_element_by_id("link").unwrap();
        assert_eq!(fixture.document.attr(link, "href"), Some("/next"));
        let t = fixture.document.get_element_by_id("t").unwrap();
        assert_eq!(fixture.document.text_content(t), "new");
    }

    #[test]
    fn inner_html_drops_replaced_controls() {
        let mut fixture = Fixture::new(
            r#"<form id="f" class="xforms-form"><div id="out"><span id="old" class="xforms-control xforms-input"><input value="v"></span></div></form>"#,
        );
        assert_eq!(fixture.registry.server_value("old"), Some("v"));
        let outcome = fixture.apply(&body(
            r#"<inner-html id="out">&lt;span id="fresh" class="xforms-control xforms-input"&gt;&lt;input value="w"&gt;&lt;/span&gt;</inner-html>"#,
        ));
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert!(fixture.registry.known_kind("old").is_none());
        assert!(fixture.registry.server_value("old").is_none());
        assert_eq!(fixture.registry.server_value("fresh"), Some("w"));
    }
}
