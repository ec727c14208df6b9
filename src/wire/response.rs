//! Parsing of the server's response envelope.
//!
//! Elements are matched by local name so the namespace prefix the server picks
//! does not matter. Token elements are read before anything else; a failure
//! further down only affects [`EventResponse::actions`].

use std::fmt;

use roxmltree::Node;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is not well-formed XML: {0}")]
    NotXml(#[from] roxmltree::Error),
    #[error("unrecognized response envelope <{0}>")]
    UnknownEnvelope(String),
    #[error("<{element}> at {at} is missing attribute `{attribute}`")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
        at: Location,
    },
    #[error("<{element}> at {at} has invalid {attribute}={value:?}")]
    InvalidAttribute {
        element: String,
        attribute: &'static str,
        value: String,
        at: Location,
    },
}

/// Line and column of an instruction in the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Located<T> {
    pub at: Location,
    pub item: T,
}

#[derive(Debug)]
pub enum Response {
    Success(EventResponse),
    /// Error envelope sent by the server.
    Error { title: String, body: String },
}

#[derive(Debug)]
pub struct EventResponse {
    pub static_state: Option<String>,
    pub dynamic_state: Option<String>,
    pub actions: Result<Vec<Action>, ResponseError>,
}

/// One `<action>` block, split by application step.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Action {
    pub edits: Vec<Located<StructuralEdit>>,
    pub itemsets: Vec<Located<ItemsetUpdate>>,
    pub controls: Vec<Located<ControlPatch>>,
    pub content: Vec<Located<ContentUpdate>>,
    pub effects: Vec<Located<Effect>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralEdit {
    CopyTemplate {
        repeat_id: String,
        parent_indexes: Vec<u32>,
        start: u32,
        end: u32,
    },
    DeleteIterations {
        repeat_id: String,
        parent_indexes: Vec<u32>,
        count: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemsetUpdate {
    pub id: String,
    /// JSON item tree, decoded when applied.
    pub json: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlPatch {
    pub id: String,
    pub value: Option<String>,
    pub relevant: Option<bool>,
    pub readonly: Option<bool>,
    pub required: Option<bool>,
    pub valid: Option<bool>,
    pub static_readonly: Option<bool>,
    pub type_name: Option<String>,
    pub label: Option<String>,
    pub hint: Option<String>,
    pub help: Option<String>,
    pub alert: Option<String>,
    pub class_delta: Option<String>,
    /// Every attribute of the element, handed to widgets.
    pub attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentUpdate {
    InnerHtml { id: String, html: String },
    Attribute { for_id: String, name: String, value: String },
    Text { id: String, text: String },
    RepeatIteration { id: String, iteration: u32, relevant: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatIndexChange {
    pub id: String,
    pub old_index: u32,
    pub new_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Switch case or dialog visibility.
    Div {
        id: String,
        visible: bool,
        neighbor: Option<String>,
    },
    RepeatIndexes(Vec<RepeatIndexChange>),
    ServerEvents {
        payload: String,
        delay_ms: Option<u64>,
        discardable: bool,
    },
    Submission {
        action: Option<String>,
        method: String,
        replace: String,
        target: Option<String>,
        show_progress: bool,
    },
    Message { level: String, text: String },
    Load {
        resource: String,
        show: String,
        target: Option<String>,
        show_progress: bool,
    },
    SetFocus { control_id: String },
    Script {
        name: String,
        target_id: Option<String>,
        observer_id: Option<String>,
    },
    Help { control_id: String },
    Offline,
}

pub fn parse_response(body: &str) -> Result<Response, ResponseError> {
    let document = roxmltree::Document::parse(body)?;
    let root = document.root_element();
    match root.tag_name().name() {
        "event-response" => Ok(Response::Success(parse_success(&document, root))),
        "error" => Ok(Response::Error {
            title: child_text(root, "title").unwrap_or_default(),
            body: child_text(root, "body").unwrap_or_default(),
        }),
        other => Err(ResponseError::UnknownEnvelope(other.to_string())),
    }
}

fn parse_success(document: &roxmltree::Document<'_>, root: Node<'_, '_>) -> EventResponse {
    let mut static_state = None;
    let mut dynamic_state = None;
    for child in root.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "static-state" => static_state = Some(text_of(child)),
            "dynamic-state" => dynamic_state = Some(text_of(child)),
            _ => {}
        }
    }
    let actions = root
        .children()
        .filter(|child| child.is_element() && child.tag_name().name() == "action")
        .map(|action| Parser { document }.action(action))
        .collect();
    EventResponse {
        static_state,
        dynamic_state,
        actions,
    }
}

struct Parser<'a, 'input> {
    document: &'a roxmltree::Document<'input>,
}

impl Parser<'_, '_> {
    fn at(&self, node: Node<'_, '_>) -> Location {
        let pos = self.document.text_pos_at(node.range().start);
        Location {
            line: pos.row,
            column: pos.col,
        }
    }

    fn located<T>(&self, node: Node<'_, '_>, item: T) -> Located<T> {
        Located {
            at: self.at(node),
            item,
        }
    }

    fn required(&self, node: Node<'_, '_>, attribute: &'static str) -> Result<String, ResponseError> {
        node.attribute(attribute)
            .map(str::to_string)
            .ok_or_else(|| ResponseError::MissingAttribute {
                element: node.tag_name().name().to_string(),
                attribute,
                at: self.at(node),
            })
    }

    fn number<T: std::str::FromStr>(
        &self,
        node: Node<'_, '_>,
        attribute: &'static str,
        raw: &str,
    ) -> Result<T, ResponseError> {
        raw.trim()
            .parse()
            .map_err(|_| ResponseError::InvalidAttribute {
                element: node.tag_name().name().to_string(),
                attribute,
                value: raw.to_string(),
                at: self.at(node),
            })
    }

    fn required_number<T: std::str::FromStr>(
        &self,
        node: Node<'_, '_>,
        attribute: &'static str,
    ) -> Result<T, ResponseError> {
        let raw = self.required(node, attribute)?;
        self.number(node, attribute, &raw)
    }

    fn indexes(&self, node: Node<'_, '_>) -> Result<Vec<u32>, ResponseError> {
        node.attribute("parent-indexes")
            .unwrap_or_default()
            .split_ascii_whitespace()
            .map(|raw| self.number(node, "parent-indexes", raw))
            .collect()
    }

    fn action(&self, node: Node<'_, '_>) -> Result<Action, ResponseError> {
        let mut action = Action::default();
        for child in node.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "control-values" => self.control_values(child, &mut action)?,
                "repeat-indexes" => {
                    let changes = child
                        .children()
                        .filter(|n| n.is_element() && n.tag_name().name() == "repeat-index")
                        .map(|n| {
                            Ok(RepeatIndexChange {
                                id: self.required(n, "id")?,
                                old_index: self.required_number(n, "old-index")?,
                                new_index: self.required_number(n, "new-index")?,
                            })
                        })
                        .collect::<Result<Vec<_>, ResponseError>>()?;
                    action
                        .effects
                        .push(self.located(child, Effect::RepeatIndexes(changes)));
                }
                "server-events" => {
                    let delay_ms = child
                        .attribute("delay")
                        .map(|raw| self.number(child, "delay", raw))
                        .transpose()?;
                    action.effects.push(self.located(
                        child,
                        Effect::ServerEvents {
                            payload: text_of(child),
                            delay_ms,
                            discardable: child.attribute("discardable") == Some("true"),
                        },
                    ));
                }
                "submission" => action.effects.push(self.located(
                    child,
                    Effect::Submission {
                        action: child.attribute("action").map(str::to_string),
                        method: child.attribute("method").unwrap_or("post").to_string(),
                        replace: child.attribute("replace").unwrap_or("all").to_string(),
                        target: child.attribute("target").map(str::to_string),
                        show_progress: child.attribute("show-progress") != Some("false"),
                    },
                )),
                "message" => action.effects.push(self.located(
                    child,
                    Effect::Message {
                        level: child.attribute("level").unwrap_or("modal").to_string(),
                        text: text_of(child),
                    },
                )),
                "load" => action.effects.push(self.located(
                    child,
                    Effect::Load {
                        resource: self.required(child, "resource")?,
                        show: child.attribute("show").unwrap_or("replace").to_string(),
                        target: child.attribute("target").map(str::to_string),
                        show_progress: child.attribute("show-progress") != Some("false"),
                    },
                )),
                "setfocus" => action.effects.push(self.located(
                    child,
                    Effect::SetFocus {
                        control_id: self.required(child, "control-id")?,
                    },
                )),
                "script" => action.effects.push(self.located(
                    child,
                    Effect::Script {
                        name: self.required(child, "name")?,
                        target_id: child.attribute("target-id").map(str::to_string),
                        observer_id: child.attribute("observer-id").map(str::to_string),
                    },
                )),
                "help" => action.effects.push(self.located(
                    child,
                    Effect::Help {
                        control_id: self.required(child, "control-id")?,
                    },
                )),
                "offline" => action.effects.push(self.located(child, Effect::Offline)),
                _ => {}
            }
        }
        Ok(action)
    }

    fn control_values(&self, node: Node<'_, '_>, action: &mut Action) -> Result<(), ResponseError> {
        for child in node.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "copy-repeat-template" => action.edits.push(self.located(
                    child,
                    StructuralEdit::CopyTemplate {
                        repeat_id: self.required(child, "id")?,
                        parent_indexes: self.indexes(child)?,
                        start: self.required_number(child, "start-suffix")?,
                        end: self.required_number(child, "end-suffix")?,
                    },
                )),
                "delete-repeat-elements" => action.edits.push(self.located(
                    child,
                    StructuralEdit::DeleteIterations {
                        repeat_id: self.required(child, "id")?,
                        parent_indexes: self.indexes(child)?,
                        count: child
                            .attribute("count")
                            .map(|raw| self.number(child, "count", raw))
                            .transpose()?
                            .unwrap_or(1),
                    },
                )),
                "itemset" => action.itemsets.push(self.located(
                    child,
                    ItemsetUpdate {
                        id: self.required(child, "id")?,
                        json: text_of(child),
                    },
                )),
                "control" => {
                    let patch = self.control(child)?;
                    action.controls.push(self.located(child, patch));
                }
                "inner-html" => action.content.push(self.located(
                    child,
                    ContentUpdate::InnerHtml {
                        id: self.required(child, "id")?,
                        html: text_of(child),
                    },
                )),
                "attribute" => action.content.push(self.located(
                    child,
                    ContentUpdate::Attribute {
                        for_id: self.required(child, "for")?,
                        name: self.required(child, "name")?,
                        value: text_of(child),
                    },
                )),
                "text" => action.content.push(self.located(
                    child,
                    ContentUpdate::Text {
                        id: self.required(child, "id")?,
                        text: text_of(child),
                    },
                )),
                "repeat-iteration" => action.content.push(self.located(
                    child,
                    ContentUpdate::RepeatIteration {
                        id: self.required(child, "id")?,
                        iteration: self.required_number(child, "iteration")?,
                        relevant: child.attribute("relevant") != Some("false"),
                    },
                )),
                "div" => action.effects.push(self.located(
                    child,
                    Effect::Div {
                        id: self.required(child, "id")?,
                        visible: child.attribute("visibility") != Some("hidden"),
                        neighbor: child.attribute("neighbor").map(str::to_string),
                    },
                )),
                _ => {}
            }
        }
        Ok(())
    }

    fn control(&self, node: Node<'_, '_>) -> Result<ControlPatch, ResponseError> {
        let flag = |name: &str| node.attribute(name).map(|v| v == "true");
        let text = |name: &str| node.attribute(name).map(str::to_string);
        let has_content = node.children().next().is_some();
        Ok(ControlPatch {
            id: self.required(node, "id")?,
            value: has_content.then(|| text_of(node)),
            relevant: flag("relevant"),
            readonly: flag("readonly"),
            required: flag("required"),
            valid: flag("valid"),
            static_readonly: flag("static"),
            type_name: text("type"),
            label: text("label"),
            hint: text("hint"),
            help: text("help"),
            alert: text("alert"),
            class_delta: text("class"),
            attrs: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
        })
    }
}

fn text_of(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect()
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == name)
        .map(text_of)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(body: &str) -> EventResponse {
        match parse_response(body).unwrap() {
            Response::Success(response) => response,
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn reads_tokens_and_control_values() {
        let response = success(
            r#"<xxf:event-response xmlns:xxf="http://orbeon.org/oxf/xml/xforms">
                <xxf:dynamic-state>D2</xxf:dynamic-state>
                <xxf:action>
                  <xxf:control-values>
                    <xxf:copy-repeat-template id="r" parent-indexes="2 1" start-suffix="3" end-suffix="4"/>
                    <xxf:control id="c1" relevant="false" label="Name">v &amp; w</xxf:control>
                    <xxf:control id="c2" readonly="true"/>
                    <xxf:div id="dlg" visibility="visible"/>
                  </xxf:control-values>
                  <xxf:setfocus control-id="c1"/>
                </xxf:action>
              </xxf:event-response>"#,
        );
        assert_eq!(response.dynamic_state.as_deref(), Some("D2"));
        assert_eq!(response.static_state, None);
        let actions = response.actions.unwrap();
        let action = &actions[0];
        assert_eq!(
            action.edits[0].item,
            StructuralEdit::CopyTemplate {
                repeat_id: "r".into(),
                parent_indexes: vec![2, 1],
                start: 3,
                end: 4,
            }
        );
        let c1 = &action.controls[0].item;
        assert_eq!(c1.value.as_deref(), Some("v & w"));
        assert_eq!(c1.relevant, Some(false));
        assert_eq!(c1.label.as_deref(), Some("Name"));
        assert_eq!(action.controls[1].item.value, None);
        assert_eq!(
            action.effects.iter().map(|e| e.item.clone()).collect::<Vec<_>>(),
            vec![
                Effect::Div {
                    id: "dlg".into(),
                    visible: true,
                    neighbor: None
                },
                Effect::SetFocus {
                    control_id: "c1".into()
                },
            ]
        );
    }

    #[test]
    fn error_envelope_carries_title_and_body() {
        match parse_response("<error><title>Boom</title><body>stack</body></error>").unwrap() {
            Response::Error { title, body } => {
                assert_eq!(title, "Boom");
                assert_eq!(body, "stack");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage_and_unknown_roots() {
        assert!(matches!(parse_response("not xml"), Err(ResponseError::NotXml(_))));
        assert!(matches!(
            parse_response("<html/>"),
            Err(ResponseError::UnknownEnvelope(name)) if name == "html"
        ));
    }

    #[test]
    fn bad_instruction_keeps_tokens() {
        let response = success(
            r#"<event-response><action><control-values><copy-repeat-template id="r" start-suffix="x" end-suffix="2"/></control-values></action><dynamic-state>D9</dynamic-state></event-response>"#,
        );
        assert_eq!(response.dynamic_state.as_deref(), Some("D9"));
        let err = response.actions.unwrap_err();
        assert!(matches!(err, ResponseError::InvalidAttribute { attribute: "start-suffix", .. }));
        assert!(err.to_string().contains("1:"));
    }
}
