//! Arena-backed live document.
//!
//! Every node lives in one `Vec` and is addressed by [`NodeId`]. Children are
//! materialized per node, so range scans (repeat iterations, group and case
//! boundaries) are slices over a child vector instead of sibling pointer
//! walks. Detached nodes stay in the arena; only nodes connected to the root
//! are reachable through the id index.

mod load;
mod serialize;

use std::collections::HashMap;

use thiserror::Error;

pub use load::{parse_fragment, parse_html};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomError {
    #[error("no element with id '{0}'")]
    MissingElement(String),
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),
    #[error("node {child:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, child: NodeId },
    #[error("inserting {child:?} under {parent:?} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    id_index: HashMap<String, NodeId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
            root: NodeId(0),
            id_index: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.create_element_with(tag, &[])
    }

    pub fn create_element_with(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let data = ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs: attrs
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        };
        self.push(NodeData::Element(data))
    }

    pub fn create_element_data(&mut self, mut data: ElementData) -> NodeId {
        data.tag = data.tag.to_ascii_lowercase();
        self.push(NodeData::Element(data))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.node(id).data
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.node(id).data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData, DomError> {
        match &mut self.node_mut(id).data {
            NodeData::Element(element) => Ok(element),
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|element| element.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
            .collect()
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(id)?;
        let index = self.children(parent).iter().position(|c| *c == id)?;
        Some((parent, index))
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, index) = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, index) = self.index_in_parent(id)?;
        index
            .checked_sub(1)
            .and_then(|prev| self.children(parent).get(prev).copied())
    }

    /// Ancestors from the parent up to (and including) the document root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            document: self,
            next: self.parent(id),
        }
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        id == self.root || self.ancestors(id).any(|a| a == self.root)
    }

    /// Pre-order walk of `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            for child in self.children(current).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    pub fn find_descendant(&self, id: NodeId, pred: impl Fn(&Self, NodeId) -> bool) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .skip(1)
            .find(|node| pred(self, *node))
    }

    pub fn find_descendants(&self, id: NodeId, pred: impl Fn(&Self, NodeId) -> bool) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .skip(1)
            .filter(|node| pred(self, *node))
            .collect()
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.id_index.get(id).copied()
    }

    pub fn require(&self, id: &str) -> Result<NodeId, DomError> {
        self.get_element_by_id(id)
            .ok_or_else(|| DomError::MissingElement(id.to_string()))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn id_of(&self, id: NodeId) -> Option<&str> {
        self.attr(id, "id")
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let previous_id = if name == "id" {
            self.id_of(id).map(str::to_string)
        } else {
            None
        };
        let element = self.element_mut(id)?;
        match element.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => element.attrs.push((name.to_string(), value.to_string())),
        }
        if name == "id" && self.is_connected(id) {
            if let Some(previous) = previous_id {
                if self.id_index.get(&previous) == Some(&id) {
                    self.id_index.remove(&previous);
                }
            }
            self.id_index.insert(value.to_string(), id);
        }
        Ok(())
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        if name == "id" {
            if let Some(previous) = self.id_of(id).map(str::to_string) {
                if self.id_index.get(&previous) == Some(&id) {
                    self.id_index.remove(&previous);
                }
            }
        }
        self.element_mut(id)?.attrs.retain(|(key, _)| key != name);
        Ok(())
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    pub fn classes(&self, id: NodeId) -> impl Iterator<Item = &str> {
        self.attr(id, "class")
            .unwrap_or_default()
            .split_ascii_whitespace()
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.classes(id).any(|c| c == class)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<(), DomError> {
        if self.has_class(id, class) {
            return Ok(());
        }
        let mut classes: Vec<String> = self.classes(id).map(str::to_string).collect();
        classes.push(class.to_string());
        self.set_attr(id, "class", &classes.join(" "))
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> Result<(), DomError> {
        if !self.has_class(id, class) {
            return Ok(());
        }
        let classes: Vec<String> = self
            .classes(id)
            .filter(|c| *c != class)
            .map(str::to_string)
            .collect();
        self.set_attr(id, "class", &classes.join(" "))
    }

    pub fn toggle_class(&mut self, id: NodeId, class: &str, on: bool) -> Result<(), DomError> {
        if on {
            self.add_class(id, class)
        } else {
            self.remove_class(id, class)
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` under `parent` before `reference`, or last when `reference` is `None`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        if child == parent || self.ancestors(parent).any(|a| a == child) {
            return Err(DomError::Cycle { parent, child });
        }
        if let Some(reference) = reference {
            if reference == child {
                return Ok(());
            }
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotAChild {
                    parent,
                    child: reference,
                });
            }
        }
        self.detach(child);
        let len = self.children(parent).len();
        let position = reference
            .and_then(|reference| self.children(parent).iter().position(|c| *c == reference))
            .unwrap_or(len);
        self.node_mut(parent).children.insert(position, child);
        self.node_mut(child).parent = Some(parent);
        if self.is_connected(parent) {
            self.index_subtree(child);
        }
        Ok(())
    }

    /// Remove `id` from its parent. The subtree stays in the arena, unindexed.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if self.is_connected(id) {
            self.unindex_subtree(id);
        }
        self.node_mut(parent).children.retain(|c| *c != id);
        self.node_mut(id).parent = None;
    }

    pub fn clear_children(&mut self, id: NodeId) {
        let children = self.children(id).to_vec();
        for child in children {
            self.detach(child);
        }
    }

    pub fn replace_children(&mut self, id: NodeId, children: Vec<NodeId>) -> Result<(), DomError> {
        self.clear_children(id);
        for child in children {
            self.append_child(id, child)?;
        }
        Ok(())
    }

    /// Deep copy of a subtree. The copy is detached and not yet in the id index.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let data = self.node(id).data.clone();
        let copy = self.push(data);
        let children = self.children(id).to_vec();
        for child in children {
            let child_copy = self.clone_subtree(child);
            self.node_mut(copy).children.push(child_copy);
            self.node_mut(child_copy).parent = Some(copy);
        }
        copy
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let NodeData::Text(text) = &self.node(node).data {
                out.push_str(text);
            }
        }
        out
    }

    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> Result<(), DomError> {
        if let NodeData::Text(existing) = &mut self.node_mut(id).data {
            *existing = text.to_string();
            return Ok(());
        }
        self.clear_children(id);
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append_child(id, text_node)?;
        }
        Ok(())
    }

    fn index_subtree(&mut self, id: NodeId) {
        for node in self.descendants(id) {
            if let Some(element_id) = self.id_of(node).map(str::to_string) {
                self.id_index.insert(element_id, node);
            }
        }
    }

    fn unindex_subtree(&mut self, id: NodeId) {
        for node in self.descendants(id) {
            if let Some(element_id) = self.id_of(node) {
                if self.id_index.get(element_id) == Some(&node) {
                    let key = element_id.to_string();
                    self.id_index.remove(&key);
                }
            }
        }
    }

    pub fn to_html(&self, id: NodeId) -> String {
        serialize::outer_html(self, id)
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        serialize::inner_html(self, id)
    }
}

pub struct Ancestors<'a> {
    document: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.document.parent(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let form = doc.create_element_with("form", &[("id", "f"), ("class", "xforms-form")]);
        doc.append_child(root, form).unwrap();
        let input = doc.create_element_with("input", &[("id", "i1"), ("value", "a")]);
        doc.append_child(form, input).unwrap();
        (doc, form, input)
    }

    #[test]
    fn indexes_connected_ids_only() {
        let (mut doc, form, _) = sample();
        assert!(doc.get_element_by_id("i1").is_some());

        let loose = doc.create_element_with("span", &[("id", "loose")]);
        assert!(doc.get_element_by_id("loose").is_none());

        doc.append_child(form, loose).unwrap();
        assert_eq!(doc.get_element_by_id("loose"), Some(loose));

        doc.detach(loose);
        assert!(doc.get_element_by_id("loose").is_none());
    }

    #[test]
    fn class_helpers_roundtrip() {
        let (mut doc, form, _) = sample();
        doc.add_class(form, "xforms-disabled").unwrap();
        assert!(doc.has_class(form, "xforms-disabled"));
        assert_eq!(doc.attr(form, "class"), Some("xforms-form xforms-disabled"));
        doc.remove_class(form, "xforms-form").unwrap();
        assert_eq!(doc.attr(form, "class"), Some("xforms-disabled"));
    }

    #[test]
    fn insert_before_reference() {
        let (mut doc, form, input) = sample();
        let label = doc.create_element_with("label", &[("for", "i1")]);
        doc.insert_before(form, label, Some(input)).unwrap();
        assert_eq!(doc.children(form), &[label, input]);
        assert_eq!(doc.previous_sibling(input), Some(label));
        assert_eq!(doc.next_sibling(label), Some(input));
    }

    #[test]
    fn moving_within_same_parent_keeps_order() {
        let (mut doc, form, input) = sample();
        let other = doc.create_element("b");
        doc.append_child(form, other).unwrap();
        doc.insert_before(form, other, Some(input)).unwrap();
        assert_eq!(doc.children(form), &[other, input]);
    }

    #[test]
    fn rejects_cycles() {
        let (mut doc, form, input) = sample();
        assert_eq!(
            doc.append_child(input, form),
            Err(DomError::Cycle {
                parent: input,
                child: form
            })
        );
    }

    #[test]
    fn clone_is_detached_and_deep() {
        let (mut doc, form, _) = sample();
        let copy = doc.clone_subtree(form);
        assert!(doc.parent(copy).is_none());
        assert_eq!(doc.children(copy).len(), 1);
        assert_eq!(doc.get_element_by_id("f"), Some(form));
    }

    #[test]
    fn text_content_replaces_children() {
        let (mut doc, form, _) = sample();
        doc.set_text_content(form, "hello").unwrap();
        assert_eq!(doc.text_content(form), "hello");
        assert!(doc.get_element_by_id("i1").is_none());
    }

    #[test]
    fn changing_id_updates_index() {
        let (mut doc, _, input) = sample();
        doc.set_attr(input, "id", "i2").unwrap();
        assert!(doc.get_element_by_id("i1").is_none());
        assert_eq!(doc.get_element_by_id("i2"), Some(input));
    }
}
