//! Repeat topology, iteration id suffixes and iteration boundaries.
//!
//! An element inside iteration `3` of repeat `inner`, itself inside iteration
//! `2` of `outer`, carries the id `base·2-3`. Iterations of one repeat instance
//! are laid out as siblings between the `repeat-begin-R` and `repeat-end-R`
//! markers, each one introduced by a delimiter element. A top-level repeat
//! keeps its template as the last iteration.

use std::collections::HashMap;

use serde::Serialize;

use crate::dom::{Document, NodeId};
use crate::markers;

pub const FIRST_SEPARATOR: char = '\u{b7}';
pub const INDEX_SEPARATOR: char = '-';

/// Suffix appended to ids for the given iteration path, empty for none.
pub fn suffix(indexes: &[u32]) -> String {
    if indexes.is_empty() {
        return String::new();
    }
    let joined: Vec<String> = indexes.iter().map(u32::to_string).collect();
    format!("{FIRST_SEPARATOR}{}", joined.join(&INDEX_SEPARATOR.to_string()))
}

pub fn suffixed(id: &str, indexes: &[u32]) -> String {
    format!("{id}{}", suffix(indexes))
}

/// Split an effective id into its base id and iteration path.
pub fn split_suffix(id: &str) -> (&str, Vec<u32>) {
    match id.split_once(FIRST_SEPARATOR) {
        Some((base, path)) => (
            base,
            path.split(INDEX_SEPARATOR)
                .filter_map(|part| part.parse().ok())
                .collect(),
        ),
        None => (id, Vec::new()),
    }
}

pub fn begin_marker(repeat_id: &str, parent_indexes: &[u32]) -> String {
    suffixed(&format!("{}{repeat_id}", markers::REPEAT_BEGIN_PREFIX), parent_indexes)
}

pub fn end_marker(repeat_id: &str, parent_indexes: &[u32]) -> String {
    suffixed(&format!("{}{repeat_id}", markers::REPEAT_END_PREFIX), parent_indexes)
}

/// How a sibling affects repeat nesting while walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Begin,
    End,
    Delimiter,
    Other,
}

pub fn boundary(document: &Document, node: NodeId) -> Boundary {
    if !document.is_element(node) {
        return Boundary::Other;
    }
    if document.has_class(node, markers::REPEAT_BEGIN_END) {
        let id = document.id_of(node).unwrap_or_default();
        if id.starts_with(markers::REPEAT_BEGIN_PREFIX) {
            return Boundary::Begin;
        }
        if id.starts_with(markers::REPEAT_END_PREFIX) {
            return Boundary::End;
        }
    }
    if document.has_class(node, markers::REPEAT_DELIMITER) {
        return Boundary::Delimiter;
    }
    Boundary::Other
}

/// Walk back from `end` to the closest delimiter of the same repeat.
pub fn last_delimiter_before(document: &Document, end: NodeId) -> Option<NodeId> {
    let mut depth = 0usize;
    let mut current = document.previous_sibling(end);
    while let Some(node) = current {
        match boundary(document, node) {
            Boundary::End => depth += 1,
            Boundary::Begin => depth = depth.saturating_sub(1),
            Boundary::Delimiter if depth == 0 => return Some(node),
            _ => {}
        }
        current = document.previous_sibling(node);
    }
    None
}

/// Nodes of the 1-based iteration `index` of a repeat instance.
pub fn iteration_nodes(
    document: &Document,
    repeat_id: &str,
    parent_indexes: &[u32],
    index: u32,
) -> Vec<NodeId> {
    let Some(begin) = document.get_element_by_id(&begin_marker(repeat_id, parent_indexes)) else {
        return Vec::new();
    };
    let mut nodes = Vec::new();
    let mut depth = 0usize;
    let mut seen = 0u32;
    let mut current = document.next_sibling(begin);
    while let Some(node) = current {
        match boundary(document, node) {
            Boundary::End if depth == 0 => break,
            Boundary::Delimiter if depth == 0 => {
                seen += 1;
                if seen > index {
                    break;
                }
                current = document.next_sibling(node);
                continue;
            }
            Boundary::Begin => depth += 1,
            Boundary::End => depth -= 1,
            _ => {}
        }
        if seen == index && !document.has_class(node, markers::REPEAT_TEMPLATE) {
            nodes.push(node);
        }
        current = document.next_sibling(node);
    }
    nodes
}

/// Parent/child relations between repeats and their current indexes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepeatTopology {
    parents: HashMap<String, String>,
    descendants: HashMap<String, Vec<String>>,
    indexes: HashMap<String, u32>,
}

impl RepeatTopology {
    /// `tree` lists `child parent` pairs (or a lone top-level id) separated by
    /// commas; `indexes` lists `id index` pairs the same way.
    pub fn parse(tree: &str, indexes: &str) -> Self {
        let mut topology = Self::default();
        for entry in tree.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.split_ascii_whitespace();
            let (Some(child), parent) = (parts.next(), parts.next()) else {
                continue;
            };
            if let Some(parent) = parent {
                topology
                    .parents
                    .insert(child.to_string(), parent.to_string());
            }
        }
        let children: Vec<String> = topology.parents.keys().cloned().collect();
        for child in children {
            let mut ancestor = topology.parents.get(&child).cloned();
            while let Some(parent) = ancestor {
                topology
                    .descendants
                    .entry(parent.clone())
                    .or_default()
                    .push(child.clone());
                ancestor = topology.parents.get(&parent).cloned();
            }
        }
        for list in topology.descendants.values_mut() {
            list.sort();
        }
        for entry in indexes.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.split_ascii_whitespace();
            if let (Some(id), Some(Ok(index))) = (parts.next(), parts.next().map(str::parse)) {
                topology.indexes.insert(id.to_string(), index);
            }
        }
        topology
    }

    pub fn parent(&self, repeat_id: &str) -> Option<&str> {
        self.parents.get(repeat_id).map(String::as_str)
    }

    pub fn descendants(&self, repeat_id: &str) -> &[String] {
        self.descendants
            .get(repeat_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of repeats enclosing `repeat_id`.
    pub fn depth(&self, repeat_id: &str) -> usize {
        let mut depth = 0;
        let mut current = self.parent(repeat_id);
        while let Some(parent) = current {
            depth += 1;
            current = self.parent(parent);
        }
        depth
    }

    pub fn index(&self, repeat_id: &str) -> Option<u32> {
        self.indexes.get(repeat_id).copied()
    }

    pub fn set_index(&mut self, repeat_id: &str, index: u32) {
        self.indexes.insert(repeat_id.to_string(), index);
    }

    /// Iteration path of the current iterations of every repeat enclosing `repeat_id`.
    pub fn current_parent_indexes(&self, repeat_id: &str) -> Vec<u32> {
        let mut path = Vec::new();
        let mut current = self.parent(repeat_id);
        while let Some(parent) = current {
            path.push(self.index(parent).unwrap_or(1));
            current = self.parent(parent);
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    #[test]
    fn suffixes_use_two_separators() {
        assert_eq!(suffix(&[]), "");
        assert_eq!(suffixed("c", &[2]), "c\u{b7}2");
        assert_eq!(suffixed("c", &[2, 1, 3]), "c\u{b7}2-1-3");
        assert_eq!(split_suffix("c\u{b7}2-1"), ("c", vec![2, 1]));
        assert_eq!(split_suffix("plain"), ("plain", vec![]));
        assert_eq!(end_marker("r", &[4]), "repeat-end-r\u{b7}4");
    }

    #[test]
    fn parses_tree_and_indexes() {
        let topology = RepeatTopology::parse("outer,inner outer,leaf inner", "outer 2,inner 1,leaf 3");
        assert_eq!(topology.parent("inner"), Some("outer"));
        assert_eq!(topology.parent("outer"), None);
        assert_eq!(topology.descendants("outer"), &["inner".to_string(), "leaf".to_string()]);
        assert_eq!(topology.depth("leaf"), 2);
        assert_eq!(topology.index("leaf"), Some(3));
        assert_eq!(topology.current_parent_indexes("leaf"), vec![2, 1]);
    }

    #[test]
    fn finds_iterations_between_delimiters() {
        let doc = parse_html(concat!(
            r#"<div id="host">"#,
            r#"<span id="repeat-begin-r" class="xforms-repeat-begin-end"></span>"#,
            r#"<span class="xforms-repeat-delimiter"></span><div id="a·1">one</div>"#,
            r#"<span class="xforms-repeat-delimiter"></span><div id="a·2">two</div>"#,
            r#"<span class="xforms-repeat-delimiter"></span><div id="a" class="xforms-repeat-template">tpl</div>"#,
            r#"<span id="repeat-end-r" class="xforms-repeat-begin-end"></span>"#,
            "</div>"
        ));
        let second = iteration_nodes(&doc, "r", &[], 2);
        assert_eq!(second, vec![doc.get_element_by_id("a·2").unwrap()]);
        assert!(iteration_nodes(&doc, "r", &[], 3).is_empty());

        let end = doc.get_element_by_id("repeat-end-r").unwrap();
        let delimiter = last_delimiter_before(&doc, end).unwrap();
        assert_eq!(
            doc.next_sibling(delimiter),
            doc.get_element_by_id("a")
        );
    }
}
