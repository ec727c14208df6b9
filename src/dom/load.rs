use kuchiki::traits::*;
use kuchiki::NodeRef;

use super::{Document, ElementData, NodeId};

/// Build a live document from a full HTML page.
pub fn parse_html(html: &str) -> Document {
    let parsed = kuchiki::parse_html().one(html);
    let mut document = Document::new();
    let root = document.root();
    for child in parsed.children() {
        if let Some(imported) = import(&mut document, &child) {
            // freshly created nodes cannot form a cycle under the root
            let _ = document.append_child(root, imported);
        }
    }
    document
}

/// Parse an HTML fragment into detached nodes owned by `document`.
pub fn parse_fragment(document: &mut Document, html: &str) -> Vec<NodeId> {
    let parsed = kuchiki::parse_html().one(format!("<html><body>{html}</body></html>"));
    let Ok(body) = parsed.select_first("body") else {
        return Vec::new();
    };
    body.as_node()
        .children()
        .filter_map(|child| import(document, &child))
        .collect()
}

fn import(document: &mut Document, node: &NodeRef) -> Option<NodeId> {
    match node.data() {
        kuchiki::NodeData::Element(element) => {
            let attrs = element
                .attributes
                .borrow()
                .map
                .iter()
                .map(|(name, attr)| (name.local.to_string(), attr.value.clone()))
                .collect();
            let id = document.create_element_data(ElementData {
                tag: element.name.local.to_string(),
                attrs,
            });
            for child in node.children() {
                if let Some(imported) = import(document, &child) {
                    let _ = document.append_child(id, imported);
                }
            }
            Some(id)
        }
        kuchiki::NodeData::Text(text) => Some(document.create_text(&text.borrow())),
        _ => None,
    }
}
