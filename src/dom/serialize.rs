use html_escape::{encode_double_quoted_attribute, encode_text};

use super::{Document, NodeData, NodeId};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub(super) fn outer_html(document: &Document, id: NodeId) -> String {
    let mut output = String::new();
    serialize_node(document, id, &mut output);
    output
}

pub(super) fn inner_html(document: &Document, id: NodeId) -> String {
    let mut output = String::new();
    for child in document.children(id) {
        serialize_node(document, *child, &mut output);
    }
    output
}

fn serialize_node(document: &Document, id: NodeId, output: &mut String) {
    match document.data(id) {
        NodeData::Document => {
            for child in document.children(id) {
                serialize_node(document, *child, output);
            }
        }
        NodeData::Text(text) => output.push_str(&encode_text(text)),
        NodeData::Element(element) => {
            output.push('<');
            output.push_str(&element.tag);
            for (name, value) in &element.attrs {
                output.push(' ');
                output.push_str(name);
                output.push_str("=\"");
                output.push_str(&encode_double_quoted_attribute(value));
                output.push('"');
            }
            output.push('>');
            if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                return;
            }
            for child in document.children(id) {
                serialize_node(document, *child, output);
            }
            output.push_str("</");
            output.push_str(&element.tag);
            output.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::Document;

    #[test]
    fn serializes_void_and_escaped_content() {
        let mut doc = Document::new();
        let root = doc.root();
        let div = doc.create_element_with("div", &[("title", "a\"b")]);
        doc.append_child(root, div).unwrap();
        let input = doc.create_element_with("input", &[("value", "x")]);
        doc.append_child(div, input).unwrap();
        let text = doc.create_text("1 < 2");
        doc.append_child(div, text).unwrap();

        assert_eq!(
            doc.to_html(div),
            "<div title=\"a&quot;b\"><input value=\"x\">1 &lt; 2</div>"
        );
        assert_eq!(doc.inner_html(div), "<input value=\"x\">1 &lt; 2");
    }
}
