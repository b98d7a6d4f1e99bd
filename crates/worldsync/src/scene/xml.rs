use roxmltree::{Document, Node};
use thiserror::Error;

pub(crate) const XML_DECLARATION: &str = "<?xml version='1.0' encoding='utf-8'?>\n";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed XML at line {line}, column {column}: {message}")]
pub struct XmlParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    Comment(String),
}

/// Owned, mutable element tree. Parsing goes through `roxmltree`; writing is
/// done here so the scene document can be edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// `<name>text</name>`
    pub fn leaf(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name).with_text(text)
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|element| element.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(element) if element.name == name => Some(element),
            _ => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.child_elements()
            .filter(move |element| element.name == name)
    }

    /// Depth-first search below this element, document order.
    pub fn find_descendant(&self, name: &str) -> Option<&XmlElement> {
        for child in self.child_elements() {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(name) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated direct text content, trimmed. `None` when empty.
    pub fn text(&self) -> Option<String> {
        let joined = self
            .children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<String>();
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Removes direct child elements matching `predicate`; returns how many.
    pub fn remove_children_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&XmlElement) -> bool,
    {
        let before = self.children.len();
        self.children.retain(|node| match node {
            XmlNode::Element(element) => !predicate(element),
            _ => true,
        });
        before - self.children.len()
    }

    pub fn parse(raw: &str) -> Result<Self, XmlParseError> {
        let doc = Document::parse(raw).map_err(|error| XmlParseError {
            message: error.to_string(),
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        })?;
        Ok(from_node(doc.root_element()))
    }

    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write_into(&mut out);
        out
    }

    pub fn write_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            push_escaped(out, value, true);
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str(" />");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlNode::Element(element) => element.write_into(out),
                XmlNode::Text(text) => push_escaped(out, text, false),
                XmlNode::Comment(comment) => {
                    out.push_str("<!--");
                    out.push_str(comment);
                    out.push_str("-->");
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn from_node(node: Node<'_, '_>) -> XmlElement {
    let mut element = XmlElement::new(node.tag_name().name());
    for attribute in node.attributes() {
        element
            .attributes
            .push((attribute.name().to_string(), attribute.value().to_string()));
    }
    for child in node.children() {
        if child.is_element() {
            element.children.push(XmlNode::Element(from_node(child)));
        } else if child.is_text() {
            if let Some(text) = child.text() {
                element.children.push(XmlNode::Text(text.to_string()));
            }
        } else if child.is_comment() {
            if let Some(text) = child.text() {
                element.children.push(XmlNode::Comment(text.to_string()));
            }
        }
    }
    element
}

fn push_escaped(out: &mut String, raw: &str, in_attribute: bool) {
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            '\n' if in_attribute => out.push_str("&#10;"),
            _ => out.push(ch),
        }
    }
}
