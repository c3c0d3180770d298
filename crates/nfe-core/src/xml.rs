//! # XML Tree — Ordered Element Model, Writer and Parser
//!
//! Fiscal documents are assembled as an `XmlElement` tree. Children keep
//! insertion order, which is the order the authority's schema mandates, so
//! the builder's call sequence *is* the wire order.
//!
//! Parsing uses `quick-xml`. Whitespace-only text between elements is
//! dropped (the layout has no mixed content); comments, processing
//! instructions and the XML declaration are skipped.
//!
//! Parse-then-serialize reproduces the input bytes only for XML written by
//! [`XmlElement::to_document`]. Indented input comes back compact.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::XmlError;

/// Default namespace of fiscal documents.
pub const NFE_NAMESPACE: &str = "http://www.portalfiscal.inf.br/nfe";

/// XML digital signature namespace.
pub const XMLDSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML declaration prefixed to serialized documents.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// A node in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element with ordered attributes and children.
///
/// `name` is the qualified name as written (`ds:Signature` or `NFe`).
/// Namespace declarations are stored as ordinary `xmlns`/`xmlns:p`
/// attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
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

    // ─── Construction ────────────────────────────────────────────────

    /// Add an attribute (builder style).
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Set or replace an attribute in place.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Append a text node (builder style).
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Append a child element (builder style).
    pub fn child(mut self, element: XmlElement) -> Self {
        self.children.push(XmlNode::Element(element));
        self
    }

    /// Append `<name>text</name>` (builder style).
    pub fn leaf(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.child(XmlElement::new(name).text(text))
    }

    /// Append `<name>text</name>` only when `text` is present.
    pub fn opt_leaf(self, name: impl Into<String>, text: Option<impl Into<String>>) -> Self {
        match text {
            Some(t) => self.leaf(name, t),
            None => self,
        }
    }

    /// Append `element` only when present.
    pub fn opt_child(self, element: Option<XmlElement>) -> Self {
        match element {
            Some(e) => self.child(e),
            None => self,
        }
    }

    /// Append a child element in place.
    pub fn push(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    // ─── Navigation ──────────────────────────────────────────────────

    /// Attribute value by qualified name.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Name without prefix.
    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// Namespace prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    /// Concatenated direct text content.
    pub fn text_content(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Direct child elements in order.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First direct child with the given local name.
    pub fn find_child(&self, local: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.local_name() == local)
    }

    /// All direct children with the given local name.
    pub fn find_children<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.child_elements().filter(move |e| e.local_name() == local)
    }

    /// Text of the first direct child with the given local name.
    pub fn child_text(&self, local: &str) -> Option<String> {
        self.find_child(local).map(XmlElement::text_content)
    }

    /// Follow a chain of child local names.
    pub fn path(&self, names: &[&str]) -> Option<&XmlElement> {
        let mut current = self;
        for name in names {
            current = current.find_child(name)?;
        }
        Some(current)
    }

    /// First element (self included, pre-order) with the given local name.
    pub fn find_descendant(&self, local: &str) -> Option<&XmlElement> {
        if self.local_name() == local {
            return Some(self);
        }
        self.child_elements().find_map(|c| c.find_descendant(local))
    }

    /// Child-index path (self included, pre-order) to the first element
    /// satisfying `pred`. An empty path denotes `self`.
    pub fn locate(&self, pred: &dyn Fn(&XmlElement) -> bool) -> Option<Vec<usize>> {
        if pred(self) {
            return Some(Vec::new());
        }
        for (i, node) in self.children.iter().enumerate() {
            if let XmlNode::Element(child) = node {
                if let Some(mut rest) = child.locate(pred) {
                    rest.insert(0, i);
                    return Some(rest);
                }
            }
        }
        None
    }

    /// Path to the element whose `Id` attribute equals `id`.
    pub fn locate_by_id(&self, id: &str) -> Option<Vec<usize>> {
        self.locate(&|e| e.attribute("Id") == Some(id))
    }

    /// Element at a child-index path.
    pub fn element_at(&self, path: &[usize]) -> Option<&XmlElement> {
        let mut current = self;
        for &i in path {
            current = match current.children.get(i)? {
                XmlNode::Element(e) => e,
                XmlNode::Text(_) => return None,
            };
        }
        Some(current)
    }

    /// Mutable element at a child-index path.
    pub fn element_at_mut(&mut self, path: &[usize]) -> Option<&mut XmlElement> {
        let mut current = self;
        for &i in path {
            current = match current.children.get_mut(i)? {
                XmlNode::Element(e) => e,
                XmlNode::Text(_) => return None,
            };
        }
        Some(current)
    }

    /// Namespace declarations made directly on this element, as
    /// `(prefix, uri)` with `""` for the default namespace.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|(k, v)| {
            if k == "xmlns" {
                Some(("", v.as_str()))
            } else {
                k.strip_prefix("xmlns:").map(|p| (p, v.as_str()))
            }
        })
    }

    /// Declarations visible at the element at `path`, contributed by its
    /// ancestors (the element's own declarations are not included).
    /// Nearer declarations override farther ones.
    pub fn namespaces_in_scope(&self, path: &[usize]) -> Vec<(String, String)> {
        let mut scope: Vec<(String, String)> = Vec::new();
        let mut current = self;
        for &i in path {
            for (p, u) in current.namespace_declarations() {
                scope.retain(|(sp, _)| sp != p);
                scope.push((p.to_string(), u.to_string()));
            }
            current = match current.children.get(i) {
                Some(XmlNode::Element(e)) => e,
                _ => break,
            };
        }
        scope
    }

    // ─── Serialization ───────────────────────────────────────────────

    /// Serialize without an XML declaration.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        write_element(&mut out, self);
        out
    }

    /// Serialize with the UTF-8 XML declaration.
    pub fn to_document(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        write_element(&mut out, self);
        out
    }

    // ─── Parsing ─────────────────────────────────────────────────────

    /// Parse a document and return its root element.
    pub fn parse(input: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(input);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => stack.push(element_from_start(&start)?),
                Ok(Event::Empty(start)) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(end)) => {
                    let found = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                    let element = stack.pop().ok_or_else(|| {
                        XmlError::Malformed(format!("unexpected closing tag </{found}>"))
                    })?;
                    if element.name != found {
                        return Err(XmlError::MismatchedTag {
                            expected: element.name,
                            found,
                        });
                    }
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(text)) => {
                    let value = text
                        .unescape()
                        .map_err(|e| XmlError::Malformed(e.to_string()))?;
                    push_text(&mut stack, &value)?;
                }
                Ok(Event::CData(data)) => {
                    let value = String::from_utf8_lossy(&data).into_owned();
                    push_text(&mut stack, &value)?;
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(XmlError::Malformed(e.to_string())),
            }
        }

        if let Some(open) = stack.pop() {
            return Err(XmlError::Malformed(format!("unclosed element <{}>", open.name)));
        }
        root.ok_or(XmlError::NoRoot)
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((p, l)) => (Some(p), l),
        None => (None, name),
    }
}

/// Local name of a qualified attribute or element name.
pub fn local_part(qname: &str) -> &str {
    split_qname(qname).1
}

/// Prefix of a qualified attribute or element name.
pub fn prefix_part(qname: &str) -> Option<&str> {
    split_qname(qname).0
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Malformed(e.to_string()))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Element(element));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XmlError::Malformed("multiple root elements".into())),
    }
}

fn push_text(stack: &mut [XmlElement], value: &str) -> Result<(), XmlError> {
    if value.trim().is_empty() {
        return Ok(());
    }
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Text(value.to_string()));
            Ok(())
        }
        None => Err(XmlError::Malformed("text outside the root element".into())),
    }
}

fn write_element(out: &mut String, element: &XmlElement) {
    out.push('<');
    out.push_str(&element.name);
    for (k, v) in &element.attributes {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        escape_attr_into(out, v);
        out.push('"');
    }
    // Empty text leaves no trace; the parser would not recreate it.
    if element
        .children
        .iter()
        .all(|c| matches!(c, XmlNode::Text(t) if t.is_empty()))
    {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_element(out, e),
            XmlNode::Text(t) => escape_text_into(out, t),
        }
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

/// Escape character data (`&`, `<`, `>`, carriage return).
pub(crate) fn escape_text_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
}

/// Escape an attribute value (`&`, `<`, `"`, tab, newline, carriage return).
pub(crate) fn escape_attr_into(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> XmlElement {
        XmlElement::new("NFe")
            .attr("xmlns", NFE_NAMESPACE)
            .child(
                XmlElement::new("infNFe")
                    .attr("Id", "NFe123")
                    .attr("versao", "4.00")
                    .child(XmlElement::new("ide").leaf("cUF", "35").leaf("nNF", "4"))
                    .child(XmlElement::new("emit").leaf("xNome", "A & B <Ltda>")),
            )
    }

    #[test]
    fn writer_preserves_order_and_escapes() {
        let xml = sample().to_xml();
        assert_eq!(
            xml,
            "<NFe xmlns=\"http://www.portalfiscal.inf.br/nfe\">\
             <infNFe Id=\"NFe123\" versao=\"4.00\">\
             <ide><cUF>35</cUF><nNF>4</nNF></ide>\
             <emit><xNome>A &amp; B &lt;Ltda&gt;</xNome></emit>\
             </infNFe></NFe>"
        );
    }

    #[test]
    fn document_has_declaration() {
        assert!(sample().to_document().starts_with(XML_DECLARATION));
    }

    #[test]
    fn parse_roundtrips_writer_output() {
        let original = sample();
        let parsed = XmlElement::parse(&original.to_document()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn written_documents_survive_parse_byte_for_byte() {
        let original = sample()
            .leaf("empty", "")
            .leaf("text", "a &amp; b\r\n  c")
            .attr("note", "x\ty");
        let written = original.to_document();
        assert!(written.contains("<empty/>"));
        let reparsed = XmlElement::parse(&written).unwrap();
        assert_eq!(reparsed.to_document(), written);
    }

    #[test]
    fn indented_input_does_not_round_trip() {
        let input = "<a>\n  <b>x</b>\n</a>";
        let reparsed = XmlElement::parse(input).unwrap();
        assert_eq!(reparsed.to_xml(), "<a><b>x</b></a>");
    }

    #[test]
    fn parse_drops_indentation_whitespace() {
        let input = "<a>\n  <b>x</b>\n  <c/>\n</a>";
        let parsed = XmlElement::parse(input).unwrap();
        assert_eq!(parsed.child_elements().count(), 2);
        assert_eq!(parsed.child_text("b").as_deref(), Some("x"));
    }

    #[test]
    fn parse_keeps_prefixes_and_unescapes() {
        let input = r#"<soap:Envelope xmlns:soap="urn:s"><soap:Body><r a="1 &amp; 2">x &lt; y</r></soap:Body></soap:Envelope>"#;
        let parsed = XmlElement::parse(input).unwrap();
        assert_eq!(parsed.prefix(), Some("soap"));
        assert_eq!(parsed.local_name(), "Envelope");
        let r = parsed.path(&["Body", "r"]).unwrap();
        assert_eq!(r.attribute("a"), Some("1 & 2"));
        assert_eq!(r.text_content(), "x < y");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(XmlElement::parse("<a><b></a>").is_err());
        assert!(XmlElement::parse("").is_err());
        assert!(XmlElement::parse("<a></a><b></b>").is_err());
        assert!(XmlElement::parse("<a>").is_err());
    }

    #[test]
    fn locate_by_id_and_element_at() {
        let doc = sample();
        let path = doc.locate_by_id("NFe123").unwrap();
        assert_eq!(path, vec![0]);
        assert_eq!(doc.element_at(&path).unwrap().local_name(), "infNFe");
        assert!(doc.locate_by_id("missing").is_none());
    }

    #[test]
    fn namespaces_in_scope_collects_ancestors() {
        let doc = sample();
        let scope = doc.namespaces_in_scope(&[0]);
        assert_eq!(scope, vec![(String::new(), NFE_NAMESPACE.to_string())]);
        assert!(doc.namespaces_in_scope(&[]).is_empty());
    }

    #[test]
    fn set_attr_replaces_existing() {
        let mut e = XmlElement::new("a").attr("k", "1");
        e.set_attr("k", "2");
        assert_eq!(e.attributes, vec![("k".to_string(), "2".to_string())]);
    }

    #[test]
    fn find_descendant_is_preorder() {
        let doc = sample();
        assert_eq!(doc.find_descendant("nNF").unwrap().text_content(), "4");
        assert!(doc.find_descendant("det").is_none());
    }
}
