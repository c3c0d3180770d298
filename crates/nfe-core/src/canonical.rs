//! # Canonical XML — Exclusive Canonicalization
//!
//! This module defines `CanonicalXml`, the sole construction path for bytes
//! used in XML digest and signature computation across the stack.
//!
//! ## Security Invariant
//!
//! `CanonicalXml` has a private inner field. The only constructors apply
//! Exclusive XML Canonicalization 1.0 (without comments,
//! `http://www.w3.org/2001/10/xml-exc-c14n#`). Any function that digests or
//! signs XML accepts `&CanonicalXml`, so serializer output can never reach
//! the digest by accident.
//!
//! ## Rules Applied
//!
//! 1. Empty elements are written as start/end tag pairs.
//! 2. A namespace declaration is emitted on an element only when its prefix
//!    is visibly used by the element or one of its attributes and the
//!    nearest output ancestor has not already emitted the same binding.
//!    Declarations inherited from outside the apex are therefore rendered
//!    on the apex when used there.
//! 3. Namespace declarations come first, sorted by prefix (default first);
//!    attributes follow, sorted by namespace URI then local name.
//! 4. Text escapes `&`, `<`, `>` and CR; attributes escape `&`, `<`, `"`,
//!    TAB, LF and CR.
//! 5. With the enveloped-signature transform, `Signature` elements in the
//!    XML-DSig namespace below the apex are omitted.

use std::collections::{BTreeMap, BTreeSet};

use crate::xml::{
    escape_attr_into, escape_text_into, prefix_part, XmlElement, XmlNode, XMLDSIG_NAMESPACE,
};

/// Exclusive canonicalization algorithm identifier.
pub const EXC_C14N_ALGORITHM: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// Enveloped signature transform identifier.
pub const ENVELOPED_SIGNATURE_TRANSFORM: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// Bytes produced exclusively by exclusive XML canonicalization.
///
/// # Invariants
///
/// - Only constructed by [`CanonicalXml::exclusive`] and
///   [`CanonicalXml::exclusive_enveloped`].
/// - UTF-8, no XML declaration, no insignificant whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalXml(Vec<u8>);

impl CanonicalXml {
    /// Canonicalize `element` as the apex of a document subset.
    ///
    /// `inherited` are the namespace bindings `(prefix, uri)` in scope at
    /// the apex from its ancestors; obtain them with
    /// [`XmlElement::namespaces_in_scope`].
    pub fn exclusive(element: &XmlElement, inherited: &[(String, String)]) -> Self {
        Self::render(element, inherited, false)
    }

    /// Canonicalize `element` after applying the enveloped-signature
    /// transform.
    pub fn exclusive_enveloped(element: &XmlElement, inherited: &[(String, String)]) -> Self {
        Self::render(element, inherited, true)
    }

    fn render(element: &XmlElement, inherited: &[(String, String)], enveloped: bool) -> Self {
        let scope: BTreeMap<String, String> = inherited.iter().cloned().collect();
        let mut out = String::new();
        write_canonical(&mut out, element, &scope, &BTreeMap::new(), enveloped);
        Self(out.into_bytes())
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The canonical form as text.
    pub fn as_str(&self) -> &str {
        // Built from a String; always valid UTF-8.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalXml {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn write_canonical(
    out: &mut String,
    element: &XmlElement,
    parent_scope: &BTreeMap<String, String>,
    rendered: &BTreeMap<String, String>,
    enveloped: bool,
) {
    let mut scope = parent_scope.clone();
    for (p, u) in element.namespace_declarations() {
        scope.insert(p.to_string(), u.to_string());
    }

    let mut used: BTreeSet<&str> = BTreeSet::new();
    used.insert(element.prefix().unwrap_or(""));
    for (k, _) in &element.attributes {
        if is_namespace_decl(k) {
            continue;
        }
        if let Some(p) = prefix_part(k) {
            if p != "xml" {
                used.insert(p);
            }
        }
    }

    let mut rendered_here = rendered.clone();
    let mut decls: Vec<(&str, String)> = Vec::new();
    for prefix in used {
        let uri = scope.get(prefix).cloned().unwrap_or_default();
        let already = rendered.get(prefix).cloned().unwrap_or_default();
        if uri == already {
            continue;
        }
        if !prefix.is_empty() && uri.is_empty() {
            // Unbound prefix; nothing meaningful to declare.
            continue;
        }
        rendered_here.insert(prefix.to_string(), uri.clone());
        decls.push((prefix, uri));
    }

    let mut attrs: Vec<(String, &str, &str, &str)> = element
        .attributes
        .iter()
        .filter(|(k, _)| !is_namespace_decl(k))
        .map(|(k, v)| {
            let ns = match prefix_part(k) {
                Some("xml") => "http://www.w3.org/XML/1998/namespace".to_string(),
                Some(p) => scope.get(p).cloned().unwrap_or_default(),
                None => String::new(),
            };
            (ns, crate::xml::local_part(k), k.as_str(), v.as_str())
        })
        .collect();
    attrs.sort_by(|a, b| (a.0.as_str(), a.1).cmp(&(b.0.as_str(), b.1)));

    out.push('<');
    out.push_str(&element.name);
    for (prefix, uri) in &decls {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        escape_attr_into(out, uri);
        out.push('"');
    }
    for (_, _, qname, value) in &attrs {
        out.push(' ');
        out.push_str(qname);
        out.push_str("=\"");
        escape_attr_into(out, value);
        out.push('"');
    }
    out.push('>');

    for child in &element.children {
        match child {
            XmlNode::Text(t) => escape_text_into(out, t),
            XmlNode::Element(e) => {
                if enveloped && is_signature(e, &scope) {
                    continue;
                }
                write_canonical(out, e, &scope, &rendered_here, enveloped);
            }
        }
    }

    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn is_namespace_decl(key: &str) -> bool {
    key == "xmlns" || key.starts_with("xmlns:")
}

fn is_signature(element: &XmlElement, parent_scope: &BTreeMap<String, String>) -> bool {
    if element.local_name() != "Signature" {
        return false;
    }
    let prefix = element.prefix().unwrap_or("");
    let own = element
        .namespace_declarations()
        .find(|(p, _)| *p == prefix)
        .map(|(_, u)| u.to_string());
    let uri = own.or_else(|| parent_scope.get(prefix).cloned());
    uri.as_deref() == Some(XMLDSIG_NAMESPACE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::NFE_NAMESPACE;

    fn nfe() -> XmlElement {
        XmlElement::new("NFe").attr("xmlns", NFE_NAMESPACE).child(
            XmlElement::new("infNFe")
                .attr("versao", "4.00")
                .attr("Id", "NFe1")
                .child(XmlElement::new("ide").leaf("cUF", "35"))
                .child(XmlElement::new("infAdic")),
        )
    }

    #[test]
    fn inherited_default_namespace_rendered_on_apex() {
        let doc = nfe();
        let path = doc.locate_by_id("NFe1").unwrap();
        let scope = doc.namespaces_in_scope(&path);
        let c14n = CanonicalXml::exclusive(doc.element_at(&path).unwrap(), &scope);
        assert_eq!(
            c14n.as_str(),
            "<infNFe xmlns=\"http://www.portalfiscal.inf.br/nfe\" Id=\"NFe1\" versao=\"4.00\">\
             <ide><cUF>35</cUF></ide><infAdic></infAdic></infNFe>"
        );
    }

    #[test]
    fn attributes_sorted_and_namespace_not_repeated() {
        let doc = nfe();
        let c14n = CanonicalXml::exclusive(&doc, &[]);
        let s = c14n.as_str();
        assert!(s.starts_with("<NFe xmlns=\"http://www.portalfiscal.inf.br/nfe\"><infNFe Id="));
        assert_eq!(s.matches("xmlns=").count(), 1);
    }

    #[test]
    fn unused_prefix_declarations_dropped() {
        let el = XmlElement::new("a")
            .attr("xmlns:unused", "urn:u")
            .attr("xmlns:p", "urn:p")
            .child(XmlElement::new("p:b").text("x"));
        let c14n = CanonicalXml::exclusive(&el, &[]);
        assert_eq!(c14n.as_str(), "<a><p:b xmlns:p=\"urn:p\">x</p:b></a>");
    }

    #[test]
    fn enveloped_transform_removes_signature() {
        let el = XmlElement::new("evento")
            .attr("xmlns", NFE_NAMESPACE)
            .leaf("x", "1")
            .child(XmlElement::new("Signature").attr("xmlns", XMLDSIG_NAMESPACE).leaf("v", "z"));
        let with = CanonicalXml::exclusive(&el, &[]);
        let without = CanonicalXml::exclusive_enveloped(&el, &[]);
        assert!(with.as_str().contains("Signature"));
        assert!(!without.as_str().contains("Signature"));
    }

    #[test]
    fn escaping_rules() {
        let el = XmlElement::new("a").attr("v", "\"q\"\t<").text("1 > 0 & \r");
        assert_eq!(
            CanonicalXml::exclusive(&el, &[]).as_str(),
            "<a v=\"&quot;q&quot;&#x9;&lt;\">1 &gt; 0 &amp; &#xD;</a>"
        );
    }

    #[test]
    fn canonical_form_independent_of_attribute_order_and_whitespace() {
        let a = XmlElement::parse("<r b=\"2\" a=\"1\">\n  <c>x</c>\n</r>").unwrap();
        let b = XmlElement::parse("<r a=\"1\" b=\"2\"><c>x</c></r>").unwrap();
        assert_eq!(CanonicalXml::exclusive(&a, &[]), CanonicalXml::exclusive(&b, &[]));
    }
}
