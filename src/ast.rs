//! The markup tree that definition documents are parsed into.
//!
//! The tree is deliberately small: elements with ordered attributes and ordered
//! content. Whitespace-only text is kept apart from real text so that class-like
//! nodes can skip formatting without losing it when a tree is written back out.

use std::fmt::Write;

/// Attributes with a special meaning to the loader.
pub mod attr {
    pub const TYPE: &str = "Type";
    pub const PARENT: &str = "Parent";
    pub const ABSTRACT: &str = "Abstract";
    pub const INHERIT: &str = "Inherit";
    pub const NULL: &str = "Null";
    pub const IS_LIST: &str = "IsList";
    pub const ELEMENT_TYPE: &str = "ElementType";
    pub const KEY_TYPE: &str = "KeyType";
}

/// A parsed markup document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    /// The single root element, or `None` for a document holding only a
    /// declaration, comments or whitespace.
    pub root: Option<Element>,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Document { root: Some(root) }
    }

    /// The top level definitions of this document: the element children of the root.
    pub fn definitions(&self) -> impl Iterator<Item = &Element> {
        self.root.iter().flat_map(|root| root.elements())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Element(Element),
    Text(String),
    Whitespace(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

impl Content {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Content::Element(e) => Some(e),
            _ => None,
        }
    }

    /// A short name for the node kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Content::Element(_) => "element",
            Content::Text(_) => "text",
            Content::Whitespace(_) => "whitespace",
            Content::CData(_) => "CDATA",
            Content::Comment(_) => "comment",
            Content::ProcessingInstruction(_) => "processing instruction",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Content>,
    pub pos_start: usize,
    pub pos_end: usize,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            pos_start: 0,
            pos_end: 0,
        }
    }

    /// Builder style attribute setter, handy when assembling trees in code.
    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Content::Element(child));
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(Content::Text(text.to_string()));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Reads a boolean attribute. Anything other than a case-insensitive
    /// `true`/`false` falls back to `default`.
    pub fn attribute_bool(&self, name: &str, default: bool) -> bool {
        match self.attribute(name).map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("false") => false,
            _ => default,
        }
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        if let Some(existing) = self.attributes.iter_mut().find(|a| a.name == name) {
            existing.value = value.to_string();
        } else {
            self.attributes.push(Attribute {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|a| a.name == name)?;
        Some(self.attributes.remove(index).value)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Content::as_element)
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|c| match c {
            Content::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn element_count(&self) -> usize {
        self.elements().count()
    }

    pub fn first_child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    pub fn first_child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.name == name)
    }

    /// Concatenated text of this element and all of its descendants.
    /// Comments and processing instructions do not contribute.
    pub fn inner_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Content::Text(t) | Content::Whitespace(t) | Content::CData(t) => out.push_str(t),
                Content::Element(e) => e.collect_text(out),
                Content::Comment(_) | Content::ProcessingInstruction(_) => {}
            }
        }
    }

    /// True when the element has content and every element child uses the
    /// list item tag.
    pub fn is_list_implied(&self, list_item_name: &str) -> bool {
        self.has_children() && self.elements().all(|e| e.name == list_item_name)
    }

    /// Path segments for every element child, in order. Tags that repeat among
    /// siblings get a 1-based index, e.g. `li[2]`.
    pub fn child_segments(&self) -> Vec<String> {
        let mut totals: Vec<(&str, usize)> = Vec::new();
        for e in self.elements() {
            match totals.iter_mut().find(|(n, _)| *n == e.name) {
                Some((_, count)) => *count += 1,
                None => totals.push((e.name.as_str(), 1)),
            }
        }

        let mut seen: Vec<(&str, usize)> = Vec::new();
        let mut segments = Vec::with_capacity(totals.len());
        for e in self.elements() {
            let total = totals
                .iter()
                .find(|(n, _)| *n == e.name)
                .map_or(1, |(_, c)| *c);
            if total == 1 {
                segments.push(e.name.clone());
                continue;
            }
            let index = match seen.iter_mut().find(|(n, _)| *n == e.name) {
                Some((_, i)) => {
                    *i += 1;
                    *i
                }
                None => {
                    seen.push((e.name.as_str(), 1));
                    1
                }
            };
            segments.push(format!("{}[{}]", e.name, index));
        }
        segments
    }

    /// Writes the element back out as markup.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write_markup(&mut out);
        out
    }

    fn write_markup(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for a in &self.attributes {
            let _ = write!(out, " {}=\"{}\"", a.name, escape(&a.value, true));
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Content::Element(e) => e.write_markup(out),
                Content::Text(t) => out.push_str(&escape(t, false)),
                Content::Whitespace(t) => out.push_str(t),
                Content::CData(t) => {
                    let _ = write!(out, "<![CDATA[{}]]>", t);
                }
                Content::Comment(t) => {
                    let _ = write!(out, "<!--{}-->", t);
                }
                Content::ProcessingInstruction(t) => {
                    let _ = write!(out, "<?{}?>", t);
                }
            }
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
