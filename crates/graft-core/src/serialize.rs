//! Tree serialization: S-expressions, XML, JSON.
//!
//! The S-expression form is the working format for tests and debugging:
//! `(name (child "text"))`, attributes rendered as `` `(key "value") ``
//! pseudo-children. [`parse_sxpr`] reads that form back, which lets tests
//! state expected trees literally.

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::node::{Node, NodeContent};

const SXPR_FLAT_THRESHOLD: usize = 60;

impl Node {
    /// Compact single-line S-expression.
    pub fn as_sxpr(&self) -> String {
        let mut out = String::new();
        self.write_sxpr(&mut out, None);
        out
    }

    /// Indented S-expression; short subtrees stay on one line.
    pub fn as_sxpr_indented(&self) -> String {
        let mut out = String::new();
        self.write_sxpr(&mut out, Some(0));
        out
    }

    fn write_sxpr(&self, out: &mut String, indent: Option<usize>) {
        if let Some(level) = indent {
            let flat = self.as_sxpr();
            if flat.len() <= SXPR_FLAT_THRESHOLD {
                out.push_str(&flat);
                return;
            }
            out.push('(');
            out.push_str(self.name());
            for (key, value) in self.attrs() {
                out.push_str(" `(");
                out.push_str(key);
                out.push_str(" \"");
                push_escaped(out, value);
                out.push_str("\")");
            }
            match self.content_ref() {
                NodeContent::Leaf(text) => {
                    out.push_str(" \"");
                    push_escaped(out, text);
                    out.push('"');
                }
                NodeContent::Children(children) => {
                    for child in children {
                        out.push('\n');
                        for _ in 0..(level + 1) * 2 {
                            out.push(' ');
                        }
                        child.write_sxpr(out, Some(level + 1));
                    }
                }
            }
            out.push(')');
        } else {
            out.push('(');
            out.push_str(self.name());
            for (key, value) in self.attrs() {
                out.push_str(" `(");
                out.push_str(key);
                out.push_str(" \"");
                push_escaped(out, value);
                out.push_str("\")");
            }
            match self.content_ref() {
                NodeContent::Leaf(text) => {
                    if !text.is_empty() {
                        out.push_str(" \"");
                        push_escaped(out, text);
                        out.push('"');
                    }
                }
                NodeContent::Children(children) => {
                    for child in children {
                        out.push(' ');
                        child.write_sxpr(out, None);
                    }
                }
            }
            out.push(')');
        }
    }

    /// XML rendering. Colon-prefixed (anonymous) names are made legal by
    /// mapping the leading colon onto an `anonymous:` namespace prefix.
    pub fn as_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        let tag = xml_tag_name(self.name());
        out.push('<');
        out.push_str(&tag);
        for (key, value) in self.attrs() {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            push_xml_escaped(out, value);
            out.push('"');
        }
        match self.content_ref() {
            NodeContent::Leaf(text) if text.is_empty() => {
                out.push_str("/>");
                return;
            }
            NodeContent::Children(children) if children.is_empty() => {
                out.push_str("/>");
                return;
            }
            _ => out.push('>'),
        }
        match self.content_ref() {
            NodeContent::Leaf(text) => push_xml_escaped(out, text),
            NodeContent::Children(children) => {
                for child in children {
                    child.write_xml(out);
                }
            }
        }
        out.push_str("</");
        out.push_str(&tag);
        out.push('>');
    }

    /// JSON rendering of the tree shape `[name, content, pos?]` with
    /// attributes as an optional trailing object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("tree serialization is infallible")
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        seq.serialize_element(self.name())?;
        match self.content_ref() {
            NodeContent::Leaf(text) => seq.serialize_element(&**text)?,
            NodeContent::Children(children) => seq.serialize_element(children)?,
        }
        if let Some(pos) = self.pos() {
            seq.serialize_element(&pos)?;
        }
        if self.has_attrs() {
            let attrs: indexmap::IndexMap<&str, &str> = self.attrs().collect();
            seq.serialize_element(&attrs)?;
        }
        seq.end()
    }
}

fn xml_tag_name(name: &str) -> String {
    match name.strip_prefix(':') {
        Some(rest) => format!("anonymous:{rest}"),
        None => name.to_string(),
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
}

fn push_xml_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

/// Reads a node tree back from its S-expression rendering.
///
/// Accepts the output of [`Node::as_sxpr`] and [`Node::as_sxpr_indented`];
/// positions are not part of the S-expression form and stay unassigned.
///
/// ```
/// use graft_core::parse_sxpr;
///
/// let node = parse_sxpr(r#"(greeting (word "hello"))"#).unwrap();
/// assert_eq!(node.name(), "greeting");
/// assert_eq!(node.content(), "hello");
/// ```
pub fn parse_sxpr(input: &str) -> Result<Node, SxprError> {
    let mut parser = SxprParser {
        input: input.as_bytes(),
        pos: 0,
    };
    parser.skip_ws();
    let node = parser.node()?;
    parser.skip_ws();
    if parser.pos != parser.input.len() {
        return Err(SxprError::at(parser.pos, "trailing input after expression"));
    }
    Ok(node)
}

/// Malformed S-expression input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SxprError {
    pub pos: usize,
    pub message: String,
}

impl SxprError {
    fn at(pos: usize, message: impl Into<String>) -> Self {
        SxprError {
            pos,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SxprError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "byte {}: {}", self.pos, self.message)
    }
}

impl std::error::Error for SxprError {}

struct SxprParser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl SxprParser<'_> {
    fn node(&mut self) -> Result<Node, SxprError> {
        self.expect(b'(')?;
        self.skip_ws();
        let name = self.symbol()?;
        let mut attrs: Vec<(String, String)> = Vec::new();
        let mut children: Vec<Node> = Vec::new();
        let mut text = String::new();
        let mut saw_text = false;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                Some(b'`') => {
                    self.pos += 1;
                    self.expect(b'(')?;
                    self.skip_ws();
                    let key = self.symbol()?;
                    self.skip_ws();
                    let value = self.string()?;
                    self.skip_ws();
                    self.expect(b')')?;
                    attrs.push((key, value));
                }
                Some(b'(') => children.push(self.node()?),
                Some(b'"') => {
                    text.push_str(&self.string()?);
                    saw_text = true;
                }
                Some(_) => return Err(SxprError::at(self.pos, "expected child, string or ')'")),
                None => return Err(SxprError::at(self.pos, "unexpected end of input")),
            }
        }
        if saw_text && !children.is_empty() {
            return Err(SxprError::at(self.pos, "mixed leaf and branch content"));
        }
        let mut node = if children.is_empty() {
            Node::leaf(name.as_str(), text)
        } else {
            Node::branch(name.as_str(), children)
        };
        for (key, value) in attrs {
            node.set_attr(key, value);
        }
        Ok(node)
    }

    fn symbol(&mut self) -> Result<String, SxprError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || b == b'(' || b == b')' || b == b'"' || b == b'`' {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(SxprError::at(start, "expected a name"));
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn string(&mut self) -> Result<String, SxprError> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b'n') => out.push(b'\n'),
                        Some(b) => out.push(b),
                        None => return Err(SxprError::at(self.pos, "unterminated escape")),
                    }
                    self.pos += 1;
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
                None => return Err(SxprError::at(self.pos, "unterminated string")),
            }
        }
        String::from_utf8(out).map_err(|_| SxprError::at(self.pos, "invalid utf-8 in string"))
    }

    fn expect(&mut self, byte: u8) -> Result<(), SxprError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(SxprError::at(self.pos, format!("expected '{}'", byte as char)))
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }
}
