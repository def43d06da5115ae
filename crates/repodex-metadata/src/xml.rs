//! Small helpers over `quick-xml` shared by the metadata and manifest
//! parsers.
//!
//! Both documents are read one top-level child at a time; the child is
//! collected into an owned [`Node`] tree and the reader's buffer is reused,
//! so memory stays bounded by the largest single package rather than the
//! whole document.

use std::io::BufRead;

use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};

/// Failure from the XML layer, before document context is attached.
#[derive(Debug)]
pub(crate) enum XmlFailure {
    Syntax { position: u64, reason: String },
    Eof { element: String },
}

/// An owned element with its attributes, text and children.
#[derive(Debug, Default)]
pub(crate) struct Node {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Node>,
}

impl Node {
    pub fn from_start(start: &BytesStart<'_>, position: u64) -> Result<Self, XmlFailure> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| {
                XmlFailure::Syntax {
                    position,
                    reason: e.to_string(),
                }
            })?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| {
                    XmlFailure::Syntax {
                        position,
                        reason: e.to_string(),
                    }
                })?
                .into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            ..Default::default()
        })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value, with empty strings treated as absent.
    pub fn attr_nonempty(&self, key: &str) -> Option<&str> {
        self.attr(key).filter(|v| !v.is_empty())
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the named child, with empty text treated as absent.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
    }
}

pub(crate) fn new_reader<R: BufRead>(inner: R) -> Reader<R> {
    let mut reader = Reader::from_reader(inner);
    reader.config_mut().trim_text(true);
    reader
}

/// The first element of the document, skipping the prolog.
pub(crate) enum Root {
    /// `<root ...>` followed by children.
    Open(Node),
    /// `<root .../>` with no children.
    Empty(Node),
    /// No element before end of input.
    Missing,
}

pub(crate) fn read_root<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
) -> Result<Root, XmlFailure> {
    loop {
        buf.clear();
        let position = reader.buffer_position();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => return Ok(Root::Open(Node::from_start(&e, position)?)),
            Ok(Event::Empty(e)) => return Ok(Root::Empty(Node::from_start(&e, position)?)),
            Ok(Event::Eof) => return Ok(Root::Missing),
            Ok(_) => {}
            Err(e) => return Err(syntax(reader, e)),
        }
    }
}

/// A direct child of the root element.
#[derive(Debug)]
pub(crate) enum Child {
    Element(Node),
    /// The root element closed.
    End,
}

/// Reads the next complete child of the root, skipping stray text.
pub(crate) fn read_child<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    root: &str,
) -> Result<Child, XmlFailure> {
    loop {
        buf.clear();
        let position = reader.buffer_position();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => {
                let node = Node::from_start(&e, position)?;
                return read_subtree(reader, buf, node).map(Child::Element);
            }
            Ok(Event::Empty(e)) => return Ok(Child::Element(Node::from_start(&e, position)?)),
            Ok(Event::End(_)) => return Ok(Child::End),
            Ok(Event::Eof) => {
                return Err(XmlFailure::Eof {
                    element: root.to_string(),
                })
            }
            Ok(_) => {}
            Err(e) => return Err(syntax(reader, e)),
        }
    }
}

fn read_subtree<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    top: Node,
) -> Result<Node, XmlFailure> {
    let mut stack = vec![top];

    loop {
        buf.clear();
        let position = reader.buffer_position();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => stack.push(Node::from_start(&e, position)?),
            Ok(Event::Empty(e)) => {
                let node = Node::from_start(&e, position)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| {
                    XmlFailure::Syntax {
                        position,
                        reason: e.to_string(),
                    }
                })?;
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(_)) => {
                let Some(done) = stack.pop() else {
                    continue;
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => return Ok(done),
                }
            }
            Ok(Event::Eof) => {
                let element = stack
                    .first()
                    .map(|n| n.name.clone())
                    .unwrap_or_default();
                return Err(XmlFailure::Eof { element });
            }
            Ok(_) => {}
            Err(e) => return Err(syntax(reader, e)),
        }
    }
}

fn syntax<R>(reader: &Reader<R>, err: quick_xml::Error) -> XmlFailure {
    XmlFailure::Syntax {
        position: reader.error_position(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_tree() {
        let xml = br#"<?xml version="1.0"?>
<root a="1">
  <item x:k="v &amp; w"><name>one</name><![CDATA[raw <text>]]></item>
  <empty/>
</root>"#;
        let mut reader = new_reader(&xml[..]);
        let mut buf = Vec::new();

        let Root::Open(root) = read_root(&mut reader, &mut buf).unwrap() else {
            panic!("expected open root");
        };
        assert_eq!(root.name, "root");
        assert_eq!(root.attr("a"), Some("1"));

        let Child::Element(item) = read_child(&mut reader, &mut buf, "root").unwrap() else {
            panic!("expected element");
        };
        assert_eq!(item.attr("k"), Some("v & w"));
        assert_eq!(item.child_text("name"), Some("one"));
        assert_eq!(item.text, "raw <text>");

        let Child::Element(empty) = read_child(&mut reader, &mut buf, "root").unwrap() else {
            panic!("expected element");
        };
        assert_eq!(empty.name, "empty");
        assert!(matches!(
            read_child(&mut reader, &mut buf, "root").unwrap(),
            Child::End
        ));
    }

    #[test]
    fn test_truncated_subtree() {
        let xml = b"<root><item><name>one</name>";
        let mut reader = new_reader(&xml[..]);
        let mut buf = Vec::new();
        read_root(&mut reader, &mut buf).unwrap();
        match read_child(&mut reader, &mut buf, "root") {
            Err(XmlFailure::Eof { element }) => assert_eq!(element, "item"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
