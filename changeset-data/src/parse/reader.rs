//! Streaming cursor over the top-level elements of a changeset dump.
//!
//! The cursor owns one scratch buffer that is cleared after every XML event,
//! and yields each top-level child of the root as an owned [`RawElement`].
//! Once the caller drops an element nothing of it remains in memory, so peak
//! usage is bounded by the largest single changeset rather than the dump.

use std::collections::BTreeMap;
use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::error::ParseError;

const TAG: &str = "tag";
const DISCUSSION: &str = "discussion";
const COMMENT: &str = "comment";
const TEXT: &str = "text";

/// One top-level element of a dump with its tag and discussion children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawElement {
    /// Local element name, normally `changeset`.
    pub name: String,
    /// Attributes of the element.
    pub attributes: BTreeMap<String, String>,
    /// `k`/`v` pairs of direct `<tag>` children in document order.
    pub tags: Vec<(String, String)>,
    /// Comments nested under `<discussion>`.
    pub comments: Vec<RawComment>,
}

impl RawElement {
    /// Attribute value by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A `<comment>` element from a changeset discussion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawComment {
    /// Attributes of the comment (`uid`, `user`, `date`).
    pub attributes: BTreeMap<String, String>,
    /// Content of the last `<text>` child; empty when there is none.
    pub text: String,
}

impl RawComment {
    /// Attribute value by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

#[derive(Debug)]
struct StartTag {
    name: String,
    attributes: BTreeMap<String, String>,
}

/// Owned summary of one XML event, detached from the scratch buffer.
#[derive(Debug)]
enum Step {
    Open(StartTag),
    Leaf(StartTag),
    Close,
    Text(String),
    Eof,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    BeforeRoot,
    InRoot,
    Finished,
}

/// Iterator over the top-level elements of a changeset dump.
///
/// # Examples
/// ```
/// use changeset_data::parse::ChangesetReader;
///
/// let xml = r#"<osm timestamp="2024-01-01T00:00:00Z">
///   <changeset id="7" open="false"><tag k="created_by" v="JOSM"/></changeset>
/// </osm>"#;
/// let mut reader = ChangesetReader::new(xml.as_bytes());
/// let element = reader.next().expect("one element")?;
/// assert_eq!(element.attribute("id"), Some("7"));
/// assert_eq!(element.tags, vec![("created_by".to_owned(), "JOSM".to_owned())]);
/// assert!(reader.next().is_none());
/// # Ok::<(), changeset_data::parse::ParseError>(())
/// ```
pub struct ChangesetReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    root: Option<StartTag>,
    state: CursorState,
}

impl<R> std::fmt::Debug for ChangesetReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangesetReader")
            .field("buf", &self.buf)
            .field("root", &self.root)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<R: BufRead> ChangesetReader<R> {
    /// Wrap a decompressed byte stream.
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            root: None,
            state: CursorState::BeforeRoot,
        }
    }

    /// Attribute of the document's root element, reading only as far as the
    /// root start tag.
    ///
    /// # Errors
    /// Returns [`ParseError::MissingRoot`] for an empty document, or an XML
    /// error if the prolog is malformed.
    pub fn root_attribute(&mut self, name: &str) -> Result<Option<&str>, ParseError> {
        self.ensure_root()?;
        Ok(self
            .root
            .as_ref()
            .and_then(|root| root.attributes.get(name))
            .map(String::as_str))
    }

    /// Read the next top-level element, or `None` once the root closes.
    ///
    /// # Errors
    /// Returns a [`ParseError`] for malformed or truncated XML.
    pub fn next_element(&mut self) -> Result<Option<RawElement>, ParseError> {
        self.ensure_root()?;
        while self.state == CursorState::InRoot {
            match self.step()? {
                Step::Open(start) => return self.read_body(start).map(Some),
                Step::Leaf(start) => {
                    return Ok(Some(RawElement {
                        name: start.name,
                        attributes: start.attributes,
                        ..RawElement::default()
                    }));
                }
                Step::Close => self.state = CursorState::Finished,
                Step::Eof => {
                    self.state = CursorState::Finished;
                    return Err(ParseError::UnexpectedEof {
                        element: self.root_name(),
                    });
                }
                Step::Text(_) | Step::Skip => {}
            }
        }
        Ok(None)
    }

    fn root_name(&self) -> String {
        self.root
            .as_ref()
            .map_or_else(String::new, |root| root.name.clone())
    }

    fn ensure_root(&mut self) -> Result<(), ParseError> {
        while self.state == CursorState::BeforeRoot {
            match self.step()? {
                Step::Open(start) => {
                    self.root = Some(start);
                    self.state = CursorState::InRoot;
                }
                Step::Leaf(start) => {
                    self.root = Some(start);
                    self.state = CursorState::Finished;
                }
                Step::Eof | Step::Close => {
                    self.state = CursorState::Finished;
                    return Err(ParseError::MissingRoot);
                }
                Step::Text(_) | Step::Skip => {}
            }
        }
        Ok(())
    }

    fn read_body(&mut self, start: StartTag) -> Result<RawElement, ParseError> {
        let mut body = BodyBuilder::default();
        let mut path: Vec<String> = Vec::new();
        loop {
            match self.step()? {
                Step::Open(child) => {
                    body.enter(&path, &child);
                    path.push(child.name);
                }
                Step::Leaf(child) => {
                    body.enter(&path, &child);
                    body.leave(&path, &child.name);
                }
                Step::Close => match path.pop() {
                    Some(name) => body.leave(&path, &name),
                    None => return Ok(body.finish(start)),
                },
                Step::Text(text) => body.text(&text),
                Step::Eof => {
                    self.state = CursorState::Finished;
                    return Err(ParseError::UnexpectedEof {
                        element: start.name,
                    });
                }
                Step::Skip => {}
            }
        }
    }

    /// Read one event and retire the scratch buffer.
    fn step(&mut self) -> Result<Step, ParseError> {
        let step = match self.reader.read_event_into(&mut self.buf) {
            Ok(event) => classify(event),
            Err(source) => Err(source),
        };
        self.buf.clear();
        step.map_err(|source| {
            self.state = CursorState::Finished;
            ParseError::Xml {
                position: u64::try_from(self.reader.buffer_position()).unwrap_or(u64::MAX),
                source,
            }
        })
    }
}

impl<R: BufRead> Iterator for ChangesetReader<R> {
    type Item = Result<RawElement, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == CursorState::Finished {
            return None;
        }
        self.next_element().transpose()
    }
}

fn classify(event: Event<'_>) -> Result<Step, quick_xml::Error> {
    Ok(match event {
        Event::Start(start) => Step::Open(start_tag(&start)?),
        Event::Empty(start) => Step::Leaf(start_tag(&start)?),
        Event::End(_) => Step::Close,
        Event::Text(text) => Step::Text(text.unescape()?.into_owned()),
        Event::CData(data) => Step::Text(String::from_utf8_lossy(&data).into_owned()),
        Event::Eof => Step::Eof,
        _ => Step::Skip,
    })
}

fn start_tag(start: &BytesStart<'_>) -> Result<StartTag, quick_xml::Error> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = BTreeMap::new();
    for entry in start.attributes() {
        let attribute = entry?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        attributes.insert(key, value);
    }
    Ok(StartTag { name, attributes })
}

fn at(path: &[String], expected: &[&str]) -> bool {
    path.len() == expected.len() && path.iter().zip(expected).all(|(seen, want)| seen == want)
}

/// Collects tags and comments while walking one element's subtree.
#[derive(Debug, Default)]
struct BodyBuilder {
    tags: Vec<(String, String)>,
    comments: Vec<RawComment>,
    comment: Option<RawComment>,
    in_text: bool,
}

impl BodyBuilder {
    fn enter(&mut self, path: &[String], child: &StartTag) {
        match child.name.as_str() {
            TAG if path.is_empty() => {
                if let (Some(key), Some(value)) =
                    (child.attributes.get("k"), child.attributes.get("v"))
                {
                    self.tags.push((key.clone(), value.clone()));
                }
            }
            COMMENT if at(path, &[DISCUSSION]) => {
                self.comment = Some(RawComment {
                    attributes: child.attributes.clone(),
                    text: String::new(),
                });
            }
            TEXT if at(path, &[DISCUSSION, COMMENT]) => {
                if let Some(comment) = self.comment.as_mut() {
                    comment.text.clear();
                    self.in_text = true;
                }
            }
            _ => {}
        }
    }

    fn leave(&mut self, path: &[String], name: &str) {
        match name {
            TEXT if at(path, &[DISCUSSION, COMMENT]) => self.in_text = false,
            COMMENT if at(path, &[DISCUSSION]) => {
                if let Some(comment) = self.comment.take() {
                    self.comments.push(comment);
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_text
            && let Some(comment) = self.comment.as_mut()
        {
            comment.text.push_str(text);
        }
    }

    fn finish(self, start: StartTag) -> RawElement {
        RawElement {
            name: start.name,
            attributes: start.attributes,
            tags: self.tags,
            comments: self.comments,
        }
    }
}
