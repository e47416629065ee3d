use std::path::Path as FsPath;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },
    #[error("Document has no root element")]
    NoRootElement,
}

pub type ParseResult<T> = Result<T, ParseError>;

/// A child of an element: either a nested element or a run of text.
///
/// Text is kept exactly as it appears in the source, entity references
/// included; decoding happens once, in the normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// Text nodes that are direct children of this element.
    pub fn own_text(&self) -> impl Iterator<Item = &str> {
        self.children.iter().filter_map(|node| match node {
            Node::Text(text) => Some(text.as_str()),
            Node::Element(_) => None,
        })
    }

    /// Every text node below this element, in document order.
    #[must_use]
    pub fn descendant_text(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text<'a>(&'a self, out: &mut Vec<&'a str>) {
        for node in &self.children {
            match node {
                Node::Text(text) => out.push(text),
                Node::Element(element) => element.collect_text(out),
            }
        }
    }

    /// Elements matching `path` relative to this element, in document order.
    #[must_use]
    pub fn select<'a>(&'a self, path: &XmlPath) -> Vec<&'a Self> {
        let Some((first, rest)) = path.steps.split_first() else {
            return Vec::new();
        };

        let mut matched = Vec::new();
        if path.anywhere {
            self.collect_descendants(first, &mut matched);
        } else {
            matched.extend(self.child_elements().filter(|e| first.matches(e)));
        }

        descend(matched, rest)
    }

    #[must_use]
    pub fn select_first<'a>(&'a self, path: &XmlPath) -> Option<&'a Self> {
        self.select(path).into_iter().next()
    }

    fn collect_descendants<'a>(&'a self, step: &Step, out: &mut Vec<&'a Self>) {
        for child in self.child_elements() {
            if step.matches(child) {
                out.push(child);
            }
            child.collect_descendants(step, out);
        }
    }
}

/// A parsed article file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    root: Element,
}

impl XmlDocument {
    #[must_use]
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Evaluate an absolute path: the first step must match the root element,
    /// or, for `//` paths, any element in the document.
    #[must_use]
    pub fn select<'a>(&'a self, path: &XmlPath) -> Vec<&'a Element> {
        let Some((first, rest)) = path.steps.split_first() else {
            return Vec::new();
        };

        let mut matched = Vec::new();
        if first.matches(&self.root) {
            matched.push(&self.root);
        }
        if path.anywhere {
            self.root.collect_descendants(first, &mut matched);
        }

        descend(matched, rest)
    }

    #[must_use]
    pub fn select_first<'a>(&'a self, path: &XmlPath) -> Option<&'a Element> {
        self.select(path).into_iter().next()
    }
}

fn descend<'a>(mut current: Vec<&'a Element>, steps: &[Step]) -> Vec<&'a Element> {
    for step in steps {
        current = current
            .into_iter()
            .flat_map(|e| e.child_elements().filter(|c| step.matches(c)))
            .collect();
    }
    current
}

/// A location rule in a small subset of XPath.
///
/// Supported: `a/b/c` child steps, a leading `//` to match the first step at
/// any depth, and per-step `[@attr="value"]` predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlPath {
    anywhere: bool,
    steps: Vec<Step>,
}

impl XmlPath {
    #[must_use]
    pub fn new(expr: &str) -> Self {
        let (anywhere, rest) = expr
            .strip_prefix("//")
            .map_or((false, expr), |rest| (true, rest));

        let steps = rest
            .split('/')
            .filter(|s| !s.is_empty())
            .map(Step::parse)
            .collect();

        Self { anywhere, steps }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    name: String,
    attribute: Option<(String, String)>,
}

impl Step {
    fn parse(raw: &str) -> Self {
        let Some((name, predicate)) = raw.split_once('[') else {
            return Self {
                name: raw.to_string(),
                attribute: None,
            };
        };

        let attribute = predicate
            .strip_suffix(']')
            .and_then(|p| p.strip_prefix('@'))
            .and_then(|p| p.split_once('='))
            .map(|(key, value)| {
                let value = value.trim_matches(|c| c == '"' || c == '\'');
                (key.trim().to_string(), value.to_string())
            });

        // An unreadable predicate never matches rather than matching everything.
        let name = if attribute.is_some() {
            name.to_string()
        } else {
            raw.to_string()
        };

        Self { name, attribute }
    }

    fn matches(&self, element: &Element) -> bool {
        if element.name != self.name {
            return false;
        }
        match &self.attribute {
            Some((key, value)) => element.attribute(key) == Some(value.as_str()),
            None => true,
        }
    }
}

pub fn parse_file(path: &FsPath) -> ParseResult<XmlDocument> {
    let data = std::fs::read(path)?;
    parse_bytes(&data)
}

/// Build an element tree from XML bytes.
///
/// Whitespace-only text between elements is dropped. CDATA content is
/// escaped on the way in so that it comes out of the normalizer verbatim.
pub fn parse_bytes(data: &[u8]) -> ParseResult<XmlDocument> {
    let mut reader = Reader::from_reader(data);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ParseError::Malformed {
                position: position as u64,
                message: e.to_string(),
            })?;

        match event {
            Event::Start(start) => stack.push(start_element(&start)?),
            Event::Empty(start) => {
                let element = start_element(&start)?;
                attach(&mut stack, &mut root, Node::Element(element));
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, Node::Element(element));
                }
            }
            Event::Text(text) => {
                if !stack.is_empty() {
                    let text = utf8(&text)?;
                    if !text.trim().is_empty() {
                        attach(&mut stack, &mut root, Node::Text(text.to_string()));
                    }
                }
            }
            Event::CData(cdata) => {
                if !stack.is_empty() {
                    let text = utf8(&cdata)?;
                    attach(&mut stack, &mut root, Node::Text(escape(text).into_owned()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Malformed {
            position: reader.buffer_position() as u64,
            message: format!("unclosed element <{}>", open.name),
        });
    }

    root.map(|root| XmlDocument { root })
        .ok_or(ParseError::NoRootElement)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else if let Node::Element(element) = node {
        // Only the first top-level element counts as the document.
        if root.is_none() {
            *root = Some(element);
        }
    }
}

fn start_element(start: &BytesStart<'_>) -> ParseResult<Element> {
    let mut element = Element::new(utf8(start.name().as_ref())?);

    for attr in start.attributes().with_checks(false) {
        let attr = attr.map_err(|e| ParseError::Malformed {
            position: 0,
            message: e.to_string(),
        })?;
        let key = utf8(attr.key.as_ref())?.to_string();
        let value = attr
            .unescape_value()
            .map_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned(), |v| v.into_owned());
        element.attributes.push((key, value));
    }

    Ok(element)
}

fn utf8(bytes: &[u8]) -> ParseResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| ParseError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE article PUBLIC "-//NLM//DTD JATS (Z39.96) Journal Publishing DTD v1.1 20151215//EN" "JATS-journalpublishing1.dtd">
<article article-type="research-article">
  <front>
    <article-meta>
      <article-id pub-id-type="pmid">111</article-id>
      <article-id pub-id-type="doi">10.1/abc</article-id>
      <title-group><article-title>The <italic>E. coli</italic> genome</article-title></title-group>
    </article-meta>
  </front>
  <body>
    <sec><p>A &amp; B</p><fig id="f1"><caption><p>Cap</p></caption></fig></sec>
    <p><![CDATA[x < y & z]]></p>
  </body>
</article>"#;

    #[test]
    fn test_parse_builds_tree() {
        let doc = parse_bytes(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.root().name, "article");
        assert_eq!(doc.root().attribute("article-type"), Some("research-article"));

        let names: Vec<_> = doc.root().child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["front", "body"]);
    }

    #[test]
    fn test_text_is_kept_raw() {
        let doc = parse_bytes(SAMPLE.as_bytes()).unwrap();
        let p = doc.select_first(&XmlPath::new("article/body/sec/p")).unwrap();
        assert_eq!(p.own_text().collect::<Vec<_>>(), vec!["A &amp; B"]);
    }

    #[test]
    fn test_cdata_is_escaped() {
        let doc = parse_bytes(SAMPLE.as_bytes()).unwrap();
        let p = doc.select_first(&XmlPath::new("article/body/p")).unwrap();
        assert_eq!(p.descendant_text(), vec!["x &lt; y &amp; z"]);
    }

    #[test]
    fn test_descendant_text_in_document_order() {
        let doc = parse_bytes(SAMPLE.as_bytes()).unwrap();
        let title = doc
            .select_first(&XmlPath::new("article/front/article-meta/title-group/article-title"))
            .unwrap();
        assert_eq!(title.descendant_text(), vec!["The ", "E. coli", " genome"]);
    }

    #[test]
    fn test_attribute_predicate() {
        let doc = parse_bytes(SAMPLE.as_bytes()).unwrap();
        let meta = doc.select_first(&XmlPath::new("article/front/article-meta")).unwrap();

        let doi = meta
            .select_first(&XmlPath::new(r#"article-id[@pub-id-type="doi"]"#))
            .unwrap();
        assert_eq!(doi.own_text().next(), Some("10.1/abc"));

        assert!(meta
            .select_first(&XmlPath::new(r#"article-id[@pub-id-type="pmc"]"#))
            .is_none());
    }

    #[test]
    fn test_anywhere_path() {
        let doc = parse_bytes(SAMPLE.as_bytes()).unwrap();
        let captions = doc.select(&XmlPath::new("//fig/caption"));
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0].descendant_text(), vec!["Cap"]);
    }

    #[test]
    fn test_absolute_path_must_match_root() {
        let doc = parse_bytes(SAMPLE.as_bytes()).unwrap();
        assert!(doc.select_first(&XmlPath::new("book/front")).is_none());
        assert_eq!(doc.select(&XmlPath::new("article")).len(), 1);
    }

    #[test]
    fn test_malformed_predicate_never_matches() {
        let doc = parse_bytes(SAMPLE.as_bytes()).unwrap();
        let meta = doc.select_first(&XmlPath::new("article/front/article-meta")).unwrap();
        assert!(meta.select(&XmlPath::new("article-id[pub-id-type")).is_empty());
    }

    #[test]
    fn test_mismatched_tags_fail() {
        let err = parse_bytes(b"<article><front></article>").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_unclosed_document_fails() {
        let err = parse_bytes(b"<article><front>").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_empty_input_has_no_root() {
        let err = parse_bytes(b"   ").unwrap_err();
        assert!(matches!(err, ParseError::NoRootElement));
    }
}
