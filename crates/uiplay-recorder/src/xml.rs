//! XML test files
//!
//! ```xml
//! <?xml version="1.0" ?>
//! <events>
//!   <event path="main/toolbar/open" command="activate" arguments="" />
//!   <check path="main/spin" property="value" expected="8" />
//!   <compare path="main/view" baseline="$DATA_ROOT/view.png" threshold="5" />
//! </events>
//! ```
//!
//! Reading is all-or-nothing: a file that fails to parse yields no records
//! at all, only a failure.

use crate::events::{EventObserver, EventSource, Record, SourceItem};
use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};
use uiplay_core::{Error, Result};

pub const ROOT_ELEMENT: &str = "events";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("{0}")]
    Syntax(#[from] roxmltree::Error),
    #[error("root element is `{0}`, expected `events`")]
    WrongRoot(String),
    #[error("unknown record element `{0}`")]
    UnknownElement(String),
    #[error("`{element}` is missing attribute `{attribute}`")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },
    #[error("invalid threshold `{0}`")]
    InvalidThreshold(String),
    #[error("unexpected text `{0}` between records")]
    StrayText(String),
}

impl From<XmlError> for Error {
    fn from(e: XmlError) -> Self {
        Error::malformed(format!("Malformed test file: {}", e))
    }
}

/// Escape text for use inside a double- or single-quoted attribute.
/// Line breaks and tabs become character references so they survive
/// attribute-value normalization.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            c => out.push(c),
        }
    }
    out
}

fn attribute(node: roxmltree::Node<'_, '_>, name: &'static str) -> std::result::Result<String, XmlError> {
    node.attribute(name)
        .map(str::to_string)
        .ok_or_else(|| XmlError::MissingAttribute {
            element: node.tag_name().name().to_string(),
            attribute: name,
        })
}

fn record_from(node: roxmltree::Node<'_, '_>) -> std::result::Result<Record, XmlError> {
    match node.tag_name().name() {
        "event" => Ok(Record::event(
            attribute(node, "path")?,
            attribute(node, "command")?,
            attribute(node, "arguments")?,
        )),
        "check" => Ok(Record::check(
            attribute(node, "path")?,
            attribute(node, "property")?,
            attribute(node, "expected")?,
        )),
        "compare" => {
            let path = attribute(node, "path")?;
            let baseline = attribute(node, "baseline")?;
            let raw = attribute(node, "threshold")?;
            let threshold = raw
                .trim()
                .parse::<f64>()
                .map_err(|_| XmlError::InvalidThreshold(raw.clone()))?;
            Ok(Record::compare(path, baseline, threshold))
        }
        other => Err(XmlError::UnknownElement(other.to_string())),
    }
}

/// Parse a whole document. Entities and character references are decoded
/// by the XML reader; a document with any error yields nothing.
pub fn parse(text: &str) -> std::result::Result<Vec<Record>, XmlError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();
    if root.tag_name().name() != ROOT_ELEMENT {
        return Err(XmlError::WrongRoot(root.tag_name().name().to_string()));
    }
    let mut records = Vec::new();
    for node in root.children() {
        if node.is_element() {
            records.push(record_from(node)?);
        } else if let Some(text) = node.text().filter(|_| node.is_text()) {
            if !text.trim().is_empty() {
                return Err(XmlError::StrayText(text.trim().to_string()));
            }
        }
    }
    Ok(records)
}

fn element_for(record: &Record) -> String {
    match record {
        Record::Event(e) => format!(
            "<event path=\"{}\" command=\"{}\" arguments=\"{}\" />",
            escape(&e.path),
            escape(&e.command),
            escape(&e.arguments)
        ),
        Record::Check(c) => format!(
            "<check path=\"{}\" property=\"{}\" expected=\"{}\" />",
            escape(&c.path),
            escape(&c.property),
            escape(&c.expected)
        ),
        Record::Compare(c) => format!(
            "<compare path=\"{}\" baseline=\"{}\" threshold=\"{}\" />",
            escape(&c.path),
            escape(&c.baseline),
            c.threshold
        ),
    }
}

/// Plays back an XML test file.
///
/// Once the document has failed to parse, every pull yields the same
/// failure.
pub struct XmlSource {
    records: VecDeque<Record>,
    error: Option<Error>,
}

impl XmlSource {
    pub fn parse(text: &str) -> Self {
        match parse(text) {
            Ok(records) => {
                debug!(records = records.len(), "parsed test file");
                Self {
                    records: records.into(),
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "rejecting test file");
                Self {
                    records: VecDeque::new(),
                    error: Some(e.into()),
                }
            }
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::from(e).with_context(serde_json::json!({ "file": path.as_ref().display().to_string() }))
        })?;
        Ok(Self::parse(&text))
    }
}

impl EventSource for XmlSource {
    fn next(&mut self) -> SourceItem {
        if let Some(e) = &self.error {
            return SourceItem::Failure(e.clone());
        }
        match self.records.pop_front() {
            Some(r) => SourceItem::Record(r),
            None => SourceItem::Done,
        }
    }
}

/// Streams records to a writer as XML.
///
/// Attaching writes the header and opening root element, detaching writes
/// the closing element. Dropping an attached observer closes the document.
pub struct XmlObserver<W: Write> {
    out: Option<W>,
}

impl<W: Write> XmlObserver<W> {
    pub fn new() -> Self {
        Self { out: None }
    }

    pub fn attached(out: W) -> io::Result<Self> {
        let mut observer = Self::new();
        observer.attach(out)?;
        Ok(observer)
    }

    pub fn is_attached(&self) -> bool {
        self.out.is_some()
    }

    /// Start a new document. A document already in progress is closed first.
    pub fn attach(&mut self, mut out: W) -> io::Result<()> {
        self.detach()?;
        writeln!(out, "<?xml version=\"1.0\" ?>")?;
        writeln!(out, "<{}>", ROOT_ELEMENT)?;
        self.out = Some(out);
        Ok(())
    }

    /// Close the document and hand back the writer.
    pub fn detach(&mut self) -> io::Result<Option<W>> {
        match self.out.take() {
            Some(mut out) => {
                writeln!(out, "</{}>", ROOT_ELEMENT)?;
                out.flush()?;
                Ok(Some(out))
            }
            None => Ok(None),
        }
    }
}

impl<W: Write> Default for XmlObserver<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> EventObserver for XmlObserver<W> {
    fn on_record(&mut self, record: &Record) -> Result<()> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| Error::new(uiplay_core::ErrorCode::Io, "XML observer is not attached"))?;
        writeln!(out, "  {}", element_for(record))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.detach()?;
        Ok(())
    }
}

impl<W: Write> Drop for XmlObserver<W> {
    fn drop(&mut self) {
        if let Err(e) = self.detach() {
            warn!(error = %e, "failed to close XML test file");
        }
    }
}
