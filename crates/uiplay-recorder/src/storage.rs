//! Test file storage - XML or JSON lines, chosen by extension
//!
//! A JSON lines test starts with a metadata line, then one record per line.

use crate::events::{EventObserver, EventSource, Record, SourceItem};
use crate::xml::{self, XmlObserver, XmlSource};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uiplay_core::{Error, ErrorCode, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Xml,
    Jsonl,
}

impl Format {
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xml" => Some(Format::Xml),
            "jsonl" | "json" => Some(Format::Jsonl),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Format::Xml => "xml",
            Format::Jsonl => "jsonl",
        }
    }
}

fn format_of(path: &Path) -> Result<Format> {
    Format::from_path(path).ok_or_else(|| {
        Error::malformed(format!(
            "Unrecognized test file extension: {}",
            path.display()
        ))
        .with_suggestions(vec!["Use a .xml or .jsonl file".to_string()])
    })
}

/// First line of a JSON lines test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub uiplay: u32,
    #[serde(default)]
    pub name: String,
    pub created: chrono::DateTime<chrono::Utc>,
}

impl Metadata {
    pub const VERSION: u32 = 1;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uiplay: Self::VERSION,
            name: name.into(),
            created: chrono::Utc::now(),
        }
    }
}

pub fn parse_jsonl(text: &str) -> Result<(Metadata, Vec<Record>)> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, first) = lines
        .next()
        .ok_or_else(|| Error::malformed("Malformed test file: empty document"))?;
    let meta: Metadata = serde_json::from_str(first)
        .map_err(|e| Error::malformed(format!("Malformed test file: bad metadata line: {}", e)))?;
    let mut records = Vec::new();
    for (i, line) in lines {
        let record = serde_json::from_str(line)
            .map_err(|e| Error::malformed(format!("Malformed test file: line {}: {}", i + 1, e)))?;
        records.push(record);
    }
    Ok((meta, records))
}

/// Plays back a JSON lines test. Like [`XmlSource`], a document that
/// fails to parse yields only failures.
pub struct JsonlSource {
    records: VecDeque<Record>,
    error: Option<Error>,
}

impl JsonlSource {
    pub fn parse(text: &str) -> Self {
        match parse_jsonl(text) {
            Ok((_, records)) => Self {
                records: records.into(),
                error: None,
            },
            Err(e) => Self {
                records: VecDeque::new(),
                error: Some(e),
            },
        }
    }
}

impl EventSource for JsonlSource {
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

/// Streams records as JSON lines, one per line, flushed as they arrive.
pub struct JsonlObserver<W: Write> {
    out: W,
}

impl<W: Write> JsonlObserver<W> {
    pub fn new(mut out: W, meta: &Metadata) -> Result<Self> {
        serde_json::to_writer(&mut out, meta).map_err(|e| Error::new(ErrorCode::Io, e.to_string()))?;
        writeln!(out)?;
        Ok(Self { out })
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventObserver for JsonlObserver<W> {
    fn on_record(&mut self, record: &Record) -> Result<()> {
        serde_json::to_writer(&mut self.out, record).map_err(|e| Error::new(ErrorCode::Io, e.to_string()))?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Open a test file for playback, picking the format from the extension.
pub fn open_source(path: impl AsRef<Path>) -> Result<Box<dyn EventSource>> {
    let path = path.as_ref();
    let format = format_of(path)?;
    let text = fs::read_to_string(path).map_err(|e| {
        Error::from(e).with_context(serde_json::json!({ "file": path.display().to_string() }))
    })?;
    debug!(file = %path.display(), ?format, "opened test file");
    let source: Box<dyn EventSource> = match format {
        Format::Xml => Box::new(XmlSource::parse(&text)),
        Format::Jsonl => Box::new(JsonlSource::parse(&text)),
    };
    Ok(source)
}

/// Create (truncating) a test file for recording.
pub fn create_observer(path: impl AsRef<Path>) -> Result<Box<dyn EventObserver>> {
    let path = path.as_ref();
    let format = format_of(path)?;
    let file = BufWriter::new(File::create(path)?);
    info!(file = %path.display(), ?format, "recording to");
    let observer: Box<dyn EventObserver> = match format {
        Format::Xml => Box::new(XmlObserver::attached(file)?),
        Format::Jsonl => {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            Box::new(JsonlObserver::new(file, &Metadata::new(name))?)
        }
    };
    Ok(observer)
}

/// Read every record of a test file.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    match format_of(path)? {
        Format::Xml => Ok(xml::parse(&text)?),
        Format::Jsonl => Ok(parse_jsonl(&text)?.1),
    }
}

pub fn write_records(path: impl AsRef<Path>, records: &[Record]) -> Result<()> {
    let mut observer = create_observer(path)?;
    for r in records {
        observer.on_record(r)?;
    }
    observer.finish()
}

/// A directory of recorded tests.
pub struct TestStorage {
    dir: PathBuf,
}

impl TestStorage {
    pub fn new() -> anyhow::Result<Self> {
        let home = std::env::var("HOME").context("HOME not set")?;
        Self::with_dir(PathBuf::from(home).join(".uiplay").join("tests"))
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// A fresh timestamped file name for a new recording. Never names a
    /// file that already exists.
    pub fn new_file(&self, name: &str, format: Format) -> PathBuf {
        let stem = format!("{}_{}", sanitize(name), chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f"));
        let mut path = self.dir.join(format!("{}.{}", stem, format.extension()));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{}-{}.{}", stem, n, format.extension()));
            n += 1;
        }
        path
    }

    pub fn save(&self, name: &str, format: Format, records: &[Record]) -> anyhow::Result<PathBuf> {
        let path = self.new_file(name, format);
        write_records(&path, records)?;
        Ok(path)
    }

    pub fn load(&self, filename: &str) -> anyhow::Result<Vec<Record>> {
        let path = self.dir.join(filename);
        Ok(read_records(&path)?)
    }

    /// Count the records without failing on a damaged file.
    pub fn count(&self, filename: &str) -> Option<usize> {
        let file = File::open(self.dir.join(filename)).ok()?;
        let lines = BufReader::new(file).lines().map_while(|l| l.ok());
        match Format::from_path(filename)? {
            Format::Jsonl => Some(lines.filter(|l| !l.trim().is_empty()).count().saturating_sub(1)),
            Format::Xml => Some(
                lines
                    .filter(|l| {
                        let l = l.trim_start();
                        l.starts_with("<event") && !l.starts_with("<events")
                            || l.starts_with("<check")
                            || l.starts_with("<compare")
                    })
                    .count(),
            ),
        }
    }

    /// All test files, sorted by name.
    pub fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(s) = name.to_str() {
                if Format::from_path(s).is_some() {
                    files.push(s.to_string());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn delete(&self, filename: &str) -> anyhow::Result<()> {
        let path = self.dir.join(filename);
        fs::remove_file(&path).with_context(|| format!("deleting {}", path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Record> {
        vec![
            Record::event("main/open", "activate", ""),
            Record::event("fileDialog/chooser", "set_file_selection", "$DATA_ROOT/cow.vtk"),
            Record::check("main/spin", "value", "8"),
        ]
    }

    #[test]
    fn jsonl_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");
        write_records(&path, &sample()).unwrap();
        assert_eq!(read_records(&path).unwrap(), sample());

        let text = fs::read_to_string(&path).unwrap();
        let meta: Metadata = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(meta.uiplay, Metadata::VERSION);
        assert_eq!(meta.name, "t");
    }

    #[test]
    fn xml_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.xml");
        write_records(&path, &sample()).unwrap();
        assert_eq!(read_records(&path).unwrap(), sample());
    }

    #[test]
    fn malformed_jsonl_fails_without_records() {
        let mut src = JsonlSource::parse("{\"uiplay\":1,\"created\":\"2024-01-01T00:00:00Z\"}\n{\"kind\":\"event\"}\n");
        assert!(matches!(src.next(), SourceItem::Failure(e) if e.code == ErrorCode::MalformedRecord));
        assert!(matches!(src.next(), SourceItem::Failure(_)));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = open_source("test.txt").err().unwrap();
        assert_eq!(err.code, ErrorCode::MalformedRecord);
    }

    #[test]
    fn storage_lists_counts_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TestStorage::with_dir(dir.path()).unwrap();
        let a = storage.save("open file", Format::Jsonl, &sample()).unwrap();
        let b = storage.save("open file", Format::Xml, &sample()).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = storage.list().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.starts_with("open_file_")));

        for path in [&a, &b] {
            let name = path.file_name().unwrap().to_str().unwrap();
            assert_eq!(storage.count(name), Some(3));
            assert_eq!(storage.load(name).unwrap(), sample());
        }

        storage.delete(a.file_name().unwrap().to_str().unwrap()).unwrap();
        assert_eq!(storage.list().unwrap().len(), 1);
    }

    #[test]
    fn saves_in_the_same_instant_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TestStorage::with_dir(dir.path()).unwrap();
        let paths: Vec<PathBuf> = (0..5)
            .map(|_| storage.save("smoke", Format::Xml, &sample()).unwrap())
            .collect();
        assert_eq!(storage.list().unwrap().len(), 5);
        let mut unique = paths.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 5);
    }
}
