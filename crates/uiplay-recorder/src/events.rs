//! Abstract event records and the source/observer traits
//!
//! A recorded test is an ordered list of records. Actions carry a command
//! and its arguments; checks assert a property value; compares ask an
//! external comparator to check a baseline image.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uiplay_core::node::{Modifiers, MouseEvent};
use uiplay_core::Error;

/// Canonical command names.
pub mod commands {
    pub const ACTIVATE: &str = "activate";
    pub const SET_BOOLEAN: &str = "set_boolean";
    pub const SET_INT: &str = "set_int";
    pub const SET_DOUBLE: &str = "set_double";
    pub const SET_STRING: &str = "set_string";
    pub const SET_FILE_SELECTION: &str = "set_file_selection";
    pub const KEY: &str = "key";
    pub const MOUSE_PRESS: &str = "mouse_press";
    pub const MOUSE_RELEASE: &str = "mouse_release";
    pub const MOUSE_MOVE: &str = "mouse_move";
    pub const MOUSE_DOUBLE_CLICK: &str = "mouse_double_click";

    pub const POINTER: [&str; 4] = [MOUSE_PRESS, MOUSE_RELEASE, MOUSE_MOVE, MOUSE_DOUBLE_CLICK];

    pub fn is_pointer(command: &str) -> bool {
        POINTER.contains(&command)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub path: String,
    pub command: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub path: String,
    pub property: String,
    pub expected: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareRecord {
    pub path: String,
    pub baseline: String,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Event(EventRecord),
    Check(CheckRecord),
    Compare(CompareRecord),
}

impl Record {
    pub fn event(path: impl Into<String>, command: impl Into<String>, arguments: impl Into<String>) -> Self {
        Record::Event(EventRecord {
            path: path.into(),
            command: command.into(),
            arguments: arguments.into(),
        })
    }

    pub fn check(path: impl Into<String>, property: impl Into<String>, expected: impl Into<String>) -> Self {
        Record::Check(CheckRecord {
            path: path.into(),
            property: property.into(),
            expected: expected.into(),
        })
    }

    pub fn compare(path: impl Into<String>, baseline: impl Into<String>, threshold: f64) -> Self {
        Record::Compare(CompareRecord {
            path: path.into(),
            baseline: baseline.into(),
            threshold,
        })
    }

    pub fn path(&self) -> &str {
        match self {
            Record::Event(e) => &e.path,
            Record::Check(c) => &c.path,
            Record::Compare(c) => &c.path,
        }
    }

    /// The command name, or the record kind for checks and compares.
    pub fn command(&self) -> &str {
        match self {
            Record::Event(e) => &e.command,
            Record::Check(_) => "check",
            Record::Compare(_) => "compare",
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Event(e) => write!(f, "{}: {}({})", e.path, e.command, e.arguments),
            Record::Check(c) => write!(f, "{}: check({} == {})", c.path, c.property, c.expected),
            Record::Compare(c) => write!(f, "{}: compare({}, {})", c.path, c.baseline, c.threshold),
        }
    }
}

/// Arguments of the pointer commands: `button,modifiers,x,y[,cellPath]`.
/// The cell path is the remainder after the fourth comma, so it may
/// itself contain commas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerArgs {
    pub button: u8,
    pub modifiers: u8,
    pub x: i32,
    pub y: i32,
    pub cell: Option<String>,
}

impl PointerArgs {
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(5, ',');
        let button = parts.next()?.trim().parse().ok()?;
        let modifiers = parts.next()?.trim().parse().ok()?;
        let x = parts.next()?.trim().parse().ok()?;
        let y = parts.next()?.trim().parse().ok()?;
        let cell = parts.next().map(str::to_string);
        Some(Self {
            button,
            modifiers,
            x,
            y,
            cell,
        })
    }
}

impl From<&MouseEvent> for PointerArgs {
    fn from(e: &MouseEvent) -> Self {
        Self {
            button: e.button,
            modifiers: e.modifiers.0,
            x: e.x,
            y: e.y,
            cell: e.cell.clone(),
        }
    }
}

impl From<&PointerArgs> for MouseEvent {
    fn from(a: &PointerArgs) -> Self {
        MouseEvent {
            button: a.button,
            modifiers: Modifiers(a.modifiers),
            x: a.x,
            y: a.y,
            cell: a.cell.clone(),
        }
    }
}

impl fmt::Display for PointerArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.button, self.modifiers, self.x, self.y)?;
        if let Some(cell) = &self.cell {
            write!(f, ",{}", cell)?;
        }
        Ok(())
    }
}

/// What a source yields on each pull.
#[derive(Debug, Clone)]
pub enum SourceItem {
    Record(Record),
    /// Exhausted; the session succeeded.
    Done,
    /// The source is unreadable; no further records will be produced.
    Failure(Error),
}

pub trait EventSource {
    fn next(&mut self) -> SourceItem;
}

/// Receives records as they are captured.
pub trait EventObserver {
    fn on_record(&mut self, record: &Record) -> uiplay_core::Result<()>;

    /// End of recording; the destination must be complete afterwards.
    fn finish(&mut self) -> uiplay_core::Result<()> {
        Ok(())
    }
}

/// A source over records already in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: VecDeque<Record>,
}

impl MemorySource {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl EventSource for MemorySource {
    fn next(&mut self) -> SourceItem {
        match self.records.pop_front() {
            Some(r) => SourceItem::Record(r),
            None => SourceItem::Done,
        }
    }
}

/// An observer collecting records in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryObserver {
    records: std::rc::Rc<std::cell::RefCell<Vec<Record>>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records captured so far; shared with every clone.
    pub fn records(&self) -> Vec<Record> {
        self.records.borrow().clone()
    }
}

impl EventObserver for MemoryObserver {
    fn on_record(&mut self, record: &Record) -> uiplay_core::Result<()> {
        self.records.borrow_mut().push(record.clone());
        Ok(())
    }
}
