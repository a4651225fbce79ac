//! Recording sessions
//!
//! A session installs one event filter on the host. Every native event is
//! offered to the translators in order; emitted commands are named with
//! [`ObjectNaming`] and streamed to an [`EventObserver`].

use crate::events::{EventObserver, Record};
use crate::translator::{Emitter, TranslateContext, Translation, TranslatorRegistry};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use tracing::{debug, info, trace, warn};
use uiplay_core::{DataRoot, Error, ErrorCode, Host, NativeEvent, NodeId, ObjectNaming, Result, Subscription};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Paths of nodes never recorded, with their descendants; typically
    /// the recorder's own controls.
    pub ignore_paths: Vec<String>,
    /// Record pointer moves over item views.
    pub capture_moves: bool,
    /// Overrides `UIPLAY_DATA_ROOT` when contracting file paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_root: Option<String>,
}

impl RecorderConfig {
    pub fn data_root(&self) -> DataRoot {
        match &self.data_root {
            Some(root) => DataRoot::new(root),
            None => DataRoot::from_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingSummary {
    pub records: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Error>,
}

/// Names emitted nodes and forwards the records.
struct Sink {
    naming: ObjectNaming,
    observer: RefCell<Box<dyn EventObserver>>,
    on_event: RefCell<Option<Box<dyn FnMut(&Record)>>>,
    recorded: Cell<usize>,
    errors: RefCell<Vec<Error>>,
}

impl Sink {
    fn emit(&self, node: NodeId, command: &str, arguments: &str) {
        match self.naming.path_of(node) {
            Ok(path) => self.push(Record::event(path.to_string(), command, arguments)),
            Err(e) => {
                warn!(node = %node, command, "dropping event: {}", e.message);
                self.errors.borrow_mut().push(e);
            }
        }
    }

    fn push(&self, record: Record) {
        debug!(%record, "recorded");
        if let Err(e) = self.observer.borrow_mut().on_record(&record) {
            warn!("observer rejected record: {}", e.message);
            self.errors.borrow_mut().push(e);
        }
        if let Ok(mut callback) = self.on_event.try_borrow_mut() {
            if let Some(callback) = callback.as_mut() {
                callback(&record);
            }
        }
        self.recorded.set(self.recorded.get() + 1);
    }
}

struct Core {
    host: Rc<dyn Host>,
    translators: RefCell<TranslatorRegistry>,
    sink: Rc<Sink>,
    ignored: RefCell<HashSet<NodeId>>,
    data_root: DataRoot,
}

impl Core {
    fn is_ignored(&self, node: NodeId) -> bool {
        let ignored = self.ignored.borrow();
        if ignored.is_empty() {
            return false;
        }
        let mut cur = Some(node);
        while let Some(n) = cur {
            if ignored.contains(&n) {
                return true;
            }
            cur = self.host.parent(n);
        }
        false
    }

    fn emitter(&self) -> Emitter {
        let sink = Rc::downgrade(&self.sink);
        Emitter::new(move |node, command, arguments| {
            if let Some(sink) = sink.upgrade() {
                sink.emit(node, command, arguments);
            }
        })
    }

    fn handle(&self, node: NodeId, event: &NativeEvent) {
        if self.is_ignored(node) {
            trace!(node = %node, "ignored");
            return;
        }
        // Events raised while a translator is running are the translator's own doing.
        let Ok(mut translators) = self.translators.try_borrow_mut() else {
            return;
        };
        let cx = TranslateContext {
            host: self.host.clone(),
            emitter: self.emitter(),
            data_root: self.data_root.clone(),
        };
        let outcome = translators.translate(&cx, node, event);
        drop(translators);

        match outcome {
            Translation::Emit {
                node,
                command,
                arguments,
            } => self.sink.emit(node, &command, &arguments),
            Translation::Error(reason) => {
                warn!(node = %node, ?event, "translation failed: {}", reason);
                self.sink.errors.borrow_mut().push(Error::new(
                    ErrorCode::CommandFailed,
                    format!("Could not translate {:?} on {}: {}", event, node, reason),
                ));
            }
            Translation::Handled | Translation::Unhandled => {}
        }
    }
}

pub struct Recorder {
    host: Rc<dyn Host>,
    config: RecorderConfig,
}

impl Recorder {
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self::with_config(host, RecorderConfig::default())
    }

    pub fn with_config(host: Rc<dyn Host>, config: RecorderConfig) -> Self {
        Self { host, config }
    }

    pub fn start(&self, observer: Box<dyn EventObserver>) -> RecordingSession {
        self.start_with(TranslatorRegistry::with_defaults(self.config.capture_moves), observer)
    }

    pub fn start_with(&self, translators: TranslatorRegistry, observer: Box<dyn EventObserver>) -> RecordingSession {
        let naming = ObjectNaming::new(self.host.clone());
        let mut ignored = HashSet::new();
        for path in &self.config.ignore_paths {
            match naming.resolve_str(path) {
                Ok(node) => {
                    ignored.insert(node);
                }
                Err(e) => warn!(path = %path, "ignore path not found: {}", e.message),
            }
        }
        let core = Rc::new(Core {
            host: self.host.clone(),
            translators: RefCell::new(translators),
            sink: Rc::new(Sink {
                naming,
                observer: RefCell::new(observer),
                on_event: RefCell::new(None),
                recorded: Cell::new(0),
                errors: RefCell::new(Vec::new()),
            }),
            ignored: RefCell::new(ignored),
            data_root: self.config.data_root(),
        });
        let weak = Rc::downgrade(&core);
        let filter = self.host.add_event_filter(Rc::new(move |node: NodeId, event: &NativeEvent| {
            if let Some(core) = weak.upgrade() {
                core.handle(node, event);
            }
        }));
        info!("recording started");
        RecordingSession {
            core,
            filter: Some(filter),
        }
    }
}

pub struct RecordingSession {
    core: Rc<Core>,
    filter: Option<Subscription>,
}

impl RecordingSession {
    /// Never record this node or anything under it.
    pub fn ignore(&self, node: NodeId) {
        self.core.ignored.borrow_mut().insert(node);
    }

    /// Called with every record after the observer has it.
    pub fn on_event(&self, callback: impl FnMut(&Record) + 'static) {
        *self.core.sink.on_event.borrow_mut() = Some(Box::new(callback));
    }

    /// Record a check of the property's current value.
    pub fn check(&self, node: NodeId, property: &str) -> Result<Record> {
        let value = self.core.host.property(node, property).ok_or_else(|| {
            Error::new(
                ErrorCode::CommandFailed,
                format!("{} has no property `{}`", node, property),
            )
        })?;
        let path = self.core.sink.naming.path_of(node)?;
        let record = Record::check(path.to_string(), property, value.to_string());
        self.core.sink.push(record.clone());
        Ok(record)
    }

    /// Record an image comparison against a baseline.
    pub fn compare(&self, node: NodeId, baseline: &str, threshold: f64) -> Result<Record> {
        let path = self.core.sink.naming.path_of(node)?;
        let baseline = self.core.data_root.contract(baseline);
        let record = Record::compare(path.to_string(), baseline, threshold);
        self.core.sink.push(record.clone());
        Ok(record)
    }

    pub fn recorded(&self) -> usize {
        self.core.sink.recorded.get()
    }

    pub fn errors(&self) -> Vec<Error> {
        self.core.sink.errors.borrow().clone()
    }

    /// Uninstall the filter and complete the destination.
    pub fn stop(mut self) -> Result<RecordingSummary> {
        self.filter.take();
        self.core.translators.borrow_mut().reset();
        self.core.sink.observer.borrow_mut().finish()?;
        let summary = RecordingSummary {
            records: self.recorded(),
            errors: self.errors(),
        };
        info!(records = summary.records, "recording stopped");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryObserver;
    use uiplay_core::{Capability, MemoryHost, Value};

    #[test]
    fn ignored_subtrees_are_not_recorded() {
        let host = MemoryHost::new();
        let main = host.add_root("QMainWindow", "main", Capability::Window);
        let ok = host.add_child(main, "QPushButton", "ok", Capability::Button);
        let panel = host.add_root("QWidget", "recorderPanel", Capability::Container);
        let stop = host.add_child(panel, "QPushButton", "stop", Capability::Button);

        let observer = MemoryObserver::new();
        let config = RecorderConfig {
            ignore_paths: vec!["recorderPanel".into()],
            ..RecorderConfig::default()
        };
        let session = Recorder::with_config(Rc::new(host.clone()), config).start(Box::new(observer.clone()));
        host.click(ok).unwrap();
        host.click(stop).unwrap();
        let summary = session.stop().unwrap();

        assert_eq!(summary.records, 1);
        assert_eq!(observer.records(), vec![Record::event("main/ok", "activate", "")]);
    }

    #[test]
    fn unnameable_nodes_are_reported_not_recorded() {
        let host = MemoryHost::new();
        let orphan = host.add_root("", "", Capability::Button);
        let observer = MemoryObserver::new();
        let session = Recorder::new(Rc::new(host.clone())).start(Box::new(observer.clone()));
        host.click(orphan).unwrap();
        assert_eq!(session.errors().len(), 1);
        assert_eq!(session.errors()[0].code, ErrorCode::IncompleteNaming);
        assert!(observer.records().is_empty());
    }

    #[test]
    fn checks_capture_current_values() {
        let host = MemoryHost::new();
        let spin = host.add_root("QSpinBox", "spin", Capability::IntRange);
        host.init_property(spin, "value", 7i64);
        let observer = MemoryObserver::new();
        let session = Recorder::new(Rc::new(host.clone())).start(Box::new(observer.clone()));
        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        session.on_event(move |_| s.set(s.get() + 1));

        session.check(spin, "value").unwrap();
        assert!(session.check(spin, "missing").is_err());
        assert_eq!(observer.records(), vec![Record::check("spin", "value", "7")]);
        assert_eq!(seen.get(), 1);
        assert_eq!(host.property(spin, "value"), Some(Value::Int(7)));
    }

    #[test]
    fn stopping_releases_the_filter() {
        let host = MemoryHost::new();
        let ok = host.add_root("QPushButton", "ok", Capability::Button);
        let observer = MemoryObserver::new();
        let session = Recorder::new(Rc::new(host.clone())).start(Box::new(observer.clone()));
        session.stop().unwrap();
        host.click(ok).unwrap();
        assert!(observer.records().is_empty());
    }
}
