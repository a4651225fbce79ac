//! Scripted event sources
//!
//! A script runs on a worker thread and produces records for the
//! dispatcher to play. It can also read and write the live UI, but never
//! touches the host directly: each request is sent to the GUI thread, which
//! serves it while the dispatcher waits for the next record, and the worker
//! blocks until the GUI thread acknowledges it.
//!
//! A script must not invoke methods that open modal dialogs; emit an
//! `activate` record for those so the dispatcher can follow the dialog.

use crate::events::{EventSource, Record, SourceItem};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};
use uiplay_core::{Error, ErrorCode, Host, ObjectNaming, Result, Value};

#[derive(Debug, Clone)]
pub enum ScriptRequest {
    Property {
        path: String,
        name: String,
    },
    SetProperty {
        path: String,
        name: String,
        value: Value,
    },
    Invoke {
        path: String,
        method: String,
        args: Vec<Value>,
    },
    Exists {
        path: String,
    },
}

enum Message {
    Record(Record),
    Request(ScriptRequest, Sender<Result<Value>>),
}

/// The worker's handle on the session.
pub struct ScriptContext {
    tx: Sender<Message>,
}

impl ScriptContext {
    fn request(&self, request: ScriptRequest) -> Result<Value> {
        let (ack_tx, ack_rx) = bounded(1);
        self.tx
            .send(Message::Request(request, ack_tx))
            .map_err(|_| closed())?;
        ack_rx.recv().map_err(|_| closed())?
    }

    /// Queue a record for playback.
    pub fn emit(&self, record: Record) -> Result<()> {
        self.tx.send(Message::Record(record)).map_err(|_| closed())
    }

    pub fn activate(&self, path: &str) -> Result<()> {
        self.emit(Record::event(path, crate::events::commands::ACTIVATE, ""))
    }

    pub fn property(&self, path: &str, name: &str) -> Result<Value> {
        self.request(ScriptRequest::Property {
            path: path.to_string(),
            name: name.to_string(),
        })
    }

    pub fn set_property(&self, path: &str, name: &str, value: impl Into<Value>) -> Result<()> {
        self.request(ScriptRequest::SetProperty {
            path: path.to_string(),
            name: name.to_string(),
            value: value.into(),
        })
        .map(|_| ())
    }

    pub fn invoke(&self, path: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        self.request(ScriptRequest::Invoke {
            path: path.to_string(),
            method: method.to_string(),
            args,
        })
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        let found = self.request(ScriptRequest::Exists {
            path: path.to_string(),
        })?;
        Ok(found.as_bool().unwrap_or(false))
    }
}

fn closed() -> Error {
    Error::new(ErrorCode::Unknown, "The playback session is gone")
}

type Outcome = Arc<Mutex<Option<std::result::Result<(), String>>>>;

pub struct ScriptSource {
    rx: Receiver<Message>,
    naming: ObjectNaming,
    worker: Option<JoinHandle<()>>,
    outcome: Outcome,
    finished: Option<SourceItem>,
}

impl ScriptSource {
    /// Start `script` on a worker thread. The script ends the test by
    /// returning; an error or panic fails it.
    pub fn spawn<F>(host: Rc<dyn Host>, script: F) -> Self
    where
        F: FnOnce(&ScriptContext) -> anyhow::Result<()> + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let outcome: Outcome = Arc::new(Mutex::new(None));
        let slot = outcome.clone();
        let worker = thread::spawn(move || {
            let cx = ScriptContext { tx };
            let result = script(&cx).map_err(|e| format!("{:#}", e));
            *slot.lock() = Some(result);
            // Dropping the context closes the channel, which the GUI side
            // reads as the end of the script.
            drop(cx);
        });
        Self {
            rx,
            naming: ObjectNaming::new(host),
            worker: Some(worker),
            outcome,
            finished: None,
        }
    }

    fn serve(&self, request: ScriptRequest) -> Result<Value> {
        debug!(?request, "script request");
        let host = self.naming.host();
        match request {
            ScriptRequest::Exists { path } => Ok(Value::Bool(self.naming.resolve_str(&path).is_ok())),
            ScriptRequest::Property { path, name } => {
                let node = self.naming.resolve_str(&path)?;
                Ok(host.property(node, &name).unwrap_or_default())
            }
            ScriptRequest::SetProperty { path, name, value } => {
                let node = self.naming.resolve_str(&path)?;
                host.set_property(node, &name, value)?;
                Ok(Value::Null)
            }
            ScriptRequest::Invoke { path, method, args } => {
                let node = self.naming.resolve_str(&path)?;
                host.invoke(node, &method, &args)
            }
        }
    }

    fn conclude(&mut self) -> SourceItem {
        let panicked = match self.worker.take() {
            Some(handle) => handle.join().is_err(),
            None => false,
        };
        let item = match self.outcome.lock().take() {
            Some(Ok(())) => SourceItem::Done,
            Some(Err(message)) => SourceItem::Failure(Error::new(
                ErrorCode::CommandFailed,
                format!("Script failed: {}", message),
            )),
            None if panicked => SourceItem::Failure(Error::new(ErrorCode::Unknown, "Script panicked")),
            None => SourceItem::Failure(Error::new(ErrorCode::Unknown, "Script ended without a result")),
        };
        if let SourceItem::Failure(e) = &item {
            warn!("{}", e.message);
        }
        item
    }
}

impl EventSource for ScriptSource {
    fn next(&mut self) -> SourceItem {
        if let Some(item) = &self.finished {
            return item.clone();
        }
        loop {
            match self.rx.recv() {
                Ok(Message::Record(record)) => return SourceItem::Record(record),
                Ok(Message::Request(request, ack)) => {
                    let result = self.serve(request);
                    // The worker may have given up waiting; nothing to do then.
                    let _ = ack.send(result);
                }
                Err(_) => {
                    let item = self.conclude();
                    self.finished = Some(item.clone());
                    return item;
                }
            }
        }
    }
}

impl Drop for ScriptSource {
    fn drop(&mut self) {
        // Unblock a worker still waiting on a request, then let it finish.
        while let Ok(Message::Request(_, ack)) = self.rx.try_recv() {
            let _ = ack.send(Err(closed()));
        }
        if let Some(handle) = self.worker.take() {
            if !handle.is_finished() {
                debug!("script still running at drop; detaching");
            }
        }
    }
}
