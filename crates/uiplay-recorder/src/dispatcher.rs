//! Playback dispatcher
//!
//! Pulls records from an [`EventSource`] one at a time, resolves each
//! record's path, and hands it to the first player that claims it. After
//! every action the host is pumped for the settle period so the UI can
//! react before the next record is read.
//!
//! Actions that open a modal dialog do not return until the dialog closes,
//! because the host runs a nested event loop. The dispatcher watches the
//! active modal owner through an event filter; when an action opens a new
//! one, it posts a deferred task that the nested loop runs, and that task
//! keeps dispatching records from inside the loop until the dialog closes.
//! Non-blocking popups are entered the same way, from the settle pump, or
//! adopted by the dispatch loop after settling.
//!
//! At most one session runs per GUI thread at a time.
//!
//! ## Limitations
//!
//! - There is no per-step timeout. A native action that never returns, or
//!   that blocks without pumping the host's loop, stalls the session.
//! - Popups that no action opened are detected by debounce: an owner must
//!   stay active for `popup_debounce_ms` before it becomes a scope. This is
//!   best-effort; a popup that closes sooner, or that is still inside its
//!   debounce when the next record is read, is not scoped. Such popups are
//!   still closed when the session finishes.

use crate::events::{EventSource, Record, SourceItem};
use crate::player::{PlayContext, PlayResult, PlayerRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uiplay_core::{DataRoot, Error, ErrorCode, Host, NativeEvent, NodeId, ObjectNaming, Result, Subscription};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// How long the host is pumped after each action.
    pub settle_ms: u64,
    /// How long a popup that no action opened must stay up before it is
    /// treated as a scope. Detection is best-effort; see the module docs.
    pub popup_debounce_ms: u64,
    /// Overrides `UIPLAY_DATA_ROOT`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_root: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            settle_ms: 100,
            popup_debounce_ms: 100,
            data_root: None,
        }
    }
}

impl PlaybackConfig {
    /// No settle wait and no debounce, for headless hosts.
    pub fn immediate() -> Self {
        Self {
            settle_ms: 0,
            popup_debounce_ms: 0,
            data_root: None,
        }
    }

    pub fn data_root(&self) -> DataRoot {
        match &self.data_root {
            Some(root) => DataRoot::new(root),
            None => DataRoot::from_env(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatching,
    /// Dispatching from inside this many modal scopes.
    AwaitingNestedLoop(usize),
    Finished(Status),
}

/// A modal or popup scope the dispatcher is working inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModalScope {
    pub owner: NodeId,
    /// Entered from a deferred task inside the host's loop, as opposed to
    /// adopted by the dispatch loop.
    pub nested: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayedStep {
    pub index: usize,
    /// Modal scopes open when the step started.
    pub depth: usize,
    pub record: Record,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybackReport {
    pub status: Status,
    pub steps: Vec<PlayedStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_record: Option<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl PlaybackReport {
    /// A session that could not start.
    pub fn not_started(error: Error) -> Self {
        Self {
            status: Status::Failure,
            steps: Vec::new(),
            failed_record: None,
            error: Some(error),
            started_at: Utc::now(),
            elapsed_ms: 0,
        }
    }

    pub fn success(&self) -> bool {
        self.status == Status::Success
    }

    /// One line explaining a failure.
    pub fn diagnostic(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        Some(match &self.failed_record {
            Some(record) => format!("{} (while playing `{}`)", error.message, record),
            None => error.message.clone(),
        })
    }
}

thread_local! {
    static SESSION_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Held by the one live session on this thread.
struct ActiveGuard(());

impl ActiveGuard {
    fn acquire() -> Option<Self> {
        SESSION_ACTIVE.with(|active| {
            if active.get() {
                None
            } else {
                active.set(true);
                Some(ActiveGuard(()))
            }
        })
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        SESSION_ACTIVE.with(|active| active.set(false));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Reading,
    Acting,
    Settling,
}

struct Outcome {
    status: Status,
    failed_record: Option<Record>,
    error: Option<Error>,
}

struct Session {
    host: Rc<dyn Host>,
    naming: ObjectNaming,
    players: Rc<PlayerRegistry>,
    source: RefCell<Box<dyn EventSource>>,
    data_root: DataRoot,
    settle: Duration,
    debounce: Duration,
    scopes: RefCell<Vec<ModalScope>>,
    /// Owner opened by an action whose deferred entry has not run yet.
    pending: Cell<Option<NodeId>>,
    /// Owner that appeared while no action was running, and since when.
    candidate: Cell<Option<(NodeId, Instant)>>,
    phase: Cell<Phase>,
    /// Owner already active when the session started; never closed by it.
    baseline: Option<NodeId>,
    started: Cell<bool>,
    outcome: RefCell<Option<Outcome>>,
    steps: RefCell<Vec<PlayedStep>>,
}

impl Session {
    fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    fn status(&self) -> Option<Status> {
        self.outcome.borrow().as_ref().map(|o| o.status)
    }

    fn state(&self) -> DispatchState {
        if let Some(status) = self.status() {
            return DispatchState::Finished(status);
        }
        if !self.started.get() {
            return DispatchState::Idle;
        }
        match self.scopes.borrow().len() {
            0 => DispatchState::Dispatching,
            n => DispatchState::AwaitingNestedLoop(n),
        }
    }

    fn knows(&self, owner: NodeId) -> bool {
        self.pending.get() == Some(owner) || self.scopes.borrow().iter().any(|s| s.owner == owner)
    }

    /// Event filter callback.
    fn observe(self: &Rc<Self>) {
        if !self.started.get() || self.is_finished() {
            return;
        }
        let Some(owner) = self.host.active_modal() else {
            self.candidate.set(None);
            return;
        };
        if self.knows(owner) {
            return;
        }
        match self.phase.get() {
            Phase::Acting => self.schedule_entry(owner),
            // The debounce runs from the first sighting; the dispatch loop
            // adopts the owner once it has elapsed.
            Phase::Settling | Phase::Reading => {
                if !matches!(self.candidate.get(), Some((c, _)) if c == owner) {
                    self.candidate.set(Some((owner, Instant::now())));
                }
            }
        }
    }

    fn schedule_entry(self: &Rc<Self>, owner: NodeId) {
        debug!(owner = %owner, "action opened a scope, scheduling re-entry");
        self.pending.set(Some(owner));
        self.candidate.set(None);
        let weak = Rc::downgrade(self);
        self.host.post(Box::new(move || {
            if let Some(session) = weak.upgrade() {
                session.enter_pending(owner);
            }
        }));
    }

    /// Deferred task: dispatch from inside the host's loop for `owner`.
    fn enter_pending(self: &Rc<Self>, owner: NodeId) {
        if self.is_finished() || self.pending.get() != Some(owner) {
            return;
        }
        // The source is mid-read; the dispatch loop adopts the scope once
        // the read returns.
        if self.phase.get() == Phase::Reading {
            return;
        }
        self.pending.set(None);
        if self.host.active_modal() != Some(owner) {
            debug!(owner = %owner, "scope closed before it was entered");
            return;
        }
        let floor = {
            let mut scopes = self.scopes.borrow_mut();
            scopes.push(ModalScope { owner, nested: true });
            scopes.len()
        };
        info!(owner = %owner, depth = floor, "entered modal scope");
        let saved = self.phase.get();
        self.drive(floor);
        self.phase.set(saved);
    }

    /// Dispatch until finished or until the scope at `floor` closes.
    fn drive(self: &Rc<Self>, floor: usize) {
        while !self.is_finished() && self.sync_scopes(floor) {
            self.step();
        }
    }

    /// Pop closed scopes and adopt a newly active owner. Returns false once
    /// the scope this frame was entered for is gone.
    fn sync_scopes(&self, floor: usize) -> bool {
        let active = self.host.active_modal();
        if self.pending.get().is_some() && self.pending.get() != active {
            self.pending.set(None);
        }

        let mut scopes = self.scopes.borrow_mut();
        let keep = match active {
            None => 0,
            Some(owner) => scopes
                .iter()
                .rposition(|s| s.owner == owner)
                .map_or(scopes.len(), |i| i + 1),
        };
        if keep < floor {
            for s in scopes.drain(floor - 1..).rev() {
                info!(owner = %s.owner, "modal scope closed");
            }
            return false;
        }
        for s in scopes.drain(keep..).rev() {
            info!(owner = %s.owner, "modal scope closed");
        }

        let Some(owner) = active else {
            return true;
        };
        if scopes.iter().any(|s| s.owner == owner) {
            return true;
        }
        let adopt = if self.pending.get() == Some(owner) {
            true
        } else {
            let since = match self.candidate.get() {
                Some((c, since)) if c == owner => since,
                _ => {
                    let now = Instant::now();
                    self.candidate.set(Some((owner, now)));
                    now
                }
            };
            since.elapsed() >= self.debounce
        };
        if adopt {
            self.pending.set(None);
            self.candidate.set(None);
            scopes.push(ModalScope { owner, nested: false });
            info!(owner = %owner, depth = scopes.len(), "adopted popup scope");
        }
        true
    }

    fn step(self: &Rc<Self>) {
        self.phase.set(Phase::Reading);
        let item = match self.source.try_borrow_mut() {
            Ok(mut source) => source.next(),
            Err(_) => SourceItem::Failure(Error::new(
                ErrorCode::ReentrancyViolation,
                "The event source was re-entered while a record was being read",
            )),
        };
        let record = match item {
            SourceItem::Record(r) => r,
            SourceItem::Done => return self.finish(Status::Success, None, None),
            SourceItem::Failure(e) => return self.finish(Status::Failure, None, Some(e)),
        };

        let node = match self.naming.resolve_str(record.path()) {
            Ok(node) => node,
            Err(e) => return self.finish(Status::Failure, Some(record), Some(e)),
        };

        let depth = self.scopes.borrow().len();
        let index = {
            let mut steps = self.steps.borrow_mut();
            let index = steps.len() + 1;
            steps.push(PlayedStep {
                index,
                depth,
                record: record.clone(),
            });
            index
        };
        debug!(step = index, depth, %record, "playing");

        self.phase.set(Phase::Acting);
        let result = {
            let cx = PlayContext {
                host: &*self.host,
                data_root: &self.data_root,
            };
            self.players.play(&cx, node, &record)
        };
        // A nested scope may have ended the session while this action ran.
        if self.is_finished() {
            return;
        }
        match result {
            PlayResult::Played => {}
            PlayResult::NotHandled => {
                let e = Error::unhandled_command(record.path(), record.command());
                return self.finish(Status::Failure, Some(record), Some(e));
            }
            PlayResult::Failed(reason) => {
                let e = Error::command_failed(record.path(), record.command(), &reason);
                return self.finish(Status::Failure, Some(record), Some(e));
            }
        }

        self.phase.set(Phase::Settling);
        self.host.pump(self.settle);
    }

    /// Record the outcome once, then close any scopes still open so every
    /// nested loop can return.
    fn finish(&self, status: Status, failed_record: Option<Record>, error: Option<Error>) {
        {
            let mut outcome = self.outcome.borrow_mut();
            if outcome.is_some() {
                return;
            }
            match &error {
                Some(e) => error!(code = ?e.code, "playback failed: {}", e.message),
                None => info!(steps = self.steps.borrow().len(), "playback finished"),
            }
            *outcome = Some(Outcome {
                status,
                failed_record,
                error,
            });
        }
        self.pending.set(None);
        self.candidate.set(None);
        let open = std::mem::take(&mut *self.scopes.borrow_mut());
        for scope in open.iter().rev() {
            warn!(owner = %scope.owner, "closing scope left open");
            self.host.close_modal(scope.owner);
        }
        self.close_unscoped();
    }

    /// Close popups that opened during the session but never became a
    /// scope, innermost first, down to whatever was open at start.
    fn close_unscoped(&self) {
        let mut last = None;
        while let Some(owner) = self.host.active_modal() {
            if Some(owner) == self.baseline || Some(owner) == last {
                break;
            }
            warn!(owner = %owner, "closing popup that was never scoped");
            self.host.close_modal(owner);
            last = Some(owner);
        }
    }
}

/// A started playback. Drop or [`finish`](Self::finish) it to release the
/// event loop for the next session.
pub struct PlaybackSession {
    session: Rc<Session>,
    filter: Option<Subscription>,
    started_at: DateTime<Utc>,
    clock: Instant,
    _guard: ActiveGuard,
}

impl PlaybackSession {
    pub fn state(&self) -> DispatchState {
        self.session.state()
    }

    /// Scopes currently open, outermost first.
    pub fn scopes(&self) -> Vec<ModalScope> {
        self.session.scopes.borrow().clone()
    }

    /// Dispatch until the source is exhausted or a record fails.
    pub fn run(&self) -> Status {
        if let Some(status) = self.session.status() {
            return status;
        }
        self.session.started.set(true);
        info!("playback started");
        self.session.drive(0);
        self.session.status().unwrap_or(Status::Failure)
    }

    /// Abandon the session; scopes still open are closed.
    pub fn stop(&self) {
        self.session.finish(
            Status::Failure,
            None,
            Some(Error::new(ErrorCode::Unknown, "Playback stopped before the test finished")),
        );
    }

    pub fn finish(mut self) -> PlaybackReport {
        if !self.session.is_finished() {
            self.stop();
        }
        self.filter.take();
        let outcome = self.session.outcome.borrow_mut().take();
        let (status, failed_record, error) = match outcome {
            Some(o) => (o.status, o.failed_record, o.error),
            None => (Status::Failure, None, None),
        };
        PlaybackReport {
            status,
            steps: std::mem::take(&mut *self.session.steps.borrow_mut()),
            failed_record,
            error,
            started_at: self.started_at,
            elapsed_ms: self.clock.elapsed().as_millis() as u64,
        }
    }
}

pub struct Dispatcher {
    host: Rc<dyn Host>,
    config: PlaybackConfig,
}

impl Dispatcher {
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self::with_config(host, PlaybackConfig::default())
    }

    pub fn with_config(host: Rc<dyn Host>, config: PlaybackConfig) -> Self {
        Self { host, config }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Whether a session is live on this thread. Other threads are not
    /// consulted.
    pub fn is_active() -> bool {
        SESSION_ACTIVE.with(|active| active.get())
    }

    /// Begin a session. Fails with `ReentrancyViolation`, without side
    /// effects, if one is already live on this thread. The guard is per
    /// GUI thread, not process-wide: each thread drives its own host loop,
    /// so sessions on separate threads do not exclude each other.
    pub fn start(&self, source: Box<dyn EventSource>, players: Rc<PlayerRegistry>) -> Result<PlaybackSession> {
        let guard = ActiveGuard::acquire().ok_or_else(Error::reentrancy)?;
        let session = Rc::new(Session {
            host: self.host.clone(),
            naming: ObjectNaming::new(self.host.clone()),
            players,
            source: RefCell::new(source),
            data_root: self.config.data_root(),
            settle: Duration::from_millis(self.config.settle_ms),
            debounce: Duration::from_millis(self.config.popup_debounce_ms),
            scopes: RefCell::new(Vec::new()),
            pending: Cell::new(None),
            candidate: Cell::new(None),
            phase: Cell::new(Phase::Reading),
            baseline: self.host.active_modal(),
            started: Cell::new(false),
            outcome: RefCell::new(None),
            steps: RefCell::new(Vec::new()),
        });
        let weak = Rc::downgrade(&session);
        let filter = self.host.add_event_filter(Rc::new(move |_: NodeId, _: &NativeEvent| {
            if let Some(session) = weak.upgrade() {
                session.observe();
            }
        }));
        Ok(PlaybackSession {
            session,
            filter: Some(filter),
            started_at: Utc::now(),
            clock: Instant::now(),
            _guard: guard,
        })
    }

    /// Start, run and finish in one call.
    pub fn play(&self, source: Box<dyn EventSource>, players: Rc<PlayerRegistry>) -> Result<PlaybackReport> {
        let session = self.start(source, players)?;
        session.run();
        Ok(session.finish())
    }
}
