//! uiplay - GUI test record/playback
//!
//! Records user interactions with a widget tree as abstract commands
//! addressed by object path, and replays them later as regression tests.
//!
//! ## Crates
//!
//! - **uiplay-core**: object naming, the [`Host`] abstraction, an in-memory host
//! - **uiplay-recorder**: translators, players, the playback dispatcher and
//!   the on-disk formats
//!
//! [`Engine`] ties them together for an embedding application.

use std::path::Path;
use std::rc::Rc;
use tracing::info;

pub use uiplay_core::{DataRoot, Error, ErrorCode, Host, MemoryHost, NodeId, ObjectNaming, Result, Violation};
pub use uiplay_recorder::{
    EventSource, PlaybackConfig, PlaybackReport, PlayerRegistry, Record, RecorderConfig, RecordingSummary,
    TranslatorRegistry,
};

use uiplay_recorder::{create_observer, open_source, Dispatcher, Recorder, RecordingSession};

pub mod prelude {
    pub use crate::Engine;
    pub use uiplay_recorder::prelude::*;
}

/// Record and play tests against one host.
pub struct Engine {
    host: Rc<dyn Host>,
    naming: ObjectNaming,
    players: Rc<PlayerRegistry>,
    translators: Box<dyn Fn() -> TranslatorRegistry>,
    playback: PlaybackConfig,
    recording: RecorderConfig,
    session: Option<RecordingSession>,
}

impl Engine {
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self {
            naming: ObjectNaming::new(host.clone()),
            host,
            players: Rc::new(PlayerRegistry::with_defaults()),
            translators: Box::new(|| TranslatorRegistry::with_defaults(false)),
            playback: PlaybackConfig::default(),
            recording: RecorderConfig::default(),
            session: None,
        }
    }

    pub fn with_playback_config(mut self, config: PlaybackConfig) -> Self {
        self.playback = config;
        self
    }

    /// Also decides whether item-view pointer moves are captured.
    pub fn with_recorder_config(mut self, config: RecorderConfig) -> Self {
        let capture_moves = config.capture_moves;
        self.translators = Box::new(move || TranslatorRegistry::with_defaults(capture_moves));
        self.recording = config;
        self
    }

    pub fn set_players(&mut self, players: PlayerRegistry) {
        self.players = Rc::new(players);
    }

    /// Each recording starts from a fresh registry built by `factory`.
    pub fn set_translators(&mut self, factory: impl Fn() -> TranslatorRegistry + 'static) {
        self.translators = Box::new(factory);
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Start recording into `path`; the format follows the extension.
    pub fn record(&mut self, path: impl AsRef<Path>, on_event: impl FnMut(&Record) + 'static) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::new(ErrorCode::ReentrancyViolation, "A recording is already in progress"));
        }
        let observer = create_observer(path.as_ref())?;
        let session = Recorder::with_config(self.host.clone(), self.recording.clone())
            .start_with((self.translators)(), observer);
        session.on_event(on_event);
        info!(path = %path.as_ref().display(), "recording to file");
        self.session = Some(session);
        Ok(())
    }

    pub fn stop_recording(&mut self) -> Result<RecordingSummary> {
        match self.session.take() {
            Some(session) => session.stop(),
            None => Err(Error::new(ErrorCode::Unknown, "No recording in progress")),
        }
    }

    /// Replay a test file. Failures to open the file or to start the
    /// session are reported like any other failure.
    pub fn playback(&self, path: impl AsRef<Path>) -> PlaybackReport {
        match open_source(path.as_ref()) {
            Ok(source) => self.playback_source(source),
            Err(e) => PlaybackReport::not_started(e),
        }
    }

    pub fn playback_source(&self, source: Box<dyn EventSource>) -> PlaybackReport {
        let dispatcher = Dispatcher::with_config(self.host.clone(), self.playback.clone());
        match dispatcher.play(source, self.players.clone()) {
            Ok(report) => report,
            Err(e) => PlaybackReport::not_started(e),
        }
    }

    /// Naming problems below `root`, all of them.
    pub fn validate_naming(&self, root: NodeId) -> Vec<Violation> {
        self.naming.validate(root)
    }

    pub fn validate_all(&self) -> Vec<Violation> {
        self.naming.validate_all()
    }
}
