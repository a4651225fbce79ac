//! uiplay-recorder - record native UI events and play them back
//!
//! Recording offers every native event to an ordered list of
//! [`Translator`]s, which turn them into abstract commands addressed by
//! object path. Playback reads those records back and hands each to the
//! first [`Player`] that claims it, following modal dialogs into their
//! nested event loops.
//!
//! ## Example
//!
//! ```rust,ignore
//! use uiplay_recorder::prelude::*;
//!
//! let dispatcher = Dispatcher::new(host.clone());
//! let report = dispatcher.play(open_source("smoke.xml")?, Rc::new(PlayerRegistry::with_defaults()))?;
//! assert!(report.success(), "{:?}", report.diagnostic());
//! ```

pub mod adapters;
pub mod dispatcher;
pub mod events;
pub mod player;
pub mod recorder;
pub mod script;
pub mod storage;
pub mod translator;
pub mod xml;

pub use dispatcher::{DispatchState, Dispatcher, PlaybackConfig, PlaybackReport, PlaybackSession, Status};
pub use events::{EventObserver, EventSource, MemoryObserver, MemorySource, Record, SourceItem};
pub use player::{BaselineComparator, PlayContext, PlayResult, Player, PlayerRegistry};
pub use recorder::{Recorder, RecorderConfig, RecordingSession, RecordingSummary};
pub use script::{ScriptContext, ScriptSource};
pub use storage::{create_observer, open_source, read_records, write_records, Format, TestStorage};
pub use translator::{Emitter, FocusSlot, TranslateContext, Translation, Translator, TranslatorRegistry};

pub mod prelude {
    pub use crate::dispatcher::{Dispatcher, PlaybackConfig, PlaybackReport, Status};
    pub use crate::events::{EventObserver, EventSource, Record, SourceItem};
    pub use crate::player::{PlayContext, PlayResult, Player, PlayerRegistry};
    pub use crate::recorder::{Recorder, RecorderConfig, RecordingSession};
    pub use crate::storage::{create_observer, open_source};
    pub use crate::translator::{TranslateContext, Translation, Translator, TranslatorRegistry};
    pub use std::rc::Rc;
    pub use uiplay_core::prelude::*;
}
