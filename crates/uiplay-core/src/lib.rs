//! uiplay-core - object naming and host abstraction for GUI test playback
//!
//! Stable, serializable addresses for nodes in a live widget tree, and the
//! narrow [`Host`] interface the engine needs from a GUI toolkit.
//!
//! ## Modules
//!
//! - **naming**: node ⇄ object path, plus naming validation
//! - **host**: toolkit abstraction and a headless in-memory host
//! - **path**: object path syntax
//! - **config**: data-root placeholder substitution

pub mod config;
pub mod error;
pub mod host;
pub mod naming;
pub mod node;
pub mod path;
pub mod value;

pub use config::DataRoot;
pub use error::{Error, ErrorCode, Result};
pub use host::{Behavior, Host, MemoryHost, Scene, SceneIds, Subscription};
pub use naming::{ObjectNaming, Violation, ViolationKind};
pub use node::{Capability, Modifiers, MouseEvent, NativeEvent, NodeId};
pub use path::ObjectPath;
pub use value::Value;

pub mod prelude {
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::host::{Behavior, Host, MemoryHost, Scene, Subscription};
    pub use crate::naming::{ObjectNaming, Violation};
    pub use crate::node::{Capability, NativeEvent, NodeId};
    pub use crate::path::ObjectPath;
    pub use crate::value::Value;
}
