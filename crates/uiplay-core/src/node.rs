//! Node handles, capability tags and native events

use serde::{Deserialize, Serialize};
use std::fmt;

/// Weak handle to a node owned by the host toolkit.
///
/// Handles are never reused by a host, so a stale handle simply stops
/// answering queries once its node is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node can do. Adapters dispatch on this tag instead of
/// inspecting toolkit classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Window,
    Dialog,
    Menu,
    /// Push buttons, tool buttons and menu actions.
    Button,
    Checkable,
    IntRange,
    DoubleRange,
    Text,
    FileChooser,
    ItemView,
    #[default]
    Container,
    Layout,
    SignalMapper,
    Header,
    Viewport,
    Separator,
}

impl Capability {
    /// Cosmetic nodes are exempt from naming validation.
    pub fn is_cosmetic(self) -> bool {
        matches!(
            self,
            Capability::Layout
                | Capability::SignalMapper
                | Capability::Header
                | Capability::Viewport
                | Capability::Separator
        )
    }

    /// Nodes that may own a modal or popup scope.
    pub fn is_scope_owner(self) -> bool {
        matches!(
            self,
            Capability::Dialog | Capability::Menu | Capability::FileChooser
        )
    }
}

/// Modifier flags packed into a single byte
/// Bit 0: shift, 1: ctrl, 2: alt, 3: meta
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers(pub u8);

impl Modifiers {
    pub const SHIFT: u8 = 1 << 0;
    pub const CTRL: u8 = 1 << 1;
    pub const ALT: u8 = 1 << 2;
    pub const META: u8 = 1 << 3;

    pub fn has_shift(&self) -> bool {
        self.0 & Self::SHIFT != 0
    }

    pub fn has_ctrl(&self) -> bool {
        self.0 & Self::CTRL != 0
    }
}

/// Mouse button codes used in recorded arguments.
pub mod button {
    pub const LEFT: u8 = 0;
    pub const RIGHT: u8 = 1;
    pub const MIDDLE: u8 = 2;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseEvent {
    pub button: u8,
    pub modifiers: Modifiers,
    pub x: i32,
    pub y: i32,
    /// Internal cell address for list/tree/table-like controls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
}

impl MouseEvent {
    pub fn new(button: u8, x: i32, y: i32) -> Self {
        Self {
            button,
            modifiers: Modifiers::default(),
            x,
            y,
            cell: None,
        }
    }

    pub fn with_cell(mut self, cell: impl Into<String>) -> Self {
        self.cell = Some(cell.into());
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Native UI events as delivered by the host's pre-dispatch filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "e", rename_all = "snake_case")]
pub enum NativeEvent {
    MousePress(MouseEvent),
    MouseRelease(MouseEvent),
    MouseMove(MouseEvent),
    MouseDoubleClick(MouseEvent),
    KeyPress { key: i32, text: String },
    FocusIn,
    FocusOut,
    Enter,
    Leave,
    /// A button was clicked or an action triggered.
    Activated,
    Show,
    Hide,
}

impl NativeEvent {
    pub fn is_focus_gain(&self) -> bool {
        matches!(self, NativeEvent::FocusIn | NativeEvent::Enter)
    }

    pub fn is_focus_loss(&self) -> bool {
        matches!(self, NativeEvent::FocusOut | NativeEvent::Leave)
    }
}
