//! Translators turn native events into abstract commands

use std::rc::Rc;
use tracing::trace;
use uiplay_core::{DataRoot, Host, NativeEvent, NodeId, Subscription};

/// Outcome of offering one native event to one translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// Not mine; offer it to the next translator.
    Unhandled,
    /// Consumed without emitting anything (the outcome will be captured
    /// some other way, e.g. by a value subscription).
    Handled,
    Emit {
        node: NodeId,
        command: String,
        arguments: String,
    },
    /// Consumed, but the event could not be translated.
    Error(String),
}

impl Translation {
    pub fn emit(node: NodeId, command: impl Into<String>, arguments: impl Into<String>) -> Self {
        Translation::Emit {
            node,
            command: command.into(),
            arguments: arguments.into(),
        }
    }

    pub fn is_handled(&self) -> bool {
        !matches!(self, Translation::Unhandled)
    }
}

/// Emits commands outside a `translate` call, from value subscriptions.
#[derive(Clone)]
pub struct Emitter(Rc<dyn Fn(NodeId, &str, &str)>);

impl Emitter {
    pub fn new(f: impl Fn(NodeId, &str, &str) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// An emitter that drops everything.
    pub fn discard() -> Self {
        Self::new(|_, _, _| {})
    }

    pub fn emit(&self, node: NodeId, command: &str, arguments: &str) {
        (self.0)(node, command, arguments)
    }
}

pub struct TranslateContext {
    pub host: Rc<dyn Host>,
    pub emitter: Emitter,
    pub data_root: DataRoot,
}

pub trait Translator {
    fn name(&self) -> &str;

    fn translate(&mut self, cx: &TranslateContext, node: NodeId, event: &NativeEvent) -> Translation;

    /// Drop any per-session state, e.g. focus subscriptions.
    fn reset(&mut self) {}
}

/// The node a translator is currently watching, with its subscription.
/// Replacing or clearing the slot unsubscribes from the previous node.
#[derive(Debug, Default)]
pub struct FocusSlot {
    node: Option<NodeId>,
    subscription: Option<Subscription>,
}

impl FocusSlot {
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn is(&self, node: NodeId) -> bool {
        self.node == Some(node)
    }

    pub fn focus(&mut self, node: NodeId, subscription: Option<Subscription>) {
        self.clear();
        self.node = Some(node);
        self.subscription = subscription;
    }

    pub fn clear(&mut self) {
        self.node = None;
        self.subscription = None;
    }
}

/// Translators in registration order; the first to handle an event stops
/// the search.
#[derive(Default)]
pub struct TranslatorRegistry {
    translators: Vec<Box<dyn Translator>>,
}

impl TranslatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(capture_moves: bool) -> Self {
        Self {
            translators: crate::adapters::default_translators(capture_moves),
        }
    }

    pub fn add(&mut self, translator: impl Translator + 'static) -> &mut Self {
        self.translators.push(Box::new(translator));
        self
    }

    pub fn add_first(&mut self, translator: impl Translator + 'static) -> &mut Self {
        self.translators.insert(0, Box::new(translator));
        self
    }

    pub fn len(&self) -> usize {
        self.translators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translators.is_empty()
    }

    pub fn translate(&mut self, cx: &TranslateContext, node: NodeId, event: &NativeEvent) -> Translation {
        for t in self.translators.iter_mut() {
            let outcome = t.translate(cx, node, event);
            if outcome.is_handled() {
                trace!(translator = t.name(), ?outcome, "translated");
                return outcome;
            }
        }
        Translation::Unhandled
    }

    pub fn reset(&mut self) {
        for t in self.translators.iter_mut() {
            t.reset();
        }
    }
}
