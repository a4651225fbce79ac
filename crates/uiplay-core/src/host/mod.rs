//! Host toolkit abstraction
//!
//! Everything the engine needs from a GUI toolkit goes through [`Host`].
//! All calls happen on the toolkit's GUI thread; implementations use
//! interior mutability and must never hold a borrow while invoking a
//! filter, listener or posted task, because those may re-enter the host.

pub mod memory;
pub mod scene;

use crate::error::Result;
use crate::node::{Capability, NativeEvent, NodeId};
use crate::value::Value;
use std::rc::Rc;
use std::time::Duration;

pub use memory::{Behavior, MemoryHost};
pub use scene::{Scene, SceneBehavior, SceneIds, SceneNode};

/// Pre-dispatch observer, called for every native event before the target sees it.
pub type EventFilter = Rc<dyn Fn(NodeId, &NativeEvent)>;

/// Called with `(node, property, new_value)` after a property changes.
pub type ValueListener = Rc<dyn Fn(NodeId, &str, &Value)>;

/// Zero-delay deferred callback.
pub type Task = Box<dyn FnOnce()>;

/// Scoped registration. Dropping it unregisters, on every exit path.
#[must_use = "dropping a Subscription unregisters it immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to release.
    pub fn empty() -> Self {
        Self { release: None }
    }

    pub fn release(mut self) {
        if let Some(f) = self.release.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.release.take() {
            f();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

pub trait Host {
    /// Top-level roots in the toolkit's stable order.
    fn top_level(&self) -> Vec<NodeId>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn exists(&self, node: NodeId) -> bool;

    /// Explicit name, empty when unnamed or destroyed.
    fn name(&self, node: NodeId) -> String;

    fn set_name(&self, node: NodeId, name: &str) -> bool;

    /// Toolkit class name, used for positional fallback names.
    fn type_tag(&self, node: NodeId) -> String;

    fn capability(&self, node: NodeId) -> Capability;

    fn is_visible(&self, node: NodeId) -> bool;

    fn is_enabled(&self, node: NodeId) -> bool {
        self.exists(node)
    }

    fn property(&self, node: NodeId, name: &str) -> Option<Value>;

    fn set_property(&self, node: NodeId, name: &str, value: Value) -> Result<()>;

    /// Invoke a method on the node. May enter a nested event loop and not
    /// return until that loop exits.
    fn invoke(&self, node: NodeId, method: &str, args: &[Value]) -> Result<Value>;

    fn add_event_filter(&self, filter: EventFilter) -> Subscription;

    /// Subscribe to property changes on one node. `None` if the node is gone.
    fn subscribe(&self, node: NodeId, listener: ValueListener) -> Option<Subscription>;

    /// The node owning the innermost active modal or popup scope.
    fn active_modal(&self) -> Option<NodeId>;

    /// Dismiss a modal or popup owner so its nested loop returns.
    fn close_modal(&self, node: NodeId);

    fn post(&self, task: Task);

    /// Process pending events for `max` before returning.
    fn pump(&self, max: Duration);
}

impl<H: Host + ?Sized> Host for Rc<H> {
    fn top_level(&self) -> Vec<NodeId> {
        (**self).top_level()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        (**self).parent(node)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        (**self).children(node)
    }

    fn exists(&self, node: NodeId) -> bool {
        (**self).exists(node)
    }

    fn name(&self, node: NodeId) -> String {
        (**self).name(node)
    }

    fn set_name(&self, node: NodeId, name: &str) -> bool {
        (**self).set_name(node, name)
    }

    fn type_tag(&self, node: NodeId) -> String {
        (**self).type_tag(node)
    }

    fn capability(&self, node: NodeId) -> Capability {
        (**self).capability(node)
    }

    fn is_visible(&self, node: NodeId) -> bool {
        (**self).is_visible(node)
    }

    fn is_enabled(&self, node: NodeId) -> bool {
        (**self).is_enabled(node)
    }

    fn property(&self, node: NodeId, name: &str) -> Option<Value> {
        (**self).property(node, name)
    }

    fn set_property(&self, node: NodeId, name: &str, value: Value) -> Result<()> {
        (**self).set_property(node, name, value)
    }

    fn invoke(&self, node: NodeId, method: &str, args: &[Value]) -> Result<Value> {
        (**self).invoke(node, method, args)
    }

    fn add_event_filter(&self, filter: EventFilter) -> Subscription {
        (**self).add_event_filter(filter)
    }

    fn subscribe(&self, node: NodeId, listener: ValueListener) -> Option<Subscription> {
        (**self).subscribe(node, listener)
    }

    fn active_modal(&self) -> Option<NodeId> {
        (**self).active_modal()
    }

    fn close_modal(&self, node: NodeId) {
        (**self).close_modal(node)
    }

    fn post(&self, task: Task) {
        (**self).post(task)
    }

    fn pump(&self, max: Duration) {
        (**self).pump(max)
    }
}
