//! Headless in-memory widget tree
//!
//! `MemoryHost` implements [`Host`] without a real toolkit. Modal dialogs
//! run a genuine nested loop inside `invoke`, popups open without blocking,
//! and property writes notify subscribers, so playback and recording can be
//! exercised end to end.

use super::{EventFilter, Host, Subscription, Task, ValueListener};
use crate::error::{Error, ErrorCode, Result};
use crate::node::{Capability, NativeEvent, NodeId};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// What activating a node does besides counting the activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Show the target and run a nested loop until it is closed.
    OpenModal(NodeId),
    /// Show the target as a popup and return immediately.
    OpenPopup(NodeId),
    /// Close the innermost modal scope containing this node.
    CloseModal,
}

struct NodeData {
    name: String,
    tag: String,
    capability: Capability,
    visible: bool,
    enabled: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    properties: BTreeMap<String, Value>,
    behavior: Option<Behavior>,
}

#[derive(Default)]
struct State {
    nodes: HashMap<NodeId, NodeData>,
    roots: Vec<NodeId>,
    next_id: u64,
    next_sub: u64,
    filters: Vec<(u64, EventFilter)>,
    listeners: Vec<(u64, NodeId, ValueListener)>,
    tasks: VecDeque<Task>,
    modal_stack: Vec<NodeId>,
    activity: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MemoryHost {
    state: Rc<RefCell<State>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    // Tree construction

    pub fn add_node(
        &self,
        parent: Option<NodeId>,
        tag: &str,
        name: &str,
        capability: Capability,
    ) -> NodeId {
        let mut st = self.state.borrow_mut();
        st.next_id += 1;
        let id = NodeId(st.next_id);
        st.nodes.insert(
            id,
            NodeData {
                name: name.to_string(),
                tag: tag.to_string(),
                capability,
                visible: true,
                enabled: true,
                parent,
                children: Vec::new(),
                properties: BTreeMap::new(),
                behavior: None,
            },
        );
        let attached = match parent.and_then(|p| st.nodes.get_mut(&p)) {
            Some(p) => {
                p.children.push(id);
                true
            }
            None => false,
        };
        if !attached {
            st.roots.push(id);
        }
        id
    }

    pub fn add_root(&self, tag: &str, name: &str, capability: Capability) -> NodeId {
        self.add_node(None, tag, name, capability)
    }

    pub fn add_child(&self, parent: NodeId, tag: &str, name: &str, capability: Capability) -> NodeId {
        self.add_node(Some(parent), tag, name, capability)
    }

    pub fn set_visible(&self, node: NodeId, visible: bool) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.visible = visible;
        }
    }

    pub fn set_enabled(&self, node: NodeId, enabled: bool) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.enabled = enabled;
        }
    }

    pub fn set_behavior(&self, node: NodeId, behavior: Behavior) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.behavior = Some(behavior);
        }
    }

    /// Set a property without notifying subscribers.
    pub fn init_property(&self, node: NodeId, name: &str, value: impl Into<Value>) {
        if let Some(n) = self.state.borrow_mut().nodes.get_mut(&node) {
            n.properties.insert(name.to_string(), value.into());
        }
    }

    /// Destroy a node and its subtree. Outstanding handles go stale.
    pub fn destroy(&self, node: NodeId) {
        let mut st = self.state.borrow_mut();
        let parent = st.nodes.get(&node).and_then(|n| n.parent);
        if let Some(p) = parent.and_then(|p| st.nodes.get_mut(&p)) {
            p.children.retain(|c| *c != node);
        }
        st.roots.retain(|r| *r != node);
        let mut removed = HashSet::new();
        let mut pending = vec![node];
        while let Some(id) = pending.pop() {
            if let Some(data) = st.nodes.remove(&id) {
                removed.insert(id);
                pending.extend(data.children);
            }
        }
        st.modal_stack.retain(|m| !removed.contains(m));
        st.listeners.retain(|(_, n, _)| !removed.contains(n));
    }

    /// Every activation, key press and pointer action applied so far.
    pub fn activity(&self) -> Vec<String> {
        self.state.borrow().activity.clone()
    }

    pub fn clear_activity(&self) {
        self.state.borrow_mut().activity.clear();
    }

    pub fn pending_tasks(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    // Simulated input

    /// Deliver a native event to every installed filter.
    pub fn deliver(&self, node: NodeId, event: &NativeEvent) {
        let filters: Vec<EventFilter> = self
            .state
            .borrow()
            .filters
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        for f in filters {
            f(node, event);
        }
    }

    /// User clicks a button: the filter sees the activation, then the
    /// button's behavior runs.
    pub fn click(&self, node: NodeId) -> Result<()> {
        self.activate(node).map(|_| ())
    }

    /// User edits a value: filters see focus, then the property changes.
    pub fn edit(&self, node: NodeId, property: &str, value: impl Into<Value>) -> Result<()> {
        self.deliver(node, &NativeEvent::FocusIn);
        self.set_property(node, property, value.into())
    }

    fn label(&self, node: NodeId) -> String {
        let st = self.state.borrow();
        match st.nodes.get(&node) {
            Some(n) if !n.name.is_empty() => n.name.clone(),
            Some(n) => format!("{}{}", n.tag, node),
            None => node.to_string(),
        }
    }

    fn record_activity(&self, entry: String) {
        self.state.borrow_mut().activity.push(entry);
    }

    fn check_usable(&self, node: NodeId) -> Result<()> {
        let st = self.state.borrow();
        match st.nodes.get(&node) {
            None => Err(Error::new(
                ErrorCode::CommandFailed,
                format!("node {} no longer exists", node),
            )),
            Some(n) if !n.enabled => Err(Error::new(
                ErrorCode::CommandFailed,
                format!("node {} is disabled", node),
            )),
            Some(_) => Ok(()),
        }
    }

    fn activate(&self, node: NodeId) -> Result<Value> {
        self.check_usable(node)?;
        self.deliver(node, &NativeEvent::Activated);

        let (count, behavior) = {
            let mut st = self.state.borrow_mut();
            let data = st.nodes.get_mut(&node).ok_or_else(|| {
                Error::new(ErrorCode::CommandFailed, format!("node {} destroyed", node))
            })?;
            let count = data
                .properties
                .get("activations")
                .and_then(Value::as_i64)
                .unwrap_or(0)
                + 1;
            data.properties.insert("activations".into(), Value::Int(count));
            (count, data.behavior)
        };
        self.record_activity(format!("activate {}", self.label(node)));

        match behavior {
            Some(Behavior::OpenModal(target)) => self.open_modal(target),
            Some(Behavior::OpenPopup(target)) => self.open_popup(target),
            Some(Behavior::CloseModal) => {
                if let Some(owner) = self.enclosing_modal(node) {
                    self.close_modal(owner);
                }
            }
            None => {}
        }
        Ok(Value::Int(count))
    }

    fn open_popup(&self, target: NodeId) {
        {
            let mut st = self.state.borrow_mut();
            if let Some(n) = st.nodes.get_mut(&target) {
                n.visible = true;
            }
            st.modal_stack.push(target);
        }
        debug!(node = %target, "popup opened");
        self.deliver(target, &NativeEvent::Show);
    }

    /// Runs until `target` leaves the modal stack. With no work left and
    /// the dialog still open a real toolkit would wait for the user; here
    /// the loop gives up so a wedged session cannot hang the caller.
    fn open_modal(&self, target: NodeId) {
        self.open_popup(target);
        debug!(node = %target, "entering nested loop");
        loop {
            if !self.state.borrow().modal_stack.contains(&target) {
                break;
            }
            let task = self.state.borrow_mut().tasks.pop_front();
            match task {
                Some(task) => task(),
                None => {
                    warn!(node = %target, "nested loop has no pending work, leaving it open");
                    break;
                }
            }
        }
        debug!(node = %target, "nested loop exited");
    }

    fn enclosing_modal(&self, node: NodeId) -> Option<NodeId> {
        let st = self.state.borrow();
        let mut cur = Some(node);
        while let Some(id) = cur {
            if st.modal_stack.contains(&id) {
                return Some(id);
            }
            cur = st.nodes.get(&id).and_then(|n| n.parent);
        }
        st.modal_stack.last().copied()
    }

    fn clamp(&self, node: NodeId, value: Value) -> Value {
        let st = self.state.borrow();
        let Some(data) = st.nodes.get(&node) else {
            return value;
        };
        let prop = |name: &str| data.properties.get(name);
        match data.capability {
            Capability::IntRange => match value.as_i64() {
                Some(mut v) => {
                    if let Some(min) = prop("minimum").and_then(Value::as_i64) {
                        v = v.max(min);
                    }
                    if let Some(max) = prop("maximum").and_then(Value::as_i64) {
                        v = v.min(max);
                    }
                    Value::Int(v)
                }
                None => value,
            },
            Capability::DoubleRange => match value.as_f64() {
                Some(mut v) => {
                    if let Some(min) = prop("minimum").and_then(Value::as_f64) {
                        v = v.max(min);
                    }
                    if let Some(max) = prop("maximum").and_then(Value::as_f64) {
                        v = v.min(max);
                    }
                    Value::Double(v)
                }
                None => value,
            },
            _ => value,
        }
    }

    fn remove_filter(state: &Weak<RefCell<State>>, id: u64) {
        if let Some(st) = state.upgrade() {
            st.borrow_mut().filters.retain(|(i, _)| *i != id);
        }
    }

    fn remove_listener(state: &Weak<RefCell<State>>, id: u64) {
        if let Some(st) = state.upgrade() {
            st.borrow_mut().listeners.retain(|(i, _, _)| *i != id);
        }
    }
}

impl Host for MemoryHost {
    fn top_level(&self) -> Vec<NodeId> {
        self.state.borrow().roots.clone()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.state.borrow().nodes.get(&node).and_then(|n| n.parent)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn exists(&self, node: NodeId) -> bool {
        self.state.borrow().nodes.contains_key(&node)
    }

    fn name(&self, node: NodeId) -> String {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.name.clone())
            .unwrap_or_default()
    }

    fn set_name(&self, node: NodeId, name: &str) -> bool {
        match self.state.borrow_mut().nodes.get_mut(&node) {
            Some(n) => {
                n.name = name.to_string();
                true
            }
            None => false,
        }
    }

    fn type_tag(&self, node: NodeId) -> String {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.tag.clone())
            .unwrap_or_default()
    }

    fn capability(&self, node: NodeId) -> Capability {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.capability)
            .unwrap_or_default()
    }

    fn is_visible(&self, node: NodeId) -> bool {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.visible)
            .unwrap_or(false)
    }

    fn is_enabled(&self, node: NodeId) -> bool {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .map(|n| n.enabled)
            .unwrap_or(false)
    }

    fn property(&self, node: NodeId, name: &str) -> Option<Value> {
        self.state
            .borrow()
            .nodes
            .get(&node)
            .and_then(|n| n.properties.get(name).cloned())
    }

    fn set_property(&self, node: NodeId, name: &str, value: Value) -> Result<()> {
        self.check_usable(node)?;
        let value = self.clamp(node, value);
        let changed = {
            let mut st = self.state.borrow_mut();
            let data = st.nodes.get_mut(&node).ok_or_else(|| {
                Error::new(ErrorCode::CommandFailed, format!("node {} destroyed", node))
            })?;
            let old = data.properties.insert(name.to_string(), value.clone());
            old.as_ref() != Some(&value)
        };
        if changed {
            let listeners: Vec<ValueListener> = self
                .state
                .borrow()
                .listeners
                .iter()
                .filter(|(_, n, _)| *n == node)
                .map(|(_, _, l)| l.clone())
                .collect();
            for l in listeners {
                l(node, name, &value);
            }
        }
        Ok(())
    }

    fn invoke(&self, node: NodeId, method: &str, args: &[Value]) -> Result<Value> {
        match method {
            "activate" => self.activate(node),
            "select_file" => {
                let path = args.first().cloned().unwrap_or_default();
                self.set_property(node, "selected_file", path)?;
                self.record_activity(format!("select_file {}", self.label(node)));
                if self.state.borrow().modal_stack.contains(&node) {
                    self.close_modal(node);
                }
                Ok(Value::Null)
            }
            "key_press" | "mouse_press" | "mouse_release" | "mouse_move" | "mouse_double_click" => {
                self.check_usable(node)?;
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                self.record_activity(format!(
                    "{} {} {}",
                    method,
                    self.label(node),
                    rendered.join(",")
                ));
                Ok(Value::Null)
            }
            other => Err(Error::new(
                ErrorCode::CommandFailed,
                format!("{} has no method `{}`", self.label(node), other),
            )),
        }
    }

    fn add_event_filter(&self, filter: EventFilter) -> Subscription {
        let id = {
            let mut st = self.state.borrow_mut();
            st.next_sub += 1;
            let id = st.next_sub;
            st.filters.push((id, filter));
            id
        };
        let weak = Rc::downgrade(&self.state);
        Subscription::new(move || Self::remove_filter(&weak, id))
    }

    fn subscribe(&self, node: NodeId, listener: ValueListener) -> Option<Subscription> {
        let id = {
            let mut st = self.state.borrow_mut();
            if !st.nodes.contains_key(&node) {
                return None;
            }
            st.next_sub += 1;
            let id = st.next_sub;
            st.listeners.push((id, node, listener));
            id
        };
        let weak = Rc::downgrade(&self.state);
        Some(Subscription::new(move || Self::remove_listener(&weak, id)))
    }

    fn active_modal(&self) -> Option<NodeId> {
        self.state.borrow().modal_stack.last().copied()
    }

    fn close_modal(&self, node: NodeId) {
        let closed: Vec<NodeId> = {
            let mut st = self.state.borrow_mut();
            let Some(pos) = st.modal_stack.iter().position(|m| *m == node) else {
                return;
            };
            let closed = st.modal_stack.split_off(pos);
            for id in &closed {
                if let Some(n) = st.nodes.get_mut(id) {
                    n.visible = false;
                }
            }
            closed
        };
        for id in closed.into_iter().rev() {
            debug!(node = %id, "modal closed");
            self.deliver(id, &NativeEvent::Hide);
        }
    }

    fn post(&self, task: Task) {
        self.state.borrow_mut().tasks.push_back(task);
    }

    fn pump(&self, max: Duration) {
        let deadline = Instant::now() + max;
        loop {
            let task = self.state.borrow_mut().tasks.pop_front();
            match task {
                Some(task) => task(),
                None => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    std::thread::sleep((deadline - now).min(Duration::from_millis(1)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn dialog_fixture() -> (MemoryHost, NodeId, NodeId, NodeId) {
        let host = MemoryHost::new();
        let main = host.add_root("QMainWindow", "main", Capability::Window);
        let open = host.add_child(main, "QPushButton", "open", Capability::Button);
        let dialog = host.add_root("QDialog", "dialog", Capability::Dialog);
        host.set_visible(dialog, false);
        let close = host.add_child(dialog, "QPushButton", "close", Capability::Button);
        host.set_behavior(open, Behavior::OpenModal(dialog));
        host.set_behavior(close, Behavior::CloseModal);
        (host, open, dialog, close)
    }

    #[test]
    fn modal_loop_runs_posted_tasks_until_closed() {
        let (host, open, dialog, close) = dialog_fixture();
        let h = host.clone();
        let seen = Rc::new(Cell::new(None));
        let s = seen.clone();
        host.post(Box::new(move || {
            s.set(h.active_modal());
            h.invoke(close, "activate", &[]).unwrap();
        }));
        host.invoke(open, "activate", &[]).unwrap();
        assert_eq!(seen.get(), Some(dialog));
        assert_eq!(host.active_modal(), None);
        assert!(!host.is_visible(dialog));
    }

    #[test]
    fn modal_loop_gives_up_without_work() {
        let (host, open, dialog, _) = dialog_fixture();
        host.invoke(open, "activate", &[]).unwrap();
        assert_eq!(host.active_modal(), Some(dialog));
    }

    #[test]
    fn int_range_clamps_and_notifies() {
        let host = MemoryHost::new();
        let win = host.add_root("QWidget", "root", Capability::Window);
        let spin = host.add_child(win, "QSpinBox", "spinbox", Capability::IntRange);
        host.init_property(spin, "minimum", 0i64);
        host.init_property(spin, "maximum", 5i64);

        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sub = host
            .subscribe(spin, Rc::new(move |_, _, _| h.set(h.get() + 1)))
            .unwrap();
        host.set_property(spin, "value", Value::Int(8)).unwrap();
        assert_eq!(host.property(spin, "value"), Some(Value::Int(5)));
        host.set_property(spin, "value", Value::Int(8)).unwrap();
        assert_eq!(hits.get(), 1);

        drop(sub);
        host.set_property(spin, "value", Value::Int(1)).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn destroyed_nodes_go_stale() {
        let host = MemoryHost::new();
        let win = host.add_root("QWidget", "root", Capability::Window);
        let child = host.add_child(win, "QPushButton", "ok", Capability::Button);
        host.destroy(win);
        assert!(!host.exists(child));
        assert!(host.top_level().is_empty());
        assert!(host.invoke(child, "activate", &[]).is_err());
        assert!(host.subscribe(child, Rc::new(|_, _, _| {})).is_none());
    }

    #[test]
    fn destroying_a_window_drops_its_descendants_state() {
        let host = MemoryHost::new();
        let win = host.add_root("QWidget", "root", Capability::Window);
        let spin = host.add_child(win, "QSpinBox", "spin", Capability::IntRange);
        let menu = host.add_child(win, "QMenu", "menu", Capability::Menu);
        host.set_visible(menu, false);
        let opener = host.add_root("QPushButton", "opener", Capability::Button);
        host.set_behavior(opener, Behavior::OpenPopup(menu));
        host.click(opener).unwrap();
        let _sub = host.subscribe(spin, Rc::new(|_, _, _| {})).unwrap();
        assert_eq!(host.active_modal(), Some(menu));

        host.destroy(win);
        assert_eq!(host.active_modal(), None);
        assert!(host.state.borrow().listeners.is_empty());
    }

    #[test]
    fn disabled_nodes_reject_actions() {
        let host = MemoryHost::new();
        let win = host.add_root("QWidget", "root", Capability::Window);
        let ok = host.add_child(win, "QPushButton", "ok", Capability::Button);
        host.set_enabled(ok, false);
        let err = host.invoke(ok, "activate", &[]).unwrap_err();
        assert_eq!(err.code, ErrorCode::CommandFailed);
    }

    #[test]
    fn filters_are_removed_on_drop() {
        let host = MemoryHost::new();
        let win = host.add_root("QWidget", "root", Capability::Window);
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sub = host.add_event_filter(Rc::new(move |_, _| h.set(h.get() + 1)));
        host.deliver(win, &NativeEvent::FocusIn);
        drop(sub);
        host.deliver(win, &NativeEvent::FocusIn);
        assert_eq!(hits.get(), 1);
    }
}
