//! Players turn abstract records back into host actions

use crate::events::Record;
use std::rc::Rc;
use tracing::trace;
use uiplay_core::{DataRoot, Host, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayResult {
    /// Not this player's command or widget; try the next one.
    NotHandled,
    Played,
    /// Claimed, but the action could not be carried out.
    Failed(String),
}

/// What a player sees while playing one record.
pub struct PlayContext<'a> {
    pub host: &'a dyn Host,
    pub data_root: &'a DataRoot,
}

pub trait Player {
    fn name(&self) -> &str;

    fn play(&self, cx: &PlayContext<'_>, node: NodeId, command: &str, arguments: &str) -> PlayResult;

    /// Check a property against a recorded value.
    fn check(&self, _cx: &PlayContext<'_>, _node: NodeId, _property: &str, _expected: &str) -> PlayResult {
        PlayResult::NotHandled
    }
}

/// External image comparison for `compare` records.
pub trait BaselineComparator {
    /// `Err` carries the reason the comparison failed.
    fn compare(
        &self,
        cx: &PlayContext<'_>,
        node: NodeId,
        baseline: &str,
        threshold: f64,
    ) -> Result<(), String>;
}

/// Ordered players; the first to claim a record wins.
#[derive(Default)]
pub struct PlayerRegistry {
    players: Vec<Box<dyn Player>>,
    comparator: Option<Box<dyn BaselineComparator>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in players for every capability.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for p in crate::adapters::default_players() {
            registry.players.push(p);
        }
        registry
    }

    pub fn add(&mut self, player: impl Player + 'static) -> &mut Self {
        self.players.push(Box::new(player));
        self
    }

    /// Register ahead of everything already present.
    pub fn add_first(&mut self, player: impl Player + 'static) -> &mut Self {
        self.players.insert(0, Box::new(player));
        self
    }

    pub fn set_comparator(&mut self, comparator: impl BaselineComparator + 'static) -> &mut Self {
        self.comparator = Some(Box::new(comparator));
        self
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.players.iter().map(|p| p.name()).collect()
    }

    pub fn play(&self, cx: &PlayContext<'_>, node: NodeId, record: &Record) -> PlayResult {
        match record {
            Record::Event(e) => self.first_claim(|p| p.play(cx, node, &e.command, &e.arguments)),
            Record::Check(c) => self.first_claim(|p| p.check(cx, node, &c.property, &c.expected)),
            Record::Compare(c) => match &self.comparator {
                Some(cmp) => match cmp.compare(cx, node, &c.baseline, c.threshold) {
                    Ok(()) => PlayResult::Played,
                    Err(reason) => PlayResult::Failed(reason),
                },
                None => PlayResult::NotHandled,
            },
        }
    }

    fn first_claim(&self, mut attempt: impl FnMut(&dyn Player) -> PlayResult) -> PlayResult {
        for p in &self.players {
            match attempt(p.as_ref()) {
                PlayResult::NotHandled => continue,
                result => {
                    trace!(player = p.name(), ?result, "claimed");
                    return result;
                }
            }
        }
        PlayResult::NotHandled
    }
}

impl<P: Player + ?Sized> Player for Rc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn play(&self, cx: &PlayContext<'_>, node: NodeId, command: &str, arguments: &str) -> PlayResult {
        (**self).play(cx, node, command, arguments)
    }

    fn check(&self, cx: &PlayContext<'_>, node: NodeId, property: &str, expected: &str) -> PlayResult {
        (**self).check(cx, node, property, expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use uiplay_core::{Capability, MemoryHost};

    struct Named(&'static str, Rc<RefCell<Vec<&'static str>>>, PlayResult);

    impl Player for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn play(&self, _: &PlayContext<'_>, _: NodeId, _: &str, _: &str) -> PlayResult {
            self.1.borrow_mut().push(self.0);
            self.2.clone()
        }
    }

    #[test]
    fn first_claim_wins_in_registration_order() {
        let host = MemoryHost::new();
        let node = host.add_root("QWidget", "w", Capability::Container);
        let root = DataRoot::default();
        let cx = PlayContext {
            host: &host,
            data_root: &root,
        };
        let log = Rc::new(RefCell::new(Vec::new()));

        let mut reg = PlayerRegistry::new();
        reg.add(Named("skip", log.clone(), PlayResult::NotHandled));
        reg.add(Named("a", log.clone(), PlayResult::Played));
        reg.add(Named("b", log.clone(), PlayResult::Failed("never".into())));

        let r = Record::event("w", "frob", "");
        assert_eq!(reg.play(&cx, node, &r), PlayResult::Played);
        assert_eq!(*log.borrow(), vec!["skip", "a"]);

        reg.add_first(Named("b2", log.clone(), PlayResult::Failed("first".into())));
        assert_eq!(reg.play(&cx, node, &r), PlayResult::Failed("first".into()));
    }

    #[test]
    fn compare_without_comparator_is_unhandled() {
        let host = MemoryHost::new();
        let node = host.add_root("QWidget", "w", Capability::Viewport);
        let root = DataRoot::default();
        let cx = PlayContext {
            host: &host,
            data_root: &root,
        };
        let mut reg = PlayerRegistry::with_defaults();
        let r = Record::compare("w", "base.png", 1.0);
        assert_eq!(reg.play(&cx, node, &r), PlayResult::NotHandled);

        struct Strict;
        impl BaselineComparator for Strict {
            fn compare(&self, _: &PlayContext<'_>, _: NodeId, baseline: &str, threshold: f64) -> Result<(), String> {
                if threshold >= 1.0 {
                    Ok(())
                } else {
                    Err(format!("{} differs", baseline))
                }
            }
        }
        reg.set_comparator(Strict);
        assert_eq!(reg.play(&cx, node, &r), PlayResult::Played);
        let tight = Record::compare("w", "base.png", 0.5);
        assert_eq!(reg.play(&cx, node, &tight), PlayResult::Failed("base.png differs".into()));
    }
}
