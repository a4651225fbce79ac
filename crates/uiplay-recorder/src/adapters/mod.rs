//! Built-in players and translators, one family per widget capability

mod players;
mod translators;

pub use players::{
    ActivatePlayer, FilePlayer, KeyPlayer, PointerPlayer, PropertyCheckPlayer, ValuePlayer,
};
pub use translators::{
    ButtonTranslator, FileChooserTranslator, ItemViewTranslator, KeyTranslator, ValueTranslator,
};

use crate::player::Player;
use crate::translator::Translator;

pub fn default_players() -> Vec<Box<dyn Player>> {
    vec![
        Box::new(ActivatePlayer),
        Box::new(ValuePlayer),
        Box::new(FilePlayer),
        Box::new(PointerPlayer),
        Box::new(KeyPlayer),
        Box::new(PropertyCheckPlayer),
    ]
}

/// Keys come last so widget-specific translators see key presses first.
pub fn default_translators(capture_moves: bool) -> Vec<Box<dyn Translator>> {
    vec![
        Box::new(ButtonTranslator),
        Box::new(ValueTranslator::default()),
        Box::new(FileChooserTranslator::default()),
        Box::new(ItemViewTranslator::new(capture_moves)),
        Box::new(KeyTranslator),
    ]
}
