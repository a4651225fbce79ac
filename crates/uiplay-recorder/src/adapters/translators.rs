use crate::events::{commands, PointerArgs};
use crate::translator::{FocusSlot, TranslateContext, Translation, Translator};
use std::rc::Rc;
use uiplay_core::{Capability, NativeEvent, NodeId, Value};

/// `activate` for buttons and menu entries.
pub struct ButtonTranslator;

impl Translator for ButtonTranslator {
    fn name(&self) -> &str {
        "button"
    }

    fn translate(&mut self, cx: &TranslateContext, node: NodeId, event: &NativeEvent) -> Translation {
        if !matches!(cx.host.capability(node), Capability::Button | Capability::Menu) {
            return Translation::Unhandled;
        }
        match event {
            NativeEvent::Activated => Translation::emit(node, commands::ACTIVATE, ""),
            // The click itself is recorded through the activation.
            NativeEvent::MousePress(_) | NativeEvent::MouseRelease(_) | NativeEvent::MouseDoubleClick(_) => {
                Translation::Handled
            }
            _ => Translation::Unhandled,
        }
    }
}

fn value_binding(capability: Capability) -> Option<(&'static str, &'static str)> {
    match capability {
        Capability::Checkable => Some(("checked", commands::SET_BOOLEAN)),
        Capability::IntRange => Some(("value", commands::SET_INT)),
        Capability::DoubleRange => Some(("value", commands::SET_DOUBLE)),
        Capability::Text => Some(("text", commands::SET_STRING)),
        _ => None,
    }
}

/// Records the resulting value of value widgets rather than the raw input
/// that produced it. While a value widget has focus its value property is
/// watched, and every change becomes a `set_*` command.
#[derive(Default)]
pub struct ValueTranslator {
    slot: FocusSlot,
}

impl ValueTranslator {
    fn watch(&mut self, cx: &TranslateContext, node: NodeId, property: &'static str, command: &'static str) {
        if self.slot.is(node) {
            return;
        }
        let emitter = cx.emitter.clone();
        let subscription = cx.host.subscribe(
            node,
            Rc::new(move |n: NodeId, name: &str, value: &Value| {
                if name == property {
                    emitter.emit(n, command, &value.to_string());
                }
            }),
        );
        self.slot.focus(node, subscription);
    }
}

impl Translator for ValueTranslator {
    fn name(&self) -> &str {
        "value"
    }

    fn translate(&mut self, cx: &TranslateContext, node: NodeId, event: &NativeEvent) -> Translation {
        let capability = cx.host.capability(node);
        let Some((property, command)) = value_binding(capability) else {
            return Translation::Unhandled;
        };
        match event {
            NativeEvent::FocusOut => {
                if self.slot.is(node) {
                    self.slot.clear();
                }
                Translation::Handled
            }
            // Return in a text field is a real key press; let it through.
            NativeEvent::KeyPress { text, .. } if capability == Capability::Text && (text == "\r" || text == "\n") => {
                Translation::Unhandled
            }
            NativeEvent::Show | NativeEvent::Hide => Translation::Unhandled,
            _ => {
                self.watch(cx, node, property, command);
                Translation::Handled
            }
        }
    }

    fn reset(&mut self) {
        self.slot.clear();
    }
}

/// Records the chosen file of a file chooser while it is shown, with paths
/// under the data root rewritten to the placeholder.
#[derive(Default)]
pub struct FileChooserTranslator {
    slot: FocusSlot,
}

impl Translator for FileChooserTranslator {
    fn name(&self) -> &str {
        "file_chooser"
    }

    fn translate(&mut self, cx: &TranslateContext, node: NodeId, event: &NativeEvent) -> Translation {
        if cx.host.capability(node) != Capability::FileChooser {
            return Translation::Unhandled;
        }
        match event {
            NativeEvent::Hide => {
                if self.slot.is(node) {
                    self.slot.clear();
                }
                Translation::Handled
            }
            _ if self.slot.is(node) => Translation::Handled,
            _ => {
                let emitter = cx.emitter.clone();
                let root = cx.data_root.clone();
                let subscription = cx.host.subscribe(
                    node,
                    Rc::new(move |n: NodeId, name: &str, value: &Value| {
                        if name == "selected_file" {
                            let path = root.contract(&value.to_string());
                            emitter.emit(n, commands::SET_FILE_SELECTION, &path);
                        }
                    }),
                );
                self.slot.focus(node, subscription);
                Translation::Handled
            }
        }
    }

    fn reset(&mut self) {
        self.slot.clear();
    }
}

/// Pointer input on item views, keeping the cell address when the host
/// reports one.
pub struct ItemViewTranslator {
    capture_moves: bool,
}

impl ItemViewTranslator {
    pub fn new(capture_moves: bool) -> Self {
        Self { capture_moves }
    }
}

impl Translator for ItemViewTranslator {
    fn name(&self) -> &str {
        "item_view"
    }

    fn translate(&mut self, cx: &TranslateContext, node: NodeId, event: &NativeEvent) -> Translation {
        if !matches!(cx.host.capability(node), Capability::ItemView | Capability::Viewport) {
            return Translation::Unhandled;
        }
        let (command, mouse) = match event {
            NativeEvent::MousePress(m) => (commands::MOUSE_PRESS, m),
            NativeEvent::MouseRelease(m) => (commands::MOUSE_RELEASE, m),
            NativeEvent::MouseDoubleClick(m) => (commands::MOUSE_DOUBLE_CLICK, m),
            NativeEvent::MouseMove(m) if self.capture_moves => (commands::MOUSE_MOVE, m),
            NativeEvent::MouseMove(_) => return Translation::Handled,
            _ => return Translation::Unhandled,
        };
        Translation::emit(node, command, PointerArgs::from(mouse).to_string())
    }
}

/// Fallback: any key press becomes `key(<keycode>)`.
pub struct KeyTranslator;

impl Translator for KeyTranslator {
    fn name(&self) -> &str {
        "key"
    }

    fn translate(&mut self, _cx: &TranslateContext, node: NodeId, event: &NativeEvent) -> Translation {
        match event {
            NativeEvent::KeyPress { key, .. } => Translation::emit(node, commands::KEY, key.to_string()),
            _ => Translation::Unhandled,
        }
    }
}
