use crate::events::{commands, PointerArgs};
use crate::player::{PlayContext, PlayResult, Player};
use uiplay_core::value::parse_bool;
use uiplay_core::{Capability, NodeId, Value};

fn invoke(cx: &PlayContext<'_>, node: NodeId, method: &str, args: &[Value]) -> PlayResult {
    match cx.host.invoke(node, method, args) {
        Ok(_) => PlayResult::Played,
        Err(e) => PlayResult::Failed(e.message),
    }
}

/// `activate` on buttons, menu entries and check boxes.
pub struct ActivatePlayer;

impl Player for ActivatePlayer {
    fn name(&self) -> &str {
        "activate"
    }

    fn play(&self, cx: &PlayContext<'_>, node: NodeId, command: &str, _arguments: &str) -> PlayResult {
        if command != commands::ACTIVATE {
            return PlayResult::NotHandled;
        }
        match cx.host.capability(node) {
            Capability::Button | Capability::Menu | Capability::Checkable => {
                invoke(cx, node, "activate", &[])
            }
            _ => PlayResult::NotHandled,
        }
    }
}

/// Which property a `set_*` command writes, and on which widgets.
fn value_binding(command: &str) -> Option<(Capability, &'static str)> {
    match command {
        commands::SET_BOOLEAN => Some((Capability::Checkable, "checked")),
        commands::SET_INT => Some((Capability::IntRange, "value")),
        commands::SET_DOUBLE => Some((Capability::DoubleRange, "value")),
        commands::SET_STRING => Some((Capability::Text, "text")),
        _ => None,
    }
}

fn parse_value(command: &str, arguments: &str) -> Result<Value, String> {
    match command {
        commands::SET_BOOLEAN => parse_bool(arguments)
            .map(Value::Bool)
            .ok_or_else(|| format!("`{}` is not a boolean", arguments)),
        commands::SET_INT => arguments
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("`{}` is not an integer", arguments)),
        commands::SET_DOUBLE => arguments
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| format!("`{}` is not a number", arguments)),
        _ => Ok(Value::Text(arguments.to_string())),
    }
}

/// `set_boolean`, `set_int`, `set_double` and `set_string`. Writing a
/// value the widget already holds is a no-op for the host, so replaying
/// these is idempotent.
pub struct ValuePlayer;

impl Player for ValuePlayer {
    fn name(&self) -> &str {
        "value"
    }

    fn play(&self, cx: &PlayContext<'_>, node: NodeId, command: &str, arguments: &str) -> PlayResult {
        let Some((capability, property)) = value_binding(command) else {
            return PlayResult::NotHandled;
        };
        if cx.host.capability(node) != capability {
            return PlayResult::NotHandled;
        }
        let value = match parse_value(command, arguments) {
            Ok(v) => v,
            Err(reason) => return PlayResult::Failed(reason),
        };
        match cx.host.set_property(node, property, value) {
            Ok(()) => PlayResult::Played,
            Err(e) => PlayResult::Failed(e.message),
        }
    }
}

/// `set_file_selection(<path>)` on file choosers, with `$DATA_ROOT` expanded.
pub struct FilePlayer;

impl Player for FilePlayer {
    fn name(&self) -> &str {
        "file"
    }

    fn play(&self, cx: &PlayContext<'_>, node: NodeId, command: &str, arguments: &str) -> PlayResult {
        if command != commands::SET_FILE_SELECTION || cx.host.capability(node) != Capability::FileChooser {
            return PlayResult::NotHandled;
        }
        let path = cx.data_root.expand(arguments);
        invoke(cx, node, "select_file", &[Value::Text(path)])
    }
}

/// Pointer commands on item views, addressed by cell when recorded with one.
pub struct PointerPlayer;

impl Player for PointerPlayer {
    fn name(&self) -> &str {
        "pointer"
    }

    fn play(&self, cx: &PlayContext<'_>, node: NodeId, command: &str, arguments: &str) -> PlayResult {
        if !commands::is_pointer(command) {
            return PlayResult::NotHandled;
        }
        if !matches!(cx.host.capability(node), Capability::ItemView | Capability::Viewport) {
            return PlayResult::NotHandled;
        }
        let Some(args) = PointerArgs::parse(arguments) else {
            return PlayResult::Failed(format!("bad pointer arguments `{}`", arguments));
        };
        let mut values = vec![
            Value::Int(args.button.into()),
            Value::Int(args.modifiers.into()),
            Value::Int(args.x.into()),
            Value::Int(args.y.into()),
        ];
        if let Some(cell) = args.cell {
            values.push(Value::Text(cell));
        }
        invoke(cx, node, command, &values)
    }
}

/// `key(<keycode>)` on any widget.
pub struct KeyPlayer;

impl Player for KeyPlayer {
    fn name(&self) -> &str {
        "key"
    }

    fn play(&self, cx: &PlayContext<'_>, node: NodeId, command: &str, arguments: &str) -> PlayResult {
        if command != commands::KEY {
            return PlayResult::NotHandled;
        }
        match arguments.trim().parse::<i64>() {
            Ok(key) => invoke(cx, node, "key_press", &[Value::Int(key)]),
            Err(_) => PlayResult::Failed(format!("`{}` is not a key code", arguments)),
        }
    }
}

/// Property checks on any widget.
pub struct PropertyCheckPlayer;

fn matches_expected(actual: &Value, expected: &str) -> bool {
    match actual {
        Value::Null => expected.is_empty(),
        Value::Bool(b) => parse_bool(expected) == Some(*b),
        Value::Int(i) => expected.trim().parse::<i64>() == Ok(*i),
        Value::Double(d) => expected
            .trim()
            .parse::<f64>()
            .map(|e| (e - d).abs() <= f64::EPSILON * d.abs().max(1.0))
            .unwrap_or(false),
        Value::Text(s) => s == expected,
    }
}

impl Player for PropertyCheckPlayer {
    fn name(&self) -> &str {
        "check"
    }

    fn play(&self, _cx: &PlayContext<'_>, _node: NodeId, _command: &str, _arguments: &str) -> PlayResult {
        PlayResult::NotHandled
    }

    fn check(&self, cx: &PlayContext<'_>, node: NodeId, property: &str, expected: &str) -> PlayResult {
        match cx.host.property(node, property) {
            None => PlayResult::Failed(format!("no property `{}`", property)),
            Some(actual) if matches_expected(&actual, expected) => PlayResult::Played,
            Some(actual) => PlayResult::Failed(format!(
                "`{}` is `{}`, expected `{}`",
                property, actual, expected
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Record;
    use crate::player::PlayerRegistry;
    use uiplay_core::{DataRoot, Host, MemoryHost};

    fn play(host: &MemoryHost, node: NodeId, record: Record) -> PlayResult {
        let root = DataRoot::new("/data");
        let cx = PlayContext {
            host,
            data_root: &root,
        };
        PlayerRegistry::with_defaults().play(&cx, node, &record)
    }

    #[test]
    fn set_int_is_clamped_and_idempotent() {
        let host = MemoryHost::new();
        let spin = host.add_root("QSpinBox", "spin", Capability::IntRange);
        host.init_property(spin, "minimum", 0i64);
        host.init_property(spin, "maximum", 10i64);

        assert_eq!(play(&host, spin, Record::event("spin", "set_int", "8")), PlayResult::Played);
        assert_eq!(host.property(spin, "value"), Some(Value::Int(8)));
        assert_eq!(play(&host, spin, Record::event("spin", "set_int", "8")), PlayResult::Played);
        assert_eq!(host.property(spin, "value"), Some(Value::Int(8)));
        assert_eq!(play(&host, spin, Record::event("spin", "set_int", "42")), PlayResult::Played);
        assert_eq!(host.property(spin, "value"), Some(Value::Int(10)));
    }

    #[test]
    fn bad_arguments_fail_instead_of_passing() {
        let host = MemoryHost::new();
        let spin = host.add_root("QSpinBox", "spin", Capability::IntRange);
        assert!(matches!(
            play(&host, spin, Record::event("spin", "set_int", "eight")),
            PlayResult::Failed(_)
        ));
    }

    #[test]
    fn command_on_the_wrong_widget_is_not_handled() {
        let host = MemoryHost::new();
        let edit = host.add_root("QLineEdit", "edit", Capability::Text);
        assert_eq!(
            play(&host, edit, Record::event("edit", "set_int", "3")),
            PlayResult::NotHandled
        );
        assert_eq!(
            play(&host, edit, Record::event("edit", "frobnicate", "")),
            PlayResult::NotHandled
        );
    }

    #[test]
    fn file_selection_expands_data_root() {
        let host = MemoryHost::new();
        let chooser = host.add_root("QFileDialog", "files", Capability::FileChooser);
        let r = Record::event("files", "set_file_selection", "$DATA_ROOT/cow.vtk");
        assert_eq!(play(&host, chooser, r), PlayResult::Played);
        assert_eq!(
            host.property(chooser, "selected_file"),
            Some(Value::Text("/data/cow.vtk".into()))
        );
    }

    #[test]
    fn pointer_and_key_commands_reach_the_host() {
        let host = MemoryHost::new();
        let view = host.add_root("QTreeView", "tree", Capability::ItemView);
        assert_eq!(
            play(&host, view, Record::event("tree", "mouse_double_click", "0,0,12,30,1.0")),
            PlayResult::Played
        );
        assert_eq!(play(&host, view, Record::event("tree", "key", "65")), PlayResult::Played);
        assert_eq!(
            host.activity(),
            vec!["mouse_double_click tree 0,0,12,30,1.0", "key_press tree 65"]
        );
    }

    #[test]
    fn checks_compare_typed_values() {
        let host = MemoryHost::new();
        let spin = host.add_root("QDoubleSpinBox", "d", Capability::DoubleRange);
        host.init_property(spin, "value", 0.1 + 0.2);
        host.init_property(spin, "checked", true);
        assert_eq!(play(&host, spin, Record::check("d", "value", "0.3")), PlayResult::Played);
        assert_eq!(play(&host, spin, Record::check("d", "checked", "1")), PlayResult::Played);
        assert!(matches!(
            play(&host, spin, Record::check("d", "value", "0.4")),
            PlayResult::Failed(_)
        ));
        assert!(matches!(
            play(&host, spin, Record::check("d", "missing", "x")),
            PlayResult::Failed(m) if m.contains("missing")
        ));
    }
}
