use std::cell::RefCell;
use std::rc::Rc;
use uiplay_core::{Behavior, Capability, ErrorCode, Host, MemoryHost, NodeId, Scene, SceneIds, Value};
use uiplay_recorder::events::MemorySource;
use uiplay_recorder::xml::XmlSource;
use uiplay_recorder::{
    open_source, write_records, BaselineComparator, Dispatcher, EventSource, PlayContext, PlayResult,
    PlaybackConfig, PlaybackReport, Player, PlayerRegistry, Record, ScriptSource, SourceItem, Status,
};

const SCENE: &str = r#"{
    "roots": [
        {"name": "main", "tag": "QMainWindow", "capability": "window", "children": [
            {"name": "open", "tag": "QPushButton", "capability": "button",
             "on_activate": {"kind": "open_modal", "target": "dialog"}},
            {"name": "menuButton", "tag": "QToolButton", "capability": "button",
             "on_activate": {"kind": "open_popup", "target": "menu"}},
            {"name": "browse", "tag": "QPushButton", "capability": "button",
             "on_activate": {"kind": "open_modal", "target": "files"}},
            {"name": "spin", "tag": "QSpinBox", "capability": "int_range",
             "properties": {"minimum": 0, "maximum": 10, "value": 1}},
            {"name": "after", "tag": "QPushButton", "capability": "button"},
            {"name": "label", "tag": "QLabel", "capability": "container"}
        ]},
        {"id": "dialog", "name": "dialog", "tag": "QDialog", "capability": "dialog", "visible": false, "children": [
            {"name": "nameEdit", "tag": "QLineEdit", "capability": "text"},
            {"name": "openInner", "tag": "QPushButton", "capability": "button",
             "on_activate": {"kind": "open_modal", "target": "inner"}},
            {"name": "ok", "tag": "QPushButton", "capability": "button",
             "on_activate": {"kind": "close_modal"}}
        ]},
        {"id": "inner", "name": "inner", "tag": "QDialog", "capability": "dialog", "visible": false, "children": [
            {"name": "innerOk", "tag": "QPushButton", "capability": "button",
             "on_activate": {"kind": "close_modal"}}
        ]},
        {"id": "menu", "name": "menu", "tag": "QMenu", "capability": "menu", "visible": false, "children": [
            {"name": "toggle", "tag": "QAction", "capability": "checkable"},
            {"name": "item", "tag": "QAction", "capability": "button",
             "on_activate": {"kind": "close_modal"}}
        ]},
        {"id": "files", "name": "files", "tag": "QFileDialog", "capability": "file_chooser", "visible": false}
    ]
}"#;

fn fixture() -> (Rc<MemoryHost>, SceneIds) {
    let scene = Scene::from_json(SCENE).unwrap();
    let (host, ids) = MemoryHost::from_scene(&scene).unwrap();
    (Rc::new(host), ids)
}

fn config() -> PlaybackConfig {
    PlaybackConfig {
        data_root: Some("/data".into()),
        ..PlaybackConfig::immediate()
    }
}

fn play_on(host: &Rc<MemoryHost>, records: Vec<Record>) -> PlaybackReport {
    play_source(host, Box::new(MemorySource::new(records)))
}

fn play_source(host: &Rc<MemoryHost>, source: Box<dyn EventSource>) -> PlaybackReport {
    Dispatcher::with_config(host.clone(), config())
        .play(source, Rc::new(PlayerRegistry::with_defaults()))
        .unwrap()
}

fn depths(report: &PlaybackReport) -> Vec<usize> {
    report.steps.iter().map(|s| s.depth).collect()
}

fn activate(path: &str) -> Record {
    Record::event(path, "activate", "")
}

#[test]
fn records_inside_a_dialog_play_from_its_loop() {
    let (host, ids) = fixture();
    let report = play_on(
        &host,
        vec![
            activate("main/open"),
            Record::event("dialog/nameEdit", "set_string", "hello"),
            activate("dialog/ok"),
            activate("main/after"),
        ],
    );
    assert!(report.success(), "{:?}", report.diagnostic());
    assert_eq!(depths(&report), vec![0, 1, 1, 0]);
    assert_eq!(host.activity(), vec!["activate open", "activate ok", "activate after"]);
    assert_eq!(host.active_modal(), None);
    assert!(!host.is_visible(ids["dialog"]));
}

#[test]
fn dialogs_opened_from_dialogs_nest() {
    let (host, _) = fixture();
    let report = play_on(
        &host,
        vec![
            activate("main/open"),
            activate("dialog/openInner"),
            activate("inner/innerOk"),
            activate("dialog/ok"),
            activate("main/after"),
        ],
    );
    assert!(report.success(), "{:?}", report.diagnostic());
    assert_eq!(depths(&report), vec![0, 1, 2, 1, 0]);
}

#[test]
fn opening_the_same_dialog_twice_enters_two_scopes() {
    let (host, _) = fixture();
    let report = play_on(
        &host,
        vec![
            activate("main/open"),
            activate("dialog/ok"),
            activate("main/open"),
            activate("dialog/ok"),
        ],
    );
    assert!(report.success(), "{:?}", report.diagnostic());
    assert_eq!(depths(&report), vec![0, 1, 0, 1]);
    let main_open = host.top_level()[0];
    let open = host.children(main_open)[0];
    assert_eq!(host.property(open, "activations"), Some(Value::Int(2)));
}

#[test]
fn popups_are_scoped_without_blocking() {
    let (host, ids) = fixture();
    let report = play_on(
        &host,
        vec![
            activate("main/menuButton"),
            Record::event("menu/toggle", "set_boolean", "true"),
            activate("menu/item"),
            activate("main/after"),
        ],
    );
    assert!(report.success(), "{:?}", report.diagnostic());
    assert_eq!(depths(&report), vec![0, 1, 1, 0]);
    let toggle = host.children(ids["menu"])[0];
    assert_eq!(host.property(toggle, "checked"), Some(Value::Bool(true)));
}

#[test]
fn unhandled_command_stops_playback() {
    let (host, _) = fixture();
    let report = play_on(
        &host,
        vec![
            activate("main/after"),
            Record::event("main/label", "frobnicate", ""),
            activate("main/after"),
        ],
    );
    assert_eq!(report.status, Status::Failure);
    assert_eq!(report.error.as_ref().unwrap().code, ErrorCode::UnhandledCommand);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.failed_record, Some(Record::event("main/label", "frobnicate", "")));
    assert!(report.diagnostic().unwrap().contains("frobnicate"));
    assert_eq!(host.activity(), vec!["activate after"]);
}

#[test]
fn missing_object_inside_a_dialog_fails_and_closes_it() {
    let (host, ids) = fixture();
    let report = play_on(&host, vec![activate("main/open"), activate("dialog/nope")]);
    let error = report.error.as_ref().unwrap();
    assert_eq!(error.code, ErrorCode::ObjectNotFound);
    assert!(error.suggestions.iter().any(|s| s.contains("dialog")));
    assert_eq!(report.steps.len(), 1);
    assert_eq!(host.active_modal(), None);
    assert!(!host.is_visible(ids["dialog"]));
}

#[test]
fn test_ending_inside_a_dialog_succeeds_and_closes_it() {
    let (host, _) = fixture();
    let report = play_on(&host, vec![activate("main/open")]);
    assert!(report.success());
    assert_eq!(host.active_modal(), None);
}

#[test]
fn set_int_is_clamped_and_checked() {
    let (host, _) = fixture();
    let report = play_on(
        &host,
        vec![
            Record::event("main/spin", "set_int", "8"),
            Record::event("main/spin", "set_int", "8"),
            Record::check("main/spin", "value", "8"),
            Record::event("main/spin", "set_int", "99"),
            Record::check("main/spin", "value", "10"),
        ],
    );
    assert!(report.success(), "{:?}", report.diagnostic());

    let report = play_on(&host, vec![Record::check("main/spin", "value", "3")]);
    assert_eq!(report.error.unwrap().code, ErrorCode::CommandFailed);
}

#[test]
fn file_selection_expands_the_data_root() {
    let (host, ids) = fixture();
    let report = play_on(
        &host,
        vec![
            activate("main/browse"),
            Record::event("files", "set_file_selection", "$DATA_ROOT/cow.vtk"),
            activate("main/after"),
        ],
    );
    assert!(report.success(), "{:?}", report.diagnostic());
    assert_eq!(depths(&report), vec![0, 1, 0]);
    assert_eq!(
        host.property(ids["files"], "selected_file"),
        Some(Value::Text("/data/cow.vtk".into()))
    );
}

#[test]
fn malformed_file_fails_before_any_step() {
    let (host, _) = fixture();
    let report = play_source(&host, Box::new(XmlSource::parse("<steps/>")));
    assert_eq!(report.status, Status::Failure);
    assert_eq!(report.error.unwrap().code, ErrorCode::MalformedRecord);
    assert!(report.steps.is_empty());
}

#[test]
fn xml_file_plays_end_to_end() {
    let (host, _) = fixture();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dialog.xml");
    write_records(
        &path,
        &[
            activate("main/open"),
            Record::event("dialog/nameEdit", "set_string", "<Ünïcode & \"quotes\">"),
            activate("dialog/ok"),
        ],
    )
    .unwrap();
    let report = play_source(&host, open_source(&path).unwrap());
    assert!(report.success(), "{:?}", report.diagnostic());
    let edit = host.children(host.top_level()[1])[0];
    assert_eq!(
        host.property(edit, "text"),
        Some(Value::Text("<Ünïcode & \"quotes\">".into()))
    );
}

/// Opens the menu itself while a record is being read, the way a user
/// or a background timer might.
struct SurpriseSource {
    host: Rc<MemoryHost>,
    menu_button: NodeId,
    records: Vec<Record>,
}

impl EventSource for SurpriseSource {
    fn next(&mut self) -> SourceItem {
        if self.records.len() == 2 {
            self.host.invoke(self.menu_button, "activate", &[]).unwrap();
        }
        match self.records.pop() {
            Some(r) => SourceItem::Record(r),
            None => SourceItem::Done,
        }
    }
}

#[test]
fn popup_opened_outside_an_action_is_adopted() {
    let (host, _) = fixture();
    let main = host.top_level()[0];
    let menu_button = host.children(main)[1];
    let source = SurpriseSource {
        host: host.clone(),
        menu_button,
        // popped from the back
        records: vec![activate("menu/item"), Record::event("menu/toggle", "set_boolean", "1")],
    };
    let report = play_source(&host, Box::new(source));
    assert!(report.success(), "{:?}", report.diagnostic());
    assert_eq!(depths(&report), vec![0, 1]);
    assert_eq!(host.active_modal(), None);
}

/// Tries to start a second session from inside a step.
struct Nested {
    host: Rc<MemoryHost>,
    seen: Rc<RefCell<Option<ErrorCode>>>,
}

impl Player for Nested {
    fn name(&self) -> &str {
        "nested"
    }

    fn play(&self, _: &PlayContext<'_>, _: NodeId, command: &str, _: &str) -> PlayResult {
        if command != "nest" {
            return PlayResult::NotHandled;
        }
        let inner = Dispatcher::with_config(self.host.clone(), PlaybackConfig::immediate());
        let result = inner.start(Box::new(MemorySource::default()), Rc::new(PlayerRegistry::new()));
        *self.seen.borrow_mut() = result.err().map(|e| e.code);
        PlayResult::Played
    }
}

#[test]
fn a_second_session_cannot_start_during_playback() {
    let (host, _) = fixture();
    let seen = Rc::new(RefCell::new(None));
    let mut players = PlayerRegistry::with_defaults();
    players.add_first(Nested {
        host: host.clone(),
        seen: seen.clone(),
    });
    let report = Dispatcher::with_config(host.clone(), config())
        .play(
            Box::new(MemorySource::new(vec![
                Record::event("main/label", "nest", ""),
                activate("main/after"),
            ])),
            Rc::new(players),
        )
        .unwrap();
    assert!(report.success(), "{:?}", report.diagnostic());
    assert_eq!(*seen.borrow(), Some(ErrorCode::ReentrancyViolation));
    assert_eq!(report.steps.len(), 2);
}

#[test]
fn behaviors_can_be_wired_by_hand() {
    let host = Rc::new(MemoryHost::new());
    let main = host.add_root("QMainWindow", "main", Capability::Window);
    let go = host.add_child(main, "QPushButton", "", Capability::Button);
    let dlg = host.add_root("QDialog", "confirm", Capability::Dialog);
    host.set_visible(dlg, false);
    let yes = host.add_child(dlg, "QPushButton", "yes", Capability::Button);
    host.set_behavior(go, Behavior::OpenModal(dlg));
    host.set_behavior(yes, Behavior::CloseModal);

    let report = play_on(&host, vec![activate("main/QPushButton0"), activate("confirm/yes")]);
    assert!(report.success(), "{:?}", report.diagnostic());
    assert_eq!(depths(&report), vec![0, 1]);
}

/// Queue a task that opens the menu the next time the host is pumped,
/// the way a background timer would.
fn open_menu_on_next_pump(host: &Rc<MemoryHost>) -> NodeId {
    let main = host.top_level()[0];
    let menu_button = host.children(main)[1];
    let h = host.clone();
    host.post(Box::new(move || {
        h.invoke(menu_button, "activate", &[]).unwrap();
    }));
    menu_button
}

fn debounced(settle_ms: u64) -> PlaybackConfig {
    PlaybackConfig {
        settle_ms,
        popup_debounce_ms: 100,
        data_root: Some("/data".into()),
    }
}

#[test]
fn popup_still_debouncing_is_closed_when_playback_fails() {
    let (host, ids) = fixture();
    open_menu_on_next_pump(&host);
    let report = Dispatcher::with_config(host.clone(), debounced(20))
        .play(
            Box::new(MemorySource::new(vec![
                activate("main/after"),
                Record::event("menu/toggle", "frobnicate", ""),
            ])),
            Rc::new(PlayerRegistry::with_defaults()),
        )
        .unwrap();
    assert_eq!(report.status, Status::Failure);
    assert_eq!(report.error.as_ref().unwrap().code, ErrorCode::UnhandledCommand);
    assert_eq!(depths(&report), vec![0, 0]);
    assert_eq!(host.active_modal(), None);
    assert!(!host.is_visible(ids["menu"]));
}

#[test]
fn popup_seen_during_settle_is_adopted_once_debounced() {
    let (host, ids) = fixture();
    open_menu_on_next_pump(&host);
    let report = Dispatcher::with_config(host.clone(), debounced(150))
        .play(
            Box::new(MemorySource::new(vec![
                activate("main/after"),
                Record::event("menu/toggle", "set_boolean", "true"),
                activate("menu/item"),
                activate("main/after"),
            ])),
            Rc::new(PlayerRegistry::with_defaults()),
        )
        .unwrap();
    assert!(report.success(), "{:?}", report.diagnostic());
    assert_eq!(depths(&report), vec![0, 1, 1, 0]);
    let toggle = host.children(ids["menu"])[0];
    assert_eq!(host.property(toggle, "checked"), Some(Value::Bool(true)));
    assert_eq!(host.active_modal(), None);
}

/// Accepts every comparison and remembers the expanded baselines.
#[derive(Clone, Default)]
struct Baselines(Rc<RefCell<Vec<String>>>);

impl BaselineComparator for Baselines {
    fn compare(&self, cx: &PlayContext<'_>, _: NodeId, baseline: &str, threshold: f64) -> Result<(), String> {
        if threshold > 1.0 {
            return Err(format!("threshold {} too loose", threshold));
        }
        self.0.borrow_mut().push(cx.data_root.expand(baseline));
        Ok(())
    }
}

#[test]
fn script_drives_records_and_requests_through_a_dialog() {
    let (host, ids) = fixture();
    let baselines = Baselines::default();
    let mut players = PlayerRegistry::with_defaults();
    players.set_comparator(baselines.clone());

    let source = ScriptSource::spawn(host.clone(), |cx| {
        cx.activate("main/open")?;
        // Served while the dialog's nested loop is reading the next record.
        cx.set_property("dialog/nameEdit", "text", "typed")?;
        anyhow::ensure!(cx.property("dialog/nameEdit", "text")?.to_string() == "typed");
        cx.emit(Record::check("dialog/nameEdit", "text", "typed"))?;
        cx.emit(Record::compare("dialog/nameEdit", "$DATA_ROOT/name.png", 0.5))?;
        cx.activate("dialog/ok")?;
        anyhow::ensure!(!cx.exists("nowhere/at/all")?, "phantom node");
        cx.emit(Record::event("main/spin", "set_int", "4"))?;
        cx.emit(Record::check("main/spin", "value", "4"))?;
        Ok(())
    });
    let report = Dispatcher::with_config(host.clone(), config())
        .play(Box::new(source), Rc::new(players))
        .unwrap();

    assert!(report.success(), "{:?}", report.diagnostic());
    assert_eq!(depths(&report), vec![0, 1, 1, 1, 0, 0]);
    assert_eq!(*baselines.0.borrow(), vec!["/data/name.png".to_string()]);
    assert_eq!(host.active_modal(), None);
    assert!(!host.is_visible(ids["dialog"]));
}

#[test]
fn script_failure_inside_a_dialog_unwinds_it() {
    let (host, ids) = fixture();
    let source = ScriptSource::spawn(host.clone(), |cx| {
        cx.activate("main/open")?;
        anyhow::ensure!(cx.exists("dialog/ok")?, "dialog not shown");
        anyhow::bail!("gave up inside the dialog")
    });
    let report = play_source(&host, Box::new(source));
    assert_eq!(report.status, Status::Failure);
    let error = report.error.as_ref().unwrap();
    assert_eq!(error.code, ErrorCode::CommandFailed);
    assert!(error.message.contains("gave up"));
    assert_eq!(depths(&report), vec![0]);
    assert_eq!(host.active_modal(), None);
    assert!(!host.is_visible(ids["dialog"]));
}
