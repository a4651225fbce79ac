//! uiplay - replay and manage recorded GUI tests
//!
//! Tests run against a JSON scene loaded into the in-memory host.
//! Every command prints a JSON `Output` on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

use uiplay::prelude::*;
use uiplay_recorder::storage::{read_records, write_records, TestStorage};

#[derive(Parser)]
#[command(name = "uiplay")]
#[command(about = "uiplay - GUI test record/playback")]
#[command(version)]
struct Cli {
    /// Directory of stored tests (default ~/.uiplay/tests)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a test against a scene
    Play {
        scene: PathBuf,
        test: String,
        /// PlaybackConfig as JSON
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        data_root: Option<String>,
    },
    /// Report naming problems in a scene
    Validate {
        scene: PathBuf,
    },
    /// List the object path of every node in a scene
    Paths {
        scene: PathBuf,
    },
    /// Show a test's records
    Show {
        test: String,
        #[arg(long)]
        all: bool,
    },
    /// Rewrite a test in another format (by extension)
    Convert {
        input: PathBuf,
        output: PathBuf,
    },
    /// List stored tests
    List,
    /// Delete a stored test
    Delete {
        test: String,
    },
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
    fn failed(data: T, error: Option<Error>) -> Self {
        Self { success: false, data: Some(data), error }
    }
    fn err(e: Error) -> Output<()> {
        Output { success: false, data: None, error: Some(e) }
    }
}

fn print_json<T: Serialize>(output: &T) {
    match serde_json::to_string_pretty(output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: could not encode output: {}", e),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dir = cli.dir;

    let result: Result<bool> = match cli.command {
        Commands::Play { scene, test, config, data_root } => {
            resolve(dir.as_deref(), &test).and_then(|p| play(&scene, &p, config.as_deref(), data_root))
        }
        Commands::Validate { scene } => validate(&scene),
        Commands::Paths { scene } => paths(&scene),
        Commands::Show { test, all } => resolve(dir.as_deref(), &test).and_then(|p| show(&p, all)),
        Commands::Convert { input, output } => convert(&input, &output),
        Commands::List => list(dir.as_deref()),
        Commands::Delete { test } => delete(dir.as_deref(), &test),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            match e.downcast_ref::<Error>() {
                Some(err) => print_json(&Output::<()>::err(err.clone())),
                None => print_json(&Output::<()>::err(Error::new(ErrorCode::Unknown, format!("{:#}", e)))),
            }
            std::process::exit(1);
        }
    }
}

fn storage(dir: Option<&Path>) -> Result<TestStorage> {
    match dir {
        Some(d) => TestStorage::with_dir(d),
        None => TestStorage::new(),
    }
}

/// A test argument is a path if it exists, else a name in storage.
fn resolve(dir: Option<&Path>, test: &str) -> Result<PathBuf> {
    let direct = PathBuf::from(test);
    if direct.exists() {
        return Ok(direct);
    }
    Ok(storage(dir)?.path().join(test))
}

fn load_host(scene: &Path) -> Result<Rc<MemoryHost>> {
    let scene = Scene::load(scene)?;
    let (host, _) = MemoryHost::from_scene(&scene)?;
    Ok(Rc::new(host))
}

fn play(scene: &Path, test: &Path, config: Option<&Path>, data_root: Option<String>) -> Result<bool> {
    let mut playback = match config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<PlaybackConfig>(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => PlaybackConfig::default(),
    };
    if data_root.is_some() {
        playback.data_root = data_root;
    }

    let host = load_host(scene)?;
    let engine = Engine::new(host).with_playback_config(playback);
    let report = engine.playback(test);
    let success = report.success();
    if success {
        print_json(&Output::ok(&report));
    } else {
        let error = report.error.clone();
        print_json(&Output::failed(&report, error));
    }
    Ok(success)
}

fn validate(scene: &Path) -> Result<bool> {
    let host = load_host(scene)?;
    let violations = Engine::new(host).validate_all();
    let success = violations.is_empty();
    if success {
        print_json(&Output::ok(&violations));
    } else {
        print_json(&Output::failed(&violations, None));
    }
    Ok(success)
}

#[derive(Serialize)]
struct NodePath {
    node: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

fn paths(scene: &Path) -> Result<bool> {
    let host = load_host(scene)?;
    let naming = ObjectNaming::new(host.clone());
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = host.top_level().into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        let entry = match naming.path_of(node) {
            Ok(p) => NodePath { node, path: Some(p.to_string()), error: None },
            Err(e) => NodePath { node, path: None, error: Some(e) },
        };
        out.push(entry);
        stack.extend(host.children(node).into_iter().rev());
    }
    print_json(&Output::ok(out));
    Ok(true)
}

#[derive(Serialize)]
struct TestInfo {
    path: String,
    records: usize,
    events: usize,
    checks: usize,
    compares: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    all: Vec<Record>,
}

fn show(test: &Path, all: bool) -> Result<bool> {
    let records = read_records(test)?;
    let (mut events, mut checks, mut compares) = (0, 0, 0);
    for r in &records {
        match r {
            Record::Event(_) => events += 1,
            Record::Check(_) => checks += 1,
            Record::Compare(_) => compares += 1,
        }
    }
    let info = TestInfo {
        path: test.display().to_string(),
        records: records.len(),
        events,
        checks,
        compares,
        all: if all { records } else { Vec::new() },
    };
    print_json(&Output::ok(info));
    Ok(true)
}

fn convert(input: &Path, output: &Path) -> Result<bool> {
    let records = read_records(input)?;
    write_records(output, &records)?;
    print_json(&Output::ok(serde_json::json!({
        "input": input.display().to_string(),
        "output": output.display().to_string(),
        "records": records.len(),
    })));
    Ok(true)
}

#[derive(Serialize)]
struct StoredTest {
    file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<usize>,
}

fn list(dir: Option<&Path>) -> Result<bool> {
    let storage = storage(dir)?;
    let tests: Vec<StoredTest> = storage
        .list()?
        .into_iter()
        .map(|file| StoredTest { records: storage.count(&file), file })
        .collect();
    print_json(&Output::ok(serde_json::json!({
        "dir": storage.path().display().to_string(),
        "tests": tests,
    })));
    Ok(true)
}

fn delete(dir: Option<&Path>, test: &str) -> Result<bool> {
    storage(dir)?.delete(test)?;
    print_json(&Output::ok(serde_json::json!({ "deleted": test })));
    Ok(true)
}
