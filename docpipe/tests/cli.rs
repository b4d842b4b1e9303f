use std::fs::write;

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::tempdir;

/// Creates a config file pointing at a temp data dir, plus the input file.
fn setup_workspace() -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
    let dir = tempdir().expect("Creating temp workspace failed");
    let config_path = dir.path().join("docpipe.yaml");
    let data_dir = dir.path().join("data");
    write(
        &config_path,
        format!("data_dir: {}\n", data_dir.display()),
    )
    .expect("Writing temp config failed");
    let input_path = dir.path().join("notes.txt");
    write(&input_path, b"Monday: the release shipped.").expect("Writing input file failed");
    (dir, config_path, input_path)
}

#[test]
#[serial]
fn pipelines_subcommand_lists_builtins() {
    let (_dir, config_path, _input) = setup_workspace();

    let mut cmd = Command::cargo_bin("docpipe").expect("Binary exists");
    cmd.arg("pipelines").arg("--config").arg(&config_path);

    cmd.assert()
        .success()
        .stdout(
            predicate::str::contains("doc-to-pdf")
                .and(predicate::str::contains("podcast"))
                .and(predicate::str::contains("analysis")),
        );
}

#[test]
#[serial]
fn upload_then_list_shows_the_artifact() {
    let (_dir, config_path, input_path) = setup_workspace();

    let mut upload = Command::cargo_bin("docpipe").expect("Binary exists");
    upload
        .arg("upload")
        .arg(&input_path)
        .arg("--config")
        .arg(&config_path);
    upload
        .assert()
        .success()
        .stdout(
            predicate::str::contains("raw-upload")
                .and(predicate::str::contains("notes.txt"))
                .and(predicate::str::contains("pending")),
        );

    let mut list = Command::cargo_bin("docpipe").expect("Binary exists");
    list.arg("list").arg("--config").arg(&config_path);
    list.assert()
        .success()
        .stdout(predicate::str::contains("notes.txt"));
}

#[test]
#[serial]
fn upload_of_unsupported_file_type_fails_clearly() {
    let (dir, config_path, _input) = setup_workspace();
    let bad_input = dir.path().join("photo.png");
    write(&bad_input, b"not a document").expect("Writing input file failed");

    let mut cmd = Command::cargo_bin("docpipe").expect("Binary exists");
    cmd.arg("upload")
        .arg(&bad_input)
        .arg("--config")
        .arg(&config_path);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unsupported file type"));
}

#[test]
#[serial]
fn get_of_unknown_artifact_fails_with_not_found() {
    let (_dir, config_path, _input) = setup_workspace();

    let mut cmd = Command::cargo_bin("docpipe").expect("Binary exists");
    cmd.arg("get")
        .arg("no-such-artifact")
        .arg("--config")
        .arg(&config_path);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
#[serial]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use clap::Parser;
    use docpipe::cli::{run, Cli};

    let (_dir, config_path, _input) = setup_workspace();
    let cli = Cli::parse_from([
        "docpipe",
        "pipelines",
        "--config",
        config_path.to_str().expect("utf-8 path"),
    ]);

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
