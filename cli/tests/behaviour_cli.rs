//! End-to-end CLI behaviour tests for `pinfetch`.
//!
//! Error paths invoke the binary; flows that need remote content call
//! [`run`] in-process with an in-memory fetcher.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use clap::Parser;
use pinfetch::config::CONFIG_FILE_NAME;
use pinfetch::lock::LOCK_FILE_NAME;
use pinfetch::test_support::StaticFetcher;
use pinfetch_cli::cli::Cli;
use pinfetch_cli::run::run;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

const NOTES_URL: &str = "https://dl.test/docs/notes.txt";
const NOTES: &[u8] = b"release notes\n";

#[derive(Default)]
struct CliWorld {
    dir: Option<TempDir>,
    output: Option<Output>,
    fetcher: StaticFetcher,
    run_result: Option<Result<(), String>>,
    run_output: String,
}

impl CliWorld {
    fn root(&self) -> &Path {
        self.dir.as_ref().expect("project directory prepared").path()
    }

    fn config_path(&self) -> PathBuf {
        self.root().join(CONFIG_FILE_NAME)
    }

    fn output(&self) -> &Output {
        self.output.as_ref().expect("pinfetch was run")
    }

    /// Runs `subcommand` in-process, keeping the first failure.
    fn run_in_process(&mut self, subcommand: &str) {
        if matches!(self.run_result, Some(Err(_))) {
            return;
        }
        let config = self.config_path();
        let cli = Cli::parse_from([
            "pinfetch",
            "--config",
            config.to_str().expect("UTF-8 temp path"),
            subcommand,
        ]);
        let mut stderr = Vec::new();
        let result = run(&cli, &self.fetcher, &mut stderr).map_err(|err| err.to_string());
        self.run_output
            .push_str(&String::from_utf8(stderr).expect("UTF-8 output"));
        self.run_result = Some(result);
    }
}

#[fixture]
fn cli_world() -> CliWorld {
    CliWorld::default()
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("an empty project directory")]
fn given_empty_project(cli_world: &mut CliWorld) {
    cli_world.dir = Some(TempDir::new().expect("create temp dir"));
}

#[given("a project with a configuration declaring no files")]
fn given_project_without_files(cli_world: &mut CliWorld) {
    given_empty_project(cli_world);
    std::fs::write(cli_world.config_path(), "version = \"v1\"\n").expect("write config");
}

#[given("a project declaring the plain file \"{name}\"")]
fn given_plain_file(cli_world: &mut CliWorld, name: String) {
    given_empty_project(cli_world);
    let config = format!(
        concat!(
            "version = \"v1\"\n\n",
            "[files.notes]\n",
            "url = \"{url}\"\n",
            "destination = \"{name}\"\n",
        ),
        url = NOTES_URL,
        name = name
    );
    std::fs::write(cli_world.config_path(), config).expect("write config");
    cli_world.fetcher.serve(NOTES_URL, NOTES);
}

#[when("pinfetch is run with \"{subcommand}\"")]
fn when_pinfetch_runs(cli_world: &mut CliWorld, subcommand: String) {
    let output = Command::new(env!("CARGO_BIN_EXE_pinfetch"))
        .args(["--log-level", "off", subcommand.as_str()])
        .current_dir(cli_world.root())
        .output()
        .expect("spawn pinfetch");
    cli_world.output = Some(output);
}

#[when("the project is locked and downloaded in-process")]
fn when_locked_and_downloaded(cli_world: &mut CliWorld) {
    cli_world.run_in_process("lock");
    cli_world.run_in_process("download");
}

#[when("the project is downloaded in-process again")]
fn when_downloaded_again(cli_world: &mut CliWorld) {
    cli_world.run_in_process("download");
}

#[when("upstream changes and the project is locked in-process again")]
fn when_upstream_changes(cli_world: &mut CliWorld) {
    cli_world.fetcher.serve(NOTES_URL, b"rewritten notes\n");
    cli_world.run_in_process("lock");
}

#[then("pinfetch exits successfully")]
fn then_exits_successfully(cli_world: &mut CliWorld) {
    let output = cli_world.output();
    assert!(
        output.status.success(),
        "expected success, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[then("pinfetch exits with an error")]
fn then_exits_with_error(cli_world: &mut CliWorld) {
    let output = cli_world.output();
    assert_eq!(output.status.code(), Some(1));
}

#[then("stderr mentions \"{text}\"")]
fn then_stderr_mentions(cli_world: &mut CliWorld, text: String) {
    let stderr = String::from_utf8_lossy(&cli_world.output().stderr).into_owned();
    assert!(stderr.contains(&text), "stderr was: {stderr}");
}

#[then("the lock file exists")]
fn then_lock_file_exists(cli_world: &mut CliWorld) {
    assert!(cli_world.root().join(LOCK_FILE_NAME).is_file());
}

#[then("the in-process run succeeds")]
fn then_in_process_succeeds(cli_world: &mut CliWorld) {
    assert_eq!(cli_world.run_result, Some(Ok(())));
}

#[then("\"{name}\" holds the served content")]
fn then_file_holds_content(cli_world: &mut CliWorld, name: String) {
    let content = std::fs::read(cli_world.root().join(name)).expect("downloaded file");
    assert_eq!(content, NOTES);
}

#[then("the run output mentions \"{text}\"")]
fn then_run_output_mentions(cli_world: &mut CliWorld, text: String) {
    assert!(
        cli_world.run_output.contains(&text),
        "output was: {}",
        cli_world.run_output
    );
}

#[then("the in-process run fails with \"{text}\"")]
fn then_in_process_fails(cli_world: &mut CliWorld, text: String) {
    match cli_world.run_result.as_ref().expect("run happened") {
        Err(message) => assert!(message.contains(&text), "error was: {message}"),
        Ok(()) => panic!("expected the run to fail"),
    }
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/cli.feature",
    name = "A missing configuration file is reported"
)]
fn scenario_missing_config(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "Downloading before locking is refused"
)]
fn scenario_download_without_lock(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "Locking a project with no files writes an empty lock file"
)]
fn scenario_lock_empty_project(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "A locked file downloads and is then left alone"
)]
fn scenario_lock_then_download(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "Drifted content fails the lock run"
)]
fn scenario_drift_fails_lock(cli_world: CliWorld) {
    let _ = cli_world;
}
