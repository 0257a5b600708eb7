//! Pipeline integration tests
//!
//! Runs the full stage sequence against fake tools written as shell scripts.
//! The scripts honor just enough of each tool's command line to produce the
//! artifacts the next stage expects.

#![cfg(unix)]

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serial_test::serial;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use apkpipe::build::progress::{NullProgress, ProgressEvent, ProgressReporter};
use apkpipe::build::{
    submit_with_events, BuildRequest, BuildState, CancelToken, Pipeline, SigningCredentials,
    Stage, StageError, ToolCommand, Toolchain, Variant,
};
use apkpipe::diagnostic::{Severity, Tool};

// ============================================================================
// Fake tools
// ============================================================================

const AAPT: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    -F) out="$2"; shift ;;
    -J) gen="$2"; shift ;;
  esac
  shift
done
mkdir -p "$gen/com/example"
echo "package com.example; public final class R {}" > "$gen/com/example/R.java"
cp "@RESOURCES@" "$out"
"#;

const AAPT_INTERLEAVED: &str = r#"
echo "ERROR at line 4: bad tag" >&2
sleep 0.3
echo "Processing resources"
sleep 0.3
echo "    (Occurred while parsing res/layout/main.xml)" >&2
exit 1
"#;

const JAVAC: &str = r#"
echo "$@" > "@ARGS@"
while [ $# -gt 0 ]; do
  case "$1" in
    -d) out="$2"; shift ;;
  esac
  shift
done
mkdir -p "$out/com/example"
echo class > "$out/com/example/Main.class"
echo "Note: Main.java uses unchecked or unsafe operations."
"#;

const JAVAC_FAILING: &str = r#"
echo "src/com/example/Main.java:3: error: cannot find symbol" >&2
echo "    Foo foo;" >&2
echo "    ^" >&2
echo "  symbol:   class Foo" >&2
echo "1 error" >&2
exit 1
"#;

const JAVAC_HANGING: &str = r#"
sleep 30 &
echo $! > "@PIDFILE@"
wait
"#;

const DX: &str = r#"
for arg in "$@"; do
  case "$arg" in
    --output=*) out="${arg#--output=}" ;;
  esac
done
echo dex > "$out"
"#;

const ZIPALIGN: &str = r#"
cp "$3" "$4"
"#;

// ============================================================================
// Test Utilities
// ============================================================================

struct Fixture {
    temp: TempDir,
}

impl Fixture {
    /// A project with a manifest, one source file and one resource.
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let fixture = Self { temp };
        fixture.write("AndroidManifest.xml", "<manifest package=\"com.example\"/>");
        fixture.write("src/com/example/Main.java", "package com.example;\nclass Main {}\n");
        fixture.write("res/values/strings.xml", "<resources/>");
        write_zip(
            &fixture.path("tools/resources.zip"),
            &[("AndroidManifest.xml", b"<manifest/>"), ("resources.arsc", b"arsc")],
        );
        fixture
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    fn out(&self) -> PathBuf {
        self.path("out")
    }

    fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// Write an executable shell script, substituting `@KEY@` placeholders.
    fn tool(&self, name: &str, body: &str, vars: &[(&str, &Path)]) -> ToolCommand {
        let mut script = format!("#!/bin/sh\n{}", body);
        for (key, value) in vars {
            script = script.replace(&format!("@{}@", key), &value.display().to_string());
        }
        let path = self.write(&format!("tools/{}", name), &script);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        ToolCommand::new(path)
    }

    fn request(&self) -> BuildRequest {
        BuildRequest::new("demo", self.path("AndroidManifest.xml"), self.out())
            .with_sources(vec![self.path("src")])
            .with_resources(vec![self.path("res")])
    }

    fn toolchain_with_javac(&self, javac: &str) -> Toolchain {
        let resources = self.path("tools/resources.zip");
        let args = self.path("tools/javac.args");
        let pidfile = self.path("tools/sleep.pid");
        Toolchain::new(
            self.tool("aapt", AAPT, &[("RESOURCES", &resources)]),
            self.tool("javac", javac, &[("ARGS", &args), ("PIDFILE", &pidfile)]),
            self.tool("dx", DX, &[]),
            &self.path("sdk/android.jar"),
        )
    }

    fn toolchain(&self) -> Toolchain {
        self.toolchain_with_javac(JAVAC)
    }
}

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

fn entry_names(path: &Path) -> Vec<String> {
    let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    archive.file_names().map(str::to_string).collect()
}

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// Records every event it is given.
#[derive(Default)]
struct Recorder(Mutex<Vec<ProgressEvent>>);

impl Recorder {
    fn started_stages(&self) -> Vec<Stage> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::StageStarted { stage } => Some(*stage),
                _ => None,
            })
            .collect()
    }
}

impl ProgressReporter for Recorder {
    fn report(&self, event: ProgressEvent) {
        self.0.lock().unwrap().push(event);
    }
}

/// Whether a process is alive; zombies count as dead.
fn is_running(pid: i32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => false,
    }
}

fn wait_for<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

// ============================================================================
// Pipeline Integration Tests
// ============================================================================

#[test]
#[serial]
fn test_stages_run_in_order() {
    let fixture = Fixture::new();
    let pipeline = Pipeline::new(fixture.toolchain());
    let recorder = Recorder::default();

    let result = pipeline.run(&fixture.request(), &recorder, &CancelToken::new());

    assert!(result.is_success(), "{}", result.summary());
    assert_eq!(recorder.started_stages(), Stage::ALL.to_vec());
    assert_eq!(result.stages.iter().map(|s| s.stage).collect::<Vec<_>>(), Stage::ALL.to_vec());
    assert!(result.stages.iter().all(|s| s.status.is_success()));

    let events = recorder.0.lock().unwrap();
    assert!(matches!(events.first(), Some(ProgressEvent::BuildStarted { total_stages: 8, .. })));
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::BuildCompleted { state: BuildState::Succeeded, .. })
    ));
}

#[test]
#[serial]
fn test_unsigned_build_publishes_package() {
    let fixture = Fixture::new();
    let pipeline = Pipeline::new(fixture.toolchain());

    let result = pipeline.run(&fixture.request(), &NullProgress::new(), &CancelToken::new());

    assert!(result.is_success(), "{}", result.summary());
    let artifact = result.artifact.clone().unwrap();
    assert_eq!(artifact, fixture.out().join("demo-debug.apk"));

    let names = entry_names(&artifact);
    assert!(names.contains(&"classes.dex".to_string()));
    assert!(names.contains(&"resources.arsc".to_string()));
    assert!(!names.iter().any(|n| n.starts_with("META-INF/")));

    let warnings: Vec<_> = result.diagnostics.iter().filter(|d| d.is_warning()).collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].tool, Tool::Signer);
}

#[test]
#[serial]
fn test_debug_variant_flags_reach_tools() {
    let fixture = Fixture::new();
    let pipeline = Pipeline::new(fixture.toolchain());

    let result = pipeline.run(&fixture.request(), &NullProgress::new(), &CancelToken::new());
    assert!(result.is_success(), "{}", result.summary());
    let args = fs::read_to_string(fixture.path("tools/javac.args")).unwrap();
    assert!(args.contains("-g "));
    assert!(args.contains("R.java"));
    assert!(args.contains("Main.java"));

    let request = fixture.request().with_variant(Variant::Release);
    let result = pipeline.run(&request, &NullProgress::new(), &CancelToken::new());
    assert!(result.is_success(), "{}", result.summary());
    let args = fs::read_to_string(fixture.path("tools/javac.args")).unwrap();
    assert!(args.contains("-g:none"));
    assert!(fixture.out().join("demo-release.apk").exists());
}

#[test]
#[serial]
fn test_signed_aligned_build_with_library() {
    let fixture = Fixture::new();
    write_zip(
        &fixture.path("libs/util.jar"),
        &[("com/util/Util.class", b"cafebabe"), ("util.properties", b"version=1")],
    );
    let toolchain = fixture.toolchain().with_zipalign(fixture.tool("zipalign", ZIPALIGN, &[]));
    let pipeline = Pipeline::new(toolchain);
    let request = fixture
        .request()
        .with_libraries(vec![fixture.path("libs/util.jar")])
        .with_signing(SigningCredentials::new(
            fixture_path("testkey.pk8.pem"),
            fixture_path("testkey.x509.pem"),
        ));

    let result = pipeline.run(&request, &NullProgress::new(), &CancelToken::new());

    assert!(result.is_success(), "{}", result.summary());
    assert!(fixture.out().join("bin/merged/classes.dex").exists());
    assert!(fixture.out().join("bin/demo-aligned.apk").exists());
    assert!(fixture.out().join("jarlist.cache").exists());

    let names = entry_names(result.artifact.as_ref().unwrap());
    for expected in
        ["META-INF/MANIFEST.MF", "META-INF/CERT.SF", "META-INF/CERT.RSA", "classes.dex", "util.properties"]
    {
        assert!(names.contains(&expected.to_string()), "missing {}", expected);
    }
    assert!(!names.iter().any(|n| n.ends_with(".class")));
    assert_eq!(result.warning_count(), 0);
}

#[test]
#[serial]
fn test_compile_failure_stops_pipeline() {
    let fixture = Fixture::new();
    let pipeline = Pipeline::new(fixture.toolchain_with_javac(JAVAC_FAILING));
    let recorder = Recorder::default();

    let result = pipeline.run(&fixture.request(), &recorder, &CancelToken::new());

    assert_eq!(result.state, BuildState::Failed);
    assert_eq!(result.failed_stage, Some(Stage::Compile));
    assert!(matches!(
        result.cause,
        Some(StageError::ToolExit { tool: Tool::Javac, code: Some(1), errors: 1 })
    ));
    assert_eq!(
        recorder.started_stages(),
        vec![Stage::Clean, Stage::GenerateResources, Stage::Compile]
    );

    let errors: Vec<_> = result.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, Some(PathBuf::from("src/com/example/Main.java")));
    assert_eq!(errors[0].line, Some(3));
    assert_eq!(errors[0].column, Some(5));
    assert!(errors[0].message.starts_with("cannot find symbol"));

    // Nothing from COMPILE onwards survives; earlier output does.
    assert!(fixture.out().join("bin/resources.ap_").exists());
    assert!(!fixture.out().join("bin/classes").exists());
    assert!(!fixture.out().join("bin/classes.dex").exists());
    assert!(!fixture.out().join("bin/demo-unsigned.apk").exists());
    assert!(result.artifact.is_none());
}

#[test]
#[serial]
fn test_failed_rebuild_removes_previous_package() {
    let fixture = Fixture::new();
    let result = Pipeline::new(fixture.toolchain()).run(
        &fixture.request(),
        &NullProgress::new(),
        &CancelToken::new(),
    );
    assert!(result.is_success(), "{}", result.summary());
    assert!(fixture.out().join("demo-debug.apk").exists());

    let result = Pipeline::new(fixture.toolchain_with_javac(JAVAC_FAILING)).run(
        &fixture.request(),
        &NullProgress::new(),
        &CancelToken::new(),
    );
    assert_eq!(result.failed_stage, Some(Stage::Compile));
    assert!(!fixture.out().join("demo-debug.apk").exists());
}

#[test]
#[serial]
fn test_invalid_request_fails_clean_without_touching_output() {
    let fixture = Fixture::new();
    let keep = fixture.write("out/bin/keep.txt", "keep");
    let request = BuildRequest::new("demo", fixture.path("Missing.xml"), fixture.out())
        .with_sources(vec![fixture.path("src")]);

    let result = Pipeline::new(fixture.toolchain()).run(
        &request,
        &NullProgress::new(),
        &CancelToken::new(),
    );

    assert_eq!(result.failed_stage, Some(Stage::Clean));
    assert!(matches!(result.cause, Some(StageError::InvalidRequest(_))));
    assert!(keep.exists());
}

#[test]
#[serial]
fn test_missing_tool_fails_generate_resources() {
    let fixture = Fixture::new();
    let mut toolchain = fixture.toolchain();
    toolchain.aapt = ToolCommand::new(fixture.path("tools/no-such-aapt"));

    let result =
        Pipeline::new(toolchain).run(&fixture.request(), &NullProgress::new(), &CancelToken::new());

    assert_eq!(result.failed_stage, Some(Stage::GenerateResources));
    assert!(matches!(result.cause, Some(StageError::ToolSpawn { tool: Tool::Aapt, .. })));
}

#[test]
#[serial]
fn test_cancel_before_start() {
    let fixture = Fixture::new();
    let cancel = CancelToken::new();
    cancel.cancel();

    let recorder = Recorder::default();
    let result = Pipeline::new(fixture.toolchain()).run(&fixture.request(), &recorder, &cancel);

    assert_eq!(result.state, BuildState::Cancelled);
    assert_eq!(result.failed_stage, Some(Stage::Clean));
    assert!(recorder.started_stages().is_empty());
    assert!(result.stages.is_empty());
}

#[test]
#[serial]
fn test_cancel_during_compile_kills_tool_tree() {
    let fixture = Fixture::new();
    let pipeline = Arc::new(Pipeline::new(fixture.toolchain_with_javac(JAVAC_HANGING)));
    let (handle, events) = submit_with_events(pipeline, fixture.request()).unwrap();

    for event in events.iter() {
        if matches!(event, ProgressEvent::StageStarted { stage: Stage::Compile }) {
            break;
        }
    }
    let pidfile = fixture.path("tools/sleep.pid");
    assert!(wait_for(
        || fs::read_to_string(&pidfile).map(|s| !s.trim().is_empty()).unwrap_or(false),
        Duration::from_secs(5),
    ));
    let pid: i32 = fs::read_to_string(&pidfile).unwrap().trim().parse().unwrap();
    assert!(is_running(pid));

    let started = Instant::now();
    handle.cancel();
    let result = handle.wait();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.state, BuildState::Cancelled);
    assert_eq!(result.failed_stage, Some(Stage::Compile));
    assert!(matches!(result.cause, Some(StageError::Cancelled)));
    assert!(wait_for(|| !is_running(pid), Duration::from_secs(2)), "helper process survived");
    assert!(!fixture.out().join("bin/classes").exists());
    assert!(!fixture.out().join("bin/demo-unsigned.apk").exists());

    let last = events.iter().last();
    assert!(matches!(
        last,
        Some(ProgressEvent::BuildCompleted { state: BuildState::Cancelled, .. })
    ));
}

#[test]
#[serial]
fn test_tool_output_streams_as_diagnostics() {
    let fixture = Fixture::new();
    let recorder = Recorder::default();

    let result = Pipeline::new(fixture.toolchain_with_javac(JAVAC_FAILING)).run(
        &fixture.request(),
        &recorder,
        &CancelToken::new(),
    );
    assert!(!result.is_success());

    let events = recorder.0.lock().unwrap();
    let streamed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Diagnostic { stage, diagnostic } => Some((*stage, diagnostic.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(streamed.len(), result.diagnostics.len());
    assert!(streamed
        .iter()
        .any(|(stage, d)| *stage == Stage::Compile && d.severity == Severity::Error));
}

#[test]
#[serial]
fn test_stdout_line_inside_stderr_report_stays_separate() {
    let fixture = Fixture::new();
    let mut toolchain = fixture.toolchain();
    toolchain.aapt = fixture.tool("aapt-interleaved", AAPT_INTERLEAVED, &[]);

    let result =
        Pipeline::new(toolchain).run(&fixture.request(), &NullProgress::new(), &CancelToken::new());

    assert_eq!(result.failed_stage, Some(Stage::GenerateResources));
    assert!(matches!(
        result.cause,
        Some(StageError::ToolExit { tool: Tool::Aapt, code: Some(1), errors: 1 })
    ));

    let errors: Vec<_> = result.errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, Some(PathBuf::from("res/layout/main.xml")));
    assert_eq!(errors[0].line, Some(4));
    assert_eq!(errors[0].message, "bad tag");

    let stdout: Vec<_> =
        result.diagnostics.iter().filter(|d| d.severity == Severity::Unknown).collect();
    assert_eq!(stdout.len(), 1);
    assert_eq!(stdout[0].message, "Processing resources");
    assert_eq!(stdout[0].path, None);
}
