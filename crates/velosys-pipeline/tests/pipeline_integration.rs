//! End-to-end runs of the deployment pipeline against in-memory fakes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use velosys_pipeline::fakes::{
    CountingWorkspaces, FailingManifestWriter, MemorySink, RecordingRunner, StubDeploymentApi,
    StubFetcher, StubInstaller,
};
use velosys_pipeline::{
    DeployConfig, DeploymentPipeline, DeploymentRequest, ErrorKind, FileEntry, ManifestOutcome,
    ManifestWriter, ProgressEvent, ProgressSink, ProjectClassification, StepStatus, SubmitFailure,
    Workspace,
};

const REPO: &str = "https://github.com/acme/site";
const DEPLOYED: &str = "https://velosys-site-1.vercel.app";

struct Harness {
    _root: tempfile::TempDir,
    workspaces: Arc<CountingWorkspaces>,
    runner: Arc<RecordingRunner>,
    api: Arc<StubDeploymentApi>,
    pipeline: DeploymentPipeline,
}

fn harness(fetcher: StubFetcher, api: StubDeploymentApi) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let config = DeployConfig::default().with_temp_root(root.path());
    let workspaces = Arc::new(CountingWorkspaces::new(root.path()));
    let runner = Arc::new(RecordingRunner::new());
    let api = Arc::new(api);

    let pipeline = DeploymentPipeline::with_runner(&config, runner.clone())
        .unwrap()
        .with_workspaces(workspaces.clone())
        .with_fetcher(Arc::new(fetcher))
        .with_api(api.clone());

    Harness {
        _root: root,
        workspaces,
        runner,
        api,
        pipeline,
    }
}

fn static_site() -> StubFetcher {
    StubFetcher::new().with_file("index.html", "<h1>hello</h1>")
}

fn submitted_file<'a>(files: &'a [FileEntry], name: &str) -> Option<&'a FileEntry> {
    files.iter().find(|f| f.relative_path == name)
}

fn decode(entry: &FileEntry) -> serde_json::Value {
    let bytes = STANDARD.decode(&entry.content_base64).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn assert_single_terminal_result(sink: &MemorySink, success: bool) {
    let events = sink.events();
    assert_eq!(sink.results().len(), 1, "exactly one result event");
    match events.last() {
        Some(ProgressEvent::Result { success: s, .. }) => assert_eq!(*s, success),
        other => panic!("last event should be the result, got {other:?}"),
    }
}

fn assert_gone(paths: &[std::path::PathBuf]) {
    for path in paths {
        assert!(!Path::new(path).exists(), "{} not cleaned up", path.display());
    }
}

#[tokio::test]
async fn static_site_end_to_end() {
    let h = harness(static_site(), StubDeploymentApi::returning(DEPLOYED));
    let sink = MemorySink::new();

    let result = h.pipeline.run(&DeploymentRequest::new(REPO), &sink).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.deployed_url.as_deref(), Some(DEPLOYED));
    assert!(h.runner.calls().is_empty(), "static sites install nothing");

    use StepStatus::*;
    assert_eq!(
        sink.steps(),
        vec![
            (0, Pending),
            (0, Success),
            (1, Pending),
            (1, Success),
            (2, Success),
            (3, Pending),
            (3, Success),
            (4, Pending),
            (4, Success),
        ]
    );

    let submissions = h.api.submissions();
    assert_eq!(submissions.len(), 1);
    let manifest = submitted_file(&submissions[0], "vercel.json").expect("manifest uploaded");
    assert_eq!(
        decode(manifest),
        serde_json::json!({
            "version": 2,
            "builds": [{ "src": "*.html", "use": "@vercel/static" }]
        })
    );
    assert!(submitted_file(&submissions[0], "index.html").is_some());

    assert_eq!(h.workspaces.destroy_count(), 1);
    assert_gone(&h.workspaces.created());
    assert_single_terminal_result(&sink, true);

    let logs = sink.logs();
    assert_eq!(
        logs.first().map(String::as_str),
        Some("Starting deployment for https://github.com/acme/site")
    );
    assert!(logs.contains(&"Project type detected: Static HTML".to_string()));
    assert!(logs.contains(&"Prepared 2 files for deployment".to_string()));
    assert_eq!(logs.last().map(String::as_str), Some("Cleaned up temporary files"));
    match sink.events().last() {
        Some(ProgressEvent::Result {
            message,
            deployed_url,
            ..
        }) => {
            assert_eq!(message, "Your website has been deployed successfully!");
            assert_eq!(deployed_url.as_deref(), Some(DEPLOYED));
        }
        other => panic!("unexpected last event {other:?}"),
    }
}

#[tokio::test]
async fn stage_failures_end_the_run_and_clean_up_once() {
    struct Case {
        name: &'static str,
        failing_step: usize,
        kind: ErrorKind,
    }

    let cases = [
        Case {
            name: "fetch",
            failing_step: 0,
            kind: ErrorKind::Fetch,
        },
        Case {
            name: "setup",
            failing_step: 1,
            kind: ErrorKind::Setup,
        },
        Case {
            name: "configure",
            failing_step: 3,
            kind: ErrorKind::Config,
        },
        Case {
            name: "submit",
            failing_step: 4,
            kind: ErrorKind::Submit,
        },
    ];

    for case in cases {
        let fetcher = if case.name == "fetch" {
            StubFetcher::failing("repository not found")
        } else {
            static_site()
        };
        let api = if case.name == "submit" {
            StubDeploymentApi::failing(SubmitFailure::Status {
                status: 500,
                body: "{\"error\":\"internal\"}".to_string(),
            })
        } else {
            StubDeploymentApi::returning(DEPLOYED)
        };
        let mut h = harness(fetcher, api);
        if case.name == "setup" {
            h.pipeline = h
                .pipeline
                .with_installer(Arc::new(StubInstaller::failing("npm install exited with code 1")));
        }
        if case.name == "configure" {
            h.pipeline = h
                .pipeline
                .with_manifest_writer(Arc::new(FailingManifestWriter::new("read-only filesystem")));
        }
        let sink = MemorySink::new();

        let result = h.pipeline.run(&DeploymentRequest::new(REPO), &sink).await;

        assert!(!result.success, "{}", case.name);
        assert_eq!(result.error_kind(), Some(case.kind), "{}", case.name);
        assert!(result.deployed_url.is_none());
        assert_eq!(h.workspaces.destroy_count(), 1, "{}", case.name);
        assert_gone(&h.workspaces.created());
        assert_single_terminal_result(&sink, false);

        let steps = sink.steps();
        assert_eq!(
            steps.last(),
            Some(&(case.failing_step, StepStatus::Error)),
            "{}",
            case.name
        );
        assert_eq!(
            steps.iter().filter(|(_, s)| *s == StepStatus::Error).count(),
            1,
            "{}",
            case.name
        );
        assert!(steps.iter().all(|(i, _)| *i <= case.failing_step));

        match sink.events().last() {
            Some(ProgressEvent::Result { message, .. }) => {
                assert!(message.starts_with("Deployment failed: "), "{message}")
            }
            other => panic!("unexpected last event {other:?}"),
        }
    }
}

#[tokio::test]
async fn panicking_stage_is_reported_and_cleaned_up() {
    let mut h = harness(static_site(), StubDeploymentApi::returning(DEPLOYED));
    h.pipeline = h.pipeline.with_installer(Arc::new(StubInstaller::panicking()));
    let sink = MemorySink::new();

    let result = h.pipeline.run(&DeploymentRequest::new(REPO), &sink).await;

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::Unexpected));
    assert!(result.error.unwrap().to_string().contains("stub installer panicked"));
    assert_eq!(sink.steps().last(), Some(&(1, StepStatus::Error)));
    assert_eq!(h.workspaces.destroy_count(), 1);
    assert_gone(&h.workspaces.created());
    assert_single_terminal_result(&sink, false);
}

#[tokio::test]
async fn panicking_fetch_marks_step_zero() {
    let h = harness(StubFetcher::panicking(), StubDeploymentApi::returning(DEPLOYED));
    let sink = MemorySink::new();

    let result = h.pipeline.run(&DeploymentRequest::new(REPO), &sink).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::Unexpected));
    assert_eq!(
        sink.steps(),
        vec![(0, StepStatus::Pending), (0, StepStatus::Error)]
    );
    assert_eq!(h.workspaces.destroy_count(), 1);
}

#[tokio::test]
async fn missing_credential_fails_before_any_request() {
    let root = tempfile::tempdir().unwrap();
    // Nothing listens on the discard port.
    let config = DeployConfig::default()
        .with_temp_root(root.path())
        .with_api_url("http://127.0.0.1:9/v13/deployments");
    let workspaces = Arc::new(CountingWorkspaces::new(root.path()));
    let pipeline = DeploymentPipeline::with_runner(&config, Arc::new(RecordingRunner::new()))
        .unwrap()
        .with_workspaces(workspaces.clone())
        .with_fetcher(Arc::new(static_site()));
    let sink = MemorySink::new();

    let result = pipeline.run(&DeploymentRequest::new(REPO), &sink).await;

    assert!(!result.success);
    assert!(matches!(
        result.error,
        Some(velosys_pipeline::DeployError::Submit(SubmitFailure::MissingCredential))
    ));
    assert_eq!(sink.steps().last(), Some(&(4, StepStatus::Error)));
    let logs = sink.logs();
    assert!(!logs.iter().any(|l| l.starts_with("Preparing files")));
    assert!(!logs.iter().any(|l| l.starts_with("Response status")));
    assert_eq!(workspaces.destroy_count(), 1);
}

#[tokio::test]
async fn workspace_failure_reports_step_zero_error() {
    let root = tempfile::tempdir().unwrap();
    let workspaces = Arc::new(CountingWorkspaces::failing(root.path()));
    let h = harness(static_site(), StubDeploymentApi::returning(DEPLOYED));
    let pipeline = h.pipeline.clone().with_workspaces(workspaces.clone());
    let sink = MemorySink::new();

    let result = pipeline.run(&DeploymentRequest::new(REPO), &sink).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::Io));
    assert_eq!(
        sink.steps(),
        vec![(0, StepStatus::Pending), (0, StepStatus::Error)]
    );
    assert_eq!(workspaces.destroy_count(), 0);
    assert!(h.api.submissions().is_empty());
    assert_single_terminal_result(&sink, false);
}

#[tokio::test]
async fn next_project_installs_with_npm_and_gets_framework_manifest() {
    let fetcher = StubFetcher::new().with_file(
        "package.json",
        r#"{ "name": "site", "dependencies": { "react": "18.2.0", "next": "14.1.0" } }"#,
    );
    let h = harness(fetcher, StubDeploymentApi::returning(DEPLOYED));
    let sink = MemorySink::new();

    let result = h.pipeline.run(&DeploymentRequest::new(REPO), &sink).await;

    assert!(result.success, "{:?}", result.error);
    let calls = h.runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].display(), "npm install");
    assert!(sink.logs().contains(&"Project type detected: Next.js".to_string()));

    let files = &h.api.submissions()[0];
    let manifest = submitted_file(files, "vercel.json").unwrap();
    assert_eq!(
        decode(manifest),
        serde_json::json!({ "version": 2, "framework": "nextjs" })
    );
}

#[tokio::test]
async fn existing_manifest_is_uploaded_unchanged() {
    let user_manifest = r#"{"version":2,"cleanUrls":true}"#;
    let fetcher = static_site()
        .with_file("vercel.json", user_manifest)
        .with_file(".git/HEAD", "ref: refs/heads/main")
        .with_file("node_modules/x/index.js", "module.exports = 1");
    let h = harness(fetcher, StubDeploymentApi::returning(DEPLOYED));
    let sink = MemorySink::new();

    let result = h.pipeline.run(&DeploymentRequest::new(REPO), &sink).await;

    assert!(result.success);
    assert!(sink
        .logs()
        .contains(&"Using existing vercel.json configuration".to_string()));
    let files = &h.api.submissions()[0];
    let paths: Vec<_> = files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["index.html", "vercel.json"]);
    let manifest = submitted_file(files, "vercel.json").unwrap();
    assert_eq!(
        STANDARD.decode(&manifest.content_base64).unwrap(),
        user_manifest.as_bytes()
    );
}

#[tokio::test]
async fn concurrent_runs_use_separate_workspaces() {
    let h = harness(static_site(), StubDeploymentApi::returning(DEPLOYED));
    let (a, b) = (MemorySink::new(), MemorySink::new());
    let request = DeploymentRequest::new(REPO);

    let (ra, rb) = tokio::join!(h.pipeline.run(&request, &a), h.pipeline.run(&request, &b));

    assert!(ra.success && rb.success);
    assert_ne!(ra.deployment_id, rb.deployment_id);
    let created = h.workspaces.created();
    assert_eq!(created.len(), 2);
    assert_ne!(created[0], created[1]);
    assert_eq!(h.workspaces.destroy_count(), 2);
    assert_single_terminal_result(&a, true);
    assert_single_terminal_result(&b, true);
}

#[tokio::test]
async fn cleanup_failure_keeps_successful_result() {
    let root = tempfile::tempdir().unwrap();
    let workspaces = Arc::new(CountingWorkspaces::failing_destroy(root.path()));
    let h = harness(static_site(), StubDeploymentApi::returning(DEPLOYED));
    let pipeline = h.pipeline.clone().with_workspaces(workspaces.clone());
    let sink = MemorySink::new();

    let result = pipeline.run(&DeploymentRequest::new(REPO), &sink).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.deployed_url.as_deref(), Some(DEPLOYED));
    assert_eq!(workspaces.destroy_count(), 1);
    assert_single_terminal_result(&sink, true);

    let events = sink.events();
    let warning = events.iter().position(|e| {
        matches!(e, ProgressEvent::Log { message }
            if message.starts_with("Warning: Could not clean up temporary directory: "))
    });
    let result_at = events.iter().position(ProgressEvent::is_terminal);
    assert!(warning.is_some(), "cleanup warning logged");
    assert!(warning < result_at);
    assert!(!sink.logs().contains(&"Cleaned up temporary files".to_string()));
}

/// Writes no manifest and removes the workspace, so packaging finds nothing.
struct VanishingWorkspace;

#[async_trait]
impl ManifestWriter for VanishingWorkspace {
    async fn configure(
        &self,
        workspace: &Workspace,
        _classification: ProjectClassification,
        _sink: &dyn ProgressSink,
    ) -> velosys_pipeline::Result<ManifestOutcome> {
        tokio::fs::remove_dir_all(workspace.path()).await?;
        Ok(ManifestOutcome::Existing)
    }
}

#[tokio::test]
async fn packaging_failure_is_logged_before_step_error() {
    let mut h = harness(static_site(), StubDeploymentApi::returning(DEPLOYED));
    h.pipeline = h.pipeline.with_manifest_writer(Arc::new(VanishingWorkspace));
    let sink = MemorySink::new();

    let result = h.pipeline.run(&DeploymentRequest::new(REPO), &sink).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::Io));
    assert!(h.api.submissions().is_empty());
    assert_eq!(sink.steps().last(), Some(&(4, StepStatus::Error)));

    let events = sink.events();
    let logged = events.iter().position(|e| {
        matches!(e, ProgressEvent::Log { message } if message.starts_with("Error deploying: "))
    });
    let step_error = events
        .iter()
        .position(|e| *e == ProgressEvent::step(4, StepStatus::Error));
    assert!(logged.is_some(), "packaging error logged");
    assert!(logged < step_error);
    assert_single_terminal_result(&sink, false);
}
