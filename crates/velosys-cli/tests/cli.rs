//! Runs the `velosys` binary for paths that need no network.

use std::process::{Command, Output, Stdio};

fn velosys(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_velosys"))
        .args(args)
        .env_remove("VERCEL_TOKEN")
        .env_remove("GITHUB_TOKEN")
        .output()
        .expect("failed to run velosys")
}

#[test]
fn deploy_rejects_foreign_host() {
    let out = velosys(&["deploy", "https://gitlab.com/acme/site"]);

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("not a github.com repository"), "{stderr}");
    assert!(out.stdout.is_empty(), "no progress before the host check");
}

#[test]
fn inspect_static_directory_as_json() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
    std::fs::write(dir.path().join(".env"), "SECRET=1").unwrap();

    let out = velosys(&["--json", "inspect", dir.path().to_str().unwrap()]);

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["classification"], "Static");
    assert_eq!(report["files"], 1);
    assert_eq!(report["manifest"]["action"], "create");
    assert_eq!(
        report["manifest"]["manifest"]["builds"][0]["use"],
        "@vercel/static"
    );
    assert!(!dir.path().join("vercel.json").exists());
}

#[test]
fn inspect_text_output() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();
    std::fs::write(dir.path().join("app.py"), "print('hi')\n").unwrap();

    let out = velosys(&["inspect", dir.path().to_str().unwrap()]);

    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Project type:    Python"), "{stdout}");
    assert!(stdout.contains("pip install -r requirements.txt"));
}

#[test]
fn deploy_survives_closed_stdout() {
    let root = tempfile::tempdir().unwrap();
    let missing = root.path().join("no-such-repo");
    let repo_url = format!("file://{}", missing.display());
    let temp_root = root.path().join("workspaces");

    let mut child = Command::new(env!("CARGO_BIN_EXE_velosys"))
        .args(["deploy", "--any-host", &repo_url])
        .env("VERCEL_TOKEN", "vt_test")
        .env_remove("GITHUB_TOKEN")
        .env("VELOSYS_TEMP_ROOT", &temp_root)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run velosys");
    drop(child.stdout.take());
    let out = child.wait_with_output().unwrap();

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert_eq!(out.status.code(), Some(1), "{stderr}");
    assert!(!stderr.contains("panicked"), "{stderr}");
    assert!(stderr.contains("fetch failed"), "{stderr}");
    assert_eq!(std::fs::read_dir(&temp_root).unwrap().count(), 0);
}
