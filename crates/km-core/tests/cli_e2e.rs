//! End-to-end tests for the `km` binary.
//!
//! Every test points `--config` at a file inside its own temp directory so
//! no user configuration or history is touched.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn km() -> Command {
    let mut cmd = Command::cargo_bin("km").expect("km binary should exist");
    cmd.env_remove("KILN_MONITOR_CONFIG").env("KILN_LOG", "warn");
    cmd
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let config = format!(
            "storage_dir = '{}'\npublic_url = 'https://kiln.example.net'\n\n[notify]\noutbox_dir = '{}'\n\n[simulation]\ntime_step_secs = 10.0\nspeedup = 10000.0\n",
            dir.path().join("history").display(),
            dir.path().join("outbox").display(),
        );
        std::fs::write(dir.path().join("config.toml"), config).expect("write config");
        std::fs::write(
            dir.path().join("profile.json"),
            r#"{"name": "test-fire", "type": "profile", "data": [[0, 80], [300, 150]]}"#,
        )
        .expect("write profile");
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn km(&self) -> Command {
        let mut cmd = km();
        cmd.arg("--config").arg(self.path("config.toml"));
        cmd
    }

    fn files(&self, sub: &str) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(self.path(sub))
            .map(|rd| rd.map(|e| e.expect("dir entry").path()).collect())
            .unwrap_or_default();
        files.sort();
        files
    }

    fn records(&self) -> Vec<PathBuf> {
        self.files("history")
            .into_iter()
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .collect()
    }
}

fn lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|l| serde_json::from_str(l).expect("each stdout line is JSON"))
        .collect()
}

fn simulate(ws: &Workspace, mailto: &str) -> Vec<serde_json::Value> {
    let output = ws
        .km()
        .arg("simulate")
        .arg("--profile")
        .arg(ws.path("profile.json"))
        .args(["--mailto", mailto])
        .timeout(std::time::Duration::from_secs(60))
        .output()
        .expect("run km simulate");
    assert!(
        output.status.success(),
        "simulate failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    lines(&output.stdout)
}

mod help {
    use super::*;

    #[test]
    fn lists_subcommands() {
        km().arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("simulate"))
            .stdout(predicate::str::contains("analyze"))
            .stdout(predicate::str::contains("resend"))
            .stdout(predicate::str::contains("history"));
    }

    #[test]
    fn unknown_command_fails() {
        km().arg("nonexistent-command")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }
}

mod config_command {
    use super::*;

    #[test]
    fn prints_resolved_toml() {
        let ws = Workspace::new();
        ws.km()
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("backlog_max_points = 50"))
            .stdout(predicate::str::contains("speedup = 10000.0"))
            .stdout(predicate::str::contains("[analysis]"));
    }

    #[test]
    fn missing_explicit_file_is_config_error() {
        let ws = Workspace::new();
        km().arg("--config")
            .arg(ws.path("absent.toml"))
            .arg("config")
            .assert()
            .code(11)
            .stderr(predicate::str::contains("config file not found"));
    }

    #[test]
    fn invalid_value_is_config_error() {
        let ws = Workspace::new();
        std::fs::write(ws.path("bad.toml"), "backlog_max_points = 1\n").unwrap();
        km().arg("--config")
            .arg(ws.path("bad.toml"))
            .arg("history")
            .assert()
            .code(11)
            .stderr(predicate::str::contains("backlog_max_points"));
    }
}

mod simulate_command {
    use super::*;

    #[test]
    fn streams_backlog_then_samples_and_archives() {
        let ws = Workspace::new();
        let messages = simulate(&ws, "");

        let backlog = &messages[0];
        assert_eq!(backlog["type"], "backlog");
        assert_eq!(backlog["profile"]["name"], "test-fire");
        assert_eq!(backlog["log"].as_array().unwrap().len(), 1);

        let live = &messages[1..];
        assert!(live.iter().any(|m| m["state"] == "RUNNING"));
        assert_eq!(live.last().unwrap()["state"], "COMPLETE");

        assert_eq!(ws.records().len(), 1);
        // No recipients: nothing delivered, no plots rendered.
        assert!(ws.files("outbox").is_empty());
        assert_eq!(ws.files("history").len(), 1);
    }

    #[test]
    fn recipients_receive_start_notice_and_report() {
        let ws = Workspace::new();
        simulate(&ws, "studio@example.org, potter@example.org");

        let envelopes = ws.files("outbox");
        assert_eq!(envelopes.len(), 2);
        let subjects: Vec<String> = envelopes
            .iter()
            .map(|p| {
                let v: serde_json::Value =
                    serde_json::from_slice(&std::fs::read(p).unwrap()).unwrap();
                assert_eq!(v["to"].as_array().unwrap().len(), 2);
                v["subject"].as_str().unwrap().to_string()
            })
            .collect();
        assert!(subjects.iter().any(|s| s.starts_with("[kiln start] ")));
        assert!(subjects.iter().any(|s| s.starts_with("[kiln report] ")));

        let svgs = ws
            .files("history")
            .into_iter()
            .filter(|p| p.extension().is_some_and(|e| e == "svg"))
            .count();
        assert!(svgs >= 2);
    }

    #[test]
    fn missing_profile_is_args_error() {
        let ws = Workspace::new();
        ws.km()
            .args(["simulate", "--profile"])
            .arg(ws.path("nope.json"))
            .assert()
            .code(10)
            .stderr(predicate::str::contains("cannot load profile"));
    }
}

mod stored_runs {
    use super::*;

    #[test]
    fn history_analyze_and_resend() {
        let ws = Workspace::new();
        simulate(&ws, "");
        let record = ws.records().remove(0);

        let output = ws.km().arg("history").output().unwrap();
        assert!(output.status.success());
        let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["profile"], "test-fire");

        let out_dir = ws.path("plots");
        let output = ws
            .km()
            .arg("analyze")
            .arg(&record)
            .arg("--out")
            .arg(&out_dir)
            .output()
            .unwrap();
        assert!(output.status.success());
        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert!(report["max_temperature_raw"].as_f64().unwrap() > 77.0);
        assert!(report["fire_duration_hours"].as_f64().unwrap() >= 0.0);
        let plots = ws.files("plots");
        assert!(plots
            .iter()
            .any(|p| p.to_string_lossy().ends_with("1_temperature.svg")));

        ws.km()
            .arg("resend")
            .arg(&record)
            .args(["--mailto", "studio@example.org"])
            .assert()
            .success();
        assert_eq!(ws.files("outbox").len(), 1);
    }

    #[test]
    fn analyze_missing_record_is_record_error() {
        let ws = Workspace::new();
        ws.km()
            .arg("analyze")
            .arg(ws.path("history/2024_01_01-00_00.json"))
            .assert()
            .code(15);
    }

    #[test]
    fn resend_without_recipients_is_args_error() {
        let ws = Workspace::new();
        ws.km()
            .arg("resend")
            .arg(ws.path("whatever.json"))
            .args(["--mailto", " , "])
            .assert()
            .code(10);
    }
}
