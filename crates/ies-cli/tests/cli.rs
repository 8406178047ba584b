use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
}

fn ies() -> Command {
    Command::cargo_bin("ies-cli").unwrap()
}

#[test]
fn validate_accepts_district() {
    ies()
        .args(["validate", "--network"])
        .arg(data("district.json"))
        .arg("--config")
        .arg(data("district.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Network 'district'"))
        .stdout(predicate::str::contains("Diagnostics: No issues"))
        .stdout(predicate::str::contains("Configuration OK"));
}

#[test]
fn validate_rejects_zero_reactance() {
    ies()
        .args(["validate", "--network"])
        .arg(data("broken.json"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("reactance must be positive"));
}

#[test]
fn validate_reports_missing_file() {
    ies()
        .args(["validate", "--network", "does/not/exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loading network"));
}

#[test]
fn run_rejects_inverted_window() {
    let out = tempdir().unwrap();
    ies()
        .args(["run", "--network"])
        .arg(data("district.json"))
        .args(["--start", "3", "--end", "2", "--export-dir"])
        .arg(out.path())
        .assert()
        .failure();
    assert!(!out.path().join("solution.json").exists());
}

#[test]
fn run_rejects_unknown_solver() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "[solver]\nname = \"cplex\"\n").unwrap();
    ies()
        .args(["run", "--network"])
        .arg(data("district.json"))
        .arg("--config")
        .arg(&config)
        .arg("--export-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("cplex"));
}

#[cfg(feature = "solver-clarabel")]
#[test]
fn run_iterates_and_exports() {
    let out = tempdir().unwrap();
    ies()
        .args(["run", "--network"])
        .arg(data("district.json"))
        .arg("--config")
        .arg(data("district.toml"))
        .arg("--export-dir")
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("ITERATION"))
        .stdout(predicate::str::contains("Objective:"));

    for file in [
        "lopf_iteration_1/solution.json",
        "lopf_iteration_2/lines.csv",
        "solution.json",
        "summary.csv",
    ] {
        assert!(out.path().join(file).exists(), "missing {file}");
    }
    let summary = fs::read_to_string(out.path().join("summary.csv")).unwrap();
    assert!(summary.starts_with("metric,unit,value"));
    assert!(summary.contains("line expansion,MVA,"));
}

#[cfg(feature = "solver-clarabel")]
#[test]
fn n_iter_override_limits_iterations() {
    let out = tempdir().unwrap();
    ies()
        .args(["run", "--network"])
        .arg(data("district.json"))
        .arg("--config")
        .arg(data("district.toml"))
        .args(["--n-iter", "1", "--export-dir"])
        .arg(out.path())
        .assert()
        .success();
    assert!(out.path().join("lopf_iteration_1").exists());
    assert!(!out.path().join("lopf_iteration_2").exists());
}

#[cfg(feature = "solver-clarabel")]
#[test]
fn summary_prints_metric_table() {
    let out = tempdir().unwrap();
    ies()
        .args(["--log-level", "warn", "summary", "--network"])
        .arg(data("district.json"))
        .arg("--config")
        .arg(data("district.toml"))
        .arg("--export-dir")
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("METRIC"))
        .stdout(predicate::str::contains("annual system cost"))
        .stdout(predicate::str::contains("CHP heat output"));
}
