use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::tempdir;

fn seed_fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/seed.yaml")
}

fn fieldops(data_dir: &Path, args: &[&str]) -> Output {
    let output = Command::new(env!("CARGO_BIN_EXE_fieldops"))
        .args(args)
        .env("FIELDOPS_DATA_DIR", data_dir)
        .env("LOG_FORMAT", "json")
        .env("RUST_LOG", "info")
        .env_remove("FIELDOPS_COMPANY_ID")
        .output()
        .expect("run fieldops");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    output
}

#[test]
fn json_logs_stay_off_stdout_for_seed_and_search() {
    let dir = tempdir().expect("tempdir");
    let fixture = seed_fixture();
    let fixture = fixture.to_str().expect("utf-8 path");

    let seeded = fieldops(dir.path(), &["seed", "--file", fixture]);
    let stdout = String::from_utf8(seeded.stdout).expect("utf-8 stdout");
    assert_eq!(stdout.lines().count(), 5);
    assert!(stdout.lines().all(|line| line.starts_with("seeded ")));
    let stderr = String::from_utf8(seeded.stderr).expect("utf-8 stderr");
    assert!(stderr.contains("\"message\":\"seeded collection\""));

    let searched = fieldops(dir.path(), &["search", "equipment", "-q", "exc"]);
    let stdout = String::from_utf8(searched.stdout).expect("utf-8 stdout");
    assert_eq!(
        stdout.trim_end(),
        "name=[Exc]avator  serial_number=[EXC]12345  location=Site A"
    );
    let stderr = String::from_utf8(searched.stderr).expect("utf-8 stderr");
    let event = stderr
        .lines()
        .find(|line| line.contains("search complete"))
        .expect("search event on stderr");
    assert!(event.contains("\"matches\":1"));
}
