use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn nbpipe() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("nbpipe"));
    cmd.env_remove("NBPIPE_ENV_FILE")
        .env_remove("NBPIPE_OUT_DIR")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn chunk_writes_headed_parts() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("doc.txt");
    std::fs::write(&input, "aaaa\nbbbb\ncccc").unwrap();
    let out_dir = tmp.path().join("parts");

    let out = nbpipe()
        .args(["chunk", "--tokens", "3", "--model", "claude"])
        .arg("--input")
        .arg(&input)
        .arg("--out-dir")
        .arg(&out_dir)
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["success"].as_bool(), Some(true));
    assert_eq!(v["chunkCount"].as_u64(), Some(2));

    let mut names: Vec<String> = std::fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("notebook-claude-part1-of-2-"));
    assert!(names[1].starts_with("notebook-claude-part2-of-2-"));
    assert_eq!(
        std::fs::read_to_string(out_dir.join(&names[0])).unwrap(),
        "--- PART 1 OF 2 ---\n\naaaa\nbbbb"
    );
    assert_eq!(
        std::fs::read_to_string(out_dir.join(&names[1])).unwrap(),
        "--- PART 2 OF 2 ---\n\ncccc"
    );
}

#[test]
fn chunk_reads_stdin() {
    let tmp = tempfile::tempdir().unwrap();
    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("nbpipe"))
        .env_remove("NBPIPE_ENV_FILE")
        .env_remove("NBPIPE_OUT_DIR")
        .args(["chunk", "--input", "-", "--tokens", "100"])
        .arg("--out-dir")
        .arg(tmp.path())
        .write_stdin("one short document")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"chunkCount\":1"));
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
}

#[test]
fn chunk_rejects_zero_token_limit() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("doc.txt");
    std::fs::write(&input, "text").unwrap();
    nbpipe()
        .args(["chunk", "--tokens", "0"])
        .arg("--input")
        .arg(&input)
        .arg("--out-dir")
        .arg(tmp.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("token limit must be at least 1"));
}
