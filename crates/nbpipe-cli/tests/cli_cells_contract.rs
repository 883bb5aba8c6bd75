use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn nbpipe() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("nbpipe"));
    cmd.env_remove("NBPIPE_ENV_FILE").env_remove("RUST_LOG");
    cmd
}

const LAB_PAGE: &str = r#"<html><body><div class="jp-Notebook">
  <div class="jp-Cell jp-MarkdownCell"><div class="jp-RenderedMarkdown"><h1>Title</h1><p>Body</p></div></div>
  <div class="jp-Cell jp-CodeCell"><div class="jp-InputArea-editor"><div class="cm-content"><div class="cm-line">a = 1</div><div class="cm-line">a</div></div></div></div>
  <div class="jp-Cell jp-CodeCell"><div class="jp-InputArea-editor"><div class="cm-content"></div></div></div>
</div></body></html>"#;

#[test]
fn cells_lists_every_dom_cell_unfiltered() {
    let tmp = tempfile::tempdir().unwrap();
    let page = tmp.path().join("lab.html");
    std::fs::write(&page, LAB_PAGE).unwrap();

    let out = nbpipe()
        .args(["cells", "http://localhost:8888/lab", "--offline", "--html-file"])
        .arg(&page)
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["success"].as_bool(), Some(true));
    let cells = v["cells"].as_array().expect("cells");
    assert_eq!(cells.len(), 3);
    assert_eq!(cells[0]["cell_type"].as_str(), Some("markdown"));
    assert_eq!(cells[0]["source"].as_str(), Some("Title\nBody"));
    assert_eq!(cells[1]["cell_type"].as_str(), Some("code"));
    assert_eq!(cells[1]["source"].as_str(), Some("a = 1\na"));
    assert_eq!(cells[1]["isEmpty"].as_bool(), Some(false));
    assert_eq!(cells[2]["isEmpty"].as_bool(), Some(true));
}

#[test]
fn cells_text_output_is_one_line_per_cell() {
    let tmp = tempfile::tempdir().unwrap();
    let page = tmp.path().join("lab.html");
    std::fs::write(&page, LAB_PAGE).unwrap();

    nbpipe()
        .args(["cells", "http://localhost:8888/lab", "--offline", "--output", "text"])
        .arg("--html-file")
        .arg(&page)
        .assert()
        .success()
        .stdout(predicate::str::contains("0\tmarkdown\tTitle"))
        .stdout(predicate::str::contains("1\tcode\ta = 1"))
        .stdout(predicate::str::contains("2\tcode (empty)\t"));
}

#[test]
fn cells_reports_missing_notebook() {
    let tmp = tempfile::tempdir().unwrap();
    let page = tmp.path().join("blank.html");
    std::fs::write(&page, "<html></html>").unwrap();

    let out = nbpipe()
        .args(["cells", "https://example.com/", "--offline", "--html-file"])
        .arg(&page)
        .output()
        .unwrap();
    assert!(!out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["success"].as_bool(), Some(false));
    assert!(v.get("cells").is_none());
    assert_eq!(
        v["error"].as_str(),
        Some("No notebook content found on this page")
    );
}
