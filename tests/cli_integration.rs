// CLI integration tests for list/pull/rm/run flows and exit codes.
use std::path::Path;
use std::process::{Command, Output};

use pointseg::api::decode_mask_b64;
use serde_json::Value;

fn cmd(model_dir: &Path) -> Command {
    let exe = env!("CARGO_BIN_EXE_pointseg");
    let mut command = Command::new(exe);
    command
        .env_remove("POINTSEG_SOURCE")
        .env_remove("POINTSEG_MODEL_DIR")
        .env_remove("RUST_LOG")
        .args(["--dir", model_dir.to_str().unwrap(), "--quiet"]);
    command
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

fn stdout_json(output: &Output) -> Value {
    parse_json(std::str::from_utf8(&output.stdout).expect("utf8"))
}

fn stderr_json_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .filter(|line| line.starts_with('{'))
        .map(parse_json)
        .collect()
}

fn stderr_error(output: &Output) -> Value {
    stderr_json_lines(output)
        .into_iter()
        .find_map(|value| value.get("error").cloned())
        .expect("error envelope on stderr")
}

fn write_split_png(path: &Path, width: u32, height: u32) {
    image::RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            image::Rgb([230, 20, 20])
        } else {
            image::Rgb([20, 20, 230])
        }
    })
    .save(path)
    .expect("save png");
}

const PROMPT: &str = r#"{"points": [[3, 3]], "point_labels": [1]}"#;

#[test]
fn list_pull_rm_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model_dir = temp.path().join("models");

    let list = cmd(&model_dir).args(["list", "--json"]).output().expect("list");
    assert!(list.status.success());
    assert_eq!(stdout_json(&list)["models"].as_array().unwrap().len(), 0);

    let all = cmd(&model_dir)
        .args(["list", "--all", "--json"])
        .output()
        .expect("list all");
    assert!(all.status.success());
    let all_json = stdout_json(&all);
    let rows = all_json["models"].as_array().expect("models");
    let names = rows
        .iter()
        .map(|row| row["name"].as_str().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["patchproto:16", "patchproto:8", "regiongrow:4"]);
    for row in rows {
        assert_eq!(row["pulled"], false);
        assert!(row["size"].is_null());
        assert!(row["modified_at"].is_null());
        assert_eq!(row["id"].as_str().unwrap().len(), 12);
    }

    let pull = cmd(&model_dir)
        .args(["pull", "patchproto:16", "--json"])
        .output()
        .expect("pull");
    assert!(pull.status.success());
    let pulled = stdout_json(&pull);
    assert_eq!(pulled["name"], "patchproto:16");
    assert_eq!(pulled["outcome"], "fetched");
    assert_eq!(pulled["id"], rows[0]["id"]);
    assert!(pulled["path"].as_str().unwrap().ends_with("patchproto-16.weights"));
    let size = pulled["size"].as_u64().expect("size");
    assert_eq!(
        std::fs::metadata(model_dir.join("patchproto-16.weights"))
            .expect("artifact")
            .len(),
        size
    );

    let list = cmd(&model_dir).args(["list", "--json"]).output().expect("list");
    let list_json = stdout_json(&list);
    let rows = list_json["models"].as_array().expect("models");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["size"].as_u64(), Some(size));
    assert!(rows[0]["modified_at"].as_str().is_some());

    let rm = cmd(&model_dir)
        .args(["rm", "patchproto:16", "--json"])
        .output()
        .expect("rm");
    assert!(rm.status.success());
    assert_eq!(stdout_json(&rm)["removed"]["name"], "patchproto:16");
    assert!(!model_dir.join("patchproto-16.weights").exists());

    let rm_again = cmd(&model_dir)
        .args(["rm", "patchproto:16"])
        .output()
        .expect("rm again");
    assert_eq!(rm_again.status.code(), Some(6));
    assert!(rm_again.stdout.is_empty());
    assert_eq!(stderr_error(&rm_again)["kind"], "NotPulled");
}

#[test]
fn list_table_marks_unpulled_models() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model_dir = temp.path().join("models");
    let pull = cmd(&model_dir)
        .args(["pull", "regiongrow:4"])
        .output()
        .expect("pull");
    assert!(pull.status.success());

    let list = cmd(&model_dir).args(["list", "--all"]).output().expect("list");
    assert!(list.status.success());
    let text = String::from_utf8(list.stdout).expect("utf8");
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("NAME"));
    assert!(lines[1].starts_with("patchproto:16") && lines[1].contains("<not pulled>"));
    assert!(lines[3].starts_with("regiongrow:4") && lines[3].contains("ago"));
}

#[test]
fn repeated_pull_emits_notice_and_keeps_artifact() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model_dir = temp.path().join("models");
    for _ in 0..2 {
        let pull = cmd(&model_dir)
            .args(["pull", "patchproto:8", "--json"])
            .output()
            .expect("pull");
        assert!(pull.status.success());
    }
    let third = cmd(&model_dir)
        .args(["pull", "patchproto:8", "--json"])
        .output()
        .expect("pull");
    assert_eq!(stdout_json(&third)["outcome"], "already_present");
    let notices = stderr_json_lines(&third);
    assert!(
        notices
            .iter()
            .any(|value| value["notice"]["kind"] == "already_present")
    );
}

#[test]
fn run_prints_base64_png_without_newline() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model_dir = temp.path().join("models");
    let image_path = temp.path().join("input.png");
    write_split_png(&image_path, 40, 24);

    let run = cmd(&model_dir)
        .args([
            "run",
            "patchproto:8",
            "--image",
            image_path.to_str().unwrap(),
            "--prompt",
            PROMPT,
        ])
        .output()
        .expect("run");
    assert!(run.status.success(), "{}", String::from_utf8_lossy(&run.stderr));
    let stdout = String::from_utf8(run.stdout.clone()).expect("utf8");
    assert!(!stdout.ends_with('\n'));

    let mask = decode_mask_b64(&stdout).expect("mask");
    assert_eq!(mask.dimensions(), (40, 24));
    assert!(mask.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    assert_eq!(mask.get_pixel(0, 0).0[0], 255);
    assert_eq!(mask.get_pixel(39, 23).0[0], 0);

    let notices = stderr_json_lines(&run);
    assert!(notices.iter().any(|value| value["notice"]["kind"] == "auto_pull"));
    assert!(model_dir.join("patchproto-8.weights").exists());

    let again = cmd(&model_dir)
        .args([
            "run",
            "patchproto:8",
            "--image",
            image_path.to_str().unwrap(),
            "--prompt",
            PROMPT,
        ])
        .output()
        .expect("run again");
    assert!(again.status.success());
    assert_eq!(again.stdout, run.stdout);
    assert!(stderr_json_lines(&again).is_empty());
}

#[test]
fn unknown_model_fails_before_any_io() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model_dir = temp.path().join("models");
    let run = cmd(&model_dir)
        .args([
            "run",
            "nonexistent-model",
            "--image",
            "does-not-exist.png",
            "--prompt",
            PROMPT,
        ])
        .output()
        .expect("run");
    assert_eq!(run.status.code(), Some(3));
    assert!(run.stdout.is_empty());
    let error = stderr_error(&run);
    assert_eq!(error["kind"], "ModelNotFound");
    assert_eq!(error["model"], "nonexistent-model");
    assert!(error["hint"].as_str().unwrap().contains("list --all"));
    assert!(!model_dir.exists());

    let pull = cmd(&model_dir)
        .args(["pull", "nonexistent-model"])
        .output()
        .expect("pull");
    assert_eq!(pull.status.code(), Some(3));
}

#[test]
fn prompt_errors_win_over_image_errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model_dir = temp.path().join("models");
    for prompt in [
        r#"{"points": [[1, 2], [3, 4]], "point_labels": [1]}"#,
        r#"{"points": [], "point_labels": []}"#,
        r#"{"points": [[1, 2]]}"#,
        "not json",
    ] {
        let run = cmd(&model_dir)
            .args([
                "run",
                "regiongrow:4",
                "--image",
                "does-not-exist.png",
                "--prompt",
                prompt,
            ])
            .output()
            .expect("run");
        assert_eq!(run.status.code(), Some(4), "{prompt}");
        assert_eq!(stderr_error(&run)["kind"], "Validation");
    }
    assert!(!model_dir.join("regiongrow-4.weights").exists());
}

#[test]
fn missing_or_corrupt_image_is_io_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model_dir = temp.path().join("models");
    let corrupt = temp.path().join("corrupt.png");
    std::fs::write(&corrupt, b"not an image").expect("write");
    let missing = temp.path().join("missing.png");

    for image in [&missing, &corrupt] {
        let run = cmd(&model_dir)
            .args([
                "run",
                "regiongrow:4",
                "--image",
                image.to_str().unwrap(),
                "--prompt",
                PROMPT,
            ])
            .output()
            .expect("run");
        assert_eq!(run.status.code(), Some(7));
        assert!(run.stdout.is_empty());
        assert_eq!(stderr_error(&run)["kind"], "Io");
    }
}

#[test]
fn unreachable_source_is_retrieval_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model_dir = temp.path().join("models");
    let mirror = temp.path().join("empty-mirror");
    std::fs::create_dir_all(&mirror).expect("mirror");

    let pull = cmd(&model_dir)
        .args(["--source", mirror.to_str().unwrap(), "pull", "patchproto:16"])
        .output()
        .expect("pull");
    assert_eq!(pull.status.code(), Some(5));
    assert_eq!(stderr_error(&pull)["kind"], "Retrieval");
    assert!(!model_dir.join("patchproto-16.weights").exists());

    let bad_scheme = cmd(&model_dir)
        .args(["--source", "ftp://example.com/models", "list"])
        .output()
        .expect("list");
    assert_eq!(bad_scheme.status.code(), Some(2));
}

#[test]
fn usage_errors_are_json_with_hint() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = cmd(temp.path())
        .args(["list", "--bogus"])
        .output()
        .expect("list");
    assert_eq!(output.status.code(), Some(2));
    let error = stderr_error(&output);
    assert_eq!(error["kind"], "Usage");
    assert_eq!(error["hint"], "Try `pointseg list --help`.");
}

#[test]
fn version_emits_json() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = cmd(temp.path()).arg("version").output().expect("version");
    assert!(output.status.success());
    let value = stdout_json(&output);
    assert_eq!(value["name"], "pointseg");
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
}
