// Multi-process lock smoke test for concurrent pulls into one model directory.
use std::process::{Command, Stdio};

use pointseg::api::{LocalModels, Model};
use pointseg::core::artifact::ArtifactStore;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_pointseg");
    let mut command = Command::new(exe);
    command.env_remove("POINTSEG_SOURCE").env_remove("RUST_LOG");
    command
}

#[test]
fn concurrent_pull_is_serialized() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model_dir = temp.path().join("models");

    let workers = 8;
    let mut children = Vec::new();
    for _ in 0..workers {
        let child = cmd()
            .args(["--dir", model_dir.to_str().unwrap(), "pull", "patchproto:8"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn");
        children.push(child);
    }

    for mut child in children {
        let status = child.wait().expect("wait");
        assert!(status.success());
    }

    let models = LocalModels::new().with_model_dir(&model_dir);
    let model = models.resolve("patchproto:8").expect("resolve");
    let store = ArtifactStore::new(&model_dir);
    let bytes = store.read(model).expect("verified artifact");
    assert_eq!(bytes, model.bundled_artifact());

    let leftovers = std::fs::read_dir(&model_dir)
        .expect("read dir")
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().contains(".partial-"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn concurrent_pull_and_remove_leave_consistent_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    let model_dir = temp.path().join("models");
    let dir_arg = model_dir.to_str().unwrap().to_string();

    let seed = cmd()
        .args(["--dir", &dir_arg, "pull", "regiongrow:4"])
        .output()
        .expect("seed pull");
    assert!(seed.status.success());

    let mut children = Vec::new();
    for i in 0..6 {
        let action = if i % 2 == 0 { "pull" } else { "rm" };
        let child = cmd()
            .args(["--dir", &dir_arg, action, "regiongrow:4"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn");
        children.push((action, child));
    }

    for (action, mut child) in children {
        let code = child.wait().expect("wait").code();
        match action {
            "pull" => assert_eq!(code, Some(0)),
            _ => assert!(code == Some(0) || code == Some(6), "rm exited {code:?}"),
        }
    }

    let store = ArtifactStore::new(&model_dir);
    let models = LocalModels::new().with_model_dir(&model_dir);
    let model = models.resolve("regiongrow:4").expect("resolve");
    if store.info(model).expect("info").is_some() {
        store.read(model).expect("verified artifact");
    }
}
