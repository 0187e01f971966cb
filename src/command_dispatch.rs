//! Purpose: Hold top-level CLI command dispatch for `pointseg`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and presentation helpers.
//! Invariants: Each command writes its payload to stdout only after the operation succeeded.
//! Invariants: `run` writes the base64 mask with no trailing newline.

use std::io::Write;

use super::*;
use pointseg::api::{Model as _, PullOutcome};

pub(super) fn dispatch_command(
    command: Command,
    models: &LocalModels,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "pointseg", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output(color_mode);
            Ok(RunOutcome::ok())
        }
        Command::List { all, json } => {
            let rows = models.list(all)?;
            if json {
                let values = rows.iter().map(model_row_json).collect::<Vec<_>>();
                emit_json(
                    json!({
                        "model_dir": models.model_dir().display().to_string(),
                        "models": values,
                    }),
                    color_mode,
                );
            } else {
                emit_model_list_table(&rows);
            }
            Ok(RunOutcome::ok())
        }
        Command::Pull { model, json } => {
            let report = models.pull(&model)?;
            match report.outcome {
                PullOutcome::AlreadyPresent => emit_notice(
                    &Notice::new(
                        "already_present",
                        "pull",
                        report.name,
                        "model already pulled and verified",
                    )
                    .with_detail("path", report.path.display().to_string()),
                    color_mode,
                ),
                PullOutcome::Replaced => emit_notice(
                    &Notice::new(
                        "replaced",
                        "pull",
                        report.name,
                        "cached copy failed verification and was replaced",
                    ),
                    color_mode,
                ),
                PullOutcome::Fetched => {}
            }
            emit_pull_receipt(&report, json, color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Rm { model, json } => {
            let removed = models.remove(&model)?;
            if json {
                emit_json(
                    json!({ "removed": { "name": removed.name(), "id": removed.id() } }),
                    color_mode,
                );
            } else {
                println!("Removed {}", removed.name());
            }
            Ok(RunOutcome::ok())
        }
        Command::Run {
            model,
            image,
            prompt,
        } => {
            let segmentation = models.run(&model, &image, &prompt)?;
            if segmentation.auto_pulled {
                emit_notice(
                    &Notice::new("auto_pull", "run", &model, "model was not pulled; pulled it first")
                        .with_detail("source", models.source().to_string()),
                    color_mode,
                );
            }
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(segmentation.mask_b64.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write mask to stdout")
                        .with_source(err)
                })?;
            Ok(RunOutcome::ok())
        }
    }
}
