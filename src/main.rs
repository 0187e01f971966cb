//! Purpose: `pointseg` CLI entry point.
//! Role: Binary crate root; parses args, installs logging, dispatches commands.
//! Invariants: Stdout carries only command payloads (tables, JSON, base64 masks).
//! Invariants: Diagnostics, notices and errors go to stderr; errors are JSON when stderr
//!             is not a terminal.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod model_list_json;
mod notice;

use model_list_json::{model_row_json, pull_report_json};
use notice::{Notice, notice_json};
use pointseg::api::{
    ArtifactSource, Error, ErrorKind, LocalModels, ModelRow, PullReport, to_exit_code,
};
use pointseg::model_paths::default_model_dir;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint(clap_error_hint(&err)),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    init_tracing(cli.log_level(), color_mode);

    let model_dir = cli.dir.unwrap_or_else(default_model_dir);
    let source = match cli.source.as_deref() {
        Some(raw) => ArtifactSource::parse(raw),
        None => ArtifactSource::from_env(),
    }
    .map_err(|err| (err, color_mode))?;
    tracing::debug!(model_dir = %model_dir.display(), source = %source, "configuration resolved");

    let models = LocalModels::new()
        .with_model_dir(model_dir)
        .with_source(source);

    command_dispatch::dispatch_command(cli.command, &models, color_mode)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("---help") => OsString::from("--help"),
            Some("---version") => OsString::from("--version"),
            _ => arg,
        })
        .collect()
}

#[derive(Parser)]
#[command(
    name = "pointseg",
    version,
    about = "Point-prompted image segmentation with locally cached models",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Models are pulled once into a local directory, then run offline.

Mental model:
  - `list` shows models (pulled, or all with --all)
  - `pull` / `rm` manage the local copy
  - `run` segments an image from a few labeled points
"#,
    after_help = r#"EXAMPLES
  $ pointseg list --all
  $ pointseg pull patchproto:16
  $ pointseg run patchproto:16 --image cat.png --prompt '{"points": [[120, 80]], "point_labels": [1]}' > mask.b64

LEARN MORE
  $ pointseg <command> --help"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Model directory (default: $POINTSEG_MODEL_DIR or ~/.pointseg/models)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Artifact source: bundled | <dir> | file:///dir | http(s)://host/dir (default: $POINTSEG_SOURCE or bundled)"
    )]
    source: Option<String>,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics and pretty JSON output: auto|always|never"
    )]
    color: ColorMode,
    #[arg(short, long, global = true, help = "Log pipeline stages and timings to stderr")]
    verbose: bool,
    #[arg(
        short,
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Only log warnings and errors"
    )]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Explicit flags win over `RUST_LOG`; `None` defers to it.
    fn log_level(&self) -> Option<&'static str> {
        if self.verbose {
            Some("warn,pointseg=debug")
        } else if self.quiet {
            Some("warn")
        } else {
            None
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "List models",
        long_about = r#"List models known to this build.

Without --all only pulled models are shown. Sizes and times are reported only for
pulled models; the ID is always available."#,
        after_help = r#"EXAMPLES
  $ pointseg list
  $ pointseg list --all
  $ pointseg list --all --json"#
    )]
    List {
        #[arg(short = 'a', long, help = "Include models that have not been pulled")]
        all: bool,
        #[arg(long, help = "Emit JSON instead of a table")]
        json: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Download a model into the model directory",
        long_about = r#"Fetch a model artifact, verify its SHA-256 digest and install it atomically.

A copy that is already present and valid is kept; a corrupt copy is replaced."#,
        after_help = r#"EXAMPLES
  $ pointseg pull patchproto:16
  $ pointseg pull regiongrow:4 --source https://models.example.com/pointseg
  $ pointseg pull patchproto:8 --json

NOTES
  - Mirrors serve `<slug>.weights`, e.g. patchproto-16.weights"#
    )]
    Pull {
        #[arg(help = "Model name (see `pointseg list --all`)")]
        model: String,
        #[arg(long, help = "Emit JSON instead of a table")]
        json: bool,
    },
    #[command(
        visible_alias = "remove",
        arg_required_else_help = true,
        about = "Remove a pulled model",
        after_help = r#"EXAMPLES
  $ pointseg rm patchproto:16"#
    )]
    Rm {
        #[arg(help = "Model name")]
        model: String,
        #[arg(long, help = "Emit JSON confirmation")]
        json: bool,
    },
    #[command(
        arg_required_else_help = true,
        about = "Segment an image from point prompts",
        long_about = r#"Segment an image with a model and a point prompt.

Prints the mask as a base64-encoded 8-bit grayscale PNG (255 = object, 0 = background)
to stdout, with no trailing newline. A model that is not pulled yet is pulled first."#,
        after_help = r#"EXAMPLES
  $ pointseg run patchproto:16 --image cat.png --prompt '{"points": [[120, 80]], "point_labels": [1]}'
  $ pointseg run regiongrow:4 --image cat.png \
      --prompt '{"points": [[120, 80], [10, 10]], "point_labels": [1, 0]}' | base64 -d > mask.png

NOTES
  - Label > 0 marks the object, label <= 0 marks background
  - Points outside the image are clamped to the nearest edge"#
    )]
    Run {
        #[arg(help = "Model name")]
        model: String,
        #[arg(long, help = "Input image (PNG, JPEG, BMP, GIF, TIFF, WebP)", value_hint = ValueHint::FilePath)]
        image: PathBuf,
        #[arg(long, help = r#"Prompt JSON: {"points": [[x, y], ...], "point_labels": [1|0, ...]}"#)]
        prompt: String,
    },
    #[command(
        about = "Print version info as JSON",
        long_about = r#"Emit version info as JSON (stable, machine-readable)."#,
        after_help = r#"EXAMPLES
  $ pointseg version"#
    )]
    Version,
    #[command(
        arg_required_else_help = true,
        about = "Generate shell completions",
        long_about = r#"Generate shell completion scripts.

Prints a completion script for the given shell to stdout."#,
        after_help = r#"EXAMPLES
  $ pointseg completion bash > ~/.local/share/bash-completion/completions/pointseg
  $ pointseg completion zsh > ~/.zfunc/_pointseg
  $ pointseg completion fish > ~/.config/fish/completions/pointseg.fish"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

const DEFAULT_LOG_FILTER: &str = "warn,pointseg=info";

fn init_tracing(level: Option<&str>, color_mode: ColorMode) {
    let env_filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(color_mode.use_color(io::stderr().is_terminal()))
        .with_writer(io::stderr)
        .try_init();
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() == ErrorKind::Internal && err.hint().is_none() {
        return err.with_hint("This is a bug in pointseg; rerun with --verbose and report the output.");
    }
    err
}

fn emit_version_output(color_mode: ColorMode) {
    if io::stdout().is_terminal() {
        println!("pointseg {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(
            json!({
                "name": "pointseg",
                "version": env!("CARGO_PKG_VERSION"),
            }),
            color_mode,
        );
    }
}

fn emit_model_list_table(rows: &[ModelRow]) {
    let now = SystemTime::now();
    let table_rows = rows
        .iter()
        .map(|row| {
            let size = row.size.map(format_bytes).unwrap_or_else(|| "-".to_string());
            let modified = match row.modified_at {
                Some(modified_at) => format_relative_time(Some(
                    now.duration_since(modified_at)
                        .map(|age| age.as_millis() as u64)
                        .unwrap_or(0),
                )),
                None => "<not pulled>".to_string(),
            };
            vec![row.name.to_string(), row.id.clone(), size, modified]
        })
        .collect::<Vec<_>>();
    println!("{}", render_table(&["NAME", "ID", "SIZE", "MODIFIED"], &table_rows));
}

fn emit_pull_receipt(report: &PullReport, json: bool, color_mode: ColorMode) {
    if json {
        emit_json(pull_report_json(report), color_mode);
        return;
    }
    let row = ModelRow {
        name: report.name,
        id: report.id.clone(),
        size: Some(report.info.size),
        modified_at: Some(report.info.modified_at),
    };
    emit_model_list_table(&[row]);
}

fn format_bytes(value: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;
    if value < KIB {
        return format!("{value}B");
    }
    let (unit, suffix) = if value >= GIB {
        (GIB, "G")
    } else if value >= MIB {
        (MIB, "M")
    } else {
        (KIB, "K")
    };
    if value.is_multiple_of(unit) {
        return format!("{}{}", value / unit, suffix);
    }
    format!("{:.1}{}", (value as f64) / (unit as f64), suffix)
}

fn format_relative_time(age_ms: Option<u64>) -> String {
    let Some(age_ms) = age_ms else {
        return "-".to_string();
    };
    let seconds = (age_ms / 1000).max(1);
    if seconds < 60 {
        return format!("{seconds}s ago");
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    let days = hours / 24;
    if days < 7 {
        return format!("{days}d ago");
    }
    format!("{}w ago", days / 7)
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();
    let cleaned_rows = rows
        .iter()
        .map(|row| {
            widths
                .iter_mut()
                .enumerate()
                .map(|(idx, width)| {
                    let cell = row
                        .get(idx)
                        .map(|value| value.replace('\n', "\\n").replace('\r', "\\r"))
                        .unwrap_or_default();
                    *width = (*width).max(cell.chars().count());
                    cell
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let header_cells = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    std::iter::once(&header_cells)
        .chain(cleaned_rows.iter())
        .map(|cells| format_table_line(cells, &widths))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_table_line(cells: &[String], widths: &[usize]) -> String {
    let padded = widths
        .iter()
        .enumerate()
        .map(|(idx, width)| {
            let cell = cells.get(idx).map(String::as_str).unwrap_or("");
            format!("{cell:<width$}")
        })
        .collect::<Vec<_>>();
    padded.join("  ").trim_end().to_string()
}

fn emit_json(value: Value, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let pretty = is_tty || color_mode.use_color(is_tty);
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        eprintln!("{label} {} (model: {})", notice.message, notice.model);
        return;
    }

    let json = serde_json::to_string(&notice_json(notice)).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::ModelNotFound => "model not found",
        ErrorKind::Validation => "invalid prompt",
        ErrorKind::Retrieval => "failed to retrieve model",
        ErrorKind::NotPulled => "model is not pulled",
        ErrorKind::Io => "i/o error",
        ErrorKind::Load => "failed to load model",
        ErrorKind::Inference => "inference failed",
        ErrorKind::Busy => "resource is busy",
        ErrorKind::Permission => "permission denied",
    }
    .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(model) = err.model() {
        inner.insert("model".to_string(), json!(model));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }
    json!({ "error": Value::Object(inner) })
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];
    let extra = [
        ("hint:", err.hint().map(str::to_string)),
        ("model:", err.model().map(str::to_string)),
        ("path:", err.path().map(display_path)),
        ("caused by:", error_causes(err).into_iter().next()),
    ];
    for (label, value) in extra {
        if let Some(value) = value {
            lines.push(format!(
                "{} {value}",
                colorize_label(label, use_color, AnsiColor::Yellow)
            ));
        }
    }
    lines.join("\n")
}

/// Shows paths under `$HOME` as `~/...`.
fn display_path(path: &Path) -> String {
    if let Some(home) = std::env::var_os("HOME").filter(|home| !home.is_empty()) {
        if let Ok(rest) = path.strip_prefix(&home) {
            return Path::new("~").join(rest).display().to_string();
        }
    }
    path.display().to_string()
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let Some(line) = rendered.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return "invalid arguments".to_string();
    };
    line.strip_prefix("error:").unwrap_or(line).trim().to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);
    let Some(usage) = usage else {
        return "Try `pointseg --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "pointseg") else {
        return "Try `pointseg --help`.".to_string();
    };
    let parts = tokens[pos + 1..]
        .iter()
        .take_while(|token| !(token.starts_with('-') || token.starts_with('<') || token.starts_with('[')))
        .copied()
        .collect::<Vec<_>>();
    if parts.is_empty() {
        return "Try `pointseg --help`.".to_string();
    }
    if parts.as_slice() == ["run"] && rendered.contains("--prompt") {
        return r#"Provide a prompt, for example: `pointseg run patchproto:16 --image cat.png --prompt '{"points": [[120, 80]], "point_labels": [1]}'`."#
            .to_string();
    }
    format!("Try `pointseg {} --help`.", parts.join(" "))
}
