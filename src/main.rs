//! Purpose: `hostbridge` CLI entry point.
//! Role: Binary crate root; parses args, configures the bridge, emits JSON on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Diagnostics and tracing output never share stdout with replies.
//! Invariants: Process exit code is derived from `to_exit_code`.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value as Json, json};
use tracing_subscriber::EnvFilter;

use hostbridge::bridge::BridgeConfig;
use hostbridge::core::error::{Error, ErrorKind, to_exit_code};
use hostbridge::paths::{DesktopDirs, FixedDirs, PlatformDirs};

mod command_dispatch;

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
    let cli = match Cli::try_parse() {
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

    init_tracing(cli.verbose);
    let color_mode = cli.color;
    let config = bridge_config(&cli);

    command_dispatch::dispatch_command(cli.command, config, color_mode)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "hostbridge",
    version,
    about = "Host side of the `methods` call channel",
    long_about = None,
    after_help = r#"EXAMPLES
  $ hostbridge call dataRoot
  $ hostbridge call setKeepScreenOn --arg-json true
  $ echo '{"id":1,"method":"documentRoot"}' | hostbridge serve
  $ hostbridge methods"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Standard data root (default: per-user application data directory)",
        value_hint = ValueHint::DirPath
    )]
    data_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Standard documents root (default: the user's documents directory)",
        value_hint = ValueHint::DirPath
    )]
    documents_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Override marker file (default: <data root>/data.local)",
        value_hint = ValueHint::FilePath
    )]
    marker: Option<PathBuf>,
    #[arg(long, global = true, help = "Start with the keep-screen-on flag set")]
    keep_screen_on: bool,
    #[arg(
        short,
        long,
        global = true,
        help = "Log at debug level on stderr (RUST_LOG takes precedence)"
    )]
    verbose: bool,
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
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
        about = "Answer JSON-lines requests from stdin on stdout",
        long_about = r#"Serve the `methods` channel over stdio.

Each input line is one request: {"id": ..., "method": "...", "arguments": ...}.
Each output line is one response carrying the same id. Responses may arrive out of
order when calls run on the worker. The process exits after stdin closes and every
pending call has answered."#
    )]
    Serve,
    #[command(
        about = "Invoke one method and print its reply",
        after_help = r#"EXAMPLES
  $ hostbridge call dataRoot
  $ hostbridge call getKeepScreenOn --keep-screen-on
  $ hostbridge call setKeepScreenOn --arg-json false"#
    )]
    Call {
        #[arg(help = "Method name, e.g. dataRoot")]
        method: String,
        #[arg(long = "arg-json", help = "Call argument as a JSON value")]
        arg_json: Option<String>,
        #[arg(
            long,
            default_value_t = 5000,
            help = "Milliseconds to wait for the reply"
        )]
        timeout_ms: u64,
    },
    #[command(about = "List registered methods and where they run")]
    Methods,
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version info as JSON")]
    Version,
}

fn bridge_config(cli: &Cli) -> BridgeConfig {
    let mut config = BridgeConfig::new().with_keep_screen_on(cli.keep_screen_on);
    if cli.data_dir.is_some() || cli.documents_dir.is_some() {
        let data = cli
            .data_dir
            .clone()
            .unwrap_or_else(|| DesktopDirs.standard_data_root());
        let documents = cli
            .documents_dir
            .clone()
            .unwrap_or_else(|| DesktopDirs.standard_documents_root());
        config = config.with_platform(Arc::new(FixedDirs::new(data, documents)));
    }
    if let Some(marker) = &cli.marker {
        config = config.with_marker_path(marker);
    }
    config
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Io => err.with_hint("I/O error. Check that stdin and stdout are open."),
        ErrorKind::Busy => {
            err.with_hint("The bridge did not answer in time. Retry with a larger --timeout-ms.")
        }
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and --verbose if it persists.",
    )
}

fn emit_version_output(color_mode: ColorMode) {
    if io::stdout().is_terminal() {
        println!("hostbridge {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(
            json!({
                "name": "hostbridge",
                "version": env!("CARGO_PKG_VERSION"),
            }),
            color_mode,
        );
    }
}

fn emit_json(value: Json, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let pretty = is_tty || color_mode.use_color(is_tty);
    let encoded = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    let json = encoded.unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
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

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::InvalidArgument => "invalid argument".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Busy => "bridge is busy".to_string(),
        ErrorKind::Closed => "bridge is shut down".to_string(),
    }
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

fn error_json(err: &Error) -> Json {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Json::Object(inner));
    Json::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let Some(usage) = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
    else {
        return "Try `hostbridge --help`.".to_string();
    };

    let subcommand = usage
        .split_whitespace()
        .skip_while(|token| *token != "hostbridge")
        .skip(1)
        .find(|token| !token.starts_with(['-', '[', '<']));

    match subcommand {
        Some(name) => format!("Try `hostbridge {name} --help`."),
        None => "Try `hostbridge --help`.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_json_carries_kind_hint_and_causes() {
        let err = Error::new(ErrorKind::Io)
            .with_message("failed to write reply")
            .with_hint("check stdout")
            .with_source(io::Error::other("broken pipe"));
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "Io");
        assert_eq!(value["error"]["message"], "failed to write reply");
        assert_eq!(value["error"]["hint"], "check stdout");
        assert_eq!(value["error"]["causes"], json!(["broken pipe"]));
    }

    #[test]
    fn error_message_falls_back_to_kind() {
        assert_eq!(error_message(&Error::new(ErrorKind::Closed)), "bridge is shut down");
    }

    #[test]
    fn error_text_without_color_is_plain() {
        let err = Error::new(ErrorKind::Usage)
            .with_message("bad flag")
            .with_hint("Try `hostbridge --help`.");
        assert_eq!(
            error_text(&err, false),
            "error: bad flag\nhint: Try `hostbridge --help`."
        );
    }

    #[test]
    fn data_dir_flag_pins_platform_roots() {
        let cli = Cli::try_parse_from([
            "hostbridge",
            "--data-dir",
            "/tmp/hb-data",
            "--documents-dir",
            "/tmp/hb-docs",
            "call",
            "dataRoot",
        ])
        .expect("parse");
        let config = bridge_config(&cli);
        assert_eq!(
            config.resolver().marker_path(),
            PathBuf::from("/tmp/hb-data/data.local")
        );
    }

    #[test]
    fn add_internal_hint_keeps_existing_hint() {
        let err = Error::new(ErrorKind::Internal).with_hint("already here");
        assert_eq!(add_internal_hint(err).hint(), Some("already here"));
    }
}
