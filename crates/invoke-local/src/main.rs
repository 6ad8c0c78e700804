//! invoke-local - run a compiled function handler on the local machine.
//!
//! Reads a JSON event from stdin, loads the handler artifact, invokes the
//! handler method and prints its return value as one line on stdout.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind as ClapErrorKind;
use clap::{Parser, ValueEnum};
use invoke_local_config::{
    ConfigError, HandlerSection, InvokeConfig, RuntimeSection, SelectionMode,
};
use invoke_local_runtime::InvokeError;
use tracing::error;

mod invoke;

/// Exit code for configuration and usage problems; invocation failures use
/// their `ErrorKind` code.
const CONFIG_EXIT_CODE: u8 = 1;

/// Exit code for failures outside the invocation taxonomy.
const INTERNAL_EXIT_CODE: u8 = 70;

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Invoke a WebAssembly function handler locally with an event from stdin
#[derive(Parser, Debug)]
#[command(name = "invoke-local")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging on stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Path to the compiled handler artifact
    #[arg(long, env = "INVOKE_ARTIFACT_PATH")]
    pub artifact: Option<PathBuf>,

    /// Fully-qualified handler type name
    #[arg(long = "class", env = "INVOKE_HANDLER_CLASS")]
    pub class_name: Option<String>,

    /// Invoke the declared method with this name
    #[arg(long, env = "INVOKE_HANDLER_METHOD")]
    pub method: Option<String>,

    /// Invoke the declared method at this enumeration index (beats --method)
    #[arg(long)]
    pub position: Option<usize>,

    /// Require the type to declare exactly one method and invoke it (beats --position and --method)
    #[arg(long)]
    pub sole: bool,

    /// Config file to use instead of the discovered ones
    #[arg(long, env = "INVOKE_LOCAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Read the event from this file instead of stdin
    #[arg(long)]
    pub event_file: Option<PathBuf>,

    /// Fuel budget for the handler (unbounded when unset)
    #[arg(long)]
    pub max_fuel: Option<u64>,

    /// Print the type's declared methods in enumeration order and exit
    #[arg(long)]
    pub list_methods: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Cli {
    /// Config layer built from flags and environment variables.
    ///
    /// `--sole` beats `--position`, which beats `--method`. `--method` may come
    /// from `INVOKE_HANDLER_METHOD`, and a selection flag typed on the command
    /// line must still win over it.
    fn overrides(&self) -> InvokeConfig {
        let selection = if self.sole {
            Some(SelectionMode::Sole)
        } else if self.position.is_some() {
            Some(SelectionMode::Position)
        } else if self.method.is_some() {
            Some(SelectionMode::Name)
        } else {
            None
        };

        InvokeConfig {
            handler: Some(HandlerSection {
                artifact_path: self.artifact.clone(),
                class_name: self.class_name.clone(),
                selection,
                position: self.position,
                method: self.method.clone(),
            }),
            runtime: Some(RuntimeSection {
                max_fuel: self.max_fuel,
                ..Default::default()
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return usage_exit(&err),
    };
    init_tracing(&cli);

    match invoke::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = exit_code(&err);
            error!(exit_code = code, "Invocation failed");
            eprintln!("Error: {err:?}");
            ExitCode::from(code)
        }
    }
}

/// Logs go to stderr; stdout carries only the handler result.
fn init_tracing(cli: &Cli) {
    let default_filter = if cli.verbose {
        "invoke_local=debug,invoke_local_runtime=debug,invoke_local_config=debug,warn"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    match cli.log_format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Help and version succeed; any other parse error is a configuration failure.
fn usage_exit(err: &clap::Error) -> ExitCode {
    // Nothing useful is left to report if stderr itself is gone.
    let _ = err.print();
    ExitCode::from(usage_exit_code(err.kind()))
}

fn usage_exit_code(kind: ClapErrorKind) -> u8 {
    match kind {
        ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => 0,
        _ => CONFIG_EXIT_CODE,
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(invoke_err) = err.downcast_ref::<InvokeError>() {
        return invoke_err.kind().exit_code();
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return CONFIG_EXIT_CODE;
    }
    INTERNAL_EXIT_CODE
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoke_local_config::Selection;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("invoke-local").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_selection() {
        let cli = parse(&["--artifact", "h.wasm", "--class", "H", "--method", "run"]);
        let resolved = cli.overrides().resolve_handler().unwrap();
        assert_eq!(resolved.selection, Selection::Name("run".into()));

        let cli = parse(&["--artifact", "h.wasm", "--class", "H", "--position", "0"]);
        let resolved = cli.overrides().resolve_handler().unwrap();
        assert_eq!(resolved.selection, Selection::Position(0));

        let cli = parse(&["--artifact", "h.wasm", "--class", "H", "--sole"]);
        let resolved = cli.overrides().resolve_handler().unwrap();
        assert_eq!(resolved.selection, Selection::Sole);
    }

    #[test]
    fn test_selection_flag_precedence() {
        let cli = parse(&["--artifact", "h.wasm", "--class", "H", "--sole", "--position", "2"]);
        let resolved = cli.overrides().resolve_handler().unwrap();
        assert_eq!(resolved.selection, Selection::Sole);

        let cli = parse(&[
            "--artifact", "h.wasm", "--class", "H", "--method", "run", "--position", "2",
        ]);
        let resolved = cli.overrides().resolve_handler().unwrap();
        assert_eq!(resolved.selection, Selection::Position(2));

        let cli = parse(&["--artifact", "h.wasm", "--class", "H", "--method", "run", "--sole"]);
        let resolved = cli.overrides().resolve_handler().unwrap();
        assert_eq!(resolved.selection, Selection::Sole);
    }

    #[test]
    fn test_usage_exit_codes() {
        let err = Cli::try_parse_from(["invoke-local", "--bogus-flag"]).unwrap_err();
        assert_eq!(usage_exit_code(err.kind()), CONFIG_EXIT_CODE);

        let err = Cli::try_parse_from(["invoke-local", "--position", "not-a-number"]).unwrap_err();
        assert_eq!(usage_exit_code(err.kind()), CONFIG_EXIT_CODE);

        let err = Cli::try_parse_from(["invoke-local", "--help"]).unwrap_err();
        assert_eq!(usage_exit_code(err.kind()), 0);

        let err = Cli::try_parse_from(["invoke-local", "--version"]).unwrap_err();
        assert_eq!(usage_exit_code(err.kind()), 0);
    }

    #[test]
    fn test_exit_code_mapping() {
        let err = anyhow::Error::new(InvokeError::ArtifactNotFound {
            path: PathBuf::from("missing.wasm"),
        });
        assert_eq!(exit_code(&err), 3);

        let err = anyhow::Error::new(ConfigError::MissingField {
            field: "handler.class_name".into(),
            hint: "--class".into(),
        });
        assert_eq!(exit_code(&err), CONFIG_EXIT_CODE);

        let err = anyhow::Error::new(InvokeError::WriteOutput(std::io::Error::other(
            "No space left on device",
        )));
        assert_eq!(exit_code(&err), 6);
        assert_ne!(exit_code(&err), CONFIG_EXIT_CODE);

        let err = anyhow::anyhow!("something unexpected");
        assert_eq!(exit_code(&err), INTERNAL_EXIT_CODE);
    }
}
