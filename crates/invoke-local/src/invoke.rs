//! The invocation sequence: settings, event, load, instantiate, select, invoke, print.

use std::io::Write;

use anyhow::Result;
use invoke_local_config::{InvokeConfig, ResolvedHandler, Selection, load_config, load_config_file};
use invoke_local_runtime::{
    Context, DEFAULT_MEMORY_LIMIT_MB, HostConfig, InvokeError, MethodSelector, instantiate, invoke,
    load_handler_type, parse_event, read_event_file, read_input, render, select_handler_method,
};
use tracing::{debug, info, warn};

use crate::Cli;

/// Run one invocation end to end.
pub fn run(cli: &Cli) -> Result<()> {
    let config = load_settings(cli)?;
    let handler = config.resolve_handler()?;
    let runtime = config.runtime();
    let host = HostConfig {
        max_fuel: runtime.max_fuel,
        stdout_limit_bytes: runtime
            .stdout_limit_bytes
            .unwrap_or(HostConfig::default().stdout_limit_bytes),
    };

    if cli.list_methods {
        return list_methods(&handler, &host);
    }

    let input = match &cli.event_file {
        Some(path) => read_event_file(path)?,
        None => read_input()?,
    };
    let event = parse_event(&input)?;
    debug!(keys = event.len(), "Parsed event");

    let handler_type = load_handler_type(&handler.artifact_path, &handler.class_name, &host)?;
    info!(
        artifact = %handler_type.artifact().display(),
        type_name = %handler_type.name(),
        methods = handler_type.methods().len(),
        "Loaded handler"
    );
    let mut instance = instantiate(&handler_type)?;
    let method = select_handler_method(&handler_type, &selector(&handler.selection))?;

    let context = Context::new(handler_type.name())
        .with_memory_limit(runtime.memory_limit_in_mb.unwrap_or(DEFAULT_MEMORY_LIMIT_MB));
    let output = invoke(&mut instance, method, &event, &context)?;
    info!(
        type_name = %instance.type_name(),
        method = %method.name,
        request_id = %context.request_id,
        "Handler returned"
    );

    write_result(&render(&output))?;
    Ok(())
}

/// Discovered config files (or `--config`), with flags and env on top.
fn load_settings(cli: &Cli) -> Result<InvokeConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => {
            let loaded = load_config(None)?;
            for warning in &loaded.warnings {
                warn!("{warning}");
            }
            debug!(sources = ?loaded.loaded_from(), "Loaded config");
            loaded.config
        }
    };
    config.merge(cli.overrides());
    Ok(config)
}

fn selector(selection: &Selection) -> MethodSelector {
    match selection {
        Selection::Position(index) => MethodSelector::Position(*index),
        Selection::Name(name) => MethodSelector::Name(name.clone()),
        Selection::Sole => MethodSelector::Sole,
    }
}

/// Print `index<TAB>name<TAB>signature` per declared method.
fn list_methods(handler: &ResolvedHandler, host: &HostConfig) -> Result<()> {
    let handler_type = load_handler_type(&handler.artifact_path, &handler.class_name, host)?;
    let listing: Vec<String> = handler_type
        .methods()
        .iter()
        .map(|m| format!("{}\t{}\t{}", m.index, m.name, m.signature))
        .collect();
    write_result(&listing.join("\n"))?;
    Ok(())
}

/// Write `text` plus a newline to stdout, flushing so write errors surface here.
fn write_result(text: &str) -> Result<(), InvokeError> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{text}")
        .and_then(|()| stdout.flush())
        .map_err(InvokeError::WriteOutput)
}
