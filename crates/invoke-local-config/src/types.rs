//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Enumeration index selected when `[handler] position` is unset.
pub const DEFAULT_POSITION: usize = 1;

/// Root configuration, one per file layer.
///
/// Every field is optional so layers can be merged field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokeConfig {
    /// Which handler to invoke.
    pub handler: Option<HandlerSection>,
    /// Host limits.
    pub runtime: Option<RuntimeSection>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// How the handler method is chosen among the type's declared methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// By enumeration index (`position`).
    Position,
    /// By exact method name (`method`).
    Name,
    /// The type's only declared method.
    Sole,
}

/// Handler selection.
///
/// ```toml
/// [handler]
/// artifact_path = "target/wasm32-wasip1/release/handler.wasm"
/// class_name = "com.serverless.Handler"
/// selection = "position"
/// position = 1
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerSection {
    /// Path to the compiled handler artifact.
    pub artifact_path: Option<PathBuf>,
    /// Fully-qualified handler type name.
    pub class_name: Option<String>,
    /// Selection mode. Inferred as `name` when only `method` is set.
    pub selection: Option<SelectionMode>,
    /// Enumeration index for `position` selection.
    pub position: Option<usize>,
    /// Method name for `name` selection.
    pub method: Option<String>,
}

impl HandlerSection {
    fn merge(&mut self, other: HandlerSection) {
        if other.artifact_path.is_some() {
            self.artifact_path = other.artifact_path;
        }
        if other.class_name.is_some() {
            self.class_name = other.class_name;
        }
        if other.selection.is_some() {
            self.selection = other.selection;
        }
        if other.position.is_some() {
            self.position = other.position;
        }
        if other.method.is_some() {
            self.method = other.method;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Host limits applied to the loaded module.
///
/// ```toml
/// [runtime]
/// max_fuel = 1000000000
/// stdout_limit_bytes = 1048576
/// memory_limit_in_mb = 1024
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Fuel budget; unset means unbounded execution.
    pub max_fuel: Option<u64>,
    /// Capacity of the captured handler stdout.
    pub stdout_limit_bytes: Option<usize>,
    /// Memory limit reported in the execution context.
    pub memory_limit_in_mb: Option<u32>,
}

impl RuntimeSection {
    fn merge(&mut self, other: RuntimeSection) {
        if other.max_fuel.is_some() {
            self.max_fuel = other.max_fuel;
        }
        if other.stdout_limit_bytes.is_some() {
            self.stdout_limit_bytes = other.stdout_limit_bytes;
        }
        if other.memory_limit_in_mb.is_some() {
            self.memory_limit_in_mb = other.memory_limit_in_mb;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Fully resolved method selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Position(usize),
    Name(String),
    Sole,
}

/// Handler settings after all layers are merged and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHandler {
    pub artifact_path: PathBuf,
    pub class_name: String,
    pub selection: Selection,
}

impl InvokeConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: InvokeConfig) {
        if let Some(handler) = other.handler {
            self.handler.get_or_insert_with(Default::default).merge(handler);
        }
        if let Some(runtime) = other.runtime {
            self.runtime.get_or_insert_with(Default::default).merge(runtime);
        }
    }

    /// Validate the handler section and settle the selection mode.
    pub fn resolve_handler(&self) -> Result<ResolvedHandler> {
        let handler = self.handler.clone().unwrap_or_default();

        let artifact_path = handler
            .artifact_path
            .ok_or_else(|| ConfigError::MissingField {
                field: "handler.artifact_path".to_string(),
                hint: "INVOKE_ARTIFACT_PATH or --artifact".to_string(),
            })?;
        let class_name = handler
            .class_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                field: "handler.class_name".to_string(),
                hint: "INVOKE_HANDLER_CLASS or --class".to_string(),
            })?;

        let mode = match (handler.selection, &handler.method) {
            (Some(mode), _) => mode,
            (None, Some(_)) => SelectionMode::Name,
            (None, None) => SelectionMode::Position,
        };
        let selection = match mode {
            SelectionMode::Position => {
                Selection::Position(handler.position.unwrap_or(DEFAULT_POSITION))
            }
            SelectionMode::Name => match handler.method {
                Some(method) => Selection::Name(method),
                None => {
                    return Err(ConfigError::Invalid {
                        field: "handler.selection".to_string(),
                        reason: "selection = \"name\" requires handler.method".to_string(),
                    });
                }
            },
            SelectionMode::Sole => Selection::Sole,
        };

        Ok(ResolvedHandler {
            artifact_path,
            class_name,
            selection,
        })
    }

    /// Runtime section with every field defaulted.
    pub fn runtime(&self) -> RuntimeSection {
        self.runtime.clone().unwrap_or_default()
    }
}
