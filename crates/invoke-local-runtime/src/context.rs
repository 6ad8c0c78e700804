//! Synthetic execution context handed to the handler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default memory limit reported to the handler.
pub const DEFAULT_MEMORY_LIMIT_MB: u32 = 1024;

/// Placeholder for a cloud runtime's invocation context.
///
/// Nothing here is enforced; the fields only give the handler something of
/// the expected shape to read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub request_id: String,
    pub function_name: String,
    pub function_version: String,
    pub memory_limit_in_mb: u32,
    pub invoked_at: DateTime<Utc>,
}

impl Context {
    /// Fresh context for one invocation of `function_name`.
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            function_name: function_name.into(),
            function_version: "$LATEST".to_string(),
            memory_limit_in_mb: DEFAULT_MEMORY_LIMIT_MB,
            invoked_at: Utc::now(),
        }
    }

    pub fn with_memory_limit(mut self, memory_limit_in_mb: u32) -> Self {
        self.memory_limit_in_mb = memory_limit_in_mb;
        self
    }
}
