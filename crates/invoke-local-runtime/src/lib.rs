//! Local invocation of WebAssembly function handlers.
//!
//! This crate loads a compiled handler artifact, resolves a handler type
//! inside it, and calls one of the type's methods with a JSON event and a
//! synthetic execution context, the way a cloud function runtime would.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────┐   ┌──────────────────┐
//! │ event        │──▶│ handler           │──▶│ protocol::render │
//! │ read + parse │   │ load → instantiate│   │ stdout → text    │
//! └──────────────┘   │ select → invoke   │   └──────────────────┘
//!                    └───────────────────┘
//! ```

pub mod context;
pub mod error;
pub mod event;
pub mod handler;
pub mod protocol;
pub mod select;

pub use context::{Context, DEFAULT_MEMORY_LIMIT_MB};
pub use error::{ErrorKind, InvokeError, Result};
pub use event::{Event, parse_event, read_event_file, read_input, read_input_from};
pub use handler::{
    HandlerInstance, HandlerType, HostConfig, instantiate, invoke, load_handler_type,
    select_handler_method,
};
pub use protocol::{HandlerInput, HandlerOutput, render};
pub use select::{DEFAULT_METHOD_POSITION, HandlerMethod, MethodSelector};
