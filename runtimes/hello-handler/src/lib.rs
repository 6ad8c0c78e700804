//! Sample handler: greets `event.name` and reports the request id.
//!
//! Exports `com.serverless.Handler.handleRequest`, which reads the
//! `{"event", "context"}` envelope from stdin and prints its return value.
//! `toString` is a second declared method.
//!
//! rustc does not emit exports in source order (`handleRequest` currently
//! comes first), so positional selection is unreliable for this module.
//! `invoke-local.toml` selects by name; `invoke-local --list-methods` shows
//! the enumeration a build actually produced.
//!
//! The module is a reactor: exports return without `proc_exit`, so nothing
//! flushes stdout on the way out. Every export flushes what it wrote.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::{Read, Write};

#[derive(Deserialize)]
struct HandlerInput {
    #[serde(default)]
    event: Map<String, Value>,
    #[serde(default)]
    context: Value,
}

#[derive(Serialize)]
struct Response {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

/// Core handler logic, separated for testability.
fn process(input: &str) -> Result<Response, String> {
    let hi: HandlerInput =
        serde_json::from_str(input).map_err(|e| format!("Invalid input JSON: {e}"))?;

    let name = hi
        .event
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("anonymous");

    Ok(Response {
        message: format!("Hello, {name}!"),
        request_id: hi
            .context
            .get("request_id")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Read the envelope from `input`, write the JSON response to `out`.
fn respond<R: Read, W: Write>(mut input: R, mut out: W) -> Result<(), String> {
    let mut text = String::new();
    input
        .read_to_string(&mut text)
        .map_err(|e| format!("Failed to read stdin: {e}"))?;

    let json = serde_json::to_string(&process(&text)?).map_err(|e| e.to_string())?;
    emit(&mut out, &json)
}

fn emit<W: Write>(out: &mut W, text: &str) -> Result<(), String> {
    out.write_all(text.as_bytes())
        .and_then(|()| out.flush())
        .map_err(|e| format!("Failed to write stdout: {e}"))
}

#[export_name = "com.serverless.Handler.toString"]
pub extern "C" fn to_string() {
    if let Err(e) = emit(&mut std::io::stdout(), "com.serverless.Handler") {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

#[export_name = "com.serverless.Handler.handleRequest"]
pub extern "C" fn handle_request() {
    if let Err(e) = respond(std::io::stdin(), std::io::stdout()) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_greets_event_name() {
        let input = json!({
            "event": {"name": "world"},
            "context": {"request_id": "abc"}
        })
        .to_string();
        let out = process(&input).unwrap();
        assert_eq!(out.message, "Hello, world!");
        assert_eq!(out.request_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_missing_name_defaults() {
        let out = process(&json!({"event": {}}).to_string()).unwrap();
        assert_eq!(out.message, "Hello, anonymous!");
        assert!(out.request_id.is_none());
    }

    #[test]
    fn test_non_string_name_defaults() {
        let out = process(&json!({"event": {"name": 7}}).to_string()).unwrap();
        assert_eq!(out.message, "Hello, anonymous!");
    }

    #[test]
    fn test_invalid_json() {
        let err = process("not json at all").err().unwrap();
        assert!(err.contains("Invalid input JSON"));
    }

    #[test]
    fn test_empty_string() {
        assert!(process("").is_err());
    }

    /// Records whether the written bytes were flushed.
    #[derive(Default)]
    struct FlushTracking {
        pending: Vec<u8>,
        flushed: Vec<u8>,
    }

    impl Write for FlushTracking {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.pending.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.append(&mut self.pending);
            Ok(())
        }
    }

    #[test]
    fn test_respond_flushes_response() {
        let input = json!({"event": {"name": "world"}}).to_string();
        let mut out = FlushTracking::default();
        respond(input.as_bytes(), &mut out).unwrap();
        assert!(out.pending.is_empty());
        let response: Value = serde_json::from_slice(&out.flushed).unwrap();
        assert_eq!(response["message"], "Hello, world!");
    }

    #[test]
    fn test_respond_writes_nothing_on_bad_input() {
        let mut out = FlushTracking::default();
        let err = respond("not json".as_bytes(), &mut out).unwrap_err();
        assert!(err.contains("Invalid input JSON"));
        assert!(out.pending.is_empty() && out.flushed.is_empty());
    }

    #[test]
    fn test_emit_flushes() {
        let mut out = FlushTracking::default();
        emit(&mut out, "com.serverless.Handler").unwrap();
        assert_eq!(out.flushed, b"com.serverless.Handler");
    }
}
