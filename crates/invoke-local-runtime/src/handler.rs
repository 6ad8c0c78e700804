//! Loading a handler type out of a WASM artifact and invoking it.
//!
//! # Flow
//!
//! 1. `load_handler_type()` builds a Wasmtime engine with WASI Preview 1 linked,
//!    loads the artifact and collects the exports declared under the type name
//! 2. `HandlerType::instantiate()` instantiates the module and runs the
//!    reactor initializer and the type's `<init>` constructor, if any
//! 3. `select_handler_method()` picks one declared method
//! 4. `HandlerInstance::invoke()` pipes `{"event", "context"}` JSON into WASI
//!    stdin, calls the method and captures WASI stdout as the return value
//!
//! Exports are matched by name: `"<type>.<method>"` is a declared method of
//! `<type>`, and `"<type>.<init>"` is its default constructor.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use wasmtime::{Config, Engine, ExternType, FuncType, Instance, Linker, Module, Store, Trap};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::p1::WasiP1Ctx;
use wasmtime_wasi::p2::pipe::{MemoryInputPipe, MemoryOutputPipe};

use crate::context::Context;
use crate::error::{InvokeError, Result};
use crate::event::Event;
use crate::protocol::{HandlerInput, HandlerOutput};
use crate::select::{HandlerMethod, MethodSelector};

/// Name of the constructor export within a type's namespace.
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// WASI reactor initializer, run once after instantiation when exported.
const REACTOR_INITIALIZER: &str = "_initialize";

/// Host-side limits for the loaded module.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Fuel budget for the whole run. `None` leaves execution unbounded.
    pub max_fuel: Option<u64>,
    /// Capacity of the captured stdout pipe, in bytes.
    pub stdout_limit_bytes: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_fuel: None,
            stdout_limit_bytes: 1024 * 1024,
        }
    }
}

/// Store data: the WASI context the guest sees.
struct HostState {
    wasi: WasiP1Ctx,
}

#[derive(Debug, Clone)]
enum Constructor {
    /// No `<init>` export: construction is a no-op.
    Implicit,
    /// `<init>` export with the `() -> ()` signature.
    Default(String),
    /// `<init>` export with any other signature, or not a function.
    Inaccessible,
}

/// A handler type resolved inside a loaded artifact.
pub struct HandlerType {
    name: String,
    artifact: PathBuf,
    engine: Engine,
    module: Module,
    linker: Linker<HostState>,
    methods: Vec<HandlerMethod>,
    constructor: Constructor,
    host: HostConfig,
}

/// One instantiated handler, constructor already run.
pub struct HandlerInstance {
    type_name: String,
    store: Store<HostState>,
    instance: Instance,
    stdout_limit_bytes: usize,
}

/// Load `artifact_path` and resolve `type_name` within it.
pub fn load_handler_type(
    artifact_path: &Path,
    type_name: &str,
    host: &HostConfig,
) -> Result<HandlerType> {
    if !artifact_path.exists() {
        return Err(InvokeError::ArtifactNotFound {
            path: artifact_path.to_path_buf(),
        });
    }

    let mut config = Config::new();
    config.consume_fuel(host.max_fuel.is_some());
    let engine = Engine::new(&config)
        .map_err(|e| InvokeError::Host(format!("failed to create Wasmtime engine: {e}")))?;

    let mut linker = Linker::new(&engine);
    wasmtime_wasi::p1::add_to_linker_sync(&mut linker, |state: &mut HostState| &mut state.wasi)
        .map_err(|e| InvokeError::Host(format!("failed to link WASI: {e}")))?;

    let module =
        Module::from_file(&engine, artifact_path).map_err(|e| InvokeError::ArtifactInvalid {
            path: artifact_path.to_path_buf(),
            message: format!("{e:?}"),
        })?;

    let (methods, constructor) = declared_members(&module, type_name);
    if methods.is_empty() && matches!(constructor, Constructor::Implicit) {
        return Err(InvokeError::TypeNotFound {
            type_name: type_name.to_string(),
            path: artifact_path.to_path_buf(),
        });
    }

    debug!(
        artifact = %artifact_path.display(),
        type_name,
        methods = methods.len(),
        "Loaded handler type"
    );

    Ok(HandlerType {
        name: type_name.to_string(),
        artifact: artifact_path.to_path_buf(),
        engine,
        module,
        linker,
        methods,
        constructor,
        host: host.clone(),
    })
}

/// Instantiate `handler_type` with its default constructor.
pub fn instantiate(handler_type: &HandlerType) -> Result<HandlerInstance> {
    handler_type.instantiate()
}

/// Pick the handler among the type's declared methods.
pub fn select_handler_method<'a>(
    handler_type: &'a HandlerType,
    selector: &MethodSelector,
) -> Result<&'a HandlerMethod> {
    handler_type.select_method(selector)
}

/// Call `method` on `instance` with `(event, context)`.
pub fn invoke(
    instance: &mut HandlerInstance,
    method: &HandlerMethod,
    event: &Event,
    context: &Context,
) -> Result<HandlerOutput> {
    instance.invoke(method, event, context)
}

impl HandlerType {
    /// Fully-qualified type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Artifact the type was loaded from.
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Declared methods in enumeration order.
    pub fn methods(&self) -> &[HandlerMethod] {
        &self.methods
    }

    /// Pick one declared method.
    pub fn select_method(&self, selector: &MethodSelector) -> Result<&HandlerMethod> {
        let method = selector.select(&self.name, &self.methods)?;
        debug!(
            type_name = %self.name,
            method = %method.name,
            index = method.index,
            selector = %selector,
            "Selected handler method"
        );
        Ok(method)
    }

    /// Instantiate the module and run the constructor.
    pub fn instantiate(&self) -> Result<HandlerInstance> {
        let ctor_export = match &self.constructor {
            Constructor::Inaccessible => {
                return Err(InvokeError::NoDefaultConstructor {
                    type_name: self.name.clone(),
                });
            }
            Constructor::Implicit => None,
            Constructor::Default(export) => Some(export.clone()),
        };

        let stdout_pipe = MemoryOutputPipe::new(self.host.stdout_limit_bytes);
        let mut store = Store::new(
            &self.engine,
            HostState {
                wasi: wasi_context(&[], &stdout_pipe),
            },
        );
        if let Some(fuel) = self.host.max_fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| InvokeError::Host(format!("failed to set fuel: {e}")))?;
        }

        let instance = self
            .linker
            .instantiate(&mut store, &self.module)
            .map_err(|e| InvokeError::Instantiation {
                type_name: self.name.clone(),
                message: format!("{e:?}"),
            })?;

        let mut initializers = Vec::new();
        if instance.get_func(&mut store, REACTOR_INITIALIZER).is_some() {
            initializers.push(REACTOR_INITIALIZER.to_string());
        }
        initializers.extend(ctor_export);

        for export in &initializers {
            let init = instance
                .get_typed_func::<(), ()>(&mut store, export)
                .map_err(|_| InvokeError::NoDefaultConstructor {
                    type_name: self.name.clone(),
                })?;
            if let Err(failure) = classify(init.call(&mut store, ())) {
                return Err(InvokeError::ConstructorFailed {
                    type_name: self.name.clone(),
                    message: failure.to_string(),
                });
            }
        }

        let constructor_output = pipe_to_string(&stdout_pipe);
        if !constructor_output.is_empty() {
            warn!(
                type_name = %self.name,
                output = %constructor_output,
                "Constructor wrote to stdout; output discarded"
            );
        }

        debug!(type_name = %self.name, "Created handler instance");

        Ok(HandlerInstance {
            type_name: self.name.clone(),
            store,
            instance,
            stdout_limit_bytes: self.host.stdout_limit_bytes,
        })
    }
}

impl HandlerInstance {
    /// Type this instance was created from.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Call `method` with `(event, context)` delivered on stdin.
    pub fn invoke(
        &mut self,
        method: &HandlerMethod,
        event: &Event,
        context: &Context,
    ) -> Result<HandlerOutput> {
        if !method.invocable {
            return Err(InvokeError::SignatureMismatch {
                method: method.name.clone(),
                signature: method.signature.clone(),
            });
        }

        let input = HandlerInput {
            event: event.clone(),
            context: context.clone(),
        };
        let input_json = serde_json::to_vec(&input).map_err(InvokeError::Serialize)?;

        let handler = self
            .instance
            .get_typed_func::<(), ()>(&mut self.store, &method.export)
            .map_err(|_| InvokeError::SignatureMismatch {
                method: method.name.clone(),
                signature: method.signature.clone(),
            })?;

        // Fresh stdio per call so constructor output never leaks into the result.
        let stdout_pipe = MemoryOutputPipe::new(self.stdout_limit_bytes);
        self.store.data_mut().wasi = wasi_context(&input_json, &stdout_pipe);

        debug!(
            type_name = %self.type_name,
            method = %method.name,
            input_bytes = input_json.len(),
            "Invoking handler"
        );

        match classify(handler.call(&mut self.store, ())) {
            Ok(()) => Ok(HandlerOutput {
                stdout: pipe_to_string(&stdout_pipe),
            }),
            Err(CallFailure::Exit(code)) => Err(InvokeError::HandlerExited {
                method: method.name.clone(),
                code,
            }),
            Err(failure) => Err(InvokeError::HandlerFailed {
                method: method.name.clone(),
                message: failure.to_string(),
            }),
        }
    }
}

/// Why a guest call did not return normally.
enum CallFailure {
    /// `proc_exit` with a non-zero code.
    Exit(i32),
    OutOfFuel,
    Trap(String),
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallFailure::Exit(code) => write!(f, "exited with code {code}"),
            CallFailure::OutOfFuel => write!(f, "execution ran out of fuel"),
            CallFailure::Trap(trace) => write!(f, "{trace}"),
        }
    }
}

/// Treat `proc_exit(0)` as a normal return.
fn classify(outcome: wasmtime::Result<()>) -> std::result::Result<(), CallFailure> {
    let err = match outcome {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    if let Some(exit) = err.downcast_ref::<wasmtime_wasi::I32Exit>() {
        return match exit.0 {
            0 => Ok(()),
            code => Err(CallFailure::Exit(code)),
        };
    }
    if let Some(Trap::OutOfFuel) = err.downcast_ref::<Trap>() {
        return Err(CallFailure::OutOfFuel);
    }
    Err(CallFailure::Trap(format!("{err:?}")))
}

/// Collect the functions declared directly under `type_name`, in export order.
fn declared_members(module: &Module, type_name: &str) -> (Vec<HandlerMethod>, Constructor) {
    let prefix = format!("{type_name}.");
    let mut methods = Vec::new();
    let mut constructor = Constructor::Implicit;

    for export in module.exports() {
        let Some(member) = export.name().strip_prefix(&prefix) else {
            continue;
        };
        if member.is_empty() || member.contains('.') {
            continue;
        }

        let ty = export.ty();
        if member == CONSTRUCTOR_NAME {
            constructor = match &ty {
                ExternType::Func(func) if is_nullary(func) => {
                    Constructor::Default(export.name().to_string())
                }
                _ => Constructor::Inaccessible,
            };
            continue;
        }

        if let ExternType::Func(func) = ty {
            methods.push(HandlerMethod {
                index: methods.len(),
                name: member.to_string(),
                export: export.name().to_string(),
                signature: signature(&func),
                invocable: is_nullary(&func),
            });
        }
    }

    (methods, constructor)
}

fn is_nullary(func: &FuncType) -> bool {
    func.params().len() == 0 && func.results().len() == 0
}

fn signature(func: &FuncType) -> String {
    let params: Vec<String> = func.params().map(|p| p.to_string()).collect();
    let results: Vec<String> = func.results().map(|r| r.to_string()).collect();
    format!("({}) -> ({})", params.join(", "), results.join(", "))
}

/// WASI Preview 1 context with `stdin` preloaded and stdout captured.
///
/// Stderr is inherited so guest diagnostics reach the host's stderr directly.
fn wasi_context(stdin: &[u8], stdout: &MemoryOutputPipe) -> WasiP1Ctx {
    let mut builder = WasiCtxBuilder::new();
    builder
        .stdin(MemoryInputPipe::new(stdin.to_vec()))
        .stdout(stdout.clone())
        .inherit_stderr();
    builder.build_p1()
}

fn pipe_to_string(pipe: &MemoryOutputPipe) -> String {
    String::from_utf8_lossy(&pipe.contents()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_artifact(dir: &TempDir, wat: &str) -> PathBuf {
        let path = dir.path().join("handler.wat");
        std::fs::write(&path, wat).unwrap();
        path
    }

    #[test]
    fn test_default_host_config() {
        let host = HostConfig::default();
        assert!(host.max_fuel.is_none());
        assert_eq!(host.stdout_limit_bytes, 1024 * 1024);
    }

    #[test]
    fn test_declared_members_in_export_order() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(
            &dir,
            r#"(module
                (func $a)
                (func $b (param i32) (result i32) local.get 0)
                (export "Outer.Handler.zeta" (func $a))
                (export "Outer.Handler.alpha" (func $b))
                (export "Outer.Handler.<init>" (func $a))
                (export "Outer.Handler.Inner.nested" (func $a))
                (export "Outer.Other.skip" (func $a))
                (export "Outer.Handler" (func $a)))"#,
        );
        let ty = load_handler_type(&path, "Outer.Handler", &HostConfig::default()).unwrap();
        let names: Vec<&str> = ty.methods().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha"]);
        assert!(ty.methods()[0].invocable);
        assert!(!ty.methods()[1].invocable);
        assert_eq!(ty.methods()[1].signature, "(i32) -> (i32)");
        assert_eq!(ty.methods()[1].index, 1);
        assert!(matches!(ty.constructor, Constructor::Default(_)));
    }

    #[test]
    fn test_missing_artifact() {
        let err = load_handler_type(
            Path::new("/nonexistent/handler.wasm"),
            "Handler",
            &HostConfig::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, InvokeError::ArtifactNotFound { .. }));
    }

    #[test]
    fn test_invalid_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("handler.wasm");
        std::fs::write(&path, b"not a module").unwrap();
        let err = load_handler_type(&path, "Handler", &HostConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, InvokeError::ArtifactInvalid { .. }));
    }

    #[test]
    fn test_unknown_type() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(&dir, r#"(module (func $f) (export "Handler.run" (func $f)))"#);
        let err = load_handler_type(&path, "Missing", &HostConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, InvokeError::TypeNotFound { .. }));
    }

    #[test]
    fn test_inaccessible_constructor() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(
            &dir,
            r#"(module
                (func $f)
                (func $ctor (param i32))
                (export "Handler.a" (func $f))
                (export "Handler.b" (func $f))
                (export "Handler.<init>" (func $ctor)))"#,
        );
        let ty = load_handler_type(&path, "Handler", &HostConfig::default()).unwrap();
        let err = ty.instantiate().err().unwrap();
        assert!(matches!(err, InvokeError::NoDefaultConstructor { .. }));
    }

    #[test]
    fn test_constructor_trap() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(
            &dir,
            r#"(module
                (func $f)
                (func $ctor unreachable)
                (export "Handler.a" (func $f))
                (export "Handler.<init>" (func $ctor)))"#,
        );
        let ty = load_handler_type(&path, "Handler", &HostConfig::default()).unwrap();
        let err = instantiate(&ty).err().unwrap();
        assert!(matches!(err, InvokeError::ConstructorFailed { .. }));
    }

    #[test]
    fn test_signature_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(
            &dir,
            r#"(module
                (func $f)
                (func $g (param i32 i32))
                (export "Handler.a" (func $f))
                (export "Handler.b" (func $g)))"#,
        );
        let ty = load_handler_type(&path, "Handler", &HostConfig::default()).unwrap();
        let mut instance = ty.instantiate().unwrap();
        let method = select_handler_method(&ty, &MethodSelector::default()).unwrap();
        let err = invoke(&mut instance, method, &Event::new(), &Context::new("Handler"))
            .err()
            .unwrap();
        assert!(matches!(err, InvokeError::SignatureMismatch { .. }));
    }

    #[test]
    fn test_out_of_fuel() {
        let dir = TempDir::new().unwrap();
        let path = write_artifact(
            &dir,
            r#"(module
                (func $f)
                (func $spin (loop $l br $l))
                (export "Handler.a" (func $f))
                (export "Handler.b" (func $spin)))"#,
        );
        let host = HostConfig {
            max_fuel: Some(10_000),
            ..HostConfig::default()
        };
        let ty = load_handler_type(&path, "Handler", &host).unwrap();
        let mut instance = ty.instantiate().unwrap();
        let method = ty.select_method(&MethodSelector::default()).unwrap();
        let err = instance
            .invoke(method, &Event::new(), &Context::new("Handler"))
            .err()
            .unwrap();
        match err {
            InvokeError::HandlerFailed { message, .. } => assert!(message.contains("fuel")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
