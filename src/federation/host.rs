//! WebAssembly handler host using wasmtime
//!
//! Compiles function modules and runs their `handle` export against a
//! [`NormalizedRequest`]. The guest talks to the host exclusively through
//! imports in the `pulse` namespace; nothing else is linked.
//!
//! ## Handler ABI
//!
//! ```wat
//! (import "pulse" "request_method_len" (func (result i32)))
//! (import "pulse" "request_method"     (func (param i32)))          ;; dst
//! (import "pulse" "request_url_len"    (func (result i32)))
//! (import "pulse" "request_url"        (func (param i32)))          ;; dst
//! (import "pulse" "request_body_len"   (func (result i32)))         ;; -1 when null
//! (import "pulse" "request_body"       (func (param i32)))          ;; dst
//! (import "pulse" "request_header_len" (func (param i32 i32) (result i32)))
//! (import "pulse" "request_header"     (func (param i32 i32 i32)))
//! (import "pulse" "response_status"    (func (param i32)))
//! (import "pulse" "response_header"    (func (param i32 i32 i32 i32)))
//! (import "pulse" "response_body"      (func (param i32 i32)))
//! (import "pulse" "return_value"       (func (param i32 i32)))      ;; JSON
//! (import "pulse" "log"                (func (param i32 i32)))
//!
//! (export "memory" (memory 1))
//! (export "handle" (func))
//! ```
//!
//! Calling any `response_*` import makes the result a shaped response;
//! otherwise `return_value` supplies a plain JSON value (or `null`).

use crate::error::{FederationError, Result};
use crate::functions::protocol::{
    append_header, HandlerOutput, NormalizedRequest, NormalizedResponse, DEFAULT_STATUS,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use wasmtime::{
    Caller, Config, Engine, Extern, ExternType, Linker, Memory, Module, Store, StoreLimits,
    StoreLimitsBuilder, Trap,
};

/// Import namespace of the host functions.
pub const HOST_MODULE: &str = "pulse";

/// Export invoked for every request.
pub const HANDLE_EXPORT: &str = "handle";

/// Memory export required from every module.
pub const MEMORY_EXPORT: &str = "memory";

/// Every import a module may request from [`HOST_MODULE`].
pub const HOST_IMPORTS: [&str; 13] = [
    "request_method_len",
    "request_method",
    "request_url_len",
    "request_url",
    "request_body_len",
    "request_body",
    "request_header_len",
    "request_header",
    "response_status",
    "response_header",
    "response_body",
    "return_value",
    "log",
];

/// Per-invocation resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostLimits {
    /// Fuel budget; exhausting it traps the handler.
    pub fuel: u64,
    /// Maximum linear memory per instance (bytes).
    pub max_memory_bytes: usize,
}

impl Default for HostLimits {
    fn default() -> Self {
        Self {
            fuel: 50_000_000,
            max_memory_bytes: 64 * 1024 * 1024, // 64MB
        }
    }
}

/// Compiles and runs handler modules. Cheap to clone; the engine is shared.
#[derive(Clone)]
pub struct WasmHost {
    engine: Engine,
    limits: HostLimits,
}

impl std::fmt::Debug for WasmHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmHost")
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl WasmHost {
    pub fn new(limits: HostLimits) -> Result<Self> {
        let mut config = Config::new();
        config.consume_fuel(true);

        let engine = Engine::new(&config)
            .map_err(|e| FederationError::Wasm(format!("Failed to create WASM engine: {}", e)))?;

        Ok(Self { engine, limits })
    }

    pub fn limits(&self) -> &HostLimits {
        &self.limits
    }

    /// Compile a module (binary or text) and check it against the handler ABI.
    pub fn compile(&self, source: &[u8]) -> Result<Module> {
        let module = Module::new(&self.engine, source)
            .map_err(|e| FederationError::Wasm(format!("{:#}", e)))?;
        validate_abi(&module)?;
        Ok(module)
    }

    /// Run `module`'s handler for one request.
    ///
    /// Blocking; callers on the async runtime go through `spawn_blocking`.
    pub fn invoke(
        &self,
        function: &str,
        module: &Module,
        request: &NormalizedRequest,
    ) -> Result<HandlerOutput> {
        let mut store = Store::new(
            &self.engine,
            InvocationState::new(request.clone(), self.limits.max_memory_bytes),
        );
        store.limiter(|state| &mut state.limits);
        store
            .set_fuel(self.limits.fuel)
            .map_err(|e| FederationError::Wasm(format!("Failed to set fuel: {}", e)))?;

        let mut linker = Linker::new(&self.engine);
        link_host_functions(&mut linker)?;

        let instance = linker
            .instantiate(&mut store, module)
            .map_err(|e| FederationError::invocation(function, format!("instantiate: {:#}", e)))?;

        let handle = instance
            .get_typed_func::<(), ()>(&mut store, HANDLE_EXPORT)
            .map_err(|e| FederationError::invocation(function, format!("{:#}", e)))?;

        handle
            .call(&mut store, ())
            .map_err(|e| FederationError::invocation(function, describe_failure(&e)))?;

        store.into_data().into_output(function)
    }
}

/// Check exports and imports against the handler ABI.
pub fn validate_abi(module: &Module) -> Result<()> {
    let mut has_memory = false;
    let mut has_handle = false;

    for export in module.exports() {
        match (export.name(), export.ty()) {
            (MEMORY_EXPORT, ExternType::Memory(_)) => has_memory = true,
            (HANDLE_EXPORT, ExternType::Func(ty)) => {
                if ty.params().len() != 0 || ty.results().len() != 0 {
                    return Err(FederationError::Wasm(format!(
                        "export '{}' must take no parameters and return nothing",
                        HANDLE_EXPORT
                    )));
                }
                has_handle = true;
            }
            _ => {}
        }
    }

    if !has_memory {
        return Err(FederationError::Wasm(format!(
            "module must export memory '{}'",
            MEMORY_EXPORT
        )));
    }
    if !has_handle {
        return Err(FederationError::Wasm(format!(
            "module must export function '{}'",
            HANDLE_EXPORT
        )));
    }

    for import in module.imports() {
        if import.module() != HOST_MODULE || !HOST_IMPORTS.contains(&import.name()) {
            return Err(FederationError::Wasm(format!(
                "unsupported import {}::{}",
                import.module(),
                import.name()
            )));
        }
    }

    Ok(())
}

fn describe_failure(error: &wasmtime::Error) -> String {
    match error.downcast_ref::<Trap>() {
        Some(Trap::OutOfFuel) => "fuel exhausted".to_string(),
        Some(trap) => format!("trap: {}", trap),
        None => format!("{:#}", error),
    }
}

/// Store data for one invocation.
struct InvocationState {
    limits: StoreLimits,
    request: NormalizedRequest,
    shaped: bool,
    status: Option<u16>,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
    value: Option<Vec<u8>>,
}

impl InvocationState {
    fn new(request: NormalizedRequest, max_memory: usize) -> Self {
        Self {
            limits: StoreLimitsBuilder::new()
                .memory_size(max_memory)
                .instances(1)
                .memories(1)
                .tables(4)
                .build(),
            request,
            shaped: false,
            status: None,
            headers: BTreeMap::new(),
            body: Vec::new(),
            value: None,
        }
    }

    fn into_output(self, function: &str) -> Result<HandlerOutput> {
        if self.shaped {
            return Ok(HandlerOutput::Response(NormalizedResponse {
                status: self.status.unwrap_or(DEFAULT_STATUS),
                headers: self.headers,
                body: Bytes::from(self.body),
            }));
        }

        match self.value {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(HandlerOutput::Value)
                .map_err(|e| {
                    FederationError::invocation(
                        function,
                        format!("return_value is not valid JSON: {}", e),
                    )
                }),
            None => Ok(HandlerOutput::Value(serde_json::Value::Null)),
        }
    }
}

fn guest_memory(caller: &mut Caller<'_, InvocationState>) -> wasmtime::Result<Memory> {
    caller
        .get_export(MEMORY_EXPORT)
        .and_then(Extern::into_memory)
        .ok_or_else(|| wasmtime::Error::msg("guest does not export memory"))
}

fn read_guest(
    caller: &mut Caller<'_, InvocationState>,
    ptr: i32,
    len: i32,
) -> wasmtime::Result<Vec<u8>> {
    if ptr < 0 || len < 0 {
        return Err(wasmtime::Error::msg("negative pointer or length"));
    }
    let memory = guest_memory(caller)?;
    let mut buf = vec![0u8; len as usize];
    memory.read(&*caller, ptr as usize, &mut buf)?;
    Ok(buf)
}

fn read_guest_str(
    caller: &mut Caller<'_, InvocationState>,
    ptr: i32,
    len: i32,
) -> wasmtime::Result<String> {
    let bytes = read_guest(caller, ptr, len)?;
    String::from_utf8(bytes).map_err(|_| wasmtime::Error::msg("string is not valid UTF-8"))
}

fn write_guest(
    caller: &mut Caller<'_, InvocationState>,
    ptr: i32,
    data: &[u8],
) -> wasmtime::Result<()> {
    if ptr < 0 {
        return Err(wasmtime::Error::msg("negative pointer"));
    }
    let memory = guest_memory(caller)?;
    memory.write(&mut *caller, ptr as usize, data)?;
    Ok(())
}

fn link_host_functions(linker: &mut Linker<InvocationState>) -> Result<()> {
    let link_err =
        |name: &str, e: wasmtime::Error| FederationError::Wasm(format!("link {}: {}", name, e));

    linker
        .func_wrap(
            HOST_MODULE,
            "request_method_len",
            |caller: Caller<'_, InvocationState>| -> i32 {
                caller.data().request.method.len() as i32
            },
        )
        .map_err(|e| link_err("request_method_len", e))?;

    linker
        .func_wrap(
            HOST_MODULE,
            "request_method",
            |mut caller: Caller<'_, InvocationState>, dst: i32| -> wasmtime::Result<()> {
                let method = caller.data().request.method.clone();
                write_guest(&mut caller, dst, method.as_bytes())
            },
        )
        .map_err(|e| link_err("request_method", e))?;

    linker
        .func_wrap(
            HOST_MODULE,
            "request_url_len",
            |caller: Caller<'_, InvocationState>| -> i32 { caller.data().request.url.len() as i32 },
        )
        .map_err(|e| link_err("request_url_len", e))?;

    linker
        .func_wrap(
            HOST_MODULE,
            "request_url",
            |mut caller: Caller<'_, InvocationState>, dst: i32| -> wasmtime::Result<()> {
                let url = caller.data().request.url.clone();
                write_guest(&mut caller, dst, url.as_bytes())
            },
        )
        .map_err(|e| link_err("request_url", e))?;

    linker
        .func_wrap(
            HOST_MODULE,
            "request_body_len",
            |caller: Caller<'_, InvocationState>| -> i32 {
                caller
                    .data()
                    .request
                    .body
                    .as_ref()
                    .map(|b| b.len() as i32)
                    .unwrap_or(-1)
            },
        )
        .map_err(|e| link_err("request_body_len", e))?;

    linker
        .func_wrap(
            HOST_MODULE,
            "request_body",
            |mut caller: Caller<'_, InvocationState>, dst: i32| -> wasmtime::Result<()> {
                let body = caller.data().request.body.clone().unwrap_or_default();
                write_guest(&mut caller, dst, &body)
            },
        )
        .map_err(|e| link_err("request_body", e))?;

    linker
        .func_wrap(
            HOST_MODULE,
            "request_header_len",
            |mut caller: Caller<'_, InvocationState>,
             name_ptr: i32,
             name_len: i32|
             -> wasmtime::Result<i32> {
                let name = read_guest_str(&mut caller, name_ptr, name_len)?;
                Ok(caller
                    .data()
                    .request
                    .header(&name)
                    .map(|v| v.len() as i32)
                    .unwrap_or(-1))
            },
        )
        .map_err(|e| link_err("request_header_len", e))?;

    linker
        .func_wrap(
            HOST_MODULE,
            "request_header",
            |mut caller: Caller<'_, InvocationState>,
             name_ptr: i32,
             name_len: i32,
             dst: i32|
             -> wasmtime::Result<()> {
                let name = read_guest_str(&mut caller, name_ptr, name_len)?;
                let value = caller
                    .data()
                    .request
                    .header(&name)
                    .map(str::to_string)
                    .unwrap_or_default();
                write_guest(&mut caller, dst, value.as_bytes())
            },
        )
        .map_err(|e| link_err("request_header", e))?;

    linker
        .func_wrap(
            HOST_MODULE,
            "response_status",
            |mut caller: Caller<'_, InvocationState>, status: i32| -> wasmtime::Result<()> {
                if !(100..=599).contains(&status) {
                    return Err(wasmtime::Error::msg(format!(
                        "invalid response status {}",
                        status
                    )));
                }
                let state = caller.data_mut();
                state.shaped = true;
                state.status = Some(status as u16);
                Ok(())
            },
        )
        .map_err(|e| link_err("response_status", e))?;

    linker
        .func_wrap(
            HOST_MODULE,
            "response_header",
            |mut caller: Caller<'_, InvocationState>,
             name_ptr: i32,
             name_len: i32,
             value_ptr: i32,
             value_len: i32|
             -> wasmtime::Result<()> {
                let name = read_guest_str(&mut caller, name_ptr, name_len)?;
                let value = read_guest_str(&mut caller, value_ptr, value_len)?;
                let state = caller.data_mut();
                state.shaped = true;
                append_header(&mut state.headers, &name, &value);
                Ok(())
            },
        )
        .map_err(|e| link_err("response_header", e))?;

    linker
        .func_wrap(
            HOST_MODULE,
            "response_body",
            |mut caller: Caller<'_, InvocationState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
                let bytes = read_guest(&mut caller, ptr, len)?;
                let state = caller.data_mut();
                state.shaped = true;
                state.body.extend_from_slice(&bytes);
                Ok(())
            },
        )
        .map_err(|e| link_err("response_body", e))?;

    linker
        .func_wrap(
            HOST_MODULE,
            "return_value",
            |mut caller: Caller<'_, InvocationState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
                let bytes = read_guest(&mut caller, ptr, len)?;
                caller.data_mut().value = Some(bytes);
                Ok(())
            },
        )
        .map_err(|e| link_err("return_value", e))?;

    linker
        .func_wrap(
            HOST_MODULE,
            "log",
            |mut caller: Caller<'_, InvocationState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
                let bytes = read_guest(&mut caller, ptr, len)?;
                debug!(target: "guest", "{}", String::from_utf8_lossy(&bytes));
                Ok(())
            },
        )
        .map_err(|e| link_err("log", e))?;

    Ok(())
}
