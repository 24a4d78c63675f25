//! Sandboxed script execution (§4.4, §9): one `rquickjs` VM per `interpret` call,
//! driven cooperatively on a dedicated `LocalSet` so host functions can bridge
//! into the async [`InterceptorChain`]/[`crate::tools::Tool`] world without
//! QuickJS itself knowing anything is async.
//!
//! Registered tool names become top-level synchronous-looking functions in the
//! script; each call round-trips its argument object and return value through
//! JSON (QuickJS's built-in `JSON.parse`/`JSON.stringify`), since the VM has no
//! access to Rust types directly.

use std::collections::HashMap;
use std::sync::Arc;

use rquickjs::{AsyncContext, AsyncRuntime, CatchResultExt, Function};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::hub::Hub;
use crate::interceptors::{FunctionCall, InterceptorChain};
use crate::tools::{Session, ToolRegistry};

#[derive(Debug, Error)]
pub enum InterpreterError {
    #[error("script error: {0}")]
    Script(String),
    #[error("cancelled")]
    Cancelled,
    #[error("runtime setup failed: {0}")]
    Setup(String),
}

/// Output of one script run (§4.4).
pub struct InterpreterResult {
    pub console_output: String,
    pub function_calls: Vec<FunctionCall>,
    pub tool_stats: HashMap<String, i64>,
}

pub struct Interpreter {
    registry: Arc<ToolRegistry>,
    hub: Option<Hub>,
}

impl Interpreter {
    pub fn new(registry: Arc<ToolRegistry>, hub: Option<Hub>) -> Self {
        Self { registry, hub }
    }

    /// Runs `script` with access to every tool in the registry as a global
    /// function. Cancellation is observed via `session.vm`'s interrupt flag.
    pub async fn interpret(
        &self,
        script: &str,
        session: Arc<Session>,
    ) -> Result<InterpreterResult, InterpreterError> {
        let chain = Arc::new(InterceptorChain::new(self.registry.clone(), self.hub.clone()));
        let log: Arc<Mutex<Vec<FunctionCall>>> = Arc::new(Mutex::new(Vec::new()));
        let console: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));

        let local = tokio::task::LocalSet::new();
        let script = script.to_string();
        let tool_names = self.registry.names();

        let outcome = local
            .run_until(run_script(
                script,
                tool_names,
                chain,
                session.clone(),
                log.clone(),
                console.clone(),
            ))
            .await;

        if session.vm.is_cancelled() {
            return Err(InterpreterError::Cancelled);
        }
        outcome?;

        let tool_stats = {
            let scratch = session.scratch.lock().await;
            scratch
                .iter()
                .filter_map(|(k, v)| {
                    k.strip_prefix("tool_calls::")
                        .map(|name| (name.to_string(), v.as_i64().unwrap_or(0)))
                })
                .collect()
        };

        Ok(InterpreterResult {
            console_output: console.lock().await.clone(),
            function_calls: Arc::try_unwrap(log)
                .map(|m| m.into_inner())
                .unwrap_or_default(),
            tool_stats,
        })
    }
}

async fn run_script(
    script: String,
    tool_names: Vec<String>,
    chain: Arc<InterceptorChain>,
    session: Arc<Session>,
    log: Arc<Mutex<Vec<FunctionCall>>>,
    console: Arc<Mutex<String>>,
) -> Result<(), InterpreterError> {
    let runtime = AsyncRuntime::new().map_err(|e| InterpreterError::Setup(e.to_string()))?;

    let vm = session.vm.clone();
    runtime
        .set_interrupt_handler(Some(Box::new(move || vm.is_cancelled())))
        .await;

    let ctx = AsyncContext::full(&runtime)
        .await
        .map_err(|e| InterpreterError::Setup(e.to_string()))?;

    ctx.with(|ctx| -> Result<(), rquickjs::Error> {
        let globals = ctx.globals();

        let console_obj = rquickjs::Object::new(ctx.clone())?;
        let console_sink = console.clone();
        console_obj.set(
            "log",
            Function::new(ctx.clone(), move |msg: String| {
                // Synchronous: the script owns this thread, so buffering directly
                // (rather than awaiting the mutex) keeps console.log non-blocking.
                if let Ok(mut guard) = console_sink.try_lock() {
                    guard.push_str(&msg);
                    guard.push('\n');
                }
            })?,
        )?;
        globals.set("console", console_obj)?;

        for name in tool_names {
            let chain = chain.clone();
            let session = session.clone();
            let log = log.clone();
            let name_for_closure = name.clone();

            let func = Function::new(ctx.clone(), move |args_json: String| {
                let chain = chain.clone();
                let session = session.clone();
                let log = log.clone();
                let name = name_for_closure.clone();
                async move {
                    let args: Value = serde_json::from_str(&args_json).unwrap_or(Value::Null);
                    match chain.call(&name, args, &session, &log).await {
                        Ok(content) => serde_json::to_string(&content.value).unwrap_or_default(),
                        Err(e) => serde_json::json!({"error": e.message, "suggestions": e.suggestions})
                            .to_string(),
                    }
                }
            })?;

            globals.set(name.as_str(), func)?;
        }

        Ok(())
    })
    .map_err(|e| InterpreterError::Setup(e.to_string()))?;

    let outcome: Result<(), String> = ctx
        .with(|ctx| {
            ctx.eval::<(), _>(script.into_bytes())
                .catch(&ctx)
                .map_err(|caught| caught.to_string())
        })
        .await;

    outcome.map_err(InterpreterError::Script)
}
