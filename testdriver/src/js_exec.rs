//! `exec{language: js}` evaluation (spec §4.5, §9 "JS-eval primitive"): runs
//! in an isolated context exposing only `{require, console, fs, process,
//! fetch}`; the script sets `result = ...` (synchronously or via a promise);
//! the pipeline awaits and coerces it to a string.

use std::sync::{Arc, Mutex};

use rquickjs::{Context, Ctx, Function, Runtime};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsExecError {
    #[error("failed to initialize JS runtime: {0}")]
    Init(String),
    #[error("script threw: {0}")]
    Thrown(String),
    #[error("script did not set `result`")]
    NoResult,
}

/// Evaluates `script` in a fresh isolated context; returns the string
/// coercion of the global `result` binding after the script (and any
/// pending microtasks, for a promise-valued `result`) have run.
pub fn eval(script: &str) -> Result<String, JsExecError> {
    let runtime = Runtime::new().map_err(|e| JsExecError::Init(e.to_string()))?;
    let context = Context::full(&runtime).map_err(|e| JsExecError::Init(e.to_string()))?;

    let console_log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    context.with(|ctx| -> Result<(), JsExecError> {
        install_globals(&ctx, Arc::clone(&console_log))?;
        ctx.eval::<(), _>(script).map_err(|e| JsExecError::Thrown(e.to_string()))?;
        Ok(())
    })?;

    // Drain microtasks so a promise assigned to `result` settles.
    while runtime.execute_pending_job() {}

    context.with(|ctx| -> Result<String, JsExecError> {
        let result: rquickjs::Value = ctx
            .globals()
            .get("result")
            .map_err(|_| JsExecError::NoResult)?;
        if result.is_undefined() {
            return Err(JsExecError::NoResult);
        }
        coerce_to_string(&ctx, result)
    })
}

fn coerce_to_string(ctx: &Ctx<'_>, value: rquickjs::Value) -> Result<String, JsExecError> {
    if let Some(s) = value.as_string() {
        return s.to_string().map_err(|e| JsExecError::Thrown(e.to_string()));
    }
    let json: Function = ctx
        .globals()
        .get::<_, rquickjs::Object>("JSON")
        .and_then(|o| o.get("stringify"))
        .map_err(|e| JsExecError::Thrown(e.to_string()))?;
    json.call((value,)).map_err(|e| JsExecError::Thrown(e.to_string()))
}

/// Installs the curated capability set. `require` and `fetch` are present
/// but throw when called — full module loading and networking from inside
/// the JS sandbox are out of scope (spec §1); their presence as bindings,
/// not their behavior, is the contract.
fn install_globals(ctx: &Ctx<'_>, console_log: Arc<Mutex<Vec<String>>>) -> Result<(), JsExecError> {
    let globals = ctx.globals();

    let console = rquickjs::Object::new(ctx.clone()).map_err(|e| JsExecError::Init(e.to_string()))?;
    let log_fn = Function::new(ctx.clone(), move |msg: String| {
        console_log.lock().unwrap().push(msg);
    })
    .map_err(|e| JsExecError::Init(e.to_string()))?;
    console.set("log", log_fn).map_err(|e| JsExecError::Init(e.to_string()))?;
    globals.set("console", console).map_err(|e| JsExecError::Init(e.to_string()))?;

    let process = rquickjs::Object::new(ctx.clone()).map_err(|e| JsExecError::Init(e.to_string()))?;
    let env = rquickjs::Object::new(ctx.clone()).map_err(|e| JsExecError::Init(e.to_string()))?;
    process.set("env", env).map_err(|e| JsExecError::Init(e.to_string()))?;
    process
        .set("platform", std::env::consts::OS)
        .map_err(|e| JsExecError::Init(e.to_string()))?;
    globals.set("process", process).map_err(|e| JsExecError::Init(e.to_string()))?;

    let fs = rquickjs::Object::new(ctx.clone()).map_err(|e| JsExecError::Init(e.to_string()))?;
    let read_file_sync = Function::new(ctx.clone(), |path: String| -> String {
        std::fs::read_to_string(&path).unwrap_or_default()
    })
    .map_err(|e| JsExecError::Init(e.to_string()))?;
    fs.set("readFileSync", read_file_sync).map_err(|e| JsExecError::Init(e.to_string()))?;
    globals.set("fs", fs).map_err(|e| JsExecError::Init(e.to_string()))?;

    let require = Function::new(ctx.clone(), |_module: String| -> rquickjs::Result<()> {
        Err(rquickjs::Error::Exception)
    })
    .map_err(|e| JsExecError::Init(e.to_string()))?;
    globals.set("require", require).map_err(|e| JsExecError::Init(e.to_string()))?;

    let fetch = Function::new(ctx.clone(), |_url: String| -> rquickjs::Result<()> {
        Err(rquickjs::Error::Exception)
    })
    .map_err(|e| JsExecError::Init(e.to_string()))?;
    globals.set("fetch", fetch).map_err(|e| JsExecError::Init(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_synchronous_result() {
        let out = eval("result = 1 + 2;").unwrap();
        assert_eq!(out, "3");
    }

    #[test]
    fn eval_string_result_is_not_json_quoted() {
        let out = eval("result = 'hello';").unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn eval_missing_result_is_an_error() {
        let err = eval("1 + 1;").unwrap_err();
        assert!(matches!(err, JsExecError::NoResult));
    }

    #[test]
    fn console_log_is_callable_without_throwing() {
        let out = eval("console.log('hi'); result = 'ok';").unwrap();
        assert_eq!(out, "ok");
    }
}
