//! Per-invocation engine context.
//!
//! Boa contexts are single-threaded and carry mutable global state, so every
//! invocation builds its own [`HandlerContext`] from the binding's cached source
//! on the thread that runs it. Nothing engine-side is shared between calls.

use boa_engine::{
    builtins::promise::PromiseState,
    js_string,
    object::{builtins::JsPromise, JsObject},
    value::JsValue,
    Context, JsError, JsNativeErrorKind, JsString, Source,
};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::resource_limits::ResourceLimits;
use crate::runtime::conversions::{js_value_to_json, json_to_js_value};

/// Name of the global function every user module must define.
pub const HANDLER_NAME: &str = "handler";

/// A failure while preparing a context: the script does not evaluate, or it does
/// not define a callable `handler`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareError {
    Evaluation(String),
    MissingHandler(String),
}

/// A handler call that did not produce a value.
///
/// `kind` is the thrown error's `name` (`TypeError`, custom names, ...), `Throw`
/// for non-Error thrown values, `ConversionError` for unrepresentable values and
/// `RuntimeLimit` when an engine limit stopped the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub kind: String,
    pub message: String,
}

impl HandlerError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A fresh engine context with the user module evaluated and `handler` resolved.
pub struct HandlerContext {
    ctx: Context,
    handler: JsObject,
}

impl HandlerContext {
    /// Evaluates `source` in a new context configured with `limits`.
    pub fn new(source: &str, limits: &ResourceLimits) -> Result<Self, PrepareError> {
        let mut ctx = Context::default();
        ctx.runtime_limits_mut()
            .set_loop_iteration_limit(limits.loop_iteration_limit);
        ctx.runtime_limits_mut()
            .set_recursion_limit(limits.recursion_limit);

        ctx.eval(Source::from_bytes(source))
            .map_err(|e| PrepareError::Evaluation(describe(&e, &mut ctx).to_string()))?;

        let value = ctx
            .global_object()
            .get(js_string!(HANDLER_NAME), &mut ctx)
            .map_err(|e| PrepareError::MissingHandler(e.to_string()))?;

        if !value.is_callable() {
            return Err(PrepareError::MissingHandler(format!(
                "global '{}' is {}",
                HANDLER_NAME,
                if value.is_undefined() { "not defined" } else { "not a function" }
            )));
        }

        let handler = value
            .as_object()
            .map(|obj| obj.clone())
            .ok_or_else(|| PrepareError::MissingHandler("handler is not an object".into()))?;

        Ok(Self { ctx, handler })
    }

    /// Declared parameter count of `handler` (its `length` property).
    pub fn arity(&mut self) -> usize {
        self.handler
            .get(js_string!("length"), &mut self.ctx)
            .ok()
            .and_then(|v| v.as_number())
            .map(|n| n as usize)
            .unwrap_or(0)
    }

    /// Calls `handler(input, context)` and returns its JSON result.
    ///
    /// A returned promise is settled by draining the job queue; a promise that is
    /// still pending afterwards is reported as an error.
    pub fn call(&mut self, input: &JsonValue, context: &JsonValue) -> Result<JsonValue, HandlerError> {
        let ctx = &mut self.ctx;
        let input = json_to_js_value(input, ctx)
            .map_err(|e| HandlerError::new("ConversionError", format!("input: {}", e)))?;
        let context = json_to_js_value(context, ctx)
            .map_err(|e| HandlerError::new("ConversionError", format!("context: {}", e)))?;

        let returned = self
            .handler
            .call(&JsValue::undefined(), &[input, context], ctx)
            .map_err(|e| describe(&e, ctx))?;

        let settled = settle(returned, ctx)?;

        js_value_to_json(&settled, ctx)
            .map_err(|e| HandlerError::new("ConversionError", e.to_string()))
    }
}

fn settle(value: JsValue, ctx: &mut Context) -> Result<JsValue, HandlerError> {
    let Some(promise) = value
        .as_object()
        .and_then(|o| JsPromise::from_object(o.clone()).ok())
    else {
        return Ok(value);
    };

    ctx.run_jobs().map_err(|e| describe(&e, ctx))?;

    match promise.state() {
        PromiseState::Fulfilled(v) => Ok(v),
        PromiseState::Rejected(reason) => Err(describe_thrown(&reason, ctx)),
        PromiseState::Pending => Err(HandlerError::new(
            "Error",
            "handler returned a promise that never settled",
        )),
    }
}

/// Classifies an engine error into a [`HandlerError`].
fn describe(err: &JsError, ctx: &mut Context) -> HandlerError {
    if let Some(native) = err.as_native() {
        let kind = match native.kind {
            JsNativeErrorKind::Type => "TypeError",
            JsNativeErrorKind::Range => "RangeError",
            JsNativeErrorKind::Reference => "ReferenceError",
            JsNativeErrorKind::Syntax => "SyntaxError",
            JsNativeErrorKind::Eval => "EvalError",
            JsNativeErrorKind::Uri => "URIError",
            JsNativeErrorKind::RuntimeLimit => "RuntimeLimit",
            _ => "Error",
        };
        return HandlerError::new(kind, native.message().to_string());
    }

    match err.as_opaque() {
        Some(value) => describe_thrown(value, ctx),
        None => HandlerError::new("Error", err.to_string()),
    }
}

/// Classifies a thrown (or rejection) value.
fn describe_thrown(value: &JsValue, ctx: &mut Context) -> HandlerError {
    let Some(obj) = value.as_object().map(|o| o.clone()) else {
        return HandlerError::new("Throw", value.display().to_string());
    };

    let mut read = |name: JsString| -> Option<String> {
        let v = obj.get(name, ctx).ok()?;
        if v.is_undefined() {
            return None;
        }
        v.to_string(ctx).ok().map(|s| s.to_std_string_escaped())
    };

    let name = read(js_string!("name"));
    let message = read(js_string!("message"));
    match (name, message) {
        (Some(name), Some(message)) => HandlerError::new(name, message),
        (Some(name), None) => HandlerError::new(name, ""),
        // A plain object without Error fields
        (None, _) => HandlerError::new("Throw", value.display().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(src: &str) -> HandlerContext {
        HandlerContext::new(src, &ResourceLimits::default()).unwrap()
    }

    #[test]
    fn test_missing_handler() {
        let err = HandlerContext::new("var x = 1;", &ResourceLimits::default())
            .err()
            .unwrap();
        assert!(matches!(err, PrepareError::MissingHandler(ref m) if m.contains("not defined")));
    }

    #[test]
    fn test_handler_not_callable() {
        let err = HandlerContext::new("var handler = 42;", &ResourceLimits::default())
            .err()
            .unwrap();
        assert!(matches!(err, PrepareError::MissingHandler(ref m) if m.contains("not a function")));
    }

    #[test]
    fn test_syntax_error() {
        let err = HandlerContext::new("function handler(x, c) {", &ResourceLimits::default())
            .err()
            .unwrap();
        assert!(matches!(err, PrepareError::Evaluation(_)));
    }

    #[test]
    fn test_arity() {
        assert_eq!(context("function handler(a, b) {}").arity(), 2);
        assert_eq!(context("function handler(a) {}").arity(), 1);
        assert_eq!(context("var handler = (a, b, c) => a;").arity(), 3);
    }

    #[test]
    fn test_call_returns_output() {
        let mut ctx = context("function handler(x, c) { return x.a + x.b; }");
        let out = ctx.call(&json!({"a": 2, "b": 3}), &json!({})).unwrap();
        assert_eq!(out, json!(5));
    }

    #[test]
    fn test_context_is_passed_through() {
        let mut ctx = context("function handler(x, c) { return c.requestId; }");
        let out = ctx.call(&json!(null), &json!({"requestId": "r-1"})).unwrap();
        assert_eq!(out, json!("r-1"));
    }

    #[test]
    fn test_thrown_type_error() {
        let mut ctx = context("function handler(x, c) { throw new TypeError('missing key'); }");
        let err = ctx.call(&json!({}), &json!({})).unwrap_err();
        assert_eq!(err, HandlerError::new("TypeError", "missing key"));
    }

    #[test]
    fn test_custom_error_name() {
        let mut ctx = context(
            r#"
            class ValidationError extends Error {
                constructor(m) { super(m); this.name = 'ValidationError'; }
            }
            function handler(x, c) { throw new ValidationError('bad input'); }
            "#,
        );
        let err = ctx.call(&json!({}), &json!({})).unwrap_err();
        assert_eq!(err.kind, "ValidationError");
        assert_eq!(err.message, "bad input");
    }

    #[test]
    fn test_engine_reference_error() {
        let mut ctx = context("function handler(x, c) { return notDefined + 1; }");
        let err = ctx.call(&json!({}), &json!({})).unwrap_err();
        assert_eq!(err.kind, "ReferenceError");
    }

    #[test]
    fn test_thrown_string() {
        let mut ctx = context("function handler(x, c) { throw 'plain'; }");
        let err = ctx.call(&json!({}), &json!({})).unwrap_err();
        assert_eq!(err.kind, "Throw");
        assert!(err.message.contains("plain"));
    }

    #[test]
    fn test_resolved_promise() {
        let mut ctx = context("async function handler(x, c) { return x * 2; }");
        assert_eq!(ctx.call(&json!(21), &json!({})).unwrap(), json!(42));
    }

    #[test]
    fn test_rejected_promise() {
        let mut ctx = context("async function handler(x, c) { throw new RangeError('too big'); }");
        let err = ctx.call(&json!(1), &json!({})).unwrap_err();
        assert_eq!(err, HandlerError::new("RangeError", "too big"));
    }

    #[test]
    fn test_promise_chain_settles() {
        let mut ctx = context(
            "function handler(x, c) { return Promise.resolve(x).then(v => v + 1).then(v => ({ v: v })); }",
        );
        assert_eq!(ctx.call(&json!(1), &json!({})).unwrap(), json!({"v": 2}));
    }

    #[test]
    fn test_plain_object_is_not_awaited() {
        let mut ctx = context("function handler(x, c) { return { then: 1, state: 'pending' }; }");
        assert_eq!(
            ctx.call(&json!(null), &json!({})).unwrap(),
            json!({"then": 1, "state": "pending"})
        );
    }

    #[test]
    fn test_unrepresentable_output() {
        let mut ctx = context("function handler(x, c) { return 10n; }");
        let err = ctx.call(&json!(1), &json!({})).unwrap_err();
        assert_eq!(err.kind, "ConversionError");
    }

    #[test]
    fn test_loop_iteration_limit() {
        let limits = ResourceLimits::default().with_loop_iteration_limit(1_000);
        let mut ctx =
            HandlerContext::new("function handler(x, c) { while (true) {} }", &limits).unwrap();
        let err = ctx.call(&json!(null), &json!({})).unwrap_err();
        assert_eq!(err.kind, "RuntimeLimit");
    }

    #[test]
    fn test_recursion_limit() {
        let limits = ResourceLimits::default().with_recursion_limit(64);
        let mut ctx = HandlerContext::new(
            "function f(n) { return f(n + 1); } function handler(x, c) { return f(0); }",
            &limits,
        )
        .unwrap();
        let err = ctx.call(&json!(null), &json!({})).unwrap_err();
        assert_eq!(err.kind, "RuntimeLimit");
    }
}
