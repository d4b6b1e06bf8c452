//! `console` bindings for handler code
//!
//! Output from `console.*` inside a handler is forwarded to the daemon's
//! structured log under the `handler` target, so it ends up in the same log
//! file as request traces.

use boa_engine::{
    js_string, native_function::NativeFunction, object::FunctionObjectBuilder, property::Attribute,
    Context, JsObject, JsResult, JsString, JsValue,
};

use crate::conversions::display_value;

type ConsoleFn = fn(&JsValue, &[JsValue], &mut Context) -> JsResult<JsValue>;

fn format_args(args: &[JsValue], ctx: &mut Context) -> String {
    args.iter()
        .map(|arg| display_value(arg, ctx))
        .collect::<Vec<_>>()
        .join(" ")
}

fn console_log(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let line = format_args(args, ctx);
    tracing::info!(target: "handler", "{line}");
    Ok(JsValue::undefined())
}

fn console_warn(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let line = format_args(args, ctx);
    tracing::warn!(target: "handler", "{line}");
    Ok(JsValue::undefined())
}

fn console_error(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let line = format_args(args, ctx);
    tracing::error!(target: "handler", "{line}");
    Ok(JsValue::undefined())
}

fn console_debug(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let line = format_args(args, ctx);
    tracing::debug!(target: "handler", "{line}");
    Ok(JsValue::undefined())
}

fn console_trace(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let line = format_args(args, ctx);
    tracing::trace!(target: "handler", "{line}");
    Ok(JsValue::undefined())
}

/// Install a global `console` object into the context
pub(crate) fn install_console(ctx: &mut Context) -> JsResult<()> {
    let console = JsObject::default(ctx.intrinsics());

    let methods: [(&str, ConsoleFn); 6] = [
        ("log", console_log),
        ("info", console_log),
        ("warn", console_warn),
        ("error", console_error),
        ("debug", console_debug),
        ("trace", console_trace),
    ];

    for (name, method) in methods {
        let function = FunctionObjectBuilder::new(ctx.realm(), NativeFunction::from_fn_ptr(method))
            .name(JsString::from(name))
            .length(0)
            .build();
        console.set(JsString::from(name), function, false, ctx)?;
    }

    ctx.register_global_property(js_string!("console"), console, Attribute::all())
}
