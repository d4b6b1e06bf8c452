//! JSON <-> JavaScript value conversions
//!
//! Both directions go through the engine's own `JSON` object so handlers see
//! exactly what `JSON.parse` would give them, and results follow
//! `JSON.stringify` rules (`toJSON`, dropped functions, `NaN` as `null`,
//! cycles rejected).

use boa_engine::{
    js_string, Context, JsError, JsNativeError, JsObject, JsResult, JsString, JsValue, Source,
};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Why a value could not cross the JSON boundary
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The engine threw while parsing or stringifying
    #[error("{0}")]
    Thrown(JsError),

    /// The engine produced text `serde_json` could not read
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// Nested deeper than [`MAX_DEPTH`]; the engine's stringify recurses natively
    #[error("value is nested more than {0} levels deep")]
    TooDeep(usize),
}

/// Deepest object/array nesting accepted out of the engine, same as
/// `serde_json`'s own recursion limit
pub const MAX_DEPTH: usize = 128;

/// Iterative walk over own enumerable properties. Shared and cyclic
/// references are visited once; cycles are left for `JSON.stringify` to reject.
const WITHIN_DEPTH: &str = r"(function (value, limit) {
    const seen = new Set();
    const pending = [[value, 0]];
    while (pending.length > 0) {
        const [current, depth] = pending.pop();
        if (current === null || typeof current !== 'object' || seen.has(current)) {
            continue;
        }
        if (depth >= limit) {
            return false;
        }
        seen.add(current);
        for (const key of Object.keys(current)) {
            pending.push([current[key], depth + 1]);
        }
    }
    return true;
})";

fn check_depth(value: &JsValue, ctx: &mut Context) -> Result<(), ConversionError> {
    if !value.is_object() {
        return Ok(());
    }

    let check = ctx
        .eval(Source::from_bytes(WITHIN_DEPTH))
        .map_err(ConversionError::Thrown)?;
    let check = check.as_callable().map(|f| f.clone()).ok_or_else(|| {
        ConversionError::Thrown(
            JsNativeError::typ()
                .with_message("depth check is not callable")
                .into(),
        )
    })?;

    #[allow(clippy::cast_precision_loss)]
    let limit = JsValue::new(MAX_DEPTH as f64);
    let within = check
        .call(&JsValue::undefined(), &[value.clone(), limit], ctx)
        .map_err(ConversionError::Thrown)?;

    if within.to_boolean() {
        Ok(())
    } else {
        Err(ConversionError::TooDeep(MAX_DEPTH))
    }
}

fn json_method(name: JsString, ctx: &mut Context) -> JsResult<(JsObject, JsObject)> {
    let json = ctx.global_object().get(js_string!("JSON"), ctx)?;
    let json = json
        .as_object()
        .map(|o| o.clone())
        .ok_or_else(|| JsError::from_opaque(JsValue::from(js_string!("JSON is not available"))))?;
    let method = json.get(name, ctx)?;
    let method = method
        .as_object()
        .filter(|o| o.is_callable())
        .map(|o| o.clone())
        .ok_or_else(|| {
            JsError::from_opaque(JsValue::from(js_string!("JSON method is not callable")))
        })?;
    Ok((json, method))
}

/// Convert a `serde_json::Value` into a JavaScript value
pub fn json_to_js_value(json: &JsonValue, ctx: &mut Context) -> Result<JsValue, ConversionError> {
    let text = serde_json::to_string(json)?;
    let (this, parse) = json_method(js_string!("parse"), ctx).map_err(ConversionError::Thrown)?;
    parse
        .call(&this.into(), &[JsValue::from(JsString::from(text.as_str()))], ctx)
        .map_err(ConversionError::Thrown)
}

/// Convert a JavaScript value into a `serde_json::Value`
///
/// `undefined` (and anything else `JSON.stringify` refuses to encode, such as
/// a bare function) becomes `null`. Values nested past [`MAX_DEPTH`] are
/// rejected before the engine sees them.
pub fn js_value_to_json(value: &JsValue, ctx: &mut Context) -> Result<JsonValue, ConversionError> {
    check_depth(value, ctx)?;

    let (this, stringify) =
        json_method(js_string!("stringify"), ctx).map_err(ConversionError::Thrown)?;
    let text = stringify
        .call(&this.into(), &[value.clone()], ctx)
        .map_err(ConversionError::Thrown)?;

    match text.as_string() {
        Some(s) => Ok(serde_json::from_str(&s.to_std_string_escaped())?),
        None => Ok(JsonValue::Null),
    }
}

/// Render a value the way `console.log` would for a single argument
pub(crate) fn display_value(value: &JsValue, ctx: &mut Context) -> String {
    if let Some(s) = value.as_string() {
        return s.to_std_string_escaped();
    }
    if value.is_object() && !value.is_callable() {
        match js_value_to_json(value, ctx) {
            // Errors stringify to `{}`; fall through to their toString()
            Ok(json) if json.as_object().map_or(true, |o| !o.is_empty()) => {
                return json.to_string();
            }
            // toString() on nested arrays recurses just like stringify
            Err(ConversionError::TooDeep(_)) => return "[deeply nested value]".to_string(),
            _ => {}
        }
    }
    match value.to_string(ctx) {
        Ok(s) if s.to_std_string_escaped() == "[object Object]" => "{}".to_string(),
        Ok(s) => s.to_std_string_escaped(),
        Err(_) => value.display().to_string(),
    }
}
