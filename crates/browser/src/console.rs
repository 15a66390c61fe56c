//! Page console output on the host
//!
//! Console arguments are decoded one by one from the DevTools remote objects
//! and rendered the way Node's `util.format` would. A first argument equal
//! to the sentinel marks a raw write from the framework's stdout, which is
//! emitted without a trailing newline.

use std::io::Write;
use std::sync::Arc;

use chromiumoxide::cdp::js_protocol::runtime::{
    CallFunctionOnParams, RemoteObject, RemoteObjectType,
};
use chromiumoxide::Page;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

/// One decoded console argument
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleArg {
    Undefined,
    Value(Value),
    /// Values JSON cannot carry (`NaN`, `-0`, bigints, functions)
    Raw(String),
}

impl ConsoleArg {
    /// Placeholder for an argument that could not be decoded
    pub fn empty() -> Self {
        ConsoleArg::Value(Value::String(String::new()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConsoleArg::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    fn to_number(&self) -> Option<f64> {
        match self {
            ConsoleArg::Value(Value::Number(n)) => n.as_f64(),
            ConsoleArg::Value(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
            ConsoleArg::Value(Value::Null) => Some(0.0),
            ConsoleArg::Value(Value::String(s)) => {
                let t = s.trim();
                if t.is_empty() {
                    Some(0.0)
                } else {
                    t.parse().ok()
                }
            }
            ConsoleArg::Raw(r) => r.trim_end_matches('n').parse().ok(),
            _ => None,
        }
    }

    /// `%i`: integer prefix of the string form, like `parseInt`
    fn to_int(&self) -> Option<f64> {
        match self {
            ConsoleArg::Value(Value::Number(n)) => n.as_f64().map(f64::trunc),
            ConsoleArg::Value(Value::String(s)) => leading_number(s, false),
            ConsoleArg::Raw(r) => leading_number(r, false),
            _ => None,
        }
    }

    /// `%f`: numeric prefix of the string form, like `parseFloat`
    fn to_float(&self) -> Option<f64> {
        match self {
            ConsoleArg::Value(Value::Number(n)) => n.as_f64(),
            ConsoleArg::Value(Value::String(s)) => leading_number(s, true),
            ConsoleArg::Raw(r) if r == "Infinity" || r == "-Infinity" => r.parse().ok(),
            ConsoleArg::Raw(r) => leading_number(r, true),
            _ => None,
        }
    }

    /// `%s` and bare-argument rendering
    fn display(&self) -> String {
        match self {
            ConsoleArg::Value(Value::String(s)) => s.clone(),
            other => other.inspect(),
        }
    }

    /// `%o`/`%O` rendering, also used for non-string arguments
    fn inspect(&self) -> String {
        match self {
            ConsoleArg::Undefined => "undefined".to_string(),
            ConsoleArg::Raw(r) => r.clone(),
            ConsoleArg::Value(v) => inspect_value(v, true),
        }
    }
}

/// Longest numeric prefix after leading whitespace; `None` when there is none
fn leading_number(s: &str, fraction: bool) -> Option<f64> {
    let t = s.trim_start();
    let bytes = t.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };
    end = digits(end);
    if fraction {
        if bytes.get(end) == Some(&b'.') {
            end = digits(end + 1);
        }
        if matches!(bytes.get(end), Some(b'e' | b'E')) {
            let mut exp = end + 1;
            if matches!(bytes.get(exp), Some(b'+' | b'-')) {
                exp += 1;
            }
            let exp_end = digits(exp);
            if exp_end > exp {
                end = exp_end;
            }
        }
    }
    t[..end].parse().ok()
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn inspect_value(v: &Value, top: bool) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => format_number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) if top => s.clone(),
        Value::String(s) => format!("'{}'", s.replace('\'', "\\'")),
        Value::Array(items) if items.is_empty() => "[]".to_string(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(|i| inspect_value(i, false)).collect();
            format!("[ {} ]", inner.join(", "))
        }
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, inspect_value(v, false)))
                .collect();
            format!("{{ {} }}", inner.join(", "))
        }
    }
}

/// Render arguments like `util.format`.
///
/// A leading string is scanned for `%s %d %i %f %j %o %O %c %%`; arguments
/// left over are appended separated by spaces.
pub fn format_args(args: &[ConsoleArg]) -> String {
    let mut out = String::new();
    let mut rest = args.iter();

    if let Some(first) = args.first() {
        rest.next();
        match first.as_str() {
            Some(fmt) if fmt.contains('%') => {
                let mut chars = fmt.chars().peekable();
                while let Some(c) = chars.next() {
                    if c != '%' {
                        out.push(c);
                        continue;
                    }
                    let Some(&spec) = chars.peek() else {
                        out.push('%');
                        break;
                    };
                    if spec == '%' {
                        chars.next();
                        out.push('%');
                        continue;
                    }
                    if !"sdifjoOc".contains(spec) {
                        out.push('%');
                        continue;
                    }
                    chars.next();
                    let Some(arg) = rest.next() else {
                        out.push('%');
                        out.push(spec);
                        continue;
                    };
                    match spec {
                        's' => out.push_str(&arg.display()),
                        'd' => out.push_str(&format_number(arg.to_number().unwrap_or(f64::NAN))),
                        'i' => out.push_str(&format_number(arg.to_int().unwrap_or(f64::NAN))),
                        'f' => out.push_str(&format_number(arg.to_float().unwrap_or(f64::NAN))),
                        'j' => match arg {
                            ConsoleArg::Value(v) => out.push_str(&v.to_string()),
                            ConsoleArg::Undefined => out.push_str("undefined"),
                            ConsoleArg::Raw(r) => out.push_str(r),
                        },
                        'o' | 'O' => out.push_str(&arg.inspect()),
                        // CSS styling has no terminal equivalent
                        'c' => {}
                        _ => unreachable!(),
                    }
                }
            }
            _ => out.push_str(&first.display()),
        }
    }

    for arg in rest {
        out.push(' ');
        out.push_str(&arg.display());
    }
    out
}

/// Text to write for one console message.
///
/// Sentinel-prefixed messages are raw stdout writes: the remaining arguments
/// are written as-is. Every other message becomes exactly one line.
pub fn render_message(args: &[ConsoleArg], sentinel: &str) -> String {
    match args.first() {
        Some(first) if first.as_str() == Some(sentinel) => format_args(&args[1..]),
        _ => {
            let mut line = format_args(args);
            line.push('\n');
            line
        }
    }
}

/// Writes rendered console messages to a sink, stdout in practice
pub struct ConsolePrinter<W: Write> {
    out: W,
    sentinel: String,
}

impl<W: Write> ConsolePrinter<W> {
    pub fn new(out: W, sentinel: impl Into<String>) -> Self {
        Self {
            out,
            sentinel: sentinel.into(),
        }
    }

    pub fn print(&mut self, args: &[ConsoleArg]) -> std::io::Result<()> {
        let text = render_message(args, &self.sentinel);
        self.out.write_all(text.as_bytes())?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Cloneable in-memory sink, for capturing page output instead of stdout
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Decode a console argument; failures become an empty string
pub async fn decode_arg(page: &Page, obj: &RemoteObject) -> ConsoleArg {
    if let Some(value) = &obj.value {
        return ConsoleArg::Value(value.clone());
    }
    if let Some(raw) = &obj.unserializable_value {
        return ConsoleArg::Raw(raw.inner().clone());
    }
    match obj.r#type {
        RemoteObjectType::Undefined => return ConsoleArg::Undefined,
        RemoteObjectType::Function | RemoteObjectType::Symbol => {
            return ConsoleArg::Raw(obj.description.clone().unwrap_or_default());
        }
        _ => {}
    }

    let Some(object_id) = obj.object_id.clone() else {
        return ConsoleArg::empty();
    };

    let params = match CallFunctionOnParams::builder()
        .function_declaration("function() { return this; }")
        .object_id(object_id)
        .return_by_value(true)
        .build()
    {
        Ok(params) => params,
        Err(e) => {
            debug!("console: cannot build decode call: {}", e);
            return ConsoleArg::empty();
        }
    };

    match page.execute(params).await {
        Ok(resp) if resp.result.exception_details.is_none() => resp
            .result
            .result
            .value
            .clone()
            .map(ConsoleArg::Value)
            .unwrap_or_else(ConsoleArg::empty),
        Ok(_) => ConsoleArg::empty(),
        Err(e) => {
            debug!("console: argument decode failed: {}", e);
            ConsoleArg::empty()
        }
    }
}

/// Decode all arguments of one console call, in order
pub async fn decode_args(page: &Page, args: &[RemoteObject]) -> Vec<ConsoleArg> {
    let mut decoded = Vec::with_capacity(args.len());
    for obj in args {
        decoded.push(decode_arg(page, obj).await);
    }
    decoded
}
