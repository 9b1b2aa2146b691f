//! Light-weight handling of embedded PHP expressions.
//!
//! Expressions stay opaque strings. The only rewrites are the pipe operator
//! (`$x |> trim(...) |> strtoupper(...)`) and the `raw()`/`r()` wrappers that
//! opt an output out of escaping. Scanning only tracks string literals and
//! bracket depth so delimiters inside strings or calls are left alone.

/// Byte-level scanner state shared by the helpers below.
#[derive(Default)]
struct Scanner {
    depth: i32,
    quote: Option<u8>,
    escaped: bool,
}

impl Scanner {
    /// Feeds one byte; returns true when the byte is outside any string literal.
    fn feed(&mut self, byte: u8) -> bool {
        if let Some(quote) = self.quote {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == quote {
                self.quote = None;
            }
            return false;
        }
        match byte {
            b'"' | b'\'' => {
                self.quote = Some(byte);
                false
            }
            b'(' | b'[' | b'{' => {
                self.depth += 1;
                true
            }
            b')' | b']' | b'}' => {
                self.depth -= 1;
                true
            }
            _ => true,
        }
    }
}

/// Returns the index of the bracket closing the one at `open`.
fn matching_close(expr: &str, open: usize) -> Option<usize> {
    let bytes = expr.as_bytes();
    let mut scanner = Scanner::default();
    for (i, &byte) in bytes.iter().enumerate().skip(open) {
        if scanner.feed(byte) && scanner.depth == 0 && matches!(byte, b')' | b']' | b'}') {
            return Some(i);
        }
    }
    None
}

/// Splits `expr` on `separator` occurrences outside strings and brackets.
pub fn split_top_level<'a>(expr: &'a str, separator: &str) -> Vec<&'a str> {
    let bytes = expr.as_bytes();
    let sep = separator.as_bytes();
    let mut scanner = Scanner::default();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let code = scanner.feed(bytes[i]);
        if code && scanner.depth == 0 && !sep.is_empty() && bytes[i..].starts_with(sep) {
            parts.push(&expr[start..i]);
            i += sep.len();
            start = i;
            continue;
        }
        i += 1;
    }
    parts.push(&expr[start..]);
    parts
}

/// Returns the inner expression of `raw(...)` or `r(...)`, if `expr` is
/// entirely such a call.
pub fn unwrap_raw(expr: &str) -> Option<&str> {
    let expr = expr.trim();
    let open = if expr.starts_with("raw(") {
        3
    } else if expr.starts_with("r(") {
        1
    } else {
        return None;
    };
    let close = matching_close(expr, open)?;
    (close == expr.len() - 1).then(|| expr[open + 1..close].trim())
}

/// Finds a `...` placeholder argument: `...` directly followed by `,` or `)`.
fn find_placeholder(stage: &str) -> Option<usize> {
    let bytes = stage.as_bytes();
    let mut scanner = Scanner::default();
    for i in 0..bytes.len() {
        if !scanner.feed(bytes[i]) || !bytes[i..].starts_with(b"...") {
            continue;
        }
        let rest = stage[i + 3..].trim_start();
        if rest.starts_with(',') || rest.starts_with(')') {
            return Some(i);
        }
    }
    None
}

/// Applies one pipe stage to `value`.
fn apply_stage(value: &str, stage: &str) -> String {
    if let Some(idx) = find_placeholder(stage) {
        return format!("{}{}{}", &stage[..idx], value, &stage[idx + 3..]);
    }
    if stage.ends_with(')') {
        if let Some(open) = stage.find('(') {
            if matching_close(stage, open) == Some(stage.len() - 1) {
                let args = stage[open + 1..stage.len() - 1].trim();
                return if args.is_empty() {
                    format!("{}({})", &stage[..open], value)
                } else {
                    format!("{}({}, {})", &stage[..open], value, args)
                };
            }
        }
    }
    format!("{stage}({value})")
}

/// Rewrites a pipe chain into nested calls, left to right.
///
/// A stage with a `...` placeholder receives the value there; any other call
/// receives it as the first argument, and a bare callable name is called with
/// the value alone.
pub fn rewrite_pipes(expr: &str) -> String {
    let mut stages = split_top_level(expr, "|>").into_iter().map(str::trim);
    let Some(first) = stages.next() else {
        return String::new();
    };
    stages.fold(first.to_string(), |value, stage| apply_stage(&value, stage))
}

/// Normalizes the body of an output tag.
///
/// Returns the final expression and whether it must be escaped.
pub fn parse_output_expression(raw: &str) -> (String, bool) {
    let mut expr = raw.trim();
    while let Some(stripped) = expr.strip_suffix(';') {
        expr = stripped.trim_end();
    }
    if let Some(inner) = unwrap_raw(expr) {
        return (rewrite_pipes(inner), false);
    }
    let rewritten = rewrite_pipes(expr);
    match unwrap_raw(&rewritten) {
        Some(inner) => (inner.to_string(), false),
        None => (rewritten, true),
    }
}

/// Returns true if `expr` is a literal array (`[...]` or `array(...)`).
pub fn is_array_literal(expr: &str) -> bool {
    let expr = expr.trim();
    let open = if expr.starts_with('[') {
        0
    } else if expr
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("array("))
    {
        5
    } else {
        return false;
    };
    matching_close(expr, open) == Some(expr.len() - 1)
}
