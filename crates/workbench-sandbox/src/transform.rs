//! Best-effort conversion of generated TSX into JSX the in-sandbox Babel can run.
//!
//! This is a set of regular expressions plus a little bracket matching, not a
//! parser. Known limits:
//! - string literals and comments are not tokenised, so TypeScript-looking text
//!   inside them may be rewritten; casts are the exception and are kept inside
//!   quotes that open and close on the same line;
//! - ` as Type` in JSX text (e.g. "sign in as Guest") is treated as a cast, and
//!   an apostrophe earlier on the line hides a real cast after it;
//! - enums, namespaces, decorators and overload signatures are left untouched;
//! - object-typed variable annotations (`const x: { a: number } = ...`) keep
//!   their type when it spans several lines.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::errors::TransformError;

/// Name given to an anonymous default export.
pub const ANONYMOUS_ENTRY: &str = "SandboxEntry";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedSource {
    pub code: String,
    /// Component mounted by the document.
    pub entry_point: String,
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern is valid")
}

static IMPORT_FROM: Lazy<Regex> =
    Lazy::new(|| regex(r#"(?m)^[ \t]*import\b[^;'"]*?\bfrom\s*['"][^'"\n]*['"][ \t]*;?[ \t]*\n?"#));
static SIDE_EFFECT_IMPORT: Lazy<Regex> =
    Lazy::new(|| regex(r#"(?m)^[ \t]*import\s*['"][^'"\n]*['"][ \t]*;?[ \t]*\n?"#));
static INTERFACE_HEAD: Lazy<Regex> = Lazy::new(|| {
    regex(r"(?m)^[ \t]*(?:export\s+)?(?:declare\s+)?interface\s+[A-Za-z_$][\w$]*[^{]*\{")
});
static TYPE_ALIAS_HEAD: Lazy<Regex> = Lazy::new(|| {
    regex(r"(?m)^[ \t]*(?:export\s+)?(?:declare\s+)?type\s+[A-Za-z_$][\w$]*\s*(?:<[^=\n]*>)?\s*=")
});
static RETURN_TYPE_ARROW: Lazy<Regex> =
    Lazy::new(|| regex(r#"\)\s*:\s*[A-Za-z_$][\w$.<>\[\]|&, '"]*?\s*=>"#));
static RETURN_TYPE_BLOCK: Lazy<Regex> =
    Lazy::new(|| regex(r#"\)\s*:\s*[A-Za-z_$][\w$.<>\[\]|&, '"]*?\s*\{"#));
static FUNCTION_TYPE_PARAMS: Lazy<Regex> =
    Lazy::new(|| regex(r"(\bfunction\s*\*?\s*[A-Za-z_$][\w$]*)\s*<[^<>()]*>\s*\("));
static FUNCTION_HEAD: Lazy<Regex> =
    Lazy::new(|| regex(r"\bfunction\b\s*\*?\s*[\w$]*\s*\("));
static VARIABLE_ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    regex(r"\b(const|let|var)\s+([A-Za-z_$][\w$]*)\s*:(?:[^=;\n]|=>)+?=([^>=])")
});
static GENERIC_CALL: Lazy<Regex> =
    Lazy::new(|| regex(r"\b([A-Za-z_$][\w$]*)<(?:[^<>()\n]|<[^<>()\n]*>)*>\("));
static AS_CAST: Lazy<Regex> = Lazy::new(|| {
    regex(
        r"\s+as\s+(?:(?:const|any|unknown|string|number|boolean)\b|[A-Z][\w$.]*(?:<[^<>\n]*>)?)(?:\[\])*",
    )
});
static EXPORT_DEFAULT_DECL: Lazy<Regex> = Lazy::new(|| {
    regex(
        r"(?m)^([ \t]*)export\s+default\s+((?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)|class\s+([A-Za-z_$][\w$]*))",
    )
});
static EXPORT_DEFAULT_IDENT: Lazy<Regex> =
    Lazy::new(|| regex(r"(?m)^[ \t]*export\s+default\s+([A-Za-z_$][\w$]*)[ \t]*;?[ \t]*$\n?"));
static EXPORT_DEFAULT_ANON_FN: Lazy<Regex> =
    Lazy::new(|| regex(r"(?m)^([ \t]*)export\s+default\s+((?:async\s+)?function)\s*\("));
static EXPORT_DEFAULT_EXPR: Lazy<Regex> =
    Lazy::new(|| regex(r"(?m)^([ \t]*)export\s+default\s+"));
static EXPORT_LIST: Lazy<Regex> = Lazy::new(|| {
    regex(r#"(?m)^[ \t]*export\s*\{[^}]*\}\s*(?:from\s*['"][^'"\n]*['"])?[ \t]*;?[ \t]*\n?"#)
});
static EXPORT_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    regex(r"(?m)^([ \t]*)export\s+((?:const|let|var|function|class|async)\b)")
});
static ENTRY_FUNCTION: Lazy<Regex> =
    Lazy::new(|| regex(r"(?m)^[ \t]*(?:async\s+)?function\s+([A-Z][\w$]*)"));
static ENTRY_CONST: Lazy<Regex> =
    Lazy::new(|| regex(r"(?m)^[ \t]*(?:const|let|var)\s+([A-Z][\w$]*)\s*="));

/// Strips TypeScript syntax and module syntax and finds the component to mount.
pub fn transform(source: &str) -> Result<TransformedSource, TransformError> {
    if source.trim().is_empty() {
        return Err(TransformError::Empty);
    }
    let code = source.replace("\r\n", "\n");
    let code = IMPORT_FROM.replace_all(&code, "");
    let code = SIDE_EFFECT_IMPORT.replace_all(&code, "");
    let code = remove_interfaces(&code);
    let code = remove_type_aliases(&code);
    let code = RETURN_TYPE_ARROW.replace_all(&code, ") =>");
    let code = RETURN_TYPE_BLOCK.replace_all(&code, ") {");
    let code = FUNCTION_TYPE_PARAMS.replace_all(&code, "${1}(");
    let code = strip_parameter_annotations(&code);
    let code = VARIABLE_ANNOTATION.replace_all(&code, "${1} ${2} =${3}");
    let code = GENERIC_CALL.replace_all(&code, "${1}(");
    let code = strip_casts(&code);
    let (code, default_export) = strip_exports(&code);

    let entry_point = default_export
        .or_else(|| first_component(&code))
        .ok_or(TransformError::NoEntryPoint)?;
    debug!(entry_point = %entry_point, bytes = code.len(), "source transformed");
    Ok(TransformedSource {
        code: format!("{}\n", code.trim()),
        entry_point,
    })
}

/// Removes `as` casts except those inside a quoted string.
fn strip_casts(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut last = 0;
    for m in AS_CAST.find_iter(src) {
        if inside_quotes(src, m.start()) {
            continue;
        }
        out.push_str(&src[last..m.start()]);
        last = m.end();
    }
    out.push_str(&src[last..]);
    out
}

/// Whether `at` falls inside a `'`, `"` or `` ` `` string opened earlier on
/// the same line.
fn inside_quotes(src: &str, at: usize) -> bool {
    let line_start = src[..at].rfind('\n').map_or(0, |i| i + 1);
    let mut open: Option<char> = None;
    let mut escaped = false;
    for c in src[line_start..at].chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match (open, c) {
            (Some(_), '\\') => escaped = true,
            (None, '\'' | '"' | '`') => open = Some(c),
            (Some(quote), c) if c == quote => open = None,
            _ => {}
        }
    }
    open.is_some()
}

fn remove_interfaces(src: &str) -> String {
    let mut out = src.to_string();
    loop {
        let Some(m) = INTERFACE_HEAD.find(&out) else {
            break;
        };
        let (start, open) = (m.start(), m.end() - 1);
        let end = matching_close(out.as_bytes(), open).map_or(out.len(), |close| close + 1);
        let end = skip_terminator(out.as_bytes(), end);
        out.replace_range(start..end, "");
    }
    out
}

fn remove_type_aliases(src: &str) -> String {
    let mut out = src.to_string();
    loop {
        let Some(m) = TYPE_ALIAS_HEAD.find(&out) else {
            break;
        };
        let (start, body) = (m.start(), m.end());
        let end = type_alias_end(&out, body);
        let end = skip_terminator(out.as_bytes(), end);
        out.replace_range(start..end, "");
    }
    out
}

/// End of a type alias body: a `;` at depth 0, or a depth-0 line break not
/// continued by `|` or `&`.
fn type_alias_end(src: &str, from: usize) -> usize {
    let bytes = src.as_bytes();
    let mut depth: i32 = 0;
    let mut seen_body = false;
    for i in from..bytes.len() {
        match bytes[i] {
            b'{' | b'(' | b'[' | b'<' => depth += 1,
            b'}' | b')' | b']' => depth -= 1,
            b'>' if bytes[i - 1] != b'=' => depth -= 1,
            b';' if depth <= 0 => return i + 1,
            b'\n' if depth <= 0 && seen_body => {
                let rest = src[i + 1..].trim_start();
                if !(rest.starts_with('|') || rest.starts_with('&')) {
                    return i + 1;
                }
            }
            _ => {}
        }
        if !bytes[i].is_ascii_whitespace() {
            seen_body = true;
        }
    }
    bytes.len()
}

fn skip_terminator(bytes: &[u8], mut end: usize) -> usize {
    while end < bytes.len() && matches!(bytes[end], b' ' | b'\t') {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b';' {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'\n' {
        end += 1;
    }
    end
}

fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let (o, c) = match bytes.get(open)? {
        b'(' => (b'(', b')'),
        b'{' => (b'{', b'}'),
        b'[' => (b'[', b']'),
        _ => return None,
    };
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if b == o {
            depth += 1;
        } else if b == c {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn matching_open_paren(bytes: &[u8], close: usize) -> Option<usize> {
    let mut depth = 0usize;
    for i in (0..=close).rev() {
        match bytes[i] {
            b')' => depth += 1,
            b'(' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Removes annotations from function and arrow parameter lists.
fn strip_parameter_annotations(src: &str) -> String {
    let bytes = src.as_bytes();
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for m in FUNCTION_HEAD.find_iter(src) {
        let open = m.end() - 1;
        if let Some(close) = matching_close(bytes, open) {
            ranges.push((open, close));
        }
    }
    for (idx, _) in src.match_indices("=>") {
        let before = src[..idx].trim_end();
        if before.ends_with(')')
            && let Some(open) = matching_open_paren(bytes, before.len() - 1)
        {
            ranges.push((open, before.len() - 1));
        }
    }
    ranges.sort_unstable();
    ranges.dedup();

    let mut outermost: Vec<(usize, usize)> = Vec::new();
    for range in ranges {
        if outermost.last().is_some_and(|last| range.1 < last.1) {
            continue;
        }
        outermost.push(range);
    }

    let mut out = src.to_string();
    for (open, close) in outermost.into_iter().rev() {
        let params = &src[open + 1..close];
        if !params.contains(':') {
            continue;
        }
        let stripped: Vec<String> = split_top_level(params).into_iter().map(strip_one).collect();
        out.replace_range(open + 1..close, &stripped.join(","));
    }
    out
}

fn split_top_level(s: &str) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'{' | b'[' | b'<' => depth += 1,
            b')' | b'}' | b']' => depth -= 1,
            b'>' if i > 0 && bytes[i - 1] != b'=' => depth -= 1,
            b',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// `name?: Type = default` becomes `name = default`.
fn strip_one(param: &str) -> String {
    let bytes = param.as_bytes();
    let mut depth: i32 = 0;
    let mut colon = None;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'{' | b'[' | b'<' => depth += 1,
            b')' | b'}' | b']' => depth -= 1,
            b'>' if i > 0 && bytes[i - 1] != b'=' => depth -= 1,
            b':' if depth == 0 && colon.is_none() => colon = Some(i),
            b'=' if depth == 0 && bytes.get(i + 1) != Some(&b'>') => {
                return match colon {
                    Some(c) => format!("{} {}", binding(&param[..c]), &param[i..]),
                    None => param.to_string(),
                };
            }
            _ => {}
        }
    }
    match colon {
        Some(c) => binding(&param[..c]).to_string(),
        None => param.to_string(),
    }
}

fn binding(name: &str) -> &str {
    name.trim_end().trim_end_matches('?')
}

fn strip_exports(src: &str) -> (String, Option<String>) {
    let mut entry = None;
    let code = if let Some(caps) = EXPORT_DEFAULT_DECL.captures(src) {
        entry = caps.get(3).or_else(|| caps.get(4)).map(|m| m.as_str().to_string());
        EXPORT_DEFAULT_DECL.replacen(src, 1, "${1}${2}").into_owned()
    } else if let Some(caps) = EXPORT_DEFAULT_IDENT.captures(src) {
        entry = Some(caps[1].to_string());
        EXPORT_DEFAULT_IDENT.replacen(src, 1, "").into_owned()
    } else if EXPORT_DEFAULT_ANON_FN.is_match(src) {
        entry = Some(ANONYMOUS_ENTRY.to_string());
        EXPORT_DEFAULT_ANON_FN
            .replacen(src, 1, format!("${{1}}${{2}} {ANONYMOUS_ENTRY}("))
            .into_owned()
    } else if EXPORT_DEFAULT_EXPR.is_match(src) {
        entry = Some(ANONYMOUS_ENTRY.to_string());
        EXPORT_DEFAULT_EXPR
            .replacen(src, 1, format!("${{1}}const {ANONYMOUS_ENTRY} = "))
            .into_owned()
    } else {
        src.to_string()
    };
    let code = EXPORT_LIST.replace_all(&code, "");
    let code = EXPORT_KEYWORD.replace_all(&code, "${1}${2}");
    (code.into_owned(), entry)
}

fn first_component(code: &str) -> Option<String> {
    let function = ENTRY_FUNCTION.captures(code).and_then(|c| c.get(1));
    let constant = ENTRY_CONST.captures(code).and_then(|c| c.get(1));
    let first = match (function, constant) {
        (Some(f), Some(c)) => Some(if f.start() < c.start() { f } else { c }),
        (f, c) => f.or(c),
    };
    first.map(|m| m.as_str().to_string())
}
