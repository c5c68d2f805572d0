//! TypeScript/JSX to evaluable-JavaScript transpiler.
//!
//! All three phases preserve line numbering so runtime positions stay
//! meaningful:
//! - JSX lowers to `jsx(tag, props, ...children)` calls; when an element
//!   collapses onto fewer lines, the difference is padded with newlines.
//! - Type annotations are blanked with spaces, which preserves columns too.
//! - Imports rewrite in place to `require(...)` declarations; export
//!   bindings are re-emitted as `module.exports` assignments on appended
//!   (unmapped) lines at the end of the file.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{Result, SandboxError};
use crate::sourcemap::{Segment, SourceMap};

/// Output of transpiling one module.
#[derive(Debug)]
pub struct TranspiledModule {
    /// Evaluable code.
    pub code: String,
    /// Map from generated positions back to the original file.
    pub map: SourceMap,
    /// Export binding names; the default export appears as `"default"`.
    pub exports: Vec<String>,
}

/// Transpiles one source file.
pub fn transpile(file: &str, source: &str) -> Result<TranspiledModule> {
    let lowered = lower_jsx(source).map_err(|m| SandboxError::compilation(file, m))?;
    let stripped = strip_types(&lowered).map_err(|m| SandboxError::compilation(file, m))?;
    let (code, exports) = rewrite_modules(&stripped);
    let map = build_map(file, source, &code);
    Ok(TranspiledModule { code, map, exports })
}

/// `true` for the extensions the sandbox compiles.
#[must_use]
pub fn is_source_file(name: &str) -> bool {
    [".ts", ".tsx", ".js", ".jsx"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

// ============================================================================
// Mapping
// ============================================================================

/// Builds the generated-to-original map. Lines whose length survived the
/// transforms get a segment per token start (column-accurate); rewritten
/// lines map to column 0; appended export lines stay unmapped.
#[allow(clippy::cast_possible_truncation)]
fn build_map(file: &str, original: &str, generated: &str) -> SourceMap {
    let orig_lines: Vec<&str> = original.lines().collect();
    let mut lines = Vec::new();
    for (i, gen_line) in generated.lines().enumerate() {
        let Some(orig_line) = orig_lines.get(i) else {
            lines.push(Vec::new());
            continue;
        };
        let line_no = i as u32;
        let columns_preserved =
            gen_line.chars().count() == orig_line.chars().count();
        let mut segments = Vec::new();
        if columns_preserved {
            let mut in_token = false;
            for (col, c) in gen_line.chars().enumerate() {
                if c.is_whitespace() {
                    in_token = false;
                } else if !in_token {
                    in_token = true;
                    segments.push(Segment {
                        generated_column: col as u32,
                        source_index: 0,
                        original_line: line_no,
                        original_column: col as u32,
                    });
                }
            }
        }
        if segments.is_empty() {
            segments.push(Segment {
                generated_column: 0,
                source_index: 0,
                original_line: line_no,
                original_column: 0,
            });
        }
        lines.push(segments);
    }
    SourceMap::from_segments(vec![file.to_string()], lines)
}

// ============================================================================
// Shared lexical helpers
// ============================================================================

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Index just past a string literal starting at `start` (a quote).
fn skip_string(chars: &[char], start: usize) -> std::result::Result<usize, String> {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\n' => return Err("unterminated string literal".to_string()),
            c if c == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err("unterminated string literal".to_string())
}

/// Index just past a template literal starting at `start` (a backtick).
fn skip_template(chars: &[char], start: usize) -> std::result::Result<usize, String> {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '`' => return Ok(i + 1),
            '$' if chars.get(i + 1) == Some(&'{') => {
                i = skip_braced(chars, i + 1)?;
            }
            _ => i += 1,
        }
    }
    Err("unterminated template literal".to_string())
}

/// Index just past a balanced `{ ... }` starting at `start` (a brace).
fn skip_braced(chars: &[char], start: usize) -> std::result::Result<usize, String> {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '{' => {
                depth += 1;
                i += 1;
            }
            '}' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            '"' | '\'' => i = skip_string(chars, i)?,
            '`' => i = skip_template(chars, i)?,
            _ => i += 1,
        }
    }
    Err("unbalanced braces".to_string())
}

// ============================================================================
// Phase 1: JSX lowering
// ============================================================================

const EXPR_KEYWORDS: &[&str] = &[
    "return", "typeof", "new", "in", "of", "case", "do", "else", "void", "delete", "await",
    "yield", "default",
];

fn lower_jsx(source: &str) -> std::result::Result<String, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    let mut prev: Option<char> = None;
    let mut last_word = String::new();

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                let end = skip_string(&chars, i)?;
                out.extend(&chars[i..end]);
                prev = Some(c);
                last_word.clear();
                i = end;
            }
            '`' => {
                let end = skip_template(&chars, i)?;
                out.extend(&chars[i..end]);
                prev = Some(c);
                last_word.clear();
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    out.push(chars[i]);
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let start = i;
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
                out.extend(&chars[start..i]);
            }
            '<' if jsx_starts_here(&chars, i, prev, &last_word) => {
                let (end, rendered) = parse_jsx_element(&chars, i)?;
                let consumed = chars[i..end].iter().filter(|&&ch| ch == '\n').count();
                let produced = rendered.matches('\n').count();
                out.push_str(&rendered);
                for _ in produced..consumed {
                    out.push('\n');
                }
                prev = Some(')');
                last_word.clear();
                i = end;
            }
            _ => {
                out.push(c);
                if is_word_char(c) {
                    last_word.push(c);
                } else if !c.is_whitespace() {
                    last_word.clear();
                }
                if !c.is_whitespace() {
                    prev = Some(c);
                }
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Heuristic: `<` begins JSX only in expression position, and only when
/// followed by a tag name or `>` (fragment). `a < b` and generic argument
/// lists (`useState<number>(0)`) never qualify because the `<` follows an
/// identifier.
fn jsx_starts_here(chars: &[char], i: usize, prev: Option<char>, last_word: &str) -> bool {
    let next = match chars.get(i + 1) {
        Some(&c) => c,
        None => return false,
    };
    if !(next.is_alphabetic() || next == '_' || next == '$' || next == '>') {
        return false;
    }
    match prev {
        None => true,
        Some(p) if is_word_char(p) => EXPR_KEYWORDS.contains(&last_word),
        Some('(' | ',' | '{' | '[' | ';' | '=' | '?' | ':' | '&' | '|' | '!' | '>') => true,
        _ => false,
    }
}

fn skip_jsx_ws(chars: &[char], i: &mut usize) {
    while chars.get(*i).is_some_and(|c| c.is_whitespace()) {
        *i += 1;
    }
}

fn read_tag_name(chars: &[char], i: &mut usize) -> String {
    let mut name = String::new();
    while chars
        .get(*i)
        .is_some_and(|&c| is_word_char(c) || c == '.' || c == '-')
    {
        name.push(chars[*i]);
        *i += 1;
    }
    name
}

fn escape_js_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Collapses JSX text the way the syntax does: surrounding whitespace is
/// trimmed and internal runs collapse to a single space.
fn collapse_jsx_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn serialize_jsx(tag: &str, attrs: &[String], children: &[String]) -> String {
    let tag_expr = if tag.is_empty() {
        "Fragment".to_string()
    } else if tag.starts_with(|c: char| c.is_ascii_lowercase()) && !tag.contains('.') {
        format!("\"{tag}\"")
    } else {
        tag.to_string()
    };
    let props = if attrs.is_empty() {
        "null".to_string()
    } else {
        format!("{{ {} }}", attrs.join(", "))
    };
    let mut out = format!("jsx({tag_expr}, {props}");
    for child in children {
        out.push_str(", ");
        out.push_str(child);
    }
    out.push(')');
    out
}

#[allow(clippy::too_many_lines)]
fn parse_jsx_element(
    chars: &[char],
    start: usize,
) -> std::result::Result<(usize, String), String> {
    let mut i = start + 1; // past '<'
    skip_jsx_ws(chars, &mut i);
    let tag = read_tag_name(chars, &mut i);

    let mut attrs: Vec<String> = Vec::new();
    loop {
        skip_jsx_ws(chars, &mut i);
        match chars.get(i) {
            None => return Err(format!("unterminated element <{tag}>")),
            Some('/') if chars.get(i + 1) == Some(&'>') => {
                return Ok((i + 2, serialize_jsx(&tag, &attrs, &[])));
            }
            Some('>') => {
                i += 1;
                break;
            }
            Some('{') => {
                let end = skip_braced(chars, i)?;
                let inner: String = chars[i + 1..end - 1].iter().collect();
                let Some(rest) = inner.trim().strip_prefix("...") else {
                    return Err(format!("expected a spread attribute in <{tag}>"));
                };
                attrs.push(format!("...({})", lower_jsx(rest)?));
                i = end;
            }
            _ => {
                let mut name = String::new();
                while chars
                    .get(i)
                    .is_some_and(|&c| is_word_char(c) || c == '-')
                {
                    name.push(chars[i]);
                    i += 1;
                }
                if name.is_empty() {
                    return Err(format!("malformed attribute in <{tag}>"));
                }
                skip_jsx_ws(chars, &mut i);
                if chars.get(i) == Some(&'=') {
                    i += 1;
                    skip_jsx_ws(chars, &mut i);
                    match chars.get(i) {
                        Some('"' | '\'') => {
                            let end = skip_string(chars, i)?;
                            let inner: String = chars[i + 1..end - 1].iter().collect();
                            attrs.push(format!("\"{name}\": {}", escape_js_string(&inner)));
                            i = end;
                        }
                        Some('{') => {
                            let end = skip_braced(chars, i)?;
                            let inner: String = chars[i + 1..end - 1].iter().collect();
                            attrs.push(format!("\"{name}\": ({})", lower_jsx(&inner)?));
                            i = end;
                        }
                        _ => {
                            return Err(format!(
                                "expected a value for attribute '{name}' in <{tag}>"
                            ));
                        }
                    }
                } else {
                    attrs.push(format!("\"{name}\": true"));
                }
            }
        }
    }

    // Children until the matching closing tag.
    let mut children: Vec<String> = Vec::new();
    let mut text = String::new();
    loop {
        match chars.get(i) {
            None => return Err(format!("missing closing tag for <{tag}>")),
            Some('<') if chars.get(i + 1) == Some(&'/') => {
                let collapsed = collapse_jsx_text(&text);
                if !collapsed.is_empty() {
                    children.push(escape_js_string(&collapsed));
                }
                i += 2;
                skip_jsx_ws(chars, &mut i);
                let close = read_tag_name(chars, &mut i);
                skip_jsx_ws(chars, &mut i);
                if chars.get(i) != Some(&'>') {
                    return Err(format!("malformed closing tag for <{tag}>"));
                }
                if close != tag {
                    return Err(format!(
                        "mismatched closing tag </{close}> (expected </{tag}>)"
                    ));
                }
                return Ok((i + 1, serialize_jsx(&tag, &attrs, &children)));
            }
            Some('<') => {
                let collapsed = collapse_jsx_text(&text);
                if !collapsed.is_empty() {
                    children.push(escape_js_string(&collapsed));
                }
                text.clear();
                let (end, rendered) = parse_jsx_element(chars, i)?;
                children.push(rendered);
                i = end;
            }
            Some('{') => {
                let collapsed = collapse_jsx_text(&text);
                if !collapsed.is_empty() {
                    children.push(escape_js_string(&collapsed));
                }
                text.clear();
                let end = skip_braced(chars, i)?;
                let inner: String = chars[i + 1..end - 1].iter().collect();
                if !inner.trim().is_empty() {
                    children.push(format!("({})", lower_jsx(&inner)?));
                }
                i = end;
            }
            Some(&c) => {
                text.push(c);
                i += 1;
            }
        }
    }
}

// ============================================================================
// Phase 2: type stripping
// ============================================================================

#[derive(Debug)]
struct BraceLevel {
    /// `true` when this `{`/`(`/`[` level is an object literal.
    object: bool,
    /// Ternary `?`s awaiting their `:` at this level.
    ternaries: usize,
}

/// Blanks TypeScript-only syntax with spaces, preserving every position
/// of the JavaScript that remains.
#[allow(clippy::too_many_lines)]
fn strip_types(source: &str) -> std::result::Result<String, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut out: Vec<char> = chars.clone();
    let mut stack: Vec<BraceLevel> = vec![BraceLevel {
        object: false,
        ternaries: 0,
    }];
    let mut prev: Option<char> = None;
    let mut last_word = String::new();
    // Protects `as` inside `import`/`export { .. }` specifier clauses.
    let mut in_module_clause = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '"' || c == '\'' {
            i = skip_string(&chars, i)?;
            prev = Some(c);
            last_word.clear();
            continue;
        }
        if c == '`' {
            i = skip_template(&chars, i)?;
            prev = Some(c);
            last_word.clear();
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
            continue;
        }

        // Words are handled as units so keywords can be recognized.
        if is_word_char(c) && (i == 0 || !is_word_char(chars[i - 1])) {
            let mut end = i;
            while chars.get(end).is_some_and(|&ch| is_word_char(ch)) {
                end += 1;
            }
            let word: String = chars[i..end].iter().collect();
            let stmt_position =
                prev.is_none() || matches!(prev, Some(';' | '{' | '}')) || last_word == "export";

            match word.as_str() {
                "import" => in_module_clause = true,
                "export" => {
                    in_module_clause = next_significant(&chars, end) == Some('{');
                }
                "interface" if stmt_position => {
                    i = blank_interface(&chars, &mut out, i)?;
                    prev = Some('}');
                    last_word.clear();
                    continue;
                }
                "type" if stmt_position && is_type_alias(&chars, end) => {
                    i = blank_until_semicolon(&chars, &mut out, i);
                    prev = Some(';');
                    last_word.clear();
                    continue;
                }
                "as" if !in_module_clause
                    && matches!(prev, Some(p) if is_word_char(p) || matches!(p, ')' | ']' | '"' | '\'' | '`')) =>
                {
                    i = blank_annotation(&chars, &mut out, i);
                    prev = Some(' ');
                    last_word.clear();
                    continue;
                }
                _ => {}
            }
            prev = chars.get(end - 1).copied();
            last_word = word;
            i = end;
            continue;
        }

        match c {
            '(' | '[' => {
                stack.push(BraceLevel {
                    object: false,
                    ternaries: 0,
                });
                prev = Some(c);
                last_word.clear();
            }
            '{' => {
                // `=> {` leaves prev at '>', which lands in the block
                // (non-object) case.
                let object = matches!(
                    prev,
                    Some('(' | ',' | '[' | '=' | ':' | '?' | '&' | '|' | '!')
                ) || last_word == "return";
                stack.push(BraceLevel {
                    object,
                    ternaries: 0,
                });
                prev = Some(c);
                last_word.clear();
            }
            ')' | ']' | '}' => {
                if stack.len() > 1 {
                    stack.pop();
                }
                prev = Some(c);
                last_word.clear();
            }
            ';' | '\n' => {
                if c == ';' {
                    prev = Some(c);
                }
                in_module_clause = false;
            }
            '?' => {
                if matches!(chars.get(i + 1), Some('.' | '?')) {
                    // optional chaining / nullish, not a ternary
                    prev = Some('?');
                } else if next_significant(&chars, i + 1) == Some(':') {
                    out[i] = ' '; // optional parameter or member marker
                } else if let Some(level) = stack.last_mut() {
                    level.ternaries += 1;
                    prev = Some('?');
                }
                last_word.clear();
            }
            ':' => {
                let level_object = stack.last().is_some_and(|l| l.object);
                let pending = stack.last().is_some_and(|l| l.ternaries > 0);
                if level_object {
                    prev = Some(':');
                } else if pending {
                    if let Some(level) = stack.last_mut() {
                        level.ternaries -= 1;
                    }
                    prev = Some(':');
                } else {
                    i = blank_annotation(&chars, &mut out, i);
                    prev = Some(' ');
                    last_word.clear();
                    continue;
                }
                last_word.clear();
            }
            '<' if prev.is_some_and(is_word_char) && !in_module_clause => {
                if let Some(end) = generic_args_end(&chars, i) {
                    for slot in out.iter_mut().take(end).skip(i) {
                        *slot = ' ';
                    }
                    i = end;
                    continue;
                }
                prev = Some('<');
                last_word.clear();
            }
            _ => {
                if !c.is_whitespace() {
                    prev = Some(c);
                    last_word.clear();
                }
            }
        }
        i += 1;
    }
    Ok(out.into_iter().collect())
}

fn next_significant(chars: &[char], mut i: usize) -> Option<char> {
    while chars.get(i).is_some_and(|c| *c == ' ' || *c == '\t') {
        i += 1;
    }
    chars.get(i).copied()
}

/// `type X = ...` (alias declaration) vs `type` used as an identifier.
fn is_type_alias(chars: &[char], mut i: usize) -> bool {
    while chars.get(i).is_some_and(|c| c.is_whitespace()) {
        i += 1;
    }
    if !chars.get(i).is_some_and(|&c| is_word_char(c)) {
        return false;
    }
    while chars.get(i).is_some_and(|&c| is_word_char(c)) {
        i += 1;
    }
    while chars.get(i).is_some_and(|c| c.is_whitespace()) {
        i += 1;
    }
    matches!(chars.get(i), Some('=' | '<'))
}

/// Blanks `interface Name { ... }` including the body. Returns the index
/// just past the closing brace.
fn blank_interface(
    chars: &[char],
    out: &mut [char],
    start: usize,
) -> std::result::Result<usize, String> {
    let mut i = start;
    while i < chars.len() && chars[i] != '{' {
        if chars[i] != '\n' {
            out[i] = ' ';
        }
        i += 1;
    }
    if i == chars.len() {
        return Err("malformed interface declaration".to_string());
    }
    let end = skip_braced(chars, i)?;
    for j in i..end {
        if chars[j] != '\n' {
            out[j] = ' ';
        }
    }
    Ok(end)
}

/// Blanks from `start` through the terminating `;` (or end of line at
/// nesting depth zero). Used for `type X = ...;` aliases.
fn blank_until_semicolon(chars: &[char], out: &mut [char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '{' | '(' | '[' | '<' => depth += 1,
            '}' | ')' | ']' | '>' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => {
                out[i] = ' ';
                return i + 1;
            }
            '\n' if depth == 0 => return i,
            _ => {}
        }
        if chars[i] != '\n' {
            out[i] = ' ';
        }
        i += 1;
    }
    i
}

/// Blanks an annotation starting at `start` (a `:` or the `as` keyword)
/// until a stop character at nesting depth zero. Returns the stop index.
fn blank_annotation(chars: &[char], out: &mut [char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        match c {
            // A depth-zero `{` is a following body block, not part of the
            // annotation (inline object types are out of scope).
            '{' | ')' | ']' | '}' | ',' | ';' | '\n' | '=' if depth == 0 => return i,
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if c != '\n' {
            out[i] = ' ';
        }
        i += 1;
    }
    i
}

/// Detects `ident<TypeArgs>(` and returns the index just past `>`.
fn generic_args_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() && i - start < 200 {
        match chars[i] {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth == 0 {
                    return if chars.get(i + 1) == Some(&'(') {
                        Some(i + 1)
                    } else {
                        None
                    };
                }
            }
            c if is_word_char(c) || matches!(c, ',' | '.' | ' ' | '[' | ']' | '|' | '&') => {}
            _ => return None,
        }
        i += 1;
    }
    None
}

// ============================================================================
// Phase 3: imports and exports
// ============================================================================

static IMPORT_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*import\s+type\b[^\n]*").unwrap_or_else(|_| unreachable!()));

static IMPORT_SIDE_EFFECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^([ \t]*)import\s*["']([^"']+)["']\s*;?"#).unwrap_or_else(|_| unreachable!())
});

static IMPORT_FULL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"import\s+(?:([A-Za-z_$][\w$]*)\s*,\s*)?(?:\{([^}]*)\}|\*\s*as\s+([A-Za-z_$][\w$]*)|([A-Za-z_$][\w$]*))\s+from\s+["']([^"']+)["']\s*;?"#,
    )
    .unwrap_or_else(|_| unreachable!())
});

static EXPORT_DEFAULT_FN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"export\s+default\s+function\s+([A-Za-z_$][\w$]*)")
        .unwrap_or_else(|_| unreachable!())
});

static EXPORT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+(const|let|var|function)\s+([A-Za-z_$][\w$]*)")
        .unwrap_or_else(|_| unreachable!())
});

static EXPORT_DEFAULT_EXPR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+default\s+").unwrap_or_else(|_| unreachable!())
});

static EXPORT_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*export\s*\{([^}]*)\}\s*;?").unwrap_or_else(|_| unreachable!()));

fn blank_preserving(text: &str) -> String {
    text.chars().map(|c| if c == '\n' { '\n' } else { ' ' }).collect()
}

/// Pads `replacement` with newlines until it contains as many as `matched`,
/// keeping line counts stable through the rewrite.
fn pad_newlines(matched: &str, mut replacement: String) -> String {
    let want = matched.matches('\n').count();
    let have = replacement.matches('\n').count();
    for _ in have..want {
        replacement.push('\n');
    }
    replacement
}

/// `a as b, c` (import/export list) -> destructuring / export entries.
fn split_named(list: &str) -> Vec<(String, Option<String>)> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            entry.split_once(" as ").map_or_else(
                || (entry.to_string(), None),
                |(name, alias)| (name.trim().to_string(), Some(alias.trim().to_string())),
            )
        })
        .collect()
}

fn rewrite_modules(source: &str) -> (String, Vec<String>) {
    let mut exports: Vec<String> = Vec::new();
    let mut appendix: Vec<String> = Vec::new();

    let code = IMPORT_TYPE.replace_all(source, |caps: &Captures<'_>| {
        blank_preserving(&caps[0])
    });

    let code = IMPORT_SIDE_EFFECT.replace_all(&code, |caps: &Captures<'_>| {
        pad_newlines(&caps[0], format!("{}require(\"{}\");", &caps[1], &caps[2]))
    });

    let code = IMPORT_FULL.replace_all(&code, |caps: &Captures<'_>| {
        let spec = &caps[5];
        let mut declarators: Vec<String> = Vec::new();
        if let Some(default) = caps.get(1).or_else(|| caps.get(4)) {
            declarators.push(format!(
                "{} = require(\"{spec}\").default",
                default.as_str()
            ));
        }
        if let Some(named) = caps.get(2) {
            let bindings = split_named(named.as_str())
                .into_iter()
                .map(|(name, alias)| match alias {
                    Some(alias) => format!("{name}: {alias}"),
                    None => name,
                })
                .collect::<Vec<_>>()
                .join(", ");
            declarators.push(format!("{{ {bindings} }} = require(\"{spec}\")"));
        }
        if let Some(ns) = caps.get(3) {
            declarators.push(format!("{} = require(\"{spec}\")", ns.as_str()));
        }
        pad_newlines(&caps[0], format!("const {};", declarators.join(", ")))
    });

    let code = EXPORT_DEFAULT_FN.replace_all(&code, |caps: &Captures<'_>| {
        let name = caps[1].to_string();
        appendix.push(format!("module.exports.default = {name};"));
        exports.push("default".to_string());
        let keep = format!("function {name}");
        let blank_len = caps[0].chars().count().saturating_sub(keep.chars().count());
        format!("{}{keep}", " ".repeat(blank_len))
    });

    let code = EXPORT_DECL.replace_all(&code, |caps: &Captures<'_>| {
        let name = caps[3].to_string();
        appendix.push(format!("module.exports.{name} = {name};"));
        exports.push(name);
        let keep = format!("{} {}", &caps[2], &caps[3]);
        let blank_len = caps[0].chars().count()
            - caps[1].chars().count()
            - keep.chars().count();
        format!("{}{}{keep}", &caps[1], " ".repeat(blank_len))
    });

    let code = EXPORT_DEFAULT_EXPR.replace_all(&code, |caps: &Captures<'_>| {
        exports.push("default".to_string());
        format!("{}module.exports.default = ", &caps[1])
    });

    let code = EXPORT_LIST.replace_all(&code, |caps: &Captures<'_>| {
        for (name, alias) in split_named(&caps[1]) {
            let exported = alias.unwrap_or_else(|| name.clone());
            appendix.push(format!("module.exports.{exported} = {name};"));
            exports.push(exported);
        }
        blank_preserving(&caps[0])
    });

    let mut code = code.into_owned();
    for line in appendix {
        code.push('\n');
        code.push_str(&line);
    }
    exports.dedup();
    (code, exports)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_annotation_preserves_columns() {
        let source = "const a: number = 1;";
        let stripped = strip_types(source).unwrap();
        assert_eq!(stripped.len(), source.len());
        assert!(!stripped.contains("number"));
        assert!(stripped.starts_with("const a"));
        // `=` keeps its original column.
        assert_eq!(stripped.find('=').unwrap(), source.find('=').unwrap());
    }

    #[test]
    fn test_strip_param_and_return_types() {
        let source = "function add(a: number, b: number): number {\n  return a + b;\n}";
        let stripped = strip_types(source).unwrap();
        assert_eq!(stripped.len(), source.len());
        assert!(!stripped.contains("number"));
        assert!(stripped.contains("function add(a"));
        assert!(stripped.contains("return a + b;"));
        assert_eq!(stripped.find('{').unwrap(), source.find('{').unwrap());
    }

    #[test]
    fn test_strip_optional_parameter() {
        let source = "function f(x?: string) {}";
        let stripped = strip_types(source).unwrap();
        assert_eq!(stripped.len(), source.len());
        assert!(!stripped.contains('?'));
        assert!(!stripped.contains("string"));
        assert!(stripped.contains("function f(x"));
    }

    #[test]
    fn test_ternary_colon_survives() {
        let source = "const x = flag ? 1 : 2;";
        assert_eq!(strip_types(source).unwrap(), source);
    }

    #[test]
    fn test_object_literal_colons_survive() {
        let source = "const o = { a: 1, b: \"two\" };";
        assert_eq!(strip_types(source).unwrap(), source);
    }

    #[test]
    fn test_optional_chaining_untouched() {
        let source = "const v = o?.a ?? 0;";
        assert_eq!(strip_types(source).unwrap(), source);
    }

    #[test]
    fn test_interface_blanked_keeps_lines() {
        let source = "interface Props {\n  label: string;\n}\nconst x = 1;";
        let stripped = strip_types(source).unwrap();
        assert_eq!(stripped.lines().count(), source.lines().count());
        assert!(!stripped.contains("interface"));
        assert!(!stripped.contains("label"));
        assert!(stripped.contains("const x = 1;"));
    }

    #[test]
    fn test_type_alias_blanked() {
        let stripped = strip_types("type Mode = \"a\" | \"b\";\nlet m = \"a\";").unwrap();
        assert!(!stripped.contains("Mode"));
        assert!(stripped.contains("let m = \"a\";"));
    }

    #[test]
    fn test_generic_call_arguments_blanked() {
        let source = "const [n, setN] = useState<number>(0);";
        let stripped = strip_types(source).unwrap();
        assert_eq!(stripped.len(), source.len());
        assert!(!stripped.contains("<number>"));
        assert!(stripped.contains("useState"));
        assert_eq!(stripped.find("(0)").unwrap(), source.find("(0)").unwrap());
    }

    #[test]
    fn test_comparison_is_not_a_generic() {
        let source = "const less = a < b;";
        assert_eq!(strip_types(source).unwrap(), source);
    }

    #[test]
    fn test_as_cast_blanked() {
        let source = "const n = value as number;";
        let stripped = strip_types(source).unwrap();
        assert_eq!(stripped.len(), source.len());
        assert!(!stripped.contains(" as "));
        assert!(stripped.contains("const n = value"));
        assert!(stripped.trim_end().ends_with(';'));
    }

    #[test]
    fn test_jsx_lowering_basic() {
        let lowered = lower_jsx(r#"const el = <div className="box">hi</div>;"#).unwrap();
        assert_eq!(
            lowered,
            r#"const el = jsx("div", { "className": "box" }, "hi");"#
        );
    }

    #[test]
    fn test_jsx_lowering_nested_and_expressions() {
        let lowered = lower_jsx(
            "return <button onClick={() => setCount(count + 1)}>Increment: {count}</button>;",
        )
        .unwrap();
        assert_eq!(
            lowered,
            "return jsx(\"button\", { \"onClick\": (() => setCount(count + 1)) }, \"Increment:\", (count));"
        );
    }

    #[test]
    fn test_jsx_component_and_fragment() {
        let lowered = lower_jsx("const t = <><Label text=\"hi\" /></>;").unwrap();
        assert_eq!(
            lowered,
            "const t = jsx(Fragment, null, jsx(Label, { \"text\": \"hi\" }));"
        );
    }

    #[test]
    fn test_jsx_preserves_line_count() {
        let source = "const el = (\n  <div>\n    <span>{x}</span>\n  </div>\n);";
        let lowered = lower_jsx(source).unwrap();
        assert_eq!(lowered.lines().count(), source.lines().count());
    }

    #[test]
    fn test_jsx_in_map_callback() {
        let lowered =
            lower_jsx("items.map(item => <li key={item.id}>{item.name}</li>);").unwrap();
        assert_eq!(
            lowered,
            "items.map(item => jsx(\"li\", { \"key\": (item.id) }, (item.name)));"
        );
    }

    #[test]
    fn test_mismatched_closing_tag_is_an_error() {
        let err = lower_jsx("const x = <div>text</span>;").unwrap_err();
        assert!(err.contains("</span>"));
        assert!(err.contains("</div>"));
    }

    #[test]
    fn test_comparison_less_than_is_not_jsx() {
        let source = "if (a < b) { f(); }";
        assert_eq!(lower_jsx(source).unwrap(), source);
    }

    #[test]
    fn test_import_rewrites() {
        let (code, _) = rewrite_modules("import React from \"react\";");
        assert_eq!(code, "const React = require(\"react\").default;");

        let (code, _) = rewrite_modules("import { useState, useEffect } from \"react\";");
        assert_eq!(
            code,
            "const { useState, useEffect } = require(\"react\");"
        );

        let (code, _) = rewrite_modules("import * as helpers from \"./helpers\";");
        assert_eq!(code, "const helpers = require(\"./helpers\");");

        let (code, _) = rewrite_modules("import App, { reset } from \"./App\";");
        assert_eq!(
            code,
            "const App = require(\"./App\").default, { reset } = require(\"./App\");"
        );
    }

    #[test]
    fn test_import_alias() {
        let (code, _) = rewrite_modules("import { jsx as h } from \"react/jsx-runtime\";");
        assert_eq!(code, "const { jsx: h } = require(\"react/jsx-runtime\");");
    }

    #[test]
    fn test_export_default_function() {
        let (code, exports) =
            rewrite_modules("export default function App() {\n  return 1;\n}");
        assert!(code.contains("function App()"));
        assert!(!code.contains("export"));
        assert!(code.ends_with("module.exports.default = App;"));
        assert_eq!(exports, vec!["default"]);
    }

    #[test]
    fn test_export_const_keeps_columns_shifted_right() {
        let (code, exports) = rewrite_modules("export const limit = 10;");
        assert!(code.contains("const limit = 10;"));
        assert!(code.contains("module.exports.limit = limit;"));
        assert_eq!(exports, vec!["limit"]);
        // The declaration line keeps its original length.
        assert_eq!(
            code.lines().next().unwrap().len(),
            "export const limit = 10;".len()
        );
    }

    #[test]
    fn test_export_default_expression() {
        let (code, exports) = rewrite_modules("export default App;");
        assert!(code.contains("module.exports.default = App;"));
        assert_eq!(exports, vec!["default"]);
    }

    #[test]
    fn test_export_list_with_alias() {
        let (code, exports) = rewrite_modules("const a = 1;\nexport { a as alpha };");
        assert!(code.contains("module.exports.alpha = a;"));
        assert_eq!(exports, vec!["alpha"]);
    }

    #[test]
    fn test_transpile_counter_component() {
        let source = "import { useState } from \"react\";\n\nexport default function Counter(): JSX.Element {\n  const [count, setCount] = useState<number>(0);\n  return <button onClick={() => setCount(count + 1)}>Count: {count}</button>;\n}";
        let module = transpile("Counter.tsx", source).unwrap();
        assert!(module.code.contains("const { useState } = require(\"react\");"));
        assert!(module.code.contains("jsx(\"button\""));
        assert!(module.code.contains("module.exports.default = Counter;"));
        assert_eq!(module.exports, vec!["default"]);
        // Body lines stay aligned; the appendix adds one line at the end.
        assert_eq!(
            module.code.lines().count(),
            source.lines().count() + 1
        );
    }

    #[test]
    fn test_map_round_trips_positions() {
        let source = "const a: number = 1;\nconst b = nope;";
        let module = transpile("main.ts", source).unwrap();
        // Line 2 is untouched, so columns survive exactly.
        let loc = module.map.lookup(2, 10).unwrap();
        assert_eq!(loc.file, "main.ts");
        assert_eq!(loc.line, 2);
        assert_eq!(loc.column, 10);
    }

    #[test]
    fn test_appendix_lines_are_unmapped() {
        let module = transpile("m.ts", "export const x = 1;").unwrap();
        let appendix_line = module.code.lines().count() as u32;
        assert!(module.map.lookup(appendix_line, 0).is_none());
    }

    #[test]
    fn test_is_source_file() {
        assert!(is_source_file("App.tsx"));
        assert!(is_source_file("util.ts"));
        assert!(is_source_file("legacy.jsx"));
        assert!(is_source_file("plain.js"));
        assert!(!is_source_file("styles.css"));
        assert!(!is_source_file("notes.md"));
    }
}
