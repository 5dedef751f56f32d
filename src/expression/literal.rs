//! String-literal and call-argument parsing shared by the clause evaluator and
//! the cookie extractor.

/// Strip a trailing `#` comment.
pub fn strip_comment(expr: &str) -> &str {
    match expr.find('#') {
        Some(idx) => &expr[..idx],
        None => expr,
    }
}

/// Inner text of a whole-string literal: `'abc'` or `"abc"`.
pub fn quoted(text: &str) -> Option<&str> {
    let text = text.trim();
    let first = text.chars().next()?;
    if (first == '\'' || first == '"') && text.len() >= 2 && text.ends_with(first) {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

/// The quoted argument of the first `callee(...)` call in `expr`.
///
/// Accepts `'…'` and `"…"`, plus the raw forms `r'…'` and `r"…"` used for
/// regular expressions. The argument must be non-empty and must not contain
/// its own quote character. Returns `None` when `callee(` is absent or the
/// argument is malformed.
pub fn call_argument<'a>(expr: &'a str, callee: &str) -> Option<&'a str> {
    let open = format!("{}(", callee);
    let start = expr.find(&open)? + open.len();
    let rest = expr[start..].trim_start();

    let rest = match rest.strip_prefix('r') {
        Some(raw) if raw.starts_with('\'') || raw.starts_with('"') => raw,
        _ => rest,
    };

    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let body = &rest[1..];
    let end = body.find(quote)?;
    let argument = &body[..end];
    if argument.is_empty() {
        return None;
    }

    body[end + 1..].trim_start().starts_with(')').then_some(argument)
}

/// Remove one pair of parentheses wrapping the whole text, if the opening
/// parenthesis is matched by the final character.
pub fn unwrap_parens(text: &str) -> Option<&str> {
    let text = text.trim();
    if !text.starts_with('(') || !text.ends_with(')') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (idx, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return (idx == text.len() - 1).then(|| &text[1..idx]);
                }
            }
            _ => {}
        }
    }
    None
}
