use super::clause::Clause;
use super::literal::{strip_comment, unwrap_parens};
use crate::errors::ProbeError;
use crate::http::Response;

/// What a rule expression can see: the rule's response (if any) and the
/// run's stored cookie.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub response: Option<&'a Response>,
    pub cookie: &'a str,
}

impl<'a> EvalContext<'a> {
    pub fn new(response: Option<&'a Response>, cookie: &'a str) -> Self {
        Self { response, cookie }
    }
}

/// Evaluate a rule expression.
///
/// Logical operators do not follow conventional precedence: if `||` occurs
/// anywhere the text is split on every `||`, otherwise on every `&&`, and
/// each piece is evaluated as a single clause. Only a segment that is
/// wrapped in parentheses as a whole recurses, e.g. `(a && b) || c`.
/// Wrapping the entire expression does not group it: the split runs first,
/// so `(a && b)` yields the segments `(a` and `b)`.
pub fn evaluate(expr: &str, ctx: &EvalContext<'_>) -> Result<bool, ProbeError> {
    let expr = strip_comment(expr).trim();

    if expr.contains("||") {
        for segment in expr.split("||") {
            if evaluate_single(segment, ctx)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    if expr.contains("&&") {
        for segment in expr.split("&&") {
            if !evaluate_single(segment, ctx)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }

    evaluate_single(expr, ctx)
}

fn evaluate_single(expr: &str, ctx: &EvalContext<'_>) -> Result<bool, ProbeError> {
    let expr = expr.trim();
    if let Some(inner) = unwrap_parens(expr) {
        return evaluate(inner, ctx);
    }
    Clause::parse(expr)?.evaluate(ctx, expr)
}
