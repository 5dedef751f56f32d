use super::evaluator::EvalContext;
use super::literal::{call_argument, quoted};
use super::value::Value;
use crate::errors::ProbeError;

const BODY_CONTAINS: &str = "response.body.contains";
const COOKIE_CONTAINS: &str = "cookie.contains";
const HEADERS_GET: &str = "response.headers.get";
const STATUS: &str = "response.status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

impl CmpOp {
    /// Two-character operators come first so `>=` is never read as `>`.
    const SEARCH_ORDER: [CmpOp; 6] = [CmpOp::Eq, CmpOp::Ne, CmpOp::Ge, CmpOp::Le, CmpOp::Gt, CmpOp::Lt];

    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Literal(String),
    Integer(i64),
    Status,
    Header(String),
    Word(String),
}

impl Operand {
    fn parse(text: &str, expr: &str) -> Result<Self, ProbeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ProbeError::parse(expr, "missing operand"));
        }
        if let Some(inner) = quoted(text) {
            return Ok(Operand::Literal(inner.to_string()));
        }
        if text == STATUS {
            return Ok(Operand::Status);
        }
        if text.contains(HEADERS_GET) {
            let name = call_argument(text, HEADERS_GET)
                .ok_or_else(|| ProbeError::parse(expr, "headers.get expects a quoted header name"))?;
            return Ok(Operand::Header(name.to_string()));
        }
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Operand::Integer(n));
        }
        Ok(Operand::Word(text.to_string()))
    }

    fn value(&self, ctx: &EvalContext<'_>) -> Value {
        match self {
            Operand::Literal(s) | Operand::Word(s) => Value::Str(s.clone()),
            Operand::Integer(n) => Value::Int(*n),
            Operand::Status => Value::Int(ctx.response.map_or(0, |r| i64::from(r.status))),
            Operand::Header(name) => Value::Str(
                ctx.response
                    .and_then(|r| r.headers.first(name))
                    .unwrap_or_default()
                    .to_string(),
            ),
        }
    }
}

/// A single condition with no logical operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    BodyContains(String),
    CookieContains(String),
    Compare { lhs: Operand, op: CmpOp, rhs: Operand },
}

impl Clause {
    /// Parse one clause. Predicates are recognised before comparisons, and
    /// comparisons in `==, !=, >=, <=, >, <` order.
    pub fn parse(expr: &str) -> Result<Self, ProbeError> {
        let expr = expr.trim();

        if expr.contains(BODY_CONTAINS) {
            let needle = call_argument(expr, BODY_CONTAINS)
                .ok_or_else(|| ProbeError::parse(expr, "contains expects a quoted, non-empty argument"))?;
            return Ok(Clause::BodyContains(needle.to_string()));
        }

        if expr.contains(COOKIE_CONTAINS) {
            let needle = call_argument(expr, COOKIE_CONTAINS)
                .ok_or_else(|| ProbeError::parse(expr, "contains expects a quoted, non-empty argument"))?;
            return Ok(Clause::CookieContains(needle.to_string()));
        }

        for op in CmpOp::SEARCH_ORDER {
            if !expr.contains(op.symbol()) {
                continue;
            }
            let parts: Vec<&str> = expr.split(op.symbol()).collect();
            if parts.len() != 2 {
                return Err(ProbeError::parse(
                    expr,
                    format!("expected exactly one '{}' operator", op.symbol()),
                ));
            }
            return Ok(Clause::Compare {
                lhs: Operand::parse(parts[0], expr)?,
                op,
                rhs: Operand::parse(parts[1], expr)?,
            });
        }

        Err(ProbeError::UnsupportedExpression(expr.to_string()))
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>, expr: &str) -> Result<bool, ProbeError> {
        match self {
            // No response means nothing to search, not an error.
            Clause::BodyContains(needle) => Ok(ctx.response.is_some_and(|r| r.body.contains(needle.as_str()))),
            Clause::CookieContains(needle) => Ok(ctx.cookie.contains(needle.as_str())),
            Clause::Compare { lhs, op, rhs } => {
                let left = lhs.value(ctx);
                let right = rhs.value(ctx);
                match op {
                    CmpOp::Eq => Ok(left.text_eq(&right)),
                    CmpOp::Ne => Ok(!left.text_eq(&right)),
                    CmpOp::Ge => Ok(left.as_int(expr)? >= right.as_int(expr)?),
                    CmpOp::Le => Ok(left.as_int(expr)? <= right.as_int(expr)?),
                    CmpOp::Gt => Ok(left.as_int(expr)? > right.as_int(expr)?),
                    CmpOp::Lt => Ok(left.as_int(expr)? < right.as_int(expr)?),
                }
            }
        }
    }
}
