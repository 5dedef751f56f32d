use crate::errors::ProbeError;

/// Operand value in a comparison clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
}

impl Value {
    /// Integer view used by ordering comparisons. Strings holding an integer
    /// (e.g. a header value) are accepted; anything else is a type mismatch.
    pub fn as_int(&self, expr: &str) -> Result<i64, ProbeError> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Str(s) => s.trim().parse::<i64>().map_err(|_| ProbeError::TypeMismatch {
                operand: s.clone(),
                expr: expr.to_string(),
            }),
        }
    }

    /// Equality is textual: `Int(200)` equals `Str("200")`.
    pub fn text_eq(&self, other: &Value) -> bool {
        self.to_string() == other.to_string()
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{}", n),
        }
    }
}
