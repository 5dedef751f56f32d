use regex::Regex;

use crate::errors::ProbeError;
use crate::expression::literal::call_argument;
use crate::expression::{evaluate, EvalContext};
use crate::http::Response;

const HEADERS_GET: &str = "response.headers.get";
const BODY_EXTRACT: &str = "response.body.extract";

/// Derive a cookie string from `response` using an extraction expression.
///
/// - `response.headers.get('<name>')` returns every value of that header
///   joined with `"; "`. When the header is missing, the response's parsed
///   cookies are joined instead.
/// - `response.body.extract('<regex>')` returns the first capture group of
///   the first match in the body. `r'…'` raw quoting is accepted.
///
/// Finding nothing is not an error: the result is an empty string.
pub fn extract_cookie(expr: &str, response: Option<&Response>) -> Result<String, ProbeError> {
    let response = response.ok_or(ProbeError::EmptyResponse)?;
    let expr = expr.trim();

    if expr.contains(HEADERS_GET) {
        let name = call_argument(expr, HEADERS_GET)
            .ok_or_else(|| ProbeError::Extraction(format!("cannot parse headers.get expression: {}", expr)))?;

        if let Some(values) = response.headers.get_all(name).filter(|v| !v.is_empty()) {
            return Ok(values.join("; "));
        }

        if !response.cookies.is_empty() {
            let joined: Vec<String> = response.cookies.iter().map(|c| c.to_string()).collect();
            return Ok(joined.join("; "));
        }

        return Ok(String::new());
    }

    if expr.contains(BODY_EXTRACT) {
        let pattern = call_argument(expr, BODY_EXTRACT)
            .ok_or_else(|| ProbeError::Extraction(format!("cannot parse body.extract expression: {}", expr)))?;

        let regex = Regex::new(pattern).map_err(|source| ProbeError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let extracted = regex
            .captures(&response.body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        return Ok(extracted);
    }

    Err(ProbeError::UnsupportedExtraction(expr.to_string()))
}

/// Check `cookie` against a cookie expression such as
/// `cookie.contains('PHPSESSID')`. An empty expression accepts any cookie.
///
/// Evaluation runs against a synthetic 200 response with an empty body, so
/// only cookie predicates are meaningful here.
pub fn validate_cookie(expr: &str, cookie: &str) -> Result<bool, ProbeError> {
    if expr.trim().is_empty() {
        return Ok(true);
    }

    let synthetic = Response::synthetic();
    evaluate(expr, &EvalContext::new(Some(&synthetic), cookie))
        .map_err(|e| ProbeError::ValidationParse(Box::new(e)))
}
