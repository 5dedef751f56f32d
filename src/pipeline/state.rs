use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::Stage;

/// Mutable state of one run: the outcome of every rule executed so far and
/// the cookie shared by all rules.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    results: HashMap<String, bool>,
    stored_cookie: String,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, rule: &str, outcome: bool) {
        self.results.insert(rule.to_string(), outcome);
    }

    pub fn result(&self, rule: &str) -> Option<bool> {
        self.results.get(rule).copied()
    }

    pub fn results(&self) -> &HashMap<String, bool> {
        &self.results
    }

    pub fn stored_cookie(&self) -> &str {
        &self.stored_cookie
    }

    /// Replace the stored cookie. Empty values are ignored so a rule that
    /// finds nothing does not erase an earlier session.
    pub fn store_cookie(&mut self, cookie: String) -> bool {
        if cookie.is_empty() {
            return false;
        }
        self.stored_cookie = cookie;
        true
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleState {
    Pending,
    Running,
    Satisfied,
    Unsatisfied,
    Failed,
}

impl std::fmt::Display for RuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Satisfied => write!(f, "satisfied"),
            Self::Unsatisfied => write!(f, "unsatisfied"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RuleReason {
    CookieRejected { cookie_expression: String },
    ExpressionFalse { expression: String },
    Error { stage: Stage, error_type: String, message: String },
}

impl std::fmt::Display for RuleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CookieRejected { cookie_expression } => {
                write!(f, "cookie rejected by `{}`", cookie_expression)
            }
            Self::ExpressionFalse { expression } => write!(f, "`{}` evaluated to false", expression),
            Self::Error { stage, message, .. } => write!(f, "{} failed: {}", stage, message),
        }
    }
}

/// Something that went wrong in a rule without deciding its outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleWarning {
    pub stage: Stage,
    pub error_type: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleReport {
    pub name: String,
    pub state: RuleState,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RuleReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<RuleWarning>,
    #[serde(default)]
    pub cookie_extracted: bool,
}

impl RuleReport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: RuleState::Pending,
            passed: false,
            status: None,
            elapsed_ms: None,
            reason: None,
            warnings: Vec::new(),
            cookie_extracted: false,
        }
    }

    pub fn satisfied(&mut self) {
        self.state = RuleState::Satisfied;
        self.passed = true;
    }

    pub fn unsatisfied(&mut self, reason: RuleReason) {
        self.state = RuleState::Unsatisfied;
        self.passed = false;
        self.reason = Some(reason);
    }

    pub fn failed(&mut self, reason: RuleReason) {
        self.state = RuleState::Failed;
        self.passed = false;
        self.reason = Some(reason);
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub verdict: bool,
    pub results: BTreeMap<String, bool>,
    pub rules: Vec<RuleReport>,
}

impl RunReport {
    pub fn passed(&self) -> usize {
        self.rules.iter().filter(|r| r.passed).count()
    }

    pub fn warnings(&self) -> usize {
        self.rules.iter().map(|r| r.warnings.len()).sum()
    }

    pub fn rule(&self, name: &str) -> Option<&RuleReport> {
        self.rules.iter().find(|r| r.name == name)
    }
}
