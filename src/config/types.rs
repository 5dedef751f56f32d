use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::RetryPolicy;
use crate::http::{effective_timeout, RequestOptions};

/// A proof-of-concept file: descriptive metadata, the rules to run and the
/// aggregate expression that combines their outcomes.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PocConfig {
    pub name: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub cve_id: Option<String>,
    pub level: Option<String>,
    pub source: Option<String>,
    pub s1: Option<String>,
    #[serde(default)]
    pub rules: RuleSet,
    pub expression: Option<String>,
}

impl PocConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or("unnamed")
    }

    pub fn metadata(&self) -> PocMetadata {
        PocMetadata {
            name: self.name.clone(),
            author: self.author.clone(),
            category: self.category.clone(),
            cve_id: self.cve_id.clone(),
            level: self.level.clone(),
            source: self.source.clone(),
            s1: self.s1.clone(),
        }
    }
}

/// The descriptive part of a [`PocConfig`], echoed into scan output.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PocMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cve_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s1: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// One probe: a request plus optional extraction and validation steps.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RuleSpec {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub path: String,
    /// Seconds. Anything below 60 is raised to 60.
    #[serde(default)]
    pub timeout: i64,
    #[serde(default)]
    pub retry_count: i64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub body: Vec<String>,
    pub extract_cookie: Option<String>,
    pub use_cookie: Option<String>,
    pub cookie_expression: Option<String>,
    pub expression: Option<String>,
}

impl Default for RuleSpec {
    fn default() -> Self {
        Self {
            method: default_method(),
            path: String::new(),
            timeout: 0,
            retry_count: 0,
            headers: HashMap::new(),
            body: Vec::new(),
            extract_cookie: None,
            use_cookie: None,
            cookie_expression: None,
            expression: None,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl RuleSpec {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = vec![body.to_string()];
        self
    }

    pub fn with_retries(mut self, retry_count: i64) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_extract_cookie(mut self, expr: &str) -> Self {
        self.extract_cookie = Some(expr.to_string());
        self
    }

    pub fn with_use_cookie(mut self, value: &str) -> Self {
        self.use_cookie = Some(value.to_string());
        self
    }

    pub fn with_cookie_expression(mut self, expr: &str) -> Self {
        self.cookie_expression = Some(expr.to_string());
        self
    }

    pub fn with_expression(mut self, expr: &str) -> Self {
        self.expression = Some(expr.to_string());
        self
    }

    pub fn timeout(&self) -> Duration {
        let declared = u64::try_from(self.timeout).unwrap_or(0);
        effective_timeout(Duration::from_secs(declared))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_declared(self.retry_count)
    }

    /// Only the first body element is sent.
    pub fn body(&self) -> Option<&str> {
        self.body.first().map(String::as_str).filter(|b| !b.is_empty())
    }

    pub fn extract_cookie(&self) -> Option<&str> {
        non_blank(&self.extract_cookie)
    }

    pub fn use_cookie(&self) -> Option<&str> {
        non_blank(&self.use_cookie)
    }

    pub fn cookie_expression(&self) -> Option<&str> {
        non_blank(&self.cookie_expression)
    }

    pub fn expression(&self) -> Option<&str> {
        non_blank(&self.expression)
    }

    pub fn to_request_options(&self) -> RequestOptions {
        let mut opts = RequestOptions::new(&self.method, &self.path);
        opts.headers = self.headers.clone();
        opts.body = self.body().map(str::to_string);
        opts.use_cookie = self.use_cookie().map(str::to_string);
        opts.timeout = self.timeout();
        opts.retry = self.retry_policy();
        opts
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Nothing(()) => Vec::new(),
    })
}

/// Rules keyed by name, in the order they were declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    entries: Vec<(String, RuleSpec)>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced rule keeps its original position.
    pub fn insert(&mut self, name: impl Into<String>, rule: RuleSpec) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = rule,
            None => self.entries.push((name, rule)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RuleSpec> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RuleSpec)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, RuleSpec)> for RuleSet {
    fn from_iter<I: IntoIterator<Item = (N, RuleSpec)>>(iter: I) -> Self {
        let mut set = RuleSet::new();
        for (name, rule) in iter {
            set.insert(name, rule);
        }
        set
    }
}

impl Serialize for RuleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, rule) in &self.entries {
            map.serialize_entry(name, rule)?;
        }
        map.end()
    }
}

struct RuleSetVisitor;

impl<'de> Visitor<'de> for RuleSetVisitor {
    type Value = RuleSet;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping of rule names to rule definitions")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RuleSet, A::Error> {
        let mut set = RuleSet::new();
        while let Some((name, rule)) = access.next_entry::<String, RuleSpec>()? {
            if set.contains(&name) {
                return Err(de::Error::custom(format!("duplicate rule '{}'", name)));
            }
            set.entries.push((name, rule));
        }
        Ok(set)
    }

    fn visit_unit<E: de::Error>(self) -> Result<RuleSet, E> {
        Ok(RuleSet::new())
    }
}

impl<'de> Deserialize<'de> for RuleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RuleSetVisitor)
    }
}
