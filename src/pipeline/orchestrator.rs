use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::state::*;
use crate::auth::{extract_cookie, validate_cookie};
use crate::config::{PocConfig, RuleSet, RuleSpec};
use crate::errors::{ProbeError, Stage};
use crate::expression::{evaluate, AggregateExpression, EvalContext};
use crate::http::{RequestExecutor, COOKIE_SENTINEL};

/// Runs a set of rules against one target and combines their outcomes.
///
/// Rules run sequentially in declaration order and share one
/// [`ExecutionContext`]. Each engine owns its executor, so engines for
/// different targets can run side by side.
pub struct Engine {
    rules: RuleSet,
    expression: Option<String>,
    executor: RequestExecutor,
}

impl Engine {
    pub fn new(rules: RuleSet, expression: Option<String>, base_url: &str) -> Result<Self, ProbeError> {
        Ok(Self::with_executor(rules, expression, RequestExecutor::new(base_url)?))
    }

    pub fn with_executor(rules: RuleSet, expression: Option<String>, executor: RequestExecutor) -> Self {
        Self { rules, expression, executor }
    }

    pub fn from_config(config: &PocConfig, base_url: &str) -> Result<Self, ProbeError> {
        Self::new(config.rules.clone(), config.expression.clone(), base_url)
    }

    /// Emit every attempt, retry wait and response as an info-level event.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.executor = self.executor.with_verbose(verbose);
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub async fn run(&self) -> Result<RunReport, ProbeError> {
        let mut ctx = ExecutionContext::new();
        self.run_with(&mut ctx).await
    }

    /// Run against a caller-owned context. When the run aborts, `ctx` still
    /// holds every outcome recorded up to and including the failing rule.
    pub async fn run_with(&self, ctx: &mut ExecutionContext) -> Result<RunReport, ProbeError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let target = self.executor.base_url().to_string();

        let aggregate = match self.expression.as_deref() {
            Some(expr) if AggregateExpression::is_declared(Some(expr)) => Some(AggregateExpression::parse(expr)?),
            _ => None,
        };

        info!(target_url = %target, rules = self.rules.len(), "Run started");

        let mut reports = Vec::with_capacity(self.rules.len());
        for (name, rule) in self.rules.iter() {
            let mut report = RuleReport::new(name);
            let outcome = self.run_rule(name, rule, ctx, &mut report).await;
            ctx.record(name, report.passed);

            if let Err(e) = outcome {
                warn!(rule = %name, error = %e, "Run aborted");
                return Err(e);
            }

            self.log_outcome(&report);
            reports.push(report);
        }

        let verdict = match &aggregate {
            Some(expr) => expr.evaluate(ctx.results()),
            None => self.rules.names().all(|name| ctx.result(name).unwrap_or(false)),
        };

        let results: BTreeMap<String, bool> = ctx.results().iter().map(|(k, v)| (k.clone(), *v)).collect();
        let duration_ms = clock.elapsed().as_millis() as u64;

        info!(target_url = %target, verdict, duration_ms, "Run completed");

        Ok(RunReport {
            run_id: Uuid::new_v4(),
            target,
            started_at,
            duration_ms,
            verdict,
            results,
            rules: reports,
        })
    }

    async fn run_rule(
        &self,
        name: &str,
        rule: &RuleSpec,
        ctx: &mut ExecutionContext,
        report: &mut RuleReport,
    ) -> Result<(), ProbeError> {
        report.state = RuleState::Running;
        debug!(rule = %name, method = %rule.method, path = %rule.path, "Rule started");

        // a. request
        let response = match self.executor.execute(&rule.to_request_options(), ctx.stored_cookie()).await {
            Ok(response) => response,
            Err(e) => return Err(fail(report, e, name, Stage::Request)),
        };
        report.status = Some(response.status);
        report.elapsed_ms = Some(response.elapsed_ms);

        // b. extraction
        if let Some(expr) = rule.extract_cookie() {
            match extract_cookie(expr, Some(&response)) {
                Ok(cookie) => {
                    if ctx.store_cookie(cookie) {
                        report.cookie_extracted = true;
                        debug!(rule = %name, "Stored extracted cookie");
                    } else {
                        debug!(rule = %name, "Extraction found nothing, keeping stored cookie");
                    }
                }
                Err(e) => {
                    warn!(rule = %name, error = %e, "Cookie extraction failed");
                    report.warnings.push(RuleWarning {
                        stage: Stage::Extraction,
                        error_type: e.classify().error_type.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        // c. cookie validation
        if let Some(expr) = rule.cookie_expression() {
            let cookie = match rule.use_cookie() {
                Some(value) if value != COOKIE_SENTINEL => value,
                _ => ctx.stored_cookie(),
            };
            match validate_cookie(expr, cookie) {
                Ok(true) => {}
                Ok(false) => {
                    report.unsatisfied(RuleReason::CookieRejected { cookie_expression: expr.to_string() });
                    return Ok(());
                }
                Err(e) => return Err(fail(report, e, name, Stage::CookieValidation)),
            }
        }

        // d. response validation
        if let Some(expr) = rule.expression() {
            match evaluate(expr, &EvalContext::new(Some(&response), ctx.stored_cookie())) {
                Ok(true) => {}
                Ok(false) => {
                    report.unsatisfied(RuleReason::ExpressionFalse { expression: expr.to_string() });
                    return Ok(());
                }
                Err(e) => return Err(fail(report, e, name, Stage::ResponseValidation)),
            }
        }

        report.satisfied();
        Ok(())
    }

    fn log_outcome(&self, report: &RuleReport) {
        if self.executor.is_verbose() {
            info!(rule = %report.name, state = %report.state, status = ?report.status, "Rule finished");
        } else {
            debug!(rule = %report.name, state = %report.state, "Rule finished");
        }
    }
}

fn fail(report: &mut RuleReport, error: ProbeError, rule: &str, stage: Stage) -> ProbeError {
    report.failed(RuleReason::Error {
        stage,
        error_type: error.classify().error_type.to_string(),
        message: error.to_string(),
    });
    error.in_rule(rule, stage)
}

/// Run `rules` against `base_url` with a fresh context.
pub async fn run(rules: RuleSet, expression: Option<&str>, base_url: &str) -> Result<RunReport, ProbeError> {
    Engine::new(rules, expression.map(str::to_string), base_url)?.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{PreparedRequest, Response, Transport, TransportError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Answers by path; unknown paths fail at the transport level.
    #[derive(Default)]
    struct ScriptedTransport {
        routes: HashMap<String, Response>,
        seen: Mutex<Vec<PreparedRequest>>,
    }

    impl ScriptedTransport {
        fn route(mut self, path: &str, response: Response) -> Self {
            self.routes.insert(format!("http://target.local{}", path), response);
            self
        }

        fn seen(&self) -> Vec<PreparedRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &PreparedRequest) -> Result<Response, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            self.routes
                .get(&request.url)
                .cloned()
                .ok_or_else(|| TransportError::Other(format!("connection refused: {}", request.url)))
        }
    }

    fn engine(transport: &Arc<ScriptedTransport>, rules: RuleSet, expression: Option<&str>) -> Engine {
        let executor = RequestExecutor::with_transport("http://target.local", transport.clone());
        Engine::with_executor(rules, expression.map(str::to_string), executor)
    }

    fn rules(entries: Vec<(&str, RuleSpec)>) -> RuleSet {
        entries.into_iter().collect()
    }

    #[tokio::test]
    async fn test_single_rule_without_checks_is_satisfied() {
        let transport = Arc::new(ScriptedTransport::default().route("/", Response::new(200, "")));
        let report = engine(&transport, rules(vec![("r0", RuleSpec::new("GET", "/"))]), Some("r0()"))
            .run()
            .await
            .unwrap();
        assert!(report.verdict);
        assert_eq!(report.results.get("r0"), Some(&true));
        assert_eq!(report.rule("r0").unwrap().state, RuleState::Satisfied);
        assert_eq!(report.rule("r0").unwrap().status, Some(200));
    }

    #[tokio::test]
    async fn test_rules_run_in_declaration_order() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .route("/z", Response::new(200, ""))
                .route("/a", Response::new(200, ""))
                .route("/m", Response::new(200, "")),
        );
        let set = rules(vec![
            ("zeta", RuleSpec::new("GET", "/z")),
            ("alpha", RuleSpec::new("GET", "/a")),
            ("mid", RuleSpec::new("GET", "/m")),
        ]);
        engine(&transport, set, None).run().await.unwrap();
        let urls: Vec<String> = transport.seen().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["http://target.local/z", "http://target.local/a", "http://target.local/m"]);
    }

    #[tokio::test]
    async fn test_extracted_cookie_is_sent_with_sentinel() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .route("/login", Response::new(302, "").with_header("Set-Cookie", "sid=abc"))
                .route("/admin", Response::new(200, "Dashboard")),
        );
        let set = rules(vec![
            ("login", RuleSpec::new("POST", "/login").with_extract_cookie("response.headers.get('Set-Cookie')")),
            (
                "admin",
                RuleSpec::new("GET", "/admin")
                    .with_use_cookie(COOKIE_SENTINEL)
                    .with_cookie_expression("cookie.contains('sid')")
                    .with_expression("response.body.contains('Dashboard')"),
            ),
        ]);
        let report = engine(&transport, set, Some("login && admin")).run().await.unwrap();

        let seen = transport.seen();
        assert_eq!(seen[0].header("Cookie"), None);
        assert_eq!(seen[1].header("Cookie"), Some("sid=abc"));
        assert!(report.rule("login").unwrap().cookie_extracted);
        assert!(report.verdict);
    }

    #[tokio::test]
    async fn test_literal_use_cookie_is_validated() {
        let transport = Arc::new(ScriptedTransport::default().route("/", Response::new(200, "")));
        let set = rules(vec![(
            "r0",
            RuleSpec::new("GET", "/")
                .with_use_cookie("admin=1")
                .with_cookie_expression("cookie.contains('admin')"),
        )]);
        let report = engine(&transport, set, None).run().await.unwrap();
        assert_eq!(transport.seen()[0].header("Cookie"), Some("admin=1"));
        assert!(report.verdict);
    }

    #[tokio::test]
    async fn test_rejected_cookie_skips_response_check() {
        let transport = Arc::new(ScriptedTransport::default().route("/", Response::new(200, "ok")));
        let set = rules(vec![(
            "r0",
            RuleSpec::new("GET", "/")
                .with_cookie_expression("cookie.contains('PHPSESSID')")
                .with_expression("response.body.contains('ok')"),
        )]);
        let report = engine(&transport, set, None).run().await.unwrap();
        let rule = report.rule("r0").unwrap();
        assert_eq!(rule.state, RuleState::Unsatisfied);
        assert!(matches!(rule.reason, Some(RuleReason::CookieRejected { .. })));
        assert!(!report.verdict);
    }

    #[tokio::test]
    async fn test_malformed_expression_aborts_run() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .route("/a", Response::new(200, ""))
                .route("/b", Response::new(200, "")),
        );
        let set = rules(vec![
            ("r0", RuleSpec::new("GET", "/a").with_expression("response.body.contains(admin)")),
            ("r1", RuleSpec::new("GET", "/b")),
        ]);
        let engine = engine(&transport, set, None);
        let mut ctx = ExecutionContext::new();
        let err = engine.run_with(&mut ctx).await.unwrap_err();

        assert_eq!(err.attribution(), Some(("r0", Stage::ResponseValidation)));
        assert!(matches!(err.root(), ProbeError::ExpressionParse { .. }));
        assert_eq!(ctx.result("r0"), Some(false));
        assert_eq!(ctx.result("r1"), None);
        assert_eq!(transport.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_expression_aborts_before_next_rule() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .route("/a", Response::new(200, ""))
                .route("/b", Response::new(200, "")),
        );
        let set = rules(vec![
            ("r0", RuleSpec::new("GET", "/a").with_expression("response.status##")),
            ("r1", RuleSpec::new("GET", "/b")),
        ]);
        let mut ctx = ExecutionContext::new();
        let err = engine(&transport, set, Some("r0 && r1")).run_with(&mut ctx).await.unwrap_err();

        assert_eq!(err.attribution(), Some(("r0", Stage::ResponseValidation)));
        assert!(matches!(err.root(), ProbeError::UnsupportedExpression(_)));
        assert_eq!(ctx.result("r0"), Some(false));
        assert_eq!(ctx.result("r1"), None);
        assert_eq!(transport.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_cookie_expression_parse_error_is_fatal() {
        let transport = Arc::new(ScriptedTransport::default().route("/", Response::new(200, "")));
        let set = rules(vec![("r0", RuleSpec::new("GET", "/").with_cookie_expression("cookie.contains(sid)"))]);
        let err = engine(&transport, set, None).run().await.unwrap_err();
        assert_eq!(err.attribution(), Some(("r0", Stage::CookieValidation)));
        assert!(err.classify().fatal);
    }

    #[tokio::test]
    async fn test_request_exhaustion_is_fatal() {
        let transport = Arc::new(ScriptedTransport::default());
        let set = rules(vec![("r0", RuleSpec::new("GET", "/missing"))]);
        let mut ctx = ExecutionContext::new();
        let err = engine(&transport, set, None).run_with(&mut ctx).await.unwrap_err();
        assert_eq!(err.attribution(), Some(("r0", Stage::Request)));
        assert!(matches!(err.root(), ProbeError::Request { attempts: 1, .. }));
        assert_eq!(ctx.result("r0"), Some(false));
    }

    #[tokio::test]
    async fn test_extraction_failure_is_a_warning() {
        let transport = Arc::new(ScriptedTransport::default().route("/", Response::new(200, "body")));
        let set = rules(vec![("r0", RuleSpec::new("GET", "/").with_extract_cookie("response.body.extract('([')"))]);
        let report = engine(&transport, set, None).run().await.unwrap();
        let rule = report.rule("r0").unwrap();
        assert!(rule.passed);
        assert_eq!(rule.warnings.len(), 1);
        assert_eq!(rule.warnings[0].stage, Stage::Extraction);
        assert_eq!(rule.warnings[0].error_type, "InvalidPatternError");
    }

    #[tokio::test]
    async fn test_empty_extraction_keeps_previous_cookie() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .route("/a", Response::new(200, "").with_header("Set-Cookie", "sid=1"))
                .route("/b", Response::new(200, ""))
                .route("/c", Response::new(200, "")),
        );
        let set = rules(vec![
            ("a", RuleSpec::new("GET", "/a").with_extract_cookie("response.headers.get('Set-Cookie')")),
            ("b", RuleSpec::new("GET", "/b").with_extract_cookie("response.headers.get('Set-Cookie')")),
            ("c", RuleSpec::new("GET", "/c").with_use_cookie(COOKIE_SENTINEL)),
        ]);
        engine(&transport, set, None).run().await.unwrap();
        assert_eq!(transport.seen()[2].header("Cookie"), Some("sid=1"));
    }

    #[tokio::test]
    async fn test_unknown_aggregate_identifier_is_false() {
        let transport = Arc::new(ScriptedTransport::default().route("/", Response::new(200, "")));
        let set = rules(vec![("r0", RuleSpec::new("GET", "/"))]);
        let report = engine(&transport, set.clone(), Some("r0 && r9")).run().await.unwrap();
        assert!(!report.verdict);
        let report = engine(&transport, set, Some("r0 || r9")).run().await.unwrap();
        assert!(report.verdict);
    }

    #[tokio::test]
    async fn test_malformed_aggregate_fails_before_requests() {
        let transport = Arc::new(ScriptedTransport::default().route("/", Response::new(200, "")));
        let set = rules(vec![("r0", RuleSpec::new("GET", "/"))]);
        let err = engine(&transport, set, Some("r0 &&")).run().await.unwrap_err();
        assert!(matches!(err, ProbeError::ExpressionParse { .. }));
        assert!(transport.seen().is_empty());
    }

    #[tokio::test]
    async fn test_default_verdict_is_and_of_rules() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .route("/a", Response::new(200, ""))
                .route("/b", Response::new(404, "")),
        );
        let set = rules(vec![
            ("a", RuleSpec::new("GET", "/a").with_expression("response.status == 200")),
            ("b", RuleSpec::new("GET", "/b").with_expression("response.status == 200")),
        ]);
        let report = engine(&transport, set.clone(), None).run().await.unwrap();
        assert!(!report.verdict);
        assert_eq!(report.results.get("a"), Some(&true));
        assert_eq!(report.results.get("b"), Some(&false));

        // A comment-only expression counts as undeclared.
        let report = engine(&transport, set, Some("# later")).run().await.unwrap();
        assert!(!report.verdict);
    }

    #[tokio::test]
    async fn test_zero_rules_is_true() {
        let transport = Arc::new(ScriptedTransport::default());
        let report = engine(&transport, RuleSet::new(), None).run().await.unwrap();
        assert!(report.verdict);
        assert!(report.results.is_empty());
        assert!(transport.seen().is_empty());
    }
}
