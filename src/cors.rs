//! CORS rule matching for preflight requests.
//!
//! Stored rules are evaluated in order; the first rule whose origin, method,
//! and requested headers all match wins.

use crate::models::CorsRule;

/// An incoming preflight request.
#[derive(Debug, Clone)]
pub struct PreflightRequest<'a> {
    pub origin: &'a str,
    pub method: &'a str,
    pub request_headers: &'a [String],
}

/// Outcome of a successful preflight match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightResponse {
    /// Origin echoed back to the client; `*` when the rule allows any origin.
    pub allowed_origin: String,
    /// Credentials are only allowed for non-wildcard origins.
    pub allow_credentials: bool,
    pub max_age_in_seconds: u32,
    pub exposed_headers: Vec<String>,
}

/// Evaluates stored CORS rules against a preflight request. Returns `None`
/// when no rule matches.
pub fn evaluate(rules: &[CorsRule], request: &PreflightRequest<'_>) -> Option<PreflightResponse> {
    let rule = rules.iter().find(|rule| {
        origin_allowed(rule, request.origin)
            && method_allowed(rule, request.method)
            && request
                .request_headers
                .iter()
                .all(|header| header_allowed(&rule.allowed_headers, header))
    })?;

    let wildcard_origin = rule.allowed_origins.iter().any(|o| o == "*");
    let allowed_origin = if wildcard_origin {
        "*".to_string()
    } else {
        request.origin.to_string()
    };

    Some(PreflightResponse {
        allow_credentials: !wildcard_origin,
        allowed_origin,
        max_age_in_seconds: rule.max_age_in_seconds,
        exposed_headers: rule.exposed_headers.clone(),
    })
}

fn origin_allowed(rule: &CorsRule, origin: &str) -> bool {
    rule.allowed_origins
        .iter()
        .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(origin))
}

fn method_allowed(rule: &CorsRule, method: &str) -> bool {
    rule.allowed_methods
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(method))
}

/// A requested header matches an allowed pattern exactly (case-insensitive),
/// or by case-insensitive prefix when the pattern ends in `*`.
fn header_allowed(allowed: &[String], header: &str) -> bool {
    allowed.iter().any(|pattern| {
        if pattern == "*" {
            return true;
        }
        match pattern.strip_suffix('*') {
            Some(prefix) => header
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
            None => pattern.eq_ignore_ascii_case(header),
        }
    })
}
