//! Per-invocation CORS resolution (spec §6 "CORS"). Deliberately separate
//! from `tower_http::cors::CorsLayer`: the effective policy depends on
//! *which function* is being invoked, so it can't be expressed as one
//! static layer the way the management endpoints' CORS can.

use axum::http::{header, HeaderMap, HeaderValue};
use edgefn_common::model::CorsOverrides;

/// The five CORS fields after applying §6's priority order: the function's
/// own overrides first, then the global configuration.
pub struct EffectiveCors {
    pub allow_origin: Option<String>,
    pub allow_methods: Option<String>,
    pub allow_headers: Option<String>,
    pub expose_headers: Option<String>,
    pub max_age_seconds: Option<u32>,
}

pub fn merge(function: &CorsOverrides, global: &CorsOverrides) -> EffectiveCors {
    EffectiveCors {
        allow_origin: function.allow_origin.clone().or_else(|| global.allow_origin.clone()),
        allow_methods: function.allow_methods.clone().or_else(|| global.allow_methods.clone()),
        allow_headers: function.allow_headers.clone().or_else(|| global.allow_headers.clone()),
        expose_headers: function.expose_headers.clone().or_else(|| global.expose_headers.clone()),
        max_age_seconds: function.max_age_seconds.or(global.max_age_seconds),
    }
}

/// Resolves the `Access-Control-Allow-Origin` value to echo back. When
/// `setting` is a comma-separated list, the request's `Origin` header is
/// matched against the list and only the matching member is echoed; when
/// the setting *is* the literal `*` (the whole setting, not a list member),
/// `*` is echoed instead (spec §6).
pub fn resolve_allow_origin(setting: &str, request_origin: Option<&str>) -> Option<String> {
    if setting.trim() == "*" {
        return Some("*".to_string());
    }
    let members: Vec<&str> = setting.split(',').map(str::trim).collect();
    if members.len() == 1 {
        return Some(members[0].to_string());
    }
    let origin = request_origin?;
    members.into_iter().find(|m| *m == origin).map(str::to_string)
}

/// Applies the resolved CORS headers to `headers`, in place. Safe to call
/// on both the preflight (`OPTIONS`) response and the real response.
pub fn apply_headers(headers: &mut HeaderMap, cors: &EffectiveCors, request_origin: Option<&str>) {
    if let Some(setting) = &cors.allow_origin {
        if let Some(value) = resolve_allow_origin(setting, request_origin) {
            if let Ok(hv) = HeaderValue::from_str(&value) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, hv);
            }
        }
    }
    if let Some(methods) = &cors.allow_methods {
        if let Ok(hv) = HeaderValue::from_str(methods) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, hv);
        }
    }
    if let Some(allow_headers) = &cors.allow_headers {
        if let Ok(hv) = HeaderValue::from_str(allow_headers) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, hv);
        }
    }
    if let Some(expose) = &cors.expose_headers {
        if let Ok(hv) = HeaderValue::from_str(expose) {
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, hv);
        }
    }
    if let Some(max_age) = cors.max_age_seconds {
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_str(&max_age.to_string())
            .expect("formatted integer is always a valid header value"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_is_echoed_verbatim() {
        assert_eq!(resolve_allow_origin("*", Some("https://example.com")), Some("*".to_string()));
    }

    #[test]
    fn single_origin_is_echoed_regardless_of_request_origin() {
        assert_eq!(
            resolve_allow_origin("https://a.test", None),
            Some("https://a.test".to_string())
        );
    }

    #[test]
    fn comma_list_echoes_only_the_matching_member() {
        let setting = "https://a.test, https://b.test";
        assert_eq!(
            resolve_allow_origin(setting, Some("https://b.test")),
            Some("https://b.test".to_string())
        );
        assert_eq!(resolve_allow_origin(setting, Some("https://c.test")), None);
        assert_eq!(resolve_allow_origin(setting, None), None);
    }

    #[test]
    fn function_overrides_win_field_by_field() {
        let function = CorsOverrides {
            allow_origin: Some("https://f.test".to_string()),
            allow_methods: None,
            ..Default::default()
        };
        let global = CorsOverrides {
            allow_origin: Some("https://g.test".to_string()),
            allow_methods: Some("GET".to_string()),
            ..Default::default()
        };
        let effective = merge(&function, &global);
        assert_eq!(effective.allow_origin.as_deref(), Some("https://f.test"));
        assert_eq!(effective.allow_methods.as_deref(), Some("GET"));
    }
}
