//! Collector endpoint resolution.
//!
//! Precedence is explicit value, then `OTEL_EXPORTER_OTLP_ENDPOINT`, then
//! [`DEFAULT_ENDPOINT`].

/// Environment variable consulted when no endpoint is given.
pub const ENV_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Collector address used when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "localhost:4317";

/// Resolves the collector endpoint from an explicit value and the
/// environment's value.
///
/// Blank values count as absent. The result always carries a scheme;
/// bare `host:port` values get `http://`, since the export channel is
/// plaintext gRPC.
///
/// # Example
///
/// ```
/// use basement_telemetry::endpoint::resolve_endpoint;
///
/// assert_eq!(resolve_endpoint(None, None), "http://localhost:4317");
/// assert_eq!(
///     resolve_endpoint(Some("collector:4317"), Some("env:4317")),
///     "http://collector:4317"
/// );
/// ```
#[must_use]
pub fn resolve_endpoint(explicit: Option<&str>, env: Option<&str>) -> String {
    let chosen = [explicit, env]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(DEFAULT_ENDPOINT);

    normalize(chosen)
}

/// Resolves using the process environment.
#[must_use]
pub fn resolve_from_env(explicit: Option<&str>) -> String {
    let env = std::env::var(ENV_OTLP_ENDPOINT).ok();
    resolve_endpoint(explicit, env.as_deref())
}

fn normalize(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_wins() {
        assert_eq!(
            resolve_endpoint(Some("explicit:4317"), Some("env:4317")),
            "http://explicit:4317"
        );
        assert_eq!(resolve_endpoint(Some("explicit:4317"), None), "http://explicit:4317");
    }

    #[test]
    fn test_env_fallback() {
        assert_eq!(resolve_endpoint(None, Some("env:4317")), "http://env:4317");
        assert_eq!(resolve_endpoint(Some("  "), Some("env:4317")), "http://env:4317");
    }

    #[test]
    fn test_default() {
        assert_eq!(resolve_endpoint(None, None), "http://localhost:4317");
        assert_eq!(resolve_endpoint(Some(""), Some("")), "http://localhost:4317");
    }

    #[test]
    fn test_scheme_preserved() {
        assert_eq!(
            resolve_endpoint(Some("https://collector.internal:4317"), None),
            "https://collector.internal:4317"
        );
    }
}
