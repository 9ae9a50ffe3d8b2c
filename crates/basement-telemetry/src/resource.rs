//! Resource descriptor: the identity attributes attached to every span, log
//! record and metric.
//!
//! Attributes are merged in increasing priority:
//!
//! 1. `OTEL_RESOURCE_ATTRIBUTES` (environment, additive only)
//! 2. host attributes (`host.name`, `host.arch`, `os.type`)
//! 3. SDK attributes (`telemetry.sdk.*`)
//! 4. the explicit service name
//!
//! so environment values never shadow host or SDK identity, and the
//! configured service name always wins.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry_sdk::resource::{ResourceDetector, TelemetryResourceDetector};
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::attribute::SERVICE_NAME;
use percent_encoding::percent_decode_str;

use crate::error::TelemetryError;

/// Environment variable carrying extra resource attributes.
pub const ENV_RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";

/// Source of host identity attributes.
pub trait HostDetector: Send + Sync {
    /// Returns host attributes, or an error when the host cannot be identified.
    fn detect(&self) -> io::Result<BTreeMap<String, String>>;
}

/// Detects host identity from the running system.
///
/// The hostname comes from `HOSTNAME`, then `/proc/sys/kernel/hostname`,
/// then `/etc/hostname`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl SystemHost {
    fn hostname() -> io::Result<String> {
        if let Some(name) = std::env::var("HOSTNAME")
            .ok()
            .filter(|n| !n.trim().is_empty())
        {
            return Ok(name.trim().to_string());
        }

        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "hostname not available");
        for path in ["/proc/sys/kernel/hostname", "/etc/hostname"] {
            match fs::read_to_string(path) {
                Ok(name) if !name.trim().is_empty() => return Ok(name.trim().to_string()),
                Ok(_) => {}
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

impl HostDetector for SystemHost {
    fn detect(&self) -> io::Result<BTreeMap<String, String>> {
        let mut attrs = BTreeMap::new();
        attrs.insert("host.name".to_string(), Self::hostname()?);
        attrs.insert("host.arch".to_string(), std::env::consts::ARCH.to_string());
        attrs.insert("os.type".to_string(), std::env::consts::OS.to_string());
        Ok(attrs)
    }
}

/// Immutable mapping from attribute name to value, shared by all providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    attributes: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    /// Builds the descriptor from the running system and environment.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ResourceBuild`] if host identity cannot be
    /// collected.
    pub fn detect(service_name: &str) -> Result<Self, TelemetryError> {
        let env_attributes = std::env::var(ENV_RESOURCE_ATTRIBUTES).ok();
        Self::build(service_name, &SystemHost, env_attributes.as_deref())
    }

    /// Builds the descriptor from explicit sources.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ResourceBuild`] if `host` fails.
    pub fn build(
        service_name: &str,
        host: &dyn HostDetector,
        env_attributes: Option<&str>,
    ) -> Result<Self, TelemetryError> {
        let mut attributes = env_attributes
            .map(parse_resource_attributes)
            .unwrap_or_default();

        let host_attributes = host
            .detect()
            .map_err(|e| TelemetryError::ResourceBuild(format!("host detection failed: {e}")))?;
        attributes.extend(host_attributes);

        let sdk = TelemetryResourceDetector.detect(Duration::ZERO);
        attributes.extend(
            sdk.iter()
                .map(|(key, value)| (key.as_str().to_string(), value.to_string())),
        );

        attributes.insert(SERVICE_NAME.to_string(), service_name.to_string());

        Ok(Self { attributes })
    }

    /// Minimal descriptor carrying only the service name.
    #[must_use]
    pub fn service_only(service_name: &str) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(SERVICE_NAME.to_string(), service_name.to_string());
        Self { attributes }
    }

    /// Looks up an attribute value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns the service name attribute.
    #[must_use]
    pub fn service_name(&self) -> &str {
        self.get(SERVICE_NAME).unwrap_or_default()
    }

    /// Iterates over all attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns `true` if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Converts into an SDK [`Resource`].
    #[must_use]
    pub fn to_resource(&self) -> Resource {
        Resource::new(
            self.attributes
                .iter()
                .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
        )
    }
}

/// Parses `key1=value1,key2=value2` as used by `OTEL_RESOURCE_ATTRIBUTES`.
///
/// Keys and values are trimmed and percent-decoded. Pairs without `=`, with
/// an empty key, or with invalid escapes are skipped.
#[must_use]
pub fn parse_resource_attributes(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = percent_decode(key.trim())?;
            if key.is_empty() {
                return None;
            }
            let value = percent_decode(value.trim())?;
            Some((key, value))
        })
        .collect()
}

fn percent_decode(input: &str) -> Option<String> {
    if !has_valid_escapes(input) {
        return None;
    }
    percent_decode_str(input)
        .decode_utf8()
        .ok()
        .map(Cow::into_owned)
}

// `percent_decode_str` passes a stray `%` through; such values are rejected.
fn has_valid_escapes(input: &str) -> bool {
    let bytes = input.as_bytes();
    bytes.iter().enumerate().all(|(i, &b)| {
        b != b'%'
            || bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct FixedHost(&'static str);

    impl HostDetector for FixedHost {
        fn detect(&self) -> io::Result<BTreeMap<String, String>> {
            let mut attrs = BTreeMap::new();
            attrs.insert("host.name".to_string(), self.0.to_string());
            Ok(attrs)
        }
    }

    struct BrokenHost;

    impl HostDetector for BrokenHost {
        fn detect(&self) -> io::Result<BTreeMap<String, String>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "no access"))
        }
    }

    #[test]
    fn test_parse_resource_attributes() {
        let attrs = parse_resource_attributes("deployment.environment=prod, team=core%20infra");
        assert_eq!(attrs.get("deployment.environment").map(String::as_str), Some("prod"));
        assert_eq!(attrs.get("team").map(String::as_str), Some("core infra"));
    }

    #[test]
    fn test_parse_skips_malformed_pairs() {
        let attrs = parse_resource_attributes("novalue,=empty,bad=%zz,ok=1");
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("ok").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_parse_skips_truncated_and_non_utf8_escapes() {
        let attrs = parse_resource_attributes("cut=ab%2,tail=%,latin=%E9,key%3Dname=a%2Cb");
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("key=name").map(String::as_str), Some("a,b"));
    }

    #[test]
    fn test_service_name_wins() {
        let descriptor = ResourceDescriptor::build(
            "basement",
            &FixedHost("node-1"),
            Some("service.name=impostor"),
        )
        .unwrap();

        assert_eq!(descriptor.service_name(), "basement");
    }

    #[test]
    fn test_env_never_overrides_host_or_sdk() {
        let descriptor = ResourceDescriptor::build(
            "basement",
            &FixedHost("node-1"),
            Some("host.name=spoofed,telemetry.sdk.language=cobol,region=eu"),
        )
        .unwrap();

        assert_eq!(descriptor.get("host.name"), Some("node-1"));
        assert_eq!(descriptor.get("telemetry.sdk.language"), Some("rust"));
        assert_eq!(descriptor.get("region"), Some("eu"));
    }

    #[test]
    fn test_host_failure_is_fatal() {
        let err = ResourceDescriptor::build("basement", &BrokenHost, None).unwrap_err();
        assert!(matches!(err, TelemetryError::ResourceBuild(_)));
    }

    #[test]
    fn test_to_resource_carries_service_name() {
        let descriptor = ResourceDescriptor::service_only("basement");
        let resource = descriptor.to_resource();
        let value = resource.get(opentelemetry::Key::from_static_str(SERVICE_NAME));
        assert_eq!(value.map(|v| v.to_string()), Some("basement".to_string()));
    }

    proptest! {
        #[test]
        fn parse_never_panics(raw in ".*") {
            let _ = parse_resource_attributes(&raw);
        }

        #[test]
        fn plain_pairs_survive(key in "[a-z][a-z.]{0,12}", value in "[A-Za-z0-9_-]{0,16}") {
            let attrs = parse_resource_attributes(&format!("{key}={value}"));
            prop_assert_eq!(attrs.get(&key), Some(&value));
        }
    }
}
