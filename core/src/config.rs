//! Connector configuration properties.
//!
//! # Design
//! Properties use the same loosely typed key/value map the client framework
//! already carries, with `serde_json::Value` values. Client-scoped values are
//! resolved once into a `ConnectorConfig` when the connector is built, so a
//! malformed proxy URI or timeout fails at construction rather than on the
//! first send. Request-scoped properties may override the read timeout, the
//! transfer mode and the buffer capacity.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::error::ConfigError;

/// Connect timeout in milliseconds; applied once, to the transport.
pub const CONNECT_TIMEOUT: &str = "connectTimeout";
/// Read timeout in milliseconds; values <= 0 disable it.
pub const READ_TIMEOUT: &str = "readTimeout";
/// Proxy as `http://host:port`; applied once, to the transport.
pub const PROXY_URI: &str = "proxyURI";
/// `BUFFERED` or `CHUNKED` (case-insensitive).
pub const TRANSFER_MODE: &str = "transferMode";
/// Upper bound in bytes for entities written in buffered mode.
pub const BUFFER_CAPACITY: &str = "bufferCapacity";

pub const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024 * 1024;

/// A string-keyed property map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    values: HashMap<String, Value>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read a millisecond duration. `Ok(None)` when the key is absent or the
    /// value is <= 0.
    pub fn duration_millis(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        let millis = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| invalid(key, value))?;
        if millis <= 0 {
            return Ok(None);
        }
        Ok(Some(Duration::from_millis(millis as u64)))
    }

    pub fn transfer_mode(&self) -> Result<Option<TransferMode>, ConfigError> {
        match self.get(TRANSFER_MODE) {
            None => Ok(None),
            Some(Value::String(s)) => TransferMode::parse(s)
                .map(Some)
                .ok_or_else(|| invalid(TRANSFER_MODE, &Value::String(s.clone()))),
            Some(other) => Err(invalid(TRANSFER_MODE, other)),
        }
    }

    pub fn buffer_capacity(&self) -> Result<Option<usize>, ConfigError> {
        let Some(value) = self.get(BUFFER_CAPACITY) else {
            return Ok(None);
        };
        let capacity = match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .ok_or_else(|| invalid(BUFFER_CAPACITY, value))?;
        Ok(Some(capacity as usize))
    }
}

fn invalid(key: &str, value: &Value) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// How a streamed entity reaches the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// Write the whole entity into memory, then send it with a fixed length.
    Buffered,
    /// Pipe the entity to the transport while it is being written.
    #[default]
    Chunked,
}

impl TransferMode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUFFERED" => Some(TransferMode::Buffered),
            "CHUNKED" => Some(TransferMode::Chunked),
            _ => None,
        }
    }
}

/// Proxy host and port, extracted from the `proxyURI` property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAddress {
    pub host: String,
    pub port: u16,
}

impl ProxyAddress {
    /// Parse `scheme://host:port[/...]` or a bare `host:port`.
    pub fn parse(uri: &str) -> Result<Self, ConfigError> {
        let fail = |reason: &str| ConfigError::InvalidProxy {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };
        let rest = match uri.split_once("://") {
            Some((scheme, rest)) if !scheme.is_empty() => rest,
            Some(_) => return Err(fail("empty scheme")),
            None => uri,
        };
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let authority = authority.rsplit('@').next().unwrap_or_default();
        let (host, port) = authority.rsplit_once(':').ok_or_else(|| fail("missing port"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(fail("missing host"));
        }
        let port = port.parse::<u16>().map_err(|_| fail("invalid port"))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

/// Client-scoped settings, resolved once per connector.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorConfig {
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub proxy: Option<ProxyAddress>,
    pub transfer_mode: TransferMode,
    pub buffer_capacity: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            read_timeout: None,
            proxy: None,
            transfer_mode: TransferMode::default(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl ConnectorConfig {
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let proxy = match props.get(PROXY_URI) {
            None => None,
            Some(Value::String(uri)) => Some(ProxyAddress::parse(uri)?),
            Some(other) => return Err(invalid(PROXY_URI, other)),
        };
        Ok(Self {
            connect_timeout: props.duration_millis(CONNECT_TIMEOUT)?,
            read_timeout: props.duration_millis(READ_TIMEOUT)?,
            proxy,
            transfer_mode: props.transfer_mode()?.unwrap_or_default(),
            buffer_capacity: props.buffer_capacity()?.unwrap_or(DEFAULT_BUFFER_CAPACITY),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_properties_give_defaults() {
        let config = ConnectorConfig::from_properties(&Properties::new()).unwrap();
        assert_eq!(config, ConnectorConfig::default());
        assert_eq!(config.transfer_mode, TransferMode::Chunked);
    }

    #[test]
    fn timeouts_accept_numbers_and_numeric_strings() {
        let props = Properties::new()
            .with(CONNECT_TIMEOUT, 250)
            .with(READ_TIMEOUT, "1000");
        let config = ConnectorConfig::from_properties(&props).unwrap();
        assert_eq!(config.connect_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.read_timeout, Some(Duration::from_millis(1000)));
    }

    #[test]
    fn non_positive_timeout_means_none() {
        let props = Properties::new().with(READ_TIMEOUT, 0).with(CONNECT_TIMEOUT, -5);
        let config = ConnectorConfig::from_properties(&props).unwrap();
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.connect_timeout, None);
    }

    #[test]
    fn malformed_timeout_is_rejected() {
        let props = Properties::new().with(READ_TIMEOUT, "soon");
        let err = ConnectorConfig::from_properties(&props).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == READ_TIMEOUT));
    }

    #[test]
    fn proxy_uri_is_parsed_into_host_and_port() {
        let props = Properties::new().with(PROXY_URI, "http://proxy.local:3128");
        let config = ConnectorConfig::from_properties(&props).unwrap();
        assert_eq!(
            config.proxy,
            Some(ProxyAddress {
                host: "proxy.local".to_string(),
                port: 3128
            })
        );
    }

    #[test]
    fn proxy_without_port_is_a_config_error() {
        let props = Properties::new().with(PROXY_URI, "http://proxy.local");
        let err = ConnectorConfig::from_properties(&props).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProxy { .. }));
    }

    #[test]
    fn bare_host_port_proxy_and_ipv6() {
        assert_eq!(ProxyAddress::parse("10.0.0.1:8080").unwrap().port, 8080);
        let v6 = ProxyAddress::parse("http://[::1]:9000/").unwrap();
        assert_eq!(v6.host, "::1");
        assert_eq!(v6.port, 9000);
    }

    #[test]
    fn transfer_mode_is_case_insensitive() {
        let props = Properties::new().with(TRANSFER_MODE, "buffered");
        assert_eq!(props.transfer_mode().unwrap(), Some(TransferMode::Buffered));
        let bad = Properties::new().with(TRANSFER_MODE, "sometimes");
        assert!(bad.transfer_mode().is_err());
    }

    #[test]
    fn null_values_are_treated_as_absent() {
        let props = Properties::new().with(READ_TIMEOUT, Value::Null);
        assert_eq!(props.duration_millis(READ_TIMEOUT).unwrap(), None);
    }
}
