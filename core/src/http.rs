//! Framework-side request and response types.
//!
//! # Design
//! These are the shapes the generic client framework hands to the connector
//! and gets back from it. They stay plain data: the connector reads an
//! `OutboundRequest` without mutating it and returns an `InboundResponse`
//! that the caller owns. The entity kind is a tagged enum so the body
//! strategy is decided once, during translation.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::config::Properties;
use crate::transport::ResponseBody;

/// Ordered header multimap. Names compare case-insensitively; values keep
/// insertion order per name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping any values already present for `name`.
    pub fn add(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, values)) => values.push(value.to_string()),
            None => self.entries.push((name.to_string(), vec![value.to_string()])),
        }
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.add(name, value);
        self
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// Iterate names with all of their values, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// Iterate every `(name, value)` pair individually.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(n, values)| values.iter().map(move |v| (n.as_str(), v.as_str())))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Callback that pushes an entity body into a sink provided by the connector.
///
/// The sink is either an in-memory buffer or the producer end of a pipe
/// whose consumer is the transport.
pub trait EntityWriter: Send + Sync {
    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()>;
}

impl<F> EntityWriter for F
where
    F: Fn(&mut dyn Write) -> io::Result<()> + Send + Sync,
{
    fn write_to(&self, sink: &mut dyn Write) -> io::Result<()> {
        self(sink)
    }
}

/// Request payload.
#[derive(Clone, Default)]
pub enum Entity {
    #[default]
    None,
    Bytes(Bytes),
    Text(String),
    /// Produced on demand by a writer callback; size unknown up front.
    Stream(Arc<dyn EntityWriter>),
}

impl Entity {
    pub fn stream(writer: impl EntityWriter + 'static) -> Self {
        Entity::Stream(Arc::new(writer))
    }

    /// A stream entity that serializes `value` as JSON straight into the sink.
    pub fn json<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Entity::stream(move |sink: &mut dyn Write| {
            serde_json::to_writer(&mut *sink, &value).map_err(io::Error::from)
        })
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Entity::None)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::None => write!(f, "None"),
            Entity::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Entity::Text(s) => write!(f, "Text({} chars)", s.len()),
            Entity::Stream(_) => write!(f, "Stream"),
        }
    }
}

/// A request as seen by the client framework.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: String,
    pub uri: String,
    pub headers: Headers,
    pub entity: Entity,
    /// Request-scoped properties; they override the connector's settings.
    pub properties: Properties,
}

impl OutboundRequest {
    pub fn new(method: &str, uri: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            uri: uri.to_string(),
            headers: Headers::new(),
            entity: Entity::None,
            properties: Properties::new(),
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::new("GET", uri)
    }

    pub fn post(uri: &str, entity: Entity) -> Self {
        Self::new("POST", uri).entity(entity)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn entity(mut self, entity: Entity) -> Self {
        self.entity = entity;
        self
    }

    pub fn property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.set(key, value);
        self
    }
}

/// Live response body handed to the caller, who reads and then closes it.
pub struct EntityStream {
    inner: Box<dyn ResponseBody>,
}

impl EntityStream {
    pub(crate) fn new(inner: Box<dyn ResponseBody>) -> Self {
        Self { inner }
    }

    pub fn close(self) -> io::Result<()> {
        self.inner.close()
    }
}

impl Read for EntityStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl fmt::Debug for EntityStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStream").finish_non_exhaustive()
    }
}

/// A response handed back to the client framework.
#[derive(Debug)]
pub struct InboundResponse {
    pub status: u16,
    pub headers: Headers,
    entity: Option<EntityStream>,
}

impl InboundResponse {
    pub fn new(status: u16, headers: Headers, entity: Option<EntityStream>) -> Self {
        Self {
            status,
            headers,
            entity,
        }
    }

    pub fn has_entity(&self) -> bool {
        self.entity.is_some()
    }

    pub fn entity_mut(&mut self) -> Option<&mut EntityStream> {
        self.entity.as_mut()
    }

    pub fn into_entity(self) -> Option<EntityStream> {
        self.entity
    }

    /// Read the whole entity as UTF-8 and close it. Empty when there is no entity.
    pub fn read_entity_string(&mut self) -> io::Result<String> {
        let Some(mut stream) = self.entity.take() else {
            return Ok(String::new());
        };
        let mut text = String::new();
        stream.read_to_string(&mut text)?;
        stream.close()?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_keep_multiple_values_in_order() {
        let headers = Headers::new()
            .with("Accept", "text/plain")
            .with("X-Trace", "a")
            .with("accept", "application/json");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get_all("ACCEPT"), ["text/plain", "application/json"]);
        let pairs: Vec<_> = headers.pairs().collect();
        assert_eq!(
            pairs,
            vec![
                ("Accept", "text/plain"),
                ("Accept", "application/json"),
                ("X-Trace", "a")
            ]
        );
    }

    #[test]
    fn missing_header_is_empty() {
        let headers = Headers::new();
        assert!(headers.get_all("content-length").is_empty());
        assert_eq!(headers.get("content-length"), None);
    }

    #[test]
    fn json_entity_writes_serialized_value() {
        #[derive(Serialize)]
        struct Data {
            data: String,
        }
        let entity = Entity::json(Data {
            data: "hello".to_string(),
        });
        let Entity::Stream(writer) = entity else {
            panic!("json entity should stream");
        };
        let mut sink = Vec::new();
        writer.write_to(&mut sink).unwrap();
        assert_eq!(sink, br#"{"data":"hello"}"#);
    }

    #[test]
    fn request_method_is_normalised() {
        let req = OutboundRequest::new("patch", "http://localhost/x");
        assert_eq!(req.method, "PATCH");
        assert!(req.entity.is_none());
    }

    #[test]
    fn reading_entity_consumes_it() {
        let body: Box<dyn ResponseBody> = Box::new(io::Cursor::new(b"abc".to_vec()));
        let mut response = InboundResponse::new(200, Headers::new(), Some(EntityStream::new(body)));
        assert_eq!(response.read_entity_string().unwrap(), "abc");
        assert!(!response.has_entity());
        assert_eq!(response.read_entity_string().unwrap(), "");
    }
}
