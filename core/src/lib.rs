//! Connector between a generic HTTP client framework and an async transport.
//!
//! # Overview
//! The framework describes a request as an `OutboundRequest` (method, URI,
//! headers, an optional entity and request-scoped properties) and expects an
//! `InboundResponse` back. This crate translates the former into a
//! `TransportRequest`, feeds the entity to the transport either buffered or
//! piped, and translates the transport's response back.
//!
//! # Design
//! - `translate` is pure: it reads the request and the client config and
//!   returns a body plan. It never consumes the entity.
//! - `bridge` owns the only concurrency of a single exchange: a streamed
//!   entity is written on a blocking worker while the transport reads the
//!   other end of a `pipe`.
//! - `connector` offers a blocking `send` (interruptible, see `interrupt`)
//!   and a callback-based `send_async` on top of the same pipeline.
//! - `Transport` is the seam to the network; `UreqTransport` is the default.

pub mod bridge;
pub mod config;
pub mod connector;
pub mod error;
pub mod http;
pub mod interrupt;
pub mod pipe;
pub mod response;
pub mod translate;
pub mod transport;
pub mod ureq_transport;

pub use config::{ConnectorConfig, Properties, ProxyAddress, TransferMode};
pub use connector::{Connector, ResponseHandle};
pub use error::{ConfigError, ProcessingError, TransportError};
pub use http::{Entity, EntityStream, EntityWriter, Headers, InboundResponse, OutboundRequest};
pub use interrupt::Interrupter;
pub use transport::{BodySource, ResponseBody, Transport, TransportRequest, TransportResponse};
pub use ureq_transport::UreqTransport;
