//! Backend communication: REST requests and push notifications

mod client;
mod http;
mod listener;
mod pending;
mod protocol;
mod push;
mod transport;

pub use client::BackendClient;
pub use http::HttpTransport;
pub use protocol::{BackendResponse, Notification, RequestKind};
pub use push::WebSocketConnector;

#[cfg(test)]
pub use protocol::BackendRequest;
#[cfg(test)]
pub use transport::{PushChannel, PushConnector, Transport, TransportError, TransportResponse};
