//! HTTP transport implementations.
//!
//! - CONNECT tunnel to the upstream proxy
//! - BoringSSL handshake with a fixed ClientHello
//! - HTTP/2 via hyper, HTTP/1.1 via a hand-written codec

pub mod connector;
pub mod dispatcher;
pub mod h1;
pub mod h2;
pub mod proxy;
pub mod tcp;

pub use connector::{BoringConnector, MaybeHttpsStream};
pub use dispatcher::{RoundTrip, Transport};
pub use proxy::ProxyConfig;
