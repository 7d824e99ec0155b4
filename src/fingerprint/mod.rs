//! TLS ClientHello fingerprinting configuration.

pub mod tls;

pub use tls::{
    AlpnOffer, CertCompression, FingerprintSpec, PaddingStyle, TlsExtension, TlsVersion,
    GREASE_PLACEHOLDER,
};
