//! TLS ClientHello fingerprint description.
//!
//! A [`FingerprintSpec`] is an immutable, ordered description of the
//! ClientHello we send: version range, cipher suites, compression methods and
//! the extension list with per-extension parameters. The connector translates
//! it into BoringSSL settings with extension permutation disabled, so the same
//! spec yields the same hello on every connection.

use crate::error::{Error, Result};

/// GREASE placeholder (RFC 8701). BoringSSL substitutes a per-connection
/// GREASE value wherever this appears.
pub const GREASE_PLACEHOLDER: u16 = 0x0a0a;

/// Chrome 112 cipher suites in exact order (leading GREASE).
///
/// The three TLS 1.3 entries are the order BoringSSL sends on hosts with
/// AES hardware. Without it BoringSSL moves CHACHA20 to the front, so the
/// wire order (and the JA3 hash) then differs from this list.
pub const CHROME_112_CIPHER_SUITES: &[u16] = &[
    GREASE_PLACEHOLDER,
    0x1301, // TLS_AES_128_GCM_SHA256
    0x1302, // TLS_AES_256_GCM_SHA384
    0x1303, // TLS_CHACHA20_POLY1305_SHA256
    0xc02b,
    0xc02f,
    0xc02c,
    0xc030,
    0xcca9,
    0xcca8,
    0xc013,
    0xc014,
    0x009c,
    0x009d,
    0x002f,
    0x0035,
];

/// Chrome 112 signature algorithms.
pub const CHROME_112_SIGNATURE_ALGORITHMS: &[u16] = &[
    0x0403, 0x0804, 0x0401, 0x0503, 0x0805, 0x0501, 0x0806, 0x0601,
];

/// Chrome 112 supported groups (GREASE, X25519, P-256, P-384).
pub const CHROME_112_CURVES: &[u16] = &[GREASE_PLACEHOLDER, 0x001d, 0x0017, 0x0018];

/// Order in which BoringSSL writes ClientHello extensions when permutation is
/// off. GREASE appears at both ends; padding is always last.
pub const BORING_EXTENSION_ORDER: &[u16] = &[
    GREASE_PLACEHOLDER,
    0,     // server_name
    23,    // extended_master_secret
    65281, // renegotiation_info
    10,    // supported_groups
    11,    // ec_point_formats
    35,    // session_ticket
    16,    // application_layer_protocol_negotiation
    5,     // status_request
    13,    // signature_algorithms
    18,    // signed_certificate_timestamp
    51,    // key_share
    45,    // psk_key_exchange_modes
    43,    // supported_versions
    27,    // compress_certificate
    17513, // application_settings
    GREASE_PLACEHOLDER,
    21, // padding
];

/// TLS protocol version bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// Wire value (0x0303 / 0x0304).
    pub fn wire(&self) -> u16 {
        match self {
            Self::Tls12 => 0x0303,
            Self::Tls13 => 0x0304,
        }
    }
}

/// Certificate compression algorithm (RFC 8879).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertCompression {
    Brotli,
}

impl CertCompression {
    pub fn id(&self) -> u16 {
        match self {
            Self::Brotli => 2,
        }
    }
}

/// Padding policy for the padding extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingStyle {
    /// Pad hellos between 256 and 511 bytes up to 512 (F5 workaround).
    Boring,
}

impl PaddingStyle {
    /// Padding extension payload length for an unpadded hello of `unpadded_len` bytes.
    pub fn padding_len(&self, unpadded_len: usize) -> Option<usize> {
        match self {
            Self::Boring => {
                if unpadded_len > 0xff && unpadded_len < 0x200 {
                    // 4 bytes of extension header, at least one byte of payload
                    let pad = 0x200 - unpadded_len;
                    Some(if pad >= 4 + 1 { pad - 4 } else { 1 })
                } else {
                    None
                }
            }
        }
    }
}

/// PSK key exchange mode: (EC)DHE.
pub const PSK_MODE_DHE: u8 = 1;

/// One ClientHello extension with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsExtension {
    Grease,
    ServerName,
    ExtendedMasterSecret,
    RenegotiationInfo,
    SupportedCurves(Vec<u16>),
    SupportedPoints(Vec<u8>),
    SessionTicket,
    Alpn(Vec<&'static str>),
    StatusRequest,
    SignatureAlgorithms(Vec<u16>),
    SignedCertificateTimestamp,
    KeyShare(Vec<u16>),
    PskKeyExchangeModes(Vec<u8>),
    SupportedVersions(Vec<u16>),
    CompressCertificate(Vec<CertCompression>),
    ApplicationSettings(Vec<&'static str>),
    Padding(PaddingStyle),
}

impl TlsExtension {
    /// IANA extension code point (GREASE reported as the placeholder).
    pub fn id(&self) -> u16 {
        match self {
            Self::Grease => GREASE_PLACEHOLDER,
            Self::ServerName => 0,
            Self::ExtendedMasterSecret => 23,
            Self::RenegotiationInfo => 65281,
            Self::SupportedCurves(_) => 10,
            Self::SupportedPoints(_) => 11,
            Self::SessionTicket => 35,
            Self::Alpn(_) => 16,
            Self::StatusRequest => 5,
            Self::SignatureAlgorithms(_) => 13,
            Self::SignedCertificateTimestamp => 18,
            Self::KeyShare(_) => 51,
            Self::PskKeyExchangeModes(_) => 45,
            Self::SupportedVersions(_) => 43,
            Self::CompressCertificate(_) => 27,
            Self::ApplicationSettings(_) => 17513,
            Self::Padding(_) => 21,
        }
    }
}

/// Which application protocols the hello offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlpnOffer {
    /// `http/1.1` only; the server can never pick HTTP/2.
    Http1Only,
    /// `h2` then `http/1.1`.
    #[default]
    Http2AndHttp1,
}

impl AlpnOffer {
    pub fn protocols(&self) -> Vec<&'static str> {
        match self {
            Self::Http1Only => vec!["http/1.1"],
            Self::Http2AndHttp1 => vec!["h2", "http/1.1"],
        }
    }
}

/// Immutable ClientHello description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintSpec {
    min_version: TlsVersion,
    max_version: TlsVersion,
    cipher_suites: Vec<u16>,
    compression_methods: Vec<u8>,
    extensions: Vec<TlsExtension>,
}

impl FingerprintSpec {
    /// Build and validate a custom spec.
    pub fn new(
        min_version: TlsVersion,
        max_version: TlsVersion,
        cipher_suites: Vec<u16>,
        extensions: Vec<TlsExtension>,
    ) -> Result<Self> {
        let spec = Self {
            min_version,
            max_version,
            cipher_suites,
            compression_methods: vec![0],
            extensions,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Chrome 112 ClientHello.
    pub fn chrome_112(alpn: AlpnOffer) -> Self {
        Self {
            min_version: TlsVersion::Tls12,
            max_version: TlsVersion::Tls13,
            cipher_suites: CHROME_112_CIPHER_SUITES.to_vec(),
            compression_methods: vec![0],
            extensions: vec![
                TlsExtension::Grease,
                TlsExtension::ServerName,
                TlsExtension::ExtendedMasterSecret,
                TlsExtension::RenegotiationInfo,
                TlsExtension::SupportedCurves(CHROME_112_CURVES.to_vec()),
                TlsExtension::SupportedPoints(vec![0]),
                TlsExtension::SessionTicket,
                TlsExtension::Alpn(alpn.protocols()),
                TlsExtension::StatusRequest,
                TlsExtension::SignatureAlgorithms(CHROME_112_SIGNATURE_ALGORITHMS.to_vec()),
                TlsExtension::SignedCertificateTimestamp,
                TlsExtension::KeyShare(vec![GREASE_PLACEHOLDER, 0x001d]),
                TlsExtension::PskKeyExchangeModes(vec![PSK_MODE_DHE]),
                TlsExtension::SupportedVersions(vec![GREASE_PLACEHOLDER, 0x0304, 0x0303]),
                TlsExtension::CompressCertificate(vec![CertCompression::Brotli]),
                TlsExtension::ApplicationSettings(vec!["h2"]),
                TlsExtension::Grease,
                TlsExtension::Padding(PaddingStyle::Boring),
            ],
        }
    }

    pub fn min_version(&self) -> TlsVersion {
        self.min_version
    }

    pub fn max_version(&self) -> TlsVersion {
        self.max_version
    }

    pub fn cipher_suites(&self) -> &[u16] {
        &self.cipher_suites
    }

    pub fn compression_methods(&self) -> &[u8] {
        &self.compression_methods
    }

    pub fn extensions(&self) -> &[TlsExtension] {
        &self.extensions
    }

    /// Extension code points in ClientHello order.
    pub fn extension_ids(&self) -> Vec<u16> {
        self.extensions.iter().map(TlsExtension::id).collect()
    }

    fn find<T>(&self, pick: impl Fn(&TlsExtension) -> Option<T>) -> Option<T> {
        self.extensions.iter().find_map(pick)
    }

    pub fn has_extension(&self, id: u16) -> bool {
        self.extensions.iter().any(|e| e.id() == id)
    }

    /// Whether GREASE values are part of this hello.
    pub fn uses_grease(&self) -> bool {
        self.extensions.contains(&TlsExtension::Grease)
    }

    /// ALPN offer list (empty when the extension is absent).
    pub fn alpn_protocols(&self) -> Vec<&'static str> {
        self.find(|e| match e {
            TlsExtension::Alpn(p) => Some(p.clone()),
            _ => None,
        })
        .unwrap_or_default()
    }

    /// ALPN list in wire format (length-prefixed protocol names).
    pub fn alpn_wire(&self) -> Vec<u8> {
        let mut wire = Vec::new();
        for proto in self.alpn_protocols() {
            wire.push(proto.len() as u8);
            wire.extend_from_slice(proto.as_bytes());
        }
        wire
    }

    /// HTTP/2 is only eligible when `h2` is offered.
    pub fn offers_h2(&self) -> bool {
        self.alpn_protocols().contains(&"h2")
    }

    /// Supported groups without GREASE.
    pub fn curves(&self) -> Vec<u16> {
        self.find(|e| match e {
            TlsExtension::SupportedCurves(c) => Some(c.clone()),
            _ => None,
        })
        .unwrap_or_default()
        .into_iter()
        .filter(|&c| c != GREASE_PLACEHOLDER)
        .collect()
    }

    pub fn signature_algorithms(&self) -> Vec<u16> {
        self.find(|e| match e {
            TlsExtension::SignatureAlgorithms(s) => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_default()
    }

    pub fn cert_compression(&self) -> Vec<CertCompression> {
        self.find(|e| match e {
            TlsExtension::CompressCertificate(c) => Some(c.clone()),
            _ => None,
        })
        .unwrap_or_default()
    }

    /// Protocols announced in the ALPS extension.
    pub fn application_settings(&self) -> Vec<&'static str> {
        self.find(|e| match e {
            TlsExtension::ApplicationSettings(p) => Some(p.clone()),
            _ => None,
        })
        .unwrap_or_default()
    }

    /// OpenSSL-style cipher string for the TLS 1.2 suites.
    ///
    /// TLS 1.3 suites are not configurable through the cipher string.
    /// BoringSSL picks their order at handshake time from the CPU: AES-128-GCM,
    /// AES-256-GCM, CHACHA20 with AES hardware, CHACHA20 first without it.
    pub fn cipher_list(&self) -> Result<String> {
        let mut names = Vec::new();
        for &suite in &self.cipher_suites {
            if suite == GREASE_PLACEHOLDER || is_tls13_suite(suite) {
                continue;
            }
            let name = cipher_name(suite).ok_or_else(|| {
                Error::configuration(format!("unsupported cipher suite 0x{:04x}", suite))
            })?;
            names.push(name);
        }
        Ok(names.join(":"))
    }

    /// Curve list string for `set_curves_list`.
    pub fn curves_list(&self) -> Result<String> {
        let mut names = Vec::new();
        for curve in self.curves() {
            let name = curve_name(curve).ok_or_else(|| {
                Error::configuration(format!("unsupported group 0x{:04x}", curve))
            })?;
            names.push(name);
        }
        Ok(names.join(":"))
    }

    /// Signature algorithm string for `set_sigalgs_list`.
    pub fn sigalgs_list(&self) -> Result<String> {
        let mut names = Vec::new();
        for alg in self.signature_algorithms() {
            let name = sigalg_name(alg).ok_or_else(|| {
                Error::configuration(format!("unsupported signature algorithm 0x{:04x}", alg))
            })?;
            names.push(name);
        }
        Ok(names.join(":"))
    }

    /// JA3 input string (GREASE values excluded, as JA3 specifies).
    ///
    /// Matches the wire only on hosts with AES hardware; see
    /// [`CHROME_112_CIPHER_SUITES`].
    pub fn ja3_text(&self) -> String {
        let join = |vals: Vec<u16>| {
            vals.iter()
                .filter(|&&v| v != GREASE_PLACEHOLDER)
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("-")
        };
        let points = self
            .find(|e| match e {
                TlsExtension::SupportedPoints(p) => Some(p.clone()),
                _ => None,
            })
            .unwrap_or_default()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("-");

        format!(
            "{},{},{},{},{}",
            TlsVersion::Tls12.wire(),
            join(self.cipher_suites.clone()),
            join(self.extension_ids()),
            join(self.curves()),
            points
        )
    }

    /// Check that BoringSSL can emit this hello exactly as declared.
    pub fn validate(&self) -> Result<()> {
        if self.min_version > self.max_version {
            return Err(Error::configuration("min TLS version above max"));
        }
        if self.compression_methods != [0] {
            return Err(Error::configuration("only null compression is supported"));
        }

        // Extension order must be a subsequence of BoringSSL's fixed order.
        let ids = self.extension_ids();
        let mut native = BORING_EXTENSION_ORDER.iter();
        for id in &ids {
            if !native.any(|n| n == id) {
                return Err(Error::configuration(format!(
                    "extension {} cannot appear at this position",
                    id
                )));
            }
        }

        let grease_exts = ids.iter().filter(|&&id| id == GREASE_PLACEHOLDER).count();
        if grease_exts != 0 && grease_exts != 2 {
            return Err(Error::configuration(
                "GREASE extensions come in pairs (first and last)",
            ));
        }
        let grease = grease_exts == 2;
        if self.cipher_suites.contains(&GREASE_PLACEHOLDER) != grease {
            return Err(Error::configuration(
                "cipher GREASE must match extension GREASE",
            ));
        }

        if self.has_extension(21) && ids.last() != Some(&21) {
            return Err(Error::configuration("padding must be the last extension"));
        }

        // Validates the code points as a side effect.
        self.cipher_list()?;
        self.curves_list()?;
        self.sigalgs_list()?;

        let curves = self.curves();
        let shares = self
            .find(|e| match e {
                TlsExtension::KeyShare(k) => Some(k.clone()),
                _ => None,
            })
            .unwrap_or_default();
        if let Some(bad) = shares
            .iter()
            .find(|&&g| g != GREASE_PLACEHOLDER && !curves.contains(&g))
        {
            return Err(Error::configuration(format!(
                "key share group 0x{:04x} missing from supported groups",
                bad
            )));
        }

        // BoringSSL only emits ALPS alongside ALPN. The ALPS list may name
        // protocols the ALPN list omits (Chrome sends h2 settings either way).
        if !self.application_settings().is_empty() && self.alpn_protocols().is_empty() {
            return Err(Error::configuration("ALPS requires an ALPN extension"));
        }

        Ok(())
    }
}

fn is_tls13_suite(suite: u16) -> bool {
    matches!(suite, 0x1301 | 0x1302 | 0x1303)
}

/// Map a TLS 1.2 cipher suite id to its OpenSSL name.
pub fn cipher_name(suite: u16) -> Option<&'static str> {
    match suite {
        0xc02b => Some("ECDHE-ECDSA-AES128-GCM-SHA256"),
        0xc02f => Some("ECDHE-RSA-AES128-GCM-SHA256"),
        0xc02c => Some("ECDHE-ECDSA-AES256-GCM-SHA384"),
        0xc030 => Some("ECDHE-RSA-AES256-GCM-SHA384"),
        0xcca9 => Some("ECDHE-ECDSA-CHACHA20-POLY1305"),
        0xcca8 => Some("ECDHE-RSA-CHACHA20-POLY1305"),
        0xc013 => Some("ECDHE-RSA-AES128-SHA"),
        0xc014 => Some("ECDHE-RSA-AES256-SHA"),
        0x009c => Some("AES128-GCM-SHA256"),
        0x009d => Some("AES256-GCM-SHA384"),
        0x002f => Some("AES128-SHA"),
        0x0035 => Some("AES256-SHA"),
        _ => None,
    }
}

/// Map a named group id to its BoringSSL curve name.
pub fn curve_name(group: u16) -> Option<&'static str> {
    match group {
        0x001d => Some("X25519"),
        0x0017 => Some("P-256"),
        0x0018 => Some("P-384"),
        0x0019 => Some("P-521"),
        _ => None,
    }
}

/// Map a signature scheme id to its BoringSSL name.
pub fn sigalg_name(alg: u16) -> Option<&'static str> {
    match alg {
        0x0403 => Some("ecdsa_secp256r1_sha256"),
        0x0503 => Some("ecdsa_secp384r1_sha384"),
        0x0603 => Some("ecdsa_secp521r1_sha512"),
        0x0804 => Some("rsa_pss_rsae_sha256"),
        0x0805 => Some("rsa_pss_rsae_sha384"),
        0x0806 => Some("rsa_pss_rsae_sha512"),
        0x0401 => Some("rsa_pkcs1_sha256"),
        0x0501 => Some("rsa_pkcs1_sha384"),
        0x0601 => Some("rsa_pkcs1_sha512"),
        0x0807 => Some("ed25519"),
        _ => None,
    }
}
