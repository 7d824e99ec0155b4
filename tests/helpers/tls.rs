use boring::pkey::PKey;
use boring::ssl::{AlpnError, SslAcceptor, SslMethod};
use boring::x509::X509;

/// Generate a self-signed certificate for localhost and build an acceptor
/// that picks the first of `server_alpn` (wire format) the client offers.
///
/// Returns the acceptor and the certificate PEM, which doubles as the CA.
pub fn acceptor_with_alpn(server_alpn: &'static [u8]) -> (SslAcceptor, Vec<u8>) {
    let subject_alt_names = vec!["localhost".to_string(), "127.0.0.1".to_string()];

    let cert =
        rcgen::generate_simple_self_signed(subject_alt_names).expect("Failed to generate cert");
    let cert_pem = cert.cert.pem();
    let key_pem = cert.signing_key.serialize_pem();

    let pkey = PKey::private_key_from_pem(key_pem.as_bytes()).expect("Failed to parse private key");
    let x509 = X509::from_pem(cert_pem.as_bytes()).expect("Failed to parse certificate");

    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())
        .expect("Failed to create SslAcceptor builder");
    builder
        .set_private_key(&pkey)
        .expect("Failed to set private key");
    builder
        .set_certificate(&x509)
        .expect("Failed to set certificate");
    builder.set_alpn_select_callback(move |_, client_protos| {
        boring::ssl::select_next_proto(server_alpn, client_protos).ok_or(AlpnError::NOACK)
    });

    (builder.build(), cert_pem.into_bytes())
}
