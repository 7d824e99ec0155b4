use cf_downloader::{Error, RequestOptions};

mod helpers;
use helpers::mock_proxy::MockConnectProxy;
use helpers::mock_server::{MockFileServer, ServerOptions};
use helpers::{payload, test_client};

#[tokio::test]
async fn test_h2_selected_through_tunnel() {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();

    let body = payload(10_000);
    let server = MockFileServer::start(body.clone(), ServerOptions::default()).await;
    let proxy = MockConnectProxy::start().await;
    let client = test_client(&proxy.url(), server.ca_pem(), true);

    let response = client.get(&server.url("/page"), None).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.http_version(), "HTTP/2");
    assert_eq!(response.content_length(), Some(body.len() as u64));
    assert_eq!(response.into_body().collect().await.unwrap(), body);

    assert_eq!(proxy.targets(), vec![server.authority()]);
    let seen = server.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].protocol, "h2");
    assert_eq!(seen[0].path, "/page");
}

#[tokio::test]
async fn test_http1_when_only_http1_offered() {
    let body = payload(4096);
    let server = MockFileServer::start(body.clone(), ServerOptions::default()).await;
    let proxy = MockConnectProxy::start().await;
    let client = test_client(&proxy.url(), server.ca_pem(), false);

    let response = client.get(&server.url("/page"), None).await.unwrap();
    assert_eq!(response.http_version(), "HTTP/1.1");
    assert_eq!(response.into_body().collect().await.unwrap(), body);
    assert_eq!(server.seen()[0].protocol, "http/1.1");
}

#[tokio::test]
async fn test_http1_when_server_prefers_it() {
    let body = payload(2048);
    let options = ServerOptions {
        alpn: b"\x08http/1.1",
        ..ServerOptions::default()
    };
    let server = MockFileServer::start(body.clone(), options).await;
    let proxy = MockConnectProxy::start().await;
    let client = test_client(&proxy.url(), server.ca_pem(), true);

    let response = client.get(&server.url("/page"), None).await.unwrap();
    assert_eq!(response.http_version(), "HTTP/1.1");
    assert_eq!(response.into_body().collect().await.unwrap(), body);
    assert_eq!(server.seen()[0].protocol, "http/1.1");
}

#[tokio::test]
async fn test_same_body_over_both_protocols() {
    let body = payload(50_000);
    let server = MockFileServer::start(body.clone(), ServerOptions::default()).await;
    let proxy = MockConnectProxy::start().await;

    let over_h2 = test_client(&proxy.url(), server.ca_pem(), true)
        .get(&server.url("/f"), None)
        .await
        .unwrap()
        .into_body()
        .collect()
        .await
        .unwrap();
    let over_h1 = test_client(&proxy.url(), server.ca_pem(), false)
        .get(&server.url("/f"), None)
        .await
        .unwrap()
        .into_body()
        .collect()
        .await
        .unwrap();
    assert_eq!(over_h2, over_h1);
}

#[tokio::test]
async fn test_default_and_custom_headers_reach_origin() {
    let server = MockFileServer::start(payload(16), ServerOptions::default()).await;
    let proxy = MockConnectProxy::start().await;
    let client = test_client(&proxy.url(), server.ca_pem(), true);

    client.get(&server.url("/a"), None).await.unwrap();
    let opts = RequestOptions {
        headers: Some(vec![("User-Agent".to_string(), "custom/1.0".to_string())]),
    };
    client.get(&server.url("/b"), Some(&opts)).await.unwrap();

    let seen = server.seen();
    assert!(seen[0]
        .user_agent
        .as_deref()
        .unwrap()
        .contains("Chrome/112"));
    assert_eq!(seen[1].user_agent.as_deref(), Some("custom/1.0"));
}

#[tokio::test]
async fn test_untrusted_certificate_fails_handshake() {
    let server = MockFileServer::start(payload(16), ServerOptions::default()).await;
    let proxy = MockConnectProxy::start().await;
    // Trust a different self-signed certificate.
    let (_, other_ca) = helpers::tls::acceptor_with_alpn(b"\x02h2");
    let client = test_client(&proxy.url(), &other_ca, true);

    let err = client.get(&server.url("/a"), None).await.unwrap_err();
    assert!(matches!(err, Error::Handshake(_)), "got {:?}", err);
    assert!(server.seen().is_empty());
}
