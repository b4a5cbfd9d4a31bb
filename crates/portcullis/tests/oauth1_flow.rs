mod support;

use http::Method;
use portcullis::providers;
use portcullis::url::Url;
use portcullis::{
    ConsumerCredentials, HmacSha1, MemoryTokenStorage, OAuth1Service, OAuth1Token,
    OAuthErrorKind, RequestBody, Signature, TokenKey, TokenPhase, TokenStorage, Uri,
};
use support::{MockClient, Recorded, lookup, oauth_header_params};

const NO_HEADERS: [(&str, &str); 0] = [];

fn credentials() -> ConsumerCredentials {
    ConsumerCredentials::with_callback(
        "consumer-key",
        "consumer-secret",
        Url::parse("https://app.example.com/oauth/callback").unwrap(),
    )
}

fn etsy(client: MockClient) -> OAuth1Service<MockClient, MemoryTokenStorage> {
    OAuth1Service::new(
        providers::etsy(),
        credentials(),
        client,
        MemoryTokenStorage::new(),
    )
}

fn assert_signed(request: &Recorded, consumer_secret: &str, token_secret: &str) {
    let params = oauth_header_params(request.header("authorization").expect("signed"));
    let mut covered = params.clone();
    if request.header("content-type") == Some("application/x-www-form-urlencoded") {
        covered.extend(
            url::form_urlencoded::parse(&request.body).map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }
    let expected = Signature::new(HmacSha1).sign(
        &request.method,
        &Uri::parse(&request.uri).unwrap(),
        covered,
        consumer_secret,
        token_secret,
    );
    assert_eq!(lookup(&params, "oauth_signature"), Some(expected.as_str()));
}

#[test]
fn etsy_endpoints() {
    let service = etsy(MockClient::default()).with_scopes(["email_r", "listings_r"]);

    let uri = service.request_token_uri();
    assert!(
        uri.absolute()
            .starts_with("https://openapi.etsy.com/v2/oauth/request_token")
    );
    assert_eq!(uri.query_param("scope").as_deref(), Some("email_r listings_r"));

    let auth = service.authorization_uri("foo", NO_HEADERS);
    assert_eq!(auth.absolute(), "https://openapi.etsy.com/v2/?oauth_token=foo");
    assert_eq!(
        service.base_api_uri().map(Uri::absolute),
        Some("https://openapi.etsy.com/v2/")
    );
}

#[test]
fn etsy_without_scopes_sends_no_scope_param() {
    let service = etsy(MockClient::default());
    assert_eq!(service.request_token_uri().query_param("scope"), None);
}

#[tokio::test]
async fn etsy_rejects_bad_request_token_responses() {
    for body in ["", "notanarray", "foo=bar", "oauth_callback_confirmed=false"] {
        let client = MockClient::default();
        client.push(200, body).await;
        let err = etsy(client).request_request_token().await.unwrap_err();
        assert!(
            matches!(err.kind(), OAuthErrorKind::TokenResponse(_)),
            "{body:?} gave {err:?}"
        );
    }
}

#[tokio::test]
async fn etsy_request_token() {
    let client = MockClient::default();
    client
        .push(
            200,
            "oauth_token=foo&oauth_token_secret=bar&oauth_callback_confirmed=true&login_url=x",
        )
        .await;
    let service = etsy(client.clone()).with_scopes(["email_r"]);

    let token = service.request_request_token().await.unwrap();
    assert_eq!(token.request_token, "foo");
    assert_eq!(token.request_token_secret, "bar");
    assert_eq!(token.phase(), TokenPhase::Request);
    assert_eq!(token.extra_params.get("login_url"), Some("x"));
    assert!(!token.extra_params.contains_key("oauth_callback_confirmed"));

    let sent = client.last().await;
    assert_eq!(sent.method, Method::POST);
    assert_eq!(sent.query_param("scope").as_deref(), Some("email_r"));
    let params = oauth_header_params(sent.header("authorization").unwrap());
    assert_eq!(
        lookup(&params, "oauth_callback"),
        Some("https://app.example.com/oauth/callback")
    );
    assert_eq!(lookup(&params, "oauth_consumer_key"), Some("consumer-key"));
    assert_eq!(lookup(&params, "oauth_token"), None);
    assert_signed(&sent, "consumer-secret", "");

    // request tokens are handed back, not persisted
    let key = service.storage_key();
    assert!(
        !TokenStorage::<OAuth1Token>::has_access_token(service.storage(), &key)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn etsy_access_token_error() {
    let client = MockClient::default();
    client.push(200, "error=bar").await;
    let service = etsy(client);
    let request_token = OAuth1Token::request("foo", "secret");

    let err = service
        .request_access_token("foo", "verifier", Some(&request_token))
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), OAuthErrorKind::TokenResponse(_)));
    assert!(
        !TokenStorage::<OAuth1Token>::has_access_token(service.storage(), &service.storage_key())
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn etsy_access_token() {
    let client = MockClient::default();
    client
        .push(200, "oauth_token=access&oauth_token_secret=shh")
        .await;
    let service = etsy(client.clone());
    let request_token = OAuth1Token::request("foo", "request-secret");

    let token = service
        .request_access_token("foo", "verifier", Some(&request_token))
        .await
        .unwrap();
    assert_eq!(token.phase(), TokenPhase::Access);
    assert_eq!(token.access_token.as_deref(), Some("access"));
    assert_eq!(token.access_secret(), "shh");

    let sent = client.last().await;
    assert_eq!(sent.body_text(), "oauth_verifier=verifier");
    let params = oauth_header_params(sent.header("authorization").unwrap());
    assert_eq!(lookup(&params, "oauth_token"), Some("foo"));
    assert_signed(&sent, "consumer-secret", "request-secret");

    let stored = TokenStorage::<OAuth1Token>::retrieve_access_token(
        service.storage(),
        &TokenKey::new("etsy", "default"),
    )
    .await
    .unwrap();
    assert_eq!(stored, token);
}

#[tokio::test]
async fn etsy_access_token_for_wrong_request_token() {
    let service = etsy(MockClient::default());
    let err = service
        .request_access_token("other", "verifier", Some(&OAuth1Token::request("foo", "s")))
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), OAuthErrorKind::InvalidRequest));
}

#[tokio::test]
async fn bitbucket_full_flow() {
    let client = MockClient::default();
    client
        .push(
            200,
            "oauth_token=req&oauth_token_secret=req-secret&oauth_callback_confirmed=true",
        )
        .await;
    client
        .push(200, "oauth_token=acc&oauth_token_secret=acc-secret")
        .await;
    client.push(200, r#"{"repositories":[]}"#).await;

    let service = OAuth1Service::new(
        providers::bitbucket(),
        credentials(),
        client.clone(),
        MemoryTokenStorage::new(),
    )
    .with_account("alice");

    let request_token = service.request_request_token().await.unwrap();
    let redirect = service.authorization_uri(&request_token.request_token, NO_HEADERS);
    assert_eq!(redirect.query_param("oauth_token").as_deref(), Some("req"));

    service
        .request_access_token("req", "pin", Some(&request_token))
        .await
        .unwrap();

    let response = service
        .request(
            "repositories/alice/",
            "get",
            RequestBody::form([("pagelen", "10")]),
            [("Accept", "application/json")],
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.body(), br#"{"repositories":[]}"#);

    let requests = client.requests().await;
    assert_eq!(requests.len(), 3);
    let api = &requests[2];
    assert_eq!(api.method, Method::GET);
    assert_eq!(
        api.uri,
        "https://bitbucket.org/api/1.0/repositories/alice/?pagelen=10"
    );
    assert_eq!(api.header("accept"), Some("application/json"));
    let params = oauth_header_params(api.header("authorization").unwrap());
    assert_eq!(lookup(&params, "oauth_token"), Some("acc"));
    assert_eq!(lookup(&params, "oauth_signature_method"), Some("HMAC-SHA1"));
    assert_eq!(lookup(&params, "oauth_version"), Some("1.0"));
    assert_signed(api, "consumer-secret", "acc-secret");
}

#[tokio::test]
async fn bitbucket_requires_confirmed_callback() {
    let client = MockClient::default();
    client.push(200, "oauth_token=req&oauth_token_secret=s").await;
    let service = OAuth1Service::new(
        providers::bitbucket(),
        credentials(),
        client,
        MemoryTokenStorage::new(),
    );
    let err = service.request_request_token().await.unwrap_err();
    assert!(matches!(err.kind(), OAuthErrorKind::TokenResponse(_)));
}

#[tokio::test]
async fn request_without_token_is_not_found() {
    let service = etsy(MockClient::default());
    let err = service
        .request("listings/active", "GET", RequestBody::Empty, NO_HEADERS)
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), OAuthErrorKind::TokenNotFound(_)));
}
