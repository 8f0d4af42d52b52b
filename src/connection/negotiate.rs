//! Negotiation handshake.
//!
//! `POST {url}/negotiate` with an empty body; the response either names a
//! connection and its transports or redirects to another URL. Redirects are
//! followed up to [`MAX_REDIRECTS`] times.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};
use url::Url;

use crate::error::{Error, Result};
use crate::http::{AccessTokenSource, HttpClient, HttpRequest};
use crate::protocol::NegotiationResponse;
use crate::protocol::endpoint;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on negotiate round-trips for one start attempt.
pub const MAX_REDIRECTS: usize = 100;

// ============================================================================
// Negotiated
// ============================================================================

/// Outcome of a completed redirect chain.
#[derive(Debug, Clone)]
pub struct Negotiated {
    /// URL the terminal response came from.
    pub url: Url,

    /// Terminal (non-redirect) response.
    pub response: NegotiationResponse,

    /// Number of redirects followed.
    pub redirects: usize,
}

// ============================================================================
// NegotiationClient
// ============================================================================

/// Performs the handshake against the server.
pub struct NegotiationClient {
    http: Arc<dyn HttpClient>,
    tokens: Arc<AccessTokenSource>,
}

impl NegotiationClient {
    /// Creates a client sending through `http`.
    ///
    /// Redirect responses carrying an access token install it into `tokens`.
    #[must_use]
    pub fn new(http: Arc<dyn HttpClient>, tokens: Arc<AccessTokenSource>) -> Self {
        Self { http, tokens }
    }

    /// Sends one negotiate request to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Negotiation`] for transport failures, non-2xx
    /// statuses, malformed bodies, and server-reported errors.
    pub async fn negotiate(&self, url: &Url) -> Result<NegotiationResponse> {
        let target = endpoint::negotiate_url(url);
        debug!(url = %target, "Sending negotiation request");

        match self.request(&target).await {
            Ok(response) => {
                debug!(
                    connection_id = %response.connection_id,
                    redirect = response.is_redirect(),
                    "Negotiation response received"
                );
                Ok(response)
            }
            Err(e) => {
                error!(url = %target, error = %e, "Failed to start connection. Error getting negotiation response");
                Err(wrap_negotiation_error(&target, e))
            }
        }
    }

    /// Negotiates against `url`, following redirects.
    ///
    /// # Errors
    ///
    /// - [`Error::Negotiation`] if any round-trip fails
    /// - [`Error::RedirectLimitExceeded`] after [`MAX_REDIRECTS`] redirects
    /// - [`Error::InvalidUrl`] if a redirect target cannot be parsed
    pub async fn negotiate_with_redirects(&self, url: &Url) -> Result<Negotiated> {
        let mut current = url.clone();
        let mut redirects = 0;

        loop {
            let response = self.negotiate(&current).await?;

            if let Some(token) = response.access_token.as_deref() {
                self.tokens.set_override(token);
            }

            let Some(target) = response.url.as_deref() else {
                info!(connection_id = %response.connection_id, url = %current, "Negotiation complete");
                return Ok(Negotiated {
                    url: current,
                    response,
                    redirects,
                });
            };

            redirects += 1;
            if redirects >= MAX_REDIRECTS {
                error!(url = %target, limit = MAX_REDIRECTS, "Negotiate redirection limit exceeded");
                return Err(Error::redirect_limit_exceeded(target, MAX_REDIRECTS));
            }

            debug!(from = %current, to = %target, redirects, "Following negotiation redirect");
            current = endpoint::resolve_url(target, Some(&current))?;
        }
    }

    async fn request(&self, target: &Url) -> Result<NegotiationResponse> {
        let response = self.http.send(HttpRequest::post(target.as_str())).await?;

        if !response.is_success() {
            return Err(Error::http(format!(
                "Response status code does not indicate success: {}",
                response.status
            )));
        }

        NegotiationResponse::parse(&response.body)
    }
}

impl fmt::Debug for NegotiationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationClient")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

/// Attaches the negotiate URL to any failure.
fn wrap_negotiation_error(target: &Url, error: Error) -> Error {
    match error {
        Error::Negotiation { message, .. } => Error::negotiation(target.as_str(), message),
        other => Error::negotiation(target.as_str(), other.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::http::{HttpMethod, HttpResponse};
    use crate::testing::FakeHttpClient;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn client(http: &Arc<FakeHttpClient>) -> (NegotiationClient, Arc<AccessTokenSource>) {
        let tokens = Arc::new(AccessTokenSource::default());
        (NegotiationClient::new(http.clone(), Arc::clone(&tokens)), tokens)
    }

    fn terminal(id: &str) -> serde_json::Value {
        json!({
            "connectionId": id,
            "availableTransports": [
                { "transport": "WebSockets", "transferFormats": ["Text", "Binary"] }
            ]
        })
    }

    #[tokio::test]
    async fn test_posts_empty_body_to_negotiate() {
        let http = FakeHttpClient::new();
        http.push_json(terminal("abc"));
        let (client, _) = client(&http);

        let response = client.negotiate(&url("http://h/hub/")).await.unwrap();
        assert_eq!(response.connection_id, "abc");

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].url, "http://h/hub/negotiate");
        assert!(requests[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_is_negotiation_error() {
        let http = FakeHttpClient::new();
        http.push_response(HttpResponse::new(500, "boom"));
        let (client, _) = client(&http);

        let err = client.negotiate(&url("http://h/hub")).await.unwrap_err();
        match err {
            Error::Negotiation { url, message } => {
                assert_eq!(url, "http://h/hub/negotiate");
                assert!(message.contains("500"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_negotiation_error() {
        let http = FakeHttpClient::new();
        http.push_error(Error::http("connection refused"));
        let (client, _) = client(&http);

        let err = client.negotiate(&url("http://h/hub")).await.unwrap_err();
        assert!(matches!(err, Error::Negotiation { .. }));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_negotiation_error() {
        let http = FakeHttpClient::new();
        http.push_response(HttpResponse::new(200, "not json"));
        let (client, _) = client(&http);

        let err = client.negotiate(&url("http://h/hub")).await.unwrap_err();
        assert!(matches!(err, Error::Negotiation { .. }));
    }

    #[tokio::test]
    async fn test_server_error_field_is_surfaced() {
        let http = FakeHttpClient::new();
        http.push_json(json!({ "error": "Negotiate not allowed" }));
        let (client, _) = client(&http);

        let err = client.negotiate(&url("http://h/hub")).await.unwrap_err();
        match err {
            Error::Negotiation { message, .. } => assert_eq!(message, "Negotiate not allowed"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_redirect_chain_uses_last_response() {
        let http = FakeHttpClient::new();
        for hop in 1..MAX_REDIRECTS {
            http.push_json(json!({ "url": format!("http://node{hop}/hub") }));
        }
        http.push_json(json!({
            "connectionId": "final",
            "availableTransports": [
                { "transport": "ServerSentEvents", "transferFormats": ["Text"] }
            ]
        }));
        let (client, _) = client(&http);

        let negotiated = client
            .negotiate_with_redirects(&url("http://h/hub"))
            .await
            .unwrap();

        assert_eq!(negotiated.redirects, MAX_REDIRECTS - 1);
        assert_eq!(negotiated.response.connection_id, "final");
        assert_eq!(negotiated.url.as_str(), "http://node99/hub");
        assert_eq!(
            negotiated.response.available_transports[0].transport,
            "ServerSentEvents"
        );
        assert_eq!(http.requests().len(), MAX_REDIRECTS);
        assert_eq!(http.requests()[1].url, "http://node1/hub/negotiate");
    }

    #[tokio::test]
    async fn test_redirect_limit_exceeded() {
        let http = FakeHttpClient::new();
        for hop in 0..MAX_REDIRECTS {
            http.push_json(json!({ "url": format!("http://node{hop}/hub") }));
        }
        http.push_json(terminal("never"));
        let (client, _) = client(&http);

        let err = client
            .negotiate_with_redirects(&url("http://h/hub"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::RedirectLimitExceeded { limit: MAX_REDIRECTS, .. }
        ));
        assert_eq!(http.requests().len(), MAX_REDIRECTS);
    }

    #[tokio::test]
    async fn test_redirect_access_token_overrides_provider() {
        let http = FakeHttpClient::new();
        http.push_json(json!({ "url": "http://node/hub", "accessToken": "redirect-token" }));
        http.push_json(terminal("abc"));
        let (client, tokens) = client(&http);

        client
            .negotiate_with_redirects(&url("http://h/hub"))
            .await
            .unwrap();

        assert!(tokens.has_override());
        assert_eq!(
            tokens.token().await.unwrap(),
            Some("redirect-token".to_string())
        );
    }
}
