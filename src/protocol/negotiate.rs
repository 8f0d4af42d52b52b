//! Negotiation response wire types.
//!
//! # Format
//!
//! ```json
//! {
//!   "connectionId": "807809a5-31bf-470d-9e23-afaee35d8a0d",
//!   "availableTransports": [
//!     { "transport": "WebSockets", "transferFormats": ["Text", "Binary"] },
//!     { "transport": "ServerSentEvents", "transferFormats": ["Text"] }
//!   ]
//! }
//! ```
//!
//! A redirect carries `url` (and optionally `accessToken`) instead of a
//! usable transport list.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::TransferFormat;

// ============================================================================
// AvailableTransport
// ============================================================================

/// One transport advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    /// Transport name, e.g. `WebSockets`.
    pub transport: String,

    /// Transfer formats the server supports on this transport.
    #[serde(default)]
    pub transfer_formats: Vec<String>,
}

impl AvailableTransport {
    /// Creates an entry from a name and format names.
    #[must_use]
    pub fn new(
        transport: impl Into<String>,
        formats: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            transport: transport.into(),
            transfer_formats: formats.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if the server lists `format` for this transport.
    #[inline]
    #[must_use]
    pub fn supports(&self, format: TransferFormat) -> bool {
        self.transfer_formats.iter().any(|f| f == format.as_str())
    }
}

// ============================================================================
// NegotiationResponse
// ============================================================================

/// Parsed body of a `POST …/negotiate` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationResponse {
    /// Server-issued connection identifier.
    ///
    /// Absent on redirect responses.
    #[serde(default)]
    pub connection_id: String,

    /// Redirect target; when present the response must be followed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Access token that supersedes the configured provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Transports in server preference order.
    #[serde(default)]
    pub available_transports: Vec<AvailableTransport>,

    /// Server-side negotiation failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NegotiationResponse {
    /// Parses and validates a negotiation body.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the body is not valid JSON of this shape
    /// - [`Error::Negotiation`] if the server reported an error, or a
    ///   terminal response has no connection id
    pub fn parse(body: &[u8]) -> Result<Self> {
        let response: Self = serde_json::from_slice(body)?;

        if let Some(error) = &response.error {
            return Err(Error::negotiation("", error.clone()));
        }

        if !response.is_redirect() && response.connection_id.trim().is_empty() {
            return Err(Error::negotiation(
                "",
                "Invalid negotiation response received: missing connectionId.",
            ));
        }

        Ok(response)
    }

    /// Returns `true` if this response redirects to another URL.
    #[inline]
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        self.url.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_terminal_response() {
        let body = br#"{
            "connectionId": "abc",
            "availableTransports": [
                {"transport": "WebSockets", "transferFormats": ["Text", "Binary"]},
                {"transport": "ServerSentEvents", "transferFormats": ["Text"]}
            ]
        }"#;

        let response = NegotiationResponse::parse(body).expect("valid body");
        assert_eq!(response.connection_id, "abc");
        assert!(!response.is_redirect());
        assert_eq!(response.available_transports.len(), 2);
        assert!(response.available_transports[0].supports(TransferFormat::Binary));
        assert!(!response.available_transports[1].supports(TransferFormat::Binary));
    }

    #[test]
    fn test_parse_redirect_without_connection_id() {
        let body = br#"{"url": "https://other/hub", "accessToken": "t0k"}"#;
        let response = NegotiationResponse::parse(body).expect("redirect is valid");
        assert!(response.is_redirect());
        assert_eq!(response.access_token.as_deref(), Some("t0k"));
        assert!(response.available_transports.is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_connection_id() {
        let err = NegotiationResponse::parse(br#"{"availableTransports": []}"#).unwrap_err();
        assert!(matches!(err, Error::Negotiation { .. }));
    }

    #[test]
    fn test_parse_surfaces_server_error() {
        let err = NegotiationResponse::parse(br#"{"error": "Hub not found"}"#).unwrap_err();
        assert!(err.to_string().contains("Hub not found"));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        let err = NegotiationResponse::parse(b"<html>").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
