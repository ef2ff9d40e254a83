//! Error types for proxyfleet-link

use thiserror::Error;

/// Errors produced while parsing a connection link
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Not a URI at all
    #[error("invalid URI: {0}")]
    InvalidUri(#[from] url::ParseError),

    /// Scheme has no extractor
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("missing server host")]
    MissingHost,

    #[error("missing server port")]
    MissingPort,

    /// No uuid/password in the userinfo position
    #[error("missing credential")]
    MissingCredential,

    /// `vmess://` body is not base64 encoded JSON
    #[error("invalid vmess payload: {0}")]
    InvalidPayload(String),

    /// vmess network other than `tcp` or `ws`
    #[error("unsupported vmess transport: {0}")]
    UnsupportedTransport(String),
}
