//! Link parsing
//!
//! Each supported scheme maps to one [`LinkScheme`] variant. Adding a protocol
//! means adding a variant, and the compiler points at every match that needs
//! a new arm.

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use tracing::warn;
use url::Url;

use crate::error::LinkError;
use crate::types::{CanonicalProxyRecord, ProtocolKind, transport};
use crate::vmess;

/// Link schemes with an extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkScheme {
    /// `vless://uuid@host:port?...`, provisioned as REALITY
    Vless,
    /// `hysteria2://password@host:port?...` (also `hy2://`)
    Hysteria2,
    /// `vmess://<base64 JSON>`
    Vmess,
}

impl LinkScheme {
    /// Match a URI scheme, case-insensitively
    #[must_use]
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "vless" => Some(LinkScheme::Vless),
            "hysteria2" | "hy2" => Some(LinkScheme::Hysteria2),
            "vmess" => Some(LinkScheme::Vmess),
            _ => None,
        }
    }

    /// Query parameters kept in the record, with the value used when absent
    fn parameters(self) -> &'static [(&'static str, &'static str)] {
        match self {
            LinkScheme::Vless => &[
                (transport::NETWORK, "tcp"),
                (transport::FLOW, "xtls-rprx-vision"),
                (transport::SNI, ""),
                (transport::PUBLIC_KEY, ""),
                (transport::SHORT_ID, ""),
                (transport::FINGERPRINT, "chrome"),
            ],
            LinkScheme::Hysteria2 => &[
                (transport::SNI, ""),
                (transport::INSECURE, "0"),
                (transport::OBFS, "salamander"),
                (transport::OBFS_PASSWORD, ""),
            ],
            // carried in the JSON payload
            LinkScheme::Vmess => &[],
        }
    }

    /// Credential from the userinfo part
    fn credential(self, url: &Url) -> Option<String> {
        let user = decode(url.username());
        let secret = match (self, url.password()) {
            // hysteria2 accepts `user:pass` style auth
            (LinkScheme::Hysteria2, Some(pass)) => format!("{user}:{}", decode(pass)),
            _ => user,
        };
        (!secret.is_empty()).then_some(secret)
    }
}

fn decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

/// Parse a connection link into a canonical record
///
/// `display_name` becomes the record name. When it is blank the link
/// fragment is used, then `host:port`.
///
/// # Errors
/// Returns `LinkError` for malformed links, unsupported schemes and links
/// missing host, port or credential
pub fn parse(uri: &str, display_name: &str) -> Result<CanonicalProxyRecord, LinkError> {
    let uri = uri.trim();

    // base64 payloads are not valid URL authorities
    if let Some((scheme, payload)) = uri.split_once("://") {
        if LinkScheme::from_scheme(scheme) == Some(LinkScheme::Vmess) {
            return vmess::parse(payload, display_name);
        }
    }

    let url = Url::parse(uri)?;

    let scheme = LinkScheme::from_scheme(url.scheme())
        .ok_or_else(|| LinkError::UnsupportedScheme(url.scheme().to_string()))?;
    let kind = match scheme {
        LinkScheme::Vless => ProtocolKind::Reality,
        LinkScheme::Hysteria2 => ProtocolKind::Hysteria2,
        LinkScheme::Vmess => return Err(LinkError::InvalidPayload("missing `//`".to_string())),
    };

    let server = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .filter(|h| !h.is_empty())
        .ok_or(LinkError::MissingHost)?
        .to_string();
    let port = url.port().ok_or(LinkError::MissingPort)?;
    let auth_secret = scheme.credential(&url).ok_or(LinkError::MissingCredential)?;

    // first occurrence wins
    let mut query: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in url.query_pairs() {
        query
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }

    let transport = scheme
        .parameters()
        .iter()
        .map(|(key, default)| {
            let value = query
                .get(*key)
                .cloned()
                .unwrap_or_else(|| (*default).to_string());
            ((*key).to_string(), value)
        })
        .collect();

    let name = match display_name.trim() {
        "" => url
            .fragment()
            .map(decode)
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| format!("{server}:{port}")),
        name => name.to_string(),
    };

    Ok(CanonicalProxyRecord {
        name,
        kind,
        server,
        port,
        auth_secret,
        transport,
    })
}

/// Parse a link for a batch, logging and skipping failures
#[must_use]
pub fn parse_link(uri: &str, display_name: &str) -> Option<CanonicalProxyRecord> {
    match parse(uri, display_name) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(name = %display_name, error = %e, "skipping link");
            None
        }
    }
}
