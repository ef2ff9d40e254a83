//! Canonical proxy record types

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

/// Keys stored in `CanonicalProxyRecord::transport`
pub mod transport {
    /// vless transport network (`tcp`, `ws`, ...)
    pub const NETWORK: &str = "type";
    /// vless flow control
    pub const FLOW: &str = "flow";
    pub const SNI: &str = "sni";
    /// REALITY public key
    pub const PUBLIC_KEY: &str = "pbk";
    /// REALITY short id
    pub const SHORT_ID: &str = "sid";
    /// uTLS client fingerprint
    pub const FINGERPRINT: &str = "fp";
    /// hysteria2 certificate verification switch, `1` skips verification
    pub const INSECURE: &str = "insecure";
    pub const OBFS: &str = "obfs";
    pub const OBFS_PASSWORD: &str = "obfs-password";
    /// vmess alter id
    pub const ALTER_ID: &str = "aid";
    /// vmess payload cipher
    pub const CIPHER: &str = "scy";
    /// `tls` when the vmess transport is wrapped in TLS
    pub const TLS: &str = "tls";
    /// WebSocket path
    pub const PATH: &str = "path";
    /// WebSocket `Host` header
    pub const HOST: &str = "host";
}

/// Proxy protocols a node can be provisioned with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolKind {
    /// VLESS over REALITY
    Reality,
    Hysteria2,
    /// VMess over WebSocket
    VmessWs,
    /// VMess over plain TCP
    VmessTcp,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 4] = [
        ProtocolKind::Reality,
        ProtocolKind::Hysteria2,
        ProtocolKind::VmessWs,
        ProtocolKind::VmessTcp,
    ];

    /// Canonical lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolKind::Reality => "reality",
            ProtocolKind::Hysteria2 => "hysteria2",
            ProtocolKind::VmessWs => "vmess-ws",
            ProtocolKind::VmessTcp => "vmess-tcp",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown protocol name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown protocol `{0}` (expected reality, hysteria2, vmess-ws or vmess-tcp)")]
pub struct UnknownProtocol(pub String);

impl FromStr for ProtocolKind {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reality" => Ok(ProtocolKind::Reality),
            "hysteria2" | "hy2" => Ok(ProtocolKind::Hysteria2),
            "vmess-ws" => Ok(ProtocolKind::VmessWs),
            "vmess-tcp" => Ok(ProtocolKind::VmessTcp),
            other => Err(UnknownProtocol(other.to_string())),
        }
    }
}

/// Userinfo/query component encoding: everything but unreserved characters
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// One node's connection parameters, independent of the link format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalProxyRecord {
    /// Display name, unique within a routing config
    pub name: String,
    pub kind: ProtocolKind,
    /// Host name or IP address, without IPv6 brackets
    pub server: String,
    pub port: u16,
    /// UUID for vless, password for hysteria2
    pub auth_secret: String,
    /// Protocol specific options, see [`transport`]
    pub transport: BTreeMap<String, String>,
}

impl CanonicalProxyRecord {
    /// Look up a transport option
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.transport.get(key).map(String::as_str)
    }

    /// Transport option or `default` when absent
    #[must_use]
    pub fn option_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.option(key).unwrap_or(default)
    }

    /// Server formatted for the authority part of a URI
    #[must_use]
    pub fn authority_host(&self) -> String {
        if self.server.contains(':') {
            format!("[{}]", self.server)
        } else {
            self.server.clone()
        }
    }

    /// Render the record back into a connection link
    #[must_use]
    pub fn to_uri(&self) -> String {
        let scheme = match self.kind {
            ProtocolKind::Reality => "vless",
            ProtocolKind::Hysteria2 => "hysteria2",
            ProtocolKind::VmessWs | ProtocolKind::VmessTcp => return crate::vmess::render(self),
        };

        let query = self
            .transport
            .iter()
            .map(|(k, v)| format!("{k}={}", utf8_percent_encode(v, COMPONENT)))
            .collect::<Vec<_>>()
            .join("&");

        let mut uri = format!(
            "{scheme}://{}@{}:{}",
            utf8_percent_encode(&self.auth_secret, COMPONENT),
            self.authority_host(),
            self.port
        );
        if !query.is_empty() {
            uri.push('?');
            uri.push_str(&query);
        }
        uri.push('#');
        uri.push_str(&utf8_percent_encode(&self.name, COMPONENT).to_string());
        uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_from_str_accepts_aliases() {
        assert_eq!("hy2".parse::<ProtocolKind>().unwrap(), ProtocolKind::Hysteria2);
        assert_eq!("REALITY".parse::<ProtocolKind>().unwrap(), ProtocolKind::Reality);
        assert!("trojan".parse::<ProtocolKind>().is_err());

        for kind in ProtocolKind::ALL {
            assert_eq!(kind.as_str().parse::<ProtocolKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_option_lookup() {
        let record = CanonicalProxyRecord {
            name: "n".into(),
            kind: ProtocolKind::Hysteria2,
            server: "2001:db8::1".into(),
            port: 443,
            auth_secret: "s".into(),
            transport: BTreeMap::from([(transport::SNI.to_string(), "a.example".to_string())]),
        };

        assert_eq!(record.option(transport::SNI), Some("a.example"));
        assert_eq!(record.option(transport::OBFS), None);
        assert_eq!(record.option_or(transport::OBFS, "salamander"), "salamander");
        assert_eq!(record.authority_host(), "[2001:db8::1]");
    }

    #[test]
    fn test_vmess_uri_is_base64_json() {
        let record = CanonicalProxyRecord {
            name: "n".into(),
            kind: ProtocolKind::VmessTcp,
            server: "203.0.113.1".into(),
            port: 443,
            auth_secret: "s".into(),
            transport: BTreeMap::new(),
        };
        let uri = record.to_uri();
        assert!(uri.starts_with("vmess://eyJ"));
        assert!(!uri.contains('#'));
    }
}
