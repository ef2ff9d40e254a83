//! Clash Meta proxy entries

use std::collections::BTreeMap;

use proxyfleet_link::{CanonicalProxyRecord, ProtocolKind, transport};
use serde::{Deserialize, Serialize};

/// One entry of the `proxies` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClashProxy {
    pub name: String,
    #[serde(flatten)]
    pub protocol: ProxyProtocol,
}

impl ClashProxy {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProxyProtocol {
    Vless(VlessProxy),
    Hysteria2(Hysteria2Proxy),
    Vmess(VmessProxy),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VlessProxy {
    pub server: String,
    pub port: u16,
    pub uuid: String,
    pub network: String,
    pub tls: bool,
    pub udp: bool,
    pub flow: String,
    pub servername: String,
    pub reality_opts: RealityOpts,
    pub client_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RealityOpts {
    pub public_key: String,
    pub short_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Hysteria2Proxy {
    pub server: String,
    pub port: u16,
    pub password: String,
    pub sni: String,
    pub skip_cert_verify: bool,
    pub udp: bool,
    pub obfs: String,
    pub obfs_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VmessProxy {
    pub server: String,
    pub port: u16,
    pub uuid: String,
    #[serde(rename = "alterId")]
    pub alter_id: u32,
    pub cipher: String,
    pub network: String,
    pub tls: bool,
    pub udp: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servername: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_opts: Option<WsOpts>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsOpts {
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn vmess(record: &CanonicalProxyRecord) -> VmessProxy {
    let ws = record.kind == ProtocolKind::VmessWs;
    let host = non_empty(record.option(transport::HOST));

    VmessProxy {
        server: record.server.clone(),
        port: record.port,
        uuid: record.auth_secret.clone(),
        alter_id: record.option_or(transport::ALTER_ID, "0").parse().unwrap_or(0),
        cipher: record.option_or(transport::CIPHER, "auto").to_string(),
        network: if ws { "ws" } else { "tcp" }.to_string(),
        tls: record.option(transport::TLS) == Some("tls"),
        udp: true,
        servername: non_empty(record.option(transport::SNI)).or_else(|| host.clone()),
        ws_opts: ws.then(|| WsOpts {
            path: record.option_or(transport::PATH, "/").to_string(),
            headers: host
                .map(|h| BTreeMap::from([("Host".to_string(), h)]))
                .unwrap_or_default(),
        }),
    }
}

impl From<&CanonicalProxyRecord> for ClashProxy {
    fn from(record: &CanonicalProxyRecord) -> Self {
        let server = record.server.clone();
        let port = record.port;

        let protocol = match record.kind {
            ProtocolKind::Reality => ProxyProtocol::Vless(VlessProxy {
                server,
                port,
                uuid: record.auth_secret.clone(),
                network: record.option_or(transport::NETWORK, "tcp").to_string(),
                tls: true,
                udp: true,
                flow: record.option_or(transport::FLOW, "xtls-rprx-vision").to_string(),
                servername: record.option_or(transport::SNI, "").to_string(),
                reality_opts: RealityOpts {
                    public_key: record.option_or(transport::PUBLIC_KEY, "").to_string(),
                    short_id: record.option_or(transport::SHORT_ID, "").to_string(),
                },
                client_fingerprint: record.option_or(transport::FINGERPRINT, "chrome").to_string(),
            }),
            ProtocolKind::Hysteria2 => ProxyProtocol::Hysteria2(Hysteria2Proxy {
                server,
                port,
                password: record.auth_secret.clone(),
                sni: record.option_or(transport::SNI, "").to_string(),
                skip_cert_verify: record.option(transport::INSECURE) == Some("1"),
                udp: true,
                obfs: record.option_or(transport::OBFS, "salamander").to_string(),
                obfs_password: record.option_or(transport::OBFS_PASSWORD, "").to_string(),
            }),
            ProtocolKind::VmessWs | ProtocolKind::VmessTcp => ProxyProtocol::Vmess(vmess(record)),
        };

        Self {
            name: record.name.clone(),
            protocol,
        }
    }
}
