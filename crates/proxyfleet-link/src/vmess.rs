//! `vmess://` links in the v2rayN format: base64 encoded JSON

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use serde::Deserialize;
use serde_json::json;

use crate::error::LinkError;
use crate::types::{CanonicalProxyRecord, ProtocolKind, transport};

/// Port and alter id are written as strings by some tools, numbers by others
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(u64),
    Text(String),
}

impl Scalar {
    fn to_text(&self) -> String {
        match self {
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    ps: String,
    #[serde(default)]
    add: String,
    port: Option<Scalar>,
    #[serde(default)]
    id: String,
    aid: Option<Scalar>,
    #[serde(default)]
    scy: String,
    #[serde(default)]
    net: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    tls: String,
    #[serde(default)]
    sni: String,
}

fn decode(payload: &str) -> Result<Vec<u8>, LinkError> {
    let trimmed = payload.trim().trim_end_matches('=');
    STANDARD_NO_PAD
        .decode(trimmed)
        .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed))
        .map_err(|e| LinkError::InvalidPayload(e.to_string()))
}

fn or_default(value: &str, default: &str) -> String {
    match value.trim() {
        "" => default.to_string(),
        value => value.to_string(),
    }
}

/// Parse the part after `vmess://`
pub(crate) fn parse(payload: &str, display_name: &str) -> Result<CanonicalProxyRecord, LinkError> {
    let json = decode(payload)?;
    let payload: Payload =
        serde_json::from_slice(&json).map_err(|e| LinkError::InvalidPayload(e.to_string()))?;

    let server = payload
        .add
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    if server.is_empty() {
        return Err(LinkError::MissingHost);
    }
    let port = payload
        .port
        .as_ref()
        .and_then(|p| p.to_text().parse::<u16>().ok())
        .ok_or(LinkError::MissingPort)?;
    let auth_secret = payload.id.trim().to_string();
    if auth_secret.is_empty() {
        return Err(LinkError::MissingCredential);
    }

    let kind = match payload.net.trim() {
        "ws" => ProtocolKind::VmessWs,
        "" | "tcp" => ProtocolKind::VmessTcp,
        other => return Err(LinkError::UnsupportedTransport(other.to_string())),
    };

    let alter_id = payload.aid.as_ref().map(Scalar::to_text).unwrap_or_default();
    let mut options = BTreeMap::from([
        (transport::ALTER_ID.to_string(), or_default(&alter_id, "0")),
        (transport::CIPHER.to_string(), or_default(&payload.scy, "auto")),
        (transport::TLS.to_string(), payload.tls.trim().to_string()),
        (transport::SNI.to_string(), payload.sni.trim().to_string()),
    ]);
    if kind == ProtocolKind::VmessWs {
        options.insert(transport::PATH.to_string(), or_default(&payload.path, "/"));
        options.insert(transport::HOST.to_string(), payload.host.trim().to_string());
    }

    let name = match display_name.trim() {
        "" => match payload.ps.trim() {
            "" => format!("{server}:{port}"),
            ps => ps.to_string(),
        },
        name => name.to_string(),
    };

    Ok(CanonicalProxyRecord {
        name,
        kind,
        server,
        port,
        auth_secret,
        transport: options,
    })
}

/// Render a vmess record as a `vmess://` link
pub(crate) fn render(record: &CanonicalProxyRecord) -> String {
    let net = if record.kind == ProtocolKind::VmessWs { "ws" } else { "tcp" };
    let payload = json!({
        "v": "2",
        "ps": record.name,
        "add": record.server,
        "port": record.port.to_string(),
        "id": record.auth_secret,
        "aid": record.option_or(transport::ALTER_ID, "0"),
        "scy": record.option_or(transport::CIPHER, "auto"),
        "net": net,
        "type": "none",
        "host": record.option_or(transport::HOST, ""),
        "path": record.option_or(transport::PATH, ""),
        "tls": record.option_or(transport::TLS, ""),
        "sni": record.option_or(transport::SNI, ""),
    });
    format!("vmess://{}", STANDARD.encode(payload.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(json: &str) -> String {
        STANDARD.encode(json)
    }

    #[test]
    fn test_parse_ws_payload() {
        let payload = encode(
            r#"{"v":"2","ps":"233boy-ws","add":"198.51.100.30","port":"443","id":"b831381d-6324-4d53-ad4f-8cda48b30811","aid":"0","net":"ws","type":"none","host":"cdn.example.com","path":"/ray","tls":"tls","sni":"cdn.example.com"}"#,
        );
        let record = parse(&payload, "").unwrap();

        assert_eq!(record.name, "233boy-ws");
        assert_eq!(record.kind, ProtocolKind::VmessWs);
        assert_eq!(record.server, "198.51.100.30");
        assert_eq!(record.port, 443);
        assert_eq!(record.auth_secret, "b831381d-6324-4d53-ad4f-8cda48b30811");
        assert_eq!(record.option(transport::PATH), Some("/ray"));
        assert_eq!(record.option(transport::HOST), Some("cdn.example.com"));
        assert_eq!(record.option(transport::TLS), Some("tls"));
        assert_eq!(record.option(transport::CIPHER), Some("auto"));
    }

    #[test]
    fn test_parse_tcp_payload_with_numeric_fields() {
        let payload = encode(r#"{"add":"203.0.113.4","port":8443,"id":"u","aid":2,"net":"tcp"}"#);
        let record = parse(payload.trim_end_matches('='), "edge").unwrap();

        assert_eq!(record.name, "edge");
        assert_eq!(record.kind, ProtocolKind::VmessTcp);
        assert_eq!(record.port, 8443);
        assert_eq!(record.option(transport::ALTER_ID), Some("2"));
        assert_eq!(record.option(transport::PATH), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("%%%", "x"), Err(LinkError::InvalidPayload(_))));
        assert!(matches!(parse(&encode("[1, 2]"), "x"), Err(LinkError::InvalidPayload(_))));
        assert!(matches!(
            parse(&encode(r#"{"port":"443","id":"u"}"#), "x"),
            Err(LinkError::MissingHost)
        ));
        assert!(matches!(
            parse(&encode(r#"{"add":"h","port":"http","id":"u"}"#), "x"),
            Err(LinkError::MissingPort)
        ));
        assert!(matches!(
            parse(&encode(r#"{"add":"h","port":"1"}"#), "x"),
            Err(LinkError::MissingCredential)
        ));
        assert!(matches!(
            parse(&encode(r#"{"add":"h","port":"1","id":"u","net":"grpc"}"#), "x"),
            Err(LinkError::UnsupportedTransport(net)) if net == "grpc"
        ));
    }

    #[test]
    fn test_rendered_link_parses_back() {
        let payload = encode(r#"{"ps":"n","add":"2001:db8::7","port":"443","id":"u","net":"ws","path":"/p"}"#);
        let record = parse(&payload, "").unwrap();

        let link = render(&record);
        let payload = link.strip_prefix("vmess://").unwrap();
        assert_eq!(parse(payload, "").unwrap(), record);
    }
}
