//! Remote commands for each backend and interpretation of their output

use std::collections::BTreeMap;

use proxyfleet_exec::CommandResult;
use proxyfleet_link::{CanonicalProxyRecord, ProtocolKind, strip_ansi, transport};

use crate::config::{Backend, HysteriaSettings};

pub const HYSTERIA_BIN: &str = "/usr/local/bin/hysteria";
pub const HYSTERIA_CONFIG: &str = "/etc/hysteria/config.yaml";
pub const HYSTERIA_SERVICE: &str = "hysteria-server";
pub const SING_BOX_SERVICE: &str = "sing-box";

const SING_BOX_INSTALL: &str = "export TERM=xterm; export DEBIAN_FRONTEND=noninteractive; \
    yes | bash <(wget -qO- -o- https://github.com/233boy/sing-box/raw/main/install.sh)";
const HYSTERIA_INSTALL: &str =
    "export TERM=xterm; curl -fsSL https://github.com/missuo/Hysteria2/raw/main/hy2.sh | bash -s -- 1";

/// Whether the backend binary is present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallCheck {
    Installed,
    Missing,
}

impl InstallCheck {
    /// Checks exit 0 when the binary exists
    #[must_use]
    pub fn from_result(result: &CommandResult) -> Self {
        if result.success() {
            InstallCheck::Installed
        } else {
            InstallCheck::Missing
        }
    }
}

/// Whether `sb info` lists the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolPresence {
    Configured,
    Absent,
}

impl ProtocolPresence {
    /// Read `sb info` output
    ///
    /// The tool prints one entry per configured protocol, e.g.
    /// `VLESS-REALITY-TCP-443` or `Hysteria2-443`.
    #[must_use]
    pub fn detect(result: &CommandResult, protocol: ProtocolKind) -> Self {
        if !result.success() {
            return ProtocolPresence::Absent;
        }
        let listing = strip_ansi(&result.combined_output()).to_ascii_uppercase();
        if listing.contains(info_marker(protocol)) {
            ProtocolPresence::Configured
        } else {
            ProtocolPresence::Absent
        }
    }
}

fn info_marker(protocol: ProtocolKind) -> &'static str {
    match protocol {
        ProtocolKind::Reality => "REALITY",
        ProtocolKind::Hysteria2 => "HYSTERIA2",
        ProtocolKind::VmessWs => "VMESS-WS",
        ProtocolKind::VmessTcp => "VMESS-TCP",
    }
}

/// Protocol name understood by `sb`
#[must_use]
pub fn sb_protocol(protocol: ProtocolKind) -> &'static str {
    match protocol {
        ProtocolKind::Reality => "reality",
        ProtocolKind::Hysteria2 => "hy2",
        ProtocolKind::VmessWs => "ws",
        ProtocolKind::VmessTcp => "tcp",
    }
}

/// Stop and disable the service of the other backend
#[must_use]
pub fn cleanup_command(backend: &Backend) -> String {
    let service = match backend {
        Backend::SingBox { .. } => HYSTERIA_SERVICE,
        Backend::Hysteria(_) => SING_BOX_SERVICE,
    };
    format!("systemctl stop {service} && systemctl disable {service}")
}

#[must_use]
pub fn install_check_command(backend: &Backend) -> String {
    match backend {
        Backend::SingBox { .. } => "command -v sb".to_string(),
        Backend::Hysteria(_) => format!("test -x {HYSTERIA_BIN}"),
    }
}

/// Commands that install the backend, run in order
#[must_use]
pub fn install_commands(backend: &Backend) -> Vec<String> {
    match backend {
        Backend::SingBox { .. } => vec![SING_BOX_INSTALL.to_string()],
        Backend::Hysteria(settings) => vec![
            HYSTERIA_INSTALL.to_string(),
            format!(
                "mkdir -p /etc/hysteria && openssl req -x509 -nodes -newkey rsa:2048 \
                 -keyout /etc/hysteria/server.key -out /etc/hysteria/server.crt \
                 -subj '/CN={}' -days 3650",
                settings.sni
            ),
            "chown -R hysteria:hysteria /etc/hysteria && chmod 600 /etc/hysteria/server.key"
                .to_string(),
        ],
    }
}

/// Open the proxy port, HTTP and ping
#[must_use]
pub fn firewall_commands(listen_port: u16) -> Vec<String> {
    vec![
        format!("ufw allow {listen_port}/tcp"),
        format!("ufw allow {listen_port}/udp"),
        "ufw allow 80/tcp".to_string(),
        "iptables -C INPUT -p icmp --icmp-type echo-request -j ACCEPT 2>/dev/null \
         || iptables -A INPUT -p icmp --icmp-type echo-request -j ACCEPT"
            .to_string(),
    ]
}

/// Move an existing protocol to `port`
#[must_use]
pub fn sb_change_port_command(protocol: ProtocolKind, port: u16) -> String {
    format!("sb change {} port {port}", sb_protocol(protocol))
}

/// Add a protocol listening on `port`
#[must_use]
pub fn sb_add_command(protocol: ProtocolKind, port: u16, reality_server_name: &str) -> String {
    match protocol {
        ProtocolKind::Reality => format!("sb add reality {port} auto {reality_server_name}"),
        ProtocolKind::Hysteria2 => format!("sb add hy2 {port}"),
        ProtocolKind::VmessWs | ProtocolKind::VmessTcp => {
            format!("sb add {} {port}", sb_protocol(protocol))
        }
    }
}

#[must_use]
pub fn sb_url_command(protocol: ProtocolKind) -> String {
    format!("sb url {}", sb_protocol(protocol))
}

#[must_use]
pub fn hysteria_restart_command() -> String {
    format!("systemctl restart {HYSTERIA_SERVICE} && systemctl enable {HYSTERIA_SERVICE}")
}

#[must_use]
pub fn hysteria_active_command() -> String {
    format!("systemctl is-active {HYSTERIA_SERVICE}")
}

/// Server config for the hysteria backend
///
/// Output depends only on the arguments, so rewriting it converges.
#[must_use]
pub fn render_hysteria_config(settings: &HysteriaSettings, listen_port: u16) -> String {
    format!(
        "listen: :{listen_port}
udpIdleTimeout: 60s
tls:
  cert: /etc/hysteria/server.crt
  key: /etc/hysteria/server.key
auth:
  type: password
  password: {auth}
obfs:
  type: salamander
  salamander:
    password: {obfs}
quic:
  initStreamReceiveWindow: 8388608
  maxStreamReceiveWindow: 8388608
  initConnectionReceiveWindow: 20971520
  maxConnectionReceiveWindow: 20971520
  maxIdleTimeout: 30s
  keepAlive: true
ignoreClientBandwidth: false
bandwidth:
  up: {up} mbps
  down: {down} mbps
",
        auth = yaml_quote(&settings.auth_password),
        obfs = yaml_quote(&settings.obfs_password),
        up = settings.up_mbps,
        down = settings.down_mbps,
    )
}

fn yaml_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Client link for a hysteria node, built from the shared credentials
///
/// The certificate is self-signed, so the link disables verification.
#[must_use]
pub fn hysteria_record(
    settings: &HysteriaSettings,
    name: &str,
    server: &str,
    port: u16,
) -> CanonicalProxyRecord {
    let transport = BTreeMap::from([
        (transport::SNI.to_string(), settings.sni.clone()),
        (transport::INSECURE.to_string(), "1".to_string()),
        (transport::OBFS.to_string(), "salamander".to_string()),
        (transport::OBFS_PASSWORD.to_string(), settings.obfs_password.clone()),
    ]);

    CanonicalProxyRecord {
        name: name.to_string(),
        kind: ProtocolKind::Hysteria2,
        server: server.trim_start_matches('[').trim_end_matches(']').to_string(),
        port,
        auth_secret: settings.auth_password.clone(),
        transport,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proxyfleet_link::parse;

    use super::*;

    fn output(status: i32, stdout: &str) -> CommandResult {
        CommandResult {
            status,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(5),
        }
    }

    fn settings() -> HysteriaSettings {
        HysteriaSettings {
            auth_password: "auth\"pw".into(),
            obfs_password: "obfs".into(),
            sni: "www.bing.com".into(),
            up_mbps: 100,
            down_mbps: 200,
        }
    }

    #[test]
    fn test_install_check() {
        assert_eq!(InstallCheck::from_result(&output(0, "/usr/local/bin/sb")), InstallCheck::Installed);
        assert_eq!(InstallCheck::from_result(&output(1, "")), InstallCheck::Missing);
    }

    #[test]
    fn test_protocol_presence() {
        let info = output(0, "\x1b[32m1. VLESS-REALITY-TCP-443.json\x1b[0m\n2. Hysteria2-8443.json");
        assert_eq!(ProtocolPresence::detect(&info, ProtocolKind::Reality), ProtocolPresence::Configured);
        assert_eq!(ProtocolPresence::detect(&info, ProtocolKind::Hysteria2), ProtocolPresence::Configured);
        assert_eq!(ProtocolPresence::detect(&info, ProtocolKind::VmessWs), ProtocolPresence::Absent);

        let failed = output(1, "VLESS-REALITY-TCP-443");
        assert_eq!(ProtocolPresence::detect(&failed, ProtocolKind::Reality), ProtocolPresence::Absent);
    }

    #[test]
    fn test_sb_commands() {
        assert_eq!(
            sb_add_command(ProtocolKind::Reality, 443, "www.microsoft.com"),
            "sb add reality 443 auto www.microsoft.com"
        );
        assert_eq!(sb_add_command(ProtocolKind::Hysteria2, 8443, ""), "sb add hy2 8443");
        assert_eq!(sb_add_command(ProtocolKind::VmessWs, 443, ""), "sb add ws 443");
        assert_eq!(sb_change_port_command(ProtocolKind::Hysteria2, 443), "sb change hy2 port 443");
        assert_eq!(sb_url_command(ProtocolKind::VmessTcp), "sb url tcp");
    }

    #[test]
    fn test_cleanup_targets_other_backend() {
        let sing_box = Backend::SingBox {
            protocol: ProtocolKind::Reality,
            reality_server_name: String::new(),
        };
        assert_eq!(
            cleanup_command(&sing_box),
            "systemctl stop hysteria-server && systemctl disable hysteria-server"
        );
        assert!(cleanup_command(&Backend::Hysteria(settings())).contains("sing-box"));
        assert_eq!(install_check_command(&sing_box), "command -v sb");
    }

    #[test]
    fn test_hysteria_config_is_stable() {
        let first = render_hysteria_config(&settings(), 443);
        assert_eq!(first, render_hysteria_config(&settings(), 443));
        assert!(first.starts_with("listen: :443\n"));
        assert!(first.contains("password: \"auth\\\"pw\""));
        assert!(first.contains("  up: 100 mbps\n  down: 200 mbps\n"));
    }

    #[test]
    fn test_hysteria_record_link_parses() {
        let record = hysteria_record(&settings(), "edge-1", "[2001:db8::7]", 443);
        let link = record.to_uri();
        assert!(link.starts_with("hysteria2://"));

        let parsed = parse(&link, "edge-1").unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.server, "2001:db8::7");
        assert_eq!(parsed.option(transport::INSECURE), Some("1"));
    }
}
