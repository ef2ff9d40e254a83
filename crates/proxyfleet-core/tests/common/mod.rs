//! Simulated hosts for pipeline tests
//!
//! A `SimHost` keeps just enough state (installed binaries, configured
//! protocols, files, services) to answer the commands the pipeline issues.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use proxyfleet_core::{
    Backend, CoreError, Distributor, HostSpec, HysteriaSettings, ProvisionProfile, Timeouts,
};
use proxyfleet_exec::{
    CommandResult, ConnectionEstablisher, ConnectionInfo, Connector, ExecError, RemoteExecutor,
    RetryPolicy, SshCredential,
};
use proxyfleet_link::{CanonicalProxyRecord, ProtocolKind, transport};
use proxyfleet_routing::RoutingConfig;

pub const REALITY_UUID: &str = "b831381d-6324-4d53-ad4f-8cda48b30811";

#[derive(Debug, Default)]
pub struct SimState {
    pub reachable: bool,
    pub sb_installed: bool,
    pub hysteria_installed: bool,
    pub hysteria_active: bool,
    pub nginx_installed: bool,
    pub fail_install: bool,
    /// Command prefix that never returns
    pub hang_on: Option<String>,
    /// Uploads never return
    pub hang_upload: bool,
    /// Replaces the link printed by `sb url`
    pub url_override: Option<String>,
    /// Delay applied to every command
    pub latency: Duration,
    /// `sb` protocol name -> port
    pub protocols: BTreeMap<String, u16>,
    pub files: HashMap<String, String>,
    pub commands: Vec<String>,
    pub disconnects: u32,
    /// Connect timeout of the last connection attempt
    pub connect_timeout: Option<Duration>,
}

pub struct SimHost {
    pub address: String,
    pub state: Mutex<SimState>,
    pub connect_attempts: AtomicU32,
}

impl SimHost {
    pub fn new(address: &str) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_string(),
            state: Mutex::new(SimState {
                reachable: true,
                ..SimState::default()
            }),
            connect_attempts: AtomicU32::new(0),
        })
    }

    pub fn with<F: FnOnce(&mut SimState)>(self: Arc<Self>, f: F) -> Arc<Self> {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().unwrap().commands.clear();
    }

    pub fn disconnects(&self) -> u32 {
        self.state.lock().unwrap().disconnects
    }

    pub fn attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    fn respond(&self, cmd: &str) -> (i32, String, String) {
        let mut s = self.state.lock().unwrap();
        s.commands.push(cmd.to_string());
        let ok = |out: &str| (0, out.to_string(), String::new());

        if cmd.starts_with("systemctl stop ") {
            return (5, String::new(), "Failed to stop unit: Unit not loaded.".into());
        }
        if cmd == "command -v sb" {
            return if s.sb_installed { ok("/usr/local/bin/sb") } else { (1, String::new(), String::new()) };
        }
        if cmd == "command -v nginx" {
            return if s.nginx_installed { ok("/usr/sbin/nginx") } else { (1, String::new(), String::new()) };
        }
        if cmd.contains("233boy/sing-box") || cmd.contains("missuo/Hysteria2") {
            if s.fail_install {
                return (1, String::new(), "curl: (22) The requested URL returned error: 404".into());
            }
            if cmd.contains("233boy") {
                s.sb_installed = true;
            } else {
                s.hysteria_installed = true;
            }
            return ok("installed");
        }
        if cmd.contains("apt-get install -y nginx") {
            s.nginx_installed = true;
            return ok("");
        }
        if cmd.starts_with("test -x /usr/local/bin/hysteria") {
            return if s.hysteria_installed { ok("") } else { (1, String::new(), String::new()) };
        }
        if cmd.starts_with("ufw ")
            || cmd.starts_with("iptables ")
            || cmd.starts_with("mkdir -p")
            || cmd.starts_with("chmod ")
            || cmd.starts_with("chown ")
            || cmd.starts_with("systemctl start nginx")
        {
            return ok("");
        }
        if cmd.starts_with("systemctl restart hysteria-server") {
            let active = s.hysteria_installed && s.files.contains_key("/etc/hysteria/config.yaml");
            s.hysteria_active = active;
            return if s.hysteria_active { ok("") } else { (1, String::new(), "unit not found".into()) };
        }
        if cmd == "systemctl is-active hysteria-server" {
            return if s.hysteria_active { ok("active") } else { (3, "inactive".into(), String::new()) };
        }
        if cmd == "sb info" {
            let listing: Vec<String> = s
                .protocols
                .iter()
                .enumerate()
                .map(|(i, (proto, port))| format!("\x1b[32m{}. {}-{port}.json\x1b[0m", i + 1, info_name(proto)))
                .collect();
            return ok(listing.join("\n").as_str());
        }

        let words: Vec<&str> = cmd.split_whitespace().collect();
        match words.as_slice() {
            ["sb", "add", proto, port, ..] => {
                let Ok(port) = port.parse() else {
                    return (1, String::new(), "bad port".into());
                };
                s.protocols.insert((*proto).to_string(), port);
                ok("added")
            }
            ["sb", "change", proto, "port", port] => match (s.protocols.contains_key(*proto), port.parse()) {
                (true, Ok(port)) => {
                    s.protocols.insert((*proto).to_string(), port);
                    ok("changed")
                }
                _ => (1, String::new(), "no such config".into()),
            },
            ["sb", "url", proto] => match s.protocols.get(*proto) {
                Some(port) => ok(sb_url_output(proto, &self.address, *port, s.url_override.as_deref()).as_str()),
                None => (1, String::new(), "no config".into()),
            },
            _ => (127, String::new(), format!("{cmd}: command not found")),
        }
    }
}

fn info_name(proto: &str) -> &'static str {
    match proto {
        "reality" => "VLESS-REALITY-TCP",
        "hy2" => "Hysteria2",
        "ws" => "VMess-WS",
        _ => "VMess-TCP",
    }
}

fn vmess_ws_link(address: &str, port: u16) -> String {
    CanonicalProxyRecord {
        name: "233boy-ws".into(),
        kind: ProtocolKind::VmessWs,
        server: address.to_string(),
        port,
        auth_secret: REALITY_UUID.into(),
        transport: BTreeMap::from([
            (transport::PATH.to_string(), "/b831381d".to_string()),
            (transport::HOST.to_string(), "cdn.example.com".to_string()),
            (transport::TLS.to_string(), "tls".to_string()),
        ]),
    }
    .to_uri()
}

fn sb_url_output(proto: &str, address: &str, port: u16, url_override: Option<&str>) -> String {
    let address = if address.contains(':') {
        format!("[{address}]")
    } else {
        address.to_string()
    };
    let link = match url_override {
        Some(link) => link.to_string(),
        None => match proto {
            "reality" => format!(
                "vless://{REALITY_UUID}@{address}:{port}?encryption=none&security=reality&flow=xtls-rprx-vision\
                 &type=tcp&sni=www.microsoft.com&pbk=Z84J2IelR9ch3k8VtlVhhs5ycBUlXA7wHBWcBrjqnAw&fp=chrome#233boy-reality"
            ),
            "hy2" => format!("hysteria2://5e1f@{address}:{port}?alpn=h3&insecure=1&sni={address}#233boy-hy2"),
            "ws" => vmess_ws_link(&address, port),
            _ => String::new(),
        },
    };
    format!(
        "\x1b[36m-------------- {proto} --------------\x1b[0m\n\
         \x1b[33mhelp: https://233boy.com/sing-box/\x1b[0m\n\
         \x1b[35m{link}\x1b[0m\n"
    )
}

pub struct SimExecutor {
    host: Arc<SimHost>,
}

#[async_trait]
impl RemoteExecutor for SimExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let (latency, hang) = {
            let s = self.host.state.lock().unwrap();
            (s.latency, s.hang_on.clone())
        };
        if hang.is_some_and(|prefix| cmd.starts_with(&prefix)) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let (status, stdout, stderr) = self.host.respond(cmd);
        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration: Duration::from_millis(1),
        })
    }

    async fn run_with_timeout(&self, cmd: &str, timeout: Duration) -> Result<CommandResult, ExecError> {
        tokio::time::timeout(timeout, self.run(cmd))
            .await
            .map_err(|_| ExecError::Timeout { timeout })?
    }

    async fn upload(&self, contents: &[u8], remote_path: &str) -> Result<(), ExecError> {
        let hang = self.host.state.lock().unwrap().hang_upload;
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let mut s = self.host.state.lock().unwrap();
        s.commands.push(format!("upload {remote_path}"));
        s.files
            .insert(remote_path.to_string(), String::from_utf8_lossy(contents).into_owned());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ExecError> {
        self.host.state.lock().unwrap().disconnects += 1;
        Ok(())
    }

    fn executor_type(&self) -> &'static str {
        "sim"
    }
}

#[derive(Default)]
pub struct SimConnector {
    hosts: HashMap<String, Arc<SimHost>>,
}

impl SimConnector {
    pub fn new(hosts: &[Arc<SimHost>]) -> Self {
        Self {
            hosts: hosts.iter().map(|h| (h.address.clone(), Arc::clone(h))).collect(),
        }
    }
}

#[async_trait]
impl Connector for SimConnector {
    async fn connect(&self, info: &ConnectionInfo) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        let host = self
            .hosts
            .get(&info.host)
            .ok_or_else(|| ExecError::ConnectionFailed(format!("no route to {}", info.host)))?;
        host.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let mut state = host.state.lock().unwrap();
        state.connect_timeout = Some(info.connect_timeout);
        if !state.reachable {
            return Err(ExecError::ConnectionFailed("connection refused".into()));
        }
        drop(state);
        Ok(Arc::new(SimExecutor {
            host: Arc::clone(host),
        }))
    }
}

pub fn establisher(hosts: &[Arc<SimHost>]) -> ConnectionEstablisher {
    ConnectionEstablisher::new(
        Arc::new(SimConnector::new(hosts)),
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        },
    )
}

pub fn spec(alias: &str, host: &SimHost) -> HostSpec {
    HostSpec::new(alias, &host.address, SshCredential::Password("hunter2".into()))
}

pub fn reality_profile() -> ProvisionProfile {
    ProvisionProfile::new(Backend::SingBox {
        protocol: ProtocolKind::Reality,
        reality_server_name: "www.microsoft.com".into(),
    })
}

pub fn hysteria_profile() -> ProvisionProfile {
    ProvisionProfile::new(Backend::Hysteria(HysteriaSettings {
        auth_password: "ZAS1OXIaSsS0XV5M".into(),
        obfs_password: "HN1CSlnV7WWpvQGJ".into(),
        sni: "www.bing.com".into(),
        up_mbps: 100,
        down_mbps: 200,
    }))
}

/// Every timeout short enough for a test to wait out
pub fn short_timeouts() -> Timeouts {
    Timeouts {
        connect: Duration::from_millis(50),
        command: Duration::from_millis(50),
        install: Duration::from_millis(50),
        pipeline: Duration::from_millis(200),
    }
}

pub fn short_pipeline(mut profile: ProvisionProfile) -> ProvisionProfile {
    profile.timeouts = Timeouts {
        pipeline: Duration::from_millis(200),
        ..Timeouts::default()
    };
    profile
}

/// Records publish calls instead of touching any host
#[derive(Default)]
pub struct RecordingDistributor {
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
    pub fail: bool,
    /// Publish never returns
    pub hang: bool,
}

impl RecordingDistributor {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Distributor for RecordingDistributor {
    async fn publish(&self, config: &RoutingConfig, target: &HostSpec) -> Result<String, CoreError> {
        self.calls.lock().unwrap().push((
            target.alias.clone(),
            config.proxy_names().map(str::to_string).collect(),
        ));
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail {
            return Err(CoreError::Distribution("nginx unavailable".into()));
        }
        Ok(format!("http://{}/subscribe.yaml", target.url_host()))
    }
}
