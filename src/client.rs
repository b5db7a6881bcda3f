//! Client connection lifecycle and request dispatch.
//!
//! [`Client`] owns the single TCP channel to the simulator. Connection
//! establishment performs the `CMD_START` / protocol-version handshake and
//! requires a `READY` reply; [`Client::connect_or_start`] additionally
//! falls back to launching the simulator executable and retrying once
//! after it reports readiness.
//!
//! Every remote operation is one synchronous exchange: a command verb
//! line, a fixed parameter sequence, a fixed result sequence, then the
//! trailing status decode. The channel carries exactly one outstanding
//! request, enforced by `&mut self` on every operation. Operations are
//! split across [`station`] (station-level), [`item_ops`] (per-item) and
//! [`motion`] (move orchestration).

mod item_ops;
mod motion;
mod station;

use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, info};

use crate::error::{LinkError, Result};
use crate::launcher::{self, LaunchSpec};
use crate::protocol::status::check_status;
use crate::protocol::Channel;

pub use item_ops::ProgramUpdate;
pub use motion::Target;
pub use station::VersionInfo;

/// Default API port of the simulator.
pub const DEFAULT_PORT: u16 = 20500;

/// Default per-receive timeout. Raise it for slow machines.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeout applied around the blocking receive of long-running
/// operations (file load, program update, collision sweep, UI pick).
const LONG_TIMEOUT: Duration = Duration::from_secs(3600);

/// First handshake line.
const HANDSHAKE_START: &str = "CMD_START";
/// Second handshake line: protocol major/minor.
const HANDSHAKE_VERSION: &str = "1 0";
/// Required prefix of the server's handshake reply.
const HANDSHAKE_READY: &str = "READY";

/// Where and how to reach (or start) the simulator.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Per-receive timeout for ordinary operations.
    pub timeout: Duration,
    /// Simulator executable, used by [`Client::connect_or_start`] when no
    /// server is listening. A leading `~` is expanded.
    pub executable: PathBuf,
    /// Extra arguments for the simulator executable.
    pub args: Vec<String>,
    /// Overall budget for a launched simulator to report readiness.
    pub ready_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            executable: PathBuf::from(default_executable()),
            args: Vec::new(),
            ready_timeout: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    /// Config for a non-default port on localhost.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    fn launch_spec(&self) -> LaunchSpec {
        let mut args = self.args.clone();
        if self.port != DEFAULT_PORT {
            args.push(format!("/PORT={}", self.port));
        }
        let mut spec = LaunchSpec::new(self.executable.clone(), args);
        spec.ready_timeout = self.ready_timeout;
        spec
    }
}

/// Per-OS install location of the simulator.
fn default_executable() -> &'static str {
    if cfg!(windows) {
        "C:/RoboDK/bin/RoboDK.exe"
    } else if cfg!(target_os = "macos") {
        "~/RoboDK/Applications/RoboDK.app/Contents/MacOS/RoboDK"
    } else {
        "~/RoboDK/bin/RoboDK"
    }
}

/// Connection to one simulator instance.
///
/// One `Client` drives one connection; for concurrent multi-robot control
/// use one client (and one connection) per robot rather than sharing a
/// channel, since a channel carries a single request at a time.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    link: Option<Channel>,
    process_id: Option<u32>,
}

impl Client {
    /// Connect and handshake with a running simulator.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let link = open_channel(&config).await?;
        info!("connected to simulator at {}:{}", config.host, config.port);
        Ok(Self {
            config,
            link: Some(link),
            process_id: None,
        })
    }

    /// Connect to a running simulator, or start one and connect to it.
    ///
    /// On connection failure the configured executable is spawned (with
    /// `/PORT=<n>` appended for a non-default port) and its stdout watched
    /// for the readiness marker; then the connection is retried exactly
    /// once and that attempt's result is returned.
    pub async fn connect_or_start(config: ClientConfig) -> Result<Self> {
        match open_channel(&config).await {
            Ok(link) => {
                info!("connected to simulator at {}:{}", config.host, config.port);
                return Ok(Self {
                    config,
                    link: Some(link),
                    process_id: None,
                });
            }
            Err(e) => debug!("initial connection failed ({e}), starting simulator"),
        }

        let pid = launcher::start_and_wait_ready(&config.launch_spec()).await?;
        let link = open_channel(&config).await?;
        info!(
            "connected to launched simulator (pid {pid}) at {}:{}",
            config.host, config.port
        );
        Ok(Self {
            config,
            link: Some(link),
            process_id: Some(pid),
        })
    }

    /// Close the connection. Idempotent; the simulator keeps running.
    pub fn disconnect(&mut self) {
        self.link = None;
    }

    /// Drop the current connection (usable or not) and establish a fresh
    /// one with the original configuration. This is the recovery path
    /// after a timeout or protocol desync left the channel unusable.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.link = None;
        self.link = Some(open_channel(&self.config).await?);
        Ok(())
    }

    /// The configuration this client was created with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether the connection is usable (established and not poisoned by
    /// an earlier transport failure).
    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|c| !c.is_broken())
    }

    /// PID of the simulator process, when this client started it.
    pub fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    /// Change the per-receive timeout for ordinary operations.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
        if let Some(link) = self.link.as_mut() {
            link.set_timeout(timeout);
        }
    }

    /// The channel, or `NotConnected` if there is none or a transport
    /// failure poisoned it (a broken link is discarded here, completing
    /// the Connected → Disconnected transition).
    pub(crate) fn channel(&mut self) -> Result<&mut Channel> {
        if self.link.as_ref().is_some_and(|c| c.is_broken()) {
            self.link = None;
        }
        self.link.as_mut().ok_or(LinkError::NotConnected)
    }

    /// Start an exchange: send the command verb line.
    pub(crate) async fn begin(&mut self, verb: &str) -> Result<&mut Channel> {
        let channel = self.channel()?;
        channel.send_line(verb).await?;
        Ok(channel)
    }

    /// Finish an exchange: decode the trailing status word.
    pub(crate) async fn finish(&mut self) -> Result<()> {
        check_status(self.channel()?).await
    }

    /// Decode the trailing status word with the timeout raised for the
    /// duration of the read, restoring it on every exit path.
    pub(crate) async fn finish_slow(&mut self, timeout: Duration) -> Result<()> {
        let channel = self.channel()?;
        let saved = channel.set_timeout(timeout);
        let result = check_status(channel).await;
        if let Ok(channel) = self.channel() {
            channel.set_timeout(saved);
        }
        result
    }
}

/// Open the socket and perform the handshake. Any failure tears the
/// socket down; no partially connected state escapes.
async fn open_channel(config: &ClientConfig) -> Result<Channel> {
    let address = format!("{}:{}", config.host, config.port);
    let stream = match time::timeout(config.timeout, TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(LinkError::ConnectionFailed(e)),
        Err(_) => {
            return Err(LinkError::ConnectionFailed(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect to {address} timed out"),
            )))
        }
    };

    let mut channel = Channel::new(stream, config.timeout);
    channel.send_line(HANDSHAKE_START).await?;
    channel.send_line(HANDSHAKE_VERSION).await?;
    let reply = channel.recv_line().await?;
    if !reply.starts_with(HANDSHAKE_READY) {
        return Err(LinkError::HandshakeRejected(reply));
    }
    Ok(channel)
}
