use regex::Regex;
use std::{
    future::Future,
    path::PathBuf,
    pin::Pin,
    process::Stdio,
    time::Duration,
};

lazy_static::lazy_static! {
    static ref PING_TIME: Regex = Regex::new(r"time[=<]\s*([\d.]+)\s*ms").expect("valid ping time regex");
}

/// Slack granted to the ping process on top of its own deadline.
const PROCESS_GRACE: Duration = Duration::from_millis(500);

/// Active round-trip measurement towards a host.
pub trait Probe: Send + Sync {
    /// Returns the round trip in milliseconds, `None` when no reply was obtained.
    /// Must resolve within roughly `timeout`.
    fn probe<'a>(&'a self, host: &'a str, timeout: Duration) -> Pin<Box<dyn Future<Output = Option<f64>> + Send + 'a>>;
}

/// ICMP echo through the system `ping` binary, which needs no raw socket privileges.
#[derive(Debug, Clone, Default)]
pub struct PingProbe {
    binary: Option<PathBuf>,
}

impl PingProbe {
    /// Looks up `ping` in `PATH`. Without it every probe yields `None`.
    pub fn new() -> Self {
        let binary = match which::which("ping") {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(%err, "No ping binary found, publisher RTT will stay empty");
                None
            }
        };
        Self { binary }
    }

    async fn ping_once(&self, host: &str, timeout: Duration) -> Option<f64> {
        let binary = self.binary.as_ref()?;
        if host.starts_with('-') {
            debug!(%host, "Refusing to ping a host that looks like an option");
            return None;
        }

        let deadline_secs = timeout.as_secs_f64().round().max(1.0) as u64;
        let mut command = tokio::process::Command::new(binary);
        command
            .args(["-n", "-c", "1", "-w", &deadline_secs.to_string(), host])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout + PROCESS_GRACE, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                debug!(%host, %err, "Failed to run ping");
                return None;
            }
            Err(_) => {
                debug!(%host, "Ping timed out");
                return None;
            }
        };

        if !output.status.success() {
            trace!(%host, status = %output.status, "Ping got no reply");
            return None;
        }

        parse_ping_output(&String::from_utf8_lossy(&output.stdout))
    }
}

impl Probe for PingProbe {
    fn probe<'a>(&'a self, host: &'a str, timeout: Duration) -> Pin<Box<dyn Future<Output = Option<f64>> + Send + 'a>> {
        Box::pin(self.ping_once(host, timeout))
    }
}

/// Extracts the round trip of the first reply from `ping` output.
pub fn parse_ping_output(stdout: &str) -> Option<f64> {
    PING_TIME.captures(stdout)?.get(1)?.as_str().parse().ok()
}
