//! Free-port discovery for the HTTP listener.

use std::time::Duration;

use tokio::net::TcpStream;

/// Probe settings for [`PortScan::find_free_port`].
#[derive(Debug, Clone, Copy)]
pub struct PortScan {
    /// How long a connect attempt may take before the port counts as free.
    pub probe_timeout: Duration,
    /// Pause after finding a port busy.
    pub retry_delay: Duration,
}

impl Default for PortScan {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(500),
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl PortScan {
    /// First port starting at `port` that nothing answers on.
    ///
    /// With `increment` each busy attempt moves to the next port, otherwise the
    /// same port is retried. `None` after `max_tries` busy attempts.
    pub async fn find_free_port(
        &self,
        host: &str,
        port: u16,
        max_tries: u32,
        increment: bool,
    ) -> Option<u16> {
        let mut port = port;
        for _ in 0..max_tries {
            if !self.is_port_in_use(host, port).await {
                return Some(port);
            }
            tracing::error!(%host, port, "Unable to open port, trying another port");
            tokio::time::sleep(self.retry_delay).await;
            if increment {
                port = port.checked_add(1)?;
            }
        }
        None
    }

    async fn is_port_in_use(&self, host: &str, port: u16) -> bool {
        matches!(
            tokio::time::timeout(self.probe_timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }
}
