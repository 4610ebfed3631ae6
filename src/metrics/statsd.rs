//! StatsD client over UDP.
//!
//! Metrics are formatted on the caller's side and pushed onto a bounded
//! queue without waiting. A background task drains the queue, joins whatever
//! is pending into one newline-separated datagram, and sends it. When the
//! queue is full the metric is dropped with a warning; send failures are
//! logged and otherwise ignored.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use super::MetricsError;

/// Upper bound on a single datagram write.
const SEND_TIMEOUT: Duration = Duration::from_millis(10);

/// StatsD client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsdConfig {
    /// Prefix prepended to every metric key
    #[serde(default = "default_name")]
    pub name: String,

    /// StatsD server address (`host:port`)
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Queue capacity, also the maximum number of lines per datagram
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            addr: default_addr(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_name() -> String {
    "ratewarden".to_string()
}

fn default_addr() -> String {
    "127.0.0.1:8125".to_string()
}

fn default_batch_size() -> usize {
    64
}

/// Best-effort StatsD emitter.
pub struct StatsdClient {
    name: String,
    tx: mpsc::Sender<String>,
    task: JoinHandle<()>,
}

impl StatsdClient {
    /// Resolve the server, connect a UDP socket and start the sender task.
    pub async fn connect(config: StatsdConfig) -> Result<Self, MetricsError> {
        let resolve_err = |reason: String| MetricsError::Resolve {
            addr: config.addr.clone(),
            reason,
        };

        let addr = tokio::net::lookup_host(config.addr.as_str())
            .await
            .map_err(|e| resolve_err(e.to_string()))?
            .next()
            .ok_or_else(|| resolve_err("no addresses found".to_string()))?;

        let local: SocketAddr = match addr.ip() {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;

        let batch_size = config.batch_size.max(1);
        let (tx, rx) = mpsc::channel(batch_size);
        let task = tokio::spawn(run_sender(socket, rx, batch_size));

        info!(
            addr = %addr,
            name = %config.name,
            batch_size = batch_size,
            "StatsD client connected"
        );

        Ok(Self {
            name: config.name,
            tx,
            task,
        })
    }

    /// Increment a counter.
    pub fn count(&self, key: &str, value: i64) {
        self.enqueue(format_metric(&self.name, key, value, "c"));
    }

    /// Record a timing in milliseconds.
    pub fn time(&self, key: &str, value: i64) {
        self.enqueue(format_metric(&self.name, key, value, "ms"));
    }

    /// Set a gauge to an absolute value.
    pub fn gauge(&self, key: &str, value: i64) {
        self.enqueue(format_metric(&self.name, key, value, "g"));
    }

    /// Move a gauge up or down by `value`.
    pub fn gauge_diff(&self, key: &str, value: i64) {
        self.enqueue(format_metric(&self.name, key, format!("{:+}", value), "g"));
    }

    /// Stop accepting metrics, flush what is queued, and wait for the
    /// sender task to finish.
    pub async fn close(self) {
        let StatsdClient { tx, task, .. } = self;
        drop(tx);

        if let Err(e) = task.await {
            warn!(error = %e, "StatsD sender task ended abnormally");
        }
    }

    fn enqueue(&self, line: String) {
        match self.tx.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(line)) => {
                warn!(metric = %line, "StatsD send queue is full, dropping metric");
            }
            Err(TrySendError::Closed(_)) => {
                trace!("StatsD sender is gone, dropping metric");
            }
        }
    }
}

impl std::fmt::Debug for StatsdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsdClient")
            .field("name", &self.name)
            .field("queued", &(self.tx.max_capacity() - self.tx.capacity()))
            .finish()
    }
}

fn format_metric(name: &str, key: &str, value: impl Display, kind: &str) -> String {
    format!("{}.{}:{}|{}", name, key, value, kind)
}

async fn run_sender(socket: UdpSocket, mut rx: mpsc::Receiver<String>, batch_size: usize) {
    let mut batch = Vec::with_capacity(batch_size);

    while let Some(line) = rx.recv().await {
        batch.push(line);
        while batch.len() < batch_size {
            match rx.try_recv() {
                Ok(line) => batch.push(line),
                Err(_) => break,
            }
        }

        let payload = batch.join("\n");
        batch.clear();

        match timeout(SEND_TIMEOUT, socket.send(payload.as_bytes())).await {
            Ok(Ok(sent)) => trace!(bytes = sent, "Sent StatsD datagram"),
            Ok(Err(e)) => warn!(error = %e, "StatsD send failed"),
            Err(_) => warn!("StatsD send timed out"),
        }
    }

    debug!("StatsD sender stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collector() -> (UdpSocket, String) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        (socket, addr)
    }

    async fn collect_lines(socket: &UdpSocket, expected: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut buf = [0u8; 2048];
        while lines.len() < expected {
            let n = timeout(Duration::from_secs(2), socket.recv(&mut buf))
                .await
                .expect("timed out waiting for metrics")
                .unwrap();
            let datagram = std::str::from_utf8(&buf[..n]).unwrap();
            lines.extend(datagram.split('\n').map(str::to_string));
        }
        lines
    }

    #[test]
    fn test_format_metric() {
        assert_eq!(format_metric("app", "hits", 3, "c"), "app.hits:3|c");
        assert_eq!(format_metric("app", "latency", 250, "ms"), "app.latency:250|ms");
        assert_eq!(format!("{:+}", 5i64), "+5");
        assert_eq!(format!("{:+}", -3i64), "-3");
        assert_eq!(format!("{:+}", 0i64), "+0");
    }

    #[test]
    fn test_config_defaults_from_yaml() {
        let config: StatsdConfig = serde_yaml::from_str("addr: 10.0.0.5:8125").unwrap();
        assert_eq!(config.addr, "10.0.0.5:8125");
        assert_eq!(config.name, "ratewarden");
        assert_eq!(config.batch_size, 64);
    }

    #[tokio::test]
    async fn test_client_sends_all_metric_kinds() {
        let (server, addr) = collector().await;
        let client = tokio_test::assert_ok!(
            StatsdClient::connect(StatsdConfig {
                name: "app".to_string(),
                addr,
                batch_size: 16,
            })
            .await
        );

        client.count("requests", 1);
        client.time("latency", 42);
        client.gauge("keys", 7);
        client.gauge_diff("keys", -2);
        client.gauge_diff("keys", 3);

        let lines = collect_lines(&server, 5).await;
        assert_eq!(
            lines,
            vec![
                "app.requests:1|c",
                "app.latency:42|ms",
                "app.keys:7|g",
                "app.keys:-2|g",
                "app.keys:+3|g",
            ]
        );

        client.close().await;
    }

    #[tokio::test]
    async fn test_full_queue_drops_metrics() {
        let (server, addr) = collector().await;
        let client = StatsdClient::connect(StatsdConfig {
            name: "app".to_string(),
            addr,
            batch_size: 1,
        })
        .await
        .unwrap();

        // No await in between, so the sender task cannot drain the queue
        for i in 0..5 {
            client.count("a", i);
        }
        client.close().await;

        let lines = collect_lines(&server, 1).await;
        assert_eq!(lines, vec!["app.a:0|c"]);

        let mut buf = [0u8; 64];
        let more = timeout(Duration::from_millis(100), server.recv(&mut buf)).await;
        assert!(more.is_err(), "dropped metrics must not be sent");
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_address() {
        let err = StatsdClient::connect(StatsdConfig {
            addr: "not an address".to_string(),
            ..StatsdConfig::default()
        })
        .await
        .unwrap_err();

        assert!(matches!(err, MetricsError::Resolve { .. }));
    }

    #[tokio::test]
    async fn test_send_to_closed_port_is_swallowed() {
        // Reserve a port, then free it so nothing is listening
        let (server, addr) = collector().await;
        drop(server);

        let client = StatsdClient::connect(StatsdConfig {
            addr,
            ..StatsdConfig::default()
        })
        .await
        .unwrap();

        client.count("lost", 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.count("lost", 2);
        client.close().await;
    }
}
