use gearman_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub servers: Vec<String>,
    pub worker_id: Option<String>,
    pub default_port: u16,
    pub connect_timeout_ms: u64,
    /// How long one grab_job exchange may wait for the server's answer
    pub grab_timeout_ms: u64,
    /// Upper bound on the idle wait after pre_sleep
    pub idle_timeout_ms: u64,
    /// Backoff before a failed server is tried again
    pub retry_interval_ms: u64,
    /// Pause between loop iterations while no server is reachable
    pub empty_sleep_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            servers: vec![format!("127.0.0.1:{}", DEFAULT_PORT)],
            worker_id: None,
            default_port: DEFAULT_PORT,
            connect_timeout_ms: 2000,
            grab_timeout_ms: 500,
            idle_timeout_ms: 60_000,
            retry_interval_ms: 5_000,
            empty_sleep_ms: 1000,
        }
    }
}

impl WorkerConfig {
    pub fn new(servers: Vec<String>) -> Self {
        WorkerConfig {
            servers,
            ..Default::default()
        }
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn generate_worker_id(&self) -> String {
        use std::process;
        use uuid::Uuid;

        if let Some(id) = &self.worker_id {
            return id.clone();
        }

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let pid = process::id();
        let uuid = Uuid::new_v4().simple().to_string();

        format!("{}-{}-{}", hostname, pid, &uuid[..8])
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn grab_timeout(&self) -> Duration {
        Duration::from_millis(self.grab_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn empty_sleep(&self) -> Duration {
        Duration::from_millis(self.empty_sleep_ms)
    }
}
