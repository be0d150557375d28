use crate::callback::{Callbacks, JobEvent, Phase};
use crate::config::WorkerConfig;
use crate::handler::{JobError, JobRegistry};
use crate::job::{wrap_result, Assignment, Job};
use crate::{Result, WorkerError};
use gearman_protocol::{Command, Connection, Frame, ProtocolError};

use chrono::{DateTime, Utc};
use futures::future::select_all;
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of asking one server for work
#[derive(Debug, Clone, PartialEq)]
pub enum Grab {
    NoWork,
    Assigned(Assignment),
}

/// Ask the server behind `conn` for a job.
///
/// `noop` packets received while waiting are skipped. Anything other than
/// `no_job` or `job_assign` means the session is out of step with the server
/// and is returned as an error.
pub async fn grab(
    conn: &mut Connection,
    timeout: Duration,
) -> std::result::Result<Grab, ProtocolError> {
    conn.send(Frame::request(Command::GrabJob)).await?;

    let frame = loop {
        let frame = conn.blocking_read(timeout).await?;
        if frame.command != Command::Noop {
            break frame;
        }
    };

    match frame.command {
        Command::NoJob => Ok(Grab::NoWork),
        Command::JobAssign => Ok(Grab::Assigned(Assignment::from_frame(&frame)?)),
        other => Err(ProtocolError::UnexpectedResponse(other)),
    }
}

fn ability_frame(function: &str, timeout: Option<u32>) -> Frame {
    match timeout {
        Some(timeout) if timeout > 0 => Frame::request(Command::CanDoTimeout)
            .with("func", function)
            .with("timeout", timeout.to_string()),
        _ => Frame::request(Command::CanDo).with("func", function),
    }
}

/// Worker process that executes jobs for one or more job servers
pub struct Worker {
    config: WorkerConfig,
    worker_id: String,
    registry: Arc<JobRegistry>,
    conns: Vec<Connection>,
    retry: BTreeMap<String, Instant>,
    abilities: BTreeMap<String, Option<u32>>,
    callbacks: Callbacks,
    last_job: DateTime<Utc>,
    shutdown: CancellationToken,
}

impl Worker {
    /// Connect to every configured server
    ///
    /// Servers that cannot be reached are queued for retry; construction
    /// only fails when none of them answered.
    pub async fn connect(config: WorkerConfig, registry: JobRegistry) -> Result<Self> {
        if config.servers.is_empty() {
            return Err(WorkerError::InvalidServers);
        }

        let worker_id = config.generate_worker_id();
        let mut conns: Vec<Connection> = Vec::new();
        let mut retry = BTreeMap::new();

        for address in &config.servers {
            if conns.iter().any(|c| c.address() == address) || retry.contains_key(address) {
                continue;
            }

            match Connection::open(
                address,
                &worker_id,
                config.default_port,
                config.connect_timeout(),
            )
            .await
            {
                Ok(conn) => {
                    info!(server = %address, "Connected to job server");
                    conns.push(conn);
                }
                Err(e) => {
                    warn!(server = %address, "Failed to connect, will retry: {}", e);
                    retry.insert(address.clone(), Instant::now());
                }
            }
        }

        if conns.is_empty() {
            error!("Couldn't connect to any of {} servers", config.servers.len());
            return Err(WorkerError::NoServersAvailable);
        }

        Ok(Worker {
            config,
            worker_id,
            registry: Arc::new(registry),
            conns,
            retry,
            abilities: BTreeMap::new(),
            callbacks: Callbacks::new(),
            last_job: Utc::now(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.worker_id
    }

    pub fn abilities(&self) -> &BTreeMap<String, Option<u32>> {
        &self.abilities
    }

    /// Servers with an open connection, in the order they joined
    pub fn live_servers(&self) -> Vec<&str> {
        self.conns.iter().map(|c| c.address()).collect()
    }

    /// Servers waiting to be retried
    pub fn quarantined_servers(&self) -> Vec<&str> {
        self.retry.keys().map(|a| a.as_str()).collect()
    }

    pub fn last_job(&self) -> DateTime<Utc> {
        self.last_job
    }

    /// Token that stops `run` after the iteration in progress
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Declare a job type on every live connection
    ///
    /// Re-adding an ability sends the registration again. A timeout of
    /// `None` or zero means the server imposes no limit.
    pub async fn add_ability(&mut self, function: &str, timeout: Option<u32>) {
        self.abilities.insert(function.to_string(), timeout);

        let frame = ability_frame(function, timeout);
        for conn in &mut self.conns {
            if let Err(e) = conn.send(frame.clone()).await {
                warn!(server = %conn.address(), function, "Failed to register ability: {}", e);
            }
        }
    }

    pub fn attach_callback<F>(&mut self, phase: Phase, callback: F)
    where
        F: FnMut(&JobEvent<'_>) + Send + 'static,
    {
        self.callbacks.attach(phase, callback);
    }

    /// Monitor that never asks the loop to stop
    pub fn never_stop(_idle: bool, _last_job: DateTime<Utc>) -> bool {
        false
    }

    pub async fn run_forever(&mut self) {
        self.run(Worker::never_stop).await
    }

    /// Poll servers for work until `monitor(idle, last_job)` returns true
    ///
    /// `idle` is true when the previous iteration found no work and no
    /// server woke the worker before the idle timeout.
    pub async fn run<F>(&mut self, mut monitor: F)
    where
        F: FnMut(bool, DateTime<Utc>) -> bool,
    {
        info!(worker_id = %self.worker_id, servers = self.conns.len(), "Starting worker");

        loop {
            let now = Instant::now();

            let worked = self.work_all(now).await;

            let mut idle = false;
            if !worked && !self.conns.is_empty() {
                self.broadcast(Frame::request(Command::PreSleep)).await;
                idle = !self.wait_for_activity().await;
            }

            if self.retry_quarantined(now).await {
                for (function, timeout) in self.abilities.clone() {
                    self.add_ability(&function, timeout).await;
                }
            }

            if self.conns.is_empty() && !self.shutdown.is_cancelled() {
                debug!("No live servers, sleeping");
                tokio::select! {
                    _ = tokio::time::sleep(self.config.empty_sleep()) => {}
                    _ = self.shutdown.cancelled() => {}
                }
            }

            if monitor(idle, self.last_job) {
                info!("Monitor requested stop");
                break;
            }

            if self.shutdown.is_cancelled() {
                info!("Worker draining, leaving work loop");
                break;
            }
        }
    }

    /// Close every live connection
    pub fn end_work(&mut self) {
        for mut conn in self.conns.drain(..) {
            conn.close();
        }
    }

    /// One grab-and-run pass over the live connections; true if any job ran
    async fn work_all(&mut self, now: Instant) -> bool {
        let grab_timeout = self.config.grab_timeout();
        let mut worked = false;
        let mut failed = Vec::new();

        for (index, conn) in self.conns.iter_mut().enumerate() {
            match work_once(conn, &self.registry, &mut self.callbacks, grab_timeout).await {
                Ok(true) => {
                    worked = true;
                    self.last_job = Utc::now();
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(server = %conn.address(), "Connection failed, quarantining: {}", e);
                    failed.push(index);
                }
            }
        }

        for index in failed.into_iter().rev() {
            let mut conn = self.conns.remove(index);
            conn.close();
            self.retry.insert(conn.address().to_string(), now);
        }

        worked
    }

    /// Wait for any live connection to have data, up to the idle timeout.
    /// Returns false if the timeout expired with nothing to read.
    async fn wait_for_activity(&self) -> bool {
        let ready = select_all(self.conns.iter().map(|conn| Box::pin(conn.readable())));

        tokio::select! {
            result = tokio::time::timeout(self.config.idle_timeout(), ready) => {
                match result {
                    Ok((_, index, _)) => {
                        debug!(server = %self.conns[index].address(), "Woken by server");
                        true
                    }
                    Err(_) => false,
                }
            }
            _ = self.shutdown.cancelled() => true,
        }
    }

    /// Reconnect servers whose backoff has elapsed; true if any came back
    async fn retry_quarantined(&mut self, now: Instant) -> bool {
        let interval = self.config.retry_interval();
        let due: Vec<String> = self
            .retry
            .iter()
            .filter(|(_, last)| now.saturating_duration_since(**last) > interval)
            .map(|(address, _)| address.clone())
            .collect();

        let mut changed = false;
        for address in due {
            match Connection::open(
                &address,
                &self.worker_id,
                self.config.default_port,
                self.config.connect_timeout(),
            )
            .await
            {
                Ok(conn) => {
                    info!(server = %address, "Reconnected to job server");
                    self.retry.remove(&address);
                    self.conns.push(conn);
                    changed = true;
                }
                Err(e) => {
                    debug!(server = %address, "Retry failed: {}", e);
                    self.retry.insert(address, now);
                }
            }
        }

        changed
    }

    async fn broadcast(&mut self, frame: Frame) {
        for conn in &mut self.conns {
            if let Err(e) = conn.send(frame.clone()).await {
                debug!(
                    server = %conn.address(),
                    command = %frame.command,
                    "Broadcast failed: {}", e
                );
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.end_work();
    }
}

/// Grab and run at most one job from `conn`; true if a job ran
async fn work_once(
    conn: &mut Connection,
    registry: &JobRegistry,
    callbacks: &mut Callbacks,
    grab_timeout: Duration,
) -> std::result::Result<bool, ProtocolError> {
    let Assignment {
        handle,
        function,
        arg,
    } = match grab(conn, grab_timeout).await? {
        Grab::NoWork => return Ok(false),
        Grab::Assigned(assignment) => assignment,
    };

    info!(server = %conn.address(), handle = %handle, function = %function, "Running job");

    callbacks.invoke(&JobEvent::Started {
        handle: &handle,
        function: &function,
        arg: &arg,
    });

    let mut job = Job::new(function.as_str(), handle.as_str(), conn);
    let outcome = match registry.get(&function) {
        Some(handler) => AssertUnwindSafe(handler.run(arg, &mut job))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!(handle = %handle, function = %function, "Job panicked");
                Err(JobError::new("Job panicked during execution"))
            }),
        None => Err(JobError::new(format!(
            "No handler registered for job type: {}",
            function
        ))),
    };

    match outcome {
        Ok(result) => {
            let result = wrap_result(result);
            job.complete(&result).await?;
            info!(handle = %handle, function = %function, "Job completed");
            callbacks.invoke(&JobEvent::Completed {
                handle: &handle,
                function: &function,
                result: &result,
            });
        }
        Err(error) => {
            warn!(handle = %handle, function = %function, "Job failed: {}", error);
            job.fail().await?;
            callbacks.invoke(&JobEvent::Failed {
                handle: &handle,
                function: &function,
                error: &error,
            });
        }
    }

    Ok(true)
}
