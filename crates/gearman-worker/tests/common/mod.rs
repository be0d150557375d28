//! In-process job server stub for worker tests

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use gearman_protocol::{Command, Frame, GearmanCodec, Magic};
use gearman_worker::WorkerConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

/// Replies to send for each packet the stub receives
pub type Responder = Arc<dyn Fn(&Frame) -> Vec<Frame> + Send + Sync>;

pub struct StubServer {
    pub address: String,
    received: Arc<Mutex<Vec<Frame>>>,
    accept: JoinHandle<()>,
}

impl StubServer {
    pub async fn start(responder: Responder) -> Self {
        Self::start_on("127.0.0.1:0", responder).await
    }

    pub async fn start_on(address: &str, responder: Responder) -> Self {
        let listener = TcpListener::bind(address).await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let received = Arc::new(Mutex::new(Vec::new()));

        let accept = tokio::spawn(serve(listener, received.clone(), responder));

        StubServer {
            address,
            received,
            accept,
        }
    }

    pub fn received(&self) -> Vec<Frame> {
        self.received.lock().clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.received.lock().iter().map(|f| f.command).collect()
    }

    pub fn frames_of(&self, command: Command) -> Vec<Frame> {
        self.received
            .lock()
            .iter()
            .filter(|f| f.command == command)
            .cloned()
            .collect()
    }

    pub fn count(&self, command: Command) -> usize {
        self.frames_of(command).len()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

async fn serve(listener: TcpListener, received: Arc<Mutex<Vec<Frame>>>, responder: Responder) {
    while let Ok((socket, _)) = listener.accept().await {
        let received = received.clone();
        let responder = responder.clone();

        tokio::spawn(async move {
            let mut framed = Framed::new(socket, GearmanCodec);
            while let Some(Ok(frame)) = framed.next().await {
                received.lock().push(frame.clone());
                for reply in responder(&frame) {
                    if framed.send(reply).await.is_err() {
                        return;
                    }
                }
            }
        });
    }
}

pub fn response(command: Command) -> Frame {
    let mut frame = Frame::request(command);
    frame.magic = Magic::Response;
    frame
}

pub fn job_assign(handle: &str, function: &str, arg: &str) -> Frame {
    response(Command::JobAssign)
        .with("handle", handle)
        .with("func", function)
        .with("arg", arg)
}

/// Answers `no_job` to every grab
pub fn idle_server() -> Responder {
    Arc::new(|frame: &Frame| match frame.command {
        Command::GrabJob => vec![response(Command::NoJob)],
        _ => vec![],
    })
}

/// Hands out one job, then answers `no_job`
pub fn assign_once(handle: &str, function: &str, arg: &str) -> Responder {
    let assignment = job_assign(handle, function, arg);
    let grabs = AtomicUsize::new(0);

    Arc::new(move |frame: &Frame| match frame.command {
        Command::GrabJob if grabs.fetch_add(1, Ordering::SeqCst) == 0 => vec![assignment.clone()],
        Command::GrabJob => vec![response(Command::NoJob)],
        _ => vec![],
    })
}

/// Address nothing is listening on
pub async fn refused_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}

pub fn test_config(servers: Vec<String>) -> WorkerConfig {
    WorkerConfig {
        worker_id: Some("test-worker".to_string()),
        connect_timeout_ms: 500,
        grab_timeout_ms: 500,
        idle_timeout_ms: 200,
        retry_interval_ms: 0,
        empty_sleep_ms: 10,
        ..WorkerConfig::new(servers)
    }
}

/// Poll until `condition` holds or two seconds pass
pub async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
