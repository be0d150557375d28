pub mod callback;
pub mod config;
pub mod handler;
pub mod job;
pub mod worker;

pub use callback::{JobEvent, Phase};
pub use config::WorkerConfig;
pub use handler::{JobError, JobHandler, JobRegistry, JobResult};
pub use job::Job;
pub use worker::{Grab, Worker};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Invalid servers specified")]
    InvalidServers,

    #[error("Couldn't connect to any available servers")]
    NoServersAvailable,
}

pub type Result<T> = std::result::Result<T, WorkerError>;
