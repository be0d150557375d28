use crate::handler::JobError;
use serde_json::Value;

/// Point in a job's life at which callbacks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Start,
    Complete,
    Fail,
}

/// What callbacks are told about a job
#[derive(Debug)]
pub enum JobEvent<'a> {
    Started {
        handle: &'a str,
        function: &'a str,
        arg: &'a Value,
    },
    Completed {
        handle: &'a str,
        function: &'a str,
        result: &'a Value,
    },
    Failed {
        handle: &'a str,
        function: &'a str,
        error: &'a JobError,
    },
}

impl JobEvent<'_> {
    pub fn phase(&self) -> Phase {
        match self {
            JobEvent::Started { .. } => Phase::Start,
            JobEvent::Completed { .. } => Phase::Complete,
            JobEvent::Failed { .. } => Phase::Fail,
        }
    }

    pub fn handle(&self) -> &str {
        match self {
            JobEvent::Started { handle, .. }
            | JobEvent::Completed { handle, .. }
            | JobEvent::Failed { handle, .. } => handle,
        }
    }

    pub fn function(&self) -> &str {
        match self {
            JobEvent::Started { function, .. }
            | JobEvent::Completed { function, .. }
            | JobEvent::Failed { function, .. } => function,
        }
    }
}

pub type Callback = Box<dyn FnMut(&JobEvent<'_>) + Send>;

/// Callbacks per phase, run in the order they were attached
#[derive(Default)]
pub struct Callbacks {
    start: Vec<Callback>,
    complete: Vec<Callback>,
    fail: Vec<Callback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach<F>(&mut self, phase: Phase, callback: F)
    where
        F: FnMut(&JobEvent<'_>) + Send + 'static,
    {
        self.list_mut(phase).push(Box::new(callback));
    }

    /// Run every callback registered for the event's phase
    pub fn invoke(&mut self, event: &JobEvent<'_>) {
        for callback in self.list_mut(event.phase()).iter_mut() {
            callback(event);
        }
    }

    fn list_mut(&mut self, phase: Phase) -> &mut Vec<Callback> {
        match phase {
            Phase::Start => &mut self.start,
            Phase::Complete => &mut self.complete,
            Phase::Fail => &mut self.fail,
        }
    }
}
