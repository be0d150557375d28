use gearman_protocol::{Command, Connection, Frame, ProtocolError};
use serde_json::{Map, Value};
use tracing::debug;

/// Decode a raw job argument
///
/// JSON is parsed when possible; anything else (including a bare JSON
/// `null`) is passed through as a string. An empty argument becomes
/// `Value::Null`.
pub fn decode_argument(raw: &[u8]) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }

    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Null) | Err(_) => Value::String(String::from_utf8_lossy(raw).into_owned()),
        Ok(value) => value,
    }
}

/// Wrap a handler result that is not structured as `{"result": value}`
pub fn wrap_result(value: Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => value,
        scalar => {
            let mut map = Map::new();
            map.insert("result".to_string(), scalar);
            Value::Object(map)
        }
    }
}

/// Work assigned by a server, before it is bound to a running job
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub handle: String,
    pub function: String,
    pub arg: Value,
}

impl Assignment {
    /// Extract an assignment from a `job_assign` packet
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        if frame.command != Command::JobAssign {
            return Err(ProtocolError::UnexpectedResponse(frame.command));
        }

        let handle = frame
            .field_str("handle")
            .filter(|h| !h.is_empty())
            .ok_or(ProtocolError::UnexpectedResponse(Command::JobAssign))?
            .into_owned();
        let function = frame
            .field_str("func")
            .map(|f| f.into_owned())
            .unwrap_or_default();
        let arg = frame
            .field("arg")
            .map(|a| decode_argument(a))
            .unwrap_or(Value::Null);

        Ok(Assignment {
            handle,
            function,
            arg,
        })
    }
}

/// A unit of work being executed for one server
///
/// Reports go back over the connection the job was assigned on.
/// `complete` and `fail` consume the job, so nothing can be reported once
/// the outcome is sent.
pub struct Job<'c> {
    function: String,
    handle: String,
    conn: &'c mut Connection,
}

impl<'c> Job<'c> {
    pub fn new(
        function: impl Into<String>,
        handle: impl Into<String>,
        conn: &'c mut Connection,
    ) -> Self {
        Job {
            function: function.into(),
            handle: handle.into(),
            conn,
        }
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Address of the server that assigned this job
    pub fn server(&self) -> &str {
        self.conn.address()
    }

    /// Report progress as `numerator / denominator`
    pub async fn status(&mut self, numerator: u64, denominator: u64) -> Result<(), ProtocolError> {
        debug!(handle = %self.handle, numerator, denominator, "Reporting job status");

        let frame = Frame::request(Command::WorkStatus)
            .with("handle", &self.handle)
            .with("numerator", numerator.to_string())
            .with("denominator", denominator.to_string());
        self.conn.send(frame).await
    }

    pub async fn complete(self, result: &Value) -> Result<(), ProtocolError> {
        let frame = Frame::request(Command::WorkComplete)
            .with("handle", &self.handle)
            .with("result", result.to_string());
        self.conn.send(frame).await
    }

    pub async fn fail(self) -> Result<(), ProtocolError> {
        let frame = Frame::request(Command::WorkFail).with("handle", &self.handle);
        self.conn.send(frame).await
    }
}
