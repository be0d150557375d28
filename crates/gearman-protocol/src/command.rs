use crate::{ProtocolError, Result};
use std::fmt;
use std::str::FromStr;

/// Protocol commands understood by the worker
///
/// Each variant carries a stable opcode and the ordered list of fields
/// that make up its payload on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    CanDo = 1,
    CantDo = 2,
    ResetAbilities = 3,
    PreSleep = 4,
    Noop = 6,
    SubmitJob = 7,
    JobCreated = 8,
    GrabJob = 9,
    NoJob = 10,
    JobAssign = 11,
    WorkStatus = 12,
    WorkComplete = 13,
    WorkFail = 14,
    GetStatus = 15,
    EchoReq = 16,
    EchoRes = 17,
    SubmitJobBg = 18,
    Error = 19,
    StatusRes = 20,
    SubmitJobHigh = 21,
    SetClientId = 22,
    CanDoTimeout = 23,
    AllYours = 24,
}

impl Command {
    /// Every command, in opcode order
    pub const ALL: [Command; 23] = [
        Command::CanDo,
        Command::CantDo,
        Command::ResetAbilities,
        Command::PreSleep,
        Command::Noop,
        Command::SubmitJob,
        Command::JobCreated,
        Command::GrabJob,
        Command::NoJob,
        Command::JobAssign,
        Command::WorkStatus,
        Command::WorkComplete,
        Command::WorkFail,
        Command::GetStatus,
        Command::EchoReq,
        Command::EchoRes,
        Command::SubmitJobBg,
        Command::Error,
        Command::StatusRes,
        Command::SubmitJobHigh,
        Command::SetClientId,
        Command::CanDoTimeout,
        Command::AllYours,
    ];

    pub fn from_opcode(opcode: u32) -> Option<Self> {
        match opcode {
            1 => Some(Command::CanDo),
            2 => Some(Command::CantDo),
            3 => Some(Command::ResetAbilities),
            4 => Some(Command::PreSleep),
            6 => Some(Command::Noop),
            7 => Some(Command::SubmitJob),
            8 => Some(Command::JobCreated),
            9 => Some(Command::GrabJob),
            10 => Some(Command::NoJob),
            11 => Some(Command::JobAssign),
            12 => Some(Command::WorkStatus),
            13 => Some(Command::WorkComplete),
            14 => Some(Command::WorkFail),
            15 => Some(Command::GetStatus),
            16 => Some(Command::EchoReq),
            17 => Some(Command::EchoRes),
            18 => Some(Command::SubmitJobBg),
            19 => Some(Command::Error),
            20 => Some(Command::StatusRes),
            21 => Some(Command::SubmitJobHigh),
            22 => Some(Command::SetClientId),
            23 => Some(Command::CanDoTimeout),
            24 => Some(Command::AllYours),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Command::ALL.iter().copied().find(|cmd| cmd.name() == name)
    }

    pub fn opcode(&self) -> u32 {
        *self as u32
    }

    /// Symbolic name used in logs and for lookups by name
    pub fn name(&self) -> &'static str {
        match self {
            Command::CanDo => "can_do",
            Command::CantDo => "cant_do",
            Command::ResetAbilities => "reset_abilities",
            Command::PreSleep => "pre_sleep",
            Command::Noop => "noop",
            Command::SubmitJob => "submit_job",
            Command::JobCreated => "job_created",
            Command::GrabJob => "grab_job",
            Command::NoJob => "no_job",
            Command::JobAssign => "job_assign",
            Command::WorkStatus => "work_status",
            Command::WorkComplete => "work_complete",
            Command::WorkFail => "work_fail",
            Command::GetStatus => "get_status",
            Command::EchoReq => "echo_req",
            Command::EchoRes => "echo_res",
            Command::SubmitJobBg => "submit_job_bg",
            Command::Error => "error",
            Command::StatusRes => "status_res",
            Command::SubmitJobHigh => "submit_job_high",
            Command::SetClientId => "set_client_id",
            Command::CanDoTimeout => "can_do_timeout",
            Command::AllYours => "all_yours",
        }
    }

    /// Payload fields, in wire order
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Command::CanDo | Command::CantDo => &["func"],
            Command::CanDoTimeout => &["func", "timeout"],
            Command::SetClientId => &["client_id"],
            Command::SubmitJob | Command::SubmitJobHigh | Command::SubmitJobBg => {
                &["func", "uniq", "arg"]
            }
            Command::JobCreated | Command::WorkFail | Command::GetStatus => &["handle"],
            Command::JobAssign => &["handle", "func", "arg"],
            Command::WorkStatus => &["handle", "numerator", "denominator"],
            Command::WorkComplete => &["handle", "result"],
            Command::StatusRes => &["handle", "known", "running", "numerator", "denominator"],
            Command::EchoReq | Command::EchoRes => &["text"],
            Command::Error => &["err_code", "err_text"],
            Command::ResetAbilities
            | Command::PreSleep
            | Command::Noop
            | Command::GrabJob
            | Command::NoJob
            | Command::AllYours => &[],
        }
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Command::from_name(s).ok_or_else(|| ProtocolError::UnknownCommand(s.to_string()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
