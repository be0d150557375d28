use crate::{Command, ProtocolError, Result, HEADER_SIZE};
use bytes::Bytes;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Text reported when the server sends an `error` packet without a message
pub const DEFAULT_ERROR_TEXT: &str = "Unknown error; see error code.";

/// Direction marker at the start of every packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Magic {
    Request,
    Response,
}

impl Magic {
    pub fn as_bytes(&self) -> &'static [u8; 4] {
        match self {
            Magic::Request => b"\0REQ",
            Magic::Response => b"\0RES",
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"\0REQ" => Some(Magic::Request),
            b"\0RES" => Some(Magic::Response),
            _ => None,
        }
    }
}

/// Decoded 12-byte packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: Magic,
    pub command: Command,
    pub payload_length: u32,
}

impl Header {
    /// Parse a header from everything that was received before the stream
    /// stopped producing bytes.
    ///
    /// An empty buffer means no packet was available at all and yields
    /// `Ok(None)`. A buffer holding only part of a header means the peer
    /// went away mid-packet.
    pub fn parse(buf: &[u8]) -> Result<Option<Header>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::ConnectionReset);
        }

        let magic = Magic::from_bytes(&buf[0..4])
            .ok_or_else(|| ProtocolError::MalformedHeader(buf[0..4].to_vec()))?;

        let mut opcode = [0u8; 4];
        opcode.copy_from_slice(&buf[4..8]);
        let opcode = u32::from_be_bytes(opcode);

        let mut length = [0u8; 4];
        length.copy_from_slice(&buf[8..12]);
        let payload_length = u32::from_be_bytes(length);

        let command =
            Command::from_opcode(opcode).ok_or(ProtocolError::UnknownResponseType(opcode))?;

        Ok(Some(Header {
            magic,
            command,
            payload_length,
        }))
    }
}

/// One protocol packet
///
/// Decoded packets are produced by [`GearmanCodec`](crate::GearmanCodec);
/// outgoing requests are built with [`Frame::request`] and [`Frame::with`].
/// Only fields declared by the command ever reach the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub magic: Magic,
    pub command: Command,
    pub fields: BTreeMap<String, Bytes>,
}

impl Frame {
    pub fn request(command: Command) -> Self {
        Frame {
            magic: Magic::Request,
            command,
            fields: BTreeMap::new(),
        }
    }

    /// Build a request by command name
    pub fn named(name: &str) -> Result<Self> {
        Ok(Frame::request(name.parse()?))
    }

    pub fn with(mut self, name: &str, value: impl AsRef<[u8]>) -> Self {
        self.fields
            .insert(name.to_string(), Bytes::copy_from_slice(value.as_ref()));
        self
    }

    pub fn field(&self, name: &str) -> Option<&Bytes> {
        self.fields.get(name)
    }

    /// Field value as text; invalid UTF-8 is replaced
    pub fn field_str(&self, name: &str) -> Option<Cow<'_, str>> {
        self.field(name).map(|v| String::from_utf8_lossy(v))
    }

    /// Declared fields present on this frame joined by NUL, in wire order
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        let mut first = true;

        for name in self.command.fields() {
            if let Some(value) = self.fields.get(*name) {
                if !first {
                    payload.push(0);
                }
                payload.extend_from_slice(value);
                first = false;
            }
        }

        payload
    }

    /// Build a frame from a received header and its payload.
    ///
    /// Pieces are assigned to the command's fields positionally. The last
    /// declared field keeps any further NUL bytes; fields with no piece are
    /// left absent. An `error` packet is turned into
    /// [`ProtocolError::ServerError`].
    pub fn from_parts(header: Header, payload: &[u8]) -> Result<Frame> {
        let names = header.command.fields();
        let mut fields = BTreeMap::new();

        if !payload.is_empty() && !names.is_empty() {
            let pieces = payload.splitn(names.len(), |b| *b == 0);
            for (name, piece) in names.iter().zip(pieces) {
                fields.insert(name.to_string(), Bytes::copy_from_slice(piece));
            }
        }

        let frame = Frame {
            magic: header.magic,
            command: header.command,
            fields,
        };

        if frame.command == Command::Error {
            let code = frame
                .field_str("err_code")
                .map(|c| c.into_owned())
                .unwrap_or_default();
            let text = match frame.field_str("err_text") {
                Some(text) if !text.is_empty() => text.into_owned(),
                _ => DEFAULT_ERROR_TEXT.to_string(),
            };
            return Err(ProtocolError::ServerError { code, text });
        }

        Ok(frame)
    }
}
