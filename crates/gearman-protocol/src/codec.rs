use crate::{Frame, Header, ProtocolError, Result, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Codec for Gearman binary packets
///
/// Frame format: [4-byte magic] [4-byte opcode (big-endian)] [4-byte payload length (big-endian)] [payload]
#[derive(Debug, Default, Clone, Copy)]
pub struct GearmanCodec;

impl Decoder for GearmanCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Header is complete, so parse never reports "no frame" here
        let header = match Header::parse(&src[..HEADER_SIZE])? {
            Some(header) => header,
            None => return Ok(None),
        };

        let length = header.payload_length as usize;
        if length > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge(length));
        }

        // Wait for the complete payload
        if src.len() < HEADER_SIZE + length {
            src.reserve(HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(length);

        Frame::from_parts(header, &payload).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        if src.is_empty() {
            return Ok(None);
        }

        // Either a partial header or a header whose payload never arrived
        Err(ProtocolError::ConnectionReset)
    }
}

impl Encoder<Frame> for GearmanCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        let payload = item.payload();

        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_slice(item.magic.as_bytes());
        dst.put_u32(item.command.opcode());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);

        Ok(())
    }
}
