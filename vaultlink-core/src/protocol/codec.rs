//! Length-prefixed JSON framing.
//!
//! Every frame is a 4-byte little-endian payload length followed by that
//! many bytes of UTF-8 JSON.

use super::message::Message;
use super::HOST_MAX_FRAME;
use crate::secret::zeroize_bytes;
use crate::{BridgeError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length header
pub const HEADER_LEN: usize = 4;

/// Serialize `message` into a frame, refusing payloads over `max_len`.
pub fn encode(message: &Message, max_len: usize) -> Result<Vec<u8>> {
    let mut payload = serde_json::to_vec(message)?;
    if payload.len() > max_len || payload.len() > u32::MAX as usize {
        let len = payload.len();
        zeroize_bytes(&mut payload);
        return Err(BridgeError::Protocol(format!(
            "frame of {} bytes exceeds limit of {} bytes",
            len, max_len
        )));
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    zeroize_bytes(&mut payload);
    Ok(frame)
}

/// Serialize `message` with the stdio channel limit.
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    encode(message, HOST_MAX_FRAME)
}

/// Stateful frame accumulator.
///
/// Bytes are pushed as they arrive; every complete frame is decoded before
/// `push` returns. An oversized length header discards everything buffered
/// so far instead of trying to resynchronize inside the stream.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    expected: Option<usize>,
    max_len: usize,
}

impl FrameDecoder {
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            expected: None,
            max_len,
        }
    }

    /// Feed bytes into the decoder and drain every complete frame.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<Message>> {
        self.buffer.extend_from_slice(bytes);
        let mut decoded = Vec::new();

        loop {
            let len = match self.expected {
                Some(len) => len,
                None => {
                    if self.buffer.len() < HEADER_LEN {
                        break;
                    }
                    let header = [self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]];
                    let len = u32::from_le_bytes(header) as usize;
                    if len > self.max_len {
                        self.reset();
                        decoded.push(Err(BridgeError::Protocol(format!(
                            "frame of {} bytes exceeds limit of {} bytes",
                            len, self.max_len
                        ))));
                        break;
                    }
                    self.buffer.drain(..HEADER_LEN);
                    self.expected = Some(len);
                    len
                }
            };

            if self.buffer.len() < len {
                break;
            }

            let mut payload: Vec<u8> = self.buffer.drain(..len).collect();
            self.expected = None;
            decoded.push(
                serde_json::from_slice(&payload)
                    .map_err(|e| BridgeError::Protocol(format!("malformed message: {}", e))),
            );
            zeroize_bytes(&mut payload);
        }

        decoded
    }

    /// Discard all buffered state and return to reading a header.
    pub fn reset(&mut self) {
        zeroize_bytes(&mut self.buffer);
        self.buffer.clear();
        self.expected = None;
    }

    /// Number of bytes waiting for the rest of their frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Write one framed message and flush.
pub async fn write_frame<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut frame = encode_message(message)?;
    let written = writer.write_all(&frame).await;
    zeroize_bytes(&mut frame);
    written?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly one framed message.
///
/// Returns `Ok(None)` when the stream ends cleanly before a header.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > max_len {
        return Err(BridgeError::Protocol(format!(
            "frame of {} bytes exceeds limit of {} bytes",
            len, max_len
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    let message = serde_json::from_slice(&payload)
        .map_err(|e| BridgeError::Protocol(format!("malformed message: {}", e)));
    zeroize_bytes(&mut payload);
    message.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{Action, AppStatus, Credential};
    use crate::secret::SecretString;

    fn raw_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = (payload.len() as u32).to_le_bytes().to_vec();
        frame.extend_from_slice(payload);
        frame
    }

    fn search_reply() -> Message {
        let mut message = Message::new("req-7", Action::Search).with_domain("example.com");
        message.results = Some(vec![Credential {
            id: Some("1".to_string()),
            title: Some("Example".to_string()),
            username: "alice".to_string(),
            password: SecretString::from("pa55"),
            url: Some("https://example.com".to_string()),
        }]);
        message.app_status = Some(AppStatus::Unlocked);
        message
    }

    #[test]
    fn test_round_trip() {
        let message = search_reply();
        let frame = encode_message(&message).unwrap();

        let mut decoder = FrameDecoder::new(HOST_MAX_FRAME);
        let decoded = decoder.push(&frame);

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.into_iter().next().unwrap().unwrap(), message);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_header_matches_payload_length() {
        let frame = encode_message(&Message::new("a", Action::Ping)).unwrap();
        let declared = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;

        assert_eq!(declared, frame.len() - HEADER_LEN);
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let mut bytes = encode_message(&Message::new("1", Action::Ping)).unwrap();
        bytes.extend(encode_message(&Message::new("2", Action::Pong)).unwrap());
        bytes.extend(encode_message(&Message::new("3", Action::Ready)).unwrap());

        let mut decoder = FrameDecoder::new(HOST_MAX_FRAME);
        let ids: Vec<String> = decoder
            .push(&bytes)
            .into_iter()
            .map(|m| m.unwrap().request_id)
            .collect();

        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_frame_split_across_reads() {
        let frame = encode_message(&search_reply()).unwrap();
        let mut decoder = FrameDecoder::new(HOST_MAX_FRAME);

        for byte in &frame[..frame.len() - 1] {
            assert!(decoder.push(std::slice::from_ref(byte)).is_empty());
        }
        let decoded = decoder.push(&frame[frame.len() - 1..]);

        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].is_ok());
    }

    #[test]
    fn test_oversized_frame_resets_decoder() {
        let mut decoder = FrameDecoder::new(16);
        let mut bytes = (1024u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{\"partial\":");

        let decoded = decoder.push(&bytes);
        assert_eq!(decoded.len(), 1);
        assert!(matches!(decoded[0], Err(BridgeError::Protocol(_))));
        assert_eq!(decoder.buffered(), 0);

        // A fresh frame after the reset decodes normally.
        let small = raw_frame(br#"{"action":"PING"}"#);
        let decoded = decoder.push(&small);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].as_ref().unwrap().action, Action::Ping);
    }

    #[test]
    fn test_malformed_json_does_not_poison_stream() {
        let mut bytes = raw_frame(b"{not json");
        bytes.extend(encode_message(&Message::new("ok", Action::Ping)).unwrap());

        let mut decoder = FrameDecoder::new(HOST_MAX_FRAME);
        let decoded = decoder.push(&bytes);

        assert_eq!(decoded.len(), 2);
        assert!(matches!(decoded[0], Err(BridgeError::Protocol(_))));
        assert_eq!(decoded[1].as_ref().unwrap().request_id, "ok");
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let message = Message::new("x".repeat(64), Action::Ping);
        assert!(matches!(encode(&message, 16), Err(BridgeError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_async_frame_helpers() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let message = search_reply();

        write_frame(&mut client, &message).await.unwrap();
        drop(client);

        let first = read_frame(&mut server, HOST_MAX_FRAME).await.unwrap();
        assert_eq!(first, Some(message));

        let end = read_frame(&mut server, HOST_MAX_FRAME).await.unwrap();
        assert!(end.is_none());
    }
}
