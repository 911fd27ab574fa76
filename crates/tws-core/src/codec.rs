//! CBOR encoding and length-prefixed framing for the surface channel.
//!
//! Wire format on byte streams: `[4-byte big-endian length][CBOR payload]`.
//! Message-oriented transports (WebSocket) carry the bare CBOR payload.

use crate::error::{TwsError, TwsResult};
use std::io::Cursor;

/// Largest payload accepted from a peer (16 MiB). File contents travel
/// inside frames, so this is well above the terminal chunk size.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode a serializable value into a bare CBOR payload.
pub fn cbor_encode<T: serde::Serialize>(value: &T) -> TwsResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(value, &mut payload)?;
    Ok(payload)
}

/// Encode a serializable value into a length-prefixed CBOR frame.
pub fn frame_encode<T: serde::Serialize>(value: &T) -> TwsResult<Vec<u8>> {
    let payload = cbor_encode(value)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| TwsError::Codec(format!("frame too large: {} bytes", payload.len())))?;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend(payload);
    Ok(frame)
}

/// Decode a CBOR payload (without length prefix) into a typed value.
pub fn cbor_decode<T: serde::de::DeserializeOwned>(data: &[u8]) -> TwsResult<T> {
    let cursor = Cursor::new(data);
    let value: T = ciborium::from_reader(cursor)?;
    Ok(value)
}

/// Streaming frame decoder: accumulates bytes and yields complete payloads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed raw bytes and return complete raw frames (undecoded CBOR payloads).
    ///
    /// Fails if a peer announces a frame larger than [`MAX_FRAME_SIZE`]; the
    /// stream cannot be resynchronized after that, so callers should drop it.
    pub fn feed_raw(&mut self, data: &[u8]) -> TwsResult<Vec<Vec<u8>>> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        while self.buffer.len() >= 4 {
            let len =
                u32::from_be_bytes([self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]])
                    as usize;
            if len > MAX_FRAME_SIZE {
                return Err(TwsError::InvalidMessage(format!(
                    "frame too large: {len} bytes (max {MAX_FRAME_SIZE})"
                )));
            }
            if self.buffer.len() < 4 + len {
                break;
            }

            frames.push(self.buffer[4..4 + len].to_vec());
            self.buffer.drain(..4 + len);
        }

        Ok(frames)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestMsg {
        name: String,
        value: i64,
    }

    fn decode_all(decoder: &mut FrameDecoder, data: &[u8]) -> Vec<TestMsg> {
        decoder
            .feed_raw(data)
            .unwrap()
            .iter()
            .map(|payload| cbor_decode(payload).unwrap())
            .collect()
    }

    #[test]
    fn back_to_back_frames_in_one_read() {
        let msgs = vec![
            TestMsg {
                name: "a".into(),
                value: 1,
            },
            TestMsg {
                name: "b".into(),
                value: 2,
            },
        ];

        let mut combined = Vec::new();
        for m in &msgs {
            combined.extend(frame_encode(m).unwrap());
        }

        let mut decoder = FrameDecoder::new();
        assert_eq!(decode_all(&mut decoder, &combined), msgs);
    }

    #[test]
    fn incremental_feed() {
        let msg = TestMsg {
            name: "test".into(),
            value: 99,
        };
        let frame = frame_encode(&msg).unwrap();
        let mut decoder = FrameDecoder::new();

        // Feed one byte at a time
        for i in 0..frame.len() - 1 {
            assert!(decode_all(&mut decoder, &frame[i..i + 1]).is_empty());
        }
        assert_eq!(decode_all(&mut decoder, &frame[frame.len() - 1..]), vec![msg]);
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut decoder = FrameDecoder::new();
        let len = (MAX_FRAME_SIZE as u32 + 1).to_be_bytes();
        assert!(matches!(
            decoder.feed_raw(&len),
            Err(TwsError::InvalidMessage(_))
        ));
    }

    #[test]
    fn bare_payload_has_no_prefix() {
        let msg = TestMsg {
            name: "x".into(),
            value: 0,
        };
        let bare = cbor_encode(&msg).unwrap();
        let framed = frame_encode(&msg).unwrap();
        assert_eq!(&framed[4..], &bare[..]);
        assert_eq!(cbor_decode::<TestMsg>(&bare).unwrap(), msg);
    }
}
