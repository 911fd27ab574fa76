//! Length-prefixed CBOR frames over a byte stream pair.
//!
//! Used with stdin/stdout when a desktop shell spawns the host as a child
//! process. Logs must go to stderr in that mode.

use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Stdin, Stdout};
use tws_core::{cbor_decode, frame_encode, Frame, FrameDecoder, SurfaceChannel, TwsError, TwsResult};

const READ_BUFFER_SIZE: usize = 64 * 1024;

pub struct StreamChannel<R, W> {
    reader: R,
    writer: W,
    decoder: FrameDecoder,
    /// Complete payloads not yet handed out.
    ready: VecDeque<Vec<u8>>,
    buf: Vec<u8>,
}

impl<R, W> StreamChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            decoder: FrameDecoder::new(),
            ready: VecDeque::new(),
            buf: vec![0u8; READ_BUFFER_SIZE],
        }
    }
}

impl StreamChannel<Stdin, Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> SurfaceChannel for StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: &Frame) -> TwsResult<()> {
        let bytes = frame_encode(frame)?;
        self.writer
            .write_all(&bytes)
            .await
            .map_err(|e| TwsError::Transport(format!("write failed: {e}")))?;
        self.writer
            .flush()
            .await
            .map_err(|e| TwsError::Transport(format!("flush failed: {e}")))
    }

    // Cancel-safe: state only changes after a read completes.
    async fn recv(&mut self) -> TwsResult<Option<Frame>> {
        loop {
            if let Some(payload) = self.ready.pop_front() {
                return cbor_decode(&payload).map(Some);
            }
            let n = self
                .reader
                .read(&mut self.buf)
                .await
                .map_err(|e| TwsError::Transport(format!("read failed: {e}")))?;
            if n == 0 {
                return Ok(None);
            }
            self.ready.extend(self.decoder.feed_raw(&self.buf[..n])?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tws_core::{Event, Notify};

    #[tokio::test]
    async fn frames_cross_a_byte_stream() {
        let (host_side, surface_side) = duplex(1024);
        let (host_read, host_write) = tokio::io::split(host_side);
        let (surface_read, surface_write) = tokio::io::split(surface_side);
        let mut host = StreamChannel::new(host_read, host_write);
        let mut surface = StreamChannel::new(surface_read, surface_write);

        let input = Frame::Notify {
            notify: Notify::TerminalInput {
                id: "t".into(),
                data: "ls\n".into(),
            },
        };
        let output = Frame::event(Event::TerminalOutput {
            id: "t".into(),
            data: "main.tex\r\n".into(),
        });

        surface.send(&input).await.unwrap();
        surface.send(&input).await.unwrap();
        assert_eq!(host.recv().await.unwrap(), Some(input.clone()));
        assert_eq!(host.recv().await.unwrap(), Some(input));

        host.send(&output).await.unwrap();
        assert_eq!(surface.recv().await.unwrap(), Some(output));

        drop(surface);
        assert_eq!(host.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn bad_payload_is_a_codec_error() {
        let (host_side, mut surface_side) = duplex(1024);
        let (host_read, host_write) = tokio::io::split(host_side);
        let mut host = StreamChannel::new(host_read, host_write);

        // Valid length prefix around bytes that are not a Frame.
        surface_side.write_all(&[0, 0, 0, 1, 0xff]).await.unwrap();
        assert!(matches!(host.recv().await, Err(TwsError::Codec(_))));
    }
}
