//! Line reassembly over non-blocking reads.
//!
//! The read loop never waits inside a read: it is woken by socket
//! readiness, then drains whatever is available. A line split across
//! several reads is carried over in the pending buffer until its
//! terminator shows up.

use std::io;

use crate::message::MAX_LINE_LEN;

/// Byte source that never blocks. `Ok(0)` means end of stream and an
/// `ErrorKind::WouldBlock` error means "nothing available right now".
pub trait NonBlockingRead {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl NonBlockingRead for tokio::net::tcp::OwnedReadHalf {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::tcp::OwnedReadHalf::try_read(self, buf)
    }
}

impl NonBlockingRead for tokio::net::TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_read(self, buf)
    }
}

/// Result of asking the framer for the next line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, terminator removed.
    Line(String),
    /// No complete line yet; partial bytes are kept.
    WouldBlock,
    /// The peer closed the stream.
    Closed,
}

/// Pending-line buffer. Never holds more than [`MAX_LINE_LEN`] bytes.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
    /// Skipping the tail of a line that overflowed the buffer.
    discarding: bool,
}

impl LineFramer {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(MAX_LINE_LEN),
            discarding: false,
        }
    }

    /// Bytes of an incomplete line carried over from earlier reads.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Return the next complete line, reading from `src` only when the
    /// buffer holds none. Lines end with `\r\n` or a bare `\n`.
    pub fn next_line<R>(&mut self, src: &mut R) -> io::Result<Frame>
    where
        R: NonBlockingRead + ?Sized,
    {
        let mut chunk = [0u8; MAX_LINE_LEN];
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if std::mem::take(&mut self.discarding) {
                    continue;
                }
                return Ok(Frame::Line(String::from_utf8_lossy(&line).into_owned()));
            }

            if self.pending.len() >= MAX_LINE_LEN {
                tracing::debug!(len = self.pending.len(), "Discarding overlong line");
                self.pending.clear();
                self.discarding = true;
            }

            let room = MAX_LINE_LEN - self.pending.len();
            match src.try_read(&mut chunk[..room]) {
                Ok(0) => return Ok(Frame::Closed),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Frame::WouldBlock),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
