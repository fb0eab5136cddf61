use std::pin::Pin;
use std::sync::{Arc, Mutex};

use byteorder::{ByteOrder, LittleEndian};

/// Scripted in-memory link. Replies are served from a canned byte script and
/// every byte the codec writes is captured for assertions. When the script
/// runs out the link signals EOF, unless constructed with [`stalled`], in
/// which case reads hang so timeout paths can be exercised.
///
/// [`stalled`]: ScriptedLink::stalled
pub(crate) struct ScriptedLink {
    script: Vec<u8>,
    stall_on_empty: bool,
    written: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedLink {
    pub(crate) fn new(script: impl Into<Vec<u8>>) -> Self {
        Self {
            script: script.into(),
            stall_on_empty: false,
            written: Arc::default(),
        }
    }

    pub(crate) fn stalled(script: impl Into<Vec<u8>>) -> Self {
        Self {
            script: script.into(),
            stall_on_empty: true,
            written: Arc::default(),
        }
    }

    /// Handle onto everything written over the link so far.
    pub(crate) fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }
}

impl tokio::io::AsyncRead for ScriptedLink {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        if self.script.is_empty() && self.stall_on_empty {
            // never wakes; callers race this against a timer
            return std::task::Poll::Pending;
        }
        if !self.script.is_empty() {
            let c = if buf.capacity() < self.script.len() {
                buf.capacity()
            } else {
                self.script.len()
            };
            buf.put_slice(&self.script[0..c]);
            self.script.drain(0..c);
        }
        std::task::Poll::Ready(Ok(()))
    }
}

impl tokio::io::AsyncWrite for ScriptedLink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::result::Result<usize, std::io::Error>> {
        self.written
            .lock()
            .expect("written log poisoned")
            .extend_from_slice(buf);
        std::task::Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), std::io::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), std::io::Error>> {
        std::task::Poll::Ready(Ok(()))
    }
}

/// Renders `values` as the definite-length block (plus trailing newline) the
/// power meter sends for `func:result?`.
pub(crate) fn f32_block(values: &[f32]) -> Vec<u8> {
    let mut payload = vec![0u8; values.len() * 4];
    LittleEndian::write_f32_into(values, &mut payload);
    framed_block(payload)
}

/// Renders `values` as the block the laser sends for `read:data? llog`.
pub(crate) fn f64_block(values: &[f64]) -> Vec<u8> {
    let mut payload = vec![0u8; values.len() * 8];
    LittleEndian::write_f64_into(values, &mut payload);
    framed_block(payload)
}

fn framed_block(payload: Vec<u8>) -> Vec<u8> {
    let len = payload.len().to_string();
    let mut out = format!("#{}{}", len.len(), len).into_bytes();
    out.extend_from_slice(&payload);
    out.push(b'\n');
    out
}
