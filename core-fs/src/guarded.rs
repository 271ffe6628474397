//! Writer wrapper that tolerates use after close or failure.
//!
//! Database savers flush and close their streams more than once, sometimes
//! after the underlying stream already failed. [`GuardedWriter`] tracks the
//! stream state explicitly and turns every call made after `Closed` or
//! `Failed` into a no-op, so the first error is reported once and a finished
//! stream is never touched again.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Open,
    Flushed,
    Closed,
    Failed,
}

impl WriterState {
    fn to_u8(self) -> u8 {
        match self {
            WriterState::Open => 0,
            WriterState::Flushed => 1,
            WriterState::Closed => 2,
            WriterState::Failed => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => WriterState::Open,
            1 => WriterState::Flushed,
            2 => WriterState::Closed,
            _ => WriterState::Failed,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, WriterState::Closed | WriterState::Failed)
    }
}

/// Shared view of a [`GuardedWriter`]'s state.
#[derive(Debug, Clone)]
pub struct WriterStateHandle(Arc<AtomicU8>);

impl WriterStateHandle {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(WriterState::Open.to_u8())))
    }

    pub fn get(&self) -> WriterState {
        WriterState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: WriterState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}

pub struct GuardedWriter<W> {
    inner: W,
    state: WriterStateHandle,
}

impl<W> GuardedWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            state: WriterStateHandle::new(),
        }
    }

    pub fn state(&self) -> WriterState {
        self.state.get()
    }

    pub fn state_handle(&self) -> WriterStateHandle {
        self.state.clone()
    }

    fn track<T>(&self, result: Poll<io::Result<T>>, on_ok: WriterState) -> Poll<io::Result<T>> {
        match &result {
            Poll::Ready(Ok(_)) => self.state.set(on_ok),
            Poll::Ready(Err(_)) => self.state.set(WriterState::Failed),
            Poll::Pending => {}
        }
        result
    }
}

impl<W> AsyncWrite for GuardedWriter<W>
where
    W: AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.state.get().is_finished() {
            return Poll::Ready(Ok(buf.len()));
        }
        let result = Pin::new(&mut self.inner).poll_write(cx, buf);
        self.track(result, WriterState::Open)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.state.get().is_finished() {
            return Poll::Ready(Ok(()));
        }
        let result = Pin::new(&mut self.inner).poll_flush(cx);
        self.track(result, WriterState::Flushed)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.state.get().is_finished() {
            return Poll::Ready(Ok(()));
        }
        let result = Pin::new(&mut self.inner).poll_shutdown(cx);
        self.track(result, WriterState::Closed)
    }
}
