//! Host input plumbing: a background task drains the terminal's native
//! event stream into xterm byte sequences, and [`InputSource`] exposes the
//! blocking `select()`/`read()` contract the editor kernel polls.

mod async_service;
mod key_token;

pub use async_service::{ExitReason, ShutdownHandle};
use clink_terminal::keys::{KeyRing, ReadResult};

use clink_events::Event;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;

/// Spawn the async input service backed by `crossterm::EventStream`.
///
/// Returns the background task's `JoinHandle` alongside a shutdown handle
/// used to request prompt termination (e.g. on `shutdown()`).
pub fn spawn_async_input(
    tx: tokio::sync::mpsc::Sender<Event>,
    esc_policy: clink_terminal::keys::EscPolicy,
) -> (JoinHandle<ExitReason>, ShutdownHandle) {
    async_service::spawn(tx, esc_policy)
}

/// What woke the kernel's `select()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// One or more bytes are ready; drain them with [`InputSource::read`].
    Input,
    Resize(u16, u16),
    Abort,
    Tick,
}

/// Adapts the event channel to the kernel's byte-at-a-time read contract:
/// a key press can decode to several bytes (a CSI sequence), buffered in a
/// [`KeyRing`] between `select()` and `read()` calls.
pub struct InputSource {
    rx: Receiver<Event>,
    ring: KeyRing,
}

impl InputSource {
    pub fn new(rx: Receiver<Event>) -> Self {
        Self {
            rx,
            ring: KeyRing::new(),
        }
    }

    /// Block until there is something for the kernel to act on. If bytes
    /// are already buffered from a prior sequence, returns immediately.
    pub async fn select(&mut self) -> SelectOutcome {
        if !self.ring.is_empty() {
            return SelectOutcome::Input;
        }
        match self.rx.recv().await {
            Some(Event::Key(bytes)) => {
                self.ring.push_sequence(&bytes);
                SelectOutcome::Input
            }
            Some(Event::Resize(cols, rows)) => SelectOutcome::Resize(cols, rows),
            Some(Event::Abort) => SelectOutcome::Abort,
            Some(Event::Tick) => SelectOutcome::Tick,
            None => SelectOutcome::Abort,
        }
    }

    /// Pop the next buffered byte, or `ReadResult::None` once the ring is
    /// drained for this `select()` wakeup.
    pub fn read(&mut self) -> ReadResult {
        match self.ring.pop() {
            Some(b) => ReadResult::Byte(b),
            None => ReadResult::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clink_terminal::keys::EscPolicy;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn select_buffers_a_multi_byte_key_then_drains_it() {
        let (tx, rx) = mpsc::channel(8);
        let mut src = InputSource::new(rx);
        tx.send(Event::Key(vec![0x1b, b'[', b'A'])).await.unwrap();

        assert_eq!(src.select().await, SelectOutcome::Input);
        assert_eq!(src.read(), ReadResult::Byte(0x1b));
        assert_eq!(src.read(), ReadResult::Byte(b'['));
        assert_eq!(src.read(), ReadResult::Byte(b'A'));
        assert_eq!(src.read(), ReadResult::None);
    }

    #[tokio::test]
    async fn resize_and_abort_surface_without_touching_the_ring() {
        let (tx, rx) = mpsc::channel(8);
        let mut src = InputSource::new(rx);
        tx.send(Event::Resize(80, 24)).await.unwrap();
        tx.send(Event::Abort).await.unwrap();

        assert_eq!(src.select().await, SelectOutcome::Resize(80, 24));
        assert_eq!(src.select().await, SelectOutcome::Abort);
    }

    #[tokio::test]
    async fn closed_channel_is_treated_as_abort() {
        let (tx, rx) = mpsc::channel::<Event>(8);
        let mut src = InputSource::new(rx);
        drop(tx);
        assert_eq!(src.select().await, SelectOutcome::Abort);
    }

    #[tokio::test]
    async fn spawn_async_input_returns_joinable_task() {
        let (tx, rx) = mpsc::channel(8);
        let (handle, shutdown) = spawn_async_input(tx, EscPolicy::Raw);
        drop(rx);
        shutdown.shutdown();
        let reason = tokio::time::timeout(std::time::Duration::from_millis(500), handle)
            .await
            .expect("input task did not exit");
        assert!(reason.is_ok());
    }
}
