//! Background task that drains the terminal's native event stream and
//! forwards xterm-encoded byte sequences onto the kernel's event channel.
//!
//! Generic over the underlying stream so the drain loop and shutdown
//! semantics can be exercised with a synthetic stream in tests, without a
//! real terminal attached.

use std::io;
use std::sync::Arc;

use crossterm::event::Event as CEvent;
use tokio::sync::Notify;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};

use clink_events::{Event, record_send_result};
use clink_terminal::keys::EscPolicy;

use crate::key_token::{encode_key_event, encode_paste};

/// Why the drain loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `shutdown()` was called.
    Shutdown,
    /// The kernel's receiver was dropped.
    ChannelClosed,
    /// The underlying stream ended or errored.
    StreamEnded,
}

/// Cooperative shutdown signal shared between the host and the drain task.
#[derive(Clone)]
pub struct ShutdownHandle {
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn shutdown(&self) {
        self.notify.notify_waiters();
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Drain one item from the native event stream, forwarding it to `tx` as a
/// `clink_events::Event`. Returns `false` once the stream is exhausted.
async fn drain_one<S>(stream: &mut S, tx: &Sender<Event>, esc_policy: EscPolicy) -> bool
where
    S: Stream<Item = io::Result<CEvent>> + Unpin,
{
    let Some(item) = stream.next().await else {
        return false;
    };

    let event = match item {
        Ok(CEvent::Key(key)) => encode_key_event(&key, esc_policy).map(Event::Key),
        Ok(CEvent::Resize(cols, rows)) => Some(Event::Resize(cols, rows)),
        Ok(CEvent::Paste(text)) => Some(Event::Key(encode_paste(&text))),
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(target: "input", error = %err, "terminal event stream error");
            Some(Event::Abort)
        }
    };

    if let Some(event) = event {
        let ok = tx.send(event.clone()).await.is_ok();
        record_send_result(&event, ok);
        if !ok {
            return false;
        }
    }
    true
}

/// Run the drain loop to completion against an arbitrary event stream.
/// Exposed for tests; production code uses [`spawn`].
pub async fn run<S>(
    mut stream: S,
    tx: Sender<Event>,
    shutdown: ShutdownHandle,
    esc_policy: EscPolicy,
) -> ExitReason
where
    S: Stream<Item = io::Result<CEvent>> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            _ = shutdown.wait() => return ExitReason::Shutdown,
            _ = tx.closed() => return ExitReason::ChannelClosed,
            more = drain_one(&mut stream, &tx, esc_policy) => {
                if !more {
                    return ExitReason::StreamEnded;
                }
            }
        }
    }
}

/// Spawn the real crossterm `EventStream` drain task.
pub fn spawn(
    tx: Sender<Event>,
    esc_policy: EscPolicy,
) -> (JoinHandle<ExitReason>, ShutdownHandle) {
    let shutdown = ShutdownHandle::new();
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let stream = crossterm::event::EventStream::new();
            run(stream, tx, shutdown, esc_policy).await
        })
    };
    (handle, shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::sync::mpsc;

    /// A stream that never produces an item; used to exercise shutdown and
    /// channel-closure paths without a real terminal or timers.
    #[derive(Default)]
    struct PendingStream;

    impl Stream for PendingStream {
        type Item = io::Result<CEvent>;
        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Pending
        }
    }

    fn key_event(c: char) -> io::Result<CEvent> {
        Ok(CEvent::Key(KeyEvent {
            code: KeyCode::Char(c),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::empty(),
        }))
    }

    #[tokio::test]
    async fn forwards_key_bytes_from_stream() {
        let items = vec![key_event('a'), key_event('b')];
        let stream = tokio_stream::iter(items);
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = ShutdownHandle::new();

        let reason = tokio::spawn(run(stream, tx, shutdown, EscPolicy::Raw));

        assert_eq!(rx.recv().await, Some(Event::Key(b"a".to_vec())));
        assert_eq!(rx.recv().await, Some(Event::Key(b"b".to_vec())));
        assert_eq!(rx.recv().await, None);
        assert_eq!(reason.await.unwrap(), ExitReason::StreamEnded);
    }

    #[tokio::test]
    async fn resize_event_is_forwarded_verbatim() {
        let items = vec![Ok(CEvent::Resize(100, 40))];
        let stream = tokio_stream::iter(items);
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = ShutdownHandle::new();

        tokio::spawn(run(stream, tx, shutdown, EscPolicy::Raw));
        assert_eq!(rx.recv().await, Some(Event::Resize(100, 40)));
    }

    #[tokio::test]
    async fn paste_becomes_plain_key_bytes() {
        let items = vec![Ok(CEvent::Paste("hi there".into()))];
        let stream = tokio_stream::iter(items);
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = ShutdownHandle::new();

        tokio::spawn(run(stream, tx, shutdown, EscPolicy::Raw));
        assert_eq!(rx.recv().await, Some(Event::Key(b"hi there".to_vec())));
    }

    #[tokio::test]
    async fn shutdown_handle_stops_the_loop() {
        // An infinite stream that never resolves on its own.
        let stream = PendingStream::default();
        let (tx, _rx) = mpsc::channel(8);
        let shutdown = ShutdownHandle::new();
        let shutdown_clone = shutdown.clone();

        let handle = tokio::spawn(run(stream, tx, shutdown, EscPolicy::Raw));
        shutdown_clone.shutdown();
        let reason = tokio::time::timeout(std::time::Duration::from_millis(200), handle)
            .await
            .expect("drain loop did not observe shutdown")
            .unwrap();
        assert_eq!(reason, ExitReason::Shutdown);
    }

    #[tokio::test]
    async fn dropping_receiver_stops_the_loop() {
        let stream = PendingStream::default();
        let (tx, rx) = mpsc::channel(8);
        let shutdown = ShutdownHandle::new();

        let handle = tokio::spawn(run(stream, tx, shutdown, EscPolicy::Raw));
        drop(rx);
        let reason = tokio::time::timeout(std::time::Duration::from_millis(200), handle)
            .await
            .expect("drain loop did not observe channel closure")
            .unwrap();
        assert_eq!(reason, ExitReason::ChannelClosed);
    }
}
