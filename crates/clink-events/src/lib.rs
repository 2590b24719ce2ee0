//! Ambient event/channel model: the `Event` enum carried from the terminal
//! key decoder (`clink-terminal`/`clink-input`) to the editor kernel, a
//! bounded-channel policy, and the `AsyncEventSource` registry background
//! producers (resize watcher, tick, history reap) register against.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

/// Capacity of the channel feeding the kernel's blocking `input.select()`.
/// Generous relative to actual keystroke rate; this is a sizing choice, not
/// a correctness one — the kernel drains one event per outer loop pass.
pub const EVENT_CHANNEL_CAP: usize = 256;

/// Count of events dropped because the channel was closed on send.
pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
/// Count of key byte-sequences delivered to the kernel.
pub static KEY_EVENTS_TOTAL: AtomicU64 = AtomicU64::new(0);
/// Count of resize events delivered to the kernel.
pub static RESIZE_EVENTS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// One item placed on the kernel's input channel. `Key` carries an already
/// xterm-encoded byte sequence (see `clink_terminal::keys`); the kernel's
/// read contract still pops it one byte at a time via `KeyRing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Key(Vec<u8>),
    Resize(u16, u16),
    Abort,
    Tick,
}

/// Trait implemented by any background producer of `Event`s: the resize
/// watcher, a periodic tick, or the startup history-reap task. Each source
/// owns its async task lifecycle and must stop promptly once the channel
/// closes.
pub trait AsyncEventSource: Send + 'static {
    fn name(&self) -> &'static str;
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()>;
}

/// Periodic `Event::Tick`, driving ephemeral cleanup (e.g. alive-file reap
/// scheduling) without a busy loop.
pub struct TickEventSource {
    interval: std::time::Duration,
}

impl TickEventSource {
    pub fn new(interval: std::time::Duration) -> Self {
        Self { interval }
    }
}

impl AsyncEventSource for TickEventSource {
    fn name(&self) -> &'static str {
        "tick"
    }
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        let dur = self.interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dur);
            loop {
                interval.tick().await;
                if tx.send(Event::Tick).await.is_err() {
                    break;
                }
            }
        })
    }
}

/// Collects background sources and spawns them all at once, handing each
/// its own `Sender` clone.
#[derive(Default)]
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn AsyncEventSource>>,
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: AsyncEventSource>(&mut self, src: S) {
        self.sources.push(Box::new(src));
    }

    /// Spawn every registered source, draining the registry. Call once,
    /// after the channel is constructed and before the kernel starts
    /// reading from it.
    pub fn spawn_all(&mut self, tx: &Sender<Event>) -> Vec<JoinHandle<()>> {
        self.sources
            .drain(..)
            .map(|src| {
                let name = src.name();
                tracing::info!(target: "events", source = name, "spawning event source");
                src.spawn(tx.clone())
            })
            .collect()
    }
}

/// Send helper recording telemetry on failure; used by the synchronous
/// input decoder which must not await.
pub fn record_send_result(event: &Event, ok: bool) {
    if !ok {
        CHANNEL_SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
        return;
    }
    match event {
        Event::Key(_) => {
            KEY_EVENTS_TOTAL.fetch_add(1, Ordering::Relaxed);
        }
        Event::Resize(_, _) => {
            RESIZE_EVENTS_TOTAL.fetch_add(1, Ordering::Relaxed);
        }
        _ => {}
    }
}
