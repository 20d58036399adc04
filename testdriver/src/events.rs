//! Event Bus (C10): decoupled pub-sub for lifecycle/telemetry/UI signals
//! (spec §4.10). Grounded in `loom::stream::ToolStreamWriter`'s type-erased
//! emitter pattern and spec §9's "arena + index over cyclic emitter graphs":
//! subscribers hold a channel (a token), never a back-reference to the bus.

use std::sync::Mutex;

use tokio::sync::mpsc;

/// Closed event-type enum (spec §4.10, sample names).
#[derive(Debug, Clone)]
pub enum Event {
    MouseMove { x: i32, y: i32 },
    MouseClick { x: i32, y: i32, button: String, action: String },
    ScreenCaptureStart,
    ScreenCaptureEnd,
    ScreenCaptureError(String),
    MatchesShow(Vec<String>),
    Interactive(bool),
    ShowWindow,
    TerminalStdout(String),
    TerminalStderr(String),
    TerminalStdin(String),
    SandboxSent,
    SandboxReceived,
    SandboxAuthenticated,
    SandboxConnected,
    LogMarkdownStart,
    LogMarkdownChunk(String),
    LogMarkdownEnd,
    LogMarkdownStatic(String),
    TestStart,
    TestStop,
    TestSuccess,
    TestError(String),
    StepStart(String),
    StepSuccess(String),
    StepError(String),
    CommandStart(String),
    CommandSuccess(String),
    CommandError(String),
    HistoryAdd,
    HistorySet,
    HistoryClear,
    ErrorGeneral(String),
    ErrorFatal(String),
    ErrorSandbox(String),
    Exit(i32),
}

/// Flat routing table of subscriber channels. `publish` is best-effort and
/// unordered with respect to other publishes (spec §5: "Event emissions are
/// best-effort and unordered"); a subscriber that dropped its receiver is
/// pruned lazily on the next publish rather than treated as an error.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Event>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { subscribers: Mutex::new(Vec::new()) }
    }

    /// Returns a receiver (a token) for all future events.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Fans out `event` to every live subscriber; prunes dead ones.
    pub fn publish(&self, event: Event) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_fans_out_to_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(Event::TestStart);
        assert!(matches!(rx1.recv().await, Some(Event::TestStart)));
        assert!(matches!(rx2.recv().await, Some(Event::TestStart)));
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned_without_error() {
        let bus = EventBus::new();
        {
            let _rx = bus.subscribe();
        }
        bus.publish(Event::TestStop);
        assert_eq!(bus.subscribers.lock().unwrap().len(), 0);
    }
}
