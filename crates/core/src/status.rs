use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

pub const SUBSCRIBER_QUEUE_DEPTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusMode {
    Idle,
    Processing,
    Thinking,
    ToolCall,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusState {
    pub mode: StatusMode,
    pub message: String,
    pub progress: u8,
    pub step: String,
}

impl Default for StatusState {
    fn default() -> Self {
        Self {
            mode: StatusMode::Idle,
            message: String::new(),
            progress: 0,
            step: String::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct StatusBroadcaster {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    state: StatusState,
    subscribers: Vec<mpsc::Sender<StatusState>>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<StatusState> {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        self.lock().subscribers.push(sender);
        receiver
    }

    pub fn set(
        &self,
        mode: StatusMode,
        message: impl Into<String>,
        progress: u8,
        step: impl Into<String>,
    ) {
        let state = StatusState {
            mode,
            message: message.into(),
            progress: progress.min(100),
            step: step.into(),
        };

        let mut inner = self.lock();
        inner.state = state.clone();

        // A subscriber whose queue is full or whose receiver is gone is
        // dropped for good; set never blocks on a consumer.
        inner
            .subscribers
            .retain(|subscriber| subscriber.try_send(state.clone()).is_ok());
    }

    pub fn set_idle(&self) {
        self.set(StatusMode::Idle, "", 0, "");
    }

    pub fn current(&self) -> StatusState {
        self.lock().state.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
