//! Per-workflow event broadcasting.
//!
//! Each workflow owns a channel: a tokio broadcast sender for live observers,
//! a bounded history of recent events, and the retained terminal sequence.
//! Publishing never waits on observers; an observer that falls behind the
//! broadcast buffer skips the oldest events.

use crate::events::WorkflowEvent;
use futures::Stream;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

struct Channel {
    sender: broadcast::Sender<WorkflowEvent>,
    history: VecDeque<WorkflowEvent>,
    terminal: Vec<WorkflowEvent>,
    finished: bool,
}

/// Registry of per-workflow event channels.
pub struct EventBroadcaster {
    channels: RwLock<HashMap<String, Arc<Mutex<Channel>>>>,
    history_limit: usize,
    buffer: usize,
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.channels.read().map_or(0, |channels| channels.len());
        f.debug_struct("EventBroadcaster")
            .field("channels", &count)
            .field("history_limit", &self.history_limit)
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl EventBroadcaster {
    /// Creates a broadcaster.
    ///
    /// # Arguments
    /// * `history_limit` - Recent non-terminal events retained per workflow
    /// * `buffer` - Broadcast buffer per workflow; slower observers lag
    #[must_use]
    pub fn new(history_limit: usize, buffer: usize) -> Self {
        Self { channels: RwLock::new(HashMap::new()), history_limit, buffer: buffer.max(1) }
    }

    fn channel(&self, workflow_id: &str) -> Option<Arc<Mutex<Channel>>> {
        self.channels.read().unwrap_or_else(PoisonError::into_inner).get(workflow_id).cloned()
    }

    /// Opens the channel for a workflow. Re-registering is a no-op.
    pub fn register(&self, workflow_id: &str) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels.entry(workflow_id.to_string()).or_insert_with(|| {
            let (sender, _) = broadcast::channel(self.buffer);
            Arc::new(Mutex::new(Channel {
                sender,
                history: VecDeque::with_capacity(self.history_limit),
                terminal: Vec::new(),
                finished: false,
            }))
        });
    }

    /// Publishes an event to the workflow's observers.
    ///
    /// Returns `false` when the channel is gone (cleared) or already finished.
    pub fn publish(&self, event: WorkflowEvent) -> bool {
        let Some(channel) = self.channel(&event.workflow_id) else {
            debug!(
                workflow_id = %event.workflow_id,
                kind = ?event.kind,
                "No channel, dropping event"
            );
            return false;
        };
        let mut channel = channel.lock().unwrap_or_else(PoisonError::into_inner);

        if channel.finished {
            warn!(
                workflow_id = %event.workflow_id,
                kind = ?event.kind,
                "Event after final, dropping"
            );
            return false;
        }

        if event.is_terminal_sequence() {
            channel.terminal.push(event.clone());
            channel.finished = event.is_final();
        } else {
            if channel.history.len() >= self.history_limit {
                channel.history.pop_front();
            }
            if self.history_limit > 0 {
                channel.history.push_back(event.clone());
            }
        }

        // No receivers is fine; history keeps the event.
        let _ = channel.sender.send(event);
        true
    }

    /// Subscribes to a workflow.
    ///
    /// If the workflow already finished, the subscription yields the retained
    /// terminal events and ends; otherwise it yields live events until
    /// `final`. Every event published after this call returns is delivered,
    /// so a snapshot read afterwards and attached with
    /// [`Subscription::with_snapshot`] never hides an event.
    ///
    /// Returns `None` if the workflow has no channel.
    pub fn subscribe(&self, workflow_id: &str) -> Option<Subscription> {
        let channel = self.channel(workflow_id)?;
        let channel = channel.lock().unwrap_or_else(PoisonError::into_inner);

        let mut pending = VecDeque::new();
        let receiver = if channel.finished {
            pending.extend(channel.terminal.iter().cloned());
            None
        } else {
            Some(channel.sender.subscribe())
        };

        debug!(workflow_id = %workflow_id, finished = channel.finished, "Observer subscribed");
        Some(Subscription { pending, receiver, done: false })
    }

    /// Retained events of a workflow: recent history, then the terminal sequence.
    pub fn history(&self, workflow_id: &str) -> Vec<WorkflowEvent> {
        self.channel(workflow_id).map_or_else(Vec::new, |channel| {
            let channel = channel.lock().unwrap_or_else(PoisonError::into_inner);
            channel.history.iter().chain(channel.terminal.iter()).cloned().collect()
        })
    }

    /// Drops every channel. Live subscriptions end once drained.
    pub fn clear_all(&self) -> usize {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let removed = channels.len();
        channels.clear();
        removed
    }
}

/// A stream of events for one workflow.
#[derive(Debug)]
pub struct Subscription {
    pending: VecDeque<WorkflowEvent>,
    receiver: Option<broadcast::Receiver<WorkflowEvent>>,
    done: bool,
}

impl Subscription {
    /// Puts `snapshot` ahead of every other event.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: WorkflowEvent) -> Self {
        self.pending.push_front(snapshot);
        self
    }

    /// Receives the next event.
    ///
    /// Returns `None` after `final` or when the workflow's channel was cleared.
    pub async fn recv(&mut self) -> Option<WorkflowEvent> {
        if self.done {
            return None;
        }

        if let Some(event) = self.pending.pop_front() {
            self.done = event.is_final();
            return Some(event);
        }

        let Some(receiver) = self.receiver.as_mut() else {
            self.done = true;
            return None;
        };

        loop {
            match receiver.recv().await {
                Ok(event) => {
                    self.done = event.is_final();
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Observer lagging, oldest events dropped");
                }
                Err(RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }

    /// Converts the subscription into a `Stream`.
    pub fn into_stream(self) -> impl Stream<Item = WorkflowEvent> {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription.recv().await.map(|event| (event, subscription))
        })
    }
}
