//! Stream tee — fans one upstream fragment stream out to many consumers.
//!
//! Each consumer receives every fragment in production order exactly once,
//! followed by exactly one terminal event. A consumer that joins mid-stream
//! first gets a replay of everything produced so far. Delivery goes through
//! per-consumer unbounded channels, so one slow or disconnected consumer
//! never holds back the others or the accumulator.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::error::{ParakeetError, Result};

/// One delivery to a tee consumer.
#[derive(Debug, Clone)]
pub enum TeeEvent {
    /// The next fragment, in production order.
    Fragment(String),
    /// The stream ended normally; carries the full concatenated text.
    Completed(String),
    /// The producer failed; fragments already delivered are not retracted.
    Failed(ParakeetError),
}

enum Terminal {
    Completed(String),
    Failed(ParakeetError),
}

struct TeeState {
    fragments: Vec<String>,
    senders: Vec<mpsc::UnboundedSender<TeeEvent>>,
    terminal: Option<Terminal>,
}

/// Fan-out point for a single upstream fetch.
pub struct StreamTee {
    state: Mutex<TeeState>,
}

impl Default for StreamTee {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTee {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TeeState {
                fragments: Vec::new(),
                senders: Vec::new(),
                terminal: None,
            }),
        }
    }

    /// Attach a new consumer.
    ///
    /// Already-produced fragments are replayed into its channel first, under
    /// the same lock the producer appends with, so the consumer observes
    /// every fragment exactly once and in order no matter when it joins. If
    /// the tee already reached a terminal state the consumer gets the replay
    /// plus that terminal event immediately.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        for fragment in &state.fragments {
            let _ = tx.send(TeeEvent::Fragment(fragment.clone()));
        }
        match &state.terminal {
            Some(Terminal::Completed(full)) => {
                let _ = tx.send(TeeEvent::Completed(full.clone()));
            }
            Some(Terminal::Failed(error)) => {
                let _ = tx.send(TeeEvent::Failed(error.clone()));
            }
            None => state.senders.push(tx),
        }
        Subscription { rx }
    }

    /// Append a fragment and deliver it to every live consumer.
    ///
    /// Consumers whose receiving end is gone are pruned here.
    pub fn publish(&self, fragment: String) {
        let mut state = self.lock();
        if state.terminal.is_some() {
            return;
        }
        state
            .senders
            .retain(|tx| tx.send(TeeEvent::Fragment(fragment.clone())).is_ok());
        state.fragments.push(fragment);
    }

    /// Mark the stream complete and notify every consumer.
    ///
    /// Returns the full concatenated text. Idempotent; only the first
    /// terminal transition delivers events.
    pub fn complete(&self) -> String {
        let mut state = self.lock();
        match &state.terminal {
            Some(Terminal::Completed(full)) => return full.clone(),
            Some(Terminal::Failed(_)) => return state.fragments.concat(),
            None => {}
        }
        let full = state.fragments.concat();
        state.terminal = Some(Terminal::Completed(full.clone()));
        for tx in state.senders.drain(..) {
            let _ = tx.send(TeeEvent::Completed(full.clone()));
        }
        full
    }

    /// Mark the stream failed and notify every consumer, present and future.
    pub fn fail(&self, error: ParakeetError) {
        let mut state = self.lock();
        if state.terminal.is_some() {
            return;
        }
        for tx in state.senders.drain(..) {
            let _ = tx.send(TeeEvent::Failed(error.clone()));
        }
        state.terminal = Some(Terminal::Failed(error));
    }

    /// Concatenation of all fragments produced so far.
    ///
    /// Only meaningful to the driver once the upstream has ended; partial
    /// accumulation never leaves the relay.
    pub(crate) fn accumulated_text(&self) -> String {
        self.lock().fragments.concat()
    }

    /// Number of currently attached consumers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().senders.len()
    }

    fn lock(&self) -> MutexGuard<'_, TeeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A consumer's view of one tee.
///
/// Dropping a subscription detaches the consumer; the producer keeps running
/// for everyone else.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<TeeEvent>,
}

impl Subscription {
    /// Receive the next event, or `None` if the tee is gone.
    pub async fn next_event(&mut self) -> Option<TeeEvent> {
        self.rx.recv().await
    }

    /// Drain the subscription into the final text.
    ///
    /// Returns the completed full text, or the failure error. Fragments are
    /// concatenated as a cross-check against the completed payload.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut collected = String::new();
        while let Some(event) = self.next_event().await {
            match event {
                TeeEvent::Fragment(fragment) => collected.push_str(&fragment),
                TeeEvent::Completed(full) => return Ok(full),
                TeeEvent::Failed(error) => return Err(error),
            }
        }
        Err(ParakeetError::Provider(
            "stream ended without a terminal event".into(),
        ))
    }
}
