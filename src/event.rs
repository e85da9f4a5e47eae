use crate::{config::Mode, release::ProducerId};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::{self, Receiver, Sender};

#[derive(Clone)]
pub struct EventBus {
    tx: Sender<StreamEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel::<StreamEvent>(100);
        Self { tx }
    }

    pub fn send(&self, event: StreamEvent) {
        // Nobody listening is the common case, not an error
        if self.tx.receiver_count() == 0 {
            trace!("Dropping event without subscribers: {:?}", event);
            return;
        }

        if let Err(e) = self.tx.send(event) {
            error!("Error while sending event: {:?}", e);
        }
    }

    pub fn subscribe(&self) -> Subscriber {
        Subscriber::new(self.tx.subscribe())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Subscriber {
    rx: Receiver<StreamEvent>,
}

impl Subscriber {
    pub fn new(rx: Receiver<StreamEvent>) -> Self {
        Self { rx }
    }

    pub fn try_recv(&mut self) -> Result<StreamEvent, TryRecvError> {
        self.rx.try_recv()
    }

    /// Waits for the next event. Returns `None` once the stream is gone.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        loop {
            let event = self.rx.recv().await;

            match event {
                Ok(event) => break Some(event),
                Err(RecvError::Closed) => break None,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Stream event subscriber lagging behind, skipping {skipped} events");
                }
            }
        }
    }

    /// Drains every event currently queued.
    pub fn drain(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Stream event subscriber lagging behind, skipping {skipped} events");
                }
                Err(_) => break events,
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Sink graph connected and scheduler running
    Started { mode: Mode },

    InputAttached { producer: ProducerId, inputs: usize },

    InputDetached { producer: ProducerId, inputs: usize },

    /// A delivery used up the last queued sample, silence follows until the next push
    Drained,

    /// Buffer mode woke up too late and skipped ahead of the playback cursor
    Resync { skipped_samples: u64 },

    /// End requested, teardown in progress
    Ending,

    /// Terminal, emitted exactly once
    Ended,
}
