//! Capture side: reads whatever a node receives on its input, one frame at a time.

use crate::{
    error::Result,
    frame::Frame,
    sink::{lock, Sink},
};
use futures::Stream;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

#[derive(Default)]
struct ReadSlot {
    pending: Option<oneshot::Sender<Frame>>,
    ended: bool,
}

/// Hands out the input blocks a node captures.
///
/// Only one read can be pending. Blocks that arrive while nobody is reading are
/// dropped, so the reader never buffers.
pub struct Reader {
    node: Mutex<Box<dyn Sink>>,
    slot: Arc<Mutex<ReadSlot>>,
}

impl Reader {
    pub fn new(mut node: Box<dyn Sink>, samples_per_frame: usize) -> Result<Self> {
        let slot = Arc::new(Mutex::new(ReadSlot::default()));

        node.connect()?;
        let handler_slot = slot.clone();
        let started = node.start_processor(
            samples_per_frame,
            Box::new(move |input, _output| match lock(&handler_slot).pending.take() {
                Some(tx) => {
                    let _ = tx.send(input.clone());
                }
                None => trace!("No pending read, dropping {} captured samples", input.len()),
            }),
        );
        if let Err(e) = started {
            node.disconnect();
            return Err(e);
        }

        Ok(Self {
            node: Mutex::new(node),
            slot,
        })
    }

    /// Waits for the next captured frame. Returns `None` once the reader has ended.
    pub async fn read(&self) -> Option<Frame> {
        let rx = {
            let mut slot = lock(&self.slot);
            if slot.ended {
                return None;
            }
            let (tx, rx) = oneshot::channel();
            slot.pending = Some(tx);
            rx
        };

        rx.await.ok()
    }

    /// Stops capturing and disconnects the node. Pending reads resolve with `None`.
    pub fn end(&self) {
        {
            let mut slot = lock(&self.slot);
            if slot.ended {
                return;
            }
            slot.ended = true;
            slot.pending = None;
        }

        debug!("Reader ended");
        let mut node = lock(&self.node);
        node.stop();
        node.disconnect();
    }

    pub fn into_stream(self) -> impl Stream<Item = Frame> {
        futures::stream::unfold(self, |reader| async move {
            let frame = reader.read().await?;
            Some((frame, reader))
        })
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.end();
    }
}
