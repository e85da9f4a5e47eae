//! Script mode: the sink's own process notification drives delivery.
//!
//! Each notification synchronously shifts one frame into the sink's output block and
//! then hands one credit back to the producers. If the host stops sending
//! notifications the stream simply stalls; nothing here can detect that.

use crate::{
    event::EventBus,
    frame::Frame,
    pipe::SharedPipe,
    sink::{lock, ProcessHandler},
};

pub struct PushScheduler {
    pipe: SharedPipe,
    bus: EventBus,
}

impl PushScheduler {
    pub fn new(pipe: SharedPipe, bus: EventBus) -> Self {
        Self { pipe, bus }
    }

    /// Fills `output` for one processing period.
    pub fn process(&self, output: &mut Frame) {
        let frame = lock(&self.pipe).deliver(output.len(), &self.bus);

        match frame {
            Some(frame) => output.copy_from(&frame, 0),
            None => output.fill_silence(),
        }
    }

    pub fn into_handler(self) -> ProcessHandler {
        Box::new(move |_input, output| self.process(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipe::Pipe,
        release::{Release, ReleaseOutcome},
    };

    #[test]
    fn process_delivers_then_releases() {
        let pipe = Pipe::shared(1, 4);
        let (tx, mut release) = Release::pair();
        {
            let mut pipe = lock(&pipe);
            pipe.queue
                .push(Frame::from_channels(vec![vec![1.0, 2.0, 3.0, 4.0, 5.0]]).unwrap())
                .unwrap();
            pipe.releases.store(0, tx);
        }
        let scheduler = PushScheduler::new(pipe.clone(), EventBus::new());

        let mut output = Frame::silence(1, 4);
        scheduler.process(&mut output);

        assert_eq!(output.channel(0), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(release.try_outcome(), Some(ReleaseOutcome::Released));
        assert_eq!(lock(&pipe).queue.len(), 1);
    }

    #[test]
    fn stopped_pipe_writes_silence() {
        let pipe = Pipe::shared(2, 4);
        {
            let mut pipe = lock(&pipe);
            pipe.queue.push(Frame::silence(2, 4)).unwrap();
            pipe.stopped = true;
        }
        let mut handler = PushScheduler::new(pipe, EventBus::new()).into_handler();

        let mut output = Frame::from_channels(vec![vec![9.0; 4], vec![9.0; 4]]).unwrap();
        handler(&Frame::silence(2, 4), &mut output);

        assert!(output.is_silent());
    }
}
