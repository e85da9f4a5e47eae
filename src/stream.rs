//! Wires the queue and a scheduler to a sink and sequences the stream lifecycle.
//!
//! ```text
//! Created --start()--> Running --end() / autoend--> Ending --teardown--> Ended
//! ```
//!
//! Producers may write while the stream is still `Created`; the data simply waits in
//! the queue until the first delivery.

use crate::{
    config::{Mode, StreamConfig},
    error::{Result, StreamError},
    event::{EventBus, StreamEvent, Subscriber},
    normalize::{normalize, Chunk},
    pipe::{Pipe, SharedPipe},
    pull_scheduler::PullScheduler,
    push_scheduler::PushScheduler,
    release::{ProducerId, Release, ReleaseOutcome},
    sink::{lock, Sink},
};
use futures::{Stream, StreamExt};
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Writes through [`SinkStream::write`] are accounted to this producer.
pub const DEFAULT_PRODUCER: ProducerId = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Running,
    Ending,
    Ended,
}

/// Snapshot of the queue counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Samples per channel waiting to be delivered
    pub buffered: usize,
    pub delivered_samples: u64,
    pub padded_samples: u64,
    pub pending_releases: usize,
}

struct Graph {
    sink: Box<dyn Sink>,
    connected: bool,
}

struct Inner {
    config: StreamConfig,
    sample_rate: u32,
    pipe: SharedPipe,
    graph: Mutex<Graph>,
    state: watch::Sender<Lifecycle>,
    bus: EventBus,
    cancel: CancellationToken,
    inputs: AtomicUsize,
    next_producer: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Nothing can reach the timer task anymore
        self.cancel.cancel();
    }
}

/// Cheaply cloneable handle to one stream.
#[derive(Clone)]
pub struct SinkStream {
    inner: Arc<Inner>,
}

impl SinkStream {
    pub fn new(sink: Box<dyn Sink>, config: StreamConfig) -> Result<Self> {
        config.validate()?;

        let sample_rate = match config.sample_rate {
            Some(rate) => rate,
            None => sink.sample_rate(),
        };
        if sample_rate == 0 {
            return Err(StreamError::InvalidSink(
                "sink reports a sample rate of 0".to_string(),
            ));
        }

        let (state, _) = watch::channel(Lifecycle::Created);

        Ok(Self {
            inner: Arc::new(Inner {
                pipe: Pipe::shared(config.channels, config.samples_per_frame),
                config,
                sample_rate,
                graph: Mutex::new(Graph {
                    sink,
                    connected: false,
                }),
                state,
                bus: EventBus::new(),
                cancel: CancellationToken::new(),
                inputs: AtomicUsize::new(0),
                next_producer: AtomicU64::new(DEFAULT_PRODUCER + 1),
            }),
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    pub fn mode(&self) -> Mode {
        self.inner.config.mode
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn state(&self) -> Lifecycle {
        *self.inner.state.borrow()
    }

    pub fn is_ended(&self) -> bool {
        self.state() == Lifecycle::Ended
    }

    pub fn subscribe(&self) -> Subscriber {
        self.inner.bus.subscribe()
    }

    /// Number of attached producers.
    pub fn input_count(&self) -> usize {
        self.inner.inputs.load(Ordering::SeqCst)
    }

    /// Seconds of queued audio delivered to the sink so far, padding excluded.
    pub fn position_secs(&self) -> f64 {
        lock(&self.inner.pipe).queue.delivered_secs(self.inner.sample_rate)
    }

    /// Whether `producer` has a credit waiting for the next delivery.
    pub fn is_waiting(&self, producer: ProducerId) -> bool {
        lock(&self.inner.pipe).releases.is_pending(producer)
    }

    pub fn stats(&self) -> QueueStats {
        let pipe = lock(&self.inner.pipe);
        QueueStats {
            buffered: pipe.queue.len(),
            delivered_samples: pipe.queue.delivered_samples(),
            padded_samples: pipe.queue.padded_samples(),
            pending_releases: pipe.releases.len(),
        }
    }

    /// Connects the sink and starts delivering frames.
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        let mut graph = lock(&inner.graph);

        match self.state() {
            Lifecycle::Created => {}
            Lifecycle::Running => return Err(StreamError::AlreadyStarted),
            Lifecycle::Ending | Lifecycle::Ended => return Err(StreamError::Ended),
        }

        let runtime = match inner.config.mode {
            Mode::Buffer => Some(
                tokio::runtime::Handle::try_current().map_err(|_| StreamError::NoRuntime)?,
            ),
            Mode::Script => None,
        };

        // A processor or loop started before the graph is wired may never be called
        graph.sink.connect()?;
        graph.connected = true;

        if let Err(e) = self.start_scheduler(&mut graph, runtime) {
            graph.sink.disconnect();
            graph.connected = false;
            return Err(e);
        }

        let running = inner.state.send_if_modified(|state| {
            if *state == Lifecycle::Created {
                *state = Lifecycle::Running;
                true
            } else {
                false
            }
        });

        if running {
            info!(
                "Stream started in {} mode: {} ch, {} samples per frame at {} Hz",
                inner.config.mode,
                inner.config.channels,
                inner.config.samples_per_frame,
                inner.sample_rate
            );
            inner.bus.send(StreamEvent::Started {
                mode: inner.config.mode,
            });
        }

        Ok(())
    }

    fn start_scheduler(
        &self,
        graph: &mut Graph,
        runtime: Option<tokio::runtime::Handle>,
    ) -> Result<()> {
        let inner = &self.inner;
        let frame_size = inner.config.samples_per_frame;

        let Some(runtime) = runtime else {
            let scheduler = PushScheduler::new(inner.pipe.clone(), inner.bus.clone());
            return graph
                .sink
                .start_processor(frame_size, scheduler.into_handler());
        };

        let mut scheduler = PullScheduler::new(
            inner.pipe.clone(),
            inner.bus.clone(),
            inner.config.channels,
            frame_size,
            inner.sample_rate,
        );
        graph.sink.start_loop(scheduler.ring())?;

        let clock = graph.sink.clock();
        let now = clock.current_time();
        scheduler.set_origin(now + graph.sink.output_latency());
        // Prefill before the sink can reach the first ring sample
        scheduler.tick(now);
        runtime.spawn(scheduler.run(clock, inner.cancel.clone()));

        Ok(())
    }

    /// Queues a chunk as the default producer.
    pub fn write(&self, chunk: impl Into<Chunk>) -> Result<Release> {
        self.write_as(DEFAULT_PRODUCER, chunk.into())
    }

    fn write_as(&self, producer: ProducerId, chunk: Chunk) -> Result<Release> {
        if matches!(self.state(), Lifecycle::Ending | Lifecycle::Ended) {
            return Err(StreamError::Ended);
        }

        let config = &self.inner.config;
        let frame = normalize(chunk, &config.format, config.channels)?;
        let (tx, release) = Release::pair();

        let mut pipe = lock(&self.inner.pipe);
        if pipe.stopped {
            return Err(StreamError::Ended);
        }
        trace!("Producer {producer} queued {} samples", frame.len());
        pipe.queue.push(frame)?;
        pipe.releases.store(producer, tx);

        Ok(release)
    }

    /// Attaches a new producer.
    pub fn producer(&self) -> Producer {
        let id = self.inner.next_producer.fetch_add(1, Ordering::SeqCst);
        let inputs = self.inner.inputs.fetch_add(1, Ordering::SeqCst) + 1;

        debug!("Producer {id} attached, {inputs} inputs");
        self.inner
            .bus
            .send(StreamEvent::InputAttached { producer: id, inputs });

        Producer {
            id,
            stream: self.clone(),
            attached: true,
        }
    }

    /// Tears the stream down. Calling it again is a no-op.
    pub fn end(&self) {
        let inner = &self.inner;

        let ending = inner.state.send_if_modified(|state| match state {
            Lifecycle::Created | Lifecycle::Running => {
                *state = Lifecycle::Ending;
                true
            }
            Lifecycle::Ending | Lifecycle::Ended => false,
        });
        if !ending {
            return;
        }

        info!("Ending stream");
        inner.bus.send(StreamEvent::Ending);

        {
            let mut pipe = lock(&inner.pipe);
            pipe.stopped = true;
            pipe.releases.cancel_all();
        }

        inner.cancel.cancel();

        {
            let mut graph = lock(&inner.graph);
            graph.sink.stop();
            if graph.connected {
                graph.sink.disconnect();
                graph.connected = false;
            }
        }

        inner.state.send_replace(Lifecycle::Ended);
        info!("Stream ended");
        inner.bus.send(StreamEvent::Ended);
    }

    /// Resolves once the stream has fully ended.
    pub async fn ended(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == Lifecycle::Ended).await;
    }

    fn detach(&self, producer: ProducerId) {
        lock(&self.inner.pipe).releases.cancel(producer);
        let inputs = self.inner.inputs.fetch_sub(1, Ordering::SeqCst) - 1;

        debug!("Producer {producer} detached, {inputs} inputs");
        self.inner
            .bus
            .send(StreamEvent::InputDetached { producer, inputs });
    }
}

/// One attached input of a [`SinkStream`].
///
/// Dropping a producer detaches it. Finishing it also ends the stream when the stream
/// was configured with `autoend`.
pub struct Producer {
    id: ProducerId,
    stream: SinkStream,
    attached: bool,
}

impl Producer {
    pub fn id(&self) -> ProducerId {
        self.id
    }

    pub fn write(&self, chunk: impl Into<Chunk>) -> Result<Release> {
        self.stream.write_as(self.id, chunk.into())
    }

    /// Writes a chunk and waits until the stream wants more.
    pub async fn send(&self, chunk: impl Into<Chunk>) -> Result<ReleaseOutcome> {
        let release = self.write(chunk)?;
        Ok(release.await)
    }

    /// Writes every chunk of `source`, one at a time, then finishes.
    ///
    /// Stops early without error if the stream ends underneath.
    pub async fn pipe<S, C>(self, mut source: S) -> Result<()>
    where
        S: Stream<Item = C> + Unpin,
        C: Into<Chunk>,
    {
        while let Some(chunk) = source.next().await {
            match self.send(chunk).await {
                Ok(ReleaseOutcome::Released) => {}
                Ok(ReleaseOutcome::Ended) | Err(StreamError::Ended) => {
                    debug!("Stream ended while piping producer {}", self.id);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        self.finish();
        Ok(())
    }

    /// Detaches, ending the stream if it was configured with `autoend`.
    pub fn finish(mut self) {
        self.detach();

        if self.stream.config().autoend {
            debug!("Producer {} finished, autoend", self.id);
            self.stream.end();
        }
    }

    fn detach(&mut self) {
        if std::mem::take(&mut self.attached) {
            self.stream.detach(self.id);
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.detach();
    }
}
