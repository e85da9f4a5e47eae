//! Real-time sink that streams its output as an endless WAV file over TCP.
//!
//! Every client that connects gets a WAV header followed by 16-bit little endian
//! samples, rendered on a tokio task paced by the wall clock.

use crate::{
    constants::{FOLD, NET_BIT_DEPTH},
    error::{Result, StreamError},
    frame::Frame,
    normalize::encode_i16_le,
    sink::{lock, Clock, ProcessHandler, SharedRing, Sink},
};
use bytes::Bytes;
use hound::{SampleFormat, WavSpec};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::broadcast::{self, error::RecvError},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

/// How often the looping source is sampled, in samples. The render task reads up to
/// this far ahead of the clock.
pub const TARGET_CHUNK_SIZE: usize = 128;

/// Rendered chunks kept for slow clients before they start skipping.
const CLIENT_BACKLOG: usize = 64;

struct WallClock {
    start: Instant,
}

impl Clock for WallClock {
    fn current_time(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

pub struct NetSink {
    addr: String,
    sample_rate: u32,
    channels: usize,
    clock: Arc<WallClock>,
    tx: broadcast::Sender<Bytes>,
    local_addr: Option<SocketAddr>,
    /// Cancels the accept loop and every client
    listener: Option<CancellationToken>,
    /// Cancels the render task
    render: Option<CancellationToken>,
}

impl NetSink {
    pub fn new(addr: impl Into<String>, sample_rate: u32, channels: usize) -> Self {
        let (tx, _rx) = broadcast::channel(CLIENT_BACKLOG);
        Self {
            addr: addr.into(),
            sample_rate,
            channels,
            clock: Arc::new(WallClock {
                start: Instant::now(),
            }),
            tx,
            local_addr: None,
            listener: None,
            render: None,
        }
    }

    /// Address actually bound, once connected.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn wav_header(&self) -> Vec<u8> {
        let spec = WavSpec {
            channels: self.channels as u16,
            sample_rate: self.sample_rate,
            bits_per_sample: NET_BIT_DEPTH,
            sample_format: SampleFormat::Int,
        };

        // Players recognize the stream as a wav file of unknown length
        spec.into_header_for_infinite_file()
    }

    fn spawn_render<F>(&mut self, render: F) -> Result<()>
    where
        F: FnMut(usize) -> Frame + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StreamError::NoRuntime)?;

        if let Some(previous) = self.render.take() {
            previous.cancel();
        }
        let cancel = CancellationToken::new();
        self.render = Some(cancel.clone());

        runtime.spawn(render_loop(
            render,
            self.sample_rate,
            self.tx.clone(),
            cancel,
        ));
        Ok(())
    }
}

impl Sink for NetSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn connect(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StreamError::NoRuntime)?;

        // Bind synchronously so a bad address fails the connect
        let listener = std::net::TcpListener::bind(&self.addr)
            .and_then(|listener| {
                listener.set_nonblocking(true)?;
                Ok(listener)
            })
            .map_err(|e| StreamError::Sink(format!("binding {}: {e}", self.addr)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| StreamError::Sink(e.to_string()))?;

        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(listener).map_err(|e| StreamError::Sink(e.to_string()))?
        };

        info!("Listening on {local_addr}");

        let cancel = CancellationToken::new();
        runtime.spawn(accept_loop(
            listener,
            self.wav_header(),
            self.tx.clone(),
            cancel.clone(),
        ));

        self.local_addr = Some(local_addr);
        self.listener = Some(cancel);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(cancel) = self.listener.take() {
            info!("Closing listener on {:?}", self.local_addr);
            cancel.cancel();
        }
    }

    fn start_processor(&mut self, frame_size: usize, mut handler: ProcessHandler) -> Result<()> {
        if frame_size == 0 {
            return Err(StreamError::Sink("zero frame size".to_string()));
        }

        let channels = self.channels;
        let input = Frame::silence(channels, frame_size);
        let mut pending = Frame::silence(channels, 0);

        self.spawn_render(move |len| {
            while pending.len() < len {
                let mut output = Frame::silence(channels, frame_size);
                handler(&input, &mut output);
                pending.append(&output);
            }
            pending.take_front(len)
        })
    }

    fn start_loop(&mut self, ring: SharedRing) -> Result<()> {
        // Less than a chunk of lead time would be read before it is rendered
        let frame_size = lock(&ring).len() / FOLD;
        if frame_size < TARGET_CHUNK_SIZE {
            return Err(StreamError::Sink(format!(
                "frames of {frame_size} samples are shorter than the \
                 {TARGET_CHUNK_SIZE} sample read-ahead"
            )));
        }

        let mut cursor = 0;

        self.spawn_render(move |len| {
            let ring = lock(&ring);
            let size = ring.len().max(1);
            let out = ring.slice_wrapping(cursor % size, len);
            cursor = (cursor + len) % size;
            out
        })
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.render.take() {
            cancel.cancel();
        }
    }
}

impl Drop for NetSink {
    fn drop(&mut self) {
        self.stop();
        self.disconnect();
    }
}

/// Renders as many samples as wall time demands, then sleeps for one chunk.
async fn render_loop<F>(
    mut render: F,
    sample_rate: u32,
    tx: broadcast::Sender<Bytes>,
    cancel: CancellationToken,
) where
    F: FnMut(usize) -> Frame,
{
    let start_time = Instant::now();
    let mut sample_send_count: u64 = 0;
    let sleep_time =
        Duration::from_secs_f64(TARGET_CHUNK_SIZE as f64 / sample_rate as f64);

    loop {
        let expected_sent_samples =
            ((start_time.elapsed() + sleep_time).as_secs_f64() * sample_rate as f64) as u64;
        let chunk_size = expected_sent_samples.saturating_sub(sample_send_count) as usize;

        if chunk_size > 0 {
            let frame = render(chunk_size);
            // Nobody listening is fine, the audio is simply not heard
            let _ = tx.send(Bytes::from(encode_i16_le(&frame)));
            sample_send_count += chunk_size as u64;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(sleep_time) => {}
        }
    }

    debug!("Render task stopped after {sample_send_count} samples");
}

async fn accept_loop(
    listener: TcpListener,
    header: Vec<u8>,
    tx: broadcast::Sender<Bytes>,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                info!("Accepted connection from {addr}");
                tokio::spawn(serve_client(
                    stream,
                    addr,
                    header.clone(),
                    tx.subscribe(),
                    cancel.clone(),
                ));
            }
            Err(e) => error!("Failed to accept connection: {e}"),
        }
    }
}

async fn serve_client(
    mut stream: TcpStream,
    addr: SocketAddr,
    header: Vec<u8>,
    mut rx: broadcast::Receiver<Bytes>,
    cancel: CancellationToken,
) {
    if let Err(e) = stream.write_all(&header).await {
        warn!("Failed to write wav header to {addr}: {e}");
        return;
    }

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = rx.recv() => chunk,
        };

        match chunk {
            Ok(chunk) => {
                if let Err(e) = stream.write_all(&chunk).await {
                    info!("Client {addr} went away: {e}");
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Client {addr} lagging behind, skipped {skipped} chunks");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
