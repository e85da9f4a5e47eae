#[macro_use]
extern crate log;

use anyhow::{Context, Result};
use sink_stream::{config, sinks::NetSink, sources, SinkStream};

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Config.toml".to_string());
    let config = config::load(&path)
        .await
        .with_context(|| format!("loading config from {path}"))?;

    let channels = config.stream.channels;
    let sink = NetSink::new(config.listen.clone(), config.sink_sample_rate, channels);
    let stream = SinkStream::new(Box::new(sink), config.stream.clone())?;
    stream.start()?;

    let source = sources::open(
        &config.source,
        stream.sample_rate(),
        channels,
        config.stream.samples_per_frame,
    )?;
    let producer = stream.producer();

    tokio::select! {
        result = producer.pipe(source) => {
            result?;
            info!("Source finished");
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    stream.end();
    stream.ended().await;

    Ok(())
}
