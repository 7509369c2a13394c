use color_eyre::{eyre::eyre, Result};
use padbridge::config::{BridgeConfig, SourceMode};
use padbridge::controller::{DeviceSource, EmptySource, GilrsSource, SamplerHandle};
use padbridge::mock::MockDeviceSource;
use padbridge::port::{CrlfWriter, Environment, FramePort, TerminalKeyFeed};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let config = setup().await?;

    let quit = CancellationToken::new();
    let (source, mut key_feed) = setup_source(&config, quit.clone())?;

    let environment = Environment::capture(&config.environment).await;

    let (frame_sender, frame_receiver) = mpsc::channel(config.sampler.channel_capacity);

    let sampler = SamplerHandle::spawn(source, Some(config.sampler.clone()), frame_sender)
        .map_err(|e| eyre!("Failed to spawn frame sampler: {}", e))?;

    // Frames go to stdout, everything else to stderr. The port cancels `quit`
    // once the consumer is gone.
    let port = FramePort::new(tokio::io::stdout(), environment);
    let port_handle = tokio::spawn(port.run(frame_receiver, quit.clone()));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Unable to listen for shutdown signal: {}", e);
            }
            info!("Received interrupt, shutting down");
        }
        _ = quit.cancelled() => info!("Shutting down"),
    }

    sampler.stop();
    sampler.join().await;

    if let Some(feed) = key_feed.as_mut() {
        feed.shutdown();
    }

    match port_handle.await {
        Ok(Ok(frames)) => info!("Bridge stopped after {} frames", frames),
        Ok(Err(e)) => return Err(eyre!("Frame port failed: {}", e)),
        Err(e) => return Err(eyre!("Frame port task failed: {}", e)),
    }

    Ok(())
}

async fn setup() -> Result<BridgeConfig> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;

    let config = BridgeConfig::load().await?;
    setup_logging_env(config.log_level()?, config.source);
    info!("Using config from {}", BridgeConfig::default_path().display());
    Ok(config)
}

fn setup_logging_env(level: Level, source: SourceMode) {
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty();

    match source {
        // stderr shares the tty with the raw-mode key feed
        SourceMode::Mock => builder
            .with_writer(|| CrlfWriter::new(std::io::stderr()))
            .init(),
        SourceMode::Host => builder.with_writer(std::io::stderr).init(),
    }
}

fn setup_source(
    config: &BridgeConfig,
    quit: CancellationToken,
) -> Result<(Box<dyn DeviceSource>, Option<TerminalKeyFeed>)> {
    match config.source {
        SourceMode::Host => {
            let source: Box<dyn DeviceSource> = match GilrsSource::create() {
                Ok(source) => Box::new(source),
                Err(e) => {
                    warn!("{}, reporting no gamepads", e);
                    Box::new(EmptySource)
                }
            };
            Ok((source, None))
        }
        SourceMode::Mock => {
            let (source, keyboard) = MockDeviceSource::create(config.mock.clone());
            let feed = TerminalKeyFeed::spawn(keyboard, quit)
                .map_err(|e| eyre!("Failed to start terminal key feed: {}", e))?;
            Ok((Box::new(source), Some(feed)))
        }
    }
}
