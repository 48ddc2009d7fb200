use clap::Parser;
use govee_logger::{
    BluezScanner, IngestionBuffer, InfluxDbClient, Options, RunError, Scanner, Sink, app,
};
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Install the log subscriber. `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(%err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run(options: Options) -> Result<(), RunError> {
    let config = options.load_config()?;
    if options.check_config {
        info!(
            mode = ?options.mode,
            sensors = config.sensors.len(),
            "configuration is valid"
        );
        return Ok(());
    }

    let buffer = IngestionBuffer::open(&config.buffer.path, config.buffer.timeout)?;
    info!(path = %config.buffer.path.display(), pending = buffer.depth()?, "opened buffer");

    let sink: Option<Arc<dyn Sink>> = if options.mode.uploads() {
        let influxdb = config.influxdb()?;
        let client = InfluxDbClient::new(
            &influxdb.url,
            &influxdb.org,
            &influxdb.token,
            influxdb.timeout,
        )?;
        Some(Arc::new(client))
    } else {
        None
    };
    let scanner: Arc<dyn Scanner> = Arc::new(BluezScanner);

    app::run(
        config,
        options.mode,
        scanner,
        sink,
        buffer,
        shutdown_signal(),
    )
    .await
}

#[tokio::main]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();
    init_logging(options.verbose);

    match run(options).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            error!("{why}");
            std::process::exit(EXIT_ERROR);
        }
    }
}
