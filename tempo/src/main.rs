use std::env;
use std::error::Error;
use std::io::{self, BufRead};
use std::thread;

use clap::ArgMatches;
use serde_json::Value;
use tempo_core::config::ENV_INGRESS_OBJECT;
use tempo_core::{
    Diagnostic, DisorderPolicy, IngressConfig, IngressForwarder, IngressPipeline,
    PunctuationPolicy, RawEvent,
};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod cmdline;
mod setup_tracing;

const CHANNEL_SIZE: usize = 500;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing::register();

    if let Err(e) = run().await {
        error!("{e:?}");
        return Err(e);
    }
    info!("Exiting...");

    Ok(())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let matches = cmdline::root_cli().get_matches();
    match matches.subcommand() {
        Some((cmdline::REORDER, args)) => reorder(ingress_config(args)?).await,
        other => Err(format!("Unknown subcommand {:?}", other.map(|(name, _)| name)).into()),
    }
}

/// Builds the config from [ENV_INGRESS_OBJECT] when it is set, from the flags otherwise.
fn ingress_config(args: &ArgMatches) -> Result<IngressConfig, Box<dyn Error>> {
    if env::var(ENV_INGRESS_OBJECT).is_ok() {
        info!("Loading ingress config from {ENV_INGRESS_OBJECT}");
        return Ok(IngressConfig::load(env::vars())?);
    }

    let lag = args
        .get_one::<u64>(cmdline::ARG_LAG)
        .copied()
        .unwrap_or_default();
    let disorder = match args.get_one::<String>(cmdline::ARG_POLICY).map(String::as_str) {
        Some("drop") | None => DisorderPolicy::Drop(lag),
        Some("throw") => DisorderPolicy::Throw(lag),
        Some("adjust") => DisorderPolicy::Adjust(lag),
        Some(other) => return Err(format!("Unknown disorder policy {other}").into()),
    };
    let punctuation = args
        .get_one::<u64>(cmdline::ARG_PERIOD)
        .copied()
        .map_or(PunctuationPolicy::None, PunctuationPolicy::Periodic);

    let mut config = IngressConfig::new(disorder)
        .with_punctuation(punctuation)
        .with_diagnostics(args.get_flag(cmdline::ARG_DIAGNOSTICS));
    if let Some(name) = args.get_one::<String>(cmdline::ARG_NAME) {
        config = config.with_name(name.as_str());
    }
    config.validate()?;
    Ok(config)
}

async fn reorder(config: IngressConfig) -> Result<(), Box<dyn Error>> {
    let cancel = CancellationToken::new();
    let (input_tx, input_rx) = mpsc::channel(CHANNEL_SIZE);
    let (output_tx, mut output_rx) = mpsc::channel(CHANNEL_SIZE);
    let (diagnostics_tx, diagnostics_rx) = mpsc::channel(CHANNEL_SIZE);

    let subscribed = config.diagnostics;
    let pipeline = IngressPipeline::<Value>::new(config)?;
    let forwarder = IngressForwarder::new(pipeline, output_tx, cancel.clone());
    let forwarder = if subscribed {
        forwarder.with_diagnostics(diagnostics_tx)
    } else {
        drop(diagnostics_tx);
        forwarder
    };

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, closing the pipeline");
            shutdown.cancel();
        }
    });

    // A blocked stdin read cannot be cancelled. It runs on a detached thread so that neither a
    // fatal error nor an interrupt has to wait for the upstream to write or close stdin.
    let (read_done_tx, read_done_rx) = oneshot::channel();
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let result = read_events(io::stdin().lock(), &input_tx);
            // the receiver is gone when the run already ended
            let _ = read_done_tx.send(result);
        })?;

    let diagnostics_logger = tokio::spawn(log_diagnostics(diagnostics_rx));
    let forwarder_handle = forwarder.start(ReceiverStream::new(input_rx));

    let mut stdout = tokio::io::stdout();
    let mut written = 0usize;
    while let Some(event) = output_rx.recv().await {
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
        written += 1;
    }
    stdout.flush().await?;

    forwarder_handle.await??;
    let diagnostics = diagnostics_logger.await?;

    // after an interrupt the reader may still be blocked on stdin
    let read = if cancel.is_cancelled() {
        None
    } else {
        Some(read_done_rx.await??)
    };

    info!(?read, written, diagnostics, "Reorder completed");
    debug!(metrics = %tempo_core::metrics_text()?, "Ingress metrics");
    Ok(())
}

/// Reads one JSON event per line till EOF, or till the forwarder stops taking events. Blank lines
/// are ignored and lines that do not parse are skipped. Returns the number of events sent.
fn read_events(
    reader: impl BufRead,
    input_tx: &mpsc::Sender<RawEvent<Value>>,
) -> Result<usize, String> {
    let mut read = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("Failed to read stdin: {e}"))?;
        if line.trim().is_empty() {
            continue;
        }

        let event: RawEvent<Value> = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line_number = index + 1, ?e, "Skipping malformed event");
                continue;
            }
        };
        if input_tx.blocking_send(event).is_err() {
            // the forwarder stopped
            break;
        }
        read += 1;
    }
    Ok(read)
}

/// Logs every diagnostic till the forwarder drops its sender, returns how many were logged.
async fn log_diagnostics(mut diagnostics_rx: mpsc::Receiver<Diagnostic<Value>>) -> usize {
    let mut logged = 0usize;
    while let Some(diagnostic) = diagnostics_rx.recv().await {
        let event = &diagnostic.event;
        if diagnostic.is_drop() {
            warn!(start_time = event.start_time, end_time = ?event.end_time,
                payload = %event.payload, "Dropped late event");
        } else {
            warn!(start_time = event.start_time, end_time = ?event.end_time,
                time_adjustment = ?diagnostic.time_adjustment, payload = %event.payload,
                "Adjusted late event");
        }
        logged += 1;
    }
    logged
}
