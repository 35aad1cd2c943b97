use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use services::{Clock, EngineConfig, GenerationClient, OpenAiCompatClient, SessionEngine};
use storage::{InMemorySessionStore, SessionRepository};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod server;

const DEFAULT_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_SWEEP_SECS: u64 = 300;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidAddr { raw: String },
    InvalidSweepSecs { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidAddr { raw } => write!(f, "invalid --addr value: {raw}"),
            ArgsError::InvalidSweepSecs { raw } => write!(f, "invalid --sweep-secs value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [--addr <host:port>] [--sweep-secs <n>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --addr {DEFAULT_ADDR}");
    eprintln!("  --sweep-secs {DEFAULT_SWEEP_SECS}");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  STUDY_ADDR, STUDY_SWEEP_SECS, STUDY_TOP_K, STUDY_SESSION_TTL_SECS");
    eprintln!("  STUDY_AI_API_KEY (or GROQ_API_KEY), STUDY_AI_BASE_URL, STUDY_AI_MODEL,");
    eprintln!("  STUDY_AI_TIMEOUT_SECS, RUST_LOG");
}

#[derive(Debug, PartialEq, Eq)]
struct Args {
    addr: SocketAddr,
    sweep_interval: Duration,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut addr =
            parse_addr(std::env::var("STUDY_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.into()))?;
        let mut sweep_interval = match std::env::var("STUDY_SWEEP_SECS") {
            Ok(raw) => parse_sweep_secs(raw)?,
            Err(_) => Duration::from_secs(DEFAULT_SWEEP_SECS),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--addr" => addr = parse_addr(require_value(args, "--addr")?)?,
                "--sweep-secs" => {
                    sweep_interval = parse_sweep_secs(require_value(args, "--sweep-secs")?)?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            addr,
            sweep_interval,
        })
    }
}

fn parse_addr(raw: String) -> Result<SocketAddr, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidAddr { raw })
}

fn parse_sweep_secs(raw: String) -> Result<Duration, ArgsError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ArgsError::InvalidSweepSecs { raw }),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("app=info,services=info,storage=info,tower_http=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Periodically drop sessions idle past the configured TTL.
fn spawn_sweeper(engine: Arc<SessionEngine>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let purged = engine.purge_expired().await;
            debug!(purged = purged.len(), "session sweep finished");
        }
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing();

    let clock = Clock::default_clock();
    let config = EngineConfig::from_env();
    let generation = OpenAiCompatClient::from_env()?;
    if !generation.enabled() {
        warn!("no STUDY_AI_API_KEY or GROQ_API_KEY set; every generation request will be rejected");
    }

    let sessions: Arc<dyn SessionRepository> = Arc::new(InMemorySessionStore::new(clock));
    let generation: Arc<dyn GenerationClient> = Arc::new(generation);
    let engine = Arc::new(SessionEngine::new(clock, config, sessions, generation));

    let sweeper = spawn_sweeper(Arc::clone(&engine), args.sweep_interval);

    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!(
        addr = %args.addr,
        top_k = config.retrieval_top_k,
        session_ttl_secs = config.session_ttl.num_seconds(),
        "study server listening"
    );
    axum::serve(listener, server::router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = args.iter().map(|s| (*s).to_string());
        Args::parse(&mut iter)
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(&["--addr", "0.0.0.0:9000", "--sweep-secs", "60"]).unwrap();
        assert_eq!(args.addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(args.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn missing_value_is_reported() {
        assert!(matches!(
            parse(&["--addr"]),
            Err(ArgsError::MissingValue { flag: "--addr" })
        ));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            parse(&["--addr", "localhost"]),
            Err(ArgsError::InvalidAddr { .. })
        ));
        assert!(matches!(
            parse(&["--sweep-secs", "0"]),
            Err(ArgsError::InvalidSweepSecs { .. })
        ));
        assert!(matches!(parse(&["--verbose"]), Err(ArgsError::UnknownArg(_))));
    }
}
