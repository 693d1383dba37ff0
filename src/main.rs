use clap::{Parser, Subcommand};
use nfspect::config;
use nfspect::inspect::LogInspector;
use nfspect::queue::{QueueConfig, Session};
use nfspect::telemetry::{init_logging, MetricsRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "nfspect")]
#[command(about = "Userspace packet interception over kernel packet queues")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bind the configured queues and process packets
    Run {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Stop after this many seconds (run forever if omitted)
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Validate config.toml without binding anything
    Check {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { config, duration }) => {
            if let Err(e) = cmd_run(&config, duration.map(Duration::from_secs)) {
                eprintln!("[ERROR] {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Check { config }) => {
            if let Err(e) = cmd_check(&config) {
                eprintln!("[ERROR] {}", e);
                std::process::exit(1);
            }
        }
        None => {
            if let Err(e) = cmd_run(Path::new("config.toml"), None) {
                eprintln!("[ERROR] {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn load_or_default(config_path: &Path) -> Result<config::Config, String> {
    if !config_path.exists() {
        // No file: observe a single default queue.
        return Ok(config::Config {
            queue: vec![config::QueueSection {
                num: 0,
                max_packet_len: None,
                max_queue_len: None,
                copy_mode: config::CopyModeSetting::Packet,
                read_timeout_ms: None,
                write_timeout_ms: None,
            }],
            ..Default::default()
        });
    }

    let cfg =
        config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();
    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }

    Ok(cfg)
}

fn cmd_run(config_path: &Path, duration: Option<Duration>) -> Result<(), String> {
    use tokio::runtime::Runtime;
    use tokio::task::JoinSet;

    let cfg = load_or_default(config_path)?;
    init_logging(Some(&cfg.log.to_log_config()));

    if !config_path.exists() {
        info!(
            "{} not found, observing queue 0 with defaults",
            config_path.display()
        );
    }

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let metrics = Arc::new(MetricsRegistry::new());
        let mut tasks = JoinSet::new();

        for section in &cfg.queue {
            let queue_config = section.to_queue_config();
            let preview_limit = cfg.inspect.payload_preview;
            let registry = metrics.clone();
            tasks.spawn(async move {
                drive_queue(queue_config, preview_limit, registry, duration).await;
            });
        }

        info!("processing packets on {} queue(s)...", cfg.queue.len());

        let interrupted = tokio::select! {
            _ = tokio::signal::ctrl_c() => true,
            _ = async { while tasks.join_next().await.is_some() {} } => false,
        };

        if interrupted {
            info!("interrupted, shutting down");
            tasks.shutdown().await;
        } else {
            info!("all queue sessions finished");
        }

        for (name, value) in metrics.export() {
            info!("{} = {}", name, value);
        }

        Ok(())
    })
}

/// Keeps one queue bound until `duration` elapses, rebinding with backoff
/// after session failures.
async fn drive_queue(
    config: QueueConfig,
    preview_limit: usize,
    metrics: Arc<MetricsRegistry>,
    duration: Option<Duration>,
) {
    const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
    const MAX_BACKOFF: Duration = Duration::from_secs(30);

    let queue = config.queue_num;
    let started = tokio::time::Instant::now();
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let deadline = match duration {
            Some(total) => {
                let remaining = total.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return;
                }
                Some(remaining)
            }
            None => None,
        };

        let mut session = match Session::open(config.clone()) {
            Ok(session) => {
                backoff = INITIAL_BACKOFF;
                session
            }
            Err(err) => {
                error!(queue, %err, "bind failed, retrying in {:?}", backoff);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        metrics.attach(queue, session.stats());
        info!(queue, "session started");

        let mut inspector = LogInspector { preview_limit };
        match session.run(deadline, &mut inspector).await {
            Ok(()) => {
                info!(queue, "session deadline reached");
                return;
            }
            Err(err) => {
                warn!(queue, %err, "session ended, rebinding in {:?}", backoff);
            }
        }

        drop(session); // releases the queue before rebinding
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

fn cmd_check(config_path: &Path) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}
