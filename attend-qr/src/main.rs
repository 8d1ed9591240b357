//! QR attendance capture (attend-qr) - command-line front end
//!
//! Issues QR sessions, scans codes from a keyboard-wedge reader, records
//! manual marks and browses the directory and attendance logs.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use attend_common::config::{ConfigResolver, LoggingConfig, TomlConfig};
use attend_common::events::{AttendanceEvent, EventBus, ScanState};
use attend_common::types::{LogFilters, PersonCandidate};
use attend_common::{time, CampusId, SubjectType};
use attend_qr::lookup::search_directory;
use attend_qr::scan::wedge::{StdinDecoderLoader, WedgeCamera};
use attend_qr::scan::DetectorSet;
use attend_qr::{
    AttendanceLogs, AttendanceSubmitter, DirectoryLookup, HttpBackend, ManualEntry, PayloadFormat, PayloadParser,
    RoleVocabulary, ScanLoop, ScanPipeline, SessionIssuer, StaticCampus,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EVENT_BUS_CAPACITY: usize = 100;
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Command-line arguments for attend-qr
#[derive(Parser, Debug)]
#[command(name = "attend-qr")]
#[command(about = "QR-code attendance capture")]
#[command(version)]
struct Args {
    /// Config file (overrides ATTEND_CONFIG and the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Attendance backend base URL
    #[arg(long, env = "ATTEND_BACKEND_URL")]
    backend_url: Option<String>,

    /// Active campus; marks are refused without one
    #[arg(long, env = "ATTEND_CAMPUS_ID")]
    campus: Option<String>,

    /// Bearer token for the attendance backend
    #[arg(long, env = "ATTEND_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue a new QR session and print its payload
    Session {
        /// Role token; configured vocabulary or student/staff
        #[arg(long, default_value = "student")]
        subject: String,

        /// Lifetime in minutes; blank, non-numeric or non-positive uses the default
        #[arg(long)]
        expires: Option<String>,
    },

    /// Scan codes from a keyboard-wedge reader until Ctrl+C or end of input
    Scan {
        /// Subject type for codes that do not name one
        #[arg(long)]
        subject: Option<String>,
    },

    /// Record one attendance mark by hand
    Mark {
        /// Scanned or typed code text
        code: Option<String>,

        #[arg(long)]
        person_id: Option<String>,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        subject: Option<String>,
    },

    /// Search the student or staff directory
    ///
    /// Without a term, each line read from stdin replaces the search text
    /// and results are shown as they settle.
    Search {
        term: Option<String>,

        #[arg(long, default_value = "student")]
        subject: String,
    },

    /// List recorded attendance
    Logs {
        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        person_id: Option<i64>,

        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day, YYYY-MM-DD
        #[arg(long)]
        to: Option<NaiveDate>,

        #[arg(long)]
        limit: Option<u32>,
    },

    /// Print the code text for a person's badge
    Badge {
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = "student")]
        subject: String,

        #[arg(long, default_value = "labeled")]
        format: PayloadFormat,
    },
}

fn main() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(async_main());

    // A blocked stdin read would otherwise hold shutdown until the next line
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn async_main() -> Result<()> {
    let args = Args::parse();

    // Config warnings go to stderr before the configured subscriber exists
    let bootstrap = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .finish();
    let mut config = tracing::subscriber::with_default(bootstrap, || {
        ConfigResolver::new(args.config.clone()).load()
    })
    .context("Failed to load configuration")?;

    apply_overrides(&mut config, &args);
    init_tracing(&config.logging)?;

    info!(
        "Starting attend-qr v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("ATTEND_GIT_HASH"),
        env!("ATTEND_BUILD_TIMESTAMP"),
        env!("ATTEND_BUILD_PROFILE")
    );
    info!("Attendance backend: {}", config.backend.base_url);

    run(args.command, config).await
}

fn apply_overrides(config: &mut TomlConfig, args: &Args) {
    if let Some(url) = &args.backend_url {
        config.backend.base_url = url.clone();
    }
    if let Some(campus) = &args.campus {
        config.backend.campus_id = Some(campus.clone());
    }
    if let Some(token) = &args.api_token {
        config.backend.api_token = Some(token.clone());
    }
}

/// Tracing to stderr, or to the configured log file; RUST_LOG wins over the config level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid log level: {}", logging.level))?;

    let file_layer = match &logging.file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };
    let stderr_layer = logging
        .file
        .is_none()
        .then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

async fn run(command: Command, config: TomlConfig) -> Result<()> {
    let events = EventBus::new(EVENT_BUS_CAPACITY);
    let backend = Arc::new(
        HttpBackend::new(&config.backend).context("Failed to initialize attendance backend")?,
    );
    let parser = PayloadParser::new(RoleVocabulary::from_config(&config.vocabulary))
        .context("Invalid role vocabulary")?;
    let campus = config.backend.campus_id.as_deref().and_then(CampusId::new);
    let vocabulary = parser.vocabulary().clone();
    let subject_arg = |token: &str| -> Result<SubjectType> {
        vocabulary
            .resolve_subject(token)
            .ok_or_else(|| anyhow!("Unknown subject type: {}", token))
    };

    match command {
        Command::Session { subject, expires } => {
            let subject = subject_arg(&subject)?;
            let issuer = SessionIssuer::new(backend, config.session.default_expiry_minutes, events);
            let descriptor = issuer
                .create_session_from_input(subject, expires.as_deref())
                .await?;

            let remaining = descriptor.remaining(time::now()).num_seconds();
            println!("{}", descriptor.payload);
            println!(
                "{} session expires at {} (in {})",
                descriptor.subject_type,
                descriptor.expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
                time::format_countdown(remaining)
            );
        }

        Command::Scan { subject } => {
            let fallback_subject = match subject {
                Some(token) => subject_arg(&token)?,
                None => config.scan.default_subject,
            };
            if campus.is_none() {
                warn!("No campus selected; scanned codes will be rejected");
            }

            let pipeline = ScanPipeline {
                parser: Arc::new(parser),
                submitter: Arc::new(AttendanceSubmitter::new(backend, events.clone())),
                campus: Arc::new(StaticCampus::new(campus)),
                fallback_subject,
            };
            let printer = tokio::spawn(print_scan_events(events.subscribe()));
            let mut scan_loop = ScanLoop::new(
                Arc::new(WedgeCamera),
                DetectorSet::fallback(Arc::new(StdinDecoderLoader))
                    .with_poll_interval(config.scan.poll_interval()),
                pipeline,
                events,
            );

            scan_loop.start().await?;
            println!("Scanning ({} by default). Press Ctrl+C to stop.", fallback_subject);

            let mut state = scan_loop.subscribe_state();
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = state.wait_for(|s| *s == ScanState::Stopped) => {}
            }
            scan_loop.stop().await;

            // Every bus sender is gone once the loop is dropped
            drop(scan_loop);
            let _ = printer.await;
        }

        Command::Mark {
            code,
            person_id,
            name,
            subject,
        } => {
            let entry = ManualEntry {
                subject_type: subject.as_deref().map(subject_arg).transpose()?,
                person_id: person_id.unwrap_or_default(),
                person_name: name.unwrap_or_default(),
                code: code.unwrap_or_default(),
            };
            let intent = entry.to_intent(&parser, config.scan.default_subject);
            let submitter = AttendanceSubmitter::new(backend, events);
            let receipt = submitter.submit(&intent, campus.as_ref()).await?;

            println!(
                "Marked {} {} present at {}",
                receipt.subject_type,
                receipt.person_id,
                receipt.marked_at.format("%H:%M:%S")
            );
        }

        Command::Search { term, subject } => {
            let subject = subject_arg(&subject)?;
            match term {
                Some(term) => {
                    print_candidates(&search_directory(backend.as_ref(), subject, &term).await);
                }
                None => {
                    let settle = config.lookup.debounce()
                        + Duration::from_secs(config.backend.timeout_secs);
                    let lookup = DirectoryLookup::new(backend, config.lookup.debounce(), events);
                    interactive_search(lookup, subject, settle).await?;
                }
            }
        }

        Command::Logs {
            subject,
            person_id,
            from,
            to,
            limit,
        } => {
            let filters = LogFilters {
                subject_type: subject.as_deref().map(subject_arg).transpose()?,
                person_id,
                from,
                to,
                limit,
            };
            let logs = AttendanceLogs::new(backend).list(&filters).await?;
            if logs.is_empty() {
                println!("No attendance recorded");
            }
            for log in logs {
                println!(
                    "{}\t{}\t{}\t{}\t{:?}",
                    log.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    log.subject_type,
                    log.person_id,
                    log.person_name.as_deref().unwrap_or("-"),
                    log.status
                );
            }
        }

        Command::Badge {
            id,
            name,
            subject,
            format,
        } => {
            let subject = subject_arg(&subject)?;
            println!("{}", parser.render(subject, id, name.as_deref(), format));
        }
    }

    Ok(())
}

fn print_candidates(candidates: &[PersonCandidate]) {
    if candidates.is_empty() {
        println!("No matches");
    }
    for candidate in candidates {
        println!(
            "{}\t{}\t{}",
            candidate.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            candidate.name.as_deref().unwrap_or("-"),
            candidate.secondary_label.as_deref().unwrap_or("")
        );
    }
}

/// Search-as-you-type over stdin lines until end of input or Ctrl+C
async fn interactive_search(
    mut lookup: DirectoryLookup,
    subject: SubjectType,
    settle: Duration,
) -> Result<()> {
    let mut results = lookup.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut latest = 0;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    println!("Type a name or id, one search per line. Ctrl+D to finish.");
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                lookup.cancel();
                return Ok(());
            }
            line = lines.next_line() => match line.context("Failed to read search input")? {
                Some(text) => latest = lookup.on_input(subject, &text),
                None => break,
            },
            changed = results.changed() => {
                if changed.is_err() {
                    break;
                }
                let result = results.borrow_and_update().clone();
                println!("[{}]", result.term);
                print_candidates(&result.candidates);
            }
        }
    }

    // Show the last search if it was still settling at end of input
    if latest > 0 && results.borrow().sequence != latest {
        let settled = tokio::time::timeout(settle, results.wait_for(|r| r.sequence == latest))
            .await
            .ok()
            .and_then(|r| r.ok().map(|result| result.clone()));
        if let Some(result) = settled {
            println!("[{}]", result.term);
            print_candidates(&result.candidates);
        }
    }
    lookup.cancel();
    Ok(())
}

/// User-facing feedback for a scan run
async fn print_scan_events(mut rx: broadcast::Receiver<AttendanceEvent>) {
    loop {
        match rx.recv().await {
            Ok(AttendanceEvent::AttendanceMarked {
                subject_type,
                person_id,
                person_name,
                ..
            }) => match person_name {
                Some(name) => println!("Marked {} {} ({}) present", subject_type, person_id, name),
                None => println!("Marked {} {} present", subject_type, person_id),
            },
            Ok(AttendanceEvent::SubmissionFailed { raw_code, message, .. }) => {
                println!("Not marked [{}]: {}", raw_code, message);
            }
            Ok(AttendanceEvent::ScanFailed { message, .. }) => {
                println!("Scanner stopped: {}", message);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Feedback lagged, {} events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping");
        },
    }
}
