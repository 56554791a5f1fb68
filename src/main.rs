//! MedGuard: admin session client
//!
//! Runs the admin session countdown in the terminal and wraps the backend API
//! for batch registration, verification and counterfeit reports.

use clap::Parser;
use medguard::activity::{self, ActivityMonitor};
use medguard::api::{ApiClient, ApiError, BatchRegistration, CounterfeitReport};
use medguard::config::{self, Config};
use medguard::navigator::{BrowserNavigator, LOGIN_ROUTE, Navigator, route_url};
use medguard::scanner::{LineFeedEngine, ScanOutcome, scan_and_open};
use medguard::timer::{SessionEnd, SessionTimer};
use medguard::view::{Notice, NoticeLevel, TerminalView};
use medguard::{ActivityKind, SessionEvent, SessionSignal, ipc, server};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "medguard", about = "MedGuard drug batch verification client")]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Backend base URL (overrides the config file)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the admin session timer in this terminal
    Session,
    /// Report user activity to the running session
    Activity {
        #[arg(long, value_enum, default_value = "click")]
        kind: ActivityKind,
    },
    /// Answer the expiry warning: ping the backend and reset the session
    Stay,
    /// Wait for the running session to expire
    Watch,
    /// Register a drug batch and save its QR code
    Register {
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        batch_number: String,
        /// Manufacturing date (YYYY-MM-DD)
        #[arg(long, default_value = "")]
        mfg_date: String,
        /// Expiry date (YYYY-MM-DD)
        #[arg(long, default_value = "")]
        expiry_date: String,
        #[arg(long, default_value = "")]
        manufacturer: String,
        /// Where to write the PNG (default: <batch_number>.png)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check a batch number inline
    Verify { batch_number: String },
    /// Open the verification page for a batch number
    Open { batch_number: String },
    /// Read decoded QR text from stdin and open its verification page
    Scan,
    /// Report a suspected counterfeit
    Report {
        #[arg(long, default_value = "")]
        batch_number: String,
        #[arg(long, default_value = "")]
        drug_name: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Mark a counterfeit report as checked
    MarkChecked { report_id: String },
    /// Show the config, optionally saving a new server URL
    Config {
        #[arg(long)]
        server_url: Option<String>,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_env("MEDGUARD_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = config::load_config();
    if let Some(server) = &cli.server {
        config.server_url = server.clone();
    }

    match cli.command {
        Command::Activity { kind } => send_events(&[SessionEvent::Activity { kind }]),
        Command::Stay => send_events(&[SessionEvent::StayLoggedIn]),
        Command::Watch => watch(),
        Command::Config { server_url } => show_config(server_url),
        command => {
            let api = match ApiClient::from_base_str(&config.server_url) {
                Ok(api) => api,
                Err(e) => return show(Notice::error(e.to_string())),
            };
            block_on(run(command, config, api))
        }
    }
}

/// Run a command to completion, then shut down without waiting on blocking
/// reads that are still parked on stdin.
fn block_on(future: impl Future<Output = ExitCode>) -> ExitCode {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => {
            let code = rt.block_on(future);
            rt.shutdown_background();
            code
        }
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: Config, api: ApiClient) -> ExitCode {
    match command {
        Command::Session => run_session(config, api).await,
        Command::Register {
            name,
            batch_number,
            mfg_date,
            expiry_date,
            manufacturer,
            out,
        } => {
            let batch = BatchRegistration {
                name,
                batch_number,
                mfg_date,
                expiry_date,
                manufacturer,
            };
            register(&api, &batch, out).await
        }
        Command::Verify { batch_number } => verify(&api, &batch_number).await,
        Command::Open { batch_number } => match api.verification_page(&batch_number) {
            Ok(url) => {
                if let Err(e) = BrowserNavigator.open_in_new_tab(url.as_str()) {
                    warn!("Failed to open {}: {}", url, e);
                }
                println!("{url}");
                ExitCode::SUCCESS
            }
            Err(e) => show(Notice::error(e.to_string())),
        },
        Command::Scan => scan(&api).await,
        Command::Report {
            batch_number,
            drug_name,
            location,
            note,
        } => {
            let report = CounterfeitReport {
                drug_name,
                batch_number,
                location,
                note,
            };
            submit_report(&api, &report).await
        }
        Command::MarkChecked { report_id } => mark_checked(&api, &report_id).await,
        Command::Activity { .. } | Command::Stay | Command::Watch | Command::Config { .. } => {
            ExitCode::SUCCESS
        }
    }
}

// ---------------------------------------------------------------------------
// Admin session
// ---------------------------------------------------------------------------

async fn run_session(config: Config, api: ApiClient) -> ExitCode {
    let settings = config.session;
    let login_url = route_url(api.base(), LOGIN_ROUTE);
    let navigator: Arc<dyn Navigator> = Arc::new(BrowserNavigator);

    let (timer, handle) =
        SessionTimer::new(settings, Arc::new(api), navigator, login_url.as_str());
    let timer = timer.with_view(Box::new(TerminalView::stdout()));
    let monitor = Arc::new(Mutex::new(ActivityMonitor::new(handle, &settings)));

    let task = timer.spawn();
    tokio::spawn(server::start(ipc::socket_path(), Arc::clone(&monitor)));
    let input = activity::spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    tokio::spawn(activity::forward_input(input, monitor));

    match task.await {
        Ok(SessionEnd::Expired) => {
            println!("Please log in again: {login_url}");
            ExitCode::SUCCESS
        }
        Ok(SessionEnd::Closed) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("session timer failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn send_events(events: &[SessionEvent]) -> ExitCode {
    let path = ipc::socket_path();
    match ipc::send(&path, events) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("session not running ({}): {}", path.display(), e);
            ExitCode::FAILURE
        }
    }
}

fn watch() -> ExitCode {
    let path = ipc::socket_path();
    match ipc::wait_for_signal(&path) {
        Ok(Some(SessionSignal::SessionExpired)) => {
            println!("session expired");
            ExitCode::SUCCESS
        }
        Ok(None) => {
            println!("session closed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("session not running ({}): {}", path.display(), e);
            ExitCode::FAILURE
        }
    }
}

// ---------------------------------------------------------------------------
// Request/response commands
// ---------------------------------------------------------------------------

fn show(notice: Notice) -> ExitCode {
    match notice.level {
        NoticeLevel::Success => {
            println!("{notice}");
            ExitCode::SUCCESS
        }
        NoticeLevel::Error => {
            eprintln!("{notice}");
            ExitCode::FAILURE
        }
    }
}

/// Default QR file name, with path separators removed from the batch number.
fn qr_file_name(batch_number: &str) -> PathBuf {
    PathBuf::from(format!("{}.png", batch_number.trim().replace(['/', '\\'], "_")))
}

async fn register(api: &ApiClient, batch: &BatchRegistration, out: Option<PathBuf>) -> ExitCode {
    match api.register_batch(batch).await {
        Ok(png) => {
            let path = out.unwrap_or_else(|| qr_file_name(&batch.batch_number));
            match tokio::fs::write(&path, &png).await {
                Ok(()) => {
                    info!(path = %path.display(), bytes = png.len(), "QR code saved");
                    show(Notice::success(format!(
                        "Batch registered. QR code saved to {}",
                        path.display()
                    )))
                }
                Err(e) => show(Notice::error(format!(
                    "Failed to save QR code to {}: {e}",
                    path.display()
                ))),
            }
        }
        Err(ApiError::Validation(e)) => show(Notice::error(e.to_string())),
        Err(e) => show(Notice::error(format!("Error registering batch: {e}"))),
    }
}

async fn verify(api: &ApiClient, batch_number: &str) -> ExitCode {
    match api.verify_batch(batch_number).await {
        Ok(result) => {
            println!("{}", result.status.label());
            if let Some(message) = result.message.filter(|m| !m.is_empty()) {
                println!("{message}");
            }
            ExitCode::SUCCESS
        }
        Err(ApiError::Validation(e)) => show(Notice::error(e.to_string())),
        Err(e) => {
            warn!("verify failed: {}", e);
            show(Notice::error("Error verifying batch"))
        }
    }
}

async fn scan(api: &ApiClient) -> ExitCode {
    let mut engine = LineFeedEngine::new(BufReader::new(tokio::io::stdin()));
    match scan_and_open(&mut engine, &BrowserNavigator, api.base()).await {
        ScanOutcome::Opened(url) => {
            println!("{url}");
            ExitCode::SUCCESS
        }
        ScanOutcome::Failed(notice) => show(notice),
        ScanOutcome::Stopped => ExitCode::SUCCESS,
    }
}

async fn submit_report(api: &ApiClient, report: &CounterfeitReport) -> ExitCode {
    match api.submit_report(report).await {
        Ok(message) => show(Notice::success(message)),
        Err(ApiError::Validation(e)) => show(Notice::error(e.to_string())),
        Err(e) => {
            warn!("report failed: {}", e);
            show(Notice::error("Error submitting report"))
        }
    }
}

async fn mark_checked(api: &ApiClient, report_id: &str) -> ExitCode {
    match api.mark_report_checked(report_id).await {
        Ok(true) => show(Notice::success("Checked")),
        Ok(false) => {
            warn!(%report_id, "server did not mark report as checked");
            ExitCode::SUCCESS
        }
        Err(e) => {
            warn!("Failed to mark report as checked: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn show_config(server_url: Option<String>) -> ExitCode {
    let mut config = config::load_config();
    if let Some(url) = server_url {
        if let Err(e) = ApiClient::from_base_str(&url) {
            return show(Notice::error(e.to_string()));
        }
        config.server_url = url;
        match config::save_config(&config) {
            Ok(path) => info!(path = %path.display(), "config saved"),
            Err(e) => return show(Notice::error(format!("Failed to save config: {e}"))),
        }
    }
    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => show(Notice::error(e.to_string())),
    }
}
