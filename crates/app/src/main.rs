use std::io::Write as _;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use imulog_foundation::{real_clock, AppError, CancelFlag, SessionError};
use imulog_link::{discover, link::open_default, run_session, CaptureConfig, CsvSink, SessionReport};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[derive(Parser, Debug)]
#[command(name = "imulog", about = "Record IMU sensor sessions over a serial link")]
struct Cli {
    /// Serial device path; skips the discovery heuristics
    #[arg(long, env = "IMULOG_DEVICE")]
    device: Option<String>,

    /// Hard recording ceiling in seconds
    #[arg(long, default_value_t = 120)]
    max_secs: u64,

    /// Directory for rolling log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn init_logging(log_dir: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "imulog.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(guard);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_dir).map_err(|e| anyhow::anyhow!("logging init failed: {}", e))?;
    tracing::info!("Starting imulog");

    // Ctrl-C raises the interrupt flag; an in-progress session is then
    // cancelled and joined so it finalizes before the process exits.
    let interrupt = CancelFlag::new();
    {
        let interrupt = interrupt.clone();
        ctrlc::set_handler(move || interrupt.cancel())
            .map_err(|e| anyhow::anyhow!("failed to install interrupt handler: {}", e))?;
    }

    let cfg = CaptureConfig {
        max_duration: Duration::from_secs(cli.max_secs),
        ..Default::default()
    };

    // Single owner of stdin for the whole process; the menu and the
    // recording-time cancellation both consume lines from this channel.
    let input_rx = spawn_stdin_reader();

    loop {
        if interrupt.is_cancelled() {
            tracing::info!("Interrupted");
            break;
        }
        println!();
        println!("==================================================");
        println!("Main menu:");
        println!("  1. Start new recording session");
        println!("  2. Quit");
        print!("\nEnter choice (1-2): ");
        let _ = std::io::stdout().flush();

        // None means quit: interrupted or stdin closed
        let Some(choice) = read_input(&input_rx, &interrupt) else {
            break;
        };

        match choice.trim() {
            "1" => match record_once(cli.device.as_deref(), &input_rx, &interrupt, cfg) {
                Ok(()) => {}
                Err(AppError::ShutdownRequested) => break,
                Err(e) => {
                    tracing::error!("Session failed: {}", e);
                    println!("Session failed: {}", e);
                }
            },
            "2" => break,
            other => println!("Invalid choice '{}'. Please enter 1 or 2.", other),
        }
    }

    tracing::info!("Goodbye");
    Ok(())
}

/// One full recording session: prompt for a destination, connect, run the
/// session on a worker thread, and relay operator input and interrupts to
/// the cancellation channel while it runs.
fn record_once(
    device: Option<&str>,
    input_rx: &Receiver<String>,
    interrupt: &CancelFlag,
    cfg: CaptureConfig,
) -> Result<(), AppError> {
    let path = prompt_filename(input_rx, interrupt)?;

    let link = match device {
        Some(path) => open_default(path)?,
        None => discover()?,
    };
    tracing::info!("Using serial device {}", link.path());

    let (cancel_tx, cancel_rx) = unbounded();
    let clock = real_clock();
    let sink_path = path.clone();
    let worker = thread::Builder::new()
        .name("session".to_string())
        .spawn(move || run_session(link, move || CsvSink::create(&sink_path), cancel_rx, clock, cfg))
        .map_err(|e| AppError::Fatal(format!("failed to spawn session thread: {}", e)))?;

    println!("Recording to {} - press 'q' then ENTER to stop", path.display());
    println!(
        "Maximum recording time: {:.1} minutes",
        cfg.max_duration.as_secs_f64() / 60.0
    );

    watch_for_cancel(input_rx, &cancel_tx, &worker, interrupt);
    drop(cancel_tx);

    let report = worker
        .join()
        .map_err(|_| AppError::Fatal("session thread panicked".to_string()))??;

    println!("Recording completed!");
    println!("  Samples collected: {}", report.samples);
    println!("  Duration: {:.1} seconds", report.elapsed.as_secs_f64());
    println!("  Average sample rate: {:.1} Hz", report.rate_hz);
    Ok(())
}

/// Relay operator `q` lines and the interrupt flag to the session's
/// cancellation channel until the worker finishes. The worker owns
/// finalization, so this never returns before the session has stopped the
/// device and closed the sink.
fn watch_for_cancel(
    input_rx: &Receiver<String>,
    cancel_tx: &Sender<()>,
    worker: &thread::JoinHandle<Result<SessionReport, SessionError>>,
    interrupt: &CancelFlag,
) {
    let mut cancel_sent = false;
    let request_cancel = |message: &str, cancel_sent: &mut bool| {
        if !*cancel_sent {
            println!("{}", message);
            let _ = cancel_tx.send(());
            *cancel_sent = true;
        }
    };

    while !worker.is_finished() {
        if interrupt.is_cancelled() {
            request_cancel("Interrupted, stopping recording...", &mut cancel_sent);
        }
        match input_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                request_cancel("Stopping recording...", &mut cancel_sent);
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                // stdin gone; cancel and keep waiting for finalization
                request_cancel("Input closed, stopping recording...", &mut cancel_sent);
                thread::sleep(Duration::from_millis(200));
            }
        }
    }
}

/// Blocking line read that stays responsive to the interrupt flag.
/// `None` means the operator is done: interrupted or stdin closed.
fn read_input(input_rx: &Receiver<String>, interrupt: &CancelFlag) -> Option<String> {
    loop {
        if interrupt.is_cancelled() {
            return None;
        }
        match input_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(line) => return Some(line),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}

fn prompt_filename(
    input_rx: &Receiver<String>,
    interrupt: &CancelFlag,
) -> Result<PathBuf, AppError> {
    loop {
        print!("\nEnter filename (e.g. session01.csv): ");
        let _ = std::io::stdout().flush();
        let line = read_input(input_rx, interrupt).ok_or(AppError::ShutdownRequested)?;
        let name = line.trim();
        if name.is_empty() {
            println!("Please enter a filename.");
            continue;
        }
        let mut name = name.to_string();
        if !name.ends_with(".csv") {
            name.push_str(".csv");
        }
        let path = PathBuf::from(name);
        if path.exists() {
            print!("File {} exists. Overwrite? (y/n): ", path.display());
            let _ = std::io::stdout().flush();
            let answer = read_input(input_rx, interrupt).ok_or(AppError::ShutdownRequested)?;
            if !answer.trim().eq_ignore_ascii_case("y") {
                continue;
            }
        }
        return Ok(path);
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    let spawned = thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("Failed to spawn stdin reader: {}", e);
    }
    rx
}
