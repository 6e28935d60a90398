//! CLI entry point for `lostphotosfound`.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use lostphotosfound::config::{self, ConfigState, ConfigStore, GmailConfig};
use lostphotosfound::export::attachment::AttachmentExtractor;
use lostphotosfound::imap::{ImapConnection, ATTACHMENT_QUERY};
use lostphotosfound::pipeline::{self, Event, RunSummary};

/// Save every image attachment in a Gmail account to disk.
#[derive(Parser)]
#[command(name = "lostphotosfound", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (default: ~/.lostphotosfound/config)
    #[arg(short, long, value_name = "FILE", env = "LOSTPHOTOSFOUND_CONFIG")]
    config: Option<PathBuf>,

    /// Directory in which the per-account folder is created
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        None => {}
    }

    let config_path = match cli.config {
        Some(path) => path,
        None => config::config_file_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine the home directory"))?,
    };

    let bootstrap_level = verbosity_level(cli.verbose).unwrap_or("warn");
    let store = match open_config(&config_path, bootstrap_level, std::io::stderr)? {
        ConfigState::Ready(store) => store,
        ConfigState::Created(path) => {
            println!("\nPlease edit your config file {}\n", path.display());
            std::process::exit(config::EXIT_CONFIG_NOT_READY);
        }
    };

    let general = store.general();
    let log_level = verbosity_level(cli.verbose).unwrap_or(general.log_level.as_str());
    setup_logging(log_level, store.path().parent());

    let gmail = store.gmail()?;
    let output_root = cli
        .output
        .or(general.output_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    cmd_run(&gmail, &output_root, cli.json)
}

/// Log level picked by `-v` flags, if any were given.
fn verbosity_level(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}

/// Open the configuration under a temporary subscriber; the global one needs
/// the `log_level` read from that same file.
fn open_config<W>(
    path: &Path,
    level: &str,
    make_writer: W,
) -> lostphotosfound::error::Result<ConfigState>
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::with_default(subscriber, || ConfigStore::open(path))
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, log_dir: Option<&Path>) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match log_dir.filter(|dir| dir.is_dir()) {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::never(dir, "lostphotosfound.log");
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "lostphotosfound", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::stdout().write_all(&buf)?;
    Ok(())
}

/// Connect, search All Mail and save every matching attachment.
fn cmd_run(gmail: &GmailConfig, output_root: &Path, json: bool) -> anyhow::Result<()> {
    let connection = ImapConnection::connect(&gmail.host)?;
    let mut session = connection.login(&gmail.username, &gmail.password)?;
    let mut extractor = AttachmentExtractor::for_account(output_root, &gmail.username);

    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} Fetching [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
        .progress_chars("#>-");
    pb.set_style(style);

    // With --json, stdout carries only the summary.
    let emit = |line: String| {
        pb.suspend(|| {
            if json {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        })
    };

    let result = pipeline::run(&mut session, &mut extractor, |event| match event {
        Event::Matched { count } => {
            pb.set_length(count as u64);
            emit(format!(
                "LOG: {count} messages matched the search criteria {ATTACHMENT_QUERY}"
            ));
        }
        Event::Fetching { current, .. } => pb.set_position(current as u64),
        Event::Message(report) => emit(format!("[{}]: {}", report.from, report.subject)),
        Event::Attachment(outcome) => emit(format!("\t...{}", outcome.filename)),
        Event::Skipped { uid, reason } => {
            pb.suspend(|| eprintln!("  Skipped message {uid}: {reason}"));
        }
    });
    pb.finish_and_clear();

    if let Err(e) = session.close() {
        tracing::warn!(error = %e, "Failed to close the IMAP session cleanly");
    }

    let summary = result?;
    write_report(
        &summary,
        extractor.output_dir(),
        json,
        &mut std::io::stdout(),
        &mut std::io::stderr(),
    )
}

/// Print the run totals to `out` and finish with `All done!`.
///
/// With `json` the summary is a JSON document and the closing line goes to
/// `status` so `out` stays machine-readable.
fn write_report(
    summary: &RunSummary,
    output_dir: &Path,
    json: bool,
    out: &mut dyn Write,
    status: &mut dyn Write,
) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(summary)?)?;
        writeln!(status, "All done!")?;
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "  {:<25} {}", "Messages matched", summary.matched)?;
    writeln!(out, "  {:<25} {}", "Messages processed", summary.processed)?;
    if summary.skipped > 0 {
        writeln!(out, "  {:<25} {}", "Messages skipped", summary.skipped)?;
    }
    writeln!(out, "  {:<25} {}", "Attachments saved", summary.written)?;
    writeln!(out, "  {:<25} {}", "Already downloaded", summary.already_present)?;
    if summary.empty > 0 {
        writeln!(out, "  {:<25} {}", "Empty attachments", summary.empty)?;
    }
    writeln!(
        out,
        "  {:<25} {}",
        "Written",
        format_size(summary.bytes_written, BINARY)
    )?;
    writeln!(out, "  {:<25} {}", "Output directory", output_dir.display())?;
    writeln!(out)?;
    writeln!(out, "All done!")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn test_config_events_are_logged() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config");

        let first = Captured::default();
        let writer = first.clone();
        let state = open_config(&path, "info", move || writer.clone()).unwrap();
        assert!(matches!(state, ConfigState::Created(_)));
        assert!(first.text().contains("Wrote config template"));

        let second = Captured::default();
        let writer = second.clone();
        let state = open_config(&path, "info", move || writer.clone()).unwrap();
        assert!(matches!(state, ConfigState::Ready(_)));
        assert!(second.text().contains("Loaded config"));
    }

    #[test]
    fn test_report_ends_with_all_done() {
        let summary = RunSummary {
            matched: 2,
            processed: 2,
            written: 3,
            bytes_written: 2048,
            ..RunSummary::default()
        };

        let (mut out, mut status) = (Vec::new(), Vec::new());
        write_report(&summary, Path::new("bob@gmail.com"), false, &mut out, &mut status).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("2 KiB"));
        assert!(text.trim_end().ends_with("All done!"));
        assert!(status.is_empty());

        let (mut out, mut status) = (Vec::new(), Vec::new());
        write_report(&summary, Path::new("bob@gmail.com"), true, &mut out, &mut status).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["written"], 3);
        assert_eq!(String::from_utf8(status).unwrap(), "All done!\n");
    }

    #[test]
    fn test_verbosity_level() {
        assert_eq!(verbosity_level(0), None);
        assert_eq!(verbosity_level(1), Some("info"));
        assert_eq!(verbosity_level(2), Some("debug"));
        assert_eq!(verbosity_level(7), Some("trace"));
    }
}
