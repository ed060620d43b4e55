//! CLI entry point for `mimesplit`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};

use mimesplit::config::{self, Config, MissingBoundary};
use mimesplit::error::MimeError;
use mimesplit::export::sink::{DirectorySink, NullSink, PartSink};
use mimesplit::model::event::{Emission, Report};
use mimesplit::parser::message::{read_message_header, MessageSummary};
use mimesplit::parser::mime::{decode, top_level_boundary, DecodeOptions};

/// Size of the input read buffer (128 KB).
const READ_BUFFER_SIZE: usize = 128 * 1024;

/// Some parts failed or a branch was truncated.
const EXIT_PARTIAL: u8 = 1;
/// Nothing was extracted: bad message or unreadable input.
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(
    name = "mimesplit",
    version,
    about = "Explode a multipart MIME message into one decoded file per part"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Message file to split (stdin when omitted or "-")
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Directory receiving the decoded parts
    #[arg(short, long, global = true, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Deepest multipart nesting level to descend into
    #[arg(long, global = true, value_name = "N")]
    max_depth: Option<usize>,

    /// Fail multipart parts that lack a boundary instead of writing them as-is
    #[arg(long, global = true)]
    strict_boundary: bool,

    /// Decode everything but write nothing
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a message into decoded part files
    Extract {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Print the main headers of a message
    Headers {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config {
        /// Write the default configuration to the config path
        #[arg(long)]
        init: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = config::load_config();
    apply_overrides(&mut config, &cli);

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    let result = match cli.command {
        Some(Commands::Extract { file }) => {
            cmd_extract(file.or(cli.file).as_deref(), &config, cli.dry_run, cli.json)
        }
        Some(Commands::Headers { file }) => cmd_headers(file.or(cli.file).as_deref(), cli.json),
        Some(Commands::Config { init }) => cmd_config(&config, init),
        Some(Commands::Completions { shell }) => cmd_completions(shell),
        Some(Commands::Manpage) => cmd_manpage(),
        None => cmd_extract(cli.file.as_deref(), &config, cli.dry_run, cli.json),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("mimesplit: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Command-line flags win over the config file.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(ref dir) = cli.output {
        config.extract.output_dir = Some(dir.clone());
    }
    if let Some(depth) = cli.max_depth {
        config.extract.max_depth = depth;
    }
    if cli.strict_boundary {
        config.extract.missing_boundary = MissingBoundary::Fail;
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    let log_path = config::log_file_path(config);
    if config.general.log_to_file && std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender =
            tracing_appender::rolling::never(&log_dir, log_path.file_name().unwrap_or_default());
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Open the message file, or stdin for `None` / `-`.
fn open_input(path: Option<&Path>) -> anyhow::Result<Box<dyn BufRead>> {
    match path {
        Some(p) if p != Path::new("-") => {
            let file = File::open(p).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MimeError::FileNotFound(p.to_path_buf())
                } else {
                    MimeError::io(p, e)
                }
            })?;
            Ok(Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file)))
        }
        _ => Ok(Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            std::io::stdin().lock(),
        ))),
    }
}

/// Split a message into files and print the report.
fn cmd_extract(
    path: Option<&Path>,
    config: &Config,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let mut reader = open_input(path)?;
    let header = read_message_header(&mut reader).context("Failed to read message header")?;
    let message = MessageSummary::from_header(&header);
    if !json {
        print_message_summary(&message);
    }

    // Refuse before creating any output
    let boundary = top_level_boundary(header.first_value("content-type"))?;

    let output_dir = config
        .extract
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let mut sink: Box<dyn PartSink> = if dry_run {
        Box::new(NullSink)
    } else {
        Box::new(DirectorySink::create(&output_dir, config.extract.file_mode)?)
    };

    let options = DecodeOptions::from(&config.extract);
    let report = decode(reader, &boundary, sink.as_mut(), &options);

    if json {
        print_report_json(&message, &report, dry_run)?;
    } else {
        print_report_table(&report, &output_dir, dry_run);
    }

    Ok(if report.summary.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PARTIAL)
    })
}

/// Print only the main message headers.
fn cmd_headers(path: Option<&Path>, json: bool) -> anyhow::Result<ExitCode> {
    let mut reader = open_input(path)?;
    let header = read_message_header(&mut reader).context("Failed to read message header")?;
    let message = MessageSummary::from_header(&header);
    if json {
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        print_message_summary(&message);
    }
    Ok(ExitCode::SUCCESS)
}

/// Print the effective configuration, or write the defaults with `--init`.
fn cmd_config(config: &Config, init: bool) -> anyhow::Result<ExitCode> {
    if init {
        let path = config::save_config(&Config::default())?;
        println!("  Wrote default configuration to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(path) = config::config_file_path() {
        println!("# {}", path.display());
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(ExitCode::SUCCESS)
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<ExitCode> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mimesplit", &mut std::io::stdout());
    Ok(ExitCode::SUCCESS)
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<ExitCode> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(ExitCode::SUCCESS)
}

fn print_message_summary(message: &MessageSummary) {
    println!();
    println!("  {:<14} {}", "From:", message.from);
    println!("  {:<14} {}", "To:", message.to);
    println!("  {:<14} {}", "Date:", message.date);
    println!("  {:<14} {}", "Subject:", message.subject);
    println!("  {:<14} {}", "Content-Type:", message.content_type);
    println!();
}

/// Print the events as an indented tree followed by the totals.
fn print_report_table(report: &Report, output_dir: &Path, dry_run: bool) {
    use humansize::{format_size, BINARY};

    for event in &report.events {
        match event {
            Emission::PartWritten {
                name,
                byte_length,
                depth,
            } => println!(
                "  {}{:<48} {:>10}",
                indent(*depth),
                name,
                format_size(*byte_length, BINARY)
            ),
            Emission::PartFailed {
                kind,
                reason,
                depth,
            } => println!("  {}FAILED ({kind:?}): {reason}", indent(*depth)),
            Emission::BranchTruncated { boundary, depth } => {
                println!("  {}TRUNCATED: boundary '{boundary}'", indent(*depth))
            }
        }
    }

    let summary = &report.summary;
    println!();
    println!("  {:<20} {}", "Files written", summary.files_written);
    println!("  {:<20} {}", "Parts failed", summary.parts_failed);
    if summary.branches_truncated > 0 {
        println!("  {:<20} {}", "Branches truncated", summary.branches_truncated);
    }
    println!(
        "  {:<20} {}",
        "Total size",
        format_size(summary.bytes_written, BINARY)
    );
    if dry_run {
        println!("  {:<20} (dry run, nothing written)", "Output");
    } else {
        println!("  {:<20} {}", "Output", output_dir.display());
    }
    println!();
}

fn print_report_json(message: &MessageSummary, report: &Report, dry_run: bool) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "message": message,
        "dry_run": dry_run,
        "events": report.events,
        "summary": report.summary,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth.saturating_sub(1))
}
