#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::Parser;
use mailprobe::{
    Orchestrator,
    discovery::{Discovery, write_example},
    report::{ConsoleReporter, Style},
    secret::TerminalPrompt,
};
use mailprobe_common::{
    config::{ProbeConfig, RunConfig},
    logging,
};
use mailprobe_imap::ImapVerifier;
use mailprobe_smtp::SmtpSubmitter;

/// Check that mail sent through a relay arrives where it should
#[derive(Parser, Debug)]
#[command(name = "mailprobe")]
#[command(about = "End-to-end mail delivery probe", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let discovery = Discovery::for_process(cli.config);
    let Some(path) = discovery.locate() else {
        println!("No config file found.");
        if let Some(example) = discovery.example_path() {
            let written = write_example(&example).with_context(|| {
                format!("Failed to write example config to {}", example.display())
            })?;
            if written {
                println!("Example config file created at {}", example.display());
            }
        }
        return Ok(ExitCode::FAILURE);
    };

    let config = ProbeConfig::load(&path)?;
    logging::init(cli.debug || config.debug);
    tracing::debug!(config = %path.display(), "Loaded configuration");

    let reporter = ConsoleReporter::stdout(Style::detect(cli.no_color));
    let mut orchestrator = Orchestrator::new(SmtpSubmitter::default(), ImapVerifier, reporter);
    let summary = orchestrator
        .run(RunConfig::from(config), &TerminalPrompt)
        .await?;

    Ok(if summary.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
