mod cli;

use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;

use cli::{Cli, Commands};
use zfs_retain::config;
use zfs_retain::driver::ZfsDriver;
use zfs_retain::replication::select_replication;

/// Opens syslog under `name`, in the manner of the upstream tool's `syslog_context`. Installs
/// itself as the global `log` backend for the remainder of the process.
struct SyslogContext;

impl SyslogContext {
    fn open(name: &str) -> anyhow::Result<Self> {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_USER,
            hostname: None,
            process: name.to_string(),
            pid: std::process::id(),
        };
        let logger =
            syslog::unix(formatter).map_err(|e| anyhow::anyhow!("failed to connect to syslog: {e}"))?;
        log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
            .map_err(|e| anyhow::anyhow!("failed to install syslog logger: {e}"))?;
        log::set_max_level(log::LevelFilter::Info);
        Ok(SyslogContext)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Snapshot { .. } => SyslogContext::open("zfs-snapshot").and_then(|_| run(&cli)),
        Commands::Backup { .. } => SyslogContext::open("zfs-backup").and_then(|_| run(&cli)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let driver = ZfsDriver::new();

    match &cli.command {
        Commands::Snapshot { config: config_path } => {
            let config = match config_path {
                Some(path) => config::load(path).with_context(|| format!("loading configuration from {}", path.display()))?,
                None => zfs_retain::config::Config::default_only(),
            };
            zfs_retain::orchestrator::run_snapshot_round(&driver, &config, cli.dry_run)
                .context("running snapshot round")?;
        }
        Commands::Backup {
            config: config_path,
            target_pool,
        } => {
            let backup_config = config::load_backup_config(config_path.as_deref())
                .context("loading backup configuration")?;
            for filesystem in &backup_config.filesystems {
                let plan = select_replication(
                    &driver,
                    filesystem,
                    target_pool,
                    &backup_config.backup_prefix,
                    Utc::now(),
                    cli.dry_run,
                )
                .with_context(|| format!("selecting replication plan for \"{filesystem}\""))?;

                let command = plan.command_line();
                if cli.dry_run {
                    println!("{command}");
                } else {
                    println!("{command}");
                    run_pipeline(&command)?;
                }
            }
        }
    }

    Ok(())
}

/// Runs a rendered `zfs send | zfs recv` pipeline through the shell, in the manner of the
/// upstream tool's `subprocess.call(' '.join(call), shell=True)`.
fn run_pipeline(command: &str) -> anyhow::Result<()> {
    let status = subprocess::Exec::shell(command)
        .join()
        .with_context(|| format!("failed to invoke replication pipeline: {command}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("replication pipeline exited non-zero: {command}"))
    }
}
