// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Entry point.
//!
//! ```text
//! cli::parse() --> Config --> Logging --> Command Dispatch
//!   Version | Options | Run (exit code of the child)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::debug;

use pipemux::cli::global::GlobalOptions;
use pipemux::cli::{self, Command};
use pipemux::cmd::config::run_options_command;
use pipemux::cmd::run::run_run_command;
use pipemux::config::Config;
use pipemux::config::loader::ConfigLoader;
use pipemux::config::types::GlobalConfig;
use pipemux::logging::{LogConfig, init_logging};

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Default config file looked up in the current directory.
const DEFAULT_INI: &str = "pipemux.toml";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::parse();

    let extra = match &cli.command {
        Some(Command::Run(args)) => args.to_config_overrides(),
        _ => Vec::new(),
    };
    let (config, files) = match load_config(&cli.global, &extra) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load config: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match init_logging(&build_log_config(&config.global)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    for (source, path) in &files {
        debug!(source = %source, path = %path.display(), "config loaded");
    }

    dispatch_command(&cli, &config).await
}

fn build_log_config(global: &GlobalConfig) -> LogConfig {
    LogConfig::builder()
        .with_console_level(global.output_log_level)
        .with_file_level(global.file_log_level)
        .maybe_with_log_file(global.log_file.as_ref().map(|p| p.display().to_string()))
        .build()
}

async fn dispatch_command(cli: &cli::Cli, config: &Config) -> ExitCode {
    let result = match &cli.command {
        Some(Command::Version) => {
            handle_version_command();
            Ok(0)
        }
        Some(Command::Options) => {
            run_options_command(config);
            Ok(0)
        }
        Some(Command::Run(args)) => run_run_command(args, config).await,
        None => {
            eprintln!("No command specified. Use --help for usage information.");
            Err(anyhow::anyhow!("No command specified"))
        }
    };

    match result {
        Ok(code) => exit_code(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Maps a child's exit code onto the 0-255 range of a process status.
fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}

fn handle_version_command() {
    println!("{}", env!("CARGO_PKG_VERSION"));
}

fn build_config_loader(global: &GlobalOptions, extra: &[String]) -> pipemux::error::Result<ConfigLoader> {
    let mut loader = ConfigLoader::new();
    if !global.no_default_inis {
        loader = loader.add_toml_file_optional(DEFAULT_INI);
    }
    for ini_path in &global.inis {
        loader = loader.add_toml_file(ini_path);
    }
    loader
        .with_env_prefix("PIPEMUX")
        .with_overrides(&global.to_config_overrides())?
        .with_overrides(extra)
}

fn load_config(
    global: &GlobalOptions,
    extra: &[String],
) -> pipemux::error::Result<(Config, Vec<(String, PathBuf)>)> {
    let loader = build_config_loader(global, extra)?;
    let files = loader.loaded_files();
    Ok((loader.build()?, files))
}
