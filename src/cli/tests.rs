// pipemux: child process output multiplexer
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::cli::{Cli, Command};
use clap::Parser;

fn run_args(args: &[&str]) -> crate::cli::run::RunArgs {
    let cli = Cli::try_parse_from(std::iter::once("pipemux").chain(args.iter().copied())).unwrap();
    match cli.command {
        Some(Command::Run(args)) => args,
        other => panic!("expected run, got {other:?}"),
    }
}

#[test]
fn test_parse_version() {
    let cli = Cli::try_parse_from(["pipemux", "version"]).unwrap();
    insta::assert_debug_snapshot!(cli, @r"
    Cli {
        global: GlobalOptions {
            inis: [],
            log_level: None,
            file_log_level: None,
            log_file: None,
            options: [],
            no_default_inis: false,
        },
        command: Some(
            Version,
        ),
    }
    ");
}

#[test]
fn test_parse_global_options() {
    let cli = Cli::try_parse_from([
        "pipemux",
        "-l",
        "4",
        "-i",
        "a.toml",
        "-s",
        "redirect.merge=true",
        "--log-file",
        "run.log",
        "options",
    ])
    .unwrap();

    assert!(matches!(cli.command, Some(Command::Options)));
    insta::assert_debug_snapshot!(cli.global.to_config_overrides(), @r#"
    [
        "redirect.merge=true",
        "global/output_log_level=4",
        "global/file_log_level=4",
        "global/log_file=run.log",
    ]
    "#);
}

#[test]
fn test_log_level_out_of_range() {
    assert!(Cli::try_parse_from(["pipemux", "-l", "7", "version"]).is_err());
}

#[test]
fn test_parse_run_program_and_args() {
    let args = run_args(&["run", "--merge", "-b", "1", "--", "make", "-j8", "--keep-going"]);

    assert_eq!(args.program, "make");
    assert_eq!(args.args, ["-j8", "--keep-going"]);
    insta::assert_debug_snapshot!(args.to_config_overrides(), @r#"
    [
        "redirect/merge=true",
        "redirect/buffer_size=1",
    ]
    "#);
}

#[test]
fn test_parse_run_without_separator() {
    let args = run_args(&["run", "--wrap", "ls", "-la", "/tmp"]);
    assert!(args.wrap);
    assert_eq!(args.program, "ls");
    assert_eq!(args.args, ["-la", "/tmp"]);
}

#[test]
fn test_parse_run_background() {
    let args = run_args(&[
        "run",
        "--background",
        "--name",
        "server",
        "--timeout",
        "30",
        "--format",
        "json",
        "--stdout-encoding",
        "utf-16le",
        "server.sh",
    ]);

    assert_eq!(args.name.as_deref(), Some("server"));
    assert_eq!(args.timeout(), Some(std::time::Duration::from_secs(30)));
    insta::assert_debug_snapshot!(args.to_config_overrides(), @r#"
    [
        "redirect/blocking=false",
        "redirect/format=json",
        "redirect/stdout_encoding=utf-16le",
    ]
    "#);
}

#[test]
fn test_run_rejects_invalid_combinations() {
    let rejected: [&[&str]; 5] = [
        &["run", "--no-redirect", "--background", "true"],
        &["run", "--name", "x", "true"],
        &["run", "--buffer-size", "0", "true"],
        &["run", "--format", "yaml", "true"],
        &["run"],
    ];
    for args in rejected {
        let parsed = Cli::try_parse_from(std::iter::once("pipemux").chain(args.iter().copied()));
        assert!(parsed.is_err(), "{args:?} should be rejected");
    }
}
