// SPDX-License-Identifier: Apache-2.0
// Copyright 2026 Keylime Authors

use certreq::{
    args::{parse_req_args, USAGE},
    crypto::OpenSslBackend,
    workflow::Workflow,
    Error,
};
use clap::{ArgAction, Parser, Subcommand};
use log::*;
use std::{error::Error as _, io, process::ExitCode};

#[derive(Parser)]
#[clap(about, version)]
struct Args {
    /// Increase log verbosity, ignored when RUST_LOG is set
    #[clap(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a certificate request or a self-signed certificate
    #[clap(disable_help_flag = true)]
    Req {
        /// Options in OpenSSL style, see `certreq req -help`
        #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn init_logger(verbose: u8) {
    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) => {
            builder.parse_filters(&filters);
        }
        Err(_) => {
            let level = match verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            };
            builder.filter_level(level);
        }
    }
    builder.init();
}

fn req(raw: &[String]) -> ExitCode {
    let result = parse_req_args(raw).and_then(|args| {
        let mut backend = OpenSslBackend::new();
        Workflow::new(&mut backend, io::stdout()).run(&args)
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Usage(reason)) => {
            eprintln!("{reason}\n");
            eprint!("{USAGE}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            let mut source = e.source();
            while let Some(cause) = source {
                error!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.verbose);

    match args.command {
        Command::Req { args } => req(&args),
    }
}
