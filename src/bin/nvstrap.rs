// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use nvstrap::cli::{Cli, CliError};

use std::{
    io::{stdout, Write},
    process::exit,
};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    let cli = match Cli::try_parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(CliError::Clap(err)) => err.exit(),
        Err(err) => {
            eprintln!("{err}");
            exit(err.exit_code());
        }
    };

    let mut out = stdout().lock();
    let result = cli.run(&mut out);
    let _ = out.flush();

    match result {
        Ok(code) => exit(code),
        Err(error) => {
            let code = error.exit_code();
            error!("{:?}", anyhow::Error::from(error));
            exit(code);
        }
    }
}
