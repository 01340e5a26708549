use await_probe::ExecLauncher;
use clap::{CommandFactory, Parser};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod cli;
mod run;

use cli::{Cli, LogFormat};

#[tokio::main]
async fn main() {
    if cli::is_bare(std::env::args_os()) {
        eprintln!("{}", Cli::command().render_help());
        std::process::exit(1);
    }

    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let env: Vec<_> = std::env::vars_os().collect();
    if let Err(e) = run::run(&cli, &ExecLauncher, &env).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so the launched command owns stdout.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}
