use clap::Parser;
use droplite::cli::{self, Cli};
use droplite::logging::init_logging;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_format.into()) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("droplite: {}", e);
            eprintln!("error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}
