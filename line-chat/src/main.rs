use std::{
    io::{self, IsTerminal},
    process::ExitCode,
};

use tracing::{Instrument, error, info, info_span};

use line_chat::{
    cli::{self, Cli, Config, Role},
    client,
    console::Console,
    hub::Hub,
    logging,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = match Cli::parse_from_args(std::env::args_os()) {
        Ok(config) => config,
        Err(err) => return cli::report(&err),
    };

    match config.role {
        Role::Server => {
            logging::init(io::stdout);
            run_hub(config).instrument(info_span!("hub")).await
        }
        Role::Client => {
            let interactive = io::stdin().is_terminal() && io::stdout().is_terminal();
            let console = Console::new(interactive);
            let log_level = logging::init(console.clone());
            run_peer(config, console, log_level)
                .instrument(info_span!("peer"))
                .await
        }
    }
}

async fn run_hub(config: Config) -> ExitCode {
    info!(host = %config.host, port = config.port, "starting hub");
    let hub = match Hub::bind(config.addr()).await {
        Ok(hub) => hub,
        Err(err) => {
            error!(error = %err, "hub failed to start");
            return ExitCode::FAILURE;
        }
    };

    match hub.local_addr() {
        Ok(addr) => info!(%addr, "hub listening"),
        Err(err) => info!(error = %err, "hub listening on unknown address"),
    }

    if let Err(err) = hub.run_until_ctrl_c().await {
        error!(error = %err, "hub stopped");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run_peer(
    config: Config,
    console: Console,
    log_level: Option<logging::LogLevel>,
) -> ExitCode {
    match client::run(config, console, log_level).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("peer exited with error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
