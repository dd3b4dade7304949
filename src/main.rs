use clap::Parser;

use reelsight::cli::{self, Cli, Command, ConfigCommand};
use reelsight::{config, logging, server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Commands that must work even with a broken config file.
    match &cli.command {
        Some(Command::Version) => {
            cli::handle_version();
            return Ok(());
        }
        Some(Command::Config(ConfigCommand::Path)) => {
            cli::handle_config_path();
            return Ok(());
        }
        _ => {}
    }

    let mut cfg = config::load_config()?;
    logging::init_logging(&cfg.logging)?;

    match cli.command {
        None => server::start_server(&cfg).await?,
        Some(Command::Serve { port, host }) => {
            cli::apply_serve_overrides(&mut cfg, host, port);
            server::start_server(&cfg).await?;
        }
        Some(Command::Analyze {
            file,
            url,
            focus,
            stream,
        }) => {
            cli::handle_analyze(
                &cfg,
                file.as_deref(),
                url.as_deref(),
                focus.as_deref(),
                stream,
            )
            .await?
        }
        Some(Command::Status { port, host }) => cli::handle_status(&cfg, &host, port).await?,
        Some(Command::Config(ConfigCommand::Show)) => cli::handle_config_show(&cfg)?,
        Some(Command::Version) | Some(Command::Config(ConfigCommand::Path)) => {}
    }

    Ok(())
}
