use clap::Parser;

mod cli;
mod commands;
mod error;
mod import;
mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = cli::Cli::parse();
    let settings = settings::load(&cli.overrides)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "tally={level},engine={level},server={level}",
            level = settings.app.level
        ))
        .init();

    if let Err(err) = commands::run(cli.command, settings).await {
        tracing::error!("{err}");
        std::process::exit(1);
    }

    Ok(())
}
