use clap::Parser;
use pubsub_facade::cli::{commands, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging is set up by the command once configuration is loaded.
    commands::execute_command(cli).await
}
