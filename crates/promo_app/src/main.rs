mod client;
mod logging;
mod server;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "promo", about = "Streamed multi-variation promo text generation")]
struct Cli {
    /// Write logs to ./promo.log instead of the terminal.
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the SSE relay server.
    Serve(server::ServeArgs),
    /// Generate three variations against a running relay server.
    Generate(client::GenerateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::initialize(if cli.log_file {
        logging::LogDestination::File
    } else {
        logging::LogDestination::Terminal
    });

    match cli.command {
        Command::Serve(args) => server::run(args).await,
        Command::Generate(args) => client::run(args).await,
    }
}
