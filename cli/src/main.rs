use clap::Parser;
use depkit_cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    depkit_cli::init_tracing();
    let cli = Cli::parse();
    let code = depkit_cli::run(cli).await?;
    std::process::exit(code);
}
