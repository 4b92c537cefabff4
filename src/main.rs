// esmpack command-line entry point

use colored::Colorize;
use esmpack::cli::CliHandler;

async fn run() -> anyhow::Result<()> {
    CliHandler::new().run().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "❌ Error:".red().bold(), e);
        for cause in e.chain().skip(1) {
            eprintln!("   {} {}", "caused by:".dimmed(), cause);
        }
        std::process::exit(1);
    }
}
