use anyhow::Result;
use clap::Parser;

use venuesync::cli::Cli;
use venuesync::logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.execute().await {
        Ok(()) => {
            logging::log_session_end();
            Ok(())
        }
        Err(e) => {
            tracing::error!("Application error: {}", e);
            for cause in e.chain().skip(1) {
                tracing::error!("   Caused by: {}", cause);
            }
            logging::log_session_end();
            Err(e)
        }
    }
}
