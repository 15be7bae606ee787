// src/main.rs

use kitguard::{cli, logging, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("kitguard error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let invocations = cli::parse();
    let log_level = invocations.first().and_then(|inv| inv.log_level);
    logging::init_logging(log_level)?;
    run(invocations).await
}
