// Container liveness probe. Exit 0: the listener answered; exit 1: it did
// not. Wired up as the Docker HEALTHCHECK command.

use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "healthcheck")]
#[command(about = "Liveness probe for the notifier's callback listener")]
struct Args {
    /// Port the notifier's listener runs on
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let filter = EnvFilter::from_default_env()
        .add_directive("healthcheck=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(sub);

    let client = reqwest::Client::new();
    let url = format!("http://localhost:{}/", args.port);

    match client
        .get(&url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            info!("Healthcheck passed.");
            std::process::exit(0);
        }
        Ok(resp) => {
            error!("Healthcheck failed: HTTP {}", resp.status());
            std::process::exit(1);
        }
        Err(e) => {
            error!("Healthcheck failed: {}", e);
            std::process::exit(1);
        }
    }
}
