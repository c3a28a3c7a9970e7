use std::sync::Arc;

use clap::Parser;
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use notifier_core::Error;
use notifier_core::config::Settings;
use notifier_core::platforms::twitch::client::TwitchHelixClient;
use notifier_core::platforms::twitch_eventsub::listener::{self, ListenerState};
use notifier_core::platforms::twitch_eventsub::subscriptions::EventSubClient;
use notifier_core::services::notifier::DiscordWebhookNotifier;
use notifier_core::services::stream_service::StreamService;
use notifier_core::services::subscription_manager::SubscriptionManager;

#[derive(Parser, Debug, Clone)]
#[command(name = "notifier-server")]
#[command(author, version, about = "Posts a webhook message when tracked Twitch broadcasters go live")]
struct Args {
    /// Port the EventSub callback listener binds to
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("notifier_core=info".parse().unwrap_or_default())
        .add_directive("notifier_server=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

/// EventSub signs every callback with a per-run shared secret.
fn webhook_secret() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing();
    dotenv::dotenv().ok();

    if let Err(e) = run(args).await {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let settings = Settings::from_env()?;

    info!("Starting twitch-online-notifier...");
    info!("Usernames to listen for:");
    for username in &settings.usernames {
        info!("\t- {}", username);
    }

    let helix = Arc::new(TwitchHelixClient::connect(&settings.app_id, &settings.app_secret).await?);
    let eventsub = Arc::new(EventSubClient::new(
        helix.clone(),
        &settings.eventsub_url,
        webhook_secret(),
    ));
    let notifier = Arc::new(DiscordWebhookNotifier::new(&settings));
    let manager = SubscriptionManager::new(
        settings.clone(),
        helix.clone(),
        eventsub.clone(),
        notifier.clone(),
    );

    manager.clear_stale_subscriptions().await?;

    let state = ListenerState {
        secret: Arc::new(eventsub.secret().to_string()),
        confirmations: eventsub.confirmations(),
        handler: Arc::new(StreamService::new(notifier.clone())),
    };
    let tcp = listener::bind(args.port).await?;
    let mut listener_task = tokio::spawn(listener::serve(tcp, state));

    manager.subscribe_all().await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
        res = &mut listener_task => {
            return match res {
                Ok(Ok(())) => Err(Error::Platform("callback listener exited unexpectedly".into())),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(Error::Platform(format!("callback listener panicked: {}", e))),
            };
        }
    }

    // Unsubscribe before exiting so the next run starts clean.
    if let Err(e) = manager.shutdown().await {
        error!("could not remove subscriptions on shutdown: {}", e);
    }
    listener_task.abort();
    Ok(())
}
