use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use enpush::{
    models::{PushSubscriptionJson, WebPushSubscription},
    BrowserVariant, EnPush, InitParams, NotificationStatus, RedbStore, ReqwestTransport,
    Subscription,
};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_STORE_PATH: &str = "enpush.redb";

#[derive(Parser)]
#[command(name = "enpush", about = "Register this device with Event Notifications web push")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a push subscription (or Safari device token) for the stored device.
    Register {
        /// `PushSubscription.toJSON()` output saved by a browser.
        #[arg(long, conflicts_with = "safari_token", required_unless_present = "safari_token")]
        subscription: Option<PathBuf>,
        #[arg(long)]
        safari_token: Option<String>,
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Delete the stored device from the backend.
    Unregister,
    /// Post one delivery status for the stored device.
    Delivery {
        #[arg(long)]
        nid: String,
        #[arg(long)]
        status: NotificationStatus,
    },
    /// Tag subscriptions of the stored device.
    Tags {
        #[command(subcommand)]
        action: TagAction,
    },
}

#[derive(Subcommand)]
enum TagAction {
    Subscribe {
        #[arg(long)]
        tag: String,
    },
    Unsubscribe {
        #[arg(long)]
        tag: String,
    },
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let params = InitParams::from_env()?;
    let variant = BrowserVariant::from_user_agent(&env::var("ENPUSH_USER_AGENT").unwrap_or_default());
    let store_path = env::var("ENPUSH_STORE_PATH").unwrap_or_else(|_| DEFAULT_STORE_PATH.to_string());
    let store = Arc::new(RedbStore::open(&store_path).map_err(|err| anyhow::anyhow!(err))?);
    let transport = Arc::new(ReqwestTransport::new()?);
    let sdk = EnPush::headless(&params, variant, store, transport)?;
    info!("using {variant} configuration and store {store_path}");

    let output = match cli.command {
        Command::Register {
            subscription,
            safari_token,
            user_id,
        } => {
            let subscription = match (subscription, safari_token) {
                (_, Some(device_token)) => Subscription::Safari { device_token },
                (Some(path), None) => read_subscription(&path)?,
                (None, None) => anyhow::bail!("--subscription or --safari-token is required"),
            };
            let user_id = user_id.as_deref().filter(|id| !id.trim().is_empty());
            let outcome = sdk.register_subscription(&subscription, user_id).await?;
            json!({
                "outcome": outcome.kind(),
                "status": outcome.status_code(),
                "device": outcome.record(),
            })
        }
        Command::Unregister => {
            sdk.unregister_device().await?;
            json!({ "status": 204 })
        }
        Command::Delivery { nid, status } => {
            sdk.report_delivery(&nid, status).await?;
            json!({ "notification_id": nid, "status": status })
        }
        Command::Tags { action } => {
            let body = match action {
                TagAction::Subscribe { tag } => sdk.subscribe_tags(&tag).await?,
                TagAction::Unsubscribe { tag } => sdk.unsubscribe_tags(&tag).await?,
                TagAction::List => sdk.retrieve_subscriptions().await?,
            };
            serde_json::from_str(&body).unwrap_or(Value::String(body))
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn read_subscription(path: &Path) -> anyhow::Result<Subscription> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading subscription from {}", path.display()))?;
    let exported: PushSubscriptionJson = serde_json::from_str(&raw)?;
    let subscription = WebPushSubscription::try_from(&exported)?;
    Ok(Subscription::Web(subscription))
}
