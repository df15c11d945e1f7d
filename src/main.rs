use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use agent_tap::agj::{AgjClient, PermissionTransition};
use agent_tap::exec::{LoginShellPathCache, ProcessCommandRunner, DEFAULT_CAPTURE_TIMEOUT};
use agent_tap::settings::{Config, NotificationSound, Settings};
use agent_tap::store::AgentStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Config::parse_args();

    // Initialize logging
    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_cli(&cli);

    let runner = ProcessCommandRunner::new(settings.command_override());
    let client = AgjClient::new(Arc::new(runner));
    let store = Arc::new(AgentStore::new(Arc::new(client), settings.refresh_interval));

    if cli.once {
        LoginShellPathCache::shared()
            .capture_once(None, DEFAULT_CAPTURE_TIMEOUT)
            .await;
        store.refresh().await;
        let snapshot = serde_json::to_string_pretty(&store.snapshot())
            .context("Failed to serialize snapshot")?;
        println!("{}", snapshot);
        return Ok(());
    }

    // Forward new prompts to the main loop
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PermissionTransition>>();
    store.set_notification_handler(move |events| {
        let _ = tx.send(events);
    });

    // Capture the login PATH in the background; polls made before it lands
    // fall back to the inherited PATH
    tokio::spawn(async {
        LoginShellPathCache::shared()
            .capture_once(None, DEFAULT_CAPTURE_TIMEOUT)
            .await;
    });

    store.start();
    info!(
        interval = settings.refresh_interval.display_name(),
        "Watching agents"
    );

    let mut updates = store.subscribe();
    let mut last_health = store.health();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(events) = rx.recv() => {
                if settings.notifications_enabled {
                    post_notifications(&events, settings.notification_sound);
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.health != last_health {
                    match snapshot.health.message() {
                        Some(message) => warn!(%message, "agj unhealthy"),
                        None => info!(instances = snapshot.instances.len(), "agj healthy"),
                    }
                    last_health = snapshot.health;
                }
            }
            _ = &mut ctrl_c => {
                info!("Received ctrl-c, shutting down");
                break;
            }
        }
    }

    store.stop();
    Ok(())
}

fn post_notifications(events: &[PermissionTransition], sound: NotificationSound) {
    for event in events {
        let instance = &event.instance;
        info!(
            title = "Agent needs approval",
            agent = %instance.agent_label(),
            session = %instance.session_key(),
            reason = instance.permission_reason.as_deref().unwrap_or(""),
            path = instance.short_path().as_deref().unwrap_or(""),
            sound = sound.display_name(),
            "Permission requested"
        );
    }
}
