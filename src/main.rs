use color_eyre::{eyre::eyre, Result};
use mqtt_session::config::AppConfig;
use mqtt_session::mqtt::{ConnectionManager, MessageListener, MqttMessage, RumqttConnector};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const ANNOUNCE_PAYLOAD: &str = "online";

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = AppConfig::default_path()?;
    info!("Using config file {}", config_path.display());
    let config = AppConfig::ensure_default(&config_path).await?;
    config.check_broker(&config_path)?;

    let manager = Arc::new(ConnectionManager::new(
        RumqttConnector::new(),
        config.session.clone(),
    ));

    // Log every connection state change
    let mut state_rx = manager.subscribe_state();
    let _state_handle = tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow_and_update();
            info!("MQTT connection state: {:?}", state);
        }
    });

    let logger: Arc<dyn MessageListener> =
        Arc::new(|topic: &str, payload: &[u8]| -> Result<()> {
            let message = MqttMessage::from_topic(topic, payload);
            info!("{}", message.render());
            Ok(())
        });
    manager.add_listener(logger);

    // connect blocks until the broker answers, keep it off the async workers
    let broker = config.broker.clone();
    let session = manager.clone();
    tokio::task::spawn_blocking(move || {
        session.try_connect(broker.parameters())?;
        session.subscribe_many(&broker.subscriptions);
        if let Some(topic) = &broker.announce_topic {
            session.publish_str(topic, ANNOUNCE_PAYLOAD);
        }
        Ok::<_, color_eyre::Report>(())
    })
    .await
    .map_err(|e| eyre!("Connect task failed: {}", e))??;

    info!("Listening, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    let session = manager.clone();
    tokio::task::spawn_blocking(move || session.close())
        .await
        .map_err(|e| eyre!("Close task failed: {}", e))?;

    let status = manager.status();
    info!(
        "Received {} messages, sent {}",
        status.messages_received, status.messages_sent
    );
    if let Some(error) = status.last_error() {
        warn!("Last error: {}", error);
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
