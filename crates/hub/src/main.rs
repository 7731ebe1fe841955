use anyhow::Result;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{env, sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use garden_hub::channel::{MqttSink, Topics};
use garden_hub::config;
use garden_hub::dispatch::CommandDispatcher;
use garden_hub::garden::Garden;
use garden_hub::snapshot::RemoteSnapshot;
use garden_hub::web;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);
    let web_port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // ── Config file (house settings) ────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "garden.toml".to_string());
    let cfg = config::load_or_default(&config_path)?;
    let house = &cfg.house;
    let topics = Topics::new(&house.topic_prefix, &house.house_id);

    // ── MQTT channel ────────────────────────────────────────────────
    let client_id = format!("garden-hub-{}", house.house_id);
    let mut mqttoptions = MqttOptions::new(client_id, broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 20);

    // ── Shared garden context ───────────────────────────────────────
    let dispatcher = CommandDispatcher::new(Arc::new(MqttSink::new(client.clone(), topics.clone())));
    let garden = Garden::new(&house.house_id, &house.tank_label, dispatcher).shared();
    garden
        .write()
        .await
        .record_system(format!("hub started for house '{}'", house.house_id));

    // ── Web server ──────────────────────────────────────────────────
    let web_garden = Arc::clone(&garden);
    tokio::spawn(async move {
        if let Err(e) = web::serve(web_garden, web_port).await {
            error!("http api stopped: {e:#}");
        }
    });

    info!(topic = %topics.snapshot(), "hub mirroring house record");

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                if !topics.is_snapshot(&p.topic) {
                    warn!(topic = %p.topic, "unhandled topic");
                    continue;
                }
                match RemoteSnapshot::parse(&p.payload) {
                    Ok(snapshot) => garden.write().await.ingest(&snapshot),
                    Err(e) => {
                        // Nothing is updated; local state keeps its last values.
                        warn!("ignoring snapshot: {e}");
                        garden
                            .write()
                            .await
                            .record_error(format!("ignored snapshot: {e}"));
                    }
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
                // Subscriptions do not survive a clean-session reconnect.
                if let Err(e) = client.try_subscribe(topics.snapshot(), QoS::AtLeastOnce) {
                    error!("subscribe failed: {e}; continuing on last known state");
                    garden
                        .write()
                        .await
                        .record_error(format!("subscribe failed: {e}"));
                }
                garden.write().await.set_channel_connected(true);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                info!("mqtt disconnected");
                garden.write().await.set_channel_connected(false);
            }
            Ok(_) => {}
            Err(e) => {
                error!("mqtt error: {e}. reconnecting...");
                {
                    let mut g = garden.write().await;
                    g.set_channel_connected(false);
                    g.record_error(format!("mqtt error: {e}"));
                }
                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
