mod record;
mod sim;

use anyhow::Result;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{env, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use record::{decode_value, extract_write_path, HouseRecord};
use sim::{RigSim, Scenario};

struct RigConfig {
    broker: String,
    port: u16,
    house_id: String,
    topic_prefix: String,
    sample_every_s: u64,
    scenario: Scenario,
    fault_rate: f64,
}

impl RigConfig {
    fn from_env() -> Self {
        Self {
            broker: env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parse("MQTT_PORT", 1883),
            house_id: env::var("HOUSE_ID").unwrap_or_else(|_| "maison_1".to_string()),
            topic_prefix: env::var("TOPIC_PREFIX").unwrap_or_else(|_| "maisons".to_string()),
            sample_every_s: env_parse("SAMPLE_EVERY_S", 5),
            scenario: Scenario::from_str_lossy(&env::var("SIM_SCENARIO").unwrap_or_default()),
            fault_rate: env_parse("APPLY_FAULT_RATE", 0.1),
        }
    }

    fn record_topic(&self) -> String {
        format!("{}/{}", self.topic_prefix, self.house_id)
    }

    fn write_filter(&self) -> String {
        format!("{}/{}/set/#", self.topic_prefix, self.house_id)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Publish the whole record, retained, so a hub that connects later gets the
/// current state straight away.
fn publish_record(client: &AsyncClient, topic: &str, record: &HouseRecord) {
    let payload = match record.to_payload() {
        Ok(p) => p,
        Err(e) => {
            error!("failed to encode house record: {e:#}");
            return;
        }
    };
    if let Err(e) = client.try_publish(topic, QoS::AtLeastOnce, true, payload) {
        warn!("publish error: {e}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = RigConfig::from_env();
    let record_topic = cfg.record_topic();

    let client_id = format!("garden-rig-{}", cfg.house_id);
    let mut mqttoptions = MqttOptions::new(client_id, cfg.broker.clone(), cfg.port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 20);

    let record = Arc::new(Mutex::new(HouseRecord::seeded()));

    // Incoming writes: apply to the record, then republish it.
    {
        let client = client.clone();
        let record = Arc::clone(&record);
        let record_topic = record_topic.clone();
        let write_filter = cfg.write_filter();
        let prefix = cfg.topic_prefix.clone();
        let house_id = cfg.house_id.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("rig connected to mqtt");
                        if let Err(e) = client.try_subscribe(write_filter.as_str(), QoS::AtLeastOnce) {
                            error!("subscribe failed: {e}");
                        }
                        publish_record(&client, &record_topic, &*record.lock().await);
                    }
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        let Some(path) = extract_write_path(&p.topic, &prefix, &house_id) else {
                            warn!(topic = %p.topic, "unhandled topic");
                            continue;
                        };
                        let value = decode_value(&p.payload);
                        let mut rec = record.lock().await;
                        match rec.apply_write(path, value) {
                            Ok(()) => {
                                debug!(path, "write applied");
                                publish_record(&client, &record_topic, &rec);
                            }
                            Err(e) => warn!("rejected write: {e:#}"),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("mqtt error: {e}. retrying...");
                        sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });
    }

    info!(
        topic = %record_topic,
        scenario = %cfg.scenario,
        fault_rate = cfg.fault_rate,
        every_s = cfg.sample_every_s,
        "simulating house"
    );

    let mut sim = RigSim::new(cfg.scenario, cfg.fault_rate);
    loop {
        sleep(Duration::from_secs(cfg.sample_every_s)).await;

        let mut rec = record.lock().await;
        let actuation = sim.step(&mut rec);
        for field in &actuation.faulted {
            info!(field, "device failed to actuate");
        }
        for field in &actuation.applied {
            debug!(field, "device actuated");
        }
        debug!(tick = sim.tick(), record = %rec.as_value(), "tick");
        publish_record(&client, &record_topic, &rec);
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RigConfig {
        RigConfig {
            broker: "127.0.0.1".into(),
            port: 1883,
            house_id: "maison_1".into(),
            topic_prefix: "maisons".into(),
            sample_every_s: 5,
            scenario: Scenario::Drying,
            fault_rate: 0.0,
        }
    }

    #[test]
    fn topics_follow_prefix_and_house() {
        let c = cfg();
        assert_eq!(c.record_topic(), "maisons/maison_1");
        assert_eq!(c.write_filter(), "maisons/maison_1/set/#");
    }

    #[test]
    fn write_topics_match_the_filter() {
        let c = cfg();
        let topic = format!("{}/mode", c.write_filter().trim_end_matches("/#"));
        assert_eq!(
            extract_write_path(&topic, &c.topic_prefix, &c.house_id),
            Some("mode")
        );
    }

    #[test]
    fn env_parse_falls_back_on_missing_or_bad_value() {
        assert_eq!(env_parse("GARDEN_RIG_TEST_UNSET_VAR", 42_u16), 42);
    }
}
