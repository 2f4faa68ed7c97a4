use std::collections::HashMap;

use chrono::{Local, SecondsFormat};
use serde_json::Value;

use crate::magnum::Magnum;
use crate::midnite::Midnite;
use crate::prelude::*;

// The remote control's clock ticks every cycle; left alone it would make
// every REMOTE payload look new.
const CLOCK_FIELDS: [&str; 2] = ["remotetimehours", "remotetimemins"];

pub struct Coordinator {
    config: Config,
    channels: Channels,
    published: HashMap<String, Value>,
}

impl Coordinator {
    pub fn new(config: Config, channels: Channels) -> Self {
        Self {
            config,
            channels,
            published: HashMap::new(),
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        let mut readers: Vec<Box<dyn Reader>> = Vec::new();
        if self.config.magnum.enabled {
            readers.push(Box::new(Magnum::new(&self.config.magnum)));
        }
        if self.config.midnite.enabled {
            readers.push(Box::new(Midnite::new(&self.config.midnite)));
        }
        if readers.is_empty() {
            bail!("no readers enabled, nothing to do");
        }

        info!(
            "polling {} reader(s) every {}s",
            readers.len(),
            self.config.interval
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut shutdown = self.channels.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => self.run_cycle(&mut readers).await,
            }
        }

        info!("coordinator loop exiting");
        Ok(())
    }

    async fn run_cycle(&mut self, readers: &mut [Box<dyn Reader>]) {
        for reader in readers.iter_mut() {
            match reader.poll().await {
                Ok(readings) => {
                    debug!("{}: {} item(s)", reader.name(), readings.len());
                    for reading in readings {
                        if let Err(err) = self.publish(reading) {
                            error!("{}: publish failed: {}", reader.name(), err);
                        }
                    }
                }
                Err(err) => warn!("{}: cycle failed: {}", reader.name(), err),
            }
        }
    }

    fn publish(&mut self, reading: Reading) -> Result<()> {
        if self.is_duplicate(&reading) {
            debug!("{}: unchanged, not publishing", reading.item);
            return Ok(());
        }

        let topic = format!(
            "{}/{}",
            self.config.mqtt.namespace(),
            reading.item.to_lowercase()
        );

        let payload = serde_json::json!({
            "datetime": Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            "item": reading.item,
            "data": reading.data,
        });

        let message = mqtt::Message {
            topic,
            retain: false,
            payload: serde_json::to_string(&payload)?,
        };

        if self.config.mqtt.enabled() {
            self.channels
                .to_mqtt
                .send(mqtt::ChannelData::Message(message))
                .map_err(|_| anyhow!("send(to_mqtt) failed - channel closed?"))?;
        }

        Ok(())
    }

    /// Compare against the last published payload for this item, ignoring
    /// the remote's wall-clock fields. A duplicate is only skipped when
    /// `allow_duplicates` is off.
    fn is_duplicate(&mut self, reading: &Reading) -> bool {
        if self.config.allow_duplicates {
            return false;
        }

        let duplicate = match self.published.get_mut(&reading.item) {
            Some(saved) => {
                if let (Some(saved_map), Some(new_map)) =
                    (saved.as_object_mut(), reading.data.as_object())
                {
                    for key in CLOCK_FIELDS {
                        if let Some(value) = new_map.get(key) {
                            saved_map.insert(key.to_string(), value.clone());
                        }
                    }
                }
                *saved == reading.data
            }
            None => false,
        };

        if !duplicate {
            self.published
                .insert(reading.item.clone(), reading.data.clone());
        }

        duplicate
    }
}
