//! Camera topic subscription.
//!
//! The subscriber runs on its own thread and only touches the shared
//! `FrameSlot`: every decoded message replaces the slot's frame.

use anyhow::{Context, Result};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::image_msg::ImageMessage;
use super::synthetic::SyntheticSource;
use super::{is_synthetic_topic, parse_broker_endpoint, BrokerEndpoint};
use crate::config::NodeConfig;
use crate::frame::FrameSlot;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const KEEP_ALIVE: Duration = Duration::from_secs(5);
const SYNTHETIC_FRAME_INTERVAL: Duration = Duration::from_millis(100);
/// Largest publish accepted from the broker.
const MAX_INCOMING_PACKET: usize = 64 * 1024 * 1024 + 1024;
const MAX_OUTGOING_PACKET: usize = 64 * 1024;

/// Decode one message payload and hand the frame to the slot.
pub fn deliver(payload: &[u8], slot: &FrameSlot) -> Result<u64> {
    let message = ImageMessage::decode(payload)?;
    let frame = message.to_bgr8()?;
    slot.publish(frame)
}

/// MQTT subscriber for the camera topic.
pub struct ImageSubscriber {
    endpoint: BrokerEndpoint,
    topic: String,
    client_id: String,
    slot: Arc<FrameSlot>,
    shutdown: Arc<AtomicBool>,
}

impl ImageSubscriber {
    pub fn new(
        endpoint: BrokerEndpoint,
        topic: &str,
        client_id: &str,
        slot: Arc<FrameSlot>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        // Unique id per process so several nodes can share a broker.
        let client_id = format!("{}_{:08x}", client_id, rand::random::<u32>());
        Self {
            endpoint,
            topic: topic.to_string(),
            client_id,
            slot,
            shutdown,
        }
    }

    pub fn spawn(self) -> Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("image-subscriber".to_string())
            .spawn(move || self.run())
            .context("failed to spawn image subscriber thread")
    }

    /// Receive until shutdown, reconnecting after broker errors.
    pub fn run(self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            let (client, connection) = self.connect();
            if let Err(e) = client.subscribe(&self.topic, QoS::AtMostOnce) {
                log::error!("subscribe to {} failed: {}", self.topic, e);
                std::thread::sleep(RECONNECT_DELAY);
                continue;
            }
            log::info!("subscribed to {}", self.topic);

            self.pump(connection);
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(RECONNECT_DELAY);
        }
        log::info!("image subscriber stopped");
    }

    fn connect(&self) -> (Client, Connection) {
        let mut options =
            MqttOptions::new(&self.client_id, &self.endpoint.host, self.endpoint.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        options.set_max_packet_size(MAX_INCOMING_PACKET, MAX_OUTGOING_PACKET);
        log::info!(
            "connecting to MQTT broker {}:{} as {}",
            self.endpoint.host,
            self.endpoint.port,
            self.client_id
        );
        Client::new(options, 10)
    }

    fn pump(&self, mut connection: Connection) {
        let mut received = 0u64;
        for event in connection.iter() {
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match deliver(&publish.payload, &self.slot) {
                        Ok(seq) => {
                            received += 1;
                            log::debug!("frame #{} from {} ({} received)", seq, publish.topic, received);
                        }
                        Err(e) => log::warn!("dropping message on {}: {}", publish.topic, e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!("MQTT connection error: {}. Reconnecting...", e);
                    return;
                }
            }
        }
        log::warn!("MQTT connection closed. Reconnecting...");
    }
}

/// Start the frame source selected by `camera_topic`: a synthetic camera for
/// `stub://` topics, the MQTT subscriber otherwise.
pub fn spawn_image_source(
    cfg: &NodeConfig,
    slot: Arc<FrameSlot>,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    if is_synthetic_topic(&cfg.camera_topic) {
        let mut source = SyntheticSource::new(cfg.image.width, cfg.image.height);
        log::info!("camera topic {} is synthetic", cfg.camera_topic);
        return std::thread::Builder::new()
            .name("synthetic-camera".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    let published = source
                        .next_frame()
                        .and_then(|frame| slot.publish(frame));
                    if let Err(e) = published {
                        log::error!("synthetic camera stopped: {}", e);
                        return;
                    }
                    std::thread::sleep(SYNTHETIC_FRAME_INTERVAL);
                }
            })
            .context("failed to spawn synthetic camera thread");
    }

    let endpoint = parse_broker_endpoint(&cfg.transport.broker)?;
    ImageSubscriber::new(
        endpoint,
        &cfg.camera_topic,
        &cfg.transport.client_id,
        slot,
        shutdown,
    )
    .spawn()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn deliver_publishes_decoded_frame() {
        let slot = FrameSlot::new(Frame::zeroed(2, 1, 3));
        let frame = Frame::from_bgr8(2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let payload = ImageMessage::from_frame(&frame).encode().unwrap();

        let seq = deliver(&payload, &slot).unwrap();
        assert_eq!(seq, 1);
        assert_eq!(*slot.snapshot().unwrap().frame, frame);
    }

    #[test]
    fn deliver_leaves_slot_untouched_on_garbage() {
        let slot = FrameSlot::new(Frame::zeroed(2, 1, 3));
        assert!(deliver(b"not an image", &slot).is_err());
        let snap = slot.snapshot().unwrap();
        assert_eq!(snap.seq, 0);
        assert!(snap.frame.is_blank());
    }

    #[test]
    fn deliver_rejects_zero_width_message() {
        let slot = FrameSlot::new(Frame::zeroed(2, 1, 3));
        let payload = ImageMessage {
            height: 2,
            width: 0,
            encoding: "bgr8".to_string(),
            is_bigendian: 0,
            step: 0,
            data: Vec::new(),
        }
        .encode()
        .unwrap();
        assert!(deliver(&payload, &slot).is_err());
        assert_eq!(slot.snapshot().unwrap().seq, 0);
    }

    #[test]
    fn synthetic_topic_feeds_slot_until_shutdown() {
        let mut cfg = NodeConfig::default();
        cfg.camera_topic = "stub://camera".to_string();
        cfg.image.width = 16;
        cfg.image.height = 12;
        let slot = Arc::new(FrameSlot::new(cfg.blank_frame()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = spawn_image_source(&cfg, slot.clone(), shutdown.clone()).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while slot.snapshot().unwrap().seq == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        shutdown.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        let snap = slot.snapshot().unwrap();
        assert!(snap.seq >= 1);
        assert!(!snap.frame.is_blank());
    }
}
