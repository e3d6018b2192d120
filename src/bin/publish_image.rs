//! publish_image - push image files onto a camera topic.
//!
//! Each file is decoded, converted to a BGR8 image message and published
//! once; with `--repeat` the list is replayed until Ctrl-C.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use frame_detector::transport::parse_broker_endpoint;
use frame_detector::{Frame, ImageMessage};

#[derive(Parser, Debug)]
#[command(author, version, about = "Publish image files to a camera topic")]
struct Args {
    /// Image files (png or jpeg).
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// MQTT broker address.
    #[arg(long, env = "DETECTOR_MQTT_BROKER", default_value = "127.0.0.1:1883")]
    broker: String,

    /// Camera topic.
    #[arg(long, env = "DETECTOR_CAMERA_TOPIC", default_value = "/camera/color/image_raw")]
    topic: String,

    /// Delay between images, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Replay the list until Ctrl-C.
    #[arg(long)]
    repeat: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let payloads = args
        .images
        .iter()
        .map(|path| {
            let image = image::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?
                .to_rgb8();
            let frame = Frame::from_rgb_image(&image);
            log::info!("loaded {} ({}x{})", path.display(), frame.width, frame.height);
            ImageMessage::from_frame(&frame).encode()
        })
        .collect::<Result<Vec<_>>>()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let endpoint = parse_broker_endpoint(&args.broker)?;
    let client_id = format!("publish_image_{:08x}", rand::random::<u32>());
    let mut options = MqttOptions::new(client_id, endpoint.host.clone(), endpoint.port);
    options.set_keep_alive(Duration::from_secs(5));
    let largest = payloads.iter().map(Vec::len).max().unwrap_or(0);
    options.set_max_packet_size(64 * 1024, largest + 1024);
    let (client, mut connection) = Client::new(options, 10);

    let mut published = 0usize;
    'outer: loop {
        for payload in &payloads {
            if shutdown.load(Ordering::SeqCst) {
                break 'outer;
            }
            client
                .publish(args.topic.as_str(), QoS::AtLeastOnce, false, payload.clone())
                .context("failed to queue publish")?;
            // Drive the event loop until the broker acknowledges.
            for event in connection.iter() {
                match event {
                    Ok(Event::Incoming(Packet::PubAck(_))) => break,
                    Ok(_) => {}
                    Err(e) => return Err(anyhow!("MQTT connection error: {}", e)),
                }
            }
            published += 1;
            log::info!("published image {} to {}", published, args.topic);
            std::thread::sleep(Duration::from_millis(args.interval_ms));
        }
        if !args.repeat {
            break;
        }
    }

    client.disconnect().ok();
    log::info!("{} images published", published);
    Ok(())
}
