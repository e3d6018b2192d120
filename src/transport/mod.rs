//! Image transport: camera topic subscription and the image message codec.
//!
//! - `image_msg`: ROS-style image message, binary codec and BGR8 conversion
//! - `subscriber`: MQTT topic subscriber feeding the frame slot
//! - `synthetic`: `stub://` topics, generated frames for running without a broker

pub mod image_msg;
pub mod subscriber;
pub mod synthetic;

use anyhow::{anyhow, Context, Result};

pub use image_msg::{ImageEncoding, ImageMessage};
pub use subscriber::{spawn_image_source, ImageSubscriber};
pub use synthetic::SyntheticSource;

const DEFAULT_MQTT_PORT: u16 = 1883;

/// Topics with this prefix are served by `SyntheticSource`.
pub const SYNTHETIC_SCHEME: &str = "stub://";

/// Broker address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

/// Parse `host[:port]`, `mqtt://host[:port]`, `tcp://host[:port]` or `[ipv6]:port`.
pub fn parse_broker_endpoint(addr: &str) -> Result<BrokerEndpoint> {
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }
    if remainder.is_empty() {
        return Err(anyhow!("empty MQTT broker address"));
    }

    let (host, port) = split_host_port(remainder)?;
    Ok(BrokerEndpoint { host, port })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = match rest.strip_prefix(':') {
            Some(port) => parse_port(port, addr)?,
            None => DEFAULT_MQTT_PORT,
        };
        return Ok((host.to_string(), port));
    }

    match addr.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), parse_port(port, addr)?)),
        None => Ok((addr.to_string(), DEFAULT_MQTT_PORT)),
    }
}

fn parse_port(port: &str, addr: &str) -> Result<u16> {
    port.parse()
        .with_context(|| format!("invalid MQTT port in {}", addr))
}

/// True when the topic names a synthetic source.
pub fn is_synthetic_topic(topic: &str) -> bool {
    topic.starts_with(SYNTHETIC_SCHEME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_schemed_addresses() {
        assert_eq!(
            parse_broker_endpoint("127.0.0.1:1883").unwrap(),
            BrokerEndpoint {
                host: "127.0.0.1".into(),
                port: 1883
            }
        );
        assert_eq!(
            parse_broker_endpoint("mqtt://broker.local:2883").unwrap().port,
            2883
        );
        assert_eq!(parse_broker_endpoint("broker.local").unwrap().port, 1883);
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let endpoint = parse_broker_endpoint("[::1]:1884").unwrap();
        assert_eq!(endpoint.host, "::1");
        assert_eq!(endpoint.port, 1884);
    }

    #[test]
    fn rejects_bad_scheme_and_port() {
        assert!(parse_broker_endpoint("http://x:1").is_err());
        assert!(parse_broker_endpoint("host:notaport").is_err());
        assert!(parse_broker_endpoint("  ").is_err());
    }

    #[test]
    fn synthetic_topics_are_detected() {
        assert!(is_synthetic_topic("stub://camera"));
        assert!(!is_synthetic_topic("/camera/color/image_raw"));
    }
}
