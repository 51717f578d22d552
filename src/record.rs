//! Call metadata as handed over by the signaling client.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

/// One relay the engine may connect through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub id: i64,
    pub port: u16,
    pub ipv4: Ipv4Addr,
    pub ipv6: Option<Ipv6Addr>,

    /// Opaque tag the relay uses to match both sides of the call
    pub peer_tag: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Protocol {
    #[serde(default)]
    pub udp_p2p: bool,

    #[serde(default)]
    pub max_layer: i32,
}

/// Immutable call metadata, captured once when the call object is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    pub id: i64,
    pub is_outgoing: bool,
    pub endpoints: Vec<Endpoint>,
    pub protocol: Protocol,

    #[serde(skip_serializing)]
    pub encryption_key: Vec<u8>,

    /// Engine server configuration, already parsed from its string form
    pub server_config: serde_json::Value,
}

#[derive(Deserialize)]
struct RawConnection {
    id: String,
    ip: String,
    #[serde(default)]
    ipv6: String,
    port: u16,
    #[serde(default)]
    peer_tag: String,
}

#[derive(Deserialize)]
struct RawState {
    #[serde(default)]
    connections: Vec<RawConnection>,
    #[serde(default)]
    protocol: Protocol,
    encryption_key: String,
    #[serde(default)]
    config: Option<String>,
}

#[derive(Deserialize)]
struct RawCall {
    id: i64,
    #[serde(default)]
    is_outgoing: bool,
    state: RawState,
}

impl Endpoint {
    fn from_raw(raw: RawConnection) -> Result<Self> {
        let id = raw
            .id
            .parse()
            .with_context(|| format!("Invalid endpoint id {:?}", raw.id))?;
        let ipv4 = raw
            .ip
            .parse()
            .with_context(|| format!("Invalid IPv4 address {:?} for endpoint {id}", raw.ip))?;
        let ipv6 = if raw.ipv6.is_empty() {
            None
        } else {
            Some(raw.ipv6.parse().with_context(|| {
                format!("Invalid IPv6 address {:?} for endpoint {id}", raw.ipv6)
            })?)
        };
        let peer_tag = STANDARD
            .decode(&raw.peer_tag)
            .with_context(|| format!("Invalid peer tag for endpoint {id}"))?;

        Ok(Endpoint {
            id,
            port: raw.port,
            ipv4,
            ipv6,
            peer_tag,
        })
    }
}

impl CallRecord {
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let raw = RawCall::deserialize(value).context("Malformed call object")?;

        let endpoints = raw
            .state
            .connections
            .into_iter()
            .map(Endpoint::from_raw)
            .collect::<Result<Vec<_>>>()?;

        let encryption_key = STANDARD
            .decode(&raw.state.encryption_key)
            .context("Invalid encryption key")?;
        if encryption_key.is_empty() {
            return Err(anyhow!("Call {} has an empty encryption key", raw.id));
        }

        let server_config = match raw.state.config {
            Some(config) if !config.is_empty() => {
                serde_json::from_str(&config).context("Invalid engine server config")?
            }
            _ => serde_json::Value::Object(Default::default()),
        };

        Ok(CallRecord {
            id: raw.id,
            is_outgoing: raw.is_outgoing,
            endpoints,
            protocol: raw.state.protocol,
            encryption_key,
            server_config,
        })
    }

    pub fn parse(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json).context("Invalid call JSON")?;
        Self::from_json(&value)
    }
}
