//! Snapshot model and error definitions for the control plane.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol served by an inbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Shadowsocks,
    Vmess,
    Vless,
    Trojan,
    Hysteria2,
    #[serde(other)]
    Unknown,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Shadowsocks => "shadowsocks",
            ProtocolKind::Vmess => "vmess",
            ProtocolKind::Vless => "vless",
            ProtocolKind::Trojan => "trojan",
            ProtocolKind::Hysteria2 => "hysteria2",
            ProtocolKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level security of an inbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    #[default]
    None,
    Tls,
    Reality,
    #[serde(other)]
    Unknown,
}

/// Carrier network of an inbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Tcp,
    Ws,
    Grpc,
    Http,
    Quic,
    #[serde(other)]
    Unknown,
}

/// Transport options for an inbound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportOptions {
    pub network: Network,
    pub path: Option<String>,
    pub host: Option<String>,
    pub service_name: Option<String>,
}

/// One inbound as described by the panel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProtocolDescriptor {
    #[serde(rename = "type")]
    pub protocol: ProtocolKind,
    pub port: u16,
    #[serde(rename = "enable")]
    pub enabled: bool,
    #[serde(default)]
    pub security: SecurityMode,
    #[serde(default)]
    pub transport: TransportOptions,
}

impl ProtocolDescriptor {
    /// Engine tag for this inbound, unique per (protocol, port).
    pub fn tag(&self) -> String {
        format!("{}_{}", self.protocol, self.port)
    }
}

/// Raw panel response body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfigResponse {
    pub data: Option<ServerData>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerData {
    #[serde(default)]
    pub server_id: u64,
    pub total: Option<usize>,
    pub protocols: Option<Vec<ProtocolDescriptor>>,
}

/// Immutable view of which inbounds should run, fetched once per cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub server_id: u64,
    pub protocols: Option<Vec<ProtocolDescriptor>>,
    pub total: usize,
}

impl ConfigSnapshot {
    /// Build a snapshot whose total matches its descriptor list.
    pub fn new(server_id: u64, protocols: Vec<ProtocolDescriptor>) -> Self {
        Self {
            server_id,
            total: protocols.len(),
            protocols: Some(protocols),
        }
    }

    /// Enabled descriptors in fetch order.
    pub fn enabled(&self) -> impl Iterator<Item = &ProtocolDescriptor> {
        self.protocols.iter().flatten().filter(|p| p.enabled)
    }
}

impl TryFrom<ServerConfigResponse> for ConfigSnapshot {
    type Error = ControlPlaneError;

    fn try_from(response: ServerConfigResponse) -> Result<Self, Self::Error> {
        let data = response.data.ok_or(ControlPlaneError::MissingData)?;
        let listed = data.protocols.as_ref().map(Vec::len).unwrap_or(0);
        let total = data.total.unwrap_or(listed);
        if data.protocols.is_some() && total != listed {
            return Err(ControlPlaneError::TotalMismatch {
                declared: total,
                listed,
            });
        }
        Ok(Self {
            server_id: data.server_id,
            protocols: data.protocols,
            total,
        })
    }
}

/// Errors that can occur while fetching a snapshot.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// The panel host could not be turned into a request URL.
    #[error("Invalid panel URL '{0}'")]
    InvalidUrl(String),

    /// Transport failure or timeout.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Panel answered with a non-success status.
    #[error("Panel returned status {0}")]
    Status(u16),

    /// Response carried no `data` object.
    #[error("Panel response has no data")]
    MissingData,

    /// Declared total disagrees with the protocol list.
    #[error("Panel declared {declared} protocols but listed {listed}")]
    TotalMismatch { declared: usize, listed: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_panel_response() {
        let body = r#"{
            "data": {
                "server_id": 4,
                "total": 2,
                "protocols": [
                    {"type": "shadowsocks", "port": 10001, "enable": true, "security": "none"},
                    {"type": "vless", "port": 443, "enable": false, "security": "reality",
                     "transport": {"network": "grpc", "service_name": "svc"}}
                ]
            }
        }"#;
        let response: ServerConfigResponse = serde_json::from_str(body).unwrap();
        let snapshot = ConfigSnapshot::try_from(response).unwrap();

        assert_eq!(snapshot.server_id, 4);
        assert_eq!(snapshot.total, 2);
        let protocols = snapshot.protocols.as_ref().unwrap();
        assert_eq!(protocols[0].protocol, ProtocolKind::Shadowsocks);
        assert_eq!(protocols[1].security, SecurityMode::Reality);
        assert_eq!(protocols[1].transport.network, Network::Grpc);
        assert_eq!(snapshot.enabled().count(), 1);
    }

    #[test]
    fn test_unknown_protocol_does_not_break_decoding() {
        let body = r#"{"type": "wireguard", "port": 51820, "enable": true}"#;
        let descriptor: ProtocolDescriptor = serde_json::from_str(body).unwrap();
        assert_eq!(descriptor.protocol, ProtocolKind::Unknown);
        assert_eq!(descriptor.security, SecurityMode::None);
    }

    #[test]
    fn test_total_mismatch_rejected() {
        let response = ServerConfigResponse {
            data: Some(ServerData {
                server_id: 1,
                total: Some(3),
                protocols: Some(Vec::new()),
            }),
        };
        let err = ConfigSnapshot::try_from(response).unwrap_err();
        assert!(matches!(err, ControlPlaneError::TotalMismatch { declared: 3, listed: 0 }));
    }

    #[test]
    fn test_absent_protocol_list_is_kept_absent() {
        let response = ServerConfigResponse {
            data: Some(ServerData {
                server_id: 1,
                total: None,
                protocols: None,
            }),
        };
        let snapshot = ConfigSnapshot::try_from(response).unwrap();
        assert!(snapshot.protocols.is_none());
        assert_eq!(snapshot.total, 0);
    }

    #[test]
    fn test_missing_data_rejected() {
        let err = ConfigSnapshot::try_from(ServerConfigResponse { data: None }).unwrap_err();
        assert_eq!(err.to_string(), "Panel response has no data");
    }

    #[test]
    fn test_tag() {
        let descriptor: ProtocolDescriptor =
            serde_json::from_str(r#"{"type": "trojan", "port": 8443, "enable": true}"#).unwrap();
        assert_eq!(descriptor.tag(), "trojan_8443");
    }
}
