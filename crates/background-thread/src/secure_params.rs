//! Secure-channel initialization parameters for the card reader.
//!
//! Unrelated to routing: the manager never calls a provider. It lives here so
//! hosts can expose it next to the background runtime.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key-management parameters for opening a secure channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitParams {
    #[serde(rename = "scpID")]
    pub scp_id: String,
    #[serde(rename = "keyUsage")]
    pub key_usage: String,
    #[serde(rename = "keyType")]
    pub key_type: String,
    #[serde(rename = "keyLength")]
    pub key_length: u32,
    #[serde(rename = "hostID")]
    pub host_id: String,
    pub crt: String,
    pub sk: String,
    #[serde(rename = "cardGroupID")]
    pub card_group_id: String,
}

impl Default for InitParams {
    /// Development parameters, used when no provisioned record is available.
    fn default() -> Self {
        Self {
            scp_id: "1107".to_string(),
            key_usage: "3C".to_string(),
            key_type: "88".to_string(),
            key_length: 16,
            host_id: "80".to_string(),
            crt: "20".to_string(),
            sk: "B6".to_string(),
            card_group_id: "01020304".to_string(),
        }
    }
}

pub trait SecureParamsProvider: Send + Sync {
    /// The parameters as JSON text.
    fn init_params(&self) -> Result<String>;
}

/// Serves a fixed [`InitParams`] record.
#[derive(Debug, Clone, Default)]
pub struct StaticParamsProvider {
    params: InitParams,
}

impl StaticParamsProvider {
    #[must_use]
    pub const fn new(params: InitParams) -> Self {
        Self { params }
    }
}

impl SecureParamsProvider for StaticParamsProvider {
    fn init_params(&self) -> Result<String> {
        serde_json::to_string(&self.params).map_err(Error::Serialize)
    }
}
