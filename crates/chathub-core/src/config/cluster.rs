//! Multi-process deployment configuration.

use serde::{Deserialize, Serialize};

use crate::types::ProcessId;

/// Identity of this process and naming of the cross-process channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Explicit process ID; generated from the host name when absent.
    #[serde(default)]
    pub process_id: Option<String>,
    /// Prefix of the per-process delivery channel.
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
    /// Buffer of the in-process bus used by the memory provider.
    #[serde(default = "default_bus_buffer")]
    pub bus_buffer_size: usize,
}

impl ClusterConfig {
    /// Resolve the process ID for this server instance.
    pub fn resolve_process_id(&self) -> ProcessId {
        match &self.process_id {
            Some(id) if !id.trim().is_empty() => ProcessId::new(id.trim()),
            _ => ProcessId::generate(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            process_id: None,
            channel_prefix: default_channel_prefix(),
            bus_buffer_size: default_bus_buffer(),
        }
    }
}

fn default_channel_prefix() -> String {
    "chathub:deliver:".to_string()
}

fn default_bus_buffer() -> usize {
    1024
}
