use std::path::Path;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tessera_consensus::RotationConfig;
use tessera_core::{serialize, KeyPair, NodeId, SealerList, SecretKey};
use tessera_sync::CatchUpConfig;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node secret key (hex)
    pub node_key: Option<String>,

    /// Sealer node ids (hex), in sealer-list order
    pub sealers: Vec<String>,

    /// Configured committee size
    pub group_size: usize,

    /// Blocks per rotation window
    pub rotating_interval: u64,

    /// Fan-out of the dissemination tree
    pub tree_width: usize,

    /// Block hashes remembered as already requested
    pub max_requested_queue_size: usize,

    /// Simulated block time in milliseconds
    pub block_time_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let rotation = RotationConfig::default();
        NodeConfig {
            node_key: None,
            sealers: Vec::new(),
            group_size: rotation.group_size,
            rotating_interval: rotation.rotating_interval,
            tree_width: 3,
            max_requested_queue_size: CatchUpConfig::default().max_requested_queue_size,
            block_time_ms: 1000,
        }
    }
}

impl NodeConfig {
    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serialize::from_json(&content)?)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serialize::to_json_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn keypair(&self) -> Result<KeyPair> {
        let key_hex = self
            .node_key
            .as_deref()
            .ok_or_else(|| anyhow!("node_key is not set"))?;
        let secret = SecretKey::from_hex(key_hex)?;
        let id = secret.node_id();
        Ok(KeyPair { secret, id })
    }

    pub fn sealer_list(&self) -> Result<SealerList> {
        let nodes = self
            .sealers
            .iter()
            .map(|s| NodeId::from_hex(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SealerList::new(nodes)?)
    }

    pub fn rotation_config(&self) -> RotationConfig {
        RotationConfig {
            group_size: self.group_size,
            rotating_interval: self.rotating_interval,
        }
    }

    pub fn catch_up_config(&self) -> CatchUpConfig {
        CatchUpConfig {
            max_requested_queue_size: self.max_requested_queue_size,
        }
    }
}

/// Generate a sample configuration with `sealer_count` fresh sealer keys.
/// The first sealer is the local node.
pub fn generate_sample_config(sealer_count: usize) -> NodeConfig {
    let keys: Vec<KeyPair> = (0..sealer_count.max(1)).map(|_| KeyPair::generate()).collect();

    NodeConfig {
        node_key: keys.first().map(|k| k.secret.to_hex()),
        sealers: keys.iter().map(|k| k.id.to_hex()).collect(),
        ..Default::default()
    }
}
