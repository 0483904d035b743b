//! Partitioning of a selection into disjoint worker shards.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::types::SelectionEntry;

/// How entries are assigned to shards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ShardStrategy {
    /// Stable hash of the test path; all cases of a module share a shard.
    #[default]
    Hash,
    /// Entry position modulo shard count.
    RoundRobin,
}

/// One-based shard index out of `count`, written `K/N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSpec {
    pub index: usize,
    pub count: usize,
}

impl FromStr for ShardSpec {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let (index, count) = raw
            .split_once('/')
            .ok_or_else(|| anyhow!("shard must look like K/N, got '{raw}'"))?;
        let index: usize = index
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid shard index in '{raw}'"))?;
        let count: usize = count
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid shard count in '{raw}'"))?;
        if count == 0 || index == 0 || index > count {
            return Err(anyhow!("shard index must be within 1..={count}, got '{raw}'"));
        }
        Ok(Self { index, count })
    }
}

impl fmt::Display for ShardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.count)
    }
}

/// Split `entries` into `count` shards, preserving relative order.
pub fn partition(
    entries: &[SelectionEntry],
    count: usize,
    strategy: ShardStrategy,
) -> Vec<Vec<SelectionEntry>> {
    let count = count.max(1);
    let mut shards = vec![Vec::new(); count];
    for (pos, entry) in entries.iter().enumerate() {
        let slot = match strategy {
            ShardStrategy::Hash => (stable_hash(&entry.test) % count as u64) as usize,
            ShardStrategy::RoundRobin => pos % count,
        };
        shards[slot].push(entry.clone());
    }
    shards
}

/// Entries belonging to the shard described by `spec`; empty if out of range.
pub fn shard(
    entries: &[SelectionEntry],
    spec: ShardSpec,
    strategy: ShardStrategy,
) -> Vec<SelectionEntry> {
    partition(entries, spec.count, strategy)
        .into_iter()
        .nth(spec.index.saturating_sub(1))
        .unwrap_or_default()
}

fn stable_hash(path: &str) -> u64 {
    let digest = Sha256::digest(path.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}
