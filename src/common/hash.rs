//! Hashing utilities for fastkv
//!
//! - BLAKE3 for value checksums
//! - HRW (Highest Random Weight) for replica placement
//! - Key digests for on-volume paths

use crate::common::utils::encode_key;
use blake3::Hasher;

/// Compute BLAKE3 hash of data, return hex string
pub fn blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

fn weight(key: &[u8], node: &str) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(key);
    hasher.update(node.as_bytes());
    let hash = hasher.finalize();
    let mut word = [0u8; 8];
    word.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(word)
}

/// HRW (Highest Random Weight) hashing for replica placement
///
/// Given a key and a set of nodes, returns the nodes sorted by their weight
/// for that key. The order only depends on the key and the node names, so
/// adding or removing a node moves only the keys that ranked it.
pub fn hrw_hash(key: &[u8], nodes: &[String]) -> Vec<String> {
    let mut weights: Vec<(&String, u64)> = nodes.iter().map(|n| (n, weight(key, n))).collect();

    // Sort by weight (descending), ties broken by name so the order is total
    weights.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    weights.into_iter().map(|(node, _)| node.clone()).collect()
}

/// Subvolume (disk) of `volume` that stores `key`
pub fn subvolume_for(key: &[u8], volume: &str, subvolumes: u32) -> u32 {
    (weight(key, volume) % u64::from(subvolumes.max(1))) as u32
}

/// Compute directory prefix for blob storage (2-level hierarchy)
///
/// Returns (aa, bb) where aa and bb are the first two bytes of BLAKE3(key)
pub fn blob_prefix(key: &[u8]) -> (String, String) {
    let hash = blake3::hash(key);
    let bytes = hash.as_bytes();
    (format!("{:02x}", bytes[0]), format!("{:02x}", bytes[1]))
}

/// Path of `key` on `volume`: `/sv{NN}/{aa}/{bb}/{encoded key}`
pub fn volume_path(key: &[u8], volume: &str, subvolumes: u32) -> String {
    let (aa, bb) = blob_prefix(key);
    let sv = subvolume_for(key, volume, subvolumes);
    format!(
        "/sv{:02X}/{}/{}/{}",
        sv,
        aa,
        bb,
        encode_key(&String::from_utf8_lossy(key))
    )
}
