use sha2::{Digest, Sha256};

use crate::core::meta::ShardNode;

/// Rotation applied to the roster for `filename`: the first byte of its
/// SHA-256 digest, reduced modulo the roster size.
pub fn placement_offset(filename: &str, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let digest = Sha256::digest(filename.as_bytes());
    digest[0] as usize % n
}

/// Ordered shard sequence for `filename`.
///
/// `roster` must hold the shards with `id <= epoch`, in id order. The result
/// is that roster rotated left by [`placement_offset`], so fragment `k` of the
/// file lives on `S[k % n]`. It is a pure function of the name and the
/// roster prefix, which never changes once written.
pub fn resolve_shards(filename: &str, roster: &[ShardNode]) -> Vec<String> {
    let n = roster.len();
    let offset = placement_offset(filename, n);

    (0..n)
        .map(|i| roster[(i + offset) % n].address.clone())
        .collect()
}

/// Shard that holds fragment `index` in a resolved sequence.
pub fn shard_for_fragment(shards: &[String], index: u64) -> Option<&str> {
    if shards.is_empty() {
        return None;
    }
    let slot = (index % shards.len() as u64) as usize;
    Some(shards[slot].as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(n: u64) -> Vec<ShardNode> {
        (1..=n)
            .map(|id| ShardNode {
                id,
                address: format!("http://s{}/file", id),
            })
            .collect()
    }

    #[test]
    fn test_offset_is_first_digest_byte_mod_n() {
        // sha256("a") = ca978112...
        assert_eq!(placement_offset("a", 6), 0xca % 6);
        assert_eq!(placement_offset("a", 256), 0xca);
        assert_eq!(placement_offset("a", 0), 0);
    }

    #[test]
    fn test_resolve_is_rotation_of_roster() {
        let r = roster(6);
        let shards = resolve_shards("a", &r);
        assert_eq!(shards.len(), 6);

        let offset = placement_offset("a", 6);
        for (i, addr) in shards.iter().enumerate() {
            assert_eq!(addr, &r[(i + offset) % 6].address);
        }

        // Every shard appears exactly once
        let mut sorted = shards.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 6);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let r = roster(5);
        for name in ["a", "b", "report.pdf", "x_y_z"] {
            assert_eq!(resolve_shards(name, &r), resolve_shards(name, &r));
        }
    }

    #[test]
    fn test_single_shard_gets_everything() {
        let r = roster(1);
        assert_eq!(resolve_shards("anything", &r), vec!["http://s1/file"]);
    }

    #[test]
    fn test_empty_roster_resolves_to_nothing() {
        assert!(resolve_shards("a", &[]).is_empty());
        assert_eq!(shard_for_fragment(&[], 3), None);
    }

    #[test]
    fn test_fragment_slot_wraps() {
        let shards: Vec<String> = (0..3).map(|i| format!("s{}", i)).collect();
        assert_eq!(shard_for_fragment(&shards, 0), Some("s0"));
        assert_eq!(shard_for_fragment(&shards, 2), Some("s2"));
        assert_eq!(shard_for_fragment(&shards, 3), Some("s0"));
        assert_eq!(shard_for_fragment(&shards, 7), Some("s1"));
    }
}
