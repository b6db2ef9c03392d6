//! Key-to-partition mapping.

use sha2::{Digest, Sha256};

/// Returns the partition for `key` out of `partitions`.
///
/// The mapping hashes the key bytes with SHA-256 and reduces the first eight bytes modulo the
/// partition count, so it is stable across processes and restarts. `partitions` must be
/// non-zero; topics are created with at least one partition.
pub fn partition_for_key(key: &str, partitions: u32) -> u32 {
    debug_assert!(partitions > 0, "topics always have at least one partition");
    let digest = Sha256::digest(key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % u64::from(partitions.max(1))) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_partition() {
        let key = "7f4c2e9d-4b0a-4f3a-9a2c-0e9a6b5d1c88";
        let first = partition_for_key(key, 3);
        for _ in 0..100 {
            assert_eq!(partition_for_key(key, 3), first);
        }
    }

    #[test]
    fn result_is_within_range() {
        for i in 0..500 {
            let key = format!("patient-{i}");
            assert!(partition_for_key(&key, 3) < 3);
            assert_eq!(partition_for_key(&key, 1), 0);
        }
    }

    #[test]
    fn keys_spread_over_partitions() {
        let mut seen = [false; 3];
        for i in 0..200 {
            seen[partition_for_key(&format!("patient-{i}"), 3) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s), "every partition should receive keys");
    }
}
