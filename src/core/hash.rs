//! FNV-1a hashing for node identifiers and record signatures

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Master constant mixed into every record signature ("VFS1")
pub const MASTER_SIGNATURE: u32 = 0x5646_5331;

/// FNV-1a hash of a byte slice, producing a 32-bit hash.
pub const fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// Signature of a record kind: hash of the kind name XOR the master constant.
pub const fn signature_of(kind: &str) -> u32 {
    fnv1a32(kind.as_bytes()) ^ MASTER_SIGNATURE
}

/// Node identifier for a path key such as `ROOT\DOCS\A.TXT`.
///
/// Keys are upper-cased so ids agree with case-insensitive name lookup.
/// Distinct paths that collide are not detected.
pub fn node_id(path_key: &str) -> u32 {
    fnv1a32(path_key.to_uppercase().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_reference_vectors() {
        assert_eq!(fnv1a32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_signatures_are_distinct() {
        assert_ne!(signature_of("DataCluster"), signature_of("NodeCluster"));
        assert_ne!(signature_of("Header"), signature_of("ClusterMap"));
    }

    #[test]
    fn test_node_id_ignores_case() {
        assert_eq!(node_id("ROOT\\Docs"), node_id("root\\DOCS"));
        assert_eq!(node_id("ROOT"), fnv1a32(b"ROOT"));
    }
}
