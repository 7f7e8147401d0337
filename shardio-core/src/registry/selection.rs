const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1 (multiply, then xor).
pub fn fnv1_64(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        hash.wrapping_mul(FNV_PRIME) ^ u64::from(*byte)
    })
}

/// Routing key for the fragment opened by `payload`.
///
/// `consumed` counts every byte read so far in the session, including `payload`.
pub fn selection_key(filename: &str, consumed: u64, payload: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(filename.len() + 8 + payload.len());
    key.extend_from_slice(filename.as_bytes());
    key.extend_from_slice(&consumed.to_le_bytes());
    key.extend_from_slice(payload);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1_64_reference_values() {
        assert_eq!(fnv1_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1_64(b"a"), 0xaf63bd4c8601b7be);
        assert_eq!(fnv1_64(b"foobar"), 0x340d8765a4dda9c2);
    }

    #[test]
    fn test_selection_key_layout() {
        let key = selection_key("ab", 258, &[9]);
        assert_eq!(key, vec![b'a', b'b', 2, 1, 0, 0, 0, 0, 0, 0, 9]);
    }
}
