use sha3::{Digest, Keccak256};

pub const HASH_RESULT_LEN: usize = 32;

pub fn keccak256(data: &[u8]) -> [u8; HASH_RESULT_LEN] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut res = [0x00u8; HASH_RESULT_LEN];
    res.copy_from_slice(&digest);
    res
}

/// Hash a message the way on-chain signature checks expect it: prefixed
/// with the signed-message header and the message length.
pub fn prefixed_message_hash(message: &[u8]) -> [u8; HASH_RESULT_LEN] {
    let mut data = Vec::with_capacity(message.len() + 30);
    data.extend_from_slice(b"\x19Ethereum Signed Message:\n");
    data.extend_from_slice(message.len().to_string().as_bytes());
    data.extend_from_slice(message);
    keccak256(&data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        // keccak256 of the empty string, a fixed reference value.
        let digest = keccak256(b"");
        assert_eq!(
            digest[..4],
            [0xc5, 0xd2, 0x46, 0x01][..]
        );
    }

    #[test]
    fn test_prefixed_hash_differs_from_plain() {
        let message = b"migrate";
        assert_ne!(keccak256(message), prefixed_message_hash(message));
    }
}
