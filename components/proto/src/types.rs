use common::define_fixed_bytes;

define_fixed_bytes!(Address, 20);
define_fixed_bytes!(ChannelId, 32);
define_fixed_bytes!(TxHash, 32);
define_fixed_bytes!(PayId, 32);
define_fixed_bytes!(Signature, 65);

/// Token contracts are addressed the same way participants are.
pub type TokenAddr = Address;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_ordering_by_bytes() {
        let low = Address::from(&[0x01u8; 20]);
        let high = Address::from(&[0x02u8; 20]);
        assert!(low < high);
    }

    #[test]
    fn test_channel_id_from_hex() {
        let cid = ChannelId::from_hex(
            "23a548990ef70278cdb6519b3646a04646408e9aec09b19c8f16e8ae9ad30871",
        )
        .unwrap();
        assert_eq!(
            cid.to_string(),
            "23a548990ef70278cdb6519b3646a04646408e9aec09b19c8f16e8ae9ad30871"
        );
    }
}
