use std::convert::TryFrom;

use rand::Rng;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

use proto::types::{Address, Signature};

use crate::hash::{keccak256, prefixed_message_hash};

#[derive(Debug, PartialEq, Eq)]
pub enum CryptoError {
    InvalidSecretKey,
    SigningFailed,
}

/// Message signing capability. Everything a node signs (routing updates,
/// migration payloads, explorer reports) goes through this trait, so key
/// material can live behind hardware or remote signers.
pub trait Signer: Send + Sync {
    fn sign_message(&self, message: &[u8]) -> Result<Signature, CryptoError>;
    fn address(&self) -> Address;
}

/// An in-process signer over a recoverable secp256k1 key.
#[derive(Debug)]
pub struct SoftwareSecpIdentity {
    secret_key: SecretKey,
    address: Address,
    secp: Secp256k1<All>,
}

impl SoftwareSecpIdentity {
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self, CryptoError> {
        let secp = Secp256k1::new();
        let secret_key =
            SecretKey::from_slice(secret).map_err(|_| CryptoError::InvalidSecretKey)?;
        let public_key = secret_key.public_key(&secp);
        let address = public_key_address(&public_key);
        Ok(SoftwareSecpIdentity {
            secret_key,
            address,
            secp,
        })
    }

    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::new(rng);
        let public_key = secret_key.public_key(&secp);
        let address = public_key_address(&public_key);
        SoftwareSecpIdentity {
            secret_key,
            address,
            secp,
        }
    }
}

impl Signer for SoftwareSecpIdentity {
    fn sign_message(&self, message: &[u8]) -> Result<Signature, CryptoError> {
        let digest = prefixed_message_hash(message);
        let msg =
            Message::from_digest_slice(&digest).map_err(|_| CryptoError::SigningFailed)?;
        let recoverable = self.secp.sign_ecdsa_recoverable(&msg, &self.secret_key);
        let (recovery_id, compact) = recoverable.serialize_compact();

        let mut sig_bytes = [0x00u8; Signature::len()];
        sig_bytes[..64].copy_from_slice(&compact);
        // On-chain convention puts the recovery id last, offset by 27.
        sig_bytes[64] = (recovery_id.to_i32() as u8) + 27;
        Ok(Signature::from(sig_bytes))
    }

    fn address(&self) -> Address {
        self.address
    }
}

/// Check that `sig` is a valid signature of `message` by the key behind
/// `addr`. Recovers the public key from the signature and compares the
/// derived address.
pub fn verify_signature(addr: &Address, message: &[u8], sig: &Signature) -> bool {
    let digest = prefixed_message_hash(message);
    let msg = match Message::from_digest_slice(&digest) {
        Ok(msg) => msg,
        Err(_) => return false,
    };

    let v = sig.as_ref()[64];
    let recovery = i32::from(if v >= 27 { v - 27 } else { v });
    let recovery_id = match RecoveryId::from_i32(recovery) {
        Ok(recovery_id) => recovery_id,
        Err(_) => return false,
    };
    let recoverable = match RecoverableSignature::from_compact(&sig.as_ref()[..64], recovery_id)
    {
        Ok(recoverable) => recoverable,
        Err(_) => return false,
    };

    let secp = Secp256k1::new();
    let public_key = match secp.recover_ecdsa(&msg, &recoverable) {
        Ok(public_key) => public_key,
        Err(_) => return false,
    };
    public_key_address(&public_key) == *addr
}

fn public_key_address(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    // Skip the 0x04 encoding tag, keep the low 20 bytes of the hash.
    let digest = keccak256(&uncompressed[1..]);
    Address::try_from(&digest[12..]).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_round_trip() {
        let identity = SoftwareSecpIdentity::from_secret_bytes(&[0x11u8; 32]).unwrap();
        let message = b"routing update payload";
        let sig = identity.sign_message(message).unwrap();
        assert!(verify_signature(&identity.address(), message, &sig));
    }

    #[test]
    fn test_verify_rejects_wrong_address() {
        let identity = SoftwareSecpIdentity::from_secret_bytes(&[0x11u8; 32]).unwrap();
        let other = SoftwareSecpIdentity::from_secret_bytes(&[0x22u8; 32]).unwrap();
        let message = b"routing update payload";
        let sig = identity.sign_message(message).unwrap();
        assert!(!verify_signature(&other.address(), message, &sig));
    }

    #[test]
    fn test_verify_rejects_tampered_message() {
        let identity = SoftwareSecpIdentity::from_secret_bytes(&[0x11u8; 32]).unwrap();
        let sig = identity.sign_message(b"original").unwrap();
        assert!(!verify_signature(&identity.address(), b"tampered", &sig));
    }

    #[test]
    fn test_known_address_derivation() {
        // The address of secret key 0x...01 is a well known reference value.
        let mut secret = [0x00u8; 32];
        secret[31] = 0x01;
        let identity = SoftwareSecpIdentity::from_secret_bytes(&secret).unwrap();
        assert_eq!(
            identity.address().to_string(),
            "7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_invalid_secret_rejected() {
        assert_eq!(
            SoftwareSecpIdentity::from_secret_bytes(&[0x00u8; 32]).unwrap_err(),
            CryptoError::InvalidSecretKey
        );
    }
}
