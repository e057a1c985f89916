use concord_core::MemberId;
use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{PublicKey, SecretKey};
use zeroize::{Zeroize, Zeroizing};

use crate::hash::member_id_from_pubkey;

/// A member keypair: Dilithium2 public + secret keys with a derived
/// `MemberId`. The secret key is zeroized on drop.
pub struct KeyPair {
    pub member_id: MemberId,
    pub public_key: Vec<u8>,
    secret_key: Vec<u8>,
}

impl KeyPair {
    /// Generate a fresh Dilithium2 keypair.
    pub fn generate() -> Self {
        let (pk, sk) = dilithium2::keypair();
        let public_key = pk.as_bytes().to_vec();
        let member_id = member_id_from_pubkey(&public_key);
        Self {
            member_id,
            public_key,
            secret_key: sk.as_bytes().to_vec(),
        }
    }

    /// Sign `message` using this keypair's secret key.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let sk = Zeroizing::new(self.secret_key.clone());
        crate::dilithium::sign(&sk, message).expect("sign with valid secret key is infallible")
    }

    /// Restore a keypair from raw bytes (e.g. loaded from a fixture file).
    pub fn from_raw(pk_bytes: Vec<u8>, sk_bytes: Vec<u8>) -> Self {
        let member_id = member_id_from_pubkey(&pk_bytes);
        Self {
            member_id,
            public_key: pk_bytes,
            secret_key: sk_bytes,
        }
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ member_id: {:?} }}", self.member_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verifies_against_own_public_key() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"hello cell");
        assert!(crate::dilithium::verify_signature(&kp.public_key, b"hello cell", &sig).is_ok());
    }

    #[test]
    fn member_id_is_derived_from_public_key() {
        let kp = KeyPair::generate();
        assert_eq!(kp.member_id, member_id_from_pubkey(&kp.public_key));
    }
}
