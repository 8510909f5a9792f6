use crate::error::AppError;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use uuid::Uuid;

pub const NONCE_LEN: usize = 24;

/// Handles server-managed symmetric encryption derived from a master key.
///
/// The master key is loaded once at process start and never rotated during a
/// run; each session gets its own HKDF-derived key. Decryption failure is
/// soft: callers map it to an opaque content marker, never a fatal error.
#[derive(Clone)]
pub struct MessageCodec {
    master_key: [u8; 32],
}

impl MessageCodec {
    pub fn new(master_key: [u8; 32]) -> Self {
        Self { master_key }
    }

    fn session_key(&self, session_id: Uuid) -> [u8; 32] {
        let hk = Hkdf::<Sha256>::new(None, &self.master_key);
        let mut key = [0u8; 32];
        hk.expand(session_id.as_bytes(), &mut key)
            .expect("HKDF expand must succeed for 32 byte output");
        key
    }

    pub fn encrypt(
        &self,
        session_id: Uuid,
        plaintext: &str,
    ) -> Result<(Vec<u8>, Vec<u8>), AppError> {
        let key = self.session_key(session_id);
        let cipher = XChaCha20Poly1305::new((&key).into());

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Encryption("encrypt failed".into()))?;

        Ok((ciphertext, nonce_bytes.to_vec()))
    }

    pub fn decrypt(
        &self,
        session_id: Uuid,
        ciphertext: &[u8],
        nonce: &[u8],
    ) -> Result<String, AppError> {
        if nonce.len() != NONCE_LEN {
            return Err(AppError::DecryptionFailed);
        }
        let key = self.session_key(session_id);
        let cipher = XChaCha20Poly1305::new((&key).into());

        let plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| AppError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| AppError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let codec = MessageCodec::new([1u8; 32]);
        let session = Uuid::new_v4();

        let (ciphertext, nonce) = codec.encrypt(session, "hello").unwrap();
        assert_ne!(ciphertext, b"hello");
        assert_eq!(codec.decrypt(session, &ciphertext, &nonce).unwrap(), "hello");
    }

    #[test]
    fn wrong_master_key_fails_softly() {
        let codec = MessageCodec::new([1u8; 32]);
        let rotated = MessageCodec::new([2u8; 32]);
        let session = Uuid::new_v4();

        let (ciphertext, nonce) = codec.encrypt(session, "secret").unwrap();
        assert!(matches!(
            rotated.decrypt(session, &ciphertext, &nonce),
            Err(AppError::DecryptionFailed)
        ));
    }

    #[test]
    fn session_keys_do_not_cross() {
        let codec = MessageCodec::new([1u8; 32]);
        let (ciphertext, nonce) = codec.encrypt(Uuid::new_v4(), "secret").unwrap();
        assert!(codec.decrypt(Uuid::new_v4(), &ciphertext, &nonce).is_err());
    }

    #[test]
    fn tampered_nonce_fails() {
        let codec = MessageCodec::new([1u8; 32]);
        let session = Uuid::new_v4();

        let (ciphertext, mut nonce) = codec.encrypt(session, "secret").unwrap();
        nonce[0] ^= 0xff;
        assert!(codec.decrypt(session, &ciphertext, &nonce).is_err());
    }
}
