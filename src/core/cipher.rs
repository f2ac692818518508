//! AES-128-CBC encryption for framed record payloads
//!
//! Every encrypted record is transformed independently:
//! - A fresh encryptor/decryptor per read or write
//! - Fixed key and IV (embedded default, or supplied by configuration)
//! - Zero padding: payload regions are zero-filled to a multiple of the
//!   16-byte block size before encryption, so ciphertext length equals
//!   plaintext length and no padding bytes need to be stripped on decrypt

use crate::error::{Result, VfsError};
use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;
use rand::RngCore;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Cipher key (16 bytes for AES-128)
pub type CipherKey = [u8; 16];

/// Initialisation vector (one AES block)
pub type CipherIv = [u8; 16];

pub type Encryptor = cbc::Encryptor<Aes128>;
pub type Decryptor = cbc::Decryptor<Aes128>;

const EMBEDDED_KEY: CipherKey = [
    0x3a, 0x91, 0x5c, 0x0e, 0x72, 0xd4, 0x19, 0xb8, 0x66, 0x2f, 0xe3, 0x40, 0x8d, 0x17, 0xc5, 0x9b,
];

const EMBEDDED_IV: CipherIv = [
    0x0f, 0x4e, 0xa2, 0x37, 0x81, 0x6c, 0xd9, 0x25, 0xbe, 0x03, 0x58, 0xf1, 0x94, 0x7a, 0x2d, 0xc6,
];

/// Cipher factory shared by every record kind
#[derive(Clone)]
pub struct Cipher {
    key: CipherKey,
    iv: CipherIv,
}

impl Cipher {
    pub fn new(key: CipherKey, iv: CipherIv) -> Self {
        Cipher { key, iv }
    }

    /// Generate a random key
    pub fn generate_key() -> CipherKey {
        let mut key = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut key);
        key
    }

    pub fn create_encryptor(&self) -> Encryptor {
        Encryptor::new(&self.key.into(), &self.iv.into())
    }

    pub fn create_decryptor(&self) -> Decryptor {
        Decryptor::new(&self.key.into(), &self.iv.into())
    }

    /// Encrypt a zero-padded payload region in place
    pub fn encrypt(&self, buf: &mut [u8]) -> Result<()> {
        check_aligned(buf.len())?;
        let len = buf.len();
        self.create_encryptor()
            .encrypt_padded_mut::<NoPadding>(buf, len)
            .map_err(|e| VfsError::Cipher(format!("Encryption failed: {:?}", e)))?;
        Ok(())
    }

    /// Decrypt a payload region in place
    pub fn decrypt(&self, buf: &mut [u8]) -> Result<()> {
        check_aligned(buf.len())?;
        self.create_decryptor()
            .decrypt_padded_mut::<NoPadding>(buf)
            .map_err(|e| VfsError::Cipher(format!("Decryption failed: {:?}", e)))?;
        Ok(())
    }
}

impl Default for Cipher {
    fn default() -> Self {
        Cipher::new(EMBEDDED_KEY, EMBEDDED_IV)
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

fn check_aligned(len: usize) -> Result<()> {
    if len % BLOCK_SIZE != 0 {
        return Err(VfsError::Cipher(format!(
            "Payload length {} is not a multiple of {}",
            len, BLOCK_SIZE
        )));
    }
    Ok(())
}

/// Round a region length down to whole cipher blocks
pub const fn block_floor(len: usize) -> usize {
    len / BLOCK_SIZE * BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_in_place() {
        let cipher = Cipher::default();
        let plaintext = *b"Hello, World! This is a secret!!";
        let mut buf = plaintext;

        cipher.encrypt(&mut buf).unwrap();
        assert_ne!(buf, plaintext);

        cipher.decrypt(&mut buf).unwrap();
        assert_eq!(buf, plaintext);
    }

    #[test]
    fn test_zero_padding_keeps_length() {
        let cipher = Cipher::default();
        let mut buf = vec![0u8; 64];
        buf[..5].copy_from_slice(b"short");

        cipher.encrypt(&mut buf).unwrap();
        assert_eq!(buf.len(), 64);

        cipher.decrypt(&mut buf).unwrap();
        assert_eq!(&buf[..5], b"short");
        assert!(buf[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_unaligned_payload_rejected() {
        let cipher = Cipher::default();
        let mut buf = vec![0u8; 17];
        assert!(matches!(cipher.encrypt(&mut buf), Err(VfsError::Cipher(_))));
    }

    #[test]
    fn test_wrong_key_garbles() {
        let a = Cipher::default();
        let b = Cipher::new(Cipher::generate_key(), EMBEDDED_IV);
        let plaintext = [0x42u8; 32];
        let mut buf = plaintext;

        a.encrypt(&mut buf).unwrap();
        b.decrypt(&mut buf).unwrap();
        assert_ne!(buf, plaintext);
    }

    #[test]
    fn test_block_floor() {
        assert_eq!(block_floor(32756), 32752);
        assert_eq!(block_floor(16), 16);
        assert_eq!(block_floor(15), 0);
    }
}
