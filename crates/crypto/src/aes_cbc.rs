//! AES-128-CBC with a random IV header and PKCS#7 padding

use aes::Aes128;
use bundlefetch_errors::DecryptError;
use bundlefetch_types::FetchOptions;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};
use std::fmt;
use tracing::trace;

use crate::cipher::{CryptoStreamFactory, StreamDecryptor, StreamEncryptor};

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

const KEY_LEN: usize = 16;

/// Bundle cipher: `iv (16 bytes) || AES-128-CBC(plaintext, PKCS#7)`.
#[derive(Clone)]
pub struct Aes128CbcFactory {
    key: [u8; KEY_LEN],
}

impl fmt::Debug for Aes128CbcFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aes128CbcFactory").finish_non_exhaustive()
    }
}

impl Aes128CbcFactory {
    #[must_use]
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Parse a key from 32 hex digits.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not hex or not 16 bytes long.
    pub fn from_hex(key: &str) -> Result<Self, DecryptError> {
        let bytes = hex::decode(key.trim()).map_err(|e| DecryptError::Cipher(e.to_string()))?;
        let key: [u8; KEY_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| DecryptError::InvalidKeyLength {
                    expected: KEY_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self::new(key))
    }
}

impl CryptoStreamFactory for Aes128CbcFactory {
    fn header_len(&self) -> usize {
        AES_BLOCK_SIZE
    }

    fn block_size(&self) -> usize {
        AES_BLOCK_SIZE
    }

    fn create_decryptor(
        &self,
        header: &[u8],
        options: &FetchOptions,
    ) -> Result<Box<dyn StreamDecryptor>, DecryptError> {
        let iv: [u8; AES_BLOCK_SIZE] =
            header
                .try_into()
                .map_err(|_| DecryptError::TruncatedHeader {
                    received: header.len(),
                    required: AES_BLOCK_SIZE,
                })?;
        trace!(bundle = %options.bundle_name, "aes128_cbc: decryptor created");
        Ok(Box::new(CbcDecryptor { key: self.key, iv }))
    }

    fn create_encryptor(
        &self,
        options: &FetchOptions,
    ) -> Result<(Vec<u8>, Box<dyn StreamEncryptor>), DecryptError> {
        let iv: [u8; AES_BLOCK_SIZE] = rand::random();
        trace!(bundle = %options.bundle_name, "aes128_cbc: encryptor created");
        Ok((
            iv.to_vec(),
            Box::new(CbcEncryptor {
                key: self.key,
                iv,
                carry: Vec::with_capacity(AES_BLOCK_SIZE),
            }),
        ))
    }
}

fn check_aligned(len: usize) -> Result<(), DecryptError> {
    if len.is_multiple_of(AES_BLOCK_SIZE) {
        Ok(())
    } else {
        Err(DecryptError::Misaligned {
            len,
            block: AES_BLOCK_SIZE,
        })
    }
}

fn last_block(data: &[u8]) -> [u8; AES_BLOCK_SIZE] {
    let mut block = [0u8; AES_BLOCK_SIZE];
    block.copy_from_slice(&data[data.len() - AES_BLOCK_SIZE..]);
    block
}

/// Chains the IV across windows so each window decrypts independently.
struct CbcDecryptor {
    key: [u8; KEY_LEN],
    iv: [u8; AES_BLOCK_SIZE],
}

impl StreamDecryptor for CbcDecryptor {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), DecryptError> {
        if input.is_empty() {
            return Ok(());
        }
        check_aligned(input.len())?;

        // Next window's IV is this window's last ciphertext block
        let next_iv = last_block(input);
        let start = out.len();
        out.extend_from_slice(input);
        Decryptor::<Aes128>::new((&self.key).into(), (&self.iv).into())
            .decrypt_padded_mut::<NoPadding>(&mut out[start..])
            .map_err(|e| DecryptError::Cipher(e.to_string()))?;
        self.iv = next_iv;
        Ok(())
    }

    fn finalize(self: Box<Self>, input: &[u8], out: &mut Vec<u8>) -> Result<(), DecryptError> {
        if input.is_empty() {
            return Err(DecryptError::Padding("missing final block".to_string()));
        }
        check_aligned(input.len())?;

        let start = out.len();
        out.extend_from_slice(input);
        let plain_len = Decryptor::<Aes128>::new((&self.key).into(), (&self.iv).into())
            .decrypt_padded_mut::<Pkcs7>(&mut out[start..])
            .map_err(|e| DecryptError::Padding(e.to_string()))?
            .len();
        out.truncate(start + plain_len);
        Ok(())
    }
}

struct CbcEncryptor {
    key: [u8; KEY_LEN],
    iv: [u8; AES_BLOCK_SIZE],
    carry: Vec<u8>,
}

impl StreamEncryptor for CbcEncryptor {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), DecryptError> {
        self.carry.extend_from_slice(input);
        let full = self.carry.len() - self.carry.len() % AES_BLOCK_SIZE;
        if full == 0 {
            return Ok(());
        }

        let start = out.len();
        out.extend_from_slice(&self.carry[..full]);
        Encryptor::<Aes128>::new((&self.key).into(), (&self.iv).into())
            .encrypt_padded_mut::<NoPadding>(&mut out[start..], full)
            .map_err(|e| DecryptError::Cipher(e.to_string()))?;
        self.iv = last_block(&out[start..]);
        self.carry.drain(..full);
        Ok(())
    }

    fn finalize(self: Box<Self>, out: &mut Vec<u8>) -> Result<(), DecryptError> {
        let start = out.len();
        let tail = self.carry.len();
        out.extend_from_slice(&self.carry);
        out.resize(start + tail + (AES_BLOCK_SIZE - tail % AES_BLOCK_SIZE), 0);
        let cipher_len = Encryptor::<Aes128>::new((&self.key).into(), (&self.iv).into())
            .encrypt_padded_mut::<Pkcs7>(&mut out[start..], tail)
            .map_err(|e| DecryptError::Cipher(e.to_string()))?
            .len();
        out.truncate(start + cipher_len);
        Ok(())
    }
}
