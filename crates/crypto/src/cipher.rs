//! Cipher collaborator traits

use bundlefetch_errors::DecryptError;
use bundlefetch_types::FetchOptions;

/// Incremental decryption of one ciphertext stream.
pub trait StreamDecryptor: Send {
    /// Decrypt `input`, which is a whole number of cipher blocks and is not
    /// the end of the stream, appending plaintext to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if `input` is misaligned or the cipher fails.
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), DecryptError>;

    /// Decrypt the final bytes of the stream, removing any padding.
    ///
    /// # Errors
    ///
    /// Returns an error if the trailing bytes are truncated or the padding is
    /// rejected.
    fn finalize(self: Box<Self>, input: &[u8], out: &mut Vec<u8>) -> Result<(), DecryptError>;
}

/// Incremental encryption of one plaintext stream.
pub trait StreamEncryptor: Send {
    /// Encrypt `input`, appending whatever ciphertext is ready to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cipher fails.
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), DecryptError>;

    /// Flush buffered plaintext and padding.
    ///
    /// # Errors
    ///
    /// Returns an error if the cipher fails.
    fn finalize(self: Box<Self>, out: &mut Vec<u8>) -> Result<(), DecryptError>;
}

/// Creates cipher streams for bundles.
///
/// Ciphertext layout is `header || body`. The header (an IV, a nonce, or
/// nothing) is produced by the encryptor and must be complete before a
/// decryptor can be created for it.
pub trait CryptoStreamFactory: Send + Sync {
    /// Bytes of header that precede the body.
    fn header_len(&self) -> usize;

    /// Granularity that `StreamDecryptor::update` inputs must respect.
    fn block_size(&self) -> usize;

    /// Create a decryptor from a complete header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is malformed.
    fn create_decryptor(
        &self,
        header: &[u8],
        options: &FetchOptions,
    ) -> Result<Box<dyn StreamDecryptor>, DecryptError>;

    /// Create an encryptor together with the header to write before its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the cipher cannot be initialised.
    fn create_encryptor(
        &self,
        options: &FetchOptions,
    ) -> Result<(Vec<u8>, Box<dyn StreamEncryptor>), DecryptError>;
}

/// Identity cipher for bundles shipped in the clear.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFactory;

struct Passthrough;

impl StreamDecryptor for Passthrough {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), DecryptError> {
        out.extend_from_slice(input);
        Ok(())
    }

    fn finalize(self: Box<Self>, input: &[u8], out: &mut Vec<u8>) -> Result<(), DecryptError> {
        out.extend_from_slice(input);
        Ok(())
    }
}

impl StreamEncryptor for Passthrough {
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), DecryptError> {
        out.extend_from_slice(input);
        Ok(())
    }

    fn finalize(self: Box<Self>, _out: &mut Vec<u8>) -> Result<(), DecryptError> {
        Ok(())
    }
}

impl CryptoStreamFactory for PassthroughFactory {
    fn header_len(&self) -> usize {
        0
    }

    fn block_size(&self) -> usize {
        1
    }

    fn create_decryptor(
        &self,
        _header: &[u8],
        _options: &FetchOptions,
    ) -> Result<Box<dyn StreamDecryptor>, DecryptError> {
        Ok(Box::new(Passthrough))
    }

    fn create_encryptor(
        &self,
        _options: &FetchOptions,
    ) -> Result<(Vec<u8>, Box<dyn StreamEncryptor>), DecryptError> {
        Ok((Vec::new(), Box::new(Passthrough)))
    }
}
