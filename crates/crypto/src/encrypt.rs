//! Preparing encrypted bundles

use bundlefetch_errors::{DecryptError, Error};
use bundlefetch_types::FetchOptions;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::cipher::CryptoStreamFactory;

const READ_BUFFER: usize = 64 * 1024;

/// Encrypt an in-memory payload into `header || body`.
///
/// # Errors
///
/// Returns an error if the cipher fails.
pub fn encrypt_bytes(
    factory: &dyn CryptoStreamFactory,
    options: &FetchOptions,
    plaintext: &[u8],
) -> Result<Vec<u8>, DecryptError> {
    let (header, mut encryptor) = factory.create_encryptor(options)?;
    let mut out = Vec::with_capacity(header.len() + plaintext.len() + factory.block_size());
    out.extend_from_slice(&header);
    encryptor.update(plaintext, &mut out)?;
    encryptor.finalize(&mut out)?;
    Ok(out)
}

/// Encrypt `src` into `dst` without loading it whole, returning the
/// ciphertext length.
///
/// # Errors
///
/// Returns an error if either file cannot be accessed or the cipher fails.
pub async fn encrypt_file(
    factory: &dyn CryptoStreamFactory,
    options: &FetchOptions,
    src: &Path,
    dst: &Path,
) -> Result<u64, Error> {
    let mut input = File::open(src)
        .await
        .map_err(|e| Error::io_with_path(&e, src))?;
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }
    let mut output = File::create(dst)
        .await
        .map_err(|e| Error::io_with_path(&e, dst))?;

    let (header, mut encryptor) = factory.create_encryptor(options)?;
    let mut written = header.len() as u64;
    output
        .write_all(&header)
        .await
        .map_err(|e| Error::io_with_path(&e, dst))?;

    let mut buffer = vec![0u8; READ_BUFFER];
    let mut ciphertext = Vec::with_capacity(READ_BUFFER + factory.block_size());
    loop {
        let n = input
            .read(&mut buffer)
            .await
            .map_err(|e| Error::io_with_path(&e, src))?;
        if n == 0 {
            break;
        }
        ciphertext.clear();
        encryptor.update(&buffer[..n], &mut ciphertext)?;
        output
            .write_all(&ciphertext)
            .await
            .map_err(|e| Error::io_with_path(&e, dst))?;
        written += ciphertext.len() as u64;
    }

    ciphertext.clear();
    encryptor.finalize(&mut ciphertext)?;
    output
        .write_all(&ciphertext)
        .await
        .map_err(|e| Error::io_with_path(&e, dst))?;
    output
        .flush()
        .await
        .map_err(|e| Error::io_with_path(&e, dst))?;
    written += ciphertext.len() as u64;

    debug!(src = %src.display(), dst = %dst.display(), written, "bundle encrypted");
    Ok(written)
}
