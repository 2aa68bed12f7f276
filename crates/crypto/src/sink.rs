//! Decrypt-while-download sink

use bundlefetch_errors::{DecryptError, Error, StreamError};
use bundlefetch_types::FetchOptions;
use bytes::BytesMut;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self as tokio_fs, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, warn};

use crate::cipher::{CryptoStreamFactory, StreamDecryptor};

/// How a sink windows and treats its ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkSettings {
    /// Bytes decrypted per window; a multiple of the cipher block size
    pub block_size: usize,
    /// Propagate a rejected trailing block from `complete` instead of logging it
    pub strict_decrypt: bool,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            block_size: 4096,
            strict_decrypt: false,
        }
    }
}

/// Logical positions in the ciphertext stream.
///
/// `read_position <= buffered_len` always holds; the difference is what is
/// still waiting in the sink's buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecryptCursor {
    buffered_len: u64,
    read_position: u64,
}

impl DecryptCursor {
    /// Total ciphertext bytes received, header included
    #[must_use]
    pub fn buffered_len(&self) -> u64 {
        self.buffered_len
    }

    /// Ciphertext bytes consumed by the cipher, header included
    #[must_use]
    pub fn read_position(&self) -> u64 {
        self.read_position
    }

    #[must_use]
    pub fn pending(&self) -> u64 {
        self.buffered_len - self.read_position
    }
}

enum SinkState {
    /// Waiting for the cipher header
    Uninitialized,
    Streaming(Box<dyn StreamDecryptor>),
    Completed,
    Disposed,
}

impl SinkState {
    fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Streaming(_) => "streaming",
            Self::Completed => "complete",
            Self::Disposed => "dispose",
        }
    }
}

/// Decrypts response bytes into a destination file as they arrive.
///
/// One sink serves exactly one fetch. Chunks go in through [`receive`],
/// the tail is flushed by [`complete`], and [`dispose`] closes the file,
/// deleting it if nothing was written. Dropping an undisposed sink performs
/// the same cleanup synchronously.
///
/// A window is only decrypted while strictly more than `block_size` bytes
/// are pending, so the last window of the stream always reaches the cipher
/// through `complete` where padding is handled.
///
/// [`receive`]: StreamingDecryptSink::receive
/// [`complete`]: StreamingDecryptSink::complete
/// [`dispose`]: StreamingDecryptSink::dispose
pub struct StreamingDecryptSink {
    path: PathBuf,
    factory: Arc<dyn CryptoStreamFactory>,
    options: FetchOptions,
    settings: SinkSettings,
    state: SinkState,
    cursor: DecryptCursor,
    pending: BytesMut,
    scratch: Vec<u8>,
    file: Option<File>,
    bytes_written: u64,
    /// Set while an operation is suspended; still set on entry means the
    /// previous call was abandoned half way
    in_flight: Option<&'static str>,
}

impl std::fmt::Debug for StreamingDecryptSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingDecryptSink")
            .field("path", &self.path)
            .field("state", &self.state.name())
            .field("cursor", &self.cursor)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl StreamingDecryptSink {
    /// Create the destination file (and its parent directories) and an empty sink.
    ///
    /// # Errors
    ///
    /// Returns an error if `settings.block_size` does not fit the cipher or
    /// the destination cannot be created.
    pub async fn create(
        path: impl Into<PathBuf>,
        factory: Arc<dyn CryptoStreamFactory>,
        options: FetchOptions,
        settings: SinkSettings,
    ) -> Result<Self, Error> {
        let path = path.into();
        let cipher_block = factory.block_size().max(1);
        if settings.block_size == 0 || !settings.block_size.is_multiple_of(cipher_block) {
            return Err(DecryptError::InvalidBlockSize(settings.block_size).into());
        }

        if let Some(parent) = path.parent() {
            tokio_fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }
        let file = File::create(&path)
            .await
            .map_err(|e| Error::io_with_path(&e, &path))?;

        Ok(Self {
            path,
            factory,
            options,
            settings,
            state: SinkState::Uninitialized,
            cursor: DecryptCursor::default(),
            pending: BytesMut::with_capacity(settings.block_size * 2),
            scratch: Vec::with_capacity(settings.block_size),
            file: Some(file),
            bytes_written: 0,
            in_flight: None,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn cursor(&self) -> DecryptCursor {
        self.cursor
    }

    /// Plaintext bytes written to the destination so far
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        matches!(self.state, SinkState::Disposed)
    }

    /// Buffer `chunk` and decrypt every window that can no longer change.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink was completed, disposed or abandoned
    /// mid-call, if the cipher rejects a window, or on I/O failure.
    pub async fn receive(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self.enter("receive")?;
        let result = self.receive_inner(chunk).await;
        self.in_flight = None;
        result
    }

    async fn receive_inner(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if matches!(self.state, SinkState::Completed | SinkState::Disposed) {
            return Err(self.use_after_close());
        }

        self.pending.extend_from_slice(chunk);
        self.cursor.buffered_len += chunk.len() as u64;

        if matches!(self.state, SinkState::Uninitialized) && !self.try_start()? {
            return Ok(());
        }
        self.drain().await
    }

    /// Decrypt and write whatever is still buffered, finalising the cipher.
    ///
    /// A cipher failure here is logged and swallowed unless
    /// `strict_decrypt` is set.
    ///
    /// # Errors
    ///
    /// Returns an error on misuse, on I/O failure, or on a rejected tail in
    /// strict mode.
    pub async fn complete(&mut self) -> Result<(), Error> {
        self.enter("complete")?;
        let result = self.complete_inner().await;
        self.in_flight = None;
        result
    }

    async fn complete_inner(&mut self) -> Result<(), Error> {
        let state = std::mem::replace(&mut self.state, SinkState::Completed);
        let decryptor = match state {
            SinkState::Streaming(decryptor) => Some(Ok(decryptor)),
            SinkState::Uninitialized => self.start_on_tail(),
            closed @ (SinkState::Completed | SinkState::Disposed) => {
                self.state = closed;
                return Err(self.use_after_close());
            }
        };

        match decryptor {
            Some(Ok(decryptor)) => {
                let tail = self.pending.split();
                self.cursor.read_position = self.cursor.buffered_len;
                self.scratch.clear();
                match decryptor.finalize(&tail, &mut self.scratch) {
                    Ok(()) => {
                        let plaintext = std::mem::take(&mut self.scratch);
                        self.write(&plaintext).await?;
                        self.scratch = plaintext;
                    }
                    Err(e) => self.reject_tail(e)?,
                }
            }
            Some(Err(e)) => self.reject_tail(e)?,
            None => {}
        }

        if let Some(file) = self.file.as_mut() {
            file.flush()
                .await
                .map_err(|e| Error::io_with_path(&e, &self.path))?;
        }
        debug!(
            path = %self.path.display(),
            received = self.cursor.buffered_len,
            written = self.bytes_written,
            "decrypt sink completed"
        );
        Ok(())
    }

    /// Close the destination and release the buffer. Idempotent.
    ///
    /// A destination that never received plaintext is deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or deleting the destination fails.
    pub async fn dispose(&mut self) -> Result<(), Error> {
        if self.is_disposed() {
            return Ok(());
        }
        self.state = SinkState::Disposed;
        self.pending = BytesMut::new();
        self.scratch = Vec::new();
        self.in_flight = None;

        let flushed = match self.file.take() {
            Some(mut file) => file.flush().await,
            None => Ok(()),
        };

        if self.bytes_written == 0 {
            match tokio_fs::remove_file(&self.path).await {
                Ok(()) => debug!(path = %self.path.display(), "removed empty decrypt output"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io_with_path(&e, &self.path)),
            }
        }
        flushed.map_err(|e| Error::io_with_path(&e, &self.path))
    }

    fn enter(&mut self, operation: &'static str) -> Result<(), Error> {
        if let Some(previous) = self.in_flight {
            error!(
                path = %self.path.display(),
                operation,
                previous,
                "decrypt sink re-entered after an abandoned call"
            );
            debug_assert!(false, "decrypt sink re-entered during {previous}");
            return Err(StreamError::Reentrancy {
                operation: previous.to_string(),
                path: self.path.display().to_string(),
            }
            .into());
        }
        self.in_flight = Some(operation);
        Ok(())
    }

    fn use_after_close(&self) -> Error {
        let state = self.state.name();
        error!(path = %self.path.display(), state, "decrypt sink used after close");
        StreamError::UseAfterClose {
            state: state.to_string(),
            path: self.path.display().to_string(),
        }
        .into()
    }

    /// Create the decryptor once the header is buffered. Returns whether it exists.
    fn try_start(&mut self) -> Result<bool, Error> {
        let header_len = self.factory.header_len();
        if self.pending.len() < header_len {
            return Ok(false);
        }
        let header = self.pending.split_to(header_len);
        self.cursor.read_position += header_len as u64;
        let decryptor = self.factory.create_decryptor(&header, &self.options)?;
        self.state = SinkState::Streaming(decryptor);
        Ok(true)
    }

    /// Header handling for a stream that ends before any window was drained.
    fn start_on_tail(&mut self) -> Option<Result<Box<dyn StreamDecryptor>, DecryptError>> {
        if self.cursor.buffered_len == 0 {
            return None;
        }
        let header_len = self.factory.header_len();
        if self.pending.len() < header_len {
            return Some(Err(DecryptError::TruncatedHeader {
                received: self.pending.len(),
                required: header_len,
            }));
        }
        let header = self.pending.split_to(header_len);
        self.cursor.read_position += header_len as u64;
        Some(self.factory.create_decryptor(&header, &self.options))
    }

    /// Decrypt full windows while more than one window is pending.
    ///
    /// The comparison is strict on purpose: an exactly aligned last window
    /// stays buffered so `complete` can finalise it with the padding.
    async fn drain(&mut self) -> Result<(), Error> {
        let SinkState::Streaming(decryptor) = &mut self.state else {
            return Ok(());
        };
        let window = self.settings.block_size;

        while self.pending.len() > window {
            let block = self.pending.split_to(window);
            self.scratch.clear();
            decryptor.update(&block, &mut self.scratch)?;
            self.cursor.read_position += window as u64;

            let Some(file) = self.file.as_mut() else {
                break;
            };
            file.write_all(&self.scratch)
                .await
                .map_err(|e| Error::io_with_path(&e, &self.path))?;
            self.bytes_written += self.scratch.len() as u64;
        }
        Ok(())
    }

    async fn write(&mut self, plaintext: &[u8]) -> Result<(), Error> {
        if plaintext.is_empty() {
            return Ok(());
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(plaintext)
                .await
                .map_err(|e| Error::io_with_path(&e, &self.path))?;
            self.bytes_written += plaintext.len() as u64;
        }
        Ok(())
    }

    fn reject_tail(&self, e: DecryptError) -> Result<(), Error> {
        if self.settings.strict_decrypt {
            return Err(e.into());
        }
        warn!(
            path = %self.path.display(),
            error = %e,
            "failed to decrypt trailing bytes"
        );
        Ok(())
    }
}

impl Drop for StreamingDecryptSink {
    fn drop(&mut self) {
        if self.is_disposed() {
            return;
        }
        drop(self.file.take());
        if self.bytes_written == 0 {
            // Best-effort cleanup - ignore errors
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Decrypt a whole file through a sink, returning the plaintext length.
///
/// # Errors
///
/// Returns an error if reading the source or writing the destination fails,
/// or if decryption fails.
pub async fn decrypt_file(
    factory: Arc<dyn CryptoStreamFactory>,
    options: FetchOptions,
    settings: SinkSettings,
    src: &Path,
    dst: &Path,
) -> Result<u64, Error> {
    let mut input = File::open(src)
        .await
        .map_err(|e| Error::io_with_path(&e, src))?;
    let mut sink = StreamingDecryptSink::create(dst, factory, options, settings).await?;
    let mut buffer = vec![0u8; settings.block_size.max(8192)];

    let result = async {
        loop {
            let n = input
                .read(&mut buffer)
                .await
                .map_err(|e| Error::io_with_path(&e, src))?;
            if n == 0 {
                break;
            }
            sink.receive(&buffer[..n]).await?;
        }
        sink.complete().await
    }
    .await;

    let written = sink.bytes_written();
    sink.dispose().await?;
    result.map(|()| written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::PassthroughFactory;
    use tempfile::TempDir;

    fn settings(block_size: usize) -> SinkSettings {
        SinkSettings {
            block_size,
            strict_decrypt: false,
        }
    }

    async fn passthrough_sink(dir: &TempDir, block_size: usize) -> StreamingDecryptSink {
        StreamingDecryptSink::create(
            dir.path().join("decrypted").join("cube.bundle"),
            Arc::new(PassthroughFactory),
            FetchOptions::new("cube"),
            settings(block_size),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn drains_full_windows_and_defers_tail_to_complete() {
        let dir = TempDir::new().unwrap();
        let mut sink = passthrough_sink(&dir, 256).await;
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

        sink.receive(&payload[..400]).await.unwrap();
        assert_eq!(sink.bytes_written(), 256);
        sink.receive(&payload[400..800]).await.unwrap();
        assert_eq!(sink.bytes_written(), 768);
        sink.receive(&payload[800..]).await.unwrap();
        assert_eq!(sink.bytes_written(), 768);
        assert_eq!(sink.cursor().pending(), 232);

        sink.complete().await.unwrap();
        assert_eq!(sink.bytes_written(), 1000);
        assert_eq!(sink.cursor().read_position(), sink.cursor().buffered_len());

        let path = sink.path().to_path_buf();
        sink.dispose().await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), payload);
    }

    #[tokio::test]
    async fn exactly_one_pending_window_waits_for_complete() {
        let dir = TempDir::new().unwrap();
        let mut sink = passthrough_sink(&dir, 256).await;
        sink.receive(&[7u8; 256]).await.unwrap();
        assert_eq!(sink.bytes_written(), 0);
        sink.complete().await.unwrap();
        assert_eq!(sink.bytes_written(), 256);
        sink.dispose().await.unwrap();
    }

    /// Leaves the sink as a `receive` future dropped mid-write would.
    async fn abandoned_sink(dir: &TempDir) -> StreamingDecryptSink {
        let mut sink = passthrough_sink(dir, 64).await;
        sink.receive(&[1u8; 100]).await.unwrap();
        sink.in_flight = Some("receive");
        sink
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "re-entered during receive")]
    async fn reentry_after_abandoned_receive_panics_in_debug() {
        let dir = TempDir::new().unwrap();
        let mut sink = abandoned_sink(&dir).await;
        let _ = sink.receive(&[2u8; 10]).await;
    }

    #[cfg(not(debug_assertions))]
    #[tokio::test]
    async fn reentry_after_abandoned_receive_fails() {
        let dir = TempDir::new().unwrap();
        let mut sink = abandoned_sink(&dir).await;
        let err = sink.receive(&[2u8; 10]).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Stream(StreamError::Reentrancy { ref operation, .. }) if operation == "receive"
        ));
        assert!(matches!(
            sink.complete().await,
            Err(Error::Stream(StreamError::Reentrancy { .. }))
        ));
        // Disposal still releases the sink
        sink.dispose().await.unwrap();
        assert!(sink.is_disposed());
    }

    #[tokio::test]
    async fn completed_call_clears_in_flight_marker() {
        let dir = TempDir::new().unwrap();
        let mut sink = passthrough_sink(&dir, 64).await;
        sink.receive(&[1u8; 100]).await.unwrap();
        assert!(sink.in_flight.is_none());
        sink.complete().await.unwrap();
        assert!(sink.in_flight.is_none());
        sink.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn empty_output_is_deleted_on_dispose() {
        let dir = TempDir::new().unwrap();
        let mut sink = passthrough_sink(&dir, 64).await;
        let path = sink.path().to_path_buf();
        assert!(path.exists());

        sink.receive(&[]).await.unwrap();
        sink.dispose().await.unwrap();
        assert!(!path.exists());

        // Idempotent
        sink.dispose().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn drop_without_dispose_cleans_up() {
        let dir = TempDir::new().unwrap();
        let sink = passthrough_sink(&dir, 64).await;
        let path = sink.path().to_path_buf();
        drop(sink);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn receive_after_complete_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut sink = passthrough_sink(&dir, 64).await;
        sink.receive(b"abc").await.unwrap();
        sink.complete().await.unwrap();

        let err = sink.receive(b"def").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Stream(StreamError::UseAfterClose { ref state, .. }) if state == "complete"
        ));

        sink.dispose().await.unwrap();
        let err = sink.complete().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Stream(StreamError::UseAfterClose { ref state, .. }) if state == "dispose"
        ));
    }

    #[tokio::test]
    async fn misaligned_block_size_is_rejected() {
        let dir = TempDir::new().unwrap();
        let result = StreamingDecryptSink::create(
            dir.path().join("x.bundle"),
            Arc::new(crate::Aes128CbcFactory::new([1; 16])),
            FetchOptions::new("x"),
            settings(100),
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::Decrypt(DecryptError::InvalidBlockSize(100)))
        ));
    }
}
