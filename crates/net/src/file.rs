//! `file://` transport

use async_trait::async_trait;
use bundlefetch_errors::{Error, FetchError};
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::transport::{Transport, TransportRequest, TransportResponse};

const CHUNK_SIZE: usize = 64 * 1024;

/// Streams local files addressed by `file://` URLs.
///
/// Lets local bundles go through the same sink and progress path as remote
/// ones.
#[derive(Debug, Clone)]
pub struct FileTransport {
    chunk_size: usize,
}

impl Default for FileTransport {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl FileTransport {
    #[must_use]
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn open(&self, request: &TransportRequest) -> Result<TransportResponse, Error> {
        let path = request
            .url
            .to_file_path()
            .map_err(|()| FetchError::InvalidUrl(request.url.to_string()))?;
        let file = File::open(&path)
            .await
            .map_err(|e| Error::io_with_path(&e, &path))?;
        let content_length = file
            .metadata()
            .await
            .map_err(|e| Error::io_with_path(&e, &path))?
            .len();
        debug!(path = %path.display(), content_length, "opened local bundle");

        let chunk_size = self.chunk_size;
        let body = futures::stream::unfold(Some((file, path)), move |state| async move {
            let (mut file, path) = state?;
            let mut buf = BytesMut::zeroed(chunk_size);
            match file.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok::<Bytes, Error>(buf.freeze()), Some((file, path))))
                }
                Err(e) => Some((Err(Error::io_with_path(&e, &path)), None)),
            }
        });

        Ok(TransportResponse {
            content_length: Some(content_length),
            body: Box::pin(body),
        })
    }
}
