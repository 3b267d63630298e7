use bytes::Bytes;
use core::task::Poll;
use futures::Stream;
use std::{
    io::{self, SeekFrom},
    path::Path,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, Take},
};
use tokio_util::io::ReaderStream;

const CHUNK_SIZE: usize = 1024 * 32;

/// A request body streaming the byte range `[offset, file_size)` of a file.
///
/// Every chunk handed to the transport is added to a shared counter, so the
/// session knows how many bytes went out even when the request fails midway.
pub struct FileRangeStream {
    inner: ReaderStream<Take<File>>,
    offset: u64,
    len: u64,
    sent: Arc<AtomicU64>,
}

impl FileRangeStream {
    /// Opens `path` and positions the stream at `offset`.
    ///
    /// An `offset` beyond `file_size` yields an empty stream.
    pub async fn open(path: impl AsRef<Path>, offset: u64, file_size: u64) -> io::Result<Self> {
        let mut file = File::open(path).await?;
        let offset = offset.min(file_size);
        file.seek(SeekFrom::Start(offset)).await?;
        let len = file_size - offset;

        Ok(FileRangeStream {
            inner: ReaderStream::with_capacity(file.take(len), CHUNK_SIZE),
            offset,
            len,
            sent: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Shares `counter` instead of the private one.
    pub fn with_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.sent = counter;
        self
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of bytes the stream will yield, the `Content-Length` of the request.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Stream for FileRangeStream {
    type Item = io::Result<Bytes>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let next = Pin::new(&mut self.inner).poll_next(cx);

        if let Poll::Ready(Some(Ok(chunk))) = &next {
            self.sent.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }

        next
    }
}
