//! Byte stream contracts shared by stages, the async primitive and user transports.
//!
//! End-of-stream is `Ok(0)` for a non-empty buffer. Stages implement both traits
//! so they nest into each other; [`IoReader`]/[`IoWriter`] adapt tokio I/O types.

use std::io::{self, Cursor};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::stage::Stage;
use crate::error::StreamError;

/// Read side of a stream.
#[async_trait]
pub trait StreamRead: Send {
    /// Reads into `buf`; `Ok(0)` means end-of-stream.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError>;

    /// Releases the stream.
    async fn close(&mut self) -> Result<(), StreamError> {
        Ok(())
    }

    /// Returns the stage behind this stream, used when nesting pushes streams down.
    fn stage_mut(&mut self) -> Option<&mut Stage> {
        None
    }
}

/// Write side of a stream.
///
/// A successful `write` consumes the whole buffer.
#[async_trait]
pub trait StreamWrite: Send {
    /// Writes `buf`, returning `buf.len()` on success.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError>;

    /// Pushes buffered bytes downstream.
    async fn flush(&mut self) -> Result<(), StreamError> {
        Ok(())
    }

    /// Flushes and releases the stream.
    async fn close(&mut self) -> Result<(), StreamError> {
        Ok(())
    }

    /// Returns the stage behind this stream, used when nesting pushes streams down.
    fn stage_mut(&mut self) -> Option<&mut Stage> {
        None
    }
}

#[async_trait]
impl<R: StreamRead + ?Sized> StreamRead for Box<R> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        (**self).read(buf).await
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        (**self).close().await
    }

    fn stage_mut(&mut self) -> Option<&mut Stage> {
        (**self).stage_mut()
    }
}

#[async_trait]
impl<W: StreamWrite + ?Sized> StreamWrite for Box<W> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        (**self).write(buf).await
    }

    async fn flush(&mut self) -> Result<(), StreamError> {
        (**self).flush().await
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        (**self).close().await
    }

    fn stage_mut(&mut self) -> Option<&mut Stage> {
        (**self).stage_mut()
    }
}

#[async_trait]
impl StreamRead for Cursor<Vec<u8>> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        Ok(io::Read::read(self, buf)?)
    }
}

#[async_trait]
impl StreamWrite for Vec<u8> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        self.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// Adapts a tokio [`AsyncRead`] into a [`StreamRead`].
#[derive(Debug)]
pub struct IoReader<R>(pub R);

impl<R> IoReader<R> {
    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.0
    }
}

#[async_trait]
impl<R> StreamRead for IoReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        Ok(self.0.read(buf).await?)
    }
}

/// Adapts a tokio [`AsyncWrite`] into a [`StreamWrite`]; `close` shuts it down.
#[derive(Debug)]
pub struct IoWriter<W>(pub W);

impl<W> IoWriter<W> {
    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.0
    }
}

#[async_trait]
impl<W> StreamWrite for IoWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        self.0.write_all(buf).await?;
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), StreamError> {
        Ok(self.0.flush().await?)
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        Ok(self.0.shutdown().await?)
    }
}

/// Writes all of `buf`, retrying short writes.
pub(crate) async fn write_all<W>(w: &mut W, mut buf: &[u8]) -> Result<(), StreamError>
where
    W: StreamWrite + ?Sized,
{
    while !buf.is_empty() {
        let n = w.write(buf).await?;
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::WriteZero).into());
        }
        buf = &buf[n.min(buf.len())..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cursor_reads_to_eof() {
        let mut r = Cursor::new(b"hello".to_vec());
        let mut buf = [0u8; 3];
        assert_eq!(StreamRead::read(&mut r, &mut buf).await.unwrap(), 3);
        assert_eq!(StreamRead::read(&mut r, &mut buf).await.unwrap(), 2);
        assert_eq!(StreamRead::read(&mut r, &mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn io_adapters_forward_bytes() {
        let mut r = IoReader(&b"abc"[..]);
        let mut w = IoWriter(Vec::new());
        let mut buf = [0u8; 8];
        let n = r.read(&mut buf).await.unwrap();
        write_all(&mut w, &buf[..n]).await.unwrap();
        w.close().await.unwrap();
        assert_eq!(w.into_inner(), b"abc");
    }
}
