use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body, Frame};
use statserve_core::cache::FileReader;
use tokio::sync::mpsc;

/// The chunk size used when pumping a [`FileReader`] into the response
/// body channel.
const CHUNK_SIZE: usize = 64 * 1024;

/// An [`http_body::Body`] fed by a background task that drains a
/// [`FileReader`] in fixed-size chunks.
///
/// A channel rather than polling the reader directly from `poll_frame`
/// keeps the reader's positional-read await points off hyper's poll
/// loop; the pump task owns the reader end-to-end and closes it on
/// completion or channel drop.
pub struct ReaderBody {
    rx: mpsc::Receiver<std::io::Result<Bytes>>,
}

impl ReaderBody {
    pub fn new(mut reader: FileReader, length: u64) -> Self {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let mut remaining = length;
            let mut buf = vec![0u8; CHUNK_SIZE];
            while remaining > 0 {
                let want = (buf.len() as u64).min(remaining) as usize;
                match reader.read(&mut buf[..want]).await {
                    Ok(0) => break,
                    Ok(n) => {
                        remaining -= n as u64;
                        if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        break;
                    }
                }
            }
            reader.close().await;
        });
        ReaderBody { rx }
    }
}

impl Body for ReaderBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(bytes))) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
