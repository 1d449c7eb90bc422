//! Bounded buffering of HTTP bodies.

use std::future::poll_fn;
use std::pin::pin;

use bytes::{Bytes, BytesMut};
use http_body::Body;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum BodyError {
    /// The body grew past the limit; nothing beyond it was read.
    #[error("body exceeds the {0} byte limit")]
    TooLarge(usize),

    #[error("failed to read body: {0}")]
    Read(#[source] BoxError),
}

/// Buffer `body` fully, failing once more than `limit` bytes arrive.
///
/// A body whose size hint already exceeds the limit is refused before the
/// first frame is polled. Trailers are discarded.
///
/// # Errors
///
/// Returns [`BodyError::TooLarge`] past the limit and [`BodyError::Read`] when
/// the body itself fails.
pub async fn collect_limited<B>(body: B, limit: usize) -> Result<Bytes, BodyError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    if body.size_hint().lower() > limit as u64 {
        return Err(BodyError::TooLarge(limit));
    }

    let mut body = pin!(body);
    let mut buf = BytesMut::new();
    while let Some(frame) = poll_fn(|cx| body.as_mut().poll_frame(cx)).await {
        let frame = frame.map_err(|e| BodyError::Read(e.into()))?;
        if let Ok(data) = frame.into_data() {
            if buf.len() + data.len() > limit {
                return Err(BodyError::TooLarge(limit));
            }
            buf.extend_from_slice(&data);
        }
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        convert::Infallible,
        pin::Pin,
        task::{Context, Poll},
    };

    use http_body::Frame;

    /// Yields the given chunks with no size hint.
    struct Chunks(Vec<&'static [u8]>);

    impl Body for Chunks {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
            let this = self.get_mut();
            if this.0.is_empty() {
                Poll::Ready(None)
            } else {
                let chunk = this.0.remove(0);
                Poll::Ready(Some(Ok(Frame::data(Bytes::from_static(chunk)))))
            }
        }
    }

    /// Advertises its exact length and panics if polled.
    struct Hinted(&'static [u8]);

    impl Body for Hinted {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
            panic!("polled despite the size hint");
        }

        fn size_hint(&self) -> http_body::SizeHint {
            http_body::SizeHint::with_exact(self.0.len() as u64)
        }
    }

    struct Broken;

    impl Body for Broken {
        type Data = Bytes;
        type Error = std::io::Error;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, std::io::Error>>> {
            Poll::Ready(Some(Err(std::io::Error::other("reset"))))
        }
    }

    #[tokio::test]
    async fn collects_chunks_up_to_the_limit() {
        let body = Chunks(vec![b"hel", b"lo"]);
        let bytes = collect_limited(body, 5).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn streamed_body_over_the_limit_is_refused() {
        let body = Chunks(vec![b"hel", b"lo!"]);
        assert!(matches!(
            collect_limited(body, 5).await,
            Err(BodyError::TooLarge(5))
        ));
    }

    #[tokio::test]
    async fn size_hint_over_the_limit_is_refused_up_front() {
        let body = Hinted(b"too long");
        assert!(matches!(
            collect_limited(body, 4).await,
            Err(BodyError::TooLarge(4))
        ));
    }

    #[tokio::test]
    async fn read_errors_are_kept() {
        let err = collect_limited(Broken, 64).await.unwrap_err();
        assert!(matches!(err, BodyError::Read(_)));
        assert!(err.to_string().contains("reset"));
    }
}
