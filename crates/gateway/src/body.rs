//! Response bodies used by the gateway.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use axum::{body::Body, BoxError};
use bytes::Bytes;
use common::ProtocolError;
use http_body::{Body as HttpBody, Frame, SizeHint};
use tokio::time::{Instant, Sleep};

/// Streams `inner` until the request deadline, then fails with
/// [`ProtocolError::Timeout`] so the connection is aborted mid-response.
pub struct DeadlineBody {
    inner: Body,
    deadline: Pin<Box<Sleep>>,
    timeout: Duration,
    expired: bool,
}

impl DeadlineBody {
    pub fn new(inner: Body, deadline: Instant, timeout: Duration) -> Self {
        Self {
            inner,
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            timeout,
            expired: false,
        }
    }
}

impl HttpBody for DeadlineBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.expired {
            return Poll::Ready(None);
        }
        if this.deadline.as_mut().poll(cx).is_ready() {
            this.expired = true;
            return Poll::Ready(Some(Err(Box::new(ProtocolError::Timeout(this.timeout)))));
        }
        Pin::new(&mut this.inner).poll_frame(cx).map_err(Into::into)
    }

    fn is_end_stream(&self) -> bool {
        self.expired || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// A body whose only frame is `error`; used to propagate a downstream body
/// failure that surfaced while buffering.
pub struct FailedBody {
    error: Option<BoxError>,
}

impl FailedBody {
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self {
            error: Some(error.into()),
        }
    }
}

impl HttpBody for FailedBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.get_mut().error.take().map(Err))
    }

    fn is_end_stream(&self) -> bool {
        self.error.is_none()
    }
}
