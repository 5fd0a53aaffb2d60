//! Task ownership for background proxy and pump work.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::{JoinError, JoinHandle};

/// A spawned task that is aborted when its owner goes out of scope.
///
/// Awaiting it yields the task's output like a plain [`JoinHandle`].
/// Dropping it, on any exit path, aborts the task so the sockets and
/// channels it owns are closed.
pub struct ScopedTask<T> {
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> ScopedTask<T> {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }
}

impl<T> Future for ScopedTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

impl<T> Drop for ScopedTask<T> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
