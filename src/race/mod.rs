//! First-completion race over independently cancellable operations
//!
//! All operations are polled on the calling task. The first one to finish
//! wins; every other operation is dropped before `race` returns, which is
//! how a future is cancelled in async Rust. Operations therefore have to be
//! cancel-safe: dropping them must release whatever they acquired.

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

use futures_util::future::poll_fn;
use tracing::trace;

/// A boxed operation taking part in a race
pub type RaceOp<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The operation that completed first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Winner<T> {
    /// Position of the operation in the submitted list
    pub index: usize,
    /// What the operation produced (its own failures included)
    pub output: T,
}

/// Run `ops` concurrently and return the first to complete.
///
/// Operations are polled in submission order on every wake-up, so when
/// several are ready at once the lowest index wins. Losing operations are
/// dropped before this returns. Returns `None` for an empty list.
pub async fn race<'a, T>(mut ops: Vec<RaceOp<'a, T>>) -> Option<Winner<T>> {
    if ops.is_empty() {
        return None;
    }

    let (index, output) = poll_fn(|cx| {
        for (index, op) in ops.iter_mut().enumerate() {
            if let Poll::Ready(output) = op.as_mut().poll(cx) {
                return Poll::Ready((index, output));
            }
        }
        Poll::Pending
    })
    .await;

    let cancelled = ops.len() - 1;
    drop(ops);
    trace!(index, cancelled, "race settled");

    Some(Winner { index, output })
}
