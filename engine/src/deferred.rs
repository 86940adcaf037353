//! Deferred results of adapter calls.
//!
//! A [`Deferred`] is the receiving half of a one-shot channel; the adapter
//! keeps the [`Resolver`] and settles it from a run-loop task once the data
//! has been pushed into the store.

use crate::AdapterError;
use futures::channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Outcome of a deferred adapter call.
pub type Settled<T> = Result<T, AdapterError>;

/// Create a connected resolver/deferred pair.
pub fn deferred<T>() -> (Resolver<T>, Deferred<T>) {
    let (sender, receiver) = oneshot::channel();
    (Resolver { sender }, Deferred { receiver })
}

/// Sending half of a deferred result.
#[derive(Debug)]
pub struct Resolver<T> {
    sender: oneshot::Sender<Settled<T>>,
}

impl<T> Resolver<T> {
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(self, error: AdapterError) {
        self.settle(Err(error));
    }

    pub fn settle(self, outcome: Settled<T>) {
        // Nobody waiting is fine; the store side effects already happened
        let _ = self.sender.send(outcome);
    }
}

/// Receiving half of a deferred result.
///
/// Implements [`Future`], and can also be polled without an executor through
/// [`Deferred::try_take`] after the run loop has been pumped.
#[derive(Debug)]
pub struct Deferred<T> {
    receiver: oneshot::Receiver<Settled<T>>,
}

impl<T> Deferred<T> {
    /// A deferred that is already resolved.
    pub fn resolved(value: T) -> Self {
        let (resolver, deferred) = deferred();
        resolver.resolve(value);
        deferred
    }

    /// A deferred that is already rejected.
    pub fn rejected(error: AdapterError) -> Self {
        let (resolver, deferred) = deferred();
        resolver.reject(error);
        deferred
    }

    /// Take the outcome if the deferred has settled.
    ///
    /// A dropped resolver settles as [`AdapterError::Canceled`].
    pub fn try_take(&mut self) -> Option<Settled<T>> {
        match self.receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::Canceled) => Some(Err(AdapterError::Canceled)),
        }
    }
}

impl<T> Future for Deferred<T> {
    type Output = Settled<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(AdapterError::Canceled)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn resolved_is_ready() {
        let mut d = Deferred::resolved(5);
        assert_eq!(d.try_take(), Some(Ok(5)));
    }

    #[test]
    fn pending_until_resolved() {
        let (resolver, mut d) = deferred::<u32>();
        assert_eq!(d.try_take(), None);
        resolver.resolve(1);
        assert_eq!(d.try_take(), Some(Ok(1)));
    }

    #[test]
    fn dropped_resolver_cancels() {
        let (resolver, d) = deferred::<u32>();
        drop(resolver);
        assert_eq!(d.now_or_never(), Some(Err(AdapterError::Canceled)));
    }

    #[test]
    fn rejected_as_future() {
        let d = Deferred::<u32>::rejected(AdapterError::NotFound);
        assert_eq!(d.now_or_never(), Some(Err(AdapterError::NotFound)));
    }
}
