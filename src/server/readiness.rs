//! Readiness multiplexing
//!
//! Waits until the listening endpoint or any registered session can make
//! progress and reports which of them can.

use std::future::poll_fn;
use std::io;
use std::task::Poll;

use crate::client::SessionRegistry;
use crate::transport::{Handle, Listener};

/// The outcome of one readiness wait.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReadySet {
    /// An accept attempt is pending on the listening endpoint.
    pub listener: bool,
    /// Sessions with a readable message, in ascending handle order.
    pub sessions: Vec<Handle>,
}

impl ReadySet {
    pub fn is_empty(&self) -> bool {
        !self.listener && self.sessions.is_empty()
    }
}

/// Blocks with no timeout until something in the interest set is ready.
///
/// The interest set is the listener plus every handle in `sessions` at the
/// time of the call. An error means the wait itself failed.
pub async fn wait_ready(
    listener: &mut dyn Listener,
    sessions: &mut SessionRegistry,
) -> io::Result<ReadySet> {
    poll_fn(|cx| {
        let mut ready = ReadySet::default();

        match listener.poll_acceptable(cx) {
            Poll::Ready(Ok(())) => ready.listener = true,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => {}
        }

        for (handle, session) in sessions.iter_mut() {
            if session.connection_mut().poll_readable(cx).is_ready() {
                ready.sessions.push(handle);
            }
        }

        if ready.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(Ok(ready))
        }
    })
    .await
}
