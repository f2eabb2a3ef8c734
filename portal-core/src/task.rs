//! Detached background tasks.
//!
//! Protocol pumps, accept loops and endpoint watchers all run as detached
//! compio tasks and exit on their own close signals.

use std::future::Future;

/// Spawn a detached task on the current compio runtime.
///
/// # Panics
///
/// Panics when called outside of a compio runtime.
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    compio::runtime::spawn(future).detach();
}
