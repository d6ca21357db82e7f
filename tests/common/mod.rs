//! Shared fixtures for the integration tests

#![allow(dead_code)] // each test binary uses a different subset

pub mod builders;
pub mod mock_helpers;

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long a test waits on the loopback viewer
pub const VIEWER_TIMEOUT: Duration = Duration::from_secs(5);

/// Join rank threads in rank order
///
/// Panics instead of hanging when a rank is still blocked after `timeout`,
/// which is how a mismatched collective shows up.
pub fn join_ranks<T>(handles: Vec<JoinHandle<T>>, timeout: Duration) -> Vec<T> {
    let deadline = Instant::now() + timeout;
    while !handles.iter().all(JoinHandle::is_finished) {
        assert!(
            Instant::now() < deadline,
            "a rank is still blocked after {:?}",
            timeout
        );
        thread::sleep(Duration::from_millis(10));
    }
    handles
        .into_iter()
        .map(|h| h.join().expect("rank thread panicked"))
        .collect()
}
