//! Integration tests for the PPPoE link controller
//!
//! The tracker and service run as real tasks against in-memory fakes of
//! every port, on a paused tokio clock.

mod common;
mod test_locks;
mod test_tracker;
