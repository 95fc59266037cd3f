//! Integration tests for the display manager

mod common;
mod test_manager;
