//! Integration tests for the watch service
//!
//! These tests run a real supervisor loop against real child processes
//! (small `sh` scripts) and an in-process bus.

pub mod helpers;
pub mod scenarios;
