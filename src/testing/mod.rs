//! Testing utilities and mock implementations
//!
//! This module provides an in-memory transport for exercising feed sessions
//! without a network connection.

pub mod mocks;

pub use mocks::*;
