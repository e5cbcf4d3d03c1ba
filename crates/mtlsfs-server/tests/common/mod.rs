//! Common test utilities for file server integration tests.

#![allow(dead_code)]

pub mod audit;
pub mod harness;
pub mod pki;
