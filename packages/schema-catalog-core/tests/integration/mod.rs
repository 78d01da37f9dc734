//! Integration test suite.
//!
//! Tests are organized by area:
//! 1. Class hierarchy and global properties
//! 2. View lifecycle
//! 3. Persistence integration
//! 4. Concurrent readers and writers

pub mod catalog_tests;
pub mod concurrency_tests;
pub mod helpers;
pub mod persistence_tests;
pub mod view_tests;
