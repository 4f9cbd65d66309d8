//! Tests for the prefetch queue and the session controller.
//!
//! Both are driven through the scripted in-memory gateway, so every network
//! answer is decided by the test.
