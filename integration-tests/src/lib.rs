//! Integration test harness crate; see `tests/`.
