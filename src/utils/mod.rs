//! Shared helpers: logging and test fixtures.

pub mod log;
#[cfg(test)]
pub mod test_utils;
