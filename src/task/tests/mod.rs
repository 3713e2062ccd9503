//! Task unit tests
