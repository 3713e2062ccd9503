//! Runner unit tests
