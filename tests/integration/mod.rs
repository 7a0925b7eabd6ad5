//! Integration tests for the tutoring session engine

mod config_integration;
mod grading_fallback;
mod session_flow;
mod store_integration;
mod test_utils;
