//! Mentor: Adaptive Tutoring Sessions
//!
//! Teaches one knowledge-graph node at a time: introduces the node, reviews
//! prerequisites, walks through each objective with probing questions and
//! explanations, then runs a graded final test and folds the result back
//! into stored mastery.

pub mod cli;
pub mod config;
pub mod error;
pub mod grading;
pub mod logging;
pub mod prompt;
pub mod provider;
pub mod quiz;
pub mod session;
pub mod store;
pub mod tutor;
