//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Principal extraction, rejecting requests without one
//! 2. Access logger, which sees the principal

pub mod audit;
pub mod principal;
