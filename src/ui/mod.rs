//! UI module - Command Line Interface
//!
//! Provides the reedline-based REPL over a kernel session.

pub mod cli;
