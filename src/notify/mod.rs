//! Output module.
//!
//! Colored console rendering of snapshots, analysis results and guidance,
//! or JSON lines when requested.

pub mod console;

pub use console::ConsoleOutput;
