//! Download supervisor for `yt-dlp`: builds the invocation, runs the tool,
//! turns its output into progress and log events, and supports cancellation.

pub mod config;
pub mod downloader;
pub mod invocation;
pub mod parser;
pub mod process;
pub mod types;
pub mod ui;
pub mod utils;

#[cfg(test)]
mod testing;

pub use downloader::{Canceller, SessionHandle, Supervisor};
pub use invocation::build_invocation;
pub use types::*;
