//! Window switcher core for the Zed editor on macOS.
//!
//! External automation calls (AppleScript through `osascript`) and workspace
//! database reads (`sqlite3`) are funneled through a single-concurrency
//! [`actor::command_queue`], cached in [`model::workspace_cache`], and joined
//! against the live window list by [`switcher`].

pub mod actor;
pub mod common;
pub mod ipc;
pub mod model;
pub mod switcher;
pub mod sys;
