//! Request/response surface for the UI process: newline-delimited JSON over
//! stdin and stdout.

pub mod protocol;
pub mod server;
