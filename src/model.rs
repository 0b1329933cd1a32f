pub mod projects;
pub mod server;
pub mod workspace_cache;
