pub mod commands;
pub mod routes;

pub use commands::{RequestUploadCommand, RequestUploadError, RequestUploadResponse, UploadSettings};

pub use routes::{imports_routes, ImportsState};
