pub mod request_upload;

pub use request_upload::{
    RequestUploadCommand, RequestUploadError, RequestUploadResponse, UploadSettings,
};
