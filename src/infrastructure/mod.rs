//! 基础设施层：只提供能力，不认识考试业务

pub mod json_file;
pub mod transport;

pub use json_file::JsonFile;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
