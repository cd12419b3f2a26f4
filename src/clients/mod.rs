pub mod authorized_client;

pub use authorized_client::{decode_response, error_from_response, AuthorizedClient};
