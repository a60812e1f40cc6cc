pub mod api_key;
pub mod password;

pub use api_key::{generate_api_key, require_api_key, Principal};
