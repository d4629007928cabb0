mod client;
mod endpoint;
mod errors;
pub mod types;
pub use self::client::{Client, DEFAULT_BASE_URL};
pub use self::endpoint::{DateWindow, EndpointSpec};
pub use self::errors::Error;
