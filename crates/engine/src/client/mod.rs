//! The asynchronous HTTP client.
//!
//! Each operation opens a new connection per exchange, there is no keep-alive pooling.
//! Redirect hops are followed inside the operation that started them.

mod exchange;
mod http_client;
mod redirect;
mod request;

pub use http_client::ClientBuilder;
pub use http_client::HttpClient;
pub use request::Request;
