//! Client and server configuration.
//!
//! Both configs have working defaults and deserialize from any serde format, missing fields
//! fall back to the default:
//!
//! ```
//! use exchange_engine::ClientConfig;
//!
//! let config: ClientConfig = serde_json::from_str(r#"{ "max_redirects": 3 }"#).unwrap();
//! assert_eq!(config.max_redirects, 3);
//! assert_eq!(config.worker_threads, ClientConfig::default().worker_threads);
//! ```

use serde::Deserialize;

const DEFAULT_WORKER_THREADS: usize = 2;
const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;
const DEFAULT_MAX_REDIRECTS: usize = 10;
const DEFAULT_MAX_BODY_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Number of reactor threads driving the client's sockets and callbacks.
    pub worker_threads: usize,
    pub thread_name: String,
    /// Initial capacity of the per connection read buffer.
    pub read_buffer_size: usize,
    /// Redirect hops followed by one operation before it fails with `RedirectLoop`.
    pub max_redirects: usize,
    /// Sent as `User-Agent` unless the request sets its own.
    pub user_agent: String,
    /// Largest response body the client accepts.
    pub max_body_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            thread_name: "exchange-client".to_owned(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: concat!("exchange-engine/", env!("CARGO_PKG_VERSION")).to_owned(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Number of reactor threads accepting connections and running the sink.
    pub worker_threads: usize,
    pub thread_name: String,
    pub read_buffer_size: usize,
    /// Requests with a larger body are answered with `413 Payload Too Large`.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_WORKER_THREADS,
            thread_name: "exchange-server".to_owned(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let client: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(client, ClientConfig::default());

        let server: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(server, ServerConfig::default());
    }

    #[test]
    fn partial_server_config() {
        let server: ServerConfig =
            serde_json::from_str(r#"{ "worker_threads": 8, "thread_name": "edge", "max_body_size": 1024 }"#).unwrap();

        assert_eq!(server.worker_threads, 8);
        assert_eq!(server.thread_name, "edge");
        assert_eq!(server.max_body_size, 1024);
        assert_eq!(server.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
    }

    #[test]
    fn default_user_agent_names_the_crate() {
        assert!(ClientConfig::default().user_agent.starts_with("exchange-engine/"));
    }
}
