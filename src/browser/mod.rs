pub mod fingerprint;
pub mod http;
pub mod remote;

// Re-export common types
pub use fingerprint::{AntiDetectionManager, ClientIdentity, Viewport};
pub use http::HttpFetcher;
pub use remote::RemoteBrowserService;
