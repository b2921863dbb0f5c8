pub mod client;
pub mod errors;
pub mod pipeline;
pub mod throttle;
pub mod types;

pub use client::{BROWSER_USER_AGENT, FetcherOptions, HttpFetcher};
pub use errors::FetchError;
pub use throttle::HostThrottle;
pub use types::{Charset, PageResponse};
