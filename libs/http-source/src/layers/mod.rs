//! Tower layers composed into the request pipeline
//!
//! - [`UserAgentLayer`] - Adds a default `User-Agent`
//! - [`ContentDecodingService`] - Decompresses only what the client negotiated
//! - [`RetryLayer`] - Repeats failed attempts as decided by a [`RetryPolicy`]
//! - [`RedirectPolicy`] - Redirect policy for `tower_http::follow_redirect`

mod content_decoding;
mod redirect;
mod retry;
mod user_agent;

pub use content_decoding::ContentDecodingService;
pub use redirect::RedirectPolicy;
pub use retry::{RetryLayer, RetryPolicy, RetryService, calculate_backoff};
pub use user_agent::{UserAgentLayer, UserAgentService};
