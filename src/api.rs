//! HTTP API: the bearer-gated channel actions plus an open health probe.

mod auth;
mod server;
mod state;
mod strategy;
mod system;
mod telegram;

pub use auth::check_bearer;
pub use server::{router, start_http_server};
pub use state::ApiState;
pub use telegram::ChannelInfo;
