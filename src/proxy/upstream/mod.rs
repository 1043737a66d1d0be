pub mod client;

pub use client::{UpstreamChatRequest, UpstreamClient};
