pub mod client_ip;
pub mod cors;

pub use cors::cors_middleware;
