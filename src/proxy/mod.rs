pub mod handlers;
pub mod health;
pub mod mappers;
pub mod memory;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod sanitize;
pub mod server;
pub mod session;
pub mod state;
pub mod upstream;

pub use server::AxumServer;
pub use state::AppState;

#[cfg(test)]
pub mod tests;
