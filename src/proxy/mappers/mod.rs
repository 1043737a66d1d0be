pub mod stream;
pub mod wire;
