pub mod codec;
pub mod error;
pub mod frame;
pub mod optimizer;
pub mod session;
pub mod telegram;
