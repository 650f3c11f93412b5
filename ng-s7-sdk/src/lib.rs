mod model;
mod retry;
mod wire;

pub use model::{ConnectionMode, ConnectionPolicy};
pub use retry::{build_exponential_backoff, RetryPolicy};
pub use wire::{WireDecode, WireEncode};
