mod base;
mod heartbeat;
mod pipeline;

pub use base::*;
pub use heartbeat::*;
pub use pipeline::*;
