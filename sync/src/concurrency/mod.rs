pub mod queue;
pub mod shutdown;
