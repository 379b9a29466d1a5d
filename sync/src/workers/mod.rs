pub mod base;
pub mod destination_reader;
pub mod destination_writer;
pub mod heartbeat;
pub mod monitor;
pub mod processor;
pub mod source_reader;
