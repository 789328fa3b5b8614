//! CSV adapters used by the replay binary.

pub mod booking_writer;
pub mod command_reader;
pub mod vehicle_reader;
