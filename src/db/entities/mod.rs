//! SeaORM entities mapping the tables this service reads and writes.

pub mod config_entry;
