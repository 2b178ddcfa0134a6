// Permit pipeline: in-memory processing stages and table storage

pub mod processing;
pub mod storage;
