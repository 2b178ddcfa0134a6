// Individual source normalizer implementations
pub mod dob_historical;
pub mod dob_now;

// Re-export the main components
pub use dob_historical::DobHistoricalNormalizer;
pub use dob_now::DobNowNormalizer;
