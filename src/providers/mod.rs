//! Price source implementations

pub mod birdeye;

pub use birdeye::BirdeyeSource;
