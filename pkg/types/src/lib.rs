//! Types shared across the maxemu crates.

pub mod arch;
pub mod config;
pub mod guest;
pub mod validate;

pub use arch::Arch;
pub use guest::GuestInfo;
