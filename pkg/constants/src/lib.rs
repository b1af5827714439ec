//! Centralized constants for maxemu.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod detect;
pub mod paths;
pub mod vm;
