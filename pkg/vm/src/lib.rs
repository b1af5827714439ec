//! VM generation and launch on top of QEMU.

pub mod cmdline;
pub mod disk;
pub mod firmware;
pub mod host;
pub mod launcher;
pub mod plan;
pub mod store;

pub use cmdline::{CommandLine, build_command_line};
pub use host::Host;
pub use plan::{VmPlan, VmSettings};
pub use store::{VmEntry, VmRecord, VmStore};
