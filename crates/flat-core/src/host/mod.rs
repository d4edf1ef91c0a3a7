// # Host Implementations
//
// In-process implementations of the host capability traits. The
// kernel-backed implementation lives in the `flat-netlink` crate.

pub mod memory;

pub use memory::MemoryHost;
