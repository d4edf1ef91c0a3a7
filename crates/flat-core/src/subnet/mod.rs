// # Subnet Manager Implementations
//
// Implementations of the SubnetManager trait that read an already allocated
// lease. Allocation itself happens outside this crate.

pub mod file;
pub mod memory;

pub use file::FileSubnetManager;
pub use memory::StaticSubnetManager;
