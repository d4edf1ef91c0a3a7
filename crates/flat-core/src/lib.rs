// # flat-core
//
// Host network topology layer of the flat overlay agent.
//
// ## Architecture Overview
//
// - **ip**: IPv4/IPv6 value types and CIDR arithmetic
// - **RouteInspector**: read-only routing table questions
// - **InterfaceResolver**: picks the interface that carries overlay traffic
// - **LinkAddressReconciler**: keeps a link's addresses in line with the lease
// - **SubnetManager**: boundary to the lease allocator
//
// ## Design Principles
//
// 1. **No cached host state**: every call re-reads interfaces, routes and
//    addresses
// 2. **Capabilities, not objects**: interfaces are identifiers; behaviour
//    lives behind the `InterfaceTable`, `RouteTable` and `LinkAddresses`
//    traits
// 3. **Idempotency**: reconciliation can run on every tick
// 4. **No hidden retries**: failures go back to the caller

pub mod config;
pub mod error;
pub mod host;
pub mod ip;
pub mod reconcile;
pub mod resolver;
pub mod route;
pub mod subnet;
pub mod traits;

// Re-export core types for convenience
pub use config::{AgentConfig, InterfaceSelection};
pub use error::{Error, Result};
pub use host::MemoryHost;
pub use ip::{Ip4, Ip4Net, Ip6Net};
pub use reconcile::{LeaseOutcome, LinkAddressReconciler, ReconcileOutcome};
pub use resolver::{InterfaceResolver, ResolvedInterface};
pub use route::RouteInspector;
pub use subnet::{FileSubnetManager, StaticSubnetManager};
pub use traits::{HostNetwork, Interface, IpFamily, LinkAddress, NetworkConfig, SubnetManager};
