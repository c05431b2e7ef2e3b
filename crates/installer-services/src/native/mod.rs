//! Native facility helpers.
//!
//! Thin wrappers over single OS facilities (firewall policy, registry,
//! certificate store), each behind a backend trait with an in-memory
//! implementation for tests and an OS-tool implementation for production.
//! Direct passthrough with defensive error conversion; no retries, no
//! batching.

pub mod certificates;
pub mod firewall;
pub mod registry;

pub use certificates::{CertificateStore, CertutilStore, MemoryCertStore};
pub use firewall::{FirewallBackend, MemoryFirewall, NetshFirewall};
pub use registry::{MemoryRegistry, RegistryBackend};

#[cfg(windows)]
pub use registry::WindowsRegistry;
