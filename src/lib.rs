//! SR-IOV representor plug provider.
//!
//! Given a logical port identified by `(host PF MAC, VF number)`, this crate resolves the local
//! representor netdev that a smart-NIC switch controller should attach to its bridge, and keeps
//! that mapping correct as the kernel hot-adds, renames or removes ports underneath it.
//!
//! The entry point is [`provider::PlugProvider`]; everything else ([`table`], [`devlink`],
//! [`uevent`], [`sysfs`]) is the machinery that keeps it fed.
#![warn(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
mod macros;

mod config;
mod devlink;
mod flavour;
mod mac;
pub mod provider;
mod record;
mod sysfs;
mod table;
mod uevent;
mod util;

pub use config::{ProviderConfig, ProviderConfigBuilder};
pub use flavour::PortFlavour;
pub use mac::MacAddr;
pub use provider::{OpType, PlugProvider, PortOptions, PrepareOutcome};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_sync() {
        fn assert<T: Send + Sync>() {}

        assert::<PlugProvider>();
        assert::<ProviderConfig>();
    }
}
