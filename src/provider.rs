//! The plug-provider facade: the only part of this crate the surrounding switch controller calls
//! directly.

use std::io;

use crate::{
    config::ProviderConfig,
    devlink::{DevlinkClient, PortEvent, ProjectedPort},
    flavour::PortFlavour,
    mac::MacAddr,
    record::PortSource,
    sysfs,
    table::PortTable,
    uevent::UeventMonitor,
};

/// The kind of bridge-port operation the controller is carrying out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Add,
    Remove,
}

/// Result of [`PlugProvider::prepare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// The representor netdev to attach.
    Found(String),
    /// The options were well-formed but no matching representor exists yet.
    NotFound,
    /// Nothing to do; the caller handles this case itself (e.g. port removal).
    Skip,
}

const OPT_PF_MAC: &str = "vif-plug:representor:pf-mac";
const OPT_VF_NUM: &str = "vif-plug:representor:vf-num";

/// Per-port option mapping, as handed to [`PlugProvider::prepare`] by the controller.
pub trait PortOptions {
    fn get(&self, key: &str) -> Option<&str>;
}

impl<S: std::hash::BuildHasher> PortOptions for std::collections::HashMap<String, String, S> {
    fn get(&self, key: &str) -> Option<&str> {
        std::collections::HashMap::get(self, key).map(String::as_str)
    }
}

/// Ties the devlink client, uevent monitor and port table together behind the four operations the
/// switch controller calls (§4.5).
pub struct PlugProvider {
    config: ProviderConfig,
    devlink: Option<DevlinkClient>,
    uevent: Option<UeventMonitor>,
    table: PortTable,
}

impl PlugProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            devlink: None,
            uevent: None,
            table: PortTable::new(),
        }
    }

    /// Resolves devlink, runs the initial bulk dump, and starts the uevent monitor.
    ///
    /// Devlink failures are fatal (the feature is unavailable). A failure to start the uevent
    /// monitor is degraded to a warning: renames are simply picked up late, on the next devlink
    /// refresh (§4.3, §4.5).
    pub fn init(&mut self) -> io::Result<()> {
        let devlink = DevlinkClient::connect(self.config.recv_buffer_size)?;
        apply_events(&mut self.table, devlink.dump_ports()?, PortSource::Dump);
        self.devlink = Some(devlink);

        match UeventMonitor::new(self.config.recv_buffer_size) {
            Ok(monitor) => self.uevent = Some(monitor),
            Err(e) => log::warn!("uevent monitor unavailable, renames may lag: {e}"),
        }
        Ok(())
    }

    /// Drains pending devlink and uevent messages. Never blocks; safe to call as often as the
    /// caller likes (§5).
    ///
    /// Each socket is drained for at most `config.drain_batch_limit` messages (`0` means
    /// unbounded) before moving to the next, bounding how long a single call can run on a bursty
    /// host (§9.3).
    ///
    /// Returns whether the table changed as a result.
    pub fn run(&mut self) -> io::Result<bool> {
        let mut changed = false;
        let batch_limit = self.config.drain_batch_limit;

        if let Some(devlink) = &self.devlink {
            let events = devlink.poll_events(batch_limit)?;
            changed |= apply_events(&mut self.table, events, PortSource::Runtime);
        }

        if let Some(uevent) = &self.uevent {
            let mut drained = 0usize;
            loop {
                if batch_limit != 0 && drained >= batch_limit {
                    break;
                }
                match uevent.next_rename() {
                    Ok(Some((ifindex, name))) => {
                        drained += 1;
                        changed |= self.table.apply_rename(ifindex, &name);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("uevent monitor read failed: {e}");
                        break;
                    }
                }
            }
        }

        Ok(changed)
    }

    /// Tears everything down. After this call the provider must be [`init`](Self::init)ed again
    /// before further use.
    pub fn destroy(&mut self) {
        self.devlink = None;
        self.uevent = None;
        self.table = PortTable::new();
    }

    /// Resolves a logical port to its representor netdev name.
    pub fn prepare(
        &mut self,
        op_type: OpType,
        _lport_name: &str,
        options: &impl PortOptions,
    ) -> io::Result<PrepareOutcome> {
        if op_type == OpType::Remove {
            return Ok(PrepareOutcome::Skip);
        }

        let (Some(mac_str), Some(vf_str)) = (options.get(OPT_PF_MAC), options.get(OPT_VF_NUM))
        else {
            return Ok(PrepareOutcome::NotFound);
        };

        let Some(mac) = MacAddr::parse(mac_str) else {
            log::warn!("malformed {OPT_PF_MAC} option: {mac_str:?}");
            return Ok(PrepareOutcome::NotFound);
        };
        let Ok(vf_num) = vf_str.parse::<u16>() else {
            log::warn!("malformed {OPT_VF_NUM} option: {vf_str:?}");
            return Ok(PrepareOutcome::NotFound);
        };

        self.run()?;

        match self.table.lookup_pf_mac_vf(mac, u32::from(vf_num)) {
            Some(rec) => Ok(PrepareOutcome::Found(rec.netdev_name.clone())),
            None => Ok(PrepareOutcome::NotFound),
        }
    }
}

/// Projects decoded devlink events into `update_entry`/`delete_entry` calls, applying the PF-MAC
/// sysfs fallback of §4.7 along the way.
fn apply_events(table: &mut PortTable, events: Vec<PortEvent>, source: PortSource) -> bool {
    let mut changed = false;
    for event in events {
        changed |= match event {
            PortEvent::New(port) => apply_new(table, port, source),
            PortEvent::Del(port) => apply_del(table, port),
        };
    }
    changed
}

fn apply_new(table: &mut PortTable, port: ProjectedPort, source: PortSource) -> bool {
    let Some(flavour) = port.flavour else {
        log::debug!("dropping devlink port update with no flavour attribute");
        return false;
    };
    if !flavour.is_tracked() {
        return false;
    }

    let Some(ifindex) = port.netdev_ifindex else {
        // The kernel emits a PORT_NEW with no netdev_ifindex right before PORT_DEL; it carries no
        // usable payload and is silently ignored (§4.1).
        return false;
    };

    let mac = if flavour == PortFlavour::PCI_PF && port.function_eth_addr == MacAddr::ZERO {
        resolve_pf_mac_fallback(table, &port).unwrap_or(MacAddr::ZERO)
    } else {
        port.function_eth_addr
    };
    if flavour == PortFlavour::PCI_PF && mac == MacAddr::ZERO {
        log::warn!(
            "dropping PF update for {}/{}: no MAC from devlink or sysfs fallback",
            port.bus_name,
            port.dev_name
        );
        return false;
    }

    table.update_entry(
        &port.bus_name,
        &port.dev_name,
        ifindex,
        &port.netdev_name,
        ProjectedPort::number_or_max(port.port_index),
        ProjectedPort::pf_num_or_max(port.pci_pf_number),
        ProjectedPort::pf_num_or_max(port.pci_vf_number),
        flavour,
        mac,
        source,
    )
}

fn apply_del(table: &mut PortTable, port: ProjectedPort) -> bool {
    let Some(flavour) = port.flavour else {
        return false;
    };
    if !flavour.is_tracked() {
        return false;
    }
    table.delete_entry(
        &port.bus_name,
        &port.dev_name,
        ProjectedPort::number_or_max(port.port_index),
        ProjectedPort::pf_num_or_max(port.pci_pf_number),
        ProjectedPort::pf_num_or_max(port.pci_vf_number),
        flavour,
    )
}

/// Implements §4.7: a PF with a zero function MAC is resolved through its peer `Physical` port's
/// sysfs compat file.
fn resolve_pf_mac_fallback(table: &PortTable, port: &ProjectedPort) -> Option<MacAddr> {
    let pci_pf_number = ProjectedPort::pf_num_or_max(port.pci_pf_number);
    let phys = table.lookup_phy_bus_dev(&port.bus_name, &port.dev_name, PortFlavour::PHYSICAL, pci_pf_number)?;
    match sysfs::read_pf_mac(&phys.netdev_name) {
        Ok(mac) => Some(mac),
        Err(e) => {
            log::warn!("sysfs PF-MAC fallback for {} failed: {e}", phys.netdev_name);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn opts(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    // S6
    #[test]
    fn prepare_round_trips_through_table() {
        let mut table = PortTable::new();
        table.update_entry(
            "pci",
            "0000:03:00.0",
            10,
            "p0",
            0,
            u32::from(u16::MAX),
            u32::from(u16::MAX),
            PortFlavour::PHYSICAL,
            MacAddr::ZERO,
            PortSource::Dump,
        );
        table.update_entry(
            "pci",
            "0000:03:00.0",
            100,
            "p0hpf",
            u32::MAX,
            0,
            u32::from(u16::MAX),
            PortFlavour::PCI_PF,
            MacAddr::parse("00:53:00:00:00:42").unwrap(),
            PortSource::Dump,
        );
        table.update_entry(
            "pci",
            "0000:03:00.0",
            1000,
            "pf0vf0",
            u32::MAX,
            0,
            0,
            PortFlavour::PCI_VF,
            MacAddr::parse("00:53:00:00:10:00").unwrap(),
            PortSource::Runtime,
        );

        let mut provider = PlugProvider::new(ProviderConfig::default());
        provider.table = table;

        let found = provider
            .prepare(OpType::Add, "foo1", &opts(&[(OPT_PF_MAC, "00:53:00:00:00:42"), (OPT_VF_NUM, "0")]))
            .unwrap();
        assert_eq!(found, PrepareOutcome::Found("pf0vf0".into()));

        let missing = provider
            .prepare(OpType::Add, "foo1", &opts(&[(OPT_PF_MAC, "00:53:00:00:00:42"), (OPT_VF_NUM, "1")]))
            .unwrap();
        assert_eq!(missing, PrepareOutcome::NotFound);
    }

    #[test]
    fn remove_is_always_skip() {
        let mut provider = PlugProvider::new(ProviderConfig::default());
        let outcome = provider.prepare(OpType::Remove, "foo1", &opts(&[])).unwrap();
        assert_eq!(outcome, PrepareOutcome::Skip);
    }

    #[test]
    fn missing_options_is_not_found() {
        let mut provider = PlugProvider::new(ProviderConfig::default());
        let outcome = provider
            .prepare(OpType::Add, "foo1", &opts(&[(OPT_PF_MAC, "00:53:00:00:00:42")]))
            .unwrap();
        assert_eq!(outcome, PrepareOutcome::NotFound);
    }

    #[test]
    fn malformed_mac_is_not_found() {
        let mut provider = PlugProvider::new(ProviderConfig::default());
        let outcome = provider
            .prepare(OpType::Add, "foo1", &opts(&[(OPT_PF_MAC, "not-a-mac"), (OPT_VF_NUM, "0")]))
            .unwrap();
        assert_eq!(outcome, PrepareOutcome::NotFound);
    }

    /// Exercises `init`/`run`/`destroy` against whatever devlink ports the host actually has.
    /// Requires a kernel with at least one devlink instance registered (e.g. a real or emulated
    /// smart-NIC, or `netdevsim` with a devlink handle); skipped otherwise, since CI hosts
    /// typically have neither.
    #[test]
    #[ignore = "needs a live devlink instance and CAP_NET_ADMIN"]
    fn init_run_destroy_against_real_kernel() {
        env_logger::builder()
            .filter_module(env!("CARGO_PKG_NAME"), log::LevelFilter::Debug)
            .is_test(true)
            .try_init()
            .ok();

        let mut provider = PlugProvider::new(ProviderConfig::default());
        provider.init().expect("devlink family should resolve");
        provider.run().expect("drain should not block");
        provider.destroy();
    }
}
