//! In-memory port-topology model: three indices over one record set.
//!
//! The three indices (by ifindex, by `(bus, dev, flavour, key)`, by `(pf.mac, vf_number)`) are
//! plain `HashMap`s keyed into an arena of [`PortRecord`]s identified by a small integer handle.
//! A VF's reference to its owning PF is stored as an identifying key
//! ([`crate::record::PfRef`]), never as a pointer into the arena: [`PortTable::resolve_pf`]
//! revalidates it against the live `(bus, dev, flavour, key)` index on every call, so a removed PF
//! simply produces `None` instead of a dangling access (§9 design notes).

use std::collections::HashMap;

use crate::{
    flavour::PortFlavour,
    mac::MacAddr,
    record::{PfRef, PortRecord, PortSource},
};

type RecordId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BusDevKey {
    bus: String,
    dev: String,
    flavour: PortFlavour,
    key: u32,
}

/// The process-wide port-topology model.
///
/// Carries no sockets or threads of its own; it is pure in-memory state driven entirely by calls
/// from [`crate::provider::PlugProvider`].
#[derive(Default)]
pub struct PortTable {
    records: HashMap<RecordId, PortRecord>,
    next_id: RecordId,
    by_ifindex: HashMap<u32, RecordId>,
    by_bus_dev: HashMap<BusDevKey, RecordId>,
    by_mac_vf: HashMap<(MacAddr, u32), RecordId>,
}

impl PortTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&mut self) -> RecordId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Inserts or updates a record from a devlink `PORT_NEW` (or a dump reply). Returns whether
    /// the table actually changed.
    ///
    /// `number`, `pci_pf_num` and `pci_vf_num` are the three raw devlink attributes; which one
    /// supplies [`PortRecord::number`] and the `(bus, dev, flavour, key)` index key depends on
    /// `flavour`, per §4.4.
    #[allow(clippy::too_many_arguments)]
    pub fn update_entry(
        &mut self,
        bus: &str,
        dev: &str,
        ifindex: u32,
        name: &str,
        number: u32,
        pci_pf_num: u32,
        pci_vf_num: u32,
        flavour: PortFlavour,
        mac: MacAddr,
        source: PortSource,
    ) -> bool {
        match flavour {
            PortFlavour::PHYSICAL | PortFlavour::PCI_PF => {
                let key_num = if flavour == PortFlavour::PHYSICAL {
                    number
                } else {
                    pci_pf_num
                };
                let key = BusDevKey {
                    bus: bus.to_string(),
                    dev: dev.to_string(),
                    flavour,
                    key: key_num,
                };

                if let Some(&id) = self.by_bus_dev.get(&key) {
                    let rec = self.records.get_mut(&id).expect("index/arena desync");
                    let mut changed = false;

                    if rec.netdev_ifindex != ifindex {
                        self.by_ifindex.remove(&rec.netdev_ifindex);
                        rec.netdev_ifindex = ifindex;
                        self.by_ifindex.insert(ifindex, id);
                        changed = true;
                    }
                    if rec.netdev_name != name {
                        rec.netdev_name = name.to_string();
                        rec.renamed = true;
                        changed = true;
                    }
                    if flavour == PortFlavour::PCI_PF && mac != MacAddr::ZERO && rec.mac != mac {
                        rec.mac = mac;
                        changed = true;
                    }
                    changed
                } else {
                    let id = self.alloc_id();
                    self.records.insert(
                        id,
                        PortRecord {
                            netdev_ifindex: ifindex,
                            netdev_name: name.to_string(),
                            renamed: false,
                            flavour,
                            number: key_num,
                            mac,
                            pf: None,
                            source,
                        },
                    );
                    self.by_ifindex.insert(ifindex, id);
                    self.by_bus_dev.insert(key, id);
                    true
                }
            }

            PortFlavour::PCI_VF => {
                let pf_key = BusDevKey {
                    bus: bus.to_string(),
                    dev: dev.to_string(),
                    flavour: PortFlavour::PCI_PF,
                    key: pci_pf_num,
                };
                let Some(&pf_id) = self.by_bus_dev.get(&pf_key) else {
                    log::warn!(
                        "dropping VF update for {bus}/{dev} pf={pci_pf_num} vf={pci_vf_num}: no PF on record"
                    );
                    return false;
                };

                if let Some(&id) = self.by_ifindex.get(&ifindex) {
                    let rec = self.records.get_mut(&id).expect("index/arena desync");
                    if rec.netdev_name != name {
                        rec.netdev_name = name.to_string();
                        rec.renamed = true;
                        true
                    } else {
                        false
                    }
                } else {
                    let pf_mac = self.records[&pf_id].mac;
                    let id = self.alloc_id();
                    self.records.insert(
                        id,
                        PortRecord {
                            netdev_ifindex: ifindex,
                            netdev_name: name.to_string(),
                            renamed: false,
                            flavour,
                            number: pci_vf_num,
                            mac,
                            pf: Some(PfRef {
                                bus: bus.to_string(),
                                dev: dev.to_string(),
                                pci_pf_number: pci_pf_num,
                            }),
                            source,
                        },
                    );
                    self.by_ifindex.insert(ifindex, id);
                    self.by_mac_vf.insert((pf_mac, pci_vf_num), id);
                    true
                }
            }

            _ => false,
        }
    }

    /// Removes a record addressed the same way `update_entry` would have created it. Returns
    /// whether a record was actually removed.
    pub fn delete_entry(
        &mut self,
        bus: &str,
        dev: &str,
        number: u32,
        pci_pf_num: u32,
        pci_vf_num: u32,
        flavour: PortFlavour,
    ) -> bool {
        match flavour {
            PortFlavour::PHYSICAL | PortFlavour::PCI_PF => {
                let key_num = if flavour == PortFlavour::PHYSICAL {
                    number
                } else {
                    pci_pf_num
                };
                let key = BusDevKey {
                    bus: bus.to_string(),
                    dev: dev.to_string(),
                    flavour,
                    key: key_num,
                };
                let Some(id) = self.by_bus_dev.remove(&key) else {
                    return false;
                };
                let rec = self.records.remove(&id).expect("index/arena desync");
                self.by_ifindex.remove(&rec.netdev_ifindex);
                true
            }

            PortFlavour::PCI_VF => {
                let pf_key = BusDevKey {
                    bus: bus.to_string(),
                    dev: dev.to_string(),
                    flavour: PortFlavour::PCI_PF,
                    key: pci_pf_num,
                };
                let Some(&pf_id) = self.by_bus_dev.get(&pf_key) else {
                    return false;
                };
                let pf_mac = self.records[&pf_id].mac;
                let Some(id) = self.by_mac_vf.remove(&(pf_mac, pci_vf_num)) else {
                    return false;
                };
                let rec = self.records.remove(&id).expect("index/arena desync");
                self.by_ifindex.remove(&rec.netdev_ifindex);
                true
            }

            _ => false,
        }
    }

    /// Applies a netdev rename picked up from the uevent monitor. Returns `true` if a record for
    /// `ifindex` existed and was updated.
    pub fn apply_rename(&mut self, ifindex: u32, new_name: &str) -> bool {
        let Some(&id) = self.by_ifindex.get(&ifindex) else {
            return false;
        };
        let rec = self.records.get_mut(&id).expect("index/arena desync");
        if rec.netdev_name == new_name {
            return false;
        }
        rec.netdev_name = new_name.to_string();
        rec.renamed = true;
        true
    }

    pub fn lookup_ifindex(&self, ifindex: u32) -> Option<&PortRecord> {
        self.by_ifindex.get(&ifindex).map(|id| &self.records[id])
    }

    pub fn lookup_pf_mac_vf(&self, mac: MacAddr, vf_num: u32) -> Option<&PortRecord> {
        self.by_mac_vf
            .get(&(mac, vf_num))
            .map(|id| &self.records[id])
    }

    pub fn lookup_phy_bus_dev(
        &self,
        bus: &str,
        dev: &str,
        flavour: PortFlavour,
        number: u32,
    ) -> Option<&PortRecord> {
        let key = BusDevKey {
            bus: bus.to_string(),
            dev: dev.to_string(),
            flavour,
            key: number,
        };
        self.by_bus_dev.get(&key).map(|id| &self.records[id])
    }

    /// Resolves a VF's [`PfRef`] against the live `(bus, dev, flavour, key)` index.
    ///
    /// Returns `None` if the PF named by `pf_ref` is no longer present, which is the expected
    /// outcome of a PF removal that raced ahead of its VFs' deletions.
    pub fn resolve_pf(&self, pf_ref: &PfRef) -> Option<&PortRecord> {
        self.lookup_phy_bus_dev(&pf_ref.bus, &pf_ref.dev, PortFlavour::PCI_PF, pf_ref.pci_pf_number)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PCI: &str = "pci";
    const DEV: &str = "0000:03:00.0";

    fn mac(last: u8) -> MacAddr {
        MacAddr([0x00, 0x53, 0x00, 0x00, 0x00, last])
    }

    // S1
    #[test]
    fn physical_and_pf_store_and_lookup() {
        let mut t = PortTable::new();
        t.update_entry(
            PCI,
            DEV,
            10,
            "p0",
            0,
            u32::from(u16::MAX),
            u32::from(u16::MAX),
            PortFlavour::PHYSICAL,
            MacAddr::ZERO,
            PortSource::Dump,
        );
        t.update_entry(
            PCI,
            DEV,
            100,
            "p0hpf",
            u32::MAX,
            0,
            u32::from(u16::MAX),
            PortFlavour::PCI_PF,
            mac(0x42),
            PortSource::Dump,
        );

        let phys = t
            .lookup_phy_bus_dev(PCI, DEV, PortFlavour::PHYSICAL, 0)
            .unwrap();
        assert_eq!(phys.netdev_ifindex, 10);
        assert_eq!(phys.netdev_name, "p0");

        let pf = t.lookup_phy_bus_dev(PCI, DEV, PortFlavour::PCI_PF, 0).unwrap();
        assert_eq!(pf.netdev_ifindex, 100);
        assert_eq!(pf.netdev_name, "p0hpf");
        assert_eq!(pf.mac, mac(0x42));
    }

    fn setup_s1(t: &mut PortTable) {
        t.update_entry(
            PCI,
            DEV,
            10,
            "p0",
            0,
            u32::from(u16::MAX),
            u32::from(u16::MAX),
            PortFlavour::PHYSICAL,
            MacAddr::ZERO,
            PortSource::Dump,
        );
        t.update_entry(
            PCI,
            DEV,
            100,
            "p0hpf",
            u32::MAX,
            0,
            u32::from(u16::MAX),
            PortFlavour::PCI_PF,
            mac(0x42),
            PortSource::Dump,
        );
    }

    // S2
    #[test]
    fn vf_add_and_pf_mac_lookup() {
        let mut t = PortTable::new();
        setup_s1(&mut t);
        t.update_entry(
            PCI,
            DEV,
            1000,
            "pf0vf0",
            u32::MAX,
            0,
            0,
            PortFlavour::PCI_VF,
            mac(0x10),
            PortSource::Runtime,
        );

        let vf = t.lookup_pf_mac_vf(mac(0x42), 0).unwrap();
        assert_eq!(vf.netdev_ifindex, 1000);
        assert_eq!(vf.netdev_name, "pf0vf0");
        let pf = t.resolve_pf(vf.pf.as_ref().unwrap()).unwrap();
        assert_eq!(pf.netdev_name, "p0hpf");
    }

    // S3
    #[test]
    fn vf_delete() {
        let mut t = PortTable::new();
        setup_s1(&mut t);
        t.update_entry(
            PCI,
            DEV,
            1000,
            "pf0vf0",
            u32::MAX,
            0,
            0,
            PortFlavour::PCI_VF,
            mac(0x10),
            PortSource::Runtime,
        );

        let deleted = t.delete_entry(PCI, DEV, u32::MAX, 0, 0, PortFlavour::PCI_VF);
        assert!(deleted);
        assert!(t.lookup_ifindex(1000).is_none());
        assert!(t.lookup_pf_mac_vf(mac(0x42), 0).is_none());
    }

    #[test]
    fn vf_without_pf_is_dropped_not_orphaned() {
        let mut t = PortTable::new();
        let changed = t.update_entry(
            PCI,
            DEV,
            1000,
            "pf0vf0",
            u32::MAX,
            0,
            0,
            PortFlavour::PCI_VF,
            mac(0x10),
            PortSource::Runtime,
        );
        assert!(!changed);
        assert!(t.is_empty());
    }

    #[test]
    fn delete_of_absent_is_noop() {
        let mut t = PortTable::new();
        setup_s1(&mut t);
        let before = t.len();
        assert!(!t.delete_entry(PCI, DEV, u32::MAX, 7, u16::MAX.into(), PortFlavour::PCI_VF));
        assert_eq!(t.len(), before);
    }

    // S5
    #[test]
    fn rename_expected_predicate() {
        let mut t = PortTable::new();
        t.update_entry(
            PCI,
            DEV,
            100,
            "p0hpf",
            u32::MAX,
            0,
            u32::from(u16::MAX),
            PortFlavour::PCI_PF,
            mac(0x42),
            PortSource::Runtime,
        );
        let rec = t.lookup_phy_bus_dev(PCI, DEV, PortFlavour::PCI_PF, 0).unwrap();
        assert!(rec.rename_expected());

        t.apply_rename(100, "pf0hpf_renamed");
        let rec = t.lookup_phy_bus_dev(PCI, DEV, PortFlavour::PCI_PF, 0).unwrap();
        assert!(!rec.rename_expected());
        assert_eq!(rec.netdev_name, "pf0hpf_renamed");
    }

    // Property 4: idempotent apply
    #[test]
    fn idempotent_apply() {
        let mut t1 = PortTable::new();
        setup_s1(&mut t1);
        let mut t2 = PortTable::new();
        setup_s1(&mut t2);
        setup_s1(&mut t2);

        assert_eq!(t1.len(), t2.len());
        let a = t1.lookup_phy_bus_dev(PCI, DEV, PortFlavour::PCI_PF, 0).unwrap();
        let b = t2.lookup_phy_bus_dev(PCI, DEV, PortFlavour::PCI_PF, 0).unwrap();
        assert_eq!(a.netdev_name, b.netdev_name);
        assert_eq!(a.mac, b.mac);
    }

    // Property 6: rename convergence, last writer wins regardless of interleaving
    #[test]
    fn rename_convergence() {
        let mut t = PortTable::new();
        setup_s1(&mut t);
        t.apply_rename(100, "tmp1");
        t.apply_rename(100, "tmp2");
        t.update_entry(
            PCI,
            DEV,
            100,
            "final",
            u32::MAX,
            0,
            u32::from(u16::MAX),
            PortFlavour::PCI_PF,
            mac(0x42),
            PortSource::Runtime,
        );
        assert_eq!(t.lookup_ifindex(100).unwrap().netdev_name, "final");
    }
}
