use crate::{flavour::PortFlavour, mac::MacAddr};

/// Where a record's last update came from.
///
/// This distinction feeds only the [`PortRecord::rename_expected`] diagnostic; lookup correctness
/// never depends on it (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSource {
    /// Learned from the initial `PORT_GET` dump.
    Dump,
    /// Learned from a `PORT_NEW`/`PORT_DEL` multicast while the table was already running.
    Runtime,
}

/// Identifies a PF record by the key its `(bus_name, dev_name, flavour, number)` index uses,
/// without holding a pointer or handle to it.
///
/// Per the design notes, a VF's back-reference to its PF is a *lookup relation*: resolving it
/// always goes back through [`crate::table::PortTable`], so a PF that has since been removed is
/// simply a lookup miss rather than a dangling reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PfRef {
    pub bus: String,
    pub dev: String,
    pub pci_pf_number: u32,
}

/// One devlink port, projected into the fields the table needs.
#[derive(Debug, Clone)]
pub struct PortRecord {
    pub netdev_ifindex: u32,
    pub netdev_name: String,
    pub renamed: bool,
    pub flavour: PortFlavour,
    /// Interpreted per [`flavour`](Self::flavour): physical port number, PF number, or VF number.
    pub number: u32,
    /// Host-visible PF MAC (`PciPf`) or the devlink-reported MAC otherwise; unused by lookup for
    /// `Physical` and `PciVf` but retained for completeness.
    pub mac: MacAddr,
    /// Present only for `PciVf` records.
    pub pf: Option<PfRef>,
    pub source: PortSource,
}

impl PortRecord {
    /// True iff this record was learned from a live `PORT_NEW` and has not yet received its first
    /// rename from the uevent stream. Diagnostic only (§4.4).
    pub fn rename_expected(&self) -> bool {
        self.source == PortSource::Runtime && !self.renamed
    }
}
