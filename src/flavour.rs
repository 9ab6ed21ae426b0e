use std::fmt;

ffi_enum! {
    /// Devlink port flavour, as carried in `DEVLINK_ATTR_PORT_FLAVOUR`.
    ///
    /// Only [`PHYSICAL`], [`PCI_PF`] and [`PCI_VF`] participate in the port table; the rest are
    /// recognised so they can be dropped silently rather than logged as unknown.
    ///
    /// [`PHYSICAL`]: Self::PHYSICAL
    /// [`PCI_PF`]: Self::PCI_PF
    /// [`PCI_VF`]: Self::PCI_VF
    pub enum PortFlavour: u16 {
        PHYSICAL = 0,
        CPU      = 1,
        DSA      = 2,
        PCI_PF   = 3,
        PCI_VF   = 4,
        VIRTUAL  = 5,
        UNUSED   = 6,
        PCI_SF   = 7,
    }
}

impl PortFlavour {
    /// Whether this flavour participates in the port table.
    ///
    /// `CPU`, `DSA`, `VIRTUAL`, `UNUSED` and `PCI_SF` ports exist in the kernel's devlink model but
    /// have no place in the PF/VF representor lookup this crate implements.
    pub fn is_tracked(self) -> bool {
        matches!(self, Self::PHYSICAL | Self::PCI_PF | Self::PCI_VF)
    }
}

impl fmt::Debug for PortFlavour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variant_name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "PortFlavour({})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracked_flavours() {
        assert!(PortFlavour::PHYSICAL.is_tracked());
        assert!(PortFlavour::PCI_PF.is_tracked());
        assert!(PortFlavour::PCI_VF.is_tracked());
        assert!(!PortFlavour::CPU.is_tracked());
        assert!(!PortFlavour::PCI_SF.is_tracked());
    }

    #[test]
    fn debug_format() {
        assert_eq!(format!("{:?}", PortFlavour::PCI_VF), "PCI_VF");
        assert_eq!(format!("{:?}", PortFlavour(0xff)), "PortFlavour(255)");
    }
}
