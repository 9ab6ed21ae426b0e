//! Wire constants and attribute projection for the `devlink` generic-netlink family.
//!
//! Reproduces only the subset of `include/uapi/linux/devlink.h` this crate consumes: the port
//! dump/notification commands and the attributes that make up a `PortRecord`.

use netlink_packet_utils::nla::NlasIterator;

use crate::{flavour::PortFlavour, mac::MacAddr};

pub(crate) const FAMILY_NAME: &str = "devlink";
pub(crate) const MCAST_GROUP_CONFIG: &str = "config";

pub(crate) mod cmd {
    pub(crate) const PORT_GET: u8 = 5;
    pub(crate) const PORT_NEW: u8 = 7;
    pub(crate) const PORT_DEL: u8 = 8;
}

mod attr {
    pub(crate) const BUS_NAME: u16 = 1;
    pub(crate) const DEV_NAME: u16 = 2;
    pub(crate) const PORT_INDEX: u16 = 3;
    pub(crate) const PORT_NETDEV_IFINDEX: u16 = 6;
    pub(crate) const PORT_NETDEV_NAME: u16 = 7;
    pub(crate) const PORT_FLAVOUR: u16 = 71;
    pub(crate) const PORT_PCI_PF_NUMBER: u16 = 129;
    pub(crate) const PORT_PCI_VF_NUMBER: u16 = 130;
    pub(crate) const PORT_FUNCTION: u16 = 145; // nested
}

mod function_attr {
    pub(crate) const HW_ADDR: u16 = 1;
}

/// A devlink port, decoded from a dump reply or a `PORT_NEW`/`PORT_DEL` notification into exactly
/// the fields the port table needs (§4.1).
///
/// Sentinel-as-absence is resolved here: a missing `u16`/`u32` attribute decodes to `None`, and
/// callers that need the wire sentinel back (to satisfy [`crate::table::PortTable`]'s
/// `u32`-typed parameters) call [`ProjectedPort::number_or_max`] at the boundary.
#[derive(Debug, Clone)]
pub(crate) struct ProjectedPort {
    pub bus_name: String,
    pub dev_name: String,
    pub port_index: Option<u32>,
    pub flavour: Option<PortFlavour>,
    pub pci_pf_number: Option<u32>,
    pub pci_vf_number: Option<u32>,
    pub netdev_ifindex: Option<u32>,
    pub netdev_name: String,
    pub function_eth_addr: MacAddr,
}

impl ProjectedPort {
    /// Projects an absent optional attribute to the wire sentinel (its width's maximum value),
    /// the convention `update_entry`/`delete_entry` expect (§9 design notes).
    pub fn number_or_max(v: Option<u32>) -> u32 {
        v.unwrap_or(u32::MAX)
    }

    pub fn pf_num_or_max(v: Option<u32>) -> u32 {
        v.unwrap_or(u32::from(u16::MAX))
    }
}

/// A decoded `PORT_NEW` or `PORT_DEL` message.
#[derive(Debug, Clone)]
pub(crate) enum PortEvent {
    New(ProjectedPort),
    Del(ProjectedPort),
}

/// Parses the attribute stream of one devlink message body (i.e. everything after the 4-byte
/// `genlmsghdr`) into a [`PortEvent`], given the command byte from that header.
///
/// Returns `Ok(None)` for commands other than `PORT_GET`/`PORT_NEW`/`PORT_DEL` replies, which
/// callers drop silently per §4.1. A malformed NLA stream is an `Err`, which callers treat as a
/// decode failure for that single message.
pub(crate) fn parse_port_message(
    command: u8,
    body: &[u8],
) -> Result<Option<PortEvent>, netlink_packet_utils::DecodeError> {
    let port = match command {
        cmd::PORT_NEW | cmd::PORT_GET | cmd::PORT_DEL => parse_port_attrs(body)?,
        _ => return Ok(None),
    };

    Ok(Some(match command {
        cmd::PORT_DEL => PortEvent::Del(port),
        _ => PortEvent::New(port),
    }))
}

fn parse_port_attrs(body: &[u8]) -> Result<ProjectedPort, netlink_packet_utils::DecodeError> {
    let mut bus_name = String::new();
    let mut dev_name = String::new();
    let mut port_index = None;
    let mut flavour = None;
    let mut pci_pf_number = None;
    let mut pci_vf_number = None;
    let mut netdev_ifindex = None;
    let mut netdev_name = String::new();
    let mut function_eth_addr = MacAddr::ZERO;

    for nla in NlasIterator::new(body) {
        let nla = nla?;
        let kind = nla.kind()?;
        let value = nla.value();
        match kind {
            attr::BUS_NAME => bus_name = parse_nla_string(value),
            attr::DEV_NAME => dev_name = parse_nla_string(value),
            attr::PORT_INDEX => port_index = parse_nla_u32(value),
            attr::PORT_FLAVOUR => flavour = parse_nla_u16(value).map(|v| PortFlavour(v)),
            attr::PORT_PCI_PF_NUMBER => pci_pf_number = parse_nla_u16(value).map(u32::from),
            attr::PORT_PCI_VF_NUMBER => pci_vf_number = parse_nla_u16(value).map(u32::from),
            attr::PORT_NETDEV_IFINDEX => netdev_ifindex = parse_nla_u32(value),
            attr::PORT_NETDEV_NAME => netdev_name = parse_nla_string(value),
            attr::PORT_FUNCTION => {
                if let Some(addr) = parse_function_nested(value)? {
                    function_eth_addr = addr;
                }
            }
            _ => {}
        }
    }

    Ok(ProjectedPort {
        bus_name,
        dev_name,
        port_index,
        flavour,
        pci_pf_number,
        pci_vf_number,
        netdev_ifindex,
        netdev_name,
        function_eth_addr,
    })
}

fn parse_function_nested(
    nested: &[u8],
) -> Result<Option<MacAddr>, netlink_packet_utils::DecodeError> {
    for nla in NlasIterator::new(nested) {
        let nla = nla?;
        if nla.kind()? == function_attr::HW_ADDR {
            return MacAddr::from_attr_bytes(nla.value()).map(Some).ok_or_else(|| {
                netlink_packet_utils::DecodeError::from(format!(
                    "DEVLINK_PORT_FUNCTION_ATTR_HW_ADDR must be 6 bytes, got {}",
                    nla.value().len()
                ))
            });
        }
    }
    Ok(None)
}

fn parse_nla_string(value: &[u8]) -> String {
    let value = value.strip_suffix(&[0]).unwrap_or(value);
    String::from_utf8_lossy(value).into_owned()
}

fn parse_nla_u16(value: &[u8]) -> Option<u16> {
    <[u8; 2]>::try_from(value).ok().map(u16::from_ne_bytes)
}

fn parse_nla_u32(value: &[u8]) -> Option<u32> {
    <[u8; 4]>::try_from(value).ok().map(u32::from_ne_bytes)
}
