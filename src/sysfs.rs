//! PF-MAC compat reader: the pre-devlink way of recovering a host PF's MAC address.
//!
//! Some kernels expose a physical port's netdev without the devlink `function.eth_addr`
//! attribute populated. Vendor firmware on the smart-NIC side then publishes the host PF's MAC in
//! a fixed sysfs file under that netdev, which this module reads as a fallback (§4.2, §4.7).

use std::{
    fs,
    io::{self, BufRead},
    path::PathBuf,
};

use crate::mac::MacAddr;

/// Reads the host PF MAC for the physical netdev named `phy`.
///
/// Looks for a line beginning with a key whose first three characters are `MAC` (e.g. `MAC`,
/// `MAC Address`), taking the value after the first `": "`.
///
/// # Errors
///
/// Returns an error if the file is absent, unreadable, or contains no matching line.
pub fn read_pf_mac(phy: &str) -> io::Result<MacAddr> {
    let path: PathBuf = ["/sys/class/net", phy, "smart_nic/pf/config"].iter().collect();
    let file = fs::File::open(&path)?;
    for line in io::BufReader::new(file).lines() {
        let line = line?;
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        if key.len() < 3 || &key[..3] != "MAC" {
            continue;
        }
        return MacAddr::parse(value.trim())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("malformed MAC line in {}: {line:?}", path.display())));
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no MAC line found in {}", path.display()),
    ))
}
