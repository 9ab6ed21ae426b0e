//! Kernel uevent monitoring, used to pick up netdev renames.
//!
//! Devlink tells us about a port's netdev by ifindex and name at the time a `PORT_NEW` or dump
//! reply is generated, but the kernel may rename that netdev afterwards (typically when `udev`
//! or a naming daemon applies a persistent name) without emitting a new devlink message. The
//! [`UeventMonitor`] listens for the kernel's own `move` uevents, which carry exactly the
//! `(ifindex, new name)` pair needed to keep [`crate::table::PortTable`] converged.
//!
//! This is Linux-only: `devlink` and the uevent netlink socket are both Linux kernel interfaces,
//! so unlike the rest of this codebase's device-facing crates, there is no second platform to
//! support here. A no-op [`fallback`] implementation exists purely so callers can degrade
//! gracefully (see [`UeventMonitor::new`]) rather than being forced to feature-gate their own code.

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
use linux::Impl;

mod fallback;
#[cfg(not(target_os = "linux"))]
use fallback::Impl;

use std::{
    fmt, io,
    os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, RawFd},
};

use crate::util::set_nonblocking;

trait UeventImpl: Sized + AsRawFd + IntoRawFd {
    fn open(recv_buffer_size: usize) -> io::Result<Self>;
    fn read(&self) -> io::Result<UeventRecord>;
}

/// A single kernel uevent, projected down to the fields this crate cares about.
///
/// `ifindex` and `sysname` are only populated when present in the datagram; callers interested in
/// netdev renames should use [`UeventMonitor::next_rename`] instead of matching on this type
/// directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UeventRecord {
    pub action: String,
    pub subsystem: String,
    pub ifindex: Option<String>,
    pub sysname: Option<String>,
}

impl UeventRecord {
    /// If this is a `net`-subsystem `move` event with a well-formed `ifindex`, returns the
    /// `(ifindex, new name)` pair the port table needs to apply a rename.
    fn as_rename(&self) -> Option<(u32, &str)> {
        if self.subsystem != "net" || self.action != "move" {
            return None;
        }
        let ifindex: u32 = self.ifindex.as_deref()?.parse().ok()?;
        let sysname = self.sysname.as_deref()?;
        Some((ifindex, sysname))
    }
}

/// Monitors the kernel for netdev rename (`move`) uevents.
///
/// Opening this is optional: per §4.3 of the design, if the uevent facility is unavailable the
/// system degrades to accepting stale names until the next devlink refresh. Callers should treat
/// [`UeventMonitor::new`] failing as non-fatal.
pub struct UeventMonitor {
    imp: Impl,
}

impl fmt::Debug for UeventMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UeventMonitor")
            .field("fd", &self.as_raw_fd())
            .finish()
    }
}

impl AsRawFd for UeventMonitor {
    #[inline]
    fn as_raw_fd(&self) -> RawFd {
        self.imp.as_raw_fd()
    }
}

impl IntoRawFd for UeventMonitor {
    #[inline]
    fn into_raw_fd(self) -> RawFd {
        self.imp.into_raw_fd()
    }
}

impl AsFd for UeventMonitor {
    #[inline]
    fn as_fd(&self) -> BorrowedFd<'_> {
        unsafe { BorrowedFd::borrow_raw(self.as_raw_fd()) }
    }
}

impl UeventMonitor {
    /// Opens the uevent socket, applies `recv_buffer_size` as its `SO_RCVBUF`, and immediately
    /// switches it to non-blocking mode, matching how
    /// [`crate::provider::PlugProvider::run`] drains it.
    ///
    /// # Errors
    ///
    /// Fails with [`io::ErrorKind::Unsupported`] on non-Linux targets. May also fail if the kernel
    /// socket cannot be opened or bound (for example, inside a network namespace or sandbox that
    /// disallows `NETLINK_KOBJECT_UEVENT`).
    pub fn new(recv_buffer_size: usize) -> io::Result<Self> {
        let imp = Impl::open(recv_buffer_size)?;
        set_nonblocking(imp.as_raw_fd(), true)?;
        Ok(Self { imp })
    }

    /// Drains and returns the next pending netdev rename, ignoring uevents that aren't `net`
    /// `move` events.
    ///
    /// Returns `Ok(None)` once no events are pending (`EWOULDBLOCK`); propagates any other I/O
    /// error.
    pub fn next_rename(&self) -> io::Result<Option<(u32, String)>> {
        loop {
            let rec = match self.imp.read() {
                Ok(rec) => rec,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e),
            };
            if let Some((ifindex, name)) = rec.as_rename() {
                return Ok(Some((ifindex, name.to_string())));
            }
            log::trace!(
                "ignoring uevent (action={}, subsystem={})",
                rec.action,
                rec.subsystem
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(action: &str, subsystem: &str, ifindex: Option<&str>, sysname: Option<&str>) -> UeventRecord {
        UeventRecord {
            action: action.into(),
            subsystem: subsystem.into(),
            ifindex: ifindex.map(Into::into),
            sysname: sysname.map(Into::into),
        }
    }

    #[test]
    fn move_event_on_net_is_a_rename() {
        let r = rec("move", "net", Some("12"), Some("eth7"));
        assert_eq!(r.as_rename(), Some((12, "eth7")));
    }

    #[test]
    fn non_move_action_is_ignored() {
        let r = rec("add", "net", Some("12"), Some("eth7"));
        assert_eq!(r.as_rename(), None);
    }

    #[test]
    fn non_net_subsystem_is_ignored() {
        let r = rec("move", "block", Some("12"), Some("sda"));
        assert_eq!(r.as_rename(), None);
    }

    #[test]
    fn non_numeric_ifindex_is_ignored() {
        let r = rec("move", "net", Some("not-a-number"), Some("eth7"));
        assert_eq!(r.as_rename(), None);
    }

    #[test]
    fn missing_fields_are_ignored() {
        assert_eq!(rec("move", "net", None, Some("eth7")).as_rename(), None);
        assert_eq!(rec("move", "net", Some("12"), None).as_rename(), None);
    }
}
