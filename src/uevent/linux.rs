use std::{
    ffi::{c_int, c_uint},
    io, mem,
    os::{
        fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd},
        unix::prelude::RawFd,
    },
};

use libc::{
    AF_NETLINK, NETLINK_KOBJECT_UEVENT, SOCK_CLOEXEC, SOCK_DGRAM, bind, iovec, msghdr, recvmsg,
    sa_family_t, sockaddr_nl, socket, socklen_t, ssize_t,
};

use crate::uevent::UeventRecord;

fn cvt(ret: c_int) -> io::Result<c_int /* never -1 */> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn cvt_r(mut f: impl FnMut() -> ssize_t) -> io::Result<ssize_t> {
    loop {
        let ret = f();
        if ret == -1 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        } else {
            return Ok(ret);
        }
    }
}

/// Raw kernel broadcast group of `NETLINK_KOBJECT_UEVENT` (as opposed to the `udev`-rebroadcast
/// group): messages on this group are not wrapped in the `libudev` envelope.
const KERNEL_GROUP: c_uint = 1;

/// Parses one `NETLINK_KOBJECT_UEVENT` datagram from the kernel group.
///
/// Kernel uevents consist of an `ACTION@DEVPATH` line (no trailing NUL), followed by a sequence of
/// NUL-terminated `KEY=VALUE` property lines. This is distinct from the `libudev`-enveloped format
/// used by the `udev` rebroadcast group, which carries a binary header before the properties.
pub(crate) fn parse_kernel_uevent(buf: &[u8]) -> Option<UeventRecord> {
    let nul = buf.iter().position(|&b| b == 0)?;
    let (head, rest) = (&buf[..nul], &buf[nul + 1..]);
    let head = std::str::from_utf8(head).ok()?;
    let (action, _devpath) = head.split_once('@')?;

    let mut subsystem = None;
    let mut ifindex = None;
    let mut sysname = None;
    for entry in rest.split(|&b| b == 0) {
        if entry.is_empty() {
            continue;
        }
        let Ok(entry) = std::str::from_utf8(entry) else {
            continue;
        };
        if let Some(v) = entry.strip_prefix("SUBSYSTEM=") {
            subsystem = Some(v.to_string());
        } else if let Some(v) = entry.strip_prefix("IFINDEX=") {
            ifindex = Some(v.to_string());
        } else if let Some(v) = entry.strip_prefix("INTERFACE=") {
            sysname = Some(v.to_string());
        }
    }

    Some(UeventRecord {
        action: action.to_string(),
        subsystem: subsystem.unwrap_or_default(),
        ifindex,
        sysname,
    })
}

pub struct Impl {
    netlink_socket: OwnedFd,
}

impl Impl {
    fn open_group(recv_buffer_size: usize) -> io::Result<Self> {
        unsafe {
            let fd = OwnedFd::from_raw_fd(cvt(socket(
                AF_NETLINK,
                SOCK_DGRAM | SOCK_CLOEXEC, // blocking by default
                NETLINK_KOBJECT_UEVENT,
            ))?);

            crate::util::set_recv_buffer_size(fd.as_raw_fd(), recv_buffer_size)?;

            let mut addr: sockaddr_nl = mem::zeroed();
            addr.nl_family = AF_NETLINK as sa_family_t;
            addr.nl_groups = KERNEL_GROUP as _;
            cvt(bind(
                fd.as_raw_fd(),
                (&raw const addr).cast(),
                size_of_val(&addr) as socklen_t,
            ))?;

            Ok(Self { netlink_socket: fd })
        }
    }
}

impl AsRawFd for Impl {
    #[inline]
    fn as_raw_fd(&self) -> RawFd {
        self.netlink_socket.as_raw_fd()
    }
}

impl IntoRawFd for Impl {
    #[inline]
    fn into_raw_fd(self) -> RawFd {
        self.netlink_socket.into_raw_fd()
    }
}

impl super::UeventImpl for Impl {
    fn open(recv_buffer_size: usize) -> io::Result<Self> {
        Self::open_group(recv_buffer_size)
    }

    fn read(&self) -> io::Result<UeventRecord> {
        let mut buf = [0u8; 8192];
        let mut sender = unsafe { mem::zeroed::<sockaddr_nl>() };

        loop {
            let mut iov = iovec {
                iov_base: buf.as_mut_ptr().cast(),
                iov_len: buf.len(),
            };
            let mut msg = unsafe { mem::zeroed::<msghdr>() };
            msg.msg_iov = &mut iov;
            msg.msg_iovlen = 1;
            msg.msg_name = (&raw mut sender).cast();
            msg.msg_namelen = mem::size_of_val(&sender) as u32;

            let buflen = unsafe { cvt_r(|| recvmsg(self.as_raw_fd(), &mut msg, 0))? };
            if buflen <= 0 || buflen >= buf.len() as isize {
                log::debug!("ignoring uevent: recvmsg returned {buflen} bytes");
                continue;
            }

            // `sender.nl_pid == 0` identifies the kernel as the sender; user processes can also
            // multicast onto this group, and their messages must be ignored.
            if sender.nl_pid != 0 {
                log::debug!(
                    "ignoring uevent from non-kernel pid {} (spoofed multicast?)",
                    sender.nl_pid
                );
                continue;
            }

            match parse_kernel_uevent(&buf[..buflen as usize]) {
                Some(rec) => {
                    log::trace!("uevent: {rec:?}");
                    return Ok(rec);
                }
                None => {
                    log::debug!("ignoring malformed uevent datagram");
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_move_event() {
        let mut buf = b"move@/devices/virtual/net/eth1".to_vec();
        buf.push(0);
        buf.extend_from_slice(b"ACTION=move\0");
        buf.extend_from_slice(b"SUBSYSTEM=net\0");
        buf.extend_from_slice(b"IFINDEX=7\0");
        buf.extend_from_slice(b"INTERFACE=eth1\0");

        let rec = parse_kernel_uevent(&buf).unwrap();
        assert_eq!(rec.action, "move");
        assert_eq!(rec.subsystem, "net");
        assert_eq!(rec.ifindex.as_deref(), Some("7"));
        assert_eq!(rec.sysname.as_deref(), Some("eth1"));
    }

    #[test]
    fn rejects_datagram_without_devpath() {
        assert!(parse_kernel_uevent(b"not-a-uevent").is_none());
    }

    #[test]
    fn ignores_unrelated_subsystem() {
        let mut buf = b"add@/devices/pci0000:00/usb1".to_vec();
        buf.push(0);
        buf.extend_from_slice(b"ACTION=add\0");
        buf.extend_from_slice(b"SUBSYSTEM=usb\0");

        let rec = parse_kernel_uevent(&buf).unwrap();
        assert_eq!(rec.subsystem, "usb");
        assert!(rec.ifindex.is_none());
    }
}
