//! Generic-netlink client for the kernel's `devlink` port interface.
//!
//! Resolves the `devlink` family and its `config` multicast group through the standard
//! `nlctrl`/`CTRL_CMD_GETFAMILY` exchange (via [`netlink_packet_generic`]'s ready-made `ctrl`
//! messages), then speaks the family's own, crate-specific wire format directly: a 4-byte
//! `genlmsghdr` (`cmd`, `version`, reserved) followed by a plain netlink attribute stream, decoded
//! by [`attrs::parse_port_message`]. `devlink` has no published `netlink-packet-*` crate of its
//! own, so this module treats its messages as an opaque payload (`Vec<u8>`) rather than building a
//! [`netlink_packet_generic::GenlFamily`] implementation for it.

pub(crate) mod attrs;

use std::{io, os::fd::AsRawFd};

use netlink_packet_core::{
    NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, NetlinkHeader, NetlinkMessage, NetlinkPayload,
};
use netlink_packet_generic::{
    GenlMessage,
    ctrl::{GenlCtrl, GenlCtrlCmd, nlas::GenlCtrlAttrs},
};
use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_GENERIC};

pub(crate) use attrs::{PortEvent, ProjectedPort};

const GENLMSGHDR_LEN: usize = 4;

fn build_genl_message(family_id: u16, flags: u16, cmd: u8, nlas: &[u8]) -> NetlinkMessage<Vec<u8>> {
    let mut body = Vec::with_capacity(GENLMSGHDR_LEN + nlas.len());
    body.push(cmd);
    body.push(1); // version
    body.extend_from_slice(&[0, 0]); // reserved
    body.extend_from_slice(nlas);

    let mut header = NetlinkHeader::default();
    header.message_type = family_id;
    header.flags = flags;
    let mut msg = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(body));
    msg.finalize();
    msg
}

fn send_message(socket: &mut Socket, msg: &NetlinkMessage<Vec<u8>>) -> io::Result<()> {
    let mut buf = vec![0u8; msg.buffer_len()];
    msg.serialize(&mut buf);
    socket.send(&buf, 0)?;
    Ok(())
}

/// Resolves the numeric generic-netlink family ID and `config` multicast group ID for `devlink`.
fn resolve_family(socket: &mut Socket) -> io::Result<(u16, u32)> {
    let genlmsg = GenlMessage::from_payload(GenlCtrl {
        cmd: GenlCtrlCmd::GetFamily,
        nlas: vec![GenlCtrlAttrs::FamilyName(attrs::FAMILY_NAME.to_string())],
    });
    let mut header = NetlinkHeader::default();
    header.flags = NLM_F_REQUEST | NLM_F_ACK;
    let mut msg = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(genlmsg));
    msg.finalize();

    let mut buf = vec![0u8; msg.buffer_len()];
    msg.serialize(&mut buf);
    socket.send(&buf, 0)?;

    let mut recv_buf = vec![0u8; 1 << 16];
    let len = socket.recv(&mut recv_buf, 0)?;
    let reply = NetlinkMessage::<GenlMessage<GenlCtrl>>::deserialize(&recv_buf[..len])
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let NetlinkPayload::InnerMessage(genl) = reply.payload else {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "devlink generic-netlink family not found",
        ));
    };

    let mut family_id = None;
    let mut config_group_id = None;
    for nla in &genl.payload.nlas {
        match nla {
            GenlCtrlAttrs::FamilyId(id) => family_id = Some(*id),
            GenlCtrlAttrs::McastGroups(groups) => {
                for group in groups {
                    if group.name == attrs::MCAST_GROUP_CONFIG {
                        config_group_id = Some(group.id);
                    }
                }
            }
            _ => {}
        }
    }

    let family_id = family_id.ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "devlink family id missing from GETFAMILY reply")
    })?;
    let config_group_id = config_group_id.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "devlink 'config' multicast group missing from GETFAMILY reply",
        )
    })?;

    Ok((family_id, config_group_id))
}

/// A synchronous client for the `devlink` port interface.
///
/// Holds one persistent socket (bound to the `config` multicast group, for `PORT_NEW`/`PORT_DEL`
/// notifications) for the process lifetime; [`DevlinkClient::dump_ports`] opens and closes a
/// second, transient socket per call, per §5.
pub(crate) struct DevlinkClient {
    family_id: u16,
    monitor_socket: Socket,
    recv_buffer_size: usize,
}

impl DevlinkClient {
    /// Resolves the `devlink` family, opens the multicast monitor socket, and switches it to
    /// non-blocking mode.
    ///
    /// `recv_buffer_size` sets `SO_RCVBUF` on the monitor socket and every transient socket this
    /// client opens afterwards (§9.3), and sizes the local receive buffer used to read from them.
    ///
    /// # Errors
    ///
    /// Fails if the `devlink` family is not registered by the running kernel (no smart-NIC driver
    /// loaded) or the `config` group cannot be resolved; per §4.1 this is fatal for this
    /// component.
    pub fn connect(recv_buffer_size: usize) -> io::Result<Self> {
        let mut resolve_socket = Socket::new(NETLINK_GENERIC)?;
        resolve_socket.bind_auto()?;
        let (family_id, config_group_id) = resolve_family(&mut resolve_socket)?;
        drop(resolve_socket);

        let mut monitor_socket = Socket::new(NETLINK_GENERIC)?;
        monitor_socket.bind(&SocketAddr::new(0, 1 << (config_group_id - 1)))?;
        crate::util::set_recv_buffer_size(monitor_socket.as_raw_fd(), recv_buffer_size)?;
        crate::util::set_nonblocking(monitor_socket.as_raw_fd(), true)?;

        Ok(Self { family_id, monitor_socket, recv_buffer_size })
    }

    fn recv_buf(&self) -> Vec<u8> {
        vec![0u8; self.recv_buffer_size.max(1 << 12)]
    }

    /// Performs one `PORT_GET` dump, returning every decoded port in kernel enumeration order.
    ///
    /// A decode failure on any single reply message ends the dump early with an error (§4.1); the
    /// caller treats a partial dump as a failed dump.
    pub fn dump_ports(&self) -> io::Result<Vec<PortEvent>> {
        let mut socket = Socket::new(NETLINK_GENERIC)?;
        socket.bind_auto()?;
        crate::util::set_recv_buffer_size(socket.as_raw_fd(), self.recv_buffer_size)?;
        socket.connect(&SocketAddr::new(0, 0))?;

        let request = build_genl_message(
            self.family_id,
            NLM_F_REQUEST | NLM_F_DUMP,
            attrs::cmd::PORT_GET,
            &[],
        );
        send_message(&mut socket, &request)?;

        let mut out = Vec::new();
        let mut buf = self.recv_buf();
        'recv: loop {
            let len = socket.recv(&mut buf, 0)?;
            let mut offset = 0;
            while offset < len {
                let msg = NetlinkMessage::<Vec<u8>>::deserialize(&buf[offset..len])
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                let msg_len = msg.header.length as usize;

                match &msg.payload {
                    NetlinkPayload::Done(_) => break 'recv,
                    NetlinkPayload::Error(e) => {
                        return Err(io::Error::from_raw_os_error(-e.code.map_or(0, |c| c.get())));
                    }
                    NetlinkPayload::InnerMessage(body) | NetlinkPayload::Overrun(body) => {
                        let event = decode_port_body(body)
                            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                        out.extend(event);
                    }
                    _ => {}
                }

                if msg_len == 0 {
                    break;
                }
                offset += msg_len;
                offset = (offset + 3) & !3;
            }
        }
        Ok(out)
    }

    /// Drains pending `PORT_NEW`/`PORT_DEL` notifications from the monitor socket without
    /// blocking.
    ///
    /// Stops once `batch_limit` messages have been read (`0` means unbounded), per §9.3, or once
    /// the socket reports `EWOULDBLOCK`. `ENOBUFS` (monitor overflow) is logged and treated as
    /// end-of-drain, per §4.1 and §7 — a subsequent dump is the recovery path, not a retry here.
    pub fn poll_events(&self, batch_limit: usize) -> io::Result<Vec<PortEvent>> {
        let mut out = Vec::new();
        let mut buf = self.recv_buf();
        let mut drained = 0usize;
        loop {
            if batch_limit != 0 && drained >= batch_limit {
                return Ok(out);
            }

            let len = match self.monitor_socket.recv(&mut buf, 0) {
                Ok(len) => len,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(out),
                Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                    log::warn!("devlink monitor socket overflowed (ENOBUFS); events were dropped");
                    return Ok(out);
                }
                Err(e) => return Err(e),
            };
            drained += 1;

            let msg = match NetlinkMessage::<Vec<u8>>::deserialize(&buf[..len]) {
                Ok(msg) => msg,
                Err(e) => {
                    log::debug!("ignoring malformed devlink notification: {e}");
                    continue;
                }
            };
            if let NetlinkPayload::InnerMessage(body) = &msg.payload {
                match decode_port_body(body) {
                    Ok(events) => out.extend(events),
                    Err(e) => log::debug!("ignoring malformed devlink port message: {e}"),
                }
            }
        }
    }
}

fn decode_port_body(body: &[u8]) -> Result<Option<PortEvent>, netlink_packet_utils::DecodeError> {
    if body.len() < GENLMSGHDR_LEN {
        return Err(netlink_packet_utils::DecodeError::from("devlink message shorter than genlmsghdr"));
    }
    let cmd = body[0];
    attrs::parse_port_message(cmd, &body[GENLMSGHDR_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genlmsghdr_layout() {
        let msg = build_genl_message(0x1234, NLM_F_REQUEST | NLM_F_DUMP, attrs::cmd::PORT_GET, &[]);
        let NetlinkPayload::InnerMessage(body) = &msg.payload else {
            panic!("expected InnerMessage payload");
        };
        assert_eq!(body[0], attrs::cmd::PORT_GET);
        assert_eq!(body.len(), GENLMSGHDR_LEN);
        assert_eq!(msg.header.message_type, 0x1234);
    }

    #[test]
    fn decode_rejects_short_body() {
        assert!(decode_port_body(&[1, 2]).is_err());
    }

    #[test]
    fn recv_buf_honors_configured_size() {
        let client = DevlinkClient {
            family_id: 0,
            monitor_socket: Socket::new(NETLINK_GENERIC).unwrap(),
            recv_buffer_size: 1 << 20,
        };
        assert_eq!(client.recv_buf().len(), 1 << 20);
    }

    #[test]
    fn recv_buf_has_a_floor_for_tiny_configured_sizes() {
        let client = DevlinkClient {
            family_id: 0,
            monitor_socket: Socket::new(NETLINK_GENERIC).unwrap(),
            recv_buffer_size: 0,
        };
        assert!(client.recv_buf().len() >= 1 << 12);
    }
}
