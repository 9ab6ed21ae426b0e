use std::{
    io,
    os::fd::{AsRawFd, RawFd},
};

/// Sets `SO_RCVBUF` on `fd`. The kernel doubles whatever value is requested and may still clamp
/// it below `/proc/sys/net/core/rmem_max`; this is best-effort tuning, not a hard guarantee.
pub fn set_recv_buffer_size(fd: RawFd, size: usize) -> io::Result<()> {
    let size: libc::c_int = size.try_into().unwrap_or(libc::c_int::MAX);
    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            (&raw const size).cast(),
            size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<bool> {
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }

    let was_nonblocking = flags & libc::O_NONBLOCK != 0;
    let new_flags = if nonblocking {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };

    if new_flags != flags {
        let ret = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, new_flags) };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(was_nonblocking)
}
