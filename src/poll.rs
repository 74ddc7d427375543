//! A tiny wrapper around libc's `poll(2)`, used to wait on a handle's
//! [`PollDescriptor`](crate::backend::PollDescriptor) for readiness
//! instead of spinning.

use crate::error::from_code;
use crate::Result;
use libc::pollfd;
use std::io;

bitflags::bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct PollFlags: libc::c_short {
        const POLLIN   = libc::POLLIN as libc::c_short;
        const POLLPRI  = libc::POLLPRI as libc::c_short;
        const POLLOUT  = libc::POLLOUT as libc::c_short;
        const POLLERR  = libc::POLLERR as libc::c_short;
        const POLLHUP  = libc::POLLHUP as libc::c_short;
        const POLLNVAL = libc::POLLNVAL as libc::c_short;
    }
}

/// Block until one of `fds` is ready or `timeout_ms` elapses (`-1` waits
/// forever, `0` polls without blocking). Returns the number of descriptors
/// with non-zero `revents`.
pub fn poll(fds: &mut [pollfd], timeout_ms: i32) -> Result<usize> {
    let r = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if r >= 0 {
        Ok(r as usize)
    } else {
        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO);
        Err(from_code(-errno))
    }
}

/// Wait on a single handle's poll descriptor for the events it declared
/// interest in. Returns the `revents` actually observed.
pub fn wait_one(desc: crate::backend::PollDescriptor, timeout_ms: i32) -> Result<PollFlags> {
    let mut fds = [pollfd { fd: desc.fd, events: desc.events.bits(), revents: 0 }];
    poll(&mut fds, timeout_ms)?;
    Ok(PollFlags::from_bits_truncate(fds[0].revents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_on_a_pipe_with_zero_timeout_reports_not_ready() {
        let mut fds_raw = [0i32; 2];
        unsafe { libc::pipe(fds_raw.as_mut_ptr()) };
        let mut fds = [pollfd { fd: fds_raw[0], events: libc::POLLIN, revents: 0 }];
        let n = poll(&mut fds, 0).unwrap();
        assert_eq!(n, 0);
        unsafe {
            libc::close(fds_raw[0]);
            libc::close(fds_raw[1]);
        }
    }

    #[test]
    fn poll_reports_ready_once_data_is_written() {
        let mut fds_raw = [0i32; 2];
        unsafe { libc::pipe(fds_raw.as_mut_ptr()) };
        unsafe { libc::write(fds_raw[1], b"x".as_ptr() as *const libc::c_void, 1) };
        let mut fds = [pollfd { fd: fds_raw[0], events: libc::POLLIN, revents: 0 }];
        let n = poll(&mut fds, 0).unwrap();
        assert_eq!(n, 1);
        assert_eq!(PollFlags::from_bits_truncate(fds[0].revents), PollFlags::POLLIN);
        unsafe {
            libc::close(fds_raw[0]);
            libc::close(fds_raw[1]);
        }
    }
}
