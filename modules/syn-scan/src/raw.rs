//! `SOCK_RAW` sender with `IP_HDRINCL`, so the kernel sends our IPv4 header as is.
//!
//! Needs `CAP_NET_RAW`. The descriptor is closed on drop, on every path.

use crate::SynError;
use std::io;
use std::net::Ipv4Addr;

pub struct RawSocket {
    fd: libc::c_int,
}

#[cfg(target_os = "linux")]
impl RawSocket {
    pub fn open() -> Result<Self, SynError> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_RAW, libc::IPPROTO_TCP) };
        if fd < 0 {
            return Err(SynError::RawSocket(io::Error::last_os_error()));
        }
        let sock = RawSocket { fd };

        let on: libc::c_int = 1;
        let ret = unsafe {
            libc::setsockopt(
                sock.fd,
                libc::IPPROTO_IP,
                libc::IP_HDRINCL,
                &on as *const libc::c_int as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(SynError::RawSocket(io::Error::last_os_error()));
        }
        Ok(sock)
    }

    pub fn send_to(&self, packet: &[u8], dst: Ipv4Addr) -> Result<usize, SynError> {
        // s_addr is network order in memory, which is what the octets already are.
        let addr = libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: 0,
            sin_addr: libc::in_addr { s_addr: u32::from_ne_bytes(dst.octets()) },
            sin_zero: [0; 8],
        };
        let ret = unsafe {
            libc::sendto(
                self.fd,
                packet.as_ptr() as *const libc::c_void,
                packet.len(),
                0,
                &addr as *const libc::sockaddr_in as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(SynError::Send(io::Error::last_os_error()));
        }
        Ok(ret as usize)
    }
}

#[cfg(not(target_os = "linux"))]
impl RawSocket {
    pub fn open() -> Result<Self, SynError> {
        Err(SynError::RawSocket(io::Error::new(
            io::ErrorKind::Unsupported,
            "raw SYN sending is only implemented for Linux",
        )))
    }

    pub fn send_to(&self, _packet: &[u8], _dst: Ipv4Addr) -> Result<usize, SynError> {
        Err(SynError::Send(io::Error::from(io::ErrorKind::Unsupported)))
    }
}

impl Drop for RawSocket {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe { libc::close(self.fd) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_an_unopened_socket_is_a_no_op() {
        drop(RawSocket { fd: -1 });
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[ignore = "needs CAP_NET_RAW"]
    fn opens_with_privileges() {
        let sock = RawSocket::open().unwrap();
        assert!(sock.fd >= 0);
    }
}
