use std::io;
use std::mem::size_of;
use std::os::fd::RawFd;
use std::time::Duration;

use crate::endpoint::Endpoint;
use crate::error::Error;

/// Address family of a [`BaseSocket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

/// Socket type of a [`BaseSocket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Stream,
    Datagram,
    Raw,
}

/// Non-owning handle over an OS socket descriptor with its configured
/// parameters. The wrapper never closes the descriptor on drop — two
/// wrappers may reference the same descriptor; call [`BaseSocket::close`]
/// explicitly.
#[derive(Debug, Clone, Copy)]
pub struct BaseSocket {
    fd: RawFd,
    family: Family,
    kind: Kind,
    blocking: bool,
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn endpoint_to_sockaddr(endpoint: Endpoint) -> io::Result<(libc::sockaddr_storage, libc::socklen_t)> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = match endpoint {
        Endpoint::V4(addr) => {
            let sin = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: addr.port().to_be(),
                sin_addr: libc::in_addr { s_addr: u32::from_ne_bytes(addr.ip().octets()) },
                sin_zero: [0; 8],
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in, sin);
            }
            size_of::<libc::sockaddr_in>() as libc::socklen_t
        }
        Endpoint::V6(addr) => {
            let sin6 = libc::sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: addr.port().to_be(),
                sin6_flowinfo: addr.flowinfo(),
                sin6_addr: libc::in6_addr { s6_addr: addr.ip().octets() },
                sin6_scope_id: addr.scope_id(),
            };
            unsafe {
                std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in6, sin6);
            }
            size_of::<libc::sockaddr_in6>() as libc::socklen_t
        }
        Endpoint::Invalid => {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid endpoint"));
        }
    };
    Ok((storage, len))
}

fn sockaddr_to_endpoint(storage: &libc::sockaddr_storage) -> Endpoint {
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            let sin = unsafe { &*(storage as *const _ as *const libc::sockaddr_in) };
            let ip = std::net::Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes());
            Endpoint::V4(std::net::SocketAddrV4::new(ip, u16::from_be(sin.sin_port)))
        }
        libc::AF_INET6 => {
            let sin6 = unsafe { &*(storage as *const _ as *const libc::sockaddr_in6) };
            let ip = std::net::Ipv6Addr::from(sin6.sin6_addr.s6_addr);
            Endpoint::V6(std::net::SocketAddrV6::new(
                ip,
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            ))
        }
        _ => Endpoint::Invalid,
    }
}

impl BaseSocket {
    /// Wrap an already-open descriptor (e.g. one returned by `accept`).
    pub fn from_raw(fd: RawFd, family: Family, kind: Kind, blocking: bool) -> Self {
        Self { fd, family, kind, blocking }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn blocking(&self) -> bool {
        self.blocking
    }

    fn raw_family(family: Family) -> libc::c_int {
        match family {
            Family::V4 => libc::AF_INET,
            Family::V6 => libc::AF_INET6,
        }
    }

    fn raw_kind(kind: Kind) -> libc::c_int {
        match kind {
            Kind::Stream => libc::SOCK_STREAM,
            Kind::Datagram => libc::SOCK_DGRAM,
            Kind::Raw => libc::SOCK_RAW,
        }
    }

    fn new_raw(family: Family, kind: Kind, protocol: libc::c_int) -> io::Result<Self> {
        let fd = unsafe {
            cvt(libc::socket(Self::raw_family(family), Self::raw_kind(kind), protocol))?
        };
        Ok(Self { fd, family, kind, blocking: true })
    }

    /// Create a non-blocking-capable listening stream socket bound to
    /// `endpoint`, backlog `backlog`.
    pub fn bind_listen(endpoint: Endpoint, backlog: i32, blocking: bool) -> Result<Self, Error> {
        let family = match endpoint {
            Endpoint::V4(_) => Family::V4,
            Endpoint::V6(_) => Family::V6,
            Endpoint::Invalid => return Err(Error::InvalidEndpoint),
        };
        let mut sock = Self::new_raw(family, Kind::Stream, 0).map_err(Error::System)?;
        sock.set_reuseaddr(true).map_err(Error::System)?;
        let (storage, len) = endpoint_to_sockaddr(endpoint).map_err(Error::System)?;
        unsafe {
            cvt(libc::bind(sock.fd, &storage as *const _ as *const libc::sockaddr, len))
                .map_err(Error::System)?;
            cvt(libc::listen(sock.fd, backlog)).map_err(Error::System)?;
        }
        sock.set_blocking(blocking).map_err(Error::System)?;
        Ok(sock)
    }

    /// Connect a new stream socket to `endpoint`.
    pub fn connect_stream(endpoint: Endpoint, blocking: bool) -> Result<Self, Error> {
        let family = match endpoint {
            Endpoint::V4(_) => Family::V4,
            Endpoint::V6(_) => Family::V6,
            Endpoint::Invalid => return Err(Error::InvalidEndpoint),
        };
        let mut sock = Self::new_raw(family, Kind::Stream, 0).map_err(Error::System)?;
        sock.set_blocking(blocking).map_err(Error::System)?;
        let (storage, len) = endpoint_to_sockaddr(endpoint).map_err(Error::System)?;
        let ret = unsafe { libc::connect(sock.fd, &storage as *const _ as *const libc::sockaddr, len) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if !blocking && err.kind() == io::ErrorKind::WouldBlock {
                return Ok(sock);
            }
            return Err(Error::from_connect_io(err));
        }
        Ok(sock)
    }

    /// Create a datagram (UDP) socket.
    pub fn datagram(family: Family, blocking: bool) -> Result<Self, Error> {
        let mut sock = Self::new_raw(family, Kind::Datagram, 0).map_err(Error::System)?;
        sock.set_blocking(blocking).map_err(Error::System)?;
        Ok(sock)
    }

    /// Create a raw ICMP socket (requires privilege on most platforms).
    pub fn raw_icmp(family: Family, blocking: bool) -> Result<Self, Error> {
        let proto = match family {
            Family::V4 => libc::IPPROTO_ICMP,
            Family::V6 => libc::IPPROTO_ICMPV6,
        };
        let mut sock = Self::new_raw(family, Kind::Raw, proto).map_err(Error::System)?;
        sock.set_blocking(blocking).map_err(Error::System)?;
        Ok(sock)
    }

    /// Accept a new connection. With a non-blocking listener, returns
    /// `Error::WouldBlock` rather than failing, instead of blocking.
    pub fn accept(&self) -> Result<(Self, Endpoint), Error> {
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let mut len = size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let fd = unsafe {
            libc::accept(self.fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len)
        };
        if fd < 0 {
            return Err(Error::from_connect_io(io::Error::last_os_error()));
        }
        let peer = sockaddr_to_endpoint(&storage);
        let family = match peer {
            Endpoint::V6(_) => Family::V6,
            _ => Family::V4,
        };
        Ok((Self::from_raw(fd, family, Kind::Stream, self.blocking), peer))
    }

    /// Toggle the `O_NONBLOCK` flag.
    pub fn set_blocking(&mut self, blocking: bool) -> io::Result<()> {
        unsafe {
            let flags = cvt(libc::fcntl(self.fd, libc::F_GETFL))?;
            let new_flags = if blocking { flags & !libc::O_NONBLOCK } else { flags | libc::O_NONBLOCK };
            cvt(libc::fcntl(self.fd, libc::F_SETFL, new_flags))?;
        }
        self.blocking = blocking;
        Ok(())
    }

    fn setsockopt_bool(&self, level: libc::c_int, name: libc::c_int, on: bool) -> io::Result<()> {
        let value: libc::c_int = i32::from(on);
        unsafe {
            cvt(libc::setsockopt(
                self.fd,
                level,
                name,
                &value as *const _ as *const libc::c_void,
                size_of::<libc::c_int>() as libc::socklen_t,
            ))?;
        }
        Ok(())
    }

    pub fn set_nodelay(&self, on: bool) -> io::Result<()> {
        self.setsockopt_bool(libc::IPPROTO_TCP, libc::TCP_NODELAY, on)
    }

    pub fn set_keepalive(&self, on: bool) -> io::Result<()> {
        self.setsockopt_bool(libc::SOL_SOCKET, libc::SO_KEEPALIVE, on)
    }

    pub fn set_reuseaddr(&self, on: bool) -> io::Result<()> {
        self.setsockopt_bool(libc::SOL_SOCKET, libc::SO_REUSEADDR, on)
    }

    pub fn set_reuseport(&self, on: bool) -> io::Result<()> {
        self.setsockopt_bool(libc::SOL_SOCKET, libc::SO_REUSEPORT, on)
    }

    pub fn set_ttl(&self, ttl: u32) -> io::Result<()> {
        let value = ttl as libc::c_int;
        unsafe {
            cvt(libc::setsockopt(
                self.fd,
                libc::IPPROTO_IP,
                libc::IP_TTL,
                &value as *const _ as *const libc::c_void,
                size_of::<libc::c_int>() as libc::socklen_t,
            ))?;
        }
        Ok(())
    }

    pub fn set_send_buffer_size(&self, size: usize) -> io::Result<()> {
        let value = size as libc::c_int;
        unsafe {
            cvt(libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_SNDBUF,
                &value as *const _ as *const libc::c_void,
                size_of::<libc::c_int>() as libc::socklen_t,
            ))?;
        }
        Ok(())
    }

    pub fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        let value = size as libc::c_int;
        unsafe {
            cvt(libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &value as *const _ as *const libc::c_void,
                size_of::<libc::c_int>() as libc::socklen_t,
            ))?;
        }
        Ok(())
    }

    fn set_timeout(&self, name: libc::c_int, timeout: Duration) -> io::Result<()> {
        let tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: libc::suseconds_t::from(timeout.subsec_micros()),
        };
        unsafe {
            cvt(libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                name,
                &tv as *const _ as *const libc::c_void,
                size_of::<libc::timeval>() as libc::socklen_t,
            ))?;
        }
        Ok(())
    }

    pub fn set_send_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(libc::SO_SNDTIMEO, timeout)
    }

    pub fn set_recv_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(libc::SO_RCVTIMEO, timeout)
    }

    /// Connect result, for a socket freshly returned by non-blocking
    /// `connect_stream` once the descriptor becomes writable.
    pub fn take_connect_error(&self) -> Result<(), Error> {
        let mut err_val: libc::c_int = 0;
        let mut len = size_of::<libc::c_int>() as libc::socklen_t;
        unsafe {
            cvt(libc::getsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut err_val as *mut _ as *mut libc::c_void,
                &mut len,
            ))
            .map_err(Error::System)?;
        }
        if err_val == 0 {
            Ok(())
        } else {
            Err(Error::from_connect_io(io::Error::from_raw_os_error(err_val)))
        }
    }

    /// Close the descriptor explicitly. Safe to call more than once.
    pub fn close(&mut self) -> io::Result<()> {
        if self.fd >= 0 {
            unsafe {
                cvt(libc::close(self.fd))?;
            }
            self.fd = -1;
        }
        Ok(())
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe { libc::write(self.fd, buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    pub fn send_to(&self, endpoint: Endpoint, buf: &[u8]) -> io::Result<usize> {
        let (storage, len) = endpoint_to_sockaddr(endpoint)?;
        let n = unsafe {
            libc::sendto(
                self.fd,
                buf.as_ptr().cast(),
                buf.len(),
                0,
                &storage as *const _ as *const libc::sockaddr,
                len,
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Endpoint)> {
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let mut len = size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let n = unsafe {
            libc::recvfrom(
                self.fd,
                buf.as_mut_ptr().cast(),
                buf.len(),
                0,
                &mut storage as *mut _ as *mut libc::sockaddr,
                &mut len,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((n as usize, sockaddr_to_endpoint(&storage)))
    }

    // -- Typed helpers. These presume blocking mode and loop internally
    // until the full payload is transferred or an error is raised. --

    fn write_all_loop(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn read_exact_loop(&self, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn send_u32_be(&self, value: u32) -> io::Result<()> {
        self.write_all_loop(&value.to_be_bytes())
    }

    pub fn recv_u32_be(&self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact_loop(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn send_u64_be(&self, value: u64) -> io::Result<()> {
        self.write_all_loop(&value.to_be_bytes())
    }

    pub fn recv_u64_be(&self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact_loop(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Send `data` as a 4-byte big-endian length prefix followed by the
    /// bytes themselves.
    pub fn send_length_prefixed(&self, data: &[u8]) -> io::Result<()> {
        self.send_u32_be(data.len() as u32)?;
        self.write_all_loop(data)
    }

    /// Receive a length-prefixed payload written by [`Self::send_length_prefixed`].
    pub fn recv_length_prefixed(&self) -> io::Result<Vec<u8>> {
        let len = self.recv_u32_be()? as usize;
        let mut buf = vec![0u8; len];
        self.read_exact_loop(&mut buf)?;
        Ok(buf)
    }

    /// Send `line` followed by `\n`.
    pub fn send_line(&self, line: &str) -> io::Result<()> {
        self.write_all_loop(line.as_bytes())?;
        self.write_all_loop(b"\n")
    }

    /// Receive octets up to (and excluding) the next `\n`.
    pub fn recv_line(&self) -> io::Result<String> {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            self.read_exact_loop(&mut byte)?;
            if byte[0] == b'\n' {
                break;
            }
            out.push(byte[0]);
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Compute the Internet checksum (RFC 1071) over `data`, as used by
    /// ICMP and IPv4 headers.
    pub fn ip_checksum(data: &[u8]) -> u16 {
        let mut sum: u32 = 0;
        let mut chunks = data.chunks_exact(2);
        for chunk in &mut chunks {
            sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
        }
        if let [last] = chunks.remainder() {
            sum += u32::from(*last) << 8;
        }
        while sum >> 16 != 0 {
            sum = (sum & 0xffff) + (sum >> 16);
        }
        !(sum as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    #[test]
    fn checksum_of_all_zero_is_all_ones() {
        let data = [0u8; 4];
        assert_eq!(BaseSocket::ip_checksum(&data), 0xffff);
    }

    #[test]
    fn tcp_listen_accept_connect_roundtrip() {
        let ep = Endpoint::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));
        let listener = BaseSocket::bind_listen(ep, 16, true).unwrap();

        // Discover the ephemeral port the kernel picked.
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let mut len = size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        unsafe {
            libc::getsockname(listener.fd(), &mut storage as *mut _ as *mut libc::sockaddr, &mut len);
        }
        let bound = sockaddr_to_endpoint(&storage);

        let client_thread = std::thread::spawn(move || {
            let client = BaseSocket::connect_stream(bound, true).unwrap();
            client.send_u32_be(42).unwrap();
        });

        let (server_side, _peer) = listener.accept().unwrap();
        assert_eq!(server_side.recv_u32_be().unwrap(), 42);
        client_thread.join().unwrap();
    }
}
