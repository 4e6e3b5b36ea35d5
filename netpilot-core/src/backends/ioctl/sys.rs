//! Raw socket ioctls for interface and wireless-extension queries.

use std::io;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

pub const SIOCGIFFLAGS: libc::c_ulong = 0x8913;
pub const SIOCSIFFLAGS: libc::c_ulong = 0x8914;
pub const SIOCGIFADDR: libc::c_ulong = 0x8915;
pub const SIOCETHTOOL: libc::c_ulong = 0x8946;
pub const SIOCGMIIPHY: libc::c_ulong = 0x8947;
pub const SIOCGMIIREG: libc::c_ulong = 0x8948;
pub const SIOCGIWRANGE: libc::c_ulong = 0x8B0B;
pub const SIOCGIWSTATS: libc::c_ulong = 0x8B0F;
pub const SIOCGIWAP: libc::c_ulong = 0x8B15;
pub const SIOCGIWESSID: libc::c_ulong = 0x8B1B;

const ETHTOOL_GLINK: u32 = 0x0000_000a;
const MII_BMSR: u16 = 0x01;
const BMSR_LSTATUS: u16 = 0x0004;

const IW_ESSID_MAX_SIZE: usize = 32;
const IW_STATS_SIZE: usize = 32;
const IW_RANGE_SIZE: usize = 2048;
/// Offset of `max_qual.qual` inside `struct iw_range`.
const IW_RANGE_MAX_QUAL_OFFSET: usize = 44;

#[repr(C)]
#[derive(Clone, Copy)]
pub union IfReqData {
    pub flags: libc::c_short,
    pub addr: libc::sockaddr,
    pub data: *mut libc::c_void,
    pub mii: [u16; 4],
    _pad: [u8; 24],
}

/// `struct ifreq`.
#[repr(C)]
pub struct IfReq {
    pub name: [libc::c_char; libc::IFNAMSIZ],
    pub data: IfReqData,
}

/// `struct iw_point`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct IwPoint {
    pub pointer: *mut libc::c_void,
    pub length: u16,
    pub flags: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union IwReqData {
    pub point: IwPoint,
    pub ap_addr: libc::sockaddr,
    _pad: [u8; 16],
}

/// `struct iwreq`.
#[repr(C)]
pub struct IwReq {
    pub name: [libc::c_char; libc::IFNAMSIZ],
    pub data: IwReqData,
}

#[repr(C)]
struct EthtoolValue {
    cmd: u32,
    data: u32,
}

fn encode_name(iface: &str) -> io::Result<[libc::c_char; libc::IFNAMSIZ]> {
    let bytes = iface.as_bytes();
    if bytes.is_empty() || bytes.len() >= libc::IFNAMSIZ || bytes.contains(&0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid interface name '{iface}'"),
        ));
    }
    let mut name = [0 as libc::c_char; libc::IFNAMSIZ];
    for (dst, src) in name.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }
    Ok(name)
}

impl IfReq {
    pub fn new(iface: &str) -> io::Result<Self> {
        Ok(Self {
            name: encode_name(iface)?,
            data: IfReqData { _pad: [0; 24] },
        })
    }
}

impl IwReq {
    pub fn new(iface: &str) -> io::Result<Self> {
        Ok(Self {
            name: encode_name(iface)?,
            data: IwReqData { _pad: [0; 16] },
        })
    }

    fn with_buffer(iface: &str, buf: &mut [u8]) -> io::Result<Self> {
        let mut req = Self::new(iface)?;
        req.data.point = IwPoint {
            pointer: buf.as_mut_ptr().cast(),
            length: u16::try_from(buf.len()).unwrap_or(u16::MAX),
            flags: 0,
        };
        Ok(req)
    }
}

/// Datagram socket used only as an ioctl handle.
#[derive(Debug)]
pub struct IoctlSocket(OwnedFd);

impl IoctlSocket {
    pub fn open() -> io::Result<Self> {
        // SAFETY: plain socket(2) call; the result is checked before use.
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `fd` is a freshly opened descriptor owned by nobody else.
        Ok(Self(unsafe { OwnedFd::from_raw_fd(fd) }))
    }

    fn ioctl<T>(&self, request: libc::c_ulong, arg: &mut T) -> io::Result<()> {
        // SAFETY: every caller passes the request's matching #[repr(C)]
        // struct, and any buffer it points to outlives the call.
        let rc = unsafe { libc::ioctl(self.0.as_raw_fd(), request as _, arg as *mut T) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    pub fn flags(&self, iface: &str) -> io::Result<libc::c_short> {
        let mut req = IfReq::new(iface)?;
        self.ioctl(SIOCGIFFLAGS, &mut req)?;
        // SAFETY: SIOCGIFFLAGS fills the flags member.
        Ok(unsafe { req.data.flags })
    }

    pub fn set_flags(&self, iface: &str, flags: libc::c_short) -> io::Result<()> {
        let mut req = IfReq::new(iface)?;
        req.data.flags = flags;
        self.ioctl(SIOCSIFFLAGS, &mut req)
    }

    pub fn is_up(&self, iface: &str) -> io::Result<bool> {
        Ok(self.flags(iface)? & libc::IFF_UP as libc::c_short != 0)
    }

    /// Sets or clears `IFF_UP`; a no-op when already in the wanted state.
    pub fn set_up(&self, iface: &str, up: bool) -> io::Result<()> {
        let flags = self.flags(iface)?;
        let wanted = if up {
            flags | libc::IFF_UP as libc::c_short
        } else {
            flags & !(libc::IFF_UP as libc::c_short)
        };
        if wanted == flags {
            return Ok(());
        }
        self.set_flags(iface, wanted)
    }

    pub fn ipv4(&self, iface: &str) -> io::Result<Ipv4Addr> {
        let mut req = IfReq::new(iface)?;
        self.ioctl(SIOCGIFADDR, &mut req)?;
        // SAFETY: SIOCGIFADDR fills `addr` with an AF_INET sockaddr_in,
        // which has the same size as sockaddr.
        let sin: libc::sockaddr_in = unsafe { std::mem::transmute(req.data.addr) };
        Ok(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)))
    }

    pub fn ethtool_link(&self, iface: &str) -> io::Result<bool> {
        let mut value = EthtoolValue {
            cmd: ETHTOOL_GLINK,
            data: 0,
        };
        let mut req = IfReq::new(iface)?;
        req.data.data = (&mut value as *mut EthtoolValue).cast();
        self.ioctl(SIOCETHTOOL, &mut req)?;
        Ok(value.data != 0)
    }

    pub fn mii_link(&self, iface: &str) -> io::Result<bool> {
        let mut req = IfReq::new(iface)?;
        self.ioctl(SIOCGMIIPHY, &mut req)?;
        // SAFETY: SIOCGMIIPHY fills mii[0] with the PHY id.
        let mut mii = unsafe { req.data.mii };
        mii[1] = MII_BMSR;
        req.data.mii = mii;
        self.ioctl(SIOCGMIIREG, &mut req)?;
        // SAFETY: SIOCGMIIREG returns the register value in mii[3].
        let bmsr = unsafe { req.data.mii[3] };
        Ok(bmsr & BMSR_LSTATUS != 0)
    }

    /// Raw `(quality, level)` bytes of the current link statistics.
    pub fn iw_stats(&self, iface: &str) -> io::Result<(u8, u8)> {
        let mut buf = [0u8; IW_STATS_SIZE];
        let mut req = IwReq::with_buffer(iface, &mut buf)?;
        self.ioctl(SIOCGIWSTATS, &mut req)?;
        Ok((buf[2], buf[3]))
    }

    pub fn iw_max_quality(&self, iface: &str) -> io::Result<u8> {
        let mut buf = vec![0u8; IW_RANGE_SIZE];
        let mut req = IwReq::with_buffer(iface, &mut buf)?;
        self.ioctl(SIOCGIWRANGE, &mut req)?;
        Ok(buf[IW_RANGE_MAX_QUAL_OFFSET])
    }

    pub fn iw_essid(&self, iface: &str) -> io::Result<String> {
        let mut buf = [0u8; IW_ESSID_MAX_SIZE + 1];
        let mut req = IwReq::with_buffer(iface, &mut buf)?;
        self.ioctl(SIOCGIWESSID, &mut req)?;
        let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }

    pub fn iw_ap(&self, iface: &str) -> io::Result<[u8; 6]> {
        let mut req = IwReq::new(iface)?;
        self.ioctl(SIOCGIWAP, &mut req)?;
        // SAFETY: SIOCGIWAP fills `ap_addr`.
        let addr = unsafe { req.data.ap_addr };
        let mut mac = [0u8; 6];
        for (dst, src) in mac.iter_mut().zip(addr.sa_data.iter()) {
            *dst = *src as u8;
        }
        Ok(mac)
    }
}

/// Percentage from raw quality bytes; the raw value when no max is known.
pub fn quality_percent(quality: u8, max: u8) -> i32 {
    if max == 0 {
        i32::from(quality)
    } else {
        100 * i32::from(quality) / i32::from(max)
    }
}

/// dBm from the unsigned level byte.
pub fn level_to_dbm(level: u8) -> i32 {
    i32::from(level) - 256
}

pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}
