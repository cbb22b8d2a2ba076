//! Data types exchanged with the RIB manager.
//!
//! These are the collaborator-facing types: route source identifiers,
//! prefixes, and the descriptors that interface and address notifications
//! decode into. The wire representations live in [`crate::zserv::message`].

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Number of route source types the manager tracks. The redistribution
/// bitmap is sized to this.
pub const ROUTE_TYPE_MAX: usize = 10;

/// Route source types understood by the RIB manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RouteType {
    System = 0,
    Kernel = 1,
    Connect = 2,
    Static = 3,
    Rip = 4,
    Ripng = 5,
    Ospf = 6,
    Ospf6 = 7,
    Isis = 8,
    Bgp = 9,
}

impl RouteType {
    /// All route types in ascending wire order.
    pub const ALL: [RouteType; ROUTE_TYPE_MAX] = [
        RouteType::System,
        RouteType::Kernel,
        RouteType::Connect,
        RouteType::Static,
        RouteType::Rip,
        RouteType::Ripng,
        RouteType::Ospf,
        RouteType::Ospf6,
        RouteType::Isis,
        RouteType::Bgp,
    ];

    /// Decode a wire byte into a route type.
    pub fn from_wire(value: u8) -> Option<Self> {
        RouteType::ALL.get(value as usize).copied()
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouteType::System => "system",
            RouteType::Kernel => "kernel",
            RouteType::Connect => "connected",
            RouteType::Static => "static",
            RouteType::Rip => "rip",
            RouteType::Ripng => "ripng",
            RouteType::Ospf => "ospf",
            RouteType::Ospf6 => "ospf6",
            RouteType::Isis => "isis",
            RouteType::Bgp => "bgp",
        };
        f.write_str(name)
    }
}

/// Sub-address-family identifier qualifying a route's address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Safi {
    Unicast = 1,
    Multicast = 2,
}

impl Safi {
    /// Decode a wire value into a SAFI.
    pub fn from_wire(value: u16) -> Option<Self> {
        match value {
            1 => Some(Safi::Unicast),
            2 => Some(Safi::Multicast),
            _ => None,
        }
    }
}

/// An IPv4 destination prefix.
///
/// `len` is the prefix length in bits; callers keep it within 0..=32.
/// Decoded prefixes are always within range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Prefix {
    pub addr: Ipv4Addr,
    pub len: u8,
}

impl Ipv4Prefix {
    pub const fn new(addr: Ipv4Addr, len: u8) -> Self {
        Self { addr, len }
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

/// An IPv6 destination prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv6Prefix {
    pub addr: Ipv6Addr,
    pub len: u8,
}

impl Ipv6Prefix {
    pub const fn new(addr: Ipv6Addr, len: u8) -> Self {
        Self { addr, len }
    }
}

impl fmt::Display for Ipv6Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

/// A prefix of either address family, as carried by router-id updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prefix {
    V4(Ipv4Prefix),
    V6(Ipv6Prefix),
}

impl Prefix {
    pub fn addr(&self) -> IpAddr {
        match self {
            Prefix::V4(p) => IpAddr::V4(p.addr),
            Prefix::V6(p) => IpAddr::V6(p.addr),
        }
    }

    pub fn len(&self) -> u8 {
        match self {
            Prefix::V4(p) => p.len,
            Prefix::V6(p) => p.len,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::V4(p) => p.fmt(f),
            Prefix::V6(p) => p.fmt(f),
        }
    }
}

impl From<Ipv4Prefix> for Prefix {
    fn from(p: Ipv4Prefix) -> Self {
        Prefix::V4(p)
    }
}

impl From<Ipv6Prefix> for Prefix {
    fn from(p: Ipv6Prefix) -> Self {
        Prefix::V6(p)
    }
}

/// Interface flag bit reported by the manager: administratively up.
pub const IFF_UP: u64 = 0x01;
/// Interface flag bit reported by the manager: operationally running.
pub const IFF_RUNNING: u64 = 0x40;

/// Descriptor carried by interface add/delete/up/down notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub ifindex: u32,
    pub status: u8,
    pub flags: u64,
    pub metric: u32,
    pub mtu: u32,
    pub bandwidth: u32,
    pub hw_addr: Vec<u8>,
}

impl InterfaceInfo {
    pub fn is_up(&self) -> bool {
        self.flags & IFF_UP != 0
    }

    pub fn is_running(&self) -> bool {
        self.flags & IFF_RUNNING != 0
    }
}

/// Descriptor carried by interface address add/delete notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedAddress {
    pub ifindex: u32,
    pub flags: u8,
    /// The address configured on the interface.
    pub prefix: Prefix,
    /// Peer address on point-to-point links, otherwise the broadcast or
    /// unspecified address as reported by the manager.
    pub destination: IpAddr,
}
