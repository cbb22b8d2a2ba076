//! zserv message framing and payload codecs.
//!
//! Every message starts with a fixed 6-byte header: a 2-byte total length
//! (header included, network byte order), the 0xFF marker byte, the
//! protocol version, and a 2-byte command code. Payload codecs are pure
//! transforms over [`Buf`]/[`BufMut`]; all multi-byte integers are
//! network byte order and all sequences carry an explicit count.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FramingError;
use crate::types::{
    ConnectedAddress, InterfaceInfo, Ipv4Prefix, Ipv6Prefix, Prefix, RouteType, Safi,
};

/// Size of the fixed message header.
pub const HEADER_SIZE: usize = 6;
/// Marker byte identifying v2+ framing.
pub const MARKER: u8 = 0xFF;
/// Protocol version this client speaks.
pub const VERSION: u8 = 2;
/// Maximum total message size (header + payload).
pub const MAX_PACKET_SIZE: usize = 4096;

/// Fixed width of the interface name field, NUL-padded.
pub const INTERFACE_NAME_SIZE: usize = 20;
/// Upper bound on the hardware address length field.
pub const INTERFACE_HWADDR_MAX: usize = 20;

/// Wire byte for an IPv4 address family.
pub const FAMILY_IPV4: u8 = 2;
/// Wire byte for an IPv6 address family.
pub const FAMILY_IPV6: u8 = 10;

/// Route payload `message` bit: nexthop list present.
pub const MESSAGE_NEXTHOP: u8 = 0x01;
/// Route payload `message` bit: ifindex list present.
pub const MESSAGE_IFINDEX: u8 = 0x02;
/// Route payload `message` bit: administrative distance present.
pub const MESSAGE_DISTANCE: u8 = 0x04;
/// Route payload `message` bit: metric present.
pub const MESSAGE_METRIC: u8 = 0x08;

/// zserv command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    InterfaceAdd = 1,
    InterfaceDelete = 2,
    InterfaceAddressAdd = 3,
    InterfaceAddressDelete = 4,
    InterfaceUp = 5,
    InterfaceDown = 6,
    Ipv4RouteAdd = 7,
    Ipv4RouteDelete = 8,
    Ipv6RouteAdd = 9,
    Ipv6RouteDelete = 10,
    RedistributeAdd = 11,
    RedistributeDelete = 12,
    RedistributeDefaultAdd = 13,
    RedistributeDefaultDelete = 14,
    RouterIdAdd = 15,
    RouterIdDelete = 16,
    RouterIdUpdate = 17,
}

impl TryFrom<u16> for Command {
    type Error = io::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let command = match value {
            1 => Command::InterfaceAdd,
            2 => Command::InterfaceDelete,
            3 => Command::InterfaceAddressAdd,
            4 => Command::InterfaceAddressDelete,
            5 => Command::InterfaceUp,
            6 => Command::InterfaceDown,
            7 => Command::Ipv4RouteAdd,
            8 => Command::Ipv4RouteDelete,
            9 => Command::Ipv6RouteAdd,
            10 => Command::Ipv6RouteDelete,
            11 => Command::RedistributeAdd,
            12 => Command::RedistributeDelete,
            13 => Command::RedistributeDefaultAdd,
            14 => Command::RedistributeDefaultDelete,
            15 => Command::RouterIdAdd,
            16 => Command::RouterIdDelete,
            17 => Command::RouterIdUpdate,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown zserv command: {}", value),
                ))
            }
        };
        Ok(command)
    }
}

/// Decoded message header.
///
/// The command is kept as a raw `u16`: an unknown command is not a
/// framing error, the dispatcher skips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total message length, header included.
    pub length: u16,
    pub command: u16,
}

impl Header {
    /// Decode and validate a header from the first [`HEADER_SIZE`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, FramingError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FramingError::Truncated("header"));
        }

        let length = u16::from_be_bytes([bytes[0], bytes[1]]);
        let marker = bytes[2];
        let version = bytes[3];
        let command = u16::from_be_bytes([bytes[4], bytes[5]]);

        if marker != MARKER {
            return Err(FramingError::BadMarker(marker));
        }
        if version != VERSION {
            return Err(FramingError::BadVersion(version));
        }
        if (length as usize) < HEADER_SIZE || length as usize > MAX_PACKET_SIZE {
            return Err(FramingError::BadLength(length));
        }

        Ok(Header { length, command })
    }

    /// Encode a header for `command` over a payload of `payload_len` bytes.
    pub fn encode(command: Command, payload_len: usize, buf: &mut BytesMut) {
        debug_assert!(payload_len <= MAX_PACKET_SIZE - HEADER_SIZE);
        buf.put_u16((HEADER_SIZE + payload_len) as u16);
        buf.put_u8(MARKER);
        buf.put_u8(VERSION);
        buf.put_u16(command as u16);
    }
}

/// Frame a payload into a complete message.
pub fn encode_message(command: Command, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
    Header::encode(command, body.len(), &mut buf);
    buf.put_slice(body);
    buf.freeze()
}

/// Frame a header-only message.
pub fn encode_command(command: Command) -> Bytes {
    encode_message(command, &[])
}

/// Frame a redistribute add/delete request for one route type.
pub fn encode_redistribute(command: Command, route_type: RouteType) -> Bytes {
    encode_message(command, &[route_type as u8])
}

/// An IPv4 route update: the fields accompanying a route add/delete.
///
/// Optional groups are `None` when their presence bit is clear on the
/// wire. The `message` bitmask itself is derived, see
/// [`Ipv4Route::message_bits`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Route {
    pub route_type: RouteType,
    pub flags: u8,
    pub safi: Safi,
    pub nexthops: Option<Vec<Ipv4Addr>>,
    pub ifindexes: Option<Vec<u32>>,
    pub distance: Option<u8>,
    pub metric: Option<u32>,
}

impl Ipv4Route {
    /// The `message` bitmask this route encodes with.
    pub fn message_bits(&self) -> u8 {
        let mut bits = 0;
        if self.nexthops.is_some() {
            bits |= MESSAGE_NEXTHOP;
        }
        if self.ifindexes.is_some() {
            bits |= MESSAGE_IFINDEX;
        }
        if self.distance.is_some() {
            bits |= MESSAGE_DISTANCE;
        }
        if self.metric.is_some() {
            bits |= MESSAGE_METRIC;
        }
        bits
    }
}

/// An IPv6 route update. Differs from [`Ipv4Route`] only in address width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Route {
    pub route_type: RouteType,
    pub flags: u8,
    pub safi: Safi,
    pub nexthops: Option<Vec<Ipv6Addr>>,
    pub ifindexes: Option<Vec<u32>>,
    pub distance: Option<u8>,
    pub metric: Option<u32>,
}

impl Ipv6Route {
    pub fn message_bits(&self) -> u8 {
        let mut bits = 0;
        if self.nexthops.is_some() {
            bits |= MESSAGE_NEXTHOP;
        }
        if self.ifindexes.is_some() {
            bits |= MESSAGE_IFINDEX;
        }
        if self.distance.is_some() {
            bits |= MESSAGE_DISTANCE;
        }
        if self.metric.is_some() {
            bits |= MESSAGE_METRIC;
        }
        bits
    }
}

fn need(buf: &impl Buf, n: usize, what: &'static str) -> Result<(), FramingError> {
    if buf.remaining() < n {
        Err(FramingError::Truncated(what))
    } else {
        Ok(())
    }
}

fn prefix_byte_len(bits: u8) -> usize {
    (bits as usize + 7) / 8
}

fn put_prefix_v4(buf: &mut BytesMut, prefix: &Ipv4Prefix) {
    buf.put_u8(prefix.len);
    buf.put_slice(&prefix.addr.octets()[..prefix_byte_len(prefix.len)]);
}

fn get_prefix_v4(buf: &mut impl Buf) -> Result<Ipv4Prefix, FramingError> {
    need(buf, 1, "route prefix")?;
    let len = buf.get_u8();
    if len > 32 {
        return Err(FramingError::InvalidField {
            field: "prefix length",
            value: len as u32,
        });
    }
    let nbytes = prefix_byte_len(len);
    need(buf, nbytes, "route prefix")?;
    let mut octets = [0u8; 4];
    buf.copy_to_slice(&mut octets[..nbytes]);
    Ok(Ipv4Prefix::new(Ipv4Addr::from(octets), len))
}

fn put_prefix_v6(buf: &mut BytesMut, prefix: &Ipv6Prefix) {
    buf.put_u8(prefix.len);
    buf.put_slice(&prefix.addr.octets()[..prefix_byte_len(prefix.len)]);
}

fn get_prefix_v6(buf: &mut impl Buf) -> Result<Ipv6Prefix, FramingError> {
    need(buf, 1, "route prefix")?;
    let len = buf.get_u8();
    if len > 128 {
        return Err(FramingError::InvalidField {
            field: "prefix length",
            value: len as u32,
        });
    }
    let nbytes = prefix_byte_len(len);
    need(buf, nbytes, "route prefix")?;
    let mut octets = [0u8; 16];
    buf.copy_to_slice(&mut octets[..nbytes]);
    Ok(Ipv6Prefix::new(Ipv6Addr::from(octets), len))
}

fn get_route_common(buf: &mut impl Buf) -> Result<(RouteType, u8, u8, Safi), FramingError> {
    need(buf, 5, "route")?;
    let type_byte = buf.get_u8();
    let route_type = RouteType::from_wire(type_byte).ok_or(FramingError::InvalidField {
        field: "route type",
        value: type_byte as u32,
    })?;
    let flags = buf.get_u8();
    let message = buf.get_u8();
    let safi_raw = buf.get_u16();
    let safi = Safi::from_wire(safi_raw).ok_or(FramingError::InvalidField {
        field: "safi",
        value: safi_raw as u32,
    })?;
    Ok((route_type, flags, message, safi))
}

/// Encode an IPv4 route payload (body only, no header).
pub fn encode_ipv4_route(prefix: &Ipv4Prefix, route: &Ipv4Route) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_u8(route.route_type as u8);
    buf.put_u8(route.flags);
    buf.put_u8(route.message_bits());
    buf.put_u16(route.safi as u16);
    put_prefix_v4(&mut buf, prefix);
    if let Some(nexthops) = &route.nexthops {
        buf.put_u8(nexthops.len() as u8);
        for nexthop in nexthops {
            buf.put_slice(&nexthop.octets());
        }
    }
    if let Some(ifindexes) = &route.ifindexes {
        buf.put_u8(ifindexes.len() as u8);
        for ifindex in ifindexes {
            buf.put_u32(*ifindex);
        }
    }
    if let Some(distance) = route.distance {
        buf.put_u8(distance);
    }
    if let Some(metric) = route.metric {
        buf.put_u32(metric);
    }
    buf.freeze()
}

/// Decode an IPv4 route payload.
pub fn decode_ipv4_route(buf: &mut impl Buf) -> Result<(Ipv4Prefix, Ipv4Route), FramingError> {
    let (route_type, flags, message, safi) = get_route_common(buf)?;
    let prefix = get_prefix_v4(buf)?;

    let nexthops = if message & MESSAGE_NEXTHOP != 0 {
        need(buf, 1, "route nexthops")?;
        let count = buf.get_u8() as usize;
        need(buf, count * 4, "route nexthops")?;
        let mut nexthops = Vec::with_capacity(count);
        for _ in 0..count {
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);
            nexthops.push(Ipv4Addr::from(octets));
        }
        Some(nexthops)
    } else {
        None
    };

    let ifindexes = if message & MESSAGE_IFINDEX != 0 {
        need(buf, 1, "route ifindexes")?;
        let count = buf.get_u8() as usize;
        need(buf, count * 4, "route ifindexes")?;
        let mut ifindexes = Vec::with_capacity(count);
        for _ in 0..count {
            ifindexes.push(buf.get_u32());
        }
        Some(ifindexes)
    } else {
        None
    };

    let distance = if message & MESSAGE_DISTANCE != 0 {
        need(buf, 1, "route distance")?;
        Some(buf.get_u8())
    } else {
        None
    };

    let metric = if message & MESSAGE_METRIC != 0 {
        need(buf, 4, "route metric")?;
        Some(buf.get_u32())
    } else {
        None
    };

    Ok((
        prefix,
        Ipv4Route {
            route_type,
            flags,
            safi,
            nexthops,
            ifindexes,
            distance,
            metric,
        },
    ))
}

/// Encode an IPv6 route payload (body only, no header).
pub fn encode_ipv6_route(prefix: &Ipv6Prefix, route: &Ipv6Route) -> Bytes {
    let mut buf = BytesMut::with_capacity(96);
    buf.put_u8(route.route_type as u8);
    buf.put_u8(route.flags);
    buf.put_u8(route.message_bits());
    buf.put_u16(route.safi as u16);
    put_prefix_v6(&mut buf, prefix);
    if let Some(nexthops) = &route.nexthops {
        buf.put_u8(nexthops.len() as u8);
        for nexthop in nexthops {
            buf.put_slice(&nexthop.octets());
        }
    }
    if let Some(ifindexes) = &route.ifindexes {
        buf.put_u8(ifindexes.len() as u8);
        for ifindex in ifindexes {
            buf.put_u32(*ifindex);
        }
    }
    if let Some(distance) = route.distance {
        buf.put_u8(distance);
    }
    if let Some(metric) = route.metric {
        buf.put_u32(metric);
    }
    buf.freeze()
}

/// Decode an IPv6 route payload.
pub fn decode_ipv6_route(buf: &mut impl Buf) -> Result<(Ipv6Prefix, Ipv6Route), FramingError> {
    let (route_type, flags, message, safi) = get_route_common(buf)?;
    let prefix = get_prefix_v6(buf)?;

    let nexthops = if message & MESSAGE_NEXTHOP != 0 {
        need(buf, 1, "route nexthops")?;
        let count = buf.get_u8() as usize;
        need(buf, count * 16, "route nexthops")?;
        let mut nexthops = Vec::with_capacity(count);
        for _ in 0..count {
            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);
            nexthops.push(Ipv6Addr::from(octets));
        }
        Some(nexthops)
    } else {
        None
    };

    let ifindexes = if message & MESSAGE_IFINDEX != 0 {
        need(buf, 1, "route ifindexes")?;
        let count = buf.get_u8() as usize;
        need(buf, count * 4, "route ifindexes")?;
        let mut ifindexes = Vec::with_capacity(count);
        for _ in 0..count {
            ifindexes.push(buf.get_u32());
        }
        Some(ifindexes)
    } else {
        None
    };

    let distance = if message & MESSAGE_DISTANCE != 0 {
        need(buf, 1, "route distance")?;
        Some(buf.get_u8())
    } else {
        None
    };

    let metric = if message & MESSAGE_METRIC != 0 {
        need(buf, 4, "route metric")?;
        Some(buf.get_u32())
    } else {
        None
    };

    Ok((
        prefix,
        Ipv6Route {
            route_type,
            flags,
            safi,
            nexthops,
            ifindexes,
            distance,
            metric,
        },
    ))
}

/// Encode a router-id notification payload.
pub fn encode_router_id(prefix: &Prefix) -> Bytes {
    let mut buf = BytesMut::with_capacity(18);
    match prefix {
        Prefix::V4(p) => {
            buf.put_u8(FAMILY_IPV4);
            buf.put_slice(&p.addr.octets());
            buf.put_u8(p.len);
        }
        Prefix::V6(p) => {
            buf.put_u8(FAMILY_IPV6);
            buf.put_slice(&p.addr.octets());
            buf.put_u8(p.len);
        }
    }
    buf.freeze()
}

/// Decode a router-id notification payload.
pub fn decode_router_id(buf: &mut impl Buf) -> Result<Prefix, FramingError> {
    need(buf, 1, "router-id")?;
    let family = buf.get_u8();
    match family {
        FAMILY_IPV4 => {
            need(buf, 5, "router-id")?;
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);
            let len = buf.get_u8();
            if len > 32 {
                return Err(FramingError::InvalidField {
                    field: "prefix length",
                    value: len as u32,
                });
            }
            Ok(Prefix::V4(Ipv4Prefix::new(Ipv4Addr::from(octets), len)))
        }
        FAMILY_IPV6 => {
            need(buf, 17, "router-id")?;
            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);
            let len = buf.get_u8();
            if len > 128 {
                return Err(FramingError::InvalidField {
                    field: "prefix length",
                    value: len as u32,
                });
            }
            Ok(Prefix::V6(Ipv6Prefix::new(Ipv6Addr::from(octets), len)))
        }
        _ => Err(FramingError::InvalidField {
            field: "address family",
            value: family as u32,
        }),
    }
}

/// Encode an interface notification payload.
pub fn encode_interface(info: &InterfaceInfo) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);
    let mut name = [0u8; INTERFACE_NAME_SIZE];
    let n = info.name.len().min(INTERFACE_NAME_SIZE);
    name[..n].copy_from_slice(&info.name.as_bytes()[..n]);
    buf.put_slice(&name);
    buf.put_u32(info.ifindex);
    buf.put_u8(info.status);
    buf.put_u64(info.flags);
    buf.put_u32(info.metric);
    buf.put_u32(info.mtu);
    buf.put_u32(info.bandwidth);
    buf.put_u32(info.hw_addr.len() as u32);
    buf.put_slice(&info.hw_addr);
    buf.freeze()
}

/// Decode an interface notification payload.
pub fn decode_interface(buf: &mut impl Buf) -> Result<InterfaceInfo, FramingError> {
    need(buf, INTERFACE_NAME_SIZE + 4 + 1 + 8 + 4 + 4 + 4 + 4, "interface")?;

    let mut name_bytes = [0u8; INTERFACE_NAME_SIZE];
    buf.copy_to_slice(&mut name_bytes);
    let name_end = name_bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(INTERFACE_NAME_SIZE);
    let name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();

    let ifindex = buf.get_u32();
    let status = buf.get_u8();
    let flags = buf.get_u64();
    let metric = buf.get_u32();
    let mtu = buf.get_u32();
    let bandwidth = buf.get_u32();

    let hw_len = buf.get_u32() as usize;
    if hw_len > INTERFACE_HWADDR_MAX {
        return Err(FramingError::InvalidField {
            field: "hardware address length",
            value: hw_len as u32,
        });
    }
    need(buf, hw_len, "interface")?;
    let mut hw_addr = vec![0u8; hw_len];
    buf.copy_to_slice(&mut hw_addr);

    Ok(InterfaceInfo {
        name,
        ifindex,
        status,
        flags,
        metric,
        mtu,
        bandwidth,
        hw_addr,
    })
}

/// Encode an interface address notification payload.
pub fn encode_interface_address(address: &ConnectedAddress) -> Bytes {
    let mut buf = BytesMut::with_capacity(48);
    buf.put_u32(address.ifindex);
    buf.put_u8(address.flags);
    match &address.prefix {
        Prefix::V4(p) => {
            buf.put_u8(FAMILY_IPV4);
            buf.put_slice(&p.addr.octets());
            buf.put_u8(p.len);
            let destination = match address.destination {
                IpAddr::V4(d) => d,
                IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
            };
            buf.put_slice(&destination.octets());
        }
        Prefix::V6(p) => {
            buf.put_u8(FAMILY_IPV6);
            buf.put_slice(&p.addr.octets());
            buf.put_u8(p.len);
            let destination = match address.destination {
                IpAddr::V6(d) => d,
                IpAddr::V4(_) => Ipv6Addr::UNSPECIFIED,
            };
            buf.put_slice(&destination.octets());
        }
    }
    buf.freeze()
}

/// Decode an interface address notification payload.
pub fn decode_interface_address(buf: &mut impl Buf) -> Result<ConnectedAddress, FramingError> {
    need(buf, 6, "interface address")?;
    let ifindex = buf.get_u32();
    let flags = buf.get_u8();
    let family = buf.get_u8();

    match family {
        FAMILY_IPV4 => {
            need(buf, 9, "interface address")?;
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);
            let len = buf.get_u8();
            if len > 32 {
                return Err(FramingError::InvalidField {
                    field: "prefix length",
                    value: len as u32,
                });
            }
            let mut dest = [0u8; 4];
            buf.copy_to_slice(&mut dest);
            Ok(ConnectedAddress {
                ifindex,
                flags,
                prefix: Prefix::V4(Ipv4Prefix::new(Ipv4Addr::from(octets), len)),
                destination: IpAddr::V4(Ipv4Addr::from(dest)),
            })
        }
        FAMILY_IPV6 => {
            need(buf, 33, "interface address")?;
            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);
            let len = buf.get_u8();
            if len > 128 {
                return Err(FramingError::InvalidField {
                    field: "prefix length",
                    value: len as u32,
                });
            }
            let mut dest = [0u8; 16];
            buf.copy_to_slice(&mut dest);
            Ok(ConnectedAddress {
                ifindex,
                flags,
                prefix: Prefix::V6(Ipv6Prefix::new(Ipv6Addr::from(octets), len)),
                destination: IpAddr::V6(Ipv6Addr::from(dest)),
            })
        }
        _ => Err(FramingError::InvalidField {
            field: "address family",
            value: family as u32,
        }),
    }
}
