// Wire parsers for the layers below DNS.
//
// Peels Ethernet / Linux cooked / raw-IP framing, IPv4 and IPv6 headers
// (including the IPv6 extension chain and both families' fragment metadata),
// and UDP/TCP transport headers from raw capture buffers. Every parser copies
// the bytes it hands on: capture buffers are only valid until the next read.

use std::net::{Ipv4Addr, Ipv6Addr};

// ---------------------------------------------------------------------------
// Link layer
// ---------------------------------------------------------------------------

/// Link-layer framing of a capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// Ethernet II (DLT_EN10MB = 1): 14-byte header, EtherType at offset 12.
    Ethernet,
    /// Linux cooked capture (DLT_LINUX_SLL = 113): 16-byte header,
    /// protocol at offset 14. Produced by `any`-device captures.
    CookedLinux,
    /// Raw IP (DLT_RAW): no link-layer header, IP version from first nibble.
    Raw,
}

/// One link-layer unit as delivered by a capture source.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Capture timestamp, microseconds since the Unix epoch.
    pub timestamp: u64,
    pub data: Vec<u8>,
    pub link: LinkType,
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const ETH_HLEN: usize = 14;
const SLL_HLEN: usize = 16;
const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;

const IPV4_MIN_HLEN: usize = 20;
const IPV6_HLEN: usize = 40;
const IPV6_FRAG_HLEN: usize = 8;

/// IPv4 flags/fragment-offset field: more-fragments bit.
const IPV4_MF: u16 = 0x2000;
/// IPv4 flags/fragment-offset field: offset mask (units of 8 bytes).
const IPV4_OFFSET_MASK: u16 = 0x1FFF;

pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

// IPv6 extension header protocol numbers.
const EXT_HOP_BY_HOP: u8 = 0;
const EXT_ROUTING: u8 = 43;
const EXT_FRAGMENT: u8 = 44;
const EXT_DEST_OPTIONS: u8 = 60;

const UDP_HLEN: usize = 8;
const TCP_MIN_HLEN: usize = 20;

const TCP_FIN: u8 = 0x01;
const TCP_SYN: u8 = 0x02;
const TCP_RST: u8 = 0x04;

// ---------------------------------------------------------------------------
// Network layer
// ---------------------------------------------------------------------------

/// A parsed IP packet, one fragment's worth or a whole datagram.
#[derive(Debug, Clone)]
pub enum IpPacket {
    V4(Ipv4Packet),
    V6(Ipv6Packet),
}

#[derive(Debug, Clone)]
pub struct Ipv4Packet {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    pub identification: u16,
    /// Fragment offset in bytes (already scaled from 8-byte units).
    pub fragment_offset: u16,
    pub more_fragments: bool,
    pub payload: Vec<u8>,
}

impl Ipv4Packet {
    /// True for any packet that is part of a fragmented datagram.
    pub fn is_fragment(&self) -> bool {
        self.more_fragments || self.fragment_offset > 0
    }
}

/// Fragment extension header fields, present on fragmented IPv6 packets.
#[derive(Debug, Clone, Copy)]
pub struct Ipv6FragmentMeta {
    pub identification: u32,
    /// Fragment offset in bytes.
    pub offset: u16,
    pub more_fragments: bool,
}

#[derive(Debug, Clone)]
pub struct Ipv6Packet {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    /// For unfragmented packets: the protocol of `payload` after the
    /// extension chain. For fragments: the Fragment header's Next Header,
    /// i.e. the protocol of the reassembled payload.
    pub next_header: u8,
    pub fragment: Option<Ipv6FragmentMeta>,
    /// For fragments this is the fragmentable part carried by this packet.
    pub payload: Vec<u8>,
}

/// Locate the IP packet inside a link-layer frame.
///
/// Returns `None` for anything that is not plain IPv4/IPv6 (ARP, VLAN tags,
/// truncated headers); callers treat that as a silent drop.
pub fn parse_frame(data: &[u8], link: LinkType) -> Option<IpPacket> {
    let l3 = match link {
        LinkType::Ethernet => {
            if data.len() < ETH_HLEN {
                return None;
            }
            let ethertype = u16::from_be_bytes([data[12], data[13]]);
            match ethertype {
                ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => &data[ETH_HLEN..],
                _ => return None,
            }
        }
        LinkType::CookedLinux => {
            if data.len() < SLL_HLEN {
                return None;
            }
            let proto = u16::from_be_bytes([data[14], data[15]]);
            match proto {
                ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => &data[SLL_HLEN..],
                _ => return None,
            }
        }
        LinkType::Raw => data,
    };

    match l3.first()? >> 4 {
        4 => parse_ipv4(l3).map(IpPacket::V4),
        6 => parse_ipv6(l3).map(IpPacket::V6),
        _ => None,
    }
}

/// Parse an IPv4 header, trimming link-layer padding via Total Length.
pub fn parse_ipv4(data: &[u8]) -> Option<Ipv4Packet> {
    if data.len() < IPV4_MIN_HLEN || data[0] >> 4 != 4 {
        return None;
    }
    let ihl = ((data[0] & 0x0F) as usize) * 4;
    if ihl < IPV4_MIN_HLEN || data.len() < ihl {
        return None;
    }

    let total_len = u16::from_be_bytes([data[2], data[3]]) as usize;
    if total_len < ihl {
        return None;
    }
    // Ethernet pads short frames; never read past Total Length. A capture
    // truncated below Total Length still yields the bytes we have.
    let end = total_len.min(data.len());

    let identification = u16::from_be_bytes([data[4], data[5]]);
    let flags_frag = u16::from_be_bytes([data[6], data[7]]);

    Some(Ipv4Packet {
        src: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
        dst: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        protocol: data[9],
        identification,
        fragment_offset: (flags_frag & IPV4_OFFSET_MASK) * 8,
        more_fragments: flags_frag & IPV4_MF != 0,
        payload: data[ihl..end].to_vec(),
    })
}

/// Parse an IPv6 header and walk its extension chain.
///
/// Stops at the Fragment header when one is present: reassembly has to happen
/// before the rest of the chain can be interpreted.
pub fn parse_ipv6(data: &[u8]) -> Option<Ipv6Packet> {
    if data.len() < IPV6_HLEN || data[0] >> 4 != 6 {
        return None;
    }

    let payload_len = u16::from_be_bytes([data[4], data[5]]) as usize;
    let end = (IPV6_HLEN + payload_len).min(data.len());

    let src_bytes: [u8; 16] = data[8..24].try_into().ok()?;
    let dst_bytes: [u8; 16] = data[24..40].try_into().ok()?;
    let src = Ipv6Addr::from(src_bytes);
    let dst = Ipv6Addr::from(dst_bytes);

    let ext = &data[IPV6_HLEN..end];
    let mut next_header = data[6];
    let mut offset = 0usize;

    loop {
        match next_header {
            EXT_HOP_BY_HOP | EXT_ROUTING | EXT_DEST_OPTIONS => {
                if offset + 2 > ext.len() {
                    return None;
                }
                let hdr_len = (ext[offset + 1] as usize + 1) * 8;
                if offset + hdr_len > ext.len() {
                    return None;
                }
                next_header = ext[offset];
                offset += hdr_len;
            }
            EXT_FRAGMENT => {
                if offset + IPV6_FRAG_HLEN > ext.len() {
                    return None;
                }
                let field = u16::from_be_bytes([ext[offset + 2], ext[offset + 3]]);
                let identification = u32::from_be_bytes([
                    ext[offset + 4],
                    ext[offset + 5],
                    ext[offset + 6],
                    ext[offset + 7],
                ]);
                return Some(Ipv6Packet {
                    src,
                    dst,
                    next_header: ext[offset],
                    fragment: Some(Ipv6FragmentMeta {
                        identification,
                        offset: (field >> 3) * 8,
                        more_fragments: field & 1 != 0,
                    }),
                    payload: ext[offset + IPV6_FRAG_HLEN..].to_vec(),
                });
            }
            _ => {
                return Some(Ipv6Packet {
                    src,
                    dst,
                    next_header,
                    fragment: None,
                    payload: ext[offset..].to_vec(),
                });
            }
        }
    }
}

/// Skip IPv6 extension headers inside an already-reassembled payload,
/// returning `(final_next_header, payload_offset)`.
pub fn skip_extension_headers(mut next_header: u8, data: &[u8]) -> (u8, usize) {
    let mut offset = 0usize;
    loop {
        match next_header {
            EXT_HOP_BY_HOP | EXT_ROUTING | EXT_DEST_OPTIONS => {
                if offset + 2 > data.len() {
                    return (next_header, offset);
                }
                let hdr_len = (data[offset + 1] as usize + 1) * 8;
                if offset + hdr_len > data.len() {
                    return (next_header, offset);
                }
                next_header = data[offset];
                offset += hdr_len;
            }
            EXT_FRAGMENT => {
                // Should not appear post-reassembly; skip its fixed 8 bytes.
                if offset + IPV6_FRAG_HLEN > data.len() {
                    return (next_header, offset);
                }
                next_header = data[offset];
                offset += IPV6_FRAG_HLEN;
            }
            _ => return (next_header, offset),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UdpDatagram {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

/// Parse a UDP header, trimming to the UDP Length field.
pub fn parse_udp(data: &[u8]) -> Option<UdpDatagram> {
    if data.len() < UDP_HLEN {
        return None;
    }
    let udp_len = u16::from_be_bytes([data[4], data[5]]) as usize;
    if udp_len < UDP_HLEN {
        return None;
    }
    let end = udp_len.min(data.len());
    Some(UdpDatagram {
        src_port: u16::from_be_bytes([data[0], data[1]]),
        dst_port: u16::from_be_bytes([data[2], data[3]]),
        payload: data[UDP_HLEN..end].to_vec(),
    })
}

/// The slice of a TCP segment the assembler needs: sequencing, teardown
/// flags, ports, payload.
#[derive(Debug, Clone)]
pub struct TcpPdu {
    pub src_port: u16,
    pub dst_port: u16,
    pub sequence: u32,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub payload: Vec<u8>,
}

pub fn parse_tcp(data: &[u8]) -> Option<TcpPdu> {
    if data.len() < TCP_MIN_HLEN {
        return None;
    }
    let header_len = ((data[12] >> 4) as usize) * 4;
    if header_len < TCP_MIN_HLEN || data.len() < header_len {
        return None;
    }
    let flags = data[13];
    Some(TcpPdu {
        src_port: u16::from_be_bytes([data[0], data[1]]),
        dst_port: u16::from_be_bytes([data[2], data[3]]),
        sequence: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        syn: flags & TCP_SYN != 0,
        fin: flags & TCP_FIN != 0,
        rst: flags & TCP_RST != 0,
        payload: data[header_len..].to_vec(),
    })
}

// ===========================================================================
// Unit tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Builder for raw test frames. Defaults to an Ethernet IPv4 UDP packet
    /// with empty payload; every layer can be overridden.
    pub(crate) struct FrameBuilder {
        link: LinkType,
        ip_version: u8,
        src_v4: Ipv4Addr,
        dst_v4: Ipv4Addr,
        src_v6: Ipv6Addr,
        dst_v6: Ipv6Addr,
        protocol: u8,
        identification: u16,
        // IPv4: 13-bit offset in 8-byte units plus MF flag.
        frag_units: u16,
        more_fragments: bool,
        // IPv6 fragment header (id, offset_units, more) when set.
        v6_fragment: Option<(u32, u16, bool)>,
        src_port: u16,
        dst_port: u16,
        sequence: u32,
        tcp_flags: u8,
        payload: Vec<u8>,
    }

    impl FrameBuilder {
        pub(crate) fn new() -> Self {
            Self {
                link: LinkType::Ethernet,
                ip_version: 4,
                src_v4: Ipv4Addr::new(10, 1, 1, 1),
                dst_v4: Ipv4Addr::new(10, 1, 1, 2),
                src_v6: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1),
                dst_v6: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2),
                protocol: PROTO_UDP,
                identification: 0,
                frag_units: 0,
                more_fragments: false,
                v6_fragment: None,
                src_port: 40000,
                dst_port: 53,
                sequence: 0,
                tcp_flags: 0,
                payload: Vec::new(),
            }
        }

        pub(crate) fn link(mut self, link: LinkType) -> Self {
            self.link = link;
            self
        }

        pub(crate) fn ipv6(mut self) -> Self {
            self.ip_version = 6;
            self
        }

        pub(crate) fn protocol(mut self, protocol: u8) -> Self {
            self.protocol = protocol;
            self
        }

        pub(crate) fn id(mut self, id: u16) -> Self {
            self.identification = id;
            self
        }

        pub(crate) fn fragment(mut self, offset_units: u16, more: bool) -> Self {
            self.frag_units = offset_units;
            self.more_fragments = more;
            self
        }

        pub(crate) fn v6_fragment(mut self, id: u32, offset_units: u16, more: bool) -> Self {
            self.v6_fragment = Some((id, offset_units, more));
            self
        }

        pub(crate) fn ports(mut self, src: u16, dst: u16) -> Self {
            self.src_port = src;
            self.dst_port = dst;
            self
        }

        pub(crate) fn sequence(mut self, seq: u32) -> Self {
            self.sequence = seq;
            self
        }

        pub(crate) fn tcp_flags(mut self, flags: u8) -> Self {
            self.tcp_flags = flags;
            self
        }

        pub(crate) fn payload(mut self, payload: &[u8]) -> Self {
            self.payload = payload.to_vec();
            self
        }

        pub(crate) fn build(&self) -> Vec<u8> {
            let l4 = self.build_l4();
            let mut out = Vec::new();
            match self.link {
                LinkType::Ethernet => {
                    out.extend_from_slice(&[0u8; 12]);
                    let ethertype = if self.ip_version == 4 {
                        ETHERTYPE_IPV4
                    } else {
                        ETHERTYPE_IPV6
                    };
                    out.extend_from_slice(&ethertype.to_be_bytes());
                }
                LinkType::CookedLinux => {
                    out.extend_from_slice(&[0u8; 14]);
                    let proto = if self.ip_version == 4 {
                        ETHERTYPE_IPV4
                    } else {
                        ETHERTYPE_IPV6
                    };
                    out.extend_from_slice(&proto.to_be_bytes());
                }
                LinkType::Raw => {}
            }
            if self.ip_version == 4 {
                self.build_ipv4(&mut out, &l4);
            } else {
                self.build_ipv6(&mut out, &l4);
            }
            out
        }

        fn build_ipv4(&self, out: &mut Vec<u8>, l4: &[u8]) {
            let total_len = (IPV4_MIN_HLEN + l4.len()) as u16;
            out.push(0x45);
            out.push(0);
            out.extend_from_slice(&total_len.to_be_bytes());
            out.extend_from_slice(&self.identification.to_be_bytes());
            let mut flags_frag = self.frag_units & IPV4_OFFSET_MASK;
            if self.more_fragments {
                flags_frag |= IPV4_MF;
            }
            out.extend_from_slice(&flags_frag.to_be_bytes());
            out.push(64);
            out.push(self.protocol);
            out.extend_from_slice(&0u16.to_be_bytes());
            out.extend_from_slice(&self.src_v4.octets());
            out.extend_from_slice(&self.dst_v4.octets());
            out.extend_from_slice(l4);
        }

        fn build_ipv6(&self, out: &mut Vec<u8>, l4: &[u8]) {
            let frag_hlen = if self.v6_fragment.is_some() {
                IPV6_FRAG_HLEN
            } else {
                0
            };
            let payload_len = (frag_hlen + l4.len()) as u16;
            out.push(0x60);
            out.extend_from_slice(&[0, 0, 0]);
            out.extend_from_slice(&payload_len.to_be_bytes());
            if self.v6_fragment.is_some() {
                out.push(EXT_FRAGMENT);
            } else {
                out.push(self.protocol);
            }
            out.push(64);
            out.extend_from_slice(&self.src_v6.octets());
            out.extend_from_slice(&self.dst_v6.octets());
            if let Some((id, offset_units, more)) = self.v6_fragment {
                out.push(self.protocol);
                out.push(0);
                let field = (offset_units << 3) | u16::from(more);
                out.extend_from_slice(&field.to_be_bytes());
                out.extend_from_slice(&id.to_be_bytes());
            }
            out.extend_from_slice(l4);
        }

        fn build_l4(&self) -> Vec<u8> {
            // For fragments at non-zero offset the "L4" bytes are raw payload.
            if self.frag_units > 0 || self.v6_fragment.is_some_and(|(_, off, _)| off > 0) {
                return self.payload.clone();
            }
            let mut l4 = Vec::new();
            match self.protocol {
                PROTO_UDP => {
                    l4.extend_from_slice(&self.src_port.to_be_bytes());
                    l4.extend_from_slice(&self.dst_port.to_be_bytes());
                    let udp_len = (UDP_HLEN + self.payload.len()) as u16;
                    l4.extend_from_slice(&udp_len.to_be_bytes());
                    l4.extend_from_slice(&0u16.to_be_bytes());
                    l4.extend_from_slice(&self.payload);
                }
                PROTO_TCP => {
                    l4.extend_from_slice(&self.src_port.to_be_bytes());
                    l4.extend_from_slice(&self.dst_port.to_be_bytes());
                    l4.extend_from_slice(&self.sequence.to_be_bytes());
                    l4.extend_from_slice(&0u32.to_be_bytes());
                    l4.push(0x50);
                    l4.push(self.tcp_flags);
                    l4.extend_from_slice(&65535u16.to_be_bytes());
                    l4.extend_from_slice(&0u16.to_be_bytes());
                    l4.extend_from_slice(&0u16.to_be_bytes());
                    l4.extend_from_slice(&self.payload);
                }
                _ => l4.extend_from_slice(&self.payload),
            }
            l4
        }
    }

    fn as_v4(packet: IpPacket) -> Ipv4Packet {
        match packet {
            IpPacket::V4(p) => p,
            IpPacket::V6(_) => panic!("expected IPv4"),
        }
    }

    fn as_v6(packet: IpPacket) -> Ipv6Packet {
        match packet {
            IpPacket::V4(_) => panic!("expected IPv6"),
            IpPacket::V6(p) => p,
        }
    }

    #[test]
    fn ethernet_ipv4_udp() {
        let frame = FrameBuilder::new().payload(b"hello").build();
        let p = as_v4(parse_frame(&frame, LinkType::Ethernet).unwrap());
        assert_eq!(p.protocol, PROTO_UDP);
        assert!(!p.is_fragment());
        let udp = parse_udp(&p.payload).unwrap();
        assert_eq!(udp.src_port, 40000);
        assert_eq!(udp.dst_port, 53);
        assert_eq!(udp.payload, b"hello");
    }

    #[test]
    fn cooked_linux_framing() {
        let frame = FrameBuilder::new().link(LinkType::CookedLinux).build();
        assert!(parse_frame(&frame, LinkType::CookedLinux).is_some());
    }

    #[test]
    fn raw_framing() {
        let frame = FrameBuilder::new().link(LinkType::Raw).build();
        assert!(parse_frame(&frame, LinkType::Raw).is_some());
    }

    #[test]
    fn non_ip_ethertype_dropped() {
        let mut frame = FrameBuilder::new().build();
        // Overwrite EtherType with ARP.
        frame[12] = 0x08;
        frame[13] = 0x06;
        assert!(parse_frame(&frame, LinkType::Ethernet).is_none());
    }

    #[test]
    fn truncated_frame_dropped() {
        assert!(parse_frame(&[0u8; 10], LinkType::Ethernet).is_none());
    }

    #[test]
    fn ipv4_first_fragment_flagged() {
        let frame = FrameBuilder::new()
            .id(0x4242)
            .fragment(0, true)
            .payload(&[0xAA; 16])
            .build();
        let p = as_v4(parse_frame(&frame, LinkType::Ethernet).unwrap());
        assert!(p.is_fragment());
        assert!(p.more_fragments);
        assert_eq!(p.fragment_offset, 0);
        assert_eq!(p.identification, 0x4242);
        // First fragment still carries the UDP header.
        assert_eq!(p.payload.len(), UDP_HLEN + 16);
    }

    #[test]
    fn ipv4_trailing_fragment_offset_scaled() {
        let frame = FrameBuilder::new()
            .id(7)
            .fragment(185, false)
            .payload(&[0xBB; 24])
            .build();
        let p = as_v4(parse_frame(&frame, LinkType::Ethernet).unwrap());
        assert!(p.is_fragment());
        assert!(!p.more_fragments);
        assert_eq!(p.fragment_offset, 185 * 8);
        assert_eq!(p.payload, vec![0xBB; 24]);
    }

    #[test]
    fn ipv4_padding_trimmed_to_total_length() {
        let mut frame = FrameBuilder::new().payload(b"x").build();
        // Ethernet minimum-size padding appended by the NIC.
        frame.extend_from_slice(&[0u8; 17]);
        let p = as_v4(parse_frame(&frame, LinkType::Ethernet).unwrap());
        assert_eq!(p.payload.len(), UDP_HLEN + 1);
    }

    #[test]
    fn ipv6_udp() {
        let frame = FrameBuilder::new().ipv6().payload(b"q").build();
        let p = as_v6(parse_frame(&frame, LinkType::Ethernet).unwrap());
        assert_eq!(p.next_header, PROTO_UDP);
        assert!(p.fragment.is_none());
        let udp = parse_udp(&p.payload).unwrap();
        assert_eq!(udp.payload, b"q");
    }

    #[test]
    fn ipv6_fragment_header_parsed() {
        let frame = FrameBuilder::new()
            .ipv6()
            .v6_fragment(0xDEAD_BEEF, 100, true)
            .payload(&[1, 2, 3, 4, 5, 6, 7, 8])
            .build();
        let p = as_v6(parse_frame(&frame, LinkType::Ethernet).unwrap());
        let meta = p.fragment.unwrap();
        assert_eq!(meta.identification, 0xDEAD_BEEF);
        assert_eq!(meta.offset, 800);
        assert!(meta.more_fragments);
        assert_eq!(p.next_header, PROTO_UDP);
        assert_eq!(p.payload, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn skip_extension_headers_walks_chain() {
        // Hop-by-Hop (8 bytes) chaining to UDP.
        let mut data = vec![0u8; 8 + 4];
        data[0] = PROTO_UDP;
        data[1] = 0; // (0 + 1) * 8 = 8 bytes
        let (proto, offset) = skip_extension_headers(EXT_HOP_BY_HOP, &data);
        assert_eq!(proto, PROTO_UDP);
        assert_eq!(offset, 8);
    }

    #[test]
    fn tcp_fields_extracted() {
        let frame = FrameBuilder::new()
            .protocol(PROTO_TCP)
            .ports(55555, 53)
            .sequence(0x0102_0304)
            .tcp_flags(TCP_SYN | TCP_FIN)
            .payload(b"zz")
            .build();
        let p = as_v4(parse_frame(&frame, LinkType::Ethernet).unwrap());
        let tcp = parse_tcp(&p.payload).unwrap();
        assert_eq!(tcp.src_port, 55555);
        assert_eq!(tcp.dst_port, 53);
        assert_eq!(tcp.sequence, 0x0102_0304);
        assert!(tcp.syn);
        assert!(tcp.fin);
        assert!(!tcp.rst);
        assert_eq!(tcp.payload, b"zz");
    }

    #[test]
    fn udp_length_bounds_respected() {
        // Length field smaller than the header is malformed.
        let mut data = vec![0u8; 12];
        data[5] = 4;
        assert!(parse_udp(&data).is_none());
    }

    #[test]
    fn tcp_truncated_dropped() {
        assert!(parse_tcp(&[0u8; 12]).is_none());
    }
}
