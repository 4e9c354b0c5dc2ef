// Shared helpers for the pipeline integration tests: raw frame construction
// and an in-memory FrameSource.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, Ipv6Addr};

use passivedns::capture::{FrameSource, ReadOutcome};
use passivedns::error::PdnsError;
use passivedns::packet::{Frame, LinkType};

pub const PROTO_TCP: u8 = 6;
pub const PROTO_UDP: u8 = 17;

pub const TCP_FIN: u8 = 0x01;
pub const TCP_RST: u8 = 0x04;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;

/// In-memory frame source; yields its frames then ends the stream.
pub struct MemSource {
    frames: VecDeque<Frame>,
}

impl MemSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FrameSource for MemSource {
    fn read_frame(&mut self) -> Result<ReadOutcome, PdnsError> {
        Ok(match self.frames.pop_front() {
            Some(frame) => ReadOutcome::Frame(frame),
            None => ReadOutcome::EndOfStream,
        })
    }

    fn link_type(&self) -> LinkType {
        LinkType::Ethernet
    }
}

pub fn frame(data: Vec<u8>) -> Frame {
    Frame {
        timestamp: 1_700_000_000_000_000,
        data,
        link: LinkType::Ethernet,
    }
}

// ---------------------------------------------------------------------------
// Layer builders
// ---------------------------------------------------------------------------

fn ethernet(ethertype: u16, l3: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 12];
    out.extend_from_slice(&ethertype.to_be_bytes());
    out.extend_from_slice(l3);
    out
}

/// Ethernet + IPv4. `frag_units` is the fragment offset in 8-byte units.
pub fn ipv4_frame(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: u8,
    identification: u16,
    frag_units: u16,
    more_fragments: bool,
    l4: &[u8],
) -> Vec<u8> {
    let mut ip = Vec::with_capacity(20 + l4.len());
    ip.push(0x45);
    ip.push(0);
    ip.extend_from_slice(&((20 + l4.len()) as u16).to_be_bytes());
    ip.extend_from_slice(&identification.to_be_bytes());
    let mut flags_frag = frag_units & 0x1FFF;
    if more_fragments {
        flags_frag |= 0x2000;
    }
    ip.extend_from_slice(&flags_frag.to_be_bytes());
    ip.push(64);
    ip.push(protocol);
    ip.extend_from_slice(&0u16.to_be_bytes());
    ip.extend_from_slice(&src.octets());
    ip.extend_from_slice(&dst.octets());
    ip.extend_from_slice(l4);
    ethernet(ETHERTYPE_IPV4, &ip)
}

/// Ethernet + IPv6, no extension headers.
pub fn ipv6_frame(src: Ipv6Addr, dst: Ipv6Addr, next_header: u8, l4: &[u8]) -> Vec<u8> {
    let mut ip = Vec::with_capacity(40 + l4.len());
    ip.push(0x60);
    ip.extend_from_slice(&[0, 0, 0]);
    ip.extend_from_slice(&(l4.len() as u16).to_be_bytes());
    ip.push(next_header);
    ip.push(64);
    ip.extend_from_slice(&src.octets());
    ip.extend_from_slice(&dst.octets());
    ip.extend_from_slice(l4);
    ethernet(ETHERTYPE_IPV6, &ip)
}

/// Ethernet + IPv6 with a Fragment extension header.
pub fn ipv6_fragment_frame(
    src: Ipv6Addr,
    dst: Ipv6Addr,
    next_header: u8,
    identification: u32,
    frag_units: u16,
    more_fragments: bool,
    payload: &[u8],
) -> Vec<u8> {
    let mut ip = Vec::with_capacity(48 + payload.len());
    ip.push(0x60);
    ip.extend_from_slice(&[0, 0, 0]);
    ip.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    ip.push(44); // Fragment header
    ip.push(64);
    ip.extend_from_slice(&src.octets());
    ip.extend_from_slice(&dst.octets());
    ip.push(next_header);
    ip.push(0);
    let field = (frag_units << 3) | u16::from(more_fragments);
    ip.extend_from_slice(&field.to_be_bytes());
    ip.extend_from_slice(&identification.to_be_bytes());
    ip.extend_from_slice(payload);
    ethernet(ETHERTYPE_IPV6, &ip)
}

pub fn udp(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&src_port.to_be_bytes());
    out.extend_from_slice(&dst_port.to_be_bytes());
    out.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn tcp(src_port: u16, dst_port: u16, sequence: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(20 + payload.len());
    out.extend_from_slice(&src_port.to_be_bytes());
    out.extend_from_slice(&dst_port.to_be_bytes());
    out.extend_from_slice(&sequence.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.push(0x50);
    out.push(flags);
    out.extend_from_slice(&65535u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

// ---------------------------------------------------------------------------
// DNS message builders
// ---------------------------------------------------------------------------

fn encode_name(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    if !(name == "." || name.is_empty()) {
        for label in name.trim_end_matches('.').split('.') {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
    }
    out.push(0);
    out
}

pub fn dns_query(id: u16, name: &str) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.extend_from_slice(&id.to_be_bytes());
    msg.extend_from_slice(&0x0100u16.to_be_bytes());
    msg.extend_from_slice(&1u16.to_be_bytes());
    msg.extend_from_slice(&0u16.to_be_bytes());
    msg.extend_from_slice(&0u16.to_be_bytes());
    msg.extend_from_slice(&0u16.to_be_bytes());
    msg.extend_from_slice(&encode_name(name));
    msg.extend_from_slice(&1u16.to_be_bytes());
    msg.extend_from_slice(&1u16.to_be_bytes());
    msg
}

/// A response with one A answer plus an opaque record of `pad` bytes, used
/// to grow the message to fragmentation-worthy sizes.
pub fn dns_response(id: u16, name: &str, pad: usize) -> Vec<u8> {
    let mut msg = Vec::new();
    msg.extend_from_slice(&id.to_be_bytes());
    msg.extend_from_slice(&0x8180u16.to_be_bytes());
    msg.extend_from_slice(&1u16.to_be_bytes());
    msg.extend_from_slice(&2u16.to_be_bytes());
    msg.extend_from_slice(&0u16.to_be_bytes());
    msg.extend_from_slice(&0u16.to_be_bytes());
    // Question
    msg.extend_from_slice(&encode_name(name));
    msg.extend_from_slice(&1u16.to_be_bytes());
    msg.extend_from_slice(&1u16.to_be_bytes());
    // A answer
    msg.extend_from_slice(&encode_name(name));
    msg.extend_from_slice(&1u16.to_be_bytes());
    msg.extend_from_slice(&1u16.to_be_bytes());
    msg.extend_from_slice(&300u32.to_be_bytes());
    msg.extend_from_slice(&4u16.to_be_bytes());
    msg.extend_from_slice(&[192, 0, 2, 7]);
    // Opaque padding record
    msg.extend_from_slice(&encode_name(name));
    msg.extend_from_slice(&999u16.to_be_bytes());
    msg.extend_from_slice(&1u16.to_be_bytes());
    msg.extend_from_slice(&300u32.to_be_bytes());
    msg.extend_from_slice(&(pad as u16).to_be_bytes());
    msg.extend(std::iter::repeat(0xA5u8).take(pad));
    msg
}

/// Prefix a DNS message with the RFC 7766 2-byte length.
pub fn frame_tcp_dns(message: &[u8]) -> Vec<u8> {
    let mut out = (message.len() as u16).to_be_bytes().to_vec();
    out.extend_from_slice(message);
    out
}
