// DNS wire-format decoder, RFC 1035 Section 4.
//
// Decodes the header, all four sections with name decompression, and typed
// RDATA for the record types an observer cares about. Unknown RDATA is kept
// as hex rather than dropped; EDNS0 OPT pseudo-records are accepted and
// carried opaquely. The same decoder serves UDP payloads and length-framed
// DNS-over-TCP messages (after the 2-byte prefix is stripped).

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::Serialize;

use crate::error::PdnsError;

const HEADER_SIZE: usize = 12;

/// Pointer-hop bound during name decompression; well-formed messages need
/// far fewer, malicious ones loop.
const MAX_POINTER_HOPS: usize = 64;

const MAX_LABEL_LENGTH: usize = 63;

/// Cap for section preallocation — counts are attacker-controlled.
const MAX_SECTION_PREALLOC: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rcode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Other(u8),
}

impl Rcode {
    fn from_u8(value: u8) -> Self {
        match value & 0x0F {
            0 => Self::NoError,
            1 => Self::FormErr,
            2 => Self::ServFail,
            3 => Self::NxDomain,
            4 => Self::NotImp,
            5 => Self::Refused,
            n => Self::Other(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RrType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Opt,
    Unknown(u16),
}

impl RrType {
    fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::A,
            2 => Self::Ns,
            5 => Self::Cname,
            6 => Self::Soa,
            12 => Self::Ptr,
            15 => Self::Mx,
            16 => Self::Txt,
            28 => Self::Aaaa,
            41 => Self::Opt,
            n => Self::Unknown(n),
        }
    }
}

/// Typed RDATA. `Opaque` carries the raw octets of unhandled types as hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Cname(String),
    Ns(String),
    Ptr(String),
    Mx {
        preference: u16,
        exchange: String,
    },
    Txt(Vec<String>),
    Soa {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Opt,
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub name: String,
    pub rtype: RrType,
    pub class: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub name: String,
    pub rtype: RrType,
    pub class: u16,
    pub ttl: u32,
    pub rdata: RData,
}

/// A fully decoded DNS message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsMessage {
    pub id: u16,
    pub response: bool,
    pub opcode: u8,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub rcode: Rcode,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
}

/// Decode a DNS message starting at its header.
pub fn parse_message(data: &[u8]) -> Result<DnsMessage, PdnsError> {
    if data.len() < HEADER_SIZE {
        return Err(parse_error(0, "truncated header"));
    }

    let id = u16::from_be_bytes([data[0], data[1]]);
    let flags = u16::from_be_bytes([data[2], data[3]]);
    let qdcount = u16::from_be_bytes([data[4], data[5]]) as usize;
    let ancount = u16::from_be_bytes([data[6], data[7]]) as usize;
    let nscount = u16::from_be_bytes([data[8], data[9]]) as usize;
    let arcount = u16::from_be_bytes([data[10], data[11]]) as usize;

    let mut offset = HEADER_SIZE;

    let mut questions = Vec::with_capacity(qdcount.min(MAX_SECTION_PREALLOC));
    for _ in 0..qdcount {
        let (name, after) = read_name(data, offset)?;
        if after + 4 > data.len() {
            return Err(parse_error(after, "truncated question"));
        }
        questions.push(Question {
            name,
            rtype: RrType::from_u16(u16::from_be_bytes([data[after], data[after + 1]])),
            class: u16::from_be_bytes([data[after + 2], data[after + 3]]),
        });
        offset = after + 4;
    }

    let mut sections = [
        (ancount, Vec::with_capacity(ancount.min(MAX_SECTION_PREALLOC))),
        (nscount, Vec::with_capacity(nscount.min(MAX_SECTION_PREALLOC))),
        (arcount, Vec::with_capacity(arcount.min(MAX_SECTION_PREALLOC))),
    ];
    for (count, records) in sections.iter_mut() {
        for _ in 0..*count {
            let (record, after) = read_record(data, offset)?;
            records.push(record);
            offset = after;
        }
    }
    let [(_, answers), (_, authorities), (_, additionals)] = sections;

    Ok(DnsMessage {
        id,
        response: flags >> 15 & 1 == 1,
        opcode: (flags >> 11 & 0x0F) as u8,
        authoritative: flags >> 10 & 1 == 1,
        truncated: flags >> 9 & 1 == 1,
        recursion_desired: flags >> 8 & 1 == 1,
        recursion_available: flags >> 7 & 1 == 1,
        rcode: Rcode::from_u8((flags & 0x0F) as u8),
        questions,
        answers,
        authorities,
        additionals,
    })
}

fn parse_error(offset: usize, detail: &str) -> PdnsError {
    PdnsError::DnsParse {
        offset,
        detail: detail.to_string(),
    }
}

/// Read one resource record; returns the record and the offset past it.
fn read_record(data: &[u8], offset: usize) -> Result<(Record, usize), PdnsError> {
    let (name, mut offset) = read_name(data, offset)?;
    if offset + 10 > data.len() {
        return Err(parse_error(offset, "truncated record header"));
    }
    let rtype = RrType::from_u16(u16::from_be_bytes([data[offset], data[offset + 1]]));
    let class = u16::from_be_bytes([data[offset + 2], data[offset + 3]]);
    let ttl = u32::from_be_bytes([
        data[offset + 4],
        data[offset + 5],
        data[offset + 6],
        data[offset + 7],
    ]);
    let rdlength = u16::from_be_bytes([data[offset + 8], data[offset + 9]]) as usize;
    offset += 10;
    if offset + rdlength > data.len() {
        return Err(parse_error(offset, "truncated rdata"));
    }

    let rdata = read_rdata(data, offset, rdlength, rtype)?;
    Ok((
        Record {
            name,
            rtype,
            class,
            ttl,
            rdata,
        },
        offset + rdlength,
    ))
}

fn read_rdata(
    data: &[u8],
    offset: usize,
    rdlength: usize,
    rtype: RrType,
) -> Result<RData, PdnsError> {
    let rd = &data[offset..offset + rdlength];
    match rtype {
        RrType::A => {
            let octets: [u8; 4] = rd
                .try_into()
                .map_err(|_| parse_error(offset, "A rdata is not 4 bytes"))?;
            Ok(RData::A(Ipv4Addr::from(octets)))
        }
        RrType::Aaaa => {
            let octets: [u8; 16] = rd
                .try_into()
                .map_err(|_| parse_error(offset, "AAAA rdata is not 16 bytes"))?;
            Ok(RData::Aaaa(Ipv6Addr::from(octets)))
        }
        // Name-valued types may use compression pointers into the whole
        // message, so they read against `data`, not just the rdata slice.
        RrType::Cname => Ok(RData::Cname(read_name(data, offset)?.0)),
        RrType::Ns => Ok(RData::Ns(read_name(data, offset)?.0)),
        RrType::Ptr => Ok(RData::Ptr(read_name(data, offset)?.0)),
        RrType::Mx => {
            if rdlength < 3 {
                return Err(parse_error(offset, "MX rdata too short"));
            }
            Ok(RData::Mx {
                preference: u16::from_be_bytes([rd[0], rd[1]]),
                exchange: read_name(data, offset + 2)?.0,
            })
        }
        RrType::Txt => {
            let mut strings = Vec::new();
            let mut pos = 0usize;
            while pos < rd.len() {
                let len = rd[pos] as usize;
                pos += 1;
                if pos + len > rd.len() {
                    return Err(parse_error(offset + pos, "truncated TXT string"));
                }
                strings.push(String::from_utf8_lossy(&rd[pos..pos + len]).into_owned());
                pos += len;
            }
            Ok(RData::Txt(strings))
        }
        RrType::Soa => {
            let (mname, after_mname) = read_name(data, offset)?;
            let (rname, after_rname) = read_name(data, after_mname)?;
            if after_rname + 20 > data.len() || after_rname + 20 > offset + rdlength {
                return Err(parse_error(after_rname, "truncated SOA fields"));
            }
            let be32 = |at: usize| {
                u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
            };
            Ok(RData::Soa {
                mname,
                rname,
                serial: be32(after_rname),
                refresh: be32(after_rname + 4),
                retry: be32(after_rname + 8),
                expire: be32(after_rname + 12),
                minimum: be32(after_rname + 16),
            })
        }
        RrType::Opt => Ok(RData::Opt),
        RrType::Unknown(_) => {
            let mut hex = String::with_capacity(rd.len() * 2);
            for byte in rd {
                hex.push_str(&format!("{byte:02x}"));
            }
            Ok(RData::Opaque(hex))
        }
    }
}

/// Decompress a name at `offset`, following RFC 1035 §4.1.4 pointers.
///
/// Returns the dotted name (trailing dot, `.` for the root) and the offset
/// just past the name field — past the first pointer when compression was
/// used. Labels are decoded lossily; captured traffic is not trusted to be
/// valid UTF-8.
fn read_name(data: &[u8], start: usize) -> Result<(String, usize), PdnsError> {
    let mut name = String::new();
    let mut offset = start;
    let mut resume = None;
    let mut hops = 0usize;

    loop {
        let len = *data
            .get(offset)
            .ok_or_else(|| parse_error(offset, "truncated name"))? as usize;

        if len == 0 {
            offset += 1;
            break;
        }

        if len & 0xC0 == 0xC0 {
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err(parse_error(offset, "compression pointer loop"));
            }
            let low = *data
                .get(offset + 1)
                .ok_or_else(|| parse_error(offset, "truncated compression pointer"))?;
            if resume.is_none() {
                resume = Some(offset + 2);
            }
            offset = (len & 0x3F) << 8 | low as usize;
            continue;
        }

        if len > MAX_LABEL_LENGTH {
            return Err(parse_error(offset, "label exceeds 63 bytes"));
        }
        offset += 1;
        let label = data
            .get(offset..offset + len)
            .ok_or_else(|| parse_error(offset, "truncated label"))?;
        name.push_str(&String::from_utf8_lossy(label));
        name.push('.');
        offset += len;
    }

    if name.is_empty() {
        name.push('.');
    }
    Ok((name, resume.unwrap_or(offset)))
}

// ===========================================================================
// Unit tests
// ===========================================================================
