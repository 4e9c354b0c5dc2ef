// Decoder worker: raw frames in, DNS results out.
//
// Each worker consumes from the shared frame intake, peels the stack with
// `packet`, and either decodes DNS in place (UDP) or routes the unit onward:
// IP fragments to the defraggers, TCP segments to their assembler shard.
// Reassembled datagrams come back on return channels and re-enter the same
// transport dispatch. Anything that fails to parse is a silent drop recorded
// in the counters.

use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::{select, Receiver, Sender};
use serde::Serialize;

use crate::defrag::{Ipv4Datagram, Ipv4Fragment, Ipv6Datagram, Ipv6Fragment};
use crate::dns;
use crate::packet::{self, Frame, IpPacket, PROTO_TCP, PROTO_UDP};
use crate::stats::PipelineStats;
use crate::tcp::{shard_for, FlowKey, TcpSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// One decoded DNS message with its network context.
#[derive(Debug, Clone, Serialize)]
pub struct DnsResult {
    /// Capture timestamp, microseconds since the Unix epoch.
    pub timestamp: u64,
    pub dns: dns::DnsMessage,
    pub ip_version: u8,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub protocol: Transport,
    /// Length of the DNS message bytes, not of the frame.
    pub packet_length: u16,
}

/// One worker of the decoder pool. All endpoints are clones of the shared
/// channel set; `run` is the thread body.
pub struct PacketDecoder {
    pub port: u16,
    pub frames: Receiver<Frame>,
    pub ip4_fragments: Sender<Ipv4Fragment>,
    pub ip6_fragments: Sender<Ipv6Fragment>,
    pub ip4_datagrams: Receiver<Ipv4Datagram>,
    pub ip6_datagrams: Receiver<Ipv6Datagram>,
    pub tcp_segments: Vec<Sender<TcpSegment>>,
    pub results: Sender<DnsResult>,
    pub stats: Arc<PipelineStats>,
    pub done: Receiver<()>,
}

impl PacketDecoder {
    pub fn run(&self) {
        loop {
            let keep_going = select! {
                recv(self.frames) -> frame => match frame {
                    Ok(frame) => self.handle_frame(frame),
                    Err(_) => false,
                },
                recv(self.ip4_datagrams) -> datagram => match datagram {
                    Ok(d) => self.dispatch(IpAddr::V4(d.src), IpAddr::V4(d.dst), d.protocol, d.payload, d.timestamp),
                    Err(_) => false,
                },
                recv(self.ip6_datagrams) -> datagram => match datagram {
                    Ok(d) => self.handle_ipv6_datagram(d),
                    Err(_) => false,
                },
                recv(self.done) -> _ => false,
            };
            if !keep_going {
                return;
            }
        }
    }

    fn handle_frame(&self, frame: Frame) -> bool {
        self.stats.frames.fetch_add(1, Ordering::Relaxed);
        let Some(ip) = packet::parse_frame(&frame.data, frame.link) else {
            self.stats.parse_drops.fetch_add(1, Ordering::Relaxed);
            return true;
        };
        match ip {
            IpPacket::V4(p) if p.is_fragment() => self.send_to(
                &self.ip4_fragments,
                Ipv4Fragment {
                    src: p.src,
                    dst: p.dst,
                    protocol: p.protocol,
                    identification: p.identification,
                    offset: p.fragment_offset,
                    more_fragments: p.more_fragments,
                    payload: p.payload,
                    timestamp: frame.timestamp,
                },
            ),
            IpPacket::V4(p) => self.dispatch(
                IpAddr::V4(p.src),
                IpAddr::V4(p.dst),
                p.protocol,
                p.payload,
                frame.timestamp,
            ),
            IpPacket::V6(p) => match p.fragment {
                Some(meta) => self.send_to(
                    &self.ip6_fragments,
                    Ipv6Fragment {
                        src: p.src,
                        dst: p.dst,
                        next_header: p.next_header,
                        identification: meta.identification,
                        offset: meta.offset,
                        more_fragments: meta.more_fragments,
                        payload: p.payload,
                        timestamp: frame.timestamp,
                    },
                ),
                None => self.dispatch(
                    IpAddr::V6(p.src),
                    IpAddr::V6(p.dst),
                    p.next_header,
                    p.payload,
                    frame.timestamp,
                ),
            },
        }
    }

    /// A reassembled IPv6 payload may still open with extension headers.
    fn handle_ipv6_datagram(&self, datagram: Ipv6Datagram) -> bool {
        let (protocol, offset) =
            packet::skip_extension_headers(datagram.next_header, &datagram.payload);
        self.dispatch(
            IpAddr::V6(datagram.src),
            IpAddr::V6(datagram.dst),
            protocol,
            datagram.payload[offset..].to_vec(),
            datagram.timestamp,
        )
    }

    /// Transport dispatch; both fresh packets and reassembled datagrams land
    /// here.
    fn dispatch(
        &self,
        src_ip: IpAddr,
        dst_ip: IpAddr,
        protocol: u8,
        payload: Vec<u8>,
        timestamp: u64,
    ) -> bool {
        match protocol {
            PROTO_UDP => {
                let Some(udp) = packet::parse_udp(&payload) else {
                    self.stats.parse_drops.fetch_add(1, Ordering::Relaxed);
                    return true;
                };
                if udp.src_port != self.port && udp.dst_port != self.port {
                    return true;
                }
                self.emit(udp.payload, src_ip, dst_ip, Transport::Udp, timestamp)
            }
            PROTO_TCP => {
                let Some(tcp) = packet::parse_tcp(&payload) else {
                    self.stats.parse_drops.fetch_add(1, Ordering::Relaxed);
                    return true;
                };
                let flow = FlowKey {
                    src_ip,
                    src_port: tcp.src_port,
                    dst_ip,
                    dst_port: tcp.dst_port,
                };
                let shard = shard_for(&flow, self.tcp_segments.len());
                self.send_to(
                    &self.tcp_segments[shard],
                    TcpSegment {
                        flow,
                        sequence: tcp.sequence,
                        syn: tcp.syn,
                        fin: tcp.fin,
                        rst: tcp.rst,
                        payload: tcp.payload,
                        timestamp,
                    },
                )
            }
            _ => true,
        }
    }

    /// Decode a DNS payload and push the result downstream.
    fn emit(
        &self,
        payload: Vec<u8>,
        src_ip: IpAddr,
        dst_ip: IpAddr,
        protocol: Transport,
        timestamp: u64,
    ) -> bool {
        let message = match dns::parse_message(&payload) {
            Ok(message) => message,
            Err(err) => {
                self.stats.dns_failures.fetch_add(1, Ordering::Relaxed);
                log::trace!("dns decode failed: {err}");
                return true;
            }
        };
        self.stats.dns_messages.fetch_add(1, Ordering::Relaxed);
        let result = DnsResult {
            timestamp,
            dns: message,
            ip_version: if src_ip.is_ipv4() { 4 } else { 6 },
            src_ip,
            dst_ip,
            protocol,
            packet_length: payload.len() as u16,
        };
        self.send_to(&self.results, result)
    }

    /// Blocking send composed with the done signal.
    fn send_to<T>(&self, tx: &Sender<T>, value: T) -> bool {
        select! {
            send(tx, value) -> res => res.is_ok(),
            recv(self.done) -> _ => false,
        }
    }
}
