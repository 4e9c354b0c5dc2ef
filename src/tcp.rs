// TCP stream assembly and DNS-over-TCP framing.
//
// Flows are sharded by a stable hash of the directional 4-tuple; each shard
// thread owns a `TcpFlowTable` and never shares it. A flow buffers
// out-of-order segments until the sequence gap fills, then feeds contiguous
// bytes through the RFC 7766 length-prefix framer. The shard decodes each
// complete message and emits the `DnsResult` itself: one emitter per flow is
// what keeps a flow's messages in message order.
//
// Flow teardown: RST, in-order FIN, GC after `gc_time` idle, framing or
// decode corruption, or the per-flow buffer bound, whichever comes first.

use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, tick, Receiver, Sender};
use rustc_hash::{FxHashMap, FxHasher};

use crate::decode::{DnsResult, Transport};
use crate::dns;
use crate::stats::PipelineStats;

/// Per-flow cap on buffered bytes (out-of-order segments plus undecoded
/// stream prefix). A flow exceeding it is hostile or not DNS.
pub const MAX_FLOW_BUFFER: usize = 512 * 1024;

/// A length prefix below the DNS header size cannot start a valid message.
const MIN_DNS_MESSAGE: usize = 12;

/// Directional TCP flow identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn ip_version(&self) -> u8 {
        match self.src_ip {
            IpAddr::V4(_) => 4,
            IpAddr::V6(_) => 6,
        }
    }
}

/// Stable shard assignment for the life of the process.
pub fn shard_for(key: &FlowKey, shards: usize) -> usize {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

#[derive(Debug, Clone)]
pub struct TcpSegment {
    pub flow: FlowKey,
    pub sequence: u32,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub payload: Vec<u8>,
    pub timestamp: u64,
}

/// One complete length-framed DNS message lifted out of a flow's stream,
/// not yet decoded.
#[derive(Debug, Clone)]
pub struct TcpStreamData {
    pub flow: FlowKey,
    pub payload: Vec<u8>,
    pub timestamp: u64,
}

// ---------------------------------------------------------------------------
// Per-flow state
// ---------------------------------------------------------------------------

struct Flow {
    /// Next expected sequence number (start of the stream hole).
    expected: u32,
    /// Out-of-order segments by absolute sequence number.
    pending: FxHashMap<u32, Vec<u8>>,
    pending_bytes: usize,
    /// Contiguous bytes not yet consumed by the framer.
    stream: Vec<u8>,
    /// Stream position of an observed FIN, once seen.
    fin_seq: Option<u32>,
    last_activity: Instant,
    /// Capture timestamp of the most recent segment.
    timestamp: u64,
}

impl Flow {
    fn new(expected: u32, now: Instant) -> Self {
        Self {
            expected,
            pending: FxHashMap::default(),
            pending_bytes: 0,
            stream: Vec::new(),
            fin_seq: None,
            last_activity: now,
            timestamp: 0,
        }
    }

    fn buffered(&self) -> usize {
        self.pending_bytes + self.stream.len()
    }

    /// Signed distance of `seq` from the reassembly point, wrap-safe.
    fn relative(&self, seq: u32) -> i32 {
        seq.wrapping_sub(self.expected) as i32
    }

    fn add_segment(&mut self, seq: u32, payload: Vec<u8>) {
        let rel = self.relative(seq);
        if rel == 0 {
            self.append(&payload);
        } else if rel < 0 {
            // Retransmission overlapping consumed bytes: keep the new tail.
            let skip = rel.unsigned_abs() as usize;
            if skip < payload.len() {
                self.append(&payload[skip..]);
            }
        } else if !self.pending.contains_key(&seq) {
            self.pending_bytes += payload.len();
            self.pending.insert(seq, payload);
        }
    }

    fn append(&mut self, bytes: &[u8]) {
        self.expected = self.expected.wrapping_add(bytes.len() as u32);
        self.stream.extend_from_slice(bytes);
    }

    /// Pull newly contiguous segments out of the pending buffer.
    fn drain_pending(&mut self) {
        loop {
            let Some(seq) = self
                .pending
                .keys()
                .copied()
                .min_by_key(|&s| s.wrapping_sub(self.expected) as i32)
            else {
                return;
            };
            let rel = self.relative(seq);
            if rel > 0 {
                return;
            }
            let payload = self.pending.remove(&seq).expect("key from iteration");
            self.pending_bytes -= payload.len();
            let skip = rel.unsigned_abs() as usize;
            if skip < payload.len() {
                self.append(&payload[skip..]);
            }
        }
    }

    /// Consume complete length-prefixed messages from the stream prefix.
    /// Returns false on framing corruption.
    fn frame_messages(&mut self, key: &FlowKey, out: &mut Vec<TcpStreamData>) -> bool {
        while self.stream.len() >= 2 {
            let msg_len = u16::from_be_bytes([self.stream[0], self.stream[1]]) as usize;
            if msg_len < MIN_DNS_MESSAGE {
                return false;
            }
            if self.stream.len() < 2 + msg_len {
                break;
            }
            let payload = self.stream[2..2 + msg_len].to_vec();
            self.stream.drain(..2 + msg_len);
            out.push(TcpStreamData {
                flow: *key,
                payload,
                timestamp: self.timestamp,
            });
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Flow table
// ---------------------------------------------------------------------------

pub struct TcpFlowTable {
    flows: FxHashMap<FlowKey, Flow>,
    port: u16,
}

impl TcpFlowTable {
    pub fn new(port: u16) -> Self {
        Self {
            flows: FxHashMap::default(),
            port,
        }
    }

    /// Feed one segment. Returns the complete DNS messages that became
    /// available and whether the flow was torn down abnormally.
    pub fn insert(&mut self, seg: TcpSegment, now: Instant) -> (Vec<TcpStreamData>, bool) {
        let mut messages = Vec::new();

        if seg.rst {
            return (messages, self.flows.remove(&seg.flow).is_some());
        }

        if !self.flows.contains_key(&seg.flow) {
            // Port policy: flows touching neither endpoint port are not ours.
            if seg.flow.src_port != self.port && seg.flow.dst_port != self.port {
                return (messages, false);
            }
            let isn = seg.sequence.wrapping_add(u32::from(seg.syn));
            self.flows.insert(seg.flow, Flow::new(isn, now));
        }

        let flow = self.flows.get_mut(&seg.flow).expect("flow just ensured");
        flow.last_activity = now;
        flow.timestamp = seg.timestamp;

        // SYN consumes one sequence number; payload starts after it.
        let data_seq = seg.sequence.wrapping_add(u32::from(seg.syn));
        if seg.fin {
            flow.fin_seq = Some(data_seq.wrapping_add(seg.payload.len() as u32));
        }

        let mut dead = false;
        if !seg.payload.is_empty() {
            flow.add_segment(data_seq, seg.payload);
            if flow.buffered() > MAX_FLOW_BUFFER {
                dead = true;
            } else {
                flow.drain_pending();
                dead = !flow.frame_messages(&seg.flow, &mut messages);
            }
        }

        if dead {
            self.flows.remove(&seg.flow);
            return (messages, true);
        }
        // In-order FIN with nothing outstanding: orderly close, state gone.
        if flow.fin_seq == Some(flow.expected) && flow.pending.is_empty() {
            self.flows.remove(&seg.flow);
        }
        (messages, false)
    }

    /// Destroy a flow outright (decode corruption observed downstream of
    /// framing). Returns whether it existed.
    pub fn remove_flow(&mut self, key: &FlowKey) -> bool {
        self.flows.remove(key).is_some()
    }

    pub fn sweep(&mut self, now: Instant, gc_time: Duration) -> usize {
        let before = self.flows.len();
        self.flows
            .retain(|_, f| now.saturating_duration_since(f.last_activity) <= gc_time);
        before - self.flows.len()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Service loop
// ---------------------------------------------------------------------------

pub fn tcp_assembler(
    segments: Receiver<TcpSegment>,
    results: Sender<DnsResult>,
    port: u16,
    gc_time: Duration,
    stats: Arc<PipelineStats>,
    done: Receiver<()>,
) {
    let mut table = TcpFlowTable::new(port);
    let gc_tick = tick((gc_time / 4).max(Duration::from_millis(100)));
    loop {
        select! {
            recv(segments) -> seg => {
                let Ok(seg) = seg else { return };
                let (messages, destroyed) = table.insert(seg, Instant::now());
                if destroyed {
                    stats.flow_evictions.fetch_add(1, Ordering::Relaxed);
                }
                for data in messages {
                    match decode_stream_message(&data) {
                        Ok(result) => {
                            stats.dns_messages.fetch_add(1, Ordering::Relaxed);
                            select! {
                                send(results, result) -> res => if res.is_err() { return },
                                recv(done) -> _ => return,
                            }
                        }
                        Err(err) => {
                            // A framed prefix that is not DNS poisons the
                            // whole stream; drop the flow, keep earlier
                            // emissions.
                            log::trace!("dns decode failed on tcp flow: {err}");
                            stats.dns_failures.fetch_add(1, Ordering::Relaxed);
                            if table.remove_flow(&data.flow) {
                                stats.flow_evictions.fetch_add(1, Ordering::Relaxed);
                            }
                            break;
                        }
                    }
                }
            }
            recv(gc_tick) -> _ => {
                let evicted = table.sweep(Instant::now(), gc_time);
                if evicted > 0 {
                    log::debug!("tcp assembler evicted {evicted} idle flows");
                    stats.flow_evictions.fetch_add(evicted as u64, Ordering::Relaxed);
                }
            }
            recv(done) -> _ => return,
        }
    }
}

fn decode_stream_message(data: &TcpStreamData) -> Result<DnsResult, crate::error::PdnsError> {
    let message = dns::parse_message(&data.payload)?;
    Ok(DnsResult {
        timestamp: data.timestamp,
        dns: message,
        ip_version: data.flow.ip_version(),
        src_ip: data.flow.src_ip,
        dst_ip: data.flow.dst_ip,
        protocol: Transport::Tcp,
        packet_length: data.payload.len() as u16,
    })
}

// ===========================================================================
// Unit tests
// ===========================================================================
