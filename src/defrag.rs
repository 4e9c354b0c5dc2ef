// IP fragment reassembly, RFC 791 / RFC 8200.
//
// Each family gets an owned table keyed by the datagram identity tuple; the
// table holds a contiguity interval list per entry so completion is a single
// comparison. Tables are plain structs driven by their service loop thread;
// nothing here is shared or locked. Partial state is garbage-collected after
// `gc_time` of inactivity, swept on a `gc_time / 4` tick.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, tick, Receiver, Sender};
use rustc_hash::FxHashMap;

use crate::stats::PipelineStats;

/// IPv4 bounds the whole datagram at 65535 bytes; reassembly past that is
/// hostile or broken traffic either way.
pub const MAX_DATAGRAM_LEN: usize = 65_535;

/// What to do when a fragment overlaps bytes that already arrived.
///
/// Overlaps are a known evasion vector; observation favors `LastWins`
/// (matches common stacks), hardened deployments may prefer the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    /// Later bytes overwrite earlier ones on the overlap.
    #[default]
    LastWins,
    /// Bytes already received are kept.
    FirstWins,
    /// A conflicting overlap (differing bytes) destroys the whole entry.
    DropConflict,
}

// ---------------------------------------------------------------------------
// Fragment / datagram types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Ipv4Fragment {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    pub identification: u16,
    /// Offset in bytes.
    pub offset: u16,
    pub more_fragments: bool,
    pub payload: Vec<u8>,
    pub timestamp: u64,
}

#[derive(Debug, Clone)]
pub struct Ipv4Datagram {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    pub payload: Vec<u8>,
    pub timestamp: u64,
}

#[derive(Debug, Clone)]
pub struct Ipv6Fragment {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    /// Protocol of the reassembled payload, from the Fragment header.
    pub next_header: u8,
    pub identification: u32,
    pub offset: u16,
    pub more_fragments: bool,
    pub payload: Vec<u8>,
    pub timestamp: u64,
}

#[derive(Debug, Clone)]
pub struct Ipv6Datagram {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub next_header: u8,
    pub payload: Vec<u8>,
    pub timestamp: u64,
}

// ---------------------------------------------------------------------------
// Reassembly entry
// ---------------------------------------------------------------------------

enum Insert {
    Incomplete,
    Complete,
    /// Malformed or conflicting; the caller destroys the entry.
    Discard,
}

struct FragEntry {
    buf: Vec<u8>,
    /// Sorted, coalesced, half-open byte ranges received so far.
    ranges: Vec<(usize, usize)>,
    /// Known once the fragment with more-fragments clear arrives.
    total_len: Option<usize>,
    last_activity: Instant,
    /// Capture timestamp of the most recent fragment.
    timestamp: u64,
}

impl FragEntry {
    fn new(now: Instant) -> Self {
        Self {
            buf: Vec::new(),
            ranges: Vec::new(),
            total_len: None,
            last_activity: now,
            timestamp: 0,
        }
    }

    fn insert(
        &mut self,
        offset: usize,
        payload: &[u8],
        more_fragments: bool,
        policy: OverlapPolicy,
        now: Instant,
        timestamp: u64,
    ) -> Insert {
        let end = offset + payload.len();
        if end > MAX_DATAGRAM_LEN {
            return Insert::Discard;
        }
        if let Some(total) = self.total_len {
            // Fragments past the established end contradict the final one.
            if end > total {
                return Insert::Discard;
            }
        }
        if !more_fragments {
            match self.total_len {
                Some(total) if total != end => return Insert::Discard,
                _ => {}
            }
            if self.ranges.last().is_some_and(|&(_, have)| have > end) {
                return Insert::Discard;
            }
            self.total_len = Some(end);
        }

        if !payload.is_empty() {
            if self.buf.len() < end {
                self.buf.resize(end, 0);
            }
            if !self.write_payload(offset, payload, policy) {
                return Insert::Discard;
            }
            self.merge_range(offset, end);
        }

        self.last_activity = now;
        self.timestamp = timestamp;

        let complete = match self.total_len {
            Some(0) => true,
            Some(total) => self.ranges == [(0, total)],
            None => false,
        };
        if complete {
            Insert::Complete
        } else {
            Insert::Incomplete
        }
    }

    /// Copy `payload` at `offset` honoring the overlap policy. Returns false
    /// when a conflicting overlap must destroy the entry.
    fn write_payload(&mut self, offset: usize, payload: &[u8], policy: OverlapPolicy) -> bool {
        let end = offset + payload.len();
        match policy {
            OverlapPolicy::LastWins => {
                self.buf[offset..end].copy_from_slice(payload);
            }
            OverlapPolicy::FirstWins => {
                let covered: Vec<(usize, usize)> = self.overlaps(offset, end);
                let mut pos = offset;
                for (s, e) in covered.iter().copied().chain([(end, end)]) {
                    if pos < s {
                        self.buf[pos..s].copy_from_slice(&payload[pos - offset..s - offset]);
                    }
                    pos = pos.max(e);
                }
            }
            OverlapPolicy::DropConflict => {
                for (s, e) in self.overlaps(offset, end) {
                    if self.buf[s..e] != payload[s - offset..e - offset] {
                        return false;
                    }
                }
                self.buf[offset..end].copy_from_slice(payload);
            }
        }
        true
    }

    /// Intersections of `[start, end)` with the received ranges.
    fn overlaps(&self, start: usize, end: usize) -> Vec<(usize, usize)> {
        self.ranges
            .iter()
            .filter_map(|&(s, e)| {
                let lo = s.max(start);
                let hi = e.min(end);
                (lo < hi).then_some((lo, hi))
            })
            .collect()
    }

    fn merge_range(&mut self, start: usize, end: usize) {
        self.ranges.push((start, end));
        self.ranges.sort_unstable();
        let mut merged: Vec<(usize, usize)> = Vec::with_capacity(self.ranges.len());
        for &(s, e) in &self.ranges {
            match merged.last_mut() {
                Some(last) if s <= last.1 => last.1 = last.1.max(e),
                _ => merged.push((s, e)),
            }
        }
        self.ranges = merged;
    }

    fn into_payload(mut self) -> Vec<u8> {
        let total = self.total_len.unwrap_or(self.buf.len());
        self.buf.truncate(total);
        self.buf
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Ipv4FragKey {
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: u8,
    identification: u16,
}

pub struct Ipv4FragTable {
    entries: FxHashMap<Ipv4FragKey, FragEntry>,
    policy: OverlapPolicy,
}

impl Ipv4FragTable {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            entries: FxHashMap::default(),
            policy,
        }
    }

    /// Insert one fragment; returns the reassembled datagram on completion.
    pub fn insert(&mut self, frag: Ipv4Fragment, now: Instant) -> Option<Ipv4Datagram> {
        let key = Ipv4FragKey {
            src: frag.src,
            dst: frag.dst,
            protocol: frag.protocol,
            identification: frag.identification,
        };
        let entry = self.entries.entry(key).or_insert_with(|| FragEntry::new(now));
        match entry.insert(
            frag.offset as usize,
            &frag.payload,
            frag.more_fragments,
            self.policy,
            now,
            frag.timestamp,
        ) {
            Insert::Incomplete => None,
            Insert::Discard => {
                self.entries.remove(&key);
                None
            }
            Insert::Complete => {
                let entry = self.entries.remove(&key).expect("entry just inserted");
                Some(Ipv4Datagram {
                    src: frag.src,
                    dst: frag.dst,
                    protocol: frag.protocol,
                    timestamp: entry.timestamp,
                    payload: entry.into_payload(),
                })
            }
        }
    }

    /// Evict entries idle longer than `gc_time`; returns the eviction count.
    pub fn sweep(&mut self, now: Instant, gc_time: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.last_activity) <= gc_time);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Ipv6FragKey {
    src: Ipv6Addr,
    dst: Ipv6Addr,
    identification: u32,
}

pub struct Ipv6FragTable {
    entries: FxHashMap<Ipv6FragKey, (u8, FragEntry)>,
    policy: OverlapPolicy,
}

impl Ipv6FragTable {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            entries: FxHashMap::default(),
            policy,
        }
    }

    pub fn insert(&mut self, frag: Ipv6Fragment, now: Instant) -> Option<Ipv6Datagram> {
        let key = Ipv6FragKey {
            src: frag.src,
            dst: frag.dst,
            identification: frag.identification,
        };
        let (_, entry) = self
            .entries
            .entry(key)
            .or_insert_with(|| (frag.next_header, FragEntry::new(now)));
        match entry.insert(
            frag.offset as usize,
            &frag.payload,
            frag.more_fragments,
            self.policy,
            now,
            frag.timestamp,
        ) {
            Insert::Incomplete => None,
            Insert::Discard => {
                self.entries.remove(&key);
                None
            }
            Insert::Complete => {
                let (next_header, entry) = self.entries.remove(&key).expect("entry just inserted");
                Some(Ipv6Datagram {
                    src: frag.src,
                    dst: frag.dst,
                    next_header,
                    timestamp: entry.timestamp,
                    payload: entry.into_payload(),
                })
            }
        }
    }

    pub fn sweep(&mut self, now: Instant, gc_time: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, (_, e)| now.saturating_duration_since(e.last_activity) <= gc_time);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Service loops
// ---------------------------------------------------------------------------

fn gc_interval(gc_time: Duration) -> Duration {
    (gc_time / 4).max(Duration::from_millis(100))
}

pub fn ipv4_defragger(
    fragments: Receiver<Ipv4Fragment>,
    datagrams: Sender<Ipv4Datagram>,
    gc_time: Duration,
    policy: OverlapPolicy,
    stats: Arc<PipelineStats>,
    done: Receiver<()>,
) {
    let mut table = Ipv4FragTable::new(policy);
    let gc_tick = tick(gc_interval(gc_time));
    loop {
        select! {
            recv(fragments) -> frag => {
                let Ok(frag) = frag else { return };
                if let Some(datagram) = table.insert(frag, Instant::now()) {
                    select! {
                        send(datagrams, datagram) -> res => if res.is_err() { return },
                        recv(done) -> _ => return,
                    }
                }
            }
            recv(gc_tick) -> _ => {
                let evicted = table.sweep(Instant::now(), gc_time);
                if evicted > 0 {
                    log::debug!("ipv4 defragger evicted {evicted} stale entries");
                    stats.frag_evictions.fetch_add(evicted as u64, Ordering::Relaxed);
                }
            }
            recv(done) -> _ => return,
        }
    }
}

pub fn ipv6_defragger(
    fragments: Receiver<Ipv6Fragment>,
    datagrams: Sender<Ipv6Datagram>,
    gc_time: Duration,
    policy: OverlapPolicy,
    stats: Arc<PipelineStats>,
    done: Receiver<()>,
) {
    let mut table = Ipv6FragTable::new(policy);
    let gc_tick = tick(gc_interval(gc_time));
    loop {
        select! {
            recv(fragments) -> frag => {
                let Ok(frag) = frag else { return };
                if let Some(datagram) = table.insert(frag, Instant::now()) {
                    select! {
                        send(datagrams, datagram) -> res => if res.is_err() { return },
                        recv(done) -> _ => return,
                    }
                }
            }
            recv(gc_tick) -> _ => {
                let evicted = table.sweep(Instant::now(), gc_time);
                if evicted > 0 {
                    log::debug!("ipv6 defragger evicted {evicted} stale entries");
                    stats.frag_evictions.fetch_add(evicted as u64, Ordering::Relaxed);
                }
            }
            recv(done) -> _ => return,
        }
    }
}

// ===========================================================================
// Unit tests
// ===========================================================================
