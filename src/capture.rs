// Capture sources — libpcap-backed live and offline frame streams.
//
// The pipeline only sees the `FrameSource` trait: a pull interface yielding
// timestamped link-layer frames. BPF filtering is attached here, at the
// source. Frame bytes are copied out of the pcap buffer immediately; the
// borrow ends at the next read.

use std::path::Path;

use crate::error::PdnsError;
use crate::packet::{Frame, LinkType};

// Data-link type values as reported by libpcap.
const DLT_EN10MB: i32 = 1;
const DLT_RAW_BSD: i32 = 12;
const DLT_RAW: i32 = 101;
const DLT_LINUX_SLL: i32 = 113;

/// Read timeout for live handles, so shutdown is observed between packets.
const READ_TIMEOUT_MS: i32 = 500;

const SNAPLEN: i32 = 65_535;

/// Kernel buffer size used when the enlarged ring is requested.
const RING_BUFFER_BYTES: i32 = 64 * 1024 * 1024;

/// Outcome of one poll on a frame source.
pub enum ReadOutcome {
    Frame(Frame),
    /// Nothing arrived within the read timeout; poll again.
    Timeout,
    /// The source is exhausted (offline) or closed.
    EndOfStream,
}

/// Abstract stream of timestamped link-layer frames.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<ReadOutcome, PdnsError>;
    fn link_type(&self) -> LinkType;
    /// Release the source; live handles log kernel drop counters here.
    fn close(&mut self) {}
}

fn map_datalink(value: i32) -> Result<LinkType, PdnsError> {
    match value {
        DLT_EN10MB => Ok(LinkType::Ethernet),
        DLT_LINUX_SLL => Ok(LinkType::CookedLinux),
        DLT_RAW | DLT_RAW_BSD => Ok(LinkType::Raw),
        other => Err(PdnsError::Capture(format!(
            "unsupported data-link type {other}"
        ))),
    }
}

fn timestamp_micros(ts: &libc::timeval) -> u64 {
    (ts.tv_sec as u64) * 1_000_000 + ts.tv_usec as u64
}

// ---------------------------------------------------------------------------
// Live capture
// ---------------------------------------------------------------------------

pub struct LiveSource {
    handle: pcap::Capture<pcap::Active>,
    link: LinkType,
}

impl LiveSource {
    /// Open `device` in promiscuous mode and attach `filter`.
    ///
    /// `ring_buffer` requests an enlarged kernel buffer with immediate
    /// delivery — libpcap serves both from its memory-mapped ring.
    pub fn open(device: &str, filter: &str, ring_buffer: bool) -> Result<Self, PdnsError> {
        let mut inactive = pcap::Capture::from_device(device)
            .map_err(|e| PdnsError::Capture(format!("device {device}: {e}")))?
            .promisc(true)
            .snaplen(SNAPLEN)
            .timeout(READ_TIMEOUT_MS);
        if ring_buffer {
            inactive = inactive.buffer_size(RING_BUFFER_BYTES).immediate_mode(true);
        }
        let mut handle = inactive
            .open()
            .map_err(|e| PdnsError::Capture(format!("open {device}: {e}")))?;
        handle
            .filter(filter, true)
            .map_err(|e| PdnsError::Capture(format!("filter {filter:?}: {e}")))?;
        let link = map_datalink(handle.get_datalink().0)?;
        log::info!("capturing on device {device}, filter {filter:?}");
        Ok(Self { handle, link })
    }
}

impl FrameSource for LiveSource {
    fn read_frame(&mut self) -> Result<ReadOutcome, PdnsError> {
        match self.handle.next_packet() {
            Ok(packet) => Ok(ReadOutcome::Frame(Frame {
                timestamp: timestamp_micros(&packet.header.ts),
                data: packet.data.to_vec(),
                link: self.link,
            })),
            Err(pcap::Error::TimeoutExpired) => Ok(ReadOutcome::Timeout),
            Err(pcap::Error::NoMorePackets) => Ok(ReadOutcome::EndOfStream),
            Err(e) => Err(PdnsError::Capture(format!("live read: {e}"))),
        }
    }

    fn link_type(&self) -> LinkType {
        self.link
    }

    fn close(&mut self) {
        if let Ok(stat) = self.handle.stats() {
            log::info!(
                "capture counters: {} received, {} dropped by kernel, {} dropped by interface",
                stat.received,
                stat.dropped,
                stat.if_dropped,
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Offline capture
// ---------------------------------------------------------------------------

pub struct FileSource {
    handle: pcap::Capture<pcap::Offline>,
    link: LinkType,
}

impl FileSource {
    pub fn open(path: &Path, filter: &str) -> Result<Self, PdnsError> {
        let mut handle = pcap::Capture::from_file(path)
            .map_err(|e| PdnsError::Capture(format!("file {}: {e}", path.display())))?;
        handle
            .filter(filter, true)
            .map_err(|e| PdnsError::Capture(format!("filter {filter:?}: {e}")))?;
        let link = map_datalink(handle.get_datalink().0)?;
        log::info!("reading capture file {}, filter {filter:?}", path.display());
        Ok(Self { handle, link })
    }
}

impl FrameSource for FileSource {
    fn read_frame(&mut self) -> Result<ReadOutcome, PdnsError> {
        match self.handle.next_packet() {
            Ok(packet) => Ok(ReadOutcome::Frame(Frame {
                timestamp: timestamp_micros(&packet.header.ts),
                data: packet.data.to_vec(),
                link: self.link,
            })),
            Err(pcap::Error::NoMorePackets) => Ok(ReadOutcome::EndOfStream),
            // A damaged tail is end-of-stream for an offline read.
            Err(e) => {
                log::warn!("capture file read: {e}");
                Ok(ReadOutcome::EndOfStream)
            }
        }
    }

    fn link_type(&self) -> LinkType {
        self.link
    }
}
