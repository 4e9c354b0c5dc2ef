use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::defrag::OverlapPolicy;

#[derive(Parser, Debug)]
#[command(
    name = "passivedns",
    version,
    about = "Passive DNS traffic observer for live interfaces and capture files"
)]
pub struct Cli {
    /// Live capture device (e.g. eth0)
    #[arg(long, conflicts_with = "pcap_file")]
    pub device: Option<String>,

    /// Read frames from a pcap file instead of a live device
    #[arg(long = "file")]
    pub pcap_file: Option<PathBuf>,

    /// Use an enlarged memory-mapped kernel ring for live capture
    #[arg(long)]
    pub ring_buffer: bool,

    /// BPF filter attached to the capture source
    #[arg(long, default_value = "port 53")]
    pub filter: String,

    /// DNS port to track
    #[arg(long, default_value_t = 53, value_parser = validate_port)]
    pub port: u16,

    /// Seconds of inactivity before partial reassembly state is discarded
    #[arg(long = "gc-time", default_value_t = 10.0, value_parser = validate_gc_time)]
    pub gc_time: f64,

    /// Decoder worker threads
    #[arg(long, default_value_t = 2, value_parser = validate_workers)]
    pub packet_workers: usize,

    /// TCP assembler shards
    #[arg(long, default_value_t = 1, value_parser = validate_workers)]
    pub tcp_workers: usize,

    /// Frame intake queue depth
    #[arg(long, default_value_t = 1000, value_parser = validate_depth)]
    pub packet_queue: usize,

    /// Per-shard TCP segment queue depth
    #[arg(long, default_value_t = 500, value_parser = validate_depth)]
    pub tcp_queue: usize,

    /// Fragment intake queue depth (per IP family)
    #[arg(long, default_value_t = 500, value_parser = validate_depth)]
    pub defrag_queue: usize,

    /// Reassembled datagram return queue depth (per IP family)
    #[arg(long, default_value_t = 500, value_parser = validate_depth)]
    pub defrag_return_queue: usize,

    /// Result channel depth
    #[arg(long, default_value_t = 1000, value_parser = validate_depth)]
    pub result_queue: usize,

    /// Handling of IP fragments that overlap already-received bytes
    #[arg(long, value_enum, default_value_t = OverlapMode::LastWins)]
    pub overlap: OverlapMode,
}

impl Cli {
    pub fn gc_duration(&self) -> Duration {
        Duration::from_secs_f64(self.gc_time)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapMode {
    LastWins,
    FirstWins,
    DropConflict,
}

impl OverlapMode {
    pub fn policy(self) -> OverlapPolicy {
        match self {
            Self::LastWins => OverlapPolicy::LastWins,
            Self::FirstWins => OverlapPolicy::FirstWins,
            Self::DropConflict => OverlapPolicy::DropConflict,
        }
    }
}

fn validate_port(s: &str) -> Result<u16, String> {
    let val: u16 = s.parse().map_err(|_| format!("'{s}' is not a valid port"))?;
    if val == 0 {
        Err("port must be nonzero".to_string())
    } else {
        Ok(val)
    }
}

fn validate_gc_time(s: &str) -> Result<f64, String> {
    let val: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if val < 0.5 {
        Err("gc-time must be at least 0.5 seconds".to_string())
    } else if val > 600.0 {
        Err("gc-time must be at most 600 seconds".to_string())
    } else {
        Ok(val)
    }
}

fn validate_workers(s: &str) -> Result<usize, String> {
    let val: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid integer"))?;
    if val < 1 {
        Err("worker count must be at least 1".to_string())
    } else if val > 64 {
        Err("worker count must be at most 64".to_string())
    } else {
        Ok(val)
    }
}

fn validate_depth(s: &str) -> Result<usize, String> {
    let val: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid integer"))?;
    if val < 1 {
        Err("queue depth must be at least 1".to_string())
    } else if val > 1_000_000 {
        Err("queue depth must be at most 1000000".to_string())
    } else {
        Ok(val)
    }
}
