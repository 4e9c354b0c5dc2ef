// Pipeline orchestrator.
//
// `DnsCapturer::new` validates the options, builds every bounded channel, and
// spawns the decoder pool, the TCP assembler shards, and both defraggers as
// named threads. `start` opens the configured capture source and pumps frames
// into the intake until the source ends or the done signal closes. `join`
// tears the pipeline down: dropping the intake disconnects the workers, and
// disconnection cascades stage by stage through the channel graph.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};

use crate::capture::{FileSource, FrameSource, LiveSource, ReadOutcome};
use crate::decode::{DnsResult, PacketDecoder};
use crate::defrag::{ipv4_defragger, ipv6_defragger, OverlapPolicy};
use crate::error::PdnsError;
use crate::packet::Frame;
use crate::stats::PipelineStats;
use crate::tcp::tcp_assembler;

/// Everything the pipeline needs to run. Exactly one of `device` and
/// `pcap_file` must be set.
#[derive(Debug)]
pub struct CaptureOptions {
    pub device: Option<String>,
    pub pcap_file: Option<PathBuf>,
    /// Request an enlarged memory-mapped kernel buffer for live capture.
    pub ring_buffer: bool,
    /// BPF filter string, attached by the capture source.
    pub filter: String,
    /// DNS port; traffic touching neither endpoint port is ignored.
    pub port: u16,
    /// Inactivity bound for reassembly state.
    pub gc_time: Duration,
    pub overlap_policy: OverlapPolicy,
    /// Downstream sink for decoded results.
    pub results: Sender<DnsResult>,
    pub packet_workers: usize,
    pub packet_queue: usize,
    pub tcp_workers: usize,
    pub tcp_queue: usize,
    pub defrag_queue: usize,
    pub defrag_return_queue: usize,
    pub stats: Arc<PipelineStats>,
    /// Broadcast cancellation: the caller closes this channel to stop.
    pub done: Receiver<()>,
}

#[derive(Debug)]
pub struct DnsCapturer {
    options: CaptureOptions,
    intake: Sender<Frame>,
    handles: Vec<JoinHandle<()>>,
}

impl DnsCapturer {
    /// Validate options and spawn the full pipeline, idle until `start`.
    pub fn new(options: CaptureOptions) -> Result<Self, PdnsError> {
        match (&options.device, &options.pcap_file) {
            (Some(_), Some(_)) => {
                return Err(PdnsError::Config(
                    "device and pcap file are mutually exclusive".to_string(),
                ))
            }
            (None, None) => {
                return Err(PdnsError::Config(
                    "either a device or a pcap file is required".to_string(),
                ))
            }
            _ => {}
        }
        if options.port == 0 {
            return Err(PdnsError::Config("port must be nonzero".to_string()));
        }
        if options.packet_workers == 0 || options.tcp_workers == 0 {
            return Err(PdnsError::Config(
                "worker counts must be nonzero".to_string(),
            ));
        }
        if options.gc_time.is_zero() {
            return Err(PdnsError::Config("gc time must be nonzero".to_string()));
        }
        for (name, depth) in [
            ("packet queue", options.packet_queue),
            ("tcp queue", options.tcp_queue),
            ("defrag queue", options.defrag_queue),
            ("defrag return queue", options.defrag_return_queue),
        ] {
            if depth == 0 {
                return Err(PdnsError::Config(format!("{name} depth must be nonzero")));
            }
        }

        let (intake_tx, intake_rx) = bounded::<Frame>(options.packet_queue);
        let (ip4_frag_tx, ip4_frag_rx) = bounded(options.defrag_queue);
        let (ip6_frag_tx, ip6_frag_rx) = bounded(options.defrag_queue);
        let (ip4_return_tx, ip4_return_rx) = bounded(options.defrag_return_queue);
        let (ip6_return_tx, ip6_return_rx) = bounded(options.defrag_return_queue);

        let mut handles = Vec::new();
        let spawn_err = |e: std::io::Error| PdnsError::Fatal(format!("spawn thread: {e}"));

        let mut tcp_senders = Vec::with_capacity(options.tcp_workers);
        for i in 0..options.tcp_workers {
            let (seg_tx, seg_rx) = bounded(options.tcp_queue);
            tcp_senders.push(seg_tx);
            let results = options.results.clone();
            let port = options.port;
            let gc_time = options.gc_time;
            let stats = Arc::clone(&options.stats);
            let done = options.done.clone();
            let handle = thread::Builder::new()
                .name(format!("pdns-tcp-{i}"))
                .spawn(move || tcp_assembler(seg_rx, results, port, gc_time, stats, done))
                .map_err(spawn_err)?;
            handles.push(handle);
        }

        {
            let (gc_time, policy) = (options.gc_time, options.overlap_policy);
            let (stats, done) = (Arc::clone(&options.stats), options.done.clone());
            let handle = thread::Builder::new()
                .name("pdns-defrag4".to_string())
                .spawn(move || ipv4_defragger(ip4_frag_rx, ip4_return_tx, gc_time, policy, stats, done))
                .map_err(spawn_err)?;
            handles.push(handle);
        }
        {
            let (gc_time, policy) = (options.gc_time, options.overlap_policy);
            let (stats, done) = (Arc::clone(&options.stats), options.done.clone());
            let handle = thread::Builder::new()
                .name("pdns-defrag6".to_string())
                .spawn(move || ipv6_defragger(ip6_frag_rx, ip6_return_tx, gc_time, policy, stats, done))
                .map_err(spawn_err)?;
            handles.push(handle);
        }

        for i in 0..options.packet_workers {
            let decoder = PacketDecoder {
                port: options.port,
                frames: intake_rx.clone(),
                ip4_fragments: ip4_frag_tx.clone(),
                ip6_fragments: ip6_frag_tx.clone(),
                ip4_datagrams: ip4_return_rx.clone(),
                ip6_datagrams: ip6_return_rx.clone(),
                tcp_segments: tcp_senders.clone(),
                results: options.results.clone(),
                stats: Arc::clone(&options.stats),
                done: options.done.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("pdns-decode-{i}"))
                .spawn(move || decoder.run())
                .map_err(spawn_err)?;
            handles.push(handle);
        }

        Ok(Self {
            options,
            intake: intake_tx,
            handles,
        })
    }

    /// Open the configured source and pump until exhaustion or cancellation.
    pub fn start(&mut self) -> Result<(), PdnsError> {
        match (self.options.device.clone(), self.options.pcap_file.clone()) {
            (Some(device), None) => {
                let mut source =
                    LiveSource::open(&device, &self.options.filter, self.options.ring_buffer)?;
                let result = self.pump(&mut source);
                source.close();
                result
            }
            (None, Some(path)) => {
                let mut source = FileSource::open(&path, &self.options.filter)?;
                let result = self.pump(&mut source);
                source.close();
                result
            }
            _ => Err(PdnsError::Config("no capture source".to_string())),
        }
    }

    /// Feed frames from `source` into the decoder intake.
    ///
    /// Public so a caller (or a test) can drive the pipeline from its own
    /// `FrameSource` implementation.
    pub fn pump(&mut self, source: &mut dyn FrameSource) -> Result<(), PdnsError> {
        loop {
            match self.options.done.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return Ok(()),
                Err(TryRecvError::Empty) => {}
            }
            match source.read_frame()? {
                ReadOutcome::Frame(frame) => {
                    select! {
                        send(self.intake, frame) -> res => {
                            if res.is_err() {
                                return Ok(());
                            }
                        }
                        recv(self.options.done) -> _ => return Ok(()),
                    }
                }
                ReadOutcome::Timeout => {}
                ReadOutcome::EndOfStream => {
                    log::info!("capture source exhausted");
                    return Ok(());
                }
            }
        }
    }

    /// Tear the pipeline down and wait for every thread.
    ///
    /// Dropping the intake disconnects the workers even if the done signal
    /// is still open; disconnection then cascades through the reassembly
    /// services. In-flight work that has not reached the result channel by
    /// the time its stage observes the shutdown is abandoned.
    pub fn join(self) {
        drop(self.intake);
        drop(self.options);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

// ===========================================================================
// Unit tests
// ===========================================================================
