use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{bounded, Receiver};

use passivedns::capturer::{CaptureOptions, DnsCapturer};
use passivedns::cli::Cli;
use passivedns::decode::DnsResult;
use passivedns::error::PdnsError;
use passivedns::stats::PipelineStats;

/// Global shutdown flag, set by signal handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Grace period between the capture source ending and the done signal
/// closing, so in-flight reassembly can flush.
const FLUSH_GRACE: Duration = Duration::from_secs(2);

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

fn exit_code(err: &PdnsError) -> i32 {
    match err {
        PdnsError::Config(_) => 2,
        PdnsError::Capture(_) => 3,
        _ => 4,
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(exit_code(&e));
        }
    }
}

fn run(cli: Cli) -> Result<(), PdnsError> {
    install_signal_handlers();

    let stats = PipelineStats::new();
    let (results_tx, results_rx) = bounded::<DnsResult>(cli.result_queue);
    let (done_tx, done_rx) = bounded::<()>(0);

    let spawn_err = |e: std::io::Error| PdnsError::Fatal(format!("spawn thread: {e}"));

    // Owns the done sender; dropping it is the shutdown broadcast. Fires on
    // SIGINT/SIGTERM or once the main thread flags natural completion.
    let watcher = thread::Builder::new()
        .name("pdns-signal".to_string())
        .spawn(move || {
            while !SHUTDOWN_REQUESTED.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(100));
            }
            drop(done_tx);
        })
        .map_err(spawn_err)?;

    let sink = thread::Builder::new()
        .name("pdns-sink".to_string())
        .spawn(move || {
            if let Err(e) = write_results(results_rx) {
                log::warn!("result sink stopped: {e}");
            }
        })
        .map_err(spawn_err)?;

    let options = CaptureOptions {
        device: cli.device.clone(),
        pcap_file: cli.pcap_file.clone(),
        ring_buffer: cli.ring_buffer,
        filter: cli.filter.clone(),
        port: cli.port,
        gc_time: cli.gc_duration(),
        overlap_policy: cli.overlap.policy(),
        results: results_tx,
        packet_workers: cli.packet_workers,
        packet_queue: cli.packet_queue,
        tcp_workers: cli.tcp_workers,
        tcp_queue: cli.tcp_queue,
        defrag_queue: cli.defrag_queue,
        defrag_return_queue: cli.defrag_return_queue,
        stats: Arc::clone(&stats),
        done: done_rx,
    };

    let mut capturer = match DnsCapturer::new(options) {
        Ok(capturer) => capturer,
        Err(e) => {
            SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
            let _ = watcher.join();
            let _ = sink.join();
            return Err(e);
        }
    };
    let pump_result = capturer.start();

    if pump_result.is_ok() && !SHUTDOWN_REQUESTED.load(Ordering::Relaxed) {
        thread::sleep(FLUSH_GRACE);
    }
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
    let _ = watcher.join();
    capturer.join();
    let _ = sink.join();

    stats.log_summary();
    pump_result
}

/// Result sink: one JSON object per line on stdout. Stops on the first
/// write error (e.g. a closed pipe); the pipeline sheds the backpressure.
fn write_results(results: Receiver<DnsResult>) -> Result<(), PdnsError> {
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    for result in results.iter() {
        serde_json::to_writer(&mut out, &result)
            .map_err(|e| PdnsError::Serialization(std::io::Error::other(e)))?;
        out.write_all(b"\n").map_err(PdnsError::Serialization)?;
        out.flush().map_err(PdnsError::Serialization)?;
    }
    Ok(())
}
