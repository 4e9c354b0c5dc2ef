// passivedns — passive DNS traffic observer.
//
// Ingests link-layer frames from a live interface or a capture file, peels
// Ethernet/SLL + IPv4/IPv6 + UDP/TCP, reassembles fragmented IP datagrams and
// segmented TCP streams, and emits decoded DNS messages on a result channel.
//
// The pipeline is a set of OS threads joined by bounded crossbeam channels:
//
//   FrameSource -> intake -> PacketDecoder[i] -> results
//                               |      ^
//             fragments/segments|      | reassembled datagrams / framed
//                               v      |   DNS-over-TCP messages
//                  defraggers + TCP assembler shards
//
// A single done signal (a closed zero-capacity channel) terminates every
// long-running thread at its next queue operation.

pub mod capture;
pub mod capturer;
pub mod cli;
pub mod decode;
pub mod defrag;
pub mod dns;
pub mod error;
pub mod packet;
pub mod stats;
pub mod tcp;

pub use capturer::{CaptureOptions, DnsCapturer};
pub use decode::{DnsResult, Transport};
pub use error::PdnsError;
