//! ## RTP: A Transport Protocol for Real-Time Applications
//!
//! This project implements the real-time transport protocol (RTP)
//! packet formats described in RFC 3550, which provides end-to-end
//! delivery services for data with real-time characteristics, such as
//! interactive audio and video.  Those services include payload type
//! identification, sequence numbering, timestamping and delivery
//! monitoring.  Applications typically run RTP on top of UDP to make
//! use of its multiplexing and checksum services; both protocols
//! contribute parts of the transport protocol functionality.
//!
//! Note that RTP itself does not provide any mechanism to ensure timely
//! delivery or provide other quality-of-service guarantees, but relies
//! on lower-layer services to do so.  It does not guarantee delivery or
//! prevent out-of-order delivery, nor does it assume that the underlying
//! network is reliable and delivers packets in sequence.  The sequence
//! numbers included in RTP allow the receiver to reconstruct the
//! sender's packet sequence.
//!
//! Three layers are provided here:
//!
//! * [`packet`] - RTP datagram parsing and header finalization.
//! * [`rtcp`] - RTCP compound packets: SR, RR, SDES, BYE, APP and the
//!   transport-wide congestion control feedback extension.
//! * [`jitter`] - a receiver-side jitter buffer reordering packets by
//!   sequence number and scheduling their release against an estimate
//!   of the sender/receiver clock skew.
//!
//! Sockets, clocks and session management are left to the caller: all
//! timestamps are supplied from the outside and nothing here blocks.

pub mod jitter;
pub mod ntp;
pub mod packet;
pub mod rtcp;
pub mod util;

pub use jitter::{JitterBuffer, JitterBufferConfig, JitterInfo};
pub use ntp::{NtpTimestamp32, NtpTimestamp64};
pub use packet::{RtpHeader, RtpPacket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An argument violates the contract of the operation, such as a
    /// zero clock rate or an over-long SDES item.
    InvalidInput,
    /// A read ran past the end of the buffer.
    Underflow,
    /// A positional write does not fit the destination buffer.
    Overflow,
    /// The version field of an RTP or RTCP header is not 2.
    BadVersion(u8),
    /// A declared length exceeds what the buffer actually holds.
    BadLength,
    /// A feedback report declares more status slots than the decoder
    /// is willing to allocate.
    Capacity,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
