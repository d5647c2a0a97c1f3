//! ## RTP Control Protocol -- RTCP
//!
//! RTCP is based on the periodic transmission of control packets to
//! all participants in the session, using the same distribution
//! mechanism as the data packets.  Several RTCP packets are
//! concatenated without any intervening separators to form a compound
//! RTCP packet; each carries its own fixed header:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|  count  |  packet type  |            length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The length is the size of the sub-packet in 32-bit words minus
//! one, and the meaning of the 5-bit count depends on the packet
//! type: report count for SR/RR, chunk count for SDES, source count
//! for BYE, subtype for APP and format for RTPFB.
//!
//! [`RtcpReader`] walks a compound packet and yields one typed
//! [`RtcpPacket`] per sub-packet it understands.  Writers live on the
//! individual sub-packet types and append to a [`BytesMut`], so a
//! compound packet is written by calling them back to back.

pub mod app;
pub mod bye;
pub mod feedback;
pub mod report;
pub mod sdes;

pub use app::App;
pub use bye::Bye;
pub use feedback::{PacketResult, PacketStatus, TransportFeedback};
pub use report::{ReceiverReport, ReportBlock, SenderReport};
pub use sdes::{Sdes, SdesChunk, SdesItem, SdesItemKind, SdesItemValue};

use crate::Error;

use bytes::{BufMut, BytesMut};
use num_enum::TryFromPrimitive;

pub const VERSION: u8 = 2;
pub const HEADER_SIZE: usize = 4;

const VERSION_MASK: u8 = 0b11000000;
const COUNT_MASK: u8 = 0b00011111;

/// RTCP packet type.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
pub enum PacketKind {
    SR = 200,
    RR = 201,
    SDES = 202,
    BYE = 203,
    APP = 204,
    RTPFB = 205,
}

/// short name for a packet type byte.
///
/// # Unit Test
///
/// ```
/// assert_eq!(faster_rtp::rtcp::type_str(200), "SR");
/// assert_eq!(faster_rtp::rtcp::type_str(201), "RR");
/// assert_eq!(faster_rtp::rtcp::type_str(205), "RTPFB");
/// assert_eq!(faster_rtp::rtcp::type_str(199), "UNKNOWN");
/// ```
pub fn type_str(kind: u8) -> &'static str {
    match PacketKind::try_from(kind) {
        Ok(PacketKind::SR) => "SR",
        Ok(PacketKind::RR) => "RR",
        Ok(PacketKind::SDES) => "SDES",
        Ok(PacketKind::BYE) => "BYE",
        Ok(PacketKind::APP) => "APP",
        Ok(PacketKind::RTPFB) => "RTPFB",
        Err(_) => "UNKNOWN",
    }
}

/// Reserve a sub-packet header at the current write position.
///
/// Writers put the body first and patch the header last, once the
/// length in 32-bit words is known.
pub(crate) fn reserve_header(buf: &mut BytesMut) -> usize {
    let header_pos = buf.len();
    buf.put_u32(0);
    header_pos
}

/// Patch a header reserved by [`reserve_header`].
///
/// The body must already be padded to a 32-bit boundary.
pub(crate) fn finish_header(
    buf: &mut BytesMut,
    header_pos: usize,
    kind: PacketKind,
    count: u8,
) {
    let words = ((buf.len() - header_pos) / 4 - 1) as u16;
    buf[header_pos] = (VERSION << 6) | (count & COUNT_MASK);
    buf[header_pos + 1] = kind as u8;
    buf[header_pos + 2..header_pos + 4].copy_from_slice(&words.to_be_bytes());
}

/// One decoded RTCP sub-packet.
#[derive(Debug, Clone, PartialEq)]
pub enum RtcpPacket<'a> {
    SenderReport(SenderReport),
    ReceiverReport(ReceiverReport),
    Sdes(Sdes<'a>),
    Bye(Bye<'a>),
    App(App<'a>),
    TransportFeedback(TransportFeedback),
}

/// Compound packet reader.
///
/// Yields one `Result` per well-framed sub-packet.  Framing failures
/// (truncated header, bad version, declared length past the end of
/// the buffer) yield a single `Err` and end the iteration, since
/// nothing after them can be trusted.  A sub-packet whose *body*
/// fails to decode is logged and skipped instead: the cursor has
/// already been moved to the declared end of the sub-packet, so one
/// malformed report cannot take the rest of the compound with it.
///
/// # Unit Test
///
/// ```
/// use faster_rtp::rtcp::{RtcpPacket, RtcpReader};
///
/// let buffer = [
///     0x80, 0xc8, 0x00, 0x06, 0x79, 0x26, 0x69, 0x55, 0xe8, 0xe2,
///     0xe2, 0x17, 0xd4, 0x2f, 0x05, 0x91, 0x36, 0x01, 0xb0, 0xaf,
///     0x34, 0x85, 0x78, 0x5e, 0x2d, 0xbc, 0x2a, 0x98,
/// ];
///
/// let mut reader = RtcpReader::new(&buffer);
/// let packet = reader.next().unwrap().unwrap();
/// match packet {
///     RtcpPacket::SenderReport(sr) => {
///         assert_eq!(sr.ssrc, 0x79266955);
///         assert_eq!(sr.rtp_timestamp, 0x3601b0af);
///     }
///     _ => unreachable!(),
/// }
///
/// assert!(reader.next().is_none());
/// ```
pub struct RtcpReader<'a> {
    buf: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> RtcpReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for RtcpReader<'a> {
    type Item = Result<RtcpPacket<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.pos < self.buf.len() {
            let remaining = self.buf.len() - self.pos;
            if remaining < HEADER_SIZE {
                self.done = true;
                return Some(Err(Error::Underflow));
            }

            let flags = self.buf[self.pos];
            let kind = self.buf[self.pos + 1];
            let words = u16::from_be_bytes([
                self.buf[self.pos + 2],
                self.buf[self.pos + 3],
            ]) as usize;

            let version = (flags & VERSION_MASK) >> 6;
            if version != VERSION {
                self.done = true;
                return Some(Err(Error::BadVersion(version)));
            }

            if remaining - HEADER_SIZE < words * 4 {
                self.done = true;
                return Some(Err(Error::BadLength));
            }

            let count = flags & COUNT_MASK;
            let body = &self.buf
                [self.pos + HEADER_SIZE..self.pos + HEADER_SIZE + words * 4];

            // Move to the declared end before touching the body, so a
            // malformed body never corrupts the framing of whatever
            // follows it.
            self.pos += HEADER_SIZE + words * 4;

            let result = match PacketKind::try_from(kind) {
                Ok(PacketKind::SR) => SenderReport::read(body, count)
                    .map(RtcpPacket::SenderReport),
                Ok(PacketKind::RR) => ReceiverReport::read(body, count)
                    .map(RtcpPacket::ReceiverReport),
                Ok(PacketKind::SDES) => {
                    Sdes::read(body, count).map(RtcpPacket::Sdes)
                }
                Ok(PacketKind::BYE) => {
                    Bye::read(body, count).map(RtcpPacket::Bye)
                }
                Ok(PacketKind::APP) => {
                    App::read(body, count).map(RtcpPacket::App)
                }
                Ok(PacketKind::RTPFB) => {
                    if count != feedback::FORMAT {
                        continue;
                    }

                    TransportFeedback::read(body)
                        .map(RtcpPacket::TransportFeedback)
                }
                Err(_) => continue,
            };

            match result {
                Ok(packet) => return Some(Ok(packet)),
                Err(err) => {
                    log::warn!(
                        "rtcp: dropping malformed {} sub-packet: {}",
                        type_str(kind),
                        err
                    );

                    continue;
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_reserve_and_patch() {
        let mut buf = BytesMut::new();
        let header_pos = reserve_header(&mut buf);
        buf.put_u32(0xdeadbeef);
        buf.put_u32(0x01020304);
        finish_header(&mut buf, header_pos, PacketKind::RR, 1);

        assert_eq!(&buf[..4], &[0x81, 0xc9, 0x00, 0x02]);
    }

    #[test]
    fn truncated_header_ends_iteration() {
        let buffer = [0x80, 0xc9];
        let mut reader = RtcpReader::new(&buffer);
        assert_eq!(reader.next().unwrap().unwrap_err(), Error::Underflow);
        assert!(reader.next().is_none());
    }

    #[test]
    fn bad_version_ends_iteration() {
        let buffer = [0x40, 0xc9, 0x00, 0x00];
        let mut reader = RtcpReader::new(&buffer);
        assert_eq!(
            reader.next().unwrap().unwrap_err(),
            Error::BadVersion(1)
        );
        assert!(reader.next().is_none());
    }

    #[test]
    fn declared_length_past_end_ends_iteration() {
        let buffer = [0x80, 0xc9, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00];
        let mut reader = RtcpReader::new(&buffer);
        assert_eq!(reader.next().unwrap().unwrap_err(), Error::BadLength);
        assert!(reader.next().is_none());
    }

    #[test]
    fn unknown_kinds_are_skipped() {
        // An XR packet (207) followed by an empty RR.
        let buffer = [
            0x80, 0xcf, 0x00, 0x01, 0xaa, 0xbb, 0xcc, 0xdd, 0x80, 0xc9,
            0x00, 0x01, 0x11, 0x22, 0x33, 0x44,
        ];

        let mut reader = RtcpReader::new(&buffer);
        match reader.next().unwrap().unwrap() {
            RtcpPacket::ReceiverReport(rr) => {
                assert_eq!(rr.ssrc, 0x11223344)
            }
            _ => unreachable!(),
        }

        assert!(reader.next().is_none());
    }
}
