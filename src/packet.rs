//! RTP datagram parsing.
//!
//! A parsed [`RtpPacket`] borrows nothing: it shares the underlying
//! immutable [`Bytes`] container by reference count and addresses the
//! extension header and payload as offsets into it, so packets can be
//! queued, cloned and released independently of the receive path that
//! produced them.

use crate::{util::Reader, Error};

use bytes::Bytes;

pub const VERSION: u8 = 2;
pub const HEADER_SIZE: usize = 12;

const VERSION_MASK: u8 = 0b11000000;
const PADDING_MASK: u8 = 0b00100000;
const EXTENSION_MASK: u8 = 0b00010000;
const CSRC_COUNT_MASK: u8 = 0b00001111;
const MARKER_MASK: u8 = 0b10000000;
const PAYLOAD_KIND_MASK: u8 = 0b01111111;

/// RTP Fixed Header.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |V=2|P|X|  CC   |M|     PT      |       sequence number         |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |                           timestamp                           |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///  |           synchronization source (SSRC) identifier            |
///  +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
///  |            contributing source (CSRC) identifiers             |
///  |                             ....                              |
///  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// If the padding bit is set, the packet contains one or more
    /// additional padding octets at the end which are not part of the
    /// payload.  The last octet of the padding contains a count of how
    /// many padding octets should be ignored, including itself.
    pub padding: bool,
    /// If the extension bit is set, the fixed header MUST be followed by
    /// exactly one header extension.
    pub extension: bool,
    /// The interpretation of the marker is defined by a profile.  It is
    /// intended to allow significant events such as frame boundaries to
    /// be marked in the packet stream.
    pub marker: bool,
    /// This field identifies the format of the RTP payload and
    /// determines its interpretation by the application.
    pub payload_kind: u8,
    /// The sequence number increments by one for each RTP data packet
    /// sent, and may be used by the receiver to detect packet loss and
    /// to restore packet sequence.
    pub sequence_number: u16,
    /// The timestamp reflects the sampling instant of the first octet
    /// in the RTP data packet.
    pub timestamp: u32,
    /// The SSRC field identifies the synchronization source.  This
    /// identifier SHOULD be chosen randomly, with the intent that no
    /// two synchronization sources within the same RTP session will
    /// have the same SSRC identifier.
    pub ssrc: u32,
    /// The CSRC list identifies the contributing sources for the
    /// payload contained in this packet.  The number of identifiers is
    /// given by the CC field.
    pub csrc_list: Vec<u32>,
}

impl RtpHeader {
    /// encoded size of this header, fixed part plus CSRC list.
    pub fn len(&self) -> usize {
        HEADER_SIZE + self.csrc_list.len() * 4
    }

    /// Write the header in place at the start of `buf`.
    ///
    /// Senders fill in the payload first, leaving `len()` bytes free
    /// at the front, and finalize the header last once the sequence
    /// number and timestamp are known.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use faster_rtp::packet::RtpHeader;
    ///
    /// let header = RtpHeader {
    ///     marker: true,
    ///     payload_kind: 114,
    ///     sequence_number: 1265,
    ///     timestamp: 4169613229,
    ///     ssrc: 1744739836,
    ///     ..Default::default()
    /// };
    ///
    /// let mut buf = [0u8; 16];
    /// header.finalize(&mut buf).unwrap();
    /// assert_eq!(
    ///     &buf[..12],
    ///     &[
    ///         0x80, 0xf2, 0x04, 0xf1, 0xf8, 0x87, 0x3f, 0xad, 0x67,
    ///         0xfe, 0x9d, 0xfc
    ///     ]
    /// );
    /// ```
    pub fn finalize(&self, buf: &mut [u8]) -> Result<(), Error> {
        if buf.len() < self.len() || self.csrc_list.len() > 15 {
            return Err(Error::Overflow);
        }

        buf[0] = (VERSION << 6)
            | if self.padding { PADDING_MASK } else { 0 }
            | if self.extension { EXTENSION_MASK } else { 0 }
            | self.csrc_list.len() as u8;
        buf[1] = if self.marker { MARKER_MASK } else { 0 }
            | (self.payload_kind & PAYLOAD_KIND_MASK);
        buf[2..4].copy_from_slice(&self.sequence_number.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        for (i, csrc) in self.csrc_list.iter().enumerate() {
            let off = HEADER_SIZE + i * 4;
            buf[off..off + 4].copy_from_slice(&csrc.to_be_bytes());
        }

        Ok(())
    }
}

/// Extension header location inside a parsed datagram.
///
/// `len` covers the whole extension including the 4-byte id/length
/// prelude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionHeader {
    pub id: u16,
    pub off: usize,
    pub len: usize,
}

/// One parsed RTP datagram.
///
/// The timing fields below the header are not on the wire: the caller
/// stamps `in_timestamp` and `rtp_timestamp_ext` before handing the
/// packet to the jitter buffer, which computes `out_timestamp`.
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub header: RtpHeader,
    raw: Bytes,
    pub extension_header: Option<ExtensionHeader>,
    payload_off: usize,
    payload_len: usize,
    padding_len: usize,

    /// Receive time, in microseconds on the caller's monotonic clock.
    pub in_timestamp: u64,
    /// Scheduled release time computed by the jitter buffer.
    pub out_timestamp: u64,
    /// Extended RTP timestamp, unwrapped to 64 bits by the caller.
    pub rtp_timestamp_ext: u64,
    /// Sender-side priority hint, low numbers first.
    pub priority: u32,
    /// Sender-side importance hint, low numbers matter more.
    pub importance: u32,
}

impl RtpPacket {
    /// Parse one datagram.
    ///
    /// The packet keeps a reference on `raw` until dropped; cloning the
    /// packet only bumps that reference count.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use bytes::Bytes;
    /// use faster_rtp::packet::RtpPacket;
    ///
    /// let raw = Bytes::from_static(&[
    ///     0x90, 0x72, 0x04, 0xf1, 0xf8, 0x87, 0x3f, 0xad, 0x67, 0xfe,
    ///     0x9d, 0xfc, 0xbe, 0xde, 0x00, 0x01, 0x22, 0x5b, 0xb3, 0x33,
    ///     0x01, 0x02, 0x03, 0x04,
    /// ]);
    ///
    /// let pkt = RtpPacket::read(raw).unwrap();
    /// assert_eq!(pkt.header.payload_kind, 114);
    /// assert_eq!(pkt.header.sequence_number, 1265);
    /// assert_eq!(pkt.extension_header.unwrap().id, 0xbede);
    /// assert_eq!(pkt.extension_data(), Some(&[0x22, 0x5b, 0xb3, 0x33][..]));
    /// assert_eq!(pkt.payload(), &[0x01, 0x02, 0x03, 0x04]);
    /// ```
    pub fn read(raw: Bytes) -> Result<Self, Error> {
        let mut reader = Reader::new(&raw);

        let b0 = reader.get_u8()?;
        let b1 = reader.get_u8()?;

        let version = (b0 & VERSION_MASK) >> 6;
        if version != VERSION {
            return Err(Error::BadVersion(version));
        }

        let header = RtpHeader {
            padding: b0 & PADDING_MASK != 0,
            extension: b0 & EXTENSION_MASK != 0,
            marker: b1 & MARKER_MASK != 0,
            payload_kind: b1 & PAYLOAD_KIND_MASK,
            sequence_number: reader.get_u16()?,
            timestamp: reader.get_u32()?,
            ssrc: reader.get_u32()?,
            csrc_list: {
                let count = (b0 & CSRC_COUNT_MASK) as usize;
                let mut list = Vec::with_capacity(count);
                for _ in 0..count {
                    list.push(reader.get_u32()?);
                }

                list
            },
        };

        let extension_header = if header.extension {
            let off = reader.pos();
            let id = reader.get_u16()?;
            let words = reader.get_u16()? as usize;
            reader.skip(words * 4)?;
            Some(ExtensionHeader {
                id,
                off,
                len: words * 4 + 4,
            })
        } else {
            None
        };

        let payload_off = reader.pos();
        let mut payload_len = raw.len() - payload_off;

        // The last octet of the padding is the padding length,
        // including itself.
        let mut padding_len = 0;
        if header.padding {
            if payload_len < 1 {
                return Err(Error::Underflow);
            }

            padding_len = raw[raw.len() - 1] as usize;
            if payload_len < padding_len {
                return Err(Error::Underflow);
            }

            payload_len -= padding_len;
        }

        Ok(Self {
            header,
            raw,
            extension_header,
            payload_off,
            payload_len,
            padding_len,
            in_timestamp: 0,
            out_timestamp: 0,
            rtp_timestamp_ext: 0,
            priority: 0,
            importance: 0,
        })
    }

    /// payload bytes, trailing padding excluded.
    pub fn payload(&self) -> &[u8] {
        &self.raw[self.payload_off..self.payload_off + self.payload_len]
    }

    /// payload as a zero-copy slice of the shared container.
    pub fn payload_bytes(&self) -> Bytes {
        self.raw
            .slice(self.payload_off..self.payload_off + self.payload_len)
    }

    /// trailing padding bytes, length octet included.
    pub fn padding(&self) -> &[u8] {
        let off = self.payload_off + self.payload_len;
        &self.raw[off..off + self.padding_len]
    }

    /// extension payload after the id/length prelude, if present.
    pub fn extension_data(&self) -> Option<&[u8]> {
        self.extension_header
            .map(|ext| &self.raw[ext.off + 4..ext.off + ext.len])
    }

    /// the whole datagram as received.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_rejects_bad_version() {
        let raw = Bytes::from_static(&[
            0x40, 0x72, 0x04, 0xf1, 0xf8, 0x87, 0x3f, 0xad, 0x67, 0xfe,
            0x9d, 0xfc,
        ]);

        assert_eq!(RtpPacket::read(raw).unwrap_err(), Error::BadVersion(1));
    }

    #[test]
    fn read_rejects_short_header() {
        let raw = Bytes::from_static(&[0x80, 0x72, 0x04]);
        assert_eq!(RtpPacket::read(raw).unwrap_err(), Error::Underflow);
    }

    #[test]
    fn read_skips_csrc_list() {
        let raw = Bytes::from_static(&[
            0x82, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
            0x00, 0x03, 0x11, 0x11, 0x11, 0x11, 0x22, 0x22, 0x22, 0x22,
            0xaa, 0xbb,
        ]);

        let pkt = RtpPacket::read(raw).unwrap();
        assert_eq!(pkt.header.csrc_list, vec![0x11111111, 0x22222222]);
        assert_eq!(pkt.payload(), &[0xaa, 0xbb]);
    }

    #[test]
    fn read_strips_padding() {
        let raw = Bytes::from_static(&[
            0xa0, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
            0x00, 0x03, 0xaa, 0xbb, 0x00, 0x02,
        ]);

        let pkt = RtpPacket::read(raw).unwrap();
        assert_eq!(pkt.payload(), &[0xaa, 0xbb]);
        assert_eq!(pkt.padding(), &[0x00, 0x02]);
    }

    #[test]
    fn padding_may_swallow_whole_payload() {
        let raw = Bytes::from_static(&[
            0xa0, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
            0x00, 0x03, 0x00, 0x00, 0x00, 0x04,
        ]);

        let pkt = RtpPacket::read(raw).unwrap();
        assert!(pkt.payload().is_empty());
        assert_eq!(pkt.padding().len(), 4);
    }

    #[test]
    fn padding_longer_than_payload_is_an_error() {
        let raw = Bytes::from_static(&[
            0xa0, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
            0x00, 0x03, 0xaa, 0x05,
        ]);

        assert_eq!(RtpPacket::read(raw).unwrap_err(), Error::Underflow);
    }

    #[test]
    fn zero_length_payload() {
        let raw = Bytes::from_static(&[
            0x80, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
            0x00, 0x03,
        ]);

        let pkt = RtpPacket::read(raw).unwrap();
        assert!(pkt.payload().is_empty());
    }

    #[test]
    fn finalize_then_read_round_trip() {
        let header = RtpHeader {
            marker: true,
            payload_kind: 96,
            sequence_number: 0xfffe,
            timestamp: 0x01020304,
            ssrc: 0xdeadbeef,
            ..Default::default()
        };

        let mut buf = vec![0u8; header.len() + 3];
        buf[12..].copy_from_slice(&[0x09, 0x08, 0x07]);
        header.finalize(&mut buf).unwrap();

        let pkt = RtpPacket::read(Bytes::from(buf)).unwrap();
        assert_eq!(pkt.header, header);
        assert_eq!(pkt.payload(), &[0x09, 0x08, 0x07]);
    }

    #[test]
    fn finalize_needs_room() {
        let header = RtpHeader::default();
        let mut buf = [0u8; 11];
        assert_eq!(header.finalize(&mut buf), Err(Error::Overflow));
    }

    #[test]
    fn clone_shares_the_container() {
        let raw = Bytes::from_static(&[
            0x80, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
            0x00, 0x03, 0xaa,
        ]);

        let pkt = RtpPacket::read(raw).unwrap();
        let copy = pkt.clone();
        assert_eq!(copy.payload().as_ptr(), pkt.payload().as_ptr());
    }
}
