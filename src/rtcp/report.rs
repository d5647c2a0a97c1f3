//! ### Sender and Receiver Reports
//!
//! ```text
//!         0                   1                   2                   3
//!         0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! header |V=2|P|    RC   |   PT=SR=200   |             length            |
//!        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!        |                         SSRC of sender                        |
//!        +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! sender |              NTP timestamp, most significant word             |
//! info   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!        |             NTP timestamp, least significant word             |
//!        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!        |                         RTP timestamp                         |
//!        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!        |                     sender's packet count                     |
//!        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!        |                      sender's octet count                     |
//!        +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! report |                 SSRC_1 (SSRC of first source)                 |
//! block  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!   1    | fraction lost |       cumulative number of packets lost       |
//!        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!        |           extended highest sequence number received           |
//!        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!        |                      interarrival jitter                      |
//!        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!        |                         last SR (LSR)                         |
//!        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!        |                   delay since last SR (DLSR)                  |
//!        +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! ```
//!
//! The receiver report (RR, PT=201) is identical except that it has
//! no sender info section.

use crate::{
    ntp::{NtpTimestamp32, NtpTimestamp64},
    rtcp::{finish_header, reserve_header, PacketKind},
    util::Reader,
    Error,
};

use bytes::{BufMut, BytesMut};

/// Conveys statistics on the reception of RTP packets from a single
/// synchronization source; zero or more blocks follow the sender info
/// of an SR or the SSRC of an RR.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReportBlock {
    /// The SSRC identifier of the source to which the information in
    /// this reception report block pertains.
    pub ssrc: u32,
    /// The fraction of RTP data packets from the source lost since
    /// the previous SR or RR packet was sent, expressed as a fixed
    /// point number with the binary point at the left edge of the
    /// field.
    pub fraction: u8,
    /// The total number of RTP data packets from the source that have
    /// been lost since the beginning of reception.  This is a 24-bit
    /// signed quantity on the wire; receivers of duplicated packets
    /// can report a negative count.
    pub lost: i32,
    /// The low 16 bits contain the highest sequence number received
    /// in an RTP data packet from the source, and the most
    /// significant 16 bits extend that sequence number with the
    /// corresponding count of sequence number cycles.
    pub ext_highest_seqnum: u32,
    /// An estimate of the statistical variance of the RTP data packet
    /// interarrival time, measured in timestamp units.
    pub jitter: u32,
    /// The middle 32 bits out of the 64-bit NTP timestamp of the most
    /// recent SR from this source.
    pub lsr: NtpTimestamp32,
    /// The delay between receiving the last SR packet from this
    /// source and sending this reception report block, expressed in
    /// units of 1/65536 seconds.
    pub dlsr: u32,
}

impl ReportBlock {
    pub(crate) fn read(reader: &mut Reader) -> Result<Self, Error> {
        let ssrc = reader.get_u32()?;
        let fraction_lost = reader.get_u32()?;
        Ok(Self {
            ssrc,
            fraction: (fraction_lost >> 24) as u8,
            // sign-extend the low 24 bits.
            lost: ((fraction_lost << 8) as i32) >> 8,
            ext_highest_seqnum: reader.get_u32()?,
            jitter: reader.get_u32()?,
            lsr: NtpTimestamp32 {
                seconds: reader.get_u16()?,
                fraction: reader.get_u16()?,
            },
            dlsr: reader.get_u32()?,
        })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) {
        let fraction_lost =
            ((self.fraction as u32) << 24) | (self.lost as u32 & 0xffffff);
        buf.put_u32(self.ssrc);
        buf.put_u32(fraction_lost);
        buf.put_u32(self.ext_highest_seqnum);
        buf.put_u32(self.jitter);
        buf.put_u16(self.lsr.seconds);
        buf.put_u16(self.lsr.fraction);
        buf.put_u32(self.dlsr);
    }
}

/// SR: Sender Report RTCP Packet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SenderReport {
    /// The synchronization source identifier for the originator of
    /// this SR packet.
    pub ssrc: u32,
    /// Indicates the wallclock time when this report was sent so that
    /// it may be used in combination with timestamps returned in
    /// reception reports from other receivers to measure round-trip
    /// propagation to those receivers.
    pub ntp_timestamp: NtpTimestamp64,
    /// Corresponds to the same time as the NTP timestamp (above), but
    /// in the same units and with the same random offset as the RTP
    /// timestamps in data packets.
    pub rtp_timestamp: u32,
    /// The total number of RTP data packets transmitted by the sender
    /// since starting transmission up until the time this SR packet
    /// was generated.
    pub sender_packet_count: u32,
    /// The total number of payload octets transmitted in RTP data
    /// packets by the sender since starting transmission.
    pub sender_byte_count: u32,
    pub reports: Vec<ReportBlock>,
}

impl SenderReport {
    pub(crate) fn read(body: &[u8], count: u8) -> Result<Self, Error> {
        let mut reader = Reader::new(body);
        let ssrc = reader.get_u32()?;
        let ntp_timestamp = NtpTimestamp64 {
            seconds: reader.get_u32()?,
            fraction: reader.get_u32()?,
        };
        let rtp_timestamp = reader.get_u32()?;
        let sender_packet_count = reader.get_u32()?;
        let sender_byte_count = reader.get_u32()?;

        let mut reports = Vec::with_capacity(count as usize);
        for _ in 0..count {
            reports.push(ReportBlock::read(&mut reader)?);
        }

        Ok(Self {
            ssrc,
            ntp_timestamp,
            rtp_timestamp,
            sender_packet_count,
            sender_byte_count,
            reports,
        })
    }

    /// Append this report to `buf` as one RTCP sub-packet.
    pub fn write(&self, buf: &mut BytesMut) -> Result<(), Error> {
        if self.reports.len() > 31 {
            return Err(Error::InvalidInput);
        }

        let header_pos = reserve_header(buf);
        buf.put_u32(self.ssrc);
        buf.put_u32(self.ntp_timestamp.seconds);
        buf.put_u32(self.ntp_timestamp.fraction);
        buf.put_u32(self.rtp_timestamp);
        buf.put_u32(self.sender_packet_count);
        buf.put_u32(self.sender_byte_count);

        for report in &self.reports {
            report.write(buf);
        }

        finish_header(
            buf,
            header_pos,
            PacketKind::SR,
            self.reports.len() as u8,
        );

        Ok(())
    }
}

/// RR: Receiver Report RTCP Packet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReceiverReport {
    /// The synchronization source identifier of the packet sender.
    pub ssrc: u32,
    pub reports: Vec<ReportBlock>,
}

impl ReceiverReport {
    pub(crate) fn read(body: &[u8], count: u8) -> Result<Self, Error> {
        let mut reader = Reader::new(body);
        let ssrc = reader.get_u32()?;

        let mut reports = Vec::with_capacity(count as usize);
        for _ in 0..count {
            reports.push(ReportBlock::read(&mut reader)?);
        }

        Ok(Self { ssrc, reports })
    }

    /// Append this report to `buf` as one RTCP sub-packet.
    pub fn write(&self, buf: &mut BytesMut) -> Result<(), Error> {
        if self.reports.len() > 31 {
            return Err(Error::InvalidInput);
        }

        let header_pos = reserve_header(buf);
        buf.put_u32(self.ssrc);

        for report in &self.reports {
            report.write(buf);
        }

        finish_header(
            buf,
            header_pos,
            PacketKind::RR,
            self.reports.len() as u8,
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_block_sign_extends_lost() {
        let mut buf = BytesMut::new();
        ReportBlock {
            ssrc: 1,
            fraction: 0,
            lost: -3,
            ..Default::default()
        }
        .write(&mut buf);

        assert_eq!(&buf[4..8], &[0x00, 0xff, 0xff, 0xfd]);

        let mut reader = Reader::new(&buf);
        let block = ReportBlock::read(&mut reader).unwrap();
        assert_eq!(block.lost, -3);
    }

    #[test]
    fn sender_report_round_trip() {
        let sr = SenderReport {
            ssrc: 0x79266955,
            ntp_timestamp: NtpTimestamp64 {
                seconds: 0xe8e2e217,
                fraction: 0xd42f0591,
            },
            rtp_timestamp: 0x3601b0af,
            sender_packet_count: 42,
            sender_byte_count: 4200,
            reports: vec![ReportBlock {
                ssrc: 0x11223344,
                fraction: 12,
                lost: 99,
                ext_highest_seqnum: 0x00010002,
                jitter: 7,
                lsr: NtpTimestamp32 {
                    seconds: 0x1234,
                    fraction: 0x5678,
                },
                dlsr: 3,
            }],
        };

        let mut buf = BytesMut::new();
        sr.write(&mut buf).unwrap();
        assert_eq!(buf.len() % 4, 0);
        assert_eq!(buf[1], 200);

        let body = &buf[4..];
        assert_eq!(SenderReport::read(body, 1).unwrap(), sr);
    }

    #[test]
    fn too_many_reports_is_invalid() {
        let rr = ReceiverReport {
            ssrc: 1,
            reports: vec![ReportBlock::default(); 32],
        };

        let mut buf = BytesMut::new();
        assert_eq!(rr.write(&mut buf), Err(Error::InvalidInput));
    }
}
