//! ### Transport-wide congestion control feedback
//!
//! RTCP transport layer feedback (PT=205) with format 15, as defined
//! by the transport-wide-cc extensions draft:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|  FMT=15 |    PT=205     |           length              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     SSRC of packet sender                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      SSRC of media source                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      base sequence number     |      packet status count      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 reference time                | fb pkt. count |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          packet chunk         |         packet chunk          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         packet chunk          |  recv delta   |  recv delta   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Packet chunks assign one status symbol per sequence number slot
//! starting at the base.  A chunk is either a run of one symbol
//! (top bit 0: 2-bit symbol, 13-bit run length), fourteen one-bit
//! symbols (top bits 10) or seven two-bit symbols (top bits 11),
//! always most significant first.  Received packets then contribute
//! one receive delta each, in 250 microsecond units: a signed byte
//! for symbol 1, a signed 16-bit word for symbol 2.

use crate::{
    rtcp::{finish_header, reserve_header, PacketKind},
    util::Reader,
    Error,
};

use bytes::{BufMut, BytesMut};
use num_enum::TryFromPrimitive;

/// RTPFB format of this feedback message.
pub const FORMAT: u8 = 15;

/// One receive delta unit, in microseconds.
pub const DELTA_UNIT_US: u64 = 250;

/// Upper bound on the status count of a single report; anything above
/// it is rejected before allocating.  One more than the largest run a
/// single run-length chunk can encode.
pub const MAX_STATUS_COUNT: u16 = 8192;

const MAX_RUN_LENGTH: usize = 0x1fff;

/// Per-packet reception status symbol.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
pub enum PacketStatus {
    NotReceived = 0,
    SmallDelta = 1,
    LargeDelta = 2,
    Reserved = 3,
}

/// Feedback for one sequence number slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketResult {
    pub seqnum: u16,
    pub status: PacketStatus,
    /// Receive delta in units of [`DELTA_UNIT_US`]; zero for symbols
    /// that carry no delta.  Must fit a signed byte when the status
    /// is [`PacketStatus::SmallDelta`].
    pub delta: i16,
}

/// One transport-wide feedback report.
///
/// On the wire the sequence numbers are implied: the i-th status slot
/// belongs to `base_seqnum + i`.  The writer therefore ignores the
/// `seqnum` fields and emits `packets` in order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportFeedback {
    pub ssrc: u32,
    pub media_ssrc: u32,
    pub base_seqnum: u16,
    /// 24-bit reference time, in 64 microsecond units.
    pub reference_time: u32,
    /// Feedback packet counter for loss detection on the feedback
    /// channel itself.
    pub feedback_count: u8,
    pub packets: Vec<PacketResult>,
}

impl TransportFeedback {
    pub(crate) fn read(body: &[u8]) -> Result<Self, Error> {
        let mut reader = Reader::new(body);
        let ssrc = reader.get_u32()?;
        let media_ssrc = reader.get_u32()?;
        let base_seqnum = reader.get_u16()?;
        let status_count = reader.get_u16()?;
        if status_count > MAX_STATUS_COUNT {
            return Err(Error::Capacity);
        }

        let word = reader.get_u32()?;
        let reference_time = word >> 8;
        let feedback_count = (word & 0xff) as u8;

        let mut statuses = Vec::with_capacity(status_count as usize);
        while statuses.len() < status_count as usize {
            let chunk = reader.get_u16()?;
            // every chunk is clipped to the declared status count.
            let remaining = status_count as usize - statuses.len();

            if chunk & 0x8000 == 0 {
                let symbol = status(((chunk >> 13) & 0x3) as u8)?;
                let run = (chunk & 0x1fff) as usize;
                for _ in 0..run.min(remaining) {
                    statuses.push(symbol);
                }
            } else if chunk & 0x4000 == 0 {
                for i in 0..14.min(remaining) {
                    statuses.push(if (chunk >> (13 - i)) & 1 == 1 {
                        PacketStatus::SmallDelta
                    } else {
                        PacketStatus::NotReceived
                    });
                }
            } else {
                for i in 0..7.min(remaining) {
                    statuses.push(status(
                        ((chunk >> (12 - 2 * i)) & 0x3) as u8,
                    )?);
                }
            }
        }

        let mut packets = Vec::with_capacity(statuses.len());
        for (i, status) in statuses.into_iter().enumerate() {
            let delta = match status {
                PacketStatus::SmallDelta => reader.get_u8()? as i8 as i16,
                PacketStatus::LargeDelta => reader.get_u16()? as i16,
                _ => 0,
            };

            packets.push(PacketResult {
                seqnum: base_seqnum.wrapping_add(i as u16),
                status,
                delta,
            });
        }

        Ok(Self {
            ssrc,
            media_ssrc,
            base_seqnum,
            reference_time,
            feedback_count,
            packets,
        })
    }

    /// Append this report to `buf` as one RTCP sub-packet.
    pub fn write(&self, buf: &mut BytesMut) -> Result<(), Error> {
        if self.packets.len() > MAX_STATUS_COUNT as usize {
            return Err(Error::Capacity);
        }

        if self.reference_time > 0xffffff {
            return Err(Error::InvalidInput);
        }

        for packet in &self.packets {
            if packet.status == PacketStatus::SmallDelta
                && i8::try_from(packet.delta).is_err()
            {
                return Err(Error::InvalidInput);
            }
        }

        let header_pos = reserve_header(buf);
        buf.put_u32(self.ssrc);
        buf.put_u32(self.media_ssrc);
        buf.put_u16(self.base_seqnum);
        buf.put_u16(self.packets.len() as u16);
        buf.put_u32((self.reference_time << 8) | self.feedback_count as u32);

        let mut chunks = Vec::new();
        let mut builder = ChunkBuilder::default();
        for packet in &self.packets {
            builder.push(&mut chunks, packet.status as u8);
        }

        builder.flush(&mut chunks);
        for chunk in chunks {
            buf.put_u16(chunk);
        }

        for packet in &self.packets {
            match packet.status {
                PacketStatus::SmallDelta => buf.put_i8(packet.delta as i8),
                PacketStatus::LargeDelta => buf.put_i16(packet.delta),
                _ => {}
            }
        }

        if buf.len() % 4 != 0 {
            for _ in 0..4 - buf.len() % 4 {
                buf.put_u8(0);
            }
        }

        finish_header(buf, header_pos, PacketKind::RTPFB, FORMAT);
        Ok(())
    }
}

fn status(value: u8) -> Result<PacketStatus, Error> {
    PacketStatus::try_from(value).map_err(|_| Error::InvalidInput)
}

/// Greedy status chunk builder.
///
/// Pending symbols accumulate until they no longer fit the densest
/// chunk form that can still hold them; `run` means every pending
/// symbol is equal (in which case only the count matters and `pos`
/// may exceed the buffer), `large` means some pending symbol needs
/// two bits.
#[derive(Default)]
struct ChunkBuilder {
    buffer: [u8; 13],
    pos: usize,
    run: bool,
    large: bool,
}

impl ChunkBuilder {
    fn push(&mut self, chunks: &mut Vec<u16>, symbol: u8) {
        if self.pos == 0 {
            self.buffer[0] = symbol;
            self.pos = 1;
            self.run = true;
            self.large = symbol >= 2;
            return;
        }

        if self.run {
            if symbol == self.buffer[0] {
                // keep the buffer filled while the run could still be
                // re-encoded as a vector.
                if self.pos < 13 {
                    self.buffer[self.pos] = symbol;
                }

                self.pos += 1;
                if self.pos >= MAX_RUN_LENGTH {
                    chunks.push(run_chunk(self.buffer[0], self.pos));
                    self.reset();
                }

                return;
            }

            if self.pos >= 13 {
                // the run is too long to re-encode as a vector.
                chunks.push(run_chunk(self.buffer[0], self.pos));
                self.reset();
                self.push(chunks, symbol);
                return;
            }

            // short run: keep the stored symbols and fall through to
            // vector form.
            self.run = false;
        }

        if self.pos >= 7 && self.large {
            // two-bit vector is full; spill it and keep the tail.
            chunks.push(large_chunk(&self.buffer[..7]));
            self.buffer.copy_within(7..self.pos, 0);
            self.pos -= 7;
            self.large = self.buffer[..self.pos].iter().any(|s| *s >= 2);
        } else if self.pos == 13 {
            if symbol <= 1 {
                // the incoming symbol completes a one-bit vector.
                let mut symbols = [0u8; 14];
                symbols[..13].copy_from_slice(&self.buffer);
                symbols[13] = symbol;
                chunks.push(small_chunk(&symbols));
                self.reset();
                return;
            }

            // the incoming symbol needs two bits; spill the head as a
            // two-bit vector to make room.
            chunks.push(large_chunk(&self.buffer[..7]));
            self.buffer.copy_within(7..13, 0);
            self.pos = 6;
        }

        self.buffer[self.pos] = symbol;
        self.pos += 1;
        if symbol >= 2 {
            self.large = true;
        }
    }

    fn flush(&mut self, chunks: &mut Vec<u16>) {
        if self.pos == 0 {
            return;
        }

        if self.run {
            chunks.push(run_chunk(self.buffer[0], self.pos));
        } else if self.large {
            if self.pos >= 7 {
                chunks.push(large_chunk(&self.buffer[..7]));
                if self.pos > 7 {
                    chunks.push(large_chunk(&self.buffer[7..self.pos]));
                }
            } else {
                chunks.push(large_chunk(&self.buffer[..self.pos]));
            }
        } else {
            chunks.push(small_chunk(&self.buffer[..self.pos]));
        }

        self.reset();
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.run = false;
        self.large = false;
    }
}

fn run_chunk(symbol: u8, run: usize) -> u16 {
    ((symbol as u16) << 13) | (run as u16 & 0x1fff)
}

/// one-bit status vector, up to 14 symbols MSB-first.
fn small_chunk(symbols: &[u8]) -> u16 {
    let mut chunk = 0x8000u16;
    for (i, symbol) in symbols.iter().enumerate() {
        if *symbol != 0 {
            chunk |= 1 << (13 - i);
        }
    }

    chunk
}

/// two-bit status vector, up to 7 symbols MSB-first.
fn large_chunk(symbols: &[u8]) -> u16 {
    let mut chunk = 0xc000u16;
    for (i, symbol) in symbols.iter().enumerate() {
        chunk |= ((*symbol as u16) & 0x3) << (12 - 2 * i);
    }

    chunk
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(statuses: &[(PacketStatus, i16)]) -> TransportFeedback {
        TransportFeedback {
            ssrc: 0x11111111,
            media_ssrc: 0x22222222,
            base_seqnum: 100,
            reference_time: 0x0abcde,
            feedback_count: 3,
            packets: statuses
                .iter()
                .enumerate()
                .map(|(i, (status, delta))| PacketResult {
                    seqnum: 100u16.wrapping_add(i as u16),
                    status: *status,
                    delta: *delta,
                })
                .collect(),
        }
    }

    fn round_trip(feedback: &TransportFeedback) -> TransportFeedback {
        let mut buf = BytesMut::new();
        feedback.write(&mut buf).unwrap();
        assert_eq!(buf.len() % 4, 0);
        assert_eq!(buf[0], 0x8f);
        assert_eq!(buf[1], 205);
        TransportFeedback::read(&buf[4..]).unwrap()
    }

    #[test]
    fn single_run_chunk() {
        let fb = feedback(&[(PacketStatus::SmallDelta, 4); 20]);
        assert_eq!(round_trip(&fb), fb);
    }

    #[test]
    fn not_received_run_carries_no_deltas() {
        let fb = feedback(&[(PacketStatus::NotReceived, 0); 9]);
        let mut buf = BytesMut::new();
        fb.write(&mut buf).unwrap();

        // header + preamble + one chunk + pad, no delta bytes.
        assert_eq!(buf.len(), 4 + 12 + 4);
        assert_eq!(TransportFeedback::read(&buf[4..]).unwrap(), fb);
    }

    #[test]
    fn exactly_fourteen_one_bit_symbols() {
        let statuses: Vec<_> = (0..14)
            .map(|i| {
                if i % 3 == 0 {
                    (PacketStatus::NotReceived, 0)
                } else {
                    (PacketStatus::SmallDelta, 8)
                }
            })
            .collect();

        let fb = feedback(&statuses);
        let mut buf = BytesMut::new();
        fb.write(&mut buf).unwrap();

        // one status vector chunk covers all 14 symbols.
        let chunk = u16::from_be_bytes([buf[16], buf[17]]);
        assert_eq!(chunk & 0xc000, 0x8000);
        assert_eq!(TransportFeedback::read(&buf[4..]).unwrap(), fb);
    }

    #[test]
    fn mixed_symbols() {
        use PacketStatus::*;

        // status_count=20: three runs too short for run chunks plus
        // reserved symbols at the tail.
        let mut statuses = vec![
            (SmallDelta, 40),
            (SmallDelta, 40),
            (SmallDelta, 40),
            (NotReceived, 0),
            (NotReceived, 0),
            (LargeDelta, 1200),
            (LargeDelta, 1200),
        ];

        for _ in 0..8 {
            statuses.push((SmallDelta, 40));
        }

        for _ in 0..5 {
            statuses.push((Reserved, 0));
        }

        let fb = feedback(&statuses);
        assert_eq!(round_trip(&fb), fb);
    }

    #[test]
    fn negative_deltas() {
        let fb = feedback(&[
            (PacketStatus::SmallDelta, -5),
            (PacketStatus::LargeDelta, -3000),
            (PacketStatus::SmallDelta, -128),
        ]);

        assert_eq!(round_trip(&fb), fb);
    }

    #[test]
    fn small_delta_must_fit_a_byte() {
        let fb = feedback(&[(PacketStatus::SmallDelta, 300)]);
        let mut buf = BytesMut::new();
        assert_eq!(fb.write(&mut buf), Err(Error::InvalidInput));
    }

    #[test]
    fn status_count_bound_and_longest_run() {
        let fb = feedback(
            &(0..MAX_RUN_LENGTH + 20)
                .map(|_| (PacketStatus::NotReceived, 0))
                .collect::<Vec<_>>(),
        );

        // over MAX_STATUS_COUNT, rejected.
        let mut buf = BytesMut::new();
        assert_eq!(fb.write(&mut buf), Err(Error::Capacity));

        let fb = feedback(
            &(0..MAX_RUN_LENGTH)
                .map(|_| (PacketStatus::NotReceived, 0))
                .collect::<Vec<_>>(),
        );

        assert_eq!(round_trip(&fb), fb);
    }

    #[test]
    fn status_count_bound_is_enforced_on_read() {
        let mut buf = BytesMut::new();
        buf.put_u32(1);
        buf.put_u32(2);
        buf.put_u16(0);
        buf.put_u16(MAX_STATUS_COUNT + 1);
        buf.put_u32(0);

        assert_eq!(
            TransportFeedback::read(&buf).unwrap_err(),
            Error::Capacity
        );
    }

    #[test]
    fn thirteen_small_then_large_symbol() {
        // forces the 13-pending boundary with a two-bit incoming
        // symbol: the head spills as a two-bit vector.
        let mut statuses = Vec::new();
        for i in 0..13 {
            statuses.push(if i % 2 == 0 {
                (PacketStatus::SmallDelta, 1)
            } else {
                (PacketStatus::NotReceived, 0)
            });
        }

        statuses.push((PacketStatus::LargeDelta, 900));
        let fb = feedback(&statuses);
        assert_eq!(round_trip(&fb), fb);
    }
}
