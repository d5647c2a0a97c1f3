//! Receiver-side jitter buffer.
//!
//! Incoming packets are queued in sequence number order and released
//! to a consumer callback on a schedule that absorbs network jitter.
//! The release time of a packet is where it *should* arrive according
//! to the sender's clock, shifted by an online estimate of the skew
//! between the sender's and the receiver's clock progress: the
//! estimator keeps a sliding window of `receive delta - send delta`
//! samples and tracks the window minimum with an exponential average,
//! so queueing delays inflate individual samples without dragging the
//! estimate along.
//!
//! Time never comes from inside: the caller stamps every packet with
//! its receive time (`in_timestamp`, monotonic microseconds) and the
//! unwrapped RTP timestamp (`rtp_timestamp_ext`), and drives release
//! by calling [`JitterBuffer::process`] with the current time at
//! whatever cadence suits it.

use crate::{
    packet::RtpPacket,
    util::{diff_seqnum, rtp_timestamp_to_us},
    Error,
};

use std::collections::VecDeque;

const SKEW_WINDOW_MAX_SIZE: usize = 512;
const SKEW_WINDOW_TIMEOUT: u64 = 2_000_000;
const SKEW_AVG_ALPHA: i64 = 128;
const SKEW_LARGE_GAP: i64 = 1_000_000;

const JITTER_AVG_ALPHA: i64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterBufferConfig {
    /// RTP clock rate of the stream, in Hz.  Must not be zero.
    pub clk_rate: u32,
    /// Extra budget in microseconds granted to late packets on top of
    /// their estimated release time.
    pub delay: u64,
}

/// Running estimator values, see [`JitterBuffer::info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterInfo {
    pub clk_rate: u32,
    /// RFC 3550 interarrival jitter estimate, in microseconds.
    pub jitter_avg: u32,
    /// Current clock skew estimate, in microseconds.
    pub skew_avg: i64,
}

/// Reordering queue with skew-compensated release scheduling.
///
/// The consumer callback receives each released packet by value
/// together with the gap (in sequence numbers) to the previous
/// release; it is invoked synchronously from [`JitterBuffer::process`].
///
/// # Unit Test
///
/// ```
/// use bytes::Bytes;
/// use faster_rtp::jitter::{JitterBuffer, JitterBufferConfig};
/// use faster_rtp::packet::RtpPacket;
///
/// let mut released = Vec::new();
/// let mut jitter = JitterBuffer::new(
///     JitterBufferConfig { clk_rate: 90000, delay: 50000 },
///     |pkt: RtpPacket, _gap| released.push(pkt.header.sequence_number),
/// )
/// .unwrap();
///
/// jitter.clear(1);
/// for (seqnum, at) in [(2u16, 1_020_000u64), (1, 1_000_000)] {
///     let mut pkt = RtpPacket::read(Bytes::from(vec![
///         0x80, 0x60, (seqnum >> 8) as u8, seqnum as u8, 0, 0, 0, 0,
///         0, 0, 0, 1,
///     ]))
///     .unwrap();
///
///     pkt.in_timestamp = at;
///     pkt.rtp_timestamp_ext = (seqnum as u64) * 1800;
///     jitter.enqueue(pkt);
/// }
///
/// jitter.process(2_000_000);
/// drop(jitter);
/// assert_eq!(released, vec![1, 2]);
/// ```
pub struct JitterBuffer<F> {
    cfg: JitterBufferConfig,
    on_packet: F,

    packets: VecDeque<RtpPacket>,
    next_seqnum: u16,

    /// Anchor of the skew estimator: (receive time, RTP time) of the
    /// packet the current estimation run started from.
    first: Option<(u64, u64)>,
    /// Previous sample, feeding the jitter estimator.
    last: Option<(u64, u64)>,

    window: [i64; SKEW_WINDOW_MAX_SIZE],
    window_pos: usize,
    window_size: usize,
    window_start: u64,
    window_min: i64,
    skew_avg: i64,

    /// Estimated jitter (in us).
    jitter_avg: u32,
}

impl<F> JitterBuffer<F>
where
    F: FnMut(RtpPacket, u16),
{
    pub fn new(
        cfg: JitterBufferConfig,
        on_packet: F,
    ) -> Result<Self, Error> {
        if cfg.clk_rate == 0 {
            return Err(Error::InvalidInput);
        }

        Ok(Self {
            cfg,
            on_packet,
            packets: VecDeque::new(),
            next_seqnum: 0,
            first: None,
            last: None,
            window: [0; SKEW_WINDOW_MAX_SIZE],
            window_pos: 0,
            window_size: 0,
            window_start: 0,
            window_min: 0,
            skew_avg: 0,
            jitter_avg: 0,
        })
    }

    /// Drop everything queued, reset the estimators and start over
    /// expecting `next_seqnum`.
    pub fn clear(&mut self, next_seqnum: u16) {
        self.packets.clear();
        self.first = None;
        self.last = None;
        self.window_pos = 0;
        self.window_size = 0;
        self.window_start = 0;
        self.window_min = 0;
        self.skew_avg = 0;
        self.jitter_avg = 0;
        self.next_seqnum = next_seqnum;
    }

    /// Queue one packet.
    ///
    /// `in_timestamp` and `rtp_timestamp_ext` must already be set;
    /// `out_timestamp` is computed here.  Packets older than the next
    /// expected sequence number and duplicates of queued packets are
    /// dropped; either way the estimators have been fed, and neither
    /// case is an error.
    pub fn enqueue(&mut self, mut pkt: RtpPacket) {
        let in_timestamp = pkt.in_timestamp;
        let rtp_timestamp = pkt.rtp_timestamp_ext;

        if self.first.is_none() {
            self.reset_skew(in_timestamp, rtp_timestamp);
        }

        if let Some((last_rx, last_rtp)) = self.last {
            self.compute_jitter(in_timestamp, rtp_timestamp, last_rx, last_rtp);
        }

        pkt.out_timestamp = self.compute_skew(in_timestamp, rtp_timestamp);

        self.last = Some((in_timestamp, rtp_timestamp));

        if diff_seqnum(self.next_seqnum, pkt.header.sequence_number) > 0 {
            // old packet
            return;
        }

        // Most packets arrive in order, so search from the tail.
        for i in (0..self.packets.len()).rev() {
            let diff = diff_seqnum(
                self.packets[i].header.sequence_number,
                pkt.header.sequence_number,
            );

            if diff < 0 {
                self.packets.insert(i + 1, pkt);
                return;
            }

            if diff == 0 {
                // duplicate packet
                return;
            }
        }

        self.packets.push_front(pkt);
    }

    /// Release every packet that is due at `now` (microseconds on the
    /// same monotonic clock as `in_timestamp`).
    ///
    /// The head of the queue is released when it is the next expected
    /// packet, or once its release deadline has passed, in which case
    /// whatever gap precedes it is treated as permanent loss.
    pub fn process(&mut self, now: u64) {
        while let Some(head) = self.packets.front() {
            if head.header.sequence_number != self.next_seqnum
                && now < head.out_timestamp + self.cfg.delay
            {
                break;
            }

            // pop_front cannot fail while front() is Some.
            if let Some(pkt) = self.packets.pop_front() {
                let gap = diff_seqnum(
                    pkt.header.sequence_number,
                    self.next_seqnum,
                ) as u16;

                self.next_seqnum =
                    pkt.header.sequence_number.wrapping_add(1);
                (self.on_packet)(pkt, gap);
            }
        }
    }

    pub fn info(&self) -> JitterInfo {
        JitterInfo {
            clk_rate: self.cfg.clk_rate,
            jitter_avg: self.jitter_avg,
            skew_avg: self.skew_avg,
        }
    }

    /// queued packet count.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    fn reset_skew(&mut self, rx_timestamp: u64, rtp_timestamp: u64) {
        self.first = Some((rx_timestamp, rtp_timestamp));
        self.window_pos = 0;
        self.window_size = 0;
        self.window_start = 0;
        self.window_min = 0;
        self.skew_avg = 0;
    }

    /// Interarrival jitter computation.
    ///
    /// J(i) = J(i-1) + (|D(i-1,i)| - J(i-1))/16
    /// D(i,j) = (Rj - Ri) - (Sj - Si) = (Rj - Sj) - (Ri - Si)
    /// where S is the send time and R the arrival time of a packet,
    /// both in microseconds.
    fn compute_jitter(
        &mut self,
        rx_timestamp: u64,
        rtp_timestamp: u64,
        last_rx: u64,
        last_rtp: u64,
    ) {
        let clk_rate = self.cfg.clk_rate;

        let delta_rx = rx_timestamp as i64 - last_rx as i64;
        let delta_rtp = rtp_timestamp as i64 - last_rtp as i64;
        let delta_rtp = if delta_rtp > 0 {
            rtp_timestamp_to_us(delta_rtp as u64, clk_rate) as i64
        } else {
            -(rtp_timestamp_to_us(-delta_rtp as u64, clk_rate) as i64)
        };

        let jitter = (delta_rx - delta_rtp).abs();
        self.jitter_avg = (self.jitter_avg as i64
            + (jitter - self.jitter_avg as i64) / JITTER_AVG_ALPHA)
            as u32;
    }

    /// Estimate the release time for a packet received at
    /// `rx_timestamp` carrying (extended) RTP time `rtp_timestamp`.
    fn compute_skew(&mut self, rx_timestamp: u64, rtp_timestamp: u64) -> u64 {
        let clk_rate = self.cfg.clk_rate;

        let (mut first_rx, first_rtp) = match self.first {
            Some(anchor) => anchor,
            None => {
                self.reset_skew(rx_timestamp, rtp_timestamp);
                (rx_timestamp, rtp_timestamp)
            }
        };

        let mut delta_send = rtp_timestamp as i64 - first_rtp as i64;
        if delta_send < 0 {
            // The sender probably restarted
            log::debug!("reset skew: delta_send({}) < 0", delta_send);
            self.reset_skew(rx_timestamp, rtp_timestamp);
            first_rx = rx_timestamp;
            delta_send = 0;
        } else {
            delta_send = rtp_timestamp_to_us(delta_send as u64, clk_rate) as i64;
        }

        let delta_recv = rx_timestamp as i64 - first_rx as i64;

        // Current skew
        let mut skew = delta_recv - delta_send;

        // Check for large gaps
        if (skew - self.skew_avg).abs() > SKEW_LARGE_GAP {
            log::debug!(
                "reset skew: skew({}) - skew_avg({}) too large",
                skew,
                self.skew_avg
            );

            self.reset_skew(rx_timestamp, rtp_timestamp);
            first_rx = rx_timestamp;
            delta_send = 0;
            skew = 0;
        }

        if self.window_size == 0 {
            // Initialization stage: fill the window while converging
            // towards its running minimum.
            self.window[self.window_pos] = skew;
            if self.window_pos == 0 {
                // First value in window
                self.window_start = rx_timestamp;
                self.window_min = skew;
            } else if skew < self.window_min {
                // New minimum found
                self.window_min = skew;
            }

            self.window_pos += 1;
            if self.window_pos >= SKEW_WINDOW_MAX_SIZE
                || rx_timestamp >= self.window_start + SKEW_WINDOW_TIMEOUT
            {
                // Window is complete
                self.window_size = self.window_pos;
                self.window_pos = 0;
                self.skew_avg = self.window_min;
            } else if rx_timestamp >= self.window_start {
                let perc_time = (rx_timestamp - self.window_start) * 100
                    / SKEW_WINDOW_TIMEOUT;
                let perc_window =
                    self.window_pos * 100 / SKEW_WINDOW_MAX_SIZE;
                let perc = (perc_time as i64).max(perc_window as i64);

                // Parabolic function
                let perc = perc * perc;
                self.skew_avg +=
                    perc * (self.window_min - self.skew_avg) / 10_000;
            } else {
                // Might be different links
                log::debug!("reset skew: window_start > rx_timestamp");
                self.reset_skew(rx_timestamp, rtp_timestamp);
                return rx_timestamp;
            }
        } else {
            // Remember the old value and set the new one
            let old = self.window[self.window_pos];
            self.window[self.window_pos] = skew;

            if skew < self.window_min {
                // New minimum found
                self.window_min = skew;
            } else if old == self.window_min {
                // We replaced the current min value, find the new min
                self.window_min = i64::MAX;
                for i in 0..self.window_size {
                    if self.window[i] == old {
                        // The old min still exists elsewhere, keep it
                        self.window_min = self.window[i];
                        break;
                    } else if self.window[i] < self.window_min {
                        self.window_min = self.window[i];
                    }
                }
            }

            // Update position and wrap if needed
            self.window_pos += 1;
            if self.window_pos >= self.window_size {
                self.window_pos = 0;
            }

            // Sliding average
            self.skew_avg +=
                (self.window_min - self.skew_avg) / SKEW_AVG_ALPHA;
        }

        // Estimated out timestamp
        let out_timestamp = first_rx as i64 + delta_send + self.skew_avg;

        // Make sure we don't go backwards
        if out_timestamp + (self.cfg.delay as i64) < rx_timestamp as i64 {
            log::debug!(
                "reset skew: out({}) + delay({}) < in({})",
                out_timestamp,
                self.cfg.delay,
                rx_timestamp
            );

            self.reset_skew(rx_timestamp, rtp_timestamp);
            return rx_timestamp;
        }

        out_timestamp.max(0) as u64
    }
}
