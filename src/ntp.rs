//! NTP timestamp arithmetic.
//!
//! RTCP sender reports carry wallclock time as a 64-bit NTP timestamp:
//! unsigned seconds in the high word and a binary fraction of a second
//! (2^32 ticks) in the low word.  Report blocks echo it back compacted
//! to the middle 32 bits (LSR), which is the 32-bit form with a 2^16
//! fraction.  Both forms convert to and from microseconds here;
//! fractional remainders truncate toward zero.

use std::time::Duration;

/// 64-bit NTP timestamp: 32-bit seconds, 32-bit fraction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NtpTimestamp64 {
    pub seconds: u32,
    pub fraction: u32,
}

/// 32-bit NTP timestamp: 16-bit seconds, 16-bit fraction.
///
/// This is the compact form carried in the LSR field of reception
/// report blocks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NtpTimestamp32 {
    pub seconds: u16,
    pub fraction: u16,
}

impl NtpTimestamp64 {
    /// signed difference in microseconds.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use faster_rtp::ntp::NtpTimestamp64;
    ///
    /// let a = NtpTimestamp64 { seconds: 1, fraction: 0x40000000 };
    /// let b = NtpTimestamp64 { seconds: 1, fraction: 0x20000000 };
    /// assert_eq!(a.diff_us(b), 125000);
    /// assert_eq!(b.diff_us(a), -125000);
    /// ```
    pub fn diff_us(self, other: Self) -> i64 {
        let mut diff =
            (self.seconds as i64 - other.seconds as i64) * 1_000_000;
        diff += ((self.fraction as i64 - other.fraction as i64) * 1_000_000)
            >> 32;
        diff
    }

    pub fn to_us(self) -> u64 {
        (self.seconds as u64 * 1_000_000)
            + ((self.fraction as u64 * 1_000_000) >> 32)
    }

    pub fn from_us(us: u64) -> Self {
        Self {
            seconds: (us / 1_000_000) as u32,
            fraction: (((us % 1_000_000) << 32) / 1_000_000) as u32,
        }
    }

    /// duration since the NTP epoch.
    pub fn to_duration(self) -> Duration {
        let nanos = (self.fraction as u64 * 1_000_000_000) >> 32;
        Duration::new(self.seconds as u64, nanos as u32)
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self {
            seconds: duration.as_secs() as u32,
            fraction: (((duration.subsec_nanos() as u64) << 32)
                / 1_000_000_000) as u32,
        }
    }

    /// compact to the middle 32 bits: low 16 of seconds, high 16 of
    /// fraction.  This is the LSR form of RFC 3550 section 6.4.1.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use faster_rtp::ntp::NtpTimestamp64;
    ///
    /// let t = NtpTimestamp64 { seconds: 0x00011234, fraction: 0x5678abcd };
    /// let c = t.compact();
    /// assert_eq!(c.seconds, 0x1234);
    /// assert_eq!(c.fraction, 0x5678);
    /// ```
    pub fn compact(self) -> NtpTimestamp32 {
        NtpTimestamp32 {
            seconds: (self.seconds & 0xffff) as u16,
            fraction: ((self.fraction >> 16) & 0xffff) as u16,
        }
    }
}

impl NtpTimestamp32 {
    /// signed difference in microseconds.
    ///
    /// # Unit Test
    ///
    /// ```
    /// use faster_rtp::ntp::NtpTimestamp32;
    ///
    /// let a = NtpTimestamp32 { seconds: 1, fraction: 0x4000 };
    /// let b = NtpTimestamp32 { seconds: 1, fraction: 0x2000 };
    /// assert_eq!(a.diff_us(b), 125000);
    /// assert_eq!(b.diff_us(a), -125000);
    /// ```
    pub fn diff_us(self, other: Self) -> i64 {
        let mut diff =
            (self.seconds as i64 - other.seconds as i64) * 1_000_000;
        diff += ((self.fraction as i64 - other.fraction as i64) * 1_000_000)
            >> 16;
        diff
    }

    pub fn to_us(self) -> u64 {
        (self.seconds as u64 * 1_000_000)
            + ((self.fraction as u64 * 1_000_000) >> 16)
    }

    pub fn from_us(us: u64) -> Self {
        Self {
            seconds: (us / 1_000_000) as u16,
            fraction: (((us % 1_000_000) << 16) / 1_000_000) as u16,
        }
    }

    pub fn to_duration(self) -> Duration {
        let nanos = (self.fraction as u64 * 1_000_000_000) >> 16;
        Duration::new(self.seconds as u64, nanos as u32)
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self {
            seconds: duration.as_secs() as u16,
            fraction: (((duration.subsec_nanos() as u64) << 16)
                / 1_000_000_000) as u16,
        }
    }

    /// widen back to the 64-bit form; the low fraction bits are lost
    /// forever, so this only restores 2^-16 precision.
    pub fn extend(self) -> NtpTimestamp64 {
        NtpTimestamp64 {
            seconds: self.seconds as u32,
            fraction: (self.fraction as u32) << 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_us_64() {
        let table: [(NtpTimestamp64, NtpTimestamp64, i64); 6] = [
            (ts64(1, 0x40000000), ts64(1, 0x20000000), 125_000),
            (ts64(1, 0x20000000), ts64(1, 0x40000000), -125_000),
            (ts64(5, 0x40000000), ts64(2, 0x20000000), 3_125_000),
            (ts64(5, 0x20000000), ts64(2, 0x40000000), 2_875_000),
            (ts64(2, 0x40000000), ts64(5, 0x20000000), -2_875_000),
            (ts64(2, 0x20000000), ts64(5, 0x40000000), -3_125_000),
        ];

        for (a, b, diff) in table {
            assert_eq!(a.diff_us(b), diff);
            assert_eq!(b.diff_us(a), -diff);
        }
    }

    #[test]
    fn diff_us_32() {
        let table: [(NtpTimestamp32, NtpTimestamp32, i64); 6] = [
            (ts32(1, 0x4000), ts32(1, 0x2000), 125_000),
            (ts32(1, 0x2000), ts32(1, 0x4000), -125_000),
            (ts32(5, 0x4000), ts32(2, 0x2000), 3_125_000),
            (ts32(5, 0x2000), ts32(2, 0x4000), 2_875_000),
            (ts32(2, 0x4000), ts32(5, 0x2000), -2_875_000),
            (ts32(2, 0x2000), ts32(5, 0x4000), -3_125_000),
        ];

        for (a, b, diff) in table {
            assert_eq!(a.diff_us(b), diff);
            assert_eq!(b.diff_us(a), -diff);
        }
    }

    #[test]
    fn us_round_trip() {
        // exactly representable: half a second.
        let t = NtpTimestamp64::from_us(1_500_000);
        assert_eq!(t.seconds, 1);
        assert_eq!(t.fraction, 0x8000_0000);
        assert_eq!(t.to_us(), 1_500_000);

        let t = NtpTimestamp32::from_us(2_250_000);
        assert_eq!(t.seconds, 2);
        assert_eq!(t.fraction, 0x4000);
        assert_eq!(t.to_us(), 2_250_000);
    }

    #[test]
    fn duration_round_trip() {
        let t = NtpTimestamp64::from_duration(Duration::new(7, 250_000_000));
        assert_eq!(t.seconds, 7);
        assert_eq!(t.fraction, 0x4000_0000);
        assert_eq!(t.to_duration(), Duration::new(7, 250_000_000));
    }

    #[test]
    fn compact_extend() {
        let t = NtpTimestamp64 {
            seconds: 0xaaaa_1234,
            fraction: 0x5678_ffff,
        };

        let c = t.compact();
        assert_eq!(c, ts32(0x1234, 0x5678));
        assert_eq!(
            c.extend(),
            ts64(0x1234, 0x5678_0000)
        );
    }

    fn ts64(seconds: u32, fraction: u32) -> NtpTimestamp64 {
        NtpTimestamp64 { seconds, fraction }
    }

    fn ts32(seconds: u16, fraction: u16) -> NtpTimestamp32 {
        NtpTimestamp32 { seconds, fraction }
    }
}
