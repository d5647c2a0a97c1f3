//! ### BYE: Goodbye RTCP Packet
//!
//! ```text
//!        0                   1                   2                   3
//!        0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!       |V=2|P|    SC   |   PT=BYE=203  |             length            |
//!       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!       |                           SSRC/CSRC                           |
//!       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!       :                              ...                              :
//!       +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! (opt) |     length    |               reason for leaving            ...
//!       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::{
    rtcp::{finish_header, reserve_header, PacketKind},
    util::{pad_size, Reader},
    Error,
};

use bytes::{BufMut, BytesMut};

/// Indicates that one or more sources are no longer active.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Bye<'a> {
    pub sources: Vec<u32>,
    /// Optional reason for leaving; many senders omit it entirely.
    pub reason: Option<&'a [u8]>,
}

impl<'a> Bye<'a> {
    pub(crate) fn read(body: &'a [u8], count: u8) -> Result<Self, Error> {
        let mut reader = Reader::new(body);

        let mut sources = Vec::with_capacity(count as usize);
        for _ in 0..count {
            sources.push(reader.get_u32()?);
        }

        let reason = if !reader.is_empty() {
            let reason_len = reader.get_u8()? as usize;
            if reason_len > reader.remaining() {
                return Err(Error::BadLength);
            }

            Some(reader.slice(reason_len)?)
        } else {
            None
        };

        Ok(Self { sources, reason })
    }

    /// Append this goodbye to `buf` as one RTCP sub-packet.
    pub fn write(&self, buf: &mut BytesMut) -> Result<(), Error> {
        if self.sources.len() > 31 {
            return Err(Error::InvalidInput);
        }

        let header_pos = reserve_header(buf);
        for source in &self.sources {
            buf.put_u32(*source);
        }

        if let Some(reason) = self.reason {
            if reason.len() > 255 {
                return Err(Error::InvalidInput);
            }

            buf.put_u8(reason.len() as u8);
            buf.put_slice(reason);
            for _ in 0..pad_size(buf.len()) {
                buf.put_u8(0);
            }
        }

        finish_header(
            buf,
            header_pos,
            PacketKind::BYE,
            self.sources.len() as u8,
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_reason() {
        let bye = Bye {
            sources: vec![0x11111111, 0x22222222],
            reason: Some(b"teardown"),
        };

        let mut buf = BytesMut::new();
        bye.write(&mut buf).unwrap();
        assert_eq!(buf.len() % 4, 0);

        let parsed = Bye::read(&buf[4..], 2).unwrap();
        assert_eq!(parsed.sources, bye.sources);
        assert_eq!(parsed.reason, Some(&b"teardown"[..]));
    }

    #[test]
    fn reason_is_optional() {
        let bye = Bye {
            sources: vec![0xdeadbeef],
            reason: None,
        };

        let mut buf = BytesMut::new();
        bye.write(&mut buf).unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(Bye::read(&buf[4..], 1).unwrap(), bye);
    }

    #[test]
    fn empty_bye() {
        let bye = Bye::default();
        let mut buf = BytesMut::new();
        bye.write(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x80, 0xcb, 0x00, 0x00]);
        assert_eq!(Bye::read(&buf[4..], 0).unwrap(), bye);
    }

    #[test]
    fn truncated_reason_is_rejected() {
        // one source, then a reason length pointing past the end.
        let body = [0x00, 0x00, 0x00, 0x07, 0x08, 0x61, 0x62, 0x63];
        assert_eq!(Bye::read(&body, 1).unwrap_err(), Error::BadLength);
    }
}
