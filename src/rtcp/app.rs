//! ### APP: Application-Defined RTCP Packet
//!
//! ```text
//!     0                   1                   2                   3
//!     0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!    |V=2|P| subtype |   PT=APP=204  |             length            |
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!    |                           SSRC/CSRC                           |
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!    |                          name (ASCII)                         |
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!    |                   application-dependent data                ...
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The APP packet is intended for experimental use: the four ASCII
//! characters of the name scope the subtype and data, both of which
//! are opaque to this layer.

use crate::{
    rtcp::{finish_header, reserve_header, PacketKind},
    util::{pad_size, Reader},
    Error,
};

use bytes::{BufMut, BytesMut};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct App<'a> {
    pub ssrc: u32,
    /// Four ASCII characters chosen by the application.
    pub name: [u8; 4],
    /// Carried in the count field of the header, 0..31.
    pub subtype: u8,
    pub data: &'a [u8],
}

impl<'a> App<'a> {
    pub(crate) fn read(body: &'a [u8], count: u8) -> Result<Self, Error> {
        let mut reader = Reader::new(body);
        let ssrc = reader.get_u32()?;
        let name_bytes = reader.slice(4)?;
        let data = reader.slice(reader.remaining())?;

        Ok(Self {
            ssrc,
            name: [name_bytes[0], name_bytes[1], name_bytes[2], name_bytes[3]],
            subtype: count,
            data,
        })
    }

    /// Append this packet to `buf` as one RTCP sub-packet.
    pub fn write(&self, buf: &mut BytesMut) -> Result<(), Error> {
        if self.subtype > 31 {
            return Err(Error::InvalidInput);
        }

        let header_pos = reserve_header(buf);
        buf.put_u32(self.ssrc);
        buf.put_slice(&self.name);
        buf.put_slice(self.data);

        for _ in 0..pad_size(buf.len()) {
            buf.put_u8(0);
        }

        finish_header(buf, header_pos, PacketKind::APP, self.subtype);
        Ok(())
    }
}
