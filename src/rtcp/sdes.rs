//! ### SDES: Source Description RTCP Packet
//!
//! ```text
//!         0                   1                   2                   3
//!         0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! header |V=2|P|    SC   |  PT=SDES=202  |             length            |
//!        +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! chunk  |                          SSRC/CSRC_1                          |
//!   1    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!        |                           SDES items                          |
//!        |                              ...                              |
//!        +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! ```
//!
//! Items are a type octet, a length octet and up to 255 bytes of
//! content.  A chunk ends at a zero type octet and is padded with
//! zeros to the next 32-bit boundary.  PRIV items subdivide their
//! content into a length-prefixed prefix string followed by a value.

use crate::{
    rtcp::{finish_header, reserve_header, PacketKind},
    util::{pad_size, Reader},
    Error,
};

use bytes::{BufMut, BytesMut};
use num_enum::TryFromPrimitive;

/// SDES item type.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
pub enum SdesItemKind {
    End = 0,
    Cname = 1,
    Name = 2,
    Email = 3,
    Phone = 4,
    Loc = 5,
    Tool = 6,
    Note = 7,
    Priv = 8,
}

/// short name for an SDES item type byte.
///
/// # Unit Test
///
/// ```
/// assert_eq!(faster_rtp::rtcp::sdes::item_type_str(1), "CNAME");
/// assert_eq!(faster_rtp::rtcp::sdes::item_type_str(8), "PRIV");
/// assert_eq!(faster_rtp::rtcp::sdes::item_type_str(42), "UNKNOWN");
/// ```
pub fn item_type_str(kind: u8) -> &'static str {
    match SdesItemKind::try_from(kind) {
        Ok(SdesItemKind::End) => "END",
        Ok(SdesItemKind::Cname) => "CNAME",
        Ok(SdesItemKind::Name) => "NAME",
        Ok(SdesItemKind::Email) => "EMAIL",
        Ok(SdesItemKind::Phone) => "PHONE",
        Ok(SdesItemKind::Loc) => "LOC",
        Ok(SdesItemKind::Tool) => "TOOL",
        Ok(SdesItemKind::Note) => "NOTE",
        Ok(SdesItemKind::Priv) => "PRIV",
        Err(_) => "UNKNOWN",
    }
}

/// Item content: ordinary items carry opaque bytes, PRIV items split
/// into a prefix naming the extension and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdesItemValue<'a> {
    Data(&'a [u8]),
    Priv { prefix: &'a [u8], value: &'a [u8] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdesItem<'a> {
    pub item_type: u8,
    pub value: SdesItemValue<'a>,
}

impl<'a> SdesItem<'a> {
    /// ordinary item carrying `data`.
    pub fn new(kind: SdesItemKind, data: &'a [u8]) -> Self {
        Self {
            item_type: kind as u8,
            value: SdesItemValue::Data(data),
        }
    }

    /// PRIV item with a prefix string and a value.
    pub fn private(prefix: &'a [u8], value: &'a [u8]) -> Self {
        Self {
            item_type: SdesItemKind::Priv as u8,
            value: SdesItemValue::Priv { prefix, value },
        }
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), Error> {
        match self.value {
            SdesItemValue::Data(data) => {
                if data.len() > 255 {
                    return Err(Error::InvalidInput);
                }

                buf.put_u8(self.item_type);
                buf.put_u8(data.len() as u8);
                buf.put_slice(data);
            }
            SdesItemValue::Priv { prefix, value } => {
                let data_len = prefix.len() + value.len() + 1;
                if data_len > 255 {
                    return Err(Error::InvalidInput);
                }

                buf.put_u8(self.item_type);
                buf.put_u8(data_len as u8);
                buf.put_u8(prefix.len() as u8);
                buf.put_slice(prefix);
                buf.put_slice(value);
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesChunk<'a> {
    pub ssrc: u32,
    pub items: Vec<SdesItem<'a>>,
}

/// Source Description packet: one chunk of items per source.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sdes<'a> {
    pub chunks: Vec<SdesChunk<'a>>,
}

impl<'a> Sdes<'a> {
    pub(crate) fn read(body: &'a [u8], count: u8) -> Result<Self, Error> {
        let mut reader = Reader::new(body);
        let mut chunks = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let ssrc = reader.get_u32()?;
            let mut items = Vec::new();

            while !reader.is_empty() {
                let item_type = reader.get_u8()?;
                if item_type == SdesItemKind::End as u8 {
                    break;
                }

                let data_len = reader.get_u8()? as usize;
                if data_len > reader.remaining() {
                    return Err(Error::BadLength);
                }

                let data = reader.slice(data_len)?;
                let value = if item_type == SdesItemKind::Priv as u8
                    && !data.is_empty()
                {
                    let prefix_len = data[0] as usize;
                    if prefix_len + 1 > data.len() {
                        return Err(Error::BadLength);
                    }

                    SdesItemValue::Priv {
                        prefix: &data[1..1 + prefix_len],
                        value: &data[1 + prefix_len..],
                    }
                } else {
                    SdesItemValue::Data(data)
                };

                items.push(SdesItem { item_type, value });
            }

            // chunks are zero-padded to the next word.
            let pad = pad_size(reader.pos()).min(reader.remaining());
            reader.skip(pad)?;

            chunks.push(SdesChunk { ssrc, items });
        }

        Ok(Self { chunks })
    }

    /// Append this description to `buf` as one RTCP sub-packet.
    pub fn write(&self, buf: &mut BytesMut) -> Result<(), Error> {
        if self.chunks.len() > 31 {
            return Err(Error::InvalidInput);
        }

        let header_pos = reserve_header(buf);
        for chunk in &self.chunks {
            buf.put_u32(chunk.ssrc);
            for item in &chunk.items {
                item.write(buf)?;
            }

            // terminator, then pad the chunk until aligned.
            buf.put_u8(SdesItemKind::End as u8);
            for _ in 0..pad_size(buf.len()) {
                buf.put_u8(0);
            }
        }

        finish_header(
            buf,
            header_pos,
            PacketKind::SDES,
            self.chunks.len() as u8,
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cname_and_priv_round_trip() {
        let sdes = Sdes {
            chunks: vec![SdesChunk {
                ssrc: 1,
                items: vec![
                    SdesItem::new(SdesItemKind::Cname, b"abc"),
                    SdesItem::private(b"x", b"yz"),
                ],
            }],
        };

        let mut buf = BytesMut::new();
        sdes.write(&mut buf).unwrap();
        assert_eq!(buf.len() % 4, 0);

        let parsed = Sdes::read(&buf[4..], 1).unwrap();
        assert_eq!(parsed, sdes);
        match parsed.chunks[0].items[1].value {
            SdesItemValue::Priv { prefix, value } => {
                assert_eq!(prefix.len(), 1);
                assert_eq!(prefix, b"x");
                assert_eq!(value, b"yz");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn terminator_only_chunk() {
        let sdes = Sdes {
            chunks: vec![SdesChunk {
                ssrc: 0xcafebabe,
                items: vec![],
            }],
        };

        let mut buf = BytesMut::new();
        sdes.write(&mut buf).unwrap();

        // ssrc + terminator + 3 bytes of padding.
        assert_eq!(buf.len(), 4 + 8);
        assert_eq!(Sdes::read(&buf[4..], 1).unwrap(), sdes);
    }

    #[test]
    fn bad_priv_prefix_is_rejected() {
        // PRIV item whose prefix length points past its data.
        let body = [
            0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x05, 0x61, 0x00, 0x00,
            0x00, 0x00,
        ];

        assert_eq!(Sdes::read(&body, 1).unwrap_err(), Error::BadLength);
    }

    #[test]
    fn over_long_priv_is_invalid() {
        let prefix = [0u8; 200];
        let value = [0u8; 60];
        let sdes = Sdes {
            chunks: vec![SdesChunk {
                ssrc: 1,
                items: vec![SdesItem::private(&prefix, &value)],
            }],
        };

        let mut buf = BytesMut::new();
        assert_eq!(sdes.write(&mut buf), Err(Error::InvalidInput));
    }
}
