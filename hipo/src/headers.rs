// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Fixed size structures framing a HIPO file.
//!
//! ```text
//! file          := file_header record* trailer
//! file_header   := "HIPO" version:u16 codec:u8 flags:u8 marker:[u8;16]
//! record        := record_header payload marker:[u8;16]
//! record_header := codec:u8 pad:[u8;3] events:u32 raw_len:u32 compressed_len:u32
//! trailer       := entries:u32 index_entry* dictionary footer
//! index_entry   := offset:u64 compressed_len:u32 raw_len:u32 events:u32 codec:u8 pad:[u8;3]
//! footer        := trailer_offset:u64 records:u32 "HIDX"
//! ```
//!
//! All integers are little-endian.

use crate::{
    Codec, HipoResult,
    error::Details,
    schema::{Schema, decode_dictionary, encode_dictionary},
    util::{ByteCursor, len_u32},
};
use std::io::{ErrorKind, Read, Write};

pub(crate) const FILE_MAGIC: [u8; 4] = *b"HIPO";
pub(crate) const FORMAT_VERSION: u16 = 1;
pub(crate) const FILE_HEADER_LEN: usize = 24;
pub(crate) const RECORD_HEADER_LEN: usize = 16;
pub(crate) const MARKER_LEN: usize = 16;
pub(crate) const INDEX_ENTRY_LEN: usize = 24;
pub(crate) const FOOTER_MAGIC: [u8; 4] = *b"HIDX";
pub(crate) const FOOTER_LEN: usize = 16;

/// The first bytes of every file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct FileHeader {
    /// The codec records default to; every record also names its own.
    pub(crate) codec: Codec,
    /// Written after every record so that a reader can detect a misaligned record boundary.
    pub(crate) marker: [u8; MARKER_LEN],
}

impl FileHeader {
    pub(crate) fn to_bytes(self) -> [u8; FILE_HEADER_LEN] {
        let mut bytes = [0u8; FILE_HEADER_LEN];
        bytes[0..4].copy_from_slice(&FILE_MAGIC);
        bytes[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes[6] = self.codec.id();
        // bytes[7] holds the flags, none are defined yet
        bytes[8..].copy_from_slice(&self.marker);
        bytes
    }

    pub(crate) fn write<W: Write>(self, writer: &mut W) -> HipoResult<()> {
        writer
            .write_all(&self.to_bytes())
            .map_err(|e| Details::WriteHeader(e).into())
    }

    /// Read and check the file header.
    ///
    /// A file too short to hold a header is reported like a wrong magic.
    pub(crate) fn read<R: Read>(reader: &mut R) -> HipoResult<Self> {
        let mut bytes = [0u8; FILE_HEADER_LEN];
        match reader.read_exact(&mut bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(Details::HeaderMagic.into());
            }
            Err(e) => return Err(Details::ReadHeader(e).into()),
        }

        let mut cursor = ByteCursor::new(&bytes);
        if cursor.array::<4>()? != FILE_MAGIC {
            return Err(Details::HeaderMagic.into());
        }
        let version = cursor.u16()?;
        if version != FORMAT_VERSION {
            return Err(Details::UnsupportedVersion(version).into());
        }
        let codec = Codec::from_id(cursor.u8()?)?;
        let _flags = cursor.u8()?;
        let marker = cursor.array()?;
        Ok(Self { codec, marker })
    }
}

/// The fixed part in front of every record payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct RecordHeader {
    pub(crate) codec: Codec,
    pub(crate) events: u32,
    pub(crate) raw_len: u32,
    pub(crate) compressed_len: u32,
}

impl RecordHeader {
    pub(crate) fn to_bytes(self) -> [u8; RECORD_HEADER_LEN] {
        let mut bytes = [0u8; RECORD_HEADER_LEN];
        bytes[0] = self.codec.id();
        bytes[4..8].copy_from_slice(&self.events.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.raw_len.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.compressed_len.to_le_bytes());
        bytes
    }

    pub(crate) fn from_bytes(bytes: &[u8; RECORD_HEADER_LEN]) -> HipoResult<Self> {
        let mut cursor = ByteCursor::new(bytes);
        let codec = Codec::from_id(cursor.u8()?)?;
        cursor.skip(3, 1)?;
        Ok(Self {
            codec,
            events: cursor.u32()?,
            raw_len: cursor.u32()?,
            compressed_len: cursor.u32()?,
        })
    }

    /// Bytes taken by the whole record on disk.
    pub(crate) fn record_len(&self) -> u64 {
        (RECORD_HEADER_LEN + MARKER_LEN) as u64 + u64::from(self.compressed_len)
    }
}

/// Locates one record in the file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct IndexEntry {
    pub(crate) offset: u64,
    pub(crate) header: RecordHeader,
}

impl IndexEntry {
    fn write_to(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.offset.to_le_bytes());
        buffer.extend_from_slice(&self.header.compressed_len.to_le_bytes());
        buffer.extend_from_slice(&self.header.raw_len.to_le_bytes());
        buffer.extend_from_slice(&self.header.events.to_le_bytes());
        buffer.extend_from_slice(&[self.header.codec.id(), 0, 0, 0]);
    }

    fn read(cursor: &mut ByteCursor) -> HipoResult<Self> {
        let offset = cursor.u64()?;
        let compressed_len = cursor.u32()?;
        let raw_len = cursor.u32()?;
        let events = cursor.u32()?;
        let codec = Codec::from_id(cursor.u8()?)?;
        cursor.skip(3, 1)?;
        Ok(Self {
            offset,
            header: RecordHeader {
                codec,
                events,
                raw_len,
                compressed_len,
            },
        })
    }
}

/// The record index plus the dictionary of every bank in the file.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Trailer {
    pub(crate) index: Vec<IndexEntry>,
    pub(crate) dictionary: Vec<Schema>,
}

impl Trailer {
    /// Serialize the trailer followed by a footer pointing at `trailer_offset`.
    pub(crate) fn to_bytes<'a>(
        index: &[IndexEntry],
        dictionary: impl ExactSizeIterator<Item = &'a Schema>,
        trailer_offset: u64,
    ) -> HipoResult<Vec<u8>> {
        let mut buffer = Vec::with_capacity(4 + index.len() * INDEX_ENTRY_LEN + FOOTER_LEN);
        buffer.extend_from_slice(&len_u32(index.len())?.to_le_bytes());
        for entry in index {
            entry.write_to(&mut buffer);
        }
        encode_dictionary(dictionary, &mut buffer)?;
        let footer = Footer {
            trailer_offset,
            records: len_u32(index.len())?,
        };
        buffer.extend_from_slice(&footer.to_bytes());
        Ok(buffer)
    }

    /// Parse the trailer bytes found between the trailer offset and the footer.
    pub(crate) fn from_bytes(bytes: &[u8], footer: &Footer) -> HipoResult<Self> {
        let mut cursor = ByteCursor::new(bytes);
        let entries = cursor.u32()?;
        if entries != footer.records
            || entries as usize > cursor.remaining() / INDEX_ENTRY_LEN
        {
            return Err(Details::CorruptDictionary(format!(
                "index announces {entries} records, footer {}",
                footer.records
            ))
            .into());
        }
        let index = (0..entries)
            .map(|_| IndexEntry::read(&mut cursor))
            .collect::<HipoResult<Vec<_>>>()?;
        let dictionary = decode_dictionary(&mut cursor)?;
        if cursor.remaining() != 0 {
            return Err(Details::TrailingRecordBytes(cursor.remaining()).into());
        }
        Ok(Self { index, dictionary })
    }
}

/// The last bytes of a cleanly closed file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Footer {
    pub(crate) trailer_offset: u64,
    pub(crate) records: u32,
}

impl Footer {
    pub(crate) fn to_bytes(self) -> [u8; FOOTER_LEN] {
        let mut bytes = [0u8; FOOTER_LEN];
        bytes[0..8].copy_from_slice(&self.trailer_offset.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.records.to_le_bytes());
        bytes[12..16].copy_from_slice(&FOOTER_MAGIC);
        bytes
    }

    pub(crate) fn from_bytes(bytes: &[u8; FOOTER_LEN]) -> HipoResult<Self> {
        let mut cursor = ByteCursor::new(bytes);
        let trailer_offset = cursor.u64()?;
        let records = cursor.u32()?;
        if cursor.array::<4>()? != FOOTER_MAGIC {
            return Err(Details::FooterMagic.into());
        }
        Ok(Self {
            trailer_offset,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind as HipoErrorKind, schema::FieldType};
    use hipo_test_helper::TestResult;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_header_layout() -> TestResult {
        let header = FileHeader {
            codec: Codec::Lz4,
            marker: [7u8; MARKER_LEN],
        };
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..8], &[b'H', b'I', b'P', b'O', 1, 0, 1, 0]);
        assert_eq!(FileHeader::read(&mut &bytes[..])?, header);
        Ok(())
    }

    #[test]
    fn file_header_rejections() {
        let err = FileHeader::read(&mut &b"PAR1"[..]).unwrap_err();
        assert_eq!(err.kind(), HipoErrorKind::NotAHipoFile);

        let mut bytes = FileHeader {
            codec: Codec::Null,
            marker: [0u8; MARKER_LEN],
        }
        .to_bytes();
        bytes[0] = b'X';
        let err = FileHeader::read(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err.details(), Details::HeaderMagic));

        bytes[0] = b'H';
        bytes[4] = 9;
        let err = FileHeader::read(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err.details(), Details::UnsupportedVersion(9)));
    }

    #[test]
    fn record_header_layout() -> TestResult {
        let header = RecordHeader {
            codec: Codec::Null,
            events: 3,
            raw_len: 100,
            compressed_len: 100,
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[4], 3);
        assert_eq!(RecordHeader::from_bytes(&bytes)?, header);
        assert_eq!(header.record_len(), 132);

        let mut bad = bytes;
        bad[0] = 200;
        assert_eq!(
            RecordHeader::from_bytes(&bad).unwrap_err().kind(),
            HipoErrorKind::CorruptRecord
        );
        Ok(())
    }

    #[test]
    fn trailer_round_trip() -> TestResult {
        let index = vec![
            IndexEntry {
                offset: 24,
                header: RecordHeader {
                    codec: Codec::Lz4,
                    events: 10,
                    raw_len: 400,
                    compressed_len: 120,
                },
            },
            IndexEntry {
                offset: 176,
                header: RecordHeader {
                    codec: Codec::Null,
                    events: 7,
                    raw_len: 280,
                    compressed_len: 280,
                },
            },
        ];
        let schema = Schema::new("NEW::bank", 1, 1, [("px", FieldType::Double)])?;
        let bytes = Trailer::to_bytes(&index, std::iter::once(&schema), 488)?;

        let (body, footer) = bytes.split_at(bytes.len() - FOOTER_LEN);
        let footer = Footer::from_bytes(footer.try_into()?)?;
        assert_eq!(footer.trailer_offset, 488);
        assert_eq!(footer.records, 2);

        let trailer = Trailer::from_bytes(body, &footer)?;
        assert_eq!(trailer.index, index);
        assert_eq!(trailer.dictionary, vec![schema]);
        Ok(())
    }

    #[test]
    fn footer_magic() {
        let mut bytes = Footer {
            trailer_offset: 1,
            records: 0,
        }
        .to_bytes();
        bytes[15] = 0;
        assert!(matches!(
            Footer::from_bytes(&bytes).unwrap_err().details(),
            Details::FooterMagic
        ));
    }
}
