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

use crate::{
    HipoResult,
    error::Details,
    event::Event,
    headers::{
        FILE_HEADER_LEN, FOOTER_LEN, FileHeader, Footer, IndexEntry, MARKER_LEN,
        RECORD_HEADER_LEN, RecordHeader, Trailer,
    },
    record::{EventFilter, decode_record, decode_record_dictionary},
    schema::SchemaRegistry,
    util,
};
use log::{debug, warn};
use std::io::{Read, Seek, SeekFrom};

/// Internal record reader.
///
/// Knows where every record is and loads them one at a time.
#[derive(Debug)]
pub(super) struct Block<R> {
    reader: R,
    pub(super) header: FileHeader,
    pub(super) index: Vec<IndexEntry>,
    pub(super) registry: SchemaRegistry,
    /// The index was rebuilt by scanning because the trailer was missing.
    pub(super) recovered: bool,
}

impl<R: Read + Seek> Block<R> {
    pub(super) fn new(mut reader: R) -> HipoResult<Block<R>> {
        reader.seek(SeekFrom::Start(0)).map_err(Details::Seek)?;
        let header = FileHeader::read(&mut reader)?;
        let length = reader.seek(SeekFrom::End(0)).map_err(Details::Seek)?;

        let mut block = Block {
            reader,
            header,
            index: Vec::new(),
            registry: SchemaRegistry::new(),
            recovered: false,
        };

        match block.read_footer(length)? {
            Some(footer) => {
                // a writer killed after a flush leaves the footer of an older trailer behind
                if let Err(e) = block.read_trailer(&footer, length) {
                    warn!("Ignoring unreadable index: {e}");
                    block.recover(length)?;
                }
            }
            None => block.recover(length)?,
        }
        debug!(
            "Opened file with {} records and {} banks",
            block.index.len(),
            block.registry.len()
        );
        Ok(block)
    }

    fn read_footer(&mut self, length: u64) -> HipoResult<Option<Footer>> {
        if length < (FILE_HEADER_LEN + FOOTER_LEN) as u64 {
            return Ok(None);
        }
        let mut bytes = [0u8; FOOTER_LEN];
        self.reader
            .seek(SeekFrom::Start(length - FOOTER_LEN as u64))
            .map_err(Details::Seek)?;
        self.reader
            .read_exact(&mut bytes)
            .map_err(Details::ReadIndex)?;
        match Footer::from_bytes(&bytes) {
            Ok(footer) => Ok(Some(footer)),
            Err(e) if matches!(e.details(), Details::FooterMagic) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_trailer(&mut self, footer: &Footer, length: u64) -> HipoResult<()> {
        let trailer_end = length - FOOTER_LEN as u64;
        if footer.trailer_offset < FILE_HEADER_LEN as u64 || footer.trailer_offset > trailer_end {
            return Err(Details::IndexOutOfBounds {
                offset: footer.trailer_offset,
                length,
            }
            .into());
        }
        let trailer_len = util::safe_len((trailer_end - footer.trailer_offset) as usize)?;
        let mut bytes = vec![0u8; trailer_len];
        self.reader
            .seek(SeekFrom::Start(footer.trailer_offset))
            .map_err(Details::Seek)?;
        self.reader
            .read_exact(&mut bytes)
            .map_err(Details::ReadIndex)?;

        let trailer = Trailer::from_bytes(&bytes, footer)?;
        for entry in &trailer.index {
            if entry.offset < FILE_HEADER_LEN as u64
                || entry.offset.saturating_add(entry.header.record_len()) > footer.trailer_offset
            {
                return Err(Details::IndexOutOfBounds {
                    offset: entry.offset,
                    length,
                }
                .into());
            }
        }
        for schema in trailer.dictionary {
            self.registry.merge(schema)?;
        }
        self.index = trailer.index;
        Ok(())
    }

    fn recover(&mut self, length: u64) -> HipoResult<()> {
        self.registry = SchemaRegistry::new();
        self.index = self.scan(length)?;
        self.recovered = true;
        self.recover_dictionary()?;
        warn!(
            "No index found at the end of the file, recovered {} records by scanning",
            self.index.len()
        );
        Ok(())
    }

    /// Merge the dictionaries of the scanned records, so that the registry lists every bank of
    /// the file as it would after reading a trailer. The index ends before the first record whose
    /// dictionary cannot be read.
    fn recover_dictionary(&mut self) -> HipoResult<()> {
        for number in 0..self.index.len() {
            let schemas = self
                .read_payload(number)
                .and_then(|(header, payload)| decode_record_dictionary(&header, payload));
            match schemas {
                Ok(schemas) => {
                    for schema in schemas {
                        self.registry.merge(schema)?;
                    }
                }
                Err(e) => {
                    warn!("Dropping records from {number} on, unreadable dictionary: {e}");
                    self.index.truncate(number);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Walk the records from the start of the file, stopping at the first thing that is not a
    /// complete record followed by the file marker.
    fn scan(&mut self, length: u64) -> HipoResult<Vec<IndexEntry>> {
        let mut index = Vec::new();
        let mut position = FILE_HEADER_LEN as u64;
        let mut bytes = [0u8; RECORD_HEADER_LEN];
        let mut marker = [0u8; MARKER_LEN];

        while position + (RECORD_HEADER_LEN + MARKER_LEN) as u64 <= length {
            self.reader
                .seek(SeekFrom::Start(position))
                .map_err(Details::Seek)?;
            self.reader
                .read_exact(&mut bytes)
                .map_err(Details::ReadRecordHeader)?;
            let Ok(header) = RecordHeader::from_bytes(&bytes) else {
                break;
            };
            let end = position + header.record_len();
            if end > length {
                break;
            }
            self.reader
                .seek(SeekFrom::Start(end - MARKER_LEN as u64))
                .map_err(Details::Seek)?;
            self.reader
                .read_exact(&mut marker)
                .map_err(Details::ReadRecordMarker)?;
            if marker != self.header.marker {
                break;
            }
            index.push(IndexEntry {
                offset: position,
                header,
            });
            position = end;
        }
        Ok(index)
    }

    /// Read and decode record `number` of the index.
    pub(super) fn read_record(
        &mut self,
        number: usize,
        filter: &EventFilter,
    ) -> HipoResult<Vec<Event>> {
        let (header, payload) = self.read_payload(number)?;
        decode_record(&header, payload, &mut self.registry, filter)
    }

    /// The header and still compressed payload of record `number`, checked against the index
    /// and the file marker.
    fn read_payload(&mut self, number: usize) -> HipoResult<(RecordHeader, Vec<u8>)> {
        let entry = self.index[number];
        self.reader
            .seek(SeekFrom::Start(entry.offset))
            .map_err(Details::Seek)?;

        let mut bytes = [0u8; RECORD_HEADER_LEN];
        self.reader
            .read_exact(&mut bytes)
            .map_err(Details::ReadRecordHeader)?;
        let header = RecordHeader::from_bytes(&bytes)?;
        if header != entry.header {
            return Err(Details::RecordHeaderMismatch {
                offset: entry.offset,
            }
            .into());
        }

        let mut payload = vec![0u8; util::safe_len(header.compressed_len as usize)?];
        self.reader
            .read_exact(&mut payload)
            .map_err(Details::ReadRecord)?;

        let mut marker = [0u8; MARKER_LEN];
        self.reader
            .read_exact(&mut marker)
            .map_err(Details::ReadRecordMarker)?;
        if marker != self.header.marker {
            return Err(Details::RecordMarker.into());
        }
        Ok((header, payload))
    }
}
