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

//! Logic handling writing HIPO files at event level.
use crate::{
    Codec, HipoResult,
    error::Details,
    event::Event,
    headers::{FILE_HEADER_LEN, FileHeader, IndexEntry, MARKER_LEN, Trailer},
    record::{EncodedRecord, RecordBuilder},
    schema::SchemaRegistry,
};
use log::{debug, warn};
use std::{
    io::{Seek, SeekFrom, Write},
    mem::ManuallyDrop,
};

/// Raw bytes of serialized events after which a record is cut.
pub const DEFAULT_RECORD_SIZE: usize = 8 * 1024 * 1024;
/// Events after which a record is cut, whatever their size.
pub const DEFAULT_MAX_EVENTS_PER_RECORD: usize = 100_000;

/// Main interface for writing HIPO files.
///
/// Events are serialized as soon as they are appended and grouped into records. A record is
/// compressed and written once it reaches `record_size` raw bytes or `max_events_per_record`
/// events, or when [`flush`](Writer::flush) is called. Every flush also rewrites the trailer, so
/// the file on disk is complete after each successful flush.
///
/// It is critical to call flush before `Writer<W>` is dropped. Though dropping will attempt to
/// flush the contents of the buffer, any errors that happen in the process of dropping will be
/// ignored.
pub struct Writer<W: Write + Seek> {
    writer: W,
    registry: SchemaRegistry,
    codec: Codec,
    record_size: usize,
    max_events_per_record: usize,
    marker: [u8; MARKER_LEN],
    buffer: RecordBuilder,
    index: Vec<IndexEntry>,
    /// Offset of the next record, which is also where the trailer lives.
    position: u64,
    has_header: bool,
    /// Registry size when the trailer was last written, `None` once it is stale.
    trailer_schemas: Option<usize>,
}

#[bon::bon]
impl<W: Write + Seek> Writer<W> {
    #[builder]
    pub fn builder(
        writer: W,
        #[builder(default)] registry: SchemaRegistry,
        #[builder(default)] codec: Codec,
        #[builder(default = DEFAULT_RECORD_SIZE)] record_size: usize,
        #[builder(default = DEFAULT_MAX_EVENTS_PER_RECORD)] max_events_per_record: usize,
        #[builder(default = generate_sync_marker())] marker: [u8; MARKER_LEN],
    ) -> HipoResult<Self> {
        if record_size == 0 || max_events_per_record == 0 {
            return Err(Details::InvalidRecordLimit.into());
        }
        Ok(Self {
            writer,
            registry,
            codec,
            record_size,
            max_events_per_record,
            marker,
            buffer: RecordBuilder::new(),
            index: Vec::new(),
            position: FILE_HEADER_LEN as u64,
            has_header: false,
            trailer_schemas: None,
        })
    }
}

impl<W: Write + Seek> Writer<W> {
    /// Creates a `Writer` with the default codec and record size.
    pub fn new(writer: W, registry: SchemaRegistry) -> HipoResult<Self> {
        Self::builder().writer(writer).registry(registry).build()
    }

    /// Creates a `Writer` with a specific `Codec`.
    pub fn with_codec(writer: W, registry: SchemaRegistry, codec: Codec) -> HipoResult<Self> {
        Self::builder()
            .writer(writer)
            .registry(registry)
            .codec(codec)
            .build()
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The registry banks are declared in before events using them are appended.
    pub fn registry_mut(&mut self) -> &mut SchemaRegistry {
        &mut self.registry
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Events appended so far, flushed or not.
    pub fn event_count(&self) -> usize {
        self.index
            .iter()
            .map(|entry| entry.header.events as usize)
            .sum::<usize>()
            + self.buffer.events()
    }

    /// Events waiting for the next record to be cut.
    pub fn pending_events(&self) -> usize {
        self.buffer.events()
    }

    /// Append an event.
    ///
    /// Every bank of the event must be declared in this writer's registry with the same layout,
    /// and the registry must hold at least one bank.
    ///
    /// **NOTE**: This function is not guaranteed to perform any actual write, since it relies on
    /// internal buffering. If you want to be sure the event has been written, then call
    /// [`flush`](Writer::flush).
    pub fn append_event(&mut self, event: &Event) -> HipoResult<()> {
        if self.registry.is_empty() {
            return Err(Details::NoSchemaDeclared.into());
        }
        for bank in event.banks() {
            let declared = self.registry.require(bank.name())?;
            if declared != bank.schema() {
                return Err(Details::ConflictingSchema(bank.name().to_owned()).into());
            }
        }
        self.buffer.push(event)?;

        if self.buffer.raw_len() >= self.record_size
            || self.buffer.events() >= self.max_events_per_record
        {
            self.write_record()?;
        }
        Ok(())
    }

    /// Append every event of an iterator, then flush.
    pub fn extend<'e, I>(&mut self, events: I) -> HipoResult<()>
    where
        I: IntoIterator<Item = &'e Event>,
    {
        for event in events {
            self.append_event(event)?;
        }
        self.flush()
    }

    fn maybe_write_header(&mut self) -> HipoResult<()> {
        if !self.has_header {
            self.writer
                .seek(SeekFrom::Start(0))
                .map_err(Details::Seek)?;
            FileHeader {
                codec: self.codec,
                marker: self.marker,
            }
            .write(&mut self.writer)?;
            self.has_header = true;
        }
        Ok(())
    }

    /// Compress the buffered events and write them as one record where the trailer used to be.
    fn write_record(&mut self) -> HipoResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.maybe_write_header()?;

        let EncodedRecord { header, payload } = self.buffer.finish(self.codec)?;
        self.writer
            .seek(SeekFrom::Start(self.position))
            .map_err(Details::Seek)?;
        self.writer
            .write_all(&header.to_bytes())
            .and_then(|()| self.writer.write_all(&payload))
            .and_then(|()| self.writer.write_all(&self.marker))
            .map_err(Details::WriteRecord)?;

        debug!(
            "Wrote record {} at offset {}: {} events, {} raw bytes, {} compressed bytes, codec {}",
            self.index.len(),
            self.position,
            header.events,
            header.raw_len,
            header.compressed_len,
            <&str>::from(header.codec)
        );
        self.index.push(IndexEntry {
            offset: self.position,
            header,
        });
        self.position += header.record_len();
        self.trailer_schemas = None;
        Ok(())
    }

    /// Flush the buffered events and rewrite the trailer.
    ///
    /// Calling it again without appending anything does not touch the file.
    pub fn flush(&mut self) -> HipoResult<()> {
        self.maybe_write_header()?;
        self.write_record()?;

        if self.trailer_schemas != Some(self.registry.len()) {
            let trailer = Trailer::to_bytes(
                &self.index,
                self.registry.iter().map(|schema| schema.as_ref()),
                self.position,
            )?;
            self.writer
                .seek(SeekFrom::Start(self.position))
                .map_err(Details::Seek)?;
            self.writer
                .write_all(&trailer)
                .map_err(Details::WriteIndex)?;
            self.trailer_schemas = Some(self.registry.len());
        }

        self.writer.flush().map_err(|e| Details::FlushWriter(e).into())
    }

    /// Return what the `Writer` is writing to, consuming the `Writer` itself.
    ///
    /// **NOTE**: This function forces the written data to be flushed (an implicit
    /// call to [`flush`](Writer::flush) is performed).
    pub fn into_inner(mut self) -> HipoResult<W> {
        self.flush()?;

        let mut this = ManuallyDrop::new(self);

        // Extract every member that is not Copy and therefore should be dropped
        let _registry = std::mem::take(&mut this.registry);
        let _buffer = std::mem::take(&mut this.buffer);
        let _index = std::mem::take(&mut this.index);

        // SAFETY: double-drops are prevented by putting `this` in a ManuallyDrop that is never dropped
        let writer = unsafe { std::ptr::read(&this.writer) };

        Ok(writer)
    }

    /// Gets a reference to the underlying writer.
    ///
    /// **NOTE**: There is likely data still in the buffer. To have all the data
    /// in the writer call [`flush`](Writer::flush) first.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

impl<W: Write + Seek> Drop for Writer<W> {
    /// Drop the writer, will try to flush ignoring any errors.
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            warn!(
                "Dropping a writer with {} unflushed events",
                self.buffer.events()
            );
        }
        let _ = self.flush();
    }
}

fn generate_sync_marker() -> [u8; MARKER_LEN] {
    rand::random()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        event::Bank,
        headers::{FOOTER_LEN, Footer},
        schema::{FieldType, Schema},
        types::Column,
    };
    use hipo_test_helper::{
        TestResult,
        logger::{assert_logged, init},
    };
    use pretty_assertions::assert_eq;
    use std::{io::Cursor, sync::Arc};

    fn registry() -> TestResult<(SchemaRegistry, Arc<Schema>)> {
        let mut registry = SchemaRegistry::new();
        let schema = registry.new_tree("NEW::bank", [("x", FieldType::Int)])?;
        Ok((registry, schema))
    }

    fn event(schema: &Arc<Schema>, value: i32) -> TestResult<Event> {
        let mut event = Event::new();
        event.add_bank(Bank::new(
            Arc::clone(schema),
            vec![Column::from(vec![value])],
        )?)?;
        Ok(event)
    }

    fn footer(bytes: &[u8]) -> TestResult<Footer> {
        Ok(Footer::from_bytes(bytes[bytes.len() - FOOTER_LEN..].try_into()?)?)
    }

    #[test]
    fn empty_file_has_header_and_trailer() -> TestResult {
        let (registry, _) = registry()?;
        let writer = Writer::new(Cursor::new(Vec::new()), registry)?;
        let bytes = writer.into_inner()?.into_inner();
        assert_eq!(&bytes[0..4], b"HIPO");
        let footer = footer(&bytes)?;
        assert_eq!(footer.records, 0);
        assert_eq!(footer.trailer_offset, FILE_HEADER_LEN as u64);
        Ok(())
    }

    #[test]
    fn records_are_cut_by_event_count() -> TestResult {
        let (registry, schema) = registry()?;
        let mut writer = Writer::builder()
            .writer(Cursor::new(Vec::new()))
            .registry(registry)
            .codec(Codec::Null)
            .max_events_per_record(4)
            .build()?;
        for i in 0..10 {
            writer.append_event(&event(&schema, i)?)?;
        }
        assert_eq!(writer.pending_events(), 2);
        assert_eq!(writer.event_count(), 10);
        let bytes = writer.into_inner()?.into_inner();
        assert_eq!(footer(&bytes)?.records, 3);
        Ok(())
    }

    #[test]
    fn records_are_cut_by_size() -> TestResult {
        let (registry, schema) = registry()?;
        let mut writer = Writer::builder()
            .writer(Cursor::new(Vec::new()))
            .registry(registry)
            .record_size(50)
            .build()?;
        // each event takes 20 bytes
        for i in 0..6 {
            writer.append_event(&event(&schema, i)?)?;
        }
        assert_eq!(writer.pending_events(), 0);
        let bytes = writer.into_inner()?.into_inner();
        assert_eq!(footer(&bytes)?.records, 2);
        Ok(())
    }

    #[test]
    fn flush_twice_is_stable() -> TestResult {
        let (registry, schema) = registry()?;
        let mut writer = Writer::new(Cursor::new(Vec::new()), registry)?;
        writer.append_event(&event(&schema, 1)?)?;
        writer.flush()?;
        let once = writer.get_ref().get_ref().clone();
        writer.flush()?;
        assert_eq!(writer.get_ref().get_ref(), &once);
        Ok(())
    }

    #[test]
    fn undeclared_and_conflicting_banks() -> TestResult {
        let (registry, _) = registry()?;
        let mut writer = Writer::new(Cursor::new(Vec::new()), registry)?;

        let other = Arc::new(Schema::new("NEW::other", 1, 9, [("x", FieldType::Int)])?);
        let err = writer.append_event(&event(&other, 1)?).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaNotDeclared);

        let changed = Arc::new(Schema::new("NEW::bank", 1, 1, [("x", FieldType::Long)])?);
        let mut bad = Event::new();
        bad.add_bank(Bank::new(changed, vec![Column::from(vec![1i64])])?)?;
        assert!(matches!(
            writer.append_event(&bad).unwrap_err().details(),
            Details::ConflictingSchema(_)
        ));
        assert_eq!(writer.event_count(), 0);
        Ok(())
    }

    #[test]
    fn empty_registry_rejects_events() -> TestResult {
        let mut writer = Writer::new(Cursor::new(Vec::new()), SchemaRegistry::new())?;
        let err = writer.append_event(&Event::new()).unwrap_err();
        assert!(matches!(err.details(), Details::NoSchemaDeclared));
        assert_eq!(err.kind(), ErrorKind::SchemaNotDeclared);
        assert_eq!(writer.event_count(), 0);
        Ok(())
    }

    #[test]
    fn drop_warns_about_pending_events() -> TestResult {
        init();
        let (registry, schema) = registry()?;
        let mut writer = Writer::new(Cursor::new(Vec::new()), registry)?;
        writer.append_event(&event(&schema, 1)?)?;
        drop(writer);
        assert_logged("Dropping a writer with 1 unflushed events");
        Ok(())
    }

    #[test]
    fn zero_record_size_is_rejected() -> TestResult {
        let (registry, _) = registry()?;
        let result = Writer::builder()
            .writer(Cursor::new(Vec::new()))
            .registry(registry)
            .record_size(0)
            .build();
        assert!(result.is_err());
        Ok(())
    }
}
