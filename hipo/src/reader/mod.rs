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

//! Logic handling reading HIPO files at event level.

mod block;

use crate::{
    Codec, HipoResult, error::Details, event::Event, record::EventFilter, schema::SchemaRegistry,
};
use block::Block;
use bon::bon;
use std::{
    io::{Read, Seek},
    vec,
};

/// Main interface for reading HIPO files.
///
/// To be used as an iterator:
///
/// ```no_run
/// # use hipo::Reader;
/// # use std::fs::File;
/// let file = File::open("run.hipo").unwrap();
/// for event in Reader::new(file).unwrap() {
///     match event {
///         Ok(event) => println!("{event}"),
///         Err(e) => println!("Error: {e}"),
///     };
/// }
/// ```
///
/// Records are loaded one at a time when the events of the previous one are exhausted. The
/// iteration stops after the first error.
pub struct Reader<R> {
    block: Block<R>,
    filter: EventFilter,
    events: vec::IntoIter<Event>,
    next_record: usize,
    errored: bool,
}

#[bon]
impl<R: Read + Seek> Reader<R> {
    /// Creates a `Reader` reading every bank of every event.
    ///
    /// **NOTE** The file header and index are read upon creation of the `Reader`.
    pub fn new(reader: R) -> HipoResult<Reader<R>> {
        Reader::builder(reader).build()
    }

    /// Creates a `Reader` that materialises only `banks` (all when `None`) of the events whose
    /// tag is in `tags` (all when empty).
    #[builder(finish_fn = build)]
    pub fn builder(
        #[builder(start_fn)] reader: R,
        banks: Option<Vec<String>>,
        #[builder(default)] tags: Vec<u32>,
    ) -> HipoResult<Reader<R>> {
        Ok(Reader {
            block: Block::new(reader)?,
            filter: EventFilter::new(banks, tags),
            events: Vec::new().into_iter(),
            next_record: 0,
            errored: false,
        })
    }

    /// The banks of the file.
    ///
    /// Read from the trailer of a cleanly closed file, or from the record dictionaries of a file
    /// recovered by scanning.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.block.registry
    }

    /// Total number of events in the file, before tag filtering.
    pub fn event_count(&self) -> usize {
        self.block
            .index
            .iter()
            .map(|entry| entry.header.events as usize)
            .sum()
    }

    pub fn record_count(&self) -> usize {
        self.block.index.len()
    }

    /// The default codec named in the file header.
    pub fn codec(&self) -> Codec {
        self.block.header.codec
    }

    /// Whether the index had to be rebuilt because the file was not closed cleanly.
    pub fn is_recovered(&self) -> bool {
        self.block.recovered
    }

    /// Position the reader so that the next event returned is event `n` of the file, or the
    /// first event after it that passes the tag filter.
    pub fn seek_event(&mut self, n: usize) -> HipoResult<()> {
        let total = self.event_count();
        let mut first = 0;
        for (number, entry) in self.block.index.iter().enumerate() {
            let events = entry.header.events as usize;
            if n < first + events {
                let decoded = self.block.read_record(number, &self.filter.without_tags())?;
                let remaining = decoded
                    .into_iter()
                    .skip(n - first)
                    .filter(|event| self.filter.accepts_tag(event.tag()))
                    .collect::<Vec<_>>();
                self.events = remaining.into_iter();
                self.next_record = number + 1;
                self.errored = false;
                return Ok(());
            }
            first += events;
        }
        Err(Details::EventOutOfRange { event: n, total }.into())
    }

    /// Replace the tag filter. Applies from the next record loaded.
    pub fn set_tags(&mut self, tags: Vec<u32>) {
        self.filter.set_tags(tags);
    }

    /// Start again from the first record.
    pub fn rewind(&mut self) {
        self.events = Vec::new().into_iter();
        self.next_record = 0;
        self.errored = false;
    }

    fn read_next(&mut self) -> HipoResult<Option<Event>> {
        loop {
            if let Some(event) = self.events.next() {
                return Ok(Some(event));
            }
            if self.next_record >= self.block.index.len() {
                return Ok(None);
            }
            let events = self.block.read_record(self.next_record, &self.filter)?;
            self.next_record += 1;
            self.events = events.into_iter();
        }
    }
}

impl<R: Read + Seek> Iterator for Reader<R> {
    type Item = HipoResult<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        // to prevent keep on reading after the first error occurs
        if self.errored {
            return None;
        };
        match self.read_next() {
            Ok(opt) => opt.map(Ok),
            Err(e) => {
                self.errored = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Writer,
        error::ErrorKind,
        event::Bank,
        headers::FOOTER_LEN,
        schema::FieldType,
        types::Column,
    };
    use hipo_test_helper::{
        TestResult,
        logger::{assert_logged, assert_not_logged, init},
    };
    use pretty_assertions::assert_eq;
    use std::{io::Cursor, sync::Arc};

    /// `count` events with tags alternating 0/1, four per record.
    fn file(count: i32) -> TestResult<Vec<u8>> {
        let mut registry = SchemaRegistry::new();
        let a = registry.new_tree("NEW::a", [("x", FieldType::Int)])?;
        let b = registry.new_tree("NEW::b", [("y", FieldType::Double)])?;
        let mut writer = Writer::builder()
            .writer(Cursor::new(Vec::new()))
            .registry(registry)
            .max_events_per_record(4)
            .build()?;
        for i in 0..count {
            let mut event = Event::with_tag((i % 2) as u32);
            event.add_bank(Bank::new(Arc::clone(&a), vec![Column::from(vec![i])])?)?;
            event.add_bank(Bank::new(
                Arc::clone(&b),
                vec![Column::from(vec![f64::from(i) / 2.0])],
            )?)?;
            writer.append_event(&event)?;
        }
        Ok(writer.into_inner()?.into_inner())
    }

    fn xs(events: &[Event]) -> TestResult<Vec<i32>> {
        let mut xs = Vec::new();
        for event in events {
            xs.extend_from_slice(event.get_ints("NEW::a", "x")?);
        }
        Ok(xs)
    }

    #[test]
    fn reads_events_in_order() -> TestResult {
        let reader = Reader::new(Cursor::new(file(10)?))?;
        assert_eq!(reader.event_count(), 10);
        assert_eq!(reader.record_count(), 3);
        assert_eq!(reader.registry().len(), 2);
        assert!(!reader.is_recovered());
        let events = reader.collect::<HipoResult<Vec<_>>>()?;
        assert_eq!(xs(&events)?, (0..10).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn filters_banks_and_tags() -> TestResult {
        let reader = Reader::builder(Cursor::new(file(10)?))
            .banks(vec!["NEW::b".to_owned()])
            .tags(vec![1])
            .build()?;
        let events = reader.collect::<HipoResult<Vec<_>>>()?;
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| !e.has_bank("NEW::a")));
        assert_eq!(events[0].get_doubles("NEW::b", "y")?, &[0.5]);
        Ok(())
    }

    #[test]
    fn seek_and_rewind() -> TestResult {
        let mut reader = Reader::new(Cursor::new(file(10)?))?;
        reader.seek_event(6)?;
        let rest = reader.by_ref().collect::<HipoResult<Vec<_>>>()?;
        assert_eq!(xs(&rest)?, vec![6, 7, 8, 9]);

        reader.rewind();
        assert_eq!(reader.count(), 10);

        let mut reader = Reader::new(Cursor::new(file(10)?))?;
        let err = reader.seek_event(10).unwrap_err();
        assert!(matches!(
            err.details(),
            Details::EventOutOfRange {
                event: 10,
                total: 10
            }
        ));
        Ok(())
    }

    #[test]
    fn recovers_without_trailer() -> TestResult {
        init();
        let mut bytes = file(10)?;
        let complete = Reader::new(Cursor::new(bytes.clone()))?;
        assert_not_logged("recovered");
        // cut the footer off, as if the writer was killed
        bytes.truncate(bytes.len() - FOOTER_LEN);
        drop(complete);

        let reader = Reader::new(Cursor::new(bytes))?;
        assert!(reader.is_recovered());
        assert_logged("recovered 3 records by scanning");
        assert_eq!(reader.registry().names().collect::<Vec<_>>(), vec!["NEW::a", "NEW::b"]);
        let events = reader.collect::<HipoResult<Vec<_>>>()?;
        assert_eq!(xs(&events)?, (0..10).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn recovers_from_a_stale_trailer() -> TestResult {
        init();
        let mut registry = SchemaRegistry::new();
        let a = registry.new_tree("NEW::a", [("x", FieldType::Int)])?;
        // a large dictionary makes the first trailer longer than the record written over it
        for i in 0..20 {
            registry.new_tree(
                &format!("NEW::unused_bank_number_{i}"),
                [("value", FieldType::Double)],
            )?;
        }
        let mut writer = Writer::builder()
            .writer(Cursor::new(Vec::new()))
            .registry(registry)
            .codec(Codec::Null)
            .max_events_per_record(2)
            .build()?;
        let event = |x: i32| -> TestResult<Event> {
            let mut event = Event::new();
            event.add_bank(Bank::new(Arc::clone(&a), vec![Column::from(vec![x])])?)?;
            Ok(event)
        };
        writer.append_event(&event(0)?)?;
        writer.append_event(&event(1)?)?;
        writer.flush()?;
        writer.append_event(&event(2)?)?;
        writer.append_event(&event(3)?)?;
        let bytes = writer.get_ref().get_ref().clone();
        drop(writer);

        let reader = Reader::new(Cursor::new(bytes))?;
        assert!(reader.is_recovered());
        assert_logged("Ignoring unreadable index");
        assert_logged("recovered 2 records by scanning");
        let events = reader.collect::<HipoResult<Vec<_>>>()?;
        assert_eq!(xs(&events)?, vec![0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn not_a_hipo_file() {
        let err = Reader::new(Cursor::new(b"PAR1 this is not hipo at all".to_vec()))
            .err()
            .map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::NotAHipoFile));
    }

    #[test]
    fn corrupt_record_stops_iteration() -> TestResult {
        let mut bytes = file(10)?;
        // flip the first payload byte of the second record
        let reader = Reader::new(Cursor::new(bytes.clone()))?;
        let second = reader.block.index[1];
        drop(reader);
        let at = (second.offset as usize) + 16;
        bytes[at] ^= 0xff;
        bytes[at + 1] ^= 0xff;

        let mut reader = Reader::new(Cursor::new(bytes))?;
        let mut ok = 0;
        let mut errors = Vec::new();
        for event in reader.by_ref() {
            match event {
                Ok(_) => ok += 1,
                Err(e) => errors.push(e.kind()),
            }
        }
        assert_eq!(ok, 4);
        assert_eq!(errors, vec![ErrorKind::CorruptRecord]);
        assert!(reader.next().is_none());
        Ok(())
    }
}
