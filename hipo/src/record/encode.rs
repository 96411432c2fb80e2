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
    Codec, HipoResult,
    event::Event,
    headers::RecordHeader,
    schema::{Schema, encode_dictionary},
    types::Column,
    util::{len_u32, put_len_prefixed},
};
use std::{collections::HashSet, sync::Arc};

/// A compressed record ready to be framed and written.
#[derive(Debug)]
pub(crate) struct EncodedRecord {
    pub(crate) header: RecordHeader,
    pub(crate) payload: Vec<u8>,
}

/// Accumulates serialized events until the writer decides to cut a record.
///
/// Events are serialized as soon as they are pushed, so [`raw_len`](Self::raw_len) is exact.
#[derive(Debug, Default)]
pub(crate) struct RecordBuilder {
    schemas: Vec<Arc<Schema>>,
    seen: HashSet<(u16, u8)>,
    body: Vec<u8>,
    events: usize,
}

impl RecordBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, event: &Event) -> HipoResult<()> {
        let start = self.body.len();
        let result = self.encode_event(event);
        if result.is_err() {
            self.body.truncate(start);
            return result;
        }
        for bank in event.banks() {
            let schema = bank.schema();
            if self.seen.insert((schema.group(), schema.item())) {
                self.schemas.push(Arc::clone(schema));
            }
        }
        self.events += 1;
        Ok(())
    }

    fn encode_event(&mut self, event: &Event) -> HipoResult<()> {
        let body = &mut self.body;
        body.extend_from_slice(&event.tag().to_le_bytes());
        body.extend_from_slice(&len_u32(event.len())?.to_le_bytes());
        for bank in event.banks() {
            let schema = bank.schema();
            body.extend_from_slice(&schema.group().to_le_bytes());
            body.extend_from_slice(&[schema.item(), 0]);
            body.extend_from_slice(&len_u32(bank.rows())?.to_le_bytes());
            for column in bank.columns() {
                encode_column(column, body)?;
            }
        }
        Ok(())
    }

    /// Number of events pushed since the last [`finish`](Self::finish).
    pub(crate) fn events(&self) -> usize {
        self.events
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events == 0
    }

    /// Size of the serialized events, without the dictionary.
    pub(crate) fn raw_len(&self) -> usize {
        self.body.len()
    }

    /// Prepend the dictionary of the referenced banks, compress and reset the builder.
    pub(crate) fn finish(&mut self, codec: Codec) -> HipoResult<EncodedRecord> {
        let mut payload = Vec::with_capacity(self.body.len() + 64 * self.schemas.len());
        encode_dictionary(self.schemas.iter().map(|s| s.as_ref()), &mut payload)?;
        payload.append(&mut self.body);
        let raw_len = len_u32(payload.len())?;
        let events = len_u32(self.events)?;

        codec.compress(&mut payload)?;
        let header = RecordHeader {
            codec,
            events,
            raw_len,
            compressed_len: len_u32(payload.len())?,
        };

        self.schemas.clear();
        self.seen.clear();
        self.events = 0;
        Ok(EncodedRecord { header, payload })
    }
}

fn encode_column(column: &Column, buffer: &mut Vec<u8>) -> HipoResult<()> {
    macro_rules! fixed {
        ($values:expr) => {
            for value in $values {
                buffer.extend_from_slice(&value.to_le_bytes());
            }
        };
    }
    match column {
        Column::Byte(values) => fixed!(values),
        Column::Short(values) => fixed!(values),
        Column::Int(values) => fixed!(values),
        Column::Long(values) => fixed!(values),
        Column::Float(values) => fixed!(values),
        Column::Double(values) => fixed!(values),
        Column::String(values) => {
            for value in values {
                put_len_prefixed(buffer, value.as_bytes())?;
            }
        }
        Column::Composite(values) => {
            for value in values {
                put_len_prefixed(buffer, value)?;
            }
        }
    }
    Ok(())
}

/// Encode `events` into a single record.
#[cfg(test)]
pub(crate) fn encode_record<'a>(
    events: impl IntoIterator<Item = &'a Event>,
    codec: Codec,
) -> HipoResult<EncodedRecord> {
    let mut builder = RecordBuilder::new();
    for event in events {
        builder.push(event)?;
    }
    builder.finish(codec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event::Bank, schema::FieldType};
    use hipo_test_helper::TestResult;
    use pretty_assertions::assert_eq;

    #[test]
    fn uncompressed_layout() -> TestResult {
        let schema = Arc::new(Schema::new("A::b", 1, 2, [("n", FieldType::Short)])?);
        let mut event = Event::with_tag(9);
        event.add_bank(Bank::new(schema, vec![Column::from(vec![1i16, -1])])?)?;

        let record = encode_record([&event], Codec::Null)?;
        let dictionary = "{A::b/1/2}{n/S}";
        let mut expected = Vec::new();
        expected.extend_from_slice(&1u32.to_le_bytes());
        expected.extend_from_slice(&(dictionary.len() as u32).to_le_bytes());
        expected.extend_from_slice(dictionary.as_bytes());
        expected.extend_from_slice(&[9, 0, 0, 0, 1, 0, 0, 0]);
        expected.extend_from_slice(&[1, 0, 2, 0, 2, 0, 0, 0]);
        expected.extend_from_slice(&[1, 0, 0xff, 0xff]);

        assert_eq!(record.payload, expected);
        assert_eq!(record.header.events, 1);
        assert_eq!(record.header.raw_len as usize, expected.len());
        assert_eq!(record.header.compressed_len, record.header.raw_len);
        Ok(())
    }

    #[test]
    fn dictionary_lists_each_bank_once() -> TestResult {
        let schema = Arc::new(Schema::new("A::b", 1, 1, [("x", FieldType::Double)])?);
        let mut builder = RecordBuilder::new();
        for i in 0..3 {
            let mut event = Event::new();
            event.add_bank(Bank::new(
                Arc::clone(&schema),
                vec![Column::from(vec![f64::from(i)])],
            )?)?;
            builder.push(&event)?;
        }
        builder.push(&Event::new())?;
        assert_eq!(builder.events(), 4);
        assert_eq!(builder.raw_len(), 3 * (8 + 8 + 8) + 8);

        let record = builder.finish(Codec::Null)?;
        assert_eq!(&record.payload[0..4], &1u32.to_le_bytes());
        assert!(builder.is_empty());
        assert_eq!(builder.raw_len(), 0);
        Ok(())
    }
}
