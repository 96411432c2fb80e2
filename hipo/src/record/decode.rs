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
    event::{Bank, Event},
    headers::RecordHeader,
    record::EventFilter,
    schema::{FieldType, Schema, SchemaRegistry, decode_dictionary},
    types::Column,
    util::ByteCursor,
};
use log::trace;
use std::{collections::HashSet, sync::Arc};

/// Decode one record payload as read from disk.
///
/// The record dictionary is merged into `registry` before any event is decoded. Every bank an
/// event references must be listed in the dictionary of the same record. Events rejected by the
/// tag filter are dropped, banks rejected by the bank filter are skipped without being
/// materialised.
pub(crate) fn decode_record(
    header: &RecordHeader,
    mut payload: Vec<u8>,
    registry: &mut SchemaRegistry,
    filter: &EventFilter,
) -> HipoResult<Vec<Event>> {
    header
        .codec
        .decompress(&mut payload, header.raw_len as usize)?;
    let mut cursor = ByteCursor::new(&payload);

    let mut local = HashSet::new();
    for schema in decode_dictionary(&mut cursor)? {
        let schema = registry.merge(schema)?;
        local.insert((schema.group(), schema.item()));
    }

    let mut events = Vec::with_capacity((header.events as usize).min(cursor.remaining() / 8));
    for _ in 0..header.events {
        let tag = cursor.u32()?;
        let banks = cursor.u32()?;
        let keep = filter.accepts_tag(tag);
        let mut event = Event::with_tag(tag);
        for _ in 0..banks {
            let group = cursor.u16()?;
            let item = cursor.u8()?;
            let _pad = cursor.u8()?;
            let rows = cursor.u32()? as usize;
            let schema = match registry.by_id(group, item) {
                Some(schema) if local.contains(&(group, item)) => Arc::clone(schema),
                _ => return Err(Details::UnresolvedBank { group, item }.into()),
            };
            if keep && filter.wants_bank(schema.name()) {
                let columns = schema
                    .types()
                    .map(|field_type| decode_column(&mut cursor, field_type, rows))
                    .collect::<HipoResult<Vec<_>>>()?;
                event.push_decoded(Bank::from_decoded(schema, columns));
            } else {
                for field_type in schema.types() {
                    skip_column(&mut cursor, field_type, rows)?;
                }
            }
        }
        if keep {
            events.push(event);
        } else {
            trace!("Skipping event with tag {tag}");
        }
    }

    if cursor.remaining() != 0 {
        return Err(Details::TrailingRecordBytes(cursor.remaining()).into());
    }
    Ok(events)
}

/// Decode only the dictionary at the start of a record payload.
pub(crate) fn decode_record_dictionary(
    header: &RecordHeader,
    mut payload: Vec<u8>,
) -> HipoResult<Vec<Schema>> {
    header
        .codec
        .decompress(&mut payload, header.raw_len as usize)?;
    decode_dictionary(&mut ByteCursor::new(&payload))
}

fn fixed<T, const N: usize>(
    cursor: &mut ByteCursor,
    rows: usize,
    from_le: fn([u8; N]) -> T,
) -> HipoResult<Vec<T>> {
    let len = rows.checked_mul(N).ok_or(Details::TruncatedRecord {
        needed: usize::MAX,
        available: cursor.remaining(),
    })?;
    let bytes = cursor.take(len)?;
    Ok(bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut array = [0u8; N];
            array.copy_from_slice(chunk);
            from_le(array)
        })
        .collect())
}

fn variable(cursor: &mut ByteCursor, rows: usize) -> HipoResult<Vec<Vec<u8>>> {
    // each row needs at least its length prefix
    let mut values = Vec::with_capacity(rows.min(cursor.remaining() / 4));
    for _ in 0..rows {
        values.push(cursor.len_prefixed()?.to_vec());
    }
    Ok(values)
}

fn decode_column(
    cursor: &mut ByteCursor,
    field_type: FieldType,
    rows: usize,
) -> HipoResult<Column> {
    Ok(match field_type {
        FieldType::Byte => Column::Byte(fixed(cursor, rows, i8::from_le_bytes)?),
        FieldType::Short => Column::Short(fixed(cursor, rows, i16::from_le_bytes)?),
        FieldType::Int => Column::Int(fixed(cursor, rows, i32::from_le_bytes)?),
        FieldType::Long => Column::Long(fixed(cursor, rows, i64::from_le_bytes)?),
        FieldType::Float => Column::Float(fixed(cursor, rows, f32::from_le_bytes)?),
        FieldType::Double => Column::Double(fixed(cursor, rows, f64::from_le_bytes)?),
        FieldType::String => Column::String(
            variable(cursor, rows)?
                .into_iter()
                .map(|bytes| String::from_utf8(bytes).map_err(Details::ConvertToUtf8))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        FieldType::Composite => Column::Composite(variable(cursor, rows)?),
    })
}

fn skip_column(cursor: &mut ByteCursor, field_type: FieldType, rows: usize) -> HipoResult<()> {
    match field_type.width() {
        Some(width) => cursor.skip(rows, width),
        None => {
            for _ in 0..rows {
                cursor.len_prefixed()?;
            }
            Ok(())
        }
    }
}
