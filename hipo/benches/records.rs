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

use criterion::{Criterion, criterion_group, criterion_main};
use hipo::{
    Bank, Batches, Codec, DeflateSettings, Event, FieldType, HipoResult, Reader, SchemaRegistry,
    Writer, types::Column,
};
use std::{io::Cursor, sync::Arc, time::Duration};

const PARTICLES: usize = 12;

fn make_events(count: usize) -> HipoResult<(SchemaRegistry, Vec<Event>)> {
    let mut registry = SchemaRegistry::new();
    let particle = registry.new_tree(
        "REC::Particle",
        [
            ("pid", FieldType::Int),
            ("px", FieldType::Float),
            ("py", FieldType::Float),
            ("pz", FieldType::Float),
            ("vz", FieldType::Float),
            ("charge", FieldType::Byte),
            ("status", FieldType::Short),
            ("chi2pid", FieldType::Float),
        ],
    )?;
    let mut events = Vec::with_capacity(count);
    for n in 0..count {
        let x = n as f32;
        let mut event = Event::new();
        event.add_bank(Bank::new(
            Arc::clone(&particle),
            vec![
                Column::from(vec![11i32; PARTICLES]),
                Column::from(vec![x; PARTICLES]),
                Column::from(vec![x * 0.5; PARTICLES]),
                Column::from(vec![x * 2.0; PARTICLES]),
                Column::from(vec![-3.0f32; PARTICLES]),
                Column::from(vec![-1i8; PARTICLES]),
                Column::from(vec![2000i16; PARTICLES]),
                Column::from(vec![0.1f32; PARTICLES]),
            ],
        )?)?;
        events.push(event);
    }
    Ok((registry, events))
}

fn write(registry: &SchemaRegistry, events: &[Event], codec: Codec) -> HipoResult<Vec<u8>> {
    let mut writer = Writer::with_codec(Cursor::new(Vec::new()), registry.clone(), codec)?;
    writer.extend(events)?;
    Ok(writer.into_inner()?.into_inner())
}

fn read(bytes: &[u8]) -> HipoResult<usize> {
    let mut count = 0;
    for event in Reader::new(Cursor::new(bytes))? {
        count += event?.len();
    }
    Ok(count)
}

fn batch(bytes: &[u8], step: usize) -> HipoResult<usize> {
    let reader = Reader::new(Cursor::new(bytes))?;
    let mut count = 0;
    for batch in Batches::new(reader, step, None)? {
        count += batch?.len();
    }
    Ok(count)
}

fn bench_write(c: &mut Criterion, count: usize, codec: Codec, name: &str) -> HipoResult<()> {
    let (registry, events) = make_events(count)?;
    c.bench_function(name, |b| b.iter(|| write(&registry, &events, codec)));
    Ok(())
}

fn bench_read(c: &mut Criterion, count: usize, codec: Codec, name: &str) -> HipoResult<()> {
    let (registry, events) = make_events(count)?;
    let bytes = write(&registry, &events, codec)?;
    c.bench_function(name, |b| b.iter(|| read(&bytes)));
    Ok(())
}

fn bench_write_100_null(c: &mut Criterion) {
    bench_write(c, 100, Codec::Null, "write 100 events, null").unwrap();
}

fn bench_write_10_000_lz4(c: &mut Criterion) {
    bench_write(c, 10_000, Codec::Lz4, "write 10k events, lz4").unwrap();
}

fn bench_write_10_000_deflate(c: &mut Criterion) {
    let codec = Codec::Deflate(DeflateSettings::default());
    bench_write(c, 10_000, codec, "write 10k events, deflate").unwrap();
}

fn bench_read_100_null(c: &mut Criterion) {
    bench_read(c, 100, Codec::Null, "read 100 events, null").unwrap();
}

fn bench_read_10_000_lz4(c: &mut Criterion) {
    bench_read(c, 10_000, Codec::Lz4, "read 10k events, lz4").unwrap();
}

fn bench_batches_10_000(c: &mut Criterion) {
    let (registry, events) = make_events(10_000).unwrap();
    let bytes = write(&registry, &events, Codec::Lz4).unwrap();
    c.bench_function("batch 10k events by 1000", |b| b.iter(|| batch(&bytes, 1000)));
}

criterion_group!(
    benches,
    bench_write_100_null,
    bench_read_100_null,
);

criterion_group!(
    name = long_benches;
    config = Criterion::default().sample_size(20).measurement_time(Duration::from_secs(10));
    targets =
        bench_write_10_000_lz4,
        bench_write_10_000_deflate,
        bench_read_10_000_lz4,
        bench_batches_10_000,
);

criterion_main!(benches, long_benches);
