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

//! Grouping events into column batches keyed by `bank_field`.

use crate::{HipoResult, error::Details, event::Event, types::Column};
use std::{
    collections::{BTreeMap, HashSet, btree_map},
    sync::Arc,
};

/// Events per batch when not configured otherwise.
pub const DEFAULT_STEP: usize = 100;

/// The key of `field` of `bank` in a [`Batch`].
pub fn batch_key(bank: &str, field: &str) -> String {
    format!("{bank}_{field}")
}

/// The data of up to `step` consecutive events, one entry per bank field.
///
/// Each entry holds one column per event that carried the bank, in event order. Events without
/// the bank contribute nothing, so entries of different banks may have different lengths.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    events: usize,
    entries: BTreeMap<String, Vec<Column>>,
}

impl Batch {
    /// Number of events in the batch.
    pub fn len(&self) -> usize {
        self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events == 0
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&[Column]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// The rows of every event for `key`, concatenated.
    pub fn concat(&self, key: &str) -> Option<Column> {
        let columns = self.entries.get(key)?;
        let mut flat = Column::with_capacity(
            columns.first()?.field_type(),
            columns.iter().map(Column::len).sum(),
        );
        for column in columns {
            flat.append(&mut column.clone());
        }
        Some(flat)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<Column>> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> BTreeMap<String, Vec<Column>> {
        self.entries
    }

    fn push(&mut self, event: Event, banks: Option<&HashSet<String>>) {
        self.events += 1;
        for bank in event.into_banks() {
            if banks.is_some_and(|banks| !banks.contains(bank.name())) {
                continue;
            }
            let schema = Arc::clone(bank.schema());
            for (field, column) in schema.fields().iter().zip(bank.into_columns()) {
                self.entries
                    .entry(batch_key(schema.name(), &field.name))
                    .or_default()
                    .push(column);
            }
        }
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = (&'a String, &'a Vec<Column>);
    type IntoIter = btree_map::Iter<'a, String, Vec<Column>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the batches of an event sequence.
///
/// Batches hold `step` events, except the last one which holds what is left. The iteration
/// stops after the first error.
pub struct Batches<I> {
    events: I,
    step: usize,
    banks: Option<HashSet<String>>,
    done: bool,
}

impl<I> Batches<I>
where
    I: Iterator<Item = HipoResult<Event>>,
{
    /// Group `events` by `step`, keeping only `banks` (all when `None`).
    pub fn new(events: I, step: usize, banks: Option<Vec<String>>) -> HipoResult<Self> {
        if step == 0 {
            return Err(Details::InvalidStep.into());
        }
        Ok(Self {
            events,
            step,
            banks: banks.map(|banks| banks.into_iter().collect()),
            done: false,
        })
    }

    pub fn step(&self) -> usize {
        self.step
    }
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = HipoResult<Event>>,
{
    type Item = HipoResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch = Batch::default();
        while batch.len() < self.step {
            match self.events.next() {
                Some(Ok(event)) => batch.push(event, self.banks.as_ref()),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        (!batch.is_empty()).then_some(Ok(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        event::Bank,
        schema::{FieldType, Schema},
    };
    use hipo_test_helper::TestResult;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn events(count: usize) -> TestResult<Vec<HipoResult<Event>>> {
        let track = Arc::new(Schema::new(
            "REC::Track",
            300,
            1,
            [("sector", FieldType::Byte), ("chi2", FieldType::Float)],
        )?);
        let hit = Arc::new(Schema::new("REC::Hit", 300, 2, [("id", FieldType::Int)])?);
        let mut events = Vec::new();
        for i in 0..count {
            let mut event = Event::new();
            event.add_bank(Bank::new(
                Arc::clone(&track),
                vec![Column::from(vec![i as i8]), Column::from(vec![0.5f32])],
            )?)?;
            // every third event has hits
            if i % 3 == 0 {
                event.add_bank(Bank::new(
                    Arc::clone(&hit),
                    vec![Column::from(vec![i as i32, -1])],
                )?)?;
            }
            events.push(Ok(event));
        }
        Ok(events)
    }

    #[rstest]
    #[case(17, 5, vec![5, 5, 5, 2])]
    #[case(10, 10, vec![10])]
    #[case(3, 100, vec![3])]
    #[case(0, 4, vec![])]
    fn batch_sizes(
        #[case] count: usize,
        #[case] step: usize,
        #[case] expected: Vec<usize>,
    ) -> TestResult {
        let sizes = Batches::new(events(count)?.into_iter(), step, None)?
            .map(|batch| batch.map(|b| b.len()))
            .collect::<HipoResult<Vec<_>>>()?;
        assert_eq!(sizes, expected);
        Ok(())
    }

    #[test]
    fn entries_are_ragged() -> TestResult {
        let mut batches = Batches::new(events(4)?.into_iter(), 4, None)?;
        let batch = batches.next().transpose()?.unwrap_or_default();
        assert_eq!(
            batch.keys().collect::<Vec<_>>(),
            vec!["REC::Hit_id", "REC::Track_chi2", "REC::Track_sector"]
        );
        assert_eq!(batch.get("REC::Track_sector").map(<[Column]>::len), Some(4));
        assert_eq!(
            batch.get("REC::Hit_id"),
            Some(&[Column::from(vec![0, -1]), Column::from(vec![3, -1])][..])
        );
        assert_eq!(
            batch.concat("REC::Hit_id"),
            Some(Column::from(vec![0, -1, 3, -1]))
        );
        assert!(batches.next().is_none());
        Ok(())
    }

    #[test]
    fn bank_selection() -> TestResult {
        let batch = Batches::new(events(2)?.into_iter(), 2, Some(vec!["REC::Hit".into()]))?
            .next()
            .transpose()?
            .unwrap_or_default();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.keys().collect::<Vec<_>>(), vec!["REC::Hit_id"]);
        Ok(())
    }

    #[test]
    fn zero_step_is_rejected() -> TestResult {
        let err = Batches::new(events(1)?.into_iter(), 0, None).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::InvalidArgument));
        Ok(())
    }

    #[test]
    fn error_ends_the_batches() -> TestResult {
        let mut input = events(3)?;
        input.insert(1, Err(Details::RecordMarker.into()));
        let mut batches = Batches::new(input.into_iter(), 2, None)?;
        assert_eq!(
            batches.next().map(|b| b.map(|b| b.len()).map_err(|e| e.kind())),
            Some(Err(ErrorKind::CorruptRecord))
        );
        assert!(batches.next().is_none());
        Ok(())
    }
}
