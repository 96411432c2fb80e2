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

//! The in-memory event model: an [`Event`] is a tag plus the [`Bank`]s recorded for it.

use crate::{
    HipoResult,
    error::Details,
    schema::{FieldType, Schema},
    types::{BankRows, Column},
};
use std::{fmt, sync::Arc};

/// The data of one bank for one event.
///
/// All columns follow the schema field order and share the same row count.
#[derive(Clone, Debug, PartialEq)]
pub struct Bank {
    schema: Arc<Schema>,
    columns: Vec<Column>,
}

impl Bank {
    /// Create a bank from typed columns.
    pub fn new(schema: Arc<Schema>, columns: Vec<Column>) -> HipoResult<Self> {
        if columns.len() != schema.entries() {
            return Err(Details::FieldCountMismatch {
                bank: schema.name().to_owned(),
                expected: schema.entries(),
                actual: columns.len(),
            }
            .into());
        }
        let rows = columns.first().map_or(0, Column::len);
        for (field, column) in schema.fields().iter().zip(&columns) {
            if column.field_type() != field.field_type {
                return Err(Details::FieldTypeMismatch {
                    bank: schema.name().to_owned(),
                    field: field.name.clone(),
                    expected: field.field_type,
                    actual: column.field_type(),
                }
                .into());
            }
            if column.len() != rows {
                return Err(Details::InconsistentRowCount {
                    bank: schema.name().to_owned(),
                    field: field.name.clone(),
                    expected: rows,
                    actual: column.len(),
                }
                .into());
            }
        }
        Ok(Self { schema, columns })
    }

    /// Create a bank from loosely typed cells, indexed `[field][row]`.
    pub fn from_rows(schema: Arc<Schema>, rows: BankRows) -> HipoResult<Self> {
        if rows.len() != schema.entries() {
            return Err(Details::FieldCountMismatch {
                bank: schema.name().to_owned(),
                expected: schema.entries(),
                actual: rows.len(),
            }
            .into());
        }
        let columns = schema
            .fields()
            .iter()
            .zip(rows)
            .map(|(field, values)| Column::from_values(field, values))
            .collect::<HipoResult<Vec<_>>>()?;
        Self::new(schema, columns)
    }

    /// Internal constructor for columns already checked by the decoder.
    pub(crate) fn from_decoded(schema: Arc<Schema>, columns: Vec<Column>) -> Self {
        Self { schema, columns }
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column(&self, field: &str) -> HipoResult<&Column> {
        let (index, _) = self.schema.field(field)?;
        Ok(&self.columns[index])
    }

    fn typed<'a, T>(
        &'a self,
        field: &str,
        expected: FieldType,
        access: impl FnOnce(&'a Column) -> Option<&'a [T]>,
    ) -> HipoResult<&'a [T]> {
        let column = self.column(field)?;
        access(column).ok_or_else(|| {
            Details::FieldTypeMismatch {
                bank: self.name().to_owned(),
                field: field.to_owned(),
                expected,
                actual: column.field_type(),
            }
            .into()
        })
    }
}

macro_rules! typed_getters (
    ($($name:ident, $type:ty, $field_type:ident, $access:ident);* $(;)?) => (
        impl Bank {
            $(
                pub fn $name(&self, field: &str) -> HipoResult<&[$type]> {
                    self.typed(field, FieldType::$field_type, Column::$access)
                }
            )*
        }

        impl Event {
            $(
                /// Values of `bank.field`, empty when the event does not carry the bank.
                pub fn $name(&self, bank: &str, field: &str) -> HipoResult<&[$type]> {
                    match self.bank(bank) {
                        Some(b) => b.$name(field),
                        None => Ok(&[]),
                    }
                }
            )*
        }
    );
);

typed_getters!(
    get_bytes, i8, Byte, as_bytes;
    get_shorts, i16, Short, as_shorts;
    get_ints, i32, Int, as_ints;
    get_longs, i64, Long, as_longs;
    get_floats, f32, Float, as_floats;
    get_doubles, f64, Double, as_doubles;
    get_strings, String, String, as_strings;
    get_composites, Vec<u8>, Composite, as_composites;
);

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} rows: {}", self.schema, self.rows())?;
        for (field, column) in self.schema.fields().iter().zip(&self.columns) {
            write!(f, "{:>16} :", field.name)?;
            for row in 0..column.len() {
                if let Some(value) = column.get(row) {
                    write!(f, " {value}")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// One event: a tag and at most one instance of each bank.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Event {
    tag: u32,
    banks: Vec<Bank>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(tag: u32) -> Self {
        Self {
            tag,
            banks: Vec::new(),
        }
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn set_tag(&mut self, tag: u32) {
        self.tag = tag;
    }

    /// Attach a bank. An event carries each bank at most once.
    pub fn add_bank(&mut self, bank: Bank) -> HipoResult<()> {
        if self.has_bank(bank.name()) {
            return Err(Details::DuplicateBankInEvent(bank.name().to_owned()).into());
        }
        self.banks.push(bank);
        Ok(())
    }

    pub(crate) fn push_decoded(&mut self, bank: Bank) {
        self.banks.push(bank);
    }

    pub fn banks(&self) -> &[Bank] {
        &self.banks
    }

    pub fn into_banks(self) -> Vec<Bank> {
        self.banks
    }

    pub fn bank(&self, name: &str) -> Option<&Bank> {
        self.banks.iter().find(|b| b.name() == name)
    }

    pub fn has_bank(&self, name: &str) -> bool {
        self.bank(name).is_some()
    }

    pub fn bank_names(&self) -> impl Iterator<Item = &str> {
        self.banks.iter().map(Bank::name)
    }

    /// Rows of `bank` in this event, 0 when it is absent.
    pub fn rows(&self, bank: &str) -> usize {
        self.bank(bank).map_or(0, Bank::rows)
    }

    /// Number of banks.
    pub fn len(&self) -> usize {
        self.banks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "event tag {} with {} banks", self.tag, self.banks.len())?;
        for bank in &self.banks {
            writeln!(f, "{:>24} : {:>5} rows", bank.name(), bank.rows())?;
        }
        Ok(())
    }
}
