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

//! Logic for handling the values stored in bank columns.
//!
//! [`Value`] is the loosely typed input cell accepted by the writing side, [`Column`] is the
//! strongly typed storage of one field of one bank.

use crate::{
    HipoResult,
    error::Details,
    schema::{Field, FieldType},
};
use std::fmt;

/// Column data for one bank of one event, indexed `[field][row]` in schema field order.
pub type BankRows = Vec<Vec<Value>>;

/// Largest integer magnitude an `f32` represents exactly.
const F32_EXACT: u64 = 1 << 24;
/// Largest integer magnitude an `f64` represents exactly.
const F64_EXACT: u64 = 1 << 53;

/// A single cell handed to the writer.
///
/// Conversion into the declared [`FieldType`] never truncates; see [`Column::from_values`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Byte(v) => Some(v.into()),
            Value::Short(v) => Some(v.into()),
            Value::Int(v) => Some(v.into()),
            Value::Long(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

macro_rules! impl_value_from (
    ($type:ty, $variant:ident) => (
        impl From<$type> for Value {
            fn from(value: $type) -> Self {
                Value::$variant(value.into())
            }
        }
    );
);

impl_value_from!(i8, Byte);
impl_value_from!(i16, Short);
impl_value_from!(i32, Int);
impl_value_from!(i64, Long);
impl_value_from!(f32, Float);
impl_value_from!(f64, Double);
impl_value_from!(String, String);
impl_value_from!(&str, String);
impl_value_from!(Vec<u8>, Bytes);
impl_value_from!(&[u8], Bytes);

/// The values of one field of one bank instance.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    String(Vec<String>),
    Composite(Vec<Vec<u8>>),
}

macro_rules! column_dispatch (
    ($column:expr, $values:ident => $body:expr) => (
        match $column {
            Column::Byte($values) => $body,
            Column::Short($values) => $body,
            Column::Int($values) => $body,
            Column::Long($values) => $body,
            Column::Float($values) => $body,
            Column::Double($values) => $body,
            Column::String($values) => $body,
            Column::Composite($values) => $body,
        }
    );
);

impl Column {
    /// An empty column able to hold `capacity` rows of `field_type`.
    pub fn with_capacity(field_type: FieldType, capacity: usize) -> Self {
        match field_type {
            FieldType::Byte => Column::Byte(Vec::with_capacity(capacity)),
            FieldType::Short => Column::Short(Vec::with_capacity(capacity)),
            FieldType::Int => Column::Int(Vec::with_capacity(capacity)),
            FieldType::Long => Column::Long(Vec::with_capacity(capacity)),
            FieldType::Float => Column::Float(Vec::with_capacity(capacity)),
            FieldType::Double => Column::Double(Vec::with_capacity(capacity)),
            FieldType::String => Column::String(Vec::with_capacity(capacity)),
            FieldType::Composite => Column::Composite(Vec::with_capacity(capacity)),
        }
    }

    /// Convert loosely typed cells into a column of `field`'s type.
    ///
    /// Integers must fit the target width, integers stored as floating point must be exactly
    /// representable, doubles stored as floats must be finite and within `f32` range, and
    /// floating point values are never stored into integer fields. Any other combination is
    /// [`Details::ValueOutOfRange`].
    pub fn from_values(field: &Field, values: Vec<Value>) -> HipoResult<Self> {
        let mut column = Column::with_capacity(field.field_type, values.len());
        for value in values {
            column.push(field, value)?;
        }
        Ok(column)
    }

    fn push(&mut self, field: &Field, value: Value) -> HipoResult<()> {
        let out_of_range = |value: &Value| -> crate::Error {
            Details::ValueOutOfRange {
                field: field.name.clone(),
                value: value.to_string(),
                field_type: field.field_type,
            }
            .into()
        };
        match self {
            Column::Byte(values) => values.push(
                value
                    .as_integer()
                    .and_then(|v| i8::try_from(v).ok())
                    .ok_or_else(|| out_of_range(&value))?,
            ),
            Column::Short(values) => values.push(
                value
                    .as_integer()
                    .and_then(|v| i16::try_from(v).ok())
                    .ok_or_else(|| out_of_range(&value))?,
            ),
            Column::Int(values) => values.push(
                value
                    .as_integer()
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or_else(|| out_of_range(&value))?,
            ),
            Column::Long(values) => values.push(
                value
                    .as_integer()
                    .ok_or_else(|| out_of_range(&value))?,
            ),
            Column::Float(values) => values.push(match value {
                Value::Float(v) => v,
                Value::Double(v) if v.is_finite() && v.abs() <= f64::from(f32::MAX) => v as f32,
                ref other => match other.as_integer() {
                    Some(v) if v.unsigned_abs() <= F32_EXACT => v as f32,
                    _ => return Err(out_of_range(&value)),
                },
            }),
            Column::Double(values) => values.push(match value {
                Value::Double(v) => v,
                Value::Float(v) => v.into(),
                ref other => match other.as_integer() {
                    Some(v) if v.unsigned_abs() <= F64_EXACT => v as f64,
                    _ => return Err(out_of_range(&value)),
                },
            }),
            Column::String(values) => match value {
                Value::String(v) => values.push(v),
                other => return Err(out_of_range(&other)),
            },
            Column::Composite(values) => match value {
                Value::Bytes(v) => values.push(v),
                other => return Err(out_of_range(&other)),
            },
        }
        Ok(())
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Column::Byte(_) => FieldType::Byte,
            Column::Short(_) => FieldType::Short,
            Column::Int(_) => FieldType::Int,
            Column::Long(_) => FieldType::Long,
            Column::Float(_) => FieldType::Float,
            Column::Double(_) => FieldType::Double,
            Column::String(_) => FieldType::String,
            Column::Composite(_) => FieldType::Composite,
        }
    }

    pub fn len(&self) -> usize {
        column_dispatch!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The cell at `row`, if any.
    pub fn get(&self, row: usize) -> Option<Value> {
        match self {
            Column::Byte(values) => values.get(row).map(|&v| Value::Byte(v)),
            Column::Short(values) => values.get(row).map(|&v| Value::Short(v)),
            Column::Int(values) => values.get(row).map(|&v| Value::Int(v)),
            Column::Long(values) => values.get(row).map(|&v| Value::Long(v)),
            Column::Float(values) => values.get(row).map(|&v| Value::Float(v)),
            Column::Double(values) => values.get(row).map(|&v| Value::Double(v)),
            Column::String(values) => values.get(row).cloned().map(Value::String),
            Column::Composite(values) => values.get(row).cloned().map(Value::Bytes),
        }
    }

    /// Move the rows of `other` to the end of this column.
    ///
    /// Both columns must hold the same type.
    pub(crate) fn append(&mut self, other: &mut Column) -> bool {
        match (self, other) {
            (Column::Byte(a), Column::Byte(b)) => a.append(b),
            (Column::Short(a), Column::Short(b)) => a.append(b),
            (Column::Int(a), Column::Int(b)) => a.append(b),
            (Column::Long(a), Column::Long(b)) => a.append(b),
            (Column::Float(a), Column::Float(b)) => a.append(b),
            (Column::Double(a), Column::Double(b)) => a.append(b),
            (Column::String(a), Column::String(b)) => a.append(b),
            (Column::Composite(a), Column::Composite(b)) => a.append(b),
            _ => return false,
        }
        true
    }
}

macro_rules! impl_column_accessors (
    ($($variant:ident, $type:ty, $name:ident);* $(;)?) => (
        impl Column {
            $(
                #[doc = concat!("The rows as `", stringify!($type), "` if this is a `", stringify!($variant), "` column.")]
                pub fn $name(&self) -> Option<&[$type]> {
                    match self {
                        Column::$variant(values) => Some(values),
                        _ => None,
                    }
                }
            )*
        }

        $(
            impl From<Vec<$type>> for Column {
                fn from(values: Vec<$type>) -> Self {
                    Column::$variant(values)
                }
            }
        )*
    );
);

impl_column_accessors!(
    Byte, i8, as_bytes;
    Short, i16, as_shorts;
    Int, i32, as_ints;
    Long, i64, as_longs;
    Float, f32, as_floats;
    Double, f64, as_doubles;
    String, String, as_strings;
    Composite, Vec<u8>, as_composites;
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use hipo_test_helper::TestResult;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn field(field_type: FieldType) -> Field {
        Field {
            name: "x".to_owned(),
            field_type,
        }
    }

    #[rstest]
    #[case(FieldType::Byte, Value::Int(127), true)]
    #[case(FieldType::Byte, Value::Int(128), false)]
    #[case(FieldType::Short, Value::Long(-32768), true)]
    #[case(FieldType::Short, Value::Int(40_000), false)]
    #[case(FieldType::Int, Value::Long(i64::from(i32::MAX)), true)]
    #[case(FieldType::Int, Value::Long(1 << 40), false)]
    #[case(FieldType::Int, Value::Double(1.0), false)]
    #[case(FieldType::Long, Value::Long(i64::MIN), true)]
    #[case(FieldType::Long, Value::Float(1.0), false)]
    #[case(FieldType::Float, Value::Int(1 << 24), true)]
    #[case(FieldType::Float, Value::Int((1 << 24) + 1), false)]
    #[case(FieldType::Float, Value::Double(0.1), true)]
    #[case(FieldType::Float, Value::Double(1e300), false)]
    #[case(FieldType::Float, Value::Double(f64::INFINITY), false)]
    #[case(FieldType::Double, Value::Long(1 << 53), true)]
    #[case(FieldType::Double, Value::Long((1 << 53) + 1), false)]
    #[case(FieldType::Double, Value::Float(2.5), true)]
    #[case(FieldType::String, Value::from("text"), true)]
    #[case(FieldType::String, Value::Int(1), false)]
    #[case(FieldType::Composite, Value::from(vec![1u8, 2, 3]), true)]
    #[case(FieldType::Composite, Value::from("text"), false)]
    fn conversions(#[case] field_type: FieldType, #[case] value: Value, #[case] accepted: bool) {
        let result = Column::from_values(&field(field_type), vec![value]);
        match result {
            Ok(column) => {
                assert!(accepted);
                assert_eq!(column.field_type(), field_type);
                assert_eq!(column.len(), 1);
            }
            Err(err) => {
                assert!(!accepted);
                assert_eq!(err.kind(), ErrorKind::ValueOutOfRange);
            }
        }
    }

    #[test]
    fn out_of_range_names_the_field() {
        let err = Column::from_values(&field(FieldType::Int), vec![Value::Long(i64::MAX)])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Value 9223372036854775807 does not fit field 'x' of type Int"
        );
    }

    #[test]
    fn typed_access() -> TestResult {
        let column = Column::from_values(
            &field(FieldType::Double),
            vec![Value::Double(1.5), Value::Int(2), Value::Float(0.5)],
        )?;
        assert_eq!(column.as_doubles(), Some(&[1.5, 2.0, 0.5][..]));
        assert_eq!(column.as_ints(), None);
        assert_eq!(column.get(1), Some(Value::Double(2.0)));
        assert_eq!(column.get(3), None);
        Ok(())
    }

    #[test]
    fn append_requires_same_type() {
        let mut a = Column::from(vec![1i32, 2]);
        let mut b = Column::from(vec![3i32]);
        assert!(a.append(&mut b));
        assert_eq!(a, Column::Int(vec![1, 2, 3]));
        assert!(b.is_empty());

        let mut c = Column::from(vec![1.0f64]);
        assert!(!a.append(&mut c));
        assert_eq!(c.len(), 1);
    }
}
