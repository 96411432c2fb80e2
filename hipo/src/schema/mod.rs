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

//! Logic for declaring, parsing and registering bank schemas.
//!
//! A bank schema is rendered in dictionaries as `{name/group/item}{field/T,field/T,...}`, where
//! `T` is one of the type codes of [`FieldType`].

mod parser;
mod registry;

pub use crate::schema::registry::SchemaRegistry;
pub(crate) use crate::schema::registry::{decode_dictionary, encode_dictionary};

use crate::{
    HipoResult,
    error::Details,
    validator::{validate_bank_name, validate_field_name},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// The type of one column of a bank.
///
/// The string form is the single letter type code used in dictionaries, e.g. `D` for double.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum FieldType {
    #[strum(serialize = "B")]
    #[serde(rename = "B")]
    Byte,
    #[strum(serialize = "S")]
    #[serde(rename = "S")]
    Short,
    #[strum(serialize = "I")]
    #[serde(rename = "I")]
    Int,
    #[strum(serialize = "F")]
    #[serde(rename = "F")]
    Float,
    #[strum(serialize = "D")]
    #[serde(rename = "D")]
    Double,
    #[strum(serialize = "L")]
    #[serde(rename = "L")]
    Long,
    /// Variable length UTF-8 text, one string per row.
    #[strum(serialize = "G")]
    #[serde(rename = "G")]
    String,
    /// Opaque variable length bytes, one blob per row.
    #[strum(serialize = "C")]
    #[serde(rename = "C")]
    Composite,
}

impl FieldType {
    /// The single letter type code.
    pub fn code(self) -> &'static str {
        self.into()
    }

    /// Parse a single letter type code.
    pub fn from_code(code: &str) -> HipoResult<Self> {
        code.parse()
            .map_err(|_| Details::UnknownFieldType(code.to_owned()).into())
    }

    /// The numeric type id used by the native HIPO tooling.
    pub fn id(self) -> u8 {
        match self {
            FieldType::Byte => 1,
            FieldType::Short => 2,
            FieldType::Int => 3,
            FieldType::Float => 4,
            FieldType::Double => 5,
            FieldType::String => 6,
            FieldType::Long => 8,
            FieldType::Composite => 10,
        }
    }

    pub fn from_id(id: u8) -> HipoResult<Self> {
        Ok(match id {
            1 => FieldType::Byte,
            2 => FieldType::Short,
            3 => FieldType::Int,
            4 => FieldType::Float,
            5 => FieldType::Double,
            6 => FieldType::String,
            8 => FieldType::Long,
            10 => FieldType::Composite,
            other => return Err(Details::UnknownFieldType(other.to_string()).into()),
        })
    }

    /// Byte width of one value, `None` for the variable length types.
    pub fn width(self) -> Option<usize> {
        match self {
            FieldType::Byte => Some(1),
            FieldType::Short => Some(2),
            FieldType::Int | FieldType::Float => Some(4),
            FieldType::Long | FieldType::Double => Some(8),
            FieldType::String | FieldType::Composite => None,
        }
    }
}

/// One column declaration of a bank.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// The layout of one bank: its name, its `(group, item)` address and its ordered fields.
///
/// The field order is the on-disk column order. A schema never changes once it has been
/// declared or read; a different layout needs a different bank name.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    group: u16,
    item: u8,
    fields: Vec<Field>,
}

impl Schema {
    /// Create a validated schema.
    pub fn new<I, S>(name: impl Into<String>, group: u16, item: u8, fields: I) -> HipoResult<Self>
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        let schema = Schema {
            name: name.into(),
            group,
            item,
            fields: fields
                .into_iter()
                .map(|(name, field_type)| Field {
                    name: name.into(),
                    field_type,
                })
                .collect(),
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Parse a dictionary string such as `{REC::Particle/300/1}{pid/I,px/F,py/F,pz/F}`.
    pub fn parse_str(input: &str) -> HipoResult<Self> {
        parser::parse_schema_str(input)
    }

    /// Parse a JSON description such as
    /// `{"name": "NEW::bank", "group": 1, "item": 2, "fields": [{"name": "px", "type": "D"}]}`.
    pub fn parse_json(input: &str) -> HipoResult<Self> {
        let schema: Schema = serde_json::from_str(input).map_err(Details::ParseSchemaJson)?;
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> HipoResult<()> {
        validate_bank_name(&self.name)?;
        if self.fields.is_empty() {
            return Err(Details::EmptySchema(self.name.clone()).into());
        }
        let mut seen = HashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            validate_field_name(&field.name)?;
            if !seen.insert(field.name.as_str()) {
                return Err(Details::DuplicateField {
                    bank: self.name.clone(),
                    field: field.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> u16 {
        self.group
    }

    pub fn item(&self) -> u8 {
        self.item
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields, called "entries" by the native tooling.
    pub fn entries(&self) -> usize {
        self.fields.len()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// The field called `name` or [`Details::UnknownField`].
    pub fn field(&self, name: &str) -> HipoResult<(usize, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
            .ok_or_else(|| {
                Details::UnknownField {
                    bank: self.name.clone(),
                    field: name.to_owned(),
                }
                .into()
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn types(&self) -> impl Iterator<Item = FieldType> + '_ {
        self.fields.iter().map(|f| f.field_type)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{{}/{}/{}}}{{", self.name, self.group, self.item)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}/{}", field.name, field.field_type.code())?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use hipo_test_helper::TestResult;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case("B", FieldType::Byte, 1, Some(1))]
    #[case("S", FieldType::Short, 2, Some(2))]
    #[case("I", FieldType::Int, 3, Some(4))]
    #[case("F", FieldType::Float, 4, Some(4))]
    #[case("D", FieldType::Double, 5, Some(8))]
    #[case("G", FieldType::String, 6, None)]
    #[case("L", FieldType::Long, 8, Some(8))]
    #[case("C", FieldType::Composite, 10, None)]
    fn type_codes(
        #[case] code: &str,
        #[case] field_type: FieldType,
        #[case] id: u8,
        #[case] width: Option<usize>,
    ) -> TestResult {
        assert_eq!(FieldType::from_code(code)?, field_type);
        assert_eq!(field_type.code(), code);
        assert_eq!(FieldType::from_id(id)?, field_type);
        assert_eq!(field_type.id(), id);
        assert_eq!(field_type.width(), width);
        Ok(())
    }

    #[test]
    fn unknown_type_codes() {
        assert!(FieldType::from_code("X").is_err());
        assert!(FieldType::from_code("d").is_err());
        assert!(FieldType::from_id(7).is_err());
        assert_eq!(FieldType::iter().count(), 8);
    }

    #[test]
    fn display_matches_dictionary_format() -> TestResult {
        let schema = Schema::new(
            "REC::Particle",
            300,
            1,
            [
                ("pid", FieldType::Int),
                ("px", FieldType::Float),
                ("chi2pid", FieldType::Double),
            ],
        )?;
        assert_eq!(
            schema.to_string(),
            "{REC::Particle/300/1}{pid/I,px/F,chi2pid/D}"
        );
        assert_eq!(Schema::parse_str(&schema.to_string())?, schema);
        Ok(())
    }

    #[test]
    fn field_lookup() -> TestResult {
        let schema = Schema::new(
            "NEW::bank",
            1,
            1,
            [("px", FieldType::Double), ("py", FieldType::Double)],
        )?;
        assert_eq!(schema.entries(), 2);
        assert_eq!(schema.field_index("py"), Some(1));
        assert_eq!(schema.field("px")?.1.field_type, FieldType::Double);
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["px", "py"]);
        assert!(matches!(
            schema.field("pz").unwrap_err().details(),
            Details::UnknownField { .. }
        ));
        Ok(())
    }

    #[test]
    fn rejects_bad_declarations() {
        let empty: [(&str, FieldType); 0] = [];
        assert!(matches!(
            Schema::new("NEW::bank", 1, 1, empty).unwrap_err().details(),
            Details::EmptySchema(_)
        ));
        assert!(matches!(
            Schema::new(
                "NEW::bank",
                1,
                1,
                [("px", FieldType::Double), ("px", FieldType::Float)]
            )
            .unwrap_err()
            .details(),
            Details::DuplicateField { .. }
        ));
        assert_eq!(
            Schema::new("NEW bank", 1, 1, [("px", FieldType::Double)])
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn json_description() -> TestResult {
        let schema = Schema::parse_json(
            r#"{
                "name": "NEW::bank",
                "group": 1,
                "item": 4,
                "fields": [
                    {"name": "energy", "type": "D"},
                    {"name": "sector", "type": "B"}
                ]
            }"#,
        )?;
        assert_eq!(schema.to_string(), "{NEW::bank/1/4}{energy/D,sector/B}");
        let json = serde_json::to_string(&schema)?;
        assert_eq!(Schema::parse_json(&json)?, schema);

        assert!(Schema::parse_json(r#"{"name": "x"}"#).is_err());
        assert!(
            Schema::parse_json(r#"{"name": "x", "group": 1, "item": 1, "fields": []}"#).is_err()
        );
        Ok(())
    }
}
