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
    schema::{FieldType, Schema},
    util::{ByteCursor, len_u32, put_len_prefixed},
};
use log::debug;
use std::{collections::HashMap, fmt, sync::Arc};

/// The group used by [`SchemaRegistry::new_tree`].
pub const DEFAULT_GROUP: u16 = 1;

/// The set of bank schemas known to one file.
///
/// Schemas are shared with the events that reference them and never change after registration.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    schemas: Vec<Arc<Schema>>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<(u16, u8), usize>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema declared by the caller.
    ///
    /// Fails with [`Details::DuplicateSchema`] if the name is already taken and with
    /// [`Details::DuplicateSchemaId`] if its `(group, item)` pair belongs to another bank.
    pub fn declare(&mut self, schema: Schema) -> HipoResult<Arc<Schema>> {
        if self.by_name.contains_key(schema.name()) {
            return Err(Details::DuplicateSchema(schema.name().to_owned()).into());
        }
        if let Some(existing) = self.by_id(schema.group(), schema.item()) {
            return Err(Details::DuplicateSchemaId {
                name: schema.name().to_owned(),
                group: schema.group(),
                item: schema.item(),
                existing: existing.name().to_owned(),
            }
            .into());
        }
        debug!("Declared bank {schema}");
        Ok(self.insert(schema))
    }

    /// Declare a bank in group 1 with the next free item number.
    pub fn new_tree<I, S>(&mut self, name: &str, fields: I) -> HipoResult<Arc<Schema>>
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        if self.by_name.contains_key(name) {
            return Err(Details::DuplicateSchema(name.to_owned()).into());
        }
        let item = self.next_item(DEFAULT_GROUP)?;
        self.declare(Schema::new(name, DEFAULT_GROUP, item, fields)?)
    }

    /// Declare a bank with an explicit `(group, item)` address.
    pub fn new_tree_with_id<I, S>(
        &mut self,
        name: &str,
        group: u16,
        item: u8,
        fields: I,
    ) -> HipoResult<Arc<Schema>>
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        self.declare(Schema::new(name, group, item, fields)?)
    }

    fn next_item(&self, group: u16) -> HipoResult<u8> {
        let max = self
            .schemas
            .iter()
            .filter(|s| s.group() == group)
            .map(|s| s.item())
            .max()
            .unwrap_or(0);
        max.checked_add(1)
            .ok_or_else(|| Details::ItemOverflow(group).into())
    }

    /// Register a schema read from a record dictionary.
    ///
    /// Dictionaries are cumulative: a schema identical to a known one is accepted again, a
    /// different definition under a known name or address is [`Details::ConflictingSchema`].
    pub fn merge(&mut self, schema: Schema) -> HipoResult<Arc<Schema>> {
        if let Some(&index) = self.by_name.get(schema.name()) {
            let existing = &self.schemas[index];
            if **existing == schema {
                return Ok(Arc::clone(existing));
            }
            return Err(Details::ConflictingSchema(schema.name().to_owned()).into());
        }
        if self.by_id(schema.group(), schema.item()).is_some() {
            return Err(Details::ConflictingSchema(schema.name().to_owned()).into());
        }
        Ok(self.insert(schema))
    }

    fn insert(&mut self, schema: Schema) -> Arc<Schema> {
        let index = self.schemas.len();
        self.by_name.insert(schema.name().to_owned(), index);
        self.by_id.insert((schema.group(), schema.item()), index);
        let schema = Arc::new(schema);
        self.schemas.push(Arc::clone(&schema));
        schema
    }

    /// Look up a bank that is expected to be in the dictionary.
    pub fn resolve(&self, name: &str) -> HipoResult<&Arc<Schema>> {
        self.get(name)
            .ok_or_else(|| Details::UnknownBank(name.to_owned()).into())
    }

    /// Look up a bank the caller wants to write.
    pub fn require(&self, name: &str) -> HipoResult<&Arc<Schema>> {
        self.get(name)
            .ok_or_else(|| Details::SchemaNotDeclared(name.to_owned()).into())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Schema>> {
        self.by_name.get(name).map(|&i| &self.schemas[i])
    }

    pub fn by_id(&self, group: u16, item: u8) -> Option<&Arc<Schema>> {
        self.by_id.get(&(group, item)).map(|&i| &self.schemas[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Bank names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.iter().map(|s| s.name())
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Arc<Schema>> {
        self.schemas.iter()
    }
}

impl fmt::Display for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for schema in &self.schemas {
            writeln!(f, "{schema}")?;
        }
        Ok(())
    }
}

/// Append `count:u32 (len:u32 utf8[len]){count}` for the given schemas.
pub(crate) fn encode_dictionary<'a>(
    schemas: impl ExactSizeIterator<Item = &'a Schema>,
    buffer: &mut Vec<u8>,
) -> HipoResult<()> {
    buffer.extend_from_slice(&len_u32(schemas.len())?.to_le_bytes());
    for schema in schemas {
        put_len_prefixed(buffer, schema.to_string().as_bytes())?;
    }
    Ok(())
}

pub(crate) fn decode_dictionary(cursor: &mut ByteCursor) -> HipoResult<Vec<Schema>> {
    let count = cursor.u32()? as usize;
    // every entry needs at least its length prefix
    if count > cursor.remaining() / 4 {
        return Err(Details::CorruptDictionary(format!(
            "{count} entries announced in {} bytes",
            cursor.remaining()
        ))
        .into());
    }
    let mut schemas = Vec::with_capacity(count);
    for _ in 0..count {
        let text = cursor.string()?;
        let schema = Schema::parse_str(&text)
            .map_err(|e| Details::CorruptDictionary(format!("{text}: {e}")))?;
        schemas.push(schema);
    }
    Ok(schemas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use hipo_test_helper::TestResult;
    use pretty_assertions::assert_eq;

    fn px_py() -> [(&'static str, FieldType); 2] {
        [("px", FieldType::Double), ("py", FieldType::Double)]
    }

    #[test]
    fn new_tree_assigns_items() -> TestResult {
        let mut registry = SchemaRegistry::new();
        let first = registry.new_tree("NEW::first", px_py())?;
        let second = registry.new_tree("NEW::second", px_py())?;
        assert_eq!((first.group(), first.item()), (1, 1));
        assert_eq!((second.group(), second.item()), (1, 2));

        registry.new_tree_with_id("NEW::explicit", 1, 10, px_py())?;
        let next = registry.new_tree("NEW::next", px_py())?;
        assert_eq!(next.item(), 11);
        assert_eq!(registry.names().collect::<Vec<_>>().len(), 4);
        Ok(())
    }

    #[test]
    fn item_overflow() -> TestResult {
        let mut registry = SchemaRegistry::new();
        registry.new_tree_with_id("NEW::last", 1, 255, px_py())?;
        let err = registry.new_tree("NEW::more", px_py()).unwrap_err();
        assert!(matches!(err.details(), Details::ItemOverflow(1)));
        Ok(())
    }

    #[test]
    fn duplicates_are_rejected() -> TestResult {
        let mut registry = SchemaRegistry::new();
        registry.new_tree("NEW::bank", px_py())?;
        let err = registry.new_tree("NEW::bank", px_py()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateSchema);

        let err = registry
            .new_tree_with_id("NEW::other", 1, 1, px_py())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateSchema);
        assert!(matches!(err.details(), Details::DuplicateSchemaId { .. }));
        Ok(())
    }

    #[test]
    fn lookups() -> TestResult {
        let mut registry = SchemaRegistry::new();
        registry.new_tree_with_id("REC::Particle", 300, 1, [("pid", FieldType::Int)])?;
        assert_eq!(registry.resolve("REC::Particle")?.group(), 300);
        assert_eq!(
            registry.by_id(300, 1).map(|s| s.name()),
            Some("REC::Particle")
        );
        assert_eq!(
            registry.resolve("REC::Event").unwrap_err().kind(),
            ErrorKind::UnknownBank
        );
        assert_eq!(
            registry.require("REC::Event").unwrap_err().kind(),
            ErrorKind::SchemaNotDeclared
        );
        Ok(())
    }

    #[test]
    fn merge_is_cumulative() -> TestResult {
        let mut registry = SchemaRegistry::new();
        let schema = Schema::parse_str("{REC::Particle/300/1}{pid/I}")?;
        registry.merge(schema.clone())?;
        registry.merge(schema)?;
        assert_eq!(registry.len(), 1);

        let changed = Schema::parse_str("{REC::Particle/300/1}{pid/L}")?;
        assert_eq!(
            registry.merge(changed).unwrap_err().kind(),
            ErrorKind::CorruptRecord
        );
        let clash = Schema::parse_str("{REC::Other/300/1}{pid/I}")?;
        assert!(registry.merge(clash).is_err());
        Ok(())
    }

    #[test]
    fn dictionary_bytes() -> TestResult {
        let mut registry = SchemaRegistry::new();
        registry.new_tree("NEW::a", px_py())?;
        registry.new_tree("NEW::b", [("n", FieldType::Short)])?;

        let mut buffer = Vec::new();
        encode_dictionary(registry.iter().map(|s| s.as_ref()), &mut buffer)?;
        let mut cursor = ByteCursor::new(&buffer);
        let decoded = decode_dictionary(&mut cursor)?;
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(
            decoded.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            vec!["{NEW::a/1/1}{px/D,py/D}", "{NEW::b/1/2}{n/S}"]
        );
        assert_eq!(
            registry.to_string(),
            "{NEW::a/1/1}{px/D,py/D}\n{NEW::b/1/2}{n/S}\n"
        );
        Ok(())
    }

    #[test]
    fn dictionary_with_bad_entry() -> TestResult {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&1u32.to_le_bytes());
        put_len_prefixed(&mut buffer, b"{broken")?;
        let err = decode_dictionary(&mut ByteCursor::new(&buffer)).unwrap_err();
        assert!(matches!(err.details(), Details::CorruptDictionary(_)));

        let huge = u32::MAX.to_le_bytes();
        assert!(decode_dictionary(&mut ByteCursor::new(&huge)).is_err());
        Ok(())
    }
}
