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

//! Translation between events and record payloads.
//!
//! ```text
//! payload := dictionary event{events}
//! event   := tag:u32 banks:u32 bank{banks}
//! bank    := group:u16 item:u8 pad:u8 rows:u32 column{fields in schema order}
//! column  := fixed-width values[rows] | (len:u32 bytes[len]){rows}
//! ```

mod decode;
mod encode;

pub(crate) use self::{
    decode::{decode_record, decode_record_dictionary},
    encode::{EncodedRecord, RecordBuilder},
};

#[cfg(test)]
pub(crate) use self::encode::encode_record;

use std::collections::HashSet;

/// Which parts of a record the reading side keeps.
#[derive(Clone, Debug, Default)]
pub(crate) struct EventFilter {
    /// Banks to materialise, all when `None`.
    banks: Option<HashSet<String>>,
    /// Accepted event tags, all when empty.
    tags: HashSet<u32>,
}

impl EventFilter {
    pub(crate) fn new(banks: Option<Vec<String>>, tags: Vec<u32>) -> Self {
        Self {
            banks: banks.map(|banks| banks.into_iter().collect()),
            tags: tags.into_iter().collect(),
        }
    }

    pub(crate) fn wants_bank(&self, name: &str) -> bool {
        self.banks.as_ref().is_none_or(|banks| banks.contains(name))
    }

    pub(crate) fn accepts_tag(&self, tag: u32) -> bool {
        self.tags.is_empty() || self.tags.contains(&tag)
    }

    pub(crate) fn set_tags(&mut self, tags: Vec<u32>) {
        self.tags = tags.into_iter().collect();
    }

    /// The same bank selection, accepting every tag.
    pub(crate) fn without_tags(&self) -> Self {
        Self {
            banks: self.banks.clone(),
            tags: HashSet::new(),
        }
    }
}
