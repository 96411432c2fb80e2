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
    Error, HipoResult,
    error::Details,
    schema::{FieldType, Schema},
};

fn parse_error(input: &str, reason: impl Into<String>) -> Error {
    Details::ParseSchema {
        input: input.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// Split `{...}{...}` into the contents of the two braced sections.
fn sections(input: &str) -> HipoResult<(&str, &str)> {
    let rest = input
        .strip_prefix('{')
        .ok_or_else(|| parse_error(input, "expected '{' at the start"))?;
    let (header, rest) = rest
        .split_once('}')
        .ok_or_else(|| parse_error(input, "unterminated bank header"))?;
    let body = rest
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(|| parse_error(input, "expected a braced field list after the header"))?;
    if body.contains(['{', '}']) {
        return Err(parse_error(input, "unexpected brace in the field list"));
    }
    Ok((header, body))
}

/// Parse `{name/group/item}{field/T,field/T,...}`, ignoring surrounding whitespace.
pub(super) fn parse_schema_str(input: &str) -> HipoResult<Schema> {
    let trimmed = input.trim();
    let (header, body) = sections(trimmed)?;

    let mut parts = header.split('/');
    let (Some(name), Some(group), Some(item), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(parse_error(input, "bank header must be name/group/item"));
    };
    let group: u16 = group
        .trim()
        .parse()
        .map_err(|e| parse_error(input, format!("bad group '{group}': {e}")))?;
    let item: u8 = item
        .trim()
        .parse()
        .map_err(|e| parse_error(input, format!("bad item '{item}': {e}")))?;

    let mut fields = Vec::new();
    for entry in body.split(',') {
        let (field, code) = entry
            .split_once('/')
            .ok_or_else(|| parse_error(input, format!("field '{entry}' has no type")))?;
        fields.push((field.trim(), FieldType::from_code(code.trim())?));
    }

    Schema::new(name.trim(), group, item, fields)
}
