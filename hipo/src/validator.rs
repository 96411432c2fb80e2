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

//! # Custom name validation
//!
//! By default bank names are one or more identifiers joined by `::` (`REC::Particle`,
//! `RUN::config`) and field names are plain identifiers. Both end up inside the
//! `{name/group/item}{field/T,...}` dictionary strings, so the characters `{}/,` can never be
//! allowed.
//!
//! Some data sets use looser names. The library provides a way to customize the validation:
//!
//! ```
//! # use hipo::validator::{BankNameValidator, set_bank_name_validator};
//! # use regex_lite::Regex;
//! # use std::sync::OnceLock;
//! struct AllowDashes;
//!
//! impl BankNameValidator for AllowDashes {
//!     fn regex(&self) -> &'static Regex {
//!         static BANK_NAME_ONCE: OnceLock<Regex> = OnceLock::new();
//!         BANK_NAME_ONCE.get_or_init(|| {
//!             Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*(::[A-Za-z_][A-Za-z0-9_\-]*)*$")
//!                 .expect("Regex is valid")
//!         })
//!     }
//! }
//!
//! // don't declare any bank before registering the custom validator!
//!
//! if set_bank_name_validator(Box::new(AllowDashes)).is_err() {
//!     panic!("There was already a bank name validator configured")
//! }
//! ```
//!
//! **Note**: the library allows to set a validator only once per the application lifetime!
//! If the application declares banks before setting a validator, the default validator will be
//! registered and used!

use crate::{HipoResult, error::Details};
use log::debug;
use regex_lite::Regex;
use std::sync::OnceLock;

/// The validator used unless a custom one is registered.
struct DefaultValidator;

/// A trait that validates bank names.
///
/// To register a custom one use [`set_bank_name_validator`].
pub trait BankNameValidator: Send + Sync {
    /// The regex used to validate the bank name.
    fn regex(&self) -> &'static Regex {
        static BANK_NAME_ONCE: OnceLock<Regex> = OnceLock::new();
        BANK_NAME_ONCE.get_or_init(|| {
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*$").unwrap()
        })
    }

    /// Validates a bank name.
    ///
    /// Should return [`Details::InvalidBankName`] if it is invalid.
    fn validate(&self, name: &str) -> HipoResult<()> {
        let regex = BankNameValidator::regex(self);
        if !regex.is_match(name) {
            Err(Details::InvalidBankName(name.to_string(), regex.as_str()).into())
        } else {
            Ok(())
        }
    }
}

impl BankNameValidator for DefaultValidator {}

static BANK_NAME_VALIDATOR_ONCE: OnceLock<Box<dyn BankNameValidator + Send + Sync>> =
    OnceLock::new();

/// Sets a custom bank name validator.
///
/// Returns `Err(validator)` if a validator is already configured.
pub fn set_bank_name_validator(
    validator: Box<dyn BankNameValidator + Send + Sync>,
) -> Result<(), Box<dyn BankNameValidator + Send + Sync>> {
    debug!("Setting a custom bank name validator.");
    BANK_NAME_VALIDATOR_ONCE.set(validator)
}

pub(crate) fn validate_bank_name(name: &str) -> HipoResult<()> {
    BANK_NAME_VALIDATOR_ONCE
        .get_or_init(|| {
            debug!("Going to use the default bank name validator.");
            Box::new(DefaultValidator)
        })
        .validate(name)
}

/// A trait that validates the field names of a bank.
///
/// To register a custom one use [`set_field_name_validator`].
pub trait FieldNameValidator: Send + Sync {
    fn regex(&self) -> &'static Regex {
        static FIELD_NAME_ONCE: OnceLock<Regex> = OnceLock::new();
        FIELD_NAME_ONCE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
    }

    /// Validates a field name.
    ///
    /// Should return [`Details::InvalidFieldName`] if it is invalid.
    fn validate(&self, name: &str) -> HipoResult<()> {
        let regex = FieldNameValidator::regex(self);
        if !regex.is_match(name) {
            Err(Details::InvalidFieldName(name.to_string(), regex.as_str()).into())
        } else {
            Ok(())
        }
    }
}

impl FieldNameValidator for DefaultValidator {}

static FIELD_NAME_VALIDATOR_ONCE: OnceLock<Box<dyn FieldNameValidator + Send + Sync>> =
    OnceLock::new();

/// Sets a custom field name validator.
///
/// Returns `Err(validator)` if a validator is already configured.
pub fn set_field_name_validator(
    validator: Box<dyn FieldNameValidator + Send + Sync>,
) -> Result<(), Box<dyn FieldNameValidator + Send + Sync>> {
    debug!("Setting a custom field name validator.");
    FIELD_NAME_VALIDATOR_ONCE.set(validator)
}

pub(crate) fn validate_field_name(name: &str) -> HipoResult<()> {
    FIELD_NAME_VALIDATOR_ONCE
        .get_or_init(|| {
            debug!("Going to use the default field name validator.");
            Box::new(DefaultValidator)
        })
        .validate(name)
}
