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

//! **HIPO** is the columnar, bank oriented event format of the CLAS12 experiment. If you are not
//! familiar with the format, please read [`documentation::primer`] first.
//!
//! There are three ways of working with HIPO files in this crate:
//!
//! 1. Via [`Reader`] and [`Writer`], which work on any seekable stream and exchange whole
//!    [`Event`]s.
//! 2. Via [`HipoFile`], opened with [`open`], [`create`] or [`recreate`], which works on paths,
//!    exposes the banks of the current event through typed getters and adds banks to the events
//!    of existing files.
//! 3. Via [`iterate`] and [`Chain`], which read several files as one sequence and group the events
//!    into [`Batch`]es of columns keyed by `bank_field`.
//!
//! ```no_run
//! # fn main() -> Result<(), hipo::Error> {
//! for batch in hipo::iterate(&["run_*.hipo"], Some(&["REC::Particle"][..]), 1000)? {
//!     let batch = batch?;
//!     if let Some(px) = batch.concat("REC::Particle_px") {
//!         println!("{} events, {} particles", batch.len(), px.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `snappy`: enable support for the Snappy codec
//! - `zstandard`: enable support for the Zstandard codec
//!
//! # MSRV
//!
//! The current MSRV is 1.88.0.
//!
//! The MSRV may be bumped in minor releases.

mod codec;
mod headers;
mod reader;
mod record;
mod writer;

pub mod batch;
pub mod chain;
#[cfg(doc)]
pub mod documentation {
    //! Long form documentation.
    pub mod primer;
}
pub mod error;
pub mod event;
pub mod file;
pub mod schema;
pub mod types;
pub mod util;
pub mod validator;

#[cfg(feature = "zstandard")]
pub use codec::zstandard::ZstandardSettings;
pub use codec::{Codec, DeflateSettings, registered_codecs};
pub use batch::{Batch, Batches, batch_key};
pub use chain::{Chain, ChainedEvents};
pub use error::{Error, ErrorKind};
pub use event::{Bank, Event};
pub use file::{HipoFile, Mode, create, open, recreate};
pub use reader::Reader;
pub use schema::{Field, FieldType, Schema, SchemaRegistry};
pub use writer::Writer;

/// A convenience type alias for `Result`s with `Error`s.
pub type HipoResult<T> = Result<T, Error>;

/// Read every file matching `patterns`, in order, `step` events at a time.
///
/// `banks` restricts the banks read, all of them when `None`. This is a shortcut for a
/// [`Chain`] with default settings otherwise.
pub fn iterate<P, B>(
    patterns: &[P],
    banks: Option<&[B]>,
    step: usize,
) -> HipoResult<Batches<ChainedEvents>>
where
    P: AsRef<str>,
    B: AsRef<str>,
{
    Chain::builder()
        .patterns(patterns.iter().map(|p| p.as_ref().to_owned()).collect())
        .maybe_banks(banks.map(|banks| banks.iter().map(|b| b.as_ref().to_owned()).collect()))
        .step(step)
        .build()?
        .batches()
}
