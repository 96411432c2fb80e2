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

//! # A primer on HIPO files
//!
//! HIPO is the event format of the CLAS12 experiment. A file is a sequence of *events*, and each
//! event carries a few *banks*: small tables with typed columns, such as the reconstructed
//! particles or the hits of one detector. The number of rows of a bank changes from event to
//! event, its columns never do.
//!
//! ## Schemas
//!
//! The columns of a bank are declared by a schema, written in dictionaries as
//! ```text
//! {REC::Particle/300/1}{pid/I,px/F,py/F,pz/F,vz/F,charge/B,status/S}
//! ```
//! that is the bank name, a `(group, item)` pair identifying the bank inside records, and the
//! fields with their type codes:
//!
//! | code | type      | width    |
//! |------|-----------|----------|
//! | `B`  | byte      | 1        |
//! | `S`  | short     | 2        |
//! | `I`  | int       | 4        |
//! | `F`  | float     | 4        |
//! | `D`  | double    | 8        |
//! | `L`  | long      | 8        |
//! | `G`  | string    | variable |
//! | `C`  | composite | variable |
//!
//! Schemas are represented by [`Schema`](crate::Schema) and collected in a
//! [`SchemaRegistry`](crate::SchemaRegistry). Field order is part of the layout.
//!
//! ## Records
//!
//! Events are grouped into *records*, the unit of compression and I/O. Each record starts with the
//! dictionary of the banks it uses, so a record can be decoded on its own. The codec is stored in
//! every record header, so records written with different codecs can share a file.
//!
//! ## The index
//!
//! After the last record the writer stores a trailer with the position of every record and the
//! full dictionary. Readers use it to open a file without scanning it and to jump to any event.
//! The trailer is rewritten on every flush. A file whose writer died before writing it is still
//! readable: the records are found by walking them from the start of the file.
//!
//! ## Reading and writing
//!
//! - [`Reader`](crate::Reader) and [`Writer`](crate::Writer) work on any `Read + Seek` or
//!   `Write + Seek` value.
//! - [`HipoFile`](crate::HipoFile), created by [`open`](crate::open), [`create`](crate::create)
//!   and [`recreate`](crate::recreate), works on paths and adds banks to existing files.
//! - [`Chain`](crate::Chain) and [`iterate`](crate::iterate) read several files as one sequence and
//!   group events into [`Batch`](crate::Batch)es of columns keyed by `bank_field`.
//!
//! ## Compression
//!
//! Records can be compressed with:
//!
//!  - LZ4 (the default)
//!  - deflate
//!  - Snappy (feature `snappy`)
//!  - Zstandard (feature `zstandard`)
