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

//! The file container: one HIPO file opened to read its events, to write a new file, or to add
//! banks to the events of an existing file.
//!
//! ```no_run
//! # use hipo::{FieldType, types::Value};
//! # fn main() -> Result<(), hipo::Error> {
//! let mut file = hipo::create("out.hipo")?;
//! file.new_tree("NEW::bank", [("px", FieldType::Double), ("pid", FieldType::Int)])?;
//! file.open()?;
//! file.extend([(
//!     "NEW::bank",
//!     vec![vec![vec![Value::Double(0.5)], vec![Value::Int(11)]]],
//! )])?;
//! file.close()?;
//! # Ok(())
//! # }
//! ```

use crate::{
    Codec, HipoResult,
    batch::Batches,
    error::Details,
    event::{Bank, Event},
    reader::Reader,
    schema::{FieldType, Schema, SchemaRegistry},
    types::BankRows,
    writer::Writer,
};
use log::{debug, warn};
use std::{
    collections::HashSet,
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    mem,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

type Source = BufReader<File>;
type Sink = BufWriter<File>;

/// Appended to the path of the file an append session writes to.
const SIDE_FILE_SUFFIX: &str = "~";

/// How a [`HipoFile`] uses its path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Read the events of an existing file.
    Read,
    /// Write a new file, replacing any existing one.
    Write,
    /// Add banks to the events of an existing file.
    Append,
}

enum State {
    Created,
    /// Append mode: the source is open and banks may be declared before the writer opens.
    Loaded(Reader<Source>),
    Reading(Reader<Source>),
    Writing(Writer<Sink>),
    Appending {
        source: Reader<Source>,
        writer: Writer<Sink>,
        /// Source events taken so far.
        consumed: usize,
    },
    Closed,
}

/// A HIPO file opened in one [`Mode`].
///
/// Write and append sessions follow the same steps: declare banks with
/// [`new_tree`](Self::new_tree), call [`open`](Self::open), add data with
/// [`extend`](Self::extend) or [`update`](Self::update), then [`close`](Self::close).
///
/// In append mode the new file is written next to the original, with a `~` appended to its name,
/// and moved over the original by `close`. Only the source events handed to `extend` or `update`
/// are written. Dropping the container without closing it leaves the original untouched.
///
/// At most one write or append container may use a path at a time.
pub struct HipoFile {
    path: PathBuf,
    mode: Mode,
    codec: Codec,
    tags: Vec<u32>,
    /// Banks declared before a writer exists.
    registry: SchemaRegistry,
    state: State,
    current: Option<Event>,
    lock: Option<PathLock>,
}

/// Open `path` and read its header and index.
pub fn open(path: impl AsRef<Path>) -> HipoResult<HipoFile> {
    let mut file = HipoFile::new(path, Mode::Read)?;
    file.open()?;
    Ok(file)
}

/// Prepare a new file at `path`. Declare its banks, then call [`HipoFile::open`].
pub fn create(path: impl AsRef<Path>) -> HipoResult<HipoFile> {
    HipoFile::new(path, Mode::Write)
}

/// Open the existing file at `path` to add banks to its events.
///
/// The dictionary of the file is loaded so that new banks get fresh item numbers. Call
/// [`HipoFile::open`] again once the new banks are declared.
pub fn recreate(path: impl AsRef<Path>) -> HipoResult<HipoFile> {
    let mut file = HipoFile::new(path, Mode::Append)?;
    file.open()?;
    Ok(file)
}

impl HipoFile {
    /// Create a closed container. Write and append containers lock `path` right away.
    pub fn new(path: impl AsRef<Path>, mode: Mode) -> HipoResult<Self> {
        let path = path.as_ref().to_path_buf();
        let lock = match mode {
            Mode::Read => None,
            Mode::Write | Mode::Append => Some(PathLock::acquire(&path)?),
        };
        Ok(Self {
            path,
            mode,
            codec: Codec::default(),
            tags: Vec::new(),
            registry: SchemaRegistry::new(),
            state: State::Created,
            current: None,
            lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Codec of the records written from now on. Takes effect on [`open`](Self::open).
    pub fn set_codec(&mut self, codec: Codec) {
        self.codec = codec;
    }

    /// Only read events carrying one of `tags`, all of them when empty.
    pub fn set_tags(&mut self, tags: Vec<u32>) {
        if let State::Reading(reader) = &mut self.state {
            reader.set_tags(tags.clone());
        }
        self.tags = tags;
    }

    /// Advance the container to its next state.
    ///
    /// Read mode opens the file. Write mode creates it. Append mode first loads the source, and
    /// on the second call starts writing the new file. Opening an open container does nothing.
    ///
    /// Writing needs at least one declared bank, otherwise this fails with `SchemaNotDeclared`
    /// and no file is created.
    pub fn open(&mut self) -> HipoResult<()> {
        match self.state {
            State::Created => match self.mode {
                Mode::Read => {
                    let reader = Reader::builder(open_source(&self.path)?)
                        .tags(self.tags.clone())
                        .build()?;
                    debug!(
                        "Opened {} with {} events",
                        self.path.display(),
                        reader.event_count()
                    );
                    self.state = State::Reading(reader);
                }
                Mode::Write => {
                    let writer = self.writer(&self.path)?;
                    debug!("Created {}", self.path.display());
                    self.state = State::Writing(writer);
                }
                Mode::Append => {
                    let source = Reader::new(open_source(&self.path)?)?;
                    self.registry = source.registry().clone();
                    debug!(
                        "Loaded {} with {} events and {} banks for appending",
                        self.path.display(),
                        source.event_count(),
                        self.registry.len()
                    );
                    self.state = State::Loaded(source);
                }
            },
            State::Loaded(_) => {
                let writer = self.writer(&self.side_path())?;
                if let State::Loaded(source) = mem::replace(&mut self.state, State::Closed) {
                    self.state = State::Appending {
                        source,
                        writer,
                        consumed: 0,
                    };
                }
            }
            State::Reading(_) | State::Writing(_) | State::Appending { .. } => {}
            State::Closed => return Err(Details::NotOpen.into()),
        }
        Ok(())
    }

    fn writer(&self, path: &Path) -> HipoResult<Writer<Sink>> {
        if self.registry.is_empty() {
            return Err(Details::NoSchemaDeclared.into());
        }
        let file = File::create(path).map_err(|source| Details::CreateFile {
            path: path.to_owned(),
            source,
        })?;
        Writer::builder()
            .writer(BufWriter::new(file))
            .registry(self.registry.clone())
            .codec(self.codec)
            .build()
    }

    fn side_path(&self) -> PathBuf {
        let mut side = self.path.clone().into_os_string();
        side.push(SIDE_FILE_SUFFIX);
        side.into()
    }

    /// The banks known to this container.
    pub fn dictionary(&self) -> &SchemaRegistry {
        match &self.state {
            State::Reading(reader) => reader.registry(),
            State::Writing(writer) | State::Appending { writer, .. } => writer.registry(),
            State::Created | State::Loaded(_) | State::Closed => &self.registry,
        }
    }

    fn registry_mut(&mut self, operation: &'static str) -> HipoResult<&mut SchemaRegistry> {
        match &mut self.state {
            State::Writing(writer) | State::Appending { writer, .. } => Ok(writer.registry_mut()),
            State::Created | State::Loaded(_) if self.mode != Mode::Read => Ok(&mut self.registry),
            State::Closed => Err(Details::NotOpen.into()),
            _ => Err(Details::InvalidMode {
                operation,
                mode: self.mode,
            }
            .into()),
        }
    }

    /// Declare a bank in group 1 with the next free item number.
    pub fn new_tree<I, S>(&mut self, bank: &str, fields: I) -> HipoResult<Arc<Schema>>
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        self.registry_mut("new_tree")?.new_tree(bank, fields)
    }

    /// Declare a bank with an explicit `(group, item)` id.
    pub fn new_tree_with_id<I, S>(
        &mut self,
        bank: &str,
        group: u16,
        item: u8,
        fields: I,
    ) -> HipoResult<Arc<Schema>>
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        self.registry_mut("new_tree_with_id")?
            .new_tree_with_id(bank, group, item, fields)
    }

    /// Add whole events.
    ///
    /// Every bank holds one [`BankRows`] per event and all banks must hold the same number of
    /// events. In write mode new events are appended. In append mode the banks are added to the
    /// next source events, which fails with `EventCountExceeded` when the source runs out.
    ///
    /// Everything is validated before any event is written.
    pub fn extend<I, S>(&mut self, banks: I) -> HipoResult<()>
    where
        I: IntoIterator<Item = (S, Vec<BankRows>)>,
        S: AsRef<str>,
    {
        let mode = self.mode;
        match &mut self.state {
            State::Writing(writer) => {
                for banks in event_banks(writer.registry(), banks)? {
                    let mut event = Event::new();
                    for bank in banks {
                        event.add_bank(bank)?;
                    }
                    writer.append_event(&event)?;
                }
                Ok(())
            }
            State::Appending {
                source,
                writer,
                consumed,
            } => {
                let events = event_banks(writer.registry(), banks)?;
                let available = source.event_count().saturating_sub(*consumed);
                if events.len() > available {
                    return Err(Details::EventCountExceeded {
                        requested: events.len(),
                        available,
                    }
                    .into());
                }
                let staged = merge_source_events(source, events).and_then(|merged| {
                    for event in &merged {
                        declare_source_banks(writer, event)?;
                    }
                    Ok(merged)
                });
                let merged = match staged {
                    Ok(merged) => merged,
                    Err(e) => {
                        // put the source back on the first event not taken yet
                        if *consumed < source.event_count() {
                            source.seek_event(*consumed)?;
                        }
                        return Err(e);
                    }
                };
                *consumed += merged.len();
                for event in &merged {
                    writer.append_event(event)?;
                }
                Ok(())
            }
            State::Reading(_) => Err(Details::InvalidMode {
                operation: "extend",
                mode,
            }
            .into()),
            State::Created | State::Loaded(_) | State::Closed => Err(Details::NotOpen.into()),
        }
    }

    /// Add banks to a single event.
    ///
    /// In write mode this appends one new event. In append mode the banks are added to the
    /// current event, loaded by [`next_event`](Self::next_event), which is then written. A visited
    /// source event is only kept when `update` is called for it, with no banks if there is
    /// nothing to add.
    pub fn update<I, S>(&mut self, banks: I) -> HipoResult<()>
    where
        I: IntoIterator<Item = (S, BankRows)>,
        S: AsRef<str>,
    {
        let mode = self.mode;
        match &mut self.state {
            State::Writing(writer) => {
                let mut event = Event::new();
                for bank in single_event_banks(writer.registry(), banks)? {
                    event.add_bank(bank)?;
                }
                writer.append_event(&event)
            }
            State::Appending { writer, .. } => {
                let Some(event) = self.current.as_ref() else {
                    return Err(Details::NoCurrentEvent.into());
                };
                let banks = single_event_banks(writer.registry(), banks)?;
                let mut merged = event.clone();
                for bank in banks {
                    merged.add_bank(bank)?;
                }
                append_passthrough(writer, &merged)?;
                self.current = None;
                Ok(())
            }
            State::Reading(_) => Err(Details::InvalidMode {
                operation: "update",
                mode,
            }
            .into()),
            State::Created | State::Loaded(_) | State::Closed => Err(Details::NotOpen.into()),
        }
    }

    /// Load the next event as the current one. Returns `false` at the end of the file.
    pub fn next_event(&mut self) -> HipoResult<bool> {
        self.current = None;
        let next = match &mut self.state {
            State::Reading(reader) => reader.next(),
            State::Appending {
                source, consumed, ..
            } => {
                let next = source.next();
                if next.is_some() {
                    *consumed += 1;
                }
                next
            }
            State::Writing(_) => {
                return Err(Details::InvalidMode {
                    operation: "next_event",
                    mode: self.mode,
                }
                .into());
            }
            State::Created | State::Loaded(_) | State::Closed => {
                return Err(Details::NotOpen.into());
            }
        };
        match next {
            Some(event) => {
                self.current = Some(event?);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Make event `n` of the file the current event.
    ///
    /// Returns `false` when neither event `n` nor any later event passes the tag filter.
    pub fn goto_event(&mut self, n: usize) -> HipoResult<bool> {
        self.reader_mut("goto_event")?.seek_event(n)?;
        self.next_event()
    }

    /// Go back to the first event.
    pub fn rewind(&mut self) -> HipoResult<()> {
        self.reader_mut("rewind")?.rewind();
        self.current = None;
        Ok(())
    }

    fn reader_mut(&mut self, operation: &'static str) -> HipoResult<&mut Reader<Source>> {
        match &mut self.state {
            State::Reading(reader) => Ok(reader),
            State::Created | State::Closed => Err(Details::NotOpen.into()),
            _ => Err(Details::InvalidMode {
                operation,
                mode: self.mode,
            }
            .into()),
        }
    }

    /// The remaining events of a file opened for reading.
    pub fn events(&mut self) -> HipoResult<impl Iterator<Item = HipoResult<Event>> + '_> {
        self.current = None;
        Ok(self.reader_mut("events")?)
    }

    /// The remaining events of a file opened for reading, `step` at a time, flattened per
    /// `bank_field`. `banks` restricts the banks to keep, all of them when `None`.
    pub fn batches(
        &mut self,
        step: usize,
        banks: Option<Vec<String>>,
    ) -> HipoResult<Batches<impl Iterator<Item = HipoResult<Event>> + '_>> {
        Batches::new(self.events()?, step, banks)
    }

    /// The current event, if any.
    pub fn event(&self) -> Option<&Event> {
        self.current.as_ref()
    }

    fn current(&self) -> HipoResult<&Event> {
        self.current
            .as_ref()
            .ok_or_else(|| Details::NoCurrentEvent.into())
    }

    /// Rows of `bank` in the current event, 0 when it is absent.
    pub fn get_rows(&self, bank: &str) -> usize {
        self.current.as_ref().map_or(0, |event| event.rows(bank))
    }

    /// Number of fields of `bank`.
    pub fn get_entries(&self, bank: &str) -> HipoResult<usize> {
        Ok(self.dictionary().resolve(bank)?.entries())
    }

    pub fn get_names(&self, bank: &str) -> HipoResult<Vec<&str>> {
        Ok(self.dictionary().resolve(bank)?.names().collect())
    }

    pub fn get_types(&self, bank: &str) -> HipoResult<Vec<FieldType>> {
        Ok(self.dictionary().resolve(bank)?.types().collect())
    }

    pub fn get_names_and_types(&self, bank: &str) -> HipoResult<Vec<(&str, FieldType)>> {
        let schema = self.dictionary().resolve(bank)?;
        Ok(schema.names().zip(schema.types()).collect())
    }

    /// Whether `bank` is in the dictionary of the file.
    pub fn has_bank(&self, bank: &str) -> bool {
        self.dictionary().contains(bank)
    }

    pub fn get_banks(&self) -> Vec<&str> {
        self.dictionary().names().collect()
    }

    /// The dictionary, one schema per line.
    pub fn show(&self) -> String {
        self.dictionary().to_string()
    }

    /// The content of `bank` in the current event.
    pub fn show_bank(&self, bank: &str) -> HipoResult<String> {
        let schema = self.dictionary().resolve(bank)?;
        Ok(match self.current()?.bank(bank) {
            Some(bank) => bank.to_string(),
            None => format!("{schema} rows: 0\n"),
        })
    }

    /// Number of events of the file. In write mode, the events written so far.
    pub fn len(&self) -> usize {
        match &self.state {
            State::Reading(reader)
            | State::Loaded(reader)
            | State::Appending { source: reader, .. } => reader.event_count(),
            State::Writing(writer) => writer.event_count(),
            State::Created | State::Closed => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the buffered events and the index.
    pub fn flush(&mut self) -> HipoResult<()> {
        match &mut self.state {
            State::Writing(writer) | State::Appending { writer, .. } => writer.flush(),
            State::Reading(_) => Err(Details::InvalidMode {
                operation: "flush",
                mode: self.mode,
            }
            .into()),
            State::Created | State::Loaded(_) | State::Closed => Err(Details::NotOpen.into()),
        }
    }

    /// Flush everything, release the file and the path. Closing twice does nothing.
    pub fn close(&mut self) -> HipoResult<()> {
        self.current = None;
        match mem::replace(&mut self.state, State::Closed) {
            State::Closed => return Ok(()),
            State::Created | State::Loaded(_) | State::Reading(_) => {}
            State::Writing(writer) => finish(writer)?,
            State::Appending { source, writer, .. } => {
                finish(writer)?;
                drop(source);
                let side = self.side_path();
                fs::rename(&side, &self.path).map_err(|source| Details::RenameFile {
                    from: side.clone(),
                    to: self.path.clone(),
                    source,
                })?;
                debug!("Moved {} over {}", side.display(), self.path.display());
            }
        }
        drop(self.lock.take());
        debug!("Closed {}", self.path.display());
        Ok(())
    }

    /// Same as [`close`](Self::close).
    pub fn write(&mut self) -> HipoResult<()> {
        self.close()
    }
}

macro_rules! current_event_getters (
    ($($name:ident, $type:ty);* $(;)?) => (
        impl HipoFile {
            $(
                /// Values of `bank.field` in the current event, empty when the event does not
                /// carry the bank.
                pub fn $name(&self, bank: &str, field: &str) -> HipoResult<&[$type]> {
                    self.dictionary().resolve(bank)?;
                    self.current()?.$name(bank, field)
                }
            )*
        }
    );
);

current_event_getters!(
    get_bytes, i8;
    get_shorts, i16;
    get_ints, i32;
    get_longs, i64;
    get_floats, f32;
    get_doubles, f64;
    get_strings, String;
    get_composites, Vec<u8>;
);

impl Drop for HipoFile {
    fn drop(&mut self) {
        if let State::Appending { source, writer, .. } = mem::replace(&mut self.state, State::Closed)
        {
            drop(source);
            drop(writer);
            let side = self.side_path();
            warn!(
                "Append session on {} was not closed, discarding {}",
                self.path.display(),
                side.display()
            );
            if let Err(e) = fs::remove_file(&side) {
                warn!("Could not remove {}: {e}", side.display());
            }
        }
    }
}

pub(crate) fn open_source(path: &Path) -> HipoResult<Source> {
    let file = File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => Details::FileNotFound(path.to_owned()),
        _ => Details::OpenFile {
            path: path.to_owned(),
            source,
        },
    })?;
    Ok(BufReader::new(file))
}

fn finish(writer: Writer<Sink>) -> HipoResult<()> {
    let file = writer
        .into_inner()?
        .into_inner()
        .map_err(|e| Details::FlushWriter(e.into_error()))?;
    file.sync_all().map_err(Details::FlushWriter)?;
    Ok(())
}

/// Take one source event per entry of `events` and add the entry's banks to it.
///
/// Nothing is written, so a failure leaves the output untouched.
fn merge_source_events(
    source: &mut Reader<Source>,
    events: Vec<Vec<Bank>>,
) -> HipoResult<Vec<Event>> {
    let mut merged = Vec::with_capacity(events.len());
    for banks in events {
        let Some(event) = source.next() else {
            return Err(Details::EventCountExceeded {
                requested: 1,
                available: 0,
            }
            .into());
        };
        let mut event = event?;
        for bank in banks {
            event.add_bank(bank)?;
        }
        merged.push(event);
    }
    Ok(merged)
}

/// Declare the banks a source event carries, checking they match the banks already declared.
fn declare_source_banks(writer: &mut Writer<Sink>, event: &Event) -> HipoResult<()> {
    for bank in event.banks() {
        match writer.registry().get(bank.name()) {
            Some(declared) if declared != bank.schema() => {
                return Err(Details::ConflictingSchema(bank.name().to_owned()).into());
            }
            Some(_) => {}
            None => {
                writer.registry_mut().merge(Schema::clone(bank.schema()))?;
            }
        }
    }
    Ok(())
}

/// Append a source event, declaring the banks it carries from the source dictionary.
fn append_passthrough(writer: &mut Writer<Sink>, event: &Event) -> HipoResult<()> {
    declare_source_banks(writer, event)?;
    writer.append_event(event)
}

/// Turn `bank -> [event][field][row]` into the banks of each event.
fn event_banks<I, S>(registry: &SchemaRegistry, banks: I) -> HipoResult<Vec<Vec<Bank>>>
where
    I: IntoIterator<Item = (S, Vec<BankRows>)>,
    S: AsRef<str>,
{
    let mut events: Vec<Vec<Bank>> = Vec::new();
    let mut first: Option<(String, usize)> = None;
    for (name, batch) in banks {
        let schema = registry.require(name.as_ref())?;
        match &first {
            None => {
                events.resize_with(batch.len(), Vec::new);
                first = Some((schema.name().to_owned(), batch.len()));
            }
            Some((_, expected)) if *expected != batch.len() => {
                return Err(Details::InconsistentEventCount {
                    bank: schema.name().to_owned(),
                    expected: *expected,
                    actual: batch.len(),
                }
                .into());
            }
            Some(_) => {}
        }
        for (event, rows) in events.iter_mut().zip(batch) {
            event.push(Bank::from_rows(Arc::clone(schema), rows)?);
        }
    }
    Ok(events)
}

fn single_event_banks<I, S>(registry: &SchemaRegistry, banks: I) -> HipoResult<Vec<Bank>>
where
    I: IntoIterator<Item = (S, BankRows)>,
    S: AsRef<str>,
{
    banks
        .into_iter()
        .map(|(name, rows)| Bank::from_rows(Arc::clone(registry.require(name.as_ref())?), rows))
        .collect()
}

fn locked_paths() -> &'static Mutex<HashSet<PathBuf>> {
    static LOCKED_PATHS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    LOCKED_PATHS.get_or_init(Default::default)
}

/// Registration of a path in the process-wide table of paths being written.
#[derive(Debug)]
struct PathLock(PathBuf);

impl PathLock {
    fn acquire(path: &Path) -> HipoResult<Self> {
        let absolute = std::path::absolute(path).map_err(|source| Details::ResolvePath {
            path: path.to_owned(),
            source,
        })?;
        let mut locked = locked_paths()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !locked.insert(absolute.clone()) {
            return Err(Details::FileLocked(absolute).into());
        }
        Ok(Self(absolute))
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        locked_paths()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, types::Value};
    use hipo_test_helper::{
        TestResult,
        logger::{assert_logged, init},
    };
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn rows(x: f64) -> BankRows {
        vec![vec![Value::Double(x)]]
    }

    fn write_file(path: &Path, count: usize) -> TestResult {
        let mut file = create(path)?;
        file.new_tree("NEW::a", [("x", FieldType::Double)])?;
        file.open()?;
        file.extend([(
            "NEW::a",
            (0..count).map(|i| rows(i as f64)).collect::<Vec<_>>(),
        )])?;
        file.close()?;
        Ok(())
    }

    #[test]
    fn second_writer_on_same_path_is_locked() -> TestResult {
        let dir = TempDir::new()?;
        let path = dir.path().join("locked.hipo");
        let first = create(&path)?;
        let err = create(&path).err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::FileLocked));

        drop(first);
        let again = create(&path)?;
        drop(again);
        Ok(())
    }

    #[test]
    fn wrong_mode_and_state() -> TestResult {
        let dir = TempDir::new()?;
        let path = dir.path().join("modes.hipo");
        write_file(&path, 3)?;

        let mut reader = open(&path)?;
        let err = reader.new_tree("NEW::b", [("y", FieldType::Int)]).unwrap_err();
        assert!(matches!(
            err.details(),
            Details::InvalidMode {
                operation: "new_tree",
                mode: Mode::Read
            }
        ));
        assert_eq!(
            reader.get_doubles("NEW::a", "x").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );

        let mut writer = create(dir.path().join("other.hipo"))?;
        writer.new_tree("NEW::b", [("y", FieldType::Int)])?;
        let err = writer.update([("NEW::b", vec![vec![Value::Int(1)]])]).unwrap_err();
        assert!(matches!(err.details(), Details::NotOpen));
        writer.close()?;
        assert!(matches!(writer.open().unwrap_err().details(), Details::NotOpen));
        Ok(())
    }

    #[test]
    fn reads_current_event() -> TestResult {
        let dir = TempDir::new()?;
        let path = dir.path().join("read.hipo");
        write_file(&path, 3)?;

        let mut file = open(&path)?;
        assert_eq!(file.len(), 3);
        assert_eq!(file.get_banks(), vec!["NEW::a"]);
        assert_eq!(file.get_names_and_types("NEW::a")?, vec![("x", FieldType::Double)]);
        assert_eq!(file.get_entries("NEW::a")?, 1);
        assert_eq!(file.show(), "{NEW::a/1/1}{x/D}\n");

        assert!(file.next_event()?);
        assert_eq!(file.get_doubles("NEW::a", "x")?, &[0.0]);
        assert!(file.goto_event(2)?);
        assert_eq!(file.get_rows("NEW::a"), 1);
        assert_eq!(file.get_doubles("NEW::a", "x")?, &[2.0]);
        assert!(file.show_bank("NEW::a")?.starts_with("{NEW::a/1/1}{x/D} rows: 1\n"));
        assert_eq!(
            file.get_doubles("NEW::z", "x").unwrap_err().kind(),
            ErrorKind::UnknownBank
        );
        assert!(!file.next_event()?);
        assert!(file.event().is_none());

        file.rewind()?;
        assert_eq!(file.events()?.count(), 3);
        Ok(())
    }

    #[test]
    fn dropped_append_session_keeps_original() -> TestResult {
        init();
        let dir = TempDir::new()?;
        let path = dir.path().join("source.hipo");
        write_file(&path, 4)?;
        let before = fs::read(&path)?;

        let mut file = recreate(&path)?;
        file.new_tree("NEW::b", [("y", FieldType::Int)])?;
        file.open()?;
        assert!(file.side_path().exists());
        file.extend([("NEW::b", vec![vec![vec![Value::Int(7)]]])])?;
        drop(file);

        assert_logged("was not closed");
        assert_eq!(fs::read(&path)?, before);
        assert!(!dir.path().join("source.hipo~").exists());
        Ok(())
    }

    #[test]
    fn dropped_append_session_reports_a_leftover_side_file() -> TestResult {
        init();
        let dir = TempDir::new()?;
        let path = dir.path().join("gone.hipo");
        write_file(&path, 1)?;

        let mut file = recreate(&path)?;
        file.open()?;
        fs::remove_file(file.side_path())?;
        drop(file);
        assert_logged("Could not remove");
        Ok(())
    }

    #[test]
    fn append_continues_item_numbers() -> TestResult {
        let dir = TempDir::new()?;
        let path = dir.path().join("items.hipo");
        write_file(&path, 2)?;

        let mut file = recreate(&path)?;
        let schema = file.new_tree("NEW::b", [("y", FieldType::Int)])?;
        assert_eq!((schema.group(), schema.item()), (1, 2));
        Ok(())
    }
}
