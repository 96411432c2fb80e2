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

use crate::{file::Mode, schema::FieldType};
use std::{error::Error as _, fmt, path::PathBuf};
use strum_macros::IntoStaticStr;

/// Errors encountered while reading or writing HIPO files.
///
/// To inspect the details of the error use [`details`](Self::details) or
/// [`into_details`](Self::into_details) to get a [`Details`] which contains more precise error
/// information. Use [`kind`](Self::kind) for the coarse category.
#[derive(thiserror::Error, Debug)]
#[repr(transparent)]
#[error(transparent)]
pub struct Error {
    details: Box<Details>,
}

impl Error {
    pub fn new(details: Details) -> Self {
        Self {
            details: Box::new(details),
        }
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn into_details(self) -> Details {
        *self.details
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        self.details.kind()
    }
}

impl From<Details> for Error {
    fn from(details: Details) -> Self {
        Self::new(details)
    }
}

/// Coarse classification of every [`Details`] variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// The path does not exist.
    FileNotFound,
    /// The file does not start with the HIPO magic bytes or has an unknown version.
    NotAHipoFile,
    /// A bank was written without declaring its schema first.
    SchemaNotDeclared,
    /// A bank name or `(group, item)` pair is declared twice.
    DuplicateSchema,
    /// A bank name is not known to the dictionary.
    UnknownBank,
    /// Columns of one bank instance, or banks of one batch, disagree in length.
    InconsistentRowCount,
    /// A value does not fit into the declared field type.
    ValueOutOfRange,
    /// A record could not be decoded.
    CorruptRecord,
    /// Append mode tried to write past the events of the source file.
    EventCountExceeded,
    /// The underlying storage failed.
    IoFailure,
    /// Another container is writing the same path.
    FileLocked,
    /// The call was not valid for the arguments or the state of the container.
    InvalidArgument,
}

#[derive(thiserror::Error)]
pub enum Details {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to open file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to resolve path {path}: {source}")]
    ResolvePath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    RenameFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file header: {0}")]
    ReadHeader(#[source] std::io::Error),

    #[error("wrong magic in file header")]
    HeaderMagic,

    #[error("Unsupported HIPO format version {0}")]
    UnsupportedVersion(u16),

    #[error("Failed to seek: {0}")]
    Seek(#[source] std::io::Error),

    #[error("Failed to read index: {0}")]
    ReadIndex(#[source] std::io::Error),

    #[error("wrong magic in file footer")]
    FooterMagic,

    #[error("Index points outside of the file: offset {offset}, file length {length}")]
    IndexOutOfBounds { offset: u64, length: u64 },

    #[error("Failed to read record header: {0}")]
    ReadRecordHeader(#[source] std::io::Error),

    #[error("Failed to read record payload: {0}")]
    ReadRecord(#[source] std::io::Error),

    #[error("Failed to read record marker: {0}")]
    ReadRecordMarker(#[source] std::io::Error),

    #[error("record marker does not match header marker")]
    RecordMarker,

    #[error("Record header at offset {offset} does not match the index")]
    RecordHeaderMismatch { offset: u64 },

    #[error("Record needs {needed} more bytes but only {available} are left")]
    TruncatedRecord { needed: usize, available: usize },

    #[error("{0} bytes left over after the last event of the record")]
    TrailingRecordBytes(usize),

    #[error("Invalid utf-8 string in record")]
    ConvertToUtf8(#[source] std::string::FromUtf8Error),

    #[error("Bank reference {group}/{item} is not in the dictionary")]
    UnresolvedBank { group: u16, item: u8 },

    #[error("Record dictionary redefines bank '{0}' with a different layout")]
    ConflictingSchema(String),

    #[error("Record dictionary is unreadable: {0}")]
    CorruptDictionary(String),

    #[error("Unable to allocate {desired} bytes (maximum allowed: {maximum})")]
    MemoryAllocation { desired: usize, maximum: usize },

    #[error("Decompressed {actual} bytes but the record header announced {expected}")]
    DecompressedLength { expected: usize, actual: usize },

    #[error("Failed to decompress with lz4: {0}")]
    Lz4Decompress(#[source] lz4_flex::block::DecompressError),

    #[error("Failed to decompress with deflate: {0}")]
    DeflateDecompress(#[source] std::io::Error),

    #[cfg(feature = "snappy")]
    #[error("Bad Snappy CRC32; expected {expected:x} but got {actual:x}")]
    SnappyCrc32 { expected: u32, actual: u32 },

    #[cfg(feature = "snappy")]
    #[error("Failed to compress with snappy: {0}")]
    SnappyCompress(#[source] snap::Error),

    #[cfg(feature = "snappy")]
    #[error("Failed to get snappy decompression length: {0}")]
    GetSnappyDecompressLen(#[source] snap::Error),

    #[cfg(feature = "snappy")]
    #[error("Failed to decompress with snappy: {0}")]
    SnappyDecompress(#[source] snap::Error),

    #[cfg(feature = "zstandard")]
    #[error("Failed to compress with zstd: {0}")]
    ZstdCompress(#[source] std::io::Error),

    #[cfg(feature = "zstandard")]
    #[error("Failed to decompress with zstd: {0}")]
    ZstdDecompress(#[source] std::io::Error),

    #[error("Codec id {0} is not supported/enabled")]
    CodecNotSupported(u8),

    #[error("Codec '{0}' is not supported/enabled")]
    CodecNameNotSupported(String),

    #[error("Failed to write file header: {0}")]
    WriteHeader(#[source] std::io::Error),

    #[error("Failed to write record: {0}")]
    WriteRecord(#[source] std::io::Error),

    #[error("Failed to write index: {0}")]
    WriteIndex(#[source] std::io::Error),

    #[error("Failed to flush inner writer during flush: {0}")]
    FlushWriter(#[source] std::io::Error),

    #[error("Record of {0} bytes does not fit the 32 bit length fields")]
    RecordTooLarge(usize),

    #[error("Failed to parse schema '{input}': {reason}")]
    ParseSchema { input: String, reason: String },

    #[error("Failed to parse JSON schema description: {0}")]
    ParseSchemaJson(#[source] serde_json::Error),

    #[error("Unknown field type '{0}'")]
    UnknownFieldType(String),

    #[error("Invalid bank name {0}. It must match the regex '{1}'")]
    InvalidBankName(String, &'static str),

    #[error("Invalid field name {0}. It must match the regex '{1}'")]
    InvalidFieldName(String, &'static str),

    #[error("Bank '{0}' must declare at least one field")]
    EmptySchema(String),

    #[error("Field '{field}' is declared twice in bank '{bank}'")]
    DuplicateField { bank: String, field: String },

    #[error("Bank '{0}' is already declared")]
    DuplicateSchema(String),

    #[error("Bank '{name}' uses id {group}/{item} which already belongs to '{existing}'")]
    DuplicateSchemaId {
        name: String,
        group: u16,
        item: u8,
        existing: String,
    },

    #[error("No free item number left in group {0}")]
    ItemOverflow(u16),

    #[error("Bank '{0}' is not in the dictionary")]
    UnknownBank(String),

    #[error("Bank '{bank}' has no field '{field}'")]
    UnknownField { bank: String, field: String },

    #[error("Bank '{0}' has not been declared with new_tree/declare")]
    SchemaNotDeclared(String),

    #[error("No bank has been declared, call new_tree/declare before writing")]
    NoSchemaDeclared,

    #[error("Bank '{bank}' expects {expected} fields but {actual} were given")]
    FieldCountMismatch {
        bank: String,
        expected: usize,
        actual: usize,
    },

    #[error("Field '{field}' of bank '{bank}' has {actual} rows but the bank has {expected}")]
    InconsistentRowCount {
        bank: String,
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Bank '{bank}' holds {actual} events but the batch has {expected}")]
    InconsistentEventCount {
        bank: String,
        expected: usize,
        actual: usize,
    },

    #[error("Value {value} does not fit field '{field}' of type {field_type:?}")]
    ValueOutOfRange {
        field: String,
        value: String,
        field_type: FieldType,
    },

    #[error("Field '{field}' of bank '{bank}' is {actual:?}, not {expected:?}")]
    FieldTypeMismatch {
        bank: String,
        field: String,
        expected: FieldType,
        actual: FieldType,
    },

    #[error("Event already carries bank '{0}'")]
    DuplicateBankInEvent(String),

    #[error("Tried to append to {requested} events but only {available} are left in the file")]
    EventCountExceeded { requested: usize, available: usize },

    #[error("There is no current event, call next_event first")]
    NoCurrentEvent,

    #[error("Event {event} is out of range, the file has {total} events")]
    EventOutOfRange { event: usize, total: usize },

    #[error("Operation '{operation}' is not allowed in {mode:?} mode")]
    InvalidMode { operation: &'static str, mode: Mode },

    #[error("The file has not been opened or is already closed")]
    NotOpen,

    #[error("{0} is already opened for writing")]
    FileLocked(PathBuf),

    #[error("Batch step must be at least 1")]
    InvalidStep,

    #[error("Record size and events per record must be at least 1")]
    InvalidRecordLimit,

    #[error("Invalid file pattern '{pattern}': {source}")]
    GlobPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Failed to expand file pattern: {0}")]
    GlobEntry(#[source] glob::GlobError),
}

impl Details {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Details::FileNotFound(_) => ErrorKind::FileNotFound,
            Details::HeaderMagic | Details::UnsupportedVersion(_) => ErrorKind::NotAHipoFile,
            Details::OpenFile { .. }
            | Details::CreateFile { .. }
            | Details::ResolvePath { .. }
            | Details::RenameFile { .. }
            | Details::ReadHeader(_)
            | Details::Seek(_)
            | Details::ReadIndex(_)
            | Details::ReadRecordHeader(_)
            | Details::ReadRecord(_)
            | Details::ReadRecordMarker(_)
            | Details::WriteHeader(_)
            | Details::WriteRecord(_)
            | Details::WriteIndex(_)
            | Details::FlushWriter(_)
            | Details::GlobEntry(_) => ErrorKind::IoFailure,
            Details::FooterMagic
            | Details::IndexOutOfBounds { .. }
            | Details::RecordMarker
            | Details::RecordHeaderMismatch { .. }
            | Details::TruncatedRecord { .. }
            | Details::TrailingRecordBytes(_)
            | Details::ConvertToUtf8(_)
            | Details::UnresolvedBank { .. }
            | Details::ConflictingSchema(_)
            | Details::CorruptDictionary(_)
            | Details::MemoryAllocation { .. }
            | Details::DecompressedLength { .. }
            | Details::Lz4Decompress(_)
            | Details::DeflateDecompress(_)
            | Details::CodecNotSupported(_) => ErrorKind::CorruptRecord,
            #[cfg(feature = "snappy")]
            Details::SnappyCrc32 { .. }
            | Details::GetSnappyDecompressLen(_)
            | Details::SnappyDecompress(_) => ErrorKind::CorruptRecord,
            #[cfg(feature = "snappy")]
            Details::SnappyCompress(_) => ErrorKind::IoFailure,
            #[cfg(feature = "zstandard")]
            Details::ZstdDecompress(_) => ErrorKind::CorruptRecord,
            #[cfg(feature = "zstandard")]
            Details::ZstdCompress(_) => ErrorKind::IoFailure,
            Details::SchemaNotDeclared(_) | Details::NoSchemaDeclared => {
                ErrorKind::SchemaNotDeclared
            }
            Details::DuplicateSchema(_)
            | Details::DuplicateSchemaId { .. }
            | Details::DuplicateBankInEvent(_) => ErrorKind::DuplicateSchema,
            Details::UnknownBank(_) => ErrorKind::UnknownBank,
            Details::InconsistentRowCount { .. } | Details::InconsistentEventCount { .. } => {
                ErrorKind::InconsistentRowCount
            }
            Details::ValueOutOfRange { .. } => ErrorKind::ValueOutOfRange,
            Details::EventCountExceeded { .. } => ErrorKind::EventCountExceeded,
            Details::FileLocked(_) => ErrorKind::FileLocked,
            Details::CodecNameNotSupported(_)
            | Details::RecordTooLarge(_)
            | Details::ParseSchema { .. }
            | Details::ParseSchemaJson(_)
            | Details::UnknownFieldType(_)
            | Details::InvalidBankName(..)
            | Details::InvalidFieldName(..)
            | Details::EmptySchema(_)
            | Details::DuplicateField { .. }
            | Details::ItemOverflow(_)
            | Details::UnknownField { .. }
            | Details::FieldCountMismatch { .. }
            | Details::FieldTypeMismatch { .. }
            | Details::NoCurrentEvent
            | Details::EventOutOfRange { .. }
            | Details::InvalidMode { .. }
            | Details::NotOpen
            | Details::InvalidStep
            | Details::InvalidRecordLimit
            | Details::GlobPattern { .. } => ErrorKind::InvalidArgument,
        }
    }
}

impl fmt::Debug for Details {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut msg = self.to_string();
        if let Some(e) = self.source() {
            msg.extend([": ", &e.to_string()]);
        }
        write!(f, "{msg}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io;

    #[test]
    fn open_errors_are_classified() {
        let missing: Error = Details::FileNotFound(PathBuf::from("missing.hipo")).into();
        assert_eq!(missing.kind(), ErrorKind::FileNotFound);

        let magic: Error = Details::HeaderMagic.into();
        assert_eq!(magic.kind(), ErrorKind::NotAHipoFile);

        let io: Error = Details::WriteRecord(io::Error::other("disk full")).into();
        assert_eq!(io.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn debug_includes_source() {
        let err: Error = Details::ReadRecord(io::Error::other("boom")).into();
        assert_eq!(
            format!("{:?}", err.details()),
            "Failed to read record payload: boom: boom"
        );
    }

    #[test]
    fn kind_as_str() {
        assert_eq!(<&str>::from(ErrorKind::EventCountExceeded), "event_count_exceeded");
        assert_eq!(<&str>::from(ErrorKind::CorruptRecord), "corrupt_record");
    }
}
