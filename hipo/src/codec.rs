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

//! Logic for all supported record compression codecs.
//!
//! The codec used for a record is stored in its header as a one byte id, so files written with
//! different settings stay readable by any build that has the codec enabled.

use crate::{HipoResult, error::Details};
use log::debug;
use std::sync::OnceLock;
use strum::IntoEnumIterator;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

/// Settings for the `Deflate` codec.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct DeflateSettings {
    compression_level: miniz_oxide::deflate::CompressionLevel,
}

impl DeflateSettings {
    pub fn new(compression_level: miniz_oxide::deflate::CompressionLevel) -> Self {
        DeflateSettings { compression_level }
    }

    fn compression_level(&self) -> u8 {
        self.compression_level as u8
    }
}

impl Default for DeflateSettings {
    /// Default compression level is `miniz_oxide::deflate::CompressionLevel::DefaultCompression`.
    fn default() -> Self {
        Self::new(miniz_oxide::deflate::CompressionLevel::DefaultCompression)
    }
}

/// The compression codec used to compress records.
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab_case")]
pub enum Codec {
    /// The `Null` codec simply passes through data uncompressed.
    Null,
    /// The `Lz4` codec writes the record using the LZ4 block format. The raw length is kept in
    /// the record header, not in the compressed stream.
    Lz4,
    /// The `Deflate` codec writes the record using the deflate algorithm as specified in RFC 1951.
    Deflate(DeflateSettings),
    #[cfg(feature = "snappy")]
    /// The `Snappy` codec uses Google's [Snappy](http://google.github.io/snappy/)
    /// compression library. Each compressed record is followed by the 4-byte, big-endian
    /// CRC32 checksum of the uncompressed data.
    Snappy,
    #[cfg(feature = "zstandard")]
    /// The `Zstandard` codec uses Facebook's [Zstandard](https://facebook.github.io/zstd/)
    Zstandard(zstandard::ZstandardSettings),
}

impl Default for Codec {
    fn default() -> Self {
        Codec::Lz4
    }
}

/// The codecs compiled into this build.
///
/// The table is built on first use and never changes afterwards.
pub fn registered_codecs() -> &'static [Codec] {
    static CODECS: OnceLock<Vec<Codec>> = OnceLock::new();
    CODECS.get_or_init(|| {
        let codecs: Vec<Codec> = Codec::iter().collect();
        debug!(
            "Registered codecs: {:?}",
            codecs.iter().map(|c| <&str>::from(*c)).collect::<Vec<_>>()
        );
        codecs
    })
}

impl Codec {
    /// The id stored in file and record headers.
    pub fn id(self) -> u8 {
        match self {
            Codec::Null => 0,
            Codec::Lz4 => 1,
            Codec::Deflate(_) => 2,
            #[cfg(feature = "snappy")]
            Codec::Snappy => 3,
            #[cfg(feature = "zstandard")]
            Codec::Zstandard(_) => 4,
        }
    }

    /// Look up a codec by the id found in a header.
    pub fn from_id(id: u8) -> HipoResult<Codec> {
        registered_codecs()
            .iter()
            .copied()
            .find(|codec| codec.id() == id)
            .ok_or_else(|| Details::CodecNotSupported(id).into())
    }

    /// Look up a codec by its kebab-case name, e.g. `"lz4"`.
    pub fn from_name(name: &str) -> HipoResult<Codec> {
        name.parse()
            .map_err(|_| Details::CodecNameNotSupported(name.to_owned()).into())
    }

    /// Compress a stream of bytes in-place.
    pub fn compress(self, stream: &mut Vec<u8>) -> HipoResult<()> {
        match self {
            Codec::Null => (),
            Codec::Lz4 => {
                *stream = lz4_flex::block::compress(stream);
            }
            Codec::Deflate(settings) => {
                let compressed =
                    miniz_oxide::deflate::compress_to_vec(stream, settings.compression_level());
                *stream = compressed;
            }
            #[cfg(feature = "snappy")]
            Codec::Snappy => {
                let mut encoded: Vec<u8> = vec![0; snap::raw::max_compress_len(stream.len())];
                let compressed_size = snap::raw::Encoder::new()
                    .compress(&stream[..], &mut encoded[..])
                    .map_err(Details::SnappyCompress)?;

                let mut hasher = crc32fast::Hasher::new();
                hasher.update(&stream[..]);
                let checksum_as_bytes = hasher.finalize().to_be_bytes();
                encoded.truncate(compressed_size);
                encoded.extend_from_slice(&checksum_as_bytes);

                *stream = encoded;
            }
            #[cfg(feature = "zstandard")]
            Codec::Zstandard(settings) => {
                *stream = zstd::bulk::compress(stream, settings.compression_level as i32)
                    .map_err(Details::ZstdCompress)?;
            }
        };

        Ok(())
    }

    /// Decompress a stream of bytes in-place.
    ///
    /// Fails when the stream is malformed or does not expand to exactly `expected_len` bytes.
    pub fn decompress(self, stream: &mut Vec<u8>, expected_len: usize) -> HipoResult<()> {
        crate::util::safe_len(expected_len)?;
        *stream = match self {
            Codec::Null => std::mem::take(stream),
            Codec::Lz4 => lz4_flex::block::decompress(stream, expected_len)
                .map_err(Details::Lz4Decompress)?,
            Codec::Deflate(_settings) => {
                miniz_oxide::inflate::decompress_to_vec_with_limit(stream, expected_len).map_err(
                    |e| {
                        let err = {
                            use miniz_oxide::inflate::TINFLStatus::*;
                            use std::io::{Error, ErrorKind};
                            match e.status {
                                FailedCannotMakeProgress | NeedsMoreInput => {
                                    Error::from(ErrorKind::UnexpectedEof)
                                }
                                Adler32Mismatch | Failed => Error::from(ErrorKind::InvalidData),
                                HasMoreOutput => {
                                    Error::other("stream expands past the announced length")
                                }
                                BadParam | Done => Error::other(format!(
                                    "miniz_oxide reported unexpected status {:?}",
                                    e.status
                                )),
                            }
                        };
                        Details::DeflateDecompress(err)
                    },
                )?
            }
            #[cfg(feature = "snappy")]
            Codec::Snappy => {
                if stream.len() < 4 {
                    return Err(Details::TruncatedRecord {
                        needed: 4,
                        available: stream.len(),
                    }
                    .into());
                }
                let body = &stream[..stream.len() - 4];
                let decompressed_size =
                    snap::raw::decompress_len(body).map_err(Details::GetSnappyDecompressLen)?;
                crate::util::safe_len(decompressed_size)?;
                let mut decoded = vec![0; decompressed_size];
                snap::raw::Decoder::new()
                    .decompress(body, &mut decoded[..])
                    .map_err(Details::SnappyDecompress)?;

                let mut last_four: [u8; 4] = [0; 4];
                last_four.copy_from_slice(&stream[(stream.len() - 4)..]);
                let expected: u32 = u32::from_be_bytes(last_four);

                let mut hasher = crc32fast::Hasher::new();
                hasher.update(&decoded);
                let actual = hasher.finalize();

                if expected != actual {
                    return Err(Details::SnappyCrc32 { expected, actual }.into());
                }
                decoded
            }
            #[cfg(feature = "zstandard")]
            Codec::Zstandard(_settings) => {
                zstd::bulk::decompress(stream, expected_len).map_err(Details::ZstdDecompress)?
            }
        };

        if stream.len() != expected_len {
            return Err(Details::DecompressedLength {
                expected: expected_len,
                actual: stream.len(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(feature = "zstandard")]
pub mod zstandard {
    #[derive(Clone, Copy, Eq, PartialEq, Debug)]
    pub struct ZstandardSettings {
        pub compression_level: u8,
    }

    impl ZstandardSettings {
        pub fn new(compression_level: u8) -> Self {
            Self { compression_level }
        }
    }

    impl Default for ZstandardSettings {
        fn default() -> Self {
            Self::new(0)
        }
    }
}
