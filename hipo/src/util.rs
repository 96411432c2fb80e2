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

use crate::{HipoResult, error::Details};
use std::sync::{
    Once,
    atomic::{AtomicUsize, Ordering},
};

/// Maximum number of bytes that can be allocated when decoding
/// HIPO records. This is a protection against ill-formed
/// data, whose length field might be interpreted as enormous.
/// See max_allocation_bytes to change this limit.
pub const DEFAULT_MAX_ALLOCATION_BYTES: usize = 512 * 1024 * 1024;
static MAX_ALLOCATION_BYTES: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_ALLOCATION_BYTES);
static MAX_ALLOCATION_BYTES_ONCE: Once = Once::new();

/// Set a new maximum number of bytes that can be allocated when decoding data.
/// Once called, the limit cannot be changed.
///
/// **NOTE** This function must be called before decoding **any** data. The
/// library leverages [`std::sync::Once`](https://doc.rust-lang.org/std/sync/struct.Once.html)
/// to set the limit either when calling this method, or when decoding for
/// the first time.
pub fn max_allocation_bytes(num_bytes: usize) -> usize {
    MAX_ALLOCATION_BYTES_ONCE.call_once(|| {
        MAX_ALLOCATION_BYTES.store(num_bytes, Ordering::Release);
    });
    MAX_ALLOCATION_BYTES.load(Ordering::Acquire)
}

pub fn safe_len(len: usize) -> HipoResult<usize> {
    let max_bytes = max_allocation_bytes(DEFAULT_MAX_ALLOCATION_BYTES);

    if len <= max_bytes {
        Ok(len)
    } else {
        Err(Details::MemoryAllocation {
            desired: len,
            maximum: max_bytes,
        }
        .into())
    }
}

/// Little-endian reader over a decompressed record payload.
///
/// Every read is bounds checked and reports [`Details::TruncatedRecord`] instead of panicking.
pub(crate) struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> HipoResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(Details::TruncatedRecord {
                needed: n,
                available: self.remaining(),
            }
            .into());
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Skip `count` items of `width` bytes each, checking for overflow first.
    pub(crate) fn skip(&mut self, count: usize, width: usize) -> HipoResult<()> {
        let n = count
            .checked_mul(width)
            .ok_or(Details::TruncatedRecord {
                needed: usize::MAX,
                available: self.remaining(),
            })?;
        self.take(n).map(|_| ())
    }

    pub(crate) fn array<const N: usize>(&mut self) -> HipoResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> HipoResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> HipoResult<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub(crate) fn u32(&mut self) -> HipoResult<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub(crate) fn u64(&mut self) -> HipoResult<u64> {
        self.array().map(u64::from_le_bytes)
    }

    /// Read a `u32` length followed by that many bytes.
    pub(crate) fn len_prefixed(&mut self) -> HipoResult<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    pub(crate) fn string(&mut self) -> HipoResult<String> {
        let bytes = self.len_prefixed()?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Details::ConvertToUtf8(e).into())
    }
}

/// Append a `u32` length prefix and the bytes themselves.
pub(crate) fn put_len_prefixed(buffer: &mut Vec<u8>, bytes: &[u8]) -> HipoResult<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| Details::RecordTooLarge(bytes.len()))?;
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(bytes);
    Ok(())
}

/// Convert a length into the `u32` used by every on-disk length field.
pub(crate) fn len_u32(len: usize) -> HipoResult<u32> {
    u32::try_from(len).map_err(|_| Details::RecordTooLarge(len).into())
}
