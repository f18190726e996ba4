//! Sum-up batching for optimized communications
//!
//! ADS allows many independent variable accesses to be folded into one wire
//! transaction using the composite `SUMUP_*` index groups. This module holds
//! the pure batching logic: chunk planning, sub-request encoding and
//! response splitting. Driving the actual transactions is the client's job.
//!
//! The write payload of a sum-up transaction is the concatenation of every
//! sub-item's metadata block followed by every sub-item's data block; the
//! two regions are never interleaved, because the remote returns all
//! per-item result codes contiguously before any data.

use std::ops::Range;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::{
    IDXGRP_SUMUP_READ, IDXGRP_SUMUP_READWRITE, IDXGRP_SUMUP_WRITE, SUMUP_READWRITE_ITEM_LEN,
    SUMUP_READ_ITEM_LEN, SUMUP_RESULT_EX_LEN, SUMUP_RESULT_LEN, SUMUP_WRITE_ITEM_LEN,
};
use crate::error::{AdsError, AdsResult, AdsReturnCode};
use crate::protocol::AdsRequest;

// ============================================================================
// Chunk Planning
// ============================================================================

/// Partition of `N` items into at most `max_per_chunk`-sized wire
/// transactions.
///
/// Two-pass sizing: `chunks = ceil(N / max)` transactions of
/// `ceil(N / chunks)` items each, with the last transaction taking whatever
/// remains. This keeps chunk sizes balanced instead of producing a
/// near-empty trailing chunk the way naive `N / max` truncation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    sizes: Vec<usize>,
}

impl ChunkPlan {
    /// Plan `n_items` into chunks of at most `max_per_chunk` items.
    /// `max_per_chunk` is clamped to at least 1.
    pub fn new(n_items: usize, max_per_chunk: usize) -> Self {
        let max = max_per_chunk.max(1);
        if n_items == 0 {
            return Self { sizes: Vec::new() };
        }
        let chunks = n_items.div_ceil(max);
        let per_chunk = n_items.div_ceil(chunks);
        let mut sizes = vec![per_chunk; chunks - 1];
        sizes.push(n_items - per_chunk * (chunks - 1));
        Self { sizes }
    }

    /// Number of wire transactions
    pub fn chunk_count(&self) -> usize {
        self.sizes.len()
    }

    /// Total item count across all chunks
    pub fn total_items(&self) -> usize {
        self.sizes.iter().sum()
    }

    /// Item index ranges, one per chunk, in order
    pub fn ranges(&self) -> Vec<Range<usize>> {
        let mut ranges = Vec::with_capacity(self.sizes.len());
        let mut start = 0;
        for size in &self.sizes {
            ranges.push(start..start + size);
            start += size;
        }
        ranges
    }
}

// ============================================================================
// Item Requests
// ============================================================================

/// One independent read inside a sum-up read transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadItem {
    pub index_group: u32,
    pub index_offset: u32,
    pub length: u32,
}

impl ReadItem {
    fn encode_meta(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.index_group);
        buf.put_u32_le(self.index_offset);
        buf.put_u32_le(self.length);
    }
}

/// One independent write inside a sum-up write transaction
#[derive(Debug, Clone, PartialEq)]
pub struct WriteItem {
    pub index_group: u32,
    pub index_offset: u32,
    pub data: Bytes,
}

impl WriteItem {
    fn encode_meta(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.index_group);
        buf.put_u32_le(self.index_offset);
        buf.put_u32_le(self.data.len() as u32);
    }
}

/// One independent write+read inside a sum-up read-write transaction
#[derive(Debug, Clone, PartialEq)]
pub struct ReadWriteItem {
    pub index_group: u32,
    pub index_offset: u32,
    pub read_length: u32,
    pub write_data: Bytes,
}

impl ReadWriteItem {
    fn encode_meta(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.index_group);
        buf.put_u32_le(self.index_offset);
        buf.put_u32_le(self.read_length);
        buf.put_u32_le(self.write_data.len() as u32);
    }
}

/// Per-item outcome of a sum-up transaction, in the caller's item order
#[derive(Debug, Clone, PartialEq)]
pub struct ItemResult {
    pub status: AdsReturnCode,
    pub data: Option<Bytes>,
}

impl ItemResult {
    pub fn ok(data: Bytes) -> Self {
        Self {
            status: AdsReturnCode::NoError,
            data: Some(data),
        }
    }

    pub fn failed(status: AdsReturnCode) -> Self {
        Self { status, data: None }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

// ============================================================================
// Aggregators
// ============================================================================

/// Splits an unbounded read list into bounded sum-up read transactions.
///
/// The chunk plan is computed on first use and cached; replacing the item
/// list invalidates it.
#[derive(Debug, Clone)]
pub struct SumupReadBatch {
    items: Vec<ReadItem>,
    max_items_per_chunk: usize,
    plan: Option<ChunkPlan>,
}

impl SumupReadBatch {
    pub fn new(max_items_per_chunk: usize) -> Self {
        Self {
            items: Vec::new(),
            max_items_per_chunk,
            plan: None,
        }
    }

    pub fn set_items(&mut self, items: Vec<ReadItem>) {
        self.items = items;
        self.plan = None;
    }

    pub fn items(&self) -> &[ReadItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The cached chunk plan, computed on first use
    pub fn plan(&mut self) -> &ChunkPlan {
        if self.plan.is_none() {
            self.plan = Some(ChunkPlan::new(self.items.len(), self.max_items_per_chunk));
        }
        self.plan.as_ref().expect("plan just computed")
    }

    /// Build the wire request for one chunk. The outer read/write lengths
    /// are derived from the items on every call, never stored.
    pub fn chunk_request(&self, range: Range<usize>) -> AdsRequest {
        let items = &self.items[range];
        let mut write_data = BytesMut::with_capacity(items.len() * SUMUP_READ_ITEM_LEN);
        for item in items {
            item.encode_meta(&mut write_data);
        }
        let read_length: usize = items.len() * SUMUP_RESULT_EX_LEN
            + items.iter().map(|i| i.length as usize).sum::<usize>();
        AdsRequest::ReadWrite {
            index_group: IDXGRP_SUMUP_READ,
            index_offset: items.len() as u32,
            read_length: read_length as u32,
            write_data: write_data.freeze(),
        }
    }

    /// Split one chunk response into per-item results.
    ///
    /// Layout: one (result code, data length) pair per sub-item, then the
    /// data blocks in the same order. A structural mismatch between the
    /// expected and received data length of a *successful* item fails the
    /// whole chunk; the caller marks every sub-item of the chunk failed.
    pub fn parse_chunk_response(
        &self,
        range: Range<usize>,
        payload: &[u8],
    ) -> AdsResult<Vec<ItemResult>> {
        let items = &self.items[range];
        let mut buf = payload;
        if buf.remaining() < items.len() * SUMUP_RESULT_EX_LEN {
            return Err(AdsError::protocol("sum-up read result block truncated"));
        }

        let mut headers = Vec::with_capacity(items.len());
        let mut failures = 0usize;
        for item in items {
            let status = AdsReturnCode::from_wire(buf.get_u32_le());
            let length = buf.get_u32_le();
            if status.is_ok() {
                if length != item.length {
                    return Err(AdsError::protocol(format!(
                        "sum-up read length mismatch: expected {}, received {length}",
                        item.length
                    )));
                }
            } else {
                failures += 1;
            }
            headers.push((status, length as usize));
        }

        let mut results = Vec::with_capacity(items.len());
        for (status, length) in headers {
            if buf.remaining() < length {
                return Err(AdsError::protocol("sum-up read data block truncated"));
            }
            let data = Bytes::copy_from_slice(&buf[..length]);
            buf.advance(length);
            if status.is_ok() {
                results.push(ItemResult::ok(data));
            } else {
                results.push(ItemResult::failed(status));
            }
        }

        if buf.has_remaining() {
            return Err(AdsError::protocol(format!(
                "sum-up read response has {} unexpected trailing bytes",
                buf.remaining()
            )));
        }
        if failures > 0 {
            tracing::debug!("sum-up read chunk: {failures}/{} items failed", items.len());
        }
        Ok(results)
    }
}

/// Splits an unbounded write list into bounded sum-up write transactions
#[derive(Debug, Clone)]
pub struct SumupWriteBatch {
    items: Vec<WriteItem>,
    max_items_per_chunk: usize,
    plan: Option<ChunkPlan>,
}

impl SumupWriteBatch {
    pub fn new(max_items_per_chunk: usize) -> Self {
        Self {
            items: Vec::new(),
            max_items_per_chunk,
            plan: None,
        }
    }

    pub fn set_items(&mut self, items: Vec<WriteItem>) {
        self.items = items;
        self.plan = None;
    }

    pub fn items(&self) -> &[WriteItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn plan(&mut self) -> &ChunkPlan {
        if self.plan.is_none() {
            self.plan = Some(ChunkPlan::new(self.items.len(), self.max_items_per_chunk));
        }
        self.plan.as_ref().expect("plan just computed")
    }

    /// Build the wire request for one chunk: all metadata blocks, then all
    /// data blocks. The response carries one result code per sub-item.
    pub fn chunk_request(&self, range: Range<usize>) -> AdsRequest {
        let items = &self.items[range];
        let meta_len = items.len() * SUMUP_WRITE_ITEM_LEN;
        let data_len: usize = items.iter().map(|i| i.data.len()).sum();
        let mut write_data = BytesMut::with_capacity(meta_len + data_len);
        for item in items {
            item.encode_meta(&mut write_data);
        }
        for item in items {
            write_data.put_slice(&item.data);
        }
        AdsRequest::ReadWrite {
            index_group: IDXGRP_SUMUP_WRITE,
            index_offset: items.len() as u32,
            read_length: (items.len() * SUMUP_RESULT_LEN) as u32,
            write_data: write_data.freeze(),
        }
    }

    /// Split one chunk response (one result code per sub-item)
    pub fn parse_chunk_response(
        &self,
        range: Range<usize>,
        payload: &[u8],
    ) -> AdsResult<Vec<ItemResult>> {
        let items = &self.items[range];
        let mut buf = payload;
        if buf.remaining() < items.len() * SUMUP_RESULT_LEN {
            return Err(AdsError::protocol("sum-up write result block truncated"));
        }
        let mut results = Vec::with_capacity(items.len());
        for _ in items {
            let status = AdsReturnCode::from_wire(buf.get_u32_le());
            results.push(ItemResult {
                status,
                data: None,
            });
        }
        if buf.has_remaining() {
            return Err(AdsError::protocol(format!(
                "sum-up write response has {} unexpected trailing bytes",
                buf.remaining()
            )));
        }
        Ok(results)
    }
}

/// Splits an unbounded write+read list into bounded sum-up read-write
/// transactions. Used for bulk symbol handle resolution, where the write
/// payload is a symbol name and the read payload its 4-byte handle.
#[derive(Debug, Clone)]
pub struct SumupReadWriteBatch {
    items: Vec<ReadWriteItem>,
    max_items_per_chunk: usize,
    plan: Option<ChunkPlan>,
}

impl SumupReadWriteBatch {
    pub fn new(max_items_per_chunk: usize) -> Self {
        Self {
            items: Vec::new(),
            max_items_per_chunk,
            plan: None,
        }
    }

    pub fn set_items(&mut self, items: Vec<ReadWriteItem>) {
        self.items = items;
        self.plan = None;
    }

    pub fn items(&self) -> &[ReadWriteItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn plan(&mut self) -> &ChunkPlan {
        if self.plan.is_none() {
            self.plan = Some(ChunkPlan::new(self.items.len(), self.max_items_per_chunk));
        }
        self.plan.as_ref().expect("plan just computed")
    }

    pub fn chunk_request(&self, range: Range<usize>) -> AdsRequest {
        let items = &self.items[range];
        let meta_len = items.len() * SUMUP_READWRITE_ITEM_LEN;
        let data_len: usize = items.iter().map(|i| i.write_data.len()).sum();
        let mut write_data = BytesMut::with_capacity(meta_len + data_len);
        for item in items {
            item.encode_meta(&mut write_data);
        }
        for item in items {
            write_data.put_slice(&item.write_data);
        }
        let read_length: usize = items.len() * SUMUP_RESULT_EX_LEN
            + items.iter().map(|i| i.read_length as usize).sum::<usize>();
        AdsRequest::ReadWrite {
            index_group: IDXGRP_SUMUP_READWRITE,
            index_offset: items.len() as u32,
            read_length: read_length as u32,
            write_data: write_data.freeze(),
        }
    }

    /// Split one chunk response. Same layout and whole-chunk failure
    /// semantics as the sum-up read, except that a successful item may
    /// legitimately return fewer bytes than `read_length` (the remote
    /// reports the actual size); more than requested is structural.
    pub fn parse_chunk_response(
        &self,
        range: Range<usize>,
        payload: &[u8],
    ) -> AdsResult<Vec<ItemResult>> {
        let items = &self.items[range];
        let mut buf = payload;
        if buf.remaining() < items.len() * SUMUP_RESULT_EX_LEN {
            return Err(AdsError::protocol("sum-up read-write result block truncated"));
        }

        let mut headers = Vec::with_capacity(items.len());
        for item in items {
            let status = AdsReturnCode::from_wire(buf.get_u32_le());
            let length = buf.get_u32_le();
            if status.is_ok() && length > item.read_length {
                return Err(AdsError::protocol(format!(
                    "sum-up read-write length mismatch: requested {}, received {length}",
                    item.read_length
                )));
            }
            headers.push((status, length as usize));
        }

        let mut results = Vec::with_capacity(items.len());
        for (status, length) in headers {
            if buf.remaining() < length {
                return Err(AdsError::protocol("sum-up read-write data block truncated"));
            }
            let data = Bytes::copy_from_slice(&buf[..length]);
            buf.advance(length);
            if status.is_ok() {
                results.push(ItemResult::ok(data));
            } else {
                results.push(ItemResult::failed(status));
            }
        }

        if buf.has_remaining() {
            return Err(AdsError::protocol(format!(
                "sum-up read-write response has {} unexpected trailing bytes",
                buf.remaining()
            )));
        }
        Ok(results)
    }
}
