//! Append-only edit buffer with a forward read cursor.

use std::collections::HashSet;
use std::sync::OnceLock;

use rayon::prelude::*;

use crate::core::types::{IVec3, Result};
use crate::math::block_key::BlockKey;
use crate::math::extent::BlockExtent;
use super::value::{BlockEdit, BlockValue};

/// Buffers at least this large are translated in parallel
const PARALLEL_TRANSLATE_THRESHOLD: usize = 16 * 1024;

/// Destination for replayed edits.
pub trait BlockSink {
    /// Write one block. Returns `false` if the sink ignored the position.
    fn set_block(&mut self, x: i32, y: i32, z: i32, id: u16, data: u8) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    key: BlockKey,
    value: BlockValue,
}

impl Entry {
    fn decode(&self) -> BlockEdit {
        let (x, y, z) = self.key.unpack();
        BlockEdit::new(x, y, z, self.value.id(), self.value.data())
    }
}

/// Batch of block edits, replayed in insertion order.
///
/// Reading is single-pass: [`read_next`](Self::read_next) decodes the entry
/// under the cursor and advances it. Consumed entries stay in memory until
/// [`reclaim`](Self::reclaim) is called, so a reader can pause and resume.
#[derive(Debug, Default)]
pub struct BlockEditBuffer {
    entries: Vec<Entry>,
    cursor: usize,
    /// Keys of stored entries, only maintained when duplicates are suppressed
    seen: Option<HashSet<BlockKey>>,
    extent: OnceLock<Option<BlockExtent>>,
}

impl BlockEditBuffer {
    /// Create an empty buffer that stores every appended edit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer that ignores edits to already stored coordinates
    pub fn with_duplicate_detection() -> Self {
        Self {
            seen: Some(HashSet::new()),
            ..Self::default()
        }
    }

    /// Whether duplicate coordinates are suppressed
    pub fn detects_duplicates(&self) -> bool {
        self.seen.is_some()
    }

    /// Append an edit.
    ///
    /// Returns `Ok(false)` when duplicate detection is on and the coordinate
    /// is already stored; the first value wins.
    pub fn append(&mut self, x: i32, y: i32, z: i32, id: u16, data: u8) -> Result<bool> {
        let key = BlockKey::pack(x, y, z)?;

        if let Some(seen) = &mut self.seen {
            if !seen.insert(key) {
                return Ok(false);
            }
        }

        self.entries.push(Entry {
            key,
            value: BlockValue::new(id, data),
        });
        self.extent.take();
        Ok(true)
    }

    /// Append a decoded edit
    pub fn append_edit(&mut self, edit: BlockEdit) -> Result<bool> {
        self.append(edit.pos.x, edit.pos.y, edit.pos.z, edit.id, edit.data)
    }

    /// Whether an unread entry remains under the cursor
    pub fn has_next(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Decode the entry under the cursor and advance.
    ///
    /// Returns `None` once every entry has been read.
    pub fn read_next(&mut self) -> Option<BlockEdit> {
        let entry = self.entries.get(self.cursor)?;
        self.cursor += 1;
        Some(entry.decode())
    }

    /// Iterator that consumes entries through the cursor
    pub fn stream(&mut self) -> EditStream<'_> {
        EditStream { buffer: self }
    }

    /// Number of stored entries, read or not
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries not yet read
    pub fn remaining(&self) -> usize {
        self.entries.len() - self.cursor
    }

    /// Current cursor offset
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Drop every entry before the cursor and reset the cursor to zero
    pub fn reclaim(&mut self) {
        if self.cursor == 0 {
            return;
        }

        let consumed = self.entries.drain(..self.cursor);
        if let Some(seen) = &mut self.seen {
            for entry in consumed {
                seen.remove(&entry.key);
            }
        } else {
            drop(consumed);
        }

        self.cursor = 0;
        self.extent.take();
    }

    /// Copy of this buffer with every coordinate shifted by `(dx, dy, dz)`.
    ///
    /// Values and order are preserved and the copy starts unread.
    /// Fails if any shifted coordinate leaves the key range.
    pub fn translate(&self, dx: i32, dy: i32, dz: i32) -> Result<BlockEditBuffer> {
        let shift = |entry: &Entry| -> Result<Entry> {
            let (x, y, z) = entry.key.unpack();
            let key = BlockKey::pack(
                x.saturating_add(dx),
                y.saturating_add(dy),
                z.saturating_add(dz),
            )?;
            Ok(Entry { key, value: entry.value })
        };

        let entries: Vec<Entry> = if self.entries.len() >= PARALLEL_TRANSLATE_THRESHOLD {
            self.entries.par_iter().map(shift).collect::<Result<_>>()?
        } else {
            self.entries.iter().map(shift).collect::<Result<_>>()?
        };

        let seen = self
            .seen
            .as_ref()
            .map(|_| entries.iter().map(|e| e.key).collect());

        Ok(BlockEditBuffer {
            entries,
            cursor: 0,
            seen,
            extent: OnceLock::new(),
        })
    }

    /// Copy of this buffer shifted by the negated vector
    pub fn subtract(&self, dx: i32, dy: i32, dz: i32) -> Result<BlockEditBuffer> {
        self.translate(
            dx.saturating_neg(),
            dy.saturating_neg(),
            dz.saturating_neg(),
        )
    }

    /// Translate by a vector offset
    pub fn translate_by(&self, offset: IVec3) -> Result<BlockEditBuffer> {
        self.translate(offset.x, offset.y, offset.z)
    }

    /// Bounding box of all stored coordinates, `None` when empty.
    ///
    /// Computed on first use and cached until the buffer changes.
    pub fn extent(&self) -> Option<BlockExtent> {
        *self.extent.get_or_init(|| {
            BlockExtent::from_points(self.entries.iter().map(|e| e.key.to_ivec3()))
        })
    }

    /// Apply up to `limit` unread edits to `sink`, returning how many were consumed
    pub fn replay_into(&mut self, sink: &mut impl BlockSink, limit: usize) -> usize {
        let mut consumed = 0;
        while consumed < limit {
            let Some(edit) = self.read_next() else {
                break;
            };
            sink.set_block(edit.pos.x, edit.pos.y, edit.pos.z, edit.id, edit.data);
            consumed += 1;
        }
        consumed
    }
}

impl Clone for BlockEditBuffer {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            cursor: self.cursor,
            seen: self.seen.clone(),
            extent: OnceLock::new(),
        }
    }
}

/// Draining iterator returned by [`BlockEditBuffer::stream`]
pub struct EditStream<'a> {
    buffer: &'a mut BlockEditBuffer,
}

impl Iterator for EditStream<'_> {
    type Item = BlockEdit;

    fn next(&mut self) -> Option<BlockEdit> {
        self.buffer.read_next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.buffer.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for EditStream<'_> {}
