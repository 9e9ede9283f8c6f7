//! Vector storage: a contiguous per-index arena plus slot bookkeeping.
//!
//! Vectors live in one contiguous arena in the stored representation
//! (f32 or quantized i8), `D` elements per slot. A parallel slot table
//! maps internal slot ids to external keys and tombstone flags, and a
//! hash map answers key → slot lookups in expected O(1).
//!
//! Slots are append-only: removal tombstones a slot without reclaiming
//! it, and the slot is only dropped by save-time compaction. Capacity
//! grows by doubling and never shrinks.

use std::collections::HashMap;

use crate::error::{IndexError, Result};
use crate::quantization;

/// Stored element representation, chosen at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// IEEE-754 single precision, four bytes per element.
    F32,
    /// Linearly quantized signed bytes, one byte per element.
    I8,
}

impl ScalarKind {
    /// Parse a quantization name as accepted by the factory.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "f32" => Some(ScalarKind::F32),
            "i8" => Some(ScalarKind::I8),
            _ => None,
        }
    }

    /// Lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::F32 => "f32",
            ScalarKind::I8 => "i8",
        }
    }

    /// Numeric code used in the on-disk header.
    pub fn code(&self) -> u16 {
        match self {
            ScalarKind::F32 => 0,
            ScalarKind::I8 => 1,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(ScalarKind::F32),
            1 => Some(ScalarKind::I8),
            _ => None,
        }
    }

    /// Bytes per element in the stored representation.
    pub fn element_size(&self) -> usize {
        match self {
            ScalarKind::F32 => 4,
            ScalarKind::I8 => 1,
        }
    }
}

/// Zero-copy view of one stored vector.
#[derive(Debug, Clone, Copy)]
pub enum StoredRef<'a> {
    /// Raw f32 slice of length `D`.
    F32(&'a [f32]),
    /// Quantized slice of length `D` with the per-index scale.
    I8 { data: &'a [i8], scale: f32 },
}

#[derive(Debug)]
enum Arena {
    F32(Vec<f32>),
    I8(Vec<i8>),
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    key: i64,
    deleted: bool,
}

/// Contiguous vector arena with slot table and key map.
#[derive(Debug)]
pub struct VectorStore {
    dim: usize,
    arena: Arena,
    slots: Vec<Slot>,
    key_to_slot: HashMap<i64, u32>,
    capacity: usize,
    live: usize,
    /// i8 quantization scale; 0.0 until fitted from the first insert.
    scale: f32,
}

impl VectorStore {
    /// Create an empty store for `dim`-element vectors in the given
    /// representation. No memory is reserved until [`reserve`](Self::reserve).
    pub fn new(dim: usize, kind: ScalarKind) -> Self {
        let arena = match kind {
            ScalarKind::F32 => Arena::F32(Vec::new()),
            ScalarKind::I8 => Arena::I8(Vec::new()),
        };
        Self {
            dim,
            arena,
            slots: Vec::new(),
            key_to_slot: HashMap::new(),
            capacity: 0,
            live: 0,
            scale: 0.0,
        }
    }

    /// Number of live (non-tombstoned) vectors.
    pub fn len(&self) -> usize {
        self.live
    }

    /// `true` when no live vectors are stored.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of occupied slots, tombstones included.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Reserved slot capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Vector dimensionality.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Stored representation.
    pub fn scalar_kind(&self) -> ScalarKind {
        match self.arena {
            Arena::F32(_) => ScalarKind::F32,
            Arena::I8(_) => ScalarKind::I8,
        }
    }

    /// Quantization scale (0.0 for an f32 store, or before the first
    /// insert fits it).
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub(crate) fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    /// Grow arena and slot table to hold at least `n` slots. Never
    /// shrinks. Fails with [`IndexError::Allocation`] when the host
    /// denies the memory.
    pub fn reserve(&mut self, n: usize) -> Result<()> {
        if n <= self.capacity {
            return Ok(());
        }
        let elems = n * self.dim;
        match &mut self.arena {
            Arena::F32(v) => {
                let additional = elems.saturating_sub(v.len());
                v.try_reserve(additional)
                    .map_err(|_| IndexError::Allocation(additional * 4))?;
            }
            Arena::I8(v) => {
                let additional = elems.saturating_sub(v.len());
                v.try_reserve(additional)
                    .map_err(|_| IndexError::Allocation(additional))?;
            }
        }
        let additional_slots = n.saturating_sub(self.slots.len());
        self.slots
            .try_reserve(additional_slots)
            .map_err(|_| IndexError::Allocation(additional_slots * std::mem::size_of::<Slot>()))?;
        self.capacity = n;
        Ok(())
    }

    fn grow_for_one(&mut self) -> Result<()> {
        if self.slots.len() < self.capacity {
            return Ok(());
        }
        let target = (self.capacity * 2).max(crate::config::INITIAL_CAPACITY);
        self.reserve(target)
    }

    /// `true` when `key` maps to a live slot.
    pub fn contains(&self, key: i64) -> bool {
        self.key_to_slot.contains_key(&key)
    }

    /// Live slot for `key`, if any.
    pub fn slot_of(&self, key: i64) -> Option<u32> {
        self.key_to_slot.get(&key).copied()
    }

    /// External key of a slot (tombstoned slots keep their key until
    /// compaction).
    pub fn key_of(&self, slot: u32) -> i64 {
        self.slots[slot as usize].key
    }

    /// `true` when the slot has been tombstoned.
    pub fn is_deleted(&self, slot: u32) -> bool {
        self.slots[slot as usize].deleted
    }

    /// Write a vector into a fresh slot. Fails with
    /// [`IndexError::Duplicate`] when `key` already has a live slot.
    pub fn put(&mut self, key: i64, vector: &[f32]) -> Result<u32> {
        debug_assert_eq!(vector.len(), self.dim);
        if self.key_to_slot.contains_key(&key) {
            return Err(IndexError::Duplicate(key));
        }
        self.grow_for_one()?;

        match &mut self.arena {
            Arena::F32(v) => v.extend_from_slice(vector),
            Arena::I8(v) => {
                if self.scale == 0.0 {
                    self.scale = quantization::fit_scale(vector);
                }
                let start = v.len();
                v.resize(start + self.dim, 0);
                quantization::quantize_into(vector, self.scale, &mut v[start..]);
            }
        }

        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            key,
            deleted: false,
        });
        self.key_to_slot.insert(key, slot);
        self.live += 1;
        Ok(slot)
    }

    /// Append an already-quantized vector (on-disk loading path).
    pub(crate) fn put_i8(&mut self, key: i64, data: &[i8]) -> Result<u32> {
        debug_assert_eq!(data.len(), self.dim);
        if self.key_to_slot.contains_key(&key) {
            return Err(IndexError::Duplicate(key));
        }
        self.grow_for_one()?;
        match &mut self.arena {
            Arena::I8(v) => v.extend_from_slice(data),
            Arena::F32(_) => {
                return Err(IndexError::Internal(
                    "quantized write into an f32 arena".into(),
                ))
            }
        }
        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            key,
            deleted: false,
        });
        self.key_to_slot.insert(key, slot);
        self.live += 1;
        Ok(slot)
    }

    /// Read-only view of a slot in the stored representation.
    pub fn read(&self, slot: u32) -> StoredRef<'_> {
        let start = slot as usize * self.dim;
        match &self.arena {
            Arena::F32(v) => StoredRef::F32(&v[start..start + self.dim]),
            Arena::I8(v) => StoredRef::I8 {
                data: &v[start..start + self.dim],
                scale: self.scale,
            },
        }
    }

    /// Copy a slot into `out` as f32, dequantizing when stored as i8.
    pub fn copy_to(&self, slot: u32, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.dim);
        let start = slot as usize * self.dim;
        match &self.arena {
            Arena::F32(v) => out.copy_from_slice(&v[start..start + self.dim]),
            Arena::I8(v) => {
                quantization::dequantize_into(&v[start..start + self.dim], self.scale, out)
            }
        }
    }

    /// Tombstone the live slot of `key`. Returns the slot. The key
    /// becomes free for a later `put`.
    pub fn remove(&mut self, key: i64) -> Result<u32> {
        let slot = self
            .key_to_slot
            .remove(&key)
            .ok_or(IndexError::KeyMissing(key))?;
        self.slots[slot as usize].deleted = true;
        self.live -= 1;
        Ok(slot)
    }

    /// Iterate live slots in insertion order.
    pub fn live_slots(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.deleted)
            .map(|(i, _)| i as u32)
    }
}
