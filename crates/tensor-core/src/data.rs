// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor buffers bound to a [`TensorsInfo`].
//!
//! A [`TensorsData`] holds one memory slot per tensor in its descriptor.
//! Each slot carries an [`Ownership`] tag that decides what happens to its
//! bytes when the slot is released:
//!
//! ```text
//!  CallerOwned  ──► memory handed in by the caller, dropped on release
//!  EngineOwned  ──► memory allocated here, dropped on release
//!  BackendOwned ──► memory lent by a backend, handed back to its ReleaseFn
//! ```
//!
//! Every buffer has its own lock. Methods on [`TensorsData`] lock
//! internally; [`TensorsData::lock`] returns a [`TensorsDataGuard`] whose
//! methods are the already-locked variants, for call sites that must do
//! several operations atomically or already serialize access.

use crate::{TensorError, TensorsInfo};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;

/// Callback that takes back backend-lent memory.
pub type ReleaseFn = Box<dyn FnOnce(Vec<u8>) + Send>;

/// Who is responsible for a tensor slot's memory.
pub enum Ownership {
    CallerOwned,
    EngineOwned,
    BackendOwned(ReleaseFn),
}

impl Ownership {
    pub fn kind(&self) -> OwnershipKind {
        match self {
            Ownership::CallerOwned => OwnershipKind::Caller,
            Ownership::EngineOwned => OwnershipKind::Engine,
            Ownership::BackendOwned(_) => OwnershipKind::Backend,
        }
    }
}

impl fmt::Debug for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind())
    }
}

/// Payload-free view of an [`Ownership`] tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipKind {
    Caller,
    Engine,
    Backend,
}

/// One tensor's memory slot.
struct TensorMemory {
    size: usize,
    bytes: Option<Vec<u8>>,
    ownership: Ownership,
}

impl TensorMemory {
    fn unallocated(size: usize) -> Self {
        Self {
            size,
            bytes: None,
            ownership: Ownership::EngineOwned,
        }
    }

    /// Runs the ownership tag's release path. Idempotent.
    fn release(&mut self) {
        let bytes = self.bytes.take();
        match std::mem::replace(&mut self.ownership, Ownership::EngineOwned) {
            Ownership::CallerOwned | Ownership::EngineOwned => drop(bytes),
            Ownership::BackendOwned(release) => {
                if let Some(bytes) = bytes {
                    release(bytes);
                }
            }
        }
    }
}

impl Drop for TensorMemory {
    fn drop(&mut self) {
        self.release();
    }
}

fn zeroed(size: usize) -> Result<Vec<u8>, TensorError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| TensorError::OutOfMemory { bytes: size }.reported())?;
    buf.resize(size, 0);
    Ok(buf)
}

/// Memory for a set of tensors matching a descriptor.
///
/// # Examples
/// ```
/// use tensor_core::{TensorType, TensorsData, TensorsInfo};
///
/// let info = TensorsInfo::from_specs(&[(TensorType::Uint8, &[4])]).unwrap();
/// let data = TensorsData::new(&info).unwrap();
/// data.set_tensor_data(0, &[1, 2]).unwrap();
/// assert_eq!(data.get_tensor_data(0).unwrap(), vec![1, 2, 0, 0]);
/// ```
pub struct TensorsData {
    info: TensorsInfo,
    slots: Mutex<Vec<TensorMemory>>,
}

impl TensorsData {
    /// Allocates zero-filled memory for every tensor in `info`.
    pub fn new(info: &TensorsInfo) -> Result<Self, TensorError> {
        info.validate()?;
        let mut slots = Vec::with_capacity(info.count());
        for t in info.iter() {
            let size = t.size_bytes();
            slots.push(TensorMemory {
                size,
                bytes: Some(zeroed(size)?),
                ownership: Ownership::EngineOwned,
            });
        }
        Ok(Self {
            info: info.clone(),
            slots: Mutex::new(slots),
        })
    }

    /// Creates a shape carrier without memory. Slots are filled later with
    /// [`TensorsDataGuard::attach`] or allocated on the first write.
    pub fn new_no_alloc(info: &TensorsInfo) -> Result<Self, TensorError> {
        info.validate()?;
        let slots = info
            .iter()
            .map(|t| TensorMemory::unallocated(t.size_bytes()))
            .collect();
        Ok(Self {
            info: info.clone(),
            slots: Mutex::new(slots),
        })
    }

    /// Wraps caller-provided memory. Each vector must be exactly the size
    /// the descriptor requires for its slot.
    pub fn from_vecs(info: &TensorsInfo, buffers: Vec<Vec<u8>>) -> Result<Self, TensorError> {
        info.validate()?;
        if buffers.len() != info.count() {
            return Err(TensorError::InvalidCount(buffers.len()).reported());
        }
        let mut slots = Vec::with_capacity(buffers.len());
        for (index, (t, bytes)) in info.iter().zip(buffers).enumerate() {
            let expected = t.size_bytes();
            if bytes.len() != expected {
                return Err(TensorError::SizeMismatch {
                    index,
                    expected,
                    actual: bytes.len(),
                }
                .reported());
            }
            slots.push(TensorMemory {
                size: expected,
                bytes: Some(bytes),
                ownership: Ownership::CallerOwned,
            });
        }
        Ok(Self {
            info: info.clone(),
            slots: Mutex::new(slots),
        })
    }

    /// Deep copy that reports allocation failure instead of aborting.
    ///
    /// Slots without memory are allocated zero-filled in the copy; every
    /// slot of the copy is engine-owned.
    pub fn try_clone(&self) -> Result<Self, TensorError> {
        let src = self.slots.lock();
        let mut slots = Vec::with_capacity(src.len());
        for mem in src.iter() {
            let mut bytes = zeroed(mem.size)?;
            if let Some(existing) = &mem.bytes {
                bytes.copy_from_slice(existing);
            }
            slots.push(TensorMemory {
                size: mem.size,
                bytes: Some(bytes),
                ownership: Ownership::EngineOwned,
            });
        }
        Ok(Self {
            info: self.info.clone(),
            slots: Mutex::new(slots),
        })
    }

    /// The descriptor this buffer is bound to.
    pub fn info(&self) -> &TensorsInfo {
        &self.info
    }

    pub fn count(&self) -> usize {
        self.info.count()
    }

    /// Locks the buffer. Use the guard's methods while holding it.
    pub fn lock(&self) -> TensorsDataGuard<'_> {
        TensorsDataGuard {
            info: &self.info,
            slots: self.slots.lock(),
        }
    }

    /// Copies out the bytes of one tensor.
    pub fn get_tensor_data(&self, index: usize) -> Result<Vec<u8>, TensorError> {
        self.lock().tensor(index).map(<[u8]>::to_vec)
    }

    /// Writes `bytes` at the start of one tensor slot.
    pub fn set_tensor_data(&self, index: usize, bytes: &[u8]) -> Result<(), TensorError> {
        self.lock().set_tensor_data(index, bytes)
    }

    /// Byte size of one slot.
    pub fn tensor_size(&self, index: usize) -> Result<usize, TensorError> {
        self.lock().size(index)
    }

    pub fn is_allocated(&self, index: usize) -> Result<bool, TensorError> {
        self.lock().is_allocated(index)
    }

    pub fn ownership(&self, index: usize) -> Result<OwnershipKind, TensorError> {
        self.lock().ownership(index)
    }

    /// Checks that this buffer can carry tensors described by `expected`:
    /// same count, and every slot allocated with exactly the expected size.
    pub fn validate_against(&self, expected: &TensorsInfo) -> Result<(), TensorError> {
        self.lock().validate_against(expected)
    }

    /// Consumes the buffer and returns its memory. Backend-lent slots are
    /// copied and handed back to their backend; unallocated slots yield
    /// empty vectors.
    pub fn into_vecs(self) -> Vec<Vec<u8>> {
        let mut slots = self.slots.into_inner();
        slots
            .iter_mut()
            .map(|mem| match mem.ownership {
                Ownership::BackendOwned(_) => mem.bytes.clone().unwrap_or_default(),
                _ => mem.bytes.take().unwrap_or_default(),
            })
            .collect()
    }
}

impl Clone for TensorsData {
    fn clone(&self) -> Self {
        let src = self.slots.lock();
        let slots = src
            .iter()
            .map(|mem| TensorMemory {
                size: mem.size,
                bytes: Some(mem.bytes.clone().unwrap_or_else(|| vec![0; mem.size])),
                ownership: Ownership::EngineOwned,
            })
            .collect();
        Self {
            info: self.info.clone(),
            slots: Mutex::new(slots),
        }
    }
}

impl fmt::Debug for TensorsData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        let sizes: Vec<usize> = slots.iter().map(|m| m.size).collect();
        let owners: Vec<OwnershipKind> = slots.iter().map(|m| m.ownership.kind()).collect();
        f.debug_struct("TensorsData")
            .field("info", &self.info.to_string())
            .field("sizes", &sizes)
            .field("ownership", &owners)
            .finish()
    }
}

/// A locked [`TensorsData`]. All methods assume the lock is held.
pub struct TensorsDataGuard<'a> {
    info: &'a TensorsInfo,
    slots: MutexGuard<'a, Vec<TensorMemory>>,
}

impl<'a> TensorsDataGuard<'a> {
    pub fn info(&self) -> &TensorsInfo {
        self.info
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, index: usize) -> Result<&TensorMemory, TensorError> {
        let count = self.slots.len();
        self.slots
            .get(index)
            .ok_or_else(|| TensorError::IndexOutOfRange { index, count }.reported())
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut TensorMemory, TensorError> {
        let count = self.slots.len();
        self.slots
            .get_mut(index)
            .ok_or_else(|| TensorError::IndexOutOfRange { index, count }.reported())
    }

    pub fn size(&self, index: usize) -> Result<usize, TensorError> {
        Ok(self.slot(index)?.size)
    }

    pub fn is_allocated(&self, index: usize) -> Result<bool, TensorError> {
        Ok(self.slot(index)?.bytes.is_some())
    }

    pub fn ownership(&self, index: usize) -> Result<OwnershipKind, TensorError> {
        Ok(self.slot(index)?.ownership.kind())
    }

    /// Borrows the bytes of one tensor.
    pub fn tensor(&self, index: usize) -> Result<&[u8], TensorError> {
        self.slot(index)?
            .bytes
            .as_deref()
            .ok_or_else(|| TensorError::NotAllocated { index }.reported())
    }

    /// Mutably borrows the bytes of one tensor.
    pub fn tensor_mut(&mut self, index: usize) -> Result<&mut [u8], TensorError> {
        self.slot_mut(index)?
            .bytes
            .as_deref_mut()
            .ok_or_else(|| TensorError::NotAllocated { index }.reported())
    }

    /// Writes `bytes` at the start of one slot.
    ///
    /// Empty writes and writes longer than the slot are rejected; an
    /// unallocated slot is allocated zero-filled first.
    pub fn set_tensor_data(&mut self, index: usize, bytes: &[u8]) -> Result<(), TensorError> {
        let mem = self.slot_mut(index)?;
        if bytes.is_empty() || bytes.len() > mem.size {
            return Err(TensorError::InvalidWrite {
                index,
                len: bytes.len(),
                capacity: mem.size,
            }
            .reported());
        }
        if mem.bytes.is_none() {
            mem.bytes = Some(zeroed(mem.size)?);
            mem.ownership = Ownership::EngineOwned;
        }
        if let Some(dst) = mem.bytes.as_mut() {
            dst[..bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    /// Replaces one slot's memory. The previous memory is released through
    /// its own ownership tag.
    pub fn attach(
        &mut self,
        index: usize,
        bytes: Vec<u8>,
        ownership: Ownership,
    ) -> Result<(), TensorError> {
        let mem = self.slot_mut(index)?;
        if bytes.len() != mem.size {
            return Err(TensorError::SizeMismatch {
                index,
                expected: mem.size,
                actual: bytes.len(),
            }
            .reported());
        }
        mem.release();
        mem.bytes = Some(bytes);
        mem.ownership = ownership;
        Ok(())
    }

    /// Releases one slot's memory, leaving it unallocated.
    pub fn detach(&mut self, index: usize) -> Result<(), TensorError> {
        self.slot_mut(index)?.release();
        Ok(())
    }

    /// Releases every slot's memory.
    pub fn release_all(&mut self) {
        self.slots.iter_mut().for_each(TensorMemory::release);
    }

    pub fn validate_against(&self, expected: &TensorsInfo) -> Result<(), TensorError> {
        if self.slots.len() != expected.count() {
            return Err(TensorError::InvalidCount(self.slots.len()).reported());
        }
        for (index, (mem, t)) in self.slots.iter().zip(expected.iter()).enumerate() {
            let want = t.size_bytes();
            let actual = mem.bytes.as_ref().map_or(0, Vec::len);
            if mem.size != want || actual != want {
                return Err(TensorError::SizeMismatch {
                    index,
                    expected: want,
                    actual,
                }
                .reported());
            }
        }
        Ok(())
    }

    /// Copies every slot of `src` into this buffer.
    ///
    /// All slots are checked before the first byte is written, so a
    /// mismatch on a later tensor never leaves earlier tensors modified.
    pub fn copy_from(&mut self, src: &TensorsDataGuard<'_>) -> Result<(), TensorError> {
        if src.count() != self.count() {
            return Err(TensorError::InvalidCount(src.count()).reported());
        }
        for index in 0..self.count() {
            let want = src.tensor(index)?.len();
            let mem = self.slot(index)?;
            if mem.size != want {
                return Err(TensorError::SizeMismatch {
                    index,
                    expected: mem.size,
                    actual: want,
                }
                .reported());
            }
        }
        for index in 0..self.count() {
            let bytes = src.tensor(index)?;
            let mem = self.slot_mut(index)?;
            match mem.bytes.as_mut() {
                Some(dst) => dst.copy_from_slice(bytes),
                None => {
                    mem.bytes = Some(bytes.to_vec());
                    mem.ownership = Ownership::EngineOwned;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TensorType;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn info(specs: &[(TensorType, &[u32])]) -> TensorsInfo {
        TensorsInfo::from_specs(specs).unwrap()
    }

    #[test]
    fn test_new_is_zero_filled() {
        let i = info(&[(TensorType::Float32, &[2, 3]), (TensorType::Uint8, &[5])]);
        let d = TensorsData::new(&i).unwrap();
        assert_eq!(d.count(), 2);
        assert_eq!(d.get_tensor_data(0).unwrap(), vec![0u8; 24]);
        assert_eq!(d.tensor_size(1).unwrap(), 5);
        assert_eq!(d.ownership(0).unwrap(), OwnershipKind::Engine);
    }

    #[test]
    fn test_new_rejects_invalid_info() {
        let mut i = TensorsInfo::new();
        i.set_count(1).unwrap();
        assert!(TensorsData::new(&i).is_err());
        assert!(TensorsData::new_no_alloc(&i).is_err());
    }

    #[test]
    fn test_no_alloc_carries_shape_only() {
        let i = info(&[(TensorType::Int16, &[4])]);
        let d = TensorsData::new_no_alloc(&i).unwrap();
        assert!(!d.is_allocated(0).unwrap());
        assert_eq!(d.tensor_size(0).unwrap(), 8);
        assert!(matches!(
            d.get_tensor_data(0),
            Err(TensorError::NotAllocated { index: 0 })
        ));
        assert!(d.validate_against(&i).is_err());

        d.set_tensor_data(0, &[9, 9]).unwrap();
        assert_eq!(d.get_tensor_data(0).unwrap(), vec![9, 9, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_set_tensor_data_bounds() {
        let i = info(&[(TensorType::Uint8, &[4])]);
        let d = TensorsData::new(&i).unwrap();
        assert!(matches!(
            d.set_tensor_data(0, &[]),
            Err(TensorError::InvalidWrite { len: 0, .. })
        ));
        assert!(matches!(
            d.set_tensor_data(0, &[1, 2, 3, 4, 5]),
            Err(TensorError::InvalidWrite { len: 5, capacity: 4, .. })
        ));
        assert!(d.set_tensor_data(1, &[1]).is_err());
        assert_eq!(d.get_tensor_data(0).unwrap(), vec![0; 4]);

        d.set_tensor_data(0, &[1, 2, 3, 4]).unwrap();
        assert_eq!(d.get_tensor_data(0).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_from_vecs_checks_sizes() {
        let i = info(&[(TensorType::Uint16, &[2])]);
        assert!(TensorsData::from_vecs(&i, vec![vec![0; 3]]).is_err());
        assert!(TensorsData::from_vecs(&i, vec![]).is_err());
        let d = TensorsData::from_vecs(&i, vec![vec![1, 2, 3, 4]]).unwrap();
        assert_eq!(d.ownership(0).unwrap(), OwnershipKind::Caller);
        assert_eq!(d.into_vecs(), vec![vec![1, 2, 3, 4]]);
    }

    #[test]
    fn test_clone_is_deep_and_independent() {
        let i = info(&[(TensorType::Uint8, &[3])]);
        let a = TensorsData::new(&i).unwrap();
        a.set_tensor_data(0, &[1, 2, 3]).unwrap();

        let b = a.clone();
        let c = a.try_clone().unwrap();
        b.set_tensor_data(0, &[7]).unwrap();
        c.set_tensor_data(0, &[8]).unwrap();

        assert_eq!(a.get_tensor_data(0).unwrap(), vec![1, 2, 3]);
        assert_eq!(b.get_tensor_data(0).unwrap(), vec![7, 2, 3]);
        assert_eq!(c.get_tensor_data(0).unwrap(), vec![8, 2, 3]);
        assert_eq!(a.info(), b.info());
    }

    #[test]
    fn test_clone_allocates_no_alloc_slots() {
        let i = info(&[(TensorType::Uint8, &[2])]);
        let shell = TensorsData::new_no_alloc(&i).unwrap();
        let copy = shell.try_clone().unwrap();
        assert!(copy.is_allocated(0).unwrap());
        assert_eq!(copy.get_tensor_data(0).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_backend_owned_release_runs_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let i = info(&[(TensorType::Uint8, &[2])]);
        let d = TensorsData::new_no_alloc(&i).unwrap();
        {
            let counter = Arc::clone(&released);
            let mut guard = d.lock();
            guard
                .attach(
                    0,
                    vec![5, 6],
                    Ownership::BackendOwned(Box::new(move |bytes| {
                        assert_eq!(bytes, vec![5, 6]);
                        counter.fetch_add(1, Ordering::SeqCst);
                    })),
                )
                .unwrap();
            assert_eq!(guard.ownership(0).unwrap(), OwnershipKind::Backend);
        }
        assert_eq!(d.get_tensor_data(0).unwrap(), vec![5, 6]);
        drop(d);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attach_releases_previous_memory() {
        let released = Arc::new(AtomicUsize::new(0));
        let i = info(&[(TensorType::Uint8, &[1])]);
        let d = TensorsData::new_no_alloc(&i).unwrap();
        let mut guard = d.lock();
        for _ in 0..2 {
            let counter = Arc::clone(&released);
            guard
                .attach(
                    0,
                    vec![1],
                    Ownership::BackendOwned(Box::new(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })),
                )
                .unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(guard.attach(0, vec![1, 2], Ownership::EngineOwned).is_err());
        guard.detach(0).unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert!(!guard.is_allocated(0).unwrap());
    }

    #[test]
    fn test_copy_from_validates_before_writing() {
        let dst_info = info(&[(TensorType::Uint8, &[2]), (TensorType::Uint8, &[2])]);
        let src_info = info(&[(TensorType::Uint8, &[2]), (TensorType::Uint8, &[3])]);
        let dst = TensorsData::new(&dst_info).unwrap();
        let src = TensorsData::new(&src_info).unwrap();
        src.set_tensor_data(0, &[4, 4]).unwrap();

        let result = dst.lock().copy_from(&src.lock());
        assert!(matches!(result, Err(TensorError::SizeMismatch { index: 1, .. })));
        assert_eq!(dst.get_tensor_data(0).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_validate_against() {
        let i = info(&[(TensorType::Float32, &[4])]);
        let other = info(&[(TensorType::Float32, &[5])]);
        let d = TensorsData::new(&i).unwrap();
        assert!(d.validate_against(&i).is_ok());
        assert!(matches!(
            d.validate_against(&other),
            Err(TensorError::SizeMismatch { expected: 20, actual: 16, .. })
        ));
    }

    #[test]
    fn test_shared_across_threads() {
        let i = info(&[(TensorType::Uint8, &[64])]);
        let d = Arc::new(TensorsData::new(&i).unwrap());
        let handles: Vec<_> = (0..4u8)
            .map(|n| {
                let d = Arc::clone(&d);
                std::thread::spawn(move || d.set_tensor_data(0, &[n + 1; 64]).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let bytes = d.get_tensor_data(0).unwrap();
        assert!(bytes.iter().all(|&b| b == bytes[0]));
    }

    proptest! {
        #[test]
        fn prop_clone_matches_source(payload in prop::collection::vec(any::<u8>(), 1..=32)) {
            let i = info(&[(TensorType::Uint8, &[payload.len() as u32])]);
            let a = TensorsData::new(&i).unwrap();
            a.set_tensor_data(0, &payload).unwrap();
            let b = a.try_clone().unwrap();
            prop_assert_eq!(b.get_tensor_data(0).unwrap(), payload);
            prop_assert_eq!(b.info(), a.info());
        }
    }
}
