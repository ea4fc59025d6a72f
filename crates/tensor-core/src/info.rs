// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor descriptors: name, element type and dimensions of up to
//! [`MAX_TENSORS`] tensors.
//!
//! A descriptor is either *legacy* (rank limit [`LEGACY_RANK`]) or
//! *extended* (rank limit [`MAX_RANK`]). Every entry stores [`MAX_RANK`]
//! dimension slots; slots past the rank actually set hold 1, so byte sizes
//! and comparisons never depend on the mode.

use crate::{TensorError, TensorType};
use std::fmt;

/// Maximum number of tensors in one descriptor.
pub const MAX_TENSORS: usize = 16;

/// Rank limit of an extended descriptor (and the number of stored slots).
pub const MAX_RANK: usize = 8;

/// Rank limit of a legacy descriptor.
pub const LEGACY_RANK: usize = 4;

/// Metadata for a single tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TensorInfo {
    pub name: Option<String>,
    pub tensor_type: TensorType,
    pub dimension: [u32; MAX_RANK],
}

impl Default for TensorInfo {
    fn default() -> Self {
        Self {
            name: None,
            tensor_type: TensorType::Unknown,
            dimension: [1; MAX_RANK],
        }
    }
}

impl TensorInfo {
    /// Number of elements, or `None` if the product overflows `usize`.
    pub fn checked_num_elements(&self) -> Option<usize> {
        self.dimension
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
    }

    /// Byte size, or `None` if it overflows `usize`.
    pub fn checked_size_bytes(&self) -> Option<usize> {
        self.checked_num_elements()?
            .checked_mul(self.tensor_type.size_bytes())
    }

    /// Number of elements described by the dimension slots. Saturates at
    /// `usize::MAX`; validated descriptors never do.
    pub fn num_elements(&self) -> usize {
        self.checked_num_elements().unwrap_or(usize::MAX)
    }

    /// Byte size of one tensor with this type and shape. Saturates like
    /// [`num_elements`](Self::num_elements).
    pub fn size_bytes(&self) -> usize {
        self.checked_size_bytes().unwrap_or(usize::MAX)
    }

    /// Index one past the last slot that differs from 1.
    pub fn rank(&self) -> usize {
        self.dimension
            .iter()
            .rposition(|&d| d != 1)
            .map(|i| i + 1)
            .unwrap_or(1)
    }

    fn validate(&self, index: usize, rank_limit: usize) -> Result<(), TensorError> {
        if self.tensor_type == TensorType::Unknown {
            return Err(TensorError::UnknownType { index });
        }
        if let Some(slot) = self.dimension.iter().position(|&d| d == 0) {
            return Err(TensorError::InvalidDimension {
                index,
                detail: format!("slot {slot} is zero"),
            });
        }
        if self.dimension[rank_limit..].iter().any(|&d| d != 1) {
            return Err(TensorError::InvalidDimension {
                index,
                detail: format!("rank exceeds limit {rank_limit}"),
            });
        }
        if self.checked_size_bytes().is_none() {
            return Err(TensorError::InvalidDimension {
                index,
                detail: "byte size overflows usize".into(),
            });
        }
        Ok(())
    }
}

/// Describes the shape, element type and optional name of 1–16 tensors.
///
/// # Examples
/// ```
/// use tensor_core::{TensorType, TensorsInfo};
///
/// let mut info = TensorsInfo::new();
/// info.set_count(1).unwrap();
/// info.set_tensor_type(0, TensorType::Float32).unwrap();
/// info.set_tensor_dimension(0, &[1, 1000]).unwrap();
/// assert!(info.validate().is_ok());
/// assert_eq!(info.tensor_size(0).unwrap(), 4000);
/// ```
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TensorsInfo {
    tensors: Vec<TensorInfo>,
    extended: bool,
}

impl TensorsInfo {
    /// Creates an empty legacy descriptor (rank limit 4).
    pub fn new() -> Self {
        Self {
            tensors: Vec::new(),
            extended: false,
        }
    }

    /// Creates an empty extended descriptor (rank limit 8).
    pub fn new_extended() -> Self {
        Self {
            tensors: Vec::new(),
            extended: true,
        }
    }

    /// Builds a descriptor from `(type, dimension)` pairs.
    ///
    /// The descriptor is extended if any shape has more than four slots.
    pub fn from_specs(specs: &[(TensorType, &[u32])]) -> Result<Self, TensorError> {
        let extended = specs.iter().any(|(_, dims)| dims.len() > LEGACY_RANK);
        let mut info = if extended {
            Self::new_extended()
        } else {
            Self::new()
        };
        info.set_count(specs.len())?;
        for (i, (ty, dims)) in specs.iter().enumerate() {
            info.set_tensor_type(i, *ty)?;
            info.set_tensor_dimension(i, dims)?;
        }
        info.validate()?;
        Ok(info)
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Number of significant dimension slots for this descriptor.
    pub fn rank_limit(&self) -> usize {
        if self.extended {
            MAX_RANK
        } else {
            LEGACY_RANK
        }
    }

    pub fn count(&self) -> usize {
        self.tensors.len()
    }

    /// Resizes the descriptor. New entries start with an `Unknown` type.
    pub fn set_count(&mut self, count: usize) -> Result<(), TensorError> {
        if count == 0 || count > MAX_TENSORS {
            return Err(TensorError::InvalidCount(count).reported());
        }
        self.tensors.resize_with(count, TensorInfo::default);
        Ok(())
    }

    /// Returns the entry at `index`.
    pub fn tensor(&self, index: usize) -> Result<&TensorInfo, TensorError> {
        let count = self.count();
        self.tensors
            .get(index)
            .ok_or_else(|| TensorError::IndexOutOfRange { index, count }.reported())
    }

    fn tensor_mut(&mut self, index: usize) -> Result<&mut TensorInfo, TensorError> {
        let count = self.count();
        self.tensors
            .get_mut(index)
            .ok_or_else(|| TensorError::IndexOutOfRange { index, count }.reported())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TensorInfo> {
        self.tensors.iter()
    }

    pub fn tensor_name(&self, index: usize) -> Result<Option<&str>, TensorError> {
        Ok(self.tensor(index)?.name.as_deref())
    }

    pub fn set_tensor_name(&mut self, index: usize, name: Option<&str>) -> Result<(), TensorError> {
        self.tensor_mut(index)?.name = name.map(str::to_owned);
        Ok(())
    }

    pub fn tensor_type(&self, index: usize) -> Result<TensorType, TensorError> {
        Ok(self.tensor(index)?.tensor_type)
    }

    /// Sets the element type of one tensor.
    ///
    /// Fails with an invalid-parameter error for `Unknown` and with a
    /// not-supported error for a type this build cannot hold.
    pub fn set_tensor_type(&mut self, index: usize, ty: TensorType) -> Result<(), TensorError> {
        if ty == TensorType::Unknown {
            return Err(TensorError::UnknownType { index }.reported());
        }
        if !ty.is_supported() {
            return Err(TensorError::UnsupportedType(ty).reported());
        }
        self.tensor_mut(index)?.tensor_type = ty;
        Ok(())
    }

    /// Returns the significant dimension slots of one tensor.
    pub fn tensor_dimension(&self, index: usize) -> Result<&[u32], TensorError> {
        let limit = self.rank_limit();
        Ok(&self.tensor(index)?.dimension[..limit])
    }

    /// Sets the dimension slots of one tensor. Unspecified slots become 1.
    pub fn set_tensor_dimension(&mut self, index: usize, dims: &[u32]) -> Result<(), TensorError> {
        let limit = self.rank_limit();
        if dims.is_empty() || dims.len() > limit {
            return Err(TensorError::InvalidDimension {
                index,
                detail: format!("rank {} outside 1..={limit}", dims.len()),
            }
            .reported());
        }
        if let Some(slot) = dims.iter().position(|&d| d == 0) {
            return Err(TensorError::InvalidDimension {
                index,
                detail: format!("slot {slot} is zero"),
            }
            .reported());
        }
        let entry = self.tensor_mut(index)?;
        entry.dimension = [1; MAX_RANK];
        entry.dimension[..dims.len()].copy_from_slice(dims);
        Ok(())
    }

    /// Byte size of one tensor: element size × product of dimensions.
    pub fn tensor_size(&self, index: usize) -> Result<usize, TensorError> {
        Ok(self.tensor(index)?.size_bytes())
    }

    /// Sum of [`tensor_size`](Self::tensor_size) over all tensors.
    pub fn total_size(&self) -> usize {
        self.tensors
            .iter()
            .fold(0usize, |acc, t| acc.saturating_add(t.size_bytes()))
    }

    /// Checks count, element types and dimension slots.
    pub fn validate(&self) -> Result<(), TensorError> {
        let count = self.count();
        if count == 0 || count > MAX_TENSORS {
            return Err(TensorError::InvalidCount(count).reported());
        }
        let limit = self.rank_limit();
        let mut total = 0usize;
        for (i, t) in self.tensors.iter().enumerate() {
            t.validate(i, limit).map_err(TensorError::reported)?;
            total = total.checked_add(t.size_bytes()).ok_or_else(|| {
                TensorError::InvalidDimension {
                    index: i,
                    detail: "total byte size overflows usize".into(),
                }
                .reported()
            })?;
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Structural comparison of count, types and dimensions. Names and the
    /// legacy/extended flag are ignored.
    pub fn is_equal(&self, other: &TensorsInfo) -> bool {
        self.count() == other.count()
            && self
                .tensors
                .iter()
                .zip(&other.tensors)
                .all(|(a, b)| a.tensor_type == b.tensor_type && a.dimension == b.dimension)
    }

    /// Parses a colon-separated dimension string such as `"3:224:224:1"`.
    pub fn parse_dimension(s: &str) -> Result<Vec<u32>, TensorError> {
        s.split(':')
            .map(|part| {
                part.trim()
                    .parse::<u32>()
                    .map_err(|e| TensorError::Parse(format!("bad dimension '{part}': {e}")))
            })
            .collect()
    }
}

impl Default for TensorsInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TensorsInfo {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl Eq for TensorsInfo {}

impl fmt::Display for TensorsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let limit = self.rank_limit();
        for (i, t) in self.tensors.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if let Some(name) = &t.name {
                write!(f, "{name}=")?;
            }
            write!(f, "{}[", t.tensor_type)?;
            let rank = t.rank().min(limit);
            for (j, d) in t.dimension[..rank].iter().enumerate() {
                if j > 0 {
                    write!(f, ":")?;
                }
                write!(f, "{d}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}
