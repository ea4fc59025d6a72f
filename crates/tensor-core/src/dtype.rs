// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor element types.

use crate::TensorError;
use std::fmt;
use std::str::FromStr;

/// Enumerates the element types a tensor slot can hold.
///
/// `Unknown` is the value of a freshly created descriptor entry; a
/// descriptor containing it never validates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TensorType {
    Int32,
    Uint32,
    Int16,
    Uint16,
    Int8,
    Uint8,
    Float64,
    Float32,
    Int64,
    Uint64,
    Float16,
    #[default]
    Unknown,
}

impl TensorType {
    /// All known element types, in declaration order.
    pub const ALL: [TensorType; 11] = [
        TensorType::Int32,
        TensorType::Uint32,
        TensorType::Int16,
        TensorType::Uint16,
        TensorType::Int8,
        TensorType::Uint8,
        TensorType::Float64,
        TensorType::Float32,
        TensorType::Int64,
        TensorType::Uint64,
        TensorType::Float16,
    ];

    /// Returns the size of a single element in bytes (0 for `Unknown`).
    pub fn size_bytes(self) -> usize {
        match self {
            TensorType::Int32 | TensorType::Uint32 | TensorType::Float32 => 4,
            TensorType::Int16 | TensorType::Uint16 | TensorType::Float16 => 2,
            TensorType::Int8 | TensorType::Uint8 => 1,
            TensorType::Float64 | TensorType::Int64 | TensorType::Uint64 => 8,
            TensorType::Unknown => 0,
        }
    }

    /// Returns the canonical lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            TensorType::Int32 => "int32",
            TensorType::Uint32 => "uint32",
            TensorType::Int16 => "int16",
            TensorType::Uint16 => "uint16",
            TensorType::Int8 => "int8",
            TensorType::Uint8 => "uint8",
            TensorType::Float64 => "float64",
            TensorType::Float32 => "float32",
            TensorType::Int64 => "int64",
            TensorType::Uint64 => "uint64",
            TensorType::Float16 => "float16",
            TensorType::Unknown => "unknown",
        }
    }

    /// Returns `true` if this build can hold tensors of this type.
    pub fn is_supported(self) -> bool {
        match self {
            TensorType::Unknown => false,
            TensorType::Float16 => cfg!(feature = "float16"),
            _ => true,
        }
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TensorType {
    type Err = TensorError;

    /// Parses a type label. Accepts the canonical names plus the short
    /// `f32`/`f16`/`i8`-style aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.trim().to_ascii_lowercase().as_str() {
            "int32" | "i32" => TensorType::Int32,
            "uint32" | "u32" => TensorType::Uint32,
            "int16" | "i16" => TensorType::Int16,
            "uint16" | "u16" => TensorType::Uint16,
            "int8" | "i8" => TensorType::Int8,
            "uint8" | "u8" => TensorType::Uint8,
            "float64" | "f64" => TensorType::Float64,
            "float32" | "f32" => TensorType::Float32,
            "int64" | "i64" => TensorType::Int64,
            "uint64" | "u64" => TensorType::Uint64,
            "float16" | "f16" => TensorType::Float16,
            other => {
                return Err(TensorError::Parse(format!("unknown tensor type '{other}'")));
            }
        };
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_sizes() {
        assert_eq!(TensorType::Float32.size_bytes(), 4);
        assert_eq!(TensorType::Float64.size_bytes(), 8);
        assert_eq!(TensorType::Uint8.size_bytes(), 1);
        assert_eq!(TensorType::Int16.size_bytes(), 2);
        assert_eq!(TensorType::Uint64.size_bytes(), 8);
        assert_eq!(TensorType::Unknown.size_bytes(), 0);
    }

    #[test]
    fn test_parse_labels_and_aliases() {
        for ty in TensorType::ALL {
            assert_eq!(ty.as_str().parse::<TensorType>().unwrap(), ty);
        }
        assert_eq!("F32".parse::<TensorType>().unwrap(), TensorType::Float32);
        assert!("complex64".parse::<TensorType>().is_err());
        assert!("unknown".parse::<TensorType>().is_err());
    }

    #[test]
    fn test_unknown_is_unsupported() {
        assert!(!TensorType::Unknown.is_supported());
        assert!(TensorType::Int64.is_supported());
        assert_eq!(TensorType::Float16.is_supported(), cfg!(feature = "float16"));
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&TensorType::Uint16).unwrap();
        assert_eq!(json, "\"uint16\"");
        let back: TensorType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TensorType::Uint16);
    }
}
