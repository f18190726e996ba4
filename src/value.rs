//! Industrial data value types for ADS variables
//!
//! Covers the IEC 61131 basic scalar set. STRING and fixed-point decimal
//! types are deliberately not represented; requesting one is rejected at
//! configuration time, not at runtime.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AdsError, AdsResult};

/// Basic variable type of a PLC symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdsDataType {
    /// BOOL (1 byte, 0 or 1)
    Bool,
    /// BYTE / USINT (u8)
    Byte,
    /// SINT (i8)
    SInt,
    /// WORD / UINT (u16)
    Word,
    /// INT (i16)
    Int,
    /// DWORD / UDINT (u32)
    DWord,
    /// DINT (i32)
    DInt,
    /// LWORD / ULINT (u64)
    LWord,
    /// LINT (i64)
    LInt,
    /// REAL (f32)
    Real,
    /// LREAL (f64)
    LReal,
}

impl AdsDataType {
    /// Encoded size of one value of this type
    pub fn byte_len(&self) -> usize {
        match self {
            AdsDataType::Bool | AdsDataType::Byte | AdsDataType::SInt => 1,
            AdsDataType::Word | AdsDataType::Int => 2,
            AdsDataType::DWord | AdsDataType::DInt | AdsDataType::Real => 4,
            AdsDataType::LWord | AdsDataType::LInt | AdsDataType::LReal => 8,
        }
    }

    /// Default value of this type, used to initialize item state
    pub fn default_value(&self) -> AdsValue {
        match self {
            AdsDataType::Bool => AdsValue::Bool(false),
            AdsDataType::Byte => AdsValue::Byte(0),
            AdsDataType::SInt => AdsValue::SInt(0),
            AdsDataType::Word => AdsValue::Word(0),
            AdsDataType::Int => AdsValue::Int(0),
            AdsDataType::DWord => AdsValue::DWord(0),
            AdsDataType::DInt => AdsValue::DInt(0),
            AdsDataType::LWord => AdsValue::LWord(0),
            AdsDataType::LInt => AdsValue::LInt(0),
            AdsDataType::Real => AdsValue::Real(0.0),
            AdsDataType::LReal => AdsValue::LReal(0.0),
        }
    }
}

impl FromStr for AdsDataType {
    type Err = AdsError;

    /// Parse a host-runtime type descriptor. Both IEC names and the
    /// width-style aliases used in point tables are accepted. STRING and
    /// DECIMAL descriptors are rejected here so misconfiguration surfaces
    /// at setup, not mid-cycle.
    fn from_str(s: &str) -> AdsResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bool" | "bit" => Ok(AdsDataType::Bool),
            "byte" | "usint" | "uint8" => Ok(AdsDataType::Byte),
            "sint" | "int8" => Ok(AdsDataType::SInt),
            "word" | "uint" | "uint16" => Ok(AdsDataType::Word),
            "int" | "int16" => Ok(AdsDataType::Int),
            "dword" | "udint" | "uint32" => Ok(AdsDataType::DWord),
            "dint" | "int32" => Ok(AdsDataType::DInt),
            "lword" | "ulint" | "uint64" => Ok(AdsDataType::LWord),
            "lint" | "int64" => Ok(AdsDataType::LInt),
            "real" | "float32" | "float" => Ok(AdsDataType::Real),
            "lreal" | "float64" | "double" => Ok(AdsDataType::LReal),
            "string" | "wstring" | "decimal" => Err(AdsError::not_supported(format!(
                "variable type '{s}' is not implemented by the ADS engine"
            ))),
            other => Err(AdsError::config(format!("unknown variable type '{other}'"))),
        }
    }
}

/// One typed variable value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AdsValue {
    Bool(bool),
    Byte(u8),
    SInt(i8),
    Word(u16),
    Int(i16),
    DWord(u32),
    DInt(i32),
    LWord(u64),
    LInt(i64),
    Real(f32),
    LReal(f64),
}

impl AdsValue {
    /// The data type of this value
    pub fn data_type(&self) -> AdsDataType {
        match self {
            AdsValue::Bool(_) => AdsDataType::Bool,
            AdsValue::Byte(_) => AdsDataType::Byte,
            AdsValue::SInt(_) => AdsDataType::SInt,
            AdsValue::Word(_) => AdsDataType::Word,
            AdsValue::Int(_) => AdsDataType::Int,
            AdsValue::DWord(_) => AdsDataType::DWord,
            AdsValue::DInt(_) => AdsDataType::DInt,
            AdsValue::LWord(_) => AdsDataType::LWord,
            AdsValue::LInt(_) => AdsDataType::LInt,
            AdsValue::Real(_) => AdsDataType::Real,
            AdsValue::LReal(_) => AdsDataType::LReal,
        }
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> f64 {
        match self {
            AdsValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            AdsValue::Byte(v) => *v as f64,
            AdsValue::SInt(v) => *v as f64,
            AdsValue::Word(v) => *v as f64,
            AdsValue::Int(v) => *v as f64,
            AdsValue::DWord(v) => *v as f64,
            AdsValue::DInt(v) => *v as f64,
            AdsValue::LWord(v) => *v as f64,
            AdsValue::LInt(v) => *v as f64,
            AdsValue::Real(v) => *v as f64,
            AdsValue::LReal(v) => *v,
        }
    }

    /// Try to convert to i64 (floats are rounded)
    pub fn as_i64(&self) -> i64 {
        match self {
            AdsValue::Bool(b) => *b as i64,
            AdsValue::Byte(v) => *v as i64,
            AdsValue::SInt(v) => *v as i64,
            AdsValue::Word(v) => *v as i64,
            AdsValue::Int(v) => *v as i64,
            AdsValue::DWord(v) => *v as i64,
            AdsValue::DInt(v) => *v as i64,
            AdsValue::LWord(v) => *v as i64,
            AdsValue::LInt(v) => *v,
            AdsValue::Real(v) => v.round() as i64,
            AdsValue::LReal(v) => v.round() as i64,
        }
    }

    /// Try to convert to bool (non-zero is true)
    pub fn as_bool(&self) -> bool {
        match self {
            AdsValue::Bool(b) => *b,
            AdsValue::Real(v) => *v != 0.0,
            AdsValue::LReal(v) => *v != 0.0,
            other => other.as_i64() != 0,
        }
    }
}

impl std::fmt::Display for AdsValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdsValue::Bool(v) => write!(f, "{v}"),
            AdsValue::Byte(v) => write!(f, "{v}"),
            AdsValue::SInt(v) => write!(f, "{v}"),
            AdsValue::Word(v) => write!(f, "{v}"),
            AdsValue::Int(v) => write!(f, "{v}"),
            AdsValue::DWord(v) => write!(f, "{v}"),
            AdsValue::DInt(v) => write!(f, "{v}"),
            AdsValue::LWord(v) => write!(f, "{v}"),
            AdsValue::LInt(v) => write!(f, "{v}"),
            AdsValue::Real(v) => write!(f, "{v}"),
            AdsValue::LReal(v) => write!(f, "{v}"),
        }
    }
}
