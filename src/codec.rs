//! Encoding and decoding of ADS variable data
//!
//! ADS payloads are little-endian. Decoding is length-checked: a buffer
//! shorter than the declared type is an invalid-data error, a longer buffer
//! is accepted with the surplus ignored (the remote pads sum-up data blocks
//! to the requested length).

use byteorder::{ByteOrder, LittleEndian};
use bytes::BufMut;

use crate::error::{AdsError, AdsResult};
use crate::value::{AdsDataType, AdsValue};

/// Encode a value into its little-endian wire form
pub fn encode_value(value: &AdsValue, buf: &mut impl BufMut) {
    match value {
        AdsValue::Bool(v) => buf.put_u8(*v as u8),
        AdsValue::Byte(v) => buf.put_u8(*v),
        AdsValue::SInt(v) => buf.put_i8(*v),
        AdsValue::Word(v) => buf.put_u16_le(*v),
        AdsValue::Int(v) => buf.put_i16_le(*v),
        AdsValue::DWord(v) => buf.put_u32_le(*v),
        AdsValue::DInt(v) => buf.put_i32_le(*v),
        AdsValue::LWord(v) => buf.put_u64_le(*v),
        AdsValue::LInt(v) => buf.put_i64_le(*v),
        AdsValue::Real(v) => buf.put_f32_le(*v),
        AdsValue::LReal(v) => buf.put_f64_le(*v),
    }
}

/// Encode a value into a fresh byte vector
pub fn encode_value_vec(value: &AdsValue) -> Vec<u8> {
    let mut buf = Vec::with_capacity(value.data_type().byte_len());
    encode_value(value, &mut buf);
    buf
}

/// Decode a value of the given type from a little-endian buffer
pub fn decode_value(data_type: AdsDataType, data: &[u8]) -> AdsResult<AdsValue> {
    let needed = data_type.byte_len();
    if data.len() < needed {
        return Err(AdsError::invalid_data(format!(
            "value data too short: need {needed} bytes for {data_type:?}, got {}",
            data.len()
        )));
    }
    let value = match data_type {
        AdsDataType::Bool => AdsValue::Bool(data[0] != 0),
        AdsDataType::Byte => AdsValue::Byte(data[0]),
        AdsDataType::SInt => AdsValue::SInt(data[0] as i8),
        AdsDataType::Word => AdsValue::Word(LittleEndian::read_u16(data)),
        AdsDataType::Int => AdsValue::Int(LittleEndian::read_i16(data)),
        AdsDataType::DWord => AdsValue::DWord(LittleEndian::read_u32(data)),
        AdsDataType::DInt => AdsValue::DInt(LittleEndian::read_i32(data)),
        AdsDataType::LWord => AdsValue::LWord(LittleEndian::read_u64(data)),
        AdsDataType::LInt => AdsValue::LInt(LittleEndian::read_i64(data)),
        AdsDataType::Real => AdsValue::Real(LittleEndian::read_f32(data)),
        AdsDataType::LReal => AdsValue::LReal(LittleEndian::read_f64(data)),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_all_types() {
        let values = [
            AdsValue::Bool(true),
            AdsValue::Byte(0xAB),
            AdsValue::SInt(-12),
            AdsValue::Word(0x1234),
            AdsValue::Int(-3000),
            AdsValue::DWord(0xDEAD_BEEF),
            AdsValue::DInt(-1_000_000),
            AdsValue::LWord(0x0102_0304_0506_0708),
            AdsValue::LInt(-9_000_000_000),
            AdsValue::Real(2.75),
            AdsValue::LReal(-0.001),
        ];
        for value in values {
            let encoded = encode_value_vec(&value);
            assert_eq!(encoded.len(), value.data_type().byte_len());
            let decoded = decode_value(value.data_type(), &encoded).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_little_endian_layout() {
        assert_eq!(encode_value_vec(&AdsValue::Word(0x1234)), vec![0x34, 0x12]);
        assert_eq!(
            encode_value_vec(&AdsValue::DInt(1)),
            vec![0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_bool_encoding() {
        assert_eq!(encode_value_vec(&AdsValue::Bool(true)), vec![1]);
        assert_eq!(encode_value_vec(&AdsValue::Bool(false)), vec![0]);
        // Any non-zero byte decodes to true
        assert_eq!(
            decode_value(AdsDataType::Bool, &[0xFF]).unwrap(),
            AdsValue::Bool(true)
        );
    }

    #[test]
    fn test_short_buffer_is_error() {
        assert!(decode_value(AdsDataType::DInt, &[1, 2, 3]).is_err());
        assert!(decode_value(AdsDataType::Bool, &[]).is_err());
    }

    #[test]
    fn test_surplus_bytes_ignored() {
        let decoded = decode_value(AdsDataType::Word, &[0x01, 0x00, 0xEE, 0xEE]).unwrap();
        assert_eq!(decoded, AdsValue::Word(1));
    }
}
