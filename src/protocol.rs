//! ADS command request/response model
//!
//! One closed pair of tagged variants per command instead of an open class
//! hierarchy: the command id selects the payload layout on both directions,
//! and decoding produces fresh immutable values.
//!
//! Every response carries its own 32-bit result code ahead of any data. A
//! non-zero result aborts parsing immediately; the remaining payload bytes
//! are never interpreted.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::DEVICE_NAME_LEN;
use crate::error::{AdsError, AdsResult, AdsReturnCode};
use crate::types::{AdsState, CommandId};

/// ADS command request payload
#[derive(Debug, Clone, PartialEq)]
pub enum AdsRequest {
    /// Read name and version of the remote device
    ReadDeviceInfo,
    /// Read `length` bytes at (index group, index offset)
    Read {
        index_group: u32,
        index_offset: u32,
        length: u32,
    },
    /// Write the given data to (index group, index offset)
    Write {
        index_group: u32,
        index_offset: u32,
        data: Bytes,
    },
    /// Write data and read back `read_length` bytes in one round trip
    ReadWrite {
        index_group: u32,
        index_offset: u32,
        read_length: u32,
        write_data: Bytes,
    },
    /// Read the remote run state
    ReadState,
}

impl AdsRequest {
    /// Command id stamped into the AMS header for this request
    pub fn command_id(&self) -> CommandId {
        match self {
            AdsRequest::ReadDeviceInfo => CommandId::ReadDeviceInfo,
            AdsRequest::Read { .. } => CommandId::Read,
            AdsRequest::Write { .. } => CommandId::Write,
            AdsRequest::ReadWrite { .. } => CommandId::ReadWrite,
            AdsRequest::ReadState => CommandId::ReadState,
        }
    }

    /// Encoded payload size in bytes
    pub fn encoded_len(&self) -> usize {
        match self {
            AdsRequest::ReadDeviceInfo | AdsRequest::ReadState => 0,
            AdsRequest::Read { .. } => 12,
            AdsRequest::Write { data, .. } => 12 + data.len(),
            AdsRequest::ReadWrite { write_data, .. } => 16 + write_data.len(),
        }
    }

    /// Encode the payload (request metadata first, then request data)
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            AdsRequest::ReadDeviceInfo | AdsRequest::ReadState => {}
            AdsRequest::Read {
                index_group,
                index_offset,
                length,
            } => {
                buf.put_u32_le(*index_group);
                buf.put_u32_le(*index_offset);
                buf.put_u32_le(*length);
            }
            AdsRequest::Write {
                index_group,
                index_offset,
                data,
            } => {
                buf.put_u32_le(*index_group);
                buf.put_u32_le(*index_offset);
                buf.put_u32_le(data.len() as u32);
                buf.put_slice(data);
            }
            AdsRequest::ReadWrite {
                index_group,
                index_offset,
                read_length,
                write_data,
            } => {
                buf.put_u32_le(*index_group);
                buf.put_u32_le(*index_offset);
                buf.put_u32_le(*read_length);
                buf.put_u32_le(write_data.len() as u32);
                buf.put_slice(write_data);
            }
        }
    }
}

/// ADS command response payload
#[derive(Debug, Clone, PartialEq)]
pub enum AdsResponse {
    DeviceInfo {
        major: u8,
        minor: u8,
        build: u16,
        device_name: String,
    },
    Read {
        data: Bytes,
    },
    Write,
    ReadWrite {
        data: Bytes,
    },
    State {
        ads_state: AdsState,
        device_state: u16,
    },
}

impl AdsResponse {
    /// Parse a response payload. The layout is selected by the command id of
    /// the request this response answers.
    pub fn parse(command_id: CommandId, payload: &[u8]) -> AdsResult<Self> {
        let mut buf = payload;
        let result = read_result_code(&mut buf)?;
        result.into_result()?;

        match command_id {
            CommandId::ReadDeviceInfo => {
                if buf.remaining() < 4 + DEVICE_NAME_LEN {
                    return Err(AdsError::protocol("device info response truncated"));
                }
                let major = buf.get_u8();
                let minor = buf.get_u8();
                let build = buf.get_u16_le();
                let mut name = [0u8; DEVICE_NAME_LEN];
                buf.copy_to_slice(&mut name);
                let end = name.iter().position(|b| *b == 0).unwrap_or(name.len());
                let device_name = String::from_utf8_lossy(&name[..end]).into_owned();
                Ok(AdsResponse::DeviceInfo {
                    major,
                    minor,
                    build,
                    device_name,
                })
            }
            CommandId::Read => {
                let data = read_length_prefixed(&mut buf, "read")?;
                Ok(AdsResponse::Read { data })
            }
            CommandId::Write => Ok(AdsResponse::Write),
            CommandId::ReadWrite => {
                let data = read_length_prefixed(&mut buf, "read-write")?;
                Ok(AdsResponse::ReadWrite { data })
            }
            CommandId::ReadState => {
                if buf.remaining() < 4 {
                    return Err(AdsError::protocol("read state response truncated"));
                }
                let ads_state = AdsState::from_wire(buf.get_u16_le())?;
                let device_state = buf.get_u16_le();
                Ok(AdsResponse::State {
                    ads_state,
                    device_state,
                })
            }
            other => Err(AdsError::not_supported(format!(
                "response parsing for command {other:?}"
            ))),
        }
    }
}

fn read_result_code(buf: &mut &[u8]) -> AdsResult<AdsReturnCode> {
    if buf.remaining() < 4 {
        return Err(AdsError::protocol("response result code truncated"));
    }
    Ok(AdsReturnCode::from_wire(buf.get_u32_le()))
}

fn read_length_prefixed(buf: &mut &[u8], what: &str) -> AdsResult<Bytes> {
    if buf.remaining() < 4 {
        return Err(AdsError::protocol(format!("{what} response length truncated")));
    }
    let length = buf.get_u32_le() as usize;
    if buf.remaining() < length {
        return Err(AdsError::protocol(format!(
            "{what} response data truncated: declared {length}, got {}",
            buf.remaining()
        )));
    }
    Ok(Bytes::copy_from_slice(&buf[..length]))
}
