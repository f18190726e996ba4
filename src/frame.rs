//! AMS framing: transport envelope and addressing header
//!
//! Every packet on the wire is:
//!
//! ```text
//! [AMS/TCP header (6)] [AMS header (32)] [command payload (N)]
//! ```
//!
//! The transport header carries only a reserved word (must be zero) and the
//! byte count of everything that follows it. The addressing header carries
//! source/target endpoints, the command id, state flags, payload length, an
//! error code and the invoke id used for request/response correlation.

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::{AMS_HEADER_LEN, AMS_TCP_HEADER_LEN};
use crate::error::{AdsError, AdsResult};
use crate::types::{AmsAddr, CommandId, StateFlags};

/// AMS/TCP transport header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmsTcpHeader {
    /// Number of bytes following this header (AMS header + payload)
    pub length: u32,
}

impl AmsTcpHeader {
    pub fn new(length: u32) -> Self {
        Self { length }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(0); // reserved
        buf.put_u32_le(self.length);
    }

    /// Decode and validate. A non-zero reserved word or a declared length
    /// shorter than one AMS header means the stream is not positioned on a
    /// packet boundary; the connection is not reusable after that.
    pub fn decode(buf: &mut impl Buf) -> AdsResult<Self> {
        if buf.remaining() < AMS_TCP_HEADER_LEN {
            return Err(AdsError::protocol("AMS/TCP header truncated"));
        }
        let reserved = buf.get_u16_le();
        if reserved != 0 {
            return Err(AdsError::protocol(format!(
                "AMS/TCP header reserved field is 0x{reserved:04X}, expected 0"
            )));
        }
        let length = buf.get_u32_le();
        if (length as usize) < AMS_HEADER_LEN {
            return Err(AdsError::protocol(format!(
                "AMS/TCP length {length} shorter than the AMS header"
            )));
        }
        Ok(Self { length })
    }
}

/// AMS addressing header, fixed 32 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmsHeader {
    pub target: AmsAddr,
    pub source: AmsAddr,
    pub command_id: CommandId,
    pub state_flags: StateFlags,
    /// Byte count of the command payload following this header
    pub data_length: u32,
    /// Raw AMS error code; checked by the transact layer
    pub error_code: u32,
    /// Request/response correlation id
    pub invoke_id: u32,
}

impl AmsHeader {
    /// Build a request header
    pub fn request(
        target: AmsAddr,
        source: AmsAddr,
        command_id: CommandId,
        data_length: u32,
        invoke_id: u32,
    ) -> Self {
        Self {
            target,
            source,
            command_id,
            state_flags: StateFlags::REQUEST_DEFAULT,
            data_length,
            error_code: 0,
            invoke_id,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        self.target.encode(buf);
        self.source.encode(buf);
        self.command_id.encode(buf);
        self.state_flags.encode(buf);
        buf.put_u32_le(self.data_length);
        buf.put_u32_le(self.error_code);
        buf.put_u32_le(self.invoke_id);
    }

    pub fn decode(buf: &mut impl Buf) -> AdsResult<Self> {
        if buf.remaining() < AMS_HEADER_LEN {
            return Err(AdsError::protocol("AMS header truncated"));
        }
        let target = AmsAddr::decode(buf)?;
        let source = AmsAddr::decode(buf)?;
        let command_id = CommandId::decode(buf)?;
        let state_flags = StateFlags::decode(buf)?;
        let data_length = buf.get_u32_le();
        let error_code = buf.get_u32_le();
        let invoke_id = buf.get_u32_le();
        Ok(Self {
            target,
            source,
            command_id,
            state_flags,
            data_length,
            error_code,
            invoke_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AmsNetId, AmsPort};

    fn addr(last: u8, port: u16) -> AmsAddr {
        AmsAddr::new(AmsNetId::new([10, 0, 0, last, 1, 1]), AmsPort(port))
    }

    // ========================================================================
    // AmsTcpHeader Tests
    // ========================================================================

    #[test]
    fn test_tcp_header_roundtrip() {
        let header = AmsTcpHeader::new(44);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), AMS_TCP_HEADER_LEN);
        assert_eq!(&buf[..2], &[0, 0]); // reserved

        let decoded = AmsTcpHeader::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_tcp_header_nonzero_reserved_rejected() {
        let raw: &[u8] = &[0x01, 0x00, 0x20, 0x00, 0x00, 0x00];
        let mut buf = bytes::Bytes::copy_from_slice(raw);
        let err = AmsTcpHeader::decode(&mut buf).unwrap_err();
        assert!(matches!(err, AdsError::Protocol(_)));
    }

    #[test]
    fn test_tcp_header_length_below_ams_header_rejected() {
        // Declared length 31 < 32-byte AMS header
        let raw: &[u8] = &[0x00, 0x00, 0x1F, 0x00, 0x00, 0x00];
        let mut buf = bytes::Bytes::copy_from_slice(raw);
        assert!(AmsTcpHeader::decode(&mut buf).is_err());
    }

    #[test]
    fn test_tcp_header_truncated() {
        let mut buf = bytes::Bytes::copy_from_slice(&[0x00, 0x00, 0x20]);
        assert!(AmsTcpHeader::decode(&mut buf).is_err());
    }

    // ========================================================================
    // AmsHeader Tests
    // ========================================================================

    #[test]
    fn test_ams_header_request_roundtrip() {
        let header = AmsHeader::request(
            addr(9, 851),
            addr(2, 32905),
            CommandId::ReadWrite,
            24,
            0x1234_5678,
        );

        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), AMS_HEADER_LEN);

        let decoded = AmsHeader::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.error_code, 0);
        assert!(!decoded.state_flags.is_response());
    }

    #[test]
    fn test_ams_header_field_layout() {
        let header = AmsHeader::request(addr(9, 851), addr(2, 800), CommandId::Read, 12, 7);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        // target net id
        assert_eq!(&buf[0..6], &[10, 0, 0, 9, 1, 1]);
        // target port 851 LE
        assert_eq!(&buf[6..8], &[0x53, 0x03]);
        // source net id
        assert_eq!(&buf[8..14], &[10, 0, 0, 2, 1, 1]);
        // command id Read = 2
        assert_eq!(&buf[16..18], &[0x02, 0x00]);
        // state flags: ADS command request
        assert_eq!(&buf[18..20], &[0x04, 0x00]);
        // data length
        assert_eq!(&buf[20..24], &[12, 0, 0, 0]);
        // error code
        assert_eq!(&buf[24..28], &[0, 0, 0, 0]);
        // invoke id
        assert_eq!(&buf[28..32], &[7, 0, 0, 0]);
    }

    #[test]
    fn test_ams_header_unknown_command_rejected() {
        let header = AmsHeader::request(addr(9, 851), addr(2, 800), CommandId::Read, 0, 1);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        // Corrupt the command id field
        buf[16] = 0xEE;
        buf[17] = 0xEE;
        assert!(AmsHeader::decode(&mut buf.freeze()).is_err());
    }

    #[test]
    fn test_ams_header_truncated() {
        let mut buf = bytes::Bytes::copy_from_slice(&[0u8; 16]);
        assert!(AmsHeader::decode(&mut buf).is_err());
    }
}
