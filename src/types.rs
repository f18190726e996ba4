//! AMS wire primitive types
//!
//! Fixed-size value types shared by every layer of the protocol engine:
//! net ids, ports, command ids, state flags and device run states. All of
//! them are immutable values; decoding produces a fresh value and never
//! mutates shared state.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::constants::AMS_NETID_LEN;
use crate::error::{AdsError, AdsResult};

// ============================================================================
// AmsNetId
// ============================================================================

/// 6-byte AMS endpoint identifier (4 address octets + 2 extension octets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AmsNetId([u8; AMS_NETID_LEN]);

impl AmsNetId {
    /// Create from raw octets
    pub fn new(octets: [u8; AMS_NETID_LEN]) -> Self {
        Self(octets)
    }

    /// Raw octets
    pub fn octets(&self) -> [u8; AMS_NETID_LEN] {
        self.0
    }

    /// Encode into a buffer (raw 6 bytes)
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.0);
    }

    /// Decode from a buffer
    pub fn decode(buf: &mut impl Buf) -> AdsResult<Self> {
        if buf.remaining() < AMS_NETID_LEN {
            return Err(AdsError::protocol("AMS net id truncated"));
        }
        let mut octets = [0u8; AMS_NETID_LEN];
        buf.copy_to_slice(&mut octets);
        Ok(Self(octets))
    }
}

impl FromStr for AmsNetId {
    type Err = AdsError;

    /// Parse the dotted form `a.b.c.d.e.f` (exactly 6 tokens, each 0..=255)
    fn from_str(s: &str) -> AdsResult<Self> {
        let mut octets = [0u8; AMS_NETID_LEN];
        let mut count = 0;
        for token in s.split('.') {
            if count >= AMS_NETID_LEN {
                return Err(AdsError::invalid_data(format!(
                    "AMS net id '{s}' has more than {AMS_NETID_LEN} parts"
                )));
            }
            octets[count] = token.parse::<u8>().map_err(|_| {
                AdsError::invalid_data(format!("AMS net id '{s}': invalid part '{token}'"))
            })?;
            count += 1;
        }
        if count != AMS_NETID_LEN {
            return Err(AdsError::invalid_data(format!(
                "AMS net id '{s}' has {count} parts, expected {AMS_NETID_LEN}"
            )));
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for AmsNetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(f, "{}.{}.{}.{}.{}.{}", o[0], o[1], o[2], o[3], o[4], o[5])
    }
}

impl TryFrom<String> for AmsNetId {
    type Error = AdsError;

    fn try_from(s: String) -> AdsResult<Self> {
        s.parse()
    }
}

impl From<AmsNetId> for String {
    fn from(id: AmsNetId) -> String {
        id.to_string()
    }
}

// ============================================================================
// AmsPort
// ============================================================================

/// 16-bit logical port inside an AMS endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AmsPort(pub u16);

impl AmsPort {
    /// Logger port
    pub const LOGGER: AmsPort = AmsPort(100);
    /// Event logger port
    pub const EVENT_LOGGER: AmsPort = AmsPort(110);
    /// Real-time core
    pub const REALTIME_CORE: AmsPort = AmsPort(200);
    /// I/O server
    pub const IO: AmsPort = AmsPort(300);
    /// NC server
    pub const NC: AmsPort = AmsPort(500);
    /// TwinCAT 2 PLC runtime 1
    pub const PLC_RUNTIME_TC2: AmsPort = AmsPort(801);
    /// TwinCAT 3 PLC runtime 1
    pub const PLC_RUNTIME_1: AmsPort = AmsPort(851);
    /// TwinCAT 3 PLC runtime 2
    pub const PLC_RUNTIME_2: AmsPort = AmsPort(852);
    /// System service
    pub const SYSTEM_SERVICE: AmsPort = AmsPort(10000);

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.0);
    }

    pub fn decode(buf: &mut impl Buf) -> AdsResult<Self> {
        if buf.remaining() < 2 {
            return Err(AdsError::protocol("AMS port truncated"));
        }
        Ok(Self(buf.get_u16_le()))
    }
}

impl fmt::Display for AmsPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// AmsAddr
// ============================================================================

/// Full AMS endpoint address (net id + port), 8 bytes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AmsAddr {
    pub net_id: AmsNetId,
    pub port: AmsPort,
}

impl AmsAddr {
    pub fn new(net_id: AmsNetId, port: AmsPort) -> Self {
        Self { net_id, port }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        self.net_id.encode(buf);
        self.port.encode(buf);
    }

    pub fn decode(buf: &mut impl Buf) -> AdsResult<Self> {
        Ok(Self {
            net_id: AmsNetId::decode(buf)?,
            port: AmsPort::decode(buf)?,
        })
    }
}

impl fmt::Display for AmsAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.net_id, self.port)
    }
}

// ============================================================================
// CommandId
// ============================================================================

/// ADS command id as carried in the AMS header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandId {
    Invalid = 0,
    ReadDeviceInfo = 1,
    Read = 2,
    Write = 3,
    ReadState = 4,
    WriteControl = 5,
    AddDeviceNotification = 6,
    DelDeviceNotification = 7,
    DeviceNotification = 8,
    ReadWrite = 9,
}

impl CommandId {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Exact lookup; an unknown command id on the wire is a protocol error,
    /// never silently mapped to `Invalid`.
    pub fn from_wire(raw: u16) -> AdsResult<Self> {
        match raw {
            0 => Ok(CommandId::Invalid),
            1 => Ok(CommandId::ReadDeviceInfo),
            2 => Ok(CommandId::Read),
            3 => Ok(CommandId::Write),
            4 => Ok(CommandId::ReadState),
            5 => Ok(CommandId::WriteControl),
            6 => Ok(CommandId::AddDeviceNotification),
            7 => Ok(CommandId::DelDeviceNotification),
            8 => Ok(CommandId::DeviceNotification),
            9 => Ok(CommandId::ReadWrite),
            other => Err(AdsError::protocol(format!("unknown command id {other}"))),
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.as_u16());
    }

    pub fn decode(buf: &mut impl Buf) -> AdsResult<Self> {
        if buf.remaining() < 2 {
            return Err(AdsError::protocol("command id truncated"));
        }
        Self::from_wire(buf.get_u16_le())
    }
}

// ============================================================================
// StateFlags
// ============================================================================

/// Bit-flag word of the AMS header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateFlags(pub u16);

impl StateFlags {
    /// Set on responses, clear on requests
    pub const RESPONSE: StateFlags = StateFlags(0x0001);
    /// ADS command (as opposed to a raw system command)
    pub const ADS_COMMAND: StateFlags = StateFlags(0x0004);
    /// System command
    pub const SYSTEM_COMMAND: StateFlags = StateFlags(0x0008);
    /// UDP instead of TCP transport
    pub const UDP: StateFlags = StateFlags(0x0040);

    /// Flags stamped on every outgoing command request
    pub const REQUEST_DEFAULT: StateFlags = StateFlags(0x0004);

    pub fn contains(&self, other: StateFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_response(&self) -> bool {
        self.contains(Self::RESPONSE)
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.0);
    }

    pub fn decode(buf: &mut impl Buf) -> AdsResult<Self> {
        if buf.remaining() < 2 {
            return Err(AdsError::protocol("state flags truncated"));
        }
        Ok(Self(buf.get_u16_le()))
    }
}

impl std::ops::BitOr for StateFlags {
    type Output = StateFlags;

    fn bitor(self, rhs: StateFlags) -> StateFlags {
        StateFlags(self.0 | rhs.0)
    }
}

// ============================================================================
// AdsState
// ============================================================================

/// Device run state as reported by the ReadState command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum AdsState {
    Invalid = 0,
    Idle = 1,
    Reset = 2,
    Init = 3,
    Start = 4,
    Run = 5,
    Stop = 6,
    SaveCfg = 7,
    LoadCfg = 8,
    PowerFailure = 9,
    PowerGood = 10,
    Error = 11,
    Shutdown = 12,
    Suspend = 13,
    Resume = 14,
    Config = 15,
    Reconfig = 16,
}

impl AdsState {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Exact lookup; an unknown run state on the wire is a protocol error.
    pub fn from_wire(raw: u16) -> AdsResult<Self> {
        match raw {
            0 => Ok(AdsState::Invalid),
            1 => Ok(AdsState::Idle),
            2 => Ok(AdsState::Reset),
            3 => Ok(AdsState::Init),
            4 => Ok(AdsState::Start),
            5 => Ok(AdsState::Run),
            6 => Ok(AdsState::Stop),
            7 => Ok(AdsState::SaveCfg),
            8 => Ok(AdsState::LoadCfg),
            9 => Ok(AdsState::PowerFailure),
            10 => Ok(AdsState::PowerGood),
            11 => Ok(AdsState::Error),
            12 => Ok(AdsState::Shutdown),
            13 => Ok(AdsState::Suspend),
            14 => Ok(AdsState::Resume),
            15 => Ok(AdsState::Config),
            16 => Ok(AdsState::Reconfig),
            other => Err(AdsError::protocol(format!("unknown ADS state {other}"))),
        }
    }
}

impl fmt::Display for AdsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
