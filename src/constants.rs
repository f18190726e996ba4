//! ADS/AMS protocol constants based on the Beckhoff specification
//!
//! These constants are derived from the official ADS documentation:
//! - The AMS/TCP transport header is 6 bytes, the AMS addressing header
//!   is a fixed 32 bytes
//! - All multi-byte integers on the wire are little-endian

// ============================================================================
// Frame Size Constants
// ============================================================================

/// AMS/TCP transport header length
/// Format: Reserved(2) + Length(4) = 6 bytes
/// The Length field counts everything that follows the transport header,
/// i.e. AMS header + command payload
pub const AMS_TCP_HEADER_LEN: usize = 6;

/// AMS addressing header length
/// Format: Target NetId(6) + Target Port(2) + Source NetId(6) + Source Port(2)
///         + Command Id(2) + State Flags(2) + Data Length(4) + Error Code(4)
///         + Invoke Id(4) = 32 bytes
pub const AMS_HEADER_LEN: usize = 32;

/// AMS NetId length in bytes (4 address octets + 2 extension octets)
pub const AMS_NETID_LEN: usize = 6;

// ============================================================================
// TCP Defaults
// ============================================================================

/// Default AMS/TCP port of the remote AMS router (0xBF02)
pub const DEFAULT_TCP_PORT: u16 = 48898;

/// Default response timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default delay between connect retries in milliseconds
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 2000;

// ============================================================================
// Index Groups
// ============================================================================

/// Read/write PLC memory area (%M fields)
pub const IDXGRP_PLC_RW_M: u32 = 0x4020;

/// Get a u32 symbol handle for the name carried in the write data.
/// Index offset is 0. Used with a read-write transaction.
pub const IDXGRP_SYM_HNDBYNAME: u32 = 0xF003;

/// Read/write a symbol value by handle. The handle is the index offset.
pub const IDXGRP_SYM_VALBYHND: u32 = 0xF005;

/// Release a previously acquired symbol handle. Index offset is 0.
pub const IDXGRP_SYM_RELEASEHND: u32 = 0xF006;

/// Read/write the process image of the physical inputs (%I fields)
pub const IDXGRP_IO_RW_INPUTS: u32 = 0xF020;

/// Read/write the process image of the physical outputs (%Q fields)
pub const IDXGRP_IO_RW_OUTPUTS: u32 = 0xF030;

/// Combine multiple independent reads into one transaction.
/// The write payload is a list of sub-request blocks.
pub const IDXGRP_SUMUP_READ: u32 = 0xF080;

/// Combine multiple independent writes into one transaction
pub const IDXGRP_SUMUP_WRITE: u32 = 0xF081;

/// Combine multiple independent write+reads into one transaction
pub const IDXGRP_SUMUP_READWRITE: u32 = 0xF082;

// ============================================================================
// Sum-up Sub-request Sizes
// ============================================================================

/// Metadata block size of one sum-up read sub-request:
/// index group(4) + index offset(4) + length(4)
pub const SUMUP_READ_ITEM_LEN: usize = 12;

/// Metadata block size of one sum-up write sub-request:
/// index group(4) + index offset(4) + length(4), data follows separately
pub const SUMUP_WRITE_ITEM_LEN: usize = 12;

/// Metadata block size of one sum-up read-write sub-request:
/// index group(4) + index offset(4) + read length(4) + write length(4)
pub const SUMUP_READWRITE_ITEM_LEN: usize = 16;

/// Per-item result block of a sum-up read response: error code(4)
pub const SUMUP_RESULT_LEN: usize = 4;

/// Per-item result block of a sum-up read-write response:
/// error code(4) + returned length(4)
pub const SUMUP_RESULT_EX_LEN: usize = 8;

/// Default maximum number of sub-items per sum-up wire transaction.
/// TwinCAT routers start rejecting very large composite requests; 500 keeps
/// a full transaction comfortably below the router's frame limit.
pub const DEFAULT_MAX_SUMUP_ITEMS: usize = 500;

// ============================================================================
// Device Info
// ============================================================================

/// Fixed device name field length in a ReadDeviceInfo response
pub const DEVICE_NAME_LEN: usize = 16;
