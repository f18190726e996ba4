//! Core error types and result handling
//!
//! Two layers of errors exist in this crate:
//! - [`AdsError`] is the crate-level error type carried by [`AdsResult`],
//!   covering connection, I/O, timeout, protocol and configuration failures.
//! - [`AdsReturnCode`] is the exhaustive table of 32-bit ADS return codes as
//!   transmitted on the wire, plus a small set of codes synthesized locally
//!   that never appear on the wire.
//!
//! Return-code decoding is an exact lookup: a code that matches no known
//! constant yields [`AdsReturnCode::Unknown`] carrying the raw value. It is
//! never treated as "no error".

use thiserror::Error;

/// Result type for voltage_ads operations
pub type AdsResult<T> = std::result::Result<T, AdsError>;

/// ADS client errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdsError {
    /// Connection errors (connect failed, peer closed the socket)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Protocol-level errors (malformed envelope, structural mismatch)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Response invoke id does not match the request just sent.
    /// The session is desynchronized and must be torn down.
    #[error("Invoke id mismatch: sent {sent}, received {received}")]
    InvokeIdMismatch { sent: u32, received: u32 },

    /// Remote device rejected the request with an ADS return code
    #[error("ADS device error: {0}")]
    Device(AdsReturnCode),

    /// Remote run state does not allow data exchange
    #[error("Invalid remote run state: {0}")]
    InvalidState(String),

    /// Invalid data (bad net id string, short value buffer, ...)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not supported (string/decimal variable types, notifications)
    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl From<std::io::Error> for AdsError {
    fn from(err: std::io::Error) -> Self {
        AdsError::Io(err.to_string())
    }
}

// Helper methods for creating errors
impl AdsError {
    pub fn connection(msg: impl Into<String>) -> Self {
        AdsError::Connection(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        AdsError::Io(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        AdsError::Timeout(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        AdsError::Protocol(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        AdsError::InvalidData(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        AdsError::Config(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        AdsError::NotSupported(msg.into())
    }

    /// Check if this error invalidates the connection.
    ///
    /// Transport, correlation and run-state failures force a full reconnect
    /// with handle re-resolution; device-level return codes do not.
    pub fn needs_reconnect(&self) -> bool {
        matches!(
            self,
            AdsError::Connection(_)
                | AdsError::NotConnected
                | AdsError::Io(_)
                | AdsError::Timeout(_)
                | AdsError::Protocol(_)
                | AdsError::InvokeIdMismatch { .. }
                | AdsError::InvalidState(_)
        )
    }

    /// The per-item return code equivalent of this error, used when an outer
    /// transaction failure has to be propagated into every sub-item result.
    pub fn as_return_code(&self) -> AdsReturnCode {
        match self {
            AdsError::Device(code) => *code,
            AdsError::Timeout(_) => AdsReturnCode::ClientSyncTimeout,
            AdsError::Protocol(_) | AdsError::InvokeIdMismatch { .. } => {
                AdsReturnCode::ProtocolViolation
            }
            AdsError::Connection(_) | AdsError::NotConnected | AdsError::Io(_) => {
                AdsReturnCode::PortNotConnected
            }
            _ => AdsReturnCode::Undefined,
        }
    }
}

/// Declares the return-code table once and derives the enum, the exact
/// wire lookup, the reverse `code()` mapping and the description text.
/// Codes in the `local` block are synthesized by this client and are never
/// matched by `from_wire`.
macro_rules! ads_return_codes {
    (
        wire { $( $wname:ident = $wcode:literal, $wdesc:literal; )+ }
        local { $( $lname:ident = $lcode:literal, $ldesc:literal; )+ }
    ) => {
        /// ADS return code as carried in headers and per-item results
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum AdsReturnCode {
            $( $wname, )+
            $( $lname, )+
            /// Code received on the wire that matches no known constant.
            /// Carries the raw numeric value; never equal to `NoError`.
            Unknown(u32),
        }

        impl AdsReturnCode {
            /// Exact lookup by numeric wire code. Total: a lookup miss
            /// yields [`AdsReturnCode::Unknown`] rather than defaulting to
            /// any defined value.
            pub fn from_wire(raw: u32) -> Self {
                match raw {
                    $( $wcode => Self::$wname, )+
                    other => Self::Unknown(other),
                }
            }

            /// Numeric code of this value
            pub fn code(&self) -> u32 {
                match self {
                    $( Self::$wname => $wcode, )+
                    $( Self::$lname => $lcode, )+
                    Self::Unknown(raw) => *raw,
                }
            }

            /// Human-readable description
            pub fn description(&self) -> &'static str {
                match self {
                    $( Self::$wname => $wdesc, )+
                    $( Self::$lname => $ldesc, )+
                    Self::Unknown(_) => "unknown ADS return code",
                }
            }

            /// All wire-defined codes (excludes local codes and `Unknown`)
            pub const WIRE_CODES: &'static [AdsReturnCode] = &[ $( Self::$wname, )+ ];
        }
    };
}

ads_return_codes! {
    wire {
        // Global AMS error codes
        NoError = 0x0000, "No error";
        InternalError = 0x0001, "Internal error";
        NoRealtime = 0x0002, "No real-time";
        AllocationLockedMemory = 0x0003, "Allocation locked - memory error";
        MailboxFull = 0x0004, "Mailbox full - ADS message could not be sent";
        WrongReceiveHmsg = 0x0005, "Wrong receive HMSG";
        TargetPortNotFound = 0x0006, "Target port not found - ADS server not started";
        TargetMachineNotFound = 0x0007, "Target machine not found - missing AMS route";
        UnknownCommandId = 0x0008, "Unknown command id";
        BadTaskId = 0x0009, "Invalid task id";
        NoIo = 0x000A, "No IO";
        UnknownAmsCommand = 0x000B, "Unknown AMS command";
        Win32Error = 0x000C, "Win32 error";
        PortNotConnected = 0x000D, "Port not connected";
        InvalidAmsLength = 0x000E, "Invalid AMS length";
        InvalidAmsNetId = 0x000F, "Invalid AMS net id";
        LowInstallationLevel = 0x0010, "Installation level too low";
        NoDebugging = 0x0011, "No debugging available";
        PortDisabled = 0x0012, "Port disabled - system service not started";
        PortAlreadyConnected = 0x0013, "Port already connected";
        AmsSyncWin32Error = 0x0014, "AMS sync Win32 error";
        AmsSyncTimeout = 0x0015, "AMS sync timeout";
        AmsSyncAmsError = 0x0016, "AMS sync error";
        AmsSyncNoIndexMap = 0x0017, "No index map for AMS sync available";
        InvalidAmsPort = 0x0018, "Invalid AMS port";
        NoMemory = 0x0019, "No memory";
        TcpSendError = 0x001A, "TCP send error";
        HostUnreachable = 0x001B, "Host unreachable";
        InvalidAmsFragment = 0x001C, "Invalid AMS fragment";
        TlsSendError = 0x001D, "TLS send error - secure ADS connection failed";
        AccessDenied = 0x001E, "Access denied - secure ADS access denied";

        // Router error codes
        RouterNoLockedMemory = 0x0500, "Router: no locked memory";
        RouterResizeMemory = 0x0501, "Router: memory size could not be changed";
        RouterMailboxFull = 0x0502, "Router: mailbox full";
        RouterDebugBoxFull = 0x0503, "Router: debug mailbox full";
        RouterUnknownPortType = 0x0504, "Router: port type is unknown";
        RouterNotInitialized = 0x0505, "Router: router is not initialized";
        RouterPortAlreadyInUse = 0x0506, "Router: port number already in use";
        RouterNotRegistered = 0x0507, "Router: port is not registered";
        RouterNoMoreQueues = 0x0508, "Router: maximum number of ports reached";
        RouterInvalidPort = 0x0509, "Router: port is invalid";
        RouterNotActivated = 0x050A, "Router: router is not active";
        RouterFragmentBoxFull = 0x050B, "Router: mailbox full for fragmented messages";
        RouterFragmentTimeout = 0x050C, "Router: fragment timeout";
        RouterToBeRemoved = 0x050D, "Router: port is removed";

        // General ADS device error codes
        DeviceError = 0x0700, "General device error";
        DeviceServiceNotSupported = 0x0701, "Service is not supported by the server";
        DeviceInvalidGroup = 0x0702, "Invalid index group";
        DeviceInvalidOffset = 0x0703, "Invalid index offset";
        DeviceInvalidAccess = 0x0704, "Reading or writing not permitted";
        DeviceInvalidSize = 0x0705, "Parameter size not correct";
        DeviceInvalidData = 0x0706, "Invalid data values";
        DeviceNotReady = 0x0707, "Device is not ready to operate";
        DeviceBusy = 0x0708, "Device is busy";
        DeviceInvalidContext = 0x0709, "Invalid operating system context";
        DeviceNoMemory = 0x070A, "Insufficient memory";
        DeviceInvalidParam = 0x070B, "Invalid parameter values";
        DeviceNotFound = 0x070C, "Not found (files, ...)";
        DeviceSyntaxError = 0x070D, "Syntax error in file or command";
        DeviceIncompatible = 0x070E, "Objects do not match";
        DeviceExists = 0x070F, "Object already exists";
        DeviceSymbolNotFound = 0x0710, "Symbol not found";
        DeviceSymbolVersionInvalid = 0x0711, "Invalid symbol version - create a new handle";
        DeviceInvalidState = 0x0712, "Device is in an invalid state";
        DeviceTransModeNotSupported = 0x0713, "AdsTransMode not supported";
        DeviceNotifyHandleInvalid = 0x0714, "Notification handle is invalid";
        DeviceClientUnknown = 0x0715, "Notification client not registered";
        DeviceNoMoreHandles = 0x0716, "No further handle available";
        DeviceInvalidWatchSize = 0x0717, "Notification size too large";
        DeviceNotInitialized = 0x0718, "Device not initialized";
        DeviceTimeout = 0x0719, "Device has a timeout";
        DeviceNoInterface = 0x071A, "Interface query failed";
        DeviceInvalidInterface = 0x071B, "Wrong interface requested";
        DeviceInvalidClassId = 0x071C, "Class id is invalid";
        DeviceInvalidObjectId = 0x071D, "Object id is invalid";
        DeviceRequestPending = 0x071E, "Request pending";
        DeviceRequestAborted = 0x071F, "Request is aborted";
        DeviceSignalWarning = 0x0720, "Signal warning";
        DeviceInvalidArrayIndex = 0x0721, "Invalid array index";
        DeviceSymbolNotActive = 0x0722, "Symbol not active - release handle and try again";
        DeviceAccessDenied = 0x0723, "Access denied";
        DeviceLicenseNotFound = 0x0724, "Missing license";
        DeviceLicenseExpired = 0x0725, "License expired";
        DeviceLicenseExceeded = 0x0726, "License exceeded";
        DeviceLicenseInvalid = 0x0727, "License invalid";
        DeviceLicenseSystemId = 0x0728, "Invalid system id in license";
        DeviceLicenseNoTimeLimit = 0x0729, "License not limited in time";
        DeviceLicenseFutureIssue = 0x072A, "License issue time in the future";
        DeviceLicenseTimeTooLong = 0x072B, "License time period too long";
        DeviceException = 0x072C, "Exception in device specific code";
        DeviceLicenseDuplicated = 0x072D, "License file read twice";
        DeviceSignatureInvalid = 0x072E, "Invalid signature";
        DeviceCertificateInvalid = 0x072F, "Invalid certificate";

        // ADS client error codes
        ClientError = 0x0740, "Client error";
        ClientInvalidParam = 0x0741, "Service contains an invalid parameter";
        ClientListEmpty = 0x0742, "Polling list is empty";
        ClientVariableInUse = 0x0743, "Var connection already in use";
        ClientDuplicateInvokeId = 0x0744, "Invoke id already in use";
        ClientSyncTimeout = 0x0745, "Timeout elapsed - remote terminal not responding";
        ClientWin32Error = 0x0746, "Error in Win32 subsystem";
        ClientTimeoutInvalid = 0x0747, "Invalid client timeout value";
        ClientPortNotOpen = 0x0748, "ADS port not opened";
        ClientNoAmsAddr = 0x0749, "No AMS address";
        ClientSyncInternal = 0x0750, "Internal error in ADS sync";
        ClientAddHash = 0x0751, "Hash table overflow";
        ClientRemoveHash = 0x0752, "Key not found in hash";
        ClientNoMoreSymbols = 0x0753, "No more symbols in cache";
        ClientSyncResInvalid = 0x0754, "Invalid response received";
        ClientSyncPortLocked = 0x0755, "Sync port is locked";
    }
    local {
        Undefined = 0xFFFF_FFFF, "Undefined error state (local, never on the wire)";
        ProtocolViolation = 0xFFFF_FFFE, "Malformed or desynchronized response (local)";
        PartialSumupFailure = 0xFFFF_FFFD, "One or more sub-requests of a sum-up transaction failed (local)";
    }
}

impl AdsReturnCode {
    /// Check for success
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, AdsReturnCode::NoError)
    }

    /// Convert into a result, mapping any failure code to [`AdsError::Device`]
    pub fn into_result(self) -> AdsResult<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(AdsError::Device(self))
        }
    }
}

impl std::fmt::Display for AdsReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04X} ({})", self.code(), self.description())
    }
}
