//! Stable error taxonomy shared by every subsystem.
//!
//! The numeric ranges below are part of the crate's ABI: once assigned, a
//! discriminant must never be renumbered. [`ErrorCode::to_str`] is a total
//! function — codes outside the defined ranges collapse to the sentinel
//! `"OS_ERROR_???"` rather than panicking.

use core::fmt;

/// Coarse classification of an error. Drives whether a caller may retry and
/// whether the failing object/context changed state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller mistake: bad argument, bad handle, out of bounds. Never retried.
    Argument,
    /// Bulk-IO budget (dataport or caller buffer) exceeded.
    Capacity,
    /// Object/context not in a state that permits the operation.
    State,
    /// Caller may retry; no state change from the caller's perspective.
    Transient,
    /// Underlying resource reported a failure; object state updated.
    External,
    /// A cryptographic primitive refused. Object enters a terminal error state.
    CryptoAbort,
    /// Algorithm or configuration not provided by this instance.
    Unsupported,
    /// The call completed normally.
    Success,
}

macro_rules! error_codes {
    ($( $variant:ident = $value:expr => $name:literal, $kind:ident );+ $(;)?) => {
        /// Closed set of result codes, partitioned into disjoint numeric
        /// ranges by subsystem. `Success` is `0`.
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        #[repr(i32)]
        pub enum ErrorCode {
            $( $variant = $value, )+
        }

        impl ErrorCode {
            /// Stable, non-empty string for every defined code.
            pub const fn to_str(self) -> &'static str {
                match self {
                    $( ErrorCode::$variant => $name, )+
                }
            }

            /// Coarse classification used to decide retry/backoff policy.
            pub const fn kind(self) -> ErrorKind {
                match self {
                    $( ErrorCode::$variant => ErrorKind::$kind, )+
                }
            }

            /// Total conversion from the raw wire value. Unknown values map
            /// to [`RawErrorCode::Unknown`], never panicking.
            pub const fn from_raw(value: i32) -> RawErrorCode {
                match value {
                    $( $value => RawErrorCode::Known(ErrorCode::$variant), )+
                    other => RawErrorCode::Unknown(other),
                }
            }
        }
    };
}

/// Result of parsing a raw `i32` error code off the wire: either a known,
/// named [`ErrorCode`] or an out-of-range value preserved for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawErrorCode {
    Known(ErrorCode),
    Unknown(i32),
}

impl RawErrorCode {
    /// Total string conversion: known codes get their stable name, unknown
    /// codes get the sentinel `"OS_ERROR_???"`.
    pub const fn to_str(self) -> &'static str {
        match self {
            RawErrorCode::Known(code) => code.to_str(),
            RawErrorCode::Unknown(_) => "OS_ERROR_???",
        }
    }
}

error_codes! {
    Success = 0 => "OS_SUCCESS", Success;

    // Generic range [-26, -1]
    Generic = -1 => "OS_ERROR_GENERIC", State;
    InvalidParameter = -2 => "OS_ERROR_INVALID_PARAMETER", Argument;
    InvalidName = -3 => "OS_ERROR_INVALID_NAME", Argument;
    InvalidHandle = -4 => "OS_ERROR_INVALID_HANDLE", Argument;
    OutOfBounds = -5 => "OS_ERROR_OUT_OF_BOUNDS", Argument;
    InsufficientSpace = -6 => "OS_ERROR_INSUFFICIENT_SPACE", Capacity;
    BufferTooSmall = -7 => "OS_ERROR_BUFFER_TOO_SMALL", Capacity;
    BufferFull = -8 => "OS_ERROR_BUFFER_FULL", Capacity;
    BufferEmpty = -9 => "OS_ERROR_BUFFER_EMPTY", Capacity;
    InvalidState = -10 => "OS_ERROR_INVALID_STATE", State;
    OperationDenied = -11 => "OS_ERROR_OPERATION_DENIED", State;
    NotInitialized = -12 => "OS_ERROR_NOT_INITIALIZED", State;
    TryAgain = -13 => "OS_ERROR_TRY_AGAIN", Transient;
    WouldBlock = -14 => "OS_ERROR_WOULD_BLOCK", Transient;
    InProgress = -15 => "OS_ERROR_IN_PROGRESS", Transient;
    Timeout = -16 => "OS_ERROR_TIMEOUT", Transient;
    Io = -17 => "OS_ERROR_IO", External;
    ConnectionClosed = -18 => "OS_ERROR_CONNECTION_CLOSED", External;
    ConnectionReset = -19 => "OS_ERROR_CONNECTION_RESET", External;
    Aborted = -20 => "OS_ERROR_ABORTED", CryptoAbort;
    NotSupported = -21 => "OS_ERROR_NOT_SUPPORTED", Unsupported;
    NotImplemented = -22 => "OS_ERROR_NOT_IMPLEMENTED", Unsupported;
    NotFound = -23 => "OS_ERROR_NOT_FOUND", Argument;
    Exists = -24 => "OS_ERROR_EXISTS", Argument;
    AccessDenied = -25 => "OS_ERROR_ACCESS_DENIED", State;
    OutOfMemory = -26 => "OS_ERROR_OUT_OF_MEMORY", External;

    // Configuration range [-1002, -1000]
    CfgNotFound = -1000 => "OS_ERROR_CONFIG_NOT_FOUND", Argument;
    CfgTypeMismatch = -1001 => "OS_ERROR_CONFIG_TYPE_MISMATCH", Argument;
    CfgDomainExists = -1002 => "OS_ERROR_CONFIG_DOMAIN_EXISTS", Argument;

    // Filesystem range [-1122, -1100]
    FsOperationDenied = -1100 => "OS_ERROR_FS_OPERATION_DENIED", State;
    FsInvalidPartitionMode = -1101 => "OS_ERROR_FS_INVALID_PARTITION_MODE", Argument;
    FsPartitionId = -1102 => "OS_ERROR_FS_PARTITION_ID", Argument;
    FsOpen = -1103 => "OS_ERROR_FS_OPEN", External;
    FsOffset = -1104 => "OS_ERROR_FS_OFFSET", Argument;
    FsReadFailed = -1105 => "OS_ERROR_FS_READ", External;
    FsWriteFailed = -1106 => "OS_ERROR_FS_WRITE", External;
    FsNotMounted = -1107 => "OS_ERROR_FS_NOT_MOUNTED", State;
    FsAlreadyMounted = -1108 => "OS_ERROR_FS_ALREADY_MOUNTED", State;
    FsTooManyOpenFiles = -1109 => "OS_ERROR_FS_TOO_MANY_OPEN_FILES", Capacity;
    FsNoFreeHandle = -1110 => "OS_ERROR_FS_NO_FREE_HANDLE", Capacity;

    // Device range [-1202, -1200]
    DeviceInvalidBlock = -1200 => "OS_ERROR_DEVICE_INVALID_BLOCK", Argument;
    DeviceIo = -1201 => "OS_ERROR_DEVICE_IO", External;
    DeviceNotReady = -1202 => "OS_ERROR_DEVICE_NOT_READY", State;

    // Network range [-1316, -1300]
    NetworkNotInitialized = -1300 => "OS_ERROR_NETWORK_NOT_INITIALIZED", State;
    NetworkHostNotFound = -1301 => "OS_ERROR_NETWORK_HOST_NOT_FOUND", External;
    NetworkConnRefused = -1302 => "OS_ERROR_NETWORK_CONN_REFUSED", External;
    NetworkConnNone = -1303 => "OS_ERROR_NETWORK_CONN_NONE", State;
    NetworkConnShutdown = -1304 => "OS_ERROR_NETWORK_CONN_SHUTDOWN", State;
    NetworkAddrInUse = -1305 => "OS_ERROR_NETWORK_ADDR_IN_USE", External;
    NetworkUnreachable = -1306 => "OS_ERROR_NETWORK_UNREACHABLE", External;
    NetworkInvalidAddress = -1307 => "OS_ERROR_NETWORK_INVALID_ADDRESS", Argument;
    NetworkFatal = -1316 => "OS_ERROR_NETWORK_FATAL", External;
}

/// The error type every public operation in this crate returns. Carries a
/// stable [`ErrorCode`], a human-readable message, and an optional boxed
/// cause. No public function panics; every failure path returns one of
/// these instead.
#[derive(Debug)]
pub struct CoreError {
    code: ErrorCode,
    message: String,
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CoreError {
    /// Construct a new error with a stable code and a diagnostic message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach a lower-level cause, preserving the original error for
    /// diagnostics while keeping the stable `code` as the primary signal.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code.to_str(), self.code as i32, self.message)
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Convenience constructors for the codes used most often by calling code.
impl CoreError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameter, message)
    }

    pub fn invalid_handle(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidHandle, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotSupported, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Aborted, message)
    }

    pub fn insufficient_space(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientSpace, message)
    }
}

pub type Result<T> = core::result::Result<T, CoreError>;
