//! Protocol enumerations.
//!
//! Every enum converts from its wire value with [`TryFrom<i32>`]; values
//! outside the declared set are rejected rather than silently mapped.

use std::fmt;

use crate::error::ProtoError;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $value ),+
        }

        impl $name {
            /// Numeric value carried on the wire.
            #[must_use]
            pub fn as_i32(self) -> i32 {
                self as i32
            }

            /// Protocol name of the value.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $label ),+
                }
            }
        }

        impl TryFrom<i32> for $name {
            type Error = ProtoError;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $( v if v == $value => Ok(Self::$variant), )+
                    _ => Err(ProtoError::UnknownEnumValue {
                        name: stringify!($name),
                        value,
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// How a message is authenticated.
    AuthType {
        /// HMAC-SHA1 over the command bytes.
        Hmac = 1 => "HMACAUTH",
        /// PIN carried in the clear, used for lock/unlock/erase.
        Pin = 2 => "PINAUTH",
        /// Device-initiated status, not authenticated.
        UnsolicitedStatus = 3 => "UNSOLICITEDSTATUS",
    }
}

wire_enum! {
    /// Command message types. Each request is even; its response is one less.
    MessageType {
        /// Response to [`MessageType::Get`].
        GetResponse = 1 => "GET_RESPONSE",
        /// Read a value.
        Get = 2 => "GET",
        /// Response to [`MessageType::Put`].
        PutResponse = 3 => "PUT_RESPONSE",
        /// Store a value.
        Put = 4 => "PUT",
        /// Response to [`MessageType::Delete`].
        DeleteResponse = 5 => "DELETE_RESPONSE",
        /// Remove a value.
        Delete = 6 => "DELETE",
        /// Response to [`MessageType::GetNext`].
        GetNextResponse = 7 => "GETNEXT_RESPONSE",
        /// Read the entry after a key.
        GetNext = 8 => "GETNEXT",
        /// Response to [`MessageType::GetPrevious`].
        GetPreviousResponse = 9 => "GETPREVIOUS_RESPONSE",
        /// Read the entry before a key.
        GetPrevious = 10 => "GETPREVIOUS",
        /// Response to [`MessageType::GetKeyRange`].
        GetKeyRangeResponse = 11 => "GETKEYRANGE_RESPONSE",
        /// List keys in a range.
        GetKeyRange = 12 => "GETKEYRANGE",
        /// Response to [`MessageType::GetVersion`].
        GetVersionResponse = 15 => "GETVERSION_RESPONSE",
        /// Read only the version of a key.
        GetVersion = 16 => "GETVERSION",
        /// Response to [`MessageType::Setup`].
        SetupResponse = 21 => "SETUP_RESPONSE",
        /// Device setup.
        Setup = 22 => "SETUP",
        /// Response to [`MessageType::GetLog`].
        GetLogResponse = 23 => "GETLOG_RESPONSE",
        /// Read device logs.
        GetLog = 24 => "GETLOG",
        /// Response to [`MessageType::Security`].
        SecurityResponse = 25 => "SECURITY_RESPONSE",
        /// Change ACLs or PINs.
        Security = 26 => "SECURITY",
        /// Response to [`MessageType::PeerToPeerPush`].
        PeerToPeerPushResponse = 27 => "PEER2PEERPUSH_RESPONSE",
        /// Push keys to a peer device.
        PeerToPeerPush = 28 => "PEER2PEERPUSH",
        /// Response to [`MessageType::Noop`].
        NoopResponse = 29 => "NOOP_RESPONSE",
        /// Round trip without side effects.
        Noop = 30 => "NOOP",
        /// Response to [`MessageType::FlushAllData`].
        FlushAllDataResponse = 31 => "FLUSHALLDATA_RESPONSE",
        /// Flush write-back data to media.
        FlushAllData = 32 => "FLUSHALLDATA",
        /// Response to [`MessageType::PinOp`].
        PinOpResponse = 35 => "PINOP_RESPONSE",
        /// PIN-authenticated operation.
        PinOp = 36 => "PINOP",
        /// Response to [`MessageType::MediaScan`].
        MediaScanResponse = 37 => "MEDIASCAN_RESPONSE",
        /// Scan media in a key range.
        MediaScan = 38 => "MEDIASCAN",
        /// Response to [`MessageType::MediaOptimize`].
        MediaOptimizeResponse = 39 => "MEDIAOPTIMIZE_RESPONSE",
        /// Optimize media in a key range.
        MediaOptimize = 40 => "MEDIAOPTIMIZE",
        /// Response to [`MessageType::StartBatch`].
        StartBatchResponse = 41 => "START_BATCH_RESPONSE",
        /// Open a batch.
        StartBatch = 42 => "START_BATCH",
        /// Response to [`MessageType::EndBatch`].
        EndBatchResponse = 43 => "END_BATCH_RESPONSE",
        /// Commit a batch.
        EndBatch = 44 => "END_BATCH",
        /// Response to [`MessageType::AbortBatch`].
        AbortBatchResponse = 45 => "ABORT_BATCH_RESPONSE",
        /// Discard a batch.
        AbortBatch = 46 => "ABORT_BATCH",
        /// Response to [`MessageType::SetPowerLevel`].
        SetPowerLevelResponse = 47 => "SET_POWER_LEVEL_RESPONSE",
        /// Change the device power level.
        SetPowerLevel = 48 => "SET_POWER_LEVEL",
    }
}

impl MessageType {
    /// Whether this is a request type (even wire value).
    #[must_use]
    pub fn is_request(self) -> bool {
        self.as_i32() % 2 == 0
    }

    /// The response type paired with this request, if any.
    #[must_use]
    pub fn response(self) -> Option<Self> {
        if self.is_request() {
            Self::try_from(self.as_i32() - 1).ok()
        } else {
            None
        }
    }
}

wire_enum! {
    /// Outcome of one command.
    StatusCode {
        /// The command was never attempted.
        NotAttempted = 0 => "NOT_ATTEMPTED",
        /// The command succeeded.
        Success = 1 => "SUCCESS",
        /// The request HMAC did not verify.
        HmacFailure = 2 => "HMAC_FAILURE",
        /// The identity lacks permission.
        NotAuthorized = 3 => "NOT_AUTHORIZED",
        /// The cluster version did not match.
        VersionFailure = 4 => "VERSION_FAILURE",
        /// The device failed internally.
        InternalError = 5 => "INTERNAL_ERROR",
        /// The header was missing.
        HeaderRequired = 6 => "HEADER_REQUIRED",
        /// The key does not exist.
        NotFound = 7 => "NOT_FOUND",
        /// The stored version did not match `dbVersion`.
        VersionMismatch = 8 => "VERSION_MISMATCH",
        /// The device is busy; retry later.
        ServiceBusy = 9 => "SERVICE_BUSY",
        /// The command timed out in the device queue.
        Expired = 10 => "EXPIRED",
        /// A recoverable data error occurred.
        DataError = 11 => "DATA_ERROR",
        /// Data on the media is permanently damaged.
        PermDataError = 12 => "PERM_DATA_ERROR",
        /// A peer-to-peer connection failed.
        RemoteConnectionError = 13 => "REMOTE_CONNECTION_ERROR",
        /// The device is full.
        NoSpace = 14 => "NO_SPACE",
        /// The requested HMAC algorithm is unknown.
        NoSuchHmacAlgorithm = 15 => "NO_SUCH_HMAC_ALGORITHM",
        /// The request was malformed.
        InvalidRequest = 16 => "INVALID_REQUEST",
        /// Nested peer operations failed.
        NestedOperationErrors = 17 => "NESTED_OPERATION_ERRORS",
        /// The device is locked.
        DeviceLocked = 18 => "DEVICE_LOCKED",
        /// Unlock was requested on an unlocked device.
        DeviceAlreadyUnlocked = 19 => "DEVICE_ALREADY_UNLOCKED",
        /// The device closed the connection.
        ConnectionTerminated = 20 => "CONNECTION_TERMINATED",
        /// The batch was rejected.
        InvalidBatch = 21 => "INVALID_BATCH",
        /// The device is hibernating.
        Hibernate = 22 => "HIBERNATE",
        /// The device is shutting down.
        Shutdown = 23 => "SHUTDOWN",
    }
}

impl StatusCode {
    /// Whether the code reports success.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

wire_enum! {
    /// Integrity algorithm a tag was computed with.
    Algorithm {
        /// SHA-1.
        Sha1 = 1 => "SHA1",
        /// SHA-2.
        Sha2 = 2 => "SHA2",
        /// SHA-3.
        Sha3 = 3 => "SHA3",
        /// CRC-32C.
        Crc32c = 4 => "CRC32C",
        /// CRC-64.
        Crc64 = 5 => "CRC64",
        /// CRC-32.
        Crc32 = 6 => "CRC32",
    }
}

wire_enum! {
    /// Durability mode for writes.
    Synchronization {
        /// Persist before acknowledging.
        WriteThrough = 1 => "WRITETHROUGH",
        /// Acknowledge before persisting.
        WriteBack = 2 => "WRITEBACK",
        /// Persist this and all earlier write-back data.
        Flush = 3 => "FLUSH",
    }
}

wire_enum! {
    /// Scheduling priority.
    Priority {
        /// Lowest.
        Lowest = 1 => "LOWEST",
        /// Lower than normal.
        Lower = 3 => "LOWER",
        /// Default.
        Normal = 5 => "NORMAL",
        /// Higher than normal.
        Higher = 7 => "HIGHER",
        /// Highest.
        Highest = 9 => "HIGHEST",
    }
}

wire_enum! {
    /// Log sections a GETLOG request may ask for.
    LogType {
        /// Utilization figures.
        Utilizations = 0 => "UTILIZATIONS",
        /// Temperatures.
        Temperatures = 1 => "TEMPERATURES",
        /// Capacity.
        Capacities = 2 => "CAPACITIES",
        /// Configuration.
        Configuration = 3 => "CONFIGURATION",
        /// Statistics.
        Statistics = 4 => "STATISTICS",
        /// Message log.
        Messages = 5 => "MESSAGES",
        /// Protocol limits.
        Limits = 6 => "LIMITS",
        /// Vendor device log.
        Device = 7 => "DEVICE",
    }
}

wire_enum! {
    /// SECURITY command variants.
    SecurityOpType {
        /// Replace ACLs.
        Acl = 1 => "ACL_SECURITYOP",
        /// Change the erase PIN.
        ErasePin = 2 => "ERASE_PIN_SECURITYOP",
        /// Change the lock PIN.
        LockPin = 3 => "LOCK_PIN_SECURITYOP",
    }
}

wire_enum! {
    /// PINOP command variants.
    PinOpType {
        /// Unlock the device.
        Unlock = 1 => "UNLOCK_PINOP",
        /// Lock the device.
        Lock = 2 => "LOCK_PINOP",
        /// Erase all data.
        Erase = 3 => "ERASE_PINOP",
        /// Cryptographically erase all data.
        SecureErase = 4 => "SECURE_ERASE_PINOP",
    }
}

wire_enum! {
    /// Device power levels.
    PowerLevel {
        /// Normal operation.
        Operational = 1 => "OPERATIONAL",
        /// Low power, commands rejected.
        Hibernate = 2 => "HIBERNATE",
        /// Power down.
        Shutdown = 3 => "SHUTDOWN",
        /// Simulated failure.
        Fail = 4 => "FAIL",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_pair_requests_with_responses() {
        assert_eq!(MessageType::Get.response(), Some(MessageType::GetResponse));
        assert_eq!(
            MessageType::SetPowerLevel.response(),
            Some(MessageType::SetPowerLevelResponse)
        );
        assert_eq!(MessageType::GetResponse.response(), None);
        assert!(MessageType::Noop.is_request());
        assert!(!MessageType::NoopResponse.is_request());
    }

    #[test]
    fn test_should_reject_unknown_enum_values() {
        assert_eq!(
            Algorithm::try_from(9),
            Err(ProtoError::UnknownEnumValue {
                name: "Algorithm",
                value: 9
            })
        );
        assert!(Synchronization::try_from(0).is_err());
        assert!(MessageType::try_from(13).is_err());
    }

    #[test]
    fn test_should_convert_status_codes() {
        assert_eq!(StatusCode::try_from(7).unwrap(), StatusCode::NotFound);
        assert_eq!(StatusCode::Shutdown.as_i32(), 23);
        assert!(StatusCode::Success.is_success());
        assert_eq!(StatusCode::NoSpace.to_string(), "NO_SPACE");
    }

    #[test]
    fn test_should_use_sparse_priority_values() {
        assert_eq!(Priority::Normal.as_i32(), 5);
        assert_eq!(Priority::try_from(9).unwrap(), Priority::Highest);
        assert!(Priority::try_from(2).is_err());
    }
}
