//! Management error types
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use core::fmt::{self, Debug};

/// Management operation errors, generic over the underlying radio error
#[derive(Debug, Clone, PartialEq)]
pub enum MgmtError<E> {
    /// A scan is already attached to this interface
    AlreadyInProgress,

    /// Frame could not be built (buffer / length limits)
    ResourceExhausted,

    /// Wrapper for underlying radio errors
    Device(E),

    /// Operation cancelled by an external request
    Cancelled,

    /// Association refused or not answered in time
    AccessDenied,

    /// Parameters may not change while associated
    Busy,

    /// Malformed or out of range request payload
    InvalidArgument,

    /// Nothing to do (ie. disassociate while unassociated)
    AlreadyDone,
}

pub const EIO: i32 = 5;
pub const EACCES: i32 = 13;
pub const EBUSY: i32 = 16;
pub const EINVAL: i32 = 22;
pub const ENOBUFS: i32 = 105;
pub const EALREADY: i32 = 114;
pub const ECANCELED: i32 = 125;

impl <E> MgmtError<E> {
    /// Negative errno value reported through the request surface
    pub fn errno(&self) -> i32 {
        use MgmtError::*;

        match self {
            AlreadyInProgress | AlreadyDone => -EALREADY,
            ResourceExhausted => -ENOBUFS,
            Device(_) => -EIO,
            Cancelled => -ECANCELED,
            AccessDenied => -EACCES,
            Busy => -EBUSY,
            InvalidArgument => -EINVAL,
        }
    }
}

impl <E: Debug> fmt::Display for MgmtError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MgmtError::AlreadyInProgress => write!(f, "scan already in progress"),
            MgmtError::ResourceExhausted => write!(f, "unable to allocate frame"),
            MgmtError::Device(e) => write!(f, "radio error: {:?}", e),
            MgmtError::Cancelled => write!(f, "operation cancelled"),
            MgmtError::AccessDenied => write!(f, "association denied"),
            MgmtError::Busy => write!(f, "interface busy (associated)"),
            MgmtError::InvalidArgument => write!(f, "invalid argument"),
            MgmtError::AlreadyDone => write!(f, "already done"),
        }
    }
}

impl <E: Debug> std::error::Error for MgmtError<E> {}
