//! Error types and the process-wide last-error slot.
//!
//! Every fallible entry point of the C interface records its failure here before returning the
//! failure code, and clears the slot when it succeeds. The slot is shared by the whole process.
//! It is *not* thread-local: concurrent callers must serialize their calls (and the query of the
//! last error) externally.
use std::ffi::{c_char, CString};
use std::sync::{Mutex, MutexGuard};

/// The code returned by fallible C entry points on success.
pub const SUCCESS: i32 = 0;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Classifies every failure the library can report.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Context, image, method or registry construction failed.
    AllocationFailure = 1,
    /// The registry has no method of the requested name.
    UnknownMethod = 2,
    /// The parameter blob does not have the byte size the method expects.
    ParamSizeMismatch = 3,
    /// The image does not belong to the context used for the operation.
    ContextMismatch = 4,
    /// A binding table refers to an image of a different context.
    IncompatibleContext = 5,
    /// A host/device transfer was requested on an image without device storage.
    NoDeviceBacking = 6,
    /// The CPU or GPU execution layer failed.
    BackendFailure = 7,
    /// The requested accessor does not match the element type of the image, or a typed
    /// parameter record is not the one of the method.
    TypeMismatch = 8,
    /// The image is mapped, or not mapped in the way the operation requires.
    MappingConflict = 9,
    /// The binding slot index is beyond what the backend supports.
    BindingOutOfRange = 10,
    /// The method can not compute into an image of these dimensions or this type.
    UnsupportedTarget = 11,
    /// A required handle was null.
    NullHandle = 12,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("parameter size mismatch: expected {expected} bytes, got {actual}")]
    ParamSizeMismatch { expected: usize, actual: usize },

    #[error("context mismatch: {0}")]
    ContextMismatch(&'static str),

    #[error("incompatible context: the image was not created for the context of this table")]
    IncompatibleContext,

    #[error("no device backing: the image only lives in host memory")]
    NoDeviceBacking,

    #[error("backend failure: {0}")]
    BackendFailure(String),

    #[error("type mismatch: the image holds {actual} elements, not {requested}")]
    TypeMismatch {
        requested: &'static str,
        actual: &'static str,
    },

    #[error("type mismatch: the method takes parameters of type {expected}")]
    ParamTypeMismatch { expected: &'static str },

    #[error("mapping conflict: {0}")]
    MappingConflict(&'static str),

    #[error("binding index {index} out of range, the backend supports {slots} slots")]
    BindingOutOfRange { index: usize, slots: usize },

    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),

    #[error("null handle passed for `{0}`")]
    NullHandle(&'static str),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AllocationFailure(_) => ErrorKind::AllocationFailure,
            Error::UnknownMethod(_) => ErrorKind::UnknownMethod,
            Error::ParamSizeMismatch { .. } => ErrorKind::ParamSizeMismatch,
            Error::ContextMismatch(_) => ErrorKind::ContextMismatch,
            Error::IncompatibleContext => ErrorKind::IncompatibleContext,
            Error::NoDeviceBacking => ErrorKind::NoDeviceBacking,
            Error::BackendFailure(_) => ErrorKind::BackendFailure,
            Error::TypeMismatch { .. } | Error::ParamTypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::MappingConflict(_) => ErrorKind::MappingConflict,
            Error::BindingOutOfRange { .. } => ErrorKind::BindingOutOfRange,
            Error::UnsupportedTarget(_) => ErrorKind::UnsupportedTarget,
            Error::NullHandle(_) => ErrorKind::NullHandle,
        }
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Error::BackendFailure(msg.into())
    }

    pub fn allocation(msg: impl Into<String>) -> Self {
        Error::AllocationFailure(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedTarget(msg.into())
    }
}

impl ErrorKind {
    /// The non-zero code reported through the C interface.
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        use ErrorKind::*;
        Some(match code {
            1 => AllocationFailure,
            2 => UnknownMethod,
            3 => ParamSizeMismatch,
            4 => ContextMismatch,
            5 => IncompatibleContext,
            6 => NoDeviceBacking,
            7 => BackendFailure,
            8 => TypeMismatch,
            9 => MappingConflict,
            10 => BindingOutOfRange,
            11 => UnsupportedTarget,
            12 => NullHandle,
            _ => return None,
        })
    }
}

struct LastError {
    kind: ErrorKind,
    message: CString,
}

static LAST_ERROR: Mutex<Option<LastError>> = Mutex::new(None);

fn slot() -> MutexGuard<'static, Option<LastError>> {
    // A panic while holding the lock leaves a perfectly usable `Option` behind.
    LAST_ERROR.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// Record the failure of the most recent fallible call.
pub fn set_last_error(error: &Error) {
    // Interior NUL bytes would truncate the message on the C side anyways.
    let message = error.to_string().replace('\0', " ");
    let message = CString::new(message).unwrap_or_default();
    *slot() = Some(LastError {
        kind: error.kind(),
        message,
    });
}

/// Mark the most recent fallible call as successful.
pub fn clear_last_error() {
    *slot() = None;
}

/// The kind of the last recorded error, if the most recent fallible call failed.
pub fn last_error_kind() -> Option<ErrorKind> {
    slot().as_ref().map(|last| last.kind)
}

/// The message of the last recorded error, if the most recent fallible call failed.
pub fn last_error_message() -> Option<String> {
    slot()
        .as_ref()
        .map(|last| last.message.to_string_lossy().into_owned())
}

/// A pointer to the message of the last error, or null.
///
/// The pointee is owned by the slot. It stays valid until the next fallible call replaces or
/// clears the slot.
pub(crate) fn last_error_ptr() -> *const c_char {
    match slot().as_ref() {
        Some(last) => last.message.as_ptr(),
        None => core::ptr::null(),
    }
}

/// Record the outcome of a fallible call in the slot and pass it through.
pub(crate) fn record<T>(result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => clear_last_error(),
        Err(err) => {
            log::debug!("recording error: {}", err);
            set_last_error(err);
        }
    }

    result
}
