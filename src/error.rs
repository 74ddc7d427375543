//! The engine's error taxonomy.
//!
//! Every variant maps 1:1 onto the POSIX-style negative error codes named in
//! the external interfaces: `-EINVAL`, `-EBADFD`, `-EPIPE`, `-EAGAIN`,
//! `-ENOSYS`, `-ENOMEM`, `-ENOENT`, `-ENXIO`. Programming-error preconditions
//! are not represented here at all: per the error-handling design, those
//! abort via assertion in the engine itself rather than becoming a `Result`.

use std::fmt;

pub type Result<T> = ::std::result::Result<T, Error>;

/// An engine error, with a POSIX errno-style numeric code available via
/// [`Error::code`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad argument, or an empty configuration space.
    #[error("invalid argument{}", context(.0))]
    Invalid(Option<&'static str>),

    /// The handle is not in a state that permits this operation.
    #[error("wrong state for this operation{}", context(.0))]
    BadState(Option<&'static str>),

    /// An under-run (playback) or over-run (capture) occurred.
    #[error("stream in XRUN state")]
    Pipe,

    /// The call would block and the handle is in non-blocking mode.
    #[error("operation would block")]
    WouldBlock,

    /// The back-end does not implement the requested operation.
    #[error("operation not supported by this back-end{}", context(.0))]
    NotSupported(Option<&'static str>),

    /// Memory allocation failure.
    #[error("out of memory")]
    NoMemory,

    /// The configuration collaborator did not find a device by that name.
    #[error("no such device{}", context(.0))]
    NoSuchDevice(Option<&'static str>),

    /// The configuration collaborator found the device but not the back-end
    /// open symbol (e.g. `_open_<type>` was missing).
    #[error("missing back-end entry point{}", context(.0))]
    NoSuchEntryPoint(Option<&'static str>),

    /// A transport-level error surfaced unchanged from the back-end.
    #[error("back-end error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

fn context(c: &Option<&'static str>) -> String {
    match c {
        Some(s) => format!(" ({s})"),
        None => String::new(),
    }
}

impl Error {
    /// The classic negative-errno code for this error, for callers that
    /// need numeric parity with the C ABI this design descends from.
    pub fn code(&self) -> i32 {
        match self {
            Error::Invalid(_) => -libc::EINVAL,
            Error::BadState(_) => -libc::EBADFD,
            Error::Pipe => -libc::EPIPE,
            Error::WouldBlock => -libc::EAGAIN,
            Error::NotSupported(_) => -libc::ENOSYS,
            Error::NoMemory => -libc::ENOMEM,
            Error::NoSuchDevice(_) => -libc::ENOENT,
            Error::NoSuchEntryPoint(_) => -libc::ENXIO,
            Error::Backend(_) => -libc::EIO,
        }
    }

    pub fn invalid(ctx: &'static str) -> Error {
        Error::Invalid(Some(ctx))
    }

    pub fn bad_state(ctx: &'static str) -> Error {
        Error::BadState(Some(ctx))
    }

    pub fn not_supported(ctx: &'static str) -> Error {
        Error::NotSupported(Some(ctx))
    }
}

impl From<Error> for i32 {
    fn from(e: Error) -> i32 {
        e.code()
    }
}

/// Helper so call sites reporting a raw negative code (as a back-end would)
/// get a typed [`Error`] back. Positive/zero codes are a programming error.
pub fn from_code(code: i32) -> Error {
    match -code {
        c if c == libc::EINVAL => Error::Invalid(None),
        c if c == libc::EBADFD => Error::BadState(None),
        c if c == libc::EPIPE => Error::Pipe,
        c if c == libc::EAGAIN => Error::WouldBlock,
        c if c == libc::ENOSYS => Error::NotSupported(None),
        c if c == libc::ENOMEM => Error::NoMemory,
        c if c == libc::ENOENT => Error::NoSuchDevice(None),
        c if c == libc::ENXIO => Error::NoSuchEntryPoint(None),
        _ => Error::Backend(Box::new(RawCode(code))),
    }
}

#[derive(Debug)]
struct RawCode(i32);

impl fmt::Display for RawCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "raw error code {}", self.0)
    }
}

impl std::error::Error for RawCode {}
