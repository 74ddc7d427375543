//! A back-end-agnostic user-space PCM streaming engine.
//!
//! This crate implements the pieces of the ALSA PCM model that live above
//! the kernel driver and below the application: `hw_params` configuration-
//! space refinement, the stream state machine, and the ring-buffer
//! transfer engine (`writei`/`readi`, mmap, xrun handling). It does not
//! talk to a sound card itself — a [`backend::Backend`] supplies that, and
//! [`backend_null::NullBackend`] is the one back-end shipped here, useful
//! on its own and as the thing this crate's tests drive.
//!
//! The module layout mirrors the component design: [`mask`]/[`interval`]
//! are the two primitive value kinds a configuration space is built from;
//! [`hw_params`] is the solver built on top of them; [`state`] is the
//! transition table every lifecycle call goes through; [`areas`] is the
//! channel-area copy/silence machinery the transfer engine calls into;
//! [`pcm`] is the handle tying all of it together.

pub mod areas;
pub mod backend;
pub mod backend_null;
mod error;
pub mod format;
pub mod hw_params;
pub mod interval;
pub mod linked;
pub mod mask;
pub mod pcm;
pub mod poll;
pub mod status;
pub mod sw_params;
pub mod async_handler;

mod state;
pub use state::{Event, State};

pub use error::{Error, Result};
pub use pcm::Pcm;

/// Frame count or frame offset; signed so that rewind amounts and `-EPIPE`-
/// style sentinel returns from the C ABI this design descends from share
/// one numeric type.
pub type Frames = i64;

/// A stream's direction, replacing ALSA's separate `PLAYBACK`/`CAPTURE` and
/// `INPUT`/`OUTPUT` vocabularies with a single enum used everywhere in this
/// crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Playback,
    Capture,
}

/// Used to restrict hw parameters. If the submitted value is unavailable,
/// which direction should the solver search for an admissible one?
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueOr {
    /// The value set is the submitted value, or less.
    Less = -1,
    /// The value set is the submitted value, or the nearest.
    Nearest = 0,
    /// The value set is the submitted value, or greater.
    Greater = 1,
}
