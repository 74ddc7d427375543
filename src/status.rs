//! The immutable status snapshot value and its timestamp type.

use crate::Frames;
use crate::state::State;

/// A `libc::timespec`-shaped timestamp, independent of the kernel struct
/// the teacher's `pcm_direct::Status` reads directly off mmap'd driver
/// memory — here it is a plain value type any back-end can fill in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct TimeStamp {
    pub seconds: i64,
    pub nanos: i32,
}

/// An immutable value snapshot of a handle's transfer state, per the data
/// model. Unlike `avail`/`delay` queried individually, every field here
/// was read at the same instant.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: State,
    pub trigger_timestamp: TimeStamp,
    pub now_timestamp: TimeStamp,
    pub delay: Frames,
    pub avail: Frames,
    pub avail_max: Frames,
}
