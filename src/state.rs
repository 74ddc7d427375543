//! The stream state machine: states, the allowed-transition table, and the
//! events that drive it. Every transition the engine performs goes through
//! [`transition`], so "every transition belongs to the table" is a
//! property of this one function rather than something enforced ad hoc at
//! each call site.

use crate::{Direction, Error, Result};

/// `SND_PCM_STATE_xxx`-equivalent constants.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    Open,
    Setup,
    Prepared,
    Running,
    XRun,
    Draining,
    Paused,
    Suspended,
}

/// The operations that drive state transitions, per the component design's
/// table. `Pause(true)`/`Pause(false)` are the two directions of `pause`;
/// `Xrun` is the driver-initiated event, never called by an application
/// directly.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    Prepare,
    Start,
    Stop,
    Drain,
    Pause(bool),
    Reset,
    Xrun,
}

/// Apply `event` to `from` for a stream running in `direction`, returning
/// the new state or `-EBADFD` if the table has no entry. `Drain` branches
/// on direction per the component design: playback goes to `Draining`
/// (must wait for the ring to empty), capture drops straight to `Setup`
/// (there is nothing to flush on a capture stream).
pub fn transition(from: State, event: Event, direction: Direction) -> Result<State> {
    use Event::*;
    use State::*;

    let bad = || Err(Error::bad_state("illegal state transition"));

    match (from, event) {
        (Setup, Prepare) => Ok(Prepared),

        (Prepared, Prepare) => Ok(Prepared),
        (Prepared, Start) => Ok(Running),
        (Prepared, Stop) => Ok(Setup),
        (Prepared, Drain) => Ok(Setup),
        (Prepared, Reset) => Ok(Prepared),

        (Running, Stop) => Ok(Setup),
        (Running, Drain) => Ok(if direction == Direction::Playback { Draining } else { Setup }),
        (Running, Pause(true)) => Ok(Paused),
        (Running, Reset) => Ok(Prepared),
        (Running, Xrun) => Ok(XRun),

        (Draining, Stop) => Ok(Setup),
        (Draining, Pause(true)) => Ok(Paused),
        (Draining, Reset) => Ok(Prepared),
        (Draining, Xrun) => Ok(XRun),

        (Paused, Stop) => Ok(Setup),
        (Paused, Pause(false)) => Ok(Running),
        (Paused, Reset) => Ok(Prepared),

        (XRun, Prepare) => Ok(Prepared),
        (XRun, Stop) => Ok(Setup),

        _ => bad(),
    }
}

impl State {
    /// Transfer calls accept `Prepared`/`Running` for playback; capture
    /// additionally accepts `Draining` (it may still be flushing residual
    /// frames while new ones arrive on a linked handle's schedule).
    pub fn accepts_transfer(self, direction: Direction) -> bool {
        match self {
            State::Prepared | State::Running => true,
            State::Draining => direction == Direction::Capture,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_accepts_nothing_but_hw_params_sets_setup_externally() {
        for ev in [Event::Prepare, Event::Start, Event::Stop, Event::Drain, Event::Reset] {
            assert!(transition(State::Open, ev, Direction::Playback).is_err());
        }
    }

    #[test]
    fn playback_drain_goes_to_draining_capture_drain_goes_to_setup() {
        assert_eq!(transition(State::Running, Event::Drain, Direction::Playback).unwrap(), State::Draining);
        assert_eq!(transition(State::Running, Event::Drain, Direction::Capture).unwrap(), State::Setup);
    }

    #[test]
    fn xrun_from_running_or_draining_only() {
        assert_eq!(transition(State::Running, Event::Xrun, Direction::Playback).unwrap(), State::XRun);
        assert_eq!(transition(State::Draining, Event::Xrun, Direction::Playback).unwrap(), State::XRun);
        assert!(transition(State::Paused, Event::Xrun, Direction::Playback).is_err());
    }

    #[test]
    fn illegal_transitions_return_bad_state() {
        let err = transition(State::Paused, Event::Start, Direction::Playback).unwrap_err();
        assert_eq!(err.code(), -libc::EBADFD);
    }
}
