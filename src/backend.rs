//! The back-end dispatch vtable: the operation trait a concrete back-end
//! (hardware, plugin chain, null sink, shared memory) implements so the
//! refinement engine, state machine, and transfer engine above stay
//! back-end agnostic. Modelled in Rust as a trait plus an enum tag for the
//! back-end kinds that must be introspected, per the design notes — not
//! as inheritance.

use crate::areas::ChannelArea;
use crate::hw_params::{Geometry, HwConstraints};
use crate::sw_params::SwParams;
use crate::{Direction, Result};

/// Tags the kind of back-end behind a [`Backend`] trait object, for the
/// cases (diagnostics, `dump`) where the engine needs to tell them apart
/// without downcasting.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Hardware,
    Plugin,
    Null,
    Shared,
}

/// A single handle for another handle to join in a [linked
/// group](crate::linked::LinkedGroup). Back-ends that cannot surface one
/// make `link_descriptor` return `None`, which the engine reports as
/// `-ENOSYS`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LinkToken(pub u64);

/// One per handle; `events` is `POLLOUT` for playback, `POLLIN` for
/// capture, per the external interfaces.
#[derive(Debug, Copy, Clone)]
pub struct PollDescriptor {
    pub fd: std::os::unix::io::RawFd,
    pub events: crate::poll::PollFlags,
}

/// The operation table a concrete back-end exports. Slow ops (this trait's
/// non-hot-path methods) may allocate and are called rarely; fast ops
/// (`avail_update`, `commit`, `hw_ptr`, `start`/`stop`/...) are the hot
/// path and must not block except where the engine has explicitly chosen
/// to wait.
///
/// `op_arg`/`fast_op_arg` from the original two-vtable-plus-opaque-pointer
/// design collapse here into whatever private fields a concrete type
/// behind `dyn Backend` carries — a plugin back-end forwarding to a slave
/// handle simply holds `Box<dyn Backend>` for its slave instead of an
/// opaque pointer plus a second vtable lookup.
pub trait Backend: std::fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// Lets tests downcast to a concrete back-end (e.g. `NullBackend`) to
    /// drive test-only hooks like simulated hardware progress.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;

    // -- slow ops --

    fn direction(&self) -> Direction;

    /// What this back-end can offer, before any application restriction.
    fn hw_constraints(&self) -> HwConstraints;

    /// Accept a fully single-pointed configuration space and prepare the
    /// back-end's own resources (ring buffer, driver handle, ...) to match.
    fn hw_params(&mut self, geometry: &Geometry) -> Result<()>;

    /// Release whatever `hw_params` allocated.
    fn hw_free(&mut self) -> Result<()>;

    /// The smallest `xfer_align` granularity this back-end can honour;
    /// `sw_params` validation requires `xfer_align % min_align == 0`.
    fn min_align(&self) -> u32;

    fn sw_params(&mut self, params: &SwParams) -> Result<()>;

    fn poll_descriptor(&self) -> PollDescriptor;

    fn link_descriptor(&self) -> Option<LinkToken>;

    fn dump(&self) -> String {
        format!("{self:?}")
    }

    fn close(&mut self) -> Result<()>;

    // -- fast ops --

    /// Ask the back-end to republish its pointers and return the current
    /// raw (non-modulo) hardware pointer. Idempotent: calling it twice in
    /// a row with nothing having happened in between returns the same
    /// value. Returns `Err` (an xrun) if the back-end detected an
    /// under-run/over-run since the last call.
    fn avail_update(&mut self) -> Result<u64>;

    /// The channel areas of the back-end's own ring buffer, valid for the
    /// handle's lifetime. The transfer engine's `mmap_begin` computes a
    /// window into these; `writei`/`readi` copy the caller's buffer
    /// through [`crate::areas::area_copy`] into/out of that window.
    fn areas(&self) -> &[ChannelArea];

    fn buffer_size(&self) -> u32;

    /// Notify the back-end that `appl_ptr` now stands at this raw value,
    /// after the engine advanced it. A hardware back-end would write this
    /// into the kernel's `appl_ptr` cell; the null back-end just records it.
    fn commit(&mut self, appl_ptr: u64) -> Result<()>;

    fn prepare(&mut self) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn drain(&mut self) -> Result<()>;
    fn pause(&mut self, enable: bool) -> Result<()>;
}
