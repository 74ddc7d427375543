//! `backend::null`: an in-process ring-buffer back-end with no real
//! hardware behind it, in the spirit of alsa-lib's `null`/`hw` plugins.
//! Useful on its own as a discard/silence-generating sink or source, and
//! as the back-end this crate's own tests drive — `advance_hw` stands in
//! for "the hardware interrupt fired and consumed/produced N frames",
//! letting tests exercise xrun and blocking-wait behaviour without a
//! real device or a sleeping thread.

use crate::areas::{areas_from_buf, areas_from_bufs, ChannelArea};
use crate::backend::{Backend, BackendKind, LinkToken, PollDescriptor};
use crate::format::Format;
use crate::hw_params::{Geometry, HwConstraints};
use crate::interval::IntervalParam;
use crate::mask::{Access, Mask};
use crate::poll::PollFlags;
use crate::sw_params::SwParams;
use crate::{Direction, Error, Result};
use std::os::unix::io::RawFd;

/// What a [`NullBackend`] advertises before any restriction. The defaults
/// are deliberately generous (a real device's constraints would be much
/// narrower) so that most `hw_params` scenarios can run against it
/// unmodified.
#[derive(Debug, Clone)]
pub struct Spec {
    pub channels: (u32, u32),
    pub rate: (u32, u32),
    pub formats: Vec<Format>,
    pub period_frames: (u32, u32),
    pub buffer_frames: (u32, u32),
}

impl Default for Spec {
    fn default() -> Self {
        Spec {
            channels: (1, 8),
            rate: (8_000, 192_000),
            formats: vec![Format::S16LE, Format::S24LE, Format::S32LE, Format::U8, Format::FloatLE],
            period_frames: (32, 8192),
            buffer_frames: (64, 1 << 20),
        }
    }
}

/// A back-end with no driver behind it: `hw_params` allocates a plain
/// `Vec<u8>` ring and `avail_update` reports whatever `advance_hw` last
/// told it, rather than querying real hardware.
#[derive(Debug)]
pub struct NullBackend {
    direction: Direction,
    spec: Spec,
    geometry: Option<Geometry>,
    ring: Vec<u8>,
    areas: Vec<ChannelArea>,
    appl_ptr: u64,
    hw_ptr: u64,
    xrun: bool,
    link: Option<LinkToken>,
    evfd: RawFd,
}

impl NullBackend {
    pub fn new(direction: Direction, spec: Spec) -> Self {
        let evfd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        NullBackend {
            direction,
            spec,
            geometry: None,
            ring: Vec::new(),
            areas: Vec::new(),
            appl_ptr: 0,
            hw_ptr: 0,
            xrun: false,
            link: None,
            evfd,
        }
    }

    /// Assign this back-end a link token so two `NullBackend`s can be
    /// reported as joinable by [`crate::linked::LinkedGroup`].
    pub fn set_link_token(&mut self, token: LinkToken) {
        self.link = Some(token);
    }

    /// Simulate `frames` worth of hardware progress: for playback, the
    /// device "plays" `frames` more of what was written; for capture, it
    /// "captures" `frames` more for the application to read. Advancing
    /// past what the application has committed is an xrun, exactly as a
    /// real device running ahead of (or behind) the application would be.
    pub fn advance_hw(&mut self, frames: u32) {
        let buffer_size = self.buffer_size() as u64;
        let new_hw = self.hw_ptr + frames as u64;
        match self.direction {
            Direction::Playback => {
                if new_hw > self.appl_ptr {
                    self.hw_ptr = self.appl_ptr;
                    self.xrun = true;
                } else {
                    self.hw_ptr = new_hw;
                }
            }
            Direction::Capture => {
                if new_hw > self.appl_ptr + buffer_size {
                    self.hw_ptr = self.appl_ptr + buffer_size;
                    self.xrun = true;
                } else {
                    self.hw_ptr = new_hw;
                }
            }
        }
        self.signal();
    }

    pub fn force_xrun(&mut self) {
        self.xrun = true;
        self.signal();
    }

    fn signal(&self) {
        let one: u64 = 1;
        unsafe {
            libc::write(self.evfd, &one as *const u64 as *const libc::c_void, 8);
        }
    }
}

impl Drop for NullBackend {
    fn drop(&mut self) {
        if self.evfd >= 0 {
            unsafe { libc::close(self.evfd) };
        }
    }
}

impl Backend for NullBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Null
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn direction(&self) -> Direction {
        self.direction
    }

    fn hw_constraints(&self) -> HwConstraints {
        let mut c = HwConstraints::any();
        c.format = Mask::from_values(&self.spec.formats);
        c.intervals.get_mut(IntervalParam::Channels).try_set_minmax(self.spec.channels.0, self.spec.channels.1);
        c.intervals.get_mut(IntervalParam::Rate).try_set_minmax(self.spec.rate.0, self.spec.rate.1);
        c.intervals.get_mut(IntervalParam::PeriodSize).try_set_minmax(self.spec.period_frames.0, self.spec.period_frames.1);
        c.intervals.get_mut(IntervalParam::BufferSize).try_set_minmax(self.spec.buffer_frames.0, self.spec.buffer_frames.1);
        c
    }

    fn hw_params(&mut self, geometry: &Geometry) -> Result<()> {
        self.ring = vec![0u8; geometry.buffer_bytes() as usize];
        self.areas = match geometry.access {
            Access::RwInterleaved | Access::MmapInterleaved | Access::MmapComplex => {
                areas_from_buf(geometry.channels, geometry.sample_bits, self.ring.as_mut_ptr())
            }
            Access::RwNonInterleaved | Access::MmapNonInterleaved => {
                let stride = (geometry.buffer_size * geometry.sample_bits / 8) as usize;
                let base = self.ring.as_mut_ptr();
                let bufs: Vec<*mut u8> = (0..geometry.channels as usize).map(|c| unsafe { base.add(c * stride) }).collect();
                areas_from_bufs(geometry.sample_bits, &bufs)
            }
        };
        self.geometry = Some(*geometry);
        self.appl_ptr = 0;
        self.hw_ptr = 0;
        self.xrun = false;
        Ok(())
    }

    fn hw_free(&mut self) -> Result<()> {
        self.ring = Vec::new();
        self.areas = Vec::new();
        self.geometry = None;
        Ok(())
    }

    fn min_align(&self) -> u32 {
        1
    }

    fn sw_params(&mut self, _params: &SwParams) -> Result<()> {
        Ok(())
    }

    fn poll_descriptor(&self) -> PollDescriptor {
        let events = match self.direction {
            Direction::Playback => PollFlags::POLLOUT,
            Direction::Capture => PollFlags::POLLIN,
        };
        PollDescriptor { fd: self.evfd, events }
    }

    fn link_descriptor(&self) -> Option<LinkToken> {
        self.link
    }

    fn close(&mut self) -> Result<()> {
        self.hw_free()
    }

    fn avail_update(&mut self) -> Result<u64> {
        if self.xrun {
            return Err(Error::Pipe);
        }
        Ok(self.hw_ptr)
    }

    fn areas(&self) -> &[ChannelArea] {
        &self.areas
    }

    fn buffer_size(&self) -> u32 {
        self.geometry.map(|g| g.buffer_size).unwrap_or(0)
    }

    fn commit(&mut self, appl_ptr: u64) -> Result<()> {
        self.appl_ptr = appl_ptr;
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        self.xrun = false;
        self.hw_ptr = 0;
        self.appl_ptr = 0;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        Ok(())
    }

    fn pause(&mut self, _enable: bool) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_params::HwParams;
    use crate::ValueOr;

    fn committed_geometry(backend: &NullBackend) -> Geometry {
        let mut hw = HwParams::any();
        hw.refine(&backend.hw_constraints()).unwrap();
        hw.set_format(Format::S16LE).unwrap();
        hw.set_access(Access::RwInterleaved).unwrap();
        hw.set_channels(2).unwrap();
        hw.set_rate(44_100, ValueOr::Nearest).unwrap();
        hw.set_period_size(1024, ValueOr::Nearest).unwrap();
        hw.set_buffer_size(4096).unwrap();
        hw.choose_point(&backend.hw_constraints()).unwrap();
        hw.to_geometry().unwrap()
    }

    #[test]
    fn hw_params_allocates_a_ring_sized_to_the_geometry() {
        let mut be = NullBackend::new(Direction::Playback, Spec::default());
        let geom = committed_geometry(&be);
        be.hw_params(&geom).unwrap();
        assert_eq!(be.ring.len(), geom.buffer_bytes() as usize);
        assert_eq!(be.areas().len(), geom.channels as usize);
    }

    #[test]
    fn advancing_hw_past_appl_ptr_flags_an_underrun() {
        let mut be = NullBackend::new(Direction::Playback, Spec::default());
        let geom = committed_geometry(&be);
        be.hw_params(&geom).unwrap();
        be.commit(1000).unwrap();
        be.advance_hw(500);
        assert_eq!(be.avail_update().unwrap(), 500);
        be.advance_hw(600);
        assert!(be.avail_update().is_err());
    }

    #[test]
    fn prepare_clears_an_xrun() {
        let mut be = NullBackend::new(Direction::Playback, Spec::default());
        let geom = committed_geometry(&be);
        be.hw_params(&geom).unwrap();
        be.force_xrun();
        assert!(be.avail_update().is_err());
        be.prepare().unwrap();
        assert_eq!(be.avail_update().unwrap(), 0);
    }

    #[test]
    fn capture_overrun_when_hw_outruns_the_buffer() {
        let mut be = NullBackend::new(Direction::Capture, Spec::default());
        let geom = committed_geometry(&be);
        be.hw_params(&geom).unwrap();
        be.advance_hw(geom.buffer_size + 1);
        assert!(be.avail_update().is_err());
    }
}
