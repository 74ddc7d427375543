//! The `Pcm` handle: the data model's central type, tying a back-end to
//! its negotiated geometry, software parameters, state, and the
//! ring-buffer transfer engine that moves frames through it.

use crate::areas::{area_copy, areas_from_buf, areas_from_bufs, ChannelArea};
use crate::backend::{Backend, LinkToken, PollDescriptor};
use crate::hw_params::{Geometry, HwParams};
use crate::state::{self, Event, State};
use crate::status::{StatusSnapshot, TimeStamp};
use crate::sw_params::SwParams;
use crate::{Direction, Error, Frames, Result};
use std::time::SystemTime;

/// A single open stream. Opening does not by itself allocate any
/// transfer-time resources — those come from `hw_params`, mirroring the
/// component design's lifecycle (`Open` has nothing to free but a
/// negotiated `Setup` does).
pub struct Pcm {
    backend: Box<dyn Backend>,
    direction: Direction,
    state: State,
    geometry: Option<Geometry>,
    sw: Option<SwParams>,
    /// The engine's own copy of the application pointer: a raw, never
    /// wrapped, monotonically increasing frame count. The only mutation of
    /// transfer state an application performs is advancing this.
    appl_ptr: u64,
    nonblock: bool,
    avail_max: u32,
    trigger_timestamp: TimeStamp,
}

impl std::fmt::Debug for Pcm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pcm")
            .field("direction", &self.direction)
            .field("state", &self.state)
            .field("geometry", &self.geometry)
            .finish_non_exhaustive()
    }
}

fn now() -> TimeStamp {
    match SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => TimeStamp { seconds: d.as_secs() as i64, nanos: d.subsec_nanos() as i32 },
        Err(_) => TimeStamp::default(),
    }
}

/// A generous default boundary: the largest multiple of `buffer_size` that
/// fits in a `u32`, per the component design's "practically never wraps"
/// sizing of the appl_ptr/hw_ptr modulus.
fn default_boundary(buffer_size: u32) -> u32 {
    if buffer_size == 0 {
        return 0;
    }
    (u32::MAX / buffer_size) * buffer_size
}

impl Pcm {
    /// `open`: wrap a back-end, starting in `Open` with nothing negotiated.
    pub fn open(backend: Box<dyn Backend>) -> Pcm {
        let direction = backend.direction();
        Pcm {
            backend,
            direction,
            state: State::Open,
            geometry: None,
            sw: None,
            appl_ptr: 0,
            nonblock: false,
            avail_max: 0,
            trigger_timestamp: TimeStamp::default(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn geometry(&self) -> Result<Geometry> {
        self.geometry.ok_or_else(|| Error::bad_state("hw_params has not been committed"))
    }

    pub fn set_nonblock(&mut self, nonblock: bool) {
        self.nonblock = nonblock;
    }

    pub fn poll_descriptor(&self) -> PollDescriptor {
        self.backend.poll_descriptor()
    }

    pub fn link_descriptor(&self) -> Option<LinkToken> {
        self.backend.link_descriptor()
    }

    // -- hw_params --

    /// `hw_params_any`: the universal configuration space, refined against
    /// what the back-end advertises.
    pub fn hw_params_any(&self) -> Result<HwParams> {
        let mut p = HwParams::any();
        p.refine(&self.backend.hw_constraints())?;
        Ok(p)
    }

    /// `hw_refine`: intersect `params` with the back-end's constraints
    /// without committing anything.
    pub fn hw_refine(&self, params: &mut HwParams) -> Result<()> {
        params.refine(&self.backend.hw_constraints())
    }

    /// `hw_params`: fix `params` to a single point in priority order and
    /// commit it to the back-end. On success the handle moves to `Setup`
    /// directly — `hw_params` sits outside the `Event` table entirely,
    /// since it is the one lifecycle call legal from `Open`.
    pub fn hw_params(&mut self, params: &mut HwParams) -> Result<Geometry> {
        let constraints = self.backend.hw_constraints();
        params.choose_point(&constraints)?;
        let geometry = params.to_geometry()?;
        self.backend.hw_params(&geometry)?;
        self.geometry = Some(geometry);
        self.sw = Some(SwParams::defaults(geometry.buffer_size, default_boundary(geometry.buffer_size)));
        self.appl_ptr = 0;
        self.avail_max = 0;
        self.state = State::Setup;
        tracing::debug!(?geometry, direction = ?self.direction, "hw_params committed");
        Ok(geometry)
    }

    /// `hw_free`: release the back-end's resources and drop back to
    /// `Open`. Legal from `Setup` or `Prepared`, mirroring `hw_params`
    /// itself sitting outside the `Event` table.
    pub fn hw_free(&mut self) -> Result<()> {
        if !matches!(self.state, State::Setup | State::Prepared) {
            return Err(Error::bad_state("hw_free requires Setup or Prepared"));
        }
        self.backend.hw_free()?;
        self.geometry = None;
        self.sw = None;
        self.state = State::Open;
        Ok(())
    }

    // -- sw_params --

    pub fn sw_params_current(&self) -> Result<SwParams> {
        self.sw.clone().ok_or_else(|| Error::bad_state("hw_params has not been committed"))
    }

    pub fn sw_params(&mut self, params: SwParams) -> Result<()> {
        let geometry = self.geometry()?;
        params.validate(geometry.buffer_size, self.backend.min_align())?;
        self.backend.sw_params(&params)?;
        self.sw = Some(params);
        Ok(())
    }

    // -- lifecycle --

    fn drive(&mut self, event: Event) -> Result<()> {
        self.state = state::transition(self.state, event, self.direction)?;
        Ok(())
    }

    pub fn prepare(&mut self) -> Result<()> {
        self.backend.prepare()?;
        self.appl_ptr = 0;
        self.avail_max = 0;
        self.drive(Event::Prepare)
    }

    pub fn start(&mut self) -> Result<()> {
        self.drive(Event::Start)?;
        self.backend.start()?;
        self.trigger_timestamp = now();
        tracing::trace!(direction = ?self.direction, "stream started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.drive(Event::Stop)?;
        self.backend.stop()
    }

    pub fn drain(&mut self) -> Result<()> {
        self.drive(Event::Drain)?;
        self.backend.drain()
    }

    pub fn pause(&mut self, enable: bool) -> Result<()> {
        self.drive(Event::Pause(enable))?;
        self.backend.pause(enable)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.drive(Event::Reset)?;
        self.appl_ptr = 0;
        self.avail_max = 0;
        Ok(())
    }

    // -- avail / delay / status --

    /// `avail_update`: ask the back-end to republish its pointers, surface
    /// `-EPIPE` and transition to `XRun` if it detected an under/overrun
    /// since the last call, otherwise return the frame count available to
    /// transfer in this handle's direction.
    pub fn avail_update(&mut self) -> Result<Frames> {
        let hw_ptr = match self.backend.avail_update() {
            Ok(v) => v,
            Err(Error::Pipe) => {
                self.drive(Event::Xrun)?;
                tracing::warn!(direction = ?self.direction, appl_ptr = self.appl_ptr, "xrun detected");
                return Err(Error::Pipe);
            }
            Err(e) => return Err(e),
        };
        let geometry = self.geometry()?;
        let avail = match self.direction {
            Direction::Playback => (geometry.buffer_size as u64).saturating_sub(self.appl_ptr.saturating_sub(hw_ptr)),
            Direction::Capture => hw_ptr.saturating_sub(self.appl_ptr),
        };
        let avail = avail.min(geometry.buffer_size as u64) as u32;
        self.avail_max = self.avail_max.max(avail);
        Ok(avail as Frames)
    }

    pub fn delay(&mut self) -> Result<Frames> {
        let geometry = self.geometry()?;
        let avail = self.avail_update()?;
        let delay = match self.direction {
            Direction::Playback => geometry.buffer_size as Frames - avail,
            Direction::Capture => avail,
        };
        Ok(delay)
    }

    pub fn status(&mut self) -> Result<StatusSnapshot> {
        let avail = self.avail_update()?;
        let delay = self.delay()?;
        let snapshot = StatusSnapshot {
            state: self.state,
            trigger_timestamp: self.trigger_timestamp,
            now_timestamp: now(),
            delay,
            avail,
            avail_max: self.avail_max as Frames,
        };
        self.avail_max = 0;
        Ok(snapshot)
    }

    // -- transfer engine --

    fn maybe_auto_start(&mut self) -> Result<()> {
        if self.direction != Direction::Playback || self.state != State::Prepared {
            return Ok(());
        }
        let Some(sw) = &self.sw else { return Ok(()) };
        if self.appl_ptr >= sw.start_threshold as u64 {
            self.start()?;
        }
        Ok(())
    }

    /// Pre-silence the unwritten region ahead of `appl_ptr` once the
    /// amount of data still queued for playback drops to
    /// `silence_threshold`, so the back-end plays silence rather than
    /// stale samples if the application falls behind.
    fn apply_silencing(&mut self) -> Result<()> {
        if self.direction != Direction::Playback {
            return Ok(());
        }
        let Some(sw) = self.sw.clone() else { return Ok(()) };
        if sw.silence_size == 0 {
            return Ok(());
        }
        let geometry = self.geometry()?;
        let avail = self.avail_update()?.max(0) as u32;
        let queued = geometry.buffer_size.saturating_sub(avail);
        if queued > sw.silence_threshold {
            return Ok(());
        }
        let need = sw.silence_size.min(geometry.buffer_size);
        let start = (self.appl_ptr % geometry.buffer_size as u64) as u32;
        silence_wrapping(self.backend.areas(), geometry.buffer_size, start, need, geometry.format);
        Ok(())
    }

    /// Shared transfer loop for `writei`/`writen`/`readi`/`readn`. `user`
    /// is a per-channel area description of the caller's buffer(s);
    /// `frames` is how many frames the caller wants moved.
    fn transfer(&mut self, user: &[ChannelArea], frames: u32) -> Result<u32> {
        if !self.state.accepts_transfer(self.direction) {
            return Err(Error::bad_state("transfer called outside Prepared/Running"));
        }
        let sw = self.sw_params_current()?;
        let xfer_align = sw.xfer_align.max(1);
        let frames = if frames >= xfer_align { frames - frames % xfer_align } else { frames };
        if frames == 0 {
            return Ok(0);
        }

        let capture = self.direction == Direction::Capture;
        let mut moved = 0u32;
        while moved < frames {
            if self.direction == Direction::Playback {
                self.apply_silencing()?;
            }
            let avail = match self.avail_update() {
                Ok(v) => v.max(0) as u32,
                Err(e) => {
                    if moved > 0 {
                        return Ok(moved);
                    }
                    return Err(e);
                }
            };
            if avail == 0 {
                if self.nonblock {
                    if moved > 0 {
                        return Ok(moved);
                    }
                    return Err(Error::WouldBlock);
                }
                self.wait(-1)?;
                continue;
            }

            let geometry = self.geometry()?;
            let remaining = frames - moved;
            let mut chunk = remaining.min(avail);
            if chunk >= xfer_align {
                chunk -= chunk % xfer_align;
            }
            let offset = (self.appl_ptr % geometry.buffer_size as u64) as u32;
            let window = (geometry.buffer_size - offset).min(chunk);

            let backend_areas = self.backend.areas().to_vec();
            for (ch, user_area) in user.iter().enumerate() {
                let Some(back_area) = backend_areas.get(ch) else { break };
                if capture {
                    area_copy(user_area, moved, back_area, offset, window, geometry.format);
                } else {
                    area_copy(back_area, offset, user_area, moved, window, geometry.format);
                }
            }

            self.appl_ptr += window as u64;
            self.backend.commit(self.appl_ptr)?;
            moved += window;

            self.maybe_auto_start()?;
        }
        Ok(moved)
    }

    fn wait(&mut self, timeout_ms: i32) -> Result<()> {
        crate::poll::wait_one(self.backend.poll_descriptor(), timeout_ms)?;
        Ok(())
    }

    /// Write `frames` frames from an interleaved buffer at `buf`.
    ///
    /// # Safety
    /// `buf` must be valid for `frames * frame_bytes` bytes.
    pub unsafe fn writei(&mut self, buf: *const u8, frames: u32) -> Result<u32> {
        let geometry = self.geometry()?;
        let areas = areas_from_buf(geometry.channels, geometry.sample_bits, buf as *mut u8);
        self.transfer(&areas, frames)
    }

    /// Write `frames` frames from `channels` separate non-interleaved
    /// buffers.
    ///
    /// # Safety
    /// Each pointer in `bufs` must be valid for `frames * sample_bytes` bytes.
    pub unsafe fn writen(&mut self, bufs: &[*const u8], frames: u32) -> Result<u32> {
        let geometry = self.geometry()?;
        let mut_bufs: Vec<*mut u8> = bufs.iter().map(|&p| p as *mut u8).collect();
        let areas = areas_from_bufs(geometry.sample_bits, &mut_bufs);
        self.transfer(&areas, frames)
    }

    /// Read `frames` frames into an interleaved buffer at `buf`.
    ///
    /// # Safety
    /// `buf` must be valid for `frames * frame_bytes` bytes of writing.
    pub unsafe fn readi(&mut self, buf: *mut u8, frames: u32) -> Result<u32> {
        let geometry = self.geometry()?;
        let areas = areas_from_buf(geometry.channels, geometry.sample_bits, buf);
        self.transfer(&areas, frames)
    }

    /// Read `frames` frames into `channels` separate non-interleaved
    /// buffers.
    ///
    /// # Safety
    /// Each pointer in `bufs` must be valid for `frames * sample_bytes` bytes of writing.
    pub unsafe fn readn(&mut self, bufs: &[*mut u8], frames: u32) -> Result<u32> {
        let geometry = self.geometry()?;
        let areas = areas_from_bufs(geometry.sample_bits, bufs);
        self.transfer(&areas, frames)
    }

    // -- mmap --

    /// `mmap_begin`: hand back the back-end's own channel areas plus the
    /// offset and run length of the largest contiguous window currently
    /// available, clamped to `frames_wanted` and the buffer boundary.
    pub fn mmap_begin(&mut self, frames_wanted: u32) -> Result<(Vec<ChannelArea>, u32, u32)> {
        let geometry = self.geometry()?;
        let avail = self.avail_update()?.max(0) as u32;
        let offset = (self.appl_ptr % geometry.buffer_size as u64) as u32;
        let contiguous = (geometry.buffer_size - offset).min(avail).min(frames_wanted);
        Ok((self.backend.areas().to_vec(), offset, contiguous))
    }

    /// `mmap_commit`: asserts the caller passed back the same `offset`
    /// `mmap_begin` handed out and that `frames` does not exceed what was
    /// available, then advances `appl_ptr` by `frames` (the caller having
    /// already written/read directly into the window `mmap_begin`
    /// returned) and notifies the back-end.
    pub fn mmap_commit(&mut self, offset: u32, frames: u32) -> Result<u32> {
        if !self.state.accepts_transfer(self.direction) {
            return Err(Error::bad_state("mmap_commit called outside Prepared/Running"));
        }
        let geometry = self.geometry()?;
        let current_offset = (self.appl_ptr % geometry.buffer_size as u64) as u32;
        debug_assert_eq!(offset, current_offset, "mmap_commit offset does not match mmap_begin's");
        let avail = self.avail_update()?.max(0) as u32;
        debug_assert!(frames <= avail, "mmap_commit frames exceeds avail");
        self.appl_ptr += frames as u64;
        self.backend.commit(self.appl_ptr)?;
        self.maybe_auto_start()?;
        Ok(frames)
    }

    /// `rewind`: move `appl_ptr` back by up to `frames`, never past the
    /// back-end's last reported pointer — an application cannot un-commit
    /// frames the back-end has already consumed. Capture has nothing
    /// meaningful to rewind into (it would mean re-delivering frames
    /// already handed to the caller), so this is playback-only.
    pub fn rewind(&mut self, frames: u32) -> Result<u32> {
        if self.direction != Direction::Playback {
            return Err(Error::not_supported("rewind is only defined for playback"));
        }
        let hw_ptr = match self.backend.avail_update() {
            Ok(v) => v,
            Err(Error::Pipe) => {
                self.drive(Event::Xrun)?;
                return Err(Error::Pipe);
            }
            Err(e) => return Err(e),
        };
        let queued = self.appl_ptr.saturating_sub(hw_ptr);
        let n = (frames as u64).min(queued) as u32;
        self.appl_ptr -= n as u64;
        self.backend.commit(self.appl_ptr)?;
        Ok(n)
    }

    pub fn close(mut self) -> Result<()> {
        self.backend.close()
    }
}

impl Drop for Pcm {
    fn drop(&mut self) {
        let _ = self.backend.close();
    }
}

/// Silence `need` frames starting at `start`, wrapping around the ring
/// boundary if the run crosses it.
fn silence_wrapping(areas: &[ChannelArea], buffer_size: u32, start: u32, need: u32, fmt: crate::format::Format) {
    use crate::areas::areas_silence;
    let first_run = (buffer_size - start).min(need);
    areas_silence(areas, start, first_run, fmt);
    let remaining = need - first_run;
    if remaining > 0 {
        areas_silence(areas, 0, remaining, fmt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_null::{NullBackend, Spec};
    use crate::format::Format;
    use crate::mask::Access;
    use crate::ValueOr;

    fn open_configured(direction: Direction) -> Pcm {
        let backend = NullBackend::new(direction, Spec::default());
        let mut pcm = Pcm::open(Box::new(backend));
        let mut hw = pcm.hw_params_any().unwrap();
        hw.set_format(Format::S16LE).unwrap();
        hw.set_access(Access::RwInterleaved).unwrap();
        hw.set_channels(2).unwrap();
        hw.set_rate(48_000, ValueOr::Nearest).unwrap();
        hw.set_period_size(256, ValueOr::Nearest).unwrap();
        hw.set_buffer_size(1024).unwrap();
        pcm.hw_params(&mut hw).unwrap();
        pcm.prepare().unwrap();
        let mut sw = pcm.sw_params_current().unwrap();
        sw.start_threshold = 1024;
        pcm.sw_params(sw).unwrap();
        pcm
    }

    #[test]
    fn writei_reports_frames_accepted_and_starts_on_threshold() {
        let mut pcm = open_configured(Direction::Playback);
        let buf = vec![0u8; 1024 * 4];
        let n = unsafe { pcm.writei(buf.as_ptr(), 1024) }.unwrap();
        assert_eq!(n, 1024);
        assert_eq!(pcm.state(), State::Running);
    }

    #[test]
    fn readi_before_any_capture_data_is_available_returns_would_block_nonblocking() {
        let mut pcm = open_configured(Direction::Capture);
        pcm.set_nonblock(true);
        let mut buf = vec![0u8; 4096];
        let err = unsafe { pcm.readi(buf.as_mut_ptr(), 256) }.unwrap_err();
        assert!(matches!(err, Error::WouldBlock));
    }

    #[test]
    fn avail_update_surfaces_epipe_and_transitions_to_xrun() {
        let mut pcm = open_configured(Direction::Playback);
        let buf = vec![0u8; 1024 * 4];
        unsafe { pcm.writei(buf.as_ptr(), 512) }.unwrap();
        pcm.start().unwrap();
        pcm.backend.as_any_mut().downcast_mut::<NullBackend>().unwrap().force_xrun();
        let err = pcm.avail_update().unwrap_err();
        assert!(matches!(err, Error::Pipe));
        assert_eq!(pcm.state(), State::XRun);
    }

    #[test]
    fn rewind_does_not_exceed_queued_frames() {
        let mut pcm = open_configured(Direction::Playback);
        let buf = vec![0u8; 1024 * 4];
        unsafe { pcm.writei(buf.as_ptr(), 200) }.unwrap();
        let n = pcm.rewind(1000).unwrap();
        assert_eq!(n, 200);
    }

    #[test]
    fn mmap_round_trip_advances_appl_ptr_by_committed_frames() {
        let mut pcm = open_configured(Direction::Playback);
        let (areas, offset, frames) = pcm.mmap_begin(256).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(frames, 256);
        let fmt = pcm.geometry().unwrap().format;
        for area in &areas {
            crate::areas::area_silence(area, offset, frames, fmt);
        }
        let committed = pcm.mmap_commit(offset, frames).unwrap();
        assert_eq!(committed, 256);
        assert_eq!(pcm.appl_ptr, 256);
    }

    #[test]
    #[should_panic(expected = "mmap_commit offset does not match mmap_begin's")]
    fn mmap_commit_asserts_on_stale_offset() {
        let mut pcm = open_configured(Direction::Playback);
        let (_, offset, frames) = pcm.mmap_begin(256).unwrap();
        let _ = pcm.mmap_commit(offset + 1, frames);
    }

    #[test]
    #[should_panic(expected = "mmap_commit frames exceeds avail")]
    fn mmap_commit_asserts_when_frames_exceeds_avail() {
        let mut pcm = open_configured(Direction::Playback);
        let (_, offset, _) = pcm.mmap_begin(256).unwrap();
        let _ = pcm.mmap_commit(offset, 2048);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::backend_null::{NullBackend, Spec};
    use crate::format::Format;
    use crate::mask::Access;
    use crate::ValueOr;
    use proptest::prelude::*;

    fn open_with_buffer(buffer_size: u32, period_size: u32) -> Pcm {
        let backend = NullBackend::new(Direction::Playback, Spec::default());
        let mut pcm = Pcm::open(Box::new(backend));
        let mut hw = pcm.hw_params_any().unwrap();
        hw.set_format(Format::S16LE).unwrap();
        hw.set_access(Access::RwInterleaved).unwrap();
        hw.set_channels(2).unwrap();
        hw.set_rate(48_000, ValueOr::Nearest).unwrap();
        hw.set_period_size(period_size, ValueOr::Nearest).unwrap();
        hw.set_buffer_size(buffer_size).unwrap();
        pcm.hw_params(&mut hw).unwrap();
        pcm.prepare().unwrap();
        let mut sw = pcm.sw_params_current().unwrap();
        sw.start_threshold = sw.boundary; // never auto-start, so appl_ptr/avail stay comparable across the write
        pcm.sw_params(sw).unwrap();
        pcm
    }

    proptest! {
        // Accounting identity (§8): after a successful writei(n) returning
        // k, appl_ptr advances by k and avail drops by exactly k.
        #[test]
        fn writei_advances_appl_ptr_and_shrinks_avail_by_exactly_k(buffer_size in 64u32..4096, chunk in 1u32..4096) {
            let period = (buffer_size / 4).max(32);
            let mut pcm = open_with_buffer(buffer_size - buffer_size % period, period);
            let geometry = pcm.geometry().unwrap();
            let chunk = chunk.min(geometry.buffer_size);
            let buf = vec![0u8; (geometry.buffer_size as usize) * 4];

            let avail_before = pcm.avail_update().unwrap();
            let k = unsafe { pcm.writei(buf.as_ptr(), chunk) }.unwrap();
            let avail_after = pcm.avail_update().unwrap();

            prop_assert_eq!(pcm.appl_ptr, k as u64);
            prop_assert_eq!(avail_before - avail_after, k as Frames);
        }
    }
}
