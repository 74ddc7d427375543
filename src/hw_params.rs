//! The configuration-space refinement engine: the "hw_params" constraint
//! solver. A [`HwParams`] is a mutable description of the *set* of legal
//! parameter tuples; [`HwParams::refine`] intersects it against what a
//! back-end advertises as possible and tightens derived intervals until a
//! fixed point, and [`HwParams::choose_point`] picks the single point the
//! engine commits.

use crate::format::{Format, SubFormat};
use crate::interval::{Interval, IntervalParam, Intervals};
use crate::mask::{Access, Mask};
use crate::{Error, Result, ValueOr};

const MAX_REFINE_ITERATIONS: u32 = 32;

/// What a back-end advertises as possible, queried by `hw_refine`'s first
/// step. A back-end that has nothing to add for a given field just returns
/// the universal set/interval for it.
#[derive(Debug, Clone)]
pub struct HwConstraints {
    pub access: Mask<Access>,
    pub format: Mask<Format>,
    pub subformat: Mask<SubFormat>,
    pub intervals: Intervals,
}

impl HwConstraints {
    pub fn any() -> Self {
        HwConstraints {
            access: Mask::any(),
            format: Mask::any(),
            subformat: Mask::any(),
            intervals: Intervals::any(),
        }
    }
}

/// A mutable configuration space: the set of legal `(access, format,
/// subformat, channels, rate, ...)` tuples still under consideration.
#[derive(Debug, Clone)]
pub struct HwParams {
    pub(crate) access: Mask<Access>,
    pub(crate) format: Mask<Format>,
    pub(crate) subformat: Mask<SubFormat>,
    pub(crate) intervals: Intervals,
}

/// The fixed, latched geometry of a stream after `hw_params` commits a
/// single point. Held by the handle for the lifetime of `setup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub access: Access,
    pub format: Format,
    pub subformat: SubFormat,
    pub channels: u32,
    pub rate: u32,
    /// Exact rate as `(numerator, denominator)`; equal to `(rate, 1)`
    /// unless a back-end negotiated a non-integer rate.
    pub rate_exact: (u32, u32),
    pub period_size: u32,
    pub period_time_us: u32,
    pub buffer_size: u32,
    pub tick_time_us: u32,
    pub sample_bits: u32,
    pub frame_bits: u32,
}

impl Geometry {
    pub fn period_bytes(&self) -> u32 {
        self.period_size * self.frame_bits / 8
    }

    pub fn buffer_bytes(&self) -> u32 {
        self.buffer_size * self.frame_bits / 8
    }
}

fn empty_err() -> Error {
    Error::invalid("configuration space is empty")
}

impl HwParams {
    /// `hw_params_any`: fill with the universal set.
    pub fn any() -> Self {
        HwParams { access: Mask::any(), format: Mask::any(), subformat: Mask::any(), intervals: Intervals::any() }
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_empty()
            || self.format.is_empty()
            || self.subformat.is_empty()
            || self.intervals.iter().any(|(_, iv)| iv.empty)
    }

    /// Intersect with the back-end's advertised constraints and tighten
    /// derived intervals until a fixed point. Idempotent by construction:
    /// once no rule changes anything the loop stops, so calling it again
    /// immediately converges in zero iterations.
    pub fn refine(&mut self, backend: &HwConstraints) -> Result<()> {
        self.access.refine(&backend.access);
        self.format.refine(&backend.format);
        self.subformat.refine(&backend.subformat);
        for p in IntervalParam::ALL {
            self.intervals.get_mut(p).refine(backend.intervals.get(p));
        }

        for _ in 0..MAX_REFINE_ITERATIONS {
            if self.is_empty() {
                return Err(empty_err());
            }
            if !self.propagate_derived() {
                return Ok(());
            }
        }
        debug_assert!(false, "hw_params refinement did not converge");
        Ok(())
    }

    /// One pass of derived-field tightening. Returns whether anything
    /// changed, so the caller's fixed-point loop knows when to stop.
    fn propagate_derived(&mut self) -> bool {
        let mut changed = false;

        // sample_bits is pinned by a single-point format.
        if let Some(fmt) = self.format.single_value() {
            if let Some(bits) = fmt.significant_bits() {
                changed |= self.intervals.get_mut(IntervalParam::SampleBits).try_set(bits);
            }
        }

        // frame_bits = channels * sample_bits, whichever two sides are
        // known tightens the third.
        changed |= self.tighten_product(IntervalParam::FrameBits, IntervalParam::Channels, IntervalParam::SampleBits);

        // period_bytes = period_size * frame_bits / 8
        changed |= self.tighten_bytes(IntervalParam::PeriodBytes, IntervalParam::PeriodSize);
        // buffer_bytes = buffer_size * frame_bits / 8
        changed |= self.tighten_bytes(IntervalParam::BufferBytes, IntervalParam::BufferSize);

        // periods = buffer_size / period_size
        changed |= self.tighten_product(IntervalParam::BufferSize, IntervalParam::Periods, IntervalParam::PeriodSize);

        // period_time (us) = period_size * 1_000_000 / rate
        changed |= self.tighten_time(IntervalParam::PeriodTime, IntervalParam::PeriodSize);
        // buffer_time (us) = buffer_size * 1_000_000 / rate
        changed |= self.tighten_time(IntervalParam::BufferTime, IntervalParam::BufferSize);

        changed
    }

    /// If two of `{product, a, b}` (with `product = a * b`) are
    /// single-valued, tighten the third to that point.
    fn tighten_product(&mut self, product: IntervalParam, a: IntervalParam, b: IntervalParam) -> bool {
        let pv = self.intervals.get(product).single_value();
        let av = self.intervals.get(a).single_value();
        let bv = self.intervals.get(b).single_value();
        match (pv, av, bv) {
            (None, Some(a), Some(b)) => self.intervals.get_mut(product).try_set(a.saturating_mul(b)),
            (Some(p), None, Some(b)) if b != 0 && p % b == 0 => self.intervals.get_mut(a).try_set(p / b),
            (Some(p), Some(a), None) if a != 0 && p % a == 0 => self.intervals.get_mut(b).try_set(p / a),
            _ => false,
        }
    }

    fn tighten_bytes(&mut self, bytes: IntervalParam, frames: IntervalParam) -> bool {
        let frame_bits = self.intervals.get(IntervalParam::FrameBits).single_value();
        let Some(frame_bits) = frame_bits else { return false };
        let fv = self.intervals.get(frames).single_value();
        let bv = self.intervals.get(bytes).single_value();
        match (fv, bv) {
            (Some(f), None) => self.intervals.get_mut(bytes).try_set(f * frame_bits / 8),
            (None, Some(b)) if (b * 8) % frame_bits == 0 => self.intervals.get_mut(frames).try_set(b * 8 / frame_bits),
            _ => false,
        }
    }

    fn tighten_time(&mut self, time_us: IntervalParam, frames: IntervalParam) -> bool {
        let rate = self.intervals.get(IntervalParam::Rate).single_value();
        let Some(rate) = rate else { return false };
        if rate == 0 {
            return false;
        }
        let fv = self.intervals.get(frames).single_value();
        let tv = self.intervals.get(time_us).single_value();
        match (fv, tv) {
            (Some(f), None) => {
                let us = (f as u64 * 1_000_000 / rate as u64) as u32;
                self.intervals.get_mut(time_us).try_set(us)
            }
            (None, Some(t)) => {
                let frames = ((t as u64) * rate as u64 / 1_000_000) as u32;
                self.intervals.get_mut(frames).try_set(frames)
            }
            _ => false,
        }
    }

    // -- uniform setters, named per field, mirroring the teacher's
    // hand-written per-parameter HwParams methods --

    pub fn set_access(&mut self, v: Access) -> Result<()> {
        if self.access.try_set(v) { Ok(()) } else { Err(empty_err()) }
    }
    pub fn get_access(&self) -> Result<Access> {
        self.access.single_value().ok_or_else(empty_err)
    }
    pub fn test_access(&self, v: Access) -> bool {
        self.access.test(v)
    }

    pub fn set_format(&mut self, v: Format) -> Result<()> {
        if self.format.try_set(v) { Ok(()) } else { Err(empty_err()) }
    }
    pub fn get_format(&self) -> Result<Format> {
        self.format.single_value().ok_or_else(empty_err)
    }

    pub fn set_subformat(&mut self, v: SubFormat) -> Result<()> {
        if self.subformat.try_set(v) { Ok(()) } else { Err(empty_err()) }
    }

    pub fn set_channels(&mut self, v: u32) -> Result<()> {
        self.set(IntervalParam::Channels, v)
    }
    pub fn get_channels(&self) -> Result<u32> {
        self.get(IntervalParam::Channels)
    }

    pub fn set_rate(&mut self, v: u32, dir: ValueOr) -> Result<u32> {
        self.near(IntervalParam::Rate, v, dir)
    }
    pub fn get_rate(&self) -> Result<u32> {
        self.get(IntervalParam::Rate)
    }

    pub fn set_period_size(&mut self, v: u32, dir: ValueOr) -> Result<u32> {
        self.near(IntervalParam::PeriodSize, v, dir)
    }
    pub fn get_period_size(&self) -> Result<u32> {
        self.get(IntervalParam::PeriodSize)
    }

    pub fn set_periods(&mut self, v: u32, dir: ValueOr) -> Result<u32> {
        self.near(IntervalParam::Periods, v, dir)
    }

    pub fn set_buffer_size(&mut self, v: u32) -> Result<()> {
        self.set(IntervalParam::BufferSize, v)
    }
    pub fn get_buffer_size(&self) -> Result<u32> {
        self.get(IntervalParam::BufferSize)
    }

    pub fn set_buffer_time(&mut self, v: u32, dir: ValueOr) -> Result<u32> {
        self.near(IntervalParam::BufferTime, v, dir)
    }

    pub fn set_tick_time(&mut self, v: u32, dir: ValueOr) -> Result<u32> {
        self.near(IntervalParam::TickTime, v, dir)
    }

    // -- generic (mask/interval) x (set/test/near/first/last/minmax) --

    pub fn set(&mut self, p: IntervalParam, v: u32) -> Result<()> {
        if self.intervals.get_mut(p).try_set(v) { Ok(()) } else { Err(empty_err()) }
    }

    pub fn test(&self, p: IntervalParam, v: u32) -> bool {
        self.intervals.get(p).test(v)
    }

    pub fn near(&mut self, p: IntervalParam, v: u32, dir: ValueOr) -> Result<u32> {
        self.intervals.get_mut(p).try_near(v, dir).ok_or_else(empty_err)
    }

    pub fn first(&mut self, p: IntervalParam) -> Result<u32> {
        self.intervals.get_mut(p).first().ok_or_else(empty_err)
    }

    pub fn last(&mut self, p: IntervalParam) -> Result<u32> {
        self.intervals.get_mut(p).last().ok_or_else(empty_err)
    }

    pub fn minmax(&mut self, p: IntervalParam, min: u32, max: u32) -> Result<()> {
        if self.intervals.get_mut(p).try_set_minmax(min, max) { Ok(()) } else { Err(empty_err()) }
    }

    pub fn get(&self, p: IntervalParam) -> Result<u32> {
        self.intervals.get(p).single_value().ok_or_else(empty_err)
    }

    pub fn interval(&self, p: IntervalParam) -> &Interval {
        self.intervals.get(p)
    }

    /// Fix every parameter in the priority order the spec mandates —
    /// access, format, subformat, channels (min), rate (min), period_time
    /// (min), buffer_size (max), tick_time (min) — refining to propagate
    /// each choice before moving to the next. Given identical input
    /// refinements this always reaches the same point (fixing-order
    /// determinism), since each step picks a unique extremum rather than
    /// an arbitrary admissible value.
    pub fn choose_point(&mut self, backend: &HwConstraints) -> Result<()> {
        if let Some(a) = self.access.first() {
            self.access.try_set(a);
        } else {
            return Err(empty_err());
        }
        self.refine(backend)?;

        if let Some(f) = self.format.first() {
            self.format.try_set(f);
        } else {
            return Err(empty_err());
        }
        self.refine(backend)?;

        if let Some(s) = self.subformat.first() {
            self.subformat.try_set(s);
        } else {
            return Err(empty_err());
        }
        self.refine(backend)?;

        self.first(IntervalParam::Channels)?;
        self.refine(backend)?;

        self.first(IntervalParam::Rate)?;
        self.refine(backend)?;

        self.first(IntervalParam::PeriodTime)?;
        self.refine(backend)?;

        self.last(IntervalParam::BufferSize)?;
        self.refine(backend)?;

        self.first(IntervalParam::TickTime)?;
        self.refine(backend)?;

        if self.is_empty() {
            return Err(empty_err());
        }
        Ok(())
    }

    /// Read off a [`Geometry`] once every field is a single point. Callers
    /// should only invoke this after [`HwParams::choose_point`] succeeds.
    pub fn to_geometry(&self) -> Result<Geometry> {
        let rate = self.get(IntervalParam::Rate)?;
        Ok(Geometry {
            access: self.get_access()?,
            format: self.get_format()?,
            subformat: self.subformat.single_value().ok_or_else(empty_err)?,
            channels: self.get_channels()?,
            rate,
            rate_exact: (rate, 1),
            period_size: self.get(IntervalParam::PeriodSize)?,
            period_time_us: self.get(IntervalParam::PeriodTime)?,
            buffer_size: self.get_buffer_size()?,
            tick_time_us: self.get(IntervalParam::TickTime)?,
            sample_bits: self.get(IntervalParam::SampleBits)?,
            frame_bits: self.get(IntervalParam::FrameBits)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::Access;

    fn hw_16_44k() -> HwConstraints {
        let mut c = HwConstraints::any();
        c.intervals.get_mut(IntervalParam::Channels).try_set_minmax(1, 2);
        c.intervals.get_mut(IntervalParam::Rate).try_set_minmax(8_000, 192_000);
        c.intervals.get_mut(IntervalParam::SampleBits).try_set(16);
        c.intervals.get_mut(IntervalParam::PeriodSize).try_set_minmax(32, 8192);
        c.intervals.get_mut(IntervalParam::BufferSize).try_set_minmax(64, 65536);
        c
    }

    #[test]
    fn refine_then_refine_again_is_a_fixed_point() {
        let backend = hw_16_44k();
        let mut space = HwParams::any();
        space.refine(&backend).unwrap();
        let once = space.clone();
        space.refine(&backend).unwrap();
        assert_eq!(space.intervals, once.intervals);
    }

    #[test]
    fn choose_point_commits_a_single_point_deterministically() {
        let backend = hw_16_44k();
        let mut a = HwParams::any();
        a.set_format(Format::S16LE).unwrap();
        a.set_access(Access::RwInterleaved).unwrap();
        a.set_channels(2).unwrap();
        a.set_rate(44_100, ValueOr::Nearest).unwrap();
        a.set_period_size(1024, ValueOr::Nearest).unwrap();
        a.set_buffer_size(4096).unwrap();
        a.choose_point(&backend).unwrap();
        let ga = a.to_geometry().unwrap();

        let mut b = HwParams::any();
        b.set_format(Format::S16LE).unwrap();
        b.set_access(Access::RwInterleaved).unwrap();
        b.set_channels(2).unwrap();
        b.set_rate(44_100, ValueOr::Nearest).unwrap();
        b.set_period_size(1024, ValueOr::Nearest).unwrap();
        b.set_buffer_size(4096).unwrap();
        b.choose_point(&backend).unwrap();
        let gb = b.to_geometry().unwrap();

        assert_eq!(ga, gb);
        assert_eq!(ga.frame_bits, ga.channels * ga.sample_bits);
        assert_eq!(ga.buffer_size % ga.period_size, 0);
    }

    #[test]
    fn setter_never_grows_the_space() {
        let mut space = HwParams::any();
        let before = space.intervals.clone();
        space.set_channels(2).unwrap();
        // Every field's admissible set after a setter is a subset of what
        // it was before (channels collapsed to a point; nothing grew).
        assert!(space.intervals.get(IntervalParam::Channels).test(2));
        assert_ne!(space.intervals, before);
    }
}
