//! Sample format and sub-format enumerations, bit-exact per the external
//! interfaces: implementers must reproduce names and physical encodings,
//! since back-ends and applications identify formats by these exact names.

use crate::mask::mask_enum;

mask_enum! {
    /// `SND_PCM_FORMAT_xxx`-equivalent constants.
    Format {
        Unknown = 0,
        S8 = 1,
        U8 = 2,
        S16LE = 3,
        S16BE = 4,
        U16LE = 5,
        U16BE = 6,
        S24LE = 7,
        S24BE = 8,
        U24LE = 9,
        U24BE = 10,
        S32LE = 11,
        S32BE = 12,
        U32LE = 13,
        U32BE = 14,
        FloatLE = 15,
        FloatBE = 16,
        Float64LE = 17,
        Float64BE = 18,
        Iec958SubframeLE = 19,
        Iec958SubframeBE = 20,
        MuLaw = 21,
        ALaw = 22,
        ImaAdpcm = 23,
        Mpeg = 24,
        Gsm = 25,
        Special = 26,
    }
}

mask_enum! {
    /// `SND_PCM_SUBFORMAT_xxx`-equivalent constants. Only `Standard` is
    /// meaningful for the linear/float formats the transfer engine and
    /// channel-area primitives operate on directly.
    SubFormat {
        Standard = 0,
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::Unknown
    }
}

impl Default for SubFormat {
    fn default() -> Self {
        SubFormat::Standard
    }
}

/// Numerical kind, independent of endianness/width, used to pick the
/// silence pattern and the copy loop's interpretation of a raw sample.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Kind {
    Signed,
    Unsigned,
    Float,
    MuLaw,
    ALaw,
    /// IMA-ADPCM, MPEG, GSM, SPECIAL: back-end-opaque, no fixed physical
    /// width the engine can reason about byte-for-byte.
    Opaque,
}

impl Format {
    /// Physical width in bits of one sample of this format, i.e. the
    /// stride used by the channel-area primitives. `None` for opaque
    /// formats (MPEG, GSM, SPECIAL) whose width the back-end alone knows.
    pub fn physical_width(self) -> Option<u32> {
        use Format::*;
        match self {
            S8 | U8 | MuLaw | ALaw => Some(8),
            S16LE | S16BE | U16LE | U16BE => Some(16),
            // 24-bit significant data is still stored in a 32-bit container.
            S24LE | S24BE | U24LE | U24BE => Some(32),
            S32LE | S32BE | U32LE | U32BE | FloatLE | FloatBE | Iec958SubframeLE
            | Iec958SubframeBE => Some(32),
            Float64LE | Float64BE => Some(64),
            ImaAdpcm => Some(4),
            Mpeg | Gsm | Special | Unknown => None,
        }
    }

    /// Number of bits that actually carry sample data (`<=` physical
    /// width; e.g. 24 for `S24LE` despite a 32-bit physical container).
    pub fn significant_bits(self) -> Option<u32> {
        use Format::*;
        match self {
            S24LE | S24BE | U24LE | U24BE => Some(24),
            other => other.physical_width(),
        }
    }

    pub fn is_little_endian(self) -> bool {
        use Format::*;
        matches!(
            self,
            S8 | U8
                | S16LE
                | U16LE
                | S24LE
                | U24LE
                | S32LE
                | U32LE
                | FloatLE
                | Float64LE
                | Iec958SubframeLE
                | MuLaw
                | ALaw
        )
    }

    pub fn kind(self) -> Kind {
        use Format::*;
        match self {
            S8 | S16LE | S16BE | S24LE | S24BE | S32LE | S32BE => Kind::Signed,
            U8 | U16LE | U16BE | U24LE | U24BE | U32LE | U32BE => Kind::Unsigned,
            FloatLE | FloatBE | Float64LE | Float64BE => Kind::Float,
            MuLaw => Kind::MuLaw,
            ALaw => Kind::ALaw,
            Iec958SubframeLE | Iec958SubframeBE | ImaAdpcm | Mpeg | Gsm | Special | Unknown => {
                Kind::Opaque
            }
        }
    }

    /// The format's silence pattern, as a full physical-width-sized byte
    /// sequence (big-endian within the returned slice; callers write it at
    /// the format's native endianness). Signed and float formats silence to
    /// all-zero bits; unsigned 8-bit silences to the 0x80 midpoint; µ-law
    /// and A-law silence to their respective defined midpoints.
    pub fn silence_pattern(self) -> &'static [u8] {
        match self.kind() {
            Kind::Unsigned if self == Format::U8 => &[0x80],
            Kind::Unsigned => match self.physical_width() {
                Some(16) => &[0x80, 0x00],
                Some(32) => &[0x80, 0x00, 0x00, 0x00],
                _ => &[0x00],
            },
            Kind::MuLaw => &[0x7f],
            Kind::ALaw => &[0x55],
            _ => match self.physical_width() {
                Some(64) => &[0; 8],
                Some(32) => &[0; 4],
                Some(16) => &[0; 2],
                _ => &[0],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s24_has_32_bit_physical_width_but_24_significant() {
        assert_eq!(Format::S24LE.physical_width(), Some(32));
        assert_eq!(Format::S24LE.significant_bits(), Some(24));
    }

    #[test]
    fn u8_silences_to_midpoint() {
        assert_eq!(Format::U8.silence_pattern(), &[0x80]);
    }

    #[test]
    fn s16_silences_to_zero() {
        assert_eq!(Format::S16LE.silence_pattern(), &[0, 0]);
    }

    #[test]
    fn opaque_formats_have_no_physical_width() {
        assert_eq!(Format::Mpeg.physical_width(), None);
        assert_eq!(Format::Gsm.physical_width(), None);
    }
}
