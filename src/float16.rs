//! Half-precision codec for stored embedding vectors.
//!
//! The encoder truncates the low mantissa bits and flushes values below the
//! smallest normal to signed zero. The decoder still reads subnormal patterns.
//! Corpora already on disk were produced with exactly this encoder, so neither
//! side may be "fixed" without regenerating them.

const SIGN_MASK: u16 = 0x8000;
const INFINITY_BITS: u16 = 0x7c00;

/// Encodes one `f32` as IEEE-754 binary16 bits.
pub fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32 - 127 + 15;
    let mantissa = ((bits >> 13) & 0x3ff) as u16;

    if exponent <= 0 {
        sign
    } else if exponent >= 31 {
        sign | INFINITY_BITS
    } else {
        sign | ((exponent as u16) << 10) | mantissa
    }
}

/// Decodes binary16 bits into an `f32`.
pub fn f16_bits_to_f32(half: u16) -> f32 {
    let negative = half & SIGN_MASK != 0;
    let exponent = i32::from((half >> 10) & 0x1f);
    let mantissa = f32::from(half & 0x3ff);

    let magnitude = match exponent {
        0 => 2f32.powi(-14) * (mantissa / 1024.0),
        31 if mantissa == 0.0 => f32::INFINITY,
        31 => f32::NAN,
        _ => 2f32.powi(exponent - 15) * (1.0 + mantissa / 1024.0),
    };
    if negative { -magnitude } else { magnitude }
}

pub fn encode(vector: &[f32]) -> Vec<u16> {
    vector.iter().copied().map(f32_to_f16_bits).collect()
}

pub fn decode(halves: &[u16]) -> Vec<f32> {
    halves.iter().copied().map(f16_bits_to_f32).collect()
}
