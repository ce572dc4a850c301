//! Continuous spectral color ramp for timeline buckets.

use serde::{Serialize, Serializer};
use std::fmt;

/// Stops of the diverging spectral scheme, from red to violet.
const SPECTRAL: [u32; 11] = [
    0x9e0142, 0xd53e4f, 0xf46d43, 0xfdae61, 0xfee08b, 0xffffbf, 0xe6f598, 0xabdda4, 0x66c2a5,
    0x3288bd, 0x5e4fa2,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    const fn from_hex(hex: u32) -> Self {
        Self::new((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Uniform cubic B-spline through `values` at `t` in `[0, 1]`.
fn basis(values: &[f64], t: f64) -> f64 {
    let n = values.len() - 1;
    let (t, i) = if t <= 0.0 || t.is_nan() {
        (0.0, 0)
    } else if t >= 1.0 {
        (1.0, n - 1)
    } else {
        (t, ((t * n as f64).floor() as usize).min(n - 1))
    };

    let v1 = values[i];
    let v2 = values[i + 1];
    let v0 = if i > 0 { values[i - 1] } else { 2.0 * v1 - v2 };
    let v3 = if i < n - 1 { values[i + 2] } else { 2.0 * v2 - v1 };

    let t1 = (t - i as f64 / n as f64) * n as f64;
    let t2 = t1 * t1;
    let t3 = t2 * t1;
    ((1.0 - 3.0 * t1 + 3.0 * t2 - t3) * v0
        + (4.0 - 6.0 * t2 + 3.0 * t3) * v1
        + (1.0 + 3.0 * t1 + 3.0 * t2 - 3.0 * t3) * v2
        + t3 * v3)
        / 6.0
}

/// Spectral ramp: `0` is deep red, `1` is violet.
pub fn spectral(t: f64) -> Rgb {
    let stops = SPECTRAL.map(Rgb::from_hex);
    let channel = |pick: fn(&Rgb) -> u8| {
        let values = stops.map(|c| f64::from(pick(&c)));
        basis(&values, t).round().clamp(0.0, 255.0) as u8
    };
    Rgb::new(channel(|c| c.r), channel(|c| c.g), channel(|c| c.b))
}

/// Color of a normalized mean. The domain is reversed, so high values land
/// on the red end.
pub fn bucket_color(normalized_mean: f64) -> Rgb {
    spectral(1.0 - normalized_mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_ends_hit_first_and_last_stop() {
        assert_eq!(spectral(0.0).to_hex(), "#9e0142");
        assert_eq!(spectral(1.0).to_hex(), "#5e4fa2");
        assert_eq!(spectral(-3.0), spectral(0.0));
        assert_eq!(spectral(f64::NAN), spectral(0.0));
    }

    #[test]
    fn test_bucket_color_is_reversed() {
        assert_eq!(bucket_color(1.0), Rgb::from_hex(0x9e0142));
        assert_eq!(bucket_color(0.0), Rgb::from_hex(0x5e4fa2));
        let mid = bucket_color(0.5);
        assert!(mid.r > 200 && mid.g > 200, "middle of the ramp is pale, got {}", mid);
    }
}
