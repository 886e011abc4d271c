//! Readback comparison
//!
//! Probes compare every texel of a rectangle in a [`Readback`] against an
//! expected value. Floating-point components match when they are within a
//! number of units in the last place of each other; integer components match
//! when their difference is within the same tolerance.

use crate::backend::Readback;
use crate::format::{ComponentType, Format};
use half::f16;
use std::fmt;

/// Texels a probe covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRect {
    pub left: u32,
    pub top: u32,
    /// Exclusive
    pub right: u32,
    /// Exclusive
    pub bottom: u32,
    /// Array layer or depth slice
    pub layer: u32,
}

impl ProbeRect {
    /// A single texel, `None` when `x` or `y` is the last representable coordinate
    pub fn point(x: u32, y: u32, layer: u32) -> Option<Self> {
        Some(Self {
            left: x,
            top: y,
            right: x.checked_add(1)?,
            bottom: y.checked_add(1)?,
            layer,
        })
    }
}

/// Expected value of a probe
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeValue {
    U64(Vec<u64>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
}

impl ProbeValue {
    /// Number of expected components
    pub fn len(&self) -> usize {
        match self {
            ProbeValue::U64(v) => v.len(),
            ProbeValue::I64(v) => v.len(),
            ProbeValue::F64(v) => v.len(),
            ProbeValue::U32(v) => v.len(),
            ProbeValue::I32(v) => v.len(),
            ProbeValue::F32(v) => v.len(),
        }
    }

    /// Whether no component is expected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes the expected components occupy in memory
    pub fn byte_size(&self) -> usize {
        match self {
            ProbeValue::U64(v) => v.len() * 8,
            ProbeValue::I64(v) => v.len() * 8,
            ProbeValue::F64(v) => v.len() * 8,
            ProbeValue::U32(v) => v.len() * 4,
            ProbeValue::I32(v) => v.len() * 4,
            ProbeValue::F32(v) => v.len() * 4,
        }
    }
}

impl fmt::Display for ProbeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeValue::U64(v) => write!(f, "{v:?}"),
            ProbeValue::I64(v) => write!(f, "{v:?}"),
            ProbeValue::F64(v) => write!(f, "{v:?}"),
            ProbeValue::U32(v) => write!(f, "{v:?}"),
            ProbeValue::I32(v) => write!(f, "{v:?}"),
            ProbeValue::F32(v) => write!(f, "{v:?}"),
        }
    }
}

/// First texel of a probe that did not match
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeMismatch {
    pub x: u32,
    pub y: u32,
    pub got: ProbeValue,
    pub expected: ProbeValue,
}

impl fmt::Display for ProbeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Got {}, expected {} at ({}, {}).", self.got, self.expected, self.x, self.y)
    }
}

/// Maps float bits onto a line where adjacent floats differ by one
fn ordered_bits_f32(value: f32) -> i64 {
    let bits = value.to_bits() as i32;
    if bits < 0 { i32::MIN as i64 - bits as i64 } else { bits as i64 }
}

fn ordered_bits_f64(value: f64) -> i128 {
    let bits = value.to_bits() as i64;
    if bits < 0 { i64::MIN as i128 - bits as i128 } else { bits as i128 }
}

/// Whether two floats are within `ulps` units in the last place
pub fn compare_f32(got: f32, expected: f32, ulps: u32) -> bool {
    if got.is_nan() || expected.is_nan() {
        return got.is_nan() && expected.is_nan();
    }
    (ordered_bits_f32(got) - ordered_bits_f32(expected)).abs() <= ulps as i64
}

/// Whether two doubles are within `ulps` units in the last place
pub fn compare_f64(got: f64, expected: f64, ulps: u32) -> bool {
    if got.is_nan() || expected.is_nan() {
        return got.is_nan() && expected.is_nan();
    }
    (ordered_bits_f64(got) - ordered_bits_f64(expected)).abs() <= ulps as i128
}

/// Reads component `index` of a texel as raw unsigned bits
fn component_bits(format: Format, texel: &[u8], index: usize) -> Option<u32> {
    // Structured elements have no format; read them as 32-bit words
    let size = match format.component_size() {
        0 => 4,
        size => size as usize,
    };
    let bytes = texel.get(index * size..(index + 1) * size)?;
    Some(match size {
        1 => bytes[0] as u32,
        2 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
        _ => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    })
}

/// Decodes component `index` of a texel as a float
pub fn texel_component_f32(format: Format, texel: &[u8], index: usize) -> Option<f32> {
    if format == Format::D24UnormS8Uint {
        let bits = component_bits(format, texel, index)?;
        return Some((bits & 0x00ff_ffff) as f32 / 0x00ff_ffff as f32);
    }

    let bits = component_bits(format, texel, index)?;
    let size = format.component_size();
    Some(match (format.component_type(), size) {
        (ComponentType::Float, 2) => f16::from_bits(bits as u16).to_f32(),
        (ComponentType::Float, _) | (ComponentType::Typeless, _) => f32::from_bits(bits),
        (ComponentType::Unorm, 1) => bits as f32 / u8::MAX as f32,
        (ComponentType::Unorm, 2) => bits as f32 / u16::MAX as f32,
        (ComponentType::Snorm, 1) => (bits as u8 as i8 as f32 / i8::MAX as f32).max(-1.0),
        (ComponentType::Snorm, 2) => (bits as u16 as i16 as f32 / i16::MAX as f32).max(-1.0),
        (ComponentType::Uint, _) => bits as f32,
        (ComponentType::Sint, 1) => bits as u8 as i8 as f32,
        (ComponentType::Sint, 2) => bits as u16 as i16 as f32,
        (ComponentType::Sint, _) => bits as i32 as f32,
        (_, _) => bits as f32,
    })
}

/// Decodes component `index` of a texel as a 32-bit integer, sign-extending signed formats
pub fn texel_component_u32(format: Format, texel: &[u8], index: usize) -> Option<u32> {
    let bits = component_bits(format, texel, index)?;
    Some(match (format.component_type(), format.component_size()) {
        (ComponentType::Sint | ComponentType::Snorm, 1) => bits as u8 as i8 as i32 as u32,
        (ComponentType::Sint | ComponentType::Snorm, 2) => bits as u16 as i16 as i32 as u32,
        _ => bits,
    })
}

fn read_u64(texel: &[u8], index: usize) -> Option<u64> {
    let bytes: [u8; 8] = texel.get(index * 8..index * 8 + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// Decodes a texel in the representation of `expected`
fn decode_like(expected: &ProbeValue, format: Format, texel: &[u8]) -> Option<ProbeValue> {
    let n = expected.len();
    Some(match expected {
        ProbeValue::U64(_) => ProbeValue::U64((0..n).map(|i| read_u64(texel, i)).collect::<Option<_>>()?),
        ProbeValue::I64(_) => ProbeValue::I64((0..n).map(|i| read_u64(texel, i).map(|v| v as i64)).collect::<Option<_>>()?),
        ProbeValue::F64(_) => ProbeValue::F64((0..n).map(|i| read_u64(texel, i).map(f64::from_bits)).collect::<Option<_>>()?),
        ProbeValue::U32(_) => ProbeValue::U32((0..n).map(|i| texel_component_u32(format, texel, i)).collect::<Option<_>>()?),
        ProbeValue::I32(_) => ProbeValue::I32((0..n).map(|i| texel_component_u32(format, texel, i).map(|v| v as i32)).collect::<Option<_>>()?),
        ProbeValue::F32(_) => ProbeValue::F32((0..n).map(|i| texel_component_f32(format, texel, i)).collect::<Option<_>>()?),
    })
}

/// Compares a decoded texel with the expected value
fn values_match(got: &ProbeValue, expected: &ProbeValue, ulps: u32) -> bool {
    match (got, expected) {
        (ProbeValue::U64(g), ProbeValue::U64(e)) => g.iter().zip(e).all(|(g, e)| g.abs_diff(*e) <= ulps as u64),
        (ProbeValue::I64(g), ProbeValue::I64(e)) => g.iter().zip(e).all(|(g, e)| g.abs_diff(*e) <= ulps as u64),
        (ProbeValue::F64(g), ProbeValue::F64(e)) => g.iter().zip(e).all(|(g, e)| compare_f64(*g, *e, ulps)),
        (ProbeValue::U32(g), ProbeValue::U32(e)) => g.iter().zip(e).all(|(g, e)| g.abs_diff(*e) <= ulps),
        (ProbeValue::I32(g), ProbeValue::I32(e)) => g.iter().zip(e).all(|(g, e)| g.abs_diff(*e) <= ulps),
        (ProbeValue::F32(g), ProbeValue::F32(e)) => g.iter().zip(e).all(|(g, e)| compare_f32(*g, *e, ulps)),
        _ => false,
    }
}

/// Compares every texel of `rect` against `expected`
///
/// # Arguments
/// * `readback` - Subresource contents
/// * `rect` - Texels to compare; must lie inside the readback
/// * `expected` - Expected value of every texel
/// * `ulps` - Tolerance in units in the last place (or integer steps)
///
/// # Returns
/// `Ok(())` if every texel matches, otherwise the first mismatching texel
pub fn probe(readback: &Readback, rect: &ProbeRect, expected: &ProbeValue, ulps: u32) -> Result<(), ProbeMismatch> {
    for y in rect.top..rect.bottom {
        for x in rect.left..rect.right {
            let got = readback.texel(x, y, rect.layer).and_then(|texel| decode_like(expected, readback.format, texel));
            match got {
                Some(got) if values_match(&got, expected, ulps) => {}
                got => {
                    return Err(ProbeMismatch {
                        x,
                        y,
                        got: got.unwrap_or_else(|| ProbeValue::U32(Vec::new())),
                        expected: expected.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readback_f32(width: u32, height: u32, texels: &[[f32; 4]]) -> Readback {
        Readback {
            format: Format::R32G32B32A32Float,
            width,
            height,
            depth: 1,
            row_pitch: width as usize * 16,
            texel_size: 16,
            data: bytemuck::cast_slice(texels).to_vec(),
        }
    }

    #[test]
    fn test_ulp_comparison() {
        let next = f32::from_bits(1.0f32.to_bits() + 1);
        assert!(!compare_f32(next, 1.0, 0));
        assert!(compare_f32(next, 1.0, 1));

        // Zeros of either sign are adjacent
        assert!(compare_f32(0.0, -0.0, 0));
        assert!(compare_f32(f32::from_bits(1), -f32::from_bits(1), 2));
        assert!(!compare_f32(1.0, -1.0, 1000));
        assert!(compare_f32(f32::NAN, f32::NAN, 0));

        let next = f64::from_bits(0.5f64.to_bits() - 3);
        assert!(compare_f64(next, 0.5, 3));
        assert!(!compare_f64(next, 0.5, 2));
    }

    #[test]
    fn test_probe_rect() {
        let red = [1.0, 0.0, 0.0, 1.0];
        let blue = [0.0, 0.0, 1.0, 1.0];
        let readback = readback_f32(2, 2, &[red, red, red, blue]);

        let expected = ProbeValue::F32(red.to_vec());
        assert!(probe(&readback, &ProbeRect::point(0, 0, 0).unwrap(), &expected, 0).is_ok());

        let whole = ProbeRect {
            left: 0,
            top: 0,
            right: 2,
            bottom: 2,
            layer: 0,
        };
        let mismatch = probe(&readback, &whole, &expected, 0).unwrap_err();
        assert_eq!((mismatch.x, mismatch.y), (1, 1));
        assert_eq!(mismatch.got, ProbeValue::F32(blue.to_vec()));
    }

    #[test]
    fn test_normalized_and_half_decoding() {
        assert_eq!(texel_component_f32(Format::R8G8B8A8Unorm, &[255, 0, 128, 51], 0), Some(1.0));
        assert_eq!(texel_component_f32(Format::R8G8B8A8Unorm, &[255, 0, 128, 51], 3), Some(0.2));
        assert_eq!(texel_component_f32(Format::R8G8B8A8Snorm, &[0x80, 0, 0, 0], 0), Some(-1.0));

        let half = f16::from_f32(0.5).to_bits().to_le_bytes();
        assert_eq!(texel_component_f32(Format::R16Float, &half, 0), Some(0.5));

        assert_eq!(texel_component_u32(Format::R16G16Sint, &[0xff, 0xff, 1, 0], 0), Some(u32::MAX));
        assert_eq!(texel_component_u32(Format::R16G16Sint, &[0xff, 0xff, 1, 0], 1), Some(1));
    }

    #[test]
    fn test_integer_and_64_bit_probes() {
        let data: Vec<u8> = [7u32, 0xffff_fff9].iter().flat_map(|v| v.to_le_bytes()).collect();
        let readback = Readback {
            format: Format::R32G32Uint,
            width: 1,
            height: 1,
            depth: 1,
            row_pitch: 8,
            texel_size: 8,
            data,
        };

        assert!(probe(&readback, &ProbeRect::point(0, 0, 0).unwrap(), &ProbeValue::U32(vec![7, 0xffff_fff9]), 0).is_ok());
        assert!(probe(&readback, &ProbeRect::point(0, 0, 0).unwrap(), &ProbeValue::I32(vec![7, -7]), 0).is_ok());
        assert!(probe(&readback, &ProbeRect::point(0, 0, 0).unwrap(), &ProbeValue::U32(vec![8]), 0).is_err());
        assert!(probe(&readback, &ProbeRect::point(0, 0, 0).unwrap(), &ProbeValue::U32(vec![8]), 1).is_ok());
        assert!(probe(&readback, &ProbeRect::point(0, 0, 0).unwrap(), &ProbeValue::U64(vec![0xffff_fff9_0000_0007]), 0).is_ok());
    }

    #[test]
    fn test_out_of_bounds_is_a_mismatch() {
        let readback = readback_f32(1, 1, &[[0.0; 4]]);
        assert!(probe(&readback, &ProbeRect::point(1, 0, 0).unwrap(), &ProbeValue::F32(vec![0.0]), 0).is_err());
    }
}
