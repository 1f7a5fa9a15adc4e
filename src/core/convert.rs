//! Pixel buffer conversion between numeric encodings.
//!
//! Conversions are looked up in [`RULES`], keyed by the kind (scalar or
//! complex) of both sides and by how the component counts relate. A pair
//! without a row is rejected with [`ConversionError::Unsupported`].
//!
//! Narrowing casts follow the legacy policy: no clamping. Floats truncate
//! toward zero and integers wrap to the target width.

use crate::core::buffer::PixelBuffer;
use crate::core::error::{BufferError, ConversionError, ConversionResult};
use crate::core::types::{ComponentType, PixelLayout};
use rayon::prelude::*;

/// Scalar or complex component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Scalar,
    Complex,
}

impl Kind {
    fn of(component: ComponentType) -> Self {
        if component.is_complex() {
            Kind::Complex
        } else {
            Kind::Scalar
        }
    }
}

/// How the output component count relates to the input one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Same,
    Doubled,
    Other,
}

impl Arity {
    fn of(input: usize, output: usize) -> Self {
        if input == output {
            Arity::Same
        } else if output == 2 * input {
            Arity::Doubled
        } else {
            Arity::Other
        }
    }
}

/// Per-pixel transformation applied by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Element-wise numeric cast.
    Cast,
    /// real = cast(value), imaginary = 0.
    RealToComplex,
    /// cast(|value|).
    Magnitude,
    /// Real and imaginary parts cast independently.
    ComplexCast,
    /// Each complex component becomes two adjacent scalars (real, imaginary).
    Interleave,
    /// Shared components cast part by part, missing ones zero-filled.
    ComplexResize,
}

/// One row of the dispatch table.
#[derive(Debug, Clone, Copy)]
pub struct ConversionRule {
    pub input: Kind,
    pub output: Kind,
    pub arity: Arity,
    pub rule: Rule,
}

/// Supported conversions.
pub static RULES: &[ConversionRule] = &[
    ConversionRule {
        input: Kind::Scalar,
        output: Kind::Scalar,
        arity: Arity::Same,
        rule: Rule::Cast,
    },
    ConversionRule {
        input: Kind::Scalar,
        output: Kind::Complex,
        arity: Arity::Same,
        rule: Rule::RealToComplex,
    },
    ConversionRule {
        input: Kind::Complex,
        output: Kind::Scalar,
        arity: Arity::Same,
        rule: Rule::Magnitude,
    },
    ConversionRule {
        input: Kind::Complex,
        output: Kind::Complex,
        arity: Arity::Same,
        rule: Rule::ComplexCast,
    },
    ConversionRule {
        input: Kind::Complex,
        output: Kind::Scalar,
        arity: Arity::Doubled,
        rule: Rule::Interleave,
    },
    ConversionRule {
        input: Kind::Complex,
        output: Kind::Complex,
        arity: Arity::Doubled,
        rule: Rule::ComplexResize,
    },
    ConversionRule {
        input: Kind::Complex,
        output: Kind::Complex,
        arity: Arity::Other,
        rule: Rule::ComplexResize,
    },
];

/// Find the rule converting `in_n` components of `input` into `out_n` of `output`.
pub fn lookup(
    input: ComponentType,
    in_n: usize,
    output: ComponentType,
    out_n: usize,
) -> Option<Rule> {
    let (kind_in, kind_out, arity) = (Kind::of(input), Kind::of(output), Arity::of(in_n, out_n));
    RULES
        .iter()
        .find(|r| r.input == kind_in && r.output == kind_out && r.arity == arity)
        .map(|r| r.rule)
}

/// Convert `pixel_count` pixels of raw bytes between encodings.
pub fn convert(
    input: &[u8],
    in_type: ComponentType,
    in_n: usize,
    out_type: ComponentType,
    out_n: usize,
    pixel_count: usize,
) -> ConversionResult<Vec<u8>> {
    let rule = lookup(in_type, in_n, out_type, out_n).ok_or(ConversionError::Unsupported {
        input: in_type,
        input_components: in_n,
        output: out_type,
        output_components: out_n,
    })?;

    let in_bpp = in_type.size() * in_n;
    let out_bpp = out_type.size() * out_n;
    if input.len() != in_bpp * pixel_count {
        return Err(BufferError::Length {
            expected: in_bpp * pixel_count,
            got: input.len(),
        }
        .into());
    }

    let mut output = vec![0u8; out_bpp * pixel_count];
    if pixel_count == 0 || out_bpp == 0 || in_bpp == 0 {
        return Ok(output);
    }
    if in_type == out_type && in_n == out_n {
        output.copy_from_slice(input);
        return Ok(output);
    }

    let converter = PixelConverter {
        rule,
        in_scalar: in_type.scalar(),
        out_scalar: out_type.scalar(),
        in_n,
        out_n,
    };
    output
        .par_chunks_exact_mut(out_bpp)
        .zip(input.par_chunks_exact(in_bpp))
        .for_each(|(dst, src)| converter.apply(src, dst));
    Ok(output)
}

/// Convert a whole buffer to `target`.
pub fn convert_buffer(buffer: &PixelBuffer, target: PixelLayout) -> ConversionResult<PixelBuffer> {
    if buffer.layout() == target {
        return Ok(buffer.clone());
    }
    let layout = buffer.layout();
    let bytes = convert(
        buffer.as_bytes(),
        layout.component,
        layout.components,
        target.component,
        target.components,
        buffer.pixel_count(),
    )?;
    Ok(PixelBuffer::from_bytes(target, buffer.pixel_count(), bytes)?)
}

// ============================================================================
// Sample access
// ============================================================================

/// One scalar value, wide enough to hold any supported scalar exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Sample {
    Int(i128),
    Float(f64),
}

impl Sample {
    fn as_f64(self) -> f64 {
        match self {
            Sample::Int(v) => v as f64,
            Sample::Float(v) => v,
        }
    }

    /// Integer value with truncation toward zero (NaN maps to 0).
    fn as_i128(self) -> i128 {
        match self {
            Sample::Int(v) => v,
            Sample::Float(v) => v as i128,
        }
    }
}

fn read_sample(scalar: ComponentType, bytes: &[u8]) -> Sample {
    macro_rules! load {
        ($t:ty) => {
            bytemuck::pod_read_unaligned::<$t>(&bytes[..std::mem::size_of::<$t>()])
        };
    }
    match scalar {
        ComponentType::U8 => Sample::Int(bytes[0] as i128),
        ComponentType::I8 => Sample::Int(bytes[0] as i8 as i128),
        ComponentType::U16 => Sample::Int(load!(u16) as i128),
        ComponentType::I16 => Sample::Int(load!(i16) as i128),
        ComponentType::U32 => Sample::Int(load!(u32) as i128),
        ComponentType::I32 => Sample::Int(load!(i32) as i128),
        ComponentType::U64 => Sample::Int(load!(u64) as i128),
        ComponentType::I64 => Sample::Int(load!(i64) as i128),
        ComponentType::F32 => Sample::Float(load!(f32) as f64),
        ComponentType::F64 => Sample::Float(load!(f64)),
        complex => read_sample(complex.scalar(), bytes),
    }
}

fn write_sample(scalar: ComponentType, sample: Sample, out: &mut [u8]) {
    macro_rules! store {
        ($v:expr) => {{
            let v = $v;
            out[..std::mem::size_of_val(&v)].copy_from_slice(bytemuck::bytes_of(&v));
        }};
    }
    match scalar {
        ComponentType::U8 => store!(sample.as_i128() as u8),
        ComponentType::I8 => store!(sample.as_i128() as i8),
        ComponentType::U16 => store!(sample.as_i128() as u16),
        ComponentType::I16 => store!(sample.as_i128() as i16),
        ComponentType::U32 => store!(sample.as_i128() as u32),
        ComponentType::I32 => store!(sample.as_i128() as i32),
        ComponentType::U64 => store!(sample.as_i128() as u64),
        ComponentType::I64 => store!(sample.as_i128() as i64),
        ComponentType::F32 => store!(sample.as_f64() as f32),
        ComponentType::F64 => store!(sample.as_f64()),
        complex => write_sample(complex.scalar(), sample, out),
    }
}

/// Resolved conversion for one (input, output) pair, applied pixel by pixel.
struct PixelConverter {
    rule: Rule,
    in_scalar: ComponentType,
    out_scalar: ComponentType,
    in_n: usize,
    out_n: usize,
}

impl PixelConverter {
    fn scalar_at(&self, src: &[u8], i: usize) -> Sample {
        let w = self.in_scalar.size();
        read_sample(self.in_scalar, &src[i * w..])
    }

    fn put_at(&self, dst: &mut [u8], i: usize, sample: Sample) {
        let w = self.out_scalar.size();
        write_sample(self.out_scalar, sample, &mut dst[i * w..]);
    }

    fn apply(&self, src: &[u8], dst: &mut [u8]) {
        match self.rule {
            Rule::Cast => {
                for c in 0..self.in_n {
                    self.put_at(dst, c, self.scalar_at(src, c));
                }
            }
            Rule::RealToComplex => {
                for c in 0..self.in_n {
                    self.put_at(dst, 2 * c, self.scalar_at(src, c));
                    self.put_at(dst, 2 * c + 1, Sample::Int(0));
                }
            }
            Rule::Magnitude => {
                for c in 0..self.in_n {
                    let re = self.scalar_at(src, 2 * c).as_f64();
                    let im = self.scalar_at(src, 2 * c + 1).as_f64();
                    self.put_at(dst, c, Sample::Float(re.hypot(im)));
                }
            }
            Rule::ComplexCast | Rule::Interleave => {
                for part in 0..2 * self.in_n {
                    self.put_at(dst, part, self.scalar_at(src, part));
                }
            }
            Rule::ComplexResize => {
                for part in 0..2 * self.in_n.min(self.out_n) {
                    self.put_at(dst, part, self.scalar_at(src, part));
                }
            }
        }
    }
}
