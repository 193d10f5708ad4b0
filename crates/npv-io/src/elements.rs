use core::fmt;

use npv_dtype::{DType, DTypeDescr};

use crate::{IOError, NpyArrayBytes};

/// A single decoded element, widened to the largest type of its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NpyScalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Complex(f64, f64),
}

impl NpyScalar {
    /// NumPy `==` against an integer: floats compare by value, booleans as
    /// 0/1, complex values only when the imaginary part is zero.
    #[must_use]
    pub fn equals_integer(self, expected: u64) -> bool {
        #[allow(clippy::cast_precision_loss)]
        let as_float = expected as f64;
        match self {
            Self::Bool(value) => u64::from(value) == expected,
            Self::Int(value) => u64::try_from(value).is_ok_and(|value| value == expected),
            Self::UInt(value) => value == expected,
            Self::Float(value) => value == as_float,
            Self::Complex(re, im) => im == 0.0 && re == as_float,
        }
    }
}

impl fmt::Display for NpyScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(value) => write!(f, "{value}"),
            Self::UInt(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Complex(re, im) => {
                let sign = if im.is_sign_negative() { '-' } else { '+' };
                write!(f, "({re:?}{sign}{:?}j)", im.abs())
            }
        }
    }
}

/// Decoded elements in storage order.
#[derive(Debug, Clone, PartialEq)]
pub enum NpyElements {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    UInt(Vec<u64>),
    Float(Vec<f64>),
    Complex(Vec<(f64, f64)>),
}

impl NpyElements {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(values) => values.len(),
            Self::Int(values) => values.len(),
            Self::UInt(values) => values.len(),
            Self::Float(values) => values.len(),
            Self::Complex(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<NpyScalar> {
        match self {
            Self::Bool(values) => values.get(index).copied().map(NpyScalar::Bool),
            Self::Int(values) => values.get(index).copied().map(NpyScalar::Int),
            Self::UInt(values) => values.get(index).copied().map(NpyScalar::UInt),
            Self::Float(values) => values.get(index).copied().map(NpyScalar::Float),
            Self::Complex(values) => values
                .get(index)
                .map(|&(re, im)| NpyScalar::Complex(re, im)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = NpyScalar> + '_ {
        (0..self.len()).filter_map(|index| self.get(index))
    }

    /// Copies the elements at `positions`, in that order.
    pub(crate) fn gather(&self, positions: impl Iterator<Item = usize>) -> Self {
        fn pick<T: Copy>(values: &[T], positions: impl Iterator<Item = usize>) -> Vec<T> {
            positions.filter_map(|p| values.get(p).copied()).collect()
        }
        match self {
            Self::Bool(values) => Self::Bool(pick(values, positions)),
            Self::Int(values) => Self::Int(pick(values, positions)),
            Self::UInt(values) => Self::UInt(pick(values, positions)),
            Self::Float(values) => Self::Float(pick(values, positions)),
            Self::Complex(values) => Self::Complex(pick(values, positions)),
        }
    }
}

/// Fixed-width words with big-endian input already reversed to little-endian.
fn le_words<const N: usize>(body: &[u8], big_endian: bool) -> impl Iterator<Item = [u8; N]> + '_ {
    body.chunks_exact(N).map(move |chunk| {
        let mut word = [0u8; N];
        word.copy_from_slice(chunk);
        if big_endian {
            word.reverse();
        }
        word
    })
}

fn pair_up(components: Vec<f64>) -> Vec<(f64, f64)> {
    components
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .collect()
}

pub fn decode_elements(raw: &NpyArrayBytes) -> Result<NpyElements, IOError> {
    let descr = raw.header.descr;
    let body = raw.payload.as_slice();
    let big = descr.is_big_endian();

    let elements = match descr.dtype {
        DType::Bool => NpyElements::Bool(body.iter().map(|&byte| byte != 0).collect()),
        DType::I8 => NpyElements::Int(
            le_words::<1>(body, big)
                .map(|w| i64::from(i8::from_le_bytes(w)))
                .collect(),
        ),
        DType::I16 => NpyElements::Int(
            le_words::<2>(body, big)
                .map(|w| i64::from(i16::from_le_bytes(w)))
                .collect(),
        ),
        DType::I32 => NpyElements::Int(
            le_words::<4>(body, big)
                .map(|w| i64::from(i32::from_le_bytes(w)))
                .collect(),
        ),
        DType::I64 => NpyElements::Int(le_words::<8>(body, big).map(i64::from_le_bytes).collect()),
        DType::U8 => NpyElements::UInt(body.iter().map(|&byte| u64::from(byte)).collect()),
        DType::U16 => NpyElements::UInt(
            le_words::<2>(body, big)
                .map(|w| u64::from(u16::from_le_bytes(w)))
                .collect(),
        ),
        DType::U32 => NpyElements::UInt(
            le_words::<4>(body, big)
                .map(|w| u64::from(u32::from_le_bytes(w)))
                .collect(),
        ),
        DType::U64 => {
            NpyElements::UInt(le_words::<8>(body, big).map(u64::from_le_bytes).collect())
        }
        DType::F32 => NpyElements::Float(
            le_words::<4>(body, big)
                .map(|w| f64::from(f32::from_le_bytes(w)))
                .collect(),
        ),
        DType::F64 => {
            NpyElements::Float(le_words::<8>(body, big).map(f64::from_le_bytes).collect())
        }
        // Each component of a complex item is swapped independently.
        DType::Complex64 => NpyElements::Complex(pair_up(
            le_words::<4>(body, big)
                .map(|w| f64::from(f32::from_le_bytes(w)))
                .collect(),
        )),
        DType::Complex128 => NpyElements::Complex(pair_up(
            le_words::<8>(body, big).map(f64::from_le_bytes).collect(),
        )),
        DType::Object => return Err(IOError::ObjectDecodeUnsupported),
    };

    let expected = raw.header.element_count()?;
    if elements.len() != expected {
        return Err(IOError::ReadPayloadIncomplete(
            "decoded element count does not match declared shape",
        ));
    }
    Ok(elements)
}

fn push_word<const N: usize>(out: &mut Vec<u8>, mut word: [u8; N], big_endian: bool) {
    if big_endian {
        word.reverse();
    }
    out.extend_from_slice(&word);
}

const UNREPRESENTABLE: IOError =
    IOError::WriteContractViolation("element cannot be represented in target dtype");

fn as_i128(scalar: NpyScalar) -> Result<i128, IOError> {
    match scalar {
        NpyScalar::Bool(value) => Ok(i128::from(value)),
        NpyScalar::Int(value) => Ok(i128::from(value)),
        NpyScalar::UInt(value) => Ok(i128::from(value)),
        NpyScalar::Float(_) | NpyScalar::Complex(..) => Err(UNREPRESENTABLE),
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(scalar: NpyScalar) -> Result<f64, IOError> {
    match scalar {
        NpyScalar::Bool(value) => Ok(f64::from(u8::from(value))),
        NpyScalar::Int(value) => Ok(value as f64),
        NpyScalar::UInt(value) => Ok(value as f64),
        NpyScalar::Float(value) => Ok(value),
        NpyScalar::Complex(..) => Err(UNREPRESENTABLE),
    }
}

fn as_complex(scalar: NpyScalar) -> Result<(f64, f64), IOError> {
    match scalar {
        NpyScalar::Complex(re, im) => Ok((re, im)),
        other => Ok((as_f64(other)?, 0.0)),
    }
}

fn encode_scalar(
    out: &mut Vec<u8>,
    scalar: NpyScalar,
    descr: DTypeDescr,
) -> Result<(), IOError> {
    let big = descr.is_big_endian();
    match descr.dtype {
        DType::Bool => match scalar {
            NpyScalar::Bool(value) => out.push(u8::from(value)),
            _ => return Err(UNREPRESENTABLE),
        },
        DType::I8 => {
            let value = i8::try_from(as_i128(scalar)?).map_err(|_| UNREPRESENTABLE)?;
            push_word(out, value.to_le_bytes(), big);
        }
        DType::I16 => {
            let value = i16::try_from(as_i128(scalar)?).map_err(|_| UNREPRESENTABLE)?;
            push_word(out, value.to_le_bytes(), big);
        }
        DType::I32 => {
            let value = i32::try_from(as_i128(scalar)?).map_err(|_| UNREPRESENTABLE)?;
            push_word(out, value.to_le_bytes(), big);
        }
        DType::I64 => {
            let value = i64::try_from(as_i128(scalar)?).map_err(|_| UNREPRESENTABLE)?;
            push_word(out, value.to_le_bytes(), big);
        }
        DType::U8 => {
            let value = u8::try_from(as_i128(scalar)?).map_err(|_| UNREPRESENTABLE)?;
            out.push(value);
        }
        DType::U16 => {
            let value = u16::try_from(as_i128(scalar)?).map_err(|_| UNREPRESENTABLE)?;
            push_word(out, value.to_le_bytes(), big);
        }
        DType::U32 => {
            let value = u32::try_from(as_i128(scalar)?).map_err(|_| UNREPRESENTABLE)?;
            push_word(out, value.to_le_bytes(), big);
        }
        DType::U64 => {
            let value = u64::try_from(as_i128(scalar)?).map_err(|_| UNREPRESENTABLE)?;
            push_word(out, value.to_le_bytes(), big);
        }
        #[allow(clippy::cast_possible_truncation)]
        DType::F32 => push_word(out, (as_f64(scalar)? as f32).to_le_bytes(), big),
        DType::F64 => push_word(out, as_f64(scalar)?.to_le_bytes(), big),
        #[allow(clippy::cast_possible_truncation)]
        DType::Complex64 => {
            let (re, im) = as_complex(scalar)?;
            push_word(out, (re as f32).to_le_bytes(), big);
            push_word(out, (im as f32).to_le_bytes(), big);
        }
        DType::Complex128 => {
            let (re, im) = as_complex(scalar)?;
            push_word(out, re.to_le_bytes(), big);
            push_word(out, im.to_le_bytes(), big);
        }
        DType::Object => {
            return Err(IOError::WriteContractViolation(
                "object dtype requires explicit pickle/object encode path",
            ));
        }
    }
    Ok(())
}

/// Encodes elements (already in the intended storage order) as `descr` items.
pub fn encode_elements(elements: &NpyElements, descr: DTypeDescr) -> Result<Vec<u8>, IOError> {
    let item_size = descr
        .item_size()
        .ok_or(IOError::WriteContractViolation(
            "object dtype requires explicit pickle/object encode path",
        ))?;
    let mut out = Vec::with_capacity(elements.len() * item_size);
    for scalar in elements.iter() {
        encode_scalar(&mut out, scalar, descr)?;
    }
    Ok(out)
}
