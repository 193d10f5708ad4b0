#![forbid(unsafe_code)]

pub mod elements;

use core::fmt;

use npv_dtype::{DType, DTypeDescr, DTypeError};
use npv_ndarray::{
    FlatPositions, MemoryOrder, NdLayout, element_count, element_strides, unravel_index,
};

pub use elements::{NpyElements, NpyScalar, decode_elements, encode_elements};
pub use npv_ndarray::ShapeError;

pub const NPY_MAGIC_PREFIX: [u8; 6] = [0x93, b'N', b'U', b'M', b'P', b'Y'];
pub const MAX_HEADER_BYTES: usize = 65_536 * 16;
pub const HEADER_ALIGNMENT: usize = 64;
pub const PICKLE_PROTOCOL_MARKER: u8 = 0x80;

pub const IO_REASON_CODES: [&str; 7] = [
    "io_magic_invalid",
    "io_header_schema_invalid",
    "io_dtype_descriptor_invalid",
    "io_write_contract_violation",
    "io_read_payload_incomplete",
    "io_pickle_policy_violation",
    "io_object_decode_unsupported",
];
const NPY_HEADER_REQUIRED_KEYS: [&str; 3] = ["descr", "fortran_order", "shape"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IOError {
    MagicInvalid,
    HeaderSchemaInvalid(&'static str),
    DTypeDescriptorInvalid(DTypeError),
    WriteContractViolation(&'static str),
    ReadPayloadIncomplete(&'static str),
    PicklePolicyViolation,
    ObjectDecodeUnsupported,
}

impl IOError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MagicInvalid => "io_magic_invalid",
            Self::HeaderSchemaInvalid(_) => "io_header_schema_invalid",
            Self::DTypeDescriptorInvalid(_) => "io_dtype_descriptor_invalid",
            Self::WriteContractViolation(_) => "io_write_contract_violation",
            Self::ReadPayloadIncomplete(_) => "io_read_payload_incomplete",
            Self::PicklePolicyViolation => "io_pickle_policy_violation",
            Self::ObjectDecodeUnsupported => "io_object_decode_unsupported",
        }
    }
}

impl fmt::Display for IOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MagicInvalid => write!(f, "invalid or unsupported npy magic/version"),
            Self::HeaderSchemaInvalid(msg) => write!(f, "{msg}"),
            Self::DTypeDescriptorInvalid(err) => write!(f, "{err}"),
            Self::WriteContractViolation(msg) => write!(f, "{msg}"),
            Self::ReadPayloadIncomplete(msg) => write!(f, "{msg}"),
            Self::PicklePolicyViolation => write!(f, "pickle/object payload rejected by policy"),
            Self::ObjectDecodeUnsupported => {
                write!(f, "object arrays cannot be decoded into numeric elements")
            }
        }
    }
}

impl std::error::Error for IOError {}

impl From<DTypeError> for IOError {
    fn from(err: DTypeError) -> Self {
        Self::DTypeDescriptorInvalid(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub shape: Vec<usize>,
    pub fortran_order: bool,
    pub descr: DTypeDescr,
}

impl NpyHeader {
    #[must_use]
    pub fn c_order(descr: DTypeDescr, shape: Vec<usize>) -> Self {
        Self {
            shape,
            fortran_order: false,
            descr,
        }
    }

    pub fn element_count(&self) -> Result<usize, IOError> {
        element_count(&self.shape)
            .map_err(|_| IOError::HeaderSchemaInvalid("shape element-count overflowed"))
    }

    #[must_use]
    pub fn memory_order(&self) -> MemoryOrder {
        MemoryOrder::from_fortran_flag(self.fortran_order)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyArrayBytes {
    pub version: (u8, u8),
    pub header: NpyHeader,
    pub payload: Vec<u8>,
}

fn npy_length_field_size(version: (u8, u8)) -> Result<usize, IOError> {
    match version {
        (1, 0) => Ok(2),
        (2, 0) | (3, 0) => Ok(4),
        _ => Err(IOError::MagicInvalid),
    }
}

fn format_shape_tuple(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [single] => format!("({single},)"),
        _ => {
            let joined = shape
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!("({joined})")
        }
    }
}

fn encode_header_dict(header: &NpyHeader) -> String {
    let fortran_order = if header.fortran_order {
        "True"
    } else {
        "False"
    };
    format!(
        "{{'descr': '{}', 'fortran_order': {fortran_order}, 'shape': {}, }}",
        header.descr.descr(),
        format_shape_tuple(&header.shape)
    )
}

/// Header dictionary terminated by `\n` and space-padded so that the preamble
/// plus header ends on a `HEADER_ALIGNMENT` boundary.
fn encode_npy_header_bytes(header: &NpyHeader, version: (u8, u8)) -> Result<Vec<u8>, IOError> {
    let prefix_len = NPY_MAGIC_PREFIX.len() + 2 + npy_length_field_size(version)?;
    let dictionary = encode_header_dict(header);
    let unpadded = prefix_len + dictionary.len() + 1;
    let padding = (HEADER_ALIGNMENT - unpadded % HEADER_ALIGNMENT) % HEADER_ALIGNMENT;
    let header_len = dictionary.len() + padding + 1;
    if header_len > MAX_HEADER_BYTES {
        return Err(IOError::HeaderSchemaInvalid(
            "header bytes must be within bounded budget",
        ));
    }

    let mut header_bytes = Vec::with_capacity(header_len);
    header_bytes.extend_from_slice(dictionary.as_bytes());
    header_bytes.extend(std::iter::repeat_n(b' ', padding));
    header_bytes.push(b'\n');
    Ok(header_bytes)
}

fn write_npy_preamble(
    buffer: &mut Vec<u8>,
    version: (u8, u8),
    header_len: usize,
) -> Result<(), IOError> {
    buffer.extend_from_slice(&NPY_MAGIC_PREFIX);
    buffer.push(version.0);
    buffer.push(version.1);
    match version {
        (1, 0) => {
            let header_len = u16::try_from(header_len).map_err(|_| {
                IOError::HeaderSchemaInvalid("version 1.0 header length exceeds u16 boundary")
            })?;
            buffer.extend_from_slice(&header_len.to_le_bytes());
        }
        (2, 0) | (3, 0) => {
            let header_len = u32::try_from(header_len)
                .map_err(|_| IOError::HeaderSchemaInvalid("header length exceeds u32 boundary"))?;
            buffer.extend_from_slice(&header_len.to_le_bytes());
        }
        _ => return Err(IOError::MagicInvalid),
    }
    Ok(())
}

/// Offset and length of the header dictionary.
fn read_header_span(payload: &[u8], version: (u8, u8)) -> Result<(usize, usize), IOError> {
    let header_offset = NPY_MAGIC_PREFIX.len() + 2 + npy_length_field_size(version)?;
    let Some(length_field) = payload.get(8..header_offset) else {
        return Err(IOError::HeaderSchemaInvalid(
            "payload truncated before header length field",
        ));
    };
    let header_len = match *length_field {
        [lo, hi] => usize::from(u16::from_le_bytes([lo, hi])),
        [b0, b1, b2, b3] => usize::try_from(u32::from_le_bytes([b0, b1, b2, b3])).map_err(|_| {
            IOError::HeaderSchemaInvalid("header length exceeds platform usize boundary")
        })?,
        _ => return Err(IOError::MagicInvalid),
    };

    if header_len == 0 || header_len > MAX_HEADER_BYTES {
        return Err(IOError::HeaderSchemaInvalid(
            "header bytes must be within bounded budget",
        ));
    }
    if payload.len() < header_offset + header_len {
        return Err(IOError::HeaderSchemaInvalid(
            "payload truncated before declared header bytes",
        ));
    }

    Ok((header_offset, header_len))
}

fn extract_after_key<'a>(dictionary: &'a str, key: &str) -> Result<&'a str, IOError> {
    let single = format!("'{key}'");
    let double = format!("\"{key}\"");
    let key_start = dictionary
        .find(&single)
        .or_else(|| dictionary.find(&double))
        .ok_or(IOError::HeaderSchemaInvalid(
            "required header field is missing",
        ))?;
    let tail = dictionary[key_start + single.len()..].trim_start();
    let tail = tail.strip_prefix(':').ok_or(IOError::HeaderSchemaInvalid(
        "header field is missing ':' separator",
    ))?;
    Ok(tail.trim_start())
}

fn parse_quoted_value(value: &str) -> Result<&str, IOError> {
    let quote = match value.chars().next() {
        Some(quote @ ('\'' | '"')) => quote,
        Some(_) => {
            return Err(IOError::HeaderSchemaInvalid(
                "header quoted value must start with quote",
            ));
        }
        None => return Err(IOError::HeaderSchemaInvalid("header quoted value is empty")),
    };

    let tail = &value[1..];
    let end = tail.find(quote).ok_or(IOError::HeaderSchemaInvalid(
        "header quoted value missing closing quote",
    ))?;
    Ok(&tail[..end])
}

fn parse_shape_tuple(tuple_literal: &str) -> Result<Vec<usize>, IOError> {
    let inner = tuple_literal.trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }

    let tokens = inner.split(',').map(str::trim).collect::<Vec<_>>();
    let last = tokens.len() - 1;
    let shape = tokens
        .iter()
        .enumerate()
        // Only the trailing comma may leave an empty token behind.
        .filter(|&(position, token)| !(position == last && token.is_empty()))
        .map(|(_, &token)| {
            // Python 2 era writers emit long literals such as `10L`.
            let token = token.strip_suffix('L').unwrap_or(token);
            token
                .parse::<usize>()
                .map_err(|_| IOError::HeaderSchemaInvalid("shape tuple entries must be usize"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if shape.is_empty() {
        return Err(IOError::HeaderSchemaInvalid(
            "shape tuple contains no dimensions",
        ));
    }
    if shape.len() == 1 && !inner.contains(',') {
        return Err(IOError::HeaderSchemaInvalid(
            "singleton shape tuples must include trailing comma",
        ));
    }

    Ok(shape)
}

/// Quoted tokens directly followed by `:`, in order of appearance.
fn parse_header_keys(dictionary: &str) -> Result<Vec<&str>, IOError> {
    let bytes = dictionary.as_bytes();
    let mut keys: Vec<&str> = Vec::new();
    let mut idx = 0usize;

    while idx < bytes.len() {
        let quote = bytes[idx];
        if quote != b'\'' && quote != b'"' {
            idx += 1;
            continue;
        }

        let start = idx + 1;
        idx = start;
        while idx < bytes.len() {
            let escaped = idx > start && bytes[idx - 1] == b'\\';
            if bytes[idx] == quote && !escaped {
                break;
            }
            idx += 1;
        }
        if idx >= bytes.len() {
            return Err(IOError::HeaderSchemaInvalid(
                "header key/value quote is not terminated",
            ));
        }
        let token = &dictionary[start..idx];
        idx += 1;

        while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
            idx += 1;
        }
        if bytes.get(idx) == Some(&b':') {
            if keys.contains(&token) {
                return Err(IOError::HeaderSchemaInvalid(
                    "header dictionary contains duplicate keys",
                ));
            }
            keys.push(token);
        }
    }

    Ok(keys)
}

fn parse_header_dictionary(header_bytes: &[u8], version: (u8, u8)) -> Result<NpyHeader, IOError> {
    if version != (3, 0) && !header_bytes.is_ascii() {
        return Err(IOError::HeaderSchemaInvalid(
            "version 1.0/2.0 header must be ascii",
        ));
    }
    let dictionary = std::str::from_utf8(header_bytes)
        .map_err(|_| IOError::HeaderSchemaInvalid("header bytes must decode as utf-8"))?;
    let dictionary = dictionary.trim_end();
    if !(dictionary.starts_with('{') && dictionary.ends_with('}')) {
        return Err(IOError::HeaderSchemaInvalid(
            "header dictionary must be wrapped in braces",
        ));
    }

    let keys = parse_header_keys(dictionary)?;
    if keys.len() != NPY_HEADER_REQUIRED_KEYS.len()
        || NPY_HEADER_REQUIRED_KEYS
            .iter()
            .any(|required| !keys.contains(required))
    {
        return Err(IOError::HeaderSchemaInvalid(
            "header dictionary must contain exactly descr/fortran_order/shape keys",
        ));
    }

    let descr_literal = parse_quoted_value(extract_after_key(dictionary, "descr")?)?;
    let descr = DTypeDescr::parse(descr_literal)?;

    let fortran_tail = extract_after_key(dictionary, "fortran_order")?;
    let fortran_order = if fortran_tail.starts_with("True") {
        true
    } else if fortran_tail.starts_with("False") {
        false
    } else {
        return Err(IOError::HeaderSchemaInvalid(
            "fortran_order field must be True or False",
        ));
    };

    let shape_tail = extract_after_key(dictionary, "shape")?
        .strip_prefix('(')
        .ok_or(IOError::HeaderSchemaInvalid(
            "shape field must begin with tuple syntax",
        ))?;
    let shape_end = shape_tail.find(')').ok_or(IOError::HeaderSchemaInvalid(
        "shape tuple missing closing ')'",
    ))?;
    let shape = parse_shape_tuple(&shape_tail[..shape_end])?;

    let header = NpyHeader {
        shape,
        fortran_order,
        descr,
    };
    header.element_count()?;
    Ok(header)
}

pub fn validate_magic_version(payload: &[u8]) -> Result<(u8, u8), IOError> {
    if payload.len() < 8 || payload[..6] != NPY_MAGIC_PREFIX {
        return Err(IOError::MagicInvalid);
    }

    let version = (payload[6], payload[7]);
    npy_length_field_size(version)?;
    Ok(version)
}

/// Parses the preamble and header, returning the version, the header and the
/// offset at which array data begins.
pub fn read_npy_header(payload: &[u8]) -> Result<((u8, u8), NpyHeader, usize), IOError> {
    let version = validate_magic_version(payload)?;
    let (header_offset, header_len) = read_header_span(payload, version)?;
    let data_offset = header_offset + header_len;
    let header = parse_header_dictionary(&payload[header_offset..data_offset], version)?;
    Ok((version, header, data_offset))
}

/// Number of elements a data section of `payload_len` bytes holds for `header`.
pub fn validate_read_payload(header: &NpyHeader, payload_len: usize) -> Result<usize, IOError> {
    let expected_count = header
        .element_count()
        .map_err(|_| IOError::ReadPayloadIncomplete("failed to compute expected element count"))?;
    let item_size = header
        .descr
        .item_size()
        .ok_or(IOError::ReadPayloadIncomplete(
            "object dtype has no fixed item size",
        ))?;
    let expected_bytes = expected_count
        .checked_mul(item_size)
        .ok_or(IOError::ReadPayloadIncomplete("expected payload size overflowed"))?;
    if payload_len < expected_bytes {
        return Err(IOError::ReadPayloadIncomplete(
            "payload is truncated relative to declared shape",
        ));
    }
    if payload_len > expected_bytes {
        return Err(IOError::ReadPayloadIncomplete(
            "payload carries trailing bytes beyond declared shape",
        ));
    }
    Ok(expected_count)
}

fn validate_object_payload(header: &NpyHeader, payload: &[u8]) -> Result<(), &'static str> {
    let expected_count = header
        .element_count()
        .map_err(|_| "failed to compute element count for object payload")?;
    match (expected_count, payload.first()) {
        (0, None) => Ok(()),
        (0, Some(_)) => Err("zero-sized object payload must be empty"),
        (_, None) => Err("object dtype payload requires explicit pickle byte stream"),
        (_, Some(&PICKLE_PROTOCOL_MARKER)) => Ok(()),
        (_, Some(_)) => Err("object dtype payload must start with pickle protocol marker"),
    }
}

pub fn enforce_pickle_policy(descr: DTypeDescr, allow_pickle: bool) -> Result<(), IOError> {
    if descr.dtype == DType::Object && !allow_pickle {
        return Err(IOError::PicklePolicyViolation);
    }
    Ok(())
}

pub fn read_npy_bytes(payload: &[u8], allow_pickle: bool) -> Result<NpyArrayBytes, IOError> {
    let (version, header, data_offset) = read_npy_header(payload)?;
    let body = &payload[data_offset..];

    enforce_pickle_policy(header.descr, allow_pickle)?;
    if header.descr.dtype == DType::Object {
        validate_object_payload(&header, body).map_err(IOError::ReadPayloadIncomplete)?;
    } else {
        validate_read_payload(&header, body.len())?;
    }

    Ok(NpyArrayBytes {
        version,
        header,
        payload: body.to_vec(),
    })
}

/// Smallest version whose length field can hold the encoded header.
pub fn select_npy_version(header: &NpyHeader) -> Result<(u8, u8), IOError> {
    let v1_header = encode_npy_header_bytes(header, (1, 0))?;
    if v1_header.len() <= usize::from(u16::MAX) {
        Ok((1, 0))
    } else {
        Ok((2, 0))
    }
}

pub fn write_npy_bytes(
    header: &NpyHeader,
    payload: &[u8],
    allow_pickle: bool,
) -> Result<Vec<u8>, IOError> {
    let version = select_npy_version(header)?;
    write_npy_bytes_with_version(header, payload, version, allow_pickle)
}

pub fn write_npy_bytes_with_version(
    header: &NpyHeader,
    payload: &[u8],
    version: (u8, u8),
    allow_pickle: bool,
) -> Result<Vec<u8>, IOError> {
    npy_length_field_size(version)?;
    enforce_pickle_policy(header.descr, allow_pickle)?;
    if header.descr.dtype == DType::Object {
        validate_object_payload(header, payload).map_err(IOError::WriteContractViolation)?;
    } else {
        validate_read_payload(header, payload.len()).map_err(|_| {
            IOError::WriteContractViolation("payload bytes must match shape and dtype item size")
        })?;
    }

    let header_bytes = encode_npy_header_bytes(header, version)?;
    let mut encoded = Vec::with_capacity(
        NPY_MAGIC_PREFIX.len()
            + 2
            + npy_length_field_size(version)?
            + header_bytes.len()
            + payload.len(),
    );
    write_npy_preamble(&mut encoded, version, header_bytes.len())?;
    encoded.extend_from_slice(&header_bytes);
    encoded.extend_from_slice(payload);
    Ok(encoded)
}

/// A decoded `.npy` array: header metadata plus typed elements in storage order.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub version: (u8, u8),
    pub header: NpyHeader,
    elements: NpyElements,
    element_strides: Vec<usize>,
    byte_strides: Vec<usize>,
}

/// Element and byte strides of a contiguous buffer for `header`.
fn header_strides(
    header: &NpyHeader,
    item_size: usize,
) -> Result<(Vec<usize>, Vec<usize>), ShapeError> {
    let layout = NdLayout::contiguous(header.shape.clone(), item_size, header.memory_order())?;
    let element_strides = element_strides(&layout.shape, layout.order)?;
    // Validates the position arithmetic once so flat() cannot fail later.
    layout.c_order_positions()?;
    Ok((element_strides, layout.byte_strides()?))
}

impl NpyArray {
    pub fn from_bytes(payload: &[u8], allow_pickle: bool) -> Result<Self, IOError> {
        let raw = read_npy_bytes(payload, allow_pickle)?;
        Self::from_raw(&raw)
    }

    pub fn from_raw(raw: &NpyArrayBytes) -> Result<Self, IOError> {
        let elements = decode_elements(raw)?;
        let item_size = raw
            .header
            .descr
            .item_size()
            .ok_or(IOError::ObjectDecodeUnsupported)?;
        let (element_strides, byte_strides) = header_strides(&raw.header, item_size)
            .map_err(|_| IOError::HeaderSchemaInvalid("shape stride arithmetic overflowed"))?;
        Ok(Self {
            version: raw.version,
            header: raw.header.clone(),
            elements,
            element_strides,
            byte_strides,
        })
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.header.shape
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.header.shape.len()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn descr(&self) -> DTypeDescr {
        self.header.descr
    }

    /// Byte step per axis within the data section, like NumPy's `a.strides`.
    #[must_use]
    pub fn strides(&self) -> &[usize] {
        &self.byte_strides
    }

    /// Elements in storage order, exactly as laid out in the file.
    #[must_use]
    pub fn storage(&self) -> &NpyElements {
        &self.elements
    }

    /// Element at a multi-index, `None` when the rank or any axis is out of range.
    #[must_use]
    pub fn get(&self, index: &[usize]) -> Option<NpyScalar> {
        if index.len() != self.ndim() {
            return None;
        }
        let mut position = 0usize;
        for ((&i, &dim), &stride) in index
            .iter()
            .zip(&self.header.shape)
            .zip(&self.element_strides)
        {
            if i >= dim {
                return None;
            }
            position += i * stride;
        }
        self.elements.get(position)
    }

    /// The `flat`-th element in C order, like NumPy's `a.item(flat)`.
    pub fn item(&self, flat: usize) -> Result<NpyScalar, ShapeError> {
        let index = unravel_index(&self.header.shape, flat)?;
        self.get(&index).ok_or(ShapeError::IndexOutOfBounds {
            index: flat,
            len: self.size(),
        })
    }

    /// Same elements under a new shape, read and refilled in C order. The
    /// result is always stored C-contiguous.
    pub fn reshape(&self, shape: Vec<usize>) -> Result<Self, ShapeError> {
        let target = element_count(&shape)?;
        if target != self.size() {
            return Err(ShapeError::SizeMismatch {
                from: self.size(),
                to: target,
            });
        }

        let elements = if self.header.fortran_order {
            self.elements.gather(self.flat_positions()?)
        } else {
            self.elements.clone()
        };
        let header = NpyHeader::c_order(self.header.descr, shape);
        let item_size = header.descr.item_size().ok_or(ShapeError::InvalidItemSize)?;
        let (element_strides, byte_strides) = header_strides(&header, item_size)?;
        Ok(Self {
            version: self.version,
            header,
            elements,
            element_strides,
            byte_strides,
        })
    }

    fn flat_positions(&self) -> Result<FlatPositions, ShapeError> {
        FlatPositions::new(&self.header.shape, self.header.memory_order())
    }

    /// Elements in C order of the logical array, like NumPy's `a.flat`.
    #[must_use]
    pub fn flat(&self) -> FlatIter<'_> {
        FlatIter {
            elements: &self.elements,
            positions: self.flat_positions().ok(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlatIter<'a> {
    elements: &'a NpyElements,
    positions: Option<FlatPositions>,
}

impl Iterator for FlatIter<'_> {
    type Item = NpyScalar;

    fn next(&mut self) -> Option<NpyScalar> {
        let position = self.positions.as_mut()?.next()?;
        self.elements.get(position)
    }
}
