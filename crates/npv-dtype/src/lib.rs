#![forbid(unsafe_code)]

use core::fmt;

/// Element types that can appear in a `.npy` descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Complex64,
    Complex128,
    /// Python objects; the payload is a pickle stream.
    Object,
}

impl DType {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::U8 => "uint8",
            Self::U16 => "uint16",
            Self::U32 => "uint32",
            Self::U64 => "uint64",
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
            Self::Object => "object",
        }
    }

    /// `None` for object arrays, whose items have no fixed width on disk.
    #[must_use]
    pub const fn item_size(self) -> Option<usize> {
        match self {
            Self::Bool | Self::I8 | Self::U8 => Some(1),
            Self::I16 | Self::U16 => Some(2),
            Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 | Self::Complex64 => Some(8),
            Self::Complex128 => Some(16),
            Self::Object => None,
        }
    }

    #[must_use]
    pub const fn kind(self) -> char {
        match self {
            Self::Bool => 'b',
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => 'i',
            Self::U8 | Self::U16 | Self::U32 | Self::U64 => 'u',
            Self::F32 | Self::F64 => 'f',
            Self::Complex64 | Self::Complex128 => 'c',
            Self::Object => 'O',
        }
    }

    #[must_use]
    pub const fn from_kind_and_size(kind: char, item_size: usize) -> Option<Self> {
        match (kind, item_size) {
            ('b', 1) => Some(Self::Bool),
            ('i', 1) => Some(Self::I8),
            ('i', 2) => Some(Self::I16),
            ('i', 4) => Some(Self::I32),
            ('i', 8) => Some(Self::I64),
            ('u', 1) => Some(Self::U8),
            ('u', 2) => Some(Self::U16),
            ('u', 4) => Some(Self::U32),
            ('u', 8) => Some(Self::U64),
            ('f', 4) => Some(Self::F32),
            ('f', 8) => Some(Self::F64),
            ('c', 8) => Some(Self::Complex64),
            ('c', 16) => Some(Self::Complex128),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
    /// Single-byte and object items, rendered as `|`.
    NotApplicable,
}

impl ByteOrder {
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::Little => '<',
            Self::Big => '>',
            Self::NotApplicable => '|',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DTypeError {
    EmptyDescriptor,
    UnknownByteOrder(char),
    UnsupportedDescriptor(String),
}

impl DTypeError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::EmptyDescriptor => "dtype_descriptor_empty",
            Self::UnknownByteOrder(_) => "dtype_byte_order_unknown",
            Self::UnsupportedDescriptor(_) => "dtype_descriptor_unsupported",
        }
    }
}

impl fmt::Display for DTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDescriptor => write!(f, "dtype descriptor is empty"),
            Self::UnknownByteOrder(symbol) => {
                write!(f, "unknown byte-order symbol {symbol:?} in dtype descriptor")
            }
            Self::UnsupportedDescriptor(descr) => {
                write!(f, "dtype descriptor {descr:?} is not supported")
            }
        }
    }
}

impl std::error::Error for DTypeError {}

/// A parsed array-protocol type string such as `<i4` or `>f8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DTypeDescr {
    pub dtype: DType,
    pub byte_order: ByteOrder,
}

impl DTypeDescr {
    /// Descriptor in host byte order, the way writers emit fresh arrays.
    #[must_use]
    pub const fn native(dtype: DType) -> Self {
        Self::with_byte_order(dtype, ByteOrder::native())
    }

    #[must_use]
    pub const fn with_byte_order(dtype: DType, byte_order: ByteOrder) -> Self {
        let byte_order = match dtype.item_size() {
            Some(1) | None => ByteOrder::NotApplicable,
            _ => match byte_order {
                ByteOrder::NotApplicable => ByteOrder::native(),
                other => other,
            },
        };
        Self { dtype, byte_order }
    }

    pub fn parse(descr: &str) -> Result<Self, DTypeError> {
        let mut chars = descr.chars();
        let Some(first) = chars.next() else {
            return Err(DTypeError::EmptyDescriptor);
        };

        let (byte_order, body) = match first {
            '<' => (ByteOrder::Little, chars.as_str()),
            '>' | '!' => (ByteOrder::Big, chars.as_str()),
            '=' => (ByteOrder::native(), chars.as_str()),
            '|' => (ByteOrder::NotApplicable, chars.as_str()),
            c if c.is_ascii_alphabetic() => (ByteOrder::NotApplicable, descr),
            other => return Err(DTypeError::UnknownByteOrder(other)),
        };

        if body == "O" || body == "O8" || body == "O4" {
            return Ok(Self::with_byte_order(DType::Object, byte_order));
        }

        let mut body_chars = body.chars();
        let kind = body_chars
            .next()
            .ok_or_else(|| DTypeError::UnsupportedDescriptor(descr.to_string()))?;
        let item_size = body_chars
            .as_str()
            .parse::<usize>()
            .map_err(|_| DTypeError::UnsupportedDescriptor(descr.to_string()))?;
        let dtype = DType::from_kind_and_size(kind, item_size)
            .ok_or_else(|| DTypeError::UnsupportedDescriptor(descr.to_string()))?;

        Ok(Self::with_byte_order(dtype, byte_order))
    }

    /// Canonical string for the `descr` header field.
    #[must_use]
    pub fn descr(&self) -> String {
        match self.dtype.item_size() {
            Some(size) => format!("{}{}{size}", self.byte_order.symbol(), self.dtype.kind()),
            None => "|O".to_string(),
        }
    }

    #[must_use]
    pub const fn item_size(&self) -> Option<usize> {
        self.dtype.item_size()
    }

    /// Whether multi-byte items must be reversed to read them as little-endian.
    #[must_use]
    pub fn is_big_endian(&self) -> bool {
        self.byte_order == ByteOrder::Big
    }
}

impl fmt::Display for DTypeDescr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descr())
    }
}
