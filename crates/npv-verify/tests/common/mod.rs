#![allow(dead_code)]

use npv_dtype::{ByteOrder, DType, DTypeDescr};
use npv_io::{NpyElements, NpyHeader, encode_elements, write_npy_bytes_with_version};
use std::fs;
use std::path::Path;

/// How one reference fixture is laid out on disk.
#[derive(Debug, Clone, Copy)]
pub struct FixtureSpec {
    pub name: &'static str,
    pub dtype: DType,
    pub shape: &'static [usize],
    pub version: (u8, u8),
}

pub const REFERENCE_FIXTURES: [FixtureSpec; 10] = [
    FixtureSpec {
        name: "version_1_0_int.npy",
        dtype: DType::I32,
        shape: &[10, 11, 12],
        version: (1, 0),
    },
    FixtureSpec {
        name: "version_2_0_int.npy",
        dtype: DType::I32,
        shape: &[10, 11, 12],
        version: (2, 0),
    },
    FixtureSpec {
        name: "version_1_0_double.npy",
        dtype: DType::F64,
        shape: &[10, 11, 12],
        version: (1, 0),
    },
    FixtureSpec {
        name: "version_2_0_double.npy",
        dtype: DType::F64,
        shape: &[10, 11, 12],
        version: (2, 0),
    },
    FixtureSpec {
        name: "two_dimension_fixed.npy",
        dtype: DType::I32,
        shape: &[10, 11],
        version: (1, 0),
    },
    FixtureSpec {
        name: "two_dimension_variable.npy",
        dtype: DType::I32,
        shape: &[10, 11],
        version: (1, 0),
    },
    FixtureSpec {
        name: "one_dimension_fixed.npy",
        dtype: DType::I32,
        shape: &[10],
        version: (1, 0),
    },
    FixtureSpec {
        name: "one_dimension_variable.npy",
        dtype: DType::I32,
        shape: &[10],
        version: (1, 0),
    },
    FixtureSpec {
        name: "zero_dimension_fixed.npy",
        dtype: DType::I32,
        shape: &[],
        version: (1, 0),
    },
    FixtureSpec {
        name: "zero_dimension_variable.npy",
        dtype: DType::I32,
        shape: &[],
        version: (1, 0),
    },
];

pub fn spec(name: &str) -> FixtureSpec {
    REFERENCE_FIXTURES
        .into_iter()
        .find(|spec| spec.name == name)
        .unwrap_or_else(|| panic!("unknown fixture {name}"))
}

pub fn element_count(spec: &FixtureSpec) -> usize {
    spec.shape.iter().product()
}

pub fn arange_elements(dtype: DType, count: usize) -> NpyElements {
    let count = i64::try_from(count).expect("count fits i64");
    if dtype.is_float() {
        NpyElements::Float((0..count).map(|v| v as f64).collect())
    } else {
        NpyElements::Int((0..count).collect())
    }
}

pub fn encode_fixture(
    spec: &FixtureSpec,
    byte_order: ByteOrder,
    fortran_order: bool,
    elements: &NpyElements,
) -> Vec<u8> {
    let descr = DTypeDescr::with_byte_order(spec.dtype, byte_order);
    let header = NpyHeader {
        shape: spec.shape.to_vec(),
        fortran_order,
        descr,
    };
    let payload = encode_elements(elements, descr).expect("encode payload");
    write_npy_bytes_with_version(&header, &payload, spec.version, false).expect("encode npy")
}

pub fn write_fixture_elements(dir: &Path, spec: &FixtureSpec, elements: &NpyElements) {
    let bytes = encode_fixture(spec, ByteOrder::native(), false, elements);
    fs::write(dir.join(spec.name), bytes).expect("write fixture");
}

/// Writes all ten fixtures as `arange(size)` reshaped to their declared shape.
pub fn write_reference_fixtures(dir: &Path) {
    for spec in &REFERENCE_FIXTURES {
        let elements = arange_elements(spec.dtype, element_count(spec));
        write_fixture_elements(dir, spec, &elements);
    }
}
