#![forbid(unsafe_code)]

/// Storage order of array elements in a contiguous buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOrder {
    C,
    F,
}

impl MemoryOrder {
    #[must_use]
    pub fn from_fortran_flag(fortran_order: bool) -> Self {
        if fortran_order { Self::F } else { Self::C }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    InvalidItemSize,
    Overflow,
    IndexOutOfBounds { index: usize, len: usize },
    SizeMismatch { from: usize, to: usize },
}

impl std::fmt::Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidItemSize => write!(f, "item size must be > 0"),
            Self::Overflow => write!(f, "size arithmetic overflow"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "flat index {index} out of bounds for {len} elements")
            }
            Self::SizeMismatch { from, to } => {
                write!(f, "cannot reshape {from} elements into a shape holding {to}")
            }
        }
    }
}

impl std::error::Error for ShapeError {}

/// Number of elements described by `shape`; `()` is a scalar holding one.
pub fn element_count(shape: &[usize]) -> Result<usize, ShapeError> {
    shape.iter().try_fold(1usize, |acc, &dim| {
        acc.checked_mul(dim).ok_or(ShapeError::Overflow)
    })
}

/// Strides measured in elements rather than bytes.
pub fn element_strides(shape: &[usize], order: MemoryOrder) -> Result<Vec<usize>, ShapeError> {
    let mut strides = vec![0usize; shape.len()];
    let mut stride = 1usize;
    match order {
        MemoryOrder::C => {
            for (i, &dim) in shape.iter().enumerate().rev() {
                strides[i] = stride;
                stride = stride.checked_mul(dim).ok_or(ShapeError::Overflow)?;
            }
        }
        MemoryOrder::F => {
            for (i, &dim) in shape.iter().enumerate() {
                strides[i] = stride;
                stride = stride.checked_mul(dim).ok_or(ShapeError::Overflow)?;
            }
        }
    }
    Ok(strides)
}

pub fn contiguous_strides(
    shape: &[usize],
    item_size: usize,
    order: MemoryOrder,
) -> Result<Vec<usize>, ShapeError> {
    if item_size == 0 {
        return Err(ShapeError::InvalidItemSize);
    }
    element_strides(shape, order)?
        .into_iter()
        .map(|s| s.checked_mul(item_size).ok_or(ShapeError::Overflow))
        .collect()
}

/// Logical multi-index of the `flat`-th element in C order.
pub fn unravel_index(shape: &[usize], flat: usize) -> Result<Vec<usize>, ShapeError> {
    let len = element_count(shape)?;
    if flat >= len {
        return Err(ShapeError::IndexOutOfBounds { index: flat, len });
    }
    let mut remaining = flat;
    let mut index = vec![0usize; shape.len()];
    for (slot, &dim) in index.iter_mut().zip(shape).rev() {
        *slot = remaining % dim;
        remaining /= dim;
    }
    Ok(index)
}

/// Shape and storage order of a contiguous buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdLayout {
    pub shape: Vec<usize>,
    pub order: MemoryOrder,
    pub item_size: usize,
}

impl NdLayout {
    pub fn contiguous(
        shape: Vec<usize>,
        item_size: usize,
        order: MemoryOrder,
    ) -> Result<Self, ShapeError> {
        if item_size == 0 {
            return Err(ShapeError::InvalidItemSize);
        }
        element_count(&shape)?;
        Ok(Self {
            shape,
            order,
            item_size,
        })
    }

    pub fn size(&self) -> Result<usize, ShapeError> {
        element_count(&self.shape)
    }

    pub fn nbytes(&self) -> Result<usize, ShapeError> {
        self.size()?
            .checked_mul(self.item_size)
            .ok_or(ShapeError::Overflow)
    }

    pub fn byte_strides(&self) -> Result<Vec<usize>, ShapeError> {
        contiguous_strides(&self.shape, self.item_size, self.order)
    }

    /// Storage positions of the elements, visited in logical C order.
    pub fn c_order_positions(&self) -> Result<FlatPositions, ShapeError> {
        FlatPositions::new(&self.shape, self.order)
    }
}

/// Iterator over buffer element positions in C (row-major) order of the
/// logical array, whatever order the buffer itself is stored in.
#[derive(Debug, Clone)]
pub struct FlatPositions {
    shape: Vec<usize>,
    strides: Vec<usize>,
    index: Vec<usize>,
    offset: usize,
    remaining: usize,
    identity: bool,
}

impl FlatPositions {
    pub fn new(shape: &[usize], order: MemoryOrder) -> Result<Self, ShapeError> {
        let remaining = element_count(shape)?;
        let strides = element_strides(shape, order)?;
        // A buffer with at most one non-unit axis is laid out identically in both orders.
        let identity =
            order == MemoryOrder::C || shape.iter().filter(|&&dim| dim > 1).count() <= 1;
        Ok(Self {
            shape: shape.to_vec(),
            strides,
            index: vec![0; shape.len()],
            offset: 0,
            remaining,
            identity,
        })
    }

    fn advance(&mut self) {
        for axis in (0..self.shape.len()).rev() {
            self.index[axis] += 1;
            self.offset += self.strides[axis];
            if self.index[axis] < self.shape[axis] {
                return;
            }
            self.offset -= self.strides[axis] * self.index[axis];
            self.index[axis] = 0;
        }
    }
}

impl Iterator for FlatPositions {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.offset;
        self.remaining -= 1;
        if self.identity {
            self.offset += 1;
        } else if self.remaining > 0 {
            self.advance();
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for FlatPositions {}

#[cfg(test)]
mod tests {
    use super::{
        FlatPositions, MemoryOrder, NdLayout, ShapeError, contiguous_strides, element_count,
        element_strides, unravel_index,
    };

    #[test]
    fn scalar_shape_holds_one_element() {
        assert_eq!(element_count(&[]).expect("scalar"), 1);
        assert_eq!(element_count(&[10, 0, 3]).expect("empty axis"), 0);
    }

    #[test]
    fn element_count_reports_overflow() {
        let err = element_count(&[usize::MAX, 2]).expect_err("overflow");
        assert_eq!(err, ShapeError::Overflow);
    }

    #[test]
    fn contiguous_strides_c_and_f_orders() {
        let c = contiguous_strides(&[2, 3, 4], 8, MemoryOrder::C).expect("c-order");
        let f = contiguous_strides(&[2, 3, 4], 8, MemoryOrder::F).expect("f-order");
        assert_eq!(c, vec![96, 32, 8]);
        assert_eq!(f, vec![8, 16, 48]);
        assert_eq!(
            contiguous_strides(&[2], 0, MemoryOrder::C).expect_err("zero item size"),
            ShapeError::InvalidItemSize
        );
    }

    #[test]
    fn c_order_positions_are_identity_for_c_buffers() {
        let positions = FlatPositions::new(&[10, 11, 12], MemoryOrder::C)
            .expect("positions")
            .collect::<Vec<_>>();
        assert_eq!(positions, (0..1320).collect::<Vec<_>>());
    }

    #[test]
    fn c_order_positions_transpose_fortran_buffers() {
        // Logical [[0, 1, 2], [3, 4, 5]] stored column-major is [0, 3, 1, 4, 2, 5].
        let positions = FlatPositions::new(&[2, 3], MemoryOrder::F)
            .expect("positions")
            .collect::<Vec<_>>();
        assert_eq!(positions, vec![0, 2, 4, 1, 3, 5]);

        let storage = [0, 3, 1, 4, 2, 5];
        let logical = positions.iter().map(|&p| storage[p]).collect::<Vec<_>>();
        assert_eq!(logical, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn fortran_positions_match_unravelled_strides() {
        let shape = [3, 4, 5];
        let strides = element_strides(&shape, MemoryOrder::F).expect("strides");
        let positions = FlatPositions::new(&shape, MemoryOrder::F).expect("positions");
        assert_eq!(positions.len(), 60);
        for (flat, position) in positions.enumerate() {
            let index = unravel_index(&shape, flat).expect("in bounds");
            let expected = index.iter().zip(&strides).map(|(i, s)| i * s).sum::<usize>();
            assert_eq!(position, expected, "flat index {flat}");
        }
    }

    #[test]
    fn scalar_and_empty_layouts_iterate_as_expected() {
        let scalar = FlatPositions::new(&[], MemoryOrder::F).expect("scalar");
        assert_eq!(scalar.collect::<Vec<_>>(), vec![0]);
        let empty = FlatPositions::new(&[4, 0], MemoryOrder::F).expect("empty");
        assert_eq!(empty.count(), 0);
    }

    #[test]
    fn unravel_rejects_out_of_bounds() {
        assert_eq!(unravel_index(&[2, 3], 5).expect("last"), vec![1, 2]);
        assert_eq!(
            unravel_index(&[2, 3], 6).expect_err("past end"),
            ShapeError::IndexOutOfBounds { index: 6, len: 6 }
        );
    }

    #[test]
    fn layout_nbytes_is_consistent() {
        let layout = NdLayout::contiguous(vec![5, 6], 4, MemoryOrder::C).expect("layout");
        assert_eq!(layout.nbytes().expect("nbytes"), 120);
        assert_eq!(layout.size().expect("elements"), 30);
        assert_eq!(layout.byte_strides().expect("strides"), vec![24, 4]);
        assert_eq!(layout.c_order_positions().expect("positions").len(), 30);
    }
}
