// Copyright 2025 Zurich Instruments AG
// SPDX-License-Identifier: Apache-2.0

//! Multi-dimensional slice addressing with numpy semantics.

use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

use numeric_array::element_count;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceElem {
    /// A single position; the axis is dropped from the result shape.
    Index(isize),
    /// A half-open range with an optional step. Missing bounds select to the
    /// respective end of the axis.
    Range {
        start: Option<isize>,
        stop: Option<isize>,
        step: isize,
    },
}

impl SliceElem {
    pub fn full() -> Self {
        SliceElem::Range {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// Replace the step of a range. Indices are returned unchanged.
    pub fn step_by(self, step: isize) -> Self {
        match self {
            SliceElem::Range { start, stop, .. } => SliceElem::Range { start, stop, step },
            index => index,
        }
    }
}

macro_rules! impl_slice_elem_from {
    ($($int:ty),*) => {$(
        impl From<$int> for SliceElem {
            fn from(index: $int) -> Self {
                SliceElem::Index(index as isize)
            }
        }

        impl From<Range<$int>> for SliceElem {
            fn from(range: Range<$int>) -> Self {
                SliceElem::Range {
                    start: Some(range.start as isize),
                    stop: Some(range.end as isize),
                    step: 1,
                }
            }
        }

        impl From<RangeFrom<$int>> for SliceElem {
            fn from(range: RangeFrom<$int>) -> Self {
                SliceElem::Range {
                    start: Some(range.start as isize),
                    stop: None,
                    step: 1,
                }
            }
        }

        impl From<RangeTo<$int>> for SliceElem {
            fn from(range: RangeTo<$int>) -> Self {
                SliceElem::Range {
                    start: None,
                    stop: Some(range.end as isize),
                    step: 1,
                }
            }
        }
    )*};
}

impl_slice_elem_from!(isize, i32, usize);

impl From<RangeFull> for SliceElem {
    fn from(_: RangeFull) -> Self {
        SliceElem::full()
    }
}

/// A selection of elements: one [`SliceElem`] per leading axis. Axes
/// without an element are selected in full.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection(Vec<SliceElem>);

/// Build a [`Selection`], e.g. `sel![1, ..3]` for numpy's `[1, :3]`.
#[macro_export]
macro_rules! sel {
    ($($elem:expr),* $(,)?) => {
        $crate::Selection::new(vec![$($crate::SliceElem::from($elem)),*])
    };
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("too many indices: {given} given for {ndim} dimension(s)")]
    TooManyIndices { given: usize, ndim: usize },

    #[error("index {index} is out of bounds for axis {axis} with size {size}")]
    OutOfBounds {
        index: isize,
        axis: usize,
        size: usize,
    },

    #[error("slice step cannot be zero")]
    ZeroStep,
}

/// A selection resolved against a concrete shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Region {
    /// Flat, row-major positions of the selected elements, in selection order.
    pub indices: Vec<usize>,
    /// Shape of the selected block, with indexed axes dropped.
    pub shape: Vec<usize>,
}

impl Selection {
    pub fn new(elems: Vec<SliceElem>) -> Self {
        Selection(elems)
    }

    pub fn elems(&self) -> &[SliceElem] {
        &self.0
    }

    pub(crate) fn resolve(&self, shape: &[usize]) -> Result<Region, SelectionError> {
        if self.0.len() > shape.len() {
            return Err(SelectionError::TooManyIndices {
                given: self.0.len(),
                ndim: shape.len(),
            });
        }
        let mut axes = Vec::with_capacity(shape.len());
        let mut region_shape = Vec::new();
        for (axis, &size) in shape.iter().enumerate() {
            let elem = self.0.get(axis).copied().unwrap_or_else(SliceElem::full);
            match elem {
                SliceElem::Index(index) => {
                    let position = if index < 0 {
                        index + size as isize
                    } else {
                        index
                    };
                    if position < 0 || position >= size as isize {
                        return Err(SelectionError::OutOfBounds { index, axis, size });
                    }
                    axes.push(vec![position as usize]);
                }
                SliceElem::Range { start, stop, step } => {
                    if step == 0 {
                        return Err(SelectionError::ZeroStep);
                    }
                    let positions = range_positions(start, stop, step, size);
                    region_shape.push(positions.len());
                    axes.push(positions);
                }
            }
        }
        Ok(Region {
            indices: flat_indices(shape, &axes),
            shape: region_shape,
        })
    }
}

impl From<Vec<SliceElem>> for Selection {
    fn from(elems: Vec<SliceElem>) -> Self {
        Selection(elems)
    }
}

impl FromIterator<SliceElem> for Selection {
    fn from_iter<T: IntoIterator<Item = SliceElem>>(iter: T) -> Self {
        Selection(iter.into_iter().collect())
    }
}

fn range_positions(start: Option<isize>, stop: Option<isize>, step: isize, size: usize) -> Vec<usize> {
    let n = size as isize;
    if step > 0 {
        let clamp = |v: isize| if v < 0 { (v + n).max(0) } else { v.min(n) };
        let lo = start.map_or(0, clamp);
        let hi = stop.map_or(n, clamp);
        (lo..hi).step_by(step as usize).map(|p| p as usize).collect()
    } else {
        let clamp = |v: isize| if v < 0 { (v + n).max(-1) } else { v.min(n - 1) };
        let hi = start.map_or(n - 1, clamp);
        let lo = stop.map_or(-1, clamp);
        let mut positions = Vec::new();
        let mut p = hi;
        while p > lo {
            positions.push(p as usize);
            p += step;
        }
        positions
    }
}

fn flat_indices(shape: &[usize], axes: &[Vec<usize>]) -> Vec<usize> {
    if axes.iter().any(Vec::is_empty) {
        return Vec::new();
    }
    let strides: Vec<usize> = (0..shape.len())
        .map(|axis| element_count(&shape[axis + 1..]))
        .collect();
    let count = axes.iter().map(Vec::len).product();
    let mut indices: Vec<usize> = Vec::with_capacity(count);
    let mut counter = vec![0; axes.len()];
    loop {
        indices.push(
            counter
                .iter()
                .zip(axes)
                .zip(&strides)
                .map(|((&c, positions), stride)| positions[c] * stride)
                .sum(),
        );
        let mut axis = axes.len();
        loop {
            if axis == 0 {
                return indices;
            }
            axis -= 1;
            counter[axis] += 1;
            if counter[axis] < axes[axis].len() {
                break;
            }
            counter[axis] = 0;
        }
    }
}
