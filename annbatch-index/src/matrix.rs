//! # Layout-Aware Matrices
//!
//! Batch input and output are flat buffers tagged with a layout. Logically a
//! matrix is `nitems` items of `width` values each; the layout only decides
//! where value `(item, j)` lives:
//!
//! ```text
//!   RowMajor    (item-major)   offset = item * width  + j
//!   ColumnMajor (item-minor)   offset = j    * nitems + item
//! ```
//!
//! Every batch operation goes through [`Layout::offset`], so row-major and
//! column-major calls share one code path.

use annbatch_core::error::{Error, Result};

/// Physical layout of a flat matrix buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Items are rows, stride `width`
    #[default]
    RowMajor,
    /// Items are columns, stride `nitems`
    ColumnMajor,
}

impl Layout {
    /// Flat offset of value `j` of `item`
    #[inline]
    pub fn offset(self, item: usize, j: usize, nitems: usize, width: usize) -> usize {
        match self {
            Layout::RowMajor => item * width + j,
            Layout::ColumnMajor => j * nitems + item,
        }
    }
}

/// Borrowed batch of input vectors
#[derive(Debug, Clone, Copy)]
pub struct MatrixView<'a> {
    data: &'a [f32],
    nitems: usize,
    dimension: usize,
    layout: Layout,
}

impl<'a> MatrixView<'a> {
    /// Wrap `data` as `nitems` vectors of `dimension` values.
    /// Fails if the buffer length is not `nitems * dimension`.
    pub fn new(data: &'a [f32], nitems: usize, dimension: usize, layout: Layout) -> Result<Self> {
        if data.len() != nitems * dimension {
            return Err(Error::DimensionMismatch {
                expected: nitems * dimension,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            nitems,
            dimension,
            layout,
        })
    }

    /// `nrow` items of `ncol` values, item-major
    pub fn row_major(data: &'a [f32], nrow: usize, ncol: usize) -> Result<Self> {
        Self::new(data, nrow, ncol, Layout::RowMajor)
    }

    /// `ncol` items of `nrow` values, item-minor (one item per column)
    pub fn col_major(data: &'a [f32], nrow: usize, ncol: usize) -> Result<Self> {
        Self::new(data, ncol, nrow, Layout::ColumnMajor)
    }

    pub fn nitems(&self) -> usize {
        self.nitems
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn is_empty(&self) -> bool {
        self.nitems == 0
    }

    #[inline]
    pub fn get(&self, item: usize, j: usize) -> f32 {
        self.data[self.layout.offset(item, j, self.nitems, self.dimension)]
    }

    /// Owned copy of vector `item`
    pub fn item(&self, item: usize) -> Vec<f32> {
        match self.layout {
            Layout::RowMajor => {
                let start = item * self.dimension;
                self.data[start..start + self.dimension].to_vec()
            }
            Layout::ColumnMajor => (0..self.dimension).map(|j| self.get(item, j)).collect(),
        }
    }
}

/// Owned batch output
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    data: Vec<T>,
    nitems: usize,
    width: usize,
    layout: Layout,
}

impl<T: Copy> Matrix<T> {
    /// `nitems` items of `width` values, all set to `value`
    pub fn filled(nitems: usize, width: usize, layout: Layout, value: T) -> Self {
        Self {
            data: vec![value; nitems * width],
            nitems,
            width,
            layout,
        }
    }

    #[inline]
    pub fn get(&self, item: usize, j: usize) -> T {
        self.data[self.layout.offset(item, j, self.nitems, self.width)]
    }

    #[inline]
    pub fn set(&mut self, item: usize, j: usize, value: T) {
        let offset = self.layout.offset(item, j, self.nitems, self.width);
        self.data[offset] = value;
    }

    /// Values of `item` in logical order
    pub fn item(&self, item: usize) -> Vec<T> {
        (0..self.width).map(|j| self.get(item, j)).collect()
    }

    /// Copy `values` into consecutive items starting at `first`
    pub(crate) fn scatter(&mut self, first: usize, values: &[T]) {
        for (n, chunk) in values.chunks(self.width.max(1)).enumerate() {
            for (j, &v) in chunk.iter().enumerate() {
                self.set(first + n, j, v);
            }
        }
    }

    pub fn nitems(&self) -> usize {
        self.nitems
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Physical `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        match self.layout {
            Layout::RowMajor => (self.nitems, self.width),
            Layout::ColumnMajor => (self.width, self.nitems),
        }
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}
