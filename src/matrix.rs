//! Dense row-major matrices and the `.ds2` file format.
//!
//! A `.ds2` file is a little-endian `u32` row count, a `u32` column count,
//! then `rows * cols` little-endian elements. Vectors are stored as `f32` or
//! `f64`, reference neighbor ids as `i32`.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::format::HEADER_BYTES;
use crate::error::{PivotKnnError, Result};
use crate::types::{Float, MatrixElement};

/// An immutable `rows × cols` matrix stored row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: MatrixElement> Matrix<T> {
    /// Create a matrix from a row-major buffer.
    ///
    /// Fails if `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        let expected = rows
            .checked_mul(cols)
            .ok_or_else(|| PivotKnnError::invalid_parameter("rows * cols overflows usize"))?;
        if data.len() != expected {
            return Err(PivotKnnError::dimension_mismatch(expected, data.len()));
        }
        Ok(Self { rows, cols, data })
    }

    /// Create a matrix from a list of equally sized rows.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in &rows {
            if row.len() != cols {
                return Err(PivotKnnError::dimension_mismatch(cols, row.len()));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// True if the matrix holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow row `i`.
    ///
    /// # Panics
    /// Panics if `i >= rows`.
    #[inline]
    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Iterate over rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        // chunks_exact(0) panics, so zero-width matrices yield `rows` empty slices.
        (0..self.rows).map(move |i| self.row(i))
    }

    /// The whole row-major buffer.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Size of the element buffer in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len() * T::SIZE
    }

    /// Load a matrix from a `.ds2` file.
    ///
    /// A missing file surfaces as [`PivotKnnError::Io`]; a short header or a
    /// body with fewer than `rows * cols` elements as [`PivotKnnError::InvalidFormat`].
    /// Bytes past the last element are ignored.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut header = [0u8; HEADER_BYTES];
        read_exact_or_format(&mut reader, &mut header, || {
            format!("{}: truncated header", path.display())
        })?;
        let rows = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let cols = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

        let count = rows.checked_mul(cols).ok_or_else(|| {
            PivotKnnError::invalid_format(format!("{}: {rows} x {cols} overflows", path.display()))
        })?;
        let byte_len = count.checked_mul(T::SIZE).ok_or_else(|| {
            PivotKnnError::invalid_format(format!("{}: {rows} x {cols} overflows", path.display()))
        })?;

        // Reject a header that promises more than the file holds before
        // reserving anything for the body.
        let available = file_len.saturating_sub(HEADER_BYTES as u64);
        if (byte_len as u64) > available {
            return Err(PivotKnnError::invalid_format(format!(
                "{}: truncated data, expected {count} elements of {} bytes, found {available} bytes",
                path.display(),
                T::SIZE
            )));
        }

        let mut bytes = crate::error::try_zeroed::<u8>("matrix data", byte_len)?;
        read_exact_or_format(&mut reader, &mut bytes, || {
            format!(
                "{}: truncated data, expected {count} elements of {} bytes",
                path.display(),
                T::SIZE
            )
        })?;

        let data: Vec<T> = bytes.chunks_exact(T::SIZE).map(T::from_le_slice).collect();

        tracing::debug!(path = %path.display(), rows, cols, "loaded matrix");
        Ok(Self { rows, cols, data })
    }

    /// Write the matrix to a `.ds2` file, the inverse of [`Matrix::load`].
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let rows = u32::try_from(self.rows)
            .map_err(|_| PivotKnnError::invalid_parameter("row count exceeds u32"))?;
        let cols = u32::try_from(self.cols)
            .map_err(|_| PivotKnnError::invalid_parameter("column count exceeds u32"))?;

        let mut bytes = Vec::with_capacity(HEADER_BYTES + self.size_bytes());
        bytes.extend_from_slice(&rows.to_le_bytes());
        bytes.extend_from_slice(&cols.to_le_bytes());
        for &value in &self.data {
            value.extend_le(&mut bytes);
        }

        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }
}

impl<T: Float> Matrix<T> {
    /// Generate a matrix with entries uniformly distributed in [-1.0, 1.0).
    ///
    /// Deterministic for a given seed.
    pub fn random(rows: usize, cols: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = (0..rows * cols)
            .map(|_| T::from_f64(rng.gen_range(-1.0..1.0)))
            .collect();
        Self { rows, cols, data }
    }
}

fn read_exact_or_format(
    reader: &mut impl Read,
    buf: &mut [u8],
    context: impl FnOnce() -> String,
) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
            Err(PivotKnnError::invalid_format(context()))
        }
        Err(err) => Err(err.into()),
    }
}
