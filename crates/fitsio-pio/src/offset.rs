//! Index to offset arithmetic inside an HDU's array.
//!
//! Axis 1 (`NAXIS1`) is the outermost dimension: the element at index
//! `[i, j]` of a `[a, b]` array lives at linear position `i * b + j`. A
//! shorter index addresses the start of a sub-array, trailing components
//! being zero.

use crate::error::{Error, Result};

/// Linear element offset of a possibly partial `index` into `axes`.
///
/// Every supplied component is checked against its axis length.
pub fn element_offset(axes: &[u64], index: &[u64]) -> Result<u64> {
    if index.len() > axes.len() {
        return Err(Error::TooManyIndices {
            given: index.len(),
            naxis: axes.len(),
        });
    }

    let mut offset = 0u64;
    for (d, (&i, &size)) in index.iter().zip(axes).enumerate() {
        if i >= size {
            return Err(Error::IndexOutOfRange {
                axis: d + 1,
                index: i,
                size,
            });
        }
        let stride = axes[d + 1..]
            .iter()
            .try_fold(1u64, |acc, &s| acc.checked_mul(s))
            .ok_or(Error::InvalidAxis { axis: d + 1, size })?;
        offset = i
            .checked_mul(stride)
            .and_then(|step| offset.checked_add(step))
            .ok_or(Error::InvalidAxis { axis: d + 1, size })?;
    }
    Ok(offset)
}

/// Byte offset, relative to the data block, of a `len`-byte transfer at
/// `index`, checked against the array extent.
pub fn byte_offset(axes: &[u64], width: usize, index: &[u64], len: u64) -> Result<u64> {
    let elements = element_offset(axes, index)?;
    let extent = if axes.is_empty() {
        0
    } else {
        axes.iter()
            .try_fold(width as u64, |acc, &s| acc.checked_mul(s))
            .ok_or(Error::InvalidAxis {
                axis: axes.len(),
                size: axes[axes.len() - 1],
            })?
    };
    let offset = elements
        .checked_mul(width as u64)
        .ok_or_else(|| Error::InvalidAxis {
            axis: axes.len(),
            size: axes[axes.len() - 1],
        })?;
    match offset.checked_add(len) {
        Some(end) if end <= extent => Ok(offset),
        _ => Err(Error::OutOfBounds {
            offset,
            len,
            extent,
        }),
    }
}
