//! Category and shape model
//!
//! Every container carries a [`Shape`]: a closed sum type describing its
//! structural category (scalar, matrix, 3-D array, or a batch / sequence
//! wrapper around one of those) together with the geometric metadata needed
//! to map multi-indices onto linear offsets in contiguous storage.
//!
//! Consumers dispatch on [`Category`] capability predicates and on the
//! accessors here, never on ad-hoc per-call-site switches, so the category
//! set stays closed and exhaustively matched in one place.

use crate::error::{Error, Result};
use smallvec::SmallVec;

/// Stack allocation threshold for per-step length lists
///
/// Most sequences encountered in batching code are short, so we
/// stack-allocate up to 4 step lengths.
pub(crate) const STACK_STEPS: usize = 4;

/// Per-step length list for sequence categories
pub type StepLens = SmallVec<[usize; STACK_STEPS]>;

/// The structural category of a shape
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// A single element
    Scalar,
    /// A rows × cols plane
    Matrix,
    /// A pages × rows × cols volume
    ThreeDArray,
    /// N identically shaped cardinal items
    Batch,
    /// Variable-length steps over one cardinal item shape
    Sequence,
    /// A batch of sequences, each with its own step lengths
    BatchSequence,
}

impl Category {
    /// Whether this category can be the per-item shape of a batch or sequence
    #[inline]
    pub fn is_cardinal(self) -> bool {
        matches!(self, Self::Scalar | Self::Matrix | Self::ThreeDArray)
    }

    /// Whether this category is a uniform batch wrapper
    #[inline]
    pub fn is_batch(self) -> bool {
        matches!(self, Self::Batch)
    }

    /// Whether this category is a variable-length sequence wrapper
    #[inline]
    pub fn is_sequence(self) -> bool {
        matches!(self, Self::Sequence)
    }

    /// Whether this category is a batch-of-sequences wrapper
    #[inline]
    pub fn is_batch_sequence(self) -> bool {
        matches!(self, Self::BatchSequence)
    }
}

/// Shape of a container: category tag plus geometric metadata
///
/// Shapes are immutable once constructed. Wrapper categories (batch and
/// sequence) carry one cardinal shape shared by all of their items; the
/// cardinal must itself be a cardinal category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Shape {
    /// A single element; count 1
    Scalar,
    /// rows × cols elements in row-major order
    Matrix {
        /// Number of rows
        rows: usize,
        /// Number of columns
        cols: usize,
    },
    /// pages × rows × cols elements, page-major
    ThreeDArray {
        /// Number of pages
        pages: usize,
        /// Rows per page
        rows: usize,
        /// Columns per row
        cols: usize,
    },
    /// batch_num cardinal items laid out back to back
    Batch {
        /// Number of items in the batch
        batch_num: usize,
        /// Shape shared by every item
        cardinal: Box<Shape>,
    },
    /// Steps of varying length, each step holding `lens[i]` cardinal items
    ///
    /// Zero steps is a valid sequence with count 0.
    Sequence {
        /// Cardinal items per step
        lens: StepLens,
        /// Shape shared by every item
        cardinal: Box<Shape>,
    },
    /// A list of sequences, each with its own per-step lengths
    BatchSequence {
        /// Step lengths of each sequence in the batch
        seq_lens: Vec<StepLens>,
        /// Shape shared by every item
        cardinal: Box<Shape>,
    },
}

impl Shape {
    /// The scalar shape
    #[inline]
    pub fn scalar() -> Self {
        Self::Scalar
    }

    /// A rows × cols matrix shape
    #[inline]
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self::Matrix { rows, cols }
    }

    /// A pages × rows × cols 3-D array shape
    #[inline]
    pub fn three_d_array(pages: usize, rows: usize, cols: usize) -> Self {
        Self::ThreeDArray { pages, rows, cols }
    }

    /// A uniform batch of `batch_num` items of `cardinal` shape
    ///
    /// Fails if `cardinal` is not a cardinal category.
    pub fn batch(batch_num: usize, cardinal: Shape) -> Result<Self> {
        Self::check_cardinal(&cardinal)?;
        Ok(Self::Batch {
            batch_num,
            cardinal: Box::new(cardinal),
        })
    }

    /// A sequence with the given per-step lengths over a `cardinal` shape
    pub fn sequence(lens: &[usize], cardinal: Shape) -> Result<Self> {
        Self::check_cardinal(&cardinal)?;
        Ok(Self::Sequence {
            lens: lens.iter().copied().collect(),
            cardinal: Box::new(cardinal),
        })
    }

    /// A batch of sequences, each with its own per-step lengths
    pub fn batch_sequence(seq_lens: Vec<StepLens>, cardinal: Shape) -> Result<Self> {
        Self::check_cardinal(&cardinal)?;
        Ok(Self::BatchSequence {
            seq_lens,
            cardinal: Box::new(cardinal),
        })
    }

    fn check_cardinal(cardinal: &Shape) -> Result<()> {
        if cardinal.category().is_cardinal() {
            Ok(())
        } else {
            Err(Error::NonCardinalShape {
                category: cardinal.category(),
            })
        }
    }

    /// The structural category of this shape
    pub fn category(&self) -> Category {
        match self {
            Self::Scalar => Category::Scalar,
            Self::Matrix { .. } => Category::Matrix,
            Self::ThreeDArray { .. } => Category::ThreeDArray,
            Self::Batch { .. } => Category::Batch,
            Self::Sequence { .. } => Category::Sequence,
            Self::BatchSequence { .. } => Category::BatchSequence,
        }
    }

    /// Total element count
    pub fn count(&self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Matrix { rows, cols } => rows * cols,
            Self::ThreeDArray { pages, rows, cols } => pages * rows * cols,
            Self::Batch {
                batch_num,
                cardinal,
            } => batch_num * cardinal.count(),
            Self::Sequence { lens, cardinal } => {
                lens.iter().sum::<usize>() * cardinal.count()
            }
            Self::BatchSequence { seq_lens, cardinal } => {
                let items: usize = seq_lens
                    .iter()
                    .map(|lens| lens.iter().sum::<usize>())
                    .sum();
                items * cardinal.count()
            }
        }
    }

    /// The per-item shape of a batch or sequence category
    ///
    /// Returns `None` for cardinal categories, which have no item sub-shape.
    pub fn cardinal(&self) -> Option<&Shape> {
        match self {
            Self::Batch { cardinal, .. }
            | Self::Sequence { cardinal, .. }
            | Self::BatchSequence { cardinal, .. } => Some(cardinal),
            _ => None,
        }
    }

    /// Number of items in a batch or batch-sequence
    pub fn batch_num(&self) -> Option<usize> {
        match self {
            Self::Batch { batch_num, .. } => Some(*batch_num),
            Self::BatchSequence { seq_lens, .. } => Some(seq_lens.len()),
            _ => None,
        }
    }

    /// Number of steps in a sequence
    pub fn step_num(&self) -> Option<usize> {
        match self {
            Self::Sequence { lens, .. } => Some(lens.len()),
            _ => None,
        }
    }

    /// Extent of the leading axis, if the shape has one
    pub fn outer_extent(&self) -> Option<usize> {
        match self {
            Self::Scalar => None,
            Self::Matrix { rows, .. } => Some(*rows),
            Self::ThreeDArray { pages, .. } => Some(*pages),
            Self::Batch { batch_num, .. } => Some(*batch_num),
            Self::Sequence { lens, .. } => Some(lens.len()),
            Self::BatchSequence { seq_lens, .. } => Some(seq_lens.len()),
        }
    }

    /// Number of coordinates a full multi-index into this shape requires
    pub fn rank(&self) -> usize {
        match self {
            Self::Scalar => 0,
            Self::Matrix { .. } => 2,
            Self::ThreeDArray { .. } => 3,
            Self::Batch { cardinal, .. } => 1 + cardinal.rank(),
            Self::Sequence { cardinal, .. } => 2 + cardinal.rank(),
            Self::BatchSequence { cardinal, .. } => 3 + cardinal.rank(),
        }
    }

    /// Map a full multi-index onto its linear element offset
    ///
    /// The map is strict: a wrong coordinate count fails with
    /// [`Error::CoordRank`] and any coordinate past its axis extent fails
    /// with [`Error::CoordOutOfBounds`]; offsets are never clamped.
    pub fn offset_of(&self, coords: &[usize]) -> Result<usize> {
        if coords.len() != self.rank() {
            return Err(Error::CoordRank {
                expected: self.rank(),
                got: coords.len(),
            });
        }
        self.offset_unchecked_rank(coords, 0)
    }

    /// Offset computation after the rank check; `base_axis` numbers axes in
    /// error reports when recursing into cardinals.
    fn offset_unchecked_rank(&self, coords: &[usize], base_axis: usize) -> Result<usize> {
        let check = |axis: usize, index: usize, extent: usize| -> Result<usize> {
            if index < extent {
                Ok(index)
            } else {
                Err(Error::CoordOutOfBounds {
                    axis: base_axis + axis,
                    index,
                    extent,
                })
            }
        };

        match self {
            Self::Scalar => Ok(0),
            Self::Matrix { rows, cols } => {
                let i = check(0, coords[0], *rows)?;
                let j = check(1, coords[1], *cols)?;
                Ok(i * cols + j)
            }
            Self::ThreeDArray { pages, rows, cols } => {
                let p = check(0, coords[0], *pages)?;
                let i = check(1, coords[1], *rows)?;
                let j = check(2, coords[2], *cols)?;
                Ok((p * rows + i) * cols + j)
            }
            Self::Batch {
                batch_num,
                cardinal,
            } => {
                let b = check(0, coords[0], *batch_num)?;
                let inner = cardinal.offset_unchecked_rank(&coords[1..], base_axis + 1)?;
                Ok(b * cardinal.count() + inner)
            }
            Self::Sequence { lens, cardinal } => {
                let step = check(0, coords[0], lens.len())?;
                let item = check(1, coords[1], lens[step])?;
                let skipped: usize = lens[..step].iter().sum();
                let inner = cardinal.offset_unchecked_rank(&coords[2..], base_axis + 2)?;
                Ok((skipped + item) * cardinal.count() + inner)
            }
            Self::BatchSequence { seq_lens, cardinal } => {
                let b = check(0, coords[0], seq_lens.len())?;
                let lens = &seq_lens[b];
                let step = check(1, coords[1], lens.len())?;
                let item = check(2, coords[2], lens[step])?;
                let skipped_seqs: usize = seq_lens[..b]
                    .iter()
                    .map(|l| l.iter().sum::<usize>())
                    .sum();
                let skipped: usize = lens[..step].iter().sum();
                let inner = cardinal.offset_unchecked_rank(&coords[3..], base_axis + 3)?;
                Ok((skipped_seqs + skipped + item) * cardinal.count() + inner)
            }
        }
    }

    /// Rank-reduced sub-shape at a leading index
    ///
    /// Returns the element offset where the sub-shape begins together with
    /// the sub-shape itself:
    ///
    /// - Batch → the cardinal item shape
    /// - Sequence → a batch of `lens[index]` cardinal items (zero-length
    ///   steps yield a valid empty view)
    /// - BatchSequence → the indexed sequence
    /// - ThreeDArray → one matrix page
    /// - Matrix → one row as a 1 × cols matrix (the category set has no
    ///   vector type)
    ///
    /// Sequence categories prefix-sum the step lengths before `index`, so
    /// this is linear in `index` for them.
    pub fn sub_shape(&self, index: usize) -> Result<(usize, Shape)> {
        match self {
            Self::Scalar => Err(Error::index_oob(index, 0)),
            Self::Matrix { rows, cols } => {
                if index >= *rows {
                    return Err(Error::index_oob(index, *rows));
                }
                Ok((index * cols, Shape::matrix(1, *cols)))
            }
            Self::ThreeDArray { pages, rows, cols } => {
                if index >= *pages {
                    return Err(Error::index_oob(index, *pages));
                }
                Ok((index * rows * cols, Shape::matrix(*rows, *cols)))
            }
            Self::Batch {
                batch_num,
                cardinal,
            } => {
                if index >= *batch_num {
                    return Err(Error::index_oob(index, *batch_num));
                }
                Ok((index * cardinal.count(), (**cardinal).clone()))
            }
            Self::Sequence { lens, cardinal } => {
                if index >= lens.len() {
                    return Err(Error::index_oob(index, lens.len()));
                }
                let skipped: usize = lens[..index].iter().sum();
                let sub = Shape::Batch {
                    batch_num: lens[index],
                    cardinal: cardinal.clone(),
                };
                Ok((skipped * cardinal.count(), sub))
            }
            Self::BatchSequence { seq_lens, cardinal } => {
                if index >= seq_lens.len() {
                    return Err(Error::index_oob(index, seq_lens.len()));
                }
                let skipped: usize = seq_lens[..index]
                    .iter()
                    .map(|l| l.iter().sum::<usize>())
                    .sum();
                let sub = Shape::Sequence {
                    lens: seq_lens[index].clone(),
                    cardinal: cardinal.clone(),
                };
                Ok((skipped * cardinal.count(), sub))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinal_counts() {
        assert_eq!(Shape::scalar().count(), 1);
        assert_eq!(Shape::matrix(10, 20).count(), 200);
        assert_eq!(Shape::three_d_array(7, 10, 20).count(), 1400);
    }

    #[test]
    fn test_batch_count_and_predicates() {
        let b = Shape::batch(3, Shape::matrix(10, 20)).unwrap();
        assert_eq!(b.count(), 600);
        assert_eq!(b.batch_num(), Some(3));
        assert!(b.category().is_batch());
        assert!(!b.category().is_cardinal());
        assert_eq!(b.cardinal(), Some(&Shape::matrix(10, 20)));
    }

    #[test]
    fn test_sequence_count() {
        let s = Shape::sequence(&[3, 0, 5], Shape::matrix(2, 2)).unwrap();
        assert_eq!(s.count(), 8 * 4);
        assert_eq!(s.step_num(), Some(3));

        let empty = Shape::sequence(&[], Shape::scalar()).unwrap();
        assert_eq!(empty.count(), 0);
        assert_eq!(empty.step_num(), Some(0));
    }

    #[test]
    fn test_wrapper_rejects_non_cardinal() {
        let batch = Shape::batch(2, Shape::scalar()).unwrap();
        let err = Shape::batch(2, batch).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::NonCardinalShape {
                category: Category::Batch
            }
        ));
    }

    #[test]
    fn test_matrix_offsets() {
        let m = Shape::matrix(3, 4);
        assert_eq!(m.offset_of(&[0, 0]).unwrap(), 0);
        assert_eq!(m.offset_of(&[2, 3]).unwrap(), 11);
        assert!(m.offset_of(&[3, 0]).is_err());
        assert!(m.offset_of(&[0]).is_err());
    }

    #[test]
    fn test_batch_offsets() {
        let b = Shape::batch(3, Shape::matrix(2, 2)).unwrap();
        assert_eq!(b.offset_of(&[1, 0, 0]).unwrap(), 4);
        assert_eq!(b.offset_of(&[2, 1, 1]).unwrap(), 11);
        assert!(b.offset_of(&[3, 0, 0]).is_err());
    }

    #[test]
    fn test_sequence_offsets_prefix_sum() {
        let s = Shape::sequence(&[3, 0, 5], Shape::scalar()).unwrap();
        assert_eq!(s.offset_of(&[0, 2]).unwrap(), 2);
        assert_eq!(s.offset_of(&[2, 0]).unwrap(), 3);
        assert_eq!(s.offset_of(&[2, 4]).unwrap(), 7);
        // step 1 holds no items
        assert!(s.offset_of(&[1, 0]).is_err());
    }

    #[test]
    fn test_sequence_sub_shape() {
        let card = Shape::matrix(2, 2);
        let s = Shape::sequence(&[3, 0, 5], card.clone()).unwrap();

        let (off0, sub0) = s.sub_shape(0).unwrap();
        assert_eq!(off0, 0);
        assert_eq!(sub0.batch_num(), Some(3));

        let (off1, sub1) = s.sub_shape(1).unwrap();
        assert_eq!(off1, 12);
        assert_eq!(sub1.count(), 0);

        let (off2, sub2) = s.sub_shape(2).unwrap();
        assert_eq!(off2, 12);
        assert_eq!(sub2, Shape::batch(5, card).unwrap());

        assert!(matches!(
            s.sub_shape(3),
            Err(crate::error::Error::IndexOutOfBounds { index: 3, extent: 3 })
        ));
    }

    #[test]
    fn test_batch_sequence_shape() {
        let lens_a: StepLens = [2, 1].into_iter().collect();
        let lens_b: StepLens = [3].into_iter().collect();
        let bs =
            Shape::batch_sequence(vec![lens_a.clone(), lens_b], Shape::scalar()).unwrap();
        assert_eq!(bs.count(), 6);
        assert_eq!(bs.batch_num(), Some(2));

        let (off, sub) = bs.sub_shape(1).unwrap();
        assert_eq!(off, 3);
        assert_eq!(sub, Shape::sequence(&[3], Shape::scalar()).unwrap());

        assert_eq!(bs.offset_of(&[1, 0, 2]).unwrap(), 5);
        assert_eq!(bs.offset_of(&[0, 1, 0]).unwrap(), 2);
    }

    #[test]
    fn test_three_d_sub_shape() {
        let t = Shape::three_d_array(4, 2, 3);
        let (off, sub) = t.sub_shape(2).unwrap();
        assert_eq!(off, 12);
        assert_eq!(sub, Shape::matrix(2, 3));
        assert!(t.sub_shape(4).is_err());
    }
}
