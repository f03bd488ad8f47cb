//! Common types and traits shared by the grouping stages.
//!
//! This module defines the cross-section value used for similarity checks
//! and the trait abstractions that items, bundles and batches implement.

/// Global numerical tolerance for floating-point comparisons in tests and summaries.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Width/height pair of an item, the only dimensions compared for similarity.
///
/// The length component of an item never takes part in grouping decisions.
///
/// # Examples
/// ```
/// use box_bundler::types::CrossSection;
///
/// let a = CrossSection::new(70.0, 50.0);
/// let b = CrossSection::new(68.0, 53.0);
/// assert!(a.within(&b, 3.0));
/// assert!(!a.within(&b, 2.0));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrossSection {
    pub width: f64,
    pub height: f64,
}

impl CrossSection {
    /// Creates a new cross-section.
    #[inline]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Extracts the cross-section from a (length, width, height) triple.
    #[inline]
    pub const fn from_dims(dims: (f64, f64, f64)) -> Self {
        Self::new(dims.1, dims.2)
    }

    /// Absolute width difference to another cross-section.
    #[inline]
    pub fn width_deviation(&self, other: &Self) -> f64 {
        (self.width - other.width).abs()
    }

    /// Absolute height difference to another cross-section.
    #[inline]
    pub fn height_deviation(&self, other: &Self) -> f64 {
        (self.height - other.height).abs()
    }

    /// Checks whether both axes lie within `tolerance` of another cross-section.
    ///
    /// A NaN component never lies within any tolerance.
    #[inline]
    pub fn within(&self, other: &Self, tolerance: f64) -> bool {
        self.width_deviation(other) <= tolerance && self.height_deviation(other) <= tolerance
    }
}

/// Trait for objects with (length, width, height) dimensions.
pub trait Dimensional {
    /// Returns the dimensions as (length, width, height).
    fn dimensions(&self) -> (f64, f64, f64);

    /// Returns the width/height cross-section.
    fn cross_section(&self) -> CrossSection {
        CrossSection::from_dims(self.dimensions())
    }
}

/// Trait for objects with weight.
///
/// Provides a common interface for weight sums across units, bundles and batches.
pub trait Weighted {
    /// Returns the weight in kg.
    fn weight(&self) -> f64;
}

/// Sums the weights of a slice in order.
pub fn total_weight<T: Weighted>(entries: &[T]) -> f64 {
    entries.iter().map(Weighted::weight).sum()
}
