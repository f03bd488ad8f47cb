//! Data models for the two-stage grouping.
//!
//! This module defines the fundamental data structures:
//! - `Item`: A source record with dimensions, weight and repeat quantity
//! - `ItemUnit`: One placeable copy of an item produced by expansion
//! - `Bundle`: Similar units grouped under a weight cap
//! - `Batch`: Whole bundles consolidated under a weight cap
//!
//! All structures implement the traits from the `types` module.

use crate::types::{Dimensional, Weighted};

/// Validation error for item and configuration data.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    InvalidDimension(String),
    InvalidWeight(String),
    InvalidQuantity(String),
    InvalidConfiguration(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidDimension(msg) => write!(f, "Invalid dimension: {}", msg),
            ValidationError::InvalidWeight(msg) => write!(f, "Invalid weight: {}", msg),
            ValidationError::InvalidQuantity(msg) => write!(f, "Invalid quantity: {}", msg),
            ValidationError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

fn validate_dimension(value: f64, name: &str) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidDimension(format!(
            "{} must be a finite number, got: {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_weight_value(value: f64) -> Result<(), ValidationError> {
    if value < 0.0 || !value.is_finite() {
        return Err(ValidationError::InvalidWeight(format!(
            "Weight must be a non-negative finite number, got: {}",
            value
        )));
    }
    Ok(())
}

// Negative quantities are accepted and expand to zero units.
fn validate_quantity_value(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidQuantity(format!(
            "Quantity must be a finite number, got: {}",
            value
        )));
    }
    Ok(())
}

fn validate_item_params(
    dims: (f64, f64, f64),
    weight: f64,
    quantity: f64,
) -> Result<(), ValidationError> {
    validate_dimension(dims.0, "Length")?;
    validate_dimension(dims.1, "Width")?;
    validate_dimension(dims.2, "Height")?;
    validate_weight_value(weight)?;
    validate_quantity_value(quantity)?;
    Ok(())
}

/// A source record describing `quantity` identical physical units.
///
/// Items are immutable once constructed; grouping works on the units
/// produced by [`Item::units`].
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    name: String,
    dims: (f64, f64, f64),
    weight: f64,
    quantity: f64,
}

impl Item {
    /// Creates a new item after validating its raw fields.
    ///
    /// # Parameters
    /// * `name` - Identifying label, not required to be unique
    /// * `dims` - Dimensions (length, width, height)
    /// * `weight` - Weight of one unit in kg
    /// * `quantity` - Number of units; truncated when expanding
    ///
    /// # Returns
    /// `Ok(Item)` for usable values, otherwise `Err(ValidationError)`
    ///
    /// # Examples
    /// ```
    /// use box_bundler::model::Item;
    ///
    /// let ok = Item::new("Box1", (2.0, 70.0, 50.0), 23.0, 4.0);
    /// assert!(ok.is_ok());
    ///
    /// let invalid = Item::new("Box1", (2.0, 70.0, 50.0), -1.0, 4.0);
    /// assert!(invalid.is_err());
    /// ```
    pub fn new(
        name: impl Into<String>,
        dims: (f64, f64, f64),
        weight: f64,
        quantity: f64,
    ) -> Result<Self, ValidationError> {
        validate_item_params(dims, weight, quantity)?;
        Ok(Self::from_raw(name, dims, weight, quantity))
    }

    /// Creates an item from fields that were already coerced by the data source.
    ///
    /// No validation happens here; malformed quantities simply expand to zero units.
    pub fn from_raw(
        name: impl Into<String>,
        dims: (f64, f64, f64),
        weight: f64,
        quantity: f64,
    ) -> Self {
        Self {
            name: name.into(),
            dims,
            weight,
            quantity,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> (f64, f64, f64) {
        self.dims
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    /// Number of placeable units this item expands into.
    ///
    /// The quantity is truncated toward zero. Zero, negative and non-finite
    /// quantities contribute no units.
    pub fn unit_count(&self) -> usize {
        if self.quantity.is_finite() && self.quantity >= 1.0 {
            self.quantity.trunc() as usize
        } else {
            0
        }
    }

    /// Expands the item into independent units tagged with `source`.
    ///
    /// Callers bound the total via [`expanded_unit_count`] before expanding.
    pub fn units(&self, source: usize) -> impl Iterator<Item = ItemUnit> + '_ {
        (0..self.unit_count()).map(move |_| ItemUnit {
            source,
            name: self.name.clone(),
            dims: self.dims,
            weight: self.weight,
        })
    }
}

/// Total number of units a sequence of items expands into, saturating at `usize::MAX`.
pub fn expanded_unit_count(items: &[Item]) -> usize {
    items
        .iter()
        .fold(0usize, |total, item| total.saturating_add(item.unit_count()))
}

impl Dimensional for Item {
    fn dimensions(&self) -> (f64, f64, f64) {
        self.dims
    }
}

impl Weighted for Item {
    fn weight(&self) -> f64 {
        self.weight
    }
}

/// One placeable copy of an [`Item`].
///
/// # Fields
/// * `source` - Position of the originating item in the input sequence
/// * `name` - Label copied from the item
/// * `dims` - Dimensions (length, width, height)
/// * `weight` - Weight in kg
#[derive(Clone, Debug, PartialEq)]
pub struct ItemUnit {
    source: usize,
    name: String,
    dims: (f64, f64, f64),
    weight: f64,
}

impl ItemUnit {
    pub fn source(&self) -> usize {
        self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> (f64, f64, f64) {
        self.dims
    }
}

impl Dimensional for ItemUnit {
    fn dimensions(&self) -> (f64, f64, f64) {
        self.dims
    }
}

impl Weighted for ItemUnit {
    fn weight(&self) -> f64 {
        self.weight
    }
}

/// Append-only group of similar units.
///
/// A bundle always holds at least one unit. The first unit is the anchor
/// every later member was compared against; it is never replaced.
#[derive(Clone, Debug, PartialEq)]
pub struct Bundle {
    units: Vec<ItemUnit>,
    total_weight: f64,
}

impl Bundle {
    /// Opens a new bundle with `anchor` as its first member.
    pub fn open(anchor: ItemUnit) -> Self {
        let total_weight = anchor.weight;
        Self {
            units: vec![anchor],
            total_weight,
        }
    }

    pub(crate) fn push(&mut self, unit: ItemUnit) {
        self.total_weight += unit.weight;
        self.units.push(unit);
    }

    /// The unit that opened the bundle.
    pub fn anchor(&self) -> &ItemUnit {
        &self.units[0]
    }

    /// Members in placement order.
    pub fn units(&self) -> &[ItemUnit] {
        &self.units
    }

    /// Sum of member weights, accumulated in placement order.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// `false` for every bundle produced by [`Bundle::open`].
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Member names in placement order.
    pub fn names(&self) -> Vec<&str> {
        self.units.iter().map(ItemUnit::name).collect()
    }

    /// Member dimensions in placement order.
    pub fn dimensions(&self) -> Vec<(f64, f64, f64)> {
        self.units.iter().map(ItemUnit::dims).collect()
    }

    /// Checks whether the bundle weighs more than `cap`.
    pub fn exceeds(&self, cap: f64) -> bool {
        self.total_weight > cap
    }
}

impl Weighted for Bundle {
    fn weight(&self) -> f64 {
        self.total_weight
    }
}

/// Group of whole bundles consolidated by weight.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    bundles: Vec<Bundle>,
    total_weight: f64,
}

impl Batch {
    pub(crate) fn start(first: Bundle) -> Self {
        let total_weight = first.total_weight();
        Self {
            bundles: vec![first],
            total_weight,
        }
    }

    pub(crate) fn push(&mut self, bundle: Bundle) {
        self.total_weight += bundle.total_weight();
        self.bundles.push(bundle);
    }

    /// Member bundles in input order.
    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    /// Sum of member bundle weights.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Number of item units across all member bundles.
    pub fn unit_count(&self) -> usize {
        self.bundles.iter().map(Bundle::len).sum()
    }

    /// Checks whether the batch weighs more than `cap`.
    pub fn exceeds(&self, cap: f64) -> bool {
        self.total_weight > cap
    }
}

impl Weighted for Batch {
    fn weight(&self) -> f64 {
        self.total_weight
    }
}
