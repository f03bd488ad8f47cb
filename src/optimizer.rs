//! Gruppierungslogik für die zweistufige Sendungsbildung.
//!
//! Dieser Modul implementiert zwei gierige Heuristiken:
//! - Bündelung: Objekte mit ähnlichem Querschnitt werden unter einer
//!   Gewichtsgrenze nach dem Best-Fit-Prinzip zu Bündeln zusammengefasst
//! - Chargenbildung: Ganze Bündel werden rein nach kumuliertem Gewicht
//!   zu Chargen konsolidiert
//!
//! Eine Platzierung ist endgültig; es gibt kein Backtracking.

use serde::Serialize;
use utoipa::ToSchema;

use crate::geometry::is_similar;
use crate::model::{Batch, Bundle, Item, ItemUnit, ValidationError, expanded_unit_count};
use crate::types::{self, Weighted};

/// Umgang mit Bündeln oder Chargen, die schon allein die Gewichtsgrenze überschreiten.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OversizePolicy {
    /// Übergewichtige Einheiten bilden ein eigenes Bündel bzw. eine eigene Charge.
    #[default]
    Accept,
    /// Die Gruppierung bricht mit einem Fehler ab.
    Reject,
}

/// Konfiguration für beide Gruppierungsstufen.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GroupingConfig {
    /// Maximale Abweichung von Breite und Höhe zum Anker eines Bündels
    pub tolerance: f64,
    /// Gewichtsgrenze pro Bündel in kg
    pub bundle_weight_cap: f64,
    /// Gewichtsgrenze pro Charge in kg
    pub batch_weight_cap: f64,
    /// Verhalten bei übergewichtigen Einheiten
    pub oversize_policy: OversizePolicy,
    /// Abschlag in Prozent des Gesamtgewichts für `weight_per_pack`
    pub pack_allowance_percent: f64,
    /// Obergrenze für die Anzahl expandierter Einheiten pro Gruppierung
    pub max_units: usize,
}

impl GroupingConfig {
    pub const DEFAULT_TOLERANCE: f64 = 5.0;
    pub const DEFAULT_BUNDLE_WEIGHT_CAP: f64 = 49.0;
    pub const DEFAULT_BATCH_WEIGHT_CAP: f64 = 49.0;
    pub const DEFAULT_PACK_ALLOWANCE_PERCENT: f64 = 0.05;
    pub const DEFAULT_MAX_UNITS: usize = 10_000;

    /// Erstellt einen Builder für benutzerdefinierte Konfiguration.
    pub fn builder() -> GroupingConfigBuilder {
        GroupingConfigBuilder::default()
    }

    /// Prüft alle Grenzwerte auf Gültigkeit.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ValidationError::InvalidConfiguration(format!(
                "tolerance must be a non-negative finite number, got: {}",
                self.tolerance
            )));
        }
        for (name, cap) in [
            ("bundle_weight_cap", self.bundle_weight_cap),
            ("batch_weight_cap", self.batch_weight_cap),
        ] {
            if !cap.is_finite() || cap <= 0.0 {
                return Err(ValidationError::InvalidConfiguration(format!(
                    "{} must be a positive finite number, got: {}",
                    name, cap
                )));
            }
        }
        if !(0.0..=100.0).contains(&self.pack_allowance_percent) {
            return Err(ValidationError::InvalidConfiguration(format!(
                "pack_allowance_percent must be between 0 and 100, got: {}",
                self.pack_allowance_percent
            )));
        }
        if self.max_units == 0 {
            return Err(ValidationError::InvalidConfiguration(
                "max_units must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::DEFAULT_TOLERANCE,
            bundle_weight_cap: Self::DEFAULT_BUNDLE_WEIGHT_CAP,
            batch_weight_cap: Self::DEFAULT_BATCH_WEIGHT_CAP,
            oversize_policy: OversizePolicy::default(),
            pack_allowance_percent: Self::DEFAULT_PACK_ALLOWANCE_PERCENT,
            max_units: Self::DEFAULT_MAX_UNITS,
        }
    }
}

/// Builder-Pattern für GroupingConfig.
#[derive(Clone, Debug, Default)]
pub struct GroupingConfigBuilder {
    config: GroupingConfig,
}

impl GroupingConfigBuilder {
    /// Setzt die Querschnittstoleranz.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Setzt die Gewichtsgrenze pro Bündel.
    pub fn bundle_weight_cap(mut self, cap: f64) -> Self {
        self.config.bundle_weight_cap = cap;
        self
    }

    /// Setzt die Gewichtsgrenze pro Charge.
    pub fn batch_weight_cap(mut self, cap: f64) -> Self {
        self.config.batch_weight_cap = cap;
        self
    }

    /// Setzt beide Gewichtsgrenzen auf denselben Wert.
    pub fn weight_cap(self, cap: f64) -> Self {
        self.bundle_weight_cap(cap).batch_weight_cap(cap)
    }

    pub fn oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.config.oversize_policy = policy;
        self
    }

    pub fn pack_allowance_percent(mut self, percent: f64) -> Self {
        self.config.pack_allowance_percent = percent;
        self
    }

    /// Begrenzt die Gesamtzahl expandierter Einheiten.
    pub fn max_units(mut self, max_units: usize) -> Self {
        self.config.max_units = max_units;
        self
    }

    /// Erstellt die finale Konfiguration.
    pub fn build(self) -> GroupingConfig {
        self.config
    }
}

/// Ereignisse während der Gruppierung, um Live-Visualisierung zu ermöglichen.
///
/// Bündel- und Chargennummern sind 1-basiert.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum GroupEvent {
    /// Eine Einheit hat ein neues Bündel eröffnet und ist dessen Anker.
    BundleOpened {
        bundle_id: usize,
        source: usize,
        name: String,
        dims: (f64, f64, f64),
        weight: f64,
    },
    /// Eine Einheit wurde einem bestehenden Bündel hinzugefügt.
    UnitPlaced {
        bundle_id: usize,
        source: usize,
        name: String,
        weight: f64,
        total_weight: f64,
    },
    /// Ein Bündel hat eine neue Charge eröffnet.
    BatchStarted {
        batch_id: usize,
        bundle_id: usize,
        total_weight: f64,
    },
    /// Ein weiteres Bündel wurde in die aktive Charge übernommen.
    BundleBatched {
        batch_id: usize,
        bundle_id: usize,
        total_weight: f64,
    },
    /// Gruppierung abgeschlossen.
    Finished { bundles: usize, batches: usize },
}

/// Erste Stufe: Bündelung ähnlicher Einheiten nach Best-Fit.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bundler {
    weight_cap: f64,
    tolerance: f64,
}

impl Bundler {
    pub fn new(weight_cap: f64, tolerance: f64) -> Self {
        Self {
            weight_cap,
            tolerance,
        }
    }

    pub fn from_config(config: &GroupingConfig) -> Self {
        Self::new(config.bundle_weight_cap, config.tolerance)
    }

    pub fn weight_cap(&self) -> f64 {
        self.weight_cap
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Bildet Bündel aus den Objekten in Eingabereihenfolge.
    ///
    /// Jedes Objekt wird in `quantity` Einheiten expandiert. Jede Einheit landet
    /// im passenden Bündel mit der geringsten Restkapazität oder eröffnet ein
    /// neues Bündel. Die Eingabereihenfolge bestimmt, welche Einheiten Anker werden.
    ///
    /// # Parameter
    /// * `items` - Objekte in Eingabereihenfolge
    ///
    /// # Rückgabewert
    /// Bündel in Eröffnungsreihenfolge; leer bei leerer Eingabe
    pub fn group(&self, items: &[Item]) -> Vec<Bundle> {
        self.group_with_progress(items, |_| {})
    }

    /// Bündelung mit Live-Progress Callback.
    pub fn group_with_progress(
        &self,
        items: &[Item],
        mut on_event: impl FnMut(&GroupEvent),
    ) -> Vec<Bundle> {
        let mut bundles: Vec<Bundle> = Vec::new();

        let units = items
            .iter()
            .enumerate()
            .flat_map(|(source, item)| item.units(source));

        for unit in units {
            match self.best_fit(&unit, &bundles) {
                Some(idx) => {
                    let event = GroupEvent::UnitPlaced {
                        bundle_id: idx + 1,
                        source: unit.source(),
                        name: unit.name().to_string(),
                        weight: unit.weight(),
                        total_weight: bundles[idx].total_weight() + unit.weight(),
                    };
                    bundles[idx].push(unit);
                    on_event(&event);
                }
                None => {
                    on_event(&GroupEvent::BundleOpened {
                        bundle_id: bundles.len() + 1,
                        source: unit.source(),
                        name: unit.name().to_string(),
                        dims: unit.dims(),
                        weight: unit.weight(),
                    });
                    bundles.push(Bundle::open(unit));
                }
            }
        }

        bundles
    }

    /// Sucht das Bündel mit der geringsten verbleibenden Kapazität nach Aufnahme.
    ///
    /// Bei gleicher Restkapazität gewinnt das zuerst gefundene Bündel.
    fn best_fit(&self, unit: &ItemUnit, bundles: &[Bundle]) -> Option<usize> {
        let mut best: Option<usize> = None;
        let mut best_weight_diff = f64::INFINITY;

        for (idx, bundle) in bundles.iter().enumerate() {
            let potential_weight = bundle.total_weight() + unit.weight();
            if potential_weight > self.weight_cap {
                continue;
            }

            let weight_diff = self.weight_cap - potential_weight;
            if weight_diff < best_weight_diff && is_similar(unit, bundle.anchor(), self.tolerance)
            {
                best = Some(idx);
                best_weight_diff = weight_diff;
            }
        }

        best
    }
}

/// Zweite Stufe: Konsolidierung ganzer Bündel zu Chargen nach Gewicht.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Batcher {
    weight_cap: f64,
}

impl Batcher {
    pub fn new(weight_cap: f64) -> Self {
        Self { weight_cap }
    }

    pub fn from_config(config: &GroupingConfig) -> Self {
        Self::new(config.batch_weight_cap)
    }

    pub fn weight_cap(&self) -> f64 {
        self.weight_cap
    }

    /// Fasst Bündel zu Chargen zusammen.
    ///
    /// Das erste noch nicht verbrauchte Bündel eröffnet eine Charge. Ein
    /// einziger Durchlauf über alle Bündel übernimmt danach jedes freie Bündel,
    /// das noch unter die Gewichtsgrenze passt. Jedes Bündel landet in genau
    /// einer Charge; innerhalb einer Charge bleibt die Eingabereihenfolge erhalten.
    ///
    /// # Parameter
    /// * `bundles` - Bündel in Eingabereihenfolge
    ///
    /// # Rückgabewert
    /// Chargen in Eröffnungsreihenfolge
    pub fn group(&self, bundles: Vec<Bundle>) -> Vec<Batch> {
        self.group_with_progress(bundles, |_| {})
    }

    /// Chargenbildung mit Live-Progress Callback.
    pub fn group_with_progress(
        &self,
        bundles: Vec<Bundle>,
        mut on_event: impl FnMut(&GroupEvent),
    ) -> Vec<Batch> {
        let weights: Vec<f64> = bundles.iter().map(Bundle::total_weight).collect();
        // `None` marks a consumed bundle.
        let mut pending: Vec<Option<Bundle>> = bundles.into_iter().map(Some).collect();
        let mut batches: Vec<Batch> = Vec::new();

        for i in 0..pending.len() {
            let Some(first) = pending[i].take() else {
                continue;
            };

            let batch_id = batches.len() + 1;
            let mut current_weight = weights[i];
            let mut batch = Batch::start(first);
            on_event(&GroupEvent::BatchStarted {
                batch_id,
                bundle_id: i + 1,
                total_weight: current_weight,
            });

            for j in 0..pending.len() {
                if pending[j].is_none() {
                    continue;
                }

                let potential_weight = current_weight + weights[j];
                if potential_weight > self.weight_cap {
                    continue;
                }

                if let Some(bundle) = pending[j].take() {
                    batch.push(bundle);
                    current_weight = potential_weight;
                    on_event(&GroupEvent::BundleBatched {
                        batch_id,
                        bundle_id: j + 1,
                        total_weight: current_weight,
                    });
                }
            }

            batches.push(batch);
        }

        batches
    }
}

/// Fehler der Gesamtgruppierung.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupingError {
    InvalidConfiguration(ValidationError),
    /// Eine Einheit ist allein schwerer als die Bündelgrenze.
    OversizedUnit { name: String, weight: f64, cap: f64 },
    /// Ein Bündel ist allein schwerer als die Chargengrenze (1-basierte Nummer).
    OversizedBundle { bundle_id: usize, weight: f64, cap: f64 },
    /// Die Objekte expandieren zu mehr Einheiten als erlaubt.
    TooManyUnits { units: usize, limit: usize },
}

impl GroupingError {
    pub fn code(&self) -> &'static str {
        match self {
            GroupingError::InvalidConfiguration(_) => "invalid_configuration",
            GroupingError::OversizedUnit { .. } => "oversized_unit",
            GroupingError::OversizedBundle { .. } => "oversized_bundle",
            GroupingError::TooManyUnits { .. } => "too_many_units",
        }
    }
}

impl std::fmt::Display for GroupingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupingError::InvalidConfiguration(err) => write!(f, "{}", err),
            GroupingError::OversizedUnit { name, weight, cap } => write!(
                f,
                "Item '{}' weighs {} kg and exceeds the bundle weight cap of {} kg",
                name, weight, cap
            ),
            GroupingError::OversizedBundle {
                bundle_id,
                weight,
                cap,
            } => write!(
                f,
                "Bundle {} weighs {} kg and exceeds the batch weight cap of {} kg",
                bundle_id, weight, cap
            ),
            GroupingError::TooManyUnits { units, limit } => write!(
                f,
                "Items expand to {} units, more than the limit of {}",
                units, limit
            ),
        }
    }
}

impl std::error::Error for GroupingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GroupingError::InvalidConfiguration(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for GroupingError {
    fn from(err: ValidationError) -> Self {
        GroupingError::InvalidConfiguration(err)
    }
}

/// Kennzahlen über das Gruppierungsergebnis.
#[derive(Clone, Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct GroupingSummary {
    /// Anzahl platzierter Einheiten
    pub unit_count: usize,
    pub bundle_count: usize,
    pub batch_count: usize,
    /// Gesamtgewicht aller Einheiten in kg
    pub total_weight: f64,
    pub average_batch_weight: f64,
    /// Durchschnittliches Chargengewicht abzüglich des Verpackungsabschlags
    pub weight_per_pack: f64,
    /// Bündel, die allein die Bündelgrenze überschreiten
    pub oversized_bundles: usize,
    /// Chargen, die die Chargengrenze überschreiten
    pub oversized_batches: usize,
}

impl GroupingSummary {
    /// Berechnet die Kennzahlen aus den fertigen Chargen.
    pub fn from_batches(batches: &[Batch], config: &GroupingConfig) -> Self {
        let bundles = batches.iter().flat_map(Batch::bundles);

        let mut unit_count = 0;
        let mut bundle_count = 0;
        let mut oversized_bundles = 0;
        for bundle in bundles {
            unit_count += bundle.len();
            bundle_count += 1;
            if bundle.exceeds(config.bundle_weight_cap) {
                oversized_bundles += 1;
            }
        }

        let total_weight = types::total_weight(batches);
        let batch_count = batches.len();
        let oversized_batches = batches
            .iter()
            .filter(|batch| batch.exceeds(config.batch_weight_cap))
            .count();

        let (average_batch_weight, weight_per_pack) = if batch_count == 0 {
            (0.0, 0.0)
        } else {
            let average = total_weight / batch_count as f64;
            let allowance = total_weight * config.pack_allowance_percent / 100.0;
            (average, average - allowance)
        };

        Self {
            unit_count,
            bundle_count,
            batch_count,
            total_weight,
            average_batch_weight,
            weight_per_pack,
            oversized_bundles,
            oversized_batches,
        }
    }
}

/// Ergebnis der zweistufigen Gruppierung.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupingResult {
    pub batches: Vec<Batch>,
    pub summary: GroupingSummary,
}

impl GroupingResult {
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn bundle_count(&self) -> usize {
        self.summary.bundle_count
    }

    /// Alle Bündel in Chargenreihenfolge.
    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.batches.iter().flat_map(Batch::bundles)
    }
}

/// Hauptfunktion: bündelt die Objekte und konsolidiert die Bündel zu Chargen.
///
/// # Parameter
/// * `items` - Objekte in Eingabereihenfolge
/// * `config` - Toleranz, Gewichtsgrenzen und Übergewichtsverhalten
///
/// # Rückgabewert
/// `GroupingResult` mit Chargen und Kennzahlen, oder `GroupingError` bei
/// ungültiger Konfiguration bzw. abgelehntem Übergewicht
pub fn group_shipment(
    items: &[Item],
    config: &GroupingConfig,
) -> Result<GroupingResult, GroupingError> {
    group_shipment_with_progress(items, config, |_| {})
}

/// Gesamtgruppierung mit Live-Progress Callback.
///
/// Ruft für jede Platzierung ein Callback auf (geeignet für SSE).
/// Bei Erfolg endet der Ereignisstrom mit `GroupEvent::Finished`.
pub fn group_shipment_with_progress(
    items: &[Item],
    config: &GroupingConfig,
    mut on_event: impl FnMut(&GroupEvent),
) -> Result<GroupingResult, GroupingError> {
    config.validate()?;

    let units = expanded_unit_count(items);
    if units > config.max_units {
        return Err(GroupingError::TooManyUnits {
            units,
            limit: config.max_units,
        });
    }

    if config.oversize_policy == OversizePolicy::Reject {
        if let Some(item) = items
            .iter()
            .find(|item| item.unit_count() > 0 && item.weight() > config.bundle_weight_cap)
        {
            return Err(GroupingError::OversizedUnit {
                name: item.name().to_string(),
                weight: item.weight(),
                cap: config.bundle_weight_cap,
            });
        }
    }

    let bundles = Bundler::from_config(config).group_with_progress(items, &mut on_event);

    if config.oversize_policy == OversizePolicy::Reject {
        if let Some((idx, bundle)) = bundles
            .iter()
            .enumerate()
            .find(|(_, bundle)| bundle.exceeds(config.batch_weight_cap))
        {
            return Err(GroupingError::OversizedBundle {
                bundle_id: idx + 1,
                weight: bundle.total_weight(),
                cap: config.batch_weight_cap,
            });
        }
    }

    let batches = Batcher::from_config(config).group_with_progress(bundles, &mut on_event);
    let summary = GroupingSummary::from_batches(&batches, config);

    on_event(&GroupEvent::Finished {
        bundles: summary.bundle_count,
        batches: summary.batch_count,
    });

    Ok(GroupingResult { batches, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EPSILON_GENERAL;

    fn item(name: &str, dims: (f64, f64, f64), weight: f64, quantity: f64) -> Item {
        Item::from_raw(name, dims, weight, quantity)
    }

    /// Mixed shipment of six item types.
    fn sample_items() -> Vec<Item> {
        vec![
            item("Box1", (2.0, 70.0, 50.0), 23.0, 4.0),
            item("Box2", (2.0, 60.0, 55.0), 22.0, 2.0),
            item("Box3", (1.0, 20.0, 30.0), 10.0, 2.0),
            item("Box4", (1.0, 24.0, 34.0), 12.5, 2.0),
            item("Box5", (1.0, 13.0, 13.0), 4.0, 5.0),
            item("Box6", (1.0, 15.0, 15.0), 5.0, 6.0),
        ]
    }

    /// Deterministic pseudo-random items for invariant checks.
    fn generated_items(count: usize) -> Vec<Item> {
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move |modulo: u64| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 33) % modulo
        };

        (0..count)
            .map(|idx| {
                let width = 10.0 + next(40) as f64;
                let height = 10.0 + next(40) as f64;
                let weight = 1.0 + next(300) as f64 / 10.0;
                let quantity = next(5) as f64;
                item(
                    &format!("Gen{}", idx),
                    (next(5) as f64, width, height),
                    weight,
                    quantity,
                )
            })
            .collect()
    }

    fn bundle_of(name: &str, weight: f64) -> Bundle {
        let source = item(name, (1.0, 1.0, 1.0), weight, 1.0);
        Bundle::open(source.units(0).next().unwrap())
    }

    fn weights(bundles: &[Bundle]) -> Vec<f64> {
        bundles.iter().map(Bundle::total_weight).collect()
    }

    #[test]
    fn four_identical_boxes_form_two_bundles() {
        let items = vec![item("Box1", (2.0, 70.0, 50.0), 23.0, 4.0)];
        let bundles = Bundler::new(49.0, 5.0).group(&items);

        assert_eq!(bundles.len(), 2);
        for bundle in &bundles {
            assert_eq!(bundle.len(), 2);
            assert!((bundle.total_weight() - 46.0).abs() < EPSILON_GENERAL);
        }
    }

    #[test]
    fn overweight_item_gets_own_bundle() {
        let items = vec![item("Heavy", (1.0, 10.0, 10.0), 60.0, 1.0)];
        let bundles = Bundler::new(49.0, 5.0).group(&items);

        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].len(), 1);
        assert!((bundles[0].total_weight() - 60.0).abs() < EPSILON_GENERAL);
    }

    #[test]
    fn dissimilar_items_never_share_bundle() {
        let items = vec![
            item("Flat", (1.0, 20.0, 10.0), 5.0, 1.0),
            item("Tall", (1.0, 20.0, 20.0), 5.0, 1.0),
        ];
        let bundles = Bundler::new(100.0, 1.0).group(&items);

        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].names(), vec!["Flat"]);
        assert_eq!(bundles[1].names(), vec!["Tall"]);
    }

    #[test]
    fn batches_fill_with_single_forward_scan() {
        let bundles = vec![
            bundle_of("A", 30.0),
            bundle_of("B", 10.0),
            bundle_of("C", 15.0),
        ];
        let batches = Batcher::new(40.0).group(bundles);

        assert_eq!(batches.len(), 2);
        assert_eq!(weights(batches[0].bundles()), vec![30.0, 10.0]);
        assert_eq!(weights(batches[1].bundles()), vec![15.0]);
        assert!((batches[0].total_weight() - 40.0).abs() < EPSILON_GENERAL);
    }

    #[test]
    fn batcher_takes_later_bundles_that_still_fit() {
        let bundles = vec![
            bundle_of("A", 20.0),
            bundle_of("B", 25.0),
            bundle_of("C", 10.0),
            bundle_of("D", 20.0),
        ];
        let batches = Batcher::new(40.0).group(bundles);

        // B is skipped, C still fits next to A, D no longer fits anywhere
        assert_eq!(batches.len(), 3);
        assert_eq!(weights(batches[0].bundles()), vec![20.0, 10.0]);
        assert_eq!(weights(batches[1].bundles()), vec![25.0]);
        assert_eq!(weights(batches[2].bundles()), vec![20.0]);
    }

    #[test]
    fn best_fit_prefers_tightest_bundle() {
        let items = vec![
            item("Anchor1", (1.0, 10.0, 10.0), 6.0, 1.0),
            item("Anchor2", (1.0, 14.0, 14.0), 7.0, 1.0),
            item("Filler", (1.0, 12.0, 12.0), 3.0, 1.0),
        ];
        let bundles = Bundler::new(10.0, 5.0).group(&items);

        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].names(), vec!["Anchor1"]);
        assert_eq!(bundles[1].names(), vec!["Anchor2", "Filler"]);
    }

    #[test]
    fn best_fit_tie_goes_to_first_bundle() {
        let items = vec![
            item("Anchor1", (1.0, 10.0, 10.0), 6.0, 1.0),
            item("Anchor2", (1.0, 14.0, 14.0), 6.0, 1.0),
            item("Filler", (1.0, 12.0, 12.0), 3.0, 1.0),
        ];
        let bundles = Bundler::new(10.0, 5.0).group(&items);

        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].names(), vec!["Anchor1", "Filler"]);
        assert_eq!(bundles[1].names(), vec!["Anchor2"]);
    }

    #[test]
    fn similarity_is_checked_against_anchor_only() {
        // Drift: each item is within tolerance of the previous one but not of the anchor.
        let items = vec![
            item("A", (1.0, 10.0, 10.0), 1.0, 1.0),
            item("B", (1.0, 13.0, 13.0), 1.0, 1.0),
            item("C", (1.0, 16.0, 16.0), 1.0, 1.0),
        ];
        let bundles = Bundler::new(100.0, 4.0).group(&items);

        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].names(), vec!["A", "B"]);
        assert_eq!(bundles[1].names(), vec!["C"]);
    }

    #[test]
    fn zero_and_negative_quantities_contribute_nothing() {
        let items = vec![
            item("None", (1.0, 10.0, 10.0), 1.0, 0.0),
            item("Negative", (1.0, 10.0, 10.0), 1.0, -4.0),
            item("Fraction", (1.0, 10.0, 10.0), 1.0, 1.7),
        ];
        let bundles = Bundler::new(100.0, 1.0).group(&items);

        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].names(), vec!["Fraction"]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(Bundler::new(49.0, 5.0).group(&[]).is_empty());
        assert!(Batcher::new(49.0).group(Vec::new()).is_empty());

        let result = group_shipment(&[], &GroupingConfig::default()).unwrap();
        assert!(result.batches.is_empty());
        assert_eq!(result.summary, GroupingSummary::default());
    }

    #[test]
    fn input_order_decides_anchors() {
        let forward = vec![
            item("Small", (1.0, 10.0, 10.0), 1.0, 1.0),
            item("Mid", (1.0, 14.0, 14.0), 1.0, 1.0),
            item("Large", (1.0, 18.0, 18.0), 1.0, 1.0),
        ];
        let mut reversed = forward.clone();
        reversed.swap(0, 1);

        let bundler = Bundler::new(100.0, 4.0);
        assert_eq!(bundler.group(&forward).len(), 2);
        let swapped = bundler.group(&reversed);
        assert_eq!(swapped.len(), 1);
        assert_eq!(swapped[0].anchor().name(), "Mid");
    }

    #[test]
    fn bundles_keep_partition_weight_and_similarity_invariants() {
        let items = generated_items(60);
        let cap = 40.0;
        let tolerance = 6.0;
        let bundles = Bundler::new(cap, tolerance).group(&items);

        let mut placed: Vec<usize> = bundles
            .iter()
            .flat_map(|bundle| bundle.units().iter().map(ItemUnit::source))
            .collect();
        placed.sort_unstable();
        let expected: Vec<usize> = items
            .iter()
            .enumerate()
            .flat_map(|(idx, item)| std::iter::repeat_n(idx, item.unit_count()))
            .collect();
        assert_eq!(placed, expected);

        for bundle in &bundles {
            if bundle.len() > 1 {
                assert!(bundle.total_weight() <= cap);
            }
            for unit in bundle.units() {
                assert!(is_similar(unit, bundle.anchor(), tolerance));
            }
        }
    }

    #[test]
    fn batches_partition_bundles_and_respect_cap() {
        let items = generated_items(60);
        let bundles = Bundler::new(30.0, 6.0).group(&items);
        let expected_weights = weights(&bundles);
        let batches = Batcher::new(55.0).group(bundles);

        let mut seen: Vec<f64> = batches
            .iter()
            .flat_map(|batch| weights(batch.bundles()))
            .collect();
        let mut expected = expected_weights;
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(seen, expected);

        for batch in &batches {
            if batch.len() > 1 {
                assert!(batch.total_weight() <= 55.0);
            }
        }
    }

    #[test]
    fn batches_keep_relative_bundle_order() {
        let bundles = vec![
            bundle_of("A", 5.0),
            bundle_of("B", 40.0),
            bundle_of("C", 5.0),
            bundle_of("D", 5.0),
        ];
        let batches = Batcher::new(20.0).group(bundles);

        let names: Vec<Vec<&str>> = batches
            .iter()
            .map(|batch| {
                batch
                    .bundles()
                    .iter()
                    .map(|bundle| bundle.anchor().name())
                    .collect()
            })
            .collect();
        assert_eq!(names, vec![vec!["A", "C", "D"], vec!["B"]]);
        assert!(batches[1].exceeds(20.0));
    }

    #[test]
    fn grouping_is_deterministic() {
        let config = GroupingConfig::default();
        let first = group_shipment(&sample_items(), &config).unwrap();
        let second = group_shipment(&sample_items(), &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn sample_shipment_summary() {
        let config = GroupingConfig::default();
        let result = group_shipment(&sample_items(), &config).unwrap();

        assert_eq!(result.summary.unit_count, 21);
        assert!((result.summary.total_weight - 231.0).abs() < EPSILON_GENERAL);
        assert_eq!(result.summary.oversized_bundles, 0);
        assert_eq!(result.summary.oversized_batches, 0);
        assert_eq!(result.bundle_count(), result.bundles().count());

        let batch_count = result.batch_count() as f64;
        let expected_per_pack = 231.0 / batch_count - 231.0 * 0.05 / 100.0;
        assert!((result.summary.weight_per_pack - expected_per_pack).abs() < EPSILON_GENERAL);
        assert!(
            (result.summary.average_batch_weight - 231.0 / batch_count).abs() < EPSILON_GENERAL
        );
    }

    #[test]
    fn accept_policy_keeps_oversized_groups() {
        let items = vec![
            item("Heavy", (1.0, 10.0, 10.0), 60.0, 1.0),
            item("Light", (1.0, 10.0, 10.0), 5.0, 1.0),
        ];
        let result = group_shipment(&items, &GroupingConfig::default()).unwrap();

        assert_eq!(result.bundle_count(), 2);
        assert_eq!(result.batch_count(), 2);
        assert_eq!(result.summary.oversized_bundles, 1);
        assert_eq!(result.summary.oversized_batches, 1);
    }

    #[test]
    fn reject_policy_refuses_oversized_unit() {
        let items = vec![
            item("Light", (1.0, 10.0, 10.0), 5.0, 1.0),
            item("Heavy", (1.0, 10.0, 10.0), 60.0, 1.0),
        ];
        let config = GroupingConfig::builder()
            .oversize_policy(OversizePolicy::Reject)
            .build();

        let err = group_shipment(&items, &config).unwrap_err();
        assert_eq!(err.code(), "oversized_unit");
        assert!(matches!(err, GroupingError::OversizedUnit { ref name, .. } if name == "Heavy"));
    }

    #[test]
    fn reject_policy_ignores_items_without_units() {
        let items = vec![item("Ghost", (1.0, 10.0, 10.0), 60.0, 0.0)];
        let config = GroupingConfig::builder()
            .oversize_policy(OversizePolicy::Reject)
            .build();

        let result = group_shipment(&items, &config).unwrap();
        assert!(result.batches.is_empty());
    }

    #[test]
    fn reject_policy_refuses_bundle_over_batch_cap() {
        let items = vec![item("Box", (1.0, 10.0, 10.0), 20.0, 2.0)];
        let config = GroupingConfig::builder()
            .bundle_weight_cap(50.0)
            .batch_weight_cap(30.0)
            .oversize_policy(OversizePolicy::Reject)
            .build();

        let err = group_shipment(&items, &config).unwrap_err();
        assert_eq!(
            err,
            GroupingError::OversizedBundle {
                bundle_id: 1,
                weight: 40.0,
                cap: 30.0
            }
        );
    }

    #[test]
    fn invalid_configuration_is_reported() {
        let config = GroupingConfig::builder().tolerance(-1.0).build();
        let err = group_shipment(&sample_items(), &config).unwrap_err();
        assert!(matches!(err, GroupingError::InvalidConfiguration(_)));

        let config = GroupingConfig::builder().weight_cap(0.0).build();
        assert!(config.validate().is_err());

        let config = GroupingConfig::builder().pack_allowance_percent(150.0).build();
        assert!(config.validate().is_err());

        let config = GroupingConfig::builder().max_units(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unit_limit_stops_runaway_expansion() {
        let items = vec![item("Bulk", (1.0, 10.0, 10.0), 0.001, 1e18)];
        let err = group_shipment(&items, &GroupingConfig::default()).unwrap_err();

        assert_eq!(err.code(), "too_many_units");
        assert_eq!(
            err,
            GroupingError::TooManyUnits {
                units: 1_000_000_000_000_000_000,
                limit: GroupingConfig::DEFAULT_MAX_UNITS,
            }
        );
    }

    #[test]
    fn unit_limit_is_inclusive() {
        let items = vec![item("Box", (1.0, 10.0, 10.0), 1.0, 3.0)];
        let config = GroupingConfig::builder().max_units(3).build();
        assert_eq!(group_shipment(&items, &config).unwrap().summary.unit_count, 3);

        let config = GroupingConfig::builder().max_units(2).build();
        assert!(matches!(
            group_shipment(&items, &config),
            Err(GroupingError::TooManyUnits { units: 3, limit: 2 })
        ));
    }

    #[test]
    fn progress_events_follow_placements() {
        let items = vec![item("Box1", (2.0, 70.0, 50.0), 23.0, 3.0)];
        let mut events = Vec::new();
        let result =
            group_shipment_with_progress(&items, &GroupingConfig::default(), |evt| {
                events.push(evt.clone())
            })
            .unwrap();

        assert_eq!(result.bundle_count(), 2);
        assert!(matches!(
            events[0],
            GroupEvent::BundleOpened { bundle_id: 1, .. }
        ));
        assert!(matches!(
            events[1],
            GroupEvent::UnitPlaced { bundle_id: 1, total_weight, .. } if (total_weight - 46.0).abs() < EPSILON_GENERAL
        ));
        assert!(matches!(
            events[2],
            GroupEvent::BundleOpened { bundle_id: 2, .. }
        ));
        assert!(matches!(
            events[3],
            GroupEvent::BatchStarted {
                batch_id: 1,
                bundle_id: 1,
                ..
            }
        ));
        assert!(matches!(
            events[4],
            GroupEvent::BatchStarted {
                batch_id: 2,
                bundle_id: 2,
                ..
            }
        ));
        assert_eq!(
            events.last(),
            Some(&GroupEvent::Finished {
                bundles: 2,
                batches: 2
            })
        );
    }

    #[test]
    fn progress_events_serialize_with_type_tag() {
        let json = serde_json::to_value(GroupEvent::Finished {
            bundles: 3,
            batches: 1,
        })
        .unwrap();
        assert_eq!(json["type"], "Finished");
        assert_eq!(json["bundles"], 3);
    }
}
