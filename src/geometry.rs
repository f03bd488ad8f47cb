//! Geometrische Hilfsfunktionen für den Ähnlichkeitsvergleich von Objekten.
//!
//! Dieses Modul bietet das Ähnlichkeitsprädikat, das über die Zugehörigkeit
//! eines Objekts zu einem Bündel entscheidet. Verglichen wird ausschließlich
//! der Querschnitt (Breite und Höhe); die Länge bleibt immer unberücksichtigt.

use crate::types::Dimensional;

/// Prüft, ob zwei Objekte im Querschnitt ähnlich sind.
///
/// Zwei Objekte gelten als ähnlich, wenn sowohl die Breiten- als auch die
/// Höhendifferenz betragsmäßig höchstens `tolerance` beträgt. Die Toleranz
/// gilt für beide Achsen gleichermaßen.
///
/// # Parameter
/// * `a` - Erstes Objekt
/// * `b` - Zweites Objekt (bei der Bündelung der Anker)
/// * `tolerance` - Maximale Abweichung pro Achse
///
/// # Rückgabewert
/// `true` wenn beide Achsen innerhalb der Toleranz liegen, sonst `false`
///
/// # Beispiel
/// ```
/// use box_bundler::geometry::is_similar;
/// use box_bundler::model::Item;
///
/// let a = Item::from_raw("A", (2.0, 70.0, 50.0), 23.0, 1.0);
/// let b = Item::from_raw("B", (9.0, 66.0, 54.0), 22.0, 1.0);
/// assert!(is_similar(&a, &b, 5.0));
/// assert!(!is_similar(&a, &b, 3.0));
/// ```
pub fn is_similar<A, B>(a: &A, b: &B, tolerance: f64) -> bool
where
    A: Dimensional + ?Sized,
    B: Dimensional + ?Sized,
{
    a.cross_section().within(&b.cross_section(), tolerance)
}
