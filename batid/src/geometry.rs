//! Outils géométriques: emprise au sol et hash de changement
//!
//! Le hash est normalisé pour être indépendant du vertex de départ des
//! anneaux (un polygone qui commence à un vertex différent aura le même
//! hash), ce qui évite de versionner des géométries identiques rechargées
//! depuis une source qui réordonne ses anneaux.

use blake3::Hasher;
use geo::{Coord, Geometry, LineString, MultiPolygon, Polygon};

use crate::BatidError;

/// Précision du hash: 6 décimales en degrés (~10 cm)
const HASH_PRECISION: f64 = 1_000_000.0;

/// Coerce une géométrie en emprise au sol (MultiPolygon)
///
/// Les candidats et les bâtiments sont des Polygon ou MultiPolygon; tout
/// autre type est rejeté en amont de l'appariement.
pub fn footprint(entity_id: &str, geom: &Geometry) -> Result<MultiPolygon, BatidError> {
    match geom {
        Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Ok(mp.clone()),
        Geometry::Rect(r) => Ok(MultiPolygon::new(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Ok(MultiPolygon::new(vec![t.to_polygon()])),
        other => Err(BatidError::invalid_geometry(
            entity_id,
            format!("expected a surface geometry, got {:?}", kind_of(other)),
        )),
    }
}

fn kind_of(geom: &Geometry) -> &'static str {
    match geom {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Calcule un hash stable d'une géométrie
///
/// Les anneaux de polygones sont normalisés pour commencer au vertex
/// lexicographiquement le plus petit (min x, puis min y).
pub fn geometry_hash(geom: &Geometry) -> [u8; 32] {
    let mut hasher = Hasher::new();

    match geom {
        Geometry::Polygon(p) => {
            hasher.update(b"POLYGON");
            hash_polygon(&mut hasher, p);
        }
        Geometry::MultiPolygon(mp) => {
            hasher.update(b"MULTIPOLYGON");
            for poly in mp.0.iter() {
                hasher.update(b"POLY");
                hash_polygon(&mut hasher, poly);
            }
        }
        Geometry::Point(p) => {
            hasher.update(b"POINT");
            hash_coord(&mut hasher, p.0);
        }
        Geometry::LineString(ls) => {
            hasher.update(b"LINESTRING");
            for coord in ls.0.iter() {
                hash_coord(&mut hasher, *coord);
            }
        }
        other => {
            hasher.update(format!("{:?}", other).as_bytes());
        }
    }

    *hasher.finalize().as_bytes()
}

fn hash_polygon(hasher: &mut Hasher, poly: &Polygon) {
    hasher.update(b"EXT");
    hash_ring_normalized(hasher, poly.exterior());
    for interior in poly.interiors() {
        hasher.update(b"INT");
        hash_ring_normalized(hasher, interior);
    }
}

/// Hash un anneau de polygone en le normalisant pour commencer au vertex
/// lexicographiquement le plus petit.
fn hash_ring_normalized(hasher: &mut Hasher, ring: &LineString) {
    // Ignore le point de fermeture (identique au premier)
    let len = if ring.0.len() > 1 && ring.0.first() == ring.0.last() {
        ring.0.len() - 1
    } else {
        ring.0.len()
    };

    if len == 0 {
        return;
    }

    let min_idx = (0..len)
        .min_by(|&a, &b| {
            let ca = &ring.0[a];
            let cb = &ring.0[b];
            ca.x.partial_cmp(&cb.x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ca.y.partial_cmp(&cb.y).unwrap_or(std::cmp::Ordering::Equal))
        })
        .unwrap_or(0);

    for i in 0..len {
        let idx = (min_idx + i) % len;
        hash_coord(hasher, ring.0[idx]);
    }
}

fn hash_coord(hasher: &mut Hasher, coord: Coord) {
    let x = (coord.x * HASH_PRECISION).round() as i64;
    let y = (coord.y * HASH_PRECISION).round() as i64;
    hasher.update(&x.to_le_bytes());
    hasher.update(&y.to_le_bytes());
}
