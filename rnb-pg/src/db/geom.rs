//! Conversions géométriques vers et depuis PostGIS
//!
//! Écriture en EWKB (WKB + flag SRID), lecture depuis `ST_AsBinary`,
//! exposition GeoJSON pour les lectures du registre.

use anyhow::Result;
use geo::Geometry;
use wkb::{geom_to_wkb, wkb_to_geom};

/// Convertit une géométrie geo en EWKB PostGIS
pub fn to_ewkb(geom: &Geometry, srid: u32) -> Result<Vec<u8>> {
    let wkb = geom_to_wkb(geom)
        .map_err(|e| anyhow::anyhow!("Failed to convert geometry to WKB: {:?}", e))?;

    if wkb.len() < 5 {
        anyhow::bail!("WKB too short ({} bytes)", wkb.len());
    }

    // Ajouter le SRID au WKB (format EWKB): flag 0x20000000 sur le type
    let mut ewkb = Vec::with_capacity(wkb.len() + 4);
    ewkb.push(wkb[0]); // Byte order

    let type_bytes = [wkb[1], wkb[2], wkb[3], wkb[4]];
    if wkb[0] == 1 {
        // Little endian
        let geom_type = u32::from_le_bytes(type_bytes) | 0x20000000;
        ewkb.extend_from_slice(&geom_type.to_le_bytes());
        ewkb.extend_from_slice(&srid.to_le_bytes());
    } else {
        // Big endian
        let geom_type = u32::from_be_bytes(type_bytes) | 0x20000000;
        ewkb.extend_from_slice(&geom_type.to_be_bytes());
        ewkb.extend_from_slice(&srid.to_be_bytes());
    }

    ewkb.extend_from_slice(&wkb[5..]);
    Ok(ewkb)
}

/// Parse le WKB retourné par `ST_AsBinary` (sans SRID)
pub fn from_wkb(bytes: &[u8]) -> Result<Geometry> {
    let mut cursor = bytes;
    wkb_to_geom(&mut cursor).map_err(|e| anyhow::anyhow!("Failed to parse WKB: {:?}", e))
}

/// Convertit une géométrie geo en GeoJSON pour les lectures exposées
pub fn to_geojson(geom: &Geometry) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(geom))
}
