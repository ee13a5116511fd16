use crate::errors::{Error, Result};

/// Mean earth radius in metres, as used for OSM edge lengths.
pub const EARTH_RADIUS_M: f64 = 6_371_009.0;

const AREA_EPSILON: f64 = 1e-18;

#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, Copy, PartialEq)]
#[archive(check_bytes)]
pub struct MapCoords {
    pub lat: f64,
    pub lon: f64,
}

impl MapCoords {
    pub fn new(lat: f64, lon: f64) -> Self {
        MapCoords { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Great-circle distance in metres.
    pub fn haversine(&self, other: &MapCoords) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();
        let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
    }
}

pub type Path = Vec<MapCoords>;

/// A closed path; first and last coordinates are equal.
pub type Ring = Vec<MapCoords>;

/// Planar geometry in lon/lat space. Polygons are an exterior ring followed by holes.
#[derive(rkyv::Archive, rkyv::Deserialize, rkyv::Serialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub enum Geometry {
    Point(MapCoords),
    LineString(Path),
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
}

impl Geometry {
    pub fn geom_type(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Planar centroid. Polygons are area-weighted with holes subtracted,
    /// line strings are length-weighted.
    pub fn centroid(&self) -> Result<MapCoords> {
        match self {
            Geometry::Point(coords) => Ok(*coords),
            Geometry::LineString(path) => line_centroid(path),
            Geometry::Polygon(rings) => {
                let (area, lon, lat) = polygon_moments(rings)?;
                moments_to_centroid(area, lon, lat)
            }
            Geometry::MultiPolygon(polygons) => {
                if polygons.is_empty() {
                    return Err("Empty multipolygon has no centroid".into());
                }
                let (mut area, mut lon, mut lat) = (0.0, 0.0, 0.0);
                for rings in polygons {
                    let (a, x, y) = polygon_moments(rings)?;
                    area += a;
                    lon += x;
                    lat += y;
                }
                moments_to_centroid(area, lon, lat)
            }
        }
    }
}

/// Signed area and first moments of a ring (shoelace formula).
fn ring_moments(ring: &[MapCoords]) -> Result<(f64, f64, f64)> {
    if ring.len() < 4 || ring.first() != ring.last() {
        return Err(format!("Ring with {} coordinates is not closed", ring.len()).into());
    }
    let (mut area, mut lon, mut lat) = (0.0, 0.0, 0.0);
    for pair in ring.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let cross = a.lon * b.lat - b.lon * a.lat;
        area += cross;
        lon += (a.lon + b.lon) * cross;
        lat += (a.lat + b.lat) * cross;
    }
    Ok((area / 2.0, lon / 6.0, lat / 6.0))
}

/// Unsigned area and moments of an exterior ring minus its holes.
fn polygon_moments(rings: &[Ring]) -> Result<(f64, f64, f64)> {
    let (exterior, holes) = rings
        .split_first()
        .ok_or_else(|| Error::from("Polygon has no exterior ring"))?;
    let (mut area, mut lon, mut lat) = oriented(ring_moments(exterior)?);
    for hole in holes {
        let (a, x, y) = oriented(ring_moments(hole)?);
        area -= a;
        lon -= x;
        lat -= y;
    }
    Ok((area, lon, lat))
}

fn oriented((area, lon, lat): (f64, f64, f64)) -> (f64, f64, f64) {
    if area < 0.0 {
        (-area, -lon, -lat)
    } else {
        (area, lon, lat)
    }
}

fn moments_to_centroid(area: f64, lon: f64, lat: f64) -> Result<MapCoords> {
    if area.abs() <= AREA_EPSILON {
        return Err("Polygon has zero area".into());
    }
    Ok(MapCoords::new(lat / area, lon / area))
}

fn line_centroid(path: &[MapCoords]) -> Result<MapCoords> {
    let (mut length, mut lon, mut lat) = (0.0, 0.0, 0.0);
    for pair in path.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let segment = ((b.lon - a.lon).powi(2) + (b.lat - a.lat).powi(2)).sqrt();
        length += segment;
        lon += segment * (a.lon + b.lon) / 2.0;
        lat += segment * (a.lat + b.lat) / 2.0;
    }
    if length <= 0.0 {
        return Err("Line string has zero length".into());
    }
    Ok(MapCoords::new(lat / length, lon / length))
}

/// Ray casting point-in-ring test.
pub fn ring_contains(ring: &[MapCoords], point: &MapCoords) -> bool {
    let mut inside = false;
    for pair in ring.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if (a.lat > point.lat) != (b.lat > point.lat) {
            let lon_at = a.lon + (point.lat - a.lat) / (b.lat - a.lat) * (b.lon - a.lon);
            if point.lon < lon_at {
                inside = !inside;
            }
        }
    }
    inside
}

/// Joins unordered way paths end to end into closed rings. Ways may be reversed
/// to fit. Fails when a chain cannot be closed.
pub fn stitch_rings(unordered_ways: &[Path]) -> Result<Vec<Ring>> {
    let mut unused: Vec<&Path> = unordered_ways.iter().filter(|way| !way.is_empty()).collect();
    let mut rings = Vec::new();

    while !unused.is_empty() {
        let mut ring: Ring = unused.remove(0).clone();
        loop {
            let (first, last) = match (ring.first(), ring.last()) {
                (Some(first), Some(last)) => (*first, *last),
                _ => break,
            };
            if ring.len() > 1 && first == last {
                break;
            }
            let next = unused
                .iter()
                .position(|way| way.first() == Some(&last) || way.last() == Some(&last));
            let Some(idx) = next else {
                return Err("Could not close ring: member ways do not connect".into());
            };
            let way = unused.remove(idx);
            if way.first() == Some(&last) {
                ring.extend(way.iter().skip(1));
            } else {
                ring.extend(way.iter().rev().skip(1));
            }
        }
        rings.push(ring);
    }
    Ok(rings)
}
