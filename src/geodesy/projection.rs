use geo::{Area, LineString, Polygon};

use super::{normalize_lon, EARTH_RADIUS};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub east: f64,
    pub north: f64,
    pub south: f64,
}

impl BoundingBox {
    /// 中心経度。日付変更線をまたぐ場合も考慮する
    pub fn center(&self) -> (f64, f64) {
        let mut width = self.east - self.west;
        if width < 0.0 {
            width += 360.0;
        }
        (
            normalize_lon(self.west + width / 2.0),
            (self.north + self.south) / 2.0,
        )
    }
}

/// 球面上の外接矩形。経度幅が180度を超える場合は日付変更線をまたぐとみなす
pub fn spherical_bounding_box(lons: &[f64], lats: &[f64]) -> Option<BoundingBox> {
    let north = lats.iter().copied().reduce(f64::max)?;
    let south = lats.iter().copied().reduce(f64::min)?;
    let mut west = lons.iter().copied().reduce(f64::min)?;
    let mut east = lons.iter().copied().reduce(f64::max)?;

    if east - west > 180.0 {
        west = lons
            .iter()
            .copied()
            .filter(|lon| *lon >= 0.0)
            .reduce(f64::min)?;
        east = lons
            .iter()
            .copied()
            .filter(|lon| *lon < 0.0)
            .reduce(f64::max)?;
    }

    Some(BoundingBox {
        west,
        east,
        north,
        south,
    })
}

/// 球面ランベルト正積方位図法 (km)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambertEqualArea {
    lon0: f64,
    lat0: f64,
}

impl LambertEqualArea {
    pub fn new(lon0: f64, lat0: f64) -> Self {
        Self { lon0, lat0 }
    }

    pub fn from_bounding_box(bbox: &BoundingBox) -> Self {
        let (lon0, lat0) = bbox.center();
        Self::new(lon0, lat0)
    }

    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (phi0, phi) = (self.lat0.to_radians(), lat.to_radians());
        let dlambda = normalize_lon(lon - self.lon0).to_radians();

        let denominator = 1.0 + phi0.sin() * phi.sin() + phi0.cos() * phi.cos() * dlambda.cos();
        let k = (2.0 / denominator).sqrt();

        (
            EARTH_RADIUS * k * phi.cos() * dlambda.sin(),
            EARTH_RADIUS * k * (phi0.cos() * phi.sin() - phi0.sin() * phi.cos() * dlambda.cos()),
        )
    }
}

/// 経緯度ポリゴンの面積 (km²)
pub fn polygon_area(ring: &[(f64, f64)]) -> f64 {
    let lons: Vec<f64> = ring.iter().map(|(lon, _)| *lon).collect();
    let lats: Vec<f64> = ring.iter().map(|(_, lat)| *lat).collect();
    let Some(bbox) = spherical_bounding_box(&lons, &lats) else {
        return 0.0;
    };

    let projection = LambertEqualArea::from_bounding_box(&bbox);
    let projected: Vec<(f64, f64)> = ring
        .iter()
        .map(|(lon, lat)| projection.project(*lon, *lat))
        .collect();

    Polygon::new(LineString::from(projected), vec![]).unsigned_area()
}
