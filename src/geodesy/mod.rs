//! 球面地球モデル上の測地計算。深さは km、下向きを正とする。

pub mod fault;
pub mod projection;

pub use fault::{ComplexFaultSurface, SimpleFaultSurface};
pub use projection::{polygon_area, spherical_bounding_box, BoundingBox, LambertEqualArea};

use geo::{Bearing, Destination, Distance, Haversine, Point};

/// 地球の平均半径 (km)。`Haversine` が使う IUGG の平均半径と同じ
pub const EARTH_RADIUS: f64 = 6371.0088;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lon: f64,
    pub lat: f64,
    pub depth: f64,
}

impl Location {
    pub fn new(lon: f64, lat: f64, depth: f64) -> Self {
        Self { lon, lat, depth }
    }

    pub fn surface(lon: f64, lat: f64) -> Self {
        Self::new(lon, lat, 0.0)
    }

    pub fn azimuth_to(&self, other: &Location) -> f64 {
        azimuth(self.lon, self.lat, other.lon, other.lat)
    }

    pub fn horizontal_distance_to(&self, other: &Location) -> f64 {
        geodetic_distance(self.lon, self.lat, other.lon, other.lat)
    }

    /// 深さの差を含む直線距離
    pub fn distance_to(&self, other: &Location) -> f64 {
        let horizontal = self.horizontal_distance_to(other);
        let vertical = other.depth - self.depth;
        (horizontal * horizontal + vertical * vertical).sqrt()
    }

    /// 方位 `azimuth` に水平 `horizontal` km、鉛直 `vertical` km 移動した地点
    pub fn point_at(&self, horizontal: f64, vertical: f64, azimuth: f64) -> Location {
        let (lon, lat) = point_at(self.lon, self.lat, azimuth, horizontal);
        Location::new(lon, lat, self.depth + vertical)
    }

    /// 地心直交座標 (km)
    pub(crate) fn to_cartesian(self) -> [f64; 3] {
        let r = EARTH_RADIUS - self.depth;
        let (lon, lat) = (self.lon.to_radians(), self.lat.to_radians());
        [
            r * lat.cos() * lon.cos(),
            r * lat.cos() * lon.sin(),
            r * lat.sin(),
        ]
    }
}

/// 大円距離 (km)
pub fn geodetic_distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    Haversine::distance(Point::new(lon1, lat1), Point::new(lon2, lat2)) / 1000.0
}

/// 地点1から地点2への方位角（度、北から時計回り、0..360）
pub fn azimuth(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    Haversine::bearing(Point::new(lon1, lat1), Point::new(lon2, lat2)).rem_euclid(360.0)
}

/// 大円上を方位 `azimuth` に `distance` km 進んだ地点
pub fn point_at(lon: f64, lat: f64, azimuth: f64, distance: f64) -> (f64, f64) {
    let destination = Haversine::destination(Point::new(lon, lat), azimuth, distance * 1000.0);
    (normalize_lon(destination.x()), destination.y())
}

/// 経度を [-180, 180) に正規化する
pub fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// 折れ線（断層トレースなど）
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    points: Vec<Location>,
}

impl Line {
    pub fn new(points: Vec<Location>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Location] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[0].distance_to(&w[1]))
            .sum()
    }

    /// 区間長で重み付けした平均方位角
    pub fn average_azimuth(&self) -> f64 {
        if self.points.len() == 2 {
            return self.points[0].azimuth_to(&self.points[1]);
        }

        let (mut sum_x, mut sum_y) = (0.0, 0.0);
        for w in self.points.windows(2) {
            let az = w[0].azimuth_to(&w[1]).to_radians();
            let distance = w[0].horizontal_distance_to(&w[1]);
            sum_x += distance * az.sin();
            sum_y += distance * az.cos();
        }

        sum_x.atan2(sum_y).to_degrees().rem_euclid(360.0)
    }

    /// 全長を等分する `count` 点に再サンプリングする
    pub fn resample(&self, count: usize) -> Line {
        if self.points.len() < 2 || count < 2 {
            return self.clone();
        }

        let segment_lengths: Vec<f64> = self
            .points
            .windows(2)
            .map(|w| w[0].distance_to(&w[1]))
            .collect();
        let total: f64 = segment_lengths.iter().sum();
        let step = total / (count - 1) as f64;

        let mut resampled = Vec::with_capacity(count);
        let mut segment = 0;
        let mut travelled = 0.0;

        for i in 0..count {
            if i == count - 1 {
                resampled.push(*self.points.last().unwrap_or(&self.points[0]));
                break;
            }

            let target = step * i as f64;
            while segment < segment_lengths.len() - 1
                && travelled + segment_lengths[segment] < target
            {
                travelled += segment_lengths[segment];
                segment += 1;
            }

            let start = self.points[segment];
            let end = self.points[segment + 1];
            let length = segment_lengths[segment];
            let fraction = if length > 0.0 {
                ((target - travelled) / length).clamp(0.0, 1.0)
            } else {
                0.0
            };

            let horizontal = start.horizontal_distance_to(&end) * fraction;
            let vertical = (end.depth - start.depth) * fraction;
            resampled.push(start.point_at(horizontal, vertical, start.azimuth_to(&end)));
        }

        Line::new(resampled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-6;

    #[test]
    fn test_distance_one_degree_on_equator() {
        let d = geodetic_distance(0.0, 0.0, 1.0, 0.0);
        let expected = EARTH_RADIUS * 1f64.to_radians();
        assert!((d - expected).abs() < TOLERANCE, "{} vs {}", d, expected);
    }

    #[test]
    fn test_azimuth_cardinal_directions() {
        assert!((azimuth(0.0, 0.0, 0.0, 1.0) - 0.0).abs() < TOLERANCE);
        assert!((azimuth(0.0, 0.0, 1.0, 0.0) - 90.0).abs() < TOLERANCE);
        assert!((azimuth(0.0, 1.0, 0.0, 0.0) - 180.0).abs() < TOLERANCE);
        assert!((azimuth(1.0, 0.0, 0.0, 0.0) - 270.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_point_at_inverts_distance_and_azimuth() {
        let (lon, lat) = point_at(10.0, 45.0, 60.0, 50.0);
        let d = geodetic_distance(10.0, 45.0, lon, lat);
        let az = azimuth(10.0, 45.0, lon, lat);
        assert!((d - 50.0).abs() < 1e-6);
        assert!((az - 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_point_at_wraps_antimeridian() {
        let (lon, _) = point_at(179.9, 0.0, 90.0, 50.0);
        assert!(lon < -179.0, "{}", lon);
    }

    #[test]
    fn test_location_point_at_moves_depth() {
        let p = Location::new(0.0, 0.0, 5.0).point_at(0.0, 10.0, 0.0);
        assert!((p.depth - 15.0).abs() < TOLERANCE);
        assert!((p.lon).abs() < TOLERANCE && (p.lat).abs() < TOLERANCE);
    }

    #[test]
    fn test_line_length_and_average_azimuth() {
        let line = Line::new(vec![
            Location::surface(0.0, 0.0),
            Location::surface(0.0, 1.0),
            Location::surface(0.0, 2.0),
        ]);
        let expected = 2.0 * EARTH_RADIUS * 1f64.to_radians();
        assert!((line.length() - expected).abs() < 1e-6);
        assert!(line.average_azimuth().abs() < 1e-6);
    }

    #[test]
    fn test_line_resample_keeps_endpoints() {
        let line = Line::new(vec![
            Location::surface(0.0, 0.0),
            Location::surface(1.0, 0.0),
        ]);
        let resampled = line.resample(5);
        assert_eq!(resampled.len(), 5);
        assert_eq!(resampled.points()[0], line.points()[0]);
        assert_eq!(resampled.points()[4], line.points()[1]);
        assert!((resampled.points()[2].lon - 0.5).abs() < 1e-6);
    }
}
