// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Spherical geometry helpers used by the filters and trackers

use crate::models::{Coordinate, ParkingLocation};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters (haversine)
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());

    EARTH_RADIUS_M * c
}

/// Spherical mean of a coordinate set.
///
/// Points are averaged as unit vectors and projected back onto the sphere,
/// which behaves correctly across the antimeridian. Returns `None` for an
/// empty set or when the vectors cancel out.
pub fn center<I>(points: I) -> Option<Coordinate>
where
    I: IntoIterator<Item = Coordinate>,
{
    let (mut x, mut y, mut z) = (0.0_f64, 0.0_f64, 0.0_f64);
    let mut count = 0usize;
    let mut first = None;

    for point in points {
        first.get_or_insert(point);
        let lat = point.latitude.to_radians();
        let lon = point.longitude.to_radians();
        x += lat.cos() * lon.cos();
        y += lat.cos() * lon.sin();
        z += lat.sin();
        count += 1;
    }

    if count <= 1 {
        return first;
    }

    let n = count as f64;
    let (x, y, z) = (x / n, y / n, z / n);
    let hyp = (x * x + y * y).sqrt();
    if hyp < f64::EPSILON && z.abs() < f64::EPSILON {
        return None;
    }

    Some(Coordinate::new(
        z.atan2(hyp).to_degrees(),
        y.atan2(x).to_degrees(),
    ))
}

/// Spherical mean of a parking window together with the mean accuracy error
pub fn center_with_error(points: &[ParkingLocation]) -> Option<(Coordinate, f64)> {
    let center = center(
        points
            .iter()
            .map(|p| Coordinate::new(p.latitude, p.longitude)),
    )?;
    let error = points.iter().map(|p| p.error).sum::<f64>() / points.len() as f64;
    Some((center, error))
}

/// Accuracy-aware containment test.
///
/// The combined error of both fixes is subtracted from the raw distance
/// before comparing to `radius_m`, so a point on the boundary counts as inside.
pub fn is_in_radius(
    center: Coordinate,
    center_error_m: f64,
    point: Coordinate,
    point_error_m: f64,
    radius_m: f64,
) -> bool {
    let total_error = center_error_m.max(0.0) + point_error_m.max(0.0);
    distance_meters(center, point) - total_error <= radius_m
}

#[cfg(test)]
mod tests {
    use super::*;

    const WARSAW: Coordinate = Coordinate {
        latitude: 52.2297,
        longitude: 21.0122,
    };
    const KRAKOW: Coordinate = Coordinate {
        latitude: 50.0647,
        longitude: 19.9450,
    };

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(distance_meters(WARSAW, WARSAW), 0.0);
    }

    #[test]
    fn test_known_distance() {
        let d = distance_meters(WARSAW, KRAKOW);
        // ~252 km between the two city centers
        assert!((d - 252_000.0).abs() < 2_000.0, "got {d}");
        assert!((d - distance_meters(KRAKOW, WARSAW)).abs() < 1e-6);
    }

    #[test]
    fn test_center_of_single_point() {
        assert_eq!(center([WARSAW]), Some(WARSAW));
    }

    #[test]
    fn test_center_of_empty_set() {
        assert!(center(Vec::<Coordinate>::new()).is_none());
    }

    #[test]
    fn test_center_is_between_points() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 2.0);
        let c = center([a, b]).unwrap();
        assert!(c.latitude.abs() < 1e-9);
        assert!((c.longitude - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_center_across_antimeridian() {
        let a = Coordinate::new(0.0, 179.0);
        let b = Coordinate::new(0.0, -179.0);
        let c = center([a, b]).unwrap();
        assert!((c.longitude.abs() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_center_with_error_averages_accuracy() {
        let points = [
            ParkingLocation::new(10.0, 10.0, 0, 4.0),
            ParkingLocation::new(10.0, 10.0, 1, 8.0),
        ];
        let (_, error) = center_with_error(&points).unwrap();
        assert_eq!(error, 6.0);
    }

    #[test]
    fn test_in_radius_is_symmetric_with_equal_errors() {
        let a = Coordinate::new(45.0, 9.0);
        let b = Coordinate::new(45.0005, 9.0005);
        for radius in [10.0, 50.0, 70.0, 100.0] {
            assert_eq!(
                is_in_radius(a, 5.0, b, 5.0, radius),
                is_in_radius(b, 5.0, a, 5.0, radius)
            );
        }
    }

    #[test]
    fn test_in_radius_subtracts_errors() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 0.001); // ~111 m
        assert!(!is_in_radius(a, 0.0, b, 0.0, 100.0));
        assert!(is_in_radius(a, 6.0, b, 6.0, 100.0));
    }

    #[test]
    fn test_in_radius_boundary_is_inclusive() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 0.001);
        let exact = distance_meters(a, b);
        assert!(is_in_radius(a, 0.0, b, 0.0, exact));
        assert!(!is_in_radius(a, 0.0, b, 0.0, exact - 0.01));
    }
}
