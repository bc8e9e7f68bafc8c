use crate::types::Coordinate;

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates (haversine), in kilometers.
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    // clamp 防止浮点误差使 asin 的参数略大于 1
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identity() {
        for c in [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(41.88, -87.63),
            Coordinate::new(-33.87, 151.21),
            Coordinate::new(90.0, 0.0),
        ] {
            assert_eq!(distance(c, c), 0.0);
        }
    }

    #[test]
    fn test_distance_symmetric() {
        let chicago = Coordinate::new(41.88, -87.63);
        let sydney = Coordinate::new(-33.87, 151.21);
        assert_eq!(distance(chicago, sydney), distance(sydney, chicago));
    }

    #[test]
    fn test_distance_known_values() {
        // One degree of longitude along the equator
        let d = distance(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0));
        assert!((d - 111.19).abs() < 0.01, "got {}", d);

        // Chicago -> New York is roughly 1145 km
        let d = distance(Coordinate::new(41.88, -87.63), Coordinate::new(40.71, -74.01));
        assert!((d - 1145.0).abs() < 5.0, "got {}", d);

        // Antipodes: half the circumference
        let d = distance(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }
}
