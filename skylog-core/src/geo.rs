//! Great-circle geometry helpers.

/// Kilometers to nautical miles.
pub const NM_PER_KM: f64 = 0.539957;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine great-circle distance between two lat/lng points, kilometers.
pub fn great_circle_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

pub fn km_to_nm(km: f64) -> f64 {
    km * NM_PER_KM
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        assert_eq!(great_circle_km(35.5, -82.5, 35.5, -82.5), 0.0);
    }

    #[test]
    fn test_known_distance() {
        // KSFO to KLAX, roughly 543 km / 293 nm.
        let km = great_circle_km(37.6213, -122.3790, 33.9416, -118.4085);
        assert!((km - 543.0).abs() < 5.0, "got {km}");
        let nm = km_to_nm(km);
        assert!((nm - 293.0).abs() < 3.0, "got {nm}");
    }

    #[test]
    fn test_symmetry() {
        let a = great_circle_km(40.0, -105.0, 41.0, -104.0);
        let b = great_circle_km(41.0, -104.0, 40.0, -105.0);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_short_hop() {
        // One runway length (~1 km) should come out near 1 km.
        let km = great_circle_km(35.4360, -82.5418, 35.4450, -82.5418);
        assert!((km - 1.0).abs() < 0.05, "got {km}");
    }
}
