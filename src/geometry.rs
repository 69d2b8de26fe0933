//! Great-circle helpers shared by the scheduler, the arbitration engine and
//! the trigger jobs. All distances are WGS84-spherical approximations, which
//! is plenty for gating decisions at the ranges involved here.

/// Mean Earth radius in meters, also used for the curvature drop in the
/// line-of-sight sampling.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate the great-circle distance between two points in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Great-circle distance in kilometers
pub fn haversine_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_distance(lat1, lon1, lat2, lon2) / 1000.0
}

/// Intermediate point at fraction `f` (0.0 = start, 1.0 = end) along the
/// great circle between two points. Used to sample the terrain profile for
/// line-of-sight checks.
///
/// Degenerate case: identical endpoints return the start point.
pub fn intermediate_point(lat1: f64, lon1: f64, lat2: f64, lon2: f64, f: f64) -> (f64, f64) {
    let lat1_rad = lat1.to_radians();
    let lon1_rad = lon1.to_radians();
    let lat2_rad = lat2.to_radians();
    let lon2_rad = lon2.to_radians();

    let delta = haversine_distance(lat1, lon1, lat2, lon2) / EARTH_RADIUS_M;
    if delta < 1e-12 {
        return (lat1, lon1);
    }

    let a = ((1.0 - f) * delta).sin() / delta.sin();
    let b = (f * delta).sin() / delta.sin();

    let x = a * lat1_rad.cos() * lon1_rad.cos() + b * lat2_rad.cos() * lon2_rad.cos();
    let y = a * lat1_rad.cos() * lon1_rad.sin() + b * lat2_rad.cos() * lon2_rad.sin();
    let z = a * lat1_rad.sin() + b * lat2_rad.sin();

    let lat = z.atan2((x * x + y * y).sqrt());
    let lon = y.atan2(x);

    (lat.to_degrees(), lon.to_degrees())
}

/// Calculate the angular difference between two headings in degrees
/// Returns the smallest angle between the two headings (0-180 degrees)
pub fn angular_difference(angle1: f64, angle2: f64) -> f64 {
    let diff = (angle1 - angle2).abs() % 360.0;
    if diff > 180.0 { 360.0 - diff } else { diff }
}

/// Convert feet to meters
pub fn feet_to_meters(feet: f64) -> f64 {
    feet / 3.28084
}

/// Convert nautical miles to kilometers
pub fn nm_to_km(nm: f64) -> f64 {
    nm * 1.852
}
