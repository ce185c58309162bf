//! Coarse country distance and the impossible-travel check.
//!
//! Locations are tracked per country only. Distances come from approximate
//! country centroids; pairs involving a country without a centroid use a
//! fixed fallback distance.

use crate::constants::limits;
use crate::state::LocationRecord;
use chrono::{DateTime, Utc};

/// Distance used when either country has no known centroid.
pub const UNKNOWN_DISTANCE_KM: u32 = 5000;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Approximate centroids as (ISO code, latitude, longitude).
const CENTROIDS: &[(&str, f64, f64)] = &[
    ("AE", 23.4, 53.8),
    ("AR", -38.4, -63.6),
    ("AT", 47.5, 14.6),
    ("AU", -25.3, 133.8),
    ("AZ", 40.1, 47.6),
    ("BE", 50.5, 4.5),
    ("BR", -14.2, -51.9),
    ("CA", 56.1, -106.3),
    ("CH", 46.8, 8.2),
    ("CN", 35.9, 104.2),
    ("CZ", 49.8, 15.5),
    ("DE", 51.2, 10.5),
    ("DK", 56.3, 9.5),
    ("EG", 26.8, 30.8),
    ("ES", 40.5, -3.7),
    ("FI", 61.9, 25.7),
    ("FR", 46.2, 2.2),
    ("GB", 55.4, -3.4),
    ("GE", 42.3, 43.4),
    ("GR", 39.1, 21.8),
    ("ID", -0.8, 113.9),
    ("IE", 53.4, -8.2),
    ("IL", 31.0, 34.9),
    ("IN", 20.6, 79.0),
    ("IR", 32.4, 53.7),
    ("IT", 41.9, 12.6),
    ("JP", 36.2, 138.3),
    ("KP", 40.3, 127.5),
    ("KR", 35.9, 127.8),
    ("KZ", 48.0, 66.9),
    ("MX", 23.6, -102.6),
    ("NG", 9.1, 8.7),
    ("NL", 52.1, 5.3),
    ("NO", 60.5, 8.5),
    ("NZ", -40.9, 174.9),
    ("PL", 51.9, 19.1),
    ("PT", 39.4, -8.2),
    ("RO", 45.9, 25.0),
    ("RU", 61.5, 105.3),
    ("SA", 23.9, 45.1),
    ("SE", 60.1, 18.6),
    ("SG", 1.4, 103.8),
    ("TR", 39.0, 35.2),
    ("UA", 48.4, 31.2),
    ("US", 37.1, -95.7),
    ("ZA", -30.6, 22.9),
];

fn centroid(country_code: &str) -> Option<(f64, f64)> {
    CENTROIDS
        .iter()
        .find(|(code, _, _)| code.eq_ignore_ascii_case(country_code))
        .map(|&(_, lat, lon)| (lat, lon))
}

/// Coarse distance between two countries in kilometres.
///
/// # Examples
///
/// ```
/// use auth_gate::geo::{country_distance_km, UNKNOWN_DISTANCE_KM};
///
/// assert_eq!(country_distance_km("US", "us"), 0);
/// assert!(country_distance_km("US", "JP") > 9000);
/// assert_eq!(country_distance_km("US", "ZZ"), UNKNOWN_DISTANCE_KM);
/// ```
#[must_use]
pub fn country_distance_km(from: &str, to: &str) -> u32 {
    if from.eq_ignore_ascii_case(to) {
        return 0;
    }

    let (Some((lat1, lon1)), Some((lat2, lon2))) = (centroid(from), centroid(to)) else {
        return UNKNOWN_DISTANCE_KM;
    };

    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let km = 2.0 * EARTH_RADIUS_KM * a.sqrt().asin();

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Bounded by half the circumference
    let km = km.round() as u32;
    km
}

/// An implausible move between two logins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpossibleTravel {
    /// Distance between the two countries.
    pub distance_km: u32,
    /// Whole minutes between the two logins.
    pub elapsed_minutes: i64,
}

impl ImpossibleTravel {
    /// Risk reason for this anomaly.
    #[must_use]
    pub fn reason(&self) -> String {
        format!(
            "Impossible travel detected: {} km in {} minutes",
            self.distance_km, self.elapsed_minutes
        )
    }
}

/// Check whether moving from `previous` to `current_country` at `now` is
/// faster than a traveller could manage.
///
/// Only logins within the recency window are compared. Elapsed time is
/// clamped to one second so back-to-back logins still yield a finite speed.
#[must_use]
pub fn detect_impossible_travel(
    previous: &LocationRecord,
    current_country: &str,
    now: DateTime<Utc>,
) -> Option<ImpossibleTravel> {
    if previous.country_code.eq_ignore_ascii_case(current_country) {
        return None;
    }

    let elapsed = now.signed_duration_since(previous.observed_at);
    if elapsed.num_minutes() >= limits::TRAVEL_WINDOW_MINUTES {
        return None;
    }

    let distance_km = country_distance_km(&previous.country_code, current_country);
    #[allow(clippy::cast_precision_loss)]
    let hours = elapsed.num_seconds().max(1) as f64 / 3600.0;
    let speed = f64::from(distance_km) / hours;

    (speed > limits::MAX_TRAVEL_SPEED_KMH).then(|| ImpossibleTravel {
        distance_km,
        elapsed_minutes: elapsed.num_minutes().max(0),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn seen_in(country: &str, at: DateTime<Utc>) -> LocationRecord {
        LocationRecord {
            country_code: country.to_string(),
            observed_at: at,
        }
    }

    #[test]
    fn test_us_to_japan_in_ten_minutes_is_impossible() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let travel = detect_impossible_travel(&seen_in("US", t0), "JP", t0 + Duration::minutes(10)).unwrap();

        assert_eq!(travel.elapsed_minutes, 10);
        assert!(travel.distance_km > 9000);
        assert!(travel.reason().starts_with("Impossible travel detected:"));
    }

    #[test]
    fn test_outside_recency_window_is_not_compared() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        assert!(detect_impossible_travel(&seen_in("US", t0), "JP", t0 + Duration::minutes(31)).is_none());
    }

    #[test]
    fn test_neighbouring_countries_at_plausible_speed() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        // Belgium to the Netherlands is well under 250 km.
        assert!(detect_impossible_travel(&seen_in("BE", t0), "NL", t0 + Duration::minutes(29)).is_none());
    }

    #[test]
    fn test_same_country_never_flags() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        assert!(detect_impossible_travel(&seen_in("US", t0), "US", t0).is_none());
    }

    #[test]
    fn test_zero_elapsed_time_still_flags() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let travel = detect_impossible_travel(&seen_in("FR", t0), "ZZ", t0).unwrap();
        assert_eq!(travel.distance_km, UNKNOWN_DISTANCE_KM);
        assert_eq!(travel.elapsed_minutes, 0);
    }
}
