use crate::builder::WeightTable;
use crate::topology::AnchorId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

/// Mean Earth radius (IUGG), km.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in km (haversine on a spherical Earth).
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
    }
}

/// Continent name for an ISO 3166 alpha-2 country code.
pub fn continent_of(country_iso2: &str) -> Option<&'static str> {
    let continent = match country_iso2.trim().to_ascii_uppercase().as_str() {
        "DZ" | "AO" | "BJ" | "BW" | "BF" | "BI" | "CM" | "CV" | "CF" | "TD" | "KM" | "CG"
        | "CD" | "CI" | "DJ" | "EG" | "GQ" | "ER" | "ET" | "GA" | "GM" | "GH" | "GN" | "GW"
        | "KE" | "LS" | "LR" | "LY" | "MG" | "MW" | "ML" | "MR" | "MU" | "YT" | "MA" | "MZ"
        | "NA" | "NE" | "NG" | "RE" | "RW" | "SH" | "ST" | "SN" | "SC" | "SL" | "SO" | "ZA"
        | "SS" | "SD" | "SZ" | "TZ" | "TG" | "TN" | "UG" | "EH" | "ZM" | "ZW" => "Africa",
        "AF" | "AM" | "AZ" | "BH" | "BD" | "BT" | "BN" | "KH" | "CN" | "CY" | "GE" | "HK"
        | "IN" | "ID" | "IR" | "IQ" | "IL" | "JP" | "JO" | "KZ" | "KW" | "KG" | "LA" | "LB"
        | "MO" | "MY" | "MV" | "MN" | "MM" | "NP" | "KP" | "OM" | "PK" | "PS" | "PH" | "QA"
        | "SA" | "SG" | "KR" | "LK" | "SY" | "TW" | "TJ" | "TH" | "TL" | "TR" | "TM" | "AE"
        | "UZ" | "VN" | "YE" | "IO" | "CX" | "CC" => "Asia",
        "AX" | "AL" | "AD" | "AT" | "BY" | "BE" | "BA" | "BG" | "HR" | "CZ" | "DK" | "EE"
        | "FO" | "FI" | "FR" | "DE" | "GI" | "GR" | "GG" | "VA" | "HU" | "IS" | "IE" | "IM"
        | "IT" | "JE" | "XK" | "LV" | "LI" | "LT" | "LU" | "MK" | "MT" | "MD" | "MC" | "ME"
        | "NL" | "NO" | "PL" | "PT" | "RO" | "RU" | "SM" | "RS" | "SK" | "SI" | "ES" | "SJ"
        | "SE" | "CH" | "UA" | "GB" => "Europe",
        // SX (Sint Maarten) is missing from common continent tables
        "AI" | "AG" | "AW" | "BS" | "BB" | "BZ" | "BM" | "BQ" | "VG" | "CA" | "KY" | "CR"
        | "CU" | "CW" | "DM" | "DO" | "SV" | "GL" | "GD" | "GP" | "GT" | "HT" | "HN" | "JM"
        | "MQ" | "MX" | "MS" | "NI" | "PA" | "PR" | "BL" | "KN" | "LC" | "MF" | "PM" | "VC"
        | "SX" | "TT" | "TC" | "US" | "VI" => "North America",
        "AR" | "BO" | "BR" | "CL" | "CO" | "EC" | "FK" | "GF" | "GY" | "PY" | "PE" | "SR"
        | "UY" | "VE" => "South America",
        "AS" | "AU" | "CK" | "FJ" | "PF" | "GU" | "KI" | "MH" | "FM" | "NR" | "NC" | "NZ"
        | "NU" | "NF" | "MP" | "PW" | "PG" | "PN" | "WS" | "SB" | "TK" | "TO" | "TV" | "VU"
        | "WF" | "UM" => "Oceania",
        "AQ" => "Antarctica",
        _ => return None,
    };
    Some(continent)
}

/// Distance between every pair of `anchors` with known coordinates.
/// Returns the table and the anchors skipped for lack of coordinates.
pub fn pairwise_distances(
    anchors: &[AnchorId],
    locations: &HashMap<AnchorId, Coordinates>,
) -> (WeightTable, BTreeSet<AnchorId>) {
    let mut missing = BTreeSet::new();
    let located: Vec<(AnchorId, Coordinates)> = anchors
        .iter()
        .filter_map(|&anchor| match locations.get(&anchor) {
            Some(&coords) => Some((anchor, coords)),
            None => {
                missing.insert(anchor);
                None
            }
        })
        .collect();

    let mut table = WeightTable::new();
    for (i, &(a, coords_a)) in located.iter().enumerate() {
        for &(b, coords_b) in &located[i + 1..] {
            table.observe(a, b, coords_a.distance_km(&coords_b));
        }
    }

    if !missing.is_empty() {
        warn!("{} anchor(s) without coordinates skipped: {:?}", missing.len(), missing);
    }
    info!("computed {} pairwise distances over {} anchors", table.len(), located.len());
    (table, missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_city_pair_distance() {
        let paris = Coordinates::new(48.8566, 2.3522);
        let london = Coordinates::new(51.5074, -0.1278);
        let d = paris.distance_km(&london);
        assert!((d - 343.5).abs() < 2.0, "got {}", d);
        assert_eq!(paris.distance_km(&paris), 0.0);
    }

    #[test]
    fn antipodes_are_half_a_circumference_apart() {
        let a = Coordinates::new(0.0, 0.0);
        let b = Coordinates::new(0.0, 180.0);
        let d = a.distance_km(&b);
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn pairwise_skips_unlocated_anchors() {
        let locations = HashMap::from([
            (1, Coordinates::new(48.8566, 2.3522)),
            (2, Coordinates::new(51.5074, -0.1278)),
            (3, Coordinates::new(52.52, 13.405)),
        ]);
        let (table, missing) = pairwise_distances(&[1, 2, 3, 9], &locations);
        assert_eq!(table.len(), 3);
        assert_eq!(missing, BTreeSet::from([9]));
        assert!(table.get(3, 1).is_some());
    }

    #[test]
    fn continents_from_country_codes() {
        assert_eq!(continent_of("GH"), Some("Africa"));
        assert_eq!(continent_of("sg"), Some("Asia"));
        assert_eq!(continent_of("SX"), Some("North America"));
        assert_eq!(continent_of("NA"), Some("Africa"));
        assert_eq!(continent_of("ZZ"), None);
    }
}
