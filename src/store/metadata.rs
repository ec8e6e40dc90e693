//! Object metadata attached to every stored artifact.

use std::collections::HashMap;

use crate::feed::{CheckinRecord, Venue};

pub type Metadata = HashMap<String, String>;

/// Build the attribute map for a check-in.
///
/// The placeholder "at home" venue and a missing venue both leave the
/// location fields empty; the venue name itself is kept.
pub fn checkin_metadata(record: &CheckinRecord) -> Metadata {
    let (venue_name, city, state, country, latlng) = match &record.venue {
        Some(venue) if venue.is_at_home() => (
            venue.name.as_str(),
            "",
            "",
            "",
            String::new(),
        ),
        Some(Venue {
            name,
            city,
            state,
            country,
            lat,
            lng,
        }) => (
            name.as_str(),
            city.as_str(),
            state.as_str(),
            country.as_str(),
            format_latlng(*lat, *lng),
        ),
        None => ("", "", "", "", String::new()),
    };

    let mut attrs = vec![
        ("id", record.id.to_string()),
        ("beer", record.beer.name.clone()),
        ("brewery", record.brewery.name.clone()),
        ("brewery_country", record.brewery.country.clone()),
        ("comment", record.comment.clone()),
        ("rating", format!("{:.2}", record.rating)),
        ("venue", venue_name.to_string()),
        ("city", city.to_string()),
        ("state", state.to_string()),
        ("country", country.to_string()),
        ("latlng", latlng),
        ("date", record.created_at.to_rfc3339()),
        ("style", record.beer.style.clone()),
        ("abv", format!("{:.2}", record.beer.abv)),
    ];
    if let Some(serving) = &record.serving_type {
        attrs.push(("serving", serving.clone()));
    }

    attrs
        .into_iter()
        .map(|(k, v)| (k.to_string(), header_safe(&v)))
        .collect()
}

/// `lat,lng` with six decimals, or empty when either coordinate is exactly
/// zero (the API's "unknown").
pub fn format_latlng(lat: f64, lng: f64) -> String {
    if lat == 0.0 || lng == 0.0 {
        return String::new();
    }
    format!("{:.6},{:.6}", lat, lng)
}

/// Metadata travels as HTTP headers, which only carry visible ASCII.
pub(crate) fn header_safe(value: &str) -> String {
    if value.chars().all(|c| c == ' ' || c.is_ascii_graphic()) {
        value.to_string()
    } else {
        urlencoding::encode(value).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::VENUE_AT_HOME;
    use crate::feed::{Beer, Brewery};
    use chrono::{TimeZone, Utc};

    fn record(venue: Option<Venue>) -> CheckinRecord {
        CheckinRecord {
            id: 42,
            created_at: Utc.with_ymd_and_hms(2023, 10, 21, 19, 4, 5).unwrap(),
            comment: "Great".to_string(),
            rating: 4.0,
            beer: Beer {
                name: "Pils".to_string(),
                style: "Pilsner - German".to_string(),
                abv: 4.9,
            },
            brewery: Brewery {
                name: "Tired Hands".to_string(),
                country: "United States".to_string(),
            },
            venue,
            photo_url: None,
            serving_type: None,
        }
    }

    fn venue(name: &str, lat: f64, lng: f64) -> Venue {
        Venue {
            name: name.to_string(),
            city: "Ardmore".to_string(),
            state: "PA".to_string(),
            country: "United States".to_string(),
            lat,
            lng,
        }
    }

    #[test]
    fn test_full_attribute_map() {
        let attrs = checkin_metadata(&record(Some(venue("Fermentaria", 40.0, -75.3))));
        assert_eq!(attrs["id"], "42");
        assert_eq!(attrs["rating"], "4.00");
        assert_eq!(attrs["abv"], "4.90");
        assert_eq!(attrs["venue"], "Fermentaria");
        assert_eq!(attrs["city"], "Ardmore");
        assert_eq!(attrs["latlng"], "40.000000,-75.300000");
        assert_eq!(attrs["date"], "2023-10-21T19:04:05+00:00");
        assert_eq!(attrs["style"], "Pilsner - German");
        assert!(!attrs.contains_key("serving"));
    }

    #[test]
    fn test_at_home_venue_is_redacted() {
        let attrs = checkin_metadata(&record(Some(venue(VENUE_AT_HOME, 40.0, -75.3))));
        assert_eq!(attrs["venue"], VENUE_AT_HOME);
        assert_eq!(attrs["city"], "");
        assert_eq!(attrs["state"], "");
        assert_eq!(attrs["country"], "");
        assert_eq!(attrs["latlng"], "");
    }

    #[test]
    fn test_missing_venue_leaves_location_empty() {
        let attrs = checkin_metadata(&record(None));
        for field in ["venue", "city", "state", "country", "latlng"] {
            assert_eq!(attrs[field], "", "field {field}");
        }
    }

    #[test]
    fn test_zero_coordinate_means_unknown() {
        assert_eq!(format_latlng(0.0, 12.5), "");
        assert_eq!(format_latlng(51.5, 0.0), "");
        assert_eq!(format_latlng(51.5, -0.12), "51.500000,-0.120000");
    }

    #[test]
    fn test_serving_type_included_when_known() {
        let mut r = record(None);
        r.serving_type = Some("Can".to_string());
        assert_eq!(checkin_metadata(&r)["serving"], "Can");
    }

    #[test]
    fn test_non_ascii_values_are_encoded() {
        let mut r = record(None);
        r.comment = "Schön\nlecker".to_string();
        r.brewery.name = "Brauerei Spezial".to_string();
        let attrs = checkin_metadata(&r);
        assert_eq!(attrs["comment"], "Sch%C3%B6n%0Alecker");
        assert_eq!(attrs["brewery"], "Brauerei Spezial");
    }
}
