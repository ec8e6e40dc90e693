//! Check-in records and the feed API's wire format.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

use super::error::FeedError;

/// Venue name the API assigns to check-ins logged without a real location.
pub const VENUE_AT_HOME: &str = "Untappd at Home";

/// A single check-in, normalized from either the feed API or an export file.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckinRecord {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub comment: String,
    pub rating: f64,
    pub beer: Beer,
    pub brewery: Brewery,
    pub venue: Option<Venue>,
    pub photo_url: Option<String>,
    /// Only export files carry this.
    pub serving_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Beer {
    pub name: String,
    pub style: String,
    pub abv: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Brewery {
    pub name: String,
    pub country: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Venue {
    pub name: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub lat: f64,
    pub lng: f64,
}

impl Venue {
    /// The placeholder venue carries a fake location that must not be stored.
    pub fn is_at_home(&self) -> bool {
        self.name == VENUE_AT_HOME
    }
}

/// Parse the feed API's RFC 2822 timestamps (`Sat, 21 Oct 2023 19:04:05 +0000`).
pub fn parse_api_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse export-file timestamps (`2023-10-21 19:04:05`), which are UTC.
pub fn parse_export_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

// ── Wire format ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct FeedEnvelope {
    pub response: FeedBody,
}

/// Check-ins arrive nested under `checkins` on the user feed and directly
/// under `response` on some other endpoints. Untagged variants are tried in
/// declaration order, so the nested shape wins when both could match.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum FeedBody {
    Nested {
        checkins: ItemList,
        #[serde(default)]
        pagination: Pagination,
    },
    Flat {
        items: Vec<ApiCheckin>,
        #[serde(default)]
        pagination: Pagination,
    },
}

impl FeedBody {
    pub fn into_parts(self) -> (Vec<ApiCheckin>, Pagination) {
        match self {
            FeedBody::Nested {
                checkins,
                pagination,
            } => (checkins.items, pagination),
            FeedBody::Flat { items, pagination } => (items, pagination),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemList {
    #[serde(default)]
    pub items: Vec<ApiCheckin>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Pagination {
    #[serde(default, deserialize_with = "null_as_default")]
    pub since_url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCheckin {
    pub checkin_id: u64,
    pub created_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub checkin_comment: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rating_score: f64,
    #[serde(default)]
    pub beer: ApiBeer,
    #[serde(default)]
    pub brewery: ApiBrewery,
    #[serde(default, deserialize_with = "venue_or_empty")]
    pub venue: Option<ApiVenue>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub media: ApiMedia,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiBeer {
    #[serde(default, deserialize_with = "null_as_default")]
    pub beer_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub beer_style: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub beer_abv: f64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiBrewery {
    #[serde(default, deserialize_with = "null_as_default")]
    pub brewery_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub country_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiVenue {
    #[serde(default, deserialize_with = "null_as_default")]
    pub venue_name: String,
    #[serde(default)]
    pub location: ApiLocation,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiLocation {
    #[serde(default, deserialize_with = "null_as_default")]
    pub venue_city: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub venue_state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub venue_country: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub lat: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub lng: f64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiMedia {
    #[serde(default)]
    pub items: Vec<ApiMediaItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiMediaItem {
    #[serde(default)]
    pub photo: ApiPhoto,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiPhoto {
    #[serde(default, deserialize_with = "null_as_default")]
    pub photo_img_og: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The API sends `"venue": []` for check-ins without a venue.
///
/// `Empty` must come first: serde accepts an empty sequence for a struct
/// whose fields all have defaults, so `Present` would swallow `[]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum VenueField {
    Empty(Vec<serde_json::Value>),
    Present(ApiVenue),
}

fn venue_or_empty<'de, D>(deserializer: D) -> Result<Option<ApiVenue>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<VenueField>::deserialize(deserializer)? {
        Some(VenueField::Present(venue)) => Some(venue),
        Some(VenueField::Empty(_)) | None => None,
    })
}

impl TryFrom<ApiCheckin> for CheckinRecord {
    type Error = FeedError;

    fn try_from(api: ApiCheckin) -> Result<Self, Self::Error> {
        let created_at =
            parse_api_timestamp(&api.created_at).ok_or_else(|| FeedError::Timestamp {
                id: api.checkin_id,
                value: api.created_at.clone(),
            })?;

        let photo_url = api
            .media
            .items
            .into_iter()
            .next()
            .map(|item| item.photo.photo_img_og)
            .filter(|url| !url.is_empty());

        let venue = api.venue.map(|v| Venue {
            name: v.venue_name,
            city: v.location.venue_city,
            state: v.location.venue_state,
            country: v.location.venue_country,
            lat: v.location.lat,
            lng: v.location.lng,
        });

        Ok(CheckinRecord {
            id: api.checkin_id,
            created_at,
            comment: api.checkin_comment,
            rating: api.rating_score,
            beer: Beer {
                name: api.beer.beer_name,
                style: api.beer.beer_style,
                abv: api.beer.beer_abv,
            },
            brewery: Brewery {
                name: api.brewery.brewery_name,
                country: api.brewery.country_name,
            },
            venue,
            photo_url,
            serving_type: None,
        })
    }
}
