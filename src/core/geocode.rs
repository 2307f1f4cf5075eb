//! Finding and naming destinations.
//!
//! Lookups are best effort: a failed or empty answer falls back to offline
//! coordinate handling so creating a fence never depends on the geocoder.

use reqwest::blocking::Client;
use reqwest::header::ACCEPT_LANGUAGE;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::config::GeocoderSettings;
use super::error::{Error, Result};
use super::geo::GeoPoint;
use super::model::Destination;

/// Label used when no better name is available.
pub const DEFAULT_PLACE_NAME: &str = "Selected location";

pub trait Geocoder: Send + Sync {
    /// Places matching a free-text query, best match first.
    fn search(&self, query: &str) -> Result<Vec<Destination>>;

    /// Human-readable name for `point`, if the service knows one.
    fn reverse(&self, point: &GeoPoint) -> Result<Option<String>>;
}

/// Offline geocoder: understands `lat,lon` queries and labels points by their coordinates.
pub struct CoordinateGeocoder;

impl Geocoder for CoordinateGeocoder {
    fn search(&self, query: &str) -> Result<Vec<Destination>> {
        Ok(parse_coordinates(query)
            .map(|point| Destination::new(point, coordinate_label(&point)))
            .into_iter()
            .collect())
    }

    fn reverse(&self, point: &GeoPoint) -> Result<Option<String>> {
        Ok(Some(coordinate_label(point)))
    }
}

fn coordinate_label(point: &GeoPoint) -> String {
    format!(
        "{} ({:.5}, {:.5})",
        DEFAULT_PLACE_NAME, point.latitude, point.longitude
    )
}

/// Read `"41.0082, 28.9784"` or `"41.0082 28.9784"` as a point.
pub fn parse_coordinates(query: &str) -> Option<GeoPoint> {
    let mut parts = query
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty());
    let latitude = parts.next()?.parse().ok()?;
    let longitude = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    GeoPoint::checked(latitude, longitude).ok()
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct NominatimReverse {
    #[serde(default)]
    display_name: Option<String>,
}

/// OpenStreetMap Nominatim over HTTP.
///
/// Uses a blocking client; call it from a blocking context.
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    language: Option<String>,
    country_codes: Option<String>,
    result_limit: u32,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>, settings: &GeocoderSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout())
            .build()
            .map_err(http_error)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            language: settings.language.clone(),
            country_codes: settings.country_codes.clone(),
            result_limit: settings.result_limit.max(1),
        })
    }

    fn get_json<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut request = self.client.get(&url).query(query);
        if let Some(language) = &self.language {
            request = request.header(ACCEPT_LANGUAGE, language.as_str());
        }

        let body = request
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(http_error)?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl Geocoder for NominatimGeocoder {
    fn search(&self, query: &str) -> Result<Vec<Destination>> {
        let mut params = vec![
            ("format", "json".to_string()),
            ("q", query.to_string()),
            ("limit", self.result_limit.to_string()),
            ("addressdetails", "1".to_string()),
        ];
        if let Some(codes) = &self.country_codes {
            params.push(("countrycodes", codes.clone()));
        }

        let places: Vec<NominatimPlace> = self.get_json("search", &params)?;
        log::debug!("Nominatim returned {} place(s) for {:?}", places.len(), query);
        Ok(places.into_iter().filter_map(place_to_destination).collect())
    }

    fn reverse(&self, point: &GeoPoint) -> Result<Option<String>> {
        let params = [
            ("format", "json".to_string()),
            ("lat", point.latitude.to_string()),
            ("lon", point.longitude.to_string()),
            ("addressdetails", "1".to_string()),
        ];
        let place: NominatimReverse = self.get_json("reverse", &params)?;
        Ok(place.display_name)
    }
}

fn http_error(e: reqwest::Error) -> Error {
    Error::Geocode(e.to_string())
}

fn place_to_destination(place: NominatimPlace) -> Option<Destination> {
    let point = GeoPoint::checked(place.lat.parse().ok()?, place.lon.parse().ok()?).ok()?;
    let mut destination = match place.name.filter(|n| !n.trim().is_empty()) {
        Some(name) => {
            let mut destination = Destination::new(point, name);
            destination.address = Some(place.display_name);
            destination
        }
        None => Destination::new(point, place.display_name),
    };
    destination.name = destination.name.trim().to_string();
    Some(destination)
}

/// Pick the geocoder described by `settings`, falling back to offline lookups.
pub fn from_settings(settings: &GeocoderSettings) -> Box<dyn Geocoder> {
    let Some(url) = &settings.nominatim_url else {
        return Box::new(CoordinateGeocoder);
    };
    match NominatimGeocoder::new(url.clone(), settings) {
        Ok(geocoder) => Box::new(geocoder),
        Err(e) => {
            log::warn!("Place search unavailable, using coordinates only: {}", e);
            Box::new(CoordinateGeocoder)
        }
    }
}

/// Places for `query`. A failed or empty search still accepts a `lat,lon` query.
pub fn search_destinations(geocoder: &dyn Geocoder, query: &str) -> Vec<Destination> {
    match geocoder.search(query) {
        Ok(found) if !found.is_empty() => return found,
        Ok(_) => {}
        Err(e) => log::warn!("Place search failed: {}", e),
    }
    CoordinateGeocoder.search(query).unwrap_or_default()
}

/// Resolve a display name for `point`, never failing.
pub fn resolve_name(geocoder: &dyn Geocoder, point: &GeoPoint) -> String {
    match geocoder.reverse(point) {
        Ok(Some(name)) if !name.trim().is_empty() => name.trim().to_string(),
        Ok(_) => DEFAULT_PLACE_NAME.to_string(),
        Err(e) => {
            log::warn!("Reverse geocoding failed, using default name: {}", e);
            DEFAULT_PLACE_NAME.to_string()
        }
    }
}
