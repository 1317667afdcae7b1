//! Classification of free-form location input.
//!
//! Accepted shapes, tried in order: `lat,lon` coordinates, a 5-digit ZIP
//! (optionally ZIP+4), `City, ST`, and anything else as a free-text address.

use crate::error::{Error, Result};
use crate::types::Coordinates;

#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    Coordinates(Coordinates),
    ZipCode(String),
    CityState { city: String, state: String },
    Address(String),
}

impl LocationQuery {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("location input is empty".to_string()));
        }

        if let Some(at) = parse_coordinates(trimmed) {
            let at = validate_coordinates(at.latitude, at.longitude)?;
            return Ok(LocationQuery::Coordinates(at));
        }

        if is_zip_code(trimmed) {
            return Ok(LocationQuery::ZipCode(trimmed.to_string()));
        }

        if let Some((city, state)) = parse_city_state(trimmed) {
            return Ok(LocationQuery::CityState { city, state });
        }

        Ok(LocationQuery::Address(trimmed.to_string()))
    }

    /// Query string handed to an address geocoder; `None` for shapes that
    /// are not geocoded as addresses.
    pub fn address_query(&self) -> Option<String> {
        match self {
            LocationQuery::CityState { city, state } => Some(format!("{}, {}, USA", city, state)),
            LocationQuery::Address(address) => Some(address.clone()),
            _ => None,
        }
    }
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<Coordinates> {
    if latitude.is_nan() || longitude.is_nan() {
        return Err(Error::InvalidInput(
            "invalid coordinates: must be numbers".to_string(),
        ));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(Error::InvalidInput(
            "invalid latitude: must be between -90 and 90".to_string(),
        ));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::InvalidInput(
            "invalid longitude: must be between -180 and 180".to_string(),
        ));
    }
    Ok(Coordinates::new(latitude, longitude))
}

/// Shortens a geocoder display name: country parts are dropped and at most
/// three parts are kept.
pub fn format_display_name(display_name: &str) -> String {
    display_name
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter(|part| !part.contains("United States") && !part.contains("USA"))
        .take(3)
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_coordinates(input: &str) -> Option<Coordinates> {
    let (lat, lon) = input.split_once(',')?;
    let lon = lon.trim_start();
    if !is_decimal(lat) || !is_decimal(lon) {
        return None;
    }
    Some(Coordinates::new(lat.parse().ok()?, lon.parse().ok()?))
}

// -?\d+\.?\d*
fn is_decimal(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (digits, ""),
    };
    !whole.is_empty()
        && whole.chars().all(|c| c.is_ascii_digit())
        && fraction.chars().all(|c| c.is_ascii_digit())
}

fn is_zip_code(input: &str) -> bool {
    let bytes = input.as_bytes();
    match bytes.len() {
        5 => bytes.iter().all(u8::is_ascii_digit),
        10 => {
            bytes[..5].iter().all(u8::is_ascii_digit)
                && bytes[5] == b'-'
                && bytes[6..].iter().all(u8::is_ascii_digit)
        }
        _ => false,
    }
}

fn parse_city_state(input: &str) -> Option<(String, String)> {
    let (city, state) = input.rsplit_once(',')?;
    let city = city.trim();
    let state = state.trim_start();
    if city.is_empty() || state.len() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((city.to_string(), state.to_ascii_uppercase()))
}
