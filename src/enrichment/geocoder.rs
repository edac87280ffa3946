/// Reverse geocoding against a Nominatim compatible endpoint
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use url::Url;

use crate::models::Address;

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the service answered but knows no address here
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<Address>, String>;
}

#[derive(Debug, Default, Deserialize)]
struct ReverseResponse {
    address: Option<AddressFields>,
}

#[derive(Debug, Default, Deserialize)]
struct AddressFields {
    road: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    postcode: Option<String>,
    country_code: Option<String>,
    suburb: Option<String>,
}

pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: Url,
}

impl NominatimGeocoder {
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, String> {
        let base_url = Url::parse(base_url)
            .map_err(|e| format!("Invalid geocoder URL '{}': {}", base_url, e))?;
        Ok(Self { client, base_url })
    }

    fn request_url(&self, latitude: f64, longitude: f64) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("format", "jsonv2")
            .append_pair("lat", &latitude.to_string())
            .append_pair("lon", &longitude.to_string());
        url
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<Address>, String> {
        let url = self.request_url(latitude, longitude);
        debug!("Reverse geocoding {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Geocoder request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Geocoder returned HTTP {}", response.status()));
        }

        let body: ReverseResponse = response
            .json()
            .await
            .map_err(|e| format!("Geocoder response was not valid JSON: {}", e))?;

        Ok(address_from_response(body))
    }
}

fn address_from_response(body: ReverseResponse) -> Option<Address> {
    let fields = body.address?;
    let address = Address {
        street: fields.road.unwrap_or_default(),
        postcode: fields.postcode.unwrap_or_default(),
        suburb: fields.suburb.unwrap_or_default(),
        city: fields
            .city
            .or(fields.town)
            .or(fields.village)
            .unwrap_or_default(),
        country: fields.country_code.unwrap_or_default(),
    };

    if address.is_empty() {
        None
    } else {
        Some(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Option<Address> {
        address_from_response(serde_json::from_str(body).unwrap())
    }

    #[test]
    fn maps_nominatim_address() {
        let address = parse(
            r#"{"place_id":1,"address":{"road":"Mannerheimintie","suburb":"Kamppi","city":"Helsinki","postcode":"00100","country":"Suomi","country_code":"fi"}}"#,
        )
        .unwrap();
        assert_eq!(address.street, "Mannerheimintie");
        assert_eq!(address.suburb, "Kamppi");
        assert_eq!(address.city, "Helsinki");
        assert_eq!(address.postcode, "00100");
        assert_eq!(address.country, "fi");
    }

    #[test]
    fn city_falls_back_to_town() {
        let address = parse(r#"{"address":{"road":"Rantatie","town":"Hanko"}}"#).unwrap();
        assert_eq!(address.city, "Hanko");
        assert_eq!(address.suburb, "");
    }

    #[test]
    fn missing_or_empty_address_is_not_found() {
        assert_eq!(parse(r#"{"error":"Unable to geocode"}"#), None);
        assert_eq!(parse(r#"{"address":{"state":"Uusimaa"}}"#), None);
    }

    #[test]
    fn builds_query_url() {
        let geocoder =
            NominatimGeocoder::new(reqwest::Client::new(), "https://example.org/reverse").unwrap();
        let url = geocoder.request_url(60.17, 24.94);
        assert_eq!(
            url.as_str(),
            "https://example.org/reverse?format=jsonv2&lat=60.17&lon=24.94"
        );
    }
}
