//! Monitoring installation (station) models.

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair, used for the device position and for
/// installation locations.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
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
}

/// Installation location as returned by the API.
pub type Location = Coordinates;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub country: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    #[serde(rename = "displayAddress1")]
    pub display_address1: Option<String>,
    #[serde(rename = "displayAddress2")]
    pub display_address2: Option<String>,
}

impl Address {
    /// Format the address as a single line.
    pub fn formatted(&self) -> Option<String> {
        let display: Vec<&str> = [&self.display_address1, &self.display_address2]
            .into_iter()
            .flatten()
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        if !display.is_empty() {
            return Some(display.join(", "));
        }

        let street = match (&self.street, &self.number) {
            (Some(street), Some(number)) if !number.is_empty() => {
                Some(format!("{} {}", street, number))
            }
            (Some(street), _) => Some(street.clone()),
            _ => None,
        };

        let parts: Vec<String> = [self.city.clone(), street]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sponsor {
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo: Option<String>,
    pub link: Option<String>,
}

/// An air-quality monitoring installation.
// Note: API returns id as a number, the cache keys it as text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub id: String,
    pub location: Location,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(default)]
    pub airly: bool,
    #[serde(default)]
    pub sponsor: Option<Sponsor>,
}

impl Installation {
    /// Name shown in listings: the address when known, otherwise the id.
    pub fn display_name(&self) -> String {
        self.address
            .formatted()
            .unwrap_or_else(|| format!("Installation {}", self.id))
    }
}

// Helper to deserialize string or number as String
fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct StringOrNumberVisitor;

    impl<'de> de::Visitor<'de> for StringOrNumberVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer id")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(StringOrNumberVisitor)
}
