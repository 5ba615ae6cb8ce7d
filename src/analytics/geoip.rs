//! Country and city lookup using a MaxMind GeoLite2/GeoIP2 City database

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

/// Location fields stored on a visit record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub city: Option<String>,
}

/// Memory-mapped City database; a service without a database resolves nothing
#[derive(Clone, Default)]
pub struct GeoIpService {
    city_reader: Option<Arc<Reader<Mmap>>>,
}

impl GeoIpService {
    pub fn new(city_path: Option<&str>) -> Result<Self> {
        let city_reader = match city_path {
            Some(path) => {
                let reader = unsafe { Reader::open_mmap(path) }
                    .with_context(|| format!("Failed to open GeoIP City database at {}", path))?;
                Some(Arc::new(reader))
            }
            None => None,
        };

        Ok(Self { city_reader })
    }

    pub fn is_enabled(&self) -> bool {
        self.city_reader.is_some()
    }

    /// English country name (ISO code when unnamed) and English city name
    pub fn lookup(&self, ip: IpAddr) -> GeoLocation {
        let Some(reader) = &self.city_reader else {
            return GeoLocation::default();
        };

        let Ok(result) = reader.lookup(ip) else {
            return GeoLocation::default();
        };

        match result.decode::<geoip2::City>() {
            Ok(Some(city)) => GeoLocation {
                country: city
                    .country
                    .names
                    .english
                    .or(city.country.iso_code)
                    .map(|s| s.to_string()),
                city: city.city.names.english.map(|s| s.to_string()),
            },
            _ => GeoLocation::default(),
        }
    }
}
