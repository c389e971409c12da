//! Location name resolution.
//!
//! Real geocoding is an external collaborator; this module only defines the
//! seam and a table-backed implementation fed from config.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::model::Coordinates;

#[async_trait]
pub trait Geocoder: Send + Sync + std::fmt::Debug {
    /// Resolves a location name. `Ok(None)` means the name is unknown.
    async fn resolve(&self, name: &str) -> anyhow::Result<Option<Coordinates>>;
}

/// Case-insensitive lookup table of named locations.
#[derive(Debug, Clone, Default)]
pub struct StaticGeocoder {
    entries: HashMap<String, Coordinates>,
}

impl StaticGeocoder {
    /// Builds the table, skipping entries whose value is not a `"lat,lon"` pair.
    pub fn from_table(table: &HashMap<String, String>) -> Self {
        let entries = table
            .iter()
            .filter_map(|(name, value)| match Coordinates::parse(value.trim()) {
                Some(coords) => Some((name.trim().to_lowercase(), coords)),
                None => {
                    tracing::warn!("Ignoring location '{}': '{}' is not a lat,lon pair", name, value);
                    None
                }
            })
            .collect();

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn resolve(&self, name: &str) -> anyhow::Result<Option<Coordinates>> {
        Ok(self.entries.get(&name.trim().to_lowercase()).cloned())
    }
}
