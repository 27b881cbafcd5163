use crate::Woff2Params;
use anyhow::*;
use serde::Deserialize;
use std::path::PathBuf;

/// Encoder settings, as read from a TOML configuration file.
///
/// Fields missing from a configuration file take their values from the bundled defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncodeSettings {
    pub brotli_quality: u32,
    pub allow_transforms: bool,
    pub verify_checksums: bool,
    pub metadata_file: Option<PathBuf>,
}
impl EncodeSettings {
    /// Parses encoder settings, falling back to the defaults when none are given.
    pub fn load(settings: Option<&str>) -> Result<EncodeSettings> {
        let mut merged: toml::Table = toml::from_str(DEFAULT_ENCODE_SETTINGS)?;
        if let Some(x) = settings {
            merged.extend(toml::from_str::<toml::Table>(x)?);
        }
        let settings: EncodeSettings = toml::Value::Table(merged).try_into()?;
        if settings.brotli_quality > crate::MAX_BROTLI_QUALITY {
            bail!("`brotli_quality` must be between 0 and 11, found {}", settings.brotli_quality);
        }
        Ok(settings)
    }

    /// Builds encoder parameters from these settings, reading the metadata file if one is set.
    pub fn to_params(&self) -> Result<Woff2Params> {
        let extended_metadata = match &self.metadata_file {
            Some(path) => std::fs::read(path)
                .with_context(|| format!("Could not read metadata file: {}", path.display()))?,
            None => Vec::new(),
        };
        Ok(Woff2Params {
            extended_metadata,
            brotli_quality: self.brotli_quality,
            allow_transforms: self.allow_transforms,
            verify_checksums: self.verify_checksums,
        })
    }
}

/// The default encoder settings.
pub const DEFAULT_ENCODE_SETTINGS: &str = include_str!("default_settings.toml");
