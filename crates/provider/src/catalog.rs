//! Resolving asset names to bundle locations

use bundlefetch_errors::{ConfigError, Error};
use bundlefetch_types::{should_use_request, BundleLocation, FetchOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Maps an asset name to the bundle that contains it.
pub trait AssetLocator: Send + Sync {
    /// Resolve `asset_name` to a bundle location.
    ///
    /// # Errors
    ///
    /// Returns an error if the asset is unknown.
    fn locate(&self, asset_name: &str) -> Result<BundleLocation, Error>;
}

/// One bundle in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub name: String,
    /// URL or file path of the bundle artifact
    pub path: String,
    #[serde(default)]
    pub options: Option<FetchOptions>,
}

/// TOML catalog of bundles and the assets they provide.
///
/// ```toml
/// [[bundles]]
/// name = "shapes"
/// path = "https://cdn.example.com/shapes.bundle"
///
/// [bundles.options]
/// bundle_name = "shapes"
/// hash = "9f2c01"
///
/// [assets]
/// cube = "shapes"
/// ```
///
/// An asset without an `[assets]` entry resolves to the bundle of the same
/// name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub bundles: Vec<BundleEntry>,
    #[serde(default)]
    pub assets: HashMap<String, String>,
    /// Directory relative local paths are resolved against
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Catalog {
    /// Parse a catalog from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid catalog.
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| {
            ConfigError::ParseError {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Load a catalog file; relative bundle paths resolve against its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;
        let catalog = Self::from_toml_str(&text)?;
        debug!(
            path = %path.display(),
            bundles = catalog.bundles.len(),
            assets = catalog.assets.len(),
            "loaded catalog"
        );
        Ok(catalog.with_base_dir(path.parent().map(Path::to_path_buf)))
    }

    #[must_use]
    pub fn with_base_dir(mut self, base_dir: Option<PathBuf>) -> Self {
        self.base_dir = base_dir.filter(|dir| !dir.as_os_str().is_empty());
        self
    }

    /// Bundle entry by bundle name.
    #[must_use]
    pub fn bundle(&self, name: &str) -> Option<&BundleEntry> {
        self.bundles.iter().find(|entry| entry.name == name)
    }

    fn resolve_path(&self, path: &str) -> String {
        match &self.base_dir {
            Some(base) if !should_use_request(path) && Path::new(path).is_relative() => {
                base.join(path).display().to_string()
            }
            _ => path.to_string(),
        }
    }
}

impl AssetLocator for Catalog {
    fn locate(&self, asset_name: &str) -> Result<BundleLocation, Error> {
        let bundle_name = self
            .assets
            .get(asset_name)
            .map_or(asset_name, String::as_str);
        let entry = self.bundle(bundle_name).ok_or_else(|| ConfigError::UnknownAsset {
            name: asset_name.to_string(),
        })?;
        Ok(BundleLocation::new(
            self.resolve_path(&entry.path),
            entry.options.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
[[bundles]]
name = "shapes"
path = "https://cdn.example.com/shapes.bundle"

[bundles.options]
bundle_name = "shapes"
hash = "9f2c01"
bundle_size = 1000

[[bundles]]
name = "local"
path = "bundles/local.bundle"

[assets]
cube = "shapes"
sphere = "shapes"
"#;

    #[test]
    fn assets_resolve_through_mapping() {
        let catalog = Catalog::from_toml_str(CATALOG).unwrap();
        let location = catalog.locate("cube").unwrap();
        assert_eq!(location.internal_id, "https://cdn.example.com/shapes.bundle");
        let options = location.options.unwrap();
        assert_eq!(options.cache_hash(), Some("9f2c01"));
        assert_eq!(options.bundle_size, 1000);
    }

    #[test]
    fn bundle_name_is_an_asset_name() {
        let catalog = Catalog::from_toml_str(CATALOG).unwrap();
        let location = catalog.locate("local").unwrap();
        assert!(location.options.is_none());
    }

    #[test]
    fn unknown_asset() {
        let catalog = Catalog::from_toml_str(CATALOG).unwrap();
        assert!(matches!(
            catalog.locate("torus"),
            Err(Error::Config(ConfigError::UnknownAsset { .. }))
        ));
    }

    #[test]
    fn relative_paths_follow_base_dir() {
        let catalog = Catalog::from_toml_str(CATALOG)
            .unwrap()
            .with_base_dir(Some(PathBuf::from("/srv/assets")));
        assert_eq!(
            catalog.locate("local").unwrap().internal_id,
            Path::new("/srv/assets").join("bundles/local.bundle").display().to_string()
        );
        // URLs are left alone
        assert_eq!(
            catalog.locate("cube").unwrap().internal_id,
            "https://cdn.example.com/shapes.bundle"
        );
    }

    #[test]
    fn parse_error_is_config_error() {
        assert!(matches!(
            Catalog::from_toml_str("[[bundles]]\nname = 3"),
            Err(Error::Config(ConfigError::ParseError { .. }))
        ));
    }
}
