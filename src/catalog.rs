//! Apps catalog loading and resolution.
//!
//! Apps are defined once in a shared catalog so device profiles only refer
//! to them by id. The catalog is split into three partitions:
//!
//! | File                      | Partition      | Installed |
//! |---------------------------|----------------|-----------|
//! | `apps/core.toml`          | core           | always    |
//! | `apps/extras/free.toml`   | extras_free    | on request |
//! | `apps/extras/non-free.toml` | extras_non_free | on request |
//!
//! Each partition keeps the order of its source file. That order is the
//! tie-break when two core apps share an installation priority.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::{ClearphoneError, Result};

/// Priority given to apps that do not declare one.
pub const DEFAULT_INSTALLATION_PRIORITY: i64 = 50;

/// Where an app's APK comes from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AppSource {
    /// Resolved through the F-Droid repository index
    #[default]
    Fdroid,
    /// Fetched from a fixed URL
    Direct,
}

/// Definition of an app from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppDefinition {
    pub id: String,
    /// Android package identifier on the device
    pub package_id: String,
    pub name: String,
    pub source: AppSource,
    pub fdroid_package_name: Option<String>,
    pub download_url: Option<String>,
    pub description: Option<String>,
    /// Lower installs earlier
    pub installation_priority: i64,
    pub notes: Option<String>,
}

/// On-disk shape of one catalog entry. The table key supplies the id.
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(default)]
    package_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    source: AppSource,
    fdroid_package_name: Option<String>,
    download_url: Option<String>,
    description: Option<String>,
    installation_priority: Option<i64>,
    notes: Option<String>,
}

impl AppDefinition {
    fn from_entry(id: &str, entry: CatalogEntry) -> Self {
        Self {
            id: id.to_string(),
            package_id: entry.package_id,
            name: entry.name,
            source: entry.source,
            fdroid_package_name: entry.fdroid_package_name,
            download_url: entry.download_url,
            description: entry.description,
            installation_priority: entry
                .installation_priority
                .unwrap_or(DEFAULT_INSTALLATION_PRIORITY),
            notes: entry.notes,
        }
    }

    /// The source-specific locator: index package name or direct URL.
    pub fn locator(&self) -> Option<&str> {
        match self.source {
            AppSource::Fdroid => self.fdroid_package_name.as_deref(),
            AppSource::Direct => self.download_url.as_deref(),
        }
    }
}

/// Container for all apps in the catalog.
#[derive(Debug, Clone, Default)]
pub struct AppsCatalog {
    core: Vec<AppDefinition>,
    extras_free: Vec<AppDefinition>,
    extras_non_free: Vec<AppDefinition>,
}

impl AppsCatalog {
    /// Build a catalog from already-parsed partitions.
    pub fn from_partitions(
        core: Vec<AppDefinition>,
        extras_free: Vec<AppDefinition>,
        extras_non_free: Vec<AppDefinition>,
    ) -> Self {
        Self {
            core,
            extras_free,
            extras_non_free,
        }
    }

    /// Look an app up across all partitions: core, then free, then non-free.
    ///
    /// The first match wins, so an id declared in two partitions resolves
    /// to the earlier one.
    pub fn get(&self, app_id: &str) -> Result<&AppDefinition> {
        self.core
            .iter()
            .chain(&self.extras_free)
            .chain(&self.extras_non_free)
            .find(|app| app.id == app_id)
            .ok_or_else(|| ClearphoneError::app_not_found(app_id, "catalog"))
    }

    /// Core apps ordered by installation priority, lowest first.
    pub fn core_sorted(&self) -> Vec<AppDefinition> {
        let mut apps = self.core.clone();
        // sort_by_key is stable: equal priorities keep file order
        apps.sort_by_key(|app| app.installation_priority);
        apps
    }

    /// Resolve extras ids against their own partitions.
    ///
    /// Free ids must be declared in the free partition and non-free ids in
    /// the non-free partition, even if the id exists elsewhere. Stops at the
    /// first unknown id.
    pub fn resolve(
        &self,
        free_ids: &[String],
        non_free_ids: &[String],
    ) -> Result<Vec<AppDefinition>> {
        let mut apps = Vec::with_capacity(free_ids.len() + non_free_ids.len());

        for app_id in free_ids {
            let app = self
                .free(app_id)
                .ok_or_else(|| ClearphoneError::app_not_found(app_id, "extras_free"))?;
            apps.push(app.clone());
        }

        for app_id in non_free_ids {
            let app = self
                .non_free(app_id)
                .ok_or_else(|| ClearphoneError::app_not_found(app_id, "extras_non_free"))?;
            apps.push(app.clone());
        }

        Ok(apps)
    }

    pub fn free(&self, app_id: &str) -> Option<&AppDefinition> {
        self.extras_free.iter().find(|app| app.id == app_id)
    }

    pub fn non_free(&self, app_id: &str) -> Option<&AppDefinition> {
        self.extras_non_free.iter().find(|app| app.id == app_id)
    }

    pub fn core(&self) -> &[AppDefinition] {
        &self.core
    }

    pub fn all_free(&self) -> &[AppDefinition] {
        &self.extras_free
    }

    pub fn all_non_free(&self) -> &[AppDefinition] {
        &self.extras_non_free
    }
}

/// Parse a single catalog file, keeping entry order.
///
/// Top-level values that are not tables are ignored.
fn parse_catalog_file(path: &Path) -> Result<Vec<AppDefinition>> {
    let content = fs::read_to_string(path)?;
    parse_catalog_str(&content, path)
}

fn parse_catalog_str(content: &str, path: &Path) -> Result<Vec<AppDefinition>> {
    let table: toml::Table = toml::from_str(content)
        .map_err(|e: toml::de::Error| ClearphoneError::catalog_parse(path, e.to_string()))?;

    let mut apps = Vec::with_capacity(table.len());
    for (app_id, value) in table {
        if !value.is_table() {
            continue;
        }
        let entry: CatalogEntry = value.try_into().map_err(|e: toml::de::Error| {
            ClearphoneError::catalog_parse(path, format!("[{}] {}", app_id, e))
        })?;
        apps.push(AppDefinition::from_entry(&app_id, entry));
    }

    debug!("Parsed {} apps from {}", apps.len(), path.display());
    Ok(apps)
}

/// Load the complete apps catalog from `<root>/apps`.
///
/// `core.toml` is required; the two extras files are optional.
pub fn load_apps_catalog(root: &Path) -> Result<AppsCatalog> {
    let apps_dir = root.join("apps");
    if !apps_dir.is_dir() {
        return Err(ClearphoneError::CatalogNotFound { path: apps_dir });
    }

    let core_path = apps_dir.join("core.toml");
    if !core_path.is_file() {
        return Err(ClearphoneError::CatalogNotFound { path: core_path });
    }

    let free_path = apps_dir.join("extras").join("free.toml");
    let non_free_path = apps_dir.join("extras").join("non-free.toml");

    let core = parse_catalog_file(&core_path)?;
    let extras_free = if free_path.is_file() {
        parse_catalog_file(&free_path)?
    } else {
        Vec::new()
    };
    let extras_non_free = if non_free_path.is_file() {
        parse_catalog_file(&non_free_path)?
    } else {
        Vec::new()
    };

    Ok(AppsCatalog::from_partitions(core, extras_free, extras_non_free))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORE: &str = r#"
[launcher]
package_id = "app.olauncher"
name = "Olauncher"
source = "fdroid"
fdroid_package_name = "app.olauncher"
installation_priority = 1

[gallery]
package_id = "org.fossify.gallery"
name = "Fossify Gallery"
fdroid_package_name = "org.fossify.gallery"

[dialer]
package_id = "org.fossify.phone"
name = "Fossify Phone"
fdroid_package_name = "org.fossify.phone"

[keyboard]
package_id = "org.futo.inputmethod.latin"
name = "FUTO Keyboard"
source = "direct"
download_url = "https://example.invalid/futo.apk"
installation_priority = 5
"#;

    fn app(id: &str) -> AppDefinition {
        AppDefinition {
            id: id.to_string(),
            package_id: format!("org.example.{}", id),
            name: id.to_string(),
            source: AppSource::Fdroid,
            fdroid_package_name: Some(format!("org.example.{}", id)),
            download_url: None,
            description: None,
            installation_priority: DEFAULT_INSTALLATION_PRIORITY,
            notes: None,
        }
    }

    #[test]
    fn test_parse_defaults_and_order() {
        let apps = parse_catalog_str(CORE, Path::new("core.toml")).unwrap();
        let ids: Vec<&str> = apps.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["launcher", "gallery", "dialer", "keyboard"]);

        let gallery = &apps[1];
        assert_eq!(gallery.source, AppSource::Fdroid);
        assert_eq!(gallery.installation_priority, DEFAULT_INSTALLATION_PRIORITY);
        assert_eq!(apps[3].source, AppSource::Direct);
        assert_eq!(apps[3].locator(), Some("https://example.invalid/futo.apk"));
    }

    #[test]
    fn test_core_sorted_is_stable() {
        let apps = parse_catalog_str(CORE, Path::new("core.toml")).unwrap();
        let catalog = AppsCatalog::from_partitions(apps, vec![], vec![]);
        let ids: Vec<String> = catalog.core_sorted().into_iter().map(|a| a.id).collect();
        // gallery and dialer share the default priority and keep file order
        assert_eq!(ids, vec!["launcher", "keyboard", "gallery", "dialer"]);
    }

    #[test]
    fn test_get_searches_core_first() {
        let mut shadowed = app("weather");
        shadowed.name = "Core Weather".into();
        let catalog = AppsCatalog::from_partitions(vec![shadowed], vec![app("weather")], vec![]);
        assert_eq!(catalog.get("weather").unwrap().name, "Core Weather");
        assert!(matches!(
            catalog.get("ghost"),
            Err(ClearphoneError::AppNotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_is_partition_strict() {
        let catalog =
            AppsCatalog::from_partitions(vec![], vec![app("weather")], vec![app("signal")]);

        let resolved = catalog
            .resolve(&["weather".to_string()], &["signal".to_string()])
            .unwrap();
        assert_eq!(resolved.len(), 2);

        // signal exists, but only in the non-free partition
        let err = catalog.resolve(&["signal".to_string()], &[]).unwrap_err();
        match err {
            ClearphoneError::AppNotFound { app_id, partition } => {
                assert_eq!(app_id, "signal");
                assert_eq!(partition, "extras_free");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_table_entries_ignored() {
        let content = "version = 2\n\n[launcher]\nname = \"Olauncher\"\n";
        let apps = parse_catalog_str(content, Path::new("core.toml")).unwrap();
        assert_eq!(apps.len(), 1);
    }

    #[test]
    fn test_invalid_toml_is_catalog_parse_error() {
        let err = parse_catalog_str("[launcher\nname=", Path::new("core.toml")).unwrap_err();
        assert!(matches!(err, ClearphoneError::CatalogParse { .. }));
    }

    #[test]
    fn test_bad_source_is_catalog_parse_error() {
        let content = "[launcher]\nsource = \"playstore\"\n";
        let err = parse_catalog_str(content, Path::new("core.toml")).unwrap_err();
        assert!(err.to_string().contains("launcher"));
    }
}
