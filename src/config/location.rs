//! Store location resolution.
//!
//! Derives where a model definition and its persistent store live from a
//! bundle identifier. Layout:
//!
//! ```text
//! <support-dir>/<bundle-id>/CoreData/<model>.sqlite
//! <group-container>/Library/Application Support/<bundle-id>/CoreData/<model>.sqlite
//! <resources-dir>/<model>.momd
//! ```

use std::path::{Path, PathBuf};

use crate::query::{QueryError, QueryResult};

const STORE_DIR: &str = "CoreData";
const STORE_EXTENSION: &str = "sqlite";
const MODEL_EXTENSION: &str = "momd";

/// Resolved model and store paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLocation {
    /// Model name without extension
    pub model_name: String,
    /// Bundle identifier the store directory is named after
    pub bundle_identifier: String,
    /// Full path of the persistent store file
    pub store_path: PathBuf,
}

impl StoreLocation {
    /// Resolves the store path under an application support directory.
    ///
    /// When `model_name` is `None` it is inferred from the last dotted
    /// component of `bundle_identifier` (`com.acme.Notes` gives `Notes`).
    pub fn resolve(
        support_dir: &Path,
        bundle_identifier: &str,
        model_name: Option<&str>,
    ) -> QueryResult<Self> {
        Self::resolve_under(support_dir, bundle_identifier, model_name)
    }

    /// Resolves the store path inside a shared application-group container
    pub fn resolve_in_group(
        group_container: &Path,
        bundle_identifier: &str,
        model_name: Option<&str>,
    ) -> QueryResult<Self> {
        let support_dir = group_container.join("Library").join("Application Support");
        Self::resolve_under(&support_dir, bundle_identifier, model_name)
    }

    fn resolve_under(
        support_dir: &Path,
        bundle_identifier: &str,
        model_name: Option<&str>,
    ) -> QueryResult<Self> {
        if !support_dir.is_absolute() {
            return Err(QueryError::InvalidLocation(format!(
                "store directory must be absolute: {}",
                support_dir.display()
            )));
        }
        validate_component("bundle identifier", bundle_identifier)?;

        let model_name = match model_name {
            Some(name) => name.to_string(),
            None => infer_model_name(bundle_identifier)?,
        };
        validate_component("model name", &model_name)?;

        let store_path = support_dir
            .join(bundle_identifier)
            .join(STORE_DIR)
            .join(format!("{}.{}", model_name, STORE_EXTENSION));

        Ok(Self {
            model_name,
            bundle_identifier: bundle_identifier.to_string(),
            store_path,
        })
    }

    /// Directory holding the store file
    pub fn store_dir(&self) -> Option<&Path> {
        self.store_path.parent()
    }

    /// Locates the compiled model inside `resources_dir`; it must exist
    pub fn model_path(&self, resources_dir: &Path) -> QueryResult<PathBuf> {
        let path = resources_dir.join(format!("{}.{}", self.model_name, MODEL_EXTENSION));
        if path.exists() {
            Ok(path)
        } else {
            Err(QueryError::InvalidLocation(format!(
                "model not found: {}",
                path.display()
            )))
        }
    }
}

fn infer_model_name(bundle_identifier: &str) -> QueryResult<String> {
    bundle_identifier
        .rsplit('.')
        .next()
        .filter(|last| !last.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            QueryError::InvalidLocation(format!(
                "cannot infer a model name from '{}'",
                bundle_identifier
            ))
        })
}

fn validate_component(what: &str, value: &str) -> QueryResult<()> {
    if value.is_empty() || value.contains('/') || value.contains('\\') || value == ".." {
        return Err(QueryError::InvalidLocation(format!(
            "invalid {}: '{}'",
            what, value
        )));
    }
    Ok(())
}
