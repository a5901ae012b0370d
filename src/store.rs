use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tempfile::{Builder, NamedTempFile, TempDir};

use crate::domain::Category;
use crate::error::KiraError;

pub const DEFAULT_OUTPUT_DIR: &str = "kira-cm-data";

#[derive(Debug, Clone)]
pub struct Store {
    output_root: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new(output_root: Utf8PathBuf) -> Result<Self, KiraError> {
        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir().join(".cache").join("kira-chemdata-manager"),
                )
                .ok()
            })
            .ok_or_else(|| {
                KiraError::Filesystem("unable to resolve cache directory".to_string())
            })?;

        Ok(Self {
            output_root,
            cache_root,
        })
    }

    pub fn new_with_paths(output_root: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            output_root,
            cache_root,
        }
    }

    pub fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn download_path(
        &self,
        category: Category,
        source: &str,
        version: &str,
        file_name: &str,
    ) -> Utf8PathBuf {
        self.cache_root
            .join("downloads")
            .join(category.as_str())
            .join(source)
            .join(path_safe(version))
            .join(path_safe(file_name))
    }

    /// `<output>/<category>/<source>/<timestamp>_<source>_<version>.csv`
    pub fn dataset_path(
        &self,
        category: Category,
        source: &str,
        version: &str,
        timestamp: &str,
    ) -> Utf8PathBuf {
        let version = path_safe(version).replace('-', "_");
        self.output_root
            .join(category.as_str())
            .join(source)
            .join(format!("{timestamp}_{source}_{version}.csv"))
    }

    pub fn metadata_path(&self, category: Category, source: &str, version: &str) -> Utf8PathBuf {
        self.output_root
            .join("metadata")
            .join(category.as_str())
            .join(source)
            .join(format!("{}.json", path_safe(version)))
    }

    pub fn ensure_output_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.output_root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    /// Scratch directory for archive extraction, removed on drop.
    pub fn work_dir(&self) -> Result<TempDir, KiraError> {
        let work_root = self.output_root.join(".kira-cm-work");
        fs::create_dir_all(work_root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Builder::new()
            .prefix("kira-cm-extract")
            .tempdir_in(work_root.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    /// Temporary file next to `dest`, to be persisted once fully written.
    pub fn staging_file(dest: &Utf8Path) -> Result<NamedTempFile, KiraError> {
        let parent = dest
            .parent()
            .ok_or_else(|| KiraError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Builder::new()
            .prefix("kira-cm-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    pub fn persist(temp: NamedTempFile, dest: &Utf8Path) -> Result<(), KiraError> {
        if dest.as_std_path().exists() {
            fs::remove_file(dest.as_std_path())
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        temp.persist(dest.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn write_metadata(path: &Utf8Path, metadata: &Metadata) -> Result<(), KiraError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Provenance of one produced dataset file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub category: Category,
    pub source: String,
    pub version: String,
    pub citation: String,
    pub locations: Vec<String>,
    pub output_path: String,
    pub records_written: u64,
    pub steps_failed: usize,
    pub produced_at: String,
    pub tool: String,
}

/// Keeps path components to `[A-Za-z0-9._-]`.
fn path_safe(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::new_with_paths(Utf8PathBuf::from("/data/out"), Utf8PathBuf::from("/data/cache"))
    }

    #[test]
    fn layout_paths() {
        let store = store();
        let dataset = store.dataset_path(
            Category::Compound,
            "zinc",
            "v_building_blocks_in-stock",
            "20240101120000",
        );
        assert_eq!(
            dataset,
            Utf8PathBuf::from("/data/out/compound/zinc/20240101120000_zinc_v_building_blocks_in_stock.csv")
        );

        let download = store.download_path(Category::Reaction, "rhea", "v_release_126", "126.tar.bz2");
        assert!(download.ends_with("downloads/reaction/rhea/v_release_126/126.tar.bz2"));

        let metadata = store.metadata_path(Category::Reaction, "uspto", "v_50k_by_20171116_coley_c_w_et_al");
        assert!(metadata.ends_with("metadata/reaction/uspto/v_50k_by_20171116_coley_c_w_et_al.json"));
    }

    #[test]
    fn unsafe_components_are_replaced() {
        assert_eq!(path_safe("../etc"), ".._etc");
        assert_eq!(path_safe(".."), "_");
        assert_eq!(path_safe("a/b c"), "a_b_c");
    }

    #[test]
    fn metadata_round_trip_is_atomic() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("metadata/reaction/crd/v_reaction_smiles_2023.json");
        let metadata = Metadata {
            category: Category::Reaction,
            source: "crd".to_string(),
            version: "v_reaction_smiles_2023".to_string(),
            citation: "10.6084/m9.figshare.24921555.v1".to_string(),
            locations: vec!["https://figshare.com/ndownloader/files/43858050".to_string()],
            output_path: "out.csv".to_string(),
            records_written: 2,
            steps_failed: 0,
            produced_at: "2024-01-01T00:00:00Z".to_string(),
            tool: "kira-cm".to_string(),
        };
        Store::write_metadata(&path, &metadata).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        let loaded: Metadata = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.records_written, 2);
        assert_eq!(loaded.source, "crd");
    }
}
