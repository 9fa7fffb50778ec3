//! Builder for manifest items

use std::path::Path;

use bootkit_core::types::{ItemKind, ManifestItem};
use bootkit_engine::verifier;
use camino::Utf8PathBuf;

/// Builds a [`ManifestItem`] whose hash matches `payload`
#[derive(Debug, Clone)]
pub struct ItemBuilder {
    item: ManifestItem,
}

impl ItemBuilder {
    pub fn new(kind: ItemKind, file: impl Into<Utf8PathBuf>, url: &str, payload: &[u8]) -> Self {
        Self {
            item: ManifestItem::new(file, url, verifier::bytes_digest(payload), kind),
        }
    }

    pub fn package(dir: impl AsRef<Path>, file_name: &str, base_url: &str, payload: &[u8]) -> Self {
        let file = Utf8PathBuf::from_path_buf(dir.as_ref().join(file_name)).unwrap();
        Self::new(
            ItemKind::Package,
            file,
            &format!("{}/packages/{}", base_url, file_name),
            payload,
        )
        .package_id(&format!("com.example.{}", file_name.trim_end_matches(".pkg")))
    }

    pub fn name(mut self, name: &str) -> Self {
        self.item.name = Some(name.to_string());
        self
    }

    pub fn hash(mut self, hash: &str) -> Self {
        self.item.hash = hash.to_string();
        self
    }

    pub fn package_id(mut self, id: &str) -> Self {
        self.item.package_id = Some(id.to_string());
        self
    }

    pub fn retries(mut self, retries: u32, wait_secs: u32) -> Self {
        self.item.retries = Some(retries);
        self.item.retry_wait = Some(wait_secs);
        self
    }

    pub fn skip_if(mut self, tag: &str) -> Self {
        self.item.skip_if = Some(tag.to_string());
        self
    }

    pub fn run_async(mut self) -> Self {
        self.item.run_async = true;
        self
    }

    pub fn build(self) -> ManifestItem {
        self.item
    }
}
