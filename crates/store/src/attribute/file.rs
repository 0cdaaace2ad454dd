//! File-backed attribute store.
//!
//! One JSON document per customer:
//!
//! ```text
//! storage/
//! └── customers/
//!     ├── 1.json     # { "_wc_gateway_payment_tokens": {...}, ... }
//!     └── 2.json
//! ```
//!
//! Documents are replaced by writing a sibling temp file and renaming it over
//! the original, so readers never observe a partially written document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use paytokens_common::CustomerId;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, info, trace};

use crate::attribute::AttributeStore;
use crate::errors::AttributeStoreError;

/// Attribute store persisting one JSON document per customer.
#[derive(Debug)]
pub struct FileAttributeStore {
    /// Directory holding the customer documents
    customers_path: PathBuf,
    /// Serialises document rewrites within this process
    write_lock: Mutex<()>,
}

impl FileAttributeStore {
    /// Open (creating if needed) a file store rooted at `base_path`.
    ///
    /// Sets restrictive permissions (0700 on Unix) on the customer directory.
    pub fn open(base_path: &Path) -> Result<Self, AttributeStoreError> {
        let customers_path = base_path.join("customers");
        fs::create_dir_all(&customers_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&customers_path, fs::Permissions::from_mode(0o700))?;
        }

        info!(
            storage_path = %base_path.display(),
            "Initialized file attribute store"
        );

        Ok(Self {
            customers_path,
            write_lock: Mutex::new(()),
        })
    }

    fn document_path(&self, customer: &CustomerId) -> PathBuf {
        self.customers_path
            .join(format!("{}.json", file_stem(customer.as_str())))
    }

    fn load_document(&self, path: &Path) -> Result<Map<String, Value>, AttributeStoreError> {
        if !path.exists() {
            return Ok(Map::new());
        }

        let content = fs::read_to_string(path)?;
        match serde_json::from_str(&content) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) => Err(AttributeStoreError::Corrupt(format!(
                "{} is not a JSON object",
                path.display()
            ))),
            Err(e) => Err(AttributeStoreError::Corrupt(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn save_document(
        &self,
        path: &Path,
        document: &Map<String, Value>,
    ) -> Result<(), AttributeStoreError> {
        let content = serde_json::to_vec_pretty(document)
            .map_err(|e| AttributeStoreError::Corrupt(e.to_string()))?;

        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&content)?;
            file.sync_all()?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl AttributeStore for FileAttributeStore {
    fn read(&self, customer: &CustomerId, key: &str) -> Result<Option<Value>, AttributeStoreError> {
        let path = self.document_path(customer);
        let mut document = self.load_document(&path)?;

        trace!(customer = %customer, key = key, "Read attribute");
        Ok(document.remove(key))
    }

    fn write(
        &self,
        customer: &CustomerId,
        key: &str,
        value: Value,
    ) -> Result<(), AttributeStoreError> {
        let _guard = self.write_lock.lock();

        let path = self.document_path(customer);
        let mut document = self.load_document(&path)?;
        document.insert(key.to_string(), value);
        self.save_document(&path, &document)?;

        debug!(
            customer = %customer,
            key = key,
            path = %path.display(),
            "Wrote attribute"
        );
        Ok(())
    }
}

/// Map a customer id onto a safe file name; anything outside
/// `[A-Za-z0-9-]` is hex-escaped as `_XX`.
fn file_stem(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("_{:02x}", byte));
        }
    }
    stem
}
