//! # Root Key Package Refresh
//!
//! Periodically fetches the root key package and replaces the locally stored
//! copy when it changed. The package is compared byte-for-byte with the
//! stored one; an unchanged package completes without touching the store,
//! and a package older than the stored one is rejected.
//!
//! Signature validation of the package belongs to the key store
//! implementation and is not performed here.

use super::request_tracker::RequestTracker;
use crate::orchestration::{FailureClassifier, StandardFailureClassifier, TransportError};
use crate::resilience::{AttemptOutcome, FailureClass, OperationStatus, RetriableOperation};
use crate::utils::fs_atomic::write_atomic;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Version fields of a root key package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootKeyPackageVersion {
    pub version: u64,
    /// Unix seconds
    pub published: i64,
}

#[derive(Debug, Deserialize)]
struct RootKeyPackageDocument {
    protected: RootKeyPackageVersion,
}

impl RootKeyPackageVersion {
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        serde_json::from_str::<RootKeyPackageDocument>(raw)
            .map(|doc| doc.protected)
            .map_err(|e| TransportError::malformed_response(format!("root key package: {e}")))
    }
}

#[derive(Debug, Error)]
pub enum RootKeyStoreError {
    #[error("Failed to read root key store '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write root key store '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where the package comes from
pub trait RootKeyPackageSource: Send + Debug {
    /// Fetch the raw package document; `correlation_id` tags the download
    fn fetch_package(&mut self, correlation_id: &str) -> Result<String, TransportError>;
}

/// Local copy of the package
pub trait RootKeyStore: Send + Debug {
    fn load(&self) -> Result<Option<String>, RootKeyStoreError>;
    fn store(&mut self, raw: &str) -> Result<(), RootKeyStoreError>;
}

/// Root key store backed by a single file
#[derive(Debug, Clone)]
pub struct FileRootKeyStore {
    path: PathBuf,
}

impl FileRootKeyStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl RootKeyStore for FileRootKeyStore {
    fn load(&self) -> Result<Option<String>, RootKeyStoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RootKeyStoreError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn store(&mut self, raw: &str) -> Result<(), RootKeyStoreError> {
        write_atomic(&self.path, raw.as_bytes()).map_err(|source| RootKeyStoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Result of the last successful refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKeyRefreshOutcome {
    Unchanged,
    Updated { version: u64 },
}

pub struct RootKeyRefreshOperation {
    source: Box<dyn RootKeyPackageSource>,
    store: Box<dyn RootKeyStore>,
    classifier: Arc<dyn FailureClassifier>,
    outcome: Option<RootKeyRefreshOutcome>,
}

impl fmt::Debug for RootKeyRefreshOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootKeyRefreshOperation")
            .field("source", &self.source)
            .field("store", &self.store)
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl RootKeyRefreshOperation {
    pub fn new(source: Box<dyn RootKeyPackageSource>, store: Box<dyn RootKeyStore>) -> Self {
        Self {
            source,
            store,
            classifier: Arc::new(StandardFailureClassifier::new()),
            outcome: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn outcome(&self) -> Option<RootKeyRefreshOutcome> {
        self.outcome
    }

    fn fail(&self, error: &TransportError) -> AttemptOutcome {
        let class = self.classifier.classify(error);
        warn!(error = %error, failure_class = %class, "🔑 ROOTKEY: Refresh failed");
        AttemptOutcome::Failed(class)
    }

    fn refresh(&mut self) -> Result<RootKeyRefreshOutcome, AttemptOutcome> {
        let correlation_id = RequestTracker::new_correlation_id();
        let raw = self
            .source
            .fetch_package(&correlation_id)
            .map_err(|e| self.fail(&e))?;
        let fetched = RootKeyPackageVersion::parse(&raw).map_err(|e| self.fail(&e))?;

        let stored = self.store.load().map_err(|e| {
            warn!(error = %e, "🔑 ROOTKEY: Cannot read local store");
            AttemptOutcome::Failed(FailureClass::ClientTransient)
        })?;

        if let Some(stored) = stored {
            if stored == raw {
                debug!(version = fetched.version, "🔑 ROOTKEY: No root key change");
                return Ok(RootKeyRefreshOutcome::Unchanged);
            }
            if let Ok(current) = RootKeyPackageVersion::parse(&stored) {
                if fetched.version < current.version {
                    return Err(self.fail(&TransportError::rejected(format!(
                        "root key package version {} is older than stored {}",
                        fetched.version, current.version
                    ))));
                }
            }
        }

        self.store.store(&raw).map_err(|e| {
            warn!(error = %e, "🔑 ROOTKEY: Cannot write local store");
            AttemptOutcome::Failed(FailureClass::ClientTransient)
        })?;
        info!(
            version = fetched.version,
            published = fetched.published,
            correlation_id = %correlation_id,
            "🔑 ROOTKEY: Root key package updated"
        );
        Ok(RootKeyRefreshOutcome::Updated {
            version: fetched.version,
        })
    }
}

impl RetriableOperation for RootKeyRefreshOperation {
    fn name(&self) -> &str {
        "root_key_refresh"
    }

    fn do_work(&mut self, _status: &OperationStatus) -> AttemptOutcome {
        match self.refresh() {
            Ok(outcome) => {
                self.outcome = Some(outcome);
                AttemptOutcome::Completed
            }
            Err(failed) => failed,
        }
    }
}
