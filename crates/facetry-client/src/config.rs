//! Client configuration.
//!
//! ```toml
//! catalog = "catalog.json"
//! commentary = true
//!
//! [backend]
//! kind = "http"
//! endpoint = "http://localhost:9200"
//!
//! [query]
//! slop = 10
//!
//! [query.documents]
//! index = "text"
//! page_size = 50
//! ```
//!
//! Every section is optional. Relative paths are resolved against the
//! directory of the configuration file when loaded with
//! [`ClientConfig::load`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use facetry_core::{Catalog, CommentaryRule, FilterTreeBuilder};
use facetry_query::{InMemoryBackend, QueryBuilder, QueryConfig, SearchBackend};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::executor::QueryExecutor;
use crate::http::HttpBackend;
use crate::session::SearchSession;

/// Which backend requests go to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// An Elasticsearch-compatible server.
    Http {
        /// Base URL, e.g. `http://localhost:9200`.
        #[serde(default = "default_endpoint")]
        endpoint: String,
    },
    /// A JSON corpus searched in memory.
    Memory {
        /// Path of the corpus file.
        corpus: PathBuf,
    },
}

fn default_endpoint() -> String {
    "http://localhost:9200".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Http {
            endpoint: default_endpoint(),
        }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Catalog file giving filter trees their shape and titles.
    #[serde(default)]
    pub catalog: Option<PathBuf>,

    /// Fold commentary sub-trees into one node per category.
    #[serde(default)]
    pub commentary: bool,

    /// Request settings.
    #[serde(default)]
    pub query: QueryConfig,
}

impl ClientConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| Error::config(format!("invalid client config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file, resolving relative paths against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| facetry_core::Error::io_with_path(e, path))?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        log::debug!("loaded client config from {}", path.display());
        Ok(config)
    }

    /// Rejects settings no session could be built from.
    pub fn validate(&self) -> Result<()> {
        if let BackendConfig::Http { endpoint } = &self.backend
            && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(Error::config(format!(
                "backend endpoint must be an http(s) URL, got '{endpoint}'"
            )));
        }
        self.query.validate()?;
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        if let BackendConfig::Memory { corpus } = &mut self.backend
            && corpus.is_relative()
        {
            *corpus = base.join(&*corpus);
        }
        if let Some(catalog) = &mut self.catalog
            && catalog.is_relative()
        {
            *catalog = base.join(&*catalog);
        }
    }

    /// Loads the catalog, or an empty one if none is configured.
    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.catalog {
            Some(path) => Ok(Catalog::load(path)?),
            None => Ok(Catalog::new(Vec::new())),
        }
    }

    /// Creates the configured backend.
    pub fn build_backend(&self) -> Result<Arc<dyn SearchBackend>> {
        let backend: Arc<dyn SearchBackend> = match &self.backend {
            BackendConfig::Http { endpoint } => {
                Arc::new(HttpBackend::new(endpoint.clone(), Arc::new(self.query.clone())))
            }
            BackendConfig::Memory { corpus } => Arc::new(InMemoryBackend::load(corpus)?),
        };
        log::info!("using {} search backend", backend.name());
        Ok(backend)
    }

    /// Creates a session over the configured backend and catalog.
    pub fn build_session(&self) -> Result<SearchSession> {
        let catalog = Arc::new(self.load_catalog()?);
        let mut builder = QueryBuilder::new(Arc::new(self.query.clone()));
        let mut tree_builder = FilterTreeBuilder::new(catalog);
        if self.commentary {
            builder = builder.with_commentary(CommentaryRule::default());
            tree_builder = tree_builder.with_commentary(CommentaryRule::default());
        }
        let executor = QueryExecutor::new(self.build_backend()?);
        Ok(SearchSession::new(executor, builder, tree_builder))
    }
}

// ============================================================================
// Tests
// ============================================================================
