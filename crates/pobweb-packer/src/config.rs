//! Packaging configuration.
//!
//! Every field has a default matching the upstream Path of Building layout,
//! so an empty YAML document (or no file at all) is a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PackError, PackResult};
use crate::manifest::ManifestStamp;
use crate::product::{self, Product};
use crate::scan::ScanOrder;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackConfig {
    /// Primary source tree, relative to the repository root.
    pub source_dir: String,
    /// Raw relative-path prefixes never catalogued or packaged.
    pub excluded_prefixes: Vec<String>,
    pub runtime_scripts: RuntimeScripts,
    pub manifest: ManifestStamp,
    pub rewrites: Vec<RewriteRule>,
    pub scan_order: ScanOrder,
    pub products: Vec<Product>,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            source_dir: "src".to_string(),
            excluded_prefixes: vec!["Export".to_string()],
            runtime_scripts: RuntimeScripts::default(),
            manifest: ManifestStamp::default(),
            rewrites: vec![RewriteRule {
                find: "Specific_Skill_Stat_Descriptions".to_string(),
                replace: "specific_skill_stat_descriptions".to_string(),
                content_suffix: Some("StatDescriber.lua".to_string()),
            }],
            scan_order: ScanOrder::Native,
            products: product::builtin(),
        }
    }
}

/// Secondary script tree packaged under a fixed prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeScripts {
    pub dir: String,
    pub prefix: String,
}

impl Default for RuntimeScripts {
    fn default() -> Self {
        Self {
            dir: "runtime/lua".to_string(),
            prefix: "lua".to_string(),
        }
    }
}

/// Literal substitution applied to entry names, and to the content of files
/// whose name ends with `content_suffix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub find: String,
    pub replace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_suffix: Option<String>,
}

impl RewriteRule {
    pub fn rewrite_name(&self, name: &str) -> String {
        name.replace(&self.find, &self.replace)
    }

    /// Whether file content of `name` (pre-rewrite) is subject to this rule.
    pub fn applies_to_content(&self, name: &str) -> bool {
        self.content_suffix
            .as_deref()
            .is_some_and(|suffix| name.ends_with(suffix))
    }
}

impl PackConfig {
    /// Load from a YAML file.
    pub fn from_file(path: &Path) -> PackResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| PackError::Config {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> PackResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| PackError::Config {
            message: format!("invalid pack config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// `--config` if given, otherwise defaults.
    pub fn load(path: Option<&Path>) -> PackResult<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> PackResult<()> {
        let invalid = |message: String| Err(PackError::Config { message });
        if self.products.is_empty() {
            return invalid("at least one product is required".into());
        }
        match self.products.iter().filter(|p| p.primary).count() {
            1 => {}
            0 => return invalid("no product is marked primary".into()),
            _ => return invalid("more than one product is marked primary".into()),
        }
        for (i, p) in self.products.iter().enumerate() {
            if self.products[..i].iter().any(|q| q.id == p.id) {
                return invalid(format!("duplicate product id '{}'", p.id));
            }
        }
        if self.excluded_prefixes.iter().any(String::is_empty) {
            return invalid("empty excluded prefix would exclude everything".into());
        }
        if self.rewrites.iter().any(|r| r.find.is_empty()) {
            return invalid("rewrite rule with empty 'find'".into());
        }
        if self.runtime_scripts.prefix.trim_matches('/').is_empty() {
            return invalid("runtime_scripts.prefix must not be empty".into());
        }
        Ok(())
    }

    pub fn product(&self, selector: &str) -> PackResult<&Product> {
        product::find(&self.products, selector)
    }

    /// The product used when `pack` is given no selector. It is also the one
    /// published under the bare `versions/` prefix.
    pub fn primary_product(&self) -> PackResult<&Product> {
        self.products
            .iter()
            .find(|p| p.primary)
            .ok_or_else(|| PackError::Config {
                message: "no product is marked primary".into(),
            })
    }
}
