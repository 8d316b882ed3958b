//! Product table.
//!
//! A product is one planner flavour built from its own upstream repository.
//! The primary product publishes under the bare `versions/` prefix; every
//! other product is qualified by its id.

use serde::{Deserialize, Serialize};

use crate::error::{PackError, PackResult};

/// Upstream GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn remote_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Selector used on the command line (`poe1`, `poe2`, `le`).
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub repository: Repository,
    /// Key namespace used by the client for this product's user files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kv_namespace: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

impl Product {
    /// Object-store prefix for a release of this product.
    pub fn destination_prefix(&self, tag: &str) -> String {
        if self.primary {
            format!("versions/{tag}")
        } else {
            format!("versions.{}/{tag}", self.id)
        }
    }
}

/// Products known without any configuration file.
pub fn builtin() -> Vec<Product> {
    let product = |id: &str, name: &str, owner: &str, repo: &str, ns: Option<&str>| Product {
        id: id.to_string(),
        name: name.to_string(),
        repository: Repository {
            owner: owner.to_string(),
            name: repo.to_string(),
        },
        kv_namespace: ns.map(str::to_string),
        primary: ns.is_none(),
    };
    vec![
        product(
            "poe1",
            "Path of Building",
            "PathOfBuildingCommunity",
            "PathOfBuilding",
            None,
        ),
        product(
            "poe2",
            "Path of Building (PoE2)",
            "PathOfBuildingCommunity",
            "PathOfBuilding-PoE2",
            Some("poe2"),
        ),
        product(
            "le",
            "Last Epoch Planner",
            "Musholic",
            "LastEpochPlanner",
            Some("le"),
        ),
    ]
}

/// Resolve a selector against a product list. Ids win over kv namespaces.
pub fn find<'a>(products: &'a [Product], selector: &str) -> PackResult<&'a Product> {
    products
        .iter()
        .find(|p| p.id == selector)
        .or_else(|| {
            products
                .iter()
                .find(|p| p.kv_namespace.as_deref() == Some(selector))
        })
        .ok_or_else(|| PackError::UnknownProduct {
            selector: selector.to_string(),
            known: products
                .iter()
                .map(|p| p.id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Validate a release tag before it is used in clone arguments and paths.
pub fn validate_tag(tag: &str) -> PackResult<()> {
    let reason = if tag.is_empty() {
        Some("tag is empty".to_string())
    } else if tag.len() > 128 {
        Some("tag is longer than 128 characters".to_string())
    } else if tag.starts_with('-') || tag.starts_with('.') {
        Some("tag must not start with '-' or '.'".to_string())
    } else {
        tag.chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
            .map(|c| format!("unexpected character {c:?}"))
    };
    match reason {
        Some(reason) => Err(PackError::InvalidTag {
            tag: tag.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_prefix() {
        let products = builtin();
        let poe1 = find(&products, "poe1").unwrap();
        let le = find(&products, "le").unwrap();
        assert_eq!(poe1.destination_prefix("v2.42.0"), "versions/v2.42.0");
        assert_eq!(le.destination_prefix("v0.1"), "versions.le/v0.1");
    }

    #[test]
    fn test_builtin_table() {
        let products = builtin();
        assert_eq!(products.iter().filter(|p| p.primary).count(), 1);
        let poe2 = find(&products, "poe2").unwrap();
        assert_eq!(poe2.kv_namespace.as_deref(), Some("poe2"));
        assert_eq!(
            poe2.repository.remote_url(),
            "https://github.com/PathOfBuildingCommunity/PathOfBuilding-PoE2.git"
        );
    }

    #[test]
    fn test_find_by_kv_namespace() {
        let mut products = builtin();
        products[2].kv_namespace = Some("epoch".to_string());
        assert_eq!(find(&products, "epoch").unwrap().id, "le");
        assert_eq!(find(&products, "le").unwrap().id, "le");

        // an id shadows another product's namespace
        products[1].kv_namespace = Some("le".to_string());
        assert_eq!(find(&products, "le").unwrap().id, "le");
    }

    #[test]
    fn test_unknown_product() {
        let err = find(&builtin(), "d4").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("poe1, poe2, le"));
    }

    #[test]
    fn test_validate_tag() {
        for ok in ["v2.42.0", "0.9.3", "release_1-rc.2"] {
            assert!(validate_tag(ok).is_ok(), "{ok}");
        }
        for bad in ["", "-v1", ".hidden", "v1/../x", "v 1", "v1;rm"] {
            assert!(
                matches!(validate_tag(bad), Err(PackError::InvalidTag { .. })),
                "{bad}"
            );
        }
        assert!(validate_tag(&"a".repeat(129)).is_err());
    }
}
