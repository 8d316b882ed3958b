//! Version manifest stamping.
//!
//! `manifest.xml` carries a single `<Version number="X.Y.Z" />` declaration.
//! The packager adds `platform` and `branch` attributes so the engine's
//! updater treats the bundle as an installed desktop build. Every other byte
//! of the document is left alone.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static VERSION_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<Version number="([0-9.]+)" />"#).expect("version declaration pattern")
});

/// Attribute values stamped onto the version declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestStamp {
    pub platform: String,
    pub branch: String,
}

impl Default for ManifestStamp {
    fn default() -> Self {
        Self {
            platform: "win32".to_string(),
            branch: "master".to_string(),
        }
    }
}

impl ManifestStamp {
    /// Rewrite the first version declaration.
    ///
    /// Input without a declaration is returned unchanged.
    pub fn apply<'a>(&self, manifest: &'a str) -> Cow<'a, str> {
        let Some(caps) = VERSION_DECL.captures(manifest) else {
            tracing::warn!(
                event = "manifest_unstamped",
                "no <Version number=\"...\" /> declaration found; manifest left unchanged"
            );
            return Cow::Borrowed(manifest);
        };
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            return Cow::Borrowed(manifest);
        };
        let replacement = format!(
            r#"<Version number="{}" platform="{}" branch="{}" />"#,
            number.as_str(),
            self.platform,
            self.branch
        );
        let mut out = String::with_capacity(manifest.len() + replacement.len());
        out.push_str(&manifest[..whole.start()]);
        out.push_str(&replacement);
        out.push_str(&manifest[whole.end()..]);
        Cow::Owned(out)
    }
}
