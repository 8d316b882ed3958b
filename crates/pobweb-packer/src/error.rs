//! Error types for the packaging pipeline.

use std::path::PathBuf;

/// Result type for pipeline operations.
pub type PackResult<T> = Result<T, PackError>;

/// Coarse failure class, used for exit codes and operator messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad tag, unknown product, unreadable config. Nothing was attempted.
    Configuration,
    /// The source tree is missing or unreadable. No archive was written.
    SourceTree,
    /// Clone or object-store failure. Safe to retry from scratch.
    Transport,
    /// Anything else (archive serialization, local output I/O).
    Internal,
}

/// Errors raised by the scanner, catalog builder, packager and publisher.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// Tag failed validation.
    #[error("invalid tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: String },

    /// Product selector does not name a known product.
    #[error("unknown product '{selector}' (known: {known})")]
    UnknownProduct { selector: String, known: String },

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Base directory of a scan does not exist.
    #[error("source directory not found: {}", path.display())]
    MissingSource { path: PathBuf },

    /// A file or directory inside the source tree could not be read.
    #[error("source tree error at {}: {source}", path.display())]
    SourceTree {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source file name cannot be represented in the bundle or catalog.
    #[error("unsupported file name {}: {reason}", path.display())]
    UnsupportedPath { path: PathBuf, reason: String },

    /// Image header could not be parsed.
    #[error("cannot probe image dimensions of {}: {reason}", path.display())]
    ImageProbe { path: PathBuf, reason: String },

    /// Two bundle entries resolved to the same name.
    #[error("duplicate bundle entry: {name}")]
    DuplicateEntry { name: String },

    /// A bundle entry would land under an excluded prefix.
    #[error("bundle entry '{name}' is under excluded prefix '{prefix}'")]
    ExcludedEntry { name: String, prefix: String },

    /// Archive serialization failed.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Writing pipeline outputs failed.
    #[error("output error at {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `git clone` failed.
    #[error("clone of {remote} at {tag} failed: {message}")]
    Clone {
        remote: String,
        tag: String,
        message: String,
    },

    /// Publish target URL is malformed or unsupported.
    #[error("invalid store spec '{spec}': {reason}")]
    InvalidStore { spec: String, reason: String },

    /// Object-store transfer failed.
    #[error("publish failed for {location}: {message}")]
    Transport { location: String, message: String },
}

impl PackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTag { .. }
            | Self::UnknownProduct { .. }
            | Self::Config { .. }
            | Self::InvalidStore { .. } => ErrorKind::Configuration,
            Self::MissingSource { .. }
            | Self::SourceTree { .. }
            | Self::UnsupportedPath { .. }
            | Self::ImageProbe { .. }
            | Self::DuplicateEntry { .. }
            | Self::ExcludedEntry { .. } => ErrorKind::SourceTree,
            Self::Clone { .. } | Self::Transport { .. } => ErrorKind::Transport,
            Self::Archive(_) | Self::Output { .. } => ErrorKind::Internal,
        }
    }

    /// Suggested exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Internal => 1,
            ErrorKind::Configuration => 2,
            ErrorKind::SourceTree => 3,
            ErrorKind::Transport => 4,
        }
    }

    pub(crate) fn source_tree(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SourceTree {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Output {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn transport(location: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            location: location.into(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_kind() {
        let cfg = PackError::InvalidTag {
            tag: String::new(),
            reason: "empty".into(),
        };
        assert_eq!(cfg.kind(), ErrorKind::Configuration);
        assert_eq!(cfg.exit_code(), 2);

        let src = PackError::MissingSource {
            path: PathBuf::from("/nope"),
        };
        assert_eq!(src.exit_code(), 3);

        let net = PackError::transport("versions/v1/root.zip", "connection reset");
        assert_eq!(net.kind(), ErrorKind::Transport);
        assert_eq!(net.exit_code(), 4);
        assert!(net.to_string().contains("connection reset"));
    }
}
