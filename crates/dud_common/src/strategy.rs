//! How committed files are materialized in the workspace.

use std::fmt;

/// Strategy for placing cached files back into the workspace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CheckoutStrategy {
    /// Create read-only symlinks pointing into the cache.
    #[default]
    Link,
    /// Create independent copies of the cached files.
    Copy,
}

impl CheckoutStrategy {
    /// Picks [`CheckoutStrategy::Copy`] when `copy` is set, otherwise links.
    pub fn from_copy_flag(copy: bool) -> Self {
        if copy {
            CheckoutStrategy::Copy
        } else {
            CheckoutStrategy::Link
        }
    }
}

impl fmt::Display for CheckoutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckoutStrategy::Link => write!(f, "link"),
            CheckoutStrategy::Copy => write!(f, "copy"),
        }
    }
}
