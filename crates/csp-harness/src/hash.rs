//! Hash-source expressions for whitelisting inline scripts.
//!
//! Computing `'sha256-...'` for a script body is policy authoring only;
//! whether the engine honors it is exactly what a scenario checks.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::fmt;

/// A CSP hash source for one inline script or style body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptHash {
    digest: String,
}

impl ScriptHash {
    /// Hashes the exact text between `<script>` and `</script>`.
    ///
    /// Whitespace is significant: the engine hashes the element's text
    /// content byte for byte.
    #[must_use]
    pub fn sha256(body: &str) -> Self {
        let digest = Sha256::digest(body.as_bytes());
        Self {
            digest: STANDARD.encode(digest),
        }
    }

    /// The base64 digest without the algorithm prefix.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// The quoted source expression, e.g. `'sha256-gbXo...='`.
    #[must_use]
    pub fn source_expression(&self) -> String {
        format!("'sha256-{}'", self.digest)
    }
}

impl fmt::Display for ScriptHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'sha256-{}'", self.digest)
    }
}
