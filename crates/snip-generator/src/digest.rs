use crate::Generator;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use snip_core::{CoreError, ShortToken};

/// Length of an MD5 digest encoded as unpadded URL-safe base64.
pub const MAX_TOKEN_LENGTH: usize = 22;

/// Default token length.
pub const DEFAULT_TOKEN_LENGTH: usize = 8;

/// Content-addressed token generator.
///
/// The token is the first `length` characters of the unpadded URL-safe
/// base64 encoding of the MD5 digest of the raw, untrimmed URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestGenerator {
    length: usize,
}

impl DigestGenerator {
    /// Creates a generator producing tokens of `length` characters.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTokenLength` if `length` is zero or longer
    /// than the encoded digest.
    pub fn new(length: usize) -> Result<Self, CoreError> {
        if length == 0 || length > MAX_TOKEN_LENGTH {
            return Err(CoreError::InvalidTokenLength {
                requested: length,
                max: MAX_TOKEN_LENGTH,
            });
        }
        Ok(Self { length })
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for DigestGenerator {
    fn default() -> Self {
        Self {
            length: DEFAULT_TOKEN_LENGTH,
        }
    }
}

impl Generator for DigestGenerator {
    fn generate(&self, original_url: &str) -> ShortToken {
        let digest = md5::compute(original_url.as_bytes());
        let mut encoded = URL_SAFE_NO_PAD.encode(digest.0);
        encoded.truncate(self.length);
        ShortToken::new_unchecked(encoded)
    }
}
