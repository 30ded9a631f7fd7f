pub mod digest;

pub use digest::DigestGenerator;

use snip_core::ShortToken;

/// Trait for deriving short tokens from long URLs.
///
/// Implementations are pure functions of their input and don't interact
/// with storage: the same URL always yields the same token, which is what
/// lets storage report repeated submissions as duplicates.
pub trait Generator: Send + Sync + 'static {
    /// Derives the token for `original_url`.
    fn generate(&self, original_url: &str) -> ShortToken;
}

#[cfg(test)]
mod tests {
    use super::Generator;
    use crate::DigestGenerator;

    #[test]
    fn digest_generator_implements_generator_trait() {
        fn assert_generator<G: Generator>(_: &G) {}

        let generator = DigestGenerator::new(8).unwrap();
        assert_generator(&generator);
    }
}
