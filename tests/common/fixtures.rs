// Test fixtures and artifact generators for integration tests

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Smallest upload the gateway accepts as a PNG: signature plus two bytes.
pub const TINY_PNG: [u8; 10] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];

/// Common artifact sizes for testing
pub mod artifact_sizes {
    pub const TINY: usize = 10;
    pub const SMALL: usize = 4 * 1024;
    pub const MEDIUM: usize = 256 * 1024;
    pub const CEILING: usize = 5 * 1024 * 1024;
    pub const OVERSIZE: usize = 6_000_000;
}

/// Deterministic random artifact generator for reproducible tests
pub struct ArtifactGenerator {
    rng: StdRng,
}

impl ArtifactGenerator {
    /// Creates a new generator with a fixed seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generates random bytes of specified length
    pub fn random_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        self.rng.fill(&mut bytes[..]);
        bytes
    }

    /// Generates a PNG-signed payload of the given total length
    pub fn png(&mut self, len: usize) -> Vec<u8> {
        let mut bytes = self.random_bytes(len.max(TINY_PNG.len()));
        bytes[..8].copy_from_slice(&TINY_PNG[..8]);
        bytes
    }
}

impl Default for ArtifactGenerator {
    fn default() -> Self {
        Self::new(42)
    }
}

/// Builds a `POST /verify` form with the artifact under the `file` field.
pub fn verify_form(bytes: Vec<u8>, filename: &str, media_type: &str) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(filename.to_string())
        .mime_str(media_type)
        .expect("valid media type");
    reqwest::multipart::Form::new().part("file", part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_deterministic() {
        let mut a = ArtifactGenerator::new(7);
        let mut b = ArtifactGenerator::new(7);
        assert_eq!(a.png(64), b.png(64));
    }

    #[test]
    fn test_png_signature() {
        let bytes = ArtifactGenerator::default().png(artifact_sizes::SMALL);
        assert_eq!(bytes.len(), artifact_sizes::SMALL);
        assert_eq!(&bytes[..8], &TINY_PNG[..8]);
    }
}
