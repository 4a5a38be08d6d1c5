//! Content hashing and the canonical `"blake3:" + hex` hash format.

use crate::error::CatalogError;

pub const ALGORITHM_PREFIX: &str = "blake3:";
const DIGEST_HEX_LEN: usize = 64;

/// Hash a byte slice into the canonical hash string.
pub fn hash_bytes(bytes: &[u8]) -> String {
	format!("{ALGORITHM_PREFIX}{}", blake3::hash(bytes).to_hex())
}

/// Hash a file's contents in streaming fashion, suitable for large uploads.
pub async fn hash_file(path: &std::path::Path) -> std::io::Result<String> {
	use tokio::io::AsyncReadExt;

	let mut file = tokio::fs::File::open(path).await?;
	let mut hasher = blake3::Hasher::new();
	let mut buf = vec![0u8; 64 * 1024];
	loop {
		let n = file.read(&mut buf).await?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}
	Ok(format!("{ALGORITHM_PREFIX}{}", hasher.finalize().to_hex()))
}

/// Validate and normalize a caller-supplied hash string to the canonical
/// form. Accepts mixed case and surrounding whitespace; rejects anything
/// that isn't a 64-character hex digest under the `blake3:` algorithm tag.
pub fn normalize_hash(input: &str) -> Result<String, CatalogError> {
	let trimmed = input.trim();
	let lower = trimmed.to_lowercase();
	let Some(digest) = lower.strip_prefix(ALGORITHM_PREFIX) else {
		return Err(CatalogError::InvalidHash(format!(
			"hash must start with \"{ALGORITHM_PREFIX}\""
		)));
	};
	if digest.len() != DIGEST_HEX_LEN || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
		return Err(CatalogError::InvalidHash(
			"hash digest must be 64 hex characters".to_string(),
		));
	}
	Ok(format!("{ALGORITHM_PREFIX}{digest}"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hash_bytes_matches_canonical_form() {
		let h = hash_bytes(b"hello");
		assert!(h.starts_with(ALGORITHM_PREFIX));
		assert_eq!(h.len(), ALGORITHM_PREFIX.len() + DIGEST_HEX_LEN);
	}

	#[test]
	fn normalize_accepts_mixed_case_and_whitespace() {
		let h = hash_bytes(b"hello");
		let upper = format!("  {} ", h.to_uppercase());
		assert_eq!(normalize_hash(&upper).unwrap(), h);
	}

	#[test]
	fn normalize_rejects_other_algorithms() {
		let digest = "a".repeat(64);
		assert!(normalize_hash(&format!("sha256:{digest}")).is_err());
	}

	#[test]
	fn normalize_rejects_non_hex() {
		assert!(normalize_hash("blake3:not-hex").is_err());
	}
}
