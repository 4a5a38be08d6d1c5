//! Path classification and traversal-safe base-path checks (§4.1).

use std::path::{Component, Path, PathBuf};

use crate::config::{CatalogConfig, Root};
use crate::error::CatalogError;

/// Lexically normalize a path (resolve `.` and `..` without touching the
/// filesystem) so traversal checks can't be fooled by `..` segments and
/// don't require the path to already exist.
pub fn normalize(path: &Path) -> PathBuf {
	let mut out = PathBuf::new();
	for component in path.components() {
		match component {
			Component::ParentDir => {
				out.pop();
			}
			Component::CurDir => {}
			other => out.push(other.as_os_str()),
		}
	}
	out
}

/// Fail unless `candidate`, once normalized, has `base` (also normalized)
/// as a literal path prefix.
pub fn ensure_within_base(candidate: &Path, base: &Path) -> Result<PathBuf, CatalogError> {
	let candidate_norm = normalize(candidate);
	let base_norm = normalize(base);
	if candidate_norm.starts_with(&base_norm) {
		Ok(candidate_norm)
	} else {
		Err(CatalogError::InvalidBody(format!(
			"path {} escapes base {}",
			candidate.display(),
			base.display()
		)))
	}
}

/// Classify an absolute path into its root and, for `models`, its category.
pub fn classify(config: &CatalogConfig, path: &Path) -> Result<(Root, Option<String>), CatalogError> {
	let path_norm = normalize(path);

	for (category, base) in config.all_model_category_bases() {
		if path_norm.starts_with(normalize(base)) {
			return Ok((Root::Models, Some(category.to_string())));
		}
	}
	if path_norm.starts_with(normalize(&config.input_base)) {
		return Ok((Root::Input, None));
	}
	if path_norm.starts_with(normalize(&config.output_base)) {
		return Ok((Root::Output, None));
	}

	Err(CatalogError::InvalidBody(format!(
		"path {} is outside all configured roots",
		path.display()
	)))
}

/// The file's base path (for `relative_filename`) once classified.
fn base_for_classification<'a>(
	config: &'a CatalogConfig,
	root: Root,
	category: Option<&str>,
) -> Option<&'a Path> {
	match root {
		Root::Input => Some(&config.input_base),
		Root::Output => Some(&config.output_base),
		Root::Models => category.and_then(|c| config.category_bases(c).first().map(PathBuf::as_path)),
	}
}

/// `display_name` = final path component; `tag_list` begins with the root
/// and, for `models`, is followed by the category.
pub fn name_and_tags(config: &CatalogConfig, path: &Path) -> Result<(String, Vec<String>), CatalogError> {
	let (root, category) = classify(config, path)?;
	let display_name = path
		.file_name()
		.map(|n| n.to_string_lossy().to_string())
		.ok_or_else(|| CatalogError::InvalidBody(format!("path {} has no file name", path.display())))?;

	let mut tags = vec![root.as_str().to_string()];
	if let Some(category) = category {
		tags.push(category);
	}
	Ok((display_name, tags))
}

/// Path relative to its root's base, with forward slashes.
pub fn relative_filename(config: &CatalogConfig, path: &Path) -> Result<String, CatalogError> {
	let (root, category) = classify(config, path)?;
	let base = base_for_classification(config, root, category.as_deref()).ok_or_else(|| {
		CatalogError::InvalidBody(format!("no base path configured for category on {}", path.display()))
	})?;
	let rel = normalize(path)
		.strip_prefix(normalize(base))
		.map_err(|_| CatalogError::InvalidBody(format!("path {} is not under its root base", path.display())))?
		.to_path_buf();

	let joined = rel
		.components()
		.map(|c| c.as_os_str().to_string_lossy().into_owned())
		.collect::<Vec<_>>()
		.join("/");
	Ok(joined)
}

/// Validate the upload-tag contract: first tag is a root; `models` requires
/// a second (category) tag. This is the inverse of [`name_and_tags`] and
/// must stay symmetric with it.
pub fn validate_upload_tags(tags: &[String]) -> Result<(Root, Option<String>), CatalogError> {
	let first = tags
		.first()
		.ok_or_else(|| CatalogError::InvalidBody("tags must start with a root tag".to_string()))?;
	let root = Root::from_str_opt(first)
		.ok_or_else(|| CatalogError::InvalidBody(format!("unknown root tag \"{first}\"")))?;

	if root == Root::Models {
		let category = tags
			.get(1)
			.ok_or_else(|| CatalogError::InvalidBody("models uploads require a category tag".to_string()))?;
		Ok((root, Some(category.clone())))
	} else {
		Ok((root, None))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::BTreeMap;

	fn test_config() -> CatalogConfig {
		let mut model_categories = BTreeMap::new();
		model_categories.insert("loras".to_string(), vec![PathBuf::from("/data/models/loras")]);
		model_categories.insert(
			"checkpoints".to_string(),
			vec![PathBuf::from("/data/models/checkpoints")],
		);
		CatalogConfig {
			input_base: PathBuf::from("/data/input"),
			output_base: PathBuf::from("/data/output"),
			model_categories,
			database_path: PathBuf::from("/data/catalog.db"),
			max_bind_params: 800,
		}
	}

	#[test]
	fn classify_input() {
		let cfg = test_config();
		let (root, cat) = classify(&cfg, Path::new("/data/input/foo.txt")).unwrap();
		assert_eq!(root, Root::Input);
		assert_eq!(cat, None);
	}

	#[test]
	fn classify_models_category() {
		let cfg = test_config();
		let (root, cat) = classify(&cfg, Path::new("/data/models/loras/a.safetensors")).unwrap();
		assert_eq!(root, Root::Models);
		assert_eq!(cat.as_deref(), Some("loras"));
	}

	#[test]
	fn classify_outside_roots_errors() {
		let cfg = test_config();
		assert!(classify(&cfg, Path::new("/etc/passwd")).is_err());
	}

	#[test]
	fn name_and_tags_roundtrips_with_validate_upload_tags() {
		let cfg = test_config();
		let (name, tags) = name_and_tags(&cfg, Path::new("/data/models/loras/a.safetensors")).unwrap();
		assert_eq!(name, "a.safetensors");
		let (root, category) = validate_upload_tags(&tags).unwrap();
		assert_eq!(root, Root::Models);
		assert_eq!(category.as_deref(), Some("loras"));
	}

	#[test]
	fn ensure_within_base_blocks_traversal() {
		let base = Path::new("/data/input");
		assert!(ensure_within_base(Path::new("/data/input/../secrets/x"), base).is_err());
		assert!(ensure_within_base(Path::new("/data/input/a/b"), base).is_ok());
	}

	#[test]
	fn relative_filename_uses_forward_slashes() {
		let cfg = test_config();
		let rel = relative_filename(&cfg, Path::new("/data/input/sub/dir/file.txt")).unwrap();
		assert_eq!(rel, "sub/dir/file.txt");
	}

	#[test]
	fn validate_upload_tags_requires_category_for_models() {
		assert!(validate_upload_tags(&["models".to_string()]).is_err());
		assert!(validate_upload_tags(&["models".to_string(), "loras".to_string()]).is_ok());
		assert!(validate_upload_tags(&["input".to_string()]).is_ok());
	}
}
