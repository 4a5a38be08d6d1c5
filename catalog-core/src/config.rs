//! Root / category path configuration for the catalog.
//!
//! Resolved once at startup from the host (§6 "Path / base configuration").

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The three top-level roots the scanner and path classifier know about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Root {
	Models,
	Input,
	Output,
}

impl Root {
	pub fn as_str(&self) -> &'static str {
		match self {
			Root::Models => "models",
			Root::Input => "input",
			Root::Output => "output",
		}
	}

	pub fn from_str_opt(s: &str) -> Option<Self> {
		match s {
			"models" => Some(Root::Models),
			"input" => Some(Root::Input),
			"output" => Some(Root::Output),
			_ => None,
		}
	}
}

impl std::fmt::Display for Root {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Absolute base paths the host provides for `input`, `output`, and the
/// `models` category map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
	pub input_base: PathBuf,
	pub output_base: PathBuf,
	/// category name -> one or more base paths backing it
	pub model_categories: BTreeMap<String, Vec<PathBuf>>,
	/// sqlite database file path
	pub database_path: PathBuf,
	/// SQL bind-parameter cap used to chunk bulk statements (§4.2, §9)
	#[serde(default = "default_max_bind_params")]
	pub max_bind_params: usize,
}

fn default_max_bind_params() -> usize {
	800
}

impl CatalogConfig {
	/// Load from a TOML file on disk.
	pub fn load(path: &Path) -> anyhow::Result<Self> {
		let text = std::fs::read_to_string(path)
			.map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
		let config: Self = toml::from_str(&text)
			.map_err(|e| anyhow::anyhow!("failed to parse config {}: {e}", path.display()))?;
		Ok(config)
	}

	/// All base paths for a given category, or an empty slice if unknown.
	pub fn category_bases(&self, category: &str) -> &[PathBuf] {
		self.model_categories
			.get(category)
			.map(Vec::as_slice)
			.unwrap_or(&[])
	}

	/// Iterate `(category, base)` pairs for every configured models category.
	pub fn all_model_category_bases(&self) -> impl Iterator<Item = (&str, &Path)> {
		self.model_categories
			.iter()
			.flat_map(|(cat, bases)| bases.iter().map(move |b| (cat.as_str(), b.as_path())))
	}

	pub fn base_for(&self, root: Root) -> Option<&Path> {
		match root {
			Root::Input => Some(&self.input_base),
			Root::Output => Some(&self.output_base),
			Root::Models => None, // models has no single base; use category_bases
		}
	}
}
