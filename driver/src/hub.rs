use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};

pub const DEFAULT_MODEL: &str = "thiborose/SmolLM2-FT-SQL";
pub const DEFAULT_REVISION: &str = "main";

const SINGLE_WEIGHTS: &str = "model.safetensors";
const WEIGHTS_INDEX: &str = "model.safetensors.index.json";

/// Where the model files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Hub { id: String, revision: String },
    Local(PathBuf),
}

impl ModelSource {
    /// An existing directory is used as-is, anything else is a hub repo id.
    pub fn parse(model: &str, revision: &str) -> Self {
        let path = Path::new(model);

        if path.is_dir() {
            Self::Local(path.to_path_buf())
        } else {
            Self::Hub {
                id: model.to_string(),
                revision: revision.to_string(),
            }
        }
    }
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::Hub {
            id: DEFAULT_MODEL.to_string(),
            revision: DEFAULT_REVISION.to_string(),
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hub { id, revision } => write!(f, "{id}@{revision}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Resolved paths of everything needed to build a [`crate::model::Model`].
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub tokenizer_config: Option<PathBuf>,
    pub weights: Vec<PathBuf>,
}

impl ModelFiles {
    /// Fetches (or finds in the local cache) the model files.
    pub fn resolve(source: &ModelSource) -> Result<Self> {
        match source {
            ModelSource::Hub { id, revision } => {
                let api = Api::new().wrap_err("failed to initialise the hub api")?;
                let repo = api.repo(Repo::with_revision(
                    id.clone(),
                    RepoType::Model,
                    revision.clone(),
                ));

                Self::from_hub(&repo)
            }
            ModelSource::Local(path) => Self::from_dir(path),
        }
    }

    fn from_hub(repo: &ApiRepo) -> Result<Self> {
        let config = repo.get("config.json").wrap_err("failed to get config.json")?;
        let tokenizer = repo
            .get("tokenizer.json")
            .wrap_err("failed to get tokenizer.json")?;
        let tokenizer_config = repo.get("tokenizer_config.json").ok();

        let weights = match repo.get(SINGLE_WEIGHTS) {
            Ok(file) => vec![file],
            Err(_) => {
                let index = repo
                    .get(WEIGHTS_INDEX)
                    .wrap_err("model has neither model.safetensors nor an index file")?;

                weight_shards(&index)?
                    .iter()
                    .map(|v| repo.get(v).wrap_err_with(|| format!("failed to get {v}")))
                    .collect::<Result<Vec<_>>>()?
            }
        };

        Ok(Self {
            config,
            tokenizer,
            tokenizer_config,
            weights,
        })
    }

    fn from_dir(path: &Path) -> Result<Self> {
        let single = path.join(SINGLE_WEIGHTS);

        let weights = if single.is_file() {
            vec![single]
        } else {
            weight_shards(&path.join(WEIGHTS_INDEX))?
                .into_iter()
                .map(|v| path.join(v))
                .collect()
        };

        let tokenizer_config = Some(path.join("tokenizer_config.json")).filter(|p| p.is_file());

        Ok(Self {
            config: path.join("config.json"),
            tokenizer: path.join("tokenizer.json"),
            tokenizer_config,
            weights,
        })
    }
}

/// Distinct shard file names listed in a safetensors index, in stable order.
fn weight_shards(json_file: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(json_file)
        .wrap_err_with(|| format!("failed to open {}", json_file.display()))?;
    let json: serde_json::Value =
        serde_json::from_reader(&file).wrap_err("failed to deser json file")?;

    shards_from_index(&json).wrap_err_with(|| format!("bad index {}", json_file.display()))
}

fn shards_from_index(json: &serde_json::Value) -> Result<Vec<String>> {
    let weight_map = match json.get("weight_map") {
        None => eyre::bail!("no weight map"),
        Some(serde_json::Value::Object(map)) => map,
        Some(_) => eyre::bail!("weight map is not a map"),
    };

    let mut seen = HashSet::new();
    let mut shards = vec![];

    for value in weight_map.values() {
        if let Some(file) = value.as_str() {
            if seen.insert(file) {
                shards.push(file.to_string());
            }
        }
    }

    shards.sort();

    Ok(shards)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_source_is_the_fine_tuned_model() {
        assert_eq!(
            ModelSource::default().to_string(),
            "thiborose/SmolLM2-FT-SQL@main"
        );
    }

    #[test]
    fn non_directory_is_a_hub_id() {
        let source = ModelSource::parse("someone/some-model", "v2");

        assert_eq!(
            source,
            ModelSource::Hub {
                id: "someone/some-model".into(),
                revision: "v2".into()
            }
        );
    }

    #[test]
    fn existing_directory_is_local() {
        let dir = std::env::temp_dir();

        assert_eq!(
            ModelSource::parse(dir.to_str().unwrap(), "main"),
            ModelSource::Local(dir)
        );
    }

    #[test]
    fn index_shards_are_deduplicated() {
        let json = serde_json::json!({
            "weight_map": {
                "a.weight": "model-00002-of-00002.safetensors",
                "b.weight": "model-00001-of-00002.safetensors",
                "c.weight": "model-00001-of-00002.safetensors"
            }
        });

        assert_eq!(
            shards_from_index(&json).unwrap(),
            vec![
                "model-00001-of-00002.safetensors".to_string(),
                "model-00002-of-00002.safetensors".to_string()
            ]
        );
    }

    #[test]
    fn index_without_weight_map_is_rejected() {
        assert!(shards_from_index(&serde_json::json!({ "metadata": {} })).is_err());
        assert!(shards_from_index(&serde_json::json!({ "weight_map": [] })).is_err());
    }
}
