//! Config loader: builds `MinidocsConfig` from every layer in precedence order.

use super::merge::merge_policy;
use super::sources::{env_vars, global_file, workspace_file};
use super::MinidocsConfig;
use crate::error::ConfigError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): defaults, global file, workspace
    /// `config/config.toml`, workspace `config/{MINIDOCS_ENV}.toml`,
    /// `MINIDOCS__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<MinidocsConfig, ConfigError> {
        let global = global_file::global_config_path();
        Self::load_layers(workspace_root, global.as_deref())
    }

    /// Same as [`ConfigLoader::load`] with an explicit global file location.
    pub fn load_layers(
        workspace_root: &Path,
        global_path: Option<&Path>,
    ) -> Result<MinidocsConfig, ConfigError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        if let Some(path) = global_path {
            builder = global_file::add_to_builder(builder, path);
        }
        builder = workspace_file::add_to_builder(builder, workspace_root);
        builder = env_vars::add_to_builder(builder);

        let config: MinidocsConfig = builder.build()?.try_deserialize()?;
        debug!(
            workspace = %workspace_root.display(),
            providers = config.providers.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load a single explicit file on top of the defaults. Environment
    /// variables still apply.
    pub fn load_from_file(path: &Path) -> Result<MinidocsConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Invalid(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true));
        let builder = env_vars::add_to_builder(builder);
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Location of the global configuration file, whether or not it exists.
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
