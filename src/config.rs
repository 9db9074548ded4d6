//! Mesher configuration
//!
//! Loaded from TOML or built from defaults; validated once before a
//! `MesherData` session is created.

use crate::constants;
use crate::error::{MesherError, MesherResult};
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

/// Parameters forwarded to the geometry service when decimating
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DecimateConfig {
    /// Fraction of the current triangle count to aim for
    pub target_fraction: f32,
    pub aggressiveness: f64,
    pub error_base: f64,
    pub iteration_offset: u32,
}

impl Default for DecimateConfig {
    fn default() -> Self {
        Self {
            target_fraction: constants::decimation::TARGET_FRACTION,
            aggressiveness: constants::decimation::AGGRESSIVENESS,
            error_base: constants::decimation::ERROR_BASE,
            iteration_offset: constants::decimation::ITERATION_OFFSET,
        }
    }
}

/// Main mesher configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MesherConfig {
    /// Vertex capacity of the arena; bounds the geometry of one round
    pub max_vertices: usize,
    /// Maximum atlas edge length in pixels (power of two)
    pub atlas_size: u32,
    /// Source images are downsampled to fit this on both axes
    pub max_image_dimension: u32,
    /// Cell edge length in world units
    pub chunk_size: u32,
    pub decimate: DecimateConfig,
}

impl Default for MesherConfig {
    fn default() -> Self {
        Self {
            max_vertices: constants::arena::MAX_VERTICES,
            atlas_size: constants::atlas::TEXTURE_SIZE,
            max_image_dimension: constants::atlas::MAX_IMAGE_DIMENSION,
            chunk_size: constants::chunking::CHUNK_SIZE,
            decimate: DecimateConfig::default(),
        }
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> MesherError {
    MesherError::InvalidConfig {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl MesherConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> MesherResult<()> {
        if self.max_vertices == 0 {
            return Err(invalid("max_vertices", self.max_vertices, "cannot be 0"));
        }

        if self.atlas_size == 0 || !self.atlas_size.is_power_of_two() {
            return Err(invalid("atlas_size", self.atlas_size, "must be a power of two"));
        }

        if self.max_image_dimension == 0 {
            return Err(invalid(
                "max_image_dimension",
                self.max_image_dimension,
                "cannot be 0",
            ));
        }

        if self.max_image_dimension + constants::atlas::RECT_INSET > self.atlas_size {
            return Err(invalid(
                "max_image_dimension",
                self.max_image_dimension,
                "a downsampled image plus its gutter must fit in the atlas",
            ));
        }

        if self.chunk_size == 0 {
            return Err(invalid("chunk_size", self.chunk_size, "cannot be 0"));
        }

        let fraction = self.decimate.target_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(invalid(
                "decimate.target_fraction",
                fraction,
                "must be in (0, 1]",
            ));
        }

        if self.decimate.error_base <= 0.0 {
            return Err(invalid(
                "decimate.error_base",
                self.decimate.error_base,
                "must be positive",
            ));
        }

        log::info!(
            "[MesherConfig] Validation: max_vertices={}, arena_memory={}MB, atlas={}px, chunk_size={}",
            self.max_vertices,
            self.arena_bytes() / 1024 / 1024,
            self.atlas_size,
            self.chunk_size
        );

        Ok(())
    }

    /// Bytes allocated by one arena round across all five attributes
    pub fn arena_bytes(&self) -> usize {
        let floats = constants::arena::POSITION_SIZE
            + constants::arena::NORMAL_SIZE
            + constants::arena::COLOR_SIZE
            + constants::arena::UV_SIZE;
        self.max_vertices
            * (floats * std::mem::size_of::<f32>()
                + constants::arena::ID_SIZE * std::mem::size_of::<u32>())
    }

    /// Parse a configuration from TOML; missing keys fall back to defaults
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        let config: MesherConfig =
            toml::from_str(source).context("parsing mesher configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading mesher configuration {}", path.display()))?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = MesherConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 16);
        assert_eq!(config.decimate.target_fraction, 0.5);
    }

    #[test]
    fn test_capacity_need_not_hold_whole_triangles() {
        assert_eq!(constants::arena::MAX_VERTICES % 3, 2);
        let config = MesherConfig {
            max_vertices: 1000,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(MesherConfig {
            max_vertices: 0,
            ..Default::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = MesherConfig::from_toml_str(
            r#"
            chunk_size = 32
            atlas_size = 1024

            [decimate]
            target_fraction = 0.25
            "#,
        )
        .expect("valid config");

        assert_eq!(config.chunk_size, 32);
        assert_eq!(config.atlas_size, 1024);
        assert_eq!(config.max_image_dimension, 512);
        assert_eq!(config.decimate.target_fraction, 0.25);
        assert_eq!(config.decimate.iteration_offset, 3);
    }

    #[test]
    fn test_rejects_non_power_of_two_atlas() {
        let config = MesherConfig {
            atlas_size: 1000,
            ..Default::default()
        };
        let err = config.validate().expect_err("1000 is not a power of two");
        assert!(matches!(err, MesherError::InvalidConfig { ref field, .. } if field == "atlas_size"));
    }

    #[test]
    fn test_rejects_bad_fraction() {
        let mut config = MesherConfig::default();
        config.decimate.target_fraction = 0.0;
        assert!(config.validate().is_err());
        config.decimate.target_fraction = 1.5;
        assert!(config.validate().is_err());
        config.decimate.target_fraction = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_oversized_images() {
        let config = MesherConfig {
            atlas_size: 512,
            max_image_dimension: 512,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        writeln!(file, "max_vertices = 3000\nchunk_size = 8").expect("Failed to write config");

        let config = MesherConfig::load(file.path()).expect("Failed to load config");
        assert_eq!(config.max_vertices, 3000);
        assert_eq!(config.chunk_size, 8);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        assert!(MesherConfig::load(dir.path().join("absent.toml")).is_err());
    }
}
