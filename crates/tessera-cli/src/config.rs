//! Config - Configuration File Handling
//!
//! Reads `tessera.toml` and merges it with command line flags. Flags win over
//! file values, file values win over built-in defaults.
//!
//! ```toml
//! [export]
//! model_name = "model_prequantized"
//! output_dir = "artifacts"
//!
//! [model]
//! preset = "tiny"
//! seed = 0
//!
//! [quantize]
//! model_name = "model"
//! weight_type = "int8"
//! op_types = ["MatMul", "Gemm", "Conv", "Gather"]
//!
//! [image]
//! source = "dog.jpg"
//! precision = "f16"
//! ```
//!
//! @version 0.1.0
//! @author Tessera Development Team

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tessera::{DEFAULT_ORIGINAL_NAME, DEFAULT_QUANTIZED_NAME};
use tessera_quant::{OpRegistry, QuantConfig, QuantFormat, WeightType};
use tessera_trace::ExportOptions;
use tessera_vision::{ClipPreprocessor, ImageSource, Precision, VisionTowerConfig};
use tracing::debug;

use crate::cli::{ModelOptions, QuantOptions};
use crate::error::{CliError, CliResult};

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "tessera.toml";

// =============================================================================
// File Layout
// =============================================================================

/// Contents of `tessera.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TesseraConfig {
    /// Export settings
    pub export: ExportSection,
    /// Vision tower settings
    pub model: ModelSection,
    /// Quantization settings
    pub quantize: QuantizeSection,
    /// Sample image settings
    pub image: ImageSection,
}

/// `[export]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportSection {
    /// Name of the float artifact
    pub model_name: String,
    /// Directory artifacts are written to
    pub output_dir: PathBuf,
    /// Verify the trace before writing
    pub check_trace: bool,
    /// Batch size of the generalization check
    pub check_batch_size: usize,
    /// Allowed trace difference
    pub tolerance: f32,
}

impl Default for ExportSection {
    fn default() -> Self {
        let defaults = ExportOptions::default();
        Self {
            model_name: DEFAULT_ORIGINAL_NAME.to_string(),
            output_dir: defaults.output_dir,
            check_trace: defaults.check_trace,
            check_batch_size: defaults.check_batch_size,
            tolerance: defaults.tolerance,
        }
    }
}

/// `[model]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSection {
    /// Tower preset name
    pub preset: String,
    /// Initialization seed
    pub seed: u64,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            preset: "tiny".to_string(),
            seed: 0,
        }
    }
}

/// `[quantize]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuantizeSection {
    /// Name of the quantized artifact
    pub model_name: String,
    /// Per-channel parameters
    pub per_channel: bool,
    /// 7-bit range
    pub reduce_range: bool,
    /// Asymmetric zero points
    pub asymmetric: bool,
    /// `int8` or `uint8`
    pub weight_type: String,
    /// `operator` or `qdq`
    pub format: String,
    /// Operator allow-list
    pub op_types: Vec<String>,
    /// Only these nodes are rewritten when set
    pub nodes_to_quantize: Option<Vec<String>>,
    /// Nodes never rewritten
    pub nodes_to_exclude: Vec<String>,
}

impl Default for QuantizeSection {
    fn default() -> Self {
        let defaults = QuantConfig::default();
        Self {
            model_name: DEFAULT_QUANTIZED_NAME.to_string(),
            per_channel: defaults.per_channel,
            reduce_range: defaults.reduce_range,
            asymmetric: defaults.asymmetric_weights,
            weight_type: defaults.weight_type.to_string(),
            format: defaults.format.to_string(),
            op_types: defaults.op_types.iter().map(str::to_string).collect(),
            nodes_to_quantize: None,
            nodes_to_exclude: Vec::new(),
        }
    }
}

/// `[image]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageSection {
    /// Image path or URL
    pub source: Option<String>,
    /// Resize and crop size
    pub size: u32,
    /// `f32` or `f16`
    pub precision: String,
}

impl Default for ImageSection {
    fn default() -> Self {
        let defaults = ClipPreprocessor::default();
        Self {
            source: None,
            size: defaults.crop_size,
            precision: defaults.precision.to_string(),
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

impl TesseraConfig {
    /// Loads an explicit config file, or `./tessera.toml` when present, or
    /// falls back to defaults. An explicit path that does not exist is an
    /// error.
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                Self::load_from_path(path)
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::load_from_path(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parses a config file.
    pub fn load_from_path(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Export options with flag overrides applied.
    pub fn export_options(
        &self,
        model: &ModelOptions,
        name: Option<&str>,
        dir: Option<&Path>,
    ) -> ExportOptions {
        let section = &self.export;
        ExportOptions {
            model_name: name.unwrap_or(&section.model_name).to_string(),
            output_dir: dir.map_or_else(|| section.output_dir.clone(), Path::to_path_buf),
            check_trace: section.check_trace && !model.no_check,
            check_batch_size: section.check_batch_size,
            tolerance: section.tolerance,
            ..ExportOptions::default()
        }
    }

    /// Tower configuration for the selected preset and seed.
    pub fn tower_config(&self, model: &ModelOptions) -> CliResult<VisionTowerConfig> {
        let preset = model.preset.as_deref().unwrap_or(&self.model.preset);
        let seed = model.seed.unwrap_or(self.model.seed);
        Ok(VisionTowerConfig::from_preset(preset)?.with_seed(seed))
    }

    /// Preprocessor matching the tower's input resolution.
    pub fn preprocessor(&self, model: &ModelOptions, tower: &VisionTowerConfig) -> CliResult<ClipPreprocessor> {
        let precision: Precision = model
            .precision
            .as_deref()
            .unwrap_or(&self.image.precision)
            .parse()?;
        let size = if tower.image_size == 0 {
            self.image.size
        } else {
            tower.image_size as u32
        };
        let preprocessor = ClipPreprocessor::default()
            .with_size(size)
            .with_precision(precision);
        preprocessor.validate()?;
        Ok(preprocessor)
    }

    /// Image to trace with. `None` selects a synthetic sample.
    pub fn image_source(&self, model: &ModelOptions, fallback: Option<&str>) -> Option<ImageSource> {
        if model.synthetic {
            return None;
        }
        model
            .image
            .as_deref()
            .or(self.image.source.as_deref())
            .or(fallback)
            .map(ImageSource::parse)
    }

    /// Quantization config with flag overrides applied and validated.
    pub fn quant_config(&self, quant: &QuantOptions) -> CliResult<QuantConfig> {
        let section = &self.quantize;
        let weight_type: WeightType = quant
            .weight_type
            .as_deref()
            .unwrap_or(&section.weight_type)
            .parse()?;
        let format: QuantFormat = quant.format.as_deref().unwrap_or(&section.format).parse()?;
        let op_types = match &quant.op_types {
            Some(list) => OpRegistry::parse(list)?,
            None => OpRegistry::new(section.op_types.iter().cloned()),
        };
        let mut nodes_to_exclude = section.nodes_to_exclude.clone();
        nodes_to_exclude.extend(quant.exclude.iter().cloned());

        let config = QuantConfig {
            per_channel: section.per_channel || quant.per_channel,
            reduce_range: section.reduce_range || quant.reduce_range,
            asymmetric_weights: section.asymmetric || quant.asymmetric,
            weight_type,
            format,
            op_types,
            nodes_to_quantize: section.nodes_to_quantize.clone(),
            nodes_to_exclude,
            ..QuantConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Name of the quantized artifact.
    pub fn quantized_name<'a>(&'a self, flag: Option<&'a str>) -> &'a str {
        flag.unwrap_or(&self.quantize.model_name)
    }

    /// Name of the float artifact.
    pub fn original_name<'a>(&'a self, flag: Option<&'a str>) -> &'a str {
        flag.unwrap_or(&self.export.model_name)
    }

    /// Directory holding the artifacts.
    pub fn artifact_dir(&self, flag: Option<&Path>) -> PathBuf {
        flag.map_or_else(|| self.export.output_dir.clone(), Path::to_path_buf)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_library() {
        let config = TesseraConfig::default();
        let quant = config.quant_config(&QuantOptions::default()).unwrap();
        assert_eq!(quant, QuantConfig::default());

        let export = config.export_options(&ModelOptions::default(), None, None);
        assert_eq!(export, ExportOptions::default());
        assert_eq!(config.quantized_name(None), "model");
    }

    #[test]
    fn test_file_values_and_overrides() {
        let config: TesseraConfig = toml::from_str(
            r#"
            [export]
            model_name = "float"

            [quantize]
            weight_type = "uint8"
            op_types = ["MatMul"]
            nodes_to_exclude = ["head"]

            [image]
            precision = "f16"
            "#,
        )
        .unwrap();

        let quant = config.quant_config(&QuantOptions::default()).unwrap();
        assert_eq!(quant.weight_type, WeightType::QUInt8);
        assert_eq!(quant.op_types.len(), 1);

        let flags = QuantOptions {
            weight_type: Some("int8".to_string()),
            per_channel: true,
            exclude: vec!["stem".to_string()],
            ..QuantOptions::default()
        };
        let quant = config.quant_config(&flags).unwrap();
        assert_eq!(quant.weight_type, WeightType::QInt8);
        assert!(quant.per_channel);
        assert_eq!(quant.nodes_to_exclude, vec!["head", "stem"]);

        assert_eq!(config.original_name(None), "float");
        assert_eq!(config.original_name(Some("other")), "other");

        let tower = config.tower_config(&ModelOptions::default()).unwrap();
        let pre = config.preprocessor(&ModelOptions::default(), &tower).unwrap();
        assert_eq!(pre.precision, Precision::F16);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let config = TesseraConfig::default();
        let bad_type = QuantOptions {
            weight_type: Some("int4".to_string()),
            ..QuantOptions::default()
        };
        assert!(matches!(config.quant_config(&bad_type), Err(CliError::Config(_))));

        let bad_op = QuantOptions {
            op_types: Some("MatMul,Softmax".to_string()),
            ..QuantOptions::default()
        };
        assert!(matches!(config.quant_config(&bad_op), Err(CliError::Config(_))));

        let bad_preset = ModelOptions {
            preset: Some("resnet".to_string()),
            ..ModelOptions::default()
        };
        assert!(matches!(config.tower_config(&bad_preset), Err(CliError::Config(_))));

        assert!(toml::from_str::<TesseraConfig>("[export]\nunknown = 1").is_err());
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = TesseraConfig::load(Some(Path::new("/nonexistent/tessera.toml"))).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_image_selection() {
        let config = TesseraConfig::default();
        let none = ModelOptions::default();
        assert_eq!(config.image_source(&none, None), None);
        assert!(config.image_source(&none, Some("https://x/y.jpg")).unwrap().is_remote());

        let synthetic = ModelOptions {
            synthetic: true,
            ..ModelOptions::default()
        };
        assert_eq!(config.image_source(&synthetic, Some("https://x/y.jpg")), None);
    }
}
