//! CLIP Vision Tower
//!
//! A ViT image encoder in the CLIP layout: patch convolution, class token,
//! learned position embeddings, pre-norm transformer layers, pooling of the
//! class token and a linear projection into the joint embedding space.
//!
//! # Shape
//! - Input: (N, 3, image_size, image_size)
//! - Output: (N, projection_dim)
//!
//! # Reference
//!
//! "Learning Transferable Visual Models From Natural Language Supervision"
//! (Radford et al., 2021) <https://arxiv.org/abs/2103.00020>
//!
//! @version 0.1.0
//! @author Tessera Development Team

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tessera_tensor::Conv2dParams;
use tessera_trace::init::normal;
use tessera_trace::layers::Activation;
use tessera_trace::{
    Conv2d, LayerNorm, Linear, Mlp, Module, MultiHeadAttention, Parameter, TraceError, TraceResult,
    TracedTensor,
};
use tracing::debug;

use crate::error::{VisionError, VisionResult};

/// Names accepted by [`VisionTowerConfig::from_preset`].
pub const PRESETS: &[&str] = &["tiny", "clip-vit-base-patch32", "clip-vit-large-patch14"];

// =============================================================================
// Configuration
// =============================================================================

/// Architecture and initialization of a [`VisionTower`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionTowerConfig {
    /// Input height and width.
    pub image_size: usize,
    /// Patch height and width.
    pub patch_size: usize,
    /// Input channels.
    pub num_channels: usize,
    /// Transformer width.
    pub hidden_size: usize,
    /// Feed-forward width.
    pub intermediate_size: usize,
    /// Number of encoder layers.
    pub num_layers: usize,
    /// Attention heads per layer.
    pub num_heads: usize,
    /// Output embedding size.
    pub projection_dim: usize,
    /// Layer norm epsilon.
    pub layer_norm_eps: f32,
    /// Feed-forward activation.
    pub activation: Activation,
    /// Standard deviation of embedding initialization.
    pub init_std: f32,
    /// Seed for parameter initialization.
    pub seed: u64,
}

impl Default for VisionTowerConfig {
    fn default() -> Self {
        Self::tiny()
    }
}

impl VisionTowerConfig {
    /// Two narrow layers with a 768-wide projection; fast enough for tests.
    pub fn tiny() -> Self {
        Self {
            image_size: 224,
            patch_size: 32,
            num_channels: 3,
            hidden_size: 64,
            intermediate_size: 128,
            num_layers: 2,
            num_heads: 4,
            projection_dim: 768,
            layer_norm_eps: 1e-5,
            activation: Activation::QuickGelu,
            init_std: 0.02,
            seed: 0,
        }
    }

    /// ViT-B/32 dimensions.
    pub fn clip_vit_base_patch32() -> Self {
        Self {
            hidden_size: 768,
            intermediate_size: 3072,
            num_layers: 12,
            num_heads: 12,
            projection_dim: 512,
            ..Self::tiny()
        }
    }

    /// ViT-L/14 dimensions.
    pub fn clip_vit_large_patch14() -> Self {
        Self {
            patch_size: 14,
            hidden_size: 1024,
            intermediate_size: 4096,
            num_layers: 24,
            num_heads: 16,
            projection_dim: 768,
            ..Self::tiny()
        }
    }

    /// Looks up a preset by name.
    pub fn from_preset(name: &str) -> VisionResult<Self> {
        match name {
            "tiny" => Ok(Self::tiny()),
            "clip-vit-base-patch32" => Ok(Self::clip_vit_base_patch32()),
            "clip-vit-large-patch14" => Ok(Self::clip_vit_large_patch14()),
            other => Err(VisionError::InvalidConfig(format!(
                "unknown model preset '{other}' (available: {})",
                PRESETS.join(", ")
            ))),
        }
    }

    /// Sets the initialization seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Patches along one side.
    pub fn grid_size(&self) -> usize {
        self.image_size / self.patch_size.max(1)
    }

    /// Sequence length including the class token.
    pub fn num_positions(&self) -> usize {
        self.grid_size() * self.grid_size() + 1
    }

    /// Shape of a single input image.
    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.num_channels, self.image_size, self.image_size]
    }

    /// Rejects inconsistent dimensions.
    pub fn validate(&self) -> VisionResult<()> {
        if self.patch_size == 0 || self.image_size % self.patch_size != 0 {
            return Err(VisionError::InvalidConfig(format!(
                "image size {} is not a multiple of patch size {}",
                self.image_size, self.patch_size
            )));
        }
        if self.num_heads == 0 || self.hidden_size % self.num_heads != 0 {
            return Err(VisionError::InvalidConfig(format!(
                "hidden size {} is not divisible by {} heads",
                self.hidden_size, self.num_heads
            )));
        }
        if self.num_channels == 0 || self.projection_dim == 0 || self.intermediate_size == 0 {
            return Err(VisionError::InvalidConfig("dimensions must be non-zero".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Encoder Layer
// =============================================================================

/// Pre-norm transformer layer: attention and feed-forward, each residual.
#[derive(Debug, Clone)]
pub struct EncoderLayer {
    layer_norm1: LayerNorm,
    self_attn: MultiHeadAttention,
    layer_norm2: LayerNorm,
    mlp: Mlp,
}

impl EncoderLayer {
    fn new(prefix: &str, config: &VisionTowerConfig, rng: &mut StdRng) -> TraceResult<Self> {
        let hidden = config.hidden_size;
        Ok(Self {
            layer_norm1: LayerNorm::new(&format!("{prefix}.layer_norm1"), hidden, config.layer_norm_eps),
            self_attn: MultiHeadAttention::new(&format!("{prefix}.self_attn"), hidden, config.num_heads, rng)?,
            layer_norm2: LayerNorm::new(&format!("{prefix}.layer_norm2"), hidden, config.layer_norm_eps),
            mlp: Mlp::new(
                &format!("{prefix}.mlp"),
                hidden,
                config.intermediate_size,
                config.activation,
                rng,
            )?,
        })
    }
}

impl Module for EncoderLayer {
    fn forward<'t>(&self, input: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>> {
        let attn = self.self_attn.forward(&self.layer_norm1.forward(input)?)?;
        let h = input.add(&attn)?;
        let ff = self.mlp.forward(&self.layer_norm2.forward(&h)?)?;
        h.add(&ff)
    }

    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = self.layer_norm1.parameters();
        params.extend(self.self_attn.parameters());
        params.extend(self.layer_norm2.parameters());
        params.extend(self.mlp.parameters());
        params
    }

    fn name(&self) -> &'static str {
        "EncoderLayer"
    }
}

// =============================================================================
// Vision Tower
// =============================================================================

/// CLIP-style image encoder producing one embedding per image.
#[derive(Debug, Clone)]
pub struct VisionTower {
    config: VisionTowerConfig,
    patch_embedding: Conv2d,
    class_embedding: Parameter,
    position_embedding: Parameter,
    pre_layernorm: LayerNorm,
    layers: Vec<EncoderLayer>,
    post_layernorm: LayerNorm,
    visual_projection: Linear,
}

impl VisionTower {
    /// Builds a tower with parameters drawn from `config.seed`.
    pub fn new(config: VisionTowerConfig) -> VisionResult<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let hidden = config.hidden_size;
        let eps = config.layer_norm_eps;

        let patch_embedding = Conv2d::new(
            "vision_model.embeddings.patch_embedding",
            config.num_channels,
            hidden,
            config.patch_size,
            Conv2dParams::with_stride(config.patch_size),
            false,
            &mut rng,
        )?;
        let class_embedding = Parameter::named(
            "vision_model.embeddings.class_embedding",
            normal(&[1, 1, hidden], 0.0, config.init_std, &mut rng)?,
        );
        let position_embedding = Parameter::named(
            "vision_model.embeddings.position_embedding",
            normal(&[1, config.num_positions(), hidden], 0.0, config.init_std, &mut rng)?,
        );
        let layers = (0..config.num_layers)
            .map(|i| EncoderLayer::new(&format!("vision_model.encoder.layers.{i}"), &config, &mut rng))
            .collect::<TraceResult<Vec<_>>>()?;

        let tower = Self {
            pre_layernorm: LayerNorm::new("vision_model.pre_layrnorm", hidden, eps),
            post_layernorm: LayerNorm::new("vision_model.post_layernorm", hidden, eps),
            visual_projection: Linear::new(
                "visual_projection",
                hidden,
                config.projection_dim,
                false,
                &mut rng,
            )?,
            patch_embedding,
            class_embedding,
            position_embedding,
            layers,
            config,
        };
        debug!(
            layers = tower.layers.len(),
            hidden,
            parameters = tower.num_parameters(),
            "Built vision tower"
        );
        Ok(tower)
    }

    /// The configuration the tower was built from.
    pub fn config(&self) -> &VisionTowerConfig {
        &self.config
    }

    fn embed<'t>(&self, pixels: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>> {
        let tracer = pixels.tracer();
        let hidden = self.config.hidden_size as i64;

        // (N, hidden, g, g) -> (N, g*g, hidden)
        let patches = self
            .patch_embedding
            .forward(pixels)?
            .reshape(&[0, hidden, -1])?
            .transpose(1, 2)?;
        let class = tracer.parameter(&self.class_embedding)?.expand_batch(&patches)?;
        let tokens = TracedTensor::concat(&[&class, &patches], 1)?;
        tokens.add(&tracer.parameter(&self.position_embedding)?)
    }
}

impl Module for VisionTower {
    fn forward<'t>(&self, input: &TracedTensor<'t>) -> TraceResult<TracedTensor<'t>> {
        let c = &self.config;
        if input.shape()[1..] != [c.num_channels, c.image_size, c.image_size] {
            return Err(TraceError::InvalidModule(format!(
                "vision tower expects (N, {}, {}, {}), got {:?}",
                c.num_channels,
                c.image_size,
                c.image_size,
                input.shape()
            )));
        }

        let mut h = self.pre_layernorm.forward(&self.embed(input)?)?;
        for layer in &self.layers {
            h = layer.forward(&h)?;
        }
        let pooled = self.post_layernorm.forward(&h.select(1, 0)?)?;
        self.visual_projection.forward(&pooled)
    }

    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = self.patch_embedding.parameters();
        params.push(&self.class_embedding);
        params.push(&self.position_embedding);
        params.extend(self.pre_layernorm.parameters());
        for layer in &self.layers {
            params.extend(layer.parameters());
        }
        params.extend(self.post_layernorm.parameters());
        params.extend(self.visual_projection.parameters());
        params
    }

    fn name(&self) -> &'static str {
        "VisionTower"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_graph::Session;
    use tessera_tensor::Tensor;
    use tessera_trace::Tracer;

    fn small() -> VisionTowerConfig {
        VisionTowerConfig {
            image_size: 32,
            patch_size: 16,
            hidden_size: 16,
            intermediate_size: 32,
            num_heads: 2,
            projection_dim: 8,
            ..VisionTowerConfig::tiny()
        }
    }

    fn pixels(batch: usize, size: usize) -> Tensor<f32> {
        let n = batch * 3 * size * size;
        Tensor::from_vec((0..n).map(|i| ((i * 31 % 97) as f32) / 48.0 - 1.0).collect(), &[batch, 3, size, size])
            .unwrap()
    }

    #[test]
    fn test_presets() {
        for name in PRESETS {
            let config = VisionTowerConfig::from_preset(name).unwrap();
            assert!(config.validate().is_ok());
        }
        assert_eq!(VisionTowerConfig::clip_vit_large_patch14().num_positions(), 257);
        assert!(matches!(
            VisionTowerConfig::from_preset("resnet50"),
            Err(VisionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_dimensions() {
        let config = VisionTowerConfig {
            patch_size: 30,
            ..VisionTowerConfig::tiny()
        };
        assert!(VisionTower::new(config).is_err());
    }

    #[test]
    fn test_forward_shape_and_parameters() {
        let tower = VisionTower::new(small()).unwrap();
        // conv + class + pos + 2 LN + 2 * (2 LN + 4 linear w/b + 2 linear w/b) + LN + projection
        assert_eq!(tower.parameters().len(), 1 + 2 + 2 + 2 * (4 + 8 + 4) + 2 + 1);

        let tracer = Tracer::new("tower");
        let x = tracer.input("pixels", pixels(1, 32)).unwrap();
        let y = tower.forward(&x).unwrap();
        assert_eq!(y.shape(), &[1, 8]);
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = VisionTower::new(small()).unwrap();
        let b = VisionTower::new(small()).unwrap();
        let c = VisionTower::new(small().with_seed(1)).unwrap();
        assert_eq!(a.parameters()[0].data(), b.parameters()[0].data());
        assert_ne!(a.parameters()[0].data(), c.parameters()[0].data());
    }

    #[test]
    fn test_graph_generalizes_over_batch() {
        let tower = VisionTower::new(small()).unwrap();
        let tracer = Tracer::new("tower");
        let x = tracer.input("pixels", pixels(1, 32)).unwrap();
        let y = tower.forward(&x).unwrap();
        let model = tracer.finish(&y, "embeddings").unwrap();

        let batch = pixels(3, 32);
        let from_graph = Session::new(&model).unwrap().run_single(batch.clone()).unwrap();

        let eager_tracer = Tracer::new("eager");
        let eager = tower
            .forward(&eager_tracer.input("pixels", batch).unwrap())
            .unwrap()
            .into_value();
        assert_eq!(from_graph.shape(), &[3, 8]);
        assert!(from_graph.max_abs_diff(&eager).unwrap() < 1e-4);
    }

    #[test]
    fn test_rejects_wrong_resolution() {
        let tower = VisionTower::new(small()).unwrap();
        let tracer = Tracer::new("tower");
        let x = tracer.input("pixels", pixels(1, 16)).unwrap();
        assert!(matches!(tower.forward(&x), Err(TraceError::InvalidModule(_))));
    }
}
