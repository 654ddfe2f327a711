//! Blend Spaces
//!
//! Authoring-level parametric blends. A blend space places clips at
//! positions on a line ([`BlendSpace1D`]) or in a plane ([`BlendSpace2D`])
//! and answers "how much of each clip at this parameter value". `compile`
//! turns a space into the equivalent blend tree node.
//!
//! Parameter values outside the configured bounds are clamped.

use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::blend_tree::{Blend1DNode, Blend2DNode, ClipNode};
use crate::clip::AnimationLibrary;
use crate::delaunay::{Triangle, Triangulation, WeightMode};
use crate::errors::{AnimationError, Result};

fn one() -> f32 {
    1.0
}

fn clip_node(library: &AnimationLibrary, clip: &str) -> Result<ClipNode> {
    library
        .get(clip)
        .map(ClipNode::new)
        .ok_or_else(|| AnimationError::ClipNotFound(clip.to_string()))
}

// ============================================================================
// 1D
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendSample1D {
    pub clip: String,
    pub position: f32,
    #[serde(default = "one")]
    pub speed: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlendSpace1DData {
    name: String,
    parameter: String,
    #[serde(default)]
    samples: Vec<BlendSample1D>,
    #[serde(default)]
    min: f32,
    #[serde(default = "one")]
    max: f32,
    #[serde(default)]
    sync: bool,
}

/// Clips placed along one parameter axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BlendSpace1DData", into = "BlendSpace1DData")]
pub struct BlendSpace1D {
    pub name: String,
    pub parameter: String,
    samples: Vec<BlendSample1D>,
    min: f32,
    max: f32,
    pub sync: bool,
}

impl From<BlendSpace1DData> for BlendSpace1D {
    fn from(data: BlendSpace1DData) -> Self {
        let mut space = Self::new(data.name, data.parameter);
        space.set_bounds(data.min, data.max);
        space.sync = data.sync;
        for sample in data.samples {
            space.add_sample(sample.clip, sample.position, sample.speed);
        }
        space
    }
}

impl From<BlendSpace1D> for BlendSpace1DData {
    fn from(space: BlendSpace1D) -> Self {
        Self {
            name: space.name,
            parameter: space.parameter,
            samples: space.samples,
            min: space.min,
            max: space.max,
            sync: space.sync,
        }
    }
}

impl BlendSpace1D {
    /// Empty space over `[0, 1]`.
    #[must_use]
    pub fn new(name: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter: parameter.into(),
            samples: Vec::new(),
            min: 0.0,
            max: 1.0,
            sync: false,
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, min: f32, max: f32) -> Self {
        self.set_bounds(min, max);
        self
    }

    #[must_use]
    pub fn with_sample(mut self, clip: impl Into<String>, position: f32) -> Self {
        self.add_sample(clip, position, 1.0);
        self
    }

    pub fn set_bounds(&mut self, min: f32, max: f32) {
        self.min = min.min(max);
        self.max = max.max(min);
    }

    #[must_use]
    pub fn bounds(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    /// Inserts a sample in position order and returns its index.
    pub fn add_sample(&mut self, clip: impl Into<String>, position: f32, speed: f32) -> usize {
        let at = self.samples.partition_point(|s| s.position <= position);
        self.samples.insert(
            at,
            BlendSample1D {
                clip: clip.into(),
                position,
                speed,
            },
        );
        at
    }

    pub fn remove_sample(&mut self, index: usize) -> Option<BlendSample1D> {
        (index < self.samples.len()).then(|| self.samples.remove(index))
    }

    pub fn clear_samples(&mut self) {
        self.samples.clear();
    }

    #[must_use]
    pub fn samples(&self) -> &[BlendSample1D] {
        &self.samples
    }

    /// Bracketing samples for `value` (clamped to the bounds) and the
    /// fraction between them.
    #[must_use]
    pub fn find_blend_indices(&self, value: f32) -> (usize, usize, f32) {
        let n = self.samples.len();
        if n <= 1 {
            return (0, 0, 0.0);
        }

        let value = value.clamp(self.min, self.max);
        if value <= self.samples[0].position {
            return (0, 0, 0.0);
        }
        if value >= self.samples[n - 1].position {
            return (n - 1, n - 1, 0.0);
        }

        let upper = self.samples.partition_point(|s| s.position <= value).min(n - 1);
        let lower = upper - 1;
        let range = self.samples[upper].position - self.samples[lower].position;
        let t = if range > 0.0 {
            (value - self.samples[lower].position) / range
        } else {
            0.0
        };
        (lower, upper, t.clamp(0.0, 1.0))
    }

    /// One weight per sample, summing to 1 (empty without samples).
    #[must_use]
    pub fn get_sample_weights(&self, value: f32) -> Vec<f32> {
        let mut weights = vec![0.0; self.samples.len()];
        if weights.is_empty() {
            return weights;
        }
        let (lower, upper, t) = self.find_blend_indices(value);
        if lower == upper {
            weights[lower] = 1.0;
        } else {
            weights[lower] = 1.0 - t;
            weights[upper] = t;
        }
        weights
    }

    /// Equivalent [`Blend1DNode`] with one clip node per sample.
    pub fn compile(&self, library: &AnimationLibrary) -> Result<Blend1DNode> {
        let mut node = Blend1DNode::new(self.name.clone(), self.parameter.clone())
            .with_sync(self.sync)
            .with_bounds(self.min, self.max);
        for sample in &self.samples {
            node.add_entry(Box::new(clip_node(library, &sample.clip)?), sample.position, sample.speed);
        }
        log::debug!(
            "Compiled 1D blend space '{}' ({} samples)",
            self.name,
            self.samples.len()
        );
        Ok(node)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

// ============================================================================
// 2D
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendSpace2DMode {
    /// Delaunay triangulation with barycentric weights.
    #[default]
    Directional,
    Cartesian,
    Freeform,
}

impl BlendSpace2DMode {
    #[must_use]
    pub fn weight_mode(self) -> WeightMode {
        match self {
            Self::Directional => WeightMode::Barycentric,
            Self::Cartesian | Self::Freeform => WeightMode::InverseDistance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendSample2D {
    pub clip: String,
    pub position: Vec2,
    #[serde(default = "one")]
    pub speed: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlendSpace2DData {
    name: String,
    parameter_x: String,
    parameter_y: String,
    #[serde(default)]
    samples: Vec<BlendSample2D>,
    #[serde(default = "default_min")]
    min: Vec2,
    #[serde(default = "default_max")]
    max: Vec2,
    #[serde(default)]
    mode: BlendSpace2DMode,
    #[serde(default)]
    sync: bool,
}

fn default_min() -> Vec2 {
    Vec2::NEG_ONE
}

fn default_max() -> Vec2 {
    Vec2::ONE
}

/// Clips placed in a 2D parameter plane.
///
/// The triangulation is rebuilt eagerly whenever samples or the mode change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "BlendSpace2DData", into = "BlendSpace2DData")]
pub struct BlendSpace2D {
    pub name: String,
    pub parameter_x: String,
    pub parameter_y: String,
    samples: Vec<BlendSample2D>,
    min: Vec2,
    max: Vec2,
    mode: BlendSpace2DMode,
    pub sync: bool,
    triangulation: Triangulation,
}

impl From<BlendSpace2DData> for BlendSpace2D {
    fn from(data: BlendSpace2DData) -> Self {
        let mut space = Self::new(data.name, data.parameter_x, data.parameter_y);
        space.min = data.min.min(data.max);
        space.max = data.max.max(data.min);
        space.mode = data.mode;
        space.sync = data.sync;
        space.samples = data.samples;
        space.retriangulate();
        space
    }
}

impl From<BlendSpace2D> for BlendSpace2DData {
    fn from(space: BlendSpace2D) -> Self {
        Self {
            name: space.name,
            parameter_x: space.parameter_x,
            parameter_y: space.parameter_y,
            samples: space.samples,
            min: space.min,
            max: space.max,
            mode: space.mode,
            sync: space.sync,
        }
    }
}

impl BlendSpace2D {
    /// Empty directional space over `[-1, 1]` on both axes.
    #[must_use]
    pub fn new(name: impl Into<String>, parameter_x: impl Into<String>, parameter_y: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter_x: parameter_x.into(),
            parameter_y: parameter_y.into(),
            samples: Vec::new(),
            min: default_min(),
            max: default_max(),
            mode: BlendSpace2DMode::Directional,
            sync: false,
            triangulation: Triangulation::default(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: BlendSpace2DMode) -> Self {
        self.set_mode(mode);
        self
    }

    #[must_use]
    pub fn with_bounds(mut self, min: Vec2, max: Vec2) -> Self {
        self.set_bounds(min, max);
        self
    }

    #[must_use]
    pub fn with_sample(mut self, clip: impl Into<String>, position: Vec2) -> Self {
        self.add_sample(clip, position, 1.0);
        self
    }

    pub fn set_bounds(&mut self, min: Vec2, max: Vec2) {
        self.min = min.min(max);
        self.max = max.max(min);
    }

    #[must_use]
    pub fn bounds(&self) -> (Vec2, Vec2) {
        (self.min, self.max)
    }

    #[must_use]
    pub fn mode(&self) -> BlendSpace2DMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: BlendSpace2DMode) {
        if self.mode != mode {
            self.mode = mode;
            self.retriangulate();
        }
    }

    pub fn add_sample(&mut self, clip: impl Into<String>, position: Vec2, speed: f32) -> usize {
        self.samples.push(BlendSample2D {
            clip: clip.into(),
            position,
            speed,
        });
        self.retriangulate();
        self.samples.len() - 1
    }

    pub fn remove_sample(&mut self, index: usize) -> Option<BlendSample2D> {
        if index >= self.samples.len() {
            return None;
        }
        let sample = self.samples.remove(index);
        self.retriangulate();
        Some(sample)
    }

    pub fn set_sample_position(&mut self, index: usize, position: Vec2) {
        if let Some(sample) = self.samples.get_mut(index) {
            sample.position = position;
            self.retriangulate();
        }
    }

    pub fn clear_samples(&mut self) {
        self.samples.clear();
        self.retriangulate();
    }

    #[must_use]
    pub fn samples(&self) -> &[BlendSample2D] {
        &self.samples
    }

    #[must_use]
    pub fn triangles(&self) -> &[Triangle] {
        self.triangulation.triangles()
    }

    #[must_use]
    pub fn triangulation(&self) -> &Triangulation {
        &self.triangulation
    }

    /// Index into [`BlendSpace2D::triangles`] of the triangle containing `p`.
    #[must_use]
    pub fn find_containing_triangle(&self, p: Vec2) -> Option<usize> {
        self.triangulation.find_containing_triangle(p).map(|(i, _)| i)
    }

    /// One weight per sample at `p` (clamped to the bounds), summing to 1.
    #[must_use]
    pub fn get_sample_weights(&self, p: Vec2) -> Vec<f32> {
        self.triangulation.sample_weights(p.clamp(self.min, self.max))
    }

    /// Equivalent [`Blend2DNode`] with one clip node per sample.
    pub fn compile(&self, library: &AnimationLibrary) -> Result<Blend2DNode> {
        let mut node = Blend2DNode::new(
            self.name.clone(),
            self.parameter_x.clone(),
            self.parameter_y.clone(),
            self.mode.weight_mode(),
        )
        .with_sync(self.sync)
        .with_bounds(self.min, self.max);
        for sample in &self.samples {
            node.add_point(Box::new(clip_node(library, &sample.clip)?), sample.position, sample.speed);
        }
        log::debug!(
            "Compiled 2D blend space '{}' ({} samples, {} triangles)",
            self.name,
            self.samples.len(),
            self.triangles().len()
        );
        Ok(node)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    fn retriangulate(&mut self) {
        let points = self.samples.iter().map(|s| s.position).collect();
        self.triangulation = Triangulation::new(points, self.mode.weight_mode());
    }
}
