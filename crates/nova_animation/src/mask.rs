//! Bone Masks
//!
//! A [`BlendMask`] restricts which bones a blend affects. Authoring happens
//! through named [`BoneWeight`] entries; the flat per-bone weight array used
//! during evaluation is rebuilt from the entries against a skeleton whenever
//! the entries change.
//!
//! Entries apply in order, so a later entry overrides an earlier one for the
//! same bone (including bones reached through `include_children`).

use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::interpolation::lerp;
use crate::skeleton::Skeleton;

/// Weight assigned to a named bone, optionally propagated to its descendants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoneWeight {
    pub bone: String,
    pub weight: f32,
    #[serde(default)]
    pub include_children: bool,
}

/// How two masks are merged by [`BlendMask::combined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskCombine {
    Multiply,
    /// Sum, clamped to 1.
    Add,
    Max,
    Min,
}

impl MaskCombine {
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            MaskCombine::Multiply => a * b,
            MaskCombine::Add => (a + b).min(1.0),
            MaskCombine::Max => a.max(b),
            MaskCombine::Min => a.min(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskPreset {
    FullBody,
    UpperBody,
    LowerBody,
    LeftArm,
    RightArm,
    Head,
    Spine,
}

impl MaskPreset {
    pub const ALL: [MaskPreset; 7] = [
        MaskPreset::FullBody,
        MaskPreset::UpperBody,
        MaskPreset::LowerBody,
        MaskPreset::LeftArm,
        MaskPreset::RightArm,
        MaskPreset::Head,
        MaskPreset::Spine,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            MaskPreset::FullBody => "full_body",
            MaskPreset::UpperBody => "upper_body",
            MaskPreset::LowerBody => "lower_body",
            MaskPreset::LeftArm => "left_arm",
            MaskPreset::RightArm => "right_arm",
            MaskPreset::Head => "head",
            MaskPreset::Spine => "spine",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendMask {
    pub name: String,
    /// Weight for bones no entry reaches.
    #[serde(default)]
    pub default_weight: f32,
    #[serde(default)]
    entries: Vec<BoneWeight>,

    #[serde(skip)]
    weights: Vec<f32>,
    #[serde(skip, default = "dirty_default")]
    dirty: bool,
}

fn dirty_default() -> bool {
    true
}

impl Default for BlendMask {
    fn default() -> Self {
        Self::new("mask")
    }
}

impl BlendMask {
    /// Empty mask: every bone weighs 0 until entries are added.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_weight: 0.0,
            entries: Vec::new(),
            weights: Vec::new(),
            dirty: true,
        }
    }

    /// Mask that passes every bone at full weight.
    #[must_use]
    pub fn full_body(name: impl Into<String>) -> Self {
        Self {
            default_weight: 1.0,
            ..Self::new(name)
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[BoneWeight] {
        &self.entries
    }

    /// The flat per-bone weights from the last [`BlendMask::rebuild`].
    #[must_use]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Weight for bone `index`; bones outside the built range use `default_weight`.
    #[inline]
    #[must_use]
    pub fn bone_weight(&self, index: usize) -> f32 {
        self.weights.get(index).copied().unwrap_or(self.default_weight)
    }

    #[must_use]
    pub fn bone_weight_by_name(&self, skeleton: &Skeleton, bone: &str) -> f32 {
        skeleton
            .bone_index(bone)
            .map_or(self.default_weight, |i| self.bone_weight(i))
    }

    /// Sets the weight of `bone`, keeping an existing entry's `include_children` flag.
    pub fn set_bone_weight(&mut self, bone: &str, weight: f32) {
        let weight = weight.clamp(0.0, 1.0);
        if let Some(entry) = self.entries.iter_mut().find(|e| e.bone == bone) {
            entry.weight = weight;
        } else {
            self.entries.push(BoneWeight {
                bone: bone.to_string(),
                weight,
                include_children: false,
            });
        }
        self.dirty = true;
    }

    /// Adds (or replaces) the entry for `bone`, moving it to the end.
    pub fn add_bone(&mut self, bone: &str, weight: f32, include_children: bool) {
        self.entries.retain(|e| e.bone != bone);
        self.entries.push(BoneWeight {
            bone: bone.to_string(),
            weight: weight.clamp(0.0, 1.0),
            include_children,
        });
        self.dirty = true;
    }

    pub fn remove_bone(&mut self, bone: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.bone != bone);
        let removed = self.entries.len() != before;
        self.dirty |= removed;
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dirty = true;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Rebuilds the flat weights for `skeleton` if the entries changed or the
    /// bone count differs from the last build.
    pub fn rebuild(&mut self, skeleton: &Skeleton) {
        if !self.dirty && self.weights.len() == skeleton.bone_count() {
            return;
        }

        self.weights.clear();
        self.weights.resize(skeleton.bone_count(), self.default_weight);

        for entry in &self.entries {
            let Some(index) = skeleton.bone_index(&entry.bone) else {
                log::debug!("Mask '{}': bone '{}' not in skeleton", self.name, entry.bone);
                continue;
            };
            self.weights[index] = entry.weight;
            if entry.include_children {
                for child in skeleton.descendants_of(index) {
                    self.weights[child] = entry.weight;
                }
            }
        }

        self.dirty = false;
    }

    /// Fades the mask from `start_weight` at `start_bone` to `end_weight`
    /// `levels` ancestors up the parent chain.
    pub fn add_feathering(
        &mut self,
        skeleton: &Skeleton,
        start_bone: &str,
        levels: usize,
        start_weight: f32,
        end_weight: f32,
    ) {
        let Some(start) = skeleton.bone_index(start_bone) else {
            log::warn!("Mask '{}': feathering start bone '{start_bone}' not found", self.name);
            return;
        };

        let chain = std::iter::once(start).chain(skeleton.ancestors_of(start)).take(levels + 1);
        for (level, bone) in chain.enumerate() {
            let t = if levels == 0 { 0.0 } else { level as f32 / levels as f32 };
            let name = skeleton.bones()[bone].name.clone();
            self.set_bone_weight(&name, lerp(start_weight, end_weight, t));
        }

        self.rebuild(skeleton);
    }

    /// Copy with left/right bone names swapped (`_L`/`_R`, `Left`/`Right`, ...).
    #[must_use]
    pub fn mirrored(&self, skeleton: &Skeleton) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|e| {
                let bone = mirror_bone_name(&e.bone)
                    .filter(|m| skeleton.bone_index(m).is_some())
                    .unwrap_or_else(|| e.bone.clone());
                BoneWeight { bone, ..e.clone() }
            })
            .collect();

        let mut mask = Self {
            name: format!("{}_mirrored", self.name),
            default_weight: self.default_weight,
            entries,
            weights: Vec::new(),
            dirty: true,
        };
        mask.rebuild(skeleton);
        mask
    }

    /// Replaces every weight `w` with `1 - w`.
    pub fn invert(&mut self) {
        self.default_weight = 1.0 - self.default_weight;
        for entry in &mut self.entries {
            entry.weight = 1.0 - entry.weight;
        }
        for w in &mut self.weights {
            *w = 1.0 - *w;
        }
    }

    /// Per-bone combination of two masks, expressed as explicit per-bone entries.
    #[must_use]
    pub fn combined(&self, other: &Self, op: MaskCombine, skeleton: &Skeleton) -> Self {
        let mut a = self.clone();
        let mut b = other.clone();
        a.rebuild(skeleton);
        b.rebuild(skeleton);

        let mut mask = Self::new(format!("{}_{}", self.name, other.name));
        mask.default_weight = op.apply(self.default_weight, other.default_weight);
        for (i, bone) in skeleton.bones().iter().enumerate() {
            let w = op.apply(a.bone_weight(i), b.bone_weight(i)).clamp(0.0, 1.0);
            if (w - mask.default_weight).abs() > f32::EPSILON {
                mask.entries.push(BoneWeight {
                    bone: bone.name.clone(),
                    weight: w,
                    include_children: false,
                });
            }
        }
        mask.rebuild(skeleton);
        mask
    }

    // ========================================================================
    // Presets
    // ========================================================================

    /// Builds a preset by matching common bone-name keywords.
    #[must_use]
    pub fn from_preset(preset: MaskPreset, skeleton: &Skeleton) -> Self {
        let mut mask = Self::new(preset.name());
        match preset {
            MaskPreset::FullBody => mask.default_weight = 1.0,
            MaskPreset::UpperBody => mask.add_matching(skeleton, &["spine", "chest", "torso"], None, true),
            MaskPreset::LowerBody => {
                if let Some(root) = skeleton.root_bones().next() {
                    let name = skeleton.bones()[root].name.clone();
                    mask.add_bone(&name, 1.0, false);
                }
                mask.add_matching(skeleton, &["pelvis", "hip", "thigh", "upleg", "leg"], None, true);
            }
            MaskPreset::LeftArm => {
                mask.add_matching(skeleton, &["shoulder", "clavicle", "upperarm", "arm"], Some(Side::Left), true);
            }
            MaskPreset::RightArm => {
                mask.add_matching(skeleton, &["shoulder", "clavicle", "upperarm", "arm"], Some(Side::Right), true);
            }
            MaskPreset::Head => mask.add_matching(skeleton, &["neck", "head"], None, true),
            MaskPreset::Spine => mask.add_matching(skeleton, &["spine", "chest"], None, false),
        }
        mask.rebuild(skeleton);
        mask
    }

    /// Adds an entry for every non-root bone whose name contains one of `keywords`.
    /// Roots are skipped so a root named `Hips` doesn't drag the whole rig in.
    /// With `include_children`, bones already covered by a matching ancestor are skipped.
    fn add_matching(&mut self, skeleton: &Skeleton, keywords: &[&str], side: Option<Side>, include_children: bool) {
        let mut covered = vec![false; skeleton.bone_count()];
        for (i, bone) in skeleton.bones().iter().enumerate() {
            if covered[i] || bone.parent.is_none() {
                continue;
            }
            let lower = bone.name.to_ascii_lowercase();
            let matches = keywords.iter().any(|k| lower.contains(k))
                && side.is_none_or(|s| bone_side(&bone.name) == Some(s));
            if !matches {
                continue;
            }

            self.add_bone(&bone.name, 1.0, include_children);
            if include_children {
                for d in skeleton.descendants_of(i) {
                    covered[d] = true;
                }
            }
        }
    }
}

fn bone_side(name: &str) -> Option<Side> {
    let lower = name.to_ascii_lowercase();
    let marked = |full: &str, c: char| {
        lower.contains(full)
            || lower.ends_with(&format!("_{c}"))
            || lower.ends_with(&format!(".{c}"))
            || lower.starts_with(&format!("{c}_"))
    };
    if marked("left", 'l') {
        Some(Side::Left)
    } else if marked("right", 'r') {
        Some(Side::Right)
    } else {
        None
    }
}

/// Swaps the side marker in a bone name; `None` if the name has no side.
#[must_use]
pub fn mirror_bone_name(name: &str) -> Option<String> {
    const PAIRS: [(&str, &str); 6] = [
        ("Left", "Right"),
        ("left", "right"),
        ("_L", "_R"),
        ("_l", "_r"),
        (".L", ".R"),
        (".l", ".r"),
    ];

    for (a, b) in PAIRS {
        if name.contains(a) {
            return Some(name.replacen(a, b, 1));
        }
        if name.contains(b) {
            return Some(name.replacen(b, a, 1));
        }
    }

    for (a, b) in [("L_", "R_"), ("l_", "r_")] {
        if let Some(rest) = name.strip_prefix(a) {
            return Some(format!("{b}{rest}"));
        }
        if let Some(rest) = name.strip_prefix(b) {
            return Some(format!("{a}{rest}"));
        }
    }
    None
}

// ============================================================================
// Library
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MaskLibraryFile {
    masks: Vec<BlendMask>,
}

/// Named collection of masks shared by layers and blend trees.
#[derive(Debug, Clone, Default)]
pub struct BlendMaskLibrary {
    masks: FxHashMap<String, BlendMask>,
}

impl BlendMaskLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Library holding every [`MaskPreset`] built for `skeleton`.
    #[must_use]
    pub fn with_presets(skeleton: &Skeleton) -> Self {
        let mut library = Self::new();
        for preset in MaskPreset::ALL {
            library.add(BlendMask::from_preset(preset, skeleton));
        }
        library
    }

    pub fn add(&mut self, mask: BlendMask) {
        self.masks.insert(mask.name.clone(), mask);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BlendMask> {
        self.masks.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut BlendMask> {
        self.masks.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<BlendMask> {
        self.masks.remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.masks.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.masks.keys().map(String::as_str)
    }

    /// Rebuilds every mask against `skeleton`.
    pub fn rebuild_all(&mut self, skeleton: &Skeleton) {
        for mask in self.masks.values_mut() {
            mask.rebuild(skeleton);
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let mut masks: Vec<BlendMask> = self.masks.values().cloned().collect();
        masks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(serde_json::to_string_pretty(&MaskLibraryFile { masks })?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: MaskLibraryFile = serde_json::from_str(json)?;
        let mut library = Self::new();
        for mask in file.masks {
            library.add(mask);
        }
        Ok(library)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_names() {
        assert_eq!(mirror_bone_name("hand_L").as_deref(), Some("hand_R"));
        assert_eq!(mirror_bone_name("RightFoot").as_deref(), Some("LeftFoot"));
        assert_eq!(mirror_bone_name("l_thigh").as_deref(), Some("r_thigh"));
        assert_eq!(mirror_bone_name("spine"), None);
    }

    #[test]
    fn sides() {
        assert_eq!(bone_side("shoulder_L"), Some(Side::Left));
        assert_eq!(bone_side("RightArm"), Some(Side::Right));
        assert_eq!(bone_side("spine"), None);
    }

    #[test]
    fn combine_ops() {
        assert_eq!(MaskCombine::Multiply.apply(0.5, 0.5), 0.25);
        assert_eq!(MaskCombine::Add.apply(0.7, 0.7), 1.0);
        assert_eq!(MaskCombine::Max.apply(0.2, 0.7), 0.7);
        assert_eq!(MaskCombine::Min.apply(0.2, 0.7), 0.2);
    }
}
