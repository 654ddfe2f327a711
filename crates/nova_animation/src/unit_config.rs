//! Per-Unit Animation Setup
//!
//! [`UnitAnimationConfig`] bundles what a unit type needs to animate: the
//! state machine, an optional locomotion blend tree, the mask names its
//! layers refer to, blend timings and a mapping from logical animation ids
//! to clip names. Unit variants can inherit from a base configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::blend_tree::{BlendTree, BlendTreeDesc};
use crate::clip::AnimationLibrary;
use crate::controller::AnimationController;
use crate::errors::Result;
use crate::mask::{BlendMask, BlendMaskLibrary, MaskCombine, MaskPreset};
use crate::skeleton::Skeleton;
use crate::state_machine::{DataDrivenStateMachine, StateMachineConfig};

/// Library names of the masks a unit's layers use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnitMasks {
    pub upper_body: String,
    pub lower_body: String,
    pub full_body: String,
    pub head_only: String,
    pub hands_only: String,
}

impl Default for UnitMasks {
    fn default() -> Self {
        Self {
            upper_body: MaskPreset::UpperBody.name().to_string(),
            lower_body: MaskPreset::LowerBody.name().to_string(),
            full_body: MaskPreset::FullBody.name().to_string(),
            head_only: MaskPreset::Head.name().to_string(),
            hands_only: "hands".to_string(),
        }
    }
}

/// Blend speeds are weight units per second, times are seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnitTiming {
    pub locomotion_blend_speed: f32,
    pub combat_blend_speed: f32,
    pub transition_blend_time: f32,
    pub hit_reaction_duration: f32,
    pub stun_recovery_time: f32,
}

impl Default for UnitTiming {
    fn default() -> Self {
        Self {
            locomotion_blend_speed: 5.0,
            combat_blend_speed: 8.0,
            transition_blend_time: 0.2,
            hit_reaction_duration: 0.3,
            stun_recovery_time: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitAnimationConfig {
    #[serde(default)]
    pub id: String,
    /// Id of the configuration this one inherits from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub state_machine: StateMachineConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locomotion_blend_tree: Option<BlendTreeDesc>,
    #[serde(default)]
    pub masks: UnitMasks,
    #[serde(default)]
    pub timing: UnitTiming,
    /// Logical animation id (as used by states) to clip name.
    #[serde(default)]
    pub clip_mappings: BTreeMap<String, String>,
}

impl UnitAnimationConfig {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Clip played for a logical id. Unmapped ids are used as clip names.
    #[must_use]
    pub fn resolve_clip<'a>(&'a self, id: &'a str) -> &'a str {
        self.clip_mappings.get(id).map_or(id, String::as_str)
    }

    /// Fills whatever this configuration leaves unset from `base`: an empty
    /// state machine, a missing locomotion tree and clip mappings not
    /// overridden here.
    pub fn inherit_from(&mut self, base: &Self) {
        if self.state_machine.states.is_empty() {
            self.state_machine = base.state_machine.clone();
        }
        if self.locomotion_blend_tree.is_none() {
            self.locomotion_blend_tree.clone_from(&base.locomotion_blend_tree);
        }
        for (id, clip) in &base.clip_mappings {
            self.clip_mappings.entry(id.clone()).or_insert_with(|| clip.clone());
        }
    }

    /// State machine with clip ids resolved through the mappings, driving a
    /// controller over `clips`.
    ///
    /// States whose clip is missing from `clips` are kept; the controller
    /// ignores them with a warning when they are entered.
    #[must_use]
    pub fn build_state_machine(&self, clips: &AnimationLibrary) -> DataDrivenStateMachine {
        let mut config = self.state_machine.clone();
        let states = config
            .states
            .iter_mut()
            .chain(config.layers.iter_mut().flat_map(|l| l.states.iter_mut()));
        for state in states {
            if state.clip.is_empty() {
                continue;
            }
            let clip = self.resolve_clip(&state.clip).to_string();
            if !clips.contains(&clip) {
                log::warn!("Unit '{}': state '{}' uses unknown clip '{clip}'", self.id, state.name);
            }
            state.clip = clip;
        }

        DataDrivenStateMachine::from_config(config).with_controller(AnimationController::with_library(clips.clone()))
    }

    /// Body-part masks for `skeleton`, registered under the configured names.
    #[must_use]
    pub fn build_masks(&self, skeleton: &Skeleton) -> BlendMaskLibrary {
        let named = |preset: MaskPreset, name: &str| {
            let mut mask = BlendMask::from_preset(preset, skeleton);
            mask.name = name.to_string();
            mask
        };

        let mut library = BlendMaskLibrary::new();
        library.add(named(MaskPreset::UpperBody, &self.masks.upper_body));
        library.add(named(MaskPreset::LowerBody, &self.masks.lower_body));
        library.add(named(MaskPreset::FullBody, &self.masks.full_body));
        library.add(named(MaskPreset::Head, &self.masks.head_only));

        let left = BlendMask::from_preset(MaskPreset::LeftArm, skeleton);
        let right = BlendMask::from_preset(MaskPreset::RightArm, skeleton);
        let mut hands = left.combined(&right, MaskCombine::Max, skeleton);
        hands.name.clone_from(&self.masks.hands_only);
        library.add(hands);

        library
    }

    /// Builds the locomotion tree, if one is configured.
    pub fn build_locomotion_tree(&self, clips: &AnimationLibrary, masks: &BlendMaskLibrary) -> Result<Option<BlendTree>> {
        self.locomotion_blend_tree
            .as_ref()
            .map(|desc| BlendTree::from_desc(desc, clips, masks))
            .transpose()
    }
}
