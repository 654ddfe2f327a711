use std::sync::Arc;

use glam::Mat4;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::keyframe::{AnimationChannel, KeyframeCursor};
use crate::pose::{AnimationPose, BoneTransform};
use crate::skeleton::Skeleton;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnimationData {
    name: String,
    #[serde(default = "default_ticks_per_second")]
    ticks_per_second: f32,
    #[serde(default = "default_true")]
    looping: bool,
    #[serde(default)]
    channels: Vec<AnimationChannel>,
}

fn default_ticks_per_second() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

/// A named clip: per-bone keyframe channels.
///
/// Keyframe times are in ticks; every public time parameter is in seconds.
/// With the default `ticks_per_second` of 1 the two coincide.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "AnimationData", into = "AnimationData")]
pub struct Animation {
    name: String,
    duration_ticks: f32,
    ticks_per_second: f32,
    looping: bool,
    channels: Vec<AnimationChannel>,
    channel_index: FxHashMap<String, usize>,
}

impl From<AnimationData> for Animation {
    fn from(data: AnimationData) -> Self {
        let mut channels = data.channels;
        for channel in &mut channels {
            channel.normalize();
        }
        Self::new(data.name, channels)
            .with_ticks_per_second(data.ticks_per_second)
            .with_looping(data.looping)
    }
}

impl From<Animation> for AnimationData {
    fn from(animation: Animation) -> Self {
        Self {
            name: animation.name,
            ticks_per_second: animation.ticks_per_second,
            looping: animation.looping,
            channels: animation.channels,
        }
    }
}

impl Animation {
    /// Creates a clip. Duration is the last keyframe time over all channels;
    /// a later channel for an already-present bone replaces the earlier one.
    #[must_use]
    pub fn new(name: impl Into<String>, channels: Vec<AnimationChannel>) -> Self {
        let mut deduped: Vec<AnimationChannel> = Vec::with_capacity(channels.len());
        let mut channel_index = FxHashMap::default();
        for channel in channels {
            if let Some(&existing) = channel_index.get(&channel.bone_name) {
                deduped[existing] = channel;
            } else {
                channel_index.insert(channel.bone_name.clone(), deduped.len());
                deduped.push(channel);
            }
        }

        let duration_ticks = deduped
            .iter()
            .map(AnimationChannel::end_time)
            .fold(0.0_f32, f32::max);

        Self {
            name: name.into(),
            duration_ticks,
            ticks_per_second: 1.0,
            looping: true,
            channels: deduped,
            channel_index,
        }
    }

    #[must_use]
    pub fn with_ticks_per_second(mut self, ticks_per_second: f32) -> Self {
        self.ticks_per_second = if ticks_per_second > 0.0 { ticks_per_second } else { 1.0 };
        self
    }

    #[must_use]
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Duration in seconds.
    #[inline]
    #[must_use]
    pub fn duration(&self) -> f32 {
        self.duration_ticks / self.ticks_per_second
    }

    /// Overrides the duration (seconds), e.g. to trim trailing hold frames.
    pub fn set_duration(&mut self, seconds: f32) {
        self.duration_ticks = seconds.max(0.0) * self.ticks_per_second;
    }

    #[inline]
    #[must_use]
    pub fn ticks_per_second(&self) -> f32 {
        self.ticks_per_second
    }

    #[inline]
    #[must_use]
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    #[inline]
    #[must_use]
    pub fn channels(&self) -> &[AnimationChannel] {
        &self.channels
    }

    #[must_use]
    pub fn channel(&self, bone_name: &str) -> Option<&AnimationChannel> {
        self.channel_index.get(bone_name).map(|&i| &self.channels[i])
    }

    #[inline]
    fn ticks(&self, seconds: f32) -> f32 {
        seconds * self.ticks_per_second
    }

    /// Local matrices for every animated bone at `time` seconds.
    #[must_use]
    pub fn evaluate(&self, time: f32) -> FxHashMap<String, Mat4> {
        let ticks = self.ticks(time);
        self.channels
            .iter()
            .map(|c| (c.bone_name.clone(), c.interpolate(ticks).to_matrix()))
            .collect()
    }

    /// Same as [`Animation::evaluate`] but keeps the decomposed transforms.
    #[must_use]
    pub fn evaluate_transforms(&self, time: f32) -> FxHashMap<String, BoneTransform> {
        let ticks = self.ticks(time);
        self.channels
            .iter()
            .map(|c| (c.bone_name.clone(), c.interpolate(ticks).transform()))
            .collect()
    }

    /// Samples into an indexed pose. Bones without a channel keep their bind transform.
    #[must_use]
    pub fn sample_pose(&self, skeleton: &Skeleton, time: f32) -> AnimationPose {
        let mut pose = skeleton.bind_pose();
        let ticks = self.ticks(time);
        for channel in &self.channels {
            if let Some(index) = skeleton.bone_index(&channel.bone_name) {
                pose.set(index, channel.interpolate(ticks).transform());
            }
        }
        pose
    }

    /// Cursor-accelerated variant of [`Animation::sample_pose`] writing into `out`.
    ///
    /// `cursors` is resized to the channel count on first use.
    pub fn sample_pose_into(
        &self,
        skeleton: &Skeleton,
        time: f32,
        cursors: &mut Vec<KeyframeCursor>,
        out: &mut AnimationPose,
    ) {
        out.resize(skeleton.bone_count());
        for (i, bone) in skeleton.bones().iter().enumerate() {
            out.set(i, bone.local_transform);
        }
        self.sample_channels_into(skeleton, time, cursors, out);
    }

    /// Samples the clip as a delta pose: bones without a channel are
    /// identity, so layering the result additively leaves them untouched.
    pub fn sample_delta_pose_into(
        &self,
        skeleton: &Skeleton,
        time: f32,
        cursors: &mut Vec<KeyframeCursor>,
        out: &mut AnimationPose,
    ) {
        out.resize(skeleton.bone_count());
        out.reset();
        self.sample_channels_into(skeleton, time, cursors, out);
    }

    fn sample_channels_into(
        &self,
        skeleton: &Skeleton,
        time: f32,
        cursors: &mut Vec<KeyframeCursor>,
        out: &mut AnimationPose,
    ) {
        if cursors.len() != self.channels.len() {
            cursors.clear();
            cursors.resize(self.channels.len(), KeyframeCursor::default());
        }
        out.root_motion_delta = glam::Vec3::ZERO;
        out.root_motion_rotation = glam::Quat::IDENTITY;

        let ticks = self.ticks(time);
        for (channel, cursor) in self.channels.iter().zip(cursors.iter_mut()) {
            if let Some(index) = skeleton.bone_index(&channel.bone_name) {
                out.set(index, channel.interpolate_with_cursor(ticks, cursor).transform());
            }
        }
    }
}

/// Wraps `time` into `[0, period)` for a positive `period`. The flag is set
/// when `time` was outside that range, however many periods away.
pub(crate) fn wrap_time(time: f32, period: f32) -> (f32, bool) {
    if (0.0..period).contains(&time) {
        return (time, false);
    }
    let wrapped = time.rem_euclid(period);
    // rem_euclid rounds tiny negative inputs up to `period`
    (if wrapped >= period { 0.0 } else { wrapped }, true)
}

// ============================================================================
// Library
// ============================================================================

/// Named registry of shared, immutable clips.
#[derive(Debug, Clone, Default)]
pub struct AnimationLibrary {
    clips: FxHashMap<String, Arc<Animation>>,
}

impl AnimationLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `animation` under its own name, replacing any previous clip.
    pub fn add(&mut self, animation: Animation) -> Arc<Animation> {
        let clip = Arc::new(animation);
        self.insert(Arc::clone(&clip));
        clip
    }

    pub fn insert(&mut self, clip: Arc<Animation>) {
        if self.clips.insert(clip.name().to_string(), Arc::clone(&clip)).is_some() {
            log::debug!("Replaced animation clip '{}'", clip.name());
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Animation>> {
        self.clips.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.clips.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Animation>> {
        self.clips.remove(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clips.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Animation>> {
        self.clips.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyframe::Keyframe;
    use glam::{Quat, Vec3};

    fn clip() -> Animation {
        Animation::new(
            "slide",
            vec![
                AnimationChannel::new(
                    "a",
                    vec![
                        Keyframe::new(0.0, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE),
                        Keyframe::new(2.0, Vec3::X * 2.0, Quat::IDENTITY, Vec3::ONE),
                    ],
                ),
                AnimationChannel::new("b", vec![Keyframe::new(3.0, Vec3::Y, Quat::IDENTITY, Vec3::ONE)]),
            ],
        )
    }

    #[test]
    fn duration_is_last_keyframe_over_all_channels() {
        assert_eq!(clip().duration(), 3.0);
        assert_eq!(clip().with_ticks_per_second(30.0).duration(), 0.1);
    }

    #[test]
    fn json_roundtrip_rebuilds_index() {
        let json = serde_json::to_string(&clip()).unwrap();
        let back: Animation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name(), "slide");
        assert!(back.channel("b").is_some());
        assert_eq!(back.duration(), 3.0);
    }

    #[test]
    fn wrap_time_handles_huge_and_negative_steps() {
        assert_eq!(wrap_time(0.5, 1.0), (0.5, false));
        assert_eq!(wrap_time(1.0e9, 1.0), (0.0, true));
        let (time, wrapped) = wrap_time(-7.25, 1.0);
        assert!(wrapped);
        assert!((time - 0.75).abs() < 1e-6);
        let (time, _) = wrap_time(-1.0e-9, 1.0);
        assert!((0.0..1.0).contains(&time));
    }

    #[test]
    fn delta_sampling_leaves_unanimated_bones_identity() {
        let mut builder = crate::skeleton::SkeletonBuilder::new();
        builder
            .add_bone("a", "", Mat4::IDENTITY, Mat4::IDENTITY)
            .add_bone("c", "a", Mat4::IDENTITY, Mat4::from_translation(Vec3::Y));
        let skeleton = builder.build();

        let mut cursors = Vec::new();
        let mut pose = AnimationPose::default();
        clip().sample_pose_into(&skeleton, 1.0, &mut cursors, &mut pose);
        assert!((pose.get(1).position - Vec3::Y).length() < 1e-6);

        clip().sample_delta_pose_into(&skeleton, 1.0, &mut cursors, &mut pose);
        assert!((pose.get(0).position.x - 1.0).abs() < 1e-6);
        assert!(pose.get(1).position.length() < 1e-6);
    }

    #[test]
    fn library_shares_clips() {
        let mut library = AnimationLibrary::new();
        let a = library.add(clip());
        let b = library.get("slide");
        assert!(b.is_some_and(|b| Arc::ptr_eq(&a, &b)));
    }
}
