use glam::{Mat4, Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::interpolation::{Interpolatable, normalize_or_identity};
use crate::pose::BoneTransform;

/// A time-stamped local transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    pub time: f32,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Keyframe {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Keyframe {
    pub const IDENTITY: Self = Self {
        time: 0.0,
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[must_use]
    pub fn new(time: f32, position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            time,
            position,
            rotation,
            scale,
        }
    }

    #[must_use]
    pub fn from_transform(time: f32, transform: BoneTransform) -> Self {
        Self::new(time, transform.position, transform.rotation, transform.scale)
    }

    #[must_use]
    pub fn transform(&self) -> BoneTransform {
        BoneTransform::new(self.position, self.rotation, self.scale)
    }

    /// Local TRS matrix of this keyframe.
    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationMode {
    Step,
    #[default]
    Linear,
    /// Non-uniform Catmull-Rom through the keyframes, tangents taken from neighbours.
    CatmullRom,
}

const MAX_SCAN_OFFSET: usize = 3;

/// Remembers the last bracketing keyframe so sequential playback samples in O(1).
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyframeCursor {
    pub last_index: usize,
}

/// Keyframe sequence for one bone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationChannel {
    pub bone_name: String,
    keyframes: Vec<Keyframe>,
    #[serde(default)]
    pub interpolation: InterpolationMode,
}

impl AnimationChannel {
    /// Creates a channel; keyframes are sorted by time (stable).
    #[must_use]
    pub fn new(bone_name: impl Into<String>, mut keyframes: Vec<Keyframe>) -> Self {
        keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            bone_name: bone_name.into(),
            keyframes,
            interpolation: InterpolationMode::Linear,
        }
    }

    #[must_use]
    pub fn with_interpolation(mut self, mode: InterpolationMode) -> Self {
        self.interpolation = mode;
        self
    }

    #[must_use]
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    /// Time of the last keyframe, 0 for an empty channel.
    #[must_use]
    pub fn end_time(&self) -> f32 {
        self.keyframes.last().map_or(0.0, |k| k.time)
    }

    /// Inserts a keyframe keeping the sequence sorted; later duplicates go after earlier ones.
    pub fn insert(&mut self, keyframe: Keyframe) {
        let idx = self.keyframes.partition_point(|k| k.time <= keyframe.time);
        self.keyframes.insert(idx, keyframe);
    }

    /// Re-sorts after deserialization, which bypasses [`AnimationChannel::new`].
    pub(crate) fn normalize(&mut self) {
        self.keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    /// Samples the channel at `time`, clamping outside the keyframe range.
    /// When keys share a timestamp the later one wins from that time on.
    #[must_use]
    pub fn interpolate(&self, time: f32) -> Keyframe {
        match self.keyframes.len() {
            0 => return Keyframe { time, ..Keyframe::IDENTITY },
            1 => return self.keyframes[0],
            _ => {}
        }

        // First index with t > time, i.e. next keyframe
        let next_idx = self.keyframes.partition_point(|k| k.time <= time);
        let idx = next_idx.saturating_sub(1);
        self.sample_at_frame(idx, time)
    }

    /// Same result as [`AnimationChannel::interpolate`], but reuses `cursor` to avoid
    /// a binary search when playback moves a few keyframes at a time.
    pub fn interpolate_with_cursor(&self, time: f32, cursor: &mut KeyframeCursor) -> Keyframe {
        let len = self.keyframes.len();
        match len {
            0 => return Keyframe { time, ..Keyframe::IDENTITY },
            1 => return self.keyframes[0],
            _ => {}
        }

        let i = cursor.last_index.min(len - 1);
        let t_curr = self.keyframes[i].time;

        let found = if time >= t_curr {
            // Forward: check [i, i+1), [i+1, i+2), ...
            let mut res = None;
            for offset in 0..=MAX_SCAN_OFFSET {
                let idx = i + offset;
                if idx >= len - 1 {
                    if time >= self.keyframes[len - 1].time {
                        res = Some(len - 1);
                    }
                    break;
                }
                if time < self.keyframes[idx + 1].time {
                    res = Some(idx);
                    break;
                }
            }
            res
        } else {
            // Backward: time < times[i], scan left for the first frame not after it
            let mut res = None;
            for offset in 1..=MAX_SCAN_OFFSET {
                if i < offset {
                    break;
                }
                let idx = i - offset;
                if time >= self.keyframes[idx].time {
                    res = Some(idx);
                    break;
                }
            }
            res
        };

        let index = found.unwrap_or_else(|| {
            self.keyframes
                .partition_point(|k| k.time <= time)
                .saturating_sub(1)
        });

        // Equal timestamps: the binary search lands on the last of a run, match it
        let index = self.last_of_run(index);
        cursor.last_index = index;
        self.sample_at_frame(index, time)
    }

    fn last_of_run(&self, mut index: usize) -> usize {
        while index + 1 < self.keyframes.len() && self.keyframes[index + 1].time <= self.keyframes[index].time {
            index += 1;
        }
        index
    }

    fn sample_at_frame(&self, index: usize, time: f32) -> Keyframe {
        let len = self.keyframes.len();
        if index >= len - 1 {
            return self.keyframes[len - 1];
        }
        let k0 = &self.keyframes[index];
        if time <= k0.time {
            return *k0;
        }

        let next = index + 1;
        let k1 = &self.keyframes[next];
        let dt = k1.time - k0.time;

        let t = if dt > 1e-6 { (time - k0.time) / dt } else { 0.0 };
        let t = t.clamp(0.0, 1.0);

        match self.interpolation {
            InterpolationMode::Step => Keyframe { time, ..*k0 },
            InterpolationMode::Linear => Keyframe {
                time,
                position: Vec3::interpolate_linear(k0.position, k1.position, t),
                rotation: Quat::interpolate_linear(k0.rotation, k1.rotation, t),
                scale: Vec3::interpolate_linear(k0.scale, k1.scale, t),
            },
            InterpolationMode::CatmullRom => self.sample_catmull_rom(index, t, dt, time),
        }
    }

    fn sample_catmull_rom(&self, index: usize, t: f32, dt: f32, time: f32) -> Keyframe {
        let k0 = &self.keyframes[index];
        let k1 = &self.keyframes[index + 1];
        let before = if index > 0 { &self.keyframes[index - 1] } else { k0 };
        let after = self.keyframes.get(index + 2).unwrap_or(k1);

        let slope = |a: &Keyframe, b: &Keyframe| {
            let span = b.time - a.time;
            if span > 1e-6 { 1.0 / span } else { 0.0 }
        };
        let s0 = slope(before, k1);
        let s1 = slope(k0, after);

        let position = Vec3::interpolate_cubic(
            k0.position,
            (k1.position - before.position) * s0,
            (after.position - k0.position) * s1,
            k1.position,
            t,
            dt,
        );
        let scale = Vec3::interpolate_cubic(
            k0.scale,
            (k1.scale - before.scale) * s0,
            (after.scale - k0.scale) * s1,
            k1.scale,
            t,
            dt,
        );

        // Quaternion tangents in coefficient space, aligned to the k0 hemisphere
        let q0 = k0.rotation;
        let align = |q: Quat| if q0.dot(q) < 0.0 { -q } else { q };
        let (qb, q1, qa) = (align(before.rotation), align(k1.rotation), align(after.rotation));
        let m0 = Quat::from_vec4((Vec4::from(q1) - Vec4::from(qb)) * s0);
        let m1 = Quat::from_vec4((Vec4::from(qa) - Vec4::from(q0)) * s1);
        let rotation = normalize_or_identity(Quat::interpolate_cubic(q0, m0, m1, q1, t, dt));

        Keyframe {
            time,
            position,
            rotation,
            scale,
        }
    }
}
