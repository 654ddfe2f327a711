use glam::Vec2;
use rustc_hash::FxHashMap;

use super::{AdditiveReferenceDesc, Blend1DEntryDesc, Blend2DPointDesc, BlendNodeDesc, BlendTreeDesc};
use crate::delaunay::WeightMode;

/// Ready-made tree descriptions for common setups.
pub struct BlendTreeTemplates;

impl BlendTreeTemplates {
    /// Direction names accepted by [`BlendTreeTemplates::strafe_8way`] and their positions.
    pub const STRAFE_DIRECTIONS: [(&'static str, Vec2); 8] = [
        ("forward", Vec2::new(0.0, 1.0)),
        ("forward_right", Vec2::new(0.707, 0.707)),
        ("right", Vec2::new(1.0, 0.0)),
        ("backward_right", Vec2::new(0.707, -0.707)),
        ("backward", Vec2::new(0.0, -1.0)),
        ("backward_left", Vec2::new(-0.707, -0.707)),
        ("left", Vec2::new(-1.0, 0.0)),
        ("forward_left", Vec2::new(-0.707, 0.707)),
    ];

    /// Idle, walk and run at speed thresholds 0, 0.5 and 1.
    #[must_use]
    pub fn locomotion_1d(idle: &str, walk: &str, run: &str, speed_parameter: &str) -> BlendTreeDesc {
        let entries = [(idle, 0.0), (walk, 0.5), (run, 1.0)]
            .into_iter()
            .map(|(clip, threshold)| Blend1DEntryDesc {
                node: BlendNodeDesc::clip(clip),
                threshold,
                speed: 1.0,
            })
            .collect();

        BlendTreeDesc {
            name: "locomotion_1d".to_string(),
            parameters: [(speed_parameter.to_string(), 0.0)].into(),
            root: BlendNodeDesc::Blend1D {
                name: "locomotion".to_string(),
                parameter: speed_parameter.to_string(),
                sync: true,
                bounds: None,
                entries,
            },
        }
    }

    /// Four cardinal directions, triangulated.
    #[must_use]
    pub fn directional_2d(
        forward: &str,
        backward: &str,
        left: &str,
        right: &str,
        x_parameter: &str,
        y_parameter: &str,
    ) -> BlendTreeDesc {
        let points = [
            (forward, Vec2::new(0.0, 1.0)),
            (backward, Vec2::new(0.0, -1.0)),
            (left, Vec2::new(-1.0, 0.0)),
            (right, Vec2::new(1.0, 0.0)),
        ];
        Self::blend_2d("directional_2d", &points, x_parameter, y_parameter, WeightMode::Barycentric)
    }

    /// Up to eight directions keyed by [`BlendTreeTemplates::STRAFE_DIRECTIONS`] names,
    /// weighted by inverse distance. Directions without a clip are left out.
    #[must_use]
    pub fn strafe_8way(clips: &FxHashMap<String, String>, x_parameter: &str, y_parameter: &str) -> BlendTreeDesc {
        let points: Vec<(&str, Vec2)> = Self::STRAFE_DIRECTIONS
            .iter()
            .filter_map(|(direction, position)| clips.get(*direction).map(|clip| (clip.as_str(), *position)))
            .collect();
        Self::blend_2d("strafe_8way", &points, x_parameter, y_parameter, WeightMode::InverseDistance)
    }

    /// Left/neutral/right leans at -1, 0 and 1 layered additively over
    /// `neutral`, relative to the neutral pose.
    #[must_use]
    pub fn additive_lean(neutral: &str, lean_left: &str, lean_right: &str, lean_parameter: &str) -> BlendTreeDesc {
        let entries = [(lean_left, -1.0), (neutral, 0.0), (lean_right, 1.0)]
            .into_iter()
            .map(|(clip, threshold)| Blend1DEntryDesc {
                node: BlendNodeDesc::clip(clip),
                threshold,
                speed: 1.0,
            })
            .collect();

        BlendTreeDesc {
            name: "additive_lean".to_string(),
            parameters: [(lean_parameter.to_string(), 0.0)].into(),
            root: BlendNodeDesc::Additive {
                name: "lean".to_string(),
                base: Box::new(BlendNodeDesc::clip(neutral)),
                additive: Box::new(BlendNodeDesc::Blend1D {
                    name: "lean_amount".to_string(),
                    parameter: lean_parameter.to_string(),
                    sync: true,
                    bounds: None,
                    entries,
                }),
                weight: 1.0,
                weight_parameter: None,
                reference: Some(AdditiveReferenceDesc::Clip {
                    clip: neutral.to_string(),
                    time: 0.0,
                }),
            },
        }
    }

    fn blend_2d(name: &str, points: &[(&str, Vec2)], x: &str, y: &str, mode: WeightMode) -> BlendTreeDesc {
        BlendTreeDesc {
            name: name.to_string(),
            parameters: [(x.to_string(), 0.0), (y.to_string(), 0.0)].into(),
            root: BlendNodeDesc::Blend2D {
                name: name.to_string(),
                parameter_x: x.to_string(),
                parameter_y: y.to_string(),
                mode,
                sync: true,
                bounds: None,
                points: points
                    .iter()
                    .map(|(clip, position)| Blend2DPointDesc {
                        node: BlendNodeDesc::clip(*clip),
                        position: *position,
                        speed: 1.0,
                    })
                    .collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend_tree::test_support::hold;
    use crate::blend_tree::BlendTree;
    use crate::clip::AnimationLibrary;
    use crate::mask::BlendMaskLibrary;

    #[test]
    fn locomotion_template_builds() {
        let mut clips = AnimationLibrary::new();
        for name in ["idle", "walk", "run"] {
            clips.insert(hold(name, 0.0, 1.0));
        }
        let desc = BlendTreeTemplates::locomotion_1d("idle", "walk", "run", "speed");
        let tree = BlendTree::from_desc(&desc, &clips, &BlendMaskLibrary::new()).unwrap();
        assert_eq!(tree.parameter("speed"), Some(0.0));
    }

    #[test]
    fn strafe_skips_missing_directions() {
        let clips: FxHashMap<String, String> = [("forward", "run_f"), ("left", "run_l"), ("right", "run_r")]
            .into_iter()
            .map(|(d, c)| (d.to_string(), c.to_string()))
            .collect();
        let desc = BlendTreeTemplates::strafe_8way(&clips, "x", "y");
        let BlendNodeDesc::Blend2D { points, mode, .. } = desc.root else {
            panic!("expected a 2D node");
        };
        assert_eq!(points.len(), 3);
        assert_eq!(mode, WeightMode::InverseDistance);
    }
}
