use super::{BlendNode, BlendNodeDesc, EvalContext, SelectorStateDesc};
use crate::interpolation::smoothstep;
use crate::pose::AnimationPose;

/// Picks one of several named subtrees, cross-blending on switches.
#[derive(Debug, Clone)]
pub struct StateSelectorNode {
    name: String,
    states: Vec<(String, Box<dyn BlendNode>)>,
    current: Option<String>,
    previous: Option<String>,
    blend_time: f32,
    blend_progress: f32,
}

impl StateSelectorNode {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            current: None,
            previous: None,
            blend_time: 0.0,
            blend_progress: 1.0,
        }
    }

    #[must_use]
    pub fn with_state(mut self, name: impl Into<String>, node: Box<dyn BlendNode>) -> Self {
        self.add_state(name, node);
        self
    }

    /// Adds or replaces a state. The first state added becomes current.
    pub fn add_state(&mut self, name: impl Into<String>, node: Box<dyn BlendNode>) {
        let name = name.into();
        if let Some(slot) = self.states.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = node;
        } else {
            if self.current.is_none() {
                self.current = Some(name.clone());
            }
            self.states.push((name, node));
        }
    }

    pub fn remove_state(&mut self, name: &str) -> Option<Box<dyn BlendNode>> {
        let index = self.index_of(name)?;
        let (_, node) = self.states.remove(index);

        if self.previous.as_deref() == Some(name) {
            self.previous = None;
            self.blend_progress = 1.0;
        }
        if self.current.as_deref() == Some(name) {
            self.current = self.states.first().map(|(n, _)| n.clone());
            self.previous = None;
            self.blend_progress = 1.0;
        }
        Some(node)
    }

    /// Starts a cross-blend to `name`. Unknown names and the current state
    /// are ignored; `blend_time <= 0` switches immediately.
    pub fn set_current_state(&mut self, name: &str, blend_time: f32) {
        if self.index_of(name).is_none() {
            log::warn!("State selector '{}': unknown state '{name}'", self.name);
            return;
        }
        if self.current.as_deref() == Some(name) {
            return;
        }

        if blend_time <= 0.0 || self.current.is_none() {
            self.previous = None;
            self.blend_progress = 1.0;
        } else {
            self.previous = self.current.take();
            self.blend_progress = 0.0;
        }
        self.current = Some(name.to_string());
        self.blend_time = blend_time;
    }

    #[must_use]
    pub fn current_state(&self) -> Option<&str> {
        self.current.as_deref()
    }

    #[must_use]
    pub fn previous_state(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    #[must_use]
    pub fn is_blending(&self) -> bool {
        self.previous.is_some() && self.blend_progress < 1.0
    }

    #[must_use]
    pub fn blend_progress(&self) -> f32 {
        self.blend_progress
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|(n, _)| n.as_str())
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|(n, _)| n == name)
    }

    fn current_index(&self) -> Option<usize> {
        self.current.as_deref().and_then(|n| self.index_of(n))
    }
}

impl BlendNode for StateSelectorNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>, dt: f32) -> AnimationPose {
        let Some(current) = self.current_index() else {
            return ctx.identity_pose();
        };

        let previous = self.previous.as_deref().and_then(|n| self.index_of(n));
        if let Some(previous) = previous
            && self.blend_progress < 1.0
        {
            self.blend_progress = (self.blend_progress + dt / self.blend_time).min(1.0);
            let from = self.states[previous].1.evaluate(ctx, dt);
            let to = self.states[current].1.evaluate(ctx, dt);
            if self.blend_progress >= 1.0 {
                self.previous = None;
            }
            return AnimationPose::blend(&from, &to, smoothstep(self.blend_progress));
        }

        self.states[current].1.evaluate(ctx, dt)
    }

    fn set_parameter(&mut self, name: &str, value: f32) {
        for (_, node) in &mut self.states {
            node.set_parameter(name, value);
        }
    }

    fn reset(&mut self) {
        for (_, node) in &mut self.states {
            node.reset();
        }
        self.previous = None;
        self.blend_progress = 1.0;
    }

    fn clone_node(&self) -> Box<dyn BlendNode> {
        let mut clone = self.clone();
        clone.reset();
        Box::new(clone)
    }

    fn duration(&self) -> f32 {
        self.current_index().map_or(0.0, |i| self.states[i].1.duration())
    }

    fn normalized_time(&self) -> f32 {
        self.current_index()
            .map_or(0.0, |i| self.states[i].1.normalized_time())
    }

    fn set_normalized_time(&mut self, normalized: f32) {
        if let Some(i) = self.current_index() {
            self.states[i].1.set_normalized_time(normalized);
        }
    }

    fn parameter_names(&self, out: &mut Vec<String>) {
        for (_, node) in &self.states {
            node.parameter_names(out);
        }
    }

    fn describe(&self) -> BlendNodeDesc {
        BlendNodeDesc::StateSelector {
            name: self.name.clone(),
            states: self
                .states
                .iter()
                .map(|(name, node)| SelectorStateDesc {
                    name: name.clone(),
                    node: node.describe(),
                })
                .collect(),
            initial: self.current.clone(),
        }
    }
}
