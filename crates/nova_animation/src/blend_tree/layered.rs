use super::{BlendNode, BlendNodeDesc, EvalContext, LayerDesc, WEIGHT_THRESHOLD, push_unique};
use crate::mask::BlendMask;
use crate::pose::AnimationPose;

/// An overlay on top of a [`LayeredNode`]'s base.
#[derive(Debug, Clone)]
pub struct NodeLayer {
    pub node: Box<dyn BlendNode>,
    pub mask: Option<BlendMask>,
    pub weight: f32,
    pub weight_parameter: Option<String>,
    /// Adds the layer's pose as a delta instead of lerping towards it.
    pub additive: bool,
    pub enabled: bool,
}

impl NodeLayer {
    #[must_use]
    pub fn new(node: Box<dyn BlendNode>) -> Self {
        Self {
            node,
            mask: None,
            weight: 1.0,
            weight_parameter: None,
            additive: false,
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_mask(mut self, mask: BlendMask) -> Self {
        self.mask = Some(mask);
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_weight_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.weight_parameter = Some(parameter.into());
        self
    }

    #[must_use]
    pub fn with_additive(mut self, additive: bool) -> Self {
        self.additive = additive;
        self
    }
}

/// Base node plus overlays blended in order, each optionally masked.
#[derive(Debug, Clone)]
pub struct LayeredNode {
    name: String,
    base: Box<dyn BlendNode>,
    layers: Vec<NodeLayer>,
}

impl LayeredNode {
    #[must_use]
    pub fn new(name: impl Into<String>, base: Box<dyn BlendNode>) -> Self {
        Self {
            name: name.into(),
            base,
            layers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_layer(mut self, layer: NodeLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn add_layer(&mut self, layer: NodeLayer) {
        self.layers.push(layer);
    }

    pub fn remove_layer(&mut self, index: usize) -> Option<NodeLayer> {
        (index < self.layers.len()).then(|| self.layers.remove(index))
    }

    #[must_use]
    pub fn base(&self) -> &dyn BlendNode {
        self.base.as_ref()
    }

    #[must_use]
    pub fn layers(&self) -> &[NodeLayer] {
        &self.layers
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut NodeLayer> {
        self.layers.get_mut(index)
    }

    pub fn set_layer_weight(&mut self, index: usize, weight: f32) {
        if let Some(layer) = self.layers.get_mut(index) {
            layer.weight = weight;
        }
    }

    pub fn set_layer_enabled(&mut self, index: usize, enabled: bool) {
        if let Some(layer) = self.layers.get_mut(index) {
            layer.enabled = enabled;
        }
    }
}

impl BlendNode for LayeredNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>, dt: f32) -> AnimationPose {
        let mut result = self.base.evaluate(ctx, dt);

        for layer in &mut self.layers {
            if !layer.enabled || layer.weight <= WEIGHT_THRESHOLD {
                continue;
            }

            let pose = ctx.with_delta_sampling(layer.additive, |ctx| layer.node.evaluate(ctx, dt));
            if let Some(mask) = &mut layer.mask {
                mask.rebuild(ctx.skeleton);
            }
            let mask = layer.mask.as_ref();

            if layer.additive {
                result.additive_in_place(&pose, layer.weight, mask);
            } else {
                result.blend_in_place(&pose, layer.weight, mask);
            }
        }

        result
    }

    fn set_parameter(&mut self, name: &str, value: f32) {
        self.base.set_parameter(name, value);
        for layer in &mut self.layers {
            if layer.weight_parameter.as_deref() == Some(name) {
                layer.weight = value;
            }
            layer.node.set_parameter(name, value);
        }
    }

    fn reset(&mut self) {
        self.base.reset();
        for layer in &mut self.layers {
            layer.node.reset();
        }
    }

    fn clone_node(&self) -> Box<dyn BlendNode> {
        let mut clone = self.clone();
        clone.reset();
        Box::new(clone)
    }

    fn duration(&self) -> f32 {
        self.base.duration()
    }

    fn normalized_time(&self) -> f32 {
        self.base.normalized_time()
    }

    fn set_normalized_time(&mut self, normalized: f32) {
        self.base.set_normalized_time(normalized);
        for layer in &mut self.layers {
            layer.node.set_normalized_time(normalized);
        }
    }

    fn parameter_names(&self, out: &mut Vec<String>) {
        self.base.parameter_names(out);
        for layer in &self.layers {
            if let Some(parameter) = &layer.weight_parameter {
                push_unique(out, parameter);
            }
            layer.node.parameter_names(out);
        }
    }

    fn describe(&self) -> BlendNodeDesc {
        BlendNodeDesc::Layered {
            name: self.name.clone(),
            base: Box::new(self.base.describe()),
            layers: self
                .layers
                .iter()
                .map(|layer| LayerDesc {
                    node: layer.node.describe(),
                    mask: layer.mask.as_ref().map(|m| m.name.clone()),
                    weight: layer.weight,
                    weight_parameter: layer.weight_parameter.clone(),
                    additive: layer.additive,
                    enabled: layer.enabled,
                })
                .collect(),
        }
    }
}
