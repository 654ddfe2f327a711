use glam::Mat4;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::pose::{AnimationPose, BoneTransform};

/// One joint of a [`Skeleton`].
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    /// `None` for root bones. Always smaller than this bone's own index.
    pub parent: Option<usize>,
    /// Inverse of the bone's bind-pose global transform.
    pub offset_matrix: Mat4,
    /// Default (bind) local transform, used when a bone is not animated.
    pub local_transform: BoneTransform,
}

impl Bone {
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        self.local_transform.to_matrix()
    }
}

/// Caller-owned buffer of global transforms reused across evaluations.
///
/// Kept outside the [`Skeleton`] so the skeleton stays immutable while it is
/// evaluated; one scratch per evaluating thread.
#[derive(Debug, Clone, Default)]
pub struct SkeletonScratch {
    globals: Vec<Mat4>,
}

impl SkeletonScratch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(bone_count: usize) -> Self {
        Self {
            globals: Vec::with_capacity(bone_count),
        }
    }

    /// Global (model-space) transforms from the last propagation.
    #[must_use]
    pub fn globals(&self) -> &[Mat4] {
        &self.globals
    }

    fn prepare(&mut self, bone_count: usize) {
        self.globals.clear();
        self.globals.resize(bone_count, Mat4::IDENTITY);
    }
}

/// Bone hierarchy stored parent-first.
///
/// Topology is fixed at build time; see [`SkeletonBuilder`].
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
    name_to_index: FxHashMap<String, usize>,
    children: Vec<SmallVec<[usize; 4]>>,
    global_inverse_transform: Mat4,
}

impl Skeleton {
    #[inline]
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    #[inline]
    #[must_use]
    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    #[inline]
    #[must_use]
    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    #[must_use]
    pub fn bone_by_name(&self, name: &str) -> Option<&Bone> {
        self.bone_index(name).and_then(|i| self.bones.get(i))
    }

    #[inline]
    #[must_use]
    pub fn parent_index(&self, index: usize) -> Option<usize> {
        self.bones.get(index).and_then(|b| b.parent)
    }

    #[must_use]
    pub fn children_of(&self, index: usize) -> &[usize] {
        self.children.get(index).map_or(&[], |c| c.as_slice())
    }

    /// All descendants of `index` in parent-first order (excluding `index`).
    #[must_use]
    pub fn descendants_of(&self, index: usize) -> Vec<usize> {
        let mut result = Vec::new();
        let mut stack: SmallVec<[usize; 16]> = SmallVec::new();
        stack.extend(self.children_of(index).iter().rev().copied());
        while let Some(i) = stack.pop() {
            result.push(i);
            stack.extend(self.children_of(i).iter().rev().copied());
        }
        result
    }

    /// Ancestors of `index`, nearest first.
    #[must_use]
    pub fn ancestors_of(&self, index: usize) -> Vec<usize> {
        let mut result = Vec::new();
        let mut current = self.parent_index(index);
        while let Some(p) = current {
            result.push(p);
            current = self.parent_index(p);
        }
        result
    }

    /// Number of ancestors (0 for roots).
    #[must_use]
    pub fn depth_of(&self, index: usize) -> usize {
        self.ancestors_of(index).len()
    }

    pub fn root_bones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_root())
            .map(|(i, _)| i)
    }

    #[inline]
    #[must_use]
    pub fn global_inverse_transform(&self) -> Mat4 {
        self.global_inverse_transform
    }

    pub fn set_global_inverse_transform(&mut self, transform: Mat4) {
        self.global_inverse_transform = transform;
    }

    /// Replaces a bone's default local transform. Topology cannot change.
    pub fn set_bone_local_transform(&mut self, index: usize, transform: BoneTransform) {
        if let Some(bone) = self.bones.get_mut(index) {
            bone.local_transform = transform;
        }
    }

    #[must_use]
    pub fn bind_pose(&self) -> AnimationPose {
        AnimationPose::bind_pose(self)
    }

    // ========================================================================
    // Matrix propagation
    // ========================================================================

    /// Computes skinning matrices from name-keyed local matrices.
    ///
    /// Bones missing from `transforms` use their bind-pose local transform.
    /// `out` must hold at least [`Skeleton::bone_count`] matrices, otherwise
    /// nothing is written.
    pub fn calculate_bone_matrices_into(
        &self,
        transforms: &FxHashMap<String, Mat4>,
        scratch: &mut SkeletonScratch,
        out: &mut [Mat4],
    ) {
        if out.len() < self.bones.len() {
            log::warn!(
                "Bone matrix buffer too small: {} < {} bones",
                out.len(),
                self.bones.len()
            );
            return;
        }

        self.propagate(scratch, |_, bone| {
            transforms
                .get(&bone.name)
                .copied()
                .unwrap_or_else(|| bone.local_matrix())
        });
        self.write_skinning(scratch, out);
    }

    /// Computes skinning matrices from an index-keyed pose.
    ///
    /// Bones beyond the pose's length use their bind-pose local transform.
    pub fn calculate_pose_matrices_into(
        &self,
        pose: &AnimationPose,
        scratch: &mut SkeletonScratch,
        out: &mut [Mat4],
    ) {
        if out.len() < self.bones.len() {
            log::warn!(
                "Bone matrix buffer too small: {} < {} bones",
                out.len(),
                self.bones.len()
            );
            return;
        }

        self.global_transforms_into(pose, scratch);
        self.write_skinning(scratch, out);
    }

    #[must_use]
    pub fn calculate_bone_matrices(&self, transforms: &FxHashMap<String, Mat4>) -> Vec<Mat4> {
        let mut out = vec![Mat4::IDENTITY; self.bones.len()];
        let mut scratch = SkeletonScratch::with_capacity(self.bones.len());
        self.calculate_bone_matrices_into(transforms, &mut scratch, &mut out);
        out
    }

    /// Fills `scratch` with the model-space transform of every bone for `pose`.
    pub fn global_transforms_into(&self, pose: &AnimationPose, scratch: &mut SkeletonScratch) {
        self.propagate(scratch, |i, bone| {
            if i < pose.bone_count() {
                pose.get(i).to_matrix()
            } else {
                bone.local_matrix()
            }
        });
    }

    /// Single forward pass: parents precede children, so each parent's
    /// global is final by the time its children read it.
    fn propagate(&self, scratch: &mut SkeletonScratch, local_of: impl Fn(usize, &Bone) -> Mat4) {
        scratch.prepare(self.bones.len());
        for (i, bone) in self.bones.iter().enumerate() {
            let local = local_of(i, bone);
            scratch.globals[i] = match bone.parent {
                Some(p) => scratch.globals[p] * local,
                None => local,
            };
        }
    }

    fn write_skinning(&self, scratch: &SkeletonScratch, out: &mut [Mat4]) {
        for (i, bone) in self.bones.iter().enumerate() {
            out[i] = self.global_inverse_transform * scratch.globals[i] * bone.offset_matrix;
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Clone)]
struct BoneDecl {
    name: String,
    parent: String,
    offset_matrix: Mat4,
    local_transform: BoneTransform,
}

/// Collects `(name, parent, offset, local)` tuples in any order and sorts
/// them parent-first.
///
/// Building never fails: unknown parents and cycles demote the bone to a
/// root, duplicated names keep the first declaration.
#[derive(Debug, Clone, Default)]
pub struct SkeletonBuilder {
    decls: Vec<BoneDecl>,
    global_inverse_transform: Option<Mat4>,
}

impl SkeletonBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a bone. An empty `parent` makes it a root.
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: impl Into<String>,
        offset_matrix: Mat4,
        local_transform: impl Into<BoneTransform>,
    ) -> &mut Self {
        self.decls.push(BoneDecl {
            name: name.into(),
            parent: parent.into(),
            offset_matrix,
            local_transform: local_transform.into(),
        });
        self
    }

    pub fn global_inverse_transform(&mut self, transform: Mat4) -> &mut Self {
        self.global_inverse_transform = Some(transform);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.decls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    #[must_use]
    pub fn build(&self) -> Skeleton {
        // Dedupe by name, first declaration wins
        let mut first_index: FxHashMap<&str, usize> = FxHashMap::default();
        let mut decls: Vec<&BoneDecl> = Vec::with_capacity(self.decls.len());
        for decl in &self.decls {
            if first_index.contains_key(decl.name.as_str()) {
                log::warn!("Duplicate bone '{}' ignored", decl.name);
                continue;
            }
            first_index.insert(decl.name.as_str(), decls.len());
            decls.push(decl);
        }

        // Resolve parents in declaration space
        let mut parent: Vec<Option<usize>> = decls
            .iter()
            .map(|d| {
                if d.parent.is_empty() {
                    return None;
                }
                match first_index.get(d.parent.as_str()) {
                    Some(&p) if d.parent != d.name => Some(p),
                    Some(_) => {
                        log::warn!("Bone '{}' is its own parent; treating as root", d.name);
                        None
                    }
                    None => {
                        log::warn!(
                            "Parent '{}' of bone '{}' not found; treating as root",
                            d.parent,
                            d.name
                        );
                        None
                    }
                }
            })
            .collect();

        let count = decls.len();
        let mut visited = vec![false; count];
        let mut order: Vec<usize> = Vec::with_capacity(count);

        loop {
            let mut children: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); count];
            for (i, p) in parent.iter().enumerate() {
                if let Some(p) = *p {
                    children[p].push(i);
                }
            }

            for root in 0..count {
                if parent[root].is_none() && !visited[root] {
                    Self::visit_preorder(root, &children, &mut visited, &mut order);
                }
            }

            if order.len() == count {
                break;
            }

            // Anything left hangs off a cycle; cut it at the first declared member
            if let Some(stuck) = (0..count).find(|&i| !visited[i]) {
                log::warn!("Bone hierarchy cycle at '{}'; treating as root", decls[stuck].name);
                parent[stuck] = None;
            }
        }

        let mut new_index = vec![0usize; count];
        for (new, &old) in order.iter().enumerate() {
            new_index[old] = new;
        }

        let bones: Vec<Bone> = order
            .iter()
            .map(|&old| {
                let d = decls[old];
                Bone {
                    name: d.name.clone(),
                    parent: parent[old].map(|p| new_index[p]),
                    offset_matrix: d.offset_matrix,
                    local_transform: d.local_transform,
                }
            })
            .collect();

        let mut children: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); count];
        for (i, bone) in bones.iter().enumerate() {
            if let Some(p) = bone.parent {
                children[p].push(i);
            }
        }

        let name_to_index = bones
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.clone(), i))
            .collect();

        log::debug!("Built skeleton with {count} bones");

        Skeleton {
            bones,
            name_to_index,
            children,
            global_inverse_transform: self.global_inverse_transform.unwrap_or(Mat4::IDENTITY),
        }
    }

    fn visit_preorder(
        root: usize,
        children: &[SmallVec<[usize; 4]>],
        visited: &mut [bool],
        order: &mut Vec<usize>,
    ) {
        let mut stack = vec![root];
        while let Some(i) = stack.pop() {
            if visited[i] {
                continue;
            }
            visited[i] = true;
            order.push(i);
            stack.extend(children[i].iter().rev().copied());
        }
    }
}
