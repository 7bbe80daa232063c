//! Per-frame traversal state.
//!
//! One `UpdateContext` lives as long as the stage. Each frame it is reset by
//! `begin`, threaded through `SceneTree::update`, and drained by `end`, which
//! submits the collected draws to the backend in render order and runs the
//! one-shot end-of-frame tasks registered during the pass.

use smallvec::SmallVec;

use crate::backend::{DrawKind, DrawSubmission, RenderBackend};
use crate::clip::{clip_box_for, softness_factors, ClipInfo, ClipUniform, StencilState};
use crate::config::StageConfig;
use crate::error::{Result, SceneError};
use crate::geometry::Rect;
use crate::node::{BlendMode, Graphics, MaterialId, MaterialKey, Softness};
use crate::render_stats;
use crate::transform::Transform;
use crate::tree::{NodeId, SceneTree};

/// Work deferred until every draw of the frame has been submitted.
pub type EndOfFrameTask = Box<dyn FnOnce(&mut SceneTree, &mut dyn RenderBackend)>;

/// Summary returned by `UpdateContext::end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub frame_id: u32,
    pub submissions: usize,
    /// Submissions whose material or render state differs from the previous one
    pub batch_breaks: usize,
    pub tasks_run: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OrderSlot {
    Render,
    Eraser,
}

/// A draw recorded during traversal, positioned at flush time by the order
/// stamped on `order_node`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DrawItem {
    pub node: NodeId,
    pub order_node: NodeId,
    pub slot: OrderSlot,
    pub kind: DrawKind,
    pub graphics: Graphics,
    pub world: Transform,
    pub alpha: f32,
    pub grayed: bool,
    pub blend: BlendMode,
    pub clip: Option<ClipUniform>,
    pub stencil: StencilState,
}

impl DrawItem {
    fn state_key(&self) -> (MaterialId, BlendMode, bool, Option<ClipUniform>, StencilState) {
        (self.graphics.material, self.blend, self.grayed, self.clip, self.stencil)
    }
}

/// Clip state saved while a subtree paints into its own target.
#[derive(Clone, Copy, Debug)]
struct PaintingState {
    clip_info: ClipInfo,
    clipped: bool,
    rect_mask_depth: u32,
    stencil_reference_value: u32,
    clip_base: usize,
}

/// Mask currently writing its stencil bit.
#[derive(Clone, Copy, Debug)]
struct MaskWriter {
    mask: NodeId,
    bit: u32,
    expected: u32,
}

pub struct UpdateContext {
    config: StageConfig,
    frame_id: u32,
    in_frame: bool,

    /// Accumulated alpha of the ancestors of the node being updated
    pub alpha: f32,
    pub grayed: bool,
    /// Next render order to hand out
    pub rendering_order: u32,
    /// Number of fairy-batching groups enclosing the current node
    pub batching_depth: u32,

    clipped: bool,
    rect_mask_depth: u32,
    stencil_reference_value: u32,
    clip_info: ClipInfo,
    clip_stack: Vec<ClipInfo>,
    /// Clip stack length at which the current painting scope started
    clip_base: usize,
    painting_stack: Vec<PaintingState>,

    mask_writers: SmallVec<[MaskWriter; 4]>,
    pending_erasers: Vec<DrawItem>,
    draws: Vec<DrawItem>,
    tasks: Vec<EndOfFrameTask>,
}

impl UpdateContext {
    pub fn new(config: StageConfig) -> Self {
        Self {
            config,
            frame_id: 0,
            in_frame: false,
            alpha: 1.0,
            grayed: false,
            rendering_order: 0,
            batching_depth: 0,
            clipped: false,
            rect_mask_depth: 0,
            stencil_reference_value: 0,
            clip_info: ClipInfo::default(),
            clip_stack: Vec::new(),
            clip_base: 0,
            painting_stack: Vec::new(),
            mask_writers: SmallVec::new(),
            pending_erasers: Vec::new(),
            draws: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Id of the current (or last) frame. Never 0 once a frame has begun.
    pub fn frame_id(&self) -> u32 {
        self.frame_id
    }

    pub fn is_in_frame(&self) -> bool {
        self.in_frame
    }

    /// Start a frame: advance the frame id and reset all traversal state.
    pub fn begin(&mut self) {
        if self.in_frame {
            log::warn!("frame {} began again before it ended", self.frame_id);
        }
        self.frame_id = self.frame_id.wrapping_add(1);
        if self.frame_id == 0 {
            self.frame_id = 1;
        }
        self.in_frame = true;

        self.alpha = 1.0;
        self.grayed = false;
        self.rendering_order = 0;
        self.batching_depth = 0;
        self.clipped = false;
        self.rect_mask_depth = 0;
        self.stencil_reference_value = 0;
        self.clip_info = ClipInfo::default();
        self.clip_stack.clear();
        self.clip_base = 0;
        self.painting_stack.clear();
        self.mask_writers.clear();
        self.pending_erasers.clear();
        self.draws.clear();
    }

    /// Finish the frame: submit draws in render order, then run and clear
    /// the end-of-frame tasks.
    pub fn end(&mut self, tree: &mut SceneTree, backend: &mut dyn RenderBackend) -> FrameStats {
        if !self.clip_stack.is_empty() || !self.painting_stack.is_empty() {
            log::error!(
                "frame {} ended with {} open clip scopes and {} painting scopes",
                self.frame_id,
                self.clip_stack.len(),
                self.painting_stack.len()
            );
            self.clip_stack.clear();
            self.painting_stack.clear();
            self.clip_info = ClipInfo::default();
            self.rect_mask_depth = 0;
            self.stencil_reference_value = 0;
            self.clipped = false;
            self.clip_base = 0;
        }

        let (submissions, batch_breaks) = self.flush(tree, backend);

        let tasks = std::mem::take(&mut self.tasks);
        let tasks_run = tasks.len();
        for task in tasks {
            task(tree, backend);
        }

        self.in_frame = false;
        let stats = FrameStats {
            frame_id: self.frame_id,
            submissions,
            batch_breaks,
            tasks_run,
        };
        render_stats::end_frame(&stats);
        stats
    }

    fn flush(&mut self, tree: &SceneTree, backend: &mut dyn RenderBackend) -> (usize, usize) {
        let mut ordered: Vec<(u32, DrawItem)> = Vec::with_capacity(self.draws.len());
        for item in self.draws.drain(..) {
            let node = match tree.node(item.order_node) {
                Some(node) => node,
                None => {
                    log::warn!("draw of {:?} dropped: node disposed during frame", item.node);
                    continue;
                }
            };
            let order = match item.slot {
                OrderSlot::Render => node.render_order,
                OrderSlot::Eraser => node.eraser_order,
            };
            ordered.push((order, item));
        }
        ordered.sort_by_key(|(order, _)| *order);

        let mut batch_breaks = 0;
        let mut previous = None;
        for (order, item) in &ordered {
            let key = item.state_key();
            if previous.as_ref() != Some(&key) {
                batch_breaks += 1;
                previous = Some(key);
            }
            backend.set_blend_factors(item.blend.factors());
            backend.set_clip_uniform(item.clip);
            backend.set_stencil_state(item.stencil);
            backend.submit_geometry(&DrawSubmission {
                node: item.node,
                kind: item.kind,
                mesh: item.graphics.mesh,
                material: item.graphics.material,
                sorting_order: *order,
                world_transform: item.world,
                alpha: item.alpha,
                grayed: item.grayed,
            });
        }
        (ordered.len(), batch_breaks)
    }

    /// Register a one-shot task run by `end` after all draws are submitted.
    pub fn on_end(&mut self, task: EndOfFrameTask) {
        self.tasks.push(task);
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn clip_info(&self) -> &ClipInfo {
        &self.clip_info
    }

    pub fn clip_depth(&self) -> usize {
        self.clip_stack.len()
    }

    pub fn is_clipped(&self) -> bool {
        self.clipped
    }

    pub fn rect_mask_depth(&self) -> u32 {
        self.rect_mask_depth
    }

    pub fn stencil_reference_value(&self) -> u32 {
        self.stencil_reference_value
    }

    /// Number of stencil levels currently entered.
    pub fn stencil_depth(&self) -> u32 {
        u32::BITS - self.stencil_reference_value.leading_zeros()
    }

    /// Open a rect clip scope for `clip_id` with a world-space `rect`.
    ///
    /// Inside another rect clip the effective rect is the intersection of
    /// both.
    pub fn enter_rect_clip(&mut self, clip_id: NodeId, rect: Rect, softness: Option<Softness>) {
        self.clip_stack.push(self.clip_info);

        let rect = if self.rect_mask_depth > 0 {
            rect.intersection(&self.clip_info.rect)
        } else {
            rect
        };
        self.rect_mask_depth += 1;
        self.clipped = true;

        let info = &mut self.clip_info;
        info.rect = rect;
        info.clip_box = clip_box_for(&rect);
        info.clip_id = Some(clip_id);
        info.is_stencil = false;
        match softness.filter(|s| !s.is_zero()) {
            Some(softness) => {
                info.soft = true;
                info.softness = softness_factors(
                    &rect,
                    &softness,
                    self.config.pixels_per_unit,
                    self.config.soft_clip_hard_edge,
                );
            }
            None => {
                info.soft = false;
                info.softness = [self.config.soft_clip_hard_edge; 4];
            }
        }
        render_stats::record_rect_clip();
    }

    /// Open a stencil scope for the mask of `clip_id`, claiming the next
    /// reference bit.
    pub fn enter_stencil_clip(&mut self, clip_id: NodeId, reversed_mask: bool) -> Result<()> {
        let limit = self.config.stencil_depth_limit();
        if self.stencil_depth() >= limit {
            return Err(SceneError::StencilDepthExceeded { max: limit });
        }
        self.clip_stack.push(self.clip_info);

        self.stencil_reference_value = if self.stencil_reference_value == 0 {
            1
        } else {
            self.stencil_reference_value << 1
        };
        self.clipped = true;

        let bit = self.stencil_reference_value;
        let info = &mut self.clip_info;
        info.clip_id = Some(clip_id);
        info.is_stencil = true;
        info.reversed_mask = reversed_mask;
        if !reversed_mask {
            info.stencil_compare |= bit;
        }
        render_stats::record_stencil_clip();
        Ok(())
    }

    /// Close the innermost clip scope, restoring the state it replaced.
    pub fn leave_clipping(&mut self) {
        if self.clip_stack.len() <= self.clip_base {
            log::warn!("leave_clipping called without a matching enter");
            return;
        }
        if self.clip_info.is_stencil {
            self.stencil_reference_value >>= 1;
        } else {
            self.rect_mask_depth = self.rect_mask_depth.saturating_sub(1);
        }
        if let Some(previous) = self.clip_stack.pop() {
            self.clip_info = previous;
        }
        self.clipped = self.clip_stack.len() > self.clip_base;
    }

    /// Draw the following subtree unclipped, into an offscreen target.
    pub fn enter_painting_mode(&mut self) {
        self.painting_stack.push(PaintingState {
            clip_info: self.clip_info,
            clipped: self.clipped,
            rect_mask_depth: self.rect_mask_depth,
            stencil_reference_value: self.stencil_reference_value,
            clip_base: self.clip_base,
        });
        self.clip_info = ClipInfo::default();
        self.clipped = false;
        self.rect_mask_depth = 0;
        self.stencil_reference_value = 0;
        self.clip_base = self.clip_stack.len();
    }

    pub fn leave_painting_mode(&mut self) {
        match self.painting_stack.pop() {
            Some(saved) => {
                self.clip_info = saved.clip_info;
                self.clipped = saved.clipped;
                self.rect_mask_depth = saved.rect_mask_depth;
                self.stencil_reference_value = saved.stencil_reference_value;
                self.clip_base = saved.clip_base;
            }
            None => log::warn!("leave_painting_mode called without a matching enter"),
        }
    }

    fn clip_uniform(&self) -> Option<ClipUniform> {
        if self.rect_mask_depth == 0 {
            return None;
        }
        Some(ClipUniform {
            clip_box: self.clip_info.clip_box,
            softness: self.clip_info.softness,
        })
    }

    /// Route following submissions into the stencil bit of the current scope.
    pub(crate) fn begin_mask_write(&mut self, mask: NodeId) {
        self.mask_writers.push(MaskWriter {
            mask,
            bit: self.stencil_reference_value,
            expected: self.clip_info.stencil_compare,
        });
    }

    pub(crate) fn end_mask_write(&mut self) {
        self.mask_writers.pop();
    }

    pub(crate) fn is_writing_mask(&self) -> bool {
        !self.mask_writers.is_empty()
    }

    pub(crate) fn eraser_mark(&self) -> usize {
        self.pending_erasers.len()
    }

    /// Queue the erasers recorded since `mark` for drawing after the masked
    /// content.
    pub(crate) fn flush_erasers(&mut self, mark: usize) {
        if mark < self.pending_erasers.len() {
            let erasers = self.pending_erasers.split_off(mark);
            self.draws.extend(erasers);
        }
    }

    /// Record `node`'s geometry under the current state and return the
    /// material key used for batching.
    pub(crate) fn submit(
        &mut self,
        node: NodeId,
        graphics: Graphics,
        world: Transform,
        alpha: f32,
        grayed: bool,
        blend: BlendMode,
    ) -> MaterialKey {
        let clip = self.clip_uniform();
        let mut item = DrawItem {
            node,
            order_node: node,
            slot: OrderSlot::Render,
            kind: DrawKind::Content,
            graphics,
            world,
            alpha,
            grayed,
            blend,
            clip,
            stencil: StencilState::for_scope(self.stencil_reference_value, &self.clip_info),
        };

        if let Some(writer) = self.mask_writers.last().copied() {
            item.order_node = writer.mask;
            item.kind = DrawKind::MaskWrite;
            item.stencil = StencilState::mask_write(writer.bit, writer.expected);
            self.pending_erasers.push(DrawItem {
                slot: OrderSlot::Eraser,
                kind: DrawKind::MaskErase,
                stencil: StencilState::mask_erase(writer.bit),
                ..item
            });
        }
        self.draws.push(item);

        MaterialKey {
            material: graphics.material,
            blend,
            grayed,
            clip_id: if self.clipped { self.clip_info.clip_id } else { None },
            stencil_reference: self.stencil_reference_value,
        }
    }
}

impl Default for UpdateContext {
    fn default() -> Self {
        Self::new(StageConfig::default())
    }
}
