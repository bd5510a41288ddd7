//! Frame driver. Owns every GPU object and is the only consumer of the
//! deferred action queue.

use std::sync::Arc;

use crate::bind::{BindingContext, BoundResource, CapabilitySwitch};
use crate::buffer::{IndexBuffer, VertexArray, VertexBuffer};
use crate::gl::{Capability, DrawMode, GraphicsApi, VertexAttribute};
use crate::input::Intent;
use crate::mapping::ParameterUpdate;
use crate::queue::{DeferredActionQueue, DrainReport};
use crate::uniform::{Program, UniformBlock};
use crate::{AppConfig, Result};

/// Render-thread state that queued actions operate on.
#[derive(Debug)]
pub struct Scene {
    pub program: Program,
    pub uniforms: UniformBlock,
    pub meshes: Vec<VertexArray>,
    pub blend: BoundResource<CapabilitySwitch>,
    pub depth_test: BoundResource<CapabilitySwitch>,
    pub frame: u64,
    pub running: bool,
}

impl Scene {
    pub fn apply_intent(&mut self, intent: Intent) -> Result<()> {
        match intent {
            Intent::ToggleBlend => {
                if self.blend.is_bound() {
                    self.blend.unbind();
                } else {
                    self.blend.bind();
                }
            }
            Intent::CycleDrawMode => {
                for mesh in &mut self.meshes {
                    mesh.set_draw_mode(mesh.draw_mode().next());
                }
            }
            Intent::ResetUniforms => {
                let names: Vec<String> = self.program.uniforms().map(str::to_string).collect();
                for name in names {
                    self.uniforms.set(name, 0.0_f32);
                }
            }
            Intent::Quit => self.running = false,
        }
        tracing::debug!(?intent, frame = self.frame, "applied intent");
        Ok(())
    }
}

/// Per-frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub drained: DrainReport,
    pub uniforms_written: usize,
    pub meshes_drawn: usize,
}

pub struct Renderer {
    context: BindingContext,
    draw_mode: DrawMode,
    queue: Arc<DeferredActionQueue<Scene>>,
    scene: Scene,
}

impl Renderer {
    pub fn new(gl: Arc<dyn GraphicsApi>, config: &AppConfig) -> Result<Self> {
        let context = BindingContext::standard(gl.clone());
        let uniforms: Vec<&str> = config
            .mappings
            .iter()
            .map(|mapping| mapping.target.as_str())
            .collect();
        let program = Program::create(&context, &uniforms)?;

        let blend = BoundResource::new(CapabilitySwitch::new(gl.clone(), Capability::Blend));
        let depth_test = BoundResource::new(CapabilitySwitch::new(gl, Capability::DepthTest));
        if config.render.blend {
            blend.bind();
        }
        if config.render.depth_test {
            depth_test.bind();
        }

        let scene = Scene {
            program,
            uniforms: UniformBlock::new(),
            meshes: Vec::new(),
            blend,
            depth_test,
            frame: 0,
            running: true,
        };

        Ok(Self {
            context,
            draw_mode: config.render.draw_mode,
            queue: Arc::new(DeferredActionQueue::new(&config.queue)),
            scene,
        })
    }

    pub fn context(&self) -> &BindingContext {
        &self.context
    }

    /// Configured draw mode for meshes that do not pick their own.
    pub fn draw_mode(&self) -> DrawMode {
        self.draw_mode
    }

    /// Producer-side handle to the action queue.
    pub fn queue(&self) -> Arc<DeferredActionQueue<Scene>> {
        self.queue.clone()
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn is_running(&self) -> bool {
        self.scene.running
    }

    /// Initialises `mesh` and adds it to the draw list. A mesh that fails to
    /// initialise is dropped with nothing allocated.
    pub fn add_mesh(&mut self, mut mesh: VertexArray) -> Result<()> {
        mesh.init()?;
        self.scene.meshes.push(mesh);
        Ok(())
    }

    /// Runs queued actions, flushes uniforms, then draws every mesh once.
    pub fn frame(&mut self) -> Result<FrameStats> {
        let drained = self.queue.drain_and_execute(&mut self.scene);

        let uniforms_written = match self.scene.uniforms.flush(&self.scene.program) {
            Ok(written) => written,
            Err(err) if err.is_transient() => {
                tracing::warn!(error = %err, "uniform upload failed");
                0
            }
            Err(err) => return Err(err),
        };

        if let Err(err) = self.scene.program.bind() {
            if !err.is_transient() {
                return Err(err);
            }
            tracing::warn!(error = %err, "program bind failed, skipping frame");
            self.scene.frame += 1;
            return Ok(FrameStats { drained, uniforms_written, meshes_drawn: 0 });
        }

        for mesh in &self.scene.meshes {
            mesh.draw()?;
        }

        self.scene.frame += 1;
        Ok(FrameStats {
            drained,
            uniforms_written,
            meshes_drawn: self.scene.meshes.len(),
        })
    }

    /// Releases every GPU object. Must run on the rendering thread.
    pub fn shutdown(&mut self) {
        // Actions queued after the last frame are dropped unexecuted.
        let dropped = self.queue.pending();
        if dropped > 0 {
            tracing::debug!(dropped, "discarding queued actions at shutdown");
        }

        for mesh in &mut self.scene.meshes {
            mesh.dispose();
        }
        self.scene.meshes.clear();
        self.scene.program.dispose();
        self.scene.blend.unbind();
        self.scene.depth_test.unbind();
        self.scene.running = false;
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("queue", &self.queue)
            .field("scene", &self.scene)
            .finish()
    }
}

/// Queues each update under its target so only the latest value per uniform
/// reaches the next frame.
pub fn publish_updates(queue: &DeferredActionQueue<Scene>, updates: Vec<ParameterUpdate>) {
    for ParameterUpdate { target, value } in updates {
        let category = target.clone();
        queue.set(&category, move |scene: &mut Scene| {
            scene.uniforms.set(target, value);
            Ok(())
        });
    }
}

/// Queues `intent` as a one-shot action.
pub fn publish_intent(queue: &DeferredActionQueue<Scene>, intent: Intent) {
    queue.push(move |scene: &mut Scene| scene.apply_intent(intent));
}

/// Two-triangle quad covering clip space, with texture coordinates, drawn
/// with `mode`.
pub fn fullscreen_quad(context: &BindingContext, mode: DrawMode) -> Result<VertexArray> {
    #[rustfmt::skip]
    let vertices = vec![
        -1.0, -1.0, 0.0, 0.0,
         1.0, -1.0, 1.0, 0.0,
         1.0,  1.0, 1.0, 1.0,
        -1.0,  1.0, 0.0, 1.0,
    ];
    let attributes = vec![
        VertexAttribute { location: 0, components: 2, offset: 0 },
        VertexAttribute { location: 1, components: 2, offset: 2 },
    ];

    let mut quad = VertexArray::new(context)?;
    quad.set_vertex_buffer(VertexBuffer::new(vertices, attributes)?)?;
    quad.set_index_buffer(IndexBuffer::new(vec![0, 1, 2, 2, 3, 0]))?;
    quad.set_draw_mode(mode);
    Ok(quad)
}

/// One vertical line per spectrum bar, drawn without indices.
pub fn spectrum_bars(context: &BindingContext, bars: usize) -> Result<VertexArray> {
    let mut vertices = Vec::with_capacity(bars * 4);
    for bar in 0..bars {
        let x = if bars > 1 {
            -1.0 + 2.0 * bar as f32 / (bars - 1) as f32
        } else {
            0.0
        };
        vertices.extend_from_slice(&[x, -1.0, x, 1.0]);
    }

    let mut mesh = VertexArray::new(context)?;
    mesh.set_vertex_buffer(VertexBuffer::positions(vertices, 2)?)?;
    mesh.set_draw_mode(DrawMode::Lines);
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::{GlCall, Handle, RecordingApi, ResourceKind};
    use crate::uniform::UniformValue;
    use crate::VizError;

    fn renderer() -> (Arc<RecordingApi>, Renderer) {
        let gl = Arc::new(RecordingApi::new());
        let renderer = Renderer::new(gl.clone(), &AppConfig::default()).unwrap();
        (gl, renderer)
    }

    #[test]
    fn frame_applies_latest_uniform_and_draws() {
        let (gl, mut renderer) = renderer();
        let quad = fullscreen_quad(renderer.context(), DrawMode::Triangles).unwrap();
        renderer.add_mesh(quad).unwrap();

        let queue = renderer.queue();
        for value in [0.1_f32, 0.2, 0.3] {
            publish_updates(
                &queue,
                vec![ParameterUpdate { target: "intensity".into(), value: value.into() }],
            );
        }

        let stats = renderer.frame().unwrap();
        assert_eq!(stats.drained.executed, 1);
        assert_eq!(stats.uniforms_written, 1);
        assert_eq!(stats.meshes_drawn, 1);
        assert_eq!(
            renderer.scene().uniforms.get("intensity"),
            Some(&UniformValue::Float(0.3))
        );
        assert_eq!(
            gl.draw_calls(),
            vec![GlCall::DrawElements { mode: DrawMode::Triangles, count: 6 }]
        );
        renderer.shutdown();
    }

    #[test]
    fn intents_run_in_order() {
        let (gl, mut renderer) = renderer();
        let bars = spectrum_bars(renderer.context(), 8).unwrap();
        renderer.add_mesh(bars).unwrap();
        let queue = renderer.queue();

        publish_intent(&queue, Intent::ToggleBlend);
        publish_intent(&queue, Intent::CycleDrawMode);
        publish_intent(&queue, Intent::Quit);
        renderer.frame().unwrap();

        assert!(!renderer.is_running());
        assert!(!renderer.scene().blend.is_bound());
        assert_eq!(renderer.scene().meshes[0].draw_mode(), DrawMode::LineStrip);
        assert_eq!(
            gl.draw_calls(),
            vec![GlCall::DrawArrays { mode: DrawMode::LineStrip, first: 0, count: 16 }]
        );
        renderer.shutdown();
    }

    #[test]
    fn steady_frames_do_not_rebind() {
        let (gl, mut renderer) = renderer();
        let quad = fullscreen_quad(renderer.context(), DrawMode::Triangles).unwrap();
        renderer.add_mesh(quad).unwrap();
        renderer.frame().unwrap();
        gl.clear();

        for _ in 0..5 {
            renderer.frame().unwrap();
        }

        assert!(gl.bind_calls(ResourceKind::VertexArray).is_empty());
        assert!(gl.bind_calls(ResourceKind::Program).is_empty());
        assert_eq!(gl.draw_calls().len(), 5);
        renderer.shutdown();
    }

    #[test]
    fn shutdown_releases_everything() {
        let (gl, mut renderer) = renderer();
        let quad = fullscreen_quad(renderer.context(), DrawMode::Triangles).unwrap();
        renderer.add_mesh(quad).unwrap();
        let program = renderer.scene().program.handle();
        renderer.frame().unwrap();

        renderer.shutdown();

        assert_eq!(gl.count(|call| *call == GlCall::Delete(ResourceKind::Program, program)), 1);
        assert_eq!(gl.count(|call| matches!(call, GlCall::Delete(ResourceKind::VertexArray, _))), 1);
        let arrays = renderer.context().exclusivity_group(ResourceKind::VertexArray).unwrap();
        assert_eq!(arrays.active(), Handle::NONE);
        assert!(matches!(renderer.frame(), Err(VizError::UninitializedUse(_))));
    }

    #[test]
    fn failing_action_does_not_stop_the_frame() {
        let (gl, mut renderer) = renderer();
        let quad = fullscreen_quad(renderer.context(), DrawMode::Triangles).unwrap();
        renderer.add_mesh(quad).unwrap();
        let queue = renderer.queue();

        queue.push(|_: &mut Scene| Err(VizError::msg("texture decode failed")));
        publish_intent(&queue, Intent::ResetUniforms);

        let stats = renderer.frame().unwrap();
        assert_eq!(stats.drained.failed, 1);
        assert_eq!(stats.uniforms_written, 5);
        assert_eq!(gl.draw_calls().len(), 1);
        renderer.shutdown();
    }

    #[test]
    fn configured_draw_mode_reaches_the_quad() {
        let gl = Arc::new(RecordingApi::new());
        let mut config = AppConfig::default();
        config.render.draw_mode = DrawMode::Lines;
        let mut renderer = Renderer::new(gl.clone(), &config).unwrap();
        let quad = fullscreen_quad(renderer.context(), renderer.draw_mode()).unwrap();
        renderer.add_mesh(quad).unwrap();

        renderer.frame().unwrap();
        assert_eq!(
            gl.draw_calls(),
            vec![GlCall::DrawElements { mode: DrawMode::Lines, count: 6 }]
        );
        renderer.shutdown();
    }

    #[test]
    fn mesh_that_fails_to_init_is_not_kept() {
        let (gl, mut renderer) = renderer();
        let quad = fullscreen_quad(renderer.context(), DrawMode::Triangles).unwrap();
        gl.fail_next_binds(ResourceKind::VertexArray, 1);

        assert!(matches!(renderer.add_mesh(quad), Err(VizError::Binding(_))));
        assert!(renderer.scene().meshes.is_empty());
        assert_eq!(gl.count(|call| matches!(call, GlCall::Delete(ResourceKind::VertexArray, _))), 1);
        renderer.shutdown();
    }
}
