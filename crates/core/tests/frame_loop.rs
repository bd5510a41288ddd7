use std::sync::Arc;
use std::thread;

use audioviz_core::gl::GlCall;
use audioviz_core::render::{fullscreen_quad, publish_intent, publish_updates};
use audioviz_core::{
    AppConfig, DrawMode, FeatureExtractor, Intent, MappingMatrix, RecordingApi, Renderer, ResourceKind,
    UniformValue,
};

#[test]
fn producers_feed_the_render_thread() {
    let gl = Arc::new(RecordingApi::new());
    let config = AppConfig::default();
    let mut renderer = Renderer::new(gl.clone(), &config).unwrap();
    renderer.add_mesh(fullscreen_quad(renderer.context(), DrawMode::Triangles).unwrap()).unwrap();

    let audio = {
        let queue = renderer.queue();
        let matrix = MappingMatrix::new(config.mappings.clone());
        thread::spawn(move || {
            let mut extractor = FeatureExtractor::new(config.audio.sample_rate);
            for _ in 0..50 {
                let frame = extractor.process_block(&[0.5; 512]).unwrap();
                publish_updates(&queue, matrix.evaluate(&frame));
            }
        })
    };
    let input = {
        let queue = renderer.queue();
        thread::spawn(move || {
            for _ in 0..3 {
                publish_intent(&queue, Intent::CycleDrawMode);
            }
        })
    };
    audio.join().unwrap();
    input.join().unwrap();

    let stats = renderer.frame().unwrap();

    // Three one-shot intents plus one coalesced update per mapped uniform.
    assert_eq!(stats.drained.executed, 3 + config.mappings.len());
    assert_eq!(stats.drained.failed, 0);
    assert_eq!(stats.uniforms_written, config.mappings.len());
    assert_eq!(
        renderer.scene().uniforms.get("intensity"),
        Some(&UniformValue::Float(0.5))
    );
    assert_eq!(
        gl.count(|call| matches!(call, GlCall::Uniform { .. })),
        config.mappings.len()
    );
    assert_eq!(gl.draw_calls().len(), 1);

    renderer.shutdown();
    assert_eq!(
        gl.count(|call| matches!(call, GlCall::Delete(ResourceKind::VertexArray, _))),
        1
    );
}

#[test]
fn only_one_vertex_array_is_active_at_a_time() {
    let gl = Arc::new(RecordingApi::new());
    let mut renderer = Renderer::new(gl.clone(), &AppConfig::default()).unwrap();
    renderer.add_mesh(fullscreen_quad(renderer.context(), DrawMode::Triangles).unwrap()).unwrap();
    renderer.add_mesh(fullscreen_quad(renderer.context(), DrawMode::Triangles).unwrap()).unwrap();
    gl.clear();

    renderer.frame().unwrap();
    renderer.frame().unwrap();

    let arrays: Vec<_> = renderer.scene().meshes.iter().map(|mesh| mesh.handle()).collect();
    let group = renderer
        .context()
        .exclusivity_group(ResourceKind::VertexArray)
        .unwrap();
    assert_eq!(group.active(), arrays[1]);
    // Each frame switches between the two arrays; nothing is rebound twice in a row.
    let binds = gl.bind_calls(ResourceKind::VertexArray);
    assert_eq!(binds, vec![arrays[0], arrays[1], arrays[0], arrays[1]]);

    renderer.shutdown();
}
