//! Render graph executor
//!
//! Runs every pass once per frame in registration order. Binding state is
//! tracked explicitly in [`BoundResources`], which outlives the frame, so
//! before a pass attaches its outputs as render targets the executor knows
//! exactly which sampling units still hold them (possibly from the previous
//! frame) and detaches them first.

use crate::backend::{GraphicsBackend, TextureHandle};
use crate::error::{ConfigError, EngineResult};
use crate::render_graph::data::DataBlockRegistry;
use crate::render_graph::graph::PassGraph;
use crate::resources::{ImageId, ResourceManager};

/// Which image occupies each sampling unit, and which images are the
/// current render targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundResources {
    units: Vec<Option<ImageId>>,
    targets: Vec<ImageId>,
}

impl BoundResources {
    pub fn new(units: u32) -> Self {
        Self {
            units: vec![None; units as usize],
            targets: Vec::new(),
        }
    }

    pub fn unit_count(&self) -> u32 {
        self.units.len() as u32
    }

    pub fn unit(&self, unit: u32) -> Option<ImageId> {
        self.units.get(unit as usize).copied().flatten()
    }

    /// Units currently holding `image`.
    pub fn units_holding(&self, image: ImageId) -> Vec<u32> {
        self.units
            .iter()
            .enumerate()
            .filter(|(_, bound)| **bound == Some(image))
            .map(|(unit, _)| unit as u32)
            .collect()
    }

    pub fn set_unit(&mut self, unit: u32, image: Option<ImageId>) {
        if let Some(slot) = self.units.get_mut(unit as usize) {
            *slot = image;
        }
    }

    pub fn targets(&self) -> &[ImageId] {
        &self.targets
    }

    pub fn is_target(&self, image: ImageId) -> bool {
        self.targets.contains(&image)
    }

    pub fn set_targets(&mut self, targets: &[ImageId]) {
        self.targets = targets.to_vec();
    }

    /// Drop every record of `image`, after it has been released.
    pub fn forget(&mut self, image: ImageId) {
        for slot in self.units.iter_mut().filter(|s| **s == Some(image)) {
            *slot = None;
        }
        self.targets.retain(|t| *t != image);
    }

    pub fn clear(&mut self) {
        self.units.fill(None);
        self.targets.clear();
    }
}

/// Executes the pass graph
pub struct FrameExecutor {
    bound: BoundResources,
    frames: u64,
}

impl FrameExecutor {
    pub fn new(units: u32) -> Self {
        Self {
            bound: BoundResources::new(units),
            frames: 0,
        }
    }

    pub fn bound(&self) -> &BoundResources {
        &self.bound
    }

    pub(crate) fn bound_mut(&mut self) -> &mut BoundResources {
        &mut self.bound
    }

    /// Number of frames executed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn unbind<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B, unit: u32) {
        backend.bind_texture(unit, None);
        self.bound.set_unit(unit, None);
    }

    /// Run one frame: refresh data blocks, then draw every pass in order.
    pub fn execute<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        graph: &PassGraph,
        resources: &ResourceManager,
        data: &mut DataBlockRegistry,
    ) -> EngineResult<()> {
        backend.begin_frame()?;
        data.refresh(backend);

        for pass in graph.passes() {
            // An output may not stay attached to any sampling unit while it
            // is a render target.
            for output in pass.outputs() {
                for unit in self.bound.units_holding(*output) {
                    log::trace!(
                        "Pass {}: unbinding {} from unit {} before writing it",
                        pass.id().index(),
                        output,
                        unit
                    );
                    self.unbind(backend, unit);
                }
            }

            let targets = pass
                .outputs()
                .iter()
                .map(|id| resources.get(*id).map(|image| image.handle))
                .collect::<Result<Vec<TextureHandle>, ConfigError>>()?;
            backend.set_render_targets(&targets);
            self.bound.set_targets(pass.outputs());

            for (unit, input) in pass.inputs().iter().enumerate() {
                let unit = unit as u32;
                if self.bound.is_target(*input) {
                    if self.frames == 0 {
                        log::warn!(
                            "Pass {}: {} is both input {} and a render target, leaving the unit empty",
                            pass.id().index(),
                            input,
                            unit
                        );
                    }
                    if self.bound.unit(unit).is_some() {
                        self.unbind(backend, unit);
                    }
                    continue;
                }
                resources.bind_as_input(backend, &mut self.bound, *input, unit)?;
            }

            for unit in pass.inputs().len() as u32..self.bound.unit_count() {
                if self.bound.unit(unit).is_some() {
                    self.unbind(backend, unit);
                }
            }

            backend.use_program(pass.program());
            for uniform in pass.uniforms() {
                if let Some(block) = data.get(uniform.block) {
                    backend.bind_uniform_buffer(uniform.slot, block.buffer());
                }
            }

            backend.draw_fullscreen()?;
        }

        backend.end_frame()?;
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SoftwareBackend, SoftwareCall};
    use crate::render_graph::{PassSetupContext, UniformArray};
    use crate::resources::{BufferFormat, DecodedImage, SamplerPreset};
    use crate::shader::{ShaderId, ShaderOptions, ShaderUnit};

    const COPY: &str = r#"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 frag_color;
layout(set = 1, binding = 0) uniform texture2D src;
layout(set = 1, binding = 1) uniform sampler src_sampler;
void main() {
    frag_color = texture(sampler2D(src, src_sampler), v_uv);
}
"#;

    #[test]
    fn test_bound_resources_tracking() {
        let mut bound = BoundResources::new(4);
        let a = ImageId(1);
        let b = ImageId(2);
        bound.set_unit(0, Some(a));
        bound.set_unit(2, Some(a));
        bound.set_unit(3, Some(b));
        bound.set_unit(9, Some(b));
        assert_eq!(bound.units_holding(a), vec![0, 2]);

        bound.set_targets(&[b]);
        assert!(bound.is_target(b));
        bound.forget(b);
        assert_eq!(bound.unit(3), None);
        assert!(bound.targets().is_empty());
    }

    #[test]
    fn test_output_unbound_from_previous_frame() {
        let mut backend = SoftwareBackend::new(4, 4);
        backend.register_kernel("copy", |ctx| ctx.sample(0, ctx.uv));
        let unit = ShaderUnit::new();
        let copy = unit
            .compile(&mut backend, "copy", COPY, &["src"], &ShaderOptions::default())
            .unwrap();

        let mut resources = ResourceManager::new();
        let mut data = DataBlockRegistry::new();
        data.add(&mut backend, "unused", vec![Box::new(UniformArray::<f32>::zeroed(1))])
            .unwrap();
        let image = resources
            .create_image(
                &mut backend,
                &DecodedImage::solid_color(4, 4, [255, 0, 0, 255], "red"),
                SamplerPreset::NearestClamp,
            )
            .unwrap();
        let x = resources
            .create_buffer(&mut backend, "x", 4, 4, BufferFormat::RGBA8, SamplerPreset::NearestClamp)
            .unwrap();

        let mut graph = PassGraph::new();
        let ctx = PassSetupContext {
            resources: &resources,
            data: &data,
            max_color_targets: 4,
            max_inputs: 16,
        };
        graph.add_pass(&ctx, &[image], ShaderId(1), &copy, &[x]).unwrap();
        graph.add_pass(&ctx, &[x], ShaderId(1), &copy, &[]).unwrap();

        let mut executor = FrameExecutor::new(16);
        executor
            .execute(&mut backend, &graph, &resources, &mut data)
            .unwrap();
        // Frame one leaves x on unit 0 after the screen pass.
        assert_eq!(executor.bound().unit(0), Some(x));
        backend.take_calls();

        executor
            .execute(&mut backend, &graph, &resources, &mut data)
            .unwrap();
        let calls = backend.take_calls();
        let x_handle = resources.get(x).unwrap().handle;
        let unbind = calls
            .iter()
            .position(|c| *c == SoftwareCall::BindTexture { unit: 0, texture: None })
            .unwrap();
        let attach = calls
            .iter()
            .position(|c| *c == SoftwareCall::SetRenderTargets(vec![x_handle]))
            .unwrap();
        assert!(unbind < attach);
        assert_eq!(backend.hazard_draws(), 0);
        assert_eq!(executor.frames(), 2);
    }
}
