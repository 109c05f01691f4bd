//! Render graph definition and validation
//!
//! Passes run in the order they were added. The graph never reorders them;
//! [`PassGraph::validate`] is an opt-in check that the order makes sense.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::render_graph::data::DataBlockRegistry;
use crate::render_graph::pass::*;
use crate::resources::{ImageId, ImageKind, ResourceManager};
use crate::shader::{ShaderId, ShaderProgram};

/// Lookups and limits `add_pass` checks a new pass against
pub struct PassSetupContext<'a> {
    pub resources: &'a ResourceManager,
    pub data: &'a DataBlockRegistry,
    pub max_color_targets: usize,
    pub max_inputs: usize,
}

/// Ordered list of passes
#[derive(Default)]
pub struct PassGraph {
    passes: Vec<Pass>,
}

impl PassGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass after checking it in isolation.
    ///
    /// Only the pass itself is checked here, not its relation to earlier
    /// passes; use [`PassGraph::validate`] for that.
    pub fn add_pass(
        &mut self,
        ctx: &PassSetupContext<'_>,
        inputs: &[ImageId],
        shader_id: ShaderId,
        shader: &ShaderProgram,
        outputs: &[ImageId],
    ) -> Result<PassId, ConfigError> {
        let samplers = shader.samplers();
        if inputs.len() != samplers.len() {
            return Err(ConfigError::InputCountMismatch {
                shader: shader.label().to_string(),
                expected: samplers.len(),
                actual: inputs.len(),
            });
        }
        if inputs.len() > ctx.max_inputs {
            return Err(ConfigError::TooManyInputs {
                count: inputs.len(),
                max: ctx.max_inputs,
            });
        }

        for (index, (input, sampler)) in inputs.iter().zip(samplers).enumerate() {
            let image = ctx.resources.get(*input)?;
            if image.kind.dimension() != sampler.dimension {
                return Err(ConfigError::InputKindMismatch {
                    shader: shader.label().to_string(),
                    index,
                    sampler: sampler.name.clone(),
                    expected: match sampler.dimension {
                        crate::backend::TextureDimension::D2 => "2D",
                        crate::backend::TextureDimension::Cube => "cubemap",
                    },
                });
            }
        }

        if outputs.len() > ctx.max_color_targets {
            return Err(ConfigError::TooManyOutputs {
                count: outputs.len(),
                max: ctx.max_color_targets,
            });
        }
        let mut size = None;
        for output in outputs {
            let image = ctx.resources.get(*output)?;
            if image.kind != ImageKind::RenderTarget {
                return Err(ConfigError::NotRenderTarget(output.raw()));
            }
            let first = *size.get_or_insert(image.size());
            if first != image.size() {
                return Err(ConfigError::OutputSizeMismatch {
                    first,
                    other: image.size(),
                });
            }
        }

        let mut uniforms = Vec::with_capacity(shader.uniform_blocks().len());
        for reflected in shader.uniform_blocks() {
            let block = ctx
                .data
                .find(&reflected.name)
                .ok_or_else(|| ConfigError::UnknownDataBlock {
                    shader: shader.label().to_string(),
                    block: reflected.name.clone(),
                })?;
            if block.size() < reflected.size {
                return Err(ConfigError::DataBlockTooSmall {
                    shader: shader.label().to_string(),
                    block: reflected.name.clone(),
                    expected: reflected.size,
                    actual: block.size(),
                });
            }
            uniforms.push(UniformBinding {
                block: block.id(),
                slot: reflected.slot,
            });
        }

        let id = PassId(self.passes.len());
        for input in inputs.iter().filter(|i| outputs.contains(i)) {
            log::warn!(
                "Pass {} ('{}') reads its own output {}; the input will be left unbound",
                id.index(),
                shader.label(),
                input
            );
        }
        log::debug!(
            "Added pass {} ('{}'): {} inputs -> {}",
            id.index(),
            shader.label(),
            inputs.len(),
            if outputs.is_empty() {
                "screen".to_string()
            } else {
                format!("{} outputs", outputs.len())
            }
        );

        self.passes.push(Pass {
            id,
            inputs: inputs.to_vec(),
            shader: shader_id,
            program: shader.handle(),
            outputs: outputs.to_vec(),
            uniforms,
        });
        Ok(id)
    }

    /// Check the pass order: every render-target input must have been
    /// written by an earlier pass, and no pass may read its own output.
    pub fn validate(&self, resources: &ResourceManager) -> Result<(), ConfigError> {
        let mut written: HashSet<ImageId> = HashSet::new();

        for pass in &self.passes {
            for input in &pass.inputs {
                if pass.writes(*input) {
                    return Err(ConfigError::FeedbackLoop {
                        pass: pass.id.index(),
                        image: input.raw(),
                    });
                }
                if resources.get(*input)?.is_render_target() && !written.contains(input) {
                    return Err(ConfigError::ReadBeforeWrite {
                        pass: pass.id.index(),
                        image: input.raw(),
                    });
                }
            }
            written.extend(pass.outputs.iter().copied());
        }

        Ok(())
    }

    /// First pass that reads or writes `image`.
    pub fn first_user(&self, image: ImageId) -> Option<PassId> {
        self.passes
            .iter()
            .find(|p| p.reads(image) || p.writes(image))
            .map(|p| p.id)
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn get(&self, id: PassId) -> Option<&Pass> {
        self.passes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn clear(&mut self) {
        self.passes.clear();
    }
}
