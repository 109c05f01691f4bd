//! Render pass definitions for the render graph

use crate::backend::{BindingSlot, ProgramHandle};
use crate::render_graph::data::DataBlockId;
use crate::resources::ImageId;
use crate::shader::ShaderId;

/// Unique identifier for a render pass, equal to its execution index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) usize);

impl PassId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A data block bound to a program's reflected uniform slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBinding {
    pub block: DataBlockId,
    pub slot: BindingSlot,
}

/// One full-screen draw: inputs sampled by one program, written to the
/// outputs (or the screen when there are none)
#[derive(Debug, Clone)]
pub struct Pass {
    pub(crate) id: PassId,
    pub(crate) inputs: Vec<ImageId>,
    pub(crate) shader: ShaderId,
    pub(crate) program: ProgramHandle,
    pub(crate) outputs: Vec<ImageId>,
    pub(crate) uniforms: Vec<UniformBinding>,
}

impl Pass {
    pub fn id(&self) -> PassId {
        self.id
    }

    pub fn inputs(&self) -> &[ImageId] {
        &self.inputs
    }

    pub fn shader(&self) -> ShaderId {
        self.shader
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub fn outputs(&self) -> &[ImageId] {
        &self.outputs
    }

    pub fn uniforms(&self) -> &[UniformBinding] {
        &self.uniforms
    }

    pub fn renders_to_screen(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn reads(&self, image: ImageId) -> bool {
        self.inputs.contains(&image)
    }

    pub fn writes(&self, image: ImageId) -> bool {
        self.outputs.contains(&image)
    }
}
