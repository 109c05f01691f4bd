//! Shader unit: GLSL composition, reflection and program creation.
//!
//! Fragment programs are GLSL 450. Before parsing, `#include "path"` lines
//! are expanded from registered library modules, then naga's GLSL frontend
//! runs with the program's defines, the module is validated and written
//! out as WGSL for the backend.
//!
//! Inputs are named. For every sampler name `N` a program lists, the source
//! declares a texture and its companion sampler:
//!
//! ```glsl
//! layout(set = 1, binding = 0) uniform texture2D N;
//! layout(set = 1, binding = 1) uniform sampler N_sampler;
//! ```
//!
//! and samples with `texture(sampler2D(N, N_sampler), v_uv)`. The order of
//! the names is the order of the pass inputs feeding them. Uniform blocks
//! are reflected by block name and matched against data blocks of the same
//! name when a pass is added.

pub mod library;

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::backend::{
    BindingSlot, GraphicsBackend, ProgramDescriptor, ProgramHandle, SamplerBinding,
    TextureDimension, UniformBlockBinding,
};
use crate::error::{CompileError, EngineResult};

pub use library::{BuiltinShader, ShaderLibrary, BUILTIN_SHADERS, FULLSCREEN_VERTEX_SHADER};

/// Identifier of a compiled program within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub(crate) u64);

impl std::fmt::Display for ShaderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shader#{}", self.0)
    }
}

/// Compile-time options of a program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderOptions {
    pub defines: BTreeMap<String, String>,
}

impl ShaderOptions {
    /// Add a preprocessor define, `#define name value`.
    pub fn define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(name.into(), value.into());
        self
    }
}

/// A compiled program and its reflected interface.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    label: String,
    handle: ProgramHandle,
    samplers: Vec<SamplerBinding>,
    uniform_blocks: Vec<UniformBlockBinding>,
    defines: BTreeMap<String, String>,
}

impl ShaderProgram {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> ProgramHandle {
        self.handle
    }

    /// Sampler inputs in pass input order.
    pub fn samplers(&self) -> &[SamplerBinding] {
        &self.samplers
    }

    pub fn uniform_blocks(&self) -> &[UniformBlockBinding] {
        &self.uniform_blocks
    }

    pub fn defines(&self) -> &BTreeMap<String, String> {
        &self.defines
    }
}

/// Shader composer for resolving includes and translating GLSL to WGSL.
pub struct ShaderComposer {
    /// Registered include sources: path -> source text.
    includes: HashMap<String, String>,
}

impl Default for ShaderComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderComposer {
    pub fn new() -> Self {
        Self {
            includes: HashMap::new(),
        }
    }

    /// Create a composer with the standard library pre-loaded.
    pub fn with_standard_library() -> Self {
        let mut composer = Self::new();
        composer.add_library(&ShaderLibrary::standard());
        composer
    }

    /// Make every module of `library` available for `#include`.
    pub fn add_library(&mut self, library: &ShaderLibrary) {
        for (path, source) in library.modules() {
            self.register_include(path, source);
        }
    }

    /// Register a single include source under the path used in `#include "path"`.
    pub fn register_include(&mut self, path: &str, source: &str) {
        self.includes.insert(path.to_string(), source.to_string());
    }

    /// Expand `#include` directives without parsing.
    pub fn resolve_glsl(&self, label: &str, source: &str) -> Result<String, CompileError> {
        let mut included = HashSet::new();
        self.resolve_includes(label, source, &mut included)
    }

    /// Resolve includes and parse the program into a validated naga module.
    pub fn compose_to_naga(
        &self,
        label: &str,
        source: &str,
        options: &ShaderOptions,
    ) -> Result<(naga::Module, naga::valid::ModuleInfo), CompileError> {
        let resolved = self.resolve_glsl(label, source)?;

        let mut defines = naga::FastHashMap::default();
        defines.insert("FRAGMENT".to_string(), String::new());
        for (name, value) in &options.defines {
            defines.insert(name.clone(), value.clone());
        }

        let naga_options = naga::front::glsl::Options {
            stage: naga::ShaderStage::Fragment,
            defines,
        };

        let mut frontend = naga::front::glsl::Frontend::default();
        let module = frontend
            .parse(&naga_options, &resolved)
            .map_err(|errors| CompileError::Parse {
                shader: label.to_string(),
                message: format!("{errors}"),
            })?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        let info = validator
            .validate(&module)
            .map_err(|e| CompileError::Validation {
                shader: label.to_string(),
                message: format!("{e}"),
            })?;

        Ok((module, info))
    }

    /// Compose a program and write it as WGSL.
    pub fn compose(
        &self,
        label: &str,
        source: &str,
        options: &ShaderOptions,
    ) -> Result<String, CompileError> {
        let (module, info) = self.compose_to_naga(label, source, options)?;
        write_wgsl(label, &module, &info)
    }

    fn resolve_includes(
        &self,
        label: &str,
        source: &str,
        included: &mut HashSet<String>,
    ) -> Result<String, CompileError> {
        let mut result = String::with_capacity(source.len());

        for line in source.lines() {
            match parse_include_directive(line.trim()) {
                Some(path) => {
                    if !included.insert(path.to_string()) {
                        continue;
                    }

                    let include_source =
                        self.includes
                            .get(path)
                            .ok_or_else(|| CompileError::Include {
                                shader: label.to_string(),
                                path: path.to_string(),
                            })?;

                    let resolved = self.resolve_includes(label, include_source, included)?;
                    result.push_str(&resolved);
                }
                None => result.push_str(line),
            }
            result.push('\n');
        }

        Ok(result)
    }
}

/// Parse a `#include "path"` (or `<path>`) directive, returning the path.
fn parse_include_directive(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("#include")?.trim();
    if let Some(inner) = rest.strip_prefix('"') {
        inner.strip_suffix('"')
    } else if let Some(inner) = rest.strip_prefix('<') {
        inner.strip_suffix('>')
    } else {
        None
    }
}

fn write_wgsl(
    label: &str,
    module: &naga::Module,
    info: &naga::valid::ModuleInfo,
) -> Result<String, CompileError> {
    naga::back::wgsl::write_string(module, info, naga::back::wgsl::WriterFlags::empty()).map_err(
        |e| CompileError::Emit {
            shader: label.to_string(),
            message: format!("{e}"),
        },
    )
}

struct ReflectedGlobal {
    name: String,
    slot: BindingSlot,
    kind: GlobalKind,
}

enum GlobalKind {
    Texture(TextureDimension),
    Sampler,
    Uniform { block: String, size: u64 },
    Other,
}

fn reflect_globals(module: &naga::Module) -> Vec<ReflectedGlobal> {
    let gctx = module.to_ctx();
    module
        .global_variables
        .iter()
        .filter_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            let ty = &module.types[var.ty];
            let kind = match (var.space, &ty.inner) {
                (naga::AddressSpace::Handle, naga::TypeInner::Image { dim, .. }) => match dim {
                    naga::ImageDimension::D2 => GlobalKind::Texture(TextureDimension::D2),
                    naga::ImageDimension::Cube => GlobalKind::Texture(TextureDimension::Cube),
                    _ => GlobalKind::Other,
                },
                (naga::AddressSpace::Handle, naga::TypeInner::Sampler { .. }) => GlobalKind::Sampler,
                (naga::AddressSpace::Uniform, inner) => GlobalKind::Uniform {
                    // Blocks without an instance name only carry the type name.
                    block: ty
                        .name
                        .clone()
                        .or_else(|| var.name.clone())
                        .unwrap_or_default(),
                    size: u64::from(inner.size(gctx)),
                },
                _ => GlobalKind::Other,
            };
            Some(ReflectedGlobal {
                name: var.name.clone().unwrap_or_default(),
                slot: BindingSlot::new(binding.group, binding.binding),
                kind,
            })
        })
        .collect()
}

/// Compiles fragment programs against the include library and hands them
/// to a backend.
pub struct ShaderUnit {
    composer: ShaderComposer,
}

impl Default for ShaderUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderUnit {
    /// A unit with the standard include library.
    pub fn new() -> Self {
        Self {
            composer: ShaderComposer::with_standard_library(),
        }
    }

    pub fn composer(&self) -> &ShaderComposer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut ShaderComposer {
        &mut self.composer
    }

    /// Translate and reflect a program without touching a backend.
    pub fn translate(
        &self,
        label: &str,
        source: &str,
        sampler_names: &[&str],
        options: &ShaderOptions,
    ) -> Result<ProgramDescriptor, CompileError> {
        let (module, info) = self.composer.compose_to_naga(label, source, options)?;
        let globals = reflect_globals(&module);

        let mut samplers = Vec::with_capacity(sampler_names.len());
        let mut claimed = HashSet::new();
        for name in sampler_names {
            let unresolved = || CompileError::UnresolvedSampler {
                shader: label.to_string(),
                name: name.to_string(),
            };
            let companion = format!("{name}_sampler");

            let (texture, dimension) = globals
                .iter()
                .find_map(|g| match g.kind {
                    GlobalKind::Texture(dim) if g.name == *name => Some((g.slot, dim)),
                    _ => None,
                })
                .ok_or_else(unresolved)?;
            let sampler = globals
                .iter()
                .find(|g| matches!(g.kind, GlobalKind::Sampler) && g.name == companion)
                .map(|g| g.slot)
                .ok_or_else(unresolved)?;

            claimed.insert(texture);
            claimed.insert(sampler);
            samplers.push(SamplerBinding {
                name: name.to_string(),
                texture,
                sampler,
                dimension,
            });
        }

        if let Some(stray) = globals.iter().find(|g| {
            matches!(g.kind, GlobalKind::Texture(_) | GlobalKind::Sampler) && !claimed.contains(&g.slot)
        }) {
            return Err(CompileError::UnlistedInput {
                shader: label.to_string(),
                name: stray.name.clone(),
            });
        }

        let uniform_blocks = globals
            .iter()
            .filter_map(|g| match &g.kind {
                GlobalKind::Uniform { block, size } => Some(UniformBlockBinding {
                    name: block.clone(),
                    slot: g.slot,
                    size: *size,
                }),
                _ => None,
            })
            .collect();

        let fragment_wgsl = write_wgsl(label, &module, &info)?;

        log::debug!(
            "Compiled shader '{}' ({} samplers, defines: {:?})",
            label,
            samplers.len(),
            options.defines
        );

        Ok(ProgramDescriptor {
            label: label.to_string(),
            vertex_wgsl: FULLSCREEN_VERTEX_SHADER.to_string(),
            fragment_wgsl,
            samplers,
            uniform_blocks,
            defines: options.defines.clone(),
        })
    }

    /// Compile a program and create it on `backend`.
    pub fn compile<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        label: &str,
        source: &str,
        sampler_names: &[&str],
        options: &ShaderOptions,
    ) -> EngineResult<ShaderProgram> {
        let desc = self.translate(label, source, sampler_names, options)?;
        let handle = backend.create_program(&desc)?;
        Ok(ShaderProgram {
            label: desc.label,
            handle,
            samplers: desc.samplers,
            uniform_blocks: desc.uniform_blocks,
            defines: desc.defines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;

    const SOLID: &str = r#"#version 450
#ifndef VALUE
#define VALUE 1.0
#endif
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 frag_color;
void main() {
    frag_color = vec4(VALUE);
}
"#;

    const TWO_INPUTS: &str = r#"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 frag_color;
layout(set = 1, binding = 0) uniform texture2D albedo;
layout(set = 1, binding = 1) uniform sampler albedo_sampler;
layout(set = 1, binding = 2) uniform textureCube sky;
layout(set = 1, binding = 3) uniform sampler sky_sampler;
void main() {
    vec4 a = texture(sampler2D(albedo, albedo_sampler), v_uv);
    vec4 b = texture(samplerCube(sky, sky_sampler), vec3(v_uv, 1.0));
    frag_color = a + b;
}
"#;

    const WITH_UBO: &str = r#"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 frag_color;
layout(set = 0, binding = 0) uniform ubo {
    vec3 view_pos;
    float view_yaw;
    float view_pitch;
    float time;
};
void main() {
    frag_color = vec4(view_pos, time + view_yaw + view_pitch);
}
"#;

    #[test]
    fn test_register_include() {
        let mut composer = ShaderComposer::new();
        composer.register_include("test/module.glsl", "float test_fn() { return 1.0; }");
        assert!(composer.includes.contains_key("test/module.glsl"));
    }

    #[test]
    fn test_include_resolution() {
        let mut composer = ShaderComposer::new();
        composer.register_include(
            "test/math.glsl",
            "float my_saturate(float x) { return clamp(x, 0.0, 1.0); }",
        );

        let source = "#version 450\n#include \"test/math.glsl\"\nvoid main() {}\n";
        let resolved = composer.resolve_glsl("test", source).unwrap();
        assert!(resolved.contains("float my_saturate"));
        assert!(!resolved.contains("#include"));
    }

    #[test]
    fn test_include_only_once() {
        let mut composer = ShaderComposer::new();
        composer.register_include("a.glsl", "float a() { return 1.0; }");
        composer.register_include("b.glsl", "#include \"a.glsl\"\nfloat b() { return a(); }");

        let source = "#include \"a.glsl\"\n#include \"b.glsl\"\n";
        let resolved = composer.resolve_glsl("test", source).unwrap();
        assert_eq!(resolved.matches("float a()").count(), 1);
        assert!(resolved.contains("float b()"));
    }

    #[test]
    fn test_unknown_include_fails() {
        let composer = ShaderComposer::with_standard_library();
        let result = composer.resolve_glsl("test", "#include \"missing.glsl\"\n");
        assert_eq!(
            result,
            Err(CompileError::Include {
                shader: "test".into(),
                path: "missing.glsl".into()
            })
        );
    }

    #[test]
    fn test_parse_include_directive() {
        assert_eq!(parse_include_directive("#include \"a/b.glsl\""), Some("a/b.glsl"));
        assert_eq!(parse_include_directive("#include <a.glsl>"), Some("a.glsl"));
        assert_eq!(parse_include_directive("#include a.glsl"), None);
        assert_eq!(parse_include_directive("#define X"), None);
    }

    #[test]
    fn test_defines_change_output() {
        let composer = ShaderComposer::new();
        let default = composer.compose("solid", SOLID, &ShaderOptions::default()).unwrap();
        let custom = composer
            .compose("solid", SOLID, &ShaderOptions::default().define("VALUE", "0.25"))
            .unwrap();
        assert!(!default.contains("0.25"));
        assert!(custom.contains("0.25"));
    }

    #[test]
    fn test_parse_error_reported() {
        let composer = ShaderComposer::new();
        let result = composer.compose("broken", "#version 450\nvoid main( {", &ShaderOptions::default());
        assert!(matches!(result, Err(CompileError::Parse { .. })));
    }

    #[test]
    fn test_sampler_reflection_in_declared_order() {
        let unit = ShaderUnit::new();
        let desc = unit
            .translate("two", TWO_INPUTS, &["sky", "albedo"], &ShaderOptions::default())
            .unwrap();

        assert_eq!(desc.samplers.len(), 2);
        assert_eq!(desc.samplers[0].name, "sky");
        assert_eq!(desc.samplers[0].dimension, TextureDimension::Cube);
        assert_eq!(desc.samplers[0].texture, BindingSlot::new(1, 2));
        assert_eq!(desc.samplers[0].sampler, BindingSlot::new(1, 3));
        assert_eq!(desc.samplers[1].name, "albedo");
        assert_eq!(desc.samplers[1].dimension, TextureDimension::D2);
        assert_eq!(desc.samplers[1].texture, BindingSlot::new(1, 0));
        assert!(desc.vertex_wgsl.contains("vs_main"));
    }

    #[test]
    fn test_unresolved_sampler() {
        let unit = ShaderUnit::new();
        let result = unit.translate("two", TWO_INPUTS, &["albedo", "normals"], &ShaderOptions::default());
        assert_eq!(
            result.unwrap_err(),
            CompileError::UnresolvedSampler {
                shader: "two".into(),
                name: "normals".into()
            }
        );
    }

    #[test]
    fn test_unlisted_texture_rejected() {
        let unit = ShaderUnit::new();
        let result = unit.translate("two", TWO_INPUTS, &["albedo"], &ShaderOptions::default());
        assert!(matches!(result, Err(CompileError::UnlistedInput { .. })));
    }

    #[test]
    fn test_uniform_block_reflection() {
        let unit = ShaderUnit::new();
        let desc = unit
            .translate("ubo", WITH_UBO, &[], &ShaderOptions::default())
            .unwrap();

        assert_eq!(desc.uniform_blocks.len(), 1);
        let block = &desc.uniform_blocks[0];
        assert_eq!(block.name, "ubo");
        assert_eq!(block.slot, BindingSlot::new(0, 0));
        assert_eq!(block.size, 32);
    }

    #[test]
    fn test_builtin_shaders_compile() {
        let unit = ShaderUnit::new();
        for shader in BUILTIN_SHADERS {
            let desc = unit
                .translate(shader.label, shader.source, shader.samplers, &ShaderOptions::default())
                .unwrap_or_else(|e| panic!("{}: {e}", shader.label));
            assert_eq!(desc.samplers.len(), shader.samplers.len());
            assert!(desc.uniform_blocks.is_empty());
        }
    }

    #[test]
    fn test_compile_creates_backend_program() {
        let unit = ShaderUnit::new();
        let mut backend = SoftwareBackend::with_library_kernels(4, 4);
        let program = unit
            .compile(
                &mut backend,
                library::TONEMAP.label,
                library::TONEMAP.source,
                library::TONEMAP.samplers,
                &ShaderOptions::default().define("GAMMA", "1.0"),
            )
            .unwrap();

        assert_eq!(program.label(), library::TONEMAP.label);
        assert_eq!(program.samplers().len(), 1);
        assert_eq!(program.defines().get("GAMMA").map(String::as_str), Some("1.0"));
        assert_eq!(backend.live_objects().1, 1);
    }
}
