//! Mutable state of one run over one test file

use crate::backend::{Backend, FixedFunctionState, MAX_VIEWPORTS, RenderState, Viewport};
use crate::caps::Capabilities;
use crate::compiler::{CompileOptions, CompiledShader, ShaderSource, ShaderType};
use crate::model::ShaderModel;
use crate::registry::Registry;
use crate::resource::InputElement;

/// Byte written into uniform buffer regions no directive has set
pub const UNIFORM_FILL: u8 = 0x7f;

/// Largest uniform buffer in bytes, 4096 four-component vectors
pub const MAX_UNIFORM_SIZE: usize = 4096 * 16;

/// What the runner currently does with `[test]` blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestAction {
    /// Execute test directives on the backend
    Run,
    /// Only compile shaders
    Compile,
    /// Report the block as skipped
    Skip,
}

/// A stored shader stage
#[derive(Debug, Clone, Default)]
pub struct ShaderSlot {
    pub source: Option<ShaderSource>,
    /// Model the stored compile result belongs to
    pub compiled_at: Option<ShaderModel>,
    /// The last compile at `compiled_at` failed
    pub failed: bool,
}

impl ShaderSlot {
    /// Whether the stored compile result is missing or for another model
    pub fn is_stale(&self, model: ShaderModel) -> bool {
        self.source.is_some() && self.compiled_at != Some(model)
    }
}

/// Everything a run mutates
pub struct Session<H> {
    pub minimum_model: ShaderModel,
    pub maximum_model: ShaderModel,
    pub shaders: [ShaderSlot; ShaderType::COUNT],
    /// Compiled shaders by stage
    pub compiled: [Option<CompiledShader>; ShaderType::COUNT],
    pub options: CompileOptions,
    pub uniforms: Vec<u8>,
    pub registry: Registry<H>,
    pub input_elements: Vec<InputElement>,
    pub viewports: [Option<Viewport>; MAX_VIEWPORTS],
    pub fixed: FixedFunctionState,
    pub last_render_failed: bool,
    pub action: TestAction,
    pub skip_reason: Option<String>,
}

impl<H> Session<H> {
    /// Creates a session spanning the capabilities' model range
    pub fn new(caps: &Capabilities, action: TestAction) -> Self {
        Self {
            minimum_model: caps.minimum_model,
            maximum_model: caps.maximum_model,
            shaders: Default::default(),
            compiled: Default::default(),
            options: CompileOptions::empty(),
            uniforms: Vec::new(),
            registry: Registry::new(),
            input_elements: Vec::new(),
            viewports: [None; MAX_VIEWPORTS],
            fixed: FixedFunctionState::default(),
            last_render_failed: false,
            action,
            skip_reason: None,
        }
    }

    /// Stores a compile result for a stage
    pub fn set_compiled(&mut self, shader_type: ShaderType, model: ShaderModel, compiled: Option<CompiledShader>) {
        let slot = &mut self.shaders[shader_type.index()];
        slot.failed = compiled.is_none();
        slot.compiled_at = Some(model);
        self.compiled[shader_type.index()] = compiled;
    }

    /// Replaces the source of a stage, dropping any compile result
    pub fn set_source(&mut self, shader_type: ShaderType, source: ShaderSource) {
        self.shaders[shader_type.index()] = ShaderSlot {
            source: Some(source),
            ..Default::default()
        };
        self.compiled[shader_type.index()] = None;
    }

    /// Whether any stored shader failed its last compile
    pub fn has_failed_shader(&self) -> bool {
        self.shaders.iter().any(|slot| slot.source.is_some() && slot.failed)
    }

    /// Writes values into the uniform buffer
    ///
    /// The buffer grows to a multiple of four 32-bit slots covering the
    /// write; newly exposed bytes are filled with [`UNIFORM_FILL`].
    ///
    /// # Arguments
    /// * `offset` - Offset in 32-bit slots
    /// * `data` - Little-endian bytes to write
    pub fn write_uniform(&mut self, offset: u32, data: &[u8]) {
        let offset = offset as usize * 4;
        let end_slots = (offset + data.len()).div_ceil(4);
        let slots = (self.uniforms.len() / 4).max(end_slots).next_multiple_of(4);
        if slots * 4 > self.uniforms.len() {
            self.uniforms.resize(slots * 4, UNIFORM_FILL);
        }
        self.uniforms[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Read-only view for draws and dispatches
    pub fn render_state(&self) -> RenderState<'_, H> {
        RenderState {
            shaders: &self.compiled,
            registry: &self.registry,
            input_elements: &self.input_elements,
            uniforms: &self.uniforms,
            viewports: &self.viewports,
            fixed: &self.fixed,
        }
    }

    /// Destroys every live resource
    pub fn teardown<B: Backend<Resource = H>>(&mut self, backend: &mut B) {
        for resource in self.registry.drain() {
            backend.destroy_resource(resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_growth_and_fill() {
        let mut session: Session<()> = Session::new(&Capabilities::default(), TestAction::Run);
        let values: Vec<u8> = [1.0f32, 2.0, 3.0, 4.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        session.write_uniform(4, &values);

        assert_eq!(session.uniforms.len(), 8 * 4);
        assert!(session.uniforms[..16].iter().all(|b| *b == UNIFORM_FILL));
        assert_eq!(&session.uniforms[16..], &values[..]);

        session.write_uniform(0, &7u32.to_le_bytes());
        assert_eq!(session.uniforms.len(), 8 * 4);
        assert_eq!(&session.uniforms[..4], &7u32.to_le_bytes());
        assert_eq!(session.uniforms[4], UNIFORM_FILL);

        session.write_uniform(9, &1u32.to_le_bytes());
        assert_eq!(session.uniforms.len(), 12 * 4);
        assert_eq!(session.uniforms[32], UNIFORM_FILL);
    }

    #[test]
    fn test_shader_slots() {
        let mut session: Session<()> = Session::new(&Capabilities::default(), TestAction::Run);
        session.set_source(ShaderType::Pixel, ShaderSource::default());
        assert!(session.shaders[ShaderType::Pixel.index()].is_stale(ShaderModel::Sm4_0));

        session.set_compiled(ShaderType::Pixel, ShaderModel::Sm4_0, None);
        assert!(session.has_failed_shader());
        assert!(!session.shaders[ShaderType::Pixel.index()].is_stale(ShaderModel::Sm4_0));
        assert!(session.shaders[ShaderType::Pixel.index()].is_stale(ShaderModel::Sm5_0));

        session.set_source(ShaderType::Pixel, ShaderSource::default());
        assert!(!session.has_failed_shader());
    }
}
