//! Backend operation contract
//!
//! The interpreter drives a graphics API exclusively through [`Backend`].
//! Every operation is blocking; a backend that submits work asynchronously
//! must wait for it before returning.

use crate::caps::Capabilities;
use crate::compiler::{CompiledShader, ShaderType};
use crate::format::Format;
use crate::registry::{Registry, Resource};
use crate::resource::{ComparisonFunc, InputElement, ResourceDesc, SamplerDesc};

/// Number of user clip planes
pub const MAX_CLIP_PLANES: usize = 8;
/// Number of viewports a test may set
pub const MAX_VIEWPORTS: usize = 4;

/// Primitive topology of a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    /// Patches with the given number of control points (1 to 32)
    PatchList(u32),
}

/// Value a `clear` writes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    Depth(f32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ShadeMode {
    Flat,
    #[default]
    Gouraud,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FogMode {
    None,
    Linear,
    Exp,
    Exp2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointSize {
    pub size: f32,
    pub min: f32,
    pub max: f32,
}

impl Default for PointSize {
    fn default() -> Self {
        Self {
            size: 1.0,
            min: 1.0,
            max: f32::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// Pipeline state set by test directives rather than by shaders
#[derive(Debug, Clone, PartialEq)]
pub struct FixedFunctionState {
    /// Depth test function; `None` disables the depth test
    pub depth_func: Option<ComparisonFunc>,
    pub depth_bounds: Option<(f32, f32)>,
    pub sample_mask: u32,
    /// Alpha test function and reference; `None` disables the alpha test
    pub alpha_test: Option<(ComparisonFunc, f32)>,
    pub shade_mode: ShadeMode,
    pub clip_planes: [Option<[f32; 4]>; MAX_CLIP_PLANES],
    pub point_size: PointSize,
    pub point_sprite: bool,
    /// Fog mode; `None` disables fog
    pub fog: Option<FogMode>,
    pub fog_colour: [f32; 4],
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        Self {
            depth_func: Some(ComparisonFunc::Less),
            depth_bounds: None,
            sample_mask: u32::MAX,
            alpha_test: None,
            shade_mode: ShadeMode::default(),
            clip_planes: [None; MAX_CLIP_PLANES],
            point_size: PointSize::default(),
            point_sprite: false,
            fog: None,
            fog_colour: [0.0; 4],
        }
    }
}

/// Read-only view of everything a draw or dispatch consumes
pub struct RenderState<'a, H> {
    /// Compiled shaders by [`ShaderType::index`]
    pub shaders: &'a [Option<CompiledShader>; ShaderType::COUNT],
    pub registry: &'a Registry<H>,
    pub input_elements: &'a [InputElement],
    /// Contents of the uniform buffer bound at `b0`
    pub uniforms: &'a [u8],
    pub viewports: &'a [Option<Viewport>; MAX_VIEWPORTS],
    pub fixed: &'a FixedFunctionState,
}

impl<H> RenderState<'_, H> {
    /// The compiled shader for a stage, if any
    pub fn shader(&self, shader_type: ShaderType) -> Option<&CompiledShader> {
        self.shaders[shader_type.index()].as_ref()
    }

    /// Every live resource
    pub fn resources(&self) -> &[Resource<H>] {
        self.registry.resources()
    }

    /// Every sampler
    pub fn samplers(&self) -> &[SamplerDesc] {
        self.registry.samplers()
    }
}

/// Contents of one subresource copied back to the CPU
#[derive(Debug, Clone, PartialEq)]
pub struct Readback {
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Bytes between the starts of consecutive rows
    pub row_pitch: usize,
    /// Bytes per texel or buffer element
    pub texel_size: usize,
    pub data: Vec<u8>,
}

impl Readback {
    /// Bytes of the texel at (x, y, z), if in bounds
    pub fn texel(&self, x: u32, y: u32, z: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height || z >= self.depth {
            return None;
        }
        let slice_pitch = self.row_pitch * self.height as usize;
        let offset = z as usize * slice_pitch + y as usize * self.row_pitch + x as usize * self.texel_size;
        self.data.get(offset..offset + self.texel_size)
    }
}

/// Why a backend could not create a resource
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend does not support this kind of resource
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Creation was attempted and failed
    #[error("failed: {0}")]
    Failed(String),
}

/// A graphics API the interpreter can run tests on
pub trait Backend {
    /// Backend object owned by a live resource
    type Resource;

    /// What the backend supports
    fn capabilities(&self) -> &Capabilities;

    /// Creates a resource with the given initial contents
    fn create_resource(&mut self, desc: &ResourceDesc, data: &[u8]) -> Result<Self::Resource, BackendError>;

    /// Releases a resource
    fn destroy_resource(&mut self, resource: Resource<Self::Resource>);

    /// Clears a render target or depth-stencil resource
    fn clear(&mut self, resource: &Resource<Self::Resource>, value: ClearValue) -> bool;

    /// Draws with the current state
    fn draw(&mut self, state: &RenderState<'_, Self::Resource>, topology: Topology, vertex_count: u32, instance_count: u32) -> bool;

    /// Dispatches the current compute shader
    fn dispatch(&mut self, state: &RenderState<'_, Self::Resource>, x: u32, y: u32, z: u32) -> bool;

    /// Copies every subresource of `src` into `dst`
    fn copy(&mut self, src: &Resource<Self::Resource>, dst: &Resource<Self::Resource>) -> bool;

    /// Reads a subresource back to the CPU
    fn readback(&mut self, resource: &Resource<Self::Resource>, subresource: u32) -> Option<Readback>;
}

/// A backend that only advertises capabilities
///
/// Used when shaders are compiled but never executed.
#[derive(Debug, Clone, Default)]
pub struct CompileOnlyBackend {
    caps: Capabilities,
}

impl CompileOnlyBackend {
    pub fn new(caps: Capabilities) -> Self {
        Self { caps }
    }
}

impl Backend for CompileOnlyBackend {
    type Resource = ();

    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn create_resource(&mut self, _desc: &ResourceDesc, _data: &[u8]) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("resources are not created when only compiling".to_string()))
    }

    fn destroy_resource(&mut self, _resource: Resource<()>) {}

    fn clear(&mut self, _resource: &Resource<()>, _value: ClearValue) -> bool {
        false
    }

    fn draw(&mut self, _state: &RenderState<'_, ()>, _topology: Topology, _vertex_count: u32, _instance_count: u32) -> bool {
        false
    }

    fn dispatch(&mut self, _state: &RenderState<'_, ()>, _x: u32, _y: u32, _z: u32) -> bool {
        false
    }

    fn copy(&mut self, _src: &Resource<()>, _dst: &Resource<()>) -> bool {
        false
    }

    fn readback(&mut self, _resource: &Resource<()>, _subresource: u32) -> Option<Readback> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readback_texel_addressing() {
        let readback = Readback {
            format: Format::R8Unorm,
            width: 2,
            height: 2,
            depth: 2,
            row_pitch: 4,
            texel_size: 1,
            data: (0..16).collect(),
        };

        assert_eq!(readback.texel(0, 0, 0), Some(&[0u8][..]));
        assert_eq!(readback.texel(1, 1, 0), Some(&[5u8][..]));
        assert_eq!(readback.texel(1, 0, 1), Some(&[9u8][..]));
        assert_eq!(readback.texel(2, 0, 0), None);
    }

    #[test]
    fn test_fixed_function_defaults() {
        let state = FixedFunctionState::default();
        assert_eq!(state.depth_func, Some(ComparisonFunc::Less));
        assert_eq!(state.sample_mask, u32::MAX);
        assert!(state.clip_planes.iter().all(Option::is_none));
    }
}
