//! In-memory backend and compiler for interpreter tests

use crate::backend::{Backend, BackendError, ClearValue, Readback, RenderState, Topology};
use crate::caps::Capabilities;
use crate::compiler::{CompileError, CompileOptions, CompiledShader, ShaderCode, ShaderCompiler, ShaderSource, ShaderType};
use crate::format::Format;
use crate::model::{ModelMask, ShaderModel};
use crate::registry::Resource;
use crate::resource::{ResourceDesc, ResourceType};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Backend keeping subresource 0 of every resource in memory
///
/// Draws fill render target 0 with the first 16 bytes of the uniform
/// buffer, which lets tests steer rendered colours through `uniform`.
pub struct RecordingBackend {
    pub caps: Capabilities,
    pub log: Vec<String>,
    pub live: BTreeMap<u32, (ResourceDesc, Vec<u8>)>,
    pub draw_result: bool,
    pub fail_creation: Option<BackendError>,
    /// Clears `fail_creation` after the first creation it fails
    pub fail_once: bool,
    next_id: u32,
}

impl RecordingBackend {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            caps,
            log: Vec::new(),
            live: BTreeMap::new(),
            draw_result: true,
            fail_creation: None,
            fail_once: false,
            next_id: 0,
        }
    }

    fn fill(&mut self, id: u32, texel: &[u8]) {
        if let Some((_, data)) = self.live.get_mut(&id) {
            for chunk in data.chunks_mut(texel.len()) {
                chunk.copy_from_slice(&texel[..chunk.len()]);
            }
        }
    }

    pub fn entries(&self, prefix: &str) -> usize {
        self.log.iter().filter(|entry| entry.starts_with(prefix)).count()
    }
}

impl Backend for RecordingBackend {
    type Resource = u32;

    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn create_resource(&mut self, desc: &ResourceDesc, data: &[u8]) -> Result<u32, BackendError> {
        self.log.push(format!("create {} {}", desc.ty, desc.slot));
        let failure = if self.fail_once { self.fail_creation.take() } else { self.fail_creation.clone() };
        if let Some(error) = failure {
            return Err(error);
        }

        let size = if desc.dimension.is_buffer() && desc.ty == ResourceType::VertexBuffer {
            desc.width as usize
        } else {
            (desc.width * desc.height * desc.depth * desc.texel_size) as usize
        };
        let mut contents = vec![0; size];
        let copied = data.len().min(size);
        contents[..copied].copy_from_slice(&data[..copied]);

        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, (*desc, contents));
        Ok(id)
    }

    fn destroy_resource(&mut self, resource: Resource<u32>) {
        self.log.push(format!("destroy {} {}", resource.desc.ty, resource.desc.slot));
        self.live.remove(&resource.handle);
    }

    fn clear(&mut self, resource: &Resource<u32>, value: ClearValue) -> bool {
        self.log.push(format!("clear {} {}", resource.desc.ty, resource.desc.slot));
        let texel: Vec<u8> = match (value, resource.desc.format) {
            (ClearValue::Color(color), Format::R32G32B32A32Float) => bytemuck::cast_slice(&color).to_vec(),
            (ClearValue::Depth(depth), Format::D32Float) => depth.to_le_bytes().to_vec(),
            _ => return false,
        };
        self.fill(resource.handle, &texel);
        true
    }

    fn draw(&mut self, state: &RenderState<'_, u32>, topology: Topology, vertex_count: u32, instance_count: u32) -> bool {
        self.log.push(format!("draw {topology:?} {vertex_count} {instance_count}"));
        if !self.draw_result {
            return false;
        }
        if let (Some(target), Some(colour)) = (state.registry.get(ResourceType::RenderTarget, 0), state.uniforms.get(..16)) {
            let colour = colour.to_vec();
            self.fill(target.handle, &colour);
        }
        true
    }

    fn dispatch(&mut self, _state: &RenderState<'_, u32>, x: u32, y: u32, z: u32) -> bool {
        self.log.push(format!("dispatch {x} {y} {z}"));
        true
    }

    fn copy(&mut self, src: &Resource<u32>, dst: &Resource<u32>) -> bool {
        self.log.push(format!("copy {} {} {} {}", src.desc.ty, src.desc.slot, dst.desc.ty, dst.desc.slot));
        let Some((_, data)) = self.live.get(&src.handle).cloned() else {
            return false;
        };
        match self.live.get_mut(&dst.handle) {
            Some((_, target)) if target.len() == data.len() => {
                target.copy_from_slice(&data);
                true
            }
            _ => false,
        }
    }

    fn readback(&mut self, resource: &Resource<u32>, subresource: u32) -> Option<Readback> {
        self.log.push(format!("readback {} {} {subresource}", resource.desc.ty, resource.desc.slot));
        let (desc, data) = self.live.get(&resource.handle)?;
        Some(Readback {
            format: desc.format,
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            row_pitch: (desc.width * desc.texel_size) as usize,
            texel_size: desc.texel_size as usize,
            data: data.clone(),
        })
    }
}

/// Compiler whose results are decided by the test
///
/// Sources containing `FAIL` fail to compile; otherwise the masks decide.
#[derive(Default)]
pub struct ScriptedCompiler {
    pub fail: ModelMask,
    pub not_implemented: ModelMask,
    pub calls: RefCell<Vec<(ShaderType, ShaderModel)>>,
}

impl ShaderCompiler for ScriptedCompiler {
    fn compile(&self, source: &ShaderSource, shader_type: ShaderType, model: ShaderModel, _options: CompileOptions) -> Result<CompiledShader, CompileError> {
        self.calls.borrow_mut().push((shader_type, model));

        if source.text.contains("FAIL") || self.fail.contains(model) {
            return Err(CompileError::Failed(format!("{shader_type} rejected at {model}")));
        }
        if self.not_implemented.contains(model) {
            return Err(CompileError::NotImplemented(format!("{model}")));
        }

        Ok(CompiledShader {
            shader_type,
            model,
            code: ShaderCode::Wgsl(source.text.clone()),
            entry_point: "main".to_string(),
            bindings: Vec::new(),
        })
    }

    fn preprocess(&self, source: &str) -> Result<String, CompileError> {
        if source.contains("#error") {
            return Err(CompileError::Failed("#error directive".to_string()));
        }
        Ok(source.to_string())
    }
}
