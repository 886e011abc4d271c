//! Test file interpreter
//!
//! [`ShaderRunner`] reads a test file line by line. Lines starting with `[`
//! close the current block and open a new one; everything else is handed to
//! the grammar of the open block. Most blocks only take effect when they are
//! closed (a resource is created, a shader compiled), while `[test]` lines
//! run as soon as they are read.
//!
//! # Examples
//!
//! ```ignore
//! let mut backend = WgpuRunner::new().await?;
//! let compiler = NagaCompiler::default();
//! let summary = ShaderRunner::new(&mut backend, &compiler, RunnerOptions::default()).run_file("tests/hlsl/abs.shader_test")?;
//! println!("{summary}");
//! ```

use crate::backend::{Backend, BackendError, ClearValue, Readback, Topology};
use crate::caps::Capabilities;
use crate::compiler::{CompileError, CompileStatus, CompiledShader, ShaderCompiler, ShaderSource, ShaderType, SourceFormat};
use crate::directives::input_layout::parse_input_element;
use crate::directives::require::RequireBlock;
use crate::directives::resource::parse_resource_line;
use crate::directives::sampler::parse_sampler_line;
use crate::directives::shader::ShaderHeader;
use crate::directives::test::{ResourceRef, TestCommand, TestLine, parse_test_line};
use crate::directives::{BlockHeader, parse_block_header};
use crate::error::{ParseError, RunnerError, parse_bail};
use crate::format::Format;
use crate::model::{ShaderModel, select_variants};
use crate::probe::{ProbeRect, ProbeValue, probe};
use crate::qualifier::QualifierContext;
use crate::registry::{Registry, Resource};
use crate::report::{Reporter, Summary};
use crate::resource::{Dimension, InputElement, ResourceDesc, ResourceParams, ResourceType, SamplerDesc};
use crate::session::{Session, TestAction};
use std::path::Path;

/// Vertex shader `draw quad` pairs with HLSL pixel shaders
const QUAD_VERTEX_SHADER_HLSL: &str = "float4 main(float4 pos : position) : sv_position\n{\n    return pos;\n}\n";

/// Vertex shader `draw quad` pairs with WGSL pixel shaders
const QUAD_VERTEX_SHADER_WGSL: &str = "@vertex\nfn main(@location(0) position: vec2<f32>) -> @builtin(position) vec4<f32> {\n    return vec4<f32>(position, 0.0, 1.0);\n}\n";

/// One triangle covering the whole viewport
const QUAD_VERTICES: [[f32; 2]; 3] = [[-2.0, -2.0], [-2.0, 4.0], [4.0, -2.0]];

/// Render target `draw quad` creates when none is bound
const QUAD_TARGET_SIZE: (u32, u32) = (640, 480);

/// Whether tests are executed or shaders only compiled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RunMode {
    /// Create resources, compile shaders and execute `[test]` blocks
    #[default]
    Run,
    /// Compile every shader at a representative set of models; nothing is executed
    CompileOnly,
}

/// Options for a [`ShaderRunner`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerOptions {
    pub mode: RunMode,
}

/// Kind of block the interpreter is inside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockState {
    None,
    InputLayout,
    Preproc,
    PreprocInvalid,
    Require,
    Resource,
    Sampler,
    Shader,
    Test,
}

/// The open block together with what it has accumulated
enum ActiveBlock {
    None,
    InputLayout,
    Preproc { text: String, invalid: bool },
    Require(RequireBlock),
    Resource(ResourceParams),
    Sampler(SamplerDesc),
    Shader { header: ShaderHeader, text: String },
    Test,
}

impl ActiveBlock {
    fn state(&self) -> BlockState {
        match self {
            ActiveBlock::None => BlockState::None,
            ActiveBlock::InputLayout => BlockState::InputLayout,
            ActiveBlock::Preproc { invalid: false, .. } => BlockState::Preproc,
            ActiveBlock::Preproc { invalid: true, .. } => BlockState::PreprocInvalid,
            ActiveBlock::Require(_) => BlockState::Require,
            ActiveBlock::Resource(_) => BlockState::Resource,
            ActiveBlock::Sampler(_) => BlockState::Sampler,
            ActiveBlock::Shader { .. } => BlockState::Shader,
            ActiveBlock::Test => BlockState::Test,
        }
    }

    /// Appends a raw source line, returning false for blocks that do not accumulate source
    fn accumulate(&mut self, line: &str) -> bool {
        match self {
            ActiveBlock::Shader { text, .. } | ActiveBlock::Preproc { text, .. } => {
                text.push_str(line);
                text.push('\n');
                true
            }
            _ => false,
        }
    }
}

/// Runs test files against a backend and a shader compiler
pub struct ShaderRunner<'a, B: Backend, C: ShaderCompiler> {
    backend: &'a mut B,
    compiler: &'a C,
    options: RunnerOptions,
}

impl<'a, B: Backend, C: ShaderCompiler> ShaderRunner<'a, B, C> {
    /// Creates a runner
    ///
    /// # Arguments
    /// * `backend` - Graphics API the tests execute on
    /// * `compiler` - Compiler for shader blocks
    /// * `options` - Run mode
    pub fn new(backend: &'a mut B, compiler: &'a C, options: RunnerOptions) -> Self {
        Self { backend, compiler, options }
    }

    /// Reads and runs a test file
    pub fn run_file<P: AsRef<Path>>(&mut self, path: P) -> Result<Summary, RunnerError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| RunnerError::Io { path: name.clone(), source })?;
        self.run_source(&name, &text)
    }

    /// Runs a test file already in memory
    ///
    /// Every resource created for the file is destroyed before returning,
    /// whether or not the run succeeded.
    ///
    /// # Arguments
    /// * `name` - File name used in reports and errors
    /// * `text` - Contents of the test file
    ///
    /// # Returns
    /// The counters of every check made, or the fatal error that stopped the run
    pub fn run_source(&mut self, name: &str, text: &str) -> Result<Summary, RunnerError> {
        tracing::info!("Running {name}");

        let caps = self.backend.capabilities().clone();
        let mut interpreter = Interpreter {
            name,
            mode: self.options.mode,
            session: Session::new(&caps, default_action(self.options.mode)),
            caps,
            backend: &mut *self.backend,
            compiler: self.compiler,
            reporter: Reporter::new(name),
        };

        let result = interpreter.run(text);
        interpreter.session.teardown(interpreter.backend);

        let summary = result.map(|()| interpreter.reporter.summary())?;
        tracing::info!("{name}: {summary}");
        Ok(summary)
    }
}

fn default_action(mode: RunMode) -> TestAction {
    match mode {
        RunMode::Run => TestAction::Run,
        RunMode::CompileOnly => TestAction::Compile,
    }
}

/// State of one run over one file
struct Interpreter<'r, B: Backend, C: ShaderCompiler> {
    name: &'r str,
    mode: RunMode,
    caps: Capabilities,
    backend: &'r mut B,
    compiler: &'r C,
    session: Session<B::Resource>,
    reporter: Reporter,
}

impl<B: Backend, C: ShaderCompiler> Interpreter<'_, B, C> {
    fn run(&mut self, text: &str) -> Result<(), RunnerError> {
        let mut block = ActiveBlock::None;
        let mut block_line = 0;

        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;

            if line.starts_with('[') {
                let finished = std::mem::replace(&mut block, ActiveBlock::None);
                self.finish_block(finished, block_line)?;
                block = self.start_block(line).map_err(|e| RunnerError::at(self.name, line_number, e))?;
                block_line = line_number;
                tracing::debug!("{}:{line_number}: Entering {:?} block", self.name, block.state());
                continue;
            }

            if block.accumulate(line) || line.starts_with('%') || line.trim().is_empty() {
                continue;
            }

            tracing::trace!("{}:{line_number}: {line}", self.name);
            self.parse_line(&mut block, line, line_number).map_err(|e| RunnerError::at(self.name, line_number, e))?;
        }

        self.finish_block(block, block_line)
    }

    fn context(&self) -> QualifierContext<'_> {
        QualifierContext::new(self.session.minimum_model, &self.caps.tags)
    }

    fn start_block(&mut self, line: &str) -> Result<ActiveBlock, ParseError> {
        Ok(match parse_block_header(line, &self.context())? {
            BlockHeader::Require => ActiveBlock::Require(RequireBlock::default()),
            BlockHeader::Test => ActiveBlock::Test,
            BlockHeader::Preproc => ActiveBlock::Preproc {
                text: String::new(),
                invalid: false,
            },
            BlockHeader::PreprocInvalid => ActiveBlock::Preproc {
                text: String::new(),
                invalid: true,
            },
            BlockHeader::InputLayout => {
                self.session.input_elements.clear();
                ActiveBlock::InputLayout
            }
            BlockHeader::Shader(header) => ActiveBlock::Shader { header, text: String::new() },
            BlockHeader::Resource(ty, slot) => ActiveBlock::Resource(ResourceParams::new(ty, slot)),
            BlockHeader::Sampler(slot) => ActiveBlock::Sampler(SamplerDesc::new(slot)),
        })
    }

    fn parse_line(&mut self, block: &mut ActiveBlock, line: &str, line_number: usize) -> Result<(), ParseError> {
        match block {
            ActiveBlock::None => parse_bail!("Directive outside of any block."),
            ActiveBlock::InputLayout => self.session.input_elements.push(parse_input_element(line)?),
            ActiveBlock::Require(require) => require.parse_line(line)?,
            ActiveBlock::Resource(params) => parse_resource_line(params, line)?,
            ActiveBlock::Sampler(sampler) => parse_sampler_line(sampler, line)?,
            ActiveBlock::Test => self.run_test_line(line, line_number)?,
            ActiveBlock::Shader { .. } | ActiveBlock::Preproc { .. } => {}
        }
        Ok(())
    }

    /// Applies a block that just ended
    ///
    /// Fatal errors are attributed to the block's header line.
    fn finish_block(&mut self, block: ActiveBlock, line: usize) -> Result<(), RunnerError> {
        let result = match block {
            ActiveBlock::None | ActiveBlock::InputLayout => Ok(()),
            ActiveBlock::Test => {
                if self.session.action == TestAction::Skip {
                    let reason = self.session.skip_reason.clone().unwrap_or_default();
                    self.reporter.skip(line, reason);
                }
                Ok(())
            }
            ActiveBlock::Require(require) => {
                self.finish_require(&require);
                Ok(())
            }
            ActiveBlock::Resource(params) => self.finish_resource(params, line),
            ActiveBlock::Sampler(sampler) => self.session.registry.set_sampler(sampler),
            ActiveBlock::Shader { header, text } => {
                self.finish_shader(&header, text, line);
                Ok(())
            }
            ActiveBlock::Preproc { text, invalid } => {
                self.finish_preproc(&text, invalid, line);
                Ok(())
            }
        };
        result.map_err(|e| RunnerError::at(self.name, line, e))
    }

    fn finish_require(&mut self, require: &RequireBlock) {
        let requirements = require.evaluate(&self.caps);

        self.session.minimum_model = requirements.minimum_model;
        self.session.maximum_model = requirements.maximum_model.unwrap_or(ShaderModel::MIN);
        self.session.options = requirements.options;
        for slot in &mut self.session.shaders {
            slot.compiled_at = None;
        }

        match requirements.skip_reason() {
            Some(reason) => {
                tracing::debug!("{}: Skipping tests: {reason}", self.name);
                self.session.action = TestAction::Skip;
                self.session.skip_reason = Some(reason);
            }
            None => {
                self.session.action = default_action(self.mode);
                self.session.skip_reason = None;
            }
        }
    }

    fn finish_resource(&mut self, params: ResourceParams, line: usize) -> Result<(), ParseError> {
        let ResourceParams { mut desc, data, explicit_format } = params;

        if desc.ty == ResourceType::Uav && !explicit_format {
            parse_bail!("UAV {} needs an explicit format or stride.", desc.slot);
        }
        if desc.ty == ResourceType::VertexBuffer {
            desc.width = data.len() as u32;
        }
        if desc.level_count > desc.max_level_count() {
            parse_bail!("{} {} has {} levels, at most {} fit its size.", desc.ty, desc.slot, desc.level_count, desc.max_level_count());
        }

        if self.mode == RunMode::Run && self.session.action != TestAction::Skip {
            self.create_resource(desc, &data, line)?;
        }
        Ok(())
    }

    /// Creates and registers a resource, reporting a failed creation
    ///
    /// # Returns
    /// Whether the resource now exists
    fn create_resource(&mut self, desc: ResourceDesc, data: &[u8], line: usize) -> Result<bool, ParseError> {
        tracing::debug!("{}:{line}: Creating {} {} ({}x{}x{} {})", self.name, desc.ty, desc.slot, desc.width, desc.height, desc.depth, desc.format);

        match self.backend.create_resource(&desc, data) {
            Ok(handle) => {
                self.session.registry.clear_failed(desc.ty, desc.slot);
                if let Some(replaced) = self.session.registry.insert(Resource { desc, handle })? {
                    self.backend.destroy_resource(replaced);
                }
                Ok(true)
            }
            Err(error) => {
                self.session.registry.mark_failed(desc.ty, desc.slot);
                match error {
                    BackendError::Unsupported(reason) => self.reporter.skip(line, format!("{} {}: {reason}", desc.ty, desc.slot)),
                    BackendError::Failed(reason) => {
                        self.reporter.check(false, false, false, line, format!("Failed to create {} {}: {reason}", desc.ty, desc.slot));
                    }
                }
                Ok(false)
            }
        }
    }

    fn finish_shader(&mut self, header: &ShaderHeader, text: String, line: usize) {
        let shader_type = header.shader_type;
        let source = ShaderSource::new(text, header.format);
        self.session.set_source(shader_type, source.clone());

        match self.session.action {
            TestAction::Skip => {}
            TestAction::Compile => {
                if !self.caps.accepts_source(header.format) {
                    self.reporter.skip(line, format!("{} does not accept {} sources", self.caps.compiler, header.format));
                    return;
                }
                for model in select_variants(self.session.minimum_model, self.session.maximum_model, &header.expected) {
                    let result = self.compiler.compile(&source, shader_type, model, self.session.options);
                    self.check_compile(header, model, &result, line);
                }
            }
            TestAction::Run => {
                if !self.caps.accepts_source(header.format) {
                    let reason = format!("{} does not accept {} sources", self.caps.runner, header.format);
                    tracing::debug!("{}:{line}: Skipping tests: {reason}", self.name);
                    self.session.action = TestAction::Skip;
                    self.session.skip_reason = Some(reason);
                    return;
                }

                let model = self.session.minimum_model;
                let result = self.compiler.compile(&source, shader_type, model, self.session.options);
                self.check_compile(header, model, &result, line);
                self.session.set_compiled(shader_type, model, result.ok());
            }
        }
    }

    fn check_compile(&mut self, header: &ShaderHeader, model: ShaderModel, result: &Result<CompiledShader, CompileError>, line: usize) {
        if let Err(error) = result {
            tracing::debug!("{}:{line}: {} at {model}: {error}", self.name, header.shader_type);
        }

        let got = CompileStatus::of(result);
        let expected = header.expected_at(model);
        self.reporter.check(
            got == expected,
            header.todo.contains(model),
            false,
            line,
            format!("Compiling the {} at {model}: got {got}, expected {expected}.", header.shader_type),
        );
    }

    fn finish_preproc(&mut self, text: &str, invalid: bool, line: usize) {
        if self.mode != RunMode::CompileOnly || self.session.action == TestAction::Skip {
            return;
        }

        match (self.compiler.preprocess(text), invalid) {
            (Err(CompileError::NotImplemented(reason)), _) => self.reporter.skip(line, reason),
            (Ok(output), false) => {
                let ok = output.contains("pass") && !output.contains("fail");
                self.reporter.check(ok, false, false, line, "Preprocessed output does not contain 'pass' alone.");
            }
            (Ok(_), true) => {
                self.reporter.check(false, false, false, line, "Preprocessing succeeded, expected failure.");
            }
            (Err(CompileError::Failed(message)), invalid) => {
                self.reporter.check(invalid, false, false, line, format!("Preprocessing failed: {message}"));
            }
        }
    }

    /// Recompiles stored shaders whose result belongs to another model
    fn refresh_shaders(&mut self) {
        let model = self.session.minimum_model;
        for shader_type in ShaderType::ALL {
            let slot = &self.session.shaders[shader_type.index()];
            if !slot.is_stale(model) {
                continue;
            }
            let Some(source) = slot.source.clone() else {
                continue;
            };

            let result = self.compiler.compile(&source, shader_type, model, self.session.options);
            if let Err(error) = &result {
                tracing::debug!("{}: Recompiling the {shader_type} at {model}: {error}", self.name);
            }
            self.session.set_compiled(shader_type, model, result.ok());
        }
    }

    fn run_test_line(&mut self, line: &str, line_number: usize) -> Result<(), ParseError> {
        if self.session.action != TestAction::Run {
            return Ok(());
        }
        let Some(test_line) = parse_test_line(line, &self.context())? else {
            return Ok(());
        };

        self.refresh_shaders();
        if self.session.registry.has_failures() || self.session.has_failed_shader() {
            tracing::trace!("{}:{line_number}: Not executed after a failed resource or shader", self.name);
            return Ok(());
        }

        self.execute(test_line, line_number)
    }

    fn execute(&mut self, test_line: TestLine, line: usize) -> Result<(), ParseError> {
        let TestLine { todo, bug, command } = test_line;

        match command {
            TestCommand::Dispatch { x, y, z } => {
                let ok = self.backend.dispatch(&self.session.render_state(), x, y, z);
                self.session.last_render_failed = !ok;
                if !ok {
                    self.reporter.check(false, todo, bug, line, "Dispatch failed.");
                }
            }
            TestCommand::ClearRtv { slot, color } => {
                let target = lookup(&self.session.registry, ResourceRef::new(ResourceType::RenderTarget, slot))?;
                if !self.backend.clear(target, ClearValue::Color(color)) {
                    self.reporter.check(false, todo, bug, line, format!("Clearing rtv {slot} failed."));
                }
            }
            TestCommand::ClearDsv { depth } => {
                let target = lookup(&self.session.registry, ResourceRef::new(ResourceType::DepthStencil, 0))?;
                if !self.backend.clear(target, ClearValue::Depth(depth)) {
                    self.reporter.check(false, todo, bug, line, "Clearing dsv failed.");
                }
            }
            TestCommand::DepthFunc(func) => self.session.fixed.depth_func = func,
            TestCommand::DepthBounds { min, max } => self.session.fixed.depth_bounds = Some((min, max)),
            TestCommand::DrawQuad => self.draw_quad(todo, bug, line)?,
            TestCommand::Draw {
                topology,
                vertex_count,
                instance_count,
            } => {
                let ok = self.backend.draw(&self.session.render_state(), topology, vertex_count, instance_count);
                self.session.last_render_failed = !ok;
                if !ok {
                    self.reporter.check(false, todo, bug, line, "Draw failed.");
                }
            }
            TestCommand::Copy { src, dst } => self.copy(src, dst, todo, bug, line)?,
            TestCommand::Probe { target, rect, value, ulps } => self.probe(target, rect, &value, ulps, todo, bug, line)?,
            TestCommand::Uniform { offset, data } => self.session.write_uniform(offset, &data),
            TestCommand::SampleMask(mask) => self.session.fixed.sample_mask = mask,
            TestCommand::AlphaTest(test) => self.session.fixed.alpha_test = test,
            TestCommand::ShadeMode(mode) => self.session.fixed.shade_mode = mode,
            TestCommand::ClipPlane { index, plane } => self.session.fixed.clip_planes[index] = plane,
            TestCommand::PointSize(size) => self.session.fixed.point_size = size,
            TestCommand::PointSprite(enabled) => self.session.fixed.point_sprite = enabled,
            TestCommand::Fog(mode) => self.session.fixed.fog = mode,
            TestCommand::FogColour(colour) => self.session.fixed.fog_colour = colour,
            TestCommand::Viewport { index, viewport } => self.session.viewports[index] = Some(viewport),
        }
        Ok(())
    }

    /// Draws a full-screen triangle with a pass-through vertex shader
    fn draw_quad(&mut self, todo: bool, bug: bool, line: usize) -> Result<(), ParseError> {
        if self.session.registry.get(ResourceType::RenderTarget, 0).is_none() {
            let mut desc = ResourceDesc::new(ResourceType::RenderTarget, 0);
            (desc.width, desc.height) = QUAD_TARGET_SIZE;
            if !self.create_resource(desc, &[], line)? {
                return Ok(());
            }
        }

        self.session.input_elements = vec![InputElement {
            semantic_name: "position".to_string(),
            semantic_index: 0,
            slot: 0,
            format: Format::R32G32Float,
            texel_size: Format::R32G32Float.texel_size(),
        }];

        let pixel_format = self.session.shaders[ShaderType::Pixel.index()].source.as_ref().map(|source| source.format);
        let source = match pixel_format {
            Some(SourceFormat::Wgsl) => ShaderSource::new(QUAD_VERTEX_SHADER_WGSL, SourceFormat::Wgsl),
            _ => ShaderSource::new(QUAD_VERTEX_SHADER_HLSL, SourceFormat::Hlsl),
        };
        let model = self.session.minimum_model;
        let result = self.compiler.compile(&source, ShaderType::Vertex, model, self.session.options);
        self.session.set_source(ShaderType::Vertex, source);
        match result {
            Ok(compiled) => self.session.set_compiled(ShaderType::Vertex, model, Some(compiled)),
            Err(error) => {
                self.session.set_compiled(ShaderType::Vertex, model, None);
                self.reporter.check(false, todo, bug, line, format!("Compiling the quad vertex shader: {error}"));
                return Ok(());
            }
        }

        let vertices: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        let mut desc = ResourceDesc::new(ResourceType::VertexBuffer, 0);
        desc.format = Format::R32G32Float;
        desc.texel_size = Format::R32G32Float.texel_size();
        desc.width = vertices.len() as u32;
        if !self.create_resource(desc, vertices, line)? {
            return Ok(());
        }

        let ok = self.backend.draw(&self.session.render_state(), Topology::TriangleList, 3, 1);
        self.session.last_render_failed = !ok;
        if !ok {
            self.reporter.check(false, todo, bug, line, "Drawing the quad failed.");
        }
        Ok(())
    }

    fn copy(&mut self, src: ResourceRef, dst: ResourceRef, todo: bool, bug: bool, line: usize) -> Result<(), ParseError> {
        let source = lookup(&self.session.registry, src)?;
        let target = lookup(&self.session.registry, dst)?;

        let (s, d) = (&source.desc, &target.desc);
        if s.dimension != d.dimension || (s.width, s.height, s.depth) != (d.width, d.height, d.depth) {
            parse_bail!("Copy source and destination differ in dimensions.");
        }
        if s.format != d.format || s.texel_size != d.texel_size {
            parse_bail!("Copy source and destination differ in format.");
        }
        if (s.level_count, s.sample_count, s.layer_count) != (d.level_count, d.sample_count, d.layer_count) {
            parse_bail!("Copy source and destination differ in level, sample or layer count.");
        }

        if !self.backend.copy(source, target) {
            self.reporter.check(false, todo, bug, line, format!("Copying {} {} to {} {} failed.", src.ty, src.slot, dst.ty, dst.slot));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn probe(&mut self, target: ResourceRef, rect: ProbeRect, value: &ProbeValue, ulps: u32, todo: bool, bug: bool, line: usize) -> Result<(), ParseError> {
        if self.session.last_render_failed {
            tracing::trace!("{}:{line}: Probe not reported after a failed draw or dispatch", self.name);
            return Ok(());
        }

        let resource = lookup(&self.session.registry, target)?;
        let desc = resource.desc;
        let (subresource, rect) = if desc.dimension == Dimension::Texture3d {
            (0, rect)
        } else {
            if rect.layer >= desc.layer_count {
                parse_bail!("Probe layer {} is out of range for {} {}.", rect.layer, target.ty, target.slot);
            }
            (desc.subresource_index(0, rect.layer), ProbeRect { layer: 0, ..rect })
        };

        let Some(readback) = self.backend.readback(resource, subresource) else {
            self.reporter.check(false, todo, bug, line, format!("Reading back {} {} failed.", target.ty, target.slot));
            return Ok(());
        };

        if !value_fits(value, &readback) {
            parse_bail!("Probe value {value} does not fit a {} texel.", readback.format);
        }
        if rect.right > readback.width || rect.bottom > readback.height || rect.layer >= readback.depth {
            parse_bail!("Probe rectangle exceeds the {}x{}x{} resource.", readback.width, readback.height, readback.depth);
        }

        match probe(&readback, &rect, value, ulps) {
            Ok(()) => self.reporter.check(true, todo, bug, line, format!("Probe matched {value}.")),
            Err(mismatch) => self.reporter.check(false, todo, bug, line, mismatch),
        };
        Ok(())
    }
}

fn lookup<H>(registry: &Registry<H>, resource: ResourceRef) -> Result<&Resource<H>, ParseError> {
    match registry.get(resource.ty, resource.slot) {
        Some(found) => Ok(found),
        None => parse_bail!("{} {} does not exist.", resource.ty, resource.slot),
    }
}

/// Whether a probe value can be read from one texel of a readback
fn value_fits(value: &ProbeValue, readback: &Readback) -> bool {
    match value {
        ProbeValue::U64(_) | ProbeValue::I64(_) | ProbeValue::F64(_) => value.byte_size() <= readback.texel_size,
        _ if readback.format == Format::Unknown => value.byte_size() <= readback.texel_size,
        _ => value.len() <= readback.format.component_count() as usize,
    }
}
