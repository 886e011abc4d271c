//! Shader compilation for the wgpu backend
//!
//! WGSL is parsed and validated by naga. HLSL is compiled to SPIR-V by an
//! external `dxc`, which only targets shader model 6, and the SPIR-V is then
//! validated by naga as well. Both paths reflect the group 0 bindings the
//! backend needs to build its bind group layouts.
//!
//! # Binding convention
//!
//! | Register | Binding |
//! |----------|---------|
//! | `b0`     | 0       |
//! | `tN`     | 16 + N  |
//! | `uN`     | 32 + N  |
//! | `sN`     | 48 + N  |

use shader_runner::{BindingKind, Capabilities, CompileError, CompileOptions, CompiledShader, ShaderBinding, ShaderCode, ShaderCompiler, ShaderModel, ShaderSource, ShaderType, SourceFormat};
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU32, Ordering};

/// Binding of the uniform buffer
pub const UNIFORM_BINDING: u32 = 0;
/// Binding of shader resource view 0
pub const SRV_BINDING_BASE: u32 = 16;
/// Binding of unordered access view 0
pub const UAV_BINDING_BASE: u32 = 32;
/// Binding of sampler 0
pub const SAMPLER_BINDING_BASE: u32 = 48;

/// Compiles WGSL with naga and HLSL with dxc
#[derive(Debug, Clone)]
pub struct NagaCompiler {
    /// Path of the dxc executable
    dxc: PathBuf,
}

impl Default for NagaCompiler {
    fn default() -> Self {
        Self { dxc: PathBuf::from("dxc") }
    }
}

impl NagaCompiler {
    /// Creates a compiler running the given dxc executable for HLSL
    pub fn new(dxc: impl Into<PathBuf>) -> Self {
        Self { dxc: dxc.into() }
    }

    /// Whether the dxc executable starts
    pub fn has_dxc(&self) -> bool {
        Command::new(&self.dxc).arg("--version").output().is_ok_and(|output| output.status.success())
    }

    /// Narrows `caps` to the sources this compiler can build
    ///
    /// HLSL starts at shader model 6 and is dropped altogether without dxc.
    pub fn restrict_capabilities(&self, caps: &mut Capabilities) {
        restrict_hlsl(caps, self.has_dxc());
    }

    fn compile_hlsl(&self, source: &str, shader_type: ShaderType, model: ShaderModel, options: CompileOptions) -> Result<Vec<u32>, CompileError> {
        if !model.is_sm6() {
            return Err(CompileError::NotImplemented(format!("HLSL at shader model {model} needs a DXBC compiler")));
        }

        let (major, minor) = model.version();
        let scratch = ScratchFiles::new("spv");
        std::fs::write(&scratch.input, source).map_err(|e| CompileError::Failed(format!("writing {}: {e}", scratch.input.display())))?;

        let mut command = Command::new(&self.dxc);
        command
            .arg("-T")
            .arg(format!("{}_{major}_{minor}", shader_type.profile_prefix()))
            .args(["-E", "main", "-spirv"])
            .args(["-fvk-b-shift", "0", "0"])
            .args(["-fvk-t-shift", &SRV_BINDING_BASE.to_string(), "0"])
            .args(["-fvk-u-shift", &UAV_BINDING_BASE.to_string(), "0"])
            .args(["-fvk-s-shift", &SAMPLER_BINDING_BASE.to_string(), "0"]);
        if options.contains(CompileOptions::ROW_MAJOR) {
            command.arg("-Zpr");
        }
        if options.contains(CompileOptions::COLUMN_MAJOR) {
            command.arg("-Zpc");
        }
        if options.contains(CompileOptions::BACKCOMPAT) {
            command.arg("-Gec");
        }
        command.arg("-Fo").arg(&scratch.output).arg(&scratch.input);

        self.run(&mut command)?;

        let bytes = std::fs::read(&scratch.output).map_err(|e| CompileError::Failed(format!("reading {}: {e}", scratch.output.display())))?;
        if bytes.len() % 4 != 0 {
            return Err(CompileError::Failed("dxc produced truncated SPIR-V".to_string()));
        }
        Ok(bytes.chunks_exact(4).map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]])).collect())
    }

    /// Runs dxc, turning a failed compile into its diagnostics
    fn run(&self, command: &mut Command) -> Result<(), CompileError> {
        tracing::trace!("Running {command:?}");
        let output = command.output().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CompileError::NotImplemented(format!("{} not found", self.dxc.display())),
            _ => CompileError::Failed(format!("running {}: {e}", self.dxc.display())),
        })?;

        if !output.status.success() {
            return Err(CompileError::Failed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(())
    }
}

impl ShaderCompiler for NagaCompiler {
    fn compile(&self, source: &ShaderSource, shader_type: ShaderType, model: ShaderModel, options: CompileOptions) -> Result<CompiledShader, CompileError> {
        let stage = match shader_type {
            ShaderType::Vertex => naga::ShaderStage::Vertex,
            ShaderType::Pixel => naga::ShaderStage::Fragment,
            ShaderType::Compute => naga::ShaderStage::Compute,
            _ => return Err(CompileError::NotImplemented(format!("{shader_type}s"))),
        };

        let (module, code) = match source.format {
            SourceFormat::Wgsl => {
                let module = naga::front::wgsl::parse_str(&source.text).map_err(|e| CompileError::Failed(e.emit_to_string(&source.text)))?;
                (module, ShaderCode::Wgsl(source.text.clone()))
            }
            SourceFormat::Hlsl => {
                let words = self.compile_hlsl(&source.text, shader_type, model, options)?;
                let module = naga::front::spv::parse_u8_slice(bytemuck::cast_slice(&words), &naga::front::spv::Options::default()).map_err(|e| CompileError::Failed(e.to_string()))?;
                (module, ShaderCode::SpirV(words))
            }
            format => return Err(CompileError::NotImplemented(format!("{format} sources"))),
        };

        let mut validator = naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all());
        validator.validate(&module).map_err(|e| CompileError::Failed(e.emit_to_string(&source.text)))?;

        let entry_point = module
            .entry_points
            .iter()
            .filter(|entry| entry.stage == stage)
            .min_by_key(|entry| entry.name != "main")
            .map(|entry| entry.name.clone())
            .ok_or_else(|| CompileError::Failed(format!("no {stage:?} entry point")))?;

        Ok(CompiledShader {
            shader_type,
            model,
            code,
            entry_point,
            bindings: reflect_bindings(&module),
        })
    }

    fn preprocess(&self, source: &str) -> Result<String, CompileError> {
        let scratch = ScratchFiles::new("i");
        std::fs::write(&scratch.input, source).map_err(|e| CompileError::Failed(format!("writing {}: {e}", scratch.input.display())))?;

        let mut command = Command::new(&self.dxc);
        command.arg("-P").arg("-Fi").arg(&scratch.output).arg(&scratch.input);
        self.run(&mut command)?;

        std::fs::read_to_string(&scratch.output).map_err(|e| CompileError::Failed(format!("reading {}: {e}", scratch.output.display())))
    }
}

/// Group 0 bindings of a module, ordered by binding
fn reflect_bindings(module: &naga::Module) -> Vec<ShaderBinding> {
    let mut bindings: Vec<ShaderBinding> = module
        .global_variables
        .iter()
        .filter_map(|(_, variable)| {
            let binding = variable.binding.as_ref().filter(|binding| binding.group == 0)?;
            let kind = match (variable.space, &module.types[variable.ty].inner) {
                (naga::AddressSpace::Uniform, _) => BindingKind::UniformBuffer,
                (naga::AddressSpace::Storage { access }, _) => BindingKind::StorageBuffer {
                    read_only: !access.contains(naga::StorageAccess::STORE),
                },
                (_, naga::TypeInner::Image { class: naga::ImageClass::Storage { .. }, .. }) => BindingKind::StorageTexture,
                (_, naga::TypeInner::Image { class, .. }) => BindingKind::Texture {
                    multisampled: matches!(class, naga::ImageClass::Sampled { multi: true, .. } | naga::ImageClass::Depth { multi: true }),
                },
                (_, naga::TypeInner::Sampler { comparison }) => BindingKind::Sampler { comparison: *comparison },
                _ => return None,
            };
            Some(ShaderBinding { binding: binding.binding, kind })
        })
        .collect();

    bindings.sort_by_key(|binding| binding.binding);
    bindings
}

/// Input and output files of one dxc invocation, removed on drop
struct ScratchFiles {
    input: PathBuf,
    output: PathBuf,
}

impl ScratchFiles {
    fn new(output_extension: &str) -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let stem = std::env::temp_dir().join(format!("shader-runner-{}-{id}", std::process::id()));
        Self {
            input: stem.with_extension("hlsl"),
            output: stem.with_extension(output_extension),
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.input);
        let _ = std::fs::remove_file(&self.output);
    }
}

fn restrict_hlsl(caps: &mut Capabilities, has_dxc: bool) {
    if has_dxc {
        caps.minimum_model = caps.minimum_model.max(ShaderModel::FIRST_SM6);
    } else {
        caps.source_formats.retain(|format| *format != SourceFormat::Hlsl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL_SHADER: &str = r#"
@group(0) @binding(0) var<uniform> colour: vec4<f32>;
@group(0) @binding(16) var tex: texture_2d<f32>;
@group(0) @binding(32) var<storage, read> values: array<f32>;
@group(0) @binding(48) var samp: sampler;

@fragment
fn main() -> @location(0) vec4<f32> {
    return colour * values[0] + textureSample(tex, samp, vec2<f32>(0.5, 0.5));
}
"#;

    fn compile(text: &str, format: SourceFormat, shader_type: ShaderType, model: ShaderModel) -> Result<CompiledShader, CompileError> {
        NagaCompiler::default().compile(&ShaderSource::new(text, format), shader_type, model, CompileOptions::empty())
    }

    #[test]
    fn test_wgsl_reflection() {
        let compiled = compile(PIXEL_SHADER, SourceFormat::Wgsl, ShaderType::Pixel, ShaderModel::Sm4_0).unwrap();

        assert_eq!(compiled.entry_point, "main");
        assert_eq!(
            compiled.bindings,
            [
                ShaderBinding {
                    binding: UNIFORM_BINDING,
                    kind: BindingKind::UniformBuffer,
                },
                ShaderBinding {
                    binding: SRV_BINDING_BASE,
                    kind: BindingKind::Texture { multisampled: false },
                },
                ShaderBinding {
                    binding: UAV_BINDING_BASE,
                    kind: BindingKind::StorageBuffer { read_only: true },
                },
                ShaderBinding {
                    binding: SAMPLER_BINDING_BASE,
                    kind: BindingKind::Sampler { comparison: false },
                },
            ]
        );
        assert!(matches!(compiled.code, ShaderCode::Wgsl(_)));
    }

    #[test]
    fn test_wgsl_errors_fail() {
        let result = compile("fn main( {", SourceFormat::Wgsl, ShaderType::Pixel, ShaderModel::Sm4_0);
        assert!(matches!(result, Err(CompileError::Failed(_))));

        // Valid, but has no fragment entry point
        let result = compile(PIXEL_SHADER, SourceFormat::Wgsl, ShaderType::Compute, ShaderModel::Sm4_0);
        assert!(matches!(result, Err(CompileError::Failed(_))));
    }

    #[test]
    fn test_unsupported_inputs_are_not_implemented() {
        let result = compile("float4 main() : sv_target { return 0; }", SourceFormat::Hlsl, ShaderType::Pixel, ShaderModel::Sm5_0);
        assert!(matches!(result, Err(CompileError::NotImplemented(_))));

        let result = compile(PIXEL_SHADER, SourceFormat::Wgsl, ShaderType::Geometry, ShaderModel::Sm5_0);
        assert!(matches!(result, Err(CompileError::NotImplemented(_))));

        let result = compile("43 58 42 43", SourceFormat::DxbcTpfHex, ShaderType::Pixel, ShaderModel::Sm5_0);
        assert!(matches!(result, Err(CompileError::NotImplemented(_))));
    }

    #[test]
    fn test_missing_dxc_is_not_implemented() {
        let compiler = NagaCompiler::new("/nonexistent/dxc");
        let source = ShaderSource::new("float4 main() : sv_target { return 0; }", SourceFormat::Hlsl);
        let result = compiler.compile(&source, ShaderType::Pixel, ShaderModel::Sm6_0, CompileOptions::empty());
        assert!(matches!(result, Err(CompileError::NotImplemented(_))));
        assert!(matches!(compiler.preprocess("pass"), Err(CompileError::NotImplemented(_))));
    }

    #[test]
    fn test_hlsl_capabilities_follow_dxc() {
        let base = Capabilities {
            minimum_model: ShaderModel::Sm4_0,
            maximum_model: ShaderModel::MAX,
            source_formats: vec![SourceFormat::Hlsl, SourceFormat::Wgsl],
            ..Default::default()
        };

        let mut caps = base.clone();
        restrict_hlsl(&mut caps, true);
        assert_eq!(caps.minimum_model, ShaderModel::FIRST_SM6);
        assert_eq!(caps.source_formats, [SourceFormat::Hlsl, SourceFormat::Wgsl]);

        let mut caps = base.clone();
        NagaCompiler::new("/nonexistent/dxc").restrict_capabilities(&mut caps);
        assert_eq!(caps.minimum_model, ShaderModel::Sm4_0);
        assert_eq!(caps.source_formats, [SourceFormat::Wgsl]);
    }
}
