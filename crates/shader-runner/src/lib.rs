//! Shader conformance test interpreter
//!
//! This crate reads `.shader_test` files: a sequence of bracketed blocks that
//! declare requirements, resources, samplers, input layouts and shaders,
//! followed by `[test]` blocks of directives that draw, dispatch and probe
//! the results. Files are interpreted against a [`Backend`] (a graphics API)
//! and a [`ShaderCompiler`], and every check is counted in a [`Summary`].
//!
//! # Example
//!
//! ```ignore
//! use shader_runner::{CompileOnlyBackend, Capabilities, RunMode, RunnerOptions, ShaderRunner};
//!
//! let mut backend = CompileOnlyBackend::new(Capabilities::default());
//! let options = RunnerOptions { mode: RunMode::CompileOnly };
//! let summary = ShaderRunner::new(&mut backend, &compiler, options).run_file("abs.shader_test")?;
//! assert!(summary.is_success());
//! ```

pub mod backend;
pub mod caps;
pub mod compiler;
pub mod directives;
pub mod error;
pub mod format;
pub mod matcher;
pub mod model;
pub mod probe;
pub mod qualifier;
pub mod registry;
pub mod report;
pub mod resource;
pub mod runner;
pub mod session;

#[cfg(test)]
mod testing;

pub use backend::{Backend, BackendError, ClearValue, CompileOnlyBackend, FixedFunctionState, Readback, RenderState, Topology, Viewport};
pub use caps::{Cap, Capabilities, CapabilityProfile, FormatCaps, ProfileError};
pub use compiler::{
    BindingKind, CompileError, CompileOptions, CompileStatus, CompiledShader, ShaderBinding, ShaderCode, ShaderCompiler, ShaderSource, ShaderType, SourceFormat,
};
pub use error::{ParseError, RunnerError};
pub use format::{ComponentType, Format};
pub use model::{ModelMask, ShaderModel};
pub use registry::{Registry, Resource};
pub use report::{Outcome, Reporter, Summary};
pub use resource::{AddressMode, ComparisonFunc, Dimension, FilterMode, InputElement, ResourceDesc, ResourceType, SamplerDesc};
pub use runner::{BlockState, RunMode, RunnerOptions, ShaderRunner};
