//! wgpu backend for the shader test interpreter
//!
//! [`WgpuRunner`] executes tests on the first high-performance adapter wgpu
//! finds, and [`NagaCompiler`] turns WGSL and HLSL sources into modules it
//! can load.

pub mod compiler;
pub mod convert;
pub mod runner;

pub use compiler::NagaCompiler;
pub use runner::{WgpuResource, WgpuRunner, WgpuRunnerError};
