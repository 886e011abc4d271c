//! Shader Test Runner
//!
//! Runs `.shader_test` files on the first wgpu adapter found, or only
//! compiles their shaders with `--compile-only`.
//!
//! # Usage
//! ```bash
//! shader-runner tests/hlsl/*.shader_test --caps llvmpipe.yaml -v
//! shader-runner --compile-only --dxc /opt/dxc/bin/dxc --min-model 6.0 abs.shader_test
//! ```

use clap::Parser;
use shader_runner::{Backend, Capabilities, CapabilityProfile, CompileOnlyBackend, RunMode, RunnerError, RunnerOptions, ShaderModel, ShaderRunner, SourceFormat, Summary};
use shader_runner_wgpu::{NagaCompiler, WgpuRunner};
use std::path::PathBuf;
use std::process::ExitCode;

/// Command-line arguments for the shader test runner
#[derive(Parser)]
#[command(version, about = "Runs shader conformance tests")]
struct Args {
    /// Test files to run
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Only compile shaders, without creating a device
    #[arg(long)]
    compile_only: bool,

    /// Capability profile (YAML) overriding what the backend reports
    #[arg(long)]
    caps: Option<PathBuf>,

    /// Path of the dxc executable used for HLSL
    #[arg(long, default_value = "dxc")]
    dxc: PathBuf,

    /// Lowest shader model to test (e.g. 4.0)
    #[arg(long)]
    min_model: Option<ShaderModel>,

    /// Highest shader model to test (e.g. 6.0)
    #[arg(long)]
    max_model: Option<ShaderModel>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Result of running one file
struct FileResult {
    file: PathBuf,
    result: Result<Summary, RunnerError>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let subscriber = tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).finish();
    if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {error}");
    }

    match run(&args).await {
        Ok(results) => report(&args, &results),
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

/// Builds the profile from `--caps` and the model range options
fn load_profile(args: &Args) -> Result<CapabilityProfile, Box<dyn std::error::Error>> {
    let mut profile = match &args.caps {
        Some(path) => CapabilityProfile::from_file(path).map_err(|e| format!("{}: {e}", path.display()))?,
        None => CapabilityProfile::default(),
    };
    profile.minimum_model = args.min_model.or(profile.minimum_model);
    profile.maximum_model = args.max_model.or(profile.maximum_model);
    Ok(profile)
}

/// Runs every file with the backend the mode calls for
async fn run(args: &Args) -> Result<Vec<FileResult>, Box<dyn std::error::Error>> {
    let profile = load_profile(args)?;
    let compiler = NagaCompiler::new(&args.dxc);

    if args.compile_only {
        let mut base = Capabilities {
            compiler: "naga".to_string(),
            source_formats: vec![SourceFormat::Hlsl, SourceFormat::Wgsl],
            ..Default::default()
        };
        compiler.restrict_capabilities(&mut base);
        let mut backend = CompileOnlyBackend::new(profile.apply(&base)?);
        Ok(run_files(&mut backend, &compiler, RunMode::CompileOnly, &args.files))
    } else {
        let mut backend = WgpuRunner::new().await?;
        let mut base = backend.capabilities().clone();
        compiler.restrict_capabilities(&mut base);
        backend.set_capabilities(profile.apply(&base)?);
        Ok(run_files(&mut backend, &compiler, RunMode::Run, &args.files))
    }
}

/// Runs each file in turn; a fatal error in one file does not stop the others
fn run_files<B: Backend>(backend: &mut B, compiler: &NagaCompiler, mode: RunMode, files: &[PathBuf]) -> Vec<FileResult> {
    let mut runner = ShaderRunner::new(backend, compiler, RunnerOptions { mode });
    files
        .iter()
        .map(|file| FileResult {
            file: file.clone(),
            result: runner.run_file(file),
        })
        .collect()
}

/// Prints the results and picks the exit status
fn report(args: &Args, results: &[FileResult]) -> ExitCode {
    let mut total = Summary::default();
    let mut fatal = false;
    for FileResult { result, .. } in results {
        match result {
            Ok(summary) => total.merge(summary),
            Err(_) => fatal = true,
        }
    }

    if args.json {
        let files: Vec<serde_json::Value> = results
            .iter()
            .map(|FileResult { file, result }| match result {
                Ok(summary) => serde_json::json!({ "file": file, "summary": summary }),
                Err(error) => serde_json::json!({ "file": file, "error": error.to_string() }),
            })
            .collect();
        println!("{:#}", serde_json::json!({ "files": files, "total": total }));
    } else {
        for FileResult { file, result } in results {
            match result {
                Ok(summary) => println!("{}: {summary}", file.display()),
                Err(error) => eprintln!("{error}"),
            }
        }
        if results.len() > 1 {
            println!("total: {total}");
        }
    }

    if fatal || !total.is_success() { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args() {
        Args::command().debug_assert();

        let args = Args::try_parse_from(["shader-runner", "--compile-only", "--min-model", "4.0", "-vv", "a.shader_test", "b.shader_test"]).unwrap();
        assert!(args.compile_only);
        assert_eq!(args.min_model, Some(ShaderModel::Sm4_0));
        assert_eq!(args.verbose, 2);
        assert_eq!(args.files.len(), 2);

        assert!(Args::try_parse_from(["shader-runner"]).is_err());
        assert!(Args::try_parse_from(["shader-runner", "--max-model", "7.0", "a.shader_test"]).is_err());
    }

    #[test]
    fn test_model_options_override_profile() {
        let args = Args::try_parse_from(["shader-runner", "--max-model", "5.1", "a.shader_test"]).unwrap();
        let profile = load_profile(&args).unwrap();
        assert_eq!(profile.minimum_model, None);
        assert_eq!(profile.maximum_model, Some(ShaderModel::Sm5_1));
    }

    #[tokio::test]
    async fn test_compile_only_run() {
        let dir = std::env::temp_dir().join(format!("shader-runner-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("wgsl.shader_test");
        std::fs::write(
            &file,
            "[require]\nshader model >= 6.0\n\n[compute shader wgsl]\n@compute @workgroup_size(1)\nfn main() {}\n\n[compute shader fail wgsl]\nfn main( {\n",
        )
        .unwrap();

        let args = Args::try_parse_from(["shader-runner", "--compile-only", file.to_str().unwrap()]).unwrap();
        let results = run(&args).await.unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(results.len(), 1);
        let summary = results[0].result.as_ref().unwrap();
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.passed, 2);
    }
}
