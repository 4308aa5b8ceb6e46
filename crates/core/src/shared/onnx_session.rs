use std::path::Path;

/// Opens an ONNX Runtime session with the platform's preferred provider.
///
/// Falls back to CPU when the platform-specific provider is unavailable.
pub fn open_session(
    model_path: &Path,
    intra_threads: usize,
) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    if !model_path.exists() {
        return Err(format!("model file not found: {}", model_path.display()).into());
    }

    let session = ort::session::Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_inter_threads(1)?
        .with_intra_threads(intra_threads.max(1))?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;

    log::info!("Loaded ONNX model {}", model_path.display());
    Ok(session)
}

fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}
