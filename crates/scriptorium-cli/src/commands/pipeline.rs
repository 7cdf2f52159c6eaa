//! `scriptorium validate` / `scriptorium run`: check and execute pipelines.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scriptorium_core::models::{PipelineInput, PipelineRunResult, RunStatus};
use scriptorium_core::pipeline::{validate_steps, PipelinePreset, PipelineStep};
use scriptorium_core::presets::resolve_steps;
use scriptorium_core::{
    ModelClient, OrchestratorConfig, PipelineCallbacks, PipelineOrchestrator, PresetCatalog,
    ScriptedModelClient,
};

/// What `validate` found in a pipeline file.
pub struct ValidationReport {
    pub preset: PipelinePreset,
    pub steps: Vec<PipelineStep>,
    pub warnings: Vec<String>,
}

/// Parse a pipeline file, resolve its agents and run load-time validation.
pub async fn check_file(
    catalog: &PresetCatalog,
    pipeline_file: &str,
    config: &OrchestratorConfig,
) -> Result<ValidationReport, String> {
    let preset = PipelinePreset::from_file(pipeline_file)?;
    let steps = resolve_steps(catalog, &preset)
        .await
        .map_err(|e| e.to_string())?;
    let warnings = validate_steps(&steps, config).map_err(|e| e.to_string())?;
    Ok(ValidationReport {
        preset,
        steps,
        warnings,
    })
}

/// Validate a pipeline YAML file without executing it.
pub async fn validate(catalog: &PresetCatalog, pipeline_file: &str, strict: bool) -> Result<(), String> {
    let config = OrchestratorConfig {
        strict_conditions: strict,
        ..Default::default()
    };
    let report = check_file(catalog, pipeline_file, &config).await?;

    println!("✅ Pipeline '{}' is valid", report.preset.name);
    println!("   ID: {}", report.preset.id);
    println!("   Steps: {}", report.steps.len());

    for (i, step) in report.steps.iter().enumerate() {
        let mut flags = Vec::new();
        if step.stream_output {
            flags.push("stream".to_string());
        }
        if step.is_revision {
            flags.push("revision".to_string());
        }
        if let Some(retry) = step.retry {
            flags.push(format!("retry→{} ×{}", retry.from_step, retry.max_iterations));
        }
        println!(
            "   {}. {} ({}){}{}",
            i,
            step.agent.name,
            step.agent.role,
            step.condition
                .as_ref()
                .map(|c| format!(" if {}", c))
                .unwrap_or_default(),
            if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            }
        );
    }

    for warning in &report.warnings {
        println!("⚠️  {}", warning);
    }

    Ok(())
}

/// Options for `run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Echo streamed fragments to stdout.
    pub stream: bool,
    /// Print the full run result as JSON instead of the primary output.
    pub json: bool,
    pub strict: bool,
}

fn progress_callbacks(stream: bool) -> PipelineCallbacks {
    // set while fragments of the current step are on stdout
    let streamed = Arc::new(AtomicBool::new(false));

    let mut callbacks = PipelineCallbacks::new()
        .on_step_start(|step, i| {
            eprintln!("▶ Step {}: {} ({})", i, step.agent.name, step.agent.role);
        })
        .on_error(|e, i| eprintln!("✗ Step {} failed: {}", i, e));

    let flag = streamed.clone();
    callbacks = callbacks.on_step_complete(move |result, _| {
        if flag.swap(false, Ordering::SeqCst) {
            println!();
        }
        eprintln!(
            "✓ {} finished in {}ms ({} chars)",
            result.agent_name,
            result.duration_ms,
            result.output.chars().count()
        );
    });

    if stream {
        callbacks = callbacks.on_token(move |fragment| {
            streamed.store(true, Ordering::SeqCst);
            print!("{}", fragment);
            let _ = std::io::stdout().flush();
        });
    }
    callbacks
}

/// Run a pipeline preset with the given client, cancelling on Ctrl-C.
pub async fn execute(
    catalog: PresetCatalog,
    client: Arc<dyn ModelClient>,
    pipeline_id: &str,
    input: &PipelineInput,
    options: &RunOptions,
    callbacks: &PipelineCallbacks,
) -> Result<PipelineRunResult, String> {
    let config = OrchestratorConfig {
        strict_conditions: options.strict,
        ..Default::default()
    };
    let orchestrator = Arc::new(PipelineOrchestrator::new(client, Arc::new(catalog), config));

    let interrupt = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling…");
                orchestrator.cancel();
            }
        })
    };

    let result = orchestrator
        .run_pipeline_preset(pipeline_id, input, callbacks)
        .await
        .map_err(|e| e.to_string());
    interrupt.abort();
    result
}

/// Run a pipeline preset against scripted replies.
pub async fn run(
    catalog: PresetCatalog,
    pipeline_id: &str,
    input_file: &str,
    replies_file: &str,
    options: &RunOptions,
) -> Result<(), String> {
    let input_yaml = std::fs::read_to_string(input_file)
        .map_err(|e| format!("Failed to read input file '{}': {}", input_file, e))?;
    let input = PipelineInput::from_yaml(&input_yaml)?;

    let replies_yaml = std::fs::read_to_string(replies_file)
        .map_err(|e| format!("Failed to read replies file '{}': {}", replies_file, e))?;
    let client = Arc::new(ScriptedModelClient::from_yaml(&replies_yaml)?);

    let stream = options.stream && !options.json;
    let callbacks = progress_callbacks(stream);
    let result = execute(catalog, client, pipeline_id, &input, options, &callbacks).await?;

    if options.json {
        let value = serde_json::to_value(&result).map_err(|e| e.to_string())?;
        super::print_json(&value);
    } else {
        eprintln!();
        eprintln!(
            "Run {}: {} ({} step(s), {}ms)",
            result.run_id,
            result.status.as_str(),
            result.steps.len(),
            result.total_duration_ms
        );
        if !stream && !result.primary_output.is_empty() {
            println!("{}", result.primary_output);
        }
    }

    match result.status {
        RunStatus::Completed => Ok(()),
        RunStatus::Aborted => Err("Pipeline run aborted".to_string()),
        RunStatus::Failed => Err(format!(
            "Pipeline run failed: {}",
            result.error.unwrap_or_else(|| "unknown error".to_string())
        )),
    }
}
