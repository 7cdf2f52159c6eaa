//! `scriptorium agents` / `scriptorium pipelines`: list available presets.

use scriptorium_core::models::AgentDefinition;
use scriptorium_core::pipeline::PipelinePreset;
use scriptorium_core::presets::builtin::{builtin_agents, builtin_pipelines};
use scriptorium_core::{PresetCatalog, PresetStore};

use super::truncate;

fn source(is_builtin: bool) -> &'static str {
    if is_builtin {
        "builtin"
    } else {
        "file"
    }
}

pub fn render_agents(agents: &[AgentDefinition]) -> String {
    let builtins = builtin_agents();
    let is_builtin = |agent: &AgentDefinition| {
        builtins
            .iter()
            .any(|b| b.id == agent.id && b.name == agent.name && b.system_prompt == agent.system_prompt)
    };
    let mut out = String::new();
    out.push_str("┌────────────────────────────┬──────────────────────────┬─────────────────────┬──────────┐\n");
    out.push_str("│ ID                         │ Name                     │ Role                │ Source   │\n");
    out.push_str("├────────────────────────────┼──────────────────────────┼─────────────────────┼──────────┤\n");
    for agent in agents {
        out.push_str(&format!(
            "│ {:<26} │ {:<24} │ {:<19} │ {:<8} │\n",
            truncate(&agent.id, 26),
            truncate(&agent.name, 24),
            agent.role.as_str(),
            source(is_builtin(agent))
        ));
    }
    out.push_str("└────────────────────────────┴──────────────────────────┴─────────────────────┴──────────┘\n");
    out
}

pub fn render_pipelines(pipelines: &[PipelinePreset]) -> String {
    let builtins = builtin_pipelines();
    let mut out = String::new();
    out.push_str("┌───────────────────────────────┬───────────────────────────────┬───────┬──────────┐\n");
    out.push_str("│ ID                            │ Name                          │ Steps │ Source   │\n");
    out.push_str("├───────────────────────────────┼───────────────────────────────┼───────┼──────────┤\n");
    for pipeline in pipelines {
        out.push_str(&format!(
            "│ {:<29} │ {:<29} │ {:>5} │ {:<8} │\n",
            truncate(&pipeline.id, 29),
            truncate(&pipeline.name, 29),
            pipeline.steps.len(),
            source(builtins.contains(pipeline))
        ));
    }
    out.push_str("└───────────────────────────────┴───────────────────────────────┴───────┴──────────┘\n");
    out
}

/// List agent presets.
pub async fn list_agents(catalog: &PresetCatalog) -> Result<(), String> {
    let agents = catalog.list_agents().await;
    println!("{} agent preset(s)", agents.len());
    println!();
    print!("{}", render_agents(&agents));
    Ok(())
}

/// List pipeline presets.
pub async fn list_pipelines(catalog: &PresetCatalog) -> Result<(), String> {
    let pipelines = catalog.list_pipelines().await;
    println!("{} pipeline preset(s)", pipelines.len());
    println!();
    print!("{}", render_pipelines(&pipelines));
    Ok(())
}
