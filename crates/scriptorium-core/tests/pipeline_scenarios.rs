//! End-to-end pipeline runs against the scripted model client.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use scriptorium_core::models::{
    AgentDefinition, AgentRole, KnowledgeEntry, MessageRole, ModelRef, PipelineInput, RunStatus,
};
use scriptorium_core::{
    OrchestratorConfig, PipelineCallbacks, PipelineOrchestrator, PipelineStep, PresetCatalog,
    ScriptedModelClient, ScriptedReply,
};

fn agent(role: AgentRole) -> AgentDefinition {
    AgentDefinition::new(
        format!("test-{}", role.as_str()),
        format!("Test {}", role.as_str()),
        role,
        format!("You are the {}.", role.as_str()),
        ModelRef::new("stub-model", "local"),
    )
}

fn step(role: AgentRole) -> PipelineStep {
    PipelineStep::new(agent(role))
}

fn orchestrator(client: Arc<ScriptedModelClient>) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        client,
        Arc::new(PresetCatalog::with_builtins()),
        OrchestratorConfig::default(),
    )
}

#[tokio::test]
async fn test_unconditional_pipeline_runs_every_step_in_order() {
    let client = Arc::new(ScriptedModelClient::with_texts(["draft", "edited", "CONSISTENT"]));
    let orch = orchestrator(client.clone());
    let steps = vec![
        step(AgentRole::ProseWriter),
        step(AgentRole::StyleEditor),
        step(AgentRole::LoreJudge),
    ];

    let started = Arc::new(Mutex::new(Vec::new()));
    let completed = Arc::new(Mutex::new(Vec::new()));
    let (s, c) = (started.clone(), completed.clone());
    let callbacks = PipelineCallbacks::new()
        .on_step_start(move |step, i| s.lock().unwrap().push((i, step.agent.role)))
        .on_step_complete(move |result, i| c.lock().unwrap().push((i, result.output.clone())));

    let result = orch
        .run_pipeline(&steps, &PipelineInput::new("beat"), &callbacks)
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.steps.len(), steps.len());
    let roles: Vec<_> = result.steps.iter().map(|s| s.role).collect();
    assert_eq!(
        roles,
        vec![AgentRole::ProseWriter, AgentRole::StyleEditor, AgentRole::LoreJudge]
    );
    assert_eq!(result.final_output, "CONSISTENT");
    assert_eq!(result.primary_output, "edited");
    assert_eq!(
        *started.lock().unwrap(),
        vec![
            (0, AgentRole::ProseWriter),
            (1, AgentRole::StyleEditor),
            (2, AgentRole::LoreJudge)
        ]
    );
    assert_eq!(completed.lock().unwrap().len(), 3);

    // the style editor was handed the writer's draft
    let requests = client.requests();
    assert!(requests[1].messages[1].content.contains("PROSE TO EDIT:\ndraft"));
}

#[tokio::test]
async fn test_rain_scenario() {
    let client = Arc::new(ScriptedModelClient::with_texts(["It rained all day."]));
    let orch = orchestrator(client.clone());
    let steps = vec![step(AgentRole::ProseWriter)];

    let result = orch
        .run_pipeline(
            &steps,
            &PipelineInput::new("Write one sentence about rain"),
            &PipelineCallbacks::new(),
        )
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.primary_output, "It rained all day.");
    assert_eq!(result.steps.len(), 1);
    assert!(result.error.is_none());

    let prompt = &result.steps[0].prompt;
    assert_eq!(prompt[0].role, MessageRole::System);
    assert_eq!(prompt[0].content, "You are the prose_writer.");
    assert!(prompt[1].content.contains("Write one sentence about rain"));
    assert_eq!(&client.requests()[0].messages, prompt);
}

#[tokio::test]
async fn test_judge_does_not_override_primary_output() {
    let client = Arc::new(ScriptedModelClient::with_texts([
        "The lantern flickered.",
        "CONSISTENT",
    ]));
    let orch = orchestrator(client);
    let steps = vec![step(AgentRole::ProseWriter), step(AgentRole::LoreJudge)];

    let result = orch
        .run_pipeline(&steps, &PipelineInput::new("beat"), &PipelineCallbacks::new())
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.final_output, "CONSISTENT");
    assert_eq!(result.primary_output, "The lantern flickered.");
}

#[tokio::test]
async fn test_retry_jumps_back_exactly_max_iterations_times() {
    let replies: Vec<String> = (0..7).map(|i| format!("reply {}", i)).collect();
    let client = Arc::new(ScriptedModelClient::with_texts(replies));
    let orch = orchestrator(client.clone());
    let steps = vec![
        step(AgentRole::ProseWriter),
        step(AgentRole::LoreJudge),
        step(AgentRole::Custom)
            .with_condition("hasPreviousOutput")
            .retry_from(0, 2),
    ];

    let result = orch
        .run_pipeline(&steps, &PipelineInput::new("beat"), &PipelineCallbacks::new())
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    let roles: Vec<_> = result.steps.iter().map(|s| s.role).collect();
    assert_eq!(
        roles,
        vec![
            AgentRole::ProseWriter,
            AgentRole::LoreJudge,
            AgentRole::ProseWriter,
            AgentRole::LoreJudge,
            AgentRole::ProseWriter,
            AgentRole::LoreJudge,
            AgentRole::Custom,
        ]
    );
    assert_eq!(client.remaining(), 0);
    assert_eq!(result.primary_output, "reply 4");
}

#[tokio::test]
async fn test_retry_stops_once_condition_clears() {
    let client = Arc::new(ScriptedModelClient::with_texts([
        "I can't write that.",
        "ISSUE: refusal",
        "Mara slipped into the harbour.",
        "CONSISTENT",
    ]));
    let orch = orchestrator(client);
    let steps = vec![
        step(AgentRole::ProseWriter),
        step(AgentRole::RefusalChecker),
        step(AgentRole::Custom)
            .with_condition("outputContainsAnyKeyword")
            .with_validation_keywords(["ISSUE"])
            .retry_from(0, 3),
    ];

    let result = orch
        .run_pipeline(&steps, &PipelineInput::new("beat"), &PipelineCallbacks::new())
        .await;

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.steps.len(), 4);
    assert_eq!(result.primary_output, "Mara slipped into the harbour.");
}

#[tokio::test]
async fn test_cancel_before_start_aborts_with_no_steps() {
    let client = Arc::new(ScriptedModelClient::with_texts(["never sent"]));
    let orch = orchestrator(client.clone());
    orch.cancel();

    let result = orch
        .run_pipeline(
            &[step(AgentRole::ProseWriter)],
            &PipelineInput::new("beat"),
            &PipelineCallbacks::new(),
        )
        .await;

    assert_eq!(result.status, RunStatus::Aborted);
    assert_eq!(result.steps.len(), 0);
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn test_mid_pipeline_failure_stops_the_run() {
    let client = Arc::new(ScriptedModelClient::new([
        ScriptedReply::text("draft"),
        ScriptedReply::error("upstream timed out"),
        ScriptedReply::text("never used"),
    ]));
    let orch = orchestrator(client.clone());
    let steps = vec![
        step(AgentRole::ProseWriter),
        step(AgentRole::LoreJudge),
        step(AgentRole::StyleEditor),
    ];

    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = errors.clone();
    let callbacks =
        PipelineCallbacks::new().on_error(move |e, i| seen.lock().unwrap().push((i, e.to_string())));

    let result = orch
        .run_pipeline(&steps, &PipelineInput::new("beat"), &callbacks)
        .await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[1].error(), Some("Model request failed: upstream timed out"));
    assert_eq!(result.steps[1].output, "");
    assert!(!result.steps[1].prompt.is_empty());
    assert_eq!(result.error.as_deref(), Some("Model request failed: upstream timed out"));
    assert_eq!(result.primary_output, "draft");
    assert_eq!(client.requests().len(), 2);
    assert_eq!(client.remaining(), 1);
    assert_eq!(
        *errors.lock().unwrap(),
        vec![(1, "Model request failed: upstream timed out".to_string())]
    );
}

#[tokio::test]
async fn test_streaming_only_for_flagged_steps() {
    let client = Arc::new(ScriptedModelClient::with_texts(["quiet draft", "loud polish"]));
    let orch = orchestrator(client);
    let steps = vec![step(AgentRole::ProseWriter), step(AgentRole::StyleEditor).streaming()];

    let tokens = Arc::new(Mutex::new(String::new()));
    let sink = tokens.clone();
    let callbacks = PipelineCallbacks::new().on_token(move |t| sink.lock().unwrap().push_str(t));

    let result = orch
        .run_pipeline(&steps, &PipelineInput::new("beat"), &callbacks)
        .await;

    assert!(result.is_completed());
    assert_eq!(*tokens.lock().unwrap(), "loud polish");
}

#[tokio::test]
async fn test_cancel_mid_stream_aborts_without_failed_result() {
    let client = Arc::new(ScriptedModelClient::new([
        ScriptedReply::text("draft"),
        ScriptedReply::slow("one two three four five six seven eight", Duration::from_millis(40)),
        ScriptedReply::text("never used"),
    ]));
    let orch = Arc::new(orchestrator(client.clone()));
    let steps = vec![
        step(AgentRole::ProseWriter),
        step(AgentRole::StyleEditor).streaming(),
        step(AgentRole::LoreJudge),
    ];

    let errors = Arc::new(Mutex::new(0));
    let error_count = errors.clone();
    let canceller = orch.clone();
    let callbacks = PipelineCallbacks::new()
        .on_token(move |_| canceller.cancel())
        .on_error(move |_, _| *error_count.lock().unwrap() += 1);

    let result = orch
        .run_pipeline(&steps, &PipelineInput::new("beat"), &callbacks)
        .await;

    assert_eq!(result.status, RunStatus::Aborted);
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.primary_output, "draft");
    assert_eq!(*errors.lock().unwrap(), 0);
    assert_eq!(client.remaining(), 1);
}

#[tokio::test]
async fn test_summarizer_runs_only_for_long_previous_text() {
    let short = PipelineInput::new("beat").with_previous_text("word ".repeat(3000));
    let long = PipelineInput::new("beat").with_previous_text("word ".repeat(3001));
    let steps = vec![
        step(AgentRole::Summarizer).with_condition("wordCount > 3000"),
        step(AgentRole::ProseWriter),
    ];

    let client = Arc::new(ScriptedModelClient::with_texts(["draft"]));
    let result = orchestrator(client)
        .run_pipeline(&steps, &short, &PipelineCallbacks::new())
        .await;
    assert_eq!(result.steps.len(), 1);

    let client = Arc::new(ScriptedModelClient::with_texts(["SUMMARY", "draft"]));
    let result = orchestrator(client.clone())
        .run_pipeline(&steps, &long, &PipelineCallbacks::new())
        .await;
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].role, AgentRole::Summarizer);
    // the writer works from the summary instead of the raw text
    assert!(client.requests()[1].messages[1]
        .content
        .contains("STORY CONTEXT:\nSUMMARY"));
}

#[tokio::test]
async fn test_revision_preset_end_to_end() {
    let client = Arc::new(ScriptedModelClient::with_texts([
        "Mara's blue eyes narrowed.",
        "ISSUE: Mara has green eyes\nSUGGESTION: fix the colour",
        "Mara's green eyes narrowed.",
    ]));
    let orch = orchestrator(client.clone());
    let input = PipelineInput::new("Mara confronts the captain.").with_matched_entries(vec![
        KnowledgeEntry::new("e1", "Mara", "Smuggler. Green eyes.", "character"),
    ]);

    let result = orch
        .run_pipeline_preset("quality-prose-with-revision", &input, &PipelineCallbacks::new())
        .await
        .unwrap();

    assert!(result.is_completed());
    assert_eq!(result.steps.len(), 3);
    assert!(result.steps[2].is_revision());
    assert_eq!(result.primary_output, "Mara's green eyes narrowed.");

    let revision_prompt = &client.requests()[2].messages[1].content;
    assert!(revision_prompt.contains("ORIGINAL PROSE:\nMara's blue eyes narrowed."));
    assert!(revision_prompt.contains("[LORE_JUDGE FEEDBACK]:\nISSUE: Mara has green eyes"));
}

#[tokio::test]
async fn test_unknown_preset_is_an_error() {
    let orch = orchestrator(Arc::new(ScriptedModelClient::with_texts(Vec::<String>::new())));
    let err = orch
        .run_pipeline_preset("missing", &PipelineInput::default(), &PipelineCallbacks::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Pipeline preset not found: missing"));
}

#[tokio::test]
async fn test_concurrent_runs_share_nothing() {
    let orch = Arc::new(PipelineOrchestrator::new(
        Arc::new(ScriptedModelClient::with_texts(["a", "b"])),
        Arc::new(PresetCatalog::with_builtins()),
        OrchestratorConfig::default(),
    ));
    let steps = Arc::new(vec![step(AgentRole::ProseWriter)]);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let orch = orch.clone();
            let steps = steps.clone();
            tokio::spawn(async move {
                orch.run_pipeline(&steps, &PipelineInput::new("beat"), &PipelineCallbacks::new())
                    .await
            })
        })
        .collect();

    let mut outputs = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.is_completed());
        assert_eq!(result.steps.len(), 1);
        outputs.push(result.primary_output);
    }
    outputs.sort();
    assert_eq!(outputs, vec!["a", "b"]);
}
