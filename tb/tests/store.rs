//! Accept, save, refine on demand and approve a breakdown

mod common;

use std::sync::Arc;

use tempfile::tempdir;

use common::{ScriptedClient, THREE_CHILDREN};
use taskbreaker::config::{PipelineConfig, RefinementMode};
use taskbreaker::events::{EventBus, NotifyEvent};
use taskbreaker::pipeline::{BreakdownRequest, Pipeline, StepStatus};
use taskbreaker::prompts::PromptLoader;
use taskbreaker::store::{JsonlTaskStore, StoreError, Task, TaskStore};

#[tokio::test]
async fn test_deferred_breakdown_lifecycle() {
    let temp = tempdir().unwrap();
    let store = JsonlTaskStore::new(temp.path());
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    let client = Arc::new(ScriptedClient::routed(
        r#"{"size": "M"}"#,
        r#"[{"title": "Collect the laundry", "minutes": 5},
            {"title": "Run the washer", "minutes": 25},
            {"title": "Hang everything up", "minutes": 15}]"#,
        "{}",
        THREE_CHILDREN,
    ));
    let pipeline = Pipeline::new(client, Arc::new(PromptLoader::embedded_only()), PipelineConfig::default());

    let breakdown = pipeline
        .breakdown(BreakdownRequest::new("Do the laundry").with_mode(RefinementMode::Deferred))
        .await;
    assert!(breakdown.steps.iter().all(|s| s.children.is_empty()));

    let task = Task::from_breakdown(&breakdown);
    store.save(&task).await.unwrap();
    let emitter = bus.emitter_for(task.id.to_string());
    emitter.breakdown_ready(&task.title, task.steps.len(), task.total_minutes(), task.fallback);

    let loaded = store.load(task.id).await.unwrap();
    assert_eq!(loaded.status, StepStatus::Draft);
    assert_eq!(loaded.total_minutes(), 45);

    let washer = loaded.steps[1].clone();
    let children = pipeline.refine_deferred(&washer, &loaded.title).await;
    assert_eq!(children.len(), 3);
    assert!(children.iter().all(|c| c.depth == 1));

    let refined = store.replace_children(task.id, &[2], children).await.unwrap();
    emitter.step_refined(&[2], refined.steps[1].children.len());
    assert_eq!(refined.steps[1].children.len(), 3);

    let approved = store.approve(task.id).await.unwrap();
    emitter.breakdown_approved(approved.steps.len());
    assert_eq!(approved.steps[1].children[0].status, StepStatus::Active);

    let reloaded = store.load(task.id).await.unwrap();
    assert_eq!(reloaded, approved);

    let kinds: Vec<&str> = [rx.recv().await.unwrap(), rx.recv().await.unwrap(), rx.recv().await.unwrap()]
        .iter()
        .map(NotifyEvent::event_type)
        .collect();
    assert_eq!(kinds, vec!["BreakdownReady", "StepRefined", "BreakdownApproved"]);
}

#[tokio::test]
async fn test_replace_children_on_unknown_task() {
    let temp = tempdir().unwrap();
    let store = JsonlTaskStore::new(temp.path());
    let err = store
        .replace_children(uuid::Uuid::now_v7(), &[1], Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
