//! End-to-end tests over the public API with mocked browser and chat
//! layers.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use llm_client::{LlmClient, Provider};
use site_analysis::analysis::AnalysisEngine;
use site_analysis::orchestrator::CostPriority;
use site_analysis::testing::{MockBackend, MockPageScript, ScriptedChat};
use site_analysis::workflow::{Checkpoint, WorkflowState};
use site_analysis::{
    normalize, slugify, Orchestrator, Settings, SiteAnalysisOptions, StepOutcome,
};

fn summary_json(purpose: &str) -> String {
    serde_json::json!({
        "purpose": format!("{purpose} page presenting structured information to site visitors"),
        "user_context": "Visitors browsing the site and evaluating the organization's offering",
        "business_logic": "Presents content and routes visitors deeper into the site's navigation workflow",
        "navigation_role": "Linked from the primary navigation and the footer",
        "business_importance": 0.7,
        "confidence": 0.85,
        "workflows": ["browsing"],
        "journey_stage": "middle",
        "keywords": ["content"]
    })
    .to_string()
}

fn features_json() -> String {
    serde_json::json!({
        "interactive_elements": [
            {"type": "link", "selector": "nav a", "purpose": "site navigation", "behavior": "click"}
        ],
        "functional_capabilities": [
            {"name": "navigation", "description": "Routes visitors between sections through the header navigation and in-page links", "type": "navigation"}
        ],
        "api_integrations": [
            {"method": "GET", "endpoint": "/api/content", "purpose": "content loading", "auth": "none"}
        ],
        "business_rules": [
            {"name": "published-only", "description": "Only published content renders; drafts are filtered by the content API query", "validation_logic": "status == published"}
        ],
        "third_party_integrations": [],
        "rebuild_specifications": [
            {"name": "Content section", "description": "Rebuild the content section backed by the content API endpoint", "complexity": "medium", "dependencies": []}
        ],
        "confidence": 0.8
    })
    .to_string()
}

fn four_page_site() -> (Vec<String>, MockBackend) {
    let urls: Vec<String> = ["/", "/about", "/contact", "/pricing"]
        .iter()
        .map(|p| format!("https://example.com{p}"))
        .collect();

    let mut backend = MockBackend::healthy();
    for url in &urls {
        backend = backend.with_page(
            MockPageScript::ok(url.clone(), 200)
                .title(url.trim_start_matches("https://example.com"))
                .html("<html><body><main>Content</main></body></html>"),
        );
    }
    (urls, backend)
}

fn orchestrator_with(
    dir: &TempDir,
    chat: ScriptedChat,
    backend: MockBackend,
) -> Orchestrator {
    let settings = Settings::for_tests(dir.path().to_path_buf());
    let client = LlmClient::builder()
        .provider(Arc::new(chat))
        .build()
        .unwrap();
    let engine = Arc::new(AnalysisEngine::with_client(&settings, client).unwrap());
    Orchestrator::new(settings)
        .unwrap()
        .with_engine(engine)
        .with_backend(Arc::new(backend))
}

#[tokio::test]
async fn happy_path_four_page_site() {
    let dir = TempDir::new().unwrap();
    let (urls, backend) = four_page_site();

    let mut chat = ScriptedChat::new(Provider::OpenAi);
    for url in &urls {
        chat = chat.respond(summary_json(url)).respond(features_json());
    }
    let orchestrator = orchestrator_with(&dir, chat, backend);

    let opts = SiteAnalysisOptions {
        project_id: "happy-path".into(),
        cost_priority: CostPriority::CostEfficient,
        ..Default::default()
    };
    let outcome = orchestrator.analyze_page_list(&urls, &opts).await.unwrap();

    assert_eq!(outcome.state, WorkflowState::Completed);
    assert_eq!(outcome.counts.completed, 4);
    assert_eq!(outcome.counts.failed, 0);

    // Four per-page markdowns plus the master report on disk.
    let root = dir
        .path()
        .join("happy-path")
        .join("docs/web_discovery");
    for url in &urls {
        let slug = slugify(&normalize(url).unwrap());
        assert!(
            root.join(format!("pages/page-{slug}.md")).exists(),
            "missing page markdown for {url}"
        );
        assert!(root.join(format!("pages/page-{slug}.json")).exists());
    }

    let report = tokio::fs::read_to_string(root.join("analysis-report.md"))
        .await
        .unwrap();
    assert!(report.contains("- Pages analyzed: 4"));
    assert!(report.contains("## API Integration Summary"));

    let metadata: serde_json::Value =
        serde_json::from_slice(&tokio::fs::read(root.join("analysis-metadata.json")).await.unwrap())
            .unwrap();
    assert_eq!(metadata["counts"]["total"], 4);
    assert_eq!(metadata["counts"]["completed"], 4);
    assert_eq!(metadata["counts"]["failed"], 0);
}

#[tokio::test]
async fn step2_degraded_page_is_partial_not_failed() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::healthy().with_page(
        MockPageScript::ok("https://example.com/pricing", 200).title("Pricing"),
    );

    // Step 1 clean; step 2 malformed on all three rungs including fallback.
    let chat = ScriptedChat::new(Provider::OpenAi)
        .respond(summary_json("Pricing"))
        .respond("{malformed")
        .respond("{malformed")
        .respond("{malformed");
    let orchestrator = orchestrator_with(&dir, chat, backend);

    let opts = SiteAnalysisOptions {
        project_id: "degraded".into(),
        cost_priority: CostPriority::CostEfficient,
        ..Default::default()
    };
    let outcome = orchestrator
        .analyze_page_list(&["https://example.com/pricing".to_string()], &opts)
        .await
        .unwrap();

    // Exit-code semantics: something completed, so the run is a success.
    assert_eq!(outcome.counts.completed, 1);
    assert_eq!(outcome.counts.failed, 0);

    let root = dir.path().join("degraded").join("docs/web_discovery");
    let report = tokio::fs::read_to_string(root.join("analysis-report.md"))
        .await
        .unwrap();
    assert!(report.contains("## Partial Results"));
    assert!(report.contains("pricing"));

    let slug = slugify(&normalize("https://example.com/pricing").unwrap());
    let result: site_analysis::PageResult = serde_json::from_slice(
        &tokio::fs::read(root.join(format!("pages/page-{slug}.json")))
            .await
            .unwrap(),
    )
    .unwrap();
    assert!(result.step1.is_completed());
    assert!(matches!(result.step2, StepOutcome::Failed { .. }));
}

#[tokio::test]
async fn resume_from_checkpoint_skips_completed_pages() {
    let dir = TempDir::new().unwrap();
    let (urls, backend) = four_page_site();

    // Only pages C and D may execute on resume, so script exactly two
    // pages' worth of responses; a third page would exhaust the script.
    let chat = ScriptedChat::new(Provider::OpenAi)
        .respond(summary_json("Contact"))
        .respond(features_json())
        .respond(summary_json("Pricing"))
        .respond(features_json());
    let orchestrator = orchestrator_with(&dir, chat, backend);

    // Simulate a stopped earlier run: artifacts root with a checkpoint
    // listing A and B completed, C and D pending.
    let store = site_analysis::ArtifactStore::open(dir.path(), "resume-test")
        .await
        .unwrap();
    let checkpoint = Checkpoint {
        workflow_id: "wf-earlier".into(),
        created_at: chrono::Utc::now(),
        completed_pages: urls[..2].to_vec(),
        pending_pages: urls[2..].to_vec(),
        failed_pages: vec![],
        skipped_pages: vec![],
        resume_token: store.root().display().to_string(),
    };
    store
        .write_json_atomic(&store.checkpoint_path(), &checkpoint)
        .await
        .unwrap();

    let outcome = orchestrator
        .resume_workflow_from_checkpoint(
            &store.checkpoint_path(),
            false,
            &SiteAnalysisOptions {
                cost_priority: CostPriority::CostEfficient,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.workflow_id, "wf-earlier");
    assert_eq!(outcome.state, WorkflowState::Completed);
    // All four terminal: two carried over, two newly processed.
    assert_eq!(outcome.counts.completed, 4);

    // Only the two pending pages produced fresh artifacts.
    let results = store.list_page_results().await.unwrap();
    let processed: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
    assert!(processed.contains(&"https://example.com/contact"));
    assert!(processed.contains(&"https://example.com/pricing"));
    assert!(!processed.contains(&"https://example.com/"));
}

#[tokio::test]
async fn navigation_404_fails_page_without_step2() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::healthy()
        .with_page(MockPageScript::ok("https://example.com/gone", 404));
    // No chat responses scripted: the LLM must never be called.
    let chat = ScriptedChat::new(Provider::OpenAi);
    let orchestrator = orchestrator_with(&dir, chat, backend);

    let outcome = orchestrator
        .analyze_page_list(
            &["https://example.com/gone".to_string()],
            &SiteAnalysisOptions {
                project_id: "nav-404".into(),
                cost_priority: CostPriority::CostEfficient,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.counts.failed, 1);
    assert_eq!(outcome.counts.completed, 0);

    let store = site_analysis::ArtifactStore::open(dir.path(), "nav-404")
        .await
        .unwrap();
    let results = store.list_page_results().await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].step1, StepOutcome::Failed { .. }));
    assert!(matches!(results[0].step2, StepOutcome::NotRun));
    assert_eq!(results[0].errors[0].kind, "navigation_failure");
}

#[tokio::test]
async fn missing_required_config_names_the_variable() {
    // Settings::from_env in a scrubbed environment must name the missing
    // variable and nothing may have been written to disk.
    std::env::remove_var("STEP1_MODEL");
    std::env::set_var("STEP2_MODEL", "gpt-4o");
    std::env::set_var("FALLBACK_MODEL", "gpt-4o-mini");
    std::env::set_var("OPENAI_API_KEY", "sk-test");
    std::env::set_var("OPENAI_CHAT_MODEL", "gpt-4o");

    let err = Settings::from_env().unwrap_err();
    assert!(err.to_string().contains("STEP1_MODEL"));
}

#[tokio::test]
async fn unreachable_seed_is_a_discovery_error() {
    // Nothing listens on port 1, so the robots, sitemap, and seed-probe
    // requests all fail: empty sitemap plus an unreachable seed must be a
    // discovery error, not an inventory containing the dead seed.
    let settings = Settings::for_tests(PathBuf::from("/tmp"));
    let pipeline = site_analysis::DiscoveryPipeline::new(&settings).unwrap();

    let err = pipeline.discover("http://127.0.0.1:1/").await.unwrap_err();
    match err {
        site_analysis::AnalysisError::Discovery { url, reason } => {
            assert_eq!(url, "http://127.0.0.1:1/");
            assert!(reason.contains("unreachable"));
        }
        other => panic!("expected discovery error, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_model_identifier_is_echoed() {
    let mut settings = Settings::for_tests(PathBuf::from("/tmp"));
    settings.step1_model = "gpt-does-not-exist".into();

    let registry = site_analysis::ModelRegistry::new();
    let err = site_analysis::ModelRoles::from_settings(&settings, &registry).unwrap_err();
    assert!(err.to_string().contains("gpt-does-not-exist"));
}
