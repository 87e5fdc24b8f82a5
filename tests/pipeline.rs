//! End-to-end pipeline coverage with in-process fakes: a scripted
//! generation client, a scripted frame source, and the real queue,
//! dispatcher, and XML sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use backseat::core::analyzer::SceneAnalyzer;
use backseat::core::cycle::{CycleController, CycleOutcome, CycleSettings, SkipReason};
use backseat::core::dispatch::DispatchQueue;
use backseat::core::llm::GenerationClient;
use backseat::core::personas::PersonaRegistry;
use backseat::core::synthesizer::CommentSynthesizer;
use backseat::core::transcript::TranscriptBuffer;
use backseat::error::{CaptureError, GenerationError};
use backseat::interfaces::capture::{Frame, FrameSource};
use backseat::interfaces::viewer::{CommentSink, XmlCommentSink};

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const HANDLES: [&str; 5] = [
    "listener_bot",
    "safety_bot",
    "expert_bot",
    "fan_one",
    "fan_two",
];

struct ScriptedFrames {
    available: AtomicBool,
}

impl ScriptedFrames {
    fn available() -> Self {
        Self {
            available: AtomicBool::new(true),
        }
    }

    fn unavailable() -> Self {
        Self {
            available: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl FrameSource for ScriptedFrames {
    async fn capture_frame(&self) -> Result<Frame, CaptureError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(Frame {
                png: vec![137, 80, 78, 71],
                captured_at: SystemTime::now(),
            })
        } else {
            Err(CaptureError::NoActiveTarget)
        }
    }
}

struct ScriptedClient {
    analysis_reply: String,
    fail_handles: Vec<&'static str>,
    synthesis_calls: AtomicUsize,
}

impl ScriptedClient {
    fn with_analysis(analysis_reply: &str) -> Self {
        Self {
            analysis_reply: analysis_reply.to_string(),
            fail_handles: Vec::new(),
            synthesis_calls: AtomicUsize::new(0),
        }
    }

    fn game_scene() -> Self {
        Self::with_analysis(r#"{"description": "a boss fight, HP low", "is_game": true}"#)
    }

    fn desktop_scene() -> Self {
        Self::with_analysis(r#"{"description": "a code editor", "is_game": false}"#)
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(
        &self,
        _model: &str,
        prompt: &str,
        image_png: Option<&[u8]>,
    ) -> Result<String, GenerationError> {
        if image_png.is_some() {
            return Ok(self.analysis_reply.clone());
        }
        self.synthesis_calls.fetch_add(1, Ordering::SeqCst);
        let handle = HANDLES
            .iter()
            .find(|h| prompt.contains(*h))
            .copied()
            .unwrap_or("unknown");
        if self.fail_handles.contains(&handle) {
            return Err(GenerationError::Transport("scripted failure".to_string()));
        }
        Ok(format!("{} says: what a moment", handle))
    }
}

fn controller(
    client: Arc<ScriptedClient>,
    frames: Arc<dyn FrameSource>,
    transcript: TranscriptBuffer,
    queue: DispatchQueue,
) -> CycleController {
    let generation: Arc<dyn GenerationClient> = client;
    let registry = Arc::new(PersonaRegistry::builtin_defaults());
    let analyzer = SceneAnalyzer::new(
        Arc::clone(&generation),
        "vision-model",
        Duration::from_secs(1),
    );
    let synthesizer = CommentSynthesizer::new(
        Arc::clone(&generation),
        "text-model",
        None,
        Duration::from_secs(1),
        3,
    );
    let settings = CycleSettings {
        interval: Duration::from_secs(5),
        select_count: 5,
        always_include: vec!["listener".to_string(), "safety".to_string()],
        call_timeout: Duration::from_secs(1),
        shutdown_grace: Duration::from_secs(1),
    };
    CycleController::new(
        settings,
        frames,
        analyzer,
        synthesizer,
        registry,
        transcript,
        None,
        queue,
        CancellationToken::new(),
    )
    .with_rng_seed(7)
}

#[tokio::test]
async fn irrelevant_scene_issues_no_synthesis_and_no_comments() -> TestResult {
    let client = Arc::new(ScriptedClient::desktop_scene());
    let queue = DispatchQueue::new(Duration::ZERO);
    let mut controller = controller(
        client.clone(),
        Arc::new(ScriptedFrames::available()),
        TranscriptBuffer::new(),
        queue.clone(),
    );

    let outcome = controller.run_cycle().await;
    assert!(matches!(
        outcome,
        CycleOutcome::Skipped(SkipReason::NotRelevant)
    ));
    assert_eq!(client.synthesis_calls.load(Ordering::SeqCst), 0);
    assert_eq!(queue.depth(), 0);
    Ok(())
}

#[tokio::test]
async fn capture_unavailable_skips_but_still_drains_the_transcript() -> TestResult {
    let client = Arc::new(ScriptedClient::game_scene());
    let transcript = TranscriptBuffer::new();
    transcript.append("let's try the boss again");
    let queue = DispatchQueue::new(Duration::ZERO);
    let mut controller = controller(
        client.clone(),
        Arc::new(ScriptedFrames::unavailable()),
        transcript.clone(),
        queue.clone(),
    );

    let outcome = controller.run_cycle().await;
    assert!(matches!(
        outcome,
        CycleOutcome::Skipped(SkipReason::NoCaptureTarget)
    ));
    assert!(transcript.is_empty(), "snapshot must be consumed even on skip");
    assert_eq!(queue.depth(), 0);
    Ok(())
}

#[tokio::test]
async fn malformed_analysis_gates_the_cycle() -> TestResult {
    let client = Arc::new(ScriptedClient::with_analysis("no json here, sorry"));
    let queue = DispatchQueue::new(Duration::ZERO);
    let mut controller = controller(
        client.clone(),
        Arc::new(ScriptedFrames::available()),
        TranscriptBuffer::new(),
        queue.clone(),
    );

    let outcome = controller.run_cycle().await;
    assert!(matches!(
        outcome,
        CycleOutcome::Skipped(SkipReason::AnalysisFailed)
    ));
    assert_eq!(client.synthesis_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn one_failing_persona_still_yields_the_other_comments() -> TestResult {
    let mut scripted = ScriptedClient::game_scene();
    scripted.fail_handles.push("expert_bot");
    let client = Arc::new(scripted);
    let queue = DispatchQueue::new(Duration::ZERO);
    let mut controller = controller(
        client.clone(),
        Arc::new(ScriptedFrames::available()),
        TranscriptBuffer::new(),
        queue.clone(),
    );

    let outcome = controller.run_cycle().await;
    match outcome {
        CycleOutcome::Completed {
            enqueued,
            declined,
            failed,
        } => {
            assert_eq!(enqueued, 4);
            assert_eq!(declined, 0);
            assert_eq!(failed, 1);
        }
        other => panic!("expected completed cycle, got {:?}", other),
    }
    assert_eq!(client.synthesis_calls.load(Ordering::SeqCst), 5);
    assert_eq!(queue.depth(), 4);
    Ok(())
}

#[tokio::test]
async fn comments_flow_through_the_dispatcher_into_the_xml_log() -> TestResult {
    let dir = tempfile::tempdir()?;
    let xml_path = dir.path().join("comment.xml");
    let sink: Arc<dyn CommentSink> = Arc::new(XmlCommentSink::new(xml_path.clone()));

    let client = Arc::new(ScriptedClient::game_scene());
    let queue = DispatchQueue::new(Duration::ZERO);
    let shutdown = CancellationToken::new();
    let dispatcher = tokio::spawn(
        queue
            .clone()
            .run_dispatcher(sink, shutdown.clone()),
    );

    let mut controller = controller(
        client,
        Arc::new(ScriptedFrames::available()),
        TranscriptBuffer::new(),
        queue.clone(),
    );
    let outcome = controller.run_cycle().await;
    assert!(matches!(
        outcome,
        CycleOutcome::Completed { enqueued: 5, .. }
    ));

    let mut content = String::new();
    for _ in 0..200 {
        content = tokio::fs::read_to_string(&xml_path)
            .await
            .unwrap_or_default();
        if content.matches("<comment ").count() == 5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown.cancel();
    dispatcher.await?;

    assert_eq!(content.matches("<comment ").count(), 5);
    for handle in HANDLES {
        assert!(
            content.contains(&format!("handle=\"{}\"", handle)),
            "missing comment for {}",
            handle
        );
    }
    assert!(content.trim_end().ends_with("</log>"));
    assert_eq!(queue.depth(), 0);
    Ok(())
}

#[tokio::test]
async fn consecutive_cycles_append_after_the_pending_tail() -> TestResult {
    let client = Arc::new(ScriptedClient::game_scene());
    // A wide gap keeps the first cycle's entries pending while the second
    // cycle enqueues.
    let queue = DispatchQueue::new(Duration::from_secs(60));
    let mut controller = controller(
        client,
        Arc::new(ScriptedFrames::available()),
        TranscriptBuffer::new(),
        queue.clone(),
    );

    controller.run_cycle().await;
    controller.run_cycle().await;
    assert_eq!(queue.depth(), 10);
    Ok(())
}
