use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::analyzer::SceneAnalyzer;
use crate::core::dispatch::DispatchQueue;
use crate::core::personas::PersonaRegistry;
use crate::core::synthesizer::{CommentSynthesizer, SynthesisOutcome};
use crate::core::transcript::TranscriptBuffer;
use crate::error::CaptureError;
use crate::interfaces::capture::FrameSource;
use crate::interfaces::voice::TranscriptSource;

#[derive(Debug)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Completed {
        enqueued: usize,
        declined: usize,
        failed: usize,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub enum SkipReason {
    NoCaptureTarget,
    AnalysisFailed,
    NotRelevant,
    NoPersonas,
}

pub struct CycleSettings {
    pub interval: Duration,
    pub select_count: usize,
    pub always_include: Vec<String>,
    /// Timeout for the capture helper and the transcript service; the two
    /// generation stages carry their own.
    pub call_timeout: Duration,
    pub shutdown_grace: Duration,
}

/// Drives the fixed-interval observation loop: capture → analyze → gate →
/// select → synthesize → enqueue. The dispatcher drains the queue
/// independently.
pub struct CycleController {
    settings: CycleSettings,
    frames: Arc<dyn FrameSource>,
    analyzer: SceneAnalyzer,
    synthesizer: CommentSynthesizer,
    registry: Arc<PersonaRegistry>,
    transcript: TranscriptBuffer,
    voice: Option<Arc<dyn TranscriptSource>>,
    queue: DispatchQueue,
    shutdown: CancellationToken,
    rng: StdRng,
}

impl CycleController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: CycleSettings,
        frames: Arc<dyn FrameSource>,
        analyzer: SceneAnalyzer,
        synthesizer: CommentSynthesizer,
        registry: Arc<PersonaRegistry>,
        transcript: TranscriptBuffer,
        voice: Option<Arc<dyn TranscriptSource>>,
        queue: DispatchQueue,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            frames,
            analyzer,
            synthesizer,
            registry,
            transcript,
            voice,
            queue,
            shutdown,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replaces the sampling source with a seeded one, making per-cycle
    /// persona selection reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Runs until the shutdown token fires. A slow cycle delays later ticks
    /// instead of letting cycles overlap; on shutdown an in-flight cycle
    /// gets a bounded grace period before being abandoned.
    pub async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        let grace = self.settings.shutdown_grace;
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.settings.interval, "cycle loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cycle = self.run_cycle();
                    tokio::pin!(cycle);
                    tokio::select! {
                        outcome = &mut cycle => log_outcome(&outcome),
                        _ = shutdown.cancelled() => {
                            info!(grace = ?grace, "shutdown requested, letting the in-flight cycle finish");
                            match tokio::time::timeout(grace, &mut cycle).await {
                                Ok(outcome) => log_outcome(&outcome),
                                Err(_) => warn!("in-flight cycle abandoned after grace period"),
                            }
                            break;
                        }
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
        info!("cycle loop stopped");
    }

    /// One pass of the pipeline. Every failure is contained here; nothing a
    /// single cycle does can take the loop down.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.poll_voice().await;
        // Drained even when the cycle gates off, so fragments never pile up
        // across skipped cycles.
        let transcript = self.transcript.drain();

        let frame = match tokio::time::timeout(
            self.settings.call_timeout,
            self.frames.capture_frame(),
        )
        .await
        {
            Ok(Ok(frame)) => frame,
            Ok(Err(CaptureError::NoActiveTarget)) => {
                debug!("no active capture target, skipping cycle");
                return CycleOutcome::Skipped(SkipReason::NoCaptureTarget);
            }
            Ok(Err(e)) => {
                warn!("frame capture failed: {}", e);
                return CycleOutcome::Skipped(SkipReason::NoCaptureTarget);
            }
            Err(_) => {
                warn!("frame capture timed out");
                return CycleOutcome::Skipped(SkipReason::NoCaptureTarget);
            }
        };

        let scene = match self.analyzer.analyze(&frame, &transcript).await {
            Ok(scene) => scene,
            Err(e) => {
                warn!("scene analysis failed: {}", e);
                return CycleOutcome::Skipped(SkipReason::AnalysisFailed);
            }
        };
        drop(frame); // stage 1 is the frame's only consumer

        if !scene.is_relevant {
            debug!("scene is not the observed activity, no comments this cycle");
            return CycleOutcome::Skipped(SkipReason::NotRelevant);
        }

        let selection = match self.registry.select(
            self.settings.select_count,
            &self.settings.always_include,
            &mut self.rng,
        ) {
            Ok(selection) if !selection.is_empty() => selection,
            Ok(_) => return CycleOutcome::Skipped(SkipReason::NoPersonas),
            Err(e) => {
                // always_include is validated at startup, so this only fires
                // if the registry and config disagree at runtime.
                error!("persona selection failed: {}", e);
                return CycleOutcome::Skipped(SkipReason::NoPersonas);
            }
        };

        let outcomes = self
            .synthesizer
            .synthesize_all(&scene, &selection, &transcript)
            .await;

        let mut comments = Vec::new();
        let mut declined = 0usize;
        let mut failed = 0usize;
        for outcome in outcomes {
            match outcome {
                SynthesisOutcome::Comment(comment) => comments.push(comment),
                SynthesisOutcome::Declined { .. } => declined += 1,
                SynthesisOutcome::Failed(e) => {
                    warn!("{}", e);
                    failed += 1;
                }
            }
        }

        let enqueued = comments.len();
        self.queue.enqueue(comments);
        CycleOutcome::Completed {
            enqueued,
            declined,
            failed,
        }
    }

    async fn poll_voice(&self) {
        let Some(voice) = &self.voice else { return };
        match tokio::time::timeout(self.settings.call_timeout, voice.fetch_transcript()).await {
            Ok(Ok(text)) => {
                if text.trim().is_empty() {
                    return;
                }
                self.transcript.append(&text);
                match tokio::time::timeout(self.settings.call_timeout, voice.clear_transcript())
                    .await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("failed to clear remote transcript: {}", e),
                    Err(_) => warn!("clearing remote transcript timed out"),
                }
            }
            Ok(Err(e)) => warn!("transcript fetch failed: {}", e),
            Err(_) => warn!("transcript fetch timed out"),
        }
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Skipped(reason) => debug!(?reason, "cycle skipped"),
        CycleOutcome::Completed {
            enqueued,
            declined,
            failed,
        } => info!(enqueued, declined, failed, "cycle completed"),
    }
}
