use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use console::style;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::{self, AppConfig, CliOverrides, SAMPLE_CONFIG, SAMPLE_PERSONAS};
use crate::core::analyzer::SceneAnalyzer;
use crate::core::cycle::{CycleController, CycleSettings};
use crate::core::dispatch::DispatchQueue;
use crate::core::llm::{GenerationClient, OllamaClient};
use crate::core::personas::PersonaRegistry;
use crate::core::synthesizer::CommentSynthesizer;
use crate::core::terminal::{
    self, print_error, print_info, print_status, print_success, print_warn,
};
use crate::core::transcript::TranscriptBuffer;
use crate::interfaces::capture::CommandFrameSource;
use crate::interfaces::viewer::XmlCommentSink;
use crate::interfaces::voice::{TranscriptSource, VoiceServerClient};

fn print_help() {
    terminal::print_banner();

    println!(" {}", style("Commands").bold());
    println!(
        "   {}        Start the observation loop",
        style("run").green()
    );
    println!(
        "   {}   List the loaded personas",
        style("personas").green()
    );
    println!(
        "   {}       Write config.yaml and personas.yaml samples",
        style("init").green()
    );
    println!("   {}       Show this help message", style("help").green());
    println!();
    println!(" {}", style("Options for run/personas").bold());
    println!("   --config, -c <path>        Config file (default: config.yaml)");
    println!("   --ollama-url <url>         Override the Ollama endpoint");
    println!("   --voice-server-url <url>   Override the voice server endpoint");
    println!("   --xml-file <path>          Override the comment log path");
    println!("   --interval <secs>          Override the cycle interval");
    println!("   --no-voice                 Disable transcript collection");
    println!("   --debug                    Verbose logging");
    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("backseat").green()
    );
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RunArgs {
    pub config: PathBuf,
    pub overrides: CliOverrides,
}

pub(crate) fn parse_run_args(args: &[String], start: usize) -> RunArgs {
    let mut config = PathBuf::from("config.yaml");
    let mut overrides = CliOverrides::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--ollama-url" => {
                if i + 1 < args.len() {
                    overrides.ollama_url = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--voice-server-url" => {
                if i + 1 < args.len() {
                    overrides.voice_server_url = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--xml-file" => {
                if i + 1 < args.len() {
                    overrides.xml_file = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--interval" => {
                if i + 1 < args.len() {
                    overrides.interval = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--no-voice" => {
                overrides.no_voice = true;
                i += 1;
            }
            "--debug" => {
                overrides.debug = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    RunArgs { config, overrides }
}

fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok(); // Ignore err when already set
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "run" => {
            let parsed = parse_run_args(&args, 2);
            run_loop(parsed).await
        }
        "personas" => {
            let parsed = parse_run_args(&args, 2);
            list_personas(parsed)
        }
        "init" => run_init(),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            Ok(())
        }
    }
}

fn run_init() -> Result<()> {
    if config::write_sample(Path::new("config.yaml"), SAMPLE_CONFIG)? {
        print_success("Wrote config.yaml");
    } else {
        print_warn("config.yaml already exists, leaving it untouched");
    }
    if config::write_sample(Path::new("personas.yaml"), SAMPLE_PERSONAS)? {
        print_success("Wrote personas.yaml");
    } else {
        print_warn("personas.yaml already exists, leaving it untouched");
    }
    print_info("Edit both files, then start with: backseat run");
    Ok(())
}

fn list_personas(parsed: RunArgs) -> Result<()> {
    let mut config = AppConfig::load(&parsed.config)?;
    parsed.overrides.apply(&mut config);
    init_logging(config.behavior.debug_mode);

    let registry = PersonaRegistry::from_file(&config.personas.personas_file)?;
    println!(
        "\n {} ({})",
        style("Available personas").bold(),
        registry.len()
    );
    for persona in registry.iter() {
        println!(
            "   {} {} ({})",
            style(&persona.id).cyan().bold(),
            persona.name,
            style(&persona.handle).dim()
        );
        if !persona.description.is_empty() {
            println!("     {}", persona.description);
        }
        if !persona.example.is_empty() {
            println!("     e.g. {}", style(format!("\"{}\"", persona.example)).italic());
        }
    }
    println!();
    Ok(())
}

async fn run_loop(parsed: RunArgs) -> Result<()> {
    if !parsed.config.exists() {
        print_warn(&format!(
            "Config file {} not found, using defaults (run `backseat init` to create one)",
            parsed.config.display()
        ));
    }
    let mut config = AppConfig::load(&parsed.config)?;
    parsed.overrides.apply(&mut config);
    init_logging(config.behavior.debug_mode);

    let registry = Arc::new(PersonaRegistry::from_file(&config.personas.personas_file)?);
    if registry.is_empty() {
        bail!("the persona registry is empty; add personas or remove the file to use the built-in cast");
    }
    registry
        .validate_ids(&config.personas.always_include)
        .context("validating personas.always_include")?;

    if config.environment.capture_command.is_empty() {
        bail!(
            "environment.capture_command is not set; configure the external window-capture \
             helper (e.g. [\"grim\", \"-\"])"
        );
    }

    let timeout = config.request_timeout();
    let client: Arc<dyn GenerationClient> =
        Arc::new(OllamaClient::new(&config.environment.ollama_url, timeout)?);
    let frames = Arc::new(CommandFrameSource::new(
        config.environment.capture_command.clone(),
    )?);
    let analyzer = SceneAnalyzer::new(
        Arc::clone(&client),
        &config.models.image_analysis_model,
        timeout,
    );
    let template = load_prompt_template(&config)?;
    let synthesizer = CommentSynthesizer::new(
        Arc::clone(&client),
        &config.models.comment_generation_model,
        template,
        timeout,
        config.performance.max_in_flight,
    );

    let transcript = TranscriptBuffer::new();
    let voice: Option<Arc<dyn TranscriptSource>> = if config.behavior.enable_voice {
        match &config.environment.voice_server_url {
            Some(url) => Some(Arc::new(VoiceServerClient::new(url, timeout)?)),
            None => {
                print_warn("Voice is enabled but voice_server_url is unset; running without transcripts");
                None
            }
        }
    } else {
        None
    };

    let queue = DispatchQueue::new(config.comment_gap());
    let sink = Arc::new(XmlCommentSink::new(config.environment.xml_file.clone()));

    print_summary(&config, registry.len());

    let shutdown = CancellationToken::new();
    let dispatcher = tokio::spawn(
        queue
            .clone()
            .run_dispatcher(sink, shutdown.clone()),
    );

    let settings = CycleSettings {
        interval: config.interval(),
        select_count: config.personas.select_count,
        always_include: config.personas.always_include.clone(),
        call_timeout: timeout,
        shutdown_grace: config.shutdown_grace(),
    };
    let controller = CycleController::new(
        settings,
        frames,
        analyzer,
        synthesizer,
        Arc::clone(&registry),
        transcript,
        voice,
        queue,
        shutdown.clone(),
    );
    let loop_handle = tokio::spawn(controller.run());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    print_info("Shutting down...");
    shutdown.cancel();
    let _ = loop_handle.await;
    let _ = dispatcher.await;
    terminal::print_goodbye();
    Ok(())
}

fn load_prompt_template(config: &AppConfig) -> Result<Option<String>> {
    let Some(path) = &config.system.prompt_file else {
        return Ok(None);
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading prompt template {}", path.display()))?;
    Ok(Some(raw))
}

fn print_summary(config: &AppConfig, persona_count: usize) {
    terminal::print_banner();
    print_status("Ollama URL", &config.environment.ollama_url);
    print_status("Analysis model", &config.models.image_analysis_model);
    print_status("Comment model", &config.models.comment_generation_model);
    print_status(
        "Comment log",
        &config.environment.xml_file.display().to_string(),
    );
    print_status(
        "Interval",
        &format!("{}s", config.behavior.analysis_interval),
    );
    print_status("Pacing gap", &format!("{}s", config.behavior.comment_gap));
    print_status(
        "Personas",
        &format!(
            "{} loaded, {} per cycle",
            persona_count, config.personas.select_count
        ),
    );
    if !config.personas.always_include.is_empty() {
        print_status(
            "Always include",
            &config.personas.always_include.join(", "),
        );
    }
    match (
        config.behavior.enable_voice,
        &config.environment.voice_server_url,
    ) {
        (true, Some(url)) => print_status("Voice", url),
        _ => print_status("Voice", "disabled"),
    }
    println!();
    print_info("Press Ctrl+C to stop.");
}
