#![deny(warnings)]

mod serve;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use interview_coach_core::config::{
    parse_url, resolve_api_key, resolve_string_with_default, validate_frame_width, AppConfig,
    ClassifierConfig, ConfigError, Env, GenerationConfig, ModelName, SamplingInterval, StdEnv,
    DEFAULT_BIND_ADDR, DEFAULT_CLASSIFIER_URL, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL,
    DEFAULT_INTERVAL_SECS, DEFAULT_VIDEO_PATH, ENV_CLASSIFIER_URL, ENV_GEMINI_API_KEY,
    ENV_VIDEO_PATH,
};
use interview_coach_core::emotion::HttpEmotionClassifier;
use interview_coach_core::generate::GeminiGenerator;
use interview_coach_core::pipeline::{Pipeline, PipelineConfig};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "interview-coach")]
#[command(about = "Recorded interview feedback (sample -> classify -> tally -> generate)")]
struct Cli {
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze one recording and print the report.
    Analyze(AnalyzeArgs),
    /// Serve `GET /run-script`, which runs `analyze` in a child process.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Defaults to $INTERVIEW_COACH_VIDEO, then ./testvid2.mov.
    #[arg(long)]
    video: Option<String>,

    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    interval_secs: f64,

    #[arg(long, default_value = DEFAULT_GEMINI_MODEL)]
    model: String,

    #[arg(long)]
    gemini_api_key: Option<String>,

    #[arg(long, default_value = DEFAULT_GEMINI_BASE_URL)]
    gemini_base_url: String,

    #[arg(long)]
    classifier_url: Option<String>,

    #[arg(long)]
    max_frame_width: Option<u32>,

    /// Print the whole session result as JSON instead of the text report.
    #[arg(long)]
    json: bool,
}

/// Every analysis option given here is forwarded to each `analyze` run. The API
/// key reaches the child only through the inherited environment.
#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value = DEFAULT_BIND_ADDR)]
    bind: String,

    #[arg(long)]
    video: Option<String>,

    #[arg(long)]
    interval_secs: Option<f64>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    gemini_base_url: Option<String>,

    #[arg(long)]
    classifier_url: Option<String>,

    #[arg(long)]
    max_frame_width: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Command::Analyze(args) => run_analyze(args).await,
        Command::Serve(args) => run_serve(args, &cli.log_level).await,
    }
}

async fn run_analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let json = args.json;
    let cfg = build_config(args, &StdEnv)?;

    tracing::info!(
        video = %cfg.video_path.display(),
        interval_secs = cfg.sampling.as_secs(),
        model = cfg.generation.model.as_str(),
        classifier = %cfg.classifier.endpoint,
        "config loaded"
    );

    let classifier = HttpEmotionClassifier::new(cfg.classifier.endpoint.clone())?;
    let generator = GeminiGenerator::new(&cfg.generation)?;
    let pipeline = Pipeline::new(classifier, generator, PipelineConfig::from_app(&cfg));
    watch_interrupt(pipeline.stop.clone());

    match pipeline.run().await {
        Ok(result) if json => println!("{}", serde_json::to_string_pretty(&result)?),
        Ok(result) => println!("{result}"),
        Err(e) => {
            // Reported on stdout so the trigger relays it as output.
            tracing::error!(error = %e, "analysis aborted");
            println!("Error: {e}");
        }
    }

    Ok(())
}

/// First Ctrl-C ends sampling early and feedback is still generated; a second
/// one exits immediately.
fn watch_interrupt(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if handle_interrupts(stop, tokio::signal::ctrl_c).await {
            tracing::warn!("interrupted again, exiting");
            std::process::exit(EXIT_INTERRUPTED);
        }
    });
}

/// Returns `true` once a second interrupt arrives.
async fn handle_interrupts<F, Fut>(stop: Arc<AtomicBool>, mut next_interrupt: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_interrupt().await {
        tracing::warn!(error = %e, "could not listen for ctrl-c");
        return false;
    }
    tracing::warn!("interrupted, finishing with the samples taken so far (ctrl-c again to exit)");
    stop.store(true, Ordering::Relaxed);

    match next_interrupt().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "could not listen for ctrl-c");
            false
        }
    }
}

async fn run_serve(args: ServeArgs, log_level: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = args
        .bind
        .parse()
        .with_context(|| format!("invalid --bind address: {}", args.bind))?;
    validate_forwarded(&args)?;

    let program = std::env::current_exe().context("locating the interview-coach executable")?;
    let state = serve::ServeState::new(program, analyze_child_args(&args, log_level));
    serve::serve(addr, state).await
}

/// Rejects bad forwarded options at startup instead of on every request.
fn validate_forwarded(args: &ServeArgs) -> Result<(), ConfigError> {
    if let Some(secs) = args.interval_secs {
        SamplingInterval::new(secs)?;
    }
    if let Some(model) = &args.model {
        ModelName::new(model.as_str())?;
    }
    if let Some(url) = &args.gemini_base_url {
        parse_url("gemini base", url)?;
    }
    if let Some(url) = &args.classifier_url {
        parse_url("classifier", url)?;
    }
    validate_frame_width(args.max_frame_width)?;
    Ok(())
}

fn analyze_child_args(args: &ServeArgs, log_level: &str) -> Vec<String> {
    let mut child = vec![
        "--log-level".to_owned(),
        log_level.to_owned(),
        "analyze".to_owned(),
    ];
    let mut forward = |flag: &str, value: Option<String>| {
        if let Some(value) = value {
            child.extend([flag.to_owned(), value]);
        }
    };
    forward("--video", args.video.clone());
    forward("--interval-secs", args.interval_secs.map(|s| s.to_string()));
    forward("--model", args.model.clone());
    forward("--gemini-base-url", args.gemini_base_url.clone());
    forward("--classifier-url", args.classifier_url.clone());
    forward("--max-frame-width", args.max_frame_width.map(|w| w.to_string()));
    child
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    // stdout carries only the report.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: AnalyzeArgs, env: &impl Env) -> anyhow::Result<AppConfig> {
    let video_path = PathBuf::from(resolve_string_with_default(
        args.video,
        ENV_VIDEO_PATH,
        env,
        DEFAULT_VIDEO_PATH,
    ));
    let sampling = SamplingInterval::new(args.interval_secs)?;
    let max_frame_width = validate_frame_width(args.max_frame_width)?;

    let api_key = resolve_api_key(args.gemini_api_key, ENV_GEMINI_API_KEY, env)?
        .ok_or(ConfigError::MissingApiKey(ENV_GEMINI_API_KEY))?;
    let generation = GenerationConfig {
        api_key,
        model: ModelName::new(args.model)?,
        base_url: parse_url("gemini base", &args.gemini_base_url)?,
    };

    let classifier_url = resolve_string_with_default(
        args.classifier_url,
        ENV_CLASSIFIER_URL,
        env,
        DEFAULT_CLASSIFIER_URL,
    );
    let classifier = ClassifierConfig {
        endpoint: parse_url("classifier", &classifier_url)?,
    };

    Ok(AppConfig {
        video_path,
        sampling,
        max_frame_width,
        generation,
        classifier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_coach_core::config::MapEnv;

    fn analyze(extra: &[&str]) -> AnalyzeArgs {
        let argv = ["interview-coach", "analyze"].iter().chain(extra);
        match Cli::parse_from(argv).command {
            Command::Analyze(args) => args,
            other => panic!("expected analyze, got {other:?}"),
        }
    }

    #[test]
    fn defaults_fill_everything_but_the_key() {
        let env = MapEnv::default().with_var(ENV_GEMINI_API_KEY, "k");
        let cfg = build_config(analyze(&[]), &env).expect("config");
        assert_eq!(cfg.video_path, PathBuf::from(DEFAULT_VIDEO_PATH));
        assert_eq!(cfg.sampling.as_secs(), DEFAULT_INTERVAL_SECS);
        assert_eq!(cfg.generation.model.as_str(), DEFAULT_GEMINI_MODEL);
        assert_eq!(cfg.classifier.endpoint.as_str(), DEFAULT_CLASSIFIER_URL);
        assert_eq!(cfg.max_frame_width, None);
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let err = build_config(analyze(&[]), &MapEnv::default()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::MissingApiKey(ENV_GEMINI_API_KEY))
        );
    }

    #[test]
    fn flags_override_environment() {
        let env = MapEnv::default()
            .with_var(ENV_GEMINI_API_KEY, "env-key")
            .with_var(ENV_VIDEO_PATH, "env.mov")
            .with_var(ENV_CLASSIFIER_URL, "http://env:1/analyze");
        let args = analyze(&[
            "--video",
            "cli.mov",
            "--classifier-url",
            "http://cli:2/analyze",
            "--gemini-api-key",
            "cli-key",
            "--interval-secs",
            "0.5",
        ]);
        let cfg = build_config(args, &env).expect("config");
        assert_eq!(cfg.video_path, PathBuf::from("cli.mov"));
        assert_eq!(cfg.classifier.endpoint.as_str(), "http://cli:2/analyze");
        assert_eq!(cfg.generation.api_key.expose(), "cli-key");
        assert_eq!(cfg.sampling.as_secs(), 0.5);
    }

    #[test]
    fn invalid_interval_is_rejected() {
        let env = MapEnv::default().with_var(ENV_GEMINI_API_KEY, "k");
        let err = build_config(analyze(&["--interval-secs", "0"]), &env).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    fn serve_args(extra: &[&str]) -> ServeArgs {
        let argv = ["interview-coach", "serve"].iter().chain(extra);
        match Cli::parse_from(argv).command {
            Command::Serve(args) => args,
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn serve_forwards_only_what_was_given() {
        let args = serve_args(&["--video", "talk.mov", "--interval-secs", "1.5"]);
        assert_eq!(
            analyze_child_args(&args, "debug"),
            vec![
                "--log-level",
                "debug",
                "analyze",
                "--video",
                "talk.mov",
                "--interval-secs",
                "1.5"
            ]
        );
    }

    #[test]
    fn serve_forwards_model_width_and_urls() {
        let args = serve_args(&[
            "--model",
            "gemini-2.0-pro",
            "--max-frame-width",
            "640",
            "--gemini-base-url",
            "http://127.0.0.1:9/",
            "--classifier-url",
            "http://127.0.0.1:5001/analyze",
        ]);
        validate_forwarded(&args).expect("valid");
        let child = analyze_child_args(&args, "info");
        assert_eq!(
            &child[3..],
            [
                "--model",
                "gemini-2.0-pro",
                "--gemini-base-url",
                "http://127.0.0.1:9/",
                "--classifier-url",
                "http://127.0.0.1:5001/analyze",
                "--max-frame-width",
                "640"
            ]
        );

        // The forwarded flags must parse back as analyze arguments.
        let argv = std::iter::once("interview-coach".to_owned()).chain(child);
        let Command::Analyze(forwarded) = Cli::parse_from(argv).command else {
            panic!("expected analyze");
        };
        assert_eq!(forwarded.model, "gemini-2.0-pro");
        assert_eq!(forwarded.max_frame_width, Some(640));
        assert_eq!(forwarded.gemini_base_url, "http://127.0.0.1:9/");
    }

    #[test]
    fn serve_rejects_bad_forwarded_options() {
        assert_eq!(
            validate_forwarded(&serve_args(&["--max-frame-width", "0"])),
            Err(ConfigError::ZeroFrameWidth)
        );
        assert!(validate_forwarded(&serve_args(&["--model", " "])).is_err());
        assert!(validate_forwarded(&serve_args(&["--gemini-base-url", "not a url"])).is_err());
    }

    fn scripted_interrupts(
        script: Vec<std::io::Result<()>>,
    ) -> impl FnMut() -> std::future::Ready<std::io::Result<()>> {
        let mut script = script.into_iter();
        move || std::future::ready(script.next().expect("interrupt scripted"))
    }

    #[tokio::test]
    async fn second_interrupt_requests_exit() {
        let stop = Arc::new(AtomicBool::new(false));
        let exit = handle_interrupts(stop.clone(), scripted_interrupts(vec![Ok(()), Ok(())])).await;
        assert!(exit);
        assert!(stop.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn first_interrupt_only_stops_sampling() {
        let stop = Arc::new(AtomicBool::new(false));
        let lost = std::io::Error::other("signal handler gone");
        let script = scripted_interrupts(vec![Ok(()), Err(lost)]);
        let exit = handle_interrupts(stop.clone(), script).await;
        assert!(!exit);
        assert!(stop.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn listener_failure_leaves_run_alone() {
        let stop = Arc::new(AtomicBool::new(false));
        let failed = std::io::Error::other("no signal support");
        let exit = handle_interrupts(stop.clone(), scripted_interrupts(vec![Err(failed)])).await;
        assert!(!exit);
        assert!(!stop.load(Ordering::Relaxed));
    }
}
