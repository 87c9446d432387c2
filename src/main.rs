use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cogvideo_nodes::{ChatGlmClient, Config, ConfigBuilder, ImageTensor, VideoApi, VideoGenerator};

fn cli() -> Command {
    let token = Arg::new("token")
        .short('t')
        .long("token")
        .value_name("TOKEN")
        .help("Bearer token (overrides COGVIDEO_BEARER_TOKEN)");
    let verbose = Arg::new("verbose")
        .short('v')
        .long("verbose")
        .help("Enable verbose logging")
        .action(clap::ArgAction::SetTrue);

    Command::new("CogVideo (Rust)")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Turn still images into short videos with the CogVideo service")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (defaults to cogvideo.toml lookup)")
                .global(true),
        )
        .subcommand(
            Command::new("generate")
                .about("Upload an image, generate a video and download it")
                .arg(
                    Arg::new("image")
                        .short('i')
                        .long("image")
                        .value_name("FILE")
                        .help("Source image")
                        .required(true),
                )
                .arg(
                    Arg::new("prompt")
                        .short('p')
                        .long("prompt")
                        .value_name("TEXT")
                        .help("Motion prompt")
                        .default_value(cogvideo_nodes::nodes::DEFAULT_PROMPT),
                )
                .arg(token.clone())
                .arg(
                    Arg::new("output-dir")
                        .short('o')
                        .long("output-dir")
                        .value_name("DIR")
                        .help("Base output directory; videos land in <DIR>/cogvideo"),
                )
                .arg(
                    Arg::new("poll-interval")
                        .long("poll-interval")
                        .value_name("SECONDS")
                        .help("Seconds between status checks")
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    Arg::new("max-wait")
                        .long("max-wait")
                        .value_name("SECONDS")
                        .help("Give up after this many seconds of polling")
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(verbose.clone()),
        )
        .subcommand(
            Command::new("status")
                .about("Print the raw status payload of a job")
                .arg(
                    Arg::new("chat-id")
                        .long("chat-id")
                        .value_name("ID")
                        .help("Job identifier returned at submission")
                        .required(true),
                )
                .arg(token)
                .arg(verbose),
        )
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "cogvideo_nodes=debug,info"
    } else {
        "cogvideo_nodes=info,warn"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Optional seconds argument as a `Duration`; negative, NaN or out-of-range
/// values are rejected
fn seconds_arg(sub: &ArgMatches, name: &str) -> Result<Option<Duration>> {
    match sub.try_get_one::<f64>(name) {
        Ok(Some(&seconds)) => Duration::try_from_secs_f64(seconds)
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid --{} {}: {}", name, seconds, e)),
        _ => Ok(None),
    }
}

fn load_config(matches: &ArgMatches, sub: &ArgMatches) -> Result<Config> {
    let config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(&PathBuf::from(path))?,
        None => Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {}", e);
            Config::from_env()
        }),
    };

    let mut builder = ConfigBuilder::from_config(config);
    if let Some(token) = sub.get_one::<String>("token") {
        builder = builder.with_bearer_token(token.clone());
    }
    if let Ok(Some(dir)) = sub.try_get_one::<String>("output-dir") {
        builder = builder.with_output_dir(PathBuf::from(dir));
    }
    if let Some(interval) = seconds_arg(sub, "poll-interval")? {
        builder = builder.with_poll_interval(interval);
    }
    if let Some(max_wait) = seconds_arg(sub, "max-wait")? {
        builder = builder.with_max_wait(Some(max_wait));
    }

    let config = builder.build();
    config.validate()?;
    Ok(config)
}

async fn run_generate(config: Config, sub: &ArgMatches) -> Result<()> {
    let image_path = PathBuf::from(sub.get_one::<String>("image").context("missing --image")?);
    let prompt = sub
        .get_one::<String>("prompt")
        .map(String::as_str)
        .unwrap_or(cogvideo_nodes::nodes::DEFAULT_PROMPT);

    if !image_path.exists() {
        error!("Input image does not exist: {}", image_path.display());
        return Err(anyhow::anyhow!("Input image not found"));
    }

    let img = image::open(&image_path)
        .with_context(|| format!("cannot decode {}", image_path.display()))?
        .to_rgb8();
    let tensor = ImageTensor::from_rgb_image(&img);

    info!("🚀 CogVideo (Rust) starting...");
    info!("🖼️  Input image: {} ({}x{})", image_path.display(), img.width(), img.height());
    info!("📂 Output directory: {}", config.output.video_dir().display());

    let client = ChatGlmClient::new(&config)?;
    let generator = VideoGenerator::new(client, &config.polling).with_jpeg_quality(config.api.jpeg_quality);

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received, stopping");
            on_ctrl_c.cancel();
        }
    });

    let outcome = generator.generate(&tensor, prompt, &cancel).await?;

    info!("🎉 Generation completed in {:.2}s", outcome.elapsed.as_secs_f64());
    info!("🆔 Chat id: {}", outcome.chat_id);
    info!("🔁 Status checks: {}", outcome.polls);
    if let Some(cover) = &outcome.cover_url {
        info!("🖼️  Cover: {}", cover);
    }
    println!("{}", outcome.video_path.display());
    Ok(())
}

async fn run_status(config: Config, sub: &ArgMatches) -> Result<()> {
    let chat_id = sub.get_one::<String>("chat-id").context("missing --chat-id")?;
    let client = ChatGlmClient::new(&config)?;
    let raw = client.fetch_raw_status(chat_id).await?;
    println!("{}", raw);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let (name, sub) = matches.subcommand().context("a subcommand is required")?;

    init_logging(sub.get_flag("verbose"));
    let config = load_config(&matches, sub)?;
    info!("{}", config.summary());

    match name {
        "generate" => run_generate(config, sub).await,
        "status" => run_status(config, sub).await,
        other => Err(anyhow::anyhow!("unknown subcommand: {}", other)),
    }
}
