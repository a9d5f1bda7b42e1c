use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

/// Render a dailies movie from an image sequence: color transform, resize,
/// text overlays, then encoding through ffmpeg.
#[derive(Parser, Debug)]
#[command(name = "dailies", version)]
struct Cli {
    /// Input image sequence: a directory containing frames, a path to one
    /// frame, a printf-style `%05d` path, or a `#####` path.
    input_path: PathBuf,

    /// Codec profile name from the config's `output_codecs` section.
    #[arg(short, long)]
    codec: Option<String>,

    /// Dailies profile name from the config's `dailies_profiles` section.
    #[arg(short, long)]
    profile: Option<String>,

    /// Output directory, overriding the configured movie location. Relative
    /// paths resolve against the image sequence directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Text element contents, e.g. "artist: Jed Smith | comment: first pass".
    #[arg(short, long)]
    text: Option<String>,

    /// Color transform preset from the config's `ocio_profiles` section.
    #[arg(short = 'C', long = "color-transform", alias = "ocio")]
    color_transform: Option<String>,

    /// Config file path (defaults to $DAILIES_CONFIG, then
    /// ./dailies-config.yaml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write each processed frame as a numbered JPEG instead of invoking the
    /// encoder.
    #[arg(short, long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config_path = dailies::Config::locate(cli.config.as_deref());
    let config = dailies::Config::load(&config_path)
        .with_context(|| format!("load config '{}'", config_path.display()))?;

    let resolved = config.resolve(
        cli.codec.as_deref(),
        cli.profile.as_deref(),
        cli.color_transform.as_deref(),
    )?;

    let texts = match &cli.text {
        Some(arg) => dailies::parse_text_arg(arg)?,
        None => Default::default(),
    };

    let options = dailies::PipelineOptions {
        output_override: cli.output,
        texts,
        debug: cli.debug || resolved.globals.debug,
    };

    let pipeline = dailies::DailyPipeline::new(resolved, options);
    let movies = pipeline.run(&cli.input_path)?;
    for movie in movies {
        eprintln!("wrote {}", movie.display());
    }
    Ok(())
}
