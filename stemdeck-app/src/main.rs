use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use stemdeck_app_lib::{
    AppState,
    config::{AppConfig, ConfigSource},
    drop_listed_stem, generate, get_session, list_stems, play_stem, poll_playback,
    player::CommandOutput,
    render_waveform, separate, style_catalog, toggle_style, upload_file,
};
use stemdeck_core::{
    AudioOutput, AudioSource, FsAudioSource, HttpEndpoints, HttpStemService, Indicator,
    RasterSurface, RenderOutcome, SignalLevel, Stage, StatusSignal, Stem, StemFilter, StemService,
    SymphoniaDecoder, WaveformRenderer, init_tracing_with_options,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "stemdeck")]
#[command(about = "Upload a song, split it into stems and generate new ones from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overrides `paths.logs_dir` from the config file.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Overrides `server.base_url` from the config file.
    #[arg(long)]
    server: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Runs upload, separation and optionally generation against the server.
    Session {
        file: PathBuf,

        /// Stem list filter: all, drums, vocals, bass or other.
        #[arg(long, default_value = "all")]
        filter: StemFilter,

        /// Skip waveform rendering.
        #[arg(long)]
        no_waveforms: bool,

        /// Item id or stem type to drop on the generation slot.
        #[arg(long)]
        assign: Option<String>,

        /// Style tags to toggle on, comma separated.
        #[arg(long, value_delimiter = ',')]
        styles: Vec<String>,

        /// Play the generated stem, or the assigned one, until it ends.
        #[arg(long)]
        play: bool,

        /// Print the final session snapshot as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Renders a local audio file as a text waveform.
    Waveform {
        file: PathBuf,

        #[arg(long)]
        width: Option<usize>,

        #[arg(long)]
        height: Option<usize>,
    },
    /// Prints the effective configuration as TOML.
    Config {
        /// Also list the offered style tags.
        #[arg(long)]
        styles: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut config, config_source) = AppConfig::load_or_default()?;
    if let Some(server) = cli.server {
        config.server.base_url = server;
    }
    let log_dir = cli.log_dir.unwrap_or_else(|| config.paths.logs_dir.clone());
    let telemetry = init_tracing_with_options(&log_dir, &config.tracing_options())?;
    info!(session_id = %telemetry.session_id, "stemdeck started");
    match &config_source {
        ConfigSource::File(path) => info!(path = %path.display(), "config loaded"),
        ConfigSource::Defaults(reason) => {
            warn!(reason = %reason, "no config file found, using defaults");
        }
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    match cli.command {
        Commands::Session {
            file,
            filter,
            no_waveforms,
            assign,
            styles,
            play,
            json,
        } => runtime.block_on(run_session(
            &config,
            SessionArgs {
                file,
                filter,
                waveforms: !no_waveforms,
                assign,
                styles,
                play,
                json,
            },
        )),
        Commands::Waveform {
            file,
            width,
            height,
        } => runtime.block_on(render_local(
            &config,
            &file,
            width.unwrap_or(config.waveform.width),
            height.unwrap_or(config.waveform.height),
        )),
        Commands::Config { styles } => {
            print!(
                "{}",
                toml::to_string_pretty(&config).context("failed to encode config")?
            );
            if styles {
                println!("# styles: {}", config.session.style_catalog.join(", "));
            }
            Ok(())
        }
    }
}

struct SessionArgs {
    file: PathBuf,
    filter: StemFilter,
    waveforms: bool,
    assign: Option<String>,
    styles: Vec<String>,
    play: bool,
    json: bool,
}

async fn run_session(config: &AppConfig, args: SessionArgs) -> Result<()> {
    let endpoints = endpoints_from(config)?;
    let service = HttpStemService::new(
        endpoints.clone(),
        config.request_timeout(),
        &config.server.user_agent,
    )
    .context("failed to build HTTP client")?;
    let output = CommandOutput::new(&config.playback.player_binary, Some(endpoints));
    let state = AppState::new(service, output, config);
    let printer = tokio::spawn(print_signals(state.orchestrator().subscribe()));

    let snapshot = upload_file(&state, &args.file).await.map_err(|error| anyhow!(error))?;
    if snapshot.stage == Stage::Uploaded {
        separate(&state).await.map_err(|error| anyhow!(error))?;
    }

    let listings =
        list_stems(&state, &args.filter.to_string()).map_err(|error| anyhow!(error))?;
    for listing in &listings {
        println!("{:<12} {:<8} {}", listing.id, listing.kind.as_str(), listing.name);
        if args.waveforms {
            let waveform = render_waveform(&state, &listing.id)
                .await
                .map_err(|error| anyhow!(error))?;
            print!("{}", waveform.text);
            if waveform.placeholder {
                println!();
            }
        }
    }

    if let Some(wanted) = &args.assign {
        let item = listings
            .iter()
            .find(|listing| listing.id == *wanted || listing.kind.as_str() == wanted)
            .ok_or_else(|| anyhow!("no listed stem matches '{wanted}'"))?;
        drop_listed_stem(&state, &item.id).map_err(|error| anyhow!(error))?;
    }
    for tag in &args.styles {
        if !style_catalog(&state).contains(tag) {
            info!(tag, "style is not in the catalog, sending as-is");
        }
        toggle_style(&state, tag);
    }

    let mut to_play: Option<Stem> = get_session(&state).assigned;
    if get_session(&state).affordances.generate {
        let stem = generate(&state).await.map_err(|error| anyhow!(error))?;
        println!("generated {} at {}", stem.name(), stem.path());
        to_play = Some(stem);
    }

    if let Some(stem) = to_play.filter(|_| args.play) {
        play_until_end(&state, &stem).await?;
    }

    if args.json {
        let snapshot = serde_json::to_string_pretty(&get_session(&state))
            .context("failed to encode session snapshot")?;
        println!("{snapshot}");
    }

    printer.abort();
    Ok(())
}

async fn play_until_end<S, O>(state: &AppState<S, O>, stem: &Stem) -> Result<()>
where
    S: StemService + AudioSource,
    O: AudioOutput,
{
    let listings = list_stems(state, "all").map_err(|error| anyhow!(error))?;
    let item = listings
        .iter()
        .find(|listing| listing.path == stem.path())
        .ok_or_else(|| anyhow!("{} is no longer listed", stem.name()))?;
    let indicator = play_stem(state, &item.id).map_err(|error| anyhow!(error))?;
    if indicator != Indicator::Playing {
        return Err(anyhow!("{} could not be played", stem.name()));
    }
    println!("playing {}", stem.name());
    while poll_playback(state).is_none() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    Ok(())
}

async fn print_signals(mut signals: broadcast::Receiver<StatusSignal>) {
    loop {
        match signals.recv().await {
            Ok(signal) => {
                let marker = match signal.level {
                    SignalLevel::Info => "..",
                    SignalLevel::Success => "ok",
                    SignalLevel::Error => "!!",
                };
                eprintln!("[{marker}] {}", signal.message);
            }
            Err(RecvError::Lagged(skipped)) => eprintln!("[..] {skipped} messages skipped"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn render_local(config: &AppConfig, file: &Path, width: usize, height: usize) -> Result<()> {
    let name = file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("invalid audio path {}", file.display()))?;
    let root = file.parent().map(PathBuf::from).unwrap_or_default();
    let source = FsAudioSource::new(root);
    let renderer = WaveformRenderer::new(SymphoniaDecoder, config.waveform.cache_entries);
    let mut surface = RasterSurface::new(width, height);

    match renderer
        .render(&source, &Stem::new(name, name), &mut surface)
        .await
    {
        RenderOutcome::Drawn { columns, .. } => {
            print!("{}", surface.to_text());
            info!(columns, "waveform rendered");
            Ok(())
        }
        RenderOutcome::Placeholder(error) => {
            println!("{}", surface.to_text());
            Err(anyhow!(error)).with_context(|| format!("failed to render {}", file.display()))
        }
    }
}

fn endpoints_from(config: &AppConfig) -> Result<HttpEndpoints> {
    let mut endpoints = HttpEndpoints::new(&config.server.base_url)
        .with_context(|| format!("invalid server base url {}", config.server.base_url))?;
    endpoints.upload_path.clone_from(&config.server.upload_path);
    endpoints.separate_path.clone_from(&config.server.separate_path);
    endpoints.generate_path.clone_from(&config.server.generate_path);
    Ok(endpoints)
}
