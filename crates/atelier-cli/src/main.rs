use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use atelier_contracts::events::ActivityJournal;
use atelier_contracts::gallery::{FileStorage, GeneratedImage, ImageCache, PersistOutcome};
use atelier_contracts::generation::{
    GenerationMode, GenerationSettings, StylePreset, UpscaleMode, WeightedPrompt,
};
use atelier_contracts::session::{parse_command, SessionCommand, SESSION_HELP_COMMANDS};
use atelier_engine::codec::decode_base64;
use atelier_engine::config::non_empty_env;
use atelier_engine::{
    ClientConfig, DryrunTransport, GenerationOutcome, GenerationSession, ImageGenerator,
    StabilityClient,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const HOME_ENV: &str = "ATELIER_HOME";
const HOME_DIR_NAME: &str = ".atelier";
const EVENTS_FILE: &str = "events.jsonl";

type Session = GenerationSession<Box<dyn ImageGenerator>, FileStorage>;

#[derive(Debug, Parser)]
#[command(name = "atelier", version, about = "Stability image generation from the terminal")]
struct Cli {
    /// Storage directory for the gallery and activity journal.
    #[arg(long, global = true)]
    home: Option<PathBuf>,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one generation and store it in the gallery.
    Generate(GenerateArgs),
    /// Inspect or manage stored images.
    Gallery {
        #[command(subcommand)]
        action: GalleryAction,
    },
    /// Interactive prompt session.
    Session(SessionArgs),
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// `TEXT` or `TEXT::WEIGHT`; repeat for several prompts.
    #[arg(long = "prompt")]
    prompts: Vec<String>,
    #[arg(long)]
    mode: Option<GenerationMode>,
    #[arg(long)]
    cfg_scale: Option<f64>,
    #[arg(long)]
    steps: Option<u32>,
    #[arg(long)]
    samples: Option<u32>,
    #[arg(long)]
    seed: Option<u32>,
    #[arg(long)]
    style: Option<StylePreset>,
    #[arg(long)]
    image_strength: Option<f64>,
    #[arg(long)]
    upscale_mode: Option<UpscaleMode>,
    /// Init image for image-to-image and upscale.
    #[arg(long)]
    image: Option<PathBuf>,
    /// Also write the generated PNG here.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Subcommand)]
enum GalleryAction {
    List,
    Show { id: String },
    Remove { id: String },
    Clear,
    Export { id: String, path: PathBuf },
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[arg(long)]
    dryrun: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("atelier error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let home = resolve_home(cli.home.clone());
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create {}", home.display()))?;
    tracing::debug!(home = %home.display(), "storage directory");

    match cli.command {
        Command::Generate(args) => run_generate(&home, args),
        Command::Gallery { action } => run_gallery(&home, action),
        Command::Session(args) => {
            run_session(&home, args)?;
            Ok(0)
        }
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .context("failed to install log subscriber")?;
    Ok(())
}

/// `--home`, then `ATELIER_HOME`, then `~/.atelier`, then `./.atelier`.
fn resolve_home(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if let Some(path) = non_empty_env(HOME_ENV) {
        return PathBuf::from(path);
    }
    match non_empty_env("HOME") {
        Some(user_home) => Path::new(&user_home).join(HOME_DIR_NAME),
        None => PathBuf::from(HOME_DIR_NAME),
    }
}

fn open_cache(home: &Path) -> ImageCache<FileStorage> {
    ImageCache::open(FileStorage::new(home))
}

fn build_generator(dryrun: bool) -> Box<dyn ImageGenerator> {
    let config = ClientConfig::from_env();
    if dryrun {
        Box::new(StabilityClient::with_transport(config, DryrunTransport::new()))
    } else {
        Box::new(StabilityClient::new(config))
    }
}

fn open_session(home: &Path, dryrun: bool) -> (Session, ActivityJournal) {
    let journal = ActivityJournal::new(home.join(EVENTS_FILE), new_session_id());
    let session = GenerationSession::new(build_generator(dryrun), open_cache(home))
        .with_journal(journal.clone());
    (session, journal)
}

fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

fn settings_from_args(args: &GenerateArgs) -> GenerationSettings {
    let defaults = GenerationSettings::default();
    GenerationSettings {
        mode: args.mode.unwrap_or(defaults.mode),
        cfg_scale: args.cfg_scale.unwrap_or(defaults.cfg_scale),
        steps: args.steps.unwrap_or(defaults.steps),
        samples: args.samples.unwrap_or(defaults.samples),
        seed: args.seed,
        style_preset: args.style,
        image_strength: args.image_strength,
        upscale_mode: args.upscale_mode.or(defaults.upscale_mode),
    }
}

fn run_generate(home: &Path, args: GenerateArgs) -> Result<i32> {
    let (mut session, _journal) = open_session(home, args.dryrun);
    session.set_settings(settings_from_args(&args));
    session.set_prompts(args.prompts.iter().map(|raw| WeightedPrompt::parse(raw)).collect())?;
    if let Some(path) = &args.image {
        session.load_init_image(path)?;
    }

    let outcome = session.submit()?;
    print_outcome(&outcome);
    if let Some(out) = &args.out {
        write_image(&outcome.image, out)?;
        println!("Saved {}", out.display());
    }
    Ok(0)
}

fn print_outcome(outcome: &GenerationOutcome) {
    println!("id: {}", outcome.image.id);
    println!("seed: {}", outcome.result.seed);
    println!("finish_reason: {}", outcome.result.finish_reason);
    for evicted in &outcome.update.evicted {
        println!("evicted: {}", evicted.id);
    }
    if outcome.update.persisted == PersistOutcome::Discarded {
        println!("warning: gallery is too large to save; it will not survive a restart");
    }
}

fn write_image(image: &GeneratedImage, path: &Path) -> Result<()> {
    let bytes = decode_base64(&image.url)
        .with_context(|| format!("image {} holds invalid base64", image.id))?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|stamp| stamp.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn gallery_line(image: &GeneratedImage) -> String {
    format!(
        "{}  {}  {:<14}  {}",
        image.id,
        format_timestamp(image.timestamp),
        image.settings.mode.label(),
        image.prompt
    )
}

fn print_gallery(images: &[GeneratedImage]) {
    if images.is_empty() {
        println!("Gallery is empty.");
        return;
    }
    for image in images {
        println!("{}", gallery_line(image));
    }
}

fn show_image(image: &GeneratedImage) -> Result<()> {
    println!("id: {}", image.id);
    println!("created: {}", format_timestamp(image.timestamp));
    println!("prompt: {}", image.prompt);
    println!("settings: {}", serde_json::to_string_pretty(&image.settings)?);
    println!("data uri: {} chars", image.url.len());
    Ok(())
}

fn run_gallery(home: &Path, action: GalleryAction) -> Result<i32> {
    let journal = ActivityJournal::new(home.join(EVENTS_FILE), new_session_id());
    let cache = open_cache(home);
    match action {
        GalleryAction::List => print_gallery(&cache.list()),
        GalleryAction::Show { id } => {
            let Some(image) = cache.get(&id) else {
                bail!("no image with id {id}");
            };
            show_image(&image)?;
        }
        GalleryAction::Remove { id } => {
            let removed = cache.remove(&id);
            journal.image_removed(&id, removed)?;
            if !removed {
                println!("No image with id {id}.");
                return Ok(1);
            }
            println!("Removed {id}.");
        }
        GalleryAction::Clear => {
            cache.clear();
            journal.gallery_cleared()?;
            println!("Gallery cleared.");
        }
        GalleryAction::Export { id, path } => {
            let Some(image) = cache.get(&id) else {
                bail!("no image with id {id}");
            };
            write_image(&image, &path)?;
            println!("Saved {}", path.display());
        }
    }
    Ok(0)
}

fn describe_prompts(prompts: &[WeightedPrompt]) -> Vec<String> {
    prompts
        .iter()
        .enumerate()
        .map(|(idx, prompt)| {
            let text = if prompt.is_blank() {
                "(empty)"
            } else {
                prompt.text.as_str()
            };
            format!("{}. {} [{}]", idx + 1, text, prompt.weight)
        })
        .collect()
}

fn describe_settings(settings: &GenerationSettings, init_image: Option<&str>) -> Vec<String> {
    let optional = |value: Option<String>| value.unwrap_or_else(|| "none".to_string());
    vec![
        format!("mode: {}", settings.mode),
        format!("cfg: {}", settings.cfg_scale),
        format!("steps: {}", settings.steps),
        format!("samples: {}", settings.samples),
        format!("seed: {}", optional(settings.seed.map(|seed| seed.to_string()))),
        format!(
            "style: {}",
            optional(settings.style_preset.map(|style| style.to_string()))
        ),
        format!("strength: {}", settings.effective_image_strength()),
        format!("upscale: {}", settings.effective_upscale_mode()),
        format!(
            "image: {}",
            if init_image.is_some() { "loaded" } else { "none" }
        ),
    ]
}

fn run_session(home: &Path, args: SessionArgs) -> Result<()> {
    let (mut session, journal) = open_session(home, args.dryrun);
    let stdin = io::stdin();
    let mut line = String::new();

    println!(
        "Atelier session {} ({}). Type /help for commands.",
        journal.session_id(),
        session.generator().name()
    );

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        match parse_command(input) {
            SessionCommand::Noop => {}
            SessionCommand::Quit => break,
            SessionCommand::Help => {
                println!("Commands:");
                for command in SESSION_HELP_COMMANDS {
                    println!("  {command}");
                }
                println!("  any other text sets prompt 1 and generates");
            }
            SessionCommand::Generate { prompt } => {
                if let Some(text) = prompt {
                    if let Err(err) = session.set_prompt(0, text) {
                        println!("{err}");
                        continue;
                    }
                }
                match session.submit() {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(err) => println!("Generation failed: {err}"),
                }
            }
            SessionCommand::Set { key, value } => match session.apply_setting(key, &value) {
                Ok(()) => println!("{} set to {}", key.field(), value.trim()),
                Err(err) => println!("{err}"),
            },
            SessionCommand::InitImage { path: None } => {
                session.set_init_image(None);
                println!("Init image cleared.");
            }
            SessionCommand::InitImage { path: Some(path) } => {
                match session.load_init_image(Path::new(&path)) {
                    Ok(bytes) => println!("Loaded {path} ({bytes} bytes)"),
                    Err(err) => println!("{err:#}"),
                }
            }
            SessionCommand::Prompt(edit) => match session.apply_edit(edit) {
                Ok(()) => {
                    for row in describe_prompts(session.prompts()) {
                        println!("{row}");
                    }
                }
                Err(err) => println!("{err}"),
            },
            SessionCommand::ListPrompts => {
                for row in describe_prompts(session.prompts()) {
                    println!("{row}");
                }
            }
            SessionCommand::ShowSettings => {
                for row in describe_settings(session.settings(), session.init_image()) {
                    println!("{row}");
                }
            }
            SessionCommand::Gallery => print_gallery(&session.cache().list()),
            SessionCommand::Show { id } => match session.cache().get(&id) {
                Some(image) => show_image(&image)?,
                None => println!("No image with id {id}."),
            },
            SessionCommand::Delete { id } => {
                if session.remove_image(&id) {
                    println!("Removed {id}.");
                } else {
                    println!("No image with id {id}.");
                }
            }
            SessionCommand::Export { id, path } => match session.cache().get(&id) {
                Some(image) => match write_image(&image, Path::new(&path)) {
                    Ok(()) => println!("Saved {path}"),
                    Err(err) => println!("{err:#}"),
                },
                None => println!("No image with id {id}."),
            },
            SessionCommand::Clear => {
                session.clear_gallery();
                println!("Gallery cleared.");
            }
            SessionCommand::Invalid { reason, .. } => println!("{reason}"),
            SessionCommand::Unknown { command, .. } => {
                println!("Unknown command /{command}. Type /help for commands.")
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_flag_wins() {
        let flag = PathBuf::from("/tmp/atelier-test-home");
        assert_eq!(resolve_home(Some(flag.clone())), flag);
    }

    #[test]
    fn generate_flags_fill_settings() {
        let cli = Cli::parse_from([
            "atelier",
            "generate",
            "--prompt",
            "a fox::1.5",
            "--prompt",
            "blur::-1",
            "--mode",
            "img2img",
            "--cfg-scale",
            "9",
            "--style",
            "comic-book",
            "--dryrun",
        ]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let settings = settings_from_args(&args);
        assert_eq!(settings.mode, GenerationMode::ImageToImage);
        assert_eq!(settings.cfg_scale, 9.0);
        assert_eq!(settings.steps, GenerationSettings::default().steps);
        assert_eq!(settings.style_preset, Some(StylePreset::ComicBook));
        assert_eq!(settings.upscale_mode, Some(UpscaleMode::Fast));
        assert!(args.dryrun);
        assert_eq!(args.prompts.len(), 2);
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::parse_from(["atelier", "gallery", "list", "--home", "/tmp/x", "-v"]);
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/x")));
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Command::Gallery {
                action: GalleryAction::List
            }
        ));
    }

    #[test]
    fn dryrun_generate_then_export() -> Result<()> {
        let home = tempfile::tempdir()?;
        let args = GenerateArgs {
            prompts: vec!["a small boat".to_string()],
            mode: None,
            cfg_scale: None,
            steps: None,
            samples: None,
            seed: Some(3),
            style: None,
            image_strength: None,
            upscale_mode: None,
            image: None,
            out: Some(home.path().join("out/boat.png")),
            dryrun: true,
        };
        assert_eq!(run_generate(home.path(), args)?, 0);

        let png = fs::read(home.path().join("out/boat.png"))?;
        assert!(png.starts_with(b"\x89PNG"));
        let stored = open_cache(home.path()).list();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].prompt, "a small boat (1)");
        assert!(home.path().join(EVENTS_FILE).exists());
        Ok(())
    }

    #[test]
    fn settings_listing_shows_none_for_unset_options() {
        let rows = describe_settings(&GenerationSettings::default(), None);
        assert!(rows.contains(&"seed: none".to_string()));
        assert!(rows.contains(&"upscale: fast".to_string()));
        assert!(rows.contains(&"image: none".to_string()));
        assert_eq!(
            describe_prompts(&[WeightedPrompt::default()]),
            vec!["1. (empty) [1]".to_string()]
        );
    }
}
