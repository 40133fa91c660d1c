use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use swatch::{
    CameraConfig, CommandEngine, CpuPreviewEngine, DaemonLoop, DaemonOpts, EditorCommand,
    EditorSession, Mailbox, PreviewModel, RenderEngine, RenderEvent, Resolution, TextureSlot,
};

#[derive(Parser, Debug)]
#[command(name = "swatch", version)]
struct Cli {
    /// Project directory.
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the project directory layout and default settings.
    Init,
    /// Add a material with default values.
    Add {
        /// Defaults to the first free `Material_<n>`.
        #[arg(long)]
        name: Option<String>,
    },
    /// Edit a material's scalar values.
    Set(SetArgs),
    /// Rename a material and migrate its folder.
    Rename { old: String, new: String },
    /// List materials.
    List,
    /// Copy a texture into a material's folder and assign it to a slot.
    ImportTexture {
        name: String,
        /// albedo, metalness, detail or emissive.
        slot: String,
        file: PathBuf,
    },
    /// Configure the renderer executable.
    SetEngine {
        path: PathBuf,
        /// Argument template; `{mailbox}` and `{project}` are substituted. Replaces the default.
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Preview on a primitive (`primitive:cube`) or an imported model file.
    SetModel { model: String },
    /// Set camera position and light rotation.
    SetCamera {
        #[arg(allow_hyphen_values = true)]
        x: f32,
        #[arg(allow_hyphen_values = true)]
        y: f32,
        #[arg(allow_hyphen_values = true)]
        z: f32,
        #[arg(allow_hyphen_values = true)]
        light_degrees: f32,
    },
    /// Render one material's preview through the renderer daemon.
    Render {
        name: String,
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Render every material in order.
    RefreshAll {
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Write an integration snippet and copy textures into `exports/<name>/`.
    Export { name: String },
    /// Run the renderer daemon on a mailbox directory.
    Daemon(DaemonArgs),
}

#[derive(Parser, Debug)]
struct SetArgs {
    name: String,
    /// Albedo as `r,g,b` in [0, 1].
    #[arg(long, value_delimiter = ',')]
    albedo: Option<Vec<f32>>,
    #[arg(long)]
    smoothness: Option<f32>,
    #[arg(long)]
    metalness: Option<f32>,
}

#[derive(Parser, Debug)]
struct DaemonArgs {
    /// Mailbox directory shared with the editor.
    #[arg(long)]
    mailbox: PathBuf,

    #[arg(long, value_enum, default_value_t = EngineChoice::Cpu)]
    engine: EngineChoice,

    /// Program for `--engine command`.
    #[arg(long)]
    program: Option<PathBuf>,

    /// Argument template for `--engine command`.
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Output edge length in pixels.
    #[arg(long, default_value_t = 512)]
    size: u32,

    #[arg(long, default_value_t = 100)]
    poll_ms: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EngineChoice {
    Cpu,
    Command,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.cmd {
        Command::Init => cmd_init(cli.project),
        Command::Add { name } => cmd_add(cli.project, name),
        Command::Set(args) => cmd_set(cli.project, args),
        Command::Rename { old, new } => cmd_rename(cli.project, &old, &new),
        Command::List => cmd_list(cli.project),
        Command::ImportTexture { name, slot, file } => {
            cmd_import_texture(cli.project, &name, &slot, file)
        }
        Command::SetEngine { path, args } => cmd_set_engine(cli.project, path, args),
        Command::SetModel { model } => cmd_set_model(cli.project, &model),
        Command::SetCamera {
            x,
            y,
            z,
            light_degrees,
        } => cmd_set_camera(cli.project, [x, y, z], light_degrees),
        Command::Render { name, timeout_secs } => cmd_render(cli.project, &name, timeout_secs),
        Command::RefreshAll { timeout_secs } => cmd_refresh_all(cli.project, timeout_secs),
        Command::Export { name } => cmd_export(cli.project, &name),
        Command::Daemon(args) => cmd_daemon(args),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_init(project: PathBuf) -> anyhow::Result<()> {
    let session = EditorSession::create(&project)?;
    session.close()?;
    eprintln!("initialized {}", project.display());
    Ok(())
}

fn cmd_add(project: PathBuf, name: Option<String>) -> anyhow::Result<()> {
    let mut session = EditorSession::open(project)?;
    session.apply(EditorCommand::AddMaterial(name), Instant::now())?;
    session.apply(EditorCommand::SaveMaterial, Instant::now())?;
    let added = session
        .selected()
        .map(|m| m.name.clone())
        .context("added material is not selected (bug)")?;
    session.close()?;
    println!("{added}");
    Ok(())
}

fn cmd_set(project: PathBuf, args: SetArgs) -> anyhow::Result<()> {
    let mut session = EditorSession::open(project)?;
    let now = Instant::now();
    session.apply(EditorCommand::Select(args.name.clone()), now)?;
    if let Some(rgb) = args.albedo {
        let &[r, g, b] = rgb.as_slice() else {
            anyhow::bail!("--albedo expects exactly three values");
        };
        session.apply(EditorCommand::SetAlbedo([r, g, b]), now)?;
    }
    if let Some(v) = args.smoothness {
        session.apply(EditorCommand::SetSmoothness(v), now)?;
    }
    if let Some(v) = args.metalness {
        session.apply(EditorCommand::SetMetalness(v), now)?;
    }
    session.apply(EditorCommand::SaveMaterial, now)?;
    session.close()?;
    Ok(())
}

fn cmd_rename(project: PathBuf, old: &str, new: &str) -> anyhow::Result<()> {
    let mut session = EditorSession::open(project)?;
    session.apply(EditorCommand::Select(old.to_string()), Instant::now())?;
    session.apply(EditorCommand::Rename(new.to_string()), Instant::now())?;
    session.close()?;
    Ok(())
}

fn cmd_list(project: PathBuf) -> anyhow::Result<()> {
    let session = EditorSession::open(project)?;
    for m in session.store().iter() {
        let [r, g, b] = m.albedo();
        println!(
            "{}\talbedo={r},{g},{b}\tsmoothness={}\tmetalness={}",
            m.name, m.smoothness, m.metalness
        );
    }
    Ok(())
}

fn cmd_import_texture(
    project: PathBuf,
    name: &str,
    slot: &str,
    file: PathBuf,
) -> anyhow::Result<()> {
    let slot = TextureSlot::from_key(slot)
        .with_context(|| format!("unknown texture slot '{slot}'"))?;
    let mut session = EditorSession::open(project)?;
    let rel = session.import_texture(name, slot, &file)?;
    session.close()?;
    println!("{rel}");
    Ok(())
}

fn cmd_set_engine(project: PathBuf, path: PathBuf, args: Vec<String>) -> anyhow::Result<()> {
    let path = std::fs::canonicalize(&path)
        .with_context(|| format!("resolve renderer path '{}'", path.display()))?;
    let mut session = EditorSession::open(project)?;
    session.set_engine(path, (!args.is_empty()).then_some(args))?;
    session.close()?;
    Ok(())
}

fn cmd_set_model(project: PathBuf, model: &str) -> anyhow::Result<()> {
    let mut session = EditorSession::open(project)?;
    let file = PathBuf::from(model);
    let command = if file.is_file() {
        EditorCommand::ImportPreviewModel(file)
    } else {
        EditorCommand::SetPreviewModel(PreviewModel::parse(model)?)
    };
    session.apply(command, Instant::now())?;
    session.close()?;
    Ok(())
}

fn cmd_set_camera(project: PathBuf, position: [f32; 3], light: f32) -> anyhow::Result<()> {
    let camera = CameraConfig::parse(&format!(
        "{},{},{},{light}",
        position[0], position[1], position[2]
    ))?;
    let mut session = EditorSession::open(project)?;
    session.apply(EditorCommand::SetCamera(camera), Instant::now())?;
    session.close()?;
    Ok(())
}

fn cmd_render(project: PathBuf, name: &str, timeout_secs: u64) -> anyhow::Result<()> {
    let mut session = EditorSession::open(project)?;
    session.start_daemon()?;
    session.apply(EditorCommand::Select(name.to_string()), Instant::now())?;
    session.apply(EditorCommand::RequestRender, Instant::now())?;
    let events = session.wait_idle(Duration::from_secs(timeout_secs))?;

    let updated = events
        .iter()
        .any(|e| matches!(e, RenderEvent::Updated { owner, .. } if owner == name));
    let preview = session.layout().material_preview_path(name);
    session.close()?;
    if !updated {
        anyhow::bail!("no preview produced for '{name}': {events:?}");
    }
    eprintln!("wrote {}", preview.display());
    Ok(())
}

fn cmd_refresh_all(project: PathBuf, timeout_secs: u64) -> anyhow::Result<()> {
    let mut session = EditorSession::open(project)?;
    session.start_daemon()?;
    let report = session.refresh_all(Duration::from_secs(timeout_secs))?;
    session.close()?;
    for name in &report.updated {
        eprintln!("rendered {name}");
    }
    for (name, reason) in &report.failed {
        eprintln!("failed {name}: {reason}");
    }
    if !report.failed.is_empty() {
        anyhow::bail!("{} material(s) failed to render", report.failed.len());
    }
    Ok(())
}

fn cmd_export(project: PathBuf, name: &str) -> anyhow::Result<()> {
    let mut session = EditorSession::open(project)?;
    session.apply(EditorCommand::Select(name.to_string()), Instant::now())?;
    let report = session.export_selected()?;
    for missing in &report.missing {
        eprintln!("missing texture {missing}");
    }
    eprintln!("wrote {}", report.snippet.display());
    Ok(())
}

fn cmd_daemon(args: DaemonArgs) -> anyhow::Result<()> {
    let engine: Box<dyn RenderEngine> = match args.engine {
        EngineChoice::Cpu => Box::new(CpuPreviewEngine::default()),
        EngineChoice::Command => {
            let program = args
                .program
                .context("--engine command requires --program")?;
            Box::new(CommandEngine::new(program, args.args))
        }
    };
    let mailbox = Mailbox::open(&args.mailbox)?;
    let opts = DaemonOpts {
        poll_interval: Duration::from_millis(args.poll_ms.max(1)),
        resolution: Resolution::new(args.size, args.size)?,
        ..DaemonOpts::default()
    };

    let shutdown = AtomicBool::new(false);
    let mut daemon = DaemonLoop::new(mailbox, engine, opts);
    // Runs until the editor terminates the process.
    daemon.run(&shutdown);
    Ok(())
}
