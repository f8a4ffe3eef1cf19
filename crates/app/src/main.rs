use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context as _;
use directories::ProjectDirs;
use folio_application::Viewer;
use folio_engine::PdfEngine;
use folio_storage::Storage;
use folio_ui::{Ui, read_document};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: folio [--forget] [PATH.pdf]

Without a path the last session is restored.
  --forget   drop the saved session before starting
Logs go to folio.log in the config directory; set FOLIO_LOG to change the level.";

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    help: bool,
    forget: bool,
    path: Option<PathBuf>,
}

fn parse_args(args: impl IntoIterator<Item = OsString>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    for arg in args {
        if arg == "-h" || arg == "--help" {
            parsed.help = true;
        } else if arg == "--forget" {
            parsed.forget = true;
        } else if parsed.path.is_none() {
            parsed.path = Some(PathBuf::from(arg));
        } else {
            anyhow::bail!("unexpected argument {}\n\n{USAGE}", arg.to_string_lossy());
        }
    }
    Ok(parsed)
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = parse_args(std::env::args_os().skip(1))?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let project_dirs =
        ProjectDirs::from("dev", "folio", "folio").context("resolve project dirs")?;
    let config_dir = project_dirs.config_dir();
    fs::create_dir_all(config_dir)
        .with_context(|| format!("create config dir {}", config_dir.display()))?;

    init_logging(&config_dir.join("folio.log"))?;

    let storage = Storage::open(config_dir.join("folio.sqlite3"))?;
    let settings = storage.load_settings()?;
    storage.save_settings(&settings)?;
    if args.forget {
        storage.clear_session()?;
        tracing::info!("saved session cleared");
    }
    let mut viewer = Viewer::new(PdfEngine::new(), storage, settings);

    let startup_error = match args.path {
        Some(path) => open_path(&mut viewer, &path),
        None => match viewer.init() {
            Ok(restored) => {
                tracing::info!(restored, "startup");
                None
            }
            Err(err) => Some(format!("could not restore last document: {err}")),
        },
    };

    let mut ui = Ui::new(viewer);
    if let Some(message) = startup_error {
        ui = ui.with_error(message);
    }
    ui.run()
}

fn open_path(viewer: &mut Viewer<PdfEngine, Storage>, path: &Path) -> Option<String> {
    let (content, name) = match read_document(path) {
        Ok(read) => read,
        Err(err) => return Some(format!("{err:#}")),
    };
    viewer
        .open(content, name.clone())
        .err()
        .map(|err| format!("{name}: {err}"))
}

/// The terminal belongs to the UI, so logs go to a file.
fn init_logging(path: &Path) -> anyhow::Result<()> {
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;
    let filter = EnvFilter::try_from_env("FOLIO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .context("install log subscriber")?;
    Ok(())
}
