// Shoebox CLI

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use shoebox_lib::library::Library;
use shoebox_lib::metadata::FsMetadataExtractor;
use shoebox_lib::model::normalize_path_str;
use shoebox_lib::settings::{default_data_dir, load_settings, save_settings, LibraryConfig};
use shoebox_lib::store::Store;
use shoebox_lib::watch::{NoopObserver, WatchConfig, WatchService};

#[derive(Parser)]
#[command(name = "shoebox", about = "Local media library", version)]
struct Cli {
    /// Library data directory (defaults to the per-user data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the library data directory and default settings
    Init,
    /// Import individual media files
    Import {
        files: Vec<PathBuf>,
    },
    /// Import a folder as a folder-bound category
    ImportFolder {
        folder: PathBuf,
    },
    /// List library contents
    List {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Manage categories
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },
    /// Watch folders and keep the library in sync until interrupted
    Watch {
        /// Folders to watch; stored in settings for later runs
        folders: Vec<PathBuf>,
    },
    /// Show item count, active backend and migration threshold
    Status,
}

#[derive(Subcommand)]
enum CategoryAction {
    Add {
        name: String,
        #[arg(long)]
        father: Option<String>,
    },
    Rename {
        id: String,
        name: String,
    },
    Delete {
        id: String,
    },
    List,
    /// Place images into a category
    Assign {
        category: String,
        images: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    let store = Store::open(&data_dir, LibraryConfig::default())
        .with_context(|| format!("opening library at {}", data_dir.display()))?;
    let store = Arc::new(store);
    let library = Library::new(Arc::clone(&store), Arc::new(FsMetadataExtractor));

    match cli.command {
        Command::Init => {
            let settings = load_settings(&data_dir);
            save_settings(&data_dir, &settings)?;
            println!("library initialized at {}", data_dir.display());
        }
        Command::Import { files } => {
            let outcome = library.import_files(&files)?;
            println!("imported {} files, skipped {}", outcome.added, outcome.skipped);
        }
        Command::ImportFolder { folder } => {
            let (category, outcome) = library.import_folder(&folder)?;
            println!(
                "folder '{}' bound to category {} ({} added, {} skipped)",
                folder.display(),
                category.id,
                outcome.added,
                outcome.skipped
            );
        }
        Command::List { limit } => {
            let (images, _) = library.list()?;
            for image in images.iter().take(limit) {
                let marks = format!(
                    "{}{}",
                    if image.favorite { "*" } else { " " },
                    image.rating.map(|r| r.to_string()).unwrap_or_default()
                );
                println!("{}  {:>2} {}", image.id, marks, image.path);
            }
            if images.len() > limit {
                println!("... and {} more", images.len() - limit);
            }
        }
        Command::Category { action } => run_category(&library, action)?,
        Command::Watch { folders } => run_watch(&library, folders)?,
        Command::Status => {
            let (images, categories) = library.list()?;
            println!("backend:    {}", store.mode().as_str());
            println!("items:      {}", images.len());
            println!("categories: {}", categories.len());
            println!("threshold:  {}", store.config().max_item_count);
        }
    }
    Ok(())
}

fn run_category(library: &Library, action: CategoryAction) -> anyhow::Result<()> {
    match action {
        CategoryAction::Add { name, father } => {
            let category = library.add_category(&name, father.as_deref())?;
            println!("{}  {}", category.id, category.name);
        }
        CategoryAction::Rename { id, name } => {
            library.rename_category(&id, &name)?;
        }
        CategoryAction::Delete { id } => {
            library.delete_category(&id)?;
        }
        CategoryAction::List => {
            let (_, mut categories) = library.list()?;
            categories.sort_by_key(|c| c.order);
            for category in &categories {
                let indent = if category.father.is_some() { "  " } else { "" };
                let bound = if category.is_bound_to_folder { " [folder]" } else { "" };
                println!(
                    "{}{}  {} ({}){}",
                    indent, category.id, category.name, category.count, bound
                );
            }
        }
        CategoryAction::Assign { category, images } => {
            let ids: BTreeSet<String> = images.into_iter().collect();
            library.add_to_category(&ids, &[category])?;
        }
    }
    Ok(())
}

fn run_watch(library: &Library, folders: Vec<PathBuf>) -> anyhow::Result<()> {
    let data_dir = library.store().data_dir().to_path_buf();
    let mut settings = load_settings(&data_dir);

    let folders: Vec<PathBuf> = if folders.is_empty() {
        settings.watched_folders.iter().map(PathBuf::from).collect()
    } else {
        settings.watched_folders = folders
            .iter()
            .map(|f| normalize_path_str(f))
            .collect();
        save_settings(&data_dir, &settings)?;
        folders
    };
    anyhow::ensure!(!folders.is_empty(), "no folders to watch");

    let config = WatchConfig::from(library.store().config());
    let service = WatchService::new(library.clone(), config, Arc::new(NoopObserver));
    service.update_watchers(&folders)?;
    println!("watching {} folder(s), ctrl-c to stop", folders.len());

    loop {
        std::thread::park();
    }
}
