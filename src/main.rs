use clap::{Parser, Subcommand};
use env_logger::Env;
use linkbio::config::{self, AppConfig};
use linkbio::publish::Publisher;
use linkbio::sort_key::{self, SortKey};
use linkbio::store::{DraftStore, FileStore};
use linkbio::types::{Draft, Page, PageId, PageSettings, PageStatus, PageTheme};
use linkbio::{output, theme};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "linkbio")]
#[command(about = "Draft-to-published compiler for link-in-bio pages")]
#[command(long_about = "\
Draft-to-published compiler for link-in-bio pages

Pages are edited as drafts and published as immutable JSON documents with
a content-derived ETag. All state lives in a data directory:

  data/
  ├── drafts/<page_id>.json          # Editable drafts
  ├── themes/presets/<key>.json      # Theme presets
  ├── themes/custom/<id>.json        # Users' custom themes (patches)
  ├── published/<page_id>.json       # Published bytes, served verbatim
  └── .publish-manifest.json         # ETag / revision index

Run 'linkbio gen-config' to generate a documented linkbio.toml.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Data directory (overrides storage.data_dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the compiled document of a page's current draft
    Compile { page: PageId },
    /// Publish pages: compile, store bytes and ETag, mark published
    Publish {
        /// Page ids to publish
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        pages: Vec<PageId>,
        /// Publish every page in the data directory
        #[arg(long)]
        all: bool,
    },
    /// Print a page's published bytes and ETag
    Show {
        page: PageId,
        /// Print only the ETag and metadata
        #[arg(long)]
        head: bool,
    },
    /// List a draft's blocks and links in display order
    Draft { page: PageId },
    /// Create an empty draft with the configured defaults
    New {
        page: PageId,
        /// Owner of the new page
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        title: Option<String>,
    },
    /// Generate a sort key between two neighbors
    SortKey {
        /// Key of the item before the new one
        #[arg(long)]
        after: Option<SortKey>,
        /// Key of the item after the new one
        #[arg(long)]
        before: Option<SortKey>,
    },
    /// Save a custom theme patch for an owner, optionally applying it to a page
    SaveTheme {
        /// JSON object patched onto the preset config
        patch: PathBuf,
        #[arg(long)]
        owner: i64,
        /// Base preset key (defaults to themes.default_preset)
        #[arg(long)]
        preset: Option<String>,
        /// Page whose draft should use the saved theme
        #[arg(long)]
        page: Option<PageId>,
    },
    /// Deep-merge a theme patch onto a base config and print the result
    MergeTheme { base: PathBuf, patch: PathBuf },
    /// Check that every draft compiles
    Check,
    /// Print a stock linkbio.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(());
        }
        Command::SortKey { after, before } => {
            println!("{}", sort_key::generate(after.as_ref(), before.as_ref())?);
            return Ok(());
        }
        Command::MergeTheme { base, patch } => {
            let base = theme::parse_object(&std::fs::read_to_string(base)?, "base")?;
            let patch = theme::parse_object(&std::fs::read_to_string(patch)?, "patch")?;
            let merged = theme::merge(&base, &patch);
            println!("{}", serde_json::to_string_pretty(&merged)?);
            return Ok(());
        }
        _ => {}
    }

    let app_config = config::load_config(&cli.config)?;
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| app_config.storage.data_dir.clone());
    let publisher = Publisher::new(FileStore::new(data_dir));

    match cli.command {
        Command::Compile { page } => {
            let (_, compiled) = publisher.compile_page(page)?;
            println!("{}", serde_json::to_string_pretty(&compiled)?);
        }
        Command::Publish { pages, all } => {
            let pages = if all {
                publisher.store().list_pages()?
            } else {
                pages
            };
            init_thread_pool(&app_config);
            let results = publisher.publish_all(&pages);
            output::print_publish_results(&results);
            if results.iter().any(|(_, r)| r.is_err()) {
                std::process::exit(1);
            }
        }
        Command::Show { page, head } => match publisher.read_published(page)? {
            Some(entry) => {
                for line in output::format_published(&entry) {
                    eprintln!("{}", line);
                }
                if !head {
                    println!("{}", String::from_utf8_lossy(&entry.compiled));
                }
            }
            None => {
                eprintln!("Page {} has not been published", page);
                std::process::exit(1);
            }
        },
        Command::Draft { page } => {
            let draft = publisher.store().load_draft(page)?;
            output::print_draft(&draft);
        }
        Command::New { page, owner, title } => {
            let draft = new_draft(&app_config, page, owner, title);
            let revision = publisher.save_draft(&draft, 0)?;
            println!("Created page {} (revision {})", page, revision);
        }
        Command::SaveTheme {
            patch,
            owner,
            preset,
            page,
        } => {
            let store = publisher.store();
            let preset_key = preset.unwrap_or_else(|| app_config.themes.default_preset.clone());
            let preset = store.load_preset(&preset_key)?;
            let patch = theme::parse_object(&std::fs::read_to_string(&patch)?, "patch")?;
            let custom =
                store.save_custom_theme(owner, &preset, patch, app_config.themes.custom_policy)?;
            println!("Custom theme {} ({})", custom.id, custom.hash);

            if let Some(page) = page {
                let mut draft = store.load_draft(page)?;
                let revision = draft.revision;
                draft.page.theme.preset_key = preset.key.clone();
                draft.page.theme.custom_id = Some(custom.id);
                let revision = publisher.save_draft(&draft, revision)?;
                println!("Page {} now uses it (revision {})", page, revision);
            }
        }
        Command::Check => {
            let results: Vec<_> = publisher
                .store()
                .list_pages()?
                .into_iter()
                .map(|id| (id, publisher.compile_page(id).map(|(_, compiled)| compiled)))
                .collect();
            output::print_check(&results);
            if results.iter().any(|(_, r)| r.is_err()) {
                std::process::exit(1);
            }
        }
        Command::GenConfig | Command::SortKey { .. } | Command::MergeTheme { .. } => {}
    }

    Ok(())
}

/// Log level comes from `RUST_LOG` when set, otherwise from `-v` count.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Initialize the rayon thread pool from `[publish] workers`.
fn init_thread_pool(app_config: &AppConfig) {
    let threads = config::effective_workers(&app_config.publish);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn new_draft(app_config: &AppConfig, id: PageId, owner_id: i64, title: Option<String>) -> Draft {
    Draft::new(Page {
        id,
        owner_id,
        title,
        locale: app_config.pages.default_locale.clone(),
        status: PageStatus::Draft,
        theme: PageTheme {
            preset_key: app_config.themes.default_preset.clone(),
            custom_id: None,
            mode: app_config.pages.default_mode.clone(),
        },
        settings: PageSettings::default(),
    })
}
