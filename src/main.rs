//! `crag`: command-line front end for climate_rag.
//!
//! ```sh
//! crag init
//! crag add ./docs ./notes/heat_island.md
//! crag search "熱島效應的成因" -k 5
//! crag ask "如何緩解熱島效應？"
//! crag interactive -s alice
//! ```

use std::{
    error::Error,
    io::{Write, stdout},
    path::{Path, PathBuf},
};

use clap::Parser;
use climate_rag::{
    RagChat, SharedVectorStore, VectorStore,
    chunker::{DocumentProcessor, TextSplitter, collect_files},
    commands::{Cli, Commands},
    config::{self, CONFIG_FILE_NAME, RagConfig},
    config_dir,
    embedder::embedder_from_id,
    generator::OpenAiGenerator,
    template::{self, DEFAULT_TEMPLATE_NAME, PromptTemplate},
};
use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, Print, SetAttribute, SetForegroundColor},
};
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

static TRACING: OnceCell<()> = OnceCell::new();

const EMBED_BATCH: usize = 32;

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let base = config_dir()?;

    match cli.command {
        Commands::Init => init(&base)?,
        Commands::Add { paths } => {
            let (config, store_path) = load_settings(cli.config, &base)?;
            add(&config, &store_path, &paths)?;
        }
        Commands::Search { query, top_k } => {
            let (config, store_path) = load_settings(cli.config, &base)?;
            let store = open_store(&config, &store_path)?;
            let results = store.search(&query, top_k)?;
            if store.is_empty() {
                println!("No documents indexed yet. Run `crag add <paths>` first.");
            }
            let mut out = stdout();
            for (rank, result) in results.iter().enumerate() {
                out.execute(SetForegroundColor(Color::Cyan))?;
                out.execute(Print(format!("#{} ({:.4})\n", rank + 1, result.score)))?;
                out.execute(SetForegroundColor(Color::Reset))?;
                println!("{}\n", result.content);
            }
        }
        Commands::Ask { question, session } => {
            let (config, store_path) = load_settings(cli.config, &base)?;
            let chat = build_chat(&config, &base, &store_path)?;
            answer(&chat, &question, &session).await?;
        }
        Commands::Interactive { session } => {
            let (config, store_path) = load_settings(cli.config, &base)?;
            let chat = build_chat(&config, &base, &store_path)?;
            interactive(&chat, &session).await?;
        }
    }

    Ok(())
}

/// Config from `--config` or `<base>/config.yaml`, and the snapshot path it names.
fn load_settings(
    config_override: Option<PathBuf>,
    base: &Path,
) -> Result<(RagConfig, PathBuf), Box<dyn Error>> {
    let config_path = config_override.unwrap_or_else(|| base.join(CONFIG_FILE_NAME));
    debug!("Loading config from: {}", config_path.display());
    let config = config::load_config(&config_path)?;
    let store_path = config.store_path(base);
    Ok((config, store_path))
}

/// Writes the default config and template. Existing files are left alone.
fn init(base: &Path) -> Result<(), Box<dyn Error>> {
    let config_path = base.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        warn!("Config already exists: {}", config_path.display());
    } else {
        config::write_config(&RagConfig::default(), &config_path)?;
    }

    let template_dir = base.join("templates");
    info!("Creating template directory: {}", template_dir.display());
    std::fs::create_dir_all(&template_dir)?;
    let template_path = template_dir.join(format!("{DEFAULT_TEMPLATE_NAME}.yaml"));
    if !template_path.exists() {
        std::fs::write(&template_path, serde_yaml::to_string(&PromptTemplate::default())?)?;
        info!("Created template file: {}", template_path.display());
    }

    println!("Initialized {}", base.display());
    println!("Set api_key in {} before asking questions.", config_path.display());
    Ok(())
}

fn open_store(config: &RagConfig, store_path: &Path) -> Result<VectorStore, Box<dyn Error>> {
    let embedder = embedder_from_id(&config.embedder)?;
    Ok(VectorStore::open(store_path, embedder, config.index_backend)?)
}

fn add(config: &RagConfig, store_path: &Path, paths: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(collect_files(path)?);
        } else {
            files.push(path.clone());
        }
    }

    let processor = DocumentProcessor::new(
        TextSplitter::new(config.chunk_size, config.chunk_overlap),
        config.min_chunk_chars,
    );
    let chunks = processor.process_text_files(&files);
    if chunks.is_empty() {
        println!("No usable text found in {} file(s).", files.len());
        return Ok(());
    }

    let mut store = open_store(config, store_path)?;
    let progress = ProgressBar::new(chunks.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} chunks {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    for batch in chunks.chunks(EMBED_BATCH) {
        let added = store.add_documents(batch.to_vec())?;
        progress.inc(added as u64);
    }
    progress.finish_with_message("embedded");

    store.save(store_path)?;
    println!(
        "Added {} chunks from {} file(s); store now holds {}.",
        chunks.len(),
        files.len(),
        store.len()
    );
    Ok(())
}

fn build_chat(config: &RagConfig, base: &Path, store_path: &Path) -> Result<RagChat, Box<dyn Error>> {
    let store = open_store(config, store_path)?;
    if store.is_empty() {
        warn!("Vector store at {} is empty", store_path.display());
    }

    let template_path = base
        .join("templates")
        .join(format!("{DEFAULT_TEMPLATE_NAME}.yaml"));
    let template = if template_path.exists() {
        template::load_template(DEFAULT_TEMPLATE_NAME)?
    } else {
        PromptTemplate::default()
    };

    Ok(RagChat::from_config(
        config,
        SharedVectorStore::new(store),
        Box::new(OpenAiGenerator::from_config(config)),
        template,
    ))
}

async fn answer(chat: &RagChat, question: &str, session: &str) -> Result<(), Box<dyn Error>> {
    let reply = chat.chat(question, session).await?;
    let mut out = stdout();
    out.execute(SetForegroundColor(Color::Blue))?;
    out.execute(SetAttribute(Attribute::Bold))?;
    out.execute(Print(&reply.response))?;
    out.execute(SetAttribute(Attribute::Reset))?;
    out.execute(SetForegroundColor(Color::Reset))?;
    out.execute(SetForegroundColor(Color::DarkGrey))?;
    out.execute(Print(format!("\n({} sources)\n", reply.sources)))?;
    out.execute(SetForegroundColor(Color::Reset))?;
    Ok(())
}

async fn interactive(chat: &RagChat, session: &str) -> Result<(), Box<dyn Error>> {
    let mut out = stdout();
    println!("Type `exit` to quit, `clear` to forget this session.");
    loop {
        out.execute(SetForegroundColor(Color::Green))?;
        out.execute(Print("\nYou: "))?;
        out.execute(SetForegroundColor(Color::Reset))?;
        out.flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        match input {
            "" => continue,
            "exit" => break,
            "clear" => {
                chat.clear_history(session).await;
                println!("History cleared.");
                continue;
            }
            _ => {}
        }

        // A failed generation ends this turn, not the session.
        if let Err(e) = answer(chat, input, session).await {
            out.execute(SetForegroundColor(Color::Red))?;
            out.execute(Print(format!("error: {e}\n")))?;
            out.execute(SetForegroundColor(Color::Reset))?;
        }
    }
    Ok(())
}
