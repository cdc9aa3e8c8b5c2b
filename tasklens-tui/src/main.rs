mod generate;
mod loader;
mod render;
mod tui;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use notify::{RecursiveMode, Watcher};
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{io, time::Duration};
use tasklens_common::Config;
use tasklens_core::{
    load_into, BackgroundProcessor, DataProvider, EventBus, FilterEngine, ItemRenderer, Task,
};
use tracing_subscriber::EnvFilter;
use tui::app::App;
use tui::events::handle_key;
use tui::session::Session;
use tui::ui::{list_area, render};

#[derive(Parser)]
#[command(name = "tasklens", version, about = "Browse and filter large Taskwarrior exports")]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive browser over a `task export` JSON file
    Browse {
        file: PathBuf,
        #[arg(long)] query: Option<String>,
        /// Reload in the background when the file changes
        #[arg(long)] watch: bool,
    },
    /// Run one query and print the matches
    Query {
        file: PathBuf,
        query: String,
        #[arg(long, default_value_t = 50)] limit: usize,
        #[arg(long)] json: bool,
    },
    /// Write a synthetic export for load testing
    Generate {
        #[arg(default_value_t = 100_000)] count: usize,
        #[arg(long)] output: Option<PathBuf>,
        #[arg(long, default_value_t = 42)] seed: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_path = init_logging(cli.verbose)?;
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "falling back to default config");
            Config::default()
        }
    };
    tracing::debug!(log = %log_path.display(), "logging initialised");
    match cli.command {
        Commands::Browse { file, query, watch } => run_browse(file, query, watch, config)?,
        Commands::Query { file, query, limit, json } => run_query(file, query, limit, json, config)?,
        Commands::Generate { count, output, seed } => run_generate(count, output, seed)?,
    }
    Ok(())
}

/// The TUI owns the terminal, so logs go to `<cache>/tasklens/tasklens.log`.
fn init_logging(verbose: bool) -> anyhow::Result<PathBuf> {
    let dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")).join("tasklens");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("tasklens.log");
    let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
    let default = if verbose { "tasklens=debug" } else { "tasklens=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(path)
}

fn run_browse(file: PathBuf, query: Option<String>, watch: bool, config: Config) -> anyhow::Result<()> {
    let bus = Arc::new(EventBus::new());
    let engine = Arc::new(FilterEngine::from_config(&config, Arc::clone(&bus)));
    let processor = Arc::new(BackgroundProcessor::from_config(&config.background, Arc::clone(&bus)));
    processor.start_processing()?;
    let provider: Arc<dyn DataProvider<Task>> = Arc::new(loader::JsonTaskFile::new(&file));
    let version = load_into(&engine, provider.as_ref()).with_context(|| format!("loading {}", file.display()))?;

    let input_path = file.display().to_string();
    let mut app = App::new(input_path, config, Arc::clone(&engine), Arc::clone(&processor), provider);
    if let Some(s) = Session::load() {
        app.restore_from_session(&s);
    } else {
        app.refresh();
    }
    if let Some(q) = query {
        app.apply_query(&q);
    }
    app.status_msg = format!("loaded {} tasks (v{version}) | q:quit ?:help", app.total_count());
    // keep the watcher alive for the whole session
    let _watcher = if watch { Some(watch_file(&file, &mut app)?) } else { None };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let result = event_loop(&mut terminal, &mut app);

    if let Err(e) = app.to_session().save() {
        tracing::warn!(error = %e, "session not saved");
    }
    processor.shutdown();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn event_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> anyhow::Result<()> {
    let tick = Duration::from_millis(66); // 15Hz
    loop {
        let (w, h) = crossterm::terminal::size()?;
        let inner = list_area(Rect::new(0, 0, w, h), !app.saved_queries.is_empty());
        app.resize_viewport(inner.width, inner.height);
        app.poll_watch();
        app.drain_events();
        terminal.draw(|f| render(f, app))?;
        if event::poll(tick)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, key);
                }
            }
        }
        if app.should_quit {
            return Ok(());
        }
    }
}

// watches the parent dir so editors that replace the file still trigger
fn watch_file(file: &Path, app: &mut App) -> anyhow::Result<notify::RecommendedWatcher> {
    let (tx, rx) = std::sync::mpsc::channel();
    let name = file.file_name().map(|n| n.to_os_string());
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(ev) if ev.kind.is_modify() || ev.kind.is_create() => {
            if ev.paths.iter().any(|p| p.file_name().map(|n| n.to_os_string()) == name) {
                let _ = tx.send(());
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "watch error"),
    })?;
    let dir = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    tracing::info!(path = %file.display(), "watching for changes");
    app.watch_rx = Some(rx);
    Ok(watcher)
}

fn run_query(file: PathBuf, query: String, limit: usize, json: bool, config: Config) -> anyhow::Result<()> {
    let engine = FilterEngine::from_config(&config, Arc::new(EventBus::new()));
    let provider = loader::JsonTaskFile::new(&file);
    load_into(&engine, &provider).with_context(|| format!("loading {}", file.display()))?;
    let parsed = engine.apply_query(&query);
    if !parsed.ignored.is_empty() {
        eprintln!("ignored: {}", parsed.ignored.join(" "));
    }
    let results = engine.filtered_results();
    if json {
        let tasks: Vec<Task> = results.iter().take(limit).map(|t| Task::clone(t)).collect();
        println!("{}", loader::to_export_json(&tasks)?);
        return Ok(());
    }
    let renderer = render::TaskRenderer::new(config.display.show_annotations);
    for task in results.iter().take(limit) {
        match renderer.render(task, 100) {
            Ok(lines) => lines.iter().for_each(|l| println!("{}", l.text)),
            Err(e) => eprintln!("{e}"),
        }
    }
    println!("{} of {} tasks match", results.len(), engine.data_source().total_count());
    Ok(())
}

fn run_generate(count: usize, output: Option<PathBuf>, seed: u64) -> anyhow::Result<()> {
    let tasks = generate::synthetic_tasks(count, seed, chrono::Utc::now());
    let json = loader::to_export_json(&tasks)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(&path, json)?;
            println!("Wrote {count} tasks to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
