//! 命令行入口：读取 HTML 文件，用词汇表改写正文后写出

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wordweave::env::core::{LogLevel, NoColor};
use wordweave::env::EnvVar;
use wordweave::parsers::{find_body, html_to_dom, serialize_document};
use wordweave::translation::{
    process_subtree, ConfigManager, ContentLedger, ContentSegmenter, DisplayMode,
    GlossaryReplacer, PipelineConfig, ProcessingCoordinator, TranslationPosition,
    TranslationResult,
};

/// Wordweave CLI
#[derive(Parser)]
#[command(name = "wordweave")]
#[command(about = "Weave glossary translations into an HTML document for language learning")]
#[command(version)]
struct Cli {
    /// Input HTML file
    input: PathBuf,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Glossary file, a flat TOML or JSON map of term -> translation
    #[arg(short, long)]
    glossary: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How original text is displayed (visible, learning-blur, hidden)
    #[arg(long)]
    display_mode: Option<DisplayMode>,

    /// Where translations are inserted (before, after)
    #[arg(long)]
    position: Option<TranslationPosition>,

    /// Wrap translations in parentheses
    #[arg(long)]
    parentheses: bool,

    /// Input document charset
    #[arg(long, default_value = "utf-8")]
    charset: String,
}

fn init_logging() {
    let env_filter = match LogLevel::lookup() {
        Some(Ok(level)) => EnvFilter::new(level),
        _ => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let ansi = !NoColor::get_or_default(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stderr).with_ansi(ansi))
        .init();
}

fn load_config(cli: &Cli) -> TranslationResult<PipelineConfig> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::from_path(path)?,
        None => ConfigManager::new()?,
    };
    let mut config = manager.into_config();

    if let Some(mode) = cli.display_mode {
        config.rewrite.display_mode = mode;
    }
    if let Some(position) = cli.position {
        config.rewrite.translation_position = position;
    }
    if cli.parentheses {
        config.rewrite.show_parentheses = true;
    }
    // 静态输出不保留高亮类名
    config.coordinator.glow_duration_ms = 0;

    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;
    let glossary = GlossaryReplacer::from_file(&cli.glossary)?;
    tracing::info!("词汇表已加载: {} 个词条", glossary.len());

    let data = fs::read(&cli.input)?;
    let dom = html_to_dom(&data, &cli.charset);
    let body = find_body(&dom).ok_or("文档缺少 body 元素")?;

    let ledger = ContentLedger::new(config.ledger.clone());
    let segmenter = ContentSegmenter::new(config.segmenter.clone(), ledger.clone());
    let coordinator = ProcessingCoordinator::new(ledger.clone(), config.coordinator.clone());

    let result = process_subtree(&body, &segmenter, &coordinator, &glossary, &config.rewrite).await;
    if !result.success {
        return Err(result
            .error
            .unwrap_or_else(|| "处理失败".to_string())
            .into());
    }
    coordinator.run_effects().await;

    let stats = ledger.stats();
    tracing::info!(
        "处理完成: {} 个分段, {} 处替换, 跳过 {}, 耗时 {}ms (账本: 成功 {}, 失败 {})",
        result.processed_count,
        result.replacement_count,
        result.skipped_count,
        result.duration_ms,
        stats.successes,
        stats.failures
    );

    let output = serialize_document(&dom, &cli.charset);
    match &cli.output {
        Some(path) => fs::write(path, output)?,
        None => io::stdout().write_all(&output)?,
    }

    ledger.destroy();
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
