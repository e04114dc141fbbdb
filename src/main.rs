use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use lexicache::languages::language_flag;
use lexicache::{AppContext, Config};

#[derive(Parser)]
#[command(name = "lexicache", version, about = "Localized strings with translation memory")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan templates for t() calls and register missing keys
    SyncTexts,
    /// Import existing translations into memory
    MemorySync {
        /// Run even if auto-sync is disabled or not yet due
        #[arg(long)]
        force: bool,
    },
    /// Memory totals and usage counters
    MemoryStats,
    /// Translate every missing value, memory first
    TranslateMissing {
        #[arg(long)]
        group: Option<String>,
        /// Overwrite values that already exist
        #[arg(long)]
        force: bool,
    },
    /// Per-language and per-group translation coverage
    Coverage,
    /// Ask the AI to review up to 50 translated values of a language
    QualityCheck {
        #[arg(long)]
        lang: String,
    },
}

#[derive(Serialize)]
struct CoverageRow {
    lang: String,
    flag: &'static str,
    count: u64,
    total: u64,
    percent: f64,
}

#[tokio::main]
async fn main() -> lexicache::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();
    lexicache::init_tracing();

    let cli = Cli::parse();
    let ctx = AppContext::from_config(Config::from_env())?;

    let output = match cli.command {
        Command::SyncTexts => serde_json::to_value(ctx.sync_texts(&[])?)?,
        Command::MemorySync { force } => serde_json::to_value(ctx.sync.run(force)?)?,
        Command::MemoryStats => serde_json::json!({
            "memory": ctx.memory.stats()?,
            "usage": ctx.usage.stats()?,
        }),
        Command::TranslateMissing { group, force } => {
            let report = ctx
                .orchestrator
                .translate_missing(group.as_deref(), None, force)
                .await?;
            serde_json::to_value(report)?
        }
        Command::Coverage => {
            let source_lang = ctx.languages.source_lang()?;
            let languages = ctx.languages.languages()?;
            let per_lang: Vec<CoverageRow> = ctx
                .source
                .coverage(&languages, &source_lang)?
                .into_iter()
                .map(|(lang, c)| CoverageRow {
                    flag: language_flag(&lang).unwrap_or("🏳"),
                    lang,
                    count: c.count,
                    total: c.total,
                    percent: c.percent,
                })
                .collect();
            serde_json::json!({
                "languages": per_lang,
                "groups": ctx.source.coverage_by_group(&languages, &source_lang)?,
            })
        }
        Command::QualityCheck { lang } => {
            serde_json::to_value(ctx.orchestrator.quality_check(&lang).await?)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    ctx.shutdown().await;
    info!("done");
    Ok(())
}
