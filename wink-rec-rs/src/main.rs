use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use wink_rec::corpus::{self, Track};
use wink_rec::features::FeatureSet;
use wink_rec::keywords::{self, KeywordSet};
use wink_rec::session::{RecommendedTrack, Turn};
use wink_rec::{
    backend, semantic, Config, EmbeddingMode, FeatureSimilarity, JsonSessionStore,
    Recommendation, Recommender, ScoredCandidate, SessionStore, SongRecord, Strategy,
};

#[derive(Parser, Debug)]
#[command(
    name = "wink-rec",
    version,
    about = "Keyword-history song recommendation (tag search / audio features)"
)]
struct Args {
    /// TOML config file
    #[arg(long, global = true, env = "WINK_REC_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding session_<id>.json files
    #[arg(long = "session-dir", global = true, env = "WINK_REC_SESSION_DIR")]
    session_dir: Option<PathBuf>,

    /// Tagged song corpus (JSON or CSV)
    #[arg(long = "tagged-corpus", global = true)]
    tagged_corpus: Option<PathBuf>,

    /// Audio-feature song corpus (JSON or CSV)
    #[arg(long = "audio-corpus", global = true)]
    audio_corpus: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Record a turn and recommend songs for it
    Recommend {
        /// Continue this session (a new one is created when omitted)
        #[arg(long)]
        session: Option<String>,

        /// Comma- or space-separated keywords
        #[arg(long, conflicts_with = "text")]
        keywords: Option<String>,

        /// Free text to pull keywords from
        #[arg(long)]
        text: Option<String>,

        /// Keywords kept from --text
        #[arg(long = "max-keywords", default_value_t = 3)]
        max_keywords: usize,

        #[arg(long, value_enum, default_value_t = Strategy::TagSearch)]
        strategy: Strategy,

        /// History embedding used by the audio strategy
        #[arg(long, value_enum)]
        mode: Option<EmbeddingMode>,

        /// Number of songs to return
        #[arg(long = "top-k")]
        top_k: Option<usize>,

        /// Output JSON only (no table)
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },
    /// Per-feature similarities for a session's keyword history
    Features {
        #[arg(long)]
        session: String,

        #[arg(long, value_enum)]
        mode: Option<EmbeddingMode>,
    },
    /// Precompute the feature descriptor embeddings
    BuildFeatures {
        #[arg(long)]
        out: PathBuf,
    },
    /// Random songs with mood tags, as if nearby listeners were playing them
    Nearby {
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,

        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    New,
    List,
    Show { id: String },
    Close { id: String },
}

#[derive(Serialize)]
struct SongOutput<'a> {
    #[serde(flatten)]
    candidate: &'a ScoredCandidate<SongRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
}

#[derive(Serialize)]
struct RecommendOutput<'a> {
    session_id: &'a str,
    strategy: Strategy,
    keywords: &'a KeywordSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    feature_similarities: Option<&'a FeatureSimilarity>,
    songs: Vec<SongOutput<'a>>,
}

impl<'a> RecommendOutput<'a> {
    fn new(session_id: &'a str, rec: &'a Recommendation) -> Self {
        Self {
            session_id,
            strategy: rec.strategy,
            keywords: &rec.keywords,
            feature_similarities: rec.feature_similarities.as_ref(),
            songs: rec
                .songs
                .iter()
                .map(|c| SongOutput {
                    candidate: c,
                    preview_url: c.record.preview_url(),
                    duration_ms: c.record.duration_ms(),
                })
                .collect(),
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut cfg = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = &args.session_dir {
        cfg.paths.session_dir = dir.clone();
    }
    if let Some(p) = &args.tagged_corpus {
        cfg.paths.tagged_corpus = p.clone();
    }
    if let Some(p) = &args.audio_corpus {
        cfg.paths.audio_corpus = p.clone();
    }
    Ok(cfg)
}

fn print_similarities(sims: &FeatureSimilarity) {
    let mut table = comfy_table::Table::new();
    table.set_header(vec!["Feature".bold(), "Similarity".bold()]);
    for (name, s) in sims.ranked() {
        table.add_row(vec![name.to_string(), format!("{s:.6}")]);
    }
    eprintln!("{}", "Audio feature similarities".green().bold());
    eprintln!("{}", table);
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wink_rec=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut cfg = load_config(&args)?;
    let store = JsonSessionStore::new(&cfg.paths.session_dir);

    match args.command {
        Command::Session { action } => match action {
            SessionAction::New => {
                let record = store.create()?;
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            SessionAction::List => {
                println!("{}", serde_json::to_string_pretty(&store.list()?)?);
            }
            SessionAction::Show { id } => {
                let record = store.record(&id)?;
                let summary = record.history_summary();
                if !summary.is_empty() {
                    eprintln!("{}", summary.cyan());
                }
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            SessionAction::Close { id } => {
                let record = store.close(&id)?;
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
        },
        Command::Recommend {
            session,
            keywords,
            text,
            max_keywords,
            strategy,
            mode,
            top_k,
            json,
        } => {
            let turn_keywords = match (&keywords, &text) {
                (Some(list), _) => KeywordSet::parse(list),
                (None, Some(t)) => keywords::extract_fallback(t, max_keywords),
                (None, None) => bail!("pass --keywords or --text"),
            };
            if turn_keywords.is_empty() {
                bail!("no usable keywords in the input");
            }
            if let Some(m) = mode {
                cfg.audio.mode = m;
            }
            if let Some(k) = top_k {
                cfg.postprocess.result_count = k;
            }
            cfg.validate()?;

            let mut record = match &session {
                Some(id) => store.record(id)?,
                None => store.create()?,
            };
            let seen = record.seen_track_ids();
            let mut history = record.history();
            history.push(turn_keywords.clone());

            let backend = backend::from_config(&cfg.embedding)?;
            let recommender = Recommender::new(backend, cfg);
            let rec = recommender
                .recommend(&history, &seen, strategy)
                .context("recommendation failed")?;

            let mut turn = Turn::new(turn_keywords);
            turn.input_text = text.or(keywords).unwrap_or_default();
            turn.recommended = rec
                .songs
                .iter()
                .map(|c| RecommendedTrack {
                    id: c.id().to_string(),
                    title: c.title().to_string(),
                    artist: c.artist().to_string(),
                    score: c.score,
                })
                .collect();
            record.turns.push(turn);
            store.save(&record)?;

            if !json {
                if let Some(sims) = &rec.feature_similarities {
                    print_similarities(sims);
                }
                let mut table = comfy_table::Table::new();
                table.set_header(vec![
                    "Title".bold(),
                    "Artist".bold(),
                    "Album".bold(),
                    "Score".bold(),
                ]);
                for c in &rec.songs {
                    table.add_row(vec![
                        c.title().to_string(),
                        c.artist().to_string(),
                        c.album().to_string(),
                        format!("{:.4}", c.score),
                    ]);
                }
                eprintln!(
                    "{} {}",
                    "Recommendations for".green().bold(),
                    rec.keywords.joined().yellow()
                );
                eprintln!("{}", table);
            }
            let out = RecommendOutput::new(&record.session_id, &rec);
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Features { session, mode } => {
            let history = store.load(&session)?;
            let mode = mode.unwrap_or(cfg.audio.mode);
            let backend = backend::from_config(&cfg.embedding)?;
            let recommender = Recommender::new(backend, cfg);
            let sims = recommender.feature_similarities(&history, mode)?;
            print_similarities(&sims);
            println!("{}", serde_json::to_string_pretty(&sims)?);
        }
        Command::BuildFeatures { out } => {
            let backend = backend::from_config(&cfg.embedding)?;
            let set = FeatureSet::build(&backend)?;
            set.save_json(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            eprintln!(
                "{} {} features -> {}",
                "Saved".green().bold(),
                set.len(),
                out.display()
            );
        }
        Command::Nearby { count, seed } => {
            let songs = corpus::load_tagged(&cfg.paths.tagged_corpus)?;
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_entropy(),
            };
            let picked = semantic::sample_with_mood(&songs, count, &mut rng)?;
            println!("{}", serde_json::to_string_pretty(&picked)?);
        }
    }
    Ok(())
}
