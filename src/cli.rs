use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kubishi_rs::api::{self, RecordPayload, SentencePayload, WordPayload};
use kubishi_rs::{
    CommandModel, Dictionary, DirectorySource, EmbeddingModel, SearchMode, SearchOutcome,
    SearchRequest, Word,
};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(
    name = "kubishi-rs",
    about = "Search the Owens Valley Paiute dictionary",
    version
)]
pub struct Cli {
    /// Site root containing `data/words.json`, `data/sentences.json` and `data/embeddings.json`.
    #[arg(long, global = true, default_value = "public")]
    data_dir: PathBuf,

    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// Command that reads a query on stdin and prints its embedding as a JSON array.
    #[arg(long, global = true)]
    embed_command: Option<String>,

    /// Model id of the embed command; must match the corpus embeddings.
    #[arg(long, global = true, requires = "embed_command")]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rank words or sentences for a query.
    Search {
        query: String,
        #[arg(short, long, value_enum, default_value_t = SearchMode::English)]
        mode: SearchMode,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        #[arg(short, long, default_value_t = 0)]
        skip: usize,
    },
    /// Show one word by id or `slug_guid`, with its example sentences.
    Word { id: String },
    /// List words alphabetically.
    Browse {
        /// Restrict to forms whose first letter is this one (`#` for none).
        #[arg(long)]
        letter: Option<String>,
        /// Print per-letter counts instead of words.
        #[arg(long)]
        counts: bool,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        #[arg(short, long, default_value_t = 0)]
        skip: usize,
    },
    /// Print a random word.
    Random,
    /// Print a random example sentence.
    RandomSentence,
    /// Print today's word.
    WordOfTheDay,
    /// Serve the JSON API.
    #[cfg(feature = "web")]
    Serve {
        #[arg(long, default_value = "127.0.0.1:8788")]
        addr: std::net::SocketAddr,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dispatch(cli))
}

fn embedding_model(cli: &Cli) -> Result<Option<Arc<dyn EmbeddingModel>>, Box<dyn Error>> {
    let Some(command_line) = cli.embed_command.as_deref() else {
        return Ok(None);
    };
    let model_id = cli.model.clone().unwrap_or_default();
    let model = CommandModel::from_command_line(model_id, command_line)
        .ok_or("--embed-command cannot be empty")?;
    let model: Arc<dyn EmbeddingModel> = Arc::new(model);
    Ok(Some(model))
}

async fn dispatch(cli: Cli) -> Result<(), Box<dyn Error>> {
    let model = embedding_model(&cli)?;

    #[cfg(feature = "web")]
    {
        if let Command::Serve { addr } = &cli.command {
            let config = kubishi_rs::web::WebConfig {
                addr: *addr,
                data_dir: cli.data_dir.clone(),
                model,
            };
            kubishi_rs::web::serve(config).await?;
            return Ok(());
        }
    }

    let mut dictionary = Dictionary::new(Arc::new(DirectorySource::new(&cli.data_dir)));
    if let Some(model) = model {
        dictionary = dictionary.with_model(model);
    }
    let as_json = cli.json;

    match cli.command {
        Command::Search {
            query,
            mode,
            limit,
            skip,
        } => {
            let request = SearchRequest::new(query, mode).limit(limit).skip(skip);
            handle_search(&dictionary, &request, as_json).await
        }
        Command::Word { id } => handle_word(&dictionary, &id, as_json).await,
        Command::Browse {
            letter,
            counts,
            limit,
            skip,
        } => handle_browse(&dictionary, letter.as_deref(), counts, limit, skip, as_json).await,
        Command::Random => {
            let corpus = dictionary.corpus().await?;
            let word = corpus
                .random_word(&mut rand::thread_rng())
                .ok_or("The dictionary has no words")?;
            print_word(word, as_json)
        }
        Command::RandomSentence => {
            let corpus = dictionary.corpus().await?;
            let sentence = corpus
                .random_sentence(&mut rand::thread_rng())
                .ok_or("The dictionary has no sentences")?;
            let payload = SentencePayload::from(sentence);
            if as_json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{}", payload.text);
                println!("  {}", payload.translation);
            }
            Ok(())
        }
        Command::WordOfTheDay => {
            let corpus = dictionary.corpus().await?;
            let today = chrono::Local::now().date_naive();
            let word = corpus
                .word_of_the_day(today)
                .ok_or("The dictionary has no words")?;
            print_word(word, as_json)
        }
        #[cfg(feature = "web")]
        Command::Serve { .. } => Ok(()),
    }
}

async fn handle_search(
    dictionary: &Dictionary,
    request: &SearchRequest,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    if request.query.trim().is_empty() {
        return Err("Search query cannot be empty".into());
    }
    let outcome = dictionary.search(request).await?;
    let corpus = dictionary.corpus().await?;
    let results = api::hydrate(&corpus, &outcome.hits);

    if as_json {
        let payload = json!({
            "query": outcome.query,
            "mode": outcome.mode,
            "pagination": outcome.page,
            "degraded": outcome.degraded,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_search_table(&outcome, &results);
    }
    Ok(())
}

async fn handle_word(dictionary: &Dictionary, id: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let corpus = dictionary.corpus().await?;
    let word = corpus
        .word_by_param(id)
        .ok_or_else(|| format!("No word found for {id:?}"))?;
    let sentences: Vec<SentencePayload> = corpus
        .sentences_for_word(&word.id)
        .into_iter()
        .map(SentencePayload::from)
        .collect();

    if as_json {
        let payload = json!({ "word": WordPayload::from(word), "sentences": sentences });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    print_word(word, false)?;
    if !sentences.is_empty() {
        println!("\nSentences:");
        for sentence in &sentences {
            println!("- {}", sentence.text);
            if !sentence.translation.is_empty() {
                println!("    {}", sentence.translation);
            }
        }
    }
    Ok(())
}

async fn handle_browse(
    dictionary: &Dictionary,
    letter: Option<&str>,
    counts: bool,
    limit: usize,
    skip: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let corpus = dictionary.corpus().await?;
    if counts {
        let counts = corpus.letter_counts();
        if as_json {
            println!("{}", serde_json::to_string_pretty(&json!({ "letterCounts": counts }))?);
        } else {
            println!("{:<6}  {}", "LETTER", "COUNT");
            println!("{:-<6}  {}", "", "-----");
            for count in counts {
                println!("{:<6}  {}", count.letter, count.count);
            }
        }
        return Ok(());
    }

    let page = dictionary.config().browse_page(Some(limit), Some(skip));
    let words = corpus.browse(letter, page);
    if as_json {
        let results: Vec<WordPayload> = words.into_iter().map(WordPayload::from).collect();
        let payload = json!({
            "results": results,
            "pagination": { "letter": letter, "limit": page.limit, "skip": page.skip },
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if words.is_empty() {
        println!("No words to list.");
    } else {
        let width = words
            .iter()
            .map(|word| word.primary_form().chars().count())
            .max()
            .unwrap_or(4)
            .max("FORM".len());
        println!("{:<width$}  {}", "FORM", "GLOSS", width = width);
        println!("{:-<width$}  {}", "", "-----", width = width);
        for word in words {
            println!(
                "{:<width$}  {}",
                word.primary_form(),
                first_gloss(word).unwrap_or(""),
                width = width
            );
        }
    }
    Ok(())
}

fn print_search_table(outcome: &SearchOutcome, results: &[api::Scored<RecordPayload>]) {
    if outcome.degraded {
        eprintln!("note: semantic ranking unavailable, showing TF-IDF results");
    }
    if results.is_empty() {
        println!("No results for \"{}\" ({} search).", outcome.query, outcome.mode);
        return;
    }
    let rows: Vec<(String, String, String)> = results
        .iter()
        .map(|result| {
            let score = result
                .score
                .map(|score| format!("{score:.3}"))
                .unwrap_or_default();
            match &result.record {
                RecordPayload::Word(word) => {
                    let gloss = word
                        .senses
                        .iter()
                        .find_map(|sense| sense.gloss.clone().or_else(|| sense.definition.clone()))
                        .unwrap_or_default();
                    (word.word.clone(), gloss, score)
                }
                RecordPayload::Sentence(sentence) => {
                    (sentence.text.clone(), sentence.translation.clone(), score)
                }
            }
        })
        .collect();
    let width = rows
        .iter()
        .map(|(text, _, _)| text.chars().count())
        .max()
        .unwrap_or(4)
        .max("MATCH".len());
    println!(
        "Results for \"{}\" ({} search, skip {}):",
        outcome.query, outcome.mode, outcome.page.skip
    );
    println!("{:<width$}  {:>9}  {}", "MATCH", "SCORE", "MEANING", width = width);
    println!("{:-<width$}  {:->9}  {}", "", "", "-------", width = width);
    for (text, meaning, score) in rows {
        println!("{:<width$}  {:>9}  {}", text, score, meaning, width = width);
    }
}

fn print_word(word: &Word, as_json: bool) -> Result<(), Box<dyn Error>> {
    let payload = WordPayload::from(word);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    println!("Word: {} (ID {})", payload.word, payload.id);
    if let Some(morph_type) = payload.traits.get("morph-type") {
        println!("Morph type: {morph_type}");
    }
    println!("\nSenses:");
    for (index, sense) in payload.senses.iter().enumerate() {
        let label = sense.grammatical_info.as_deref().unwrap_or("unknown");
        let meaning = sense
            .gloss
            .as_deref()
            .or(sense.definition.as_deref())
            .unwrap_or("<meaning unavailable>");
        println!("- [{} #{}] {}", label, index + 1, meaning);
        if let (Some(gloss), Some(definition)) = (&sense.gloss, &sense.definition) {
            if gloss != definition {
                println!("    Definition: {definition}");
            }
        }
        for example in sense.examples.iter().take(3) {
            println!("    Example: {}", example.form);
            if !example.translation.is_empty() {
                println!("             {}", example.translation);
            }
        }
    }
    Ok(())
}

fn first_gloss(word: &Word) -> Option<&str> {
    word.senses
        .iter()
        .find_map(|sense| sense.glosses.first().or_else(|| sense.definitions.first()))
}
