//! Interactive and one-shot question answering.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use libpal_core::{ConversationTurn, LibpalError, Session};

use crate::loader::load_document;
use crate::slash::{self, SlashCommand};

const EXCERPT_CHARS: usize = 500;

/// Load each path into the session, reporting per file. Returns how many loaded.
pub async fn add_documents(session: &mut Session, paths: &[PathBuf]) -> usize {
    let mut loaded = 0;
    for path in paths {
        match add_document(session, path).await {
            Ok(chunks) => {
                loaded += 1;
                println!(
                    "  \x1b[32m+\x1b[0m {} ({} chunks)",
                    path.display(),
                    chunks
                );
            }
            Err(e) => eprintln!("\x1b[31mError: {}\x1b[0m", e),
        }
    }
    loaded
}

async fn add_document(session: &mut Session, path: &Path) -> anyhow::Result<usize> {
    let doc = load_document(path)?;
    if doc.lossy {
        println!(
            "  \x1b[33m!\x1b[0m {} is not UTF-8; decoded as Latin-1",
            doc.source_id
        );
    }
    session
        .insert_document(&doc.source_id, &doc.text)
        .await
        .map_err(|e| anyhow::anyhow!(describe_error(&e)))
}

/// User-facing wording for a failed operation.
pub fn describe_error(err: &LibpalError) -> String {
    match err {
        LibpalError::Embedding(e) => format!(
            "Embedding service unavailable ({e}). Documents and questions cannot be processed until it is reachable."
        ),
        LibpalError::Generation(e) => format!(
            "The language model could not produce an answer ({e}). Your documents are still loaded; try again."
        ),
        other => other.to_string(),
    }
}

/// Truncate to `max_chars` characters, marking the cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

pub fn format_latency(latency_ms: u64) -> String {
    format!("{:.2}s", latency_ms as f64 / 1000.0)
}

fn print_turn(turn: &ConversationTurn) {
    println!("\n{}\n", turn.answer);
    if turn.grounded {
        let cited: Vec<String> = turn
            .citations
            .iter()
            .map(|c| {
                format!(
                    "{} #{} ({:.2})",
                    c.chunk.source_id, c.chunk.chunk_index, c.score
                )
            })
            .collect();
        println!("\x1b[2mSources: {}\x1b[0m", cited.join(", "));
    }
    println!("\x1b[2mAnswered in {}\x1b[0m", format_latency(turn.latency_ms));
}

fn print_sources(turn: Option<&ConversationTurn>) {
    let Some(turn) = turn.filter(|t| !t.citations.is_empty()) else {
        println!("No sources to show yet. Ask a question first.");
        return;
    };
    for (i, result) in turn.citations.iter().enumerate() {
        println!(
            "\n\x1b[1m[{}] {} | chunk {} | score {:.2}\x1b[0m",
            i + 1,
            result.chunk.source_id,
            result.chunk.chunk_index,
            result.score
        );
        println!("{}", excerpt(&result.chunk.text, EXCERPT_CHARS));
    }
}

async fn print_status(session: &Session) {
    println!(
        "  Model: {} | Embeddings: {} | Chunks: {} | Turns: {}",
        session.model_name(),
        session.embedder_name(),
        session.chunk_count().await,
        session.history().len()
    );
    if session.documents().is_empty() {
        println!("  No documents loaded. Use /add <path>.");
    }
    for doc in session.documents() {
        println!(
            "  - {} ({} chars, {} chunks)",
            doc.source_id, doc.char_count, doc.chunk_count
        );
    }
}

async fn ask(session: &mut Session, question: &str) -> Result<(), LibpalError> {
    let turn = session.ask(question).await?;
    print_turn(&turn);
    Ok(())
}

/// Answer a single question.
pub async fn run_single_question(session: &mut Session, question: &str) -> anyhow::Result<()> {
    if session.documents().is_empty() {
        eprintln!("No documents loaded. Pass files with --doc <path>.");
    }
    ask(session, question).await.map_err(|e| {
        tracing::error!(error = %e, "Question failed");
        anyhow::anyhow!(describe_error(&e))
    })
}

pub async fn run_interactive(mut session: Session) -> anyhow::Result<()> {
    println!("\x1b[1;32m  libpal\x1b[0m  ask questions about your documents");
    println!(
        "  Model: {} | Embeddings: {} | Documents: {}",
        session.model_name(),
        session.embedder_name(),
        session.documents().len()
    );
    println!("  Type /help for commands, /quit to exit\n");

    let stdin = io::stdin();
    loop {
        print!("\x1b[1;34m> \x1b[0m");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input).is_err() || input.is_empty() {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = slash::parse(input) {
            match command {
                SlashCommand::Quit => {
                    println!("Goodbye!");
                    break;
                }
                SlashCommand::Help => println!("{}", slash::help_text()),
                SlashCommand::Add(paths) if paths.is_empty() => {
                    println!("Usage: /add <path> [path...]");
                }
                SlashCommand::Add(paths) => {
                    let paths: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
                    add_documents(&mut session, &paths).await;
                }
                SlashCommand::Sources => print_sources(session.last_turn()),
                SlashCommand::Status => print_status(&session).await,
                SlashCommand::Clear => {
                    session.clear_history();
                    println!("Conversation cleared.");
                }
                SlashCommand::Reset => {
                    session.reset_knowledge_base().await;
                    println!("Knowledge base reset. All documents removed.");
                }
                SlashCommand::Unknown(name) => {
                    println!("Unknown command: {name}. Type /help for commands.");
                }
            }
            continue;
        }

        if let Err(e) = ask(&mut session, input).await {
            eprintln!("\x1b[31mError: {}\x1b[0m", describe_error(&e));
        }
    }

    Ok(())
}
