use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use futures::StreamExt;
use tracing::info;

use crate::config::AppConfig;
use crate::llm::images::{ImageRequest, generate_to_file};
use crate::llm::{ChatMessage, Conversation, Dispatcher, OpenAIClient, SamplingOptions};
use crate::rag::{self, VectorStore};
use crate::tools::{Toolset, build_registry};

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Ask a single question about a historical character (or any prompt).
    Ask(AskArgs),
    /// Run the tool dispatch loop on a query.
    Call(CallArgs),
    /// Print the advertised tool schemas as JSON.
    Tools {
        #[arg(long, value_enum, default_value_t = Toolset::Catalog)]
        toolset: Toolset,
    },
    /// Generate an image and save it locally.
    Image(ImageArgs),
    /// Retrieval-augmented answering over a local vector store.
    #[command(subcommand)]
    Rag(RagCommand),
}

#[derive(Args, Debug, Clone)]
pub struct AskArgs {
    /// Free-form prompt; overrides --character/--question
    pub prompt: Option<String>,
    #[arg(long)]
    pub character: Option<String>,
    #[arg(long)]
    pub question: Option<String>,
    /// Print tokens as they arrive
    #[arg(long)]
    pub stream: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CallArgs {
    pub query: Option<String>,
    #[arg(long, value_enum, default_value_t = Toolset::Catalog)]
    pub toolset: Toolset,
    /// Upper bound on tool executions for this interaction
    #[arg(long)]
    pub max_tool_rounds: Option<usize>,
    /// Dump the final conversation as JSON to stderr
    #[arg(long)]
    pub show_messages: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ImageArgs {
    #[arg(long)]
    pub prompt: Option<String>,
    #[arg(long, default_value = "1024x1024")]
    pub size: String,
    #[arg(long, default_value = "images/generated-image.png")]
    pub out: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RagCommand {
    /// Embed a JSON array or JSON-lines file of {id?, text, metadata?} records.
    Ingest { file: PathBuf },
    /// Answer a question from the best-matching stored document.
    Ask {
        query: String,
        /// Number of matches to list on stderr; the answer uses the best one
        #[arg(long, default_value_t = 1)]
        top_k: usize,
    },
}

pub const DEFAULT_IMAGE_PROMPT: &str = "Bunny on horse, holding a lollipop, on a foggy meadow where it grows daffodils. It says \"hello\"";

pub async fn run(command: Command, cfg: &AppConfig) -> Result<()> {
    match command {
        Command::Ask(args) => run_ask(args, cfg).await,
        Command::Call(args) => run_call(args, cfg).await,
        Command::Tools { toolset } => run_tools(toolset, cfg),
        Command::Image(args) => run_image(args, cfg).await,
        Command::Rag(cmd) => run_rag(cmd, cfg).await,
    }
}

/// Print `label` and read one trimmed line from stdin.
fn prompt_line(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read from stdin")?;
    Ok(line.trim().to_string())
}

pub fn character_prompt(character: &str, question: &str) -> String {
    format!(
        "Get more info about this historical character {character} specifically this information: {question}."
    )
}

async fn run_ask(args: AskArgs, cfg: &AppConfig) -> Result<()> {
    let prompt = match args.prompt {
        Some(p) => p,
        None => {
            let character = match args.character {
                Some(c) => c,
                None => prompt_line(
                    "Enter the historical character you want to learn more about: ",
                )?,
            };
            let question = match args.question {
                Some(q) => q,
                None => prompt_line(&format!("What do you like to know about {character} ? "))?,
            };
            character_prompt(&character, &question)
        }
    };

    let client = OpenAIClient::from_config(cfg)?;
    let opts = SamplingOptions {
        temperature: Some(0.1),
        max_tokens: Some(600),
        top_p: None,
    };
    let messages = vec![ChatMessage::user(prompt.clone())];

    println!("Query");
    println!("{prompt}");
    println!("Answer");
    if args.stream {
        let mut stream = client.chat_stream(messages, opts).await?;
        let mut stdout = io::stdout();
        while let Some(chunk) = stream.next().await {
            write!(stdout, "{}", chunk?)?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
    } else {
        let answer = client.chat_once_with(messages, opts).await?;
        println!("{answer}");
    }
    Ok(())
}

async fn run_call(args: CallArgs, cfg: &AppConfig) -> Result<()> {
    let query = match args.query {
        Some(q) => q,
        None => prompt_line("What do you like to find?\n")?,
    };
    if query.is_empty() {
        bail!("empty query");
    }

    let registry = build_registry(cfg, args.toolset)?;
    let client = OpenAIClient::from_config(cfg)?;
    let max_rounds = args.max_tool_rounds.unwrap_or(cfg.llm.max_tool_rounds);
    info!(toolset = ?args.toolset, max_rounds, "starting interaction");

    let mut conversation = Conversation::new();
    conversation.push_user(query)?;
    let outcome = Dispatcher::new(&client, &registry, max_rounds)
        .run(&mut conversation)
        .await;

    if args.show_messages {
        let dump = serde_json::to_string_pretty(conversation.messages())?;
        eprintln!("{dump}");
    }
    let answer = outcome?;
    println!("{answer}");
    Ok(())
}

fn run_tools(toolset: Toolset, cfg: &AppConfig) -> Result<()> {
    let registry = build_registry(cfg, toolset)?;
    let defs = registry.tool_defs();
    println!("{}", serde_json::to_string_pretty(&defs)?);
    Ok(())
}

async fn run_image(args: ImageArgs, cfg: &AppConfig) -> Result<()> {
    let client = OpenAIClient::from_config(cfg)?;
    let req = ImageRequest {
        model: cfg.image_model.clone(),
        prompt: args
            .prompt
            .unwrap_or_else(|| DEFAULT_IMAGE_PROMPT.to_string()),
        size: args.size,
        n: 1,
    };
    let image = generate_to_file(&client, &req, &args.out).await?;
    if let Some(revised) = image.revised_prompt {
        println!("revised prompt: {revised}");
    }
    println!("saved {}", args.out.display());
    println!("completed!");
    Ok(())
}

async fn run_rag(cmd: RagCommand, cfg: &AppConfig) -> Result<()> {
    let client = OpenAIClient::from_config(cfg)?;
    match cmd {
        RagCommand::Ingest { file } => {
            let n = rag::ingest(&client, &cfg.embedding_model, &cfg.rag_store, &file).await?;
            println!("ingested {n} document(s) into {}", cfg.rag_store.display());
        }
        RagCommand::Ask { query, top_k } => {
            let store = VectorStore::load(&cfg.rag_store)?;
            let result =
                rag::answer(&client, &cfg.embedding_model, &store, &query, top_k).await?;
            println!("{}", result.answer);
            if top_k > 1 {
                for (id, score) in &result.matches {
                    eprintln!("{score:.4}  {id}");
                }
            }
            info!(source = %result.source_id, score = result.score, "rag answer");
        }
    }
    Ok(())
}
