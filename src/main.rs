use std::io::Write;
use std::time::Instant;

use sparrow_cli::config::{load_or_init_config, log_dir, resolve_home, ModelConfig, ProjectConfig};
use sparrow_cli::error::{ClientError, ErrorCategory};
use sparrow_cli::observability::{init_tracing, log_request_complete};
use sparrow_cli::session::Conversation;
use sparrow_cli::stream::{DecodeOutcome, StreamEvent};
use sparrow_cli::transport::ChatClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const QUIT_COMMAND: &str = "!quit";
const PROMPT: &str = "> ";

fn main() {
    let home = resolve_home().unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(1);
    });
    let config = load_or_init_config(&home).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        std::process::exit(1);
    });

    let _log_guard = init_tracing(&config.logger, &log_dir(&home)).unwrap_or_else(|e| {
        eprintln!("Failed to initialize logging: {e}");
        None
    });

    let requested_model = std::env::args().nth(1);
    let model = match config.select_model(requested_model.as_deref()) {
        Ok(model) => model.clone(),
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Config file: {}", sparrow_cli::config::config_path(&home).display());
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    runtime.block_on(run(config, model));
}

async fn run(config: ProjectConfig, model: ModelConfig) {
    let client = ChatClient::new(&config.request).unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(1);
    });
    let temperature = config.request.temperature;
    let mut conversation = Conversation::new(&config.request.system_prompt);
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    tracing::info!(model = %model.model, "session started");
    println!("sparrow: chatting with {} (type {QUIT_COMMAND} to exit)", model.model);

    loop {
        print!("{PROMPT}");
        let _ = std::io::stdout().flush();

        let line = match input.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                tracing::error!("failed to read stdin: {err}");
                break;
            }
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == QUIT_COMMAND {
            break;
        }

        conversation.push_user(question);
        match ask(&client, &model, &conversation, temperature).await {
            Ok(outcome) => {
                report(&outcome);
                conversation.push_assistant(outcome.result.content());
            }
            Err(err) => {
                tracing::error!(model = %model.model, "completion failed: {err}");
                eprintln!("\n{}: {err}", describe(&err));
                conversation.rollback_last_user();
            }
        }
    }

    tracing::info!(turns = conversation.len(), "session ended");
}

/// Stream one answer to stdout as it arrives.
async fn ask(
    client: &ChatClient,
    model: &ModelConfig,
    conversation: &Conversation,
    temperature: f64,
) -> Result<DecodeOutcome, ClientError> {
    let start = Instant::now();
    let decoder = client
        .open_stream(model, conversation.messages().to_vec(), temperature)
        .await?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let decode = tokio::spawn(decoder.forward(events_tx));

    let mut stdout = std::io::stdout();
    while let Some(event) = events_rx.recv().await {
        match event {
            StreamEvent::Fragment(text) => {
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            StreamEvent::Done => {
                let _ = writeln!(stdout);
            }
        }
    }

    let outcome = decode
        .await
        .map_err(|err| ClientError::Transport(format!("decode task failed: {err}")))??;
    log_request_complete(&outcome.result.model, &outcome.result.usage, start);
    Ok(outcome)
}

fn report(outcome: &DecodeOutcome) {
    if !outcome.terminated {
        println!("\n[connection closed before the answer was complete]");
    }
    let usage = &outcome.result.usage;
    println!("model: {}", outcome.result.model);
    println!(
        "tokens: prompt={}, completion={}, total={}",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    );
}

fn describe(err: &ClientError) -> &'static str {
    match err.category() {
        ErrorCategory::Authentication | ErrorCategory::Permission => "Check the api_key",
        ErrorCategory::RateLimit => "Rate limited",
        ErrorCategory::InvalidRequest => "Request rejected",
        ErrorCategory::ServerError => "Service error",
        ErrorCategory::Connection => "Connection error",
        ErrorCategory::Unknown => "Request failed",
    }
}
