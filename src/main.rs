use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use confab::assistant::{AssistCommand, AssistEvent, MeetingAssistant};
use confab::audio_capture::{self, AudioCapture};
use confab::config::{is_supported_language, read_app_config, AppConfig};
use confab::conversation::{concise_answer_prompt, ChatHistory};
use confab::download;
use confab::ollama::OllamaClient;
use confab::pcm;
use confab::server::Server;
use confab::transcriber::{is_meaningful, Transcriber, MIN_TRANSCRIPT_CHARS};
use confab::ui;

#[derive(Parser)]
#[command(name = "confab")]
#[command(about = "Voice Q&A assistant backed by local speech and language models")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP question endpoint
    Serve {
        /// Bind address, overrides config
        #[arg(long)]
        host: Option<String>,
        /// Bind port, overrides config
        #[arg(long)]
        port: Option<u16>,
    },
    /// Record one spoken question and print the answer
    Ask,
    /// Continuous voice chat in the terminal
    Chat,
    /// Meeting assistant that listens continuously and helps on demand
    Assist {
        /// Run in the terminal instead of opening a window
        #[arg(long)]
        cli: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = read_app_config();

    match args.command {
        Command::Serve { host, port } => run_serve(config, host, port).await,
        Command::Ask => run_ask(config).await,
        Command::Chat => run_chat(config).await,
        Command::Assist { cli } => run_assist(config, cli).await,
    }
}

/// Resolve the model file and load it off the async runtime
async fn load_transcriber(config: &AppConfig) -> anyhow::Result<Transcriber> {
    let model_path = download::ensure_whisper_model(&config.whisper.model).await?;
    println!("Loading transcription model...");
    let whisper_config = config.whisper.clone();
    let transcriber =
        tokio::task::spawn_blocking(move || Transcriber::new(&model_path, &whisper_config))
            .await??;
    Ok(transcriber)
}

async fn run_serve(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let transcriber = Arc::new(load_transcriber(&config).await?);

    let ollama = OllamaClient::new(config.generation.clone());
    match ollama.check_connection().await {
        Ok(true) => println!(
            "Generation server ready (model '{}')",
            config.generation.model
        ),
        Ok(false) => eprintln!(
            "Generation server is up but model '{}' was not found. Run: ollama pull {}",
            config.generation.model, config.generation.model
        ),
        Err(e) => eprintln!("{}. /ask requests will fail until it is running.", e),
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    Server::new(config, transcriber, addr).start().await
}

/// Loop until the user picks a supported language
fn prompt_language(default: &str) -> anyhow::Result<String> {
    let stdin = std::io::stdin();
    loop {
        print!("Language (en/hi) [{}]: ", default);
        std::io::stdout().flush()?;

        let mut line = String::new();
        stdin.read_line(&mut line)?;
        let choice = line.trim().to_lowercase();

        if choice.is_empty() {
            return Ok(default.to_string());
        }
        if is_supported_language(&choice) {
            return Ok(choice);
        }
        println!("Please enter 'en' for English or 'hi' for Hindi");
    }
}

fn language_name(code: &str) -> &'static str {
    match code {
        "hi" => "Hindi",
        _ => "English",
    }
}

async fn run_ask(config: AppConfig) -> anyhow::Result<()> {
    let language = prompt_language(&config.general.language)?;
    let lang_name = language_name(&language);

    let secs = config.assist.question_secs;
    println!(
        "Speak your question in {} now! Recording for {:.0} seconds...",
        lang_name, secs
    );
    let clip = tokio::task::spawn_blocking(move || audio_capture::record_clip(secs)).await??;
    println!("Recording complete.");

    let clip = pcm::to_rate(clip, config.general.sample_rate as u32)?;

    let transcriber = load_transcriber(&config).await?;
    println!("Transcribing as {}...", lang_name);
    let samples = clip.samples;
    let lang = language.clone();
    let question =
        tokio::task::spawn_blocking(move || transcriber.transcribe(&samples, &lang)).await??;

    println!("You asked: '{}'", question);

    if question.chars().count() < MIN_TRANSCRIPT_CHARS {
        println!("Question too short or unclear.");
        return Ok(());
    }

    let ollama = OllamaClient::new(config.generation.clone());
    println!("Waiting for {}...", config.generation.model);

    match ollama.generate(&concise_answer_prompt(&question)).await {
        Ok(answer) => {
            let answer = if answer.is_empty() {
                "No response received".to_string()
            } else {
                answer
            };
            let rule = "=".repeat(50);
            println!("\n{}", rule);
            println!("ANSWER:");
            println!("{}", rule);
            println!("{}", answer);
            println!("{}", rule);
        }
        Err(e) => eprintln!("{}", e),
    }

    Ok(())
}

async fn run_chat(config: AppConfig) -> anyhow::Result<()> {
    let transcriber = Arc::new(load_transcriber(&config).await?);
    let ollama = OllamaClient::new(config.generation.clone());

    if let Err(e) = ollama.check_connection().await {
        eprintln!("{}. Answers will fail until it is running.", e);
    }

    let running = Arc::new(AtomicBool::new(true));
    let recording = Arc::new(AtomicBool::new(true));

    let running_clone = running.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        println!("\nConversation stopped.");
        running_clone.store(false, Ordering::Relaxed);
    });

    let (tx, mut rx) = mpsc::channel::<Vec<f32>>(400);
    let mut capture = AudioCapture::new();
    let capture_rate = capture.start(tx, running.clone(), recording)?;

    println!("Speak naturally... (Ctrl+C to stop)");

    let mut history = ChatHistory::new();
    let chunk_samples = (config.assist.chunk_secs * capture_rate as f32) as usize;
    let mut buffer: Vec<f32> = Vec::with_capacity(chunk_samples * 2);
    let language = config.general.language.clone();
    let model_rate = config.general.sample_rate as u32;

    while running.load(Ordering::Relaxed) {
        match tokio::time::timeout(std::time::Duration::from_millis(100), rx.recv()).await {
            Ok(Some(block)) => buffer.extend_from_slice(&block),
            Ok(None) => break,
            Err(_) => continue,
        }

        if buffer.len() < chunk_samples {
            continue;
        }

        let chunk = std::mem::take(&mut buffer);
        let samples = pcm::resample(&chunk, capture_rate, model_rate)?;

        let transcriber = transcriber.clone();
        let lang = language.clone();
        let question =
            tokio::task::spawn_blocking(move || transcriber.transcribe(&samples, &lang)).await?;

        let question = match question {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Transcription error: {}", e);
                continue;
            }
        };

        if !is_meaningful(&question) {
            continue;
        }

        println!("\nQ: {}", question);
        history.push_user(question);

        print!("A: ");
        std::io::stdout().flush()?;
        let result = ollama
            .generate_stream(&history.prompt(), |token| {
                print!("{}", token);
                let _ = std::io::stdout().flush();
            })
            .await;
        println!();

        match result {
            Ok(answer) => history.push_assistant(answer),
            Err(e) => eprintln!("{}", e),
        }
    }

    capture.join();
    Ok(())
}

async fn run_assist(config: AppConfig, cli: bool) -> anyhow::Result<()> {
    println!("Starting meeting assistant");
    let model_path = download::ensure_whisper_model(&config.whisper.model).await?;

    let (mut assistant, event_rx) = MeetingAssistant::new(config, model_path);
    assistant.start()?;

    let running = assistant.running();
    let command_tx = assistant.command_sender();

    if cli {
        run_assist_cli(running.clone(), command_tx, event_rx).await;
    } else {
        // The window blocks the main thread; pipeline tasks continue on the
        // runtime's worker threads
        ui::run(running.clone(), command_tx, event_rx);
    }

    assistant.shutdown().await;
    Ok(())
}

async fn run_assist_cli(
    running: Arc<AtomicBool>,
    command_tx: mpsc::UnboundedSender<AssistCommand>,
    mut event_rx: mpsc::UnboundedReceiver<AssistEvent>,
) {
    println!("Commands: h = help, c = clear, t = mic test, g = language, p = pause, q = quit");

    let running_for_stdin = running.clone();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        while running_for_stdin.load(Ordering::Relaxed) {
            line.clear();
            if stdin.read_line(&mut line).is_err() {
                break;
            }
            let command = match line.trim() {
                "h" | "help" => Some(AssistCommand::RequestHelp),
                "c" | "clear" => Some(AssistCommand::Clear),
                "t" | "test" => Some(AssistCommand::MicTest),
                "g" | "lang" => Some(AssistCommand::ToggleLanguage),
                "p" | "pause" => Some(AssistCommand::ToggleListening),
                "q" | "quit" => {
                    running_for_stdin.store(false, Ordering::Relaxed);
                    break;
                }
                "" => None,
                other => {
                    println!("Unknown command: {}", other);
                    None
                }
            };
            if let Some(command) = command {
                if command_tx.send(command).is_err() {
                    break;
                }
            }
        }
    });

    let running_for_signal = running.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        println!("\nShutting down...");
        running_for_signal.store(false, Ordering::Relaxed);
    });

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) => print_assist_event(event),
                    None => break,
                }
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
            }
        }
    }
}

fn print_assist_event(event: AssistEvent) {
    match event {
        AssistEvent::Utterance(utterance) => println!("{}", utterance.display_line()),
        AssistEvent::Status(status) => println!("[status] {}", status),
        AssistEvent::Answer(answer) => {
            let rule = "-".repeat(50);
            println!("{}", rule);
            println!("Assistant: {}", answer);
            println!("{}", rule);
        }
        AssistEvent::Speaking(_) => {}
        AssistEvent::Cleared => println!("(conversation cleared)"),
    }
}
