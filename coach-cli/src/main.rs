mod client;
mod config;
mod document;
mod prompt;
mod store;

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use client::CoachClient;
use coach_shared::ChatMessage;
use config::{ClientConfig, Endpoint};
use document::{CvAttachment, PlainTextExtractor, load_cv};
use prompt::{UserProfile, build_conversation, build_system_prompt};
use store::TranscriptStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};

const HELP: &str = "\
Commands:
  /profile <name> | <role> | <goal> | <experience>   tell the coach about yourself
  /cv <path>                                          attach a text CV
  /history                                            print the transcript
  /reset                                              wipe the transcript and profile
  /quit                                               exit
Anything else is sent to the coach.";

struct App {
    client: CoachClient,
    store: TranscriptStore,
    cv: Option<CvAttachment>,
    stream: bool,
}

impl App {
    fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            client: CoachClient::new(config),
            store: TranscriptStore::open(&config.data_dir)?,
            cv: None,
            stream: config.stream,
        })
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        let system_prompt = build_system_prompt(
            self.store.profile(),
            self.cv.as_ref().map(|cv| cv.text.as_str()),
        );
        self.store.push(ChatMessage::user(text))?;
        let messages = build_conversation(system_prompt, self.store.messages(), text);
        self.store.push(ChatMessage::assistant(""))?;

        println!();
        let result = if self.stream {
            let mut stdout = std::io::stdout();
            self.client
                .stream_chat(messages, |delta| write_delta(&mut stdout, delta))
                .await
        } else {
            let reply = self.client.chat(messages).await;
            if let Ok(text) = &reply {
                print!("{text}");
            }
            reply
        };
        println!("\n");

        match result {
            Ok(reply) => self.store.replace_last_assistant(reply),
            Err(e) => {
                error!(error = format!("{e:#}"), "chat request failed");
                let notice = format!(
                    "❌ **Connection Error**\n\nI couldn't connect with the coach. The server might be busy. \
                     Please try again in a few seconds.\n\nDetail: {e}"
                );
                println!("{notice}\n");
                self.store.replace_last_assistant(notice)
            }
        }
    }

    async fn attach_cv(&mut self, path: &str) -> Result<()> {
        let cv = load_cv(Path::new(path), &PlainTextExtractor).await?;
        let notice = format!("📎 New CV attached and analyzed: {}", cv.file_name);
        info!(file = %cv.file_name, chars = cv.text.len(), "cv attached");
        self.store.push(ChatMessage::system(notice.clone()))?;
        self.cv = Some(cv);
        println!("{notice}\n");
        Ok(())
    }

    fn print_history(&self) {
        for message in self.store.messages() {
            println!("[{:?}] {}\n", message.role, message.content);
        }
    }

    /// Returns `false` when the user asked to quit.
    async fn handle_line(&mut self, line: &str) -> Result<bool> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(true);
        }

        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "/quit" | "/exit" => return Ok(false),
            "/help" => println!("{HELP}\n"),
            "/history" => self.print_history(),
            "/reset" => {
                self.store.reset()?;
                self.cv = None;
                println!("{}\n", store::GREETING);
            }
            "/profile" => match UserProfile::parse(rest) {
                Some(profile) => {
                    self.store.set_profile(profile)?;
                    if let Some(last) = self.store.messages().last() {
                        println!("{}\n", last.content);
                    }
                }
                None => println!("Usage: /profile <name> | <role> | <goal> | <experience>\n"),
            },
            "/cv" if !rest.trim().is_empty() => {
                if let Err(e) = self.attach_cv(rest.trim()).await {
                    println!("Could not read CV: {e:#}\n");
                }
            }
            "/cv" => println!("Usage: /cv <path>\n"),
            _ => self.send(line).await?,
        }
        Ok(true)
    }
}

/// Writes one streamed fragment and flushes it so it shows up at once.
fn write_delta(out: &mut impl Write, delta: &str) {
    if let Err(e) = out.write_all(delta.as_bytes()).and_then(|()| out.flush()) {
        debug!(error = %e, "could not write streamed text to the terminal");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = ClientConfig::from_env()?;

    // Log to a file so tracing output does not interleave with the chat.
    if let Ok(file) = std::fs::File::create(&config.log_file) {
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .init();
    }

    match &config.endpoint {
        Endpoint::Proxy { url } => info!(%url, "using proxy endpoint"),
        Endpoint::Direct { url, .. } => info!(%url, "calling model API directly"),
    }

    let mut app = App::new(&config)?;
    info!(data_dir = %app.store.location().display(), "transcript loaded");

    if let Some(last) = app.store.messages().last() {
        println!("{}\n", last.content);
    }
    println!("{HELP}\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if !app.handle_line(&line).await? {
            break;
        }
    }

    Ok(())
}
