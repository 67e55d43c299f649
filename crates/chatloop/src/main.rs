//! A terminal chat client that streams replies from a turn-execution
//! service and surfaces suggested follow-up questions.

#[macro_use]
extern crate tracing;

use std::env;
use std::io::Write as _;
use std::time::Duration;

use chatloop::SessionBuilder;
use chatloop::core::{Role, Transcript, TranscriptItem};
use chatloop::tools::{ReadFileTool, ShellTool};
use chatloop_http::{HttpConfigBuilder, HttpTransport};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

// The prompt that makes the model embed the follow-up payload the
// extractor looks for.
const DEVELOPER_PROMPT: &str = r#"
After you have answered the user's question, you should give the array of follow-up questions as if you are the user asking them.
This should be a JSON array of strings, on a new line, prefixed with "Follow-up questions: ".
For example:
Follow-up questions: ["What are the main components of an engine?", "Which types of engines are there?"]

Make sure the JSON is valid.
"#;

enum TurnEvent {
    Idle,
    Snapshot(Transcript),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Ok(endpoint) = env::var("CHATLOOP_ENDPOINT") else {
        eprintln!("CHATLOOP_ENDPOINT environment variable is not set");
        return;
    };
    let mut config = HttpConfigBuilder::with_endpoint(endpoint);
    if let Ok(token) = env::var("CHATLOOP_TOKEN") {
        config = config.with_token(token);
    }
    let transport = HttpTransport::new(config.build());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let session = SessionBuilder::with_transport(transport)
        .with_developer_prompt(DEVELOPER_PROMPT)
        .with_tool(ShellTool::new())
        .with_tool(ReadFileTool::new())
        .on_idle(move || {
            event_tx.send(()).ok();
        })
        .build();
    let waiting = session.waiting();
    let mut transcript_rx = session.transcript();

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    let mut renderer = Renderer::default();

    'outer: loop {
        print!("> ");
        std::io::stdout().flush().unwrap();

        let Some(line) = read_line().await else {
            break;
        };
        session.send_message(line.trim());

        let mut progress_bar: Option<ProgressBar> = None;

        loop {
            if *waiting.borrow() {
                progress_bar
                    .get_or_insert_with(|| {
                        let progress_bar = ProgressBar::new_spinner();
                        progress_bar.set_style(progress_style.clone());
                        progress_bar.set_message("🤔 Thinking...");
                        progress_bar
                    })
                    .inc(1);
            }

            let tick = sleep(Duration::from_millis(100));
            let event = select! {
                event = event_rx.recv() => {
                    let Some(()) = event else {
                        break 'outer;
                    };
                    TurnEvent::Idle
                }
                changed = transcript_rx.changed() => {
                    if changed.is_err() {
                        break 'outer;
                    }
                    TurnEvent::Snapshot(
                        transcript_rx.borrow_and_update().clone(),
                    )
                }
                _ = tick => {
                    continue;
                }
            };

            // Finish the progress bar before printing anything else.
            if let Some(progress_bar) = progress_bar.take() {
                progress_bar.finish_and_clear();
            }

            match event {
                TurnEvent::Snapshot(snapshot) => {
                    renderer.render(&snapshot);
                }
                TurnEvent::Idle => {
                    renderer.finish_reply();
                    break;
                }
            }
        }
    }
}

/// Streams transcript snapshots to the terminal, printing only what has
/// not been printed yet.
#[derive(Default)]
struct Renderer {
    seen_items: usize,
    current_item: Option<usize>,
    printed: usize,
    last_snapshot: Transcript,
}

impl Renderer {
    fn render(&mut self, snapshot: &Transcript) {
        // Announce tool calls as they appear.
        for item in &snapshot.items()[self.seen_items.min(snapshot.len())..] {
            if let TranscriptItem::ToolCall(call) = item {
                let name = call.name.as_deref().unwrap_or("search");
                println!(
                    "{}🛠️  {}",
                    BAR_CHAR.bright_yellow(),
                    name.dimmed()
                );
            }
        }
        self.seen_items = self.seen_items.max(snapshot.len());

        // Stream the newest assistant text.
        let Some((index, message)) = snapshot
            .items()
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, item)| match item {
                TranscriptItem::Message(message)
                    if message.role == Role::Assistant =>
                {
                    Some((index, message))
                }
                _ => None,
            })
        else {
            self.last_snapshot = snapshot.clone();
            return;
        };
        let Some(part) = message.content.first() else {
            self.last_snapshot = snapshot.clone();
            return;
        };

        if self.current_item != Some(index) {
            if self.current_item.is_some() {
                println!();
            }
            print!("{}🤖 ", BAR_CHAR.bright_cyan());
            self.current_item = Some(index);
            self.printed = 0;
        }

        // Display text can shrink when the follow-up marker arrives, and
        // finalization may rewrite it outright; never slice past the end
        // or into the middle of a character.
        let text = &part.text;
        if self.printed > text.len() {
            self.printed = text.len();
        }
        let delta = text.get(self.printed..).unwrap_or_default();
        print!("{}", delta.bright_white());
        std::io::stdout().flush().unwrap();
        self.printed = text.len();

        self.last_snapshot = snapshot.clone();
    }

    fn finish_reply(&mut self) {
        if self.current_item.is_some() {
            println!();
        }

        // Offer the extracted follow-up questions, if any.
        let questions = self
            .last_snapshot
            .items()
            .iter()
            .rev()
            .find_map(|item| match item {
                TranscriptItem::Message(message)
                    if message.role == Role::Assistant =>
                {
                    message
                        .content
                        .first()
                        .map(|part| part.follow_up_questions.clone())
                }
                _ => None,
            })
            .unwrap_or_default();
        if !questions.is_empty() {
            println!("{}💡 You could ask:", BAR_CHAR.bright_magenta());
            for question in questions {
                println!("{}   - {}", BAR_CHAR.bright_magenta(), question);
            }
        }

        self.current_item = None;
        self.printed = 0;
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
