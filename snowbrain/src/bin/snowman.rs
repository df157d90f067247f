use std::io::Write;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};

use snowbrain::config::Config;
use snowbrain::llm::LlmProvider;
use snowbrain::snowman::{Conversation, SnowmanAgent};
use snowbrain::web::ContentClient;

const THINKING: &[&str] = &[
    "Thinking...",
    "Searching the web...",
    "Searching coast to coast... 🍁",
    "Checking Canadian sources... 🇨🇦",
    "Exploring local options... 🏠",
    "Mapping across provinces... 🗺️",
    "Brewing up ideas... ☕",
    "Skating through data... ⛸️",
];

#[derive(Parser)]
#[command(name = "snowman")]
#[command(version)]
#[command(about = "Chat with Snowman, a Canadian gift-shopping assistant")]
struct Args {}

fn thinking_message() -> &'static str {
    let seed = chrono::Utc::now().timestamp_subsec_nanos() as usize;
    THINKING[seed % THINKING.len()]
}

fn spinner() -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(thinking_message());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _args = Args::parse();

    dotenvy::dotenv().ok();
    snowbrain::init_tracing();

    let config = Config::from_env();
    let llm = LlmProvider::new(&config.llm)?;
    let content = if config.snowman.web_search {
        Some(ContentClient::new(&config.content)?)
    } else {
        None
    };
    let agent = SnowmanAgent::new(llm, content);
    let mut conversation = Conversation::new(config.snowman.history_runs);

    println!("⛄ Snowman is ready. Type 'exit' to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("💁 You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        let bar = spinner();
        let answer = conversation.ask(&agent, question).await;
        bar.finish_and_clear();

        match answer {
            Ok(answer) => println!("⛄ Snowman: {answer}\n"),
            Err(e) => {
                tracing::error!(error = %e, "Snowman could not answer");
                println!("⛄ Snowman: Sorry, I couldn't answer that one. Try again?\n");
            }
        }
    }

    Ok(())
}
