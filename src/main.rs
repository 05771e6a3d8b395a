mod broadcast;
mod chat;
mod commands;
mod config;
mod handlers;
mod models;
mod render;
mod show;
mod tasks;
mod voting;

use broadcast::{BroadcastController, SceneBoard};
use chat::ChannelChat;
use commands::HELP;
use config::ShowConfig;
use handlers::Flow;
use log::{error, info};
use render::{ChartFile, ConsoleChart, MultiSink, RenderSink};
use show::ShowStateMachine;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    // Missing or broken settings are fatal before anything starts
    let config = match ShowConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load show config: {}", e);
            return;
        }
    };
    info!(
        "Loaded {} case(s), tally every {:?}, chart at {}",
        config.cases.len(),
        config.tick_interval,
        config.chart_path.display()
    );

    // Dry-run switcher laid out from the config
    let board = Arc::new(SceneBoard::from_config(&config));
    let (chat_tx, chat) = ChannelChat::new(config.chat_poll_interval);
    let sinks: Vec<Box<dyn RenderSink>> = vec![
        Box::new(ConsoleChart::new()),
        Box::new(ChartFile::new(config.chart_path.clone())),
    ];
    let sink = Arc::new(MultiSink::new(sinks));

    let mut machine = ShowStateMachine::new(config, BroadcastController::new(board.clone()), Arc::new(chat), sink);

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match handlers::handle_line(&mut machine, &chat_tx, &line).await {
                Flow::Continue(Some(reply)) => println!("{}", reply),
                Flow::Continue(None) => {}
                Flow::Quit => break,
            },
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read console input: {}", e);
                break;
            }
        }
    }

    machine.shutdown().await;
    info!("Show controller stopped after {} scene command(s).", board.commands().len());
}
