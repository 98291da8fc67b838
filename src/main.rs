use std::process::exit;
use std::sync::Arc;

use durachat::{parse_args, App, AppConfig, AppError, Command, USAGE};
use dura_chat::model_from_config;
use dura_persistence::{build_pool, PgChatStore, PgWorkflowStore, PoolProvider};
use log::{error, warn};
use serde::Serialize;

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| AppError::Invalid(format!("output: {e}")))?;
    println!("{text}");
    Ok(())
}

fn run(command: Command) -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let pool = build_pool(&config.database.url, config.database.min_connections, config.database.max_connections)?;
    let provider = PoolProvider::new(pool, config.database.retry());
    let workflows = Arc::new(PgWorkflowStore::new(provider.clone()));
    let chat = Arc::new(PgChatStore::new(provider));
    let model = model_from_config(config.model.clone())?;
    let app = App::new(workflows, chat, model, config.engine.clone())?;

    let result = execute(&app, command);
    if !app.shutdown() {
        warn!("some executions were still running at exit; they will resume on the next start");
    }
    result
}

fn execute(app: &App<PgWorkflowStore<PoolProvider>>, command: Command) -> Result<(), AppError> {
    if command == Command::Recover {
        let summary = app.recover_and_wait()?;
        println!("resumed={} succeeded={} failed={} interrupted={} owned_elsewhere={}",
                 summary.resumed, summary.succeeded, summary.failed, summary.interrupted, summary.owned_elsewhere);
        return Ok(());
    }
    // las ejecuciones retomadas siguen en segundo plano mientras corre el comando
    let report = app.recover()?;
    if !report.is_empty() {
        println!("recovering {} execution(s): {:?}", report.len(), report.ids());
    }
    match command {
        Command::Recover => Ok(()),
        Command::CreateConversation { key } => print_json(&app.create_conversation(key)?),
        Command::Send { conversation, content, key } => print_json(&app.send_message(conversation, &content, key)?),
        Command::Delete { conversation, key } => {
            let deleted = app.delete_conversation(conversation, key)?;
            println!("deleted={deleted}");
            Ok(())
        }
        Command::Conversations => print_json(&app.list_conversations()?),
        Command::Conversation { conversation } => print_json(&app.get_conversation(conversation)?),
        Command::Messages { conversation } => print_json(&app.list_messages(conversation)?),
        Command::Status { id } => print_json(&app.status(&id)?),
        Command::Pending => print_json(&app.pending()?),
        Command::Forget { id } => {
            app.forget(&id)?;
            println!("forgotten: {id}");
            Ok(())
        }
    }
}

fn main() {
    // Cargar .env si existe (DATABASE_URL, MODEL_*, DURA_*, RUST_LOG)
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            exit(e.exit_code());
        }
    };
    match run(command) {
        Ok(()) => exit(0),
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            exit(e.exit_code());
        }
    }
}
