//! Parseo de argumentos del binario (`durachat <comando> [--flag valor]...`).

use thiserror::Error;
use uuid::Uuid;

pub const USAGE: &str = "Uso: durachat <comando>
  recover
  create-conversation [--key <ID>]
  send --conversation <UUID> --content <TXT> [--key <ID>]
  delete --conversation <UUID> [--key <ID>]
  conversations
  conversation --conversation <UUID>
  messages --conversation <UUID>
  status --id <ID>
  pending
  forget --id <ID>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Recover,
    CreateConversation { key: Option<String> },
    Send { conversation: Uuid, content: String, key: Option<String> },
    Delete { conversation: Uuid, key: Option<String> },
    Conversations,
    Conversation { conversation: Uuid },
    Messages { conversation: Uuid },
    Status { id: String },
    Pending,
    Forget { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CliError {
    /// Comando o flag obligatorio ausente (salida 2).
    #[error("{0}")]
    Usage(String),
    /// Valor con formato incorrecto (salida 3).
    #[error("{0}")]
    Invalid(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Invalid(_) => 3,
        }
    }
}

#[derive(Default)]
struct Flags {
    conversation: Option<String>,
    content: Option<String>,
    key: Option<String>,
    id: Option<String>,
}

fn flags(rest: &[String]) -> Result<Flags, CliError> {
    let mut out = Flags::default();
    let mut i = 0;
    while i < rest.len() {
        let slot = match rest[i].as_str() {
            "--conversation" => &mut out.conversation,
            "--content" => &mut out.content,
            "--key" => &mut out.key,
            "--id" => &mut out.id,
            other => return Err(CliError::Usage(format!("flag desconocido: {other}"))),
        };
        i += 1;
        match rest.get(i) {
            Some(v) => *slot = Some(v.clone()),
            None => return Err(CliError::Usage(format!("falta valor para {}", rest[i - 1]))),
        }
        i += 1;
    }
    Ok(out)
}

fn required(value: Option<String>, flag: &str) -> Result<String, CliError> {
    value.ok_or_else(|| CliError::Usage(format!("falta {flag}")))
}

fn conversation(value: Option<String>) -> Result<Uuid, CliError> {
    let raw = required(value, "--conversation")?;
    Uuid::parse_str(&raw).map_err(|_| CliError::Invalid(format!("uuid inválido: {raw}")))
}

/// `args` sin el nombre del programa.
pub fn parse_args(args: &[String]) -> Result<Command, CliError> {
    let Some((command, rest)) = args.split_first() else {
        return Err(CliError::Usage("falta el comando".into()));
    };
    let f = flags(rest)?;
    let cmd = match command.as_str() {
        "recover" => Command::Recover,
        "create-conversation" => Command::CreateConversation { key: f.key },
        "send" => Command::Send { conversation: conversation(f.conversation)?,
                                  content: required(f.content, "--content")?,
                                  key: f.key },
        "delete" => Command::Delete { conversation: conversation(f.conversation)?, key: f.key },
        "conversations" => Command::Conversations,
        "conversation" => Command::Conversation { conversation: conversation(f.conversation)? },
        "messages" => Command::Messages { conversation: conversation(f.conversation)? },
        "status" => Command::Status { id: required(f.id, "--id")? },
        "pending" => Command::Pending,
        "forget" => Command::Forget { id: required(f.id, "--id")? },
        other => return Err(CliError::Usage(format!("comando desconocido: {other}"))),
    };
    Ok(cmd)
}
