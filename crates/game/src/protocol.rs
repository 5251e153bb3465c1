//! Protocol module - newline-delimited JSON commands
//!
//! Every frame is an envelope `{"cmd": <tag>, "data": <payload>}`. The tag
//! alone decides the payload schema. Tags are stable ordinals; new commands
//! must be appended.

use std::collections::BTreeMap;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use netris_core::MatrixSnapshot;

use crate::types::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandKind {
    Unknown = 0,
    Disconnect = 1,
    Ping = 2,
    Pong = 3,
    Nickname = 4,
    Message = 5,
    NewGame = 6,
    JoinGame = 7,
    QuitGame = 8,
    UpdateGame = 9,
    StartGame = 10,
    GameOver = 11,
    UpdateMatrix = 12,
    SendGarbage = 13,
    ReceiveGarbage = 14,
}

impl CommandKind {
    pub fn from_i64(value: i64) -> Option<Self> {
        Some(match value {
            0 => Self::Unknown,
            1 => Self::Disconnect,
            2 => Self::Ping,
            3 => Self::Pong,
            4 => Self::Nickname,
            5 => Self::Message,
            6 => Self::NewGame,
            7 => Self::JoinGame,
            8 => Self::QuitGame,
            9 => Self::UpdateGame,
            10 => Self::StartGame,
            11 => Self::GameOver,
            12 => Self::UpdateMatrix,
            13 => Self::SendGarbage,
            14 => Self::ReceiveGarbage,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Disconnect => "Disconnect",
            Self::Ping => "Ping",
            Self::Pong => "Pong",
            Self::Nickname => "Nickname",
            Self::Message => "Message",
            Self::NewGame => "NewGame",
            Self::JoinGame => "JoinGame",
            Self::QuitGame => "QuitGame",
            Self::UpdateGame => "UpdateGame",
            Self::StartGame => "StartGame",
            Self::GameOver => "GameOver",
            Self::UpdateMatrix => "UpdateMatrix",
            Self::SendGarbage => "Garbage-OUT",
            Self::ReceiveGarbage => "Garbage-IN",
        }
    }

    /// High-volume traffic, logged at trace level
    pub fn is_chatty(self) -> bool {
        matches!(self, Self::Ping | Self::Pong | Self::UpdateMatrix)
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============== Payloads ==============

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Ping {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Pong {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Nickname {
    pub player: PlayerId,
    pub nickname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ChatMessage {
    pub player: PlayerId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct JoinGame {
    pub name: String,
    #[serde(rename = "GameID")]
    pub game_id: i32,
    #[serde(rename = "PlayerID")]
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QuitGame {
    pub player: PlayerId,
}

/// Full roster: player id to nickname
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdateGame {
    pub players: BTreeMap<PlayerId, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StartGame {
    pub seed: i64,
    /// Set when the receiver joined a match already in progress
    pub started: bool,
}

/// A non-empty `winner` ends the match; otherwise `player` was knocked out.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GameOver {
    pub player: PlayerId,
    pub winner: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UpdateMatrix {
    pub matrixes: BTreeMap<PlayerId, MatrixSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SendGarbage {
    pub lines: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ReceiveGarbage {
    pub lines: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
struct Empty {}

/// One wire command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Disconnect,
    Ping(Ping),
    Pong(Pong),
    Nickname(Nickname),
    Message(ChatMessage),
    NewGame,
    JoinGame(JoinGame),
    QuitGame(QuitGame),
    UpdateGame(UpdateGame),
    StartGame(StartGame),
    GameOver(GameOver),
    UpdateMatrix(UpdateMatrix),
    SendGarbage(SendGarbage),
    ReceiveGarbage(ReceiveGarbage),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Disconnect => CommandKind::Disconnect,
            Command::Ping(_) => CommandKind::Ping,
            Command::Pong(_) => CommandKind::Pong,
            Command::Nickname(_) => CommandKind::Nickname,
            Command::Message(_) => CommandKind::Message,
            Command::NewGame => CommandKind::NewGame,
            Command::JoinGame(_) => CommandKind::JoinGame,
            Command::QuitGame(_) => CommandKind::QuitGame,
            Command::UpdateGame(_) => CommandKind::UpdateGame,
            Command::StartGame(_) => CommandKind::StartGame,
            Command::GameOver(_) => CommandKind::GameOver,
            Command::UpdateMatrix(_) => CommandKind::UpdateMatrix,
            Command::SendGarbage(_) => CommandKind::SendGarbage,
            Command::ReceiveGarbage(_) => CommandKind::ReceiveGarbage,
        }
    }
}

impl Serialize for Command {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut envelope = serializer.serialize_struct("Command", 2)?;
        envelope.serialize_field("cmd", &self.kind().as_u8())?;
        match self {
            Command::Disconnect | Command::NewGame => {
                envelope.serialize_field("data", &Empty {})?
            }
            Command::Ping(p) => envelope.serialize_field("data", p)?,
            Command::Pong(p) => envelope.serialize_field("data", p)?,
            Command::Nickname(p) => envelope.serialize_field("data", p)?,
            Command::Message(p) => envelope.serialize_field("data", p)?,
            Command::JoinGame(p) => envelope.serialize_field("data", p)?,
            Command::QuitGame(p) => envelope.serialize_field("data", p)?,
            Command::UpdateGame(p) => envelope.serialize_field("data", p)?,
            Command::StartGame(p) => envelope.serialize_field("data", p)?,
            Command::GameOver(p) => envelope.serialize_field("data", p)?,
            Command::UpdateMatrix(p) => envelope.serialize_field("data", p)?,
            Command::SendGarbage(p) => envelope.serialize_field("data", p)?,
            Command::ReceiveGarbage(p) => envelope.serialize_field("data", p)?,
        }
        envelope.end()
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not an envelope at all; the frame is dropped
    #[error("malformed frame: {0}")]
    Envelope(#[source] serde_json::Error),
    /// Known tag with a payload that does not match it; fatal to the connection
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: CommandKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Result of parsing one frame
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCommand {
    Command(Command),
    /// Tag outside the known set, or the reserved `Unknown` tag
    Unknown(i64),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    cmd: i64,
    #[serde(default, alias = "Data")]
    data: serde_json::Value,
}

fn payload<T>(kind: CommandKind, data: serde_json::Value) -> Result<T, ProtocolError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data).map_err(|source| ProtocolError::Payload { kind, source })
}

/// Parse a single line into a command.
pub fn parse_command(line: &str) -> Result<ParsedCommand, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(line).map_err(ProtocolError::Envelope)?;
    let Some(kind) = CommandKind::from_i64(envelope.cmd) else {
        return Ok(ParsedCommand::Unknown(envelope.cmd));
    };

    let data = envelope.data;
    let command = match kind {
        CommandKind::Unknown => return Ok(ParsedCommand::Unknown(envelope.cmd)),
        CommandKind::Disconnect => Command::Disconnect,
        CommandKind::NewGame => Command::NewGame,
        CommandKind::Ping => Command::Ping(payload(kind, data)?),
        CommandKind::Pong => Command::Pong(payload(kind, data)?),
        CommandKind::Nickname => Command::Nickname(payload(kind, data)?),
        CommandKind::Message => Command::Message(payload(kind, data)?),
        CommandKind::JoinGame => Command::JoinGame(payload(kind, data)?),
        CommandKind::QuitGame => Command::QuitGame(payload(kind, data)?),
        CommandKind::UpdateGame => Command::UpdateGame(payload(kind, data)?),
        CommandKind::StartGame => Command::StartGame(payload(kind, data)?),
        CommandKind::GameOver => Command::GameOver(payload(kind, data)?),
        CommandKind::UpdateMatrix => Command::UpdateMatrix(payload(kind, data)?),
        CommandKind::SendGarbage => Command::SendGarbage(payload(kind, data)?),
        CommandKind::ReceiveGarbage => Command::ReceiveGarbage(payload(kind, data)?),
    };
    Ok(ParsedCommand::Command(command))
}

/// Encode a command as one frame, without the trailing newline.
pub fn encode(command: &Command) -> Result<String, serde_json::Error> {
    serde_json::to_string(command)
}

pub fn create_message(player: PlayerId, message: impl Into<String>) -> Command {
    Command::Message(ChatMessage {
        player,
        message: message.into(),
    })
}

pub fn create_roster<'a>(players: impl IntoIterator<Item = (PlayerId, &'a str)>) -> Command {
    Command::UpdateGame(UpdateGame {
        players: players
            .into_iter()
            .map(|(id, name)| (id, name.to_string()))
            .collect(),
    })
}
