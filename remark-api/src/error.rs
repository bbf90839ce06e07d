use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;

use crate::{CommentId, Target, TargetType};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Comment not found {0:?}")]
    CommentNotFound(CommentId),

    #[error("Target not found {0}")]
    TargetNotFound(Target),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid content: {0}")]
    InvalidContent(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Identifiers must be positive, got {0}")]
    InvalidId(i64),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::Unauthorized => StatusCode::FORBIDDEN,
            Error::CommentNotFound(_) => StatusCode::NOT_FOUND,
            Error::TargetNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::InvalidContent(_) => StatusCode::BAD_REQUEST,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::InvalidId(_) => StatusCode::BAD_REQUEST,
            Error::InvalidTarget(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::Unauthenticated => json!({
                "message": "unauthenticated",
                "type": "unauthenticated",
            }),
            Error::Unauthorized => json!({
                "message": "you are not the owner of this comment",
                "type": "unauthorized",
            }),
            Error::CommentNotFound(c) => json!({
                "message": "comment not found",
                "type": "comment-not-found",
                "comment": c,
            }),
            Error::TargetNotFound(t) => json!({
                "message": "target not found",
                "type": "target-not-found",
                "target-type": t.kind.as_str(),
                "target-id": t.id,
            }),
            Error::InvalidState(msg) => json!({
                "message": msg,
                "type": "invalid-state",
            }),
            Error::InvalidContent(msg) => json!({
                "message": msg,
                "type": "invalid-content",
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::InvalidId(id) => json!({
                "message": "identifiers must be positive",
                "type": "invalid-id",
                "id": id,
            }),
            Error::InvalidTarget(msg) => json!({
                "message": msg,
                "type": "invalid-target",
            }),
        })
        .expect("serializing error")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let message = || {
            data.get("message")
                .and_then(|msg| msg.as_str())
                .map(String::from)
                .ok_or_else(|| anyhow!("error has no message"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(message().unwrap_or_default()),
                "unauthenticated" => Error::Unauthenticated,
                "unauthorized" => Error::Unauthorized,
                "comment-not-found" => Error::CommentNotFound(CommentId(
                    data.get("comment")
                        .and_then(|c| c.as_i64())
                        .ok_or_else(|| anyhow!("comment-not-found error without a comment id"))?,
                )),
                "target-not-found" => Error::TargetNotFound(Target::new(
                    TargetType::from_str(
                        data.get("target-type")
                            .and_then(|t| t.as_str())
                            .ok_or_else(|| anyhow!("target-not-found error without a type"))?,
                    )?,
                    data.get("target-id")
                        .and_then(|t| t.as_i64())
                        .ok_or_else(|| anyhow!("target-not-found error without an id"))?,
                )),
                "invalid-state" => Error::InvalidState(message()?),
                "invalid-content" => Error::InvalidContent(message()?),
                "null-byte" => Error::NullByteInString(String::from(
                    data.get("string").and_then(|s| s.as_str()).ok_or_else(|| {
                        anyhow!("error is a null-byte-in-string without a string")
                    })?,
                )),
                "invalid-id" => Error::InvalidId(
                    data.get("id")
                        .and_then(|id| id.as_i64())
                        .ok_or_else(|| anyhow!("invalid-id error without an id"))?,
                ),
                "invalid-target" => Error::InvalidTarget(message()?),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}
