use chrono::Utc;

pub use uuid::Uuid;
pub type Time = chrono::DateTime<Utc>;

mod comment;
pub use comment::{
    validate_content, Comment, CommentId, CommentRead, ContentUpdate, NewComment,
    HIDDEN_CONTENT, MAX_CONTENT_LENGTH,
};

mod db;
pub use db::Db;

mod error;
pub use error::Error;

mod order;
pub use order::CommentOrder;

mod read;
pub use read::{check_invariants, list_comments, sort_for_display, subtree};

mod target;
pub use target::{Target, TargetType};

mod user;
pub use user::{AuthToken, UserId};

mod writer;
pub use writer::{hide_comment, show_comment, update_content, write_comment};

// Postgres refuses NUL bytes in text columns
pub fn validate_string(s: &str) -> Result<(), Error> {
    match s.contains('\0') {
        true => Err(Error::NullByteInString(String::from(s))),
        false => Ok(()),
    }
}

pub fn validate_id(id: i64) -> Result<(), Error> {
    match id > 0 {
        true => Ok(()),
        false => Err(Error::InvalidId(id)),
    }
}
