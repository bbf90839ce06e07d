use anyhow::Context;
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use remark_api::{
    CommentId, CommentRead, ContentUpdate, Error as ApiError, NewComment, Target, UserId,
};

use crate::{db, extractors::*, outbox::Notifier, Error};

pub async fn whoami(Auth(user): Auth) -> Json<UserId> {
    Json(user)
}

pub async fn list_comments(
    mut conn: PgConn,
    target: Result<Query<Target>, QueryRejection>,
) -> Result<Json<Vec<CommentRead>>, Error> {
    let Query(target) =
        target.map_err(|rej| Error::Api(ApiError::InvalidTarget(rej.body_text())))?;
    let comments =
        remark_api::list_comments(&mut db::PostgresDb { conn: &mut *conn }, target).await??;
    Ok(Json(comments))
}

pub async fn get_comment(
    mut conn: PgConn,
    Path(id): Path<i64>,
) -> Result<Json<CommentRead>, Error> {
    remark_api::validate_id(id)?;
    let id = CommentId(id);
    Ok(Json(
        db::fetch_comment(&mut *conn, id)
            .await?
            .ok_or(Error::comment_not_found(id))?,
    ))
}

/// Reads back a comment that was just committed, to attach the nickname
async fn read_back(conn: &mut sqlx::PgConnection, id: CommentId) -> Result<CommentRead, Error> {
    Ok(db::fetch_comment(&mut *conn, id)
        .await?
        .with_context(|| format!("comment {id:?} vanished right after commit"))?)
}

pub async fn write_comment(
    Auth(user): Auth,
    State(LockTimeout(lock_timeout)): State<LockTimeout>,
    State(notifier): State<Notifier>,
    mut conn: PgConn,
    Json(c): Json<NewComment>,
) -> Result<(StatusCode, Json<CommentRead>), Error> {
    if c.owner != user {
        return Err(Error::unauthorized());
    }
    let comment = db::submit_comment(&mut *conn, lock_timeout, c).await?;
    notifier.comment_written(user, comment.target);
    Ok((
        StatusCode::CREATED,
        Json(read_back(&mut *conn, comment.id).await?),
    ))
}

pub async fn update_comment(
    Auth(user): Auth,
    State(LockTimeout(lock_timeout)): State<LockTimeout>,
    mut conn: PgConn,
    Path(id): Path<i64>,
    Json(update): Json<ContentUpdate>,
) -> Result<Json<CommentRead>, Error> {
    remark_api::validate_id(id)?;
    let comment =
        db::submit_content_update(&mut *conn, lock_timeout, user, CommentId(id), update.content)
            .await?;
    Ok(Json(read_back(&mut *conn, comment.id).await?))
}

pub async fn hide_comment(
    auth: Auth,
    lock_timeout: State<LockTimeout>,
    conn: PgConn,
    id: Path<i64>,
) -> Result<Json<CommentRead>, Error> {
    set_visibility(auth, lock_timeout, conn, id, true).await
}

pub async fn show_comment(
    auth: Auth,
    lock_timeout: State<LockTimeout>,
    conn: PgConn,
    id: Path<i64>,
) -> Result<Json<CommentRead>, Error> {
    set_visibility(auth, lock_timeout, conn, id, false).await
}

async fn set_visibility(
    Auth(user): Auth,
    State(LockTimeout(lock_timeout)): State<LockTimeout>,
    mut conn: PgConn,
    Path(id): Path<i64>,
    hidden: bool,
) -> Result<Json<CommentRead>, Error> {
    remark_api::validate_id(id)?;
    let comment =
        db::submit_visibility(&mut *conn, lock_timeout, user, CommentId(id), hidden).await?;
    Ok(Json(read_back(&mut *conn, comment.id).await?))
}
