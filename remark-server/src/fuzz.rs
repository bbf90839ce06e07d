use std::{cmp, fmt::Debug, ops::RangeTo, panic::AssertUnwindSafe, path::Path, time::Duration};

use async_recursion::async_recursion;
use axum::{
    extract::FromRequestParts,
    http::{self, request},
    Router,
};
use remark_api::{
    check_invariants, AuthToken, Comment, CommentId, CommentRead, ContentUpdate, Error as ApiError,
    NewComment, Target, TargetType, Time, UserId, Uuid,
};
use remark_mock_server::MockServer;
use tower::{Service, ServiceExt};

use crate::{
    app, create_sqlx_pool,
    extractors::PreAuth,
    test_utils::{build_pg_cluster, seed},
    Error, MIGRATOR,
};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            crate::test_utils::init_logs();
            let lockfile = tempfile::tempfile().expect("creating tempfile");
            let datadir = tempfile::tempdir().expect("creating tempdir");
            let datadir_path: &Path = datadir.as_ref();
            let cluster = build_pg_cluster(datadir_path);
            let datadir_path: &str = datadir_path.to_str().expect("tempdir is not valid utf8");
            postgresfixture::coordinate::run_and_destroy(&cluster, lockfile.into(), || {
                cluster.createdb("test_db").expect("creating test_db database");
                let runtime = AssertUnwindSafe(
                    tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed initializing tokio runtime"),
                );
                // create test db
                let pool = AssertUnwindSafe(runtime.block_on(async move {
                    let pool = create_sqlx_pool(&format!("postgresql://?host={}&dbname=test_db", datadir_path), 8).await.expect("creating sqlx pool");
                    MIGRATOR
                        .run(&mut *pool.acquire().await.expect("getting migrator connection"))
                        .await
                        .expect("failed applying migrations");
                    pool
                }));
                bolero::check!()
                    .with_generator($gen)
                    .cloned()
                    .for_each(move |v| {
                        let pool = pool.clone();
                        // run the test
                        let idle_before = pool.num_idle();
                        let v_str = format!("{v:?}");
                        let idle_after_res: Result<usize, _> = {
                            let pool = pool.clone();
                            std::panic::catch_unwind(AssertUnwindSafe(|| {
                                runtime.block_on(async move {
                                    let () = $fn(pool.clone(), v).await;
                                    let mut idle_after = pool.num_idle();
                                    let wait_release_since = std::time::Instant::now();
                                    while idle_after < idle_before
                                        && wait_release_since.elapsed()
                                            <= std::time::Duration::from_secs(1)
                                    {
                                        tokio::task::yield_now().await;
                                        idle_after = pool.num_idle();
                                    }
                                    idle_after
                                })
                            }))
                        };
                        runtime.block_on(async move {
                            // cleanup
                            let mut conn =
                                pool.acquire().await.expect("getting db cleanup connection");
                            sqlx::query(include_str!("../reset-test-db.sql"))
                                .execute(&mut *conn)
                                .await
                                .expect("failed cleaning up database");
                        });
                        // resume the panics
                        match idle_after_res {
                            Err(e) => std::panic::resume_unwind(e),
                            Ok(idle_after) => assert!(
                                idle_after >= idle_before,
                                "test {} held onto pool after exiting test: before there were {idle_before} connections, and after there were {idle_after} with value {v_str}",
                                stringify!($name)
                            ),
                        }
                    });
            })
            .expect("coordinating spinup and shutdown of the pg cluster");
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |token| async move {
    if let Ok(req) = http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, token)
        .body(())
    {
        let mut req = req.into_parts().0;
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(_) => (),
            Err(Error::Api(ApiError::Unauthenticated)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    WriteRoot {
        user: usize,
        target: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..40usize))]
        content: String,
    },
    WriteReply {
        user: usize,
        parent: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..40usize))]
        content: String,
    },
    WriteAsOther {
        user: usize,
        owner: usize,
        target: usize,
    },
    UpdateContent {
        user: usize,
        comment: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..40usize))]
        content: String,
    },
    Hide {
        user: usize,
        comment: usize,
    },
    Show {
        user: usize,
        comment: usize,
    },
    List {
        target: usize,
    },
    Get {
        comment: usize,
    },
    Whoami {
        user: usize,
    },
}

async fn call<Req, Resp>(
    app: &mut Router,
    req: request::Request<axum::body::Body>,
    req_body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    if status.is_success() {
        return Ok(serde_json::from_slice(&body).unwrap_or_else(|err| {
            panic!(
                r#"
                    Failed parsing resp body!

                    The error is the following:
                    ---
                    {err}
                    ---

                    Response body is:
                    ---
                    {body:?}
                    ---

                    Request was:
                    ---
                    {req_body:?}
                    ---
                "#
            )
        }));
    }
    Err(ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}")))
}

async fn run_on_app<Req, Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    token: Option<AuthToken>,
    body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    let req = match token {
        Some(token) => req.header(http::header::AUTHORIZATION, format!("bearer {}", token.0)),
        None => req,
    };
    let req = req
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serializing request body to json"),
        ))
        .expect("building request");
    call(app, req, body).await
}

fn compare<T>(name: &str, app_res: Result<T, ApiError>, mock_res: Result<T, ApiError>)
where
    T: Debug + PartialEq,
{
    assert_eq!(
        app_res, mock_res,
        "app and mock did not return the same result for {name}"
    );
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end); // in case we rounded to 0
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1)) // in case id was actually over end - 1 due to rounding
}

/// Timestamps come from two different clocks
fn strip_times(mut c: CommentRead) -> CommentRead {
    let epoch = Time::from(std::time::UNIX_EPOCH);
    c.comment.created_at = epoch;
    c.comment.updated_at = epoch;
    c
}

fn comments_uri(t: Target) -> String {
    format!("/api/comments?type={}&id={}", t.kind.as_str(), t.id)
}

const USERS: [(UserId, &str); 3] = [(UserId(1), "alice"), (UserId(2), "bob"), (UserId(3), "carol")];

fn token_of(user: UserId) -> AuthToken {
    AuthToken(Uuid::from_u128(user.0 as u128))
}

struct ComparativeFuzzer {
    app: Router,
    mock: MockServer,
    targets: Vec<Target>,
}

impl ComparativeFuzzer {
    async fn new(pool: sqlx::PgPool) -> ComparativeFuzzer {
        let targets = vec![
            Target::new(TargetType::Job, 1),
            Target::new(TargetType::Job, 2),
            Target::new(TargetType::CommunityPost, 1),
        ];
        let users = USERS
            .iter()
            .map(|(id, nick)| (*id, *nick, token_of(*id)))
            .collect::<Vec<_>>();
        seed(&pool, &users, &targets).await;

        let mut mock = MockServer::new();
        for (id, nick, tok) in users {
            mock.test_add_user(id, String::from(nick), tok);
        }
        for t in &targets {
            mock.test_add_target(*t);
        }
        let app = app(pool, Duration::from_secs(5));
        ComparativeFuzzer { app, mock, targets }
    }

    /// The last index maps to a session nobody holds
    fn user(&self, fuzz_id: usize) -> (UserId, AuthToken) {
        match resize_int(fuzz_id, ..USERS.len() + 1) {
            Some(i) if i < USERS.len() => (USERS[i].0, token_of(USERS[i].0)),
            _ => (UserId(1000), AuthToken(Uuid::from_u128(1000))),
        }
    }

    /// The last index maps to an article that does not exist
    fn target(&self, fuzz_id: usize) -> Target {
        match resize_int(fuzz_id, ..self.targets.len() + 1) {
            Some(i) if i < self.targets.len() => self.targets[i],
            _ => Target::new(TargetType::Job, 1000),
        }
    }

    /// The last index maps to a comment that does not exist
    fn comment(&self, fuzz_id: usize) -> i64 {
        let num = self.mock.test_num_comments();
        resize_int(fuzz_id, ..num + 1)
            .and_then(|i| self.mock.test_comment_id(i))
            .map(|c| c.0)
            .unwrap_or(num as i64 + 1000)
    }

    async fn check_listing(&mut self, target: Target) {
        let app_res: Result<Vec<CommentRead>, ApiError> =
            run_on_app(&mut self.app, "GET", &comments_uri(target), None, &()).await;
        if let Ok(listing) = &app_res {
            let comments = listing
                .iter()
                .map(|c| c.comment.clone())
                .collect::<Vec<Comment>>();
            check_invariants(&comments)
                .unwrap_or_else(|e| panic!("broken listing on {target}: {e:?}"));
        }
        compare(
            "List",
            app_res.map(|l| l.into_iter().map(strip_times).collect()),
            self.mock
                .list_comments(target)
                .map(|l| l.into_iter().map(strip_times).collect()),
        );
    }

    #[async_recursion]
    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::WriteRoot {
                user,
                target,
                content,
            } => {
                let (user, tok) = self.user(user);
                let c = NewComment::root(user, content, self.target(target));
                compare(
                    "WriteRoot",
                    run_on_app(&mut self.app, "POST", "/api/comments", Some(tok), &c)
                        .await
                        .map(strip_times),
                    self.mock.write_comment(tok, c).map(strip_times),
                );
            }
            FuzzOp::WriteReply {
                user,
                parent,
                content,
            } => {
                if self.mock.test_num_comments() == 0 {
                    self.execute_fuzz_op(FuzzOp::WriteRoot {
                        user: 0,
                        target: 0,
                        content: String::from("first"),
                    })
                    .await;
                }
                let (user, tok) = self.user(user);
                let parent = self.comment(parent);
                // replies go on the parent's article, or on the first one if it is made up
                let target = self
                    .mock
                    .get_comment(parent)
                    .map(|p| p.comment.target)
                    .unwrap_or(self.targets[0]);
                let c = NewComment::reply(user, content, target, CommentId(parent));
                compare(
                    "WriteReply",
                    run_on_app(&mut self.app, "POST", "/api/comments", Some(tok), &c)
                        .await
                        .map(strip_times),
                    self.mock.write_comment(tok, c).map(strip_times),
                );
            }
            FuzzOp::WriteAsOther {
                user,
                owner,
                target,
            } => {
                let (_, tok) = self.user(user);
                let (owner, _) = self.user(owner);
                let c = NewComment::root(owner, String::from("impersonated"), self.target(target));
                compare(
                    "WriteAsOther",
                    run_on_app(&mut self.app, "POST", "/api/comments", Some(tok), &c)
                        .await
                        .map(strip_times),
                    self.mock.write_comment(tok, c).map(strip_times),
                );
            }
            FuzzOp::UpdateContent {
                user,
                comment,
                content,
            } => {
                let (_, tok) = self.user(user);
                let id = self.comment(comment);
                let update = ContentUpdate { content };
                compare(
                    "UpdateContent",
                    run_on_app(
                        &mut self.app,
                        "PUT",
                        &format!("/api/comments/{id}"),
                        Some(tok),
                        &update,
                    )
                    .await
                    .map(strip_times),
                    self.mock
                        .update_comment(tok, id, update.content)
                        .map(strip_times),
                );
            }
            FuzzOp::Hide { user, comment } => {
                let (_, tok) = self.user(user);
                let id = self.comment(comment);
                compare(
                    "Hide",
                    run_on_app(
                        &mut self.app,
                        "POST",
                        &format!("/api/comments/{id}/hide"),
                        Some(tok),
                        &(),
                    )
                    .await
                    .map(strip_times),
                    self.mock.hide_comment(tok, id).map(strip_times),
                );
            }
            FuzzOp::Show { user, comment } => {
                let (_, tok) = self.user(user);
                let id = self.comment(comment);
                compare(
                    "Show",
                    run_on_app(
                        &mut self.app,
                        "POST",
                        &format!("/api/comments/{id}/show"),
                        Some(tok),
                        &(),
                    )
                    .await
                    .map(strip_times),
                    self.mock.show_comment(tok, id).map(strip_times),
                );
            }
            FuzzOp::List { target } => {
                let target = self.target(target);
                self.check_listing(target).await;
            }
            FuzzOp::Get { comment } => {
                let id = self.comment(comment);
                compare(
                    "Get",
                    run_on_app(&mut self.app, "GET", &format!("/api/comments/{id}"), None, &())
                        .await
                        .map(strip_times),
                    self.mock.get_comment(id).map(strip_times),
                );
            }
            FuzzOp::Whoami { user } => {
                let (_, tok) = self.user(user);
                compare(
                    "Whoami",
                    run_on_app(&mut self.app, "GET", "/api/whoami", Some(tok), &()).await,
                    self.mock.whoami(tok),
                );
            }
        }
    }
}

do_sqlx_test!(
    compare_with_mock,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..100usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool).await;
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
        for t in fuzzer.targets.clone() {
            fuzzer.check_listing(t).await;
        }
    }
);
