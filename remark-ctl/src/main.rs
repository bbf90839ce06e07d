use anyhow::{anyhow, Context};
use remark_api::{
    AuthToken, CommentId, CommentRead, ContentUpdate, NewComment, Target, TargetType, UserId, Uuid,
};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long, default_value = "http://127.0.0.1:3000")]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// List the comments of an article, threads indented by depth
    List {
        /// JOB or COMMUNITY_POST
        target_type: TargetType,
        target_id: i64,
    },

    /// Write a comment, or a reply with --parent
    Write {
        /// JOB or COMMUNITY_POST
        target_type: TargetType,
        target_id: i64,
        content: String,

        #[structopt(long)]
        parent: Option<i64>,
    },

    /// Replace the content of one of your comments
    Edit { id: i64, content: String },

    /// Hide one of your comments
    Hide { id: i64 },

    /// Show one of your hidden comments again
    Show { id: i64 },
}

fn session_token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("SESSION_TOKEN").context("retrieving SESSION_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing SESSION_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

async fn parse_response<T>(resp: reqwest::Response) -> anyhow::Result<T>
where
    T: for<'de> serde::Deserialize<'de>,
{
    if resp.status().is_success() {
        return resp.json().await.context("parsing server response");
    }
    let status = resp.status();
    let body = resp.bytes().await.context("reading error response")?;
    match remark_api::Error::parse(&body) {
        Ok(err) => Err(anyhow!(err)),
        Err(_) => Err(anyhow!("server answered {status}")),
    }
}

fn print_comment(c: &CommentRead) {
    let indent = "  ".repeat(c.comment.order.level as usize);
    let author = c.nickname.as_deref().unwrap_or("?");
    println!(
        "{indent}#{} {author}: {}",
        c.comment.id.0, c.comment.content
    );
}

async fn set_visibility(
    client: &reqwest::Client,
    host: &str,
    id: i64,
    action: &str,
) -> anyhow::Result<()> {
    let res: CommentRead = parse_response(
        client
            .post(format!("{host}/api/comments/{id}/{action}"))
            .bearer_auth(session_token()?.0)
            .send()
            .await?,
    )
    .await?;
    print_comment(&res);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();

    let client = reqwest::Client::new();

    match opt.cmd {
        Command::List {
            target_type,
            target_id,
        } => {
            let comments: Vec<CommentRead> = parse_response(
                client
                    .get(format!("{}/api/comments", opt.host))
                    .query(&Target::new(target_type, target_id))
                    .send()
                    .await?,
            )
            .await?;
            for c in &comments {
                print_comment(c);
            }
        }
        Command::Write {
            target_type,
            target_id,
            content,
            parent,
        } => {
            let token = session_token()?;
            let me: UserId = parse_response(
                client
                    .get(format!("{}/api/whoami", opt.host))
                    .bearer_auth(token.0)
                    .send()
                    .await?,
            )
            .await?;
            let c = NewComment {
                owner: me,
                content,
                target: Target::new(target_type, target_id),
                parent: parent.map(CommentId),
            };
            let written: CommentRead = parse_response(
                client
                    .post(format!("{}/api/comments", opt.host))
                    .json(&c)
                    .bearer_auth(token.0)
                    .send()
                    .await?,
            )
            .await?;
            print_comment(&written);
        }
        Command::Edit { id, content } => {
            let edited: CommentRead = parse_response(
                client
                    .put(format!("{}/api/comments/{id}", opt.host))
                    .json(&ContentUpdate { content })
                    .bearer_auth(session_token()?.0)
                    .send()
                    .await?,
            )
            .await?;
            print_comment(&edited);
        }
        Command::Hide { id } => set_visibility(&client, &opt.host, id, "hide").await?,
        Command::Show { id } => set_visibility(&client, &opt.host, id, "show").await?,
    }

    Ok(())
}
