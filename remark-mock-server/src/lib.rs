use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use remark_api::{
    validate_content, validate_id, AuthToken, Comment, CommentId, CommentOrder, CommentRead,
    Error, NewComment, Target, Time, UserId,
};

/// In-memory model of the comment service.
///
/// Comments are stored as an explicit tree and positions are recomputed by
/// walking it on every read, so it never relies on the position bookkeeping
/// it is meant to cross-check.
pub struct MockServer {
    users: BTreeMap<UserId, String>,
    sessions: HashMap<AuthToken, UserId>,
    targets: HashSet<Target>,
    comments: BTreeMap<CommentId, Node>,
    next_id: i64,
}

#[derive(Debug)]
struct Node {
    owner: UserId,
    content: String,
    target: Target,
    parent: Option<CommentId>,
    // in creation order
    children: Vec<CommentId>,
    hidden: bool,
    created_at: Time,
    updated_at: Time,
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            users: BTreeMap::new(),
            sessions: HashMap::new(),
            targets: HashSet::new(),
            comments: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn test_add_user(&mut self, id: UserId, nickname: String, token: AuthToken) {
        self.users.insert(id, nickname);
        self.sessions.insert(token, id);
    }

    pub fn test_add_target(&mut self, target: Target) {
        self.targets.insert(target);
    }

    /// Return the current number of comments, on all targets
    pub fn test_num_comments(&self) -> usize {
        self.comments.len()
    }

    /// Return the id of comment number `n`, in creation order
    pub fn test_comment_id(&self, n: usize) -> Option<CommentId> {
        self.comments.keys().nth(n).copied()
    }

    pub fn test_targets(&self) -> Vec<Target> {
        let mut res = self.targets.iter().copied().collect::<Vec<_>>();
        res.sort();
        res
    }

    pub fn test_users(&self) -> impl Iterator<Item = (UserId, &str)> {
        self.users.iter().map(|(id, n)| (*id, n as &str))
    }

    fn auth(&self, token: AuthToken) -> Result<UserId, Error> {
        self.sessions
            .get(&token)
            .copied()
            .ok_or(Error::Unauthenticated)
    }

    pub fn whoami(&self, token: AuthToken) -> Result<UserId, Error> {
        self.auth(token)
    }

    pub fn list_comments(&self, target: Target) -> Result<Vec<CommentRead>, Error> {
        validate_id(target.id)?;
        Ok(self
            .comments_on(target)
            .into_iter()
            .map(|c| self.read(c))
            .collect())
    }

    pub fn get_comment(&self, id: i64) -> Result<CommentRead, Error> {
        validate_id(id)?;
        Ok(self.read(self.comment(CommentId(id))?))
    }

    pub fn write_comment(&mut self, token: AuthToken, c: NewComment) -> Result<CommentRead, Error> {
        let user = self.auth(token)?;
        if c.owner != user {
            return Err(Error::Unauthorized);
        }
        c.validate()?;
        if !self.targets.contains(&c.target) {
            return Err(Error::TargetNotFound(c.target));
        }
        if let Some(parent) = c.parent {
            match self.comments.get(&parent) {
                Some(p) if p.target == c.target => (),
                _ => return Err(Error::CommentNotFound(parent)),
            }
        }

        let id = CommentId(self.next_id);
        self.next_id += 1;
        let now = Utc::now();
        self.comments.insert(
            id,
            Node {
                owner: c.owner,
                content: c.content,
                target: c.target,
                parent: c.parent,
                children: Vec::new(),
                hidden: false,
                created_at: now,
                updated_at: now,
            },
        );
        if let Some(parent) = c.parent {
            if let Some(p) = self.comments.get_mut(&parent) {
                p.children.push(id);
            }
        }
        Ok(self.read(self.comment(id)?))
    }

    pub fn update_comment(
        &mut self,
        token: AuthToken,
        id: i64,
        content: String,
    ) -> Result<CommentRead, Error> {
        let user = self.auth(token)?;
        validate_id(id)?;
        validate_content(&content)?;
        let id = CommentId(id);
        let node = self.owned_node(user, id)?;
        node.content = content;
        node.updated_at = Utc::now();
        Ok(self.read(self.comment(id)?))
    }

    pub fn hide_comment(&mut self, token: AuthToken, id: i64) -> Result<CommentRead, Error> {
        self.set_hidden(token, id, true)
    }

    pub fn show_comment(&mut self, token: AuthToken, id: i64) -> Result<CommentRead, Error> {
        self.set_hidden(token, id, false)
    }

    fn set_hidden(
        &mut self,
        token: AuthToken,
        id: i64,
        hidden: bool,
    ) -> Result<CommentRead, Error> {
        let user = self.auth(token)?;
        validate_id(id)?;
        let id = CommentId(id);
        let node = self.owned_node(user, id)?;
        match (node.hidden, hidden) {
            (true, true) => return Err(Error::InvalidState(String::from("already hidden comment"))),
            (false, false) => {
                return Err(Error::InvalidState(String::from("already shown comment")))
            }
            _ => (),
        }
        node.hidden = hidden;
        node.updated_at = Utc::now();
        Ok(self.read(self.comment(id)?))
    }

    fn owned_node(&mut self, user: UserId, id: CommentId) -> Result<&mut Node, Error> {
        let node = self
            .comments
            .get_mut(&id)
            .ok_or(Error::CommentNotFound(id))?;
        if node.owner != user {
            return Err(Error::Unauthorized);
        }
        Ok(node)
    }

    fn read(&self, c: Comment) -> CommentRead {
        let nickname = self.users.get(&c.owner).cloned();
        CommentRead::new(c, nickname)
    }

    fn comment(&self, id: CommentId) -> Result<Comment, Error> {
        let target = self
            .comments
            .get(&id)
            .ok_or(Error::CommentNotFound(id))?
            .target;
        self.comments_on(target)
            .into_iter()
            .find(|c| c.id == id)
            .ok_or(Error::CommentNotFound(id))
    }

    /// All the comments of `target`, in display order, with their positions
    /// derived from the tree
    pub fn comments_on(&self, target: Target) -> Vec<Comment> {
        let mut res = Vec::new();
        let roots = self
            .comments
            .iter()
            .filter(|(_, n)| n.target == target && n.parent.is_none())
            .map(|(id, _)| *id);
        for (thread, root) in roots.enumerate() {
            let mut sort_number = 0;
            self.walk(root, thread as i32 + 1, 0, &mut sort_number, &mut res);
        }
        res
    }

    /// Pushes `id` then its subtree, returning the number of descendants
    fn walk(
        &self,
        id: CommentId,
        comment_order: i32,
        level: i32,
        sort_number: &mut i32,
        out: &mut Vec<Comment>,
    ) -> i32 {
        let node = &self.comments[&id];
        let me = out.len();
        out.push(Comment {
            id,
            owner: node.owner,
            content: node.content.clone(),
            target: node.target,
            order: CommentOrder {
                comment_order,
                level,
                sort_number: *sort_number,
                parent_id: node.parent,
                child_count: 0,
            },
            hidden: node.hidden,
            created_at: node.created_at,
            updated_at: node.updated_at,
        });
        *sort_number += 1;
        let mut descendants = 0;
        for child in &node.children {
            descendants += 1 + self.walk(*child, comment_order, level + 1, sort_number, out);
        }
        out[me].order.child_count = descendants;
        descendants
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}
