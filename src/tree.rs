//! Operations over whole subtrees, built from the single-node operations.
//!
//! None of these are atomic: the tree may change while they run.

use failure::format_err;
use futures::stream::{self, Stream, StreamExt};
use slog::{debug, trace};

use crate::error::{self, SubtreeFailure};
use crate::{path, ZooKeeper};

enum Walk {
    Start(String),
    Pending(Vec<String>),
    Failed(failure::Error),
    Done,
}

/// Pushes the children of `parent` so that they pop off `stack` in sorted order.
fn push_children(stack: &mut Vec<String>, parent: &str, mut children: Vec<String>) {
    children.sort_unstable();
    stack.extend(children.iter().rev().map(|child| path::join(parent, child)));
}

impl ZooKeeper {
    /// Lazily yield the path of every node strictly below `root`, parents before their
    /// descendants, siblings in name order.
    ///
    /// The walk keeps an explicit stack, so arbitrarily deep trees do not grow the call stack.
    /// One `get_children` request is made per visited node, when the stream is polled past it.
    ///
    /// A node that disappears after its parent was listed is still yielded, as a leaf. If `root`
    /// itself does not exist, the stream yields a single [`error::GetChildren::NoNode`] error
    /// (reachable through `failure::Error::downcast_ref`). Any other failure ends the stream after
    /// yielding it.
    pub fn list_subtree(
        &self,
        root: &str,
    ) -> impl Stream<Item = Result<String, failure::Error>> + Send + 'static {
        let start = match path::validate(root, false) {
            Ok(()) => Walk::Start(root.to_string()),
            Err(e) => Walk::Failed(e),
        };

        stream::unfold((self.clone(), start), |(zk, walk)| async move {
            let mut stack = match walk {
                Walk::Done => return None,
                Walk::Failed(e) => return Some((Err(e), (zk, Walk::Done))),
                Walk::Start(root) => match zk.get_children(&root).await {
                    Ok(Ok(children)) => {
                        let mut stack = Vec::new();
                        push_children(&mut stack, &root, children);
                        stack
                    }
                    Ok(Err(e)) => return Some((Err(e.into()), (zk, Walk::Done))),
                    Err(e) => return Some((Err(e), (zk, Walk::Done))),
                },
                Walk::Pending(stack) => stack,
            };

            let next = stack.pop()?;
            match zk.get_children(&next).await {
                Ok(Ok(children)) => push_children(&mut stack, &next, children),
                Ok(Err(error::GetChildren::NoNode)) => {
                    trace!(zk.logger, "node vanished during walk"; "path" => &next);
                }
                Err(e) => return Some((Err(e), (zk, Walk::Done))),
            }
            Some((Ok(next), (zk, Walk::Pending(stack))))
        })
    }

    /// Delete `root` and everything below it, deepest nodes first.
    ///
    /// Nodes that are already gone when their turn comes count as deleted by someone else and are
    /// skipped, so concurrent deleters do not make this fail. On success, the paths this call
    /// deleted are returned in deletion order. Any other failure (a node that gained a child in
    /// the meantime, a lost connection, ...) stops the deletion; the error carries the paths that
    /// were deleted up to that point.
    ///
    /// The root `/` itself is never deleted, only its descendants.
    pub async fn delete_subtree(&self, root: &str) -> Result<Vec<String>, error::DeleteSubtree> {
        let stopped = |path: &str, reason, deleted| error::DeleteSubtree {
            path: path.to_string(),
            reason,
            deleted,
        };

        let mut order = Vec::new();
        let mut walk = Box::pin(self.list_subtree(root));
        while let Some(next) = walk.next().await {
            match next {
                Ok(path) => order.push(path),
                Err(e) => {
                    return match e.downcast::<error::GetChildren>() {
                        // nothing to delete
                        Ok(error::GetChildren::NoNode) if order.is_empty() => Ok(Vec::new()),
                        Ok(e) => Err(stopped(root, SubtreeFailure::GetChildren(e), Vec::new())),
                        Err(e) => Err(stopped(root, SubtreeFailure::Request(e), Vec::new())),
                    };
                }
            }
        }
        debug!(self.logger, "deleting subtree"; "root" => root, "nodes" => order.len() + 1);

        let root = if root == "/" {
            None
        } else {
            Some(root.to_string())
        };

        let mut deleted = Vec::with_capacity(order.len() + 1);
        for path in order.into_iter().rev().chain(root) {
            match self.delete(&path, None).await {
                Ok(Ok(())) => deleted.push(path),
                Ok(Err(error::Delete::NoNode)) => {
                    trace!(self.logger, "already deleted"; "path" => &path);
                }
                Ok(Err(e)) => return Err(stopped(path.as_str(), SubtreeFailure::Delete(e), deleted)),
                Err(e) => return Err(stopped(path.as_str(), SubtreeFailure::Request(e), deleted)),
            }
        }
        Ok(deleted)
    }

    /// List the sequential children of `parent` whose names are `prefix` followed by a sequence
    /// number, as full paths in sequence order.
    ///
    /// Sequential creates are never retried automatically, since a create whose response was
    /// lost may have succeeded. A caller can put something identifying in the prefix (such as its
    /// session id) and use this to find out whether the node exists.
    pub async fn find_sequential(
        &self,
        parent: &str,
        prefix: &str,
    ) -> Result<Result<Vec<String>, error::GetChildren>, failure::Error> {
        if prefix.contains('/') {
            return Err(format_err!("prefix must be a single name: {:?}", prefix));
        }

        let children = match self.get_children(parent).await? {
            Ok(children) => children,
            Err(e) => return Ok(Err(e)),
        };

        let mut found: Vec<(i64, String)> = children
            .into_iter()
            .filter(|name| {
                name.len() == prefix.len() + path::SEQUENCE_DIGITS && name.starts_with(prefix)
            })
            .filter_map(|name| path::sequence_number(&name).map(|seq| (seq, name)))
            .collect();
        found.sort_unstable();

        Ok(Ok(found
            .into_iter()
            .map(|(_, name)| path::join(parent, &name))
            .collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_pop_in_name_order() {
        let mut stack = vec!["/z".to_string()];
        push_children(
            &mut stack,
            "/a",
            vec!["c".to_string(), "a".to_string(), "b".to_string()],
        );
        assert_eq!(stack.pop().as_deref(), Some("/a/a"));
        assert_eq!(stack.pop().as_deref(), Some("/a/b"));
        assert_eq!(stack.pop().as_deref(), Some("/a/c"));
        assert_eq!(stack.pop().as_deref(), Some("/z"));
    }

    #[test]
    fn children_of_root() {
        let mut stack = Vec::new();
        push_children(&mut stack, "/", vec!["x".to_string()]);
        assert_eq!(stack, vec!["/x".to_string()]);
    }
}
