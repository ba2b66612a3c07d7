use anyhow::{anyhow, Context, Result};

use crate::concurrency::TreeLockService;
use crate::operation::Operation;
use crate::tree::{NodeId, TreeStore, UserId};

/// A tree definition plus a query list in the line-oriented batch format:
///
/// ```text
/// N            node count
/// m            branching factor
/// Q            query count
/// name * N     level order
/// op node uid  * Q, op is 1 (lock), 2 (unlock) or 3 (upgrade)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub names: Vec<String>,
    pub branching: usize,
    pub queries: Vec<Query>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub op: Operation,
    pub node: NodeId,
    pub uid: UserId,
}

impl Batch {
    /// Parse the batch format. Blank lines are ignored.
    pub fn parse(input: &str) -> Result<Self> {
        let mut lines = input.lines().map(str::trim).filter(|l| !l.is_empty());
        let mut header = |what: &str| -> Result<usize> {
            let line = lines.next().ok_or_else(|| anyhow!("missing {}", what))?;
            line.parse::<usize>()
                .with_context(|| format!("invalid {} '{}'", what, line))
        };

        let n = header("node count")?;
        let branching = header("branching factor")?;
        let q = header("query count")?;

        let names: Vec<String> = lines.by_ref().take(n).map(str::to_string).collect();
        if names.len() != n {
            return Err(anyhow!("expected {} node names, found {}", n, names.len()));
        }

        let queries = lines
            .by_ref()
            .take(q)
            .enumerate()
            .map(|(i, line)| Query::parse(line).with_context(|| format!("query {}", i + 1)))
            .collect::<Result<Vec<_>>>()?;
        if queries.len() != q {
            return Err(anyhow!("expected {} queries, found {}", q, queries.len()));
        }

        Ok(Batch { names, branching, queries })
    }

    pub fn build_tree(&self) -> Result<TreeStore> {
        TreeStore::from_level_order(&self.names, self.branching)
            .context("Failed to build tree from batch input")
    }

    /// Run every query in order against a fresh tree
    pub fn run(&self) -> Result<Vec<bool>> {
        let service = TreeLockService::new(self.build_tree()?);
        Ok(self
            .queries
            .iter()
            .map(|q| service.execute(q.op, q.node.as_str(), q.uid).is_ok())
            .collect())
    }
}

impl Query {
    fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let [op, node, uid] = parts.as_slice() else {
            return Err(anyhow!("expected 'op node uid', got '{}'", line));
        };
        Ok(Query {
            op: op.parse()?,
            node: NodeId::from(*node),
            uid: uid
                .parse()
                .with_context(|| format!("invalid user id '{}'", uid))?,
        })
    }
}
