//! Configuration directives and batches.

use std::fmt;

use super::config::ConfigTree;

/// Kind of change a directive performs on the configuration tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Set,
    Delete,
}

impl Op {
    /// Name of the shell variable holding the command for this op.
    fn script_var(&self) -> &'static str {
        match *self {
            Op::Set => "$SET",
            Op::Delete => "$DELETE",
        }
    }
}

/// A single `SET`/`DELETE` against a configuration path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directive {
    pub op: Op,
    pub path: String,
}

impl Directive {
    pub fn set(path: impl Into<String>) -> Self {
        Directive {
            op: Op::Set,
            path: path.into(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Directive {
            op: Op::Delete,
            path: path.into(),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op.script_var(), self.path)
    }
}

/// Ordered directives, submitted as one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectiveBatch {
    directives: Vec<Directive>,
}

impl DirectiveBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: impl Into<String>) {
        self.directives.push(Directive::set(path));
    }

    pub fn delete(&mut self, path: impl Into<String>) {
        self.directives.push(Directive::delete(path));
    }

    /// Queue a `DELETE` for `path` only if it is part of the live configuration.
    ///
    /// Returns whether a deletion was queued.
    pub fn delete_existing(&mut self, live: &ConfigTree, path: &str) -> bool {
        let exists = live.exists(path);
        if exists {
            self.delete(path);
        }
        exists
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter()
    }

    /// Paths of all `SET` directives, in order.
    pub fn sets(&self) -> impl Iterator<Item = &str> {
        self.paths(Op::Set)
    }

    /// Paths of all `DELETE` directives, in order.
    pub fn deletes(&self) -> impl Iterator<Item = &str> {
        self.paths(Op::Delete)
    }

    fn paths(&self, op: Op) -> impl Iterator<Item = &str> {
        self.directives
            .iter()
            .filter(move |d| d.op == op)
            .map(|d| d.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

impl fmt::Display for DirectiveBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.directives {
            writeln!(f, "{d}")?;
        }
        Ok(())
    }
}
