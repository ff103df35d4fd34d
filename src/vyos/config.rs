//! Live configuration snapshot.
//!
//! Parses the curly-brace text that `showConfig` prints into a tree and
//! answers point-existence queries such as `interfaces ethernet eth0`.
//!
//! NOTE: this only handles what the active configuration actually looks
//! like (one statement per line, `/* ... */` comments on their own line or
//! trailing a statement, double-quoted values). It is not a general parser
//! for the configuration language.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::process::Command;

use crate::util;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Node {
    children: BTreeMap<String, Node>,
}

impl Node {
    fn insert(&mut self, path: &[String], node: Node) {
        match path.split_first() {
            None => self.merge(node),
            Some((head, rest)) => self
                .children
                .entry(head.clone())
                .or_default()
                .insert(rest, node),
        }
    }

    fn merge(&mut self, other: Node) {
        for (name, child) in other.children {
            self.children.entry(name).or_default().merge(child);
        }
    }

    fn get(&self, path: &[String]) -> Option<&Node> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self.children.get(head)?.get(rest),
        }
    }
}

/// Read-only view of the active configuration tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigTree {
    root: Node,
}

impl ConfigTree {
    /// Query the configuration engine for the active configuration.
    pub fn from_system(program: &str, args: &[&str]) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        let text = util::try_exec_output(cmd).context("failed to show active configuration")?;
        Self::parse(&text)
    }

    /// Parse configuration text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut stack: Vec<(Vec<String>, Node)> = vec![(vec![], Node::default())];

        for (index, raw) in text.lines().enumerate() {
            let lineno = index + 1;
            let stripped = strip_comments(raw);
            let line = stripped.trim();
            if line.is_empty() {
                continue;
            }

            if line == "}" {
                if stack.len() < 2 {
                    bail!("line {}: unbalanced '}}'", lineno);
                }
                if let Some((path, node)) = stack.pop() {
                    if let Some((_, parent)) = stack.last_mut() {
                        parent.insert(&path, node);
                    }
                }
                continue;
            }

            let mut tokens = tokenize(line).with_context(|| format!("line {lineno}"))?;
            if tokens.last().map(String::as_str) == Some("{") {
                tokens.pop();
                if tokens.is_empty() {
                    bail!("line {}: block without a name", lineno);
                }
                stack.push((tokens, Node::default()));
            } else if let Some((_, current)) = stack.last_mut() {
                current.insert(&tokens, Node::default());
            }
        }

        if stack.len() != 1 {
            bail!("unterminated block '{}'", stack[stack.len() - 1].0.join(" "));
        }
        let root = stack.pop().map(|(_, node)| node).unwrap_or_default();
        Ok(ConfigTree { root })
    }

    /// Whether `path` (whitespace-separated) exists in the tree.
    pub fn exists(&self, path: &str) -> bool {
        match tokenize(path) {
            Ok(tokens) if !tokens.is_empty() => self.root.get(&tokens).is_some(),
            _ => false,
        }
    }
}

/// Drop `/* ... */` spans that sit outside double quotes.
///
/// An unclosed comment runs to the end of the line.
fn strip_comments(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                out.push(c);
            }
            '\\' if quoted => {
                out.push(c);
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '/' if !quoted && chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = None;
                for c in chars.by_ref() {
                    if prev == Some('*') && c == '/' {
                        break;
                    }
                    prev = Some(c);
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Split a statement into whitespace-separated words, honoring double quotes.
fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = vec![];
    let mut current = String::new();
    let mut chars = line.chars();
    let mut quoted = false;
    let mut in_token = false;

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            '\\' if quoted => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quoted {
        bail!("unterminated quote in '{}'", line);
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
