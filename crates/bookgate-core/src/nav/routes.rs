use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// Auth requirements of one navigable destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RouteIntent {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub requires_role: Option<Role>,
}

impl RouteIntent {
    pub fn public(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            requires_auth: false,
            requires_role: None,
        }
    }

    pub fn authenticated(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            requires_auth: true,
            ..Self::public(name, path)
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.requires_role = Some(role);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    CatchAll,
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn compile(pattern: &str) -> Vec<Segment> {
    split_path(pattern)
        .map(|seg| {
            if seg == "*" {
                Segment::CatchAll
            } else if let Some(name) = seg.strip_prefix(':') {
                Segment::Param(name.to_string())
            } else {
                Segment::Static(seg.to_string())
            }
        })
        .collect()
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> Option<Vec<(String, String)>> {
    let mut params = Vec::new();
    for (i, segment) in pattern.iter().enumerate() {
        match segment {
            Segment::CatchAll => return Some(params),
            Segment::Static(expected) => {
                if path.get(i) != Some(&expected.as_str()) {
                    return None;
                }
            }
            Segment::Param(name) => {
                let value = path.get(i)?;
                params.push((name.clone(), value.to_string()));
            }
        }
    }
    (pattern.len() == path.len()).then_some(params)
}

/// A route table entry matched against a concrete path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute<'a> {
    pub intent: &'a RouteIntent,
    pub params: Vec<(String, String)>,
}

/// Ordered route table; the first matching entry wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<(RouteIntent, Vec<Segment>)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, intent: RouteIntent) -> Self {
        self.push(intent);
        self
    }

    pub fn push(&mut self, intent: RouteIntent) {
        let pattern = compile(&intent.path);
        self.routes.push((intent, pattern));
    }

    /// The library application's destinations.
    pub fn library() -> Self {
        Self::new()
            .with(RouteIntent::public("Login", "/login"))
            .with(RouteIntent::authenticated("Home", "/"))
            .with(RouteIntent::authenticated("Books", "/books"))
            .with(RouteIntent::authenticated("AddBook", "/books/add"))
            .with(RouteIntent::authenticated("BookDetail", "/books/:id"))
            .with(RouteIntent::authenticated("Profile", "/profile"))
            .with(RouteIntent::authenticated("Admin", "/admin").with_role(Role::Admin))
            .with(RouteIntent::authenticated("UserManagement", "/admin/users").with_role(Role::Admin))
            .with(RouteIntent::authenticated("BorrowManagement", "/admin/borrows").with_role(Role::Admin))
            .with(
                RouteIntent::authenticated("SystemMaintenance", "/admin/maintenance")
                    .with_role(Role::Admin),
            )
            .with(RouteIntent::public("NotFound", "/*"))
    }

    /// Match a path (query string and fragment ignored) against the table.
    pub fn resolve(&self, path: &str) -> Option<ResolvedRoute<'_>> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = split_path(path).collect();
        self.routes.iter().find_map(|(intent, pattern)| {
            match_segments(pattern, &segments).map(|params| ResolvedRoute { intent, params })
        })
    }

    pub fn by_name(&self, name: &str) -> Option<&RouteIntent> {
        self.routes
            .iter()
            .map(|(intent, _)| intent)
            .find(|intent| intent.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteIntent> {
        self.routes.iter().map(|(intent, _)| intent)
    }
}
