//! Configuration scopes and the key layout that separates them.

use std::fmt;

/// Which subtree a configuration change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeTag {
    /// Cluster-wide configuration.
    Cluster,
    /// Configuration for a single node.
    Node,
}

impl ScopeTag {
    /// Both scopes, in the order their watches are established.
    pub const ALL: [ScopeTag; 2] = [ScopeTag::Cluster, ScopeTag::Node];

    /// Lowercase name used in logs and metric attributes.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeTag::Cluster => "cluster",
            ScopeTag::Node => "node",
        }
    }
}

impl fmt::Display for ScopeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key paths of the two configuration subtrees.
///
/// Cluster objects live at `<base>/<cluster>/<id>` and node objects at
/// `<base>/<node>/<id>`. The two prefixes never overlap, so every key
/// classifies into at most one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    cluster_prefix: String,
    node_prefix: String,
}

impl KeyLayout {
    /// Build a layout from its three path components.
    ///
    /// Separators at the edges of each component are dropped, so
    /// `("osdconfig/", "cluster/", ..)` and `("osdconfig", "cluster", ..)`
    /// describe the same subtree.
    pub fn new(base_key: &str, cluster_key: &str, node_key: &str) -> Self {
        let base = base_key.trim_end_matches('/');
        Self {
            cluster_prefix: format!("{}/{}", base, cluster_key.trim_matches('/')),
            node_prefix: format!("{}/{}", base, node_key.trim_matches('/')),
        }
    }

    /// Subtree prefix watched for `scope`.
    pub fn prefix(&self, scope: ScopeTag) -> &str {
        match scope {
            ScopeTag::Cluster => &self.cluster_prefix,
            ScopeTag::Node => &self.node_prefix,
        }
    }

    /// Full key of configuration object `id` in `scope`.
    pub fn key(&self, scope: ScopeTag, id: &str) -> String {
        format!("{}/{}", self.prefix(scope), id)
    }

    /// Scope and object id of `key`, or `None` if it is outside both subtrees.
    ///
    /// Exactly one separator is removed after the prefix, so the id is the
    /// one [`key`](Self::key) was called with.
    pub fn classify<'k>(&self, key: &'k str) -> Option<(ScopeTag, &'k str)> {
        ScopeTag::ALL.into_iter().find_map(|scope| {
            let rest = key.strip_prefix(self.prefix(scope))?;
            if rest.is_empty() {
                return Some((scope, rest));
            }
            rest.strip_prefix('/').map(|id| (scope, id))
        })
    }
}
