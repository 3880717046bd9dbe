use crate::formats::NavigationNode;

/// Table of contents as found in the archive, tagged by representation.
///
/// Both variants are normalized into the same flat leaf sequence; nothing
/// downstream of [`NavigationIndex`] branches on the source format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationSource {
    /// NCX `navMap` tree.
    Legacy(Vec<NavigationNode>),
    /// Navigation document (`<nav epub:type="toc">`) lists.
    Modern(Vec<NavigationNode>),
    Missing,
}

impl NavigationSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Legacy(_) => "ncx",
            Self::Modern(_) => "nav",
            Self::Missing => "none",
        }
    }

    fn into_roots(self) -> Vec<NavigationNode> {
        match self {
            Self::Legacy(roots) | Self::Modern(roots) => roots,
            Self::Missing => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationIndex {
    kind: &'static str,
    roots: Vec<NavigationNode>,
    leaves: Vec<NavigationNode>,
}

impl NavigationIndex {
    pub fn new(source: NavigationSource) -> Self {
        let kind = source.kind();
        let roots = source.into_roots();
        let leaves = flatten_leaves(&roots);
        Self {
            kind,
            roots,
            leaves,
        }
    }

    /// `"nav"`, `"ncx"` or `"none"`.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn roots(&self) -> &[NavigationNode] {
        &self.roots
    }

    /// Leaf entries in depth-first document order.
    pub fn leaves(&self) -> &[NavigationNode] {
        &self.leaves
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}

pub fn flatten_leaves(roots: &[NavigationNode]) -> Vec<NavigationNode> {
    let mut out = Vec::new();
    // Explicit stack, children pushed in reverse so pops stay in document order.
    let mut stack: Vec<&NavigationNode> = roots.iter().rev().collect();

    while let Some(node) = stack.pop() {
        if node.children.is_empty() {
            out.push(NavigationNode::leaf(node.title.clone(), node.target.clone()));
            continue;
        }
        stack.extend(node.children.iter().rev());
    }

    out
}
