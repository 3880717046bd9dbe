//! Maps table-of-contents entries onto contiguous runs of spine positions.
//!
//! Each kept leaf owns every spine unit from its own position up to the next
//! kept leaf's position (or the end of the spine). Units without extractable
//! text, such as a chapter title rendered as an image, therefore stay inside
//! the chapter that precedes the next boundary and are bridged by the
//! content loader without any special casing here.

use crate::error::{ResolutionWarning, WarningKind};
use crate::formats::{NavigationNode, ResolvedChapter};
use crate::nav::flatten_leaves;
use crate::spine::SpineIndex;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub chapters: Vec<ResolvedChapter>,
    pub warnings: Vec<ResolutionWarning>,
}

/// Resolves `navigation` against `spine`.
///
/// The returned ranges partition `[chapters[0].start, spine.len())`: any
/// spine prefix before the first resolved entry is not part of a chapter.
pub fn resolve(navigation: &[NavigationNode], spine: &SpineIndex) -> Resolution {
    let leaves = flatten_leaves(navigation);
    let mut anchors: Vec<(NavigationNode, usize)> = Vec::with_capacity(leaves.len());
    let mut warnings = Vec::new();

    for node in leaves {
        let Some(position) = locate(&node.target, spine) else {
            tracing::warn!(
                title = %node.title,
                target = %node.target,
                "navigation target matches no spine unit; dropping entry"
            );
            warnings.push(ResolutionWarning {
                title: node.title,
                target: node.target,
                kind: WarningKind::Unresolved,
            });
            continue;
        };

        match anchors.last() {
            Some((_, last)) if position == *last => {
                // Aliased entry: zero-length range, the earlier entry keeps it.
                tracing::debug!(
                    title = %node.title,
                    position,
                    "navigation entry shares its spine position with the previous entry; dropping"
                );
            }
            Some((_, last)) if position < *last => {
                tracing::warn!(
                    title = %node.title,
                    target = %node.target,
                    position,
                    previous = *last,
                    "navigation target points backwards in reading order; dropping entry"
                );
                warnings.push(ResolutionWarning {
                    title: node.title,
                    target: node.target,
                    kind: WarningKind::OutOfOrder,
                });
            }
            _ => anchors.push((node, position)),
        }
    }

    let starts = anchors.iter().map(|(_, pos)| *pos).collect::<Vec<_>>();
    let chapters = anchors
        .into_iter()
        .enumerate()
        .map(|(idx, (node, start))| ResolvedChapter {
            title: node.title,
            target: node.target,
            start,
            end: starts.get(idx + 1).copied().unwrap_or(spine.len()),
        })
        .collect();

    Resolution { chapters, warnings }
}

fn locate(target: &str, spine: &SpineIndex) -> Option<usize> {
    if target.trim().is_empty() {
        return None;
    }
    spine
        .position_of(target)
        .or_else(|| spine.position_of_file(target))
}
