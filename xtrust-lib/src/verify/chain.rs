//! Candidate chain discovery via DFS over the issuer relation.
//!
//! Given a leaf, an intermediate pool and an anchor pool, enumerates every
//! structurally plausible chain from the leaf to an anchor. Only the
//! supplied pools are consulted: an issuer that is in neither is never
//! invented, so a leaf whose bridging intermediate is missing has no path.

use super::pool::key_id_rank;
use super::CertPool;
use crate::certificate::Certificate;
use std::collections::HashSet;
use std::ops::ControlFlow;
use tracing::{debug, trace};

/// Upper bound on chain length used when no tighter limit is configured.
pub(crate) const MAX_CHAIN_DEPTH: usize = 32;

/// Default number of issuer edges the search may follow per call.
pub const DEFAULT_MAX_PATH_STEPS: usize = 4096;

/// How a search over candidate chains ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// Every candidate chain was offered to the visitor.
    Complete,
    /// The visitor asked to stop.
    Stopped,
    /// The step budget ran out before the search space was exhausted.
    BudgetExhausted,
}

/// Enumerates candidate chains `[leaf, intermediates.., anchor]`.
///
/// Candidates are produced in discovery order. At every node the issuers
/// from both pools are ranked together by [`key_id_rank`]: a Subject Key
/// Identifier matching the child's Authority Key Identifier comes first.
/// Within a rank, anchor pool members precede intermediate pool members,
/// and insertion order applies after that.
///
/// Each issuer edge followed costs one step. Discovery only matches names,
/// so a pool of many certificates sharing a subject has factorially many
/// dead-end orderings; the step budget keeps a single search bounded.
#[derive(Debug, Clone, Copy)]
pub struct PathBuilder<'a> {
    intermediates: &'a CertPool,
    anchors: &'a CertPool,
    max_depth: usize,
    max_steps: usize,
}

impl<'a> PathBuilder<'a> {
    /// Create a builder over the two pools.
    ///
    /// Chain length is bounded by the number of distinct certificates in
    /// both pools plus one (the leaf), which no cycle-free chain can exceed.
    pub fn new(intermediates: &'a CertPool, anchors: &'a CertPool) -> Self {
        let only_intermediate = intermediates
            .iter()
            .filter(|c| !anchors.contains_exact(c))
            .count();
        PathBuilder {
            intermediates,
            anchors,
            max_depth: anchors.len() + only_intermediate + 1,
            max_steps: DEFAULT_MAX_PATH_STEPS,
        }
    }

    /// Further cap the number of certificates in a candidate chain.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = self.max_depth.min(max_depth.max(1));
        self
    }

    /// Cap the number of issuer edges followed per search.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Maximum number of certificates in a candidate chain.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Walk candidate chains starting at `leaf`, handing each to `visit`.
    ///
    /// Returning [`ControlFlow::Break`] from the visitor ends the search.
    pub fn for_each_path<F>(&self, leaf: &'a Certificate, mut visit: F) -> SearchStatus
    where
        F: FnMut(&[&'a Certificate]) -> ControlFlow<()>,
    {
        let mut search = Search {
            chain: vec![leaf],
            on_path: HashSet::from([*leaf.fingerprint()]),
            steps_left: self.max_steps,
        };
        match self.dfs(&mut search, &mut visit) {
            ControlFlow::Continue(()) => SearchStatus::Complete,
            ControlFlow::Break(stop) => stop,
        }
    }

    /// Collect every candidate chain for `leaf`, in discovery order.
    pub fn paths(&self, leaf: &'a Certificate) -> Vec<Vec<&'a Certificate>> {
        let mut out = Vec::new();
        let _ = self.for_each_path(leaf, |chain| {
            out.push(chain.to_vec());
            ControlFlow::Continue(())
        });
        out
    }

    fn dfs<F>(&self, search: &mut Search<'a>, visit: &mut F) -> ControlFlow<SearchStatus>
    where
        F: FnMut(&[&'a Certificate]) -> ControlFlow<()>,
    {
        let Some(&current) = search.chain.last() else {
            return ControlFlow::Continue(());
        };

        // A trusted certificate terminates the chain at any depth: it does
        // not need to verify against another anchor.
        if self.anchors.contains(current) {
            trace!(length = search.chain.len(), anchor = %current.subject(), "reached trust anchor");
            return match visit(search.chain.as_slice()) {
                ControlFlow::Continue(()) => ControlFlow::Continue(()),
                ControlFlow::Break(()) => ControlFlow::Break(SearchStatus::Stopped),
            };
        }

        if search.chain.len() >= self.max_depth {
            trace!(length = search.chain.len(), "depth limit reached");
            return ControlFlow::Continue(());
        }

        for issuer in self.candidate_issuers(current) {
            // Cycle: the candidate is already on the current path.
            if search.on_path.contains(issuer.fingerprint()) {
                continue;
            }
            if search.steps_left == 0 {
                debug!(max_steps = self.max_steps, "path search budget exhausted");
                return ControlFlow::Break(SearchStatus::BudgetExhausted);
            }
            search.steps_left -= 1;
            trace!(
                child = %current.subject(),
                issuer = %issuer.subject(),
                depth = search.chain.len(),
                "trying issuer"
            );
            search.on_path.insert(*issuer.fingerprint());
            search.chain.push(issuer);
            let flow = self.dfs(search, visit);
            search.chain.pop();
            search.on_path.remove(issuer.fingerprint());
            if flow.is_break() {
                return flow;
            }
        }

        ControlFlow::Continue(())
    }

    /// Issuer candidates for `cert` from both pools, ranked by key
    /// identifier, anchors ahead of intermediates within a rank.
    fn candidate_issuers(&self, cert: &Certificate) -> Vec<&'a Certificate> {
        let mut seen = HashSet::new();
        let mut ranked: Vec<(u8, &'a Certificate)> = self
            .anchors
            .issuers_of(cert)
            .into_iter()
            .chain(self.intermediates.issuers_of(cert))
            .filter(|c| seen.insert(*c.fingerprint()))
            .map(|c| (key_id_rank(cert, c), c))
            .collect();
        ranked.sort_by_key(|(rank, _)| *rank);
        ranked.into_iter().map(|(_, c)| c).collect()
    }
}

/// Mutable state of one depth-first search.
struct Search<'a> {
    chain: Vec<&'a Certificate>,
    on_path: HashSet<[u8; 32]>,
    steps_left: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_bound_counts_distinct_certificates_plus_leaf() {
        let empty = CertPool::new();
        let builder = PathBuilder::new(&empty, &empty);
        assert_eq!(builder.max_depth(), 1);
        assert_eq!(builder.with_max_depth(MAX_CHAIN_DEPTH).max_depth(), 1);
    }

    #[test]
    fn explicit_depth_never_drops_below_one() {
        let empty = CertPool::new();
        let builder = PathBuilder::new(&empty, &empty).with_max_depth(0);
        assert_eq!(builder.max_depth(), 1);
    }
}
