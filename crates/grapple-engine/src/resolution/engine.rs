//! Locator-chain resolution.
//!
//! Candidates are walked in chain order and the first one that yields an element
//! passing the [`VisibilityFilter`] wins, even if a later candidate would match
//! "better". A candidate with zero matches is skipped immediately; one whose
//! matches are all filtered out is polled for the per-candidate timeout before the
//! walk moves on. Whole passes repeat until the overall deadline.

use super::filter::VisibilityFilter;
use super::result::ResolvedElement;
use crate::backend::Backend;
use crate::error::{CandidateAttempt, CandidateFailure, EngineError, NotFoundError};
use crate::wait::Deadline;
use grapple_common::error::backend_error::BackendError;
use grapple_common::locator::{LocatorCandidate, LocatorChain};
use grapple_common::protocol::ElementHandle;
use std::time::Duration;
use tracing::{debug, trace};

/// Outcome of one pass over a chain.
#[derive(Debug)]
pub enum ChainWalk {
    Found(ResolvedElement),
    /// The overall deadline ran out mid-pass; candidates from `next_index` on were
    /// not reached in this pass.
    NotYetTried { next_index: usize },
    ExhaustedAllCandidates,
}

/// Outcome of checking one candidate once.
enum Probe {
    Hit(ResolvedElement),
    Miss { matched: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct ElementResolver {
    pub per_candidate_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ElementResolver {
    fn default() -> Self {
        Self {
            per_candidate_timeout: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl ElementResolver {
    pub fn new(per_candidate_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            per_candidate_timeout,
            poll_interval,
        }
    }

    pub async fn resolve<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        chain: &LocatorChain,
        timeout: Duration,
        filter: VisibilityFilter,
        epoch: u64,
    ) -> Result<ResolvedElement, EngineError> {
        let deadline = Deadline::after(timeout, self.poll_interval);
        let mut attempts: Vec<Option<CandidateAttempt>> = vec![None; chain.len()];

        loop {
            match self
                .walk(backend, chain, &deadline, filter, epoch, &mut attempts)
                .await?
            {
                ChainWalk::Found(element) => {
                    debug!(
                        target_name = %chain.name(),
                        candidate = %element.description,
                        index = element.matched_candidate_index,
                        handle = %element.handle,
                        "Resolved element"
                    );
                    return Ok(element);
                }
                ChainWalk::NotYetTried { next_index } => {
                    trace!(target_name = %chain.name(), next_index, "Deadline hit mid-pass");
                    break;
                }
                ChainWalk::ExhaustedAllCandidates => {
                    if !deadline.tick().await {
                        break;
                    }
                }
            }
        }

        Err(NotFoundError {
            target: chain.name().to_string(),
            timeout_ms: timeout.as_millis() as u64,
            attempts: attempts.into_iter().flatten().collect(),
        }
        .into())
    }

    /// One pass over the chain. Records the latest failure of every candidate
    /// attempted into `attempts`.
    pub async fn walk<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        chain: &LocatorChain,
        deadline: &Deadline,
        filter: VisibilityFilter,
        epoch: u64,
        attempts: &mut [Option<CandidateAttempt>],
    ) -> Result<ChainWalk, EngineError> {
        for (index, candidate) in chain.iter().enumerate() {
            let record = |failure: CandidateFailure| CandidateAttempt {
                index,
                strategy: candidate.strategy,
                expression: candidate.expression.clone(),
                description: candidate.description.clone(),
                failure,
            };

            let matched = match self
                .check(backend, chain, index, candidate, filter, epoch)
                .await
            {
                Ok(Probe::Hit(element)) => return Ok(ChainWalk::Found(element)),
                Ok(Probe::Miss { matched: 0 }) => {
                    trace!(candidate = %candidate, "No matches, falling through");
                    attempts[index] = Some(record(CandidateFailure::NoMatches));
                    continue;
                }
                Ok(Probe::Miss { matched }) => matched,
                Err(BackendError::SelectorInvalid { selector }) => {
                    debug!(candidate = %candidate, "Invalid selector");
                    attempts[index] = Some(record(CandidateFailure::Invalid { message: selector }));
                    continue;
                }
                Err(e) => return Err(EngineError::Backend(e)),
            };

            // Near miss: wait for one of the matches to become usable.
            let sub = deadline.sub(self.per_candidate_timeout);
            let mut matched = matched;
            while sub.tick().await {
                match self
                    .check(backend, chain, index, candidate, filter, epoch)
                    .await?
                {
                    Probe::Hit(element) => return Ok(ChainWalk::Found(element)),
                    Probe::Miss { matched: m } => matched = m,
                }
            }

            if deadline.expired() {
                attempts[index] = Some(record(CandidateFailure::TimedOut { matched }));
                if index + 1 < chain.len() {
                    return Ok(ChainWalk::NotYetTried {
                        next_index: index + 1,
                    });
                }
                return Ok(ChainWalk::ExhaustedAllCandidates);
            }
            debug!(candidate = %candidate, matched, "Matches filtered out, falling through");
            attempts[index] = Some(record(CandidateFailure::FilteredOut { matched }));
        }
        Ok(ChainWalk::ExhaustedAllCandidates)
    }

    async fn check<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        chain: &LocatorChain,
        index: usize,
        candidate: &LocatorCandidate,
        filter: VisibilityFilter,
        epoch: u64,
    ) -> Result<Probe, BackendError> {
        let handles = backend.find_elements(candidate).await?;
        let matched = handles.len();
        for handle in handles {
            let state = match backend.inspect(&handle).await {
                Ok(state) => state,
                // Detached between query and inspection.
                Err(e) if e.is_stale() => continue,
                Err(e) => return Err(e),
            };
            if filter.accepts(&state) {
                return Ok(Probe::Hit(ResolvedElement::new(
                    handle,
                    chain.name(),
                    index,
                    &candidate.description,
                    state,
                    epoch,
                )));
            }
        }
        Ok(Probe::Miss { matched })
    }

    /// Handles of the first candidate with at least one element passing `filter`.
    /// No waiting; an empty vector means nothing currently matches.
    pub async fn count_matches<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        chain: &LocatorChain,
        filter: VisibilityFilter,
    ) -> Result<Vec<ElementHandle>, BackendError> {
        for candidate in chain.iter() {
            let handles = match backend.find_elements(candidate).await {
                Ok(handles) => handles,
                Err(BackendError::SelectorInvalid { .. }) => continue,
                Err(e) => return Err(e),
            };
            let mut passing = Vec::new();
            for handle in handles {
                match backend.inspect(&handle).await {
                    Ok(state) if filter.accepts(&state) => passing.push(handle),
                    Ok(_) => {}
                    Err(e) if e.is_stale() => {}
                    Err(e) => return Err(e),
                }
            }
            if !passing.is_empty() {
                return Ok(passing);
            }
        }
        Ok(Vec::new())
    }
}
