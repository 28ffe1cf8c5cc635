//! Maximal marginal relevance selection

use super::Candidate;
use crate::vector::cosine_similarity;

/// Pick up to `k` candidates, trading relevance against redundancy.
///
/// Each round selects the remaining candidate maximising
/// `lambda * relevance - (1 - lambda) * max_similarity_to_selected`, where
/// relevance is the candidate score. Candidates without an embedding count as
/// dissimilar to everything. Ties go to the earlier candidate, so the result
/// is deterministic for a given input order.
pub fn maximal_marginal_relevance(
    candidates: Vec<Candidate>,
    k: usize,
    lambda_mult: f32,
) -> Vec<Candidate> {
    if candidates.len() <= 1 || k == 0 {
        return candidates.into_iter().take(k).collect();
    }

    let mut remaining: Vec<Option<Candidate>> = candidates.into_iter().map(Some).collect();
    // Highest similarity of each remaining candidate to anything selected so far
    let mut redundancy = vec![0.0f32; remaining.len()];
    let mut selected = Vec::with_capacity(k.min(remaining.len()));

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for (i, slot) in remaining.iter().enumerate() {
            let Some(candidate) = slot else { continue };
            let value = lambda_mult * candidate.score() - (1.0 - lambda_mult) * redundancy[i];
            if best.map_or(true, |(_, b)| value > b) {
                best = Some((i, value));
            }
        }

        let Some((index, _)) = best else { break };
        let Some(chosen) = remaining[index].take() else { break };

        if let Some(chosen_embedding) = chosen.embedding.as_deref() {
            for (i, slot) in remaining.iter().enumerate() {
                if let Some(Some(other)) = slot.as_ref().map(|c| c.embedding.as_deref()) {
                    let sim = cosine_similarity(chosen_embedding, other);
                    if sim > redundancy[i] {
                        redundancy[i] = sim;
                    }
                }
            }
        }
        selected.push(chosen);
    }

    selected
}
