// Prioritizer (C4)
//
// Produces a stable permutation of the conference's media sources: those
// the receiver has selected first (in receiver order), then the rest in
// the order the endpoint supplier produced them (most-recent-speaker
// order, by convention of the external collaborator).

use crate::layer::{MediaSourceDesc, SourceName};

/// Orders `sources` by priority: first everything named in `selected` (in
/// `selected`'s order), then the remaining sources preserving their
/// relative order in `sources`. Pure; does not mutate its inputs.
pub fn prioritize(sources: &[MediaSourceDesc], selected: &[SourceName]) -> Vec<MediaSourceDesc> {
    let mut by_name: std::collections::HashMap<&SourceName, &MediaSourceDesc> =
        sources.iter().map(|s| (&s.source_name, s)).collect();

    let mut ordered = Vec::with_capacity(sources.len());

    for name in selected {
        if let Some(source) = by_name.remove(name) {
            ordered.push(source.clone());
        }
    }

    for source in sources {
        if by_name.contains_key(&source.source_name) {
            ordered.push(source.clone());
            by_name.remove(&source.source_name);
        }
    }

    ordered
}
