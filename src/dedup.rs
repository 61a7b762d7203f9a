// src/dedup.rs
//! Two-pass merge: first by cleaned link, then by a lowercase
//! (title, source) signature to catch the same posting resolved to
//! different final URLs. The winner per key depends only on record
//! content, never on arrival order.

use std::collections::HashMap;

use crate::model::Listing;

/// Survivors after both passes, plus the number of records merged away.
pub fn dedup(listings: Vec<Listing>) -> (Vec<Listing>, usize) {
    let before = listings.len();

    // Pass 1: exact cleaned link. Linkless records skip straight to pass 2.
    let mut by_link: HashMap<String, Listing> = HashMap::new();
    let mut link_order: Vec<String> = Vec::new();
    let mut linkless: Vec<Listing> = Vec::new();
    for l in listings {
        if l.link.is_empty() {
            linkless.push(l);
            continue;
        }
        match by_link.entry(l.link.clone()) {
            std::collections::hash_map::Entry::Vacant(e) => {
                link_order.push(l.link.clone());
                e.insert(l);
            }
            std::collections::hash_map::Entry::Occupied(mut e) => {
                if beats(&l, e.get()) {
                    e.insert(l);
                }
            }
        }
    }

    // Pass 2: fuzzy same-story signature over pass-1 survivors.
    let mut by_sig: HashMap<(String, String), Listing> = HashMap::new();
    let mut sig_order: Vec<(String, String)> = Vec::new();
    let survivors = link_order
        .into_iter()
        .filter_map(|k| by_link.remove(&k))
        .chain(linkless);
    for l in survivors {
        let sig = (l.title.to_lowercase(), l.source.to_lowercase());
        match by_sig.entry(sig.clone()) {
            std::collections::hash_map::Entry::Vacant(e) => {
                sig_order.push(sig);
                e.insert(l);
            }
            std::collections::hash_map::Entry::Occupied(mut e) => {
                if beats(&l, e.get()) {
                    e.insert(l);
                }
            }
        }
    }

    let out: Vec<Listing> = sig_order
        .into_iter()
        .filter_map(|k| by_sig.remove(&k))
        .collect();
    let merged = before - out.len();
    (out, merged)
}

/// Metadata richness: createdAt presence counts most, then a deadline,
/// then title length.
fn score(l: &Listing) -> (u8, u8, usize) {
    (
        u8::from(l.created_at.is_some()),
        u8::from(l.deadline.is_some()),
        l.title.chars().count(),
    )
}

/// Whether `candidate` should replace `incumbent`. Strictly ordered by
/// score, then by content so the outcome is identical for any arrival
/// order of the same input set.
fn beats(candidate: &Listing, incumbent: &Listing) -> bool {
    let (a, b) = (score(candidate), score(incumbent));
    if a != b {
        return a > b;
    }
    (&candidate.title, &candidate.created_at, &candidate.id)
        < (&incumbent.title, &incumbent.created_at, &incumbent.id)
}
