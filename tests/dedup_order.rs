// tests/dedup_order.rs
use chrono::{TimeZone, Utc};
use prizefeed::dedup::dedup;
use prizefeed::model::Listing;

fn listing(link: &str, title: &str, source: &str, created: Option<i64>) -> Listing {
    Listing {
        id: Listing::derive_id(link, title, source),
        title: title.into(),
        link: link.into(),
        source: source.into(),
        created_at: created.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        deadline: None,
        prize: None,
        tags: vec![],
    }
}

fn sorted_ids(mut v: Vec<Listing>) -> Vec<String> {
    v.sort_by(|a, b| a.id.cmp(&b.id));
    v.into_iter().map(|l| l.id).collect()
}

#[test]
fn survivors_are_identical_for_every_input_order() {
    let records = vec![
        listing("https://brand.example/offer", "Win a Trip", "feedone", None),
        listing("https://brand.example/offer", "Win a Trip", "feedtwo", Some(1_700_000_000)),
        listing("https://agg.example/p/9", "Win a Trip", "feedtwo", None),
        listing("", "Win a Trip", "feedtwo", None),
        listing("https://other.example/bike", "Win a Bike", "feedone", Some(1_700_000_100)),
    ];

    let baseline = dedup(records.clone()).0;
    // Every rotation of the input set must elect the same survivors.
    for shift in 1..records.len() {
        let mut rotated = records.clone();
        rotated.rotate_left(shift);
        let out = dedup(rotated).0;
        assert_eq!(sorted_ids(out), sorted_ids(baseline.clone()), "rotation {shift}");
    }
}

#[test]
fn at_most_one_survivor_per_link_and_per_signature() {
    let records = vec![
        listing("https://x.com/a", "Win a Trip", "x.com", Some(1)),
        listing("https://x.com/a", "Win a Trip", "x.com", Some(2)),
        listing("https://x.com/b", "Win a Trip", "x.com", Some(3)),
        listing("https://y.com/c", "Win a Trip", "y.com", Some(4)),
    ];
    let (out, merged) = dedup(records);
    assert_eq!(merged, 2);

    let mut links: Vec<&str> = out.iter().map(|l| l.link.as_str()).collect();
    links.sort_unstable();
    links.dedup();
    assert_eq!(links.len(), out.len());

    let mut sigs: Vec<(String, String)> = out
        .iter()
        .map(|l| (l.title.to_lowercase(), l.source.to_lowercase()))
        .collect();
    sigs.sort();
    sigs.dedup();
    assert_eq!(sigs.len(), out.len());
}

#[test]
fn canonical_collision_keeps_record_with_created_at() {
    // Two source configs resolved to the same final URL; the one carrying
    // a createdAt wins.
    let a = listing("https://brand.example/offer", "Big Competition", "siteone", None);
    let b = listing("https://brand.example/offer", "Big Competition", "sitetwo", Some(1_700_000_000));
    let (out, _) = dedup(vec![a, b]);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].source, "sitetwo");
}
