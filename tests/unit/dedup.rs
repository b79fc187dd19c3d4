use hvpull::dedup::{deduplicate, total_files};
use hvpull::RemoteFileReference;
use std::collections::HashSet;

fn listing(server: &str, names: &[String]) -> Vec<RemoteFileReference> {
    names
        .iter()
        .map(|name| RemoteFileReference::new(format!("http://{server}/jp2/{name}"), server))
        .collect()
}

fn names(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("2011_03_07__{i:06}__SDO_AIA_AIA_171.jp2")).collect()
}

#[test]
fn full_mirrors_split_the_load() {
    let all = names(0..100);
    let result = deduplicate(vec![listing("lmsal", &all), listing("jsoc", &all)]);

    assert_eq!(total_files(&result), 100);
    assert_eq!(result[0].len(), 50);
    assert_eq!(result[1].len(), 50);
}

#[test]
fn union_is_preserved_and_unique() {
    let a = names(0..40);
    let b = names(20..70);
    let c = names(60..80);
    let result = deduplicate(vec![listing("a", &a), listing("b", &b), listing("c", &c)]);

    let mut seen = HashSet::new();
    for file in result.iter().flatten() {
        assert!(seen.insert(file.basename.clone()), "{} assigned twice", file.basename);
    }
    let expected: HashSet<String> = names(0..80).into_iter().collect();
    assert_eq!(seen, expected);

    // Every file stays with a server that actually listed it.
    for (server, files) in ["a", "b", "c"].iter().zip(&result) {
        assert!(files.iter().all(|f| f.server == *server));
    }
}

#[test]
fn empty_lists_stay_aligned() {
    let result = deduplicate(vec![Vec::new(), listing("soho", &names(0..3)), Vec::new()]);
    assert_eq!(result.len(), 3);
    assert!(result[0].is_empty());
    assert_eq!(result[1].len(), 3);
    assert!(result[2].is_empty());
}
