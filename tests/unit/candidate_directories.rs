use chrono::{TimeZone, Utc};
use hvpull::server::registry::create_server;

#[test]
fn range_across_midnight_covers_both_days() {
    let soho = create_server("soho").unwrap();
    let dirs = soho.get_candidate_directories(
        Utc.with_ymd_and_hms(2011, 3, 7, 23, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2011, 3, 8, 0, 30, 0).unwrap(),
    );

    assert_eq!(dirs.len(), 2 * soho.kind.measurement_count());
    assert_eq!(
        dirs[0].location,
        "http://sohowww.nascom.nasa.gov/sdb/hv/jp2/EIT/2011/03/07/171"
    );
    assert!(dirs
        .iter()
        .any(|d| d.location.ends_with("LASCO-C3/2011/03/08/white-light")));
}

#[test]
fn single_instant_yields_one_day() {
    let stereo = create_server("stereo").unwrap();
    let t = Utc.with_ymd_and_hms(2012, 12, 31, 12, 0, 0).unwrap();
    let dirs = stereo.get_candidate_directories(t, t);

    assert_eq!(dirs.len(), stereo.kind.measurement_count());
    assert!(dirs.iter().all(|d| d.location.contains("/2012/12/31/")));
}

#[test]
fn inverted_range_yields_nothing() {
    let rob = create_server("rob").unwrap();
    let dirs = rob.get_candidate_directories(
        Utc.with_ymd_and_hms(2011, 3, 8, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2011, 3, 7, 0, 0, 0).unwrap(),
    );
    assert!(dirs.is_empty());
}

#[test]
fn uri_override_changes_every_location() {
    let jsoc = create_server("jsoc").unwrap().with_uri("/mnt/jsoc/jp2/");
    let t = Utc.with_ymd_and_hms(2011, 3, 7, 0, 0, 0).unwrap();
    let dirs = jsoc.get_candidate_directories(t, t);

    assert!(dirs.iter().all(|d| d.location.starts_with("/mnt/jsoc/jp2/")));
    assert!(dirs.iter().any(|d| d.location == "/mnt/jsoc/jp2/HMI/2011/03/07/magnetogram"));
}
