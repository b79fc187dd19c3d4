use hvpull::browser::listing::{extract_files, extract_hrefs};

const NGINX_INDEX: &str = r#"<html>
<head><title>Index of /jp2/COR2-A/2012/05/01/white-light/</title></head>
<body>
<h1>Index of /jp2/COR2-A/2012/05/01/white-light/</h1><hr><pre><a href="../">../</a>
<a href="2012_05_01__00_24_00_000__STEREO-A_SECCHI_COR2_white-light.jp2">2012_05_01__00_24_00_000__STEREO-A_SECCHI_COR2_white-light.jp2</a>  01-May-2012 02:10  1048576
<a href="2012_05_01__00_39_00_000__STEREO-A_SECCHI_COR2_white-light.jp2">2012_05_01__00_39_00_000__STEREO-A_SECCHI_COR2_white-light.jp2</a>  01-May-2012 02:11  1048576
<a href="2012_05_01__00_39_00_000__STEREO-A_SECCHI_COR2_white-light.jp2.md5">md5</a>
</pre><hr></body>
</html>"#;

#[test]
fn nginx_autoindex_is_understood() {
    let base = "http://stereo-ssc.nascom.nasa.gov/data/hv/jp2/COR2-A/2012/05/01/white-light/";
    let files = extract_files(base, NGINX_INDEX, "jp2");
    assert_eq!(
        files,
        vec![
            format!("{}2012_05_01__00_24_00_000__STEREO-A_SECCHI_COR2_white-light.jp2", base),
            format!("{}2012_05_01__00_39_00_000__STEREO-A_SECCHI_COR2_white-light.jp2", base),
        ]
    );
}

#[test]
fn hrefs_keep_document_order() {
    let hrefs = extract_hrefs(NGINX_INDEX);
    assert_eq!(hrefs.first(), Some(&"../"));
    assert_eq!(hrefs.len(), 4);
}

#[test]
fn page_without_links_is_empty() {
    assert!(extract_files("http://h/jp2", "<html><body>Forbidden</body></html>", "jp2").is_empty());
}
